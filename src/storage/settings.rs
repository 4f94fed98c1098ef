use serde::de::DeserializeOwned;
use serde::Serialize;

use super::db::{Database, DatabaseError};
use super::tables::SETTINGS;

impl Database {
    /// Load a named settings record, if one has been saved
    pub fn get_setting<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(SETTINGS)?;

        match table.get(name)? {
            Some(data) => Ok(Some(rmp_serde::from_slice(data.value())?)),
            None => Ok(None),
        }
    }

    /// Store a named settings record, replacing any previous value
    pub fn put_setting<T: Serialize>(&self, name: &str, value: &T) -> Result<(), DatabaseError> {
        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(SETTINGS)?;
            let data = rmp_serde::to_vec_named(value)?;
            table.insert(name, data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }
}
