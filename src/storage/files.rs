use chrono::{DateTime, Utc};
use redb::{ReadableTable, Table, WriteTransaction};

use super::db::{Database, DatabaseError};
use super::models::{FileRecord, FileState, RegistryStats};
use super::tables::*;

/// Result of registering content.
#[derive(Debug, Clone)]
pub struct Registration {
    pub record: FileRecord,
    /// False when the content was already stored and only its count moved.
    pub created: bool,
}

/// Result of releasing one reference.
#[derive(Debug, Clone)]
pub enum ReleaseOutcome {
    Released(FileRecord),
    NotFound,
    /// The count is already zero; nothing was changed.
    AlreadyZero,
    /// The named owner holds no reference to the file; nothing was changed.
    NotHeld,
}

impl Database {
    // ========================================================================
    // Reference counting
    // ========================================================================

    /// Register content: bump the record already holding `candidate.content_hash`,
    /// or insert `candidate` as a new record with its own count.
    ///
    /// Lookup and insert-or-increment share one write transaction, so two
    /// registrations of the same hash can never both create a record.
    pub fn register_file(
        &self,
        candidate: &FileRecord,
        owner: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Registration, DatabaseError> {
        debug_assert!(!candidate.id.is_empty(), "file id must not be empty");
        debug_assert!(
            !candidate.content_hash.is_empty(),
            "content hash must not be empty"
        );

        let write_txn = self.begin_write()?;
        let registration = {
            let mut files = write_txn.open_table(FILES)?;
            let mut hashes = write_txn.open_table(CONTENT_HASHES)?;

            let existing_id = hashes
                .get(candidate.content_hash.as_str())?
                .map(|v| v.value().to_string());
            let existing = match existing_id {
                Some(id) => read_record(&files, &id)?,
                None => None,
            };

            match existing {
                Some(mut record) => {
                    record.reference_count += 1;
                    record.orphaned_at = None;
                    record.updated_at = now;
                    write_record(&mut files, &record)?;
                    Registration {
                        record,
                        created: false,
                    }
                }
                None => {
                    write_record(&mut files, candidate)?;
                    hashes.insert(candidate.content_hash.as_str(), candidate.id.as_str())?;
                    Registration {
                        record: candidate.clone(),
                        created: true,
                    }
                }
            }
        };

        if let Some(owner) = owner {
            push_owner(&write_txn, owner, &registration.record.id)?;
        }

        write_txn.commit()?;
        Ok(registration)
    }

    /// Add one reference to an existing file. Returns `None` if the id is unknown.
    pub fn add_reference(
        &self,
        id: &str,
        owner: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Option<FileRecord>, DatabaseError> {
        let write_txn = self.begin_write()?;

        let updated = {
            let mut files = write_txn.open_table(FILES)?;
            match read_record(&files, id)? {
                Some(mut record) => {
                    record.reference_count += 1;
                    record.orphaned_at = None;
                    record.updated_at = now;
                    write_record(&mut files, &record)?;
                    Some(record)
                }
                None => None,
            }
        };

        if let (Some(record), Some(owner)) = (&updated, owner) {
            push_owner(&write_txn, owner, &record.id)?;
        }

        write_txn.commit()?;
        Ok(updated)
    }

    /// Drop one reference. Stamps `orphaned_at` when the count reaches zero.
    pub fn release_reference(
        &self,
        id: &str,
        owner: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<ReleaseOutcome, DatabaseError> {
        let write_txn = self.begin_write()?;

        let current = {
            let files = write_txn.open_table(FILES)?;
            let result = read_record(&files, id)?;
            result
        };

        let mut record = match current {
            Some(record) => record,
            None => return Ok(ReleaseOutcome::NotFound),
        };
        if record.reference_count == 0 {
            return Ok(ReleaseOutcome::AlreadyZero);
        }
        let held = match owner {
            Some(owner) => pull_owner(&write_txn, owner, id)?,
            // Anonymous references are whatever the owner index does not account for
            None => record.reference_count > owned_entries(&write_txn, id)?,
        };
        if !held {
            return Ok(ReleaseOutcome::NotHeld);
        }

        decrement(&mut record, now);
        {
            let mut files = write_txn.open_table(FILES)?;
            write_record(&mut files, &record)?;
        }

        write_txn.commit()?;
        Ok(ReleaseOutcome::Released(record))
    }

    /// Release every reference an owner holds and forget the owner.
    /// Returns the records whose counts moved.
    pub fn release_owner(
        &self,
        owner: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<FileRecord>, DatabaseError> {
        let write_txn = self.begin_write()?;

        let file_ids: Vec<String> = {
            let mut owners = write_txn.open_table(OWNER_FILES)?;
            let ids = match owners.get(owner)? {
                Some(data) => rmp_serde::from_slice(data.value())?,
                None => Vec::new(),
            };
            owners.remove(owner)?;
            ids
        };

        let mut released = Vec::new();
        {
            let mut files = write_txn.open_table(FILES)?;
            for id in &file_ids {
                let Some(mut record) = read_record(&files, id)? else {
                    continue;
                };
                // References still indexed under other owners are not ours to drop
                if record.reference_count <= owned_entries(&write_txn, id)? {
                    tracing::warn!(
                        file_id = %id,
                        owner = %owner,
                        reference_count = record.reference_count,
                        "Owner index listed a reference the count does not cover"
                    );
                    continue;
                }
                decrement(&mut record, now);
                write_record(&mut files, &record)?;
                released.push(record);
            }
        }

        write_txn.commit()?;
        Ok(released)
    }

    // ========================================================================
    // Orphan scanning and reclamation
    // ========================================================================

    /// Stamp `orphaned_at` on every zero-count record that lacks one.
    /// Returns how many records were stamped.
    pub fn mark_orphaned(&self, now: DateTime<Utc>) -> Result<u64, DatabaseError> {
        let write_txn = self.begin_write()?;
        let mut marked = 0;

        {
            let mut files = write_txn.open_table(FILES)?;
            let mut pending = Vec::new();
            for entry in files.iter()? {
                let (_, value) = entry?;
                let file: FileRecord = rmp_serde::from_slice(value.value())?;
                if file.reference_count == 0 && file.orphaned_at.is_none() {
                    pending.push(file);
                }
            }

            for mut file in pending {
                file.orphaned_at = Some(now);
                file.updated_at = now;
                write_record(&mut files, &file)?;
                marked += 1;
            }
        }

        write_txn.commit()?;
        Ok(marked)
    }

    /// Records orphaned strictly before `cutoff`.
    pub fn orphans_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<FileRecord>, DatabaseError> {
        Ok(self
            .get_all_files()?
            .into_iter()
            .filter(|f| f.is_reclaimable(cutoff))
            .collect())
    }

    /// Delete a record only if it is still reclaimable at `cutoff`, cleaning up
    /// the content and owner indexes. Returns false if the record is gone or
    /// has been referenced again.
    pub fn delete_orphan(&self, id: &str, cutoff: DateTime<Utc>) -> Result<bool, DatabaseError> {
        let write_txn = self.begin_write()?;

        let current = {
            let files = write_txn.open_table(FILES)?;
            let result = read_record(&files, id)?;
            result
        };

        let record = match current {
            Some(record) if record.is_reclaimable(cutoff) => record,
            _ => return Ok(false),
        };

        {
            let mut files = write_txn.open_table(FILES)?;
            files.remove(id)?;
        }
        {
            let mut hashes = write_txn.open_table(CONTENT_HASHES)?;
            let indexed = hashes
                .get(record.content_hash.as_str())?
                .map(|v| v.value() == id)
                .unwrap_or(false);
            if indexed {
                hashes.remove(record.content_hash.as_str())?;
            }
        }
        purge_owner_entries(&write_txn, id)?;

        write_txn.commit()?;
        Ok(true)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Get a file by its UUID
    pub fn get_file(&self, id: &str) -> Result<Option<FileRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(FILES)?;
        read_record(&table, id)
    }

    /// Get a file by its content hash (resolves hash -> uuid -> file)
    pub fn get_file_by_hash(
        &self,
        content_hash: &str,
    ) -> Result<Option<FileRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let hashes = read_txn.open_table(CONTENT_HASHES)?;

        let id = match hashes.get(content_hash)? {
            Some(data) => data.value().to_string(),
            None => return Ok(None),
        };

        let files = read_txn.open_table(FILES)?;
        read_record(&files, &id)
    }

    /// Distinct files an owner references
    pub fn get_files_by_owner(&self, owner: &str) -> Result<Vec<FileRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let owners = read_txn.open_table(OWNER_FILES)?;
        let files_table = read_txn.open_table(FILES)?;

        let mut file_ids: Vec<String> = match owners.get(owner)? {
            Some(data) => rmp_serde::from_slice(data.value())?,
            None => return Ok(Vec::new()),
        };
        let mut seen = std::collections::HashSet::new();
        file_ids.retain(|id| seen.insert(id.clone()));

        let mut files = Vec::new();
        for file_id in file_ids {
            if let Some(file) = read_record(&files_table, &file_id)? {
                files.push(file);
            }
        }

        Ok(files)
    }

    /// Get all files
    pub fn get_all_files(&self) -> Result<Vec<FileRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(FILES)?;

        let mut files = Vec::new();
        for result in table.iter()? {
            let (_, value) = result?;
            let file: FileRecord = rmp_serde::from_slice(value.value())?;
            files.push(file);
        }

        Ok(files)
    }

    /// List files with optional state and owner filters, oldest first
    pub fn list_files(
        &self,
        state: Option<FileState>,
        owner: Option<&str>,
    ) -> Result<Vec<FileRecord>, DatabaseError> {
        // Use owner index when an owner is provided
        let all = match owner {
            Some(owner) => self.get_files_by_owner(owner)?,
            None => self.get_all_files()?,
        };

        let mut files: Vec<FileRecord> = match state {
            Some(state) => all.into_iter().filter(|f| f.state() == state).collect(),
            None => all,
        };
        files.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(files)
    }

    /// Aggregate counts and sizes in a single read transaction
    pub fn stats(&self) -> Result<RegistryStats, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(FILES)?;

        let mut stats = RegistryStats::default();
        for result in table.iter()? {
            let (_, value) = result?;
            let file: FileRecord = rmp_serde::from_slice(value.value())?;
            stats.total_files += 1;
            stats.total_size += file.byte_size;
            match file.state() {
                FileState::Active => stats.active_count += 1,
                FileState::Orphaned => stats.orphaned_count += 1,
            }
        }

        Ok(stats)
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn read_record(
    table: &impl ReadableTable<&'static str, &'static [u8]>,
    id: &str,
) -> Result<Option<FileRecord>, DatabaseError> {
    match table.get(id)? {
        Some(data) => {
            let file: FileRecord = rmp_serde::from_slice(data.value())?;
            Ok(Some(file))
        }
        None => Ok(None),
    }
}

fn write_record(
    table: &mut Table<'_, &'static str, &'static [u8]>,
    file: &FileRecord,
) -> Result<(), DatabaseError> {
    let data = rmp_serde::to_vec_named(file)?;
    table.insert(file.id.as_str(), data.as_slice())?;
    Ok(())
}

fn decrement(record: &mut FileRecord, now: DateTime<Utc>) {
    record.reference_count -= 1;
    if record.reference_count == 0 {
        record.orphaned_at = Some(now);
    }
    record.updated_at = now;
}

/// Append one reference entry for `owner`.
fn push_owner(write_txn: &WriteTransaction, owner: &str, id: &str) -> Result<(), DatabaseError> {
    let mut owners = write_txn.open_table(OWNER_FILES)?;
    let mut file_ids: Vec<String> = match owners.get(owner)? {
        Some(data) => rmp_serde::from_slice(data.value())?,
        None => Vec::new(),
    };

    file_ids.push(id.to_string());
    let data = rmp_serde::to_vec_named(&file_ids)?;
    owners.insert(owner, data.as_slice())?;
    Ok(())
}

/// Remove one reference entry for `owner`. Returns false if the owner held none.
fn pull_owner(write_txn: &WriteTransaction, owner: &str, id: &str) -> Result<bool, DatabaseError> {
    let mut owners = write_txn.open_table(OWNER_FILES)?;
    let mut file_ids: Vec<String> = match owners.get(owner)? {
        Some(data) => rmp_serde::from_slice(data.value())?,
        None => return Ok(false),
    };

    let Some(pos) = file_ids.iter().position(|fid| fid == id) else {
        return Ok(false);
    };
    file_ids.remove(pos);

    if file_ids.is_empty() {
        owners.remove(owner)?;
    } else {
        let data = rmp_serde::to_vec_named(&file_ids)?;
        owners.insert(owner, data.as_slice())?;
    }
    Ok(true)
}

/// Reference entries for `id` across every owner.
fn owned_entries(write_txn: &WriteTransaction, id: &str) -> Result<u64, DatabaseError> {
    let owners = write_txn.open_table(OWNER_FILES)?;

    let mut count = 0;
    for entry in owners.iter()? {
        let (_, value) = entry?;
        let file_ids: Vec<String> = rmp_serde::from_slice(value.value())?;
        count += file_ids.iter().filter(|fid| fid.as_str() == id).count() as u64;
    }
    Ok(count)
}

/// Drop every owner entry pointing at a deleted file.
fn purge_owner_entries(write_txn: &WriteTransaction, id: &str) -> Result<(), DatabaseError> {
    let mut owners = write_txn.open_table(OWNER_FILES)?;

    let mut affected: Vec<(String, Vec<String>)> = Vec::new();
    for entry in owners.iter()? {
        let (key, value) = entry?;
        let file_ids: Vec<String> = rmp_serde::from_slice(value.value())?;
        if file_ids.iter().any(|fid| fid == id) {
            let remaining = file_ids.into_iter().filter(|fid| fid != id).collect();
            affected.push((key.value().to_string(), remaining));
        }
    }

    for (owner, remaining) in affected {
        if remaining.is_empty() {
            owners.remove(owner.as_str())?;
        } else {
            let data = rmp_serde::to_vec_named(&remaining)?;
            owners.insert(owner.as_str(), data.as_slice())?;
        }
    }
    Ok(())
}
