use thiserror::Error;

use crate::object_store::ObjectStoreError;
use crate::storage::DatabaseError;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("File not found: {0}")]
    NotFound(String),
    /// A reference count would go negative or an owner does not hold the reference.
    #[error("Reference invariant violated: {0}")]
    Invariant(String),
    #[error("Invalid request: {0}")]
    Validation(String),
    #[error("Storage error: {0}")]
    Storage(#[from] ObjectStoreError),
    #[error(transparent)]
    Database(#[from] DatabaseError),
}
