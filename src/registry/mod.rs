//! Content-addressable file registry.
//!
//! Identical uploads share one stored object and one [`FileRecord`]; owners
//! hold the record id and the registry counts how many references exist. The
//! object store is only ever written or deleted through this type.

mod error;
mod locks;
mod maintenance;

pub use error::RegistryError;
pub use maintenance::{spawn_sweeper, CleanupFailure, CleanupReport, SweepReport};

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::fingerprint::ContentHash;
use crate::object_store::{ObjectStore, ObjectStoreError};
use crate::storage::models::{FileRecord, FileState, FileType};
use crate::storage::{Database, Registration, ReleaseOutcome};
use locks::ContentLocks;

/// Upload attributes captured alongside the bytes.
#[derive(Debug, Clone, Default)]
pub struct UploadMetadata {
    pub mime_type: String,
    pub original_name: Option<String>,
    /// Entity taking the reference, e.g. `product:42`.
    pub owner: Option<String>,
}

pub struct Registry {
    db: Database,
    object_store: Arc<dyn ObjectStore>,
    locks: ContentLocks,
}

impl Registry {
    pub fn new(db: Database, object_store: Arc<dyn ObjectStore>) -> Self {
        Self {
            db,
            object_store,
            locks: ContentLocks::new(),
        }
    }

    /// Store content, or take another reference on identical content already stored.
    pub async fn register(
        &self,
        data: Bytes,
        metadata: UploadMetadata,
    ) -> Result<Registration, RegistryError> {
        let hash = ContentHash::compute(&data);
        let _guard = self.locks.lock(hash.as_str()).await;

        let key = hash.object_key();
        let fresh = self.db.get_file_by_hash(hash.as_str())?.is_none();
        // Always put: a no-op when present, and restores bytes lost under a live record
        self.object_store.put(&key, data.clone()).await?;

        let now = Utc::now();
        let candidate = FileRecord {
            id: uuid::Uuid::new_v4().to_string(),
            content_hash: hash.to_string(),
            path: key.clone(),
            byte_size: data.len() as u64,
            file_type: FileType::from_mime(&metadata.mime_type),
            mime_type: metadata.mime_type,
            original_name: metadata.original_name,
            reference_count: 1,
            orphaned_at: None,
            created_at: now,
            updated_at: now,
        };

        let registration = match self
            .db
            .register_file(&candidate, metadata.owner.as_deref(), now)
        {
            Ok(registration) => registration,
            Err(e) => {
                if fresh {
                    self.discard_object(&key).await;
                }
                return Err(e.into());
            }
        };

        tracing::debug!(
            file_id = %registration.record.id,
            content_hash = %hash,
            created = registration.created,
            reference_count = registration.record.reference_count,
            "Registered file"
        );
        Ok(registration)
    }

    /// Remove bytes whose record never committed. Runs under the content lock,
    /// so no other registration can be relying on them.
    async fn discard_object(&self, key: &str) {
        match self.object_store.delete(key).await {
            Ok(()) | Err(ObjectStoreError::NotFound(_)) => {
                tracing::debug!(key = %key, "Discarded bytes of failed registration");
            }
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Failed to discard bytes of failed registration");
            }
        }
    }

    /// Take one more reference on an existing file.
    pub async fn add_reference(
        &self,
        id: &str,
        owner: Option<&str>,
    ) -> Result<FileRecord, RegistryError> {
        let file = self.get(id)?;
        let _guard = self.locks.lock(&file.content_hash).await;

        let record = self
            .db
            .add_reference(id, owner, Utc::now())?
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;

        tracing::debug!(file_id = %id, reference_count = record.reference_count, "Added reference");
        Ok(record)
    }

    /// Drop one reference; the file becomes an orphan when the last one goes.
    pub fn release(&self, id: &str, owner: Option<&str>) -> Result<FileRecord, RegistryError> {
        self.release_at(id, owner, Utc::now())
    }

    pub fn release_at(
        &self,
        id: &str,
        owner: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<FileRecord, RegistryError> {
        match self.db.release_reference(id, owner, now)? {
            ReleaseOutcome::Released(record) => {
                if record.orphaned_at.is_some() {
                    tracing::info!(file_id = %id, "File orphaned");
                }
                Ok(record)
            }
            ReleaseOutcome::NotFound => Err(RegistryError::NotFound(id.to_string())),
            ReleaseOutcome::AlreadyZero => {
                tracing::error!(file_id = %id, "Release requested on a file with no references");
                Err(RegistryError::Invariant(format!(
                    "file '{id}' has no references to release"
                )))
            }
            ReleaseOutcome::NotHeld => Err(RegistryError::Invariant(match owner {
                Some(owner) => format!("owner '{owner}' holds no reference to file '{id}'"),
                None => format!("every reference to file '{id}' belongs to a named owner"),
            })),
        }
    }

    /// Release every reference an owner holds (e.g. when a product is deleted).
    pub fn release_owner(&self, owner: &str) -> Result<Vec<FileRecord>, RegistryError> {
        if owner.trim().is_empty() {
            return Err(RegistryError::Validation("owner must not be empty".into()));
        }
        let released = self.db.release_owner(owner, Utc::now())?;
        tracing::info!(owner = %owner, released = released.len(), "Released owner references");
        Ok(released)
    }

    pub fn get(&self, id: &str) -> Result<FileRecord, RegistryError> {
        self.db
            .get_file(id)?
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    /// Fetch a record together with its stored bytes.
    pub async fn read_content(&self, id: &str) -> Result<(FileRecord, Bytes), RegistryError> {
        let file = self.get(id)?;
        let data = self.object_store.get(&file.path).await?;
        Ok((file, data))
    }

    pub fn list(
        &self,
        state: Option<FileState>,
        owner: Option<&str>,
    ) -> Result<Vec<FileRecord>, RegistryError> {
        Ok(self.db.list_files(state, owner)?)
    }

    pub fn files_for_owner(&self, owner: &str) -> Result<Vec<FileRecord>, RegistryError> {
        Ok(self.db.get_files_by_owner(owner)?)
    }
}
