//! file-registry - A content-addressable file registry for CMS media
//!
//! This crate stores uploaded files once per distinct content and tracks who uses them:
//! - SHA-256 content fingerprints as the deduplication key
//! - Reference counting per logical owner (product, banner, partner, ...)
//! - Orphan marking and retention-window reclamation, on demand or on a schedule
//! - Swappable object storage backends (local filesystem, GCS)
//! - redb embedded database for metadata (ACID, MVCC, crash-safe)
//! - REST API with multipart upload support

pub mod api;
pub mod config;
pub mod fingerprint;
pub mod object_store;
pub mod registry;
pub mod settings;
pub mod storage;
#[cfg(test)]
pub mod testutil;

use std::sync::Arc;

use config::Config;
use registry::Registry;
use settings::SettingsRepository;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub registry: Arc<Registry>,
    pub settings: Arc<dyn SettingsRepository>,
}
