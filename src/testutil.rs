//! Shared test helpers for handler tests.

use std::sync::Arc;

use crate::config::{Config, NodeConfig, StorageConfig};
use crate::object_store::LocalStore;
use crate::registry::Registry;
use crate::storage::models::MaintenanceSettings;
use crate::storage::Database;
use crate::AppState;

/// Create a test AppState with a temporary database and local object store.
pub fn test_state(temp_dir: &tempfile::TempDir) -> Arc<AppState> {
    let data_dir = temp_dir.path().join("data");
    let files_dir = temp_dir.path().join("files");

    let config = Config {
        node: NodeConfig {
            bind_address: "127.0.0.1:0".to_string(),
            data_dir: data_dir.to_string_lossy().to_string(),
        },
        storage: StorageConfig {
            local_storage_path: files_dir.to_string_lossy().to_string(),
            ..StorageConfig::default()
        },
        maintenance: MaintenanceSettings::default(),
        max_upload_size: 10 * 1024 * 1024, // 10MB for tests
    };

    let db = Database::open(&data_dir).expect("Failed to open test database");
    let object_store = LocalStore::new(&files_dir).expect("Failed to create test object store");

    Arc::new(AppState {
        config,
        registry: Arc::new(Registry::new(db.clone(), Arc::new(object_store))),
        settings: Arc::new(db),
    })
}
