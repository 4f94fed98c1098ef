mod admin;
mod files;
mod maintenance;
mod references;

pub use admin::{get_settings, health, update_settings};
pub use files::{create_file, get_file, get_file_content, list_files};
pub use maintenance::{file_cleanup, file_cleanup_stats};
pub use references::{add_reference, owner_files, release_owner, release_reference};
