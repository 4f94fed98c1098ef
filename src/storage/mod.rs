pub mod db;
mod files;
pub mod models;
mod settings;
mod tables;

pub use db::{Database, DatabaseError};
pub use files::{Registration, ReleaseOutcome};
pub use tables::*;
