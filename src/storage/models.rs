use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Classification of a file derived from its MIME type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Audio,
    Binary,
    Document,
    Image,
    Video,
}

impl FileType {
    /// Derive a file type classification from a MIME type string.
    pub fn from_mime(mime_type: &str) -> Self {
        let (primary, sub) = mime_type.split_once('/').unwrap_or((mime_type, ""));
        match primary {
            "audio" => FileType::Audio,
            "image" => FileType::Image,
            "video" => FileType::Video,
            "text" => FileType::Document,
            "application" => match sub {
                "pdf"
                | "msword"
                | "rtf"
                | "vnd.openxmlformats-officedocument.wordprocessingml.document"
                | "vnd.openxmlformats-officedocument.spreadsheetml.sheet"
                | "vnd.openxmlformats-officedocument.presentationml.presentation"
                | "vnd.ms-excel"
                | "vnd.ms-powerpoint"
                | "vnd.oasis.opendocument.text" => FileType::Document,
                _ => FileType::Binary,
            },
            _ => FileType::Binary,
        }
    }
}

/// Reference state used to filter listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileState {
    /// At least one owner references the file.
    Active,
    /// Nothing references the file; it is a reclamation candidate.
    Orphaned,
}

/// One physically stored file, shared by every owner that uploaded the same bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,
    /// Lowercase hex SHA-256 of the content. Unique across the registry.
    pub content_hash: String,
    /// Object store key the bytes live under.
    pub path: String,
    pub byte_size: u64,
    pub mime_type: String,
    pub file_type: FileType,
    #[serde(default)]
    pub original_name: Option<String>,
    pub reference_count: u64,
    /// Set when `reference_count` drops to zero, cleared when a reference is added.
    #[serde(default)]
    pub orphaned_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FileRecord {
    pub fn state(&self) -> FileState {
        if self.reference_count == 0 {
            FileState::Orphaned
        } else {
            FileState::Active
        }
    }

    /// Whether the record has been orphaned for longer than the window ending at `cutoff`.
    pub fn is_reclaimable(&self, cutoff: DateTime<Utc>) -> bool {
        self.reference_count == 0 && self.orphaned_at.is_some_and(|at| at < cutoff)
    }
}

/// Aggregate registry figures.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStats {
    pub total_files: u64,
    pub total_size: u64,
    pub orphaned_count: u64,
    pub active_count: u64,
}

/// Persisted knobs for the orphan sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceSettings {
    /// Days an orphan must stay before its bytes are reclaimed.
    pub retention_days: u32,
    /// Seconds between background sweeps; 0 disables the sweep.
    pub sweep_interval_secs: u64,
}

impl Default for MaintenanceSettings {
    fn default() -> Self {
        Self {
            retention_days: 7,
            sweep_interval_secs: 3600,
        }
    }
}
