//! Content fingerprints.
//!
//! Files are identified by the SHA-256 of their bytes. The hex digest is the
//! dedup key in the metadata database and also names the stored object, fanned
//! out over two directory levels:
//!
//! ```text
//! sha256/
//! └── ab/
//!     └── cd/
//!         └── abcd1234...  # full 64-char hex digest
//! ```

use std::fmt;

use ring::digest::{digest, SHA256};

const KEY_PREFIX: &str = "sha256";

/// Lowercase hex SHA-256 of a file's bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn compute(data: &[u8]) -> Self {
        Self(hex::encode(digest(&SHA256, data).as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Object store key for content with this hash.
    pub fn object_key(&self) -> String {
        format!("{KEY_PREFIX}/{}/{}/{}", &self.0[..2], &self.0[2..4], self.0)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
