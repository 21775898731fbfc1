//! SFTP data types

use serde::{Deserialize, Serialize};

/// Remote directory entry, as produced by listing and walking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFileEntry {
    /// File name (not full path)
    pub name: String,
    /// Full path
    pub path: String,
    /// File type
    pub file_type: FileType,
    /// File size in bytes
    pub size: u64,
    /// Last modified time (Unix timestamp)
    pub modified: i64,
    /// File permissions (octal string, e.g., "755")
    pub permissions: String,
}

impl RemoteFileEntry {
    /// Minimal entry with only a path and a type, as used by walkers
    pub fn new(path: impl Into<String>, file_type: FileType) -> Self {
        let path = path.into();
        let name = path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        Self {
            name,
            path,
            file_type,
            size: 0,
            modified: 0,
            permissions: "000".to_string(),
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    pub fn is_dir(&self) -> bool {
        self.file_type == FileType::Directory
    }
}

/// File type enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileType {
    File,
    Directory,
    Symlink,
    Unknown,
}

/// Outcome published by the reconnect supervisor after each attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconnectOutcome {
    /// A fresh session was installed; `generation` counts installed sessions
    Reconnected { generation: u64 },
    /// The attempt failed and the previous session was left in place
    Failed { error: String },
}

impl ReconnectOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ReconnectOutcome::Reconnected { .. })
    }
}
