use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where songbook keeps its database and backups unless told otherwise.
pub(crate) fn data_dir() -> PathBuf {
    ProjectDirs::from("", "", "songbook")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Root directory of the karaoke library.
    pub root: Option<PathBuf>,
    /// Index dot-files and the contents of dot-directories.
    pub hidden_files: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}
impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: data_dir().join("songbook.db") }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    pub directory: PathBuf,
}
impl Default for BackupConfig {
    fn default() -> Self {
        Self { directory: data_dir().join("backups") }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Bytes read from the start of each file for its fingerprint.
    pub fingerprint_bytes: usize,
    /// Changes committed per transaction.
    pub batch_size: usize,
    /// Queue priority given to new and changed entries.
    pub default_priority: i64,
}
impl Default for SyncConfig {
    fn default() -> Self {
        Self { fingerprint_bytes: 16 * 1024, batch_size: 500, default_priority: 0 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    pub max_calls_per_minute: u32,
    pub retry_ceiling: u32,
    pub idle_poll_seconds: u64,
}
impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self { max_calls_per_minute: 60, retry_ceiling: 3, idle_poll_seconds: 5 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter directive, e.g. `info` or `songbook_library=debug`.
    /// `RUST_LOG` takes precedence.
    pub level: String,
}
impl Default for LogConfig {
    fn default() -> Self {
        Self { level: "info".to_string() }
    }
}
