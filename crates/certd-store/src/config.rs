use serde::{Deserialize, Serialize};

/// Name of the lock file in the base directory.
pub const DEFAULT_LOCK_FILE_NAME: &str = "writelock";

/// How an entry is written to disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WriteMode {
    /// Write a temporary file next to the target and rename it into place.
    /// A crash mid-write leaves the previous entry intact.
    Atomic,
    /// Truncate the target and copy the new bytes into it. A crash mid-write
    /// can leave a partially written entry.
    InPlace,
}

impl Default for WriteMode {
    fn default() -> Self {
        Self::Atomic
    }
}

/// Flush strategy for written entries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    /// `fsync` every entry before it becomes visible.
    EveryWrite,
    /// Rely on OS page-cache buffering.
    OsDefault,
}

impl Default for SyncMode {
    fn default() -> Self {
        Self::OsDefault
    }
}

/// Configuration for the file-based backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileBackendConfig {
    pub write_mode: WriteMode,
    pub sync_mode: SyncMode,
    /// File name of the write lock inside the base directory.
    pub lock_file_name: String,
}

impl Default for FileBackendConfig {
    fn default() -> Self {
        Self {
            write_mode: WriteMode::default(),
            sync_mode: SyncMode::default(),
            lock_file_name: DEFAULT_LOCK_FILE_NAME.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = FileBackendConfig::default();
        assert_eq!(c.write_mode, WriteMode::Atomic);
        assert_eq!(c.sync_mode, SyncMode::OsDefault);
        assert_eq!(c.lock_file_name, "writelock");
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let c: FileBackendConfig =
            serde_json::from_str(r#"{ "write_mode": "in-place" }"#).unwrap();
        assert_eq!(c.write_mode, WriteMode::InPlace);
        assert_eq!(c.sync_mode, SyncMode::OsDefault);
        assert_eq!(c.lock_file_name, DEFAULT_LOCK_FILE_NAME);
    }
}
