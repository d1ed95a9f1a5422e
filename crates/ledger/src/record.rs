//! The persisted configuration record.
//!
//! A single JSON object holding credentials, upload settings and the
//! fingerprint set. Missing fields default and unknown fields are
//! ignored, so records written by older builds keep loading.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::LedgerError;

/// Default number of concurrent transfers.
pub const DEFAULT_THREAD_COUNT: u32 = 4;

/// The whole persisted record. Treated as a single atomically-replaced
/// value: readers and writers always move the complete record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploaderConfig {
    /// Bot token used to authenticate against the delivery API.
    #[serde(default)]
    pub token: String,

    /// Destination identifier documents are delivered to.
    #[serde(default)]
    pub user_id: String,

    /// Directory selected for upload.
    #[serde(default)]
    pub selected_directory: String,

    /// Concurrent transfer count.
    #[serde(default = "default_thread_count")]
    pub thread_count: u32,

    /// Lowercase hex fingerprints of content already delivered.
    #[serde(default)]
    pub hash_string: Vec<String>,
}

fn default_thread_count() -> u32 {
    DEFAULT_THREAD_COUNT
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            user_id: String::new(),
            selected_directory: String::new(),
            thread_count: DEFAULT_THREAD_COUNT,
            hash_string: Vec::new(),
        }
    }
}

impl UploaderConfig {
    /// Reads the record at `path`, or returns defaults when the file
    /// does not exist yet (first run).
    pub fn load(path: &Path) -> Result<Self, LedgerError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Writes the whole record to `path`, creating parent directories
    /// as needed.
    pub fn save(&self, path: &Path) -> Result<(), LedgerError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_loads_defaults() {
        let dir = TempDir::new().unwrap();
        let config = UploaderConfig::load(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, UploaderConfig::default());
        assert_eq!(config.thread_count, DEFAULT_THREAD_COUNT);
        assert!(config.hash_string.is_empty());
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");

        let config = UploaderConfig {
            token: "123:abc".into(),
            user_id: "42".into(),
            selected_directory: "/data/photos".into(),
            thread_count: 8,
            hash_string: vec!["d41d8cd98f00b204e9800998ecf8427e".into()],
        };
        config.save(&path).unwrap();

        let loaded = UploaderConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn missing_fields_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "token": "123:abc" }"#).unwrap();

        let config = UploaderConfig::load(&path).unwrap();
        assert_eq!(config.token, "123:abc");
        assert!(config.user_id.is_empty());
        assert_eq!(config.thread_count, DEFAULT_THREAD_COUNT);
        assert!(config.hash_string.is_empty());
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{ "user_id": "7", "theme": "dark", "window": { "w": 500 } }"#,
        )
        .unwrap();

        let config = UploaderConfig::load(&path).unwrap();
        assert_eq!(config.user_id, "7");
    }

    #[test]
    fn save_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("deep").join("config.json");
        UploaderConfig::default().save(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn corrupt_record_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json at all {").unwrap();

        let result = UploaderConfig::load(&path);
        assert!(matches!(result, Err(LedgerError::Encoding(_))));
    }
}
