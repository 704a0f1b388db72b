//! JSON document store for connection profiles.
//!
//! The whole profile set is read and written as one document. Writes go to a
//! temporary file in the target directory, are fsynced, and then renamed over
//! the target, so a crash mid-write leaves the previous document intact.

use crate::error::{DbError, DbResult};
use crate::models::ConnectionProfile;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Current on-disk document version.
pub const DOCUMENT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct ProfileDocument {
    version: u32,
    #[serde(default)]
    connections: Vec<ConnectionProfile>,
}

/// File-backed store for the full profile set.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    path: PathBuf,
}

impl ProfileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every stored profile. A missing file is an empty set.
    pub async fn load(&self) -> DbResult<Vec<ConnectionProfile>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No connection document yet");
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(DbError::storage(format!(
                    "Failed to read {}: {}",
                    self.path.display(),
                    e
                )));
            }
        };

        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        let document: ProfileDocument = serde_json::from_str(&content)?;
        if document.version > DOCUMENT_VERSION {
            return Err(DbError::storage(format!(
                "Connection document version {} is newer than supported version {}",
                document.version, DOCUMENT_VERSION
            )));
        }
        Ok(document.connections)
    }

    /// Replace the stored set with `profiles`.
    pub async fn save(&self, profiles: &[ConnectionProfile]) -> DbResult<()> {
        let document = ProfileDocument {
            version: DOCUMENT_VERSION,
            connections: profiles.to_vec(),
        };
        let bytes = serde_json::to_vec_pretty(&document)?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
            .await
            .map_err(|e| DbError::internal(format!("Store writer task failed: {e}")))??;

        debug!(path = %self.path.display(), count = profiles.len(), "Saved connection document");
        Ok(())
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> DbResult<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(tmp.path(), std::fs::Permissions::from_mode(0o600))?;
    }

    tmp.persist(path)
        .map_err(|e| DbError::storage(format!("Failed to replace {}: {}", path.display(), e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ConnectionDraft;

    fn profile(name: &str) -> ConnectionProfile {
        ConnectionDraft::sqlite(name, "/tmp/does-not-matter.db").into_profile()
    }

    #[tokio::test]
    async fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::new(dir.path().join("connections.json"));
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::new(dir.path().join("nested").join("connections.json"));
        let profiles = vec![profile("a"), profile("b")];

        store.save(&profiles).await.unwrap();
        let loaded = store.load().await.unwrap();

        let names: Vec<&str> = loaded.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(loaded[0].id, profiles[0].id);
    }

    #[tokio::test]
    async fn test_document_has_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("connections.json");
        ProfileStore::new(&path).save(&[profile("a")]).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["version"], 1);
        assert_eq!(raw["connections"].as_array().unwrap().len(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_document_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("connections.json");
        ProfileStore::new(&path).save(&[]).await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_malformed_document_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("connections.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = ProfileStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, DbError::Storage { .. }));
    }

    #[test]
    fn test_empty_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("connections.json");
        std::fs::write(&path, "").unwrap();

        let loaded = tokio_test::block_on(ProfileStore::new(&path).load()).unwrap();
        assert!(loaded.is_empty());
    }
}
