//! JSON-file backed stores for project and user mappings.
//!
//! Each store is loaded once at startup and kept in memory behind a mutex.
//! Mutations run read-modify-write on a copy inside one critical section and
//! replace the file atomically (temp file + rename) before the in-memory value
//! is swapped, so readers never observe a state that was not persisted.
//!
//! Only one process may own a store file; concurrent processes would race.

use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::mapping::{ProjectMapping, UserMapping};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("store file {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize store: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("store task failed: {0}")]
    Task(String),
}

/// Run a store operation on the blocking pool. Mutations write and sync a
/// file, which must not happen on the runtime thread that serves sessions.
pub async fn offload<R, F>(f: F) -> Result<R, StoreError>
where
    F: FnOnce() -> Result<R, StoreError> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
}

/// A single JSON document on disk with an in-memory copy.
pub struct JsonStore<T> {
    path: PathBuf,
    data: Mutex<T>,
}

impl<T> JsonStore<T>
where
    T: Serialize + DeserializeOwned + Default + Clone,
{
    /// Load the document, creating it with default content when the file is
    /// missing or empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let existing = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        let data = if existing.iter().all(u8::is_ascii_whitespace) {
            let initial = T::default();
            write_atomically(&path, &initial)?;
            debug!(path = %path.display(), "Created empty store file");
            initial
        } else {
            serde_json::from_slice(&existing).map_err(|source| StoreError::Parse {
                path: path.clone(),
                source,
            })?
        };

        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read under the lock.
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.data.lock())
    }

    /// Read-modify-write. The closure works on a copy; the copy is flushed to
    /// disk and only then becomes visible.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R, StoreError> {
        let mut guard = self.data.lock();
        let mut next = guard.clone();
        let out = f(&mut next);
        write_atomically(&self.path, &next)?;
        *guard = next;
        Ok(out)
    }
}

fn write_atomically<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let body = serde_json::to_vec_pretty(value)?;
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(io_err)?;
    tmp.write_all(&body).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}

// ============================================================================
// Project mapping
// ============================================================================

/// Project name -> spreadsheet id, shared by the pipeline and the admin flow.
pub struct ProjectStore {
    inner: JsonStore<ProjectMapping>,
}

impl ProjectStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let inner = JsonStore::<ProjectMapping>::open(path)?;
        let count = inner.read(|m| m.pointname_to_sheetsid.len());
        info!(path = %inner.path().display(), projects = count, "Project mapping loaded");
        Ok(Self { inner })
    }

    pub fn sheet_id(&self, project: &str) -> Option<String> {
        self.inner
            .read(|m| m.pointname_to_sheetsid.get(project).cloned())
    }

    pub fn all(&self) -> BTreeMap<String, String> {
        self.inner.read(|m| m.pointname_to_sheetsid.clone())
    }

    pub fn project_names(&self) -> Vec<String> {
        self.inner
            .read(|m| m.pointname_to_sheetsid.keys().cloned().collect())
    }

    pub fn contains(&self, project: &str) -> bool {
        self.inner
            .read(|m| m.pointname_to_sheetsid.contains_key(project))
    }

    /// Add or replace a mapping and flush it.
    pub fn upsert(&self, project: &str, sheet_id: &str) -> Result<(), StoreError> {
        let previous = self.inner.update(|m| {
            m.pointname_to_sheetsid
                .insert(project.to_string(), sheet_id.to_string())
        })?;
        info!(
            project = project,
            sheet_id = sheet_id,
            replaced = previous.is_some(),
            "Project mapping saved"
        );
        Ok(())
    }

    /// Remove a mapping. Returns false when the project was unknown.
    pub fn remove(&self, project: &str) -> Result<bool, StoreError> {
        if !self.contains(project) {
            warn!(project = project, "Attempt to remove unknown project mapping");
            return Ok(false);
        }
        let removed = self
            .inner
            .update(|m| m.pointname_to_sheetsid.remove(project).is_some())?;
        info!(project = project, "Project mapping removed");
        Ok(removed)
    }
}

// ============================================================================
// User mapping
// ============================================================================

/// Chat user id <-> username.
pub struct UserStore {
    inner: JsonStore<UserMapping>,
}

impl UserStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Ok(Self {
            inner: JsonStore::open(path)?,
        })
    }

    pub fn username(&self, user_id: i64) -> Option<String> {
        self.inner
            .read(|m| m.id_to_username.get(&user_id.to_string()).cloned())
    }

    pub fn user_id(&self, username: &str) -> Option<i64> {
        let raw = self.inner.read(|m| m.username_to_id.get(username).cloned())?;
        match raw.parse() {
            Ok(id) => Some(id),
            Err(_) => {
                warn!(username = username, raw = %raw, "Invalid user id in user mapping");
                None
            }
        }
    }

    /// Record the current username for `user_id`; `None` forgets the user.
    /// Writes only when something changed.
    pub fn update(&self, user_id: i64, username: Option<&str>) -> Result<(), StoreError> {
        let key = user_id.to_string();
        let current = self.inner.read(|m| m.id_to_username.get(&key).cloned());
        if current.as_deref() == username {
            return Ok(());
        }

        self.inner.update(|m| {
            if let Some(old) = m.id_to_username.remove(&key) {
                m.username_to_id.remove(&old);
            }
            if let Some(name) = username {
                m.id_to_username.insert(key.clone(), name.to_string());
                m.username_to_id.insert(name.to_string(), key.clone());
            }
        })?;
        debug!(user_id = user_id, username = ?username, "User mapping updated");
        Ok(())
    }

    pub fn remove(&self, user_id: i64) -> Result<bool, StoreError> {
        if self.username(user_id).is_none() {
            return Ok(false);
        }
        self.update(user_id, None)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn offloaded_updates_are_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user_map.json");
        let store = Arc::new(UserStore::open(&path).unwrap());

        let writer = store.clone();
        offload(move || writer.update(7, Some("petro"))).await.unwrap();
        assert_eq!(store.username(7).as_deref(), Some("petro"));

        let reopened = UserStore::open(&path).unwrap();
        assert_eq!(reopened.user_id("petro"), Some(7));
    }

    #[test]
    fn project_store_creates_file_and_persists_mutations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/pointname_sheetsid.json");

        let store = ProjectStore::open(&path).unwrap();
        assert!(store.project_names().is_empty());
        assert!(path.exists());

        store.upsert("склад_1", "sheet-abc").unwrap();
        store.upsert("объект_альфа", "sheet-def").unwrap();
        store.upsert("склад_1", "sheet-xyz").unwrap();

        let on_disk: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(on_disk["pointname_to_sheetsid"]["склад_1"], "sheet-xyz");

        let reopened = ProjectStore::open(&path).unwrap();
        assert_eq!(reopened.sheet_id("объект_альфа").as_deref(), Some("sheet-def"));
        assert_eq!(reopened.all().len(), 2);
    }

    #[test]
    fn project_store_remove_reports_unknown_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProjectStore::open(dir.path().join("map.json")).unwrap();
        store.upsert("a", "1").unwrap();

        assert!(store.remove("a").unwrap());
        assert!(!store.remove("a").unwrap());
        assert_eq!(store.sheet_id("a"), None);
    }

    #[test]
    fn malformed_store_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(matches!(
            ProjectStore::open(&path),
            Err(StoreError::Parse { .. })
        ));
    }

    #[test]
    fn empty_store_file_is_initialised() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.json");
        std::fs::write(&path, "  \n").unwrap();

        let store = ProjectStore::open(&path).unwrap();
        assert!(store.all().is_empty());
    }

    #[test]
    fn user_store_keeps_both_directions_in_sync() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user_map.json");
        let store = UserStore::open(&path).unwrap();

        store.update(12345, Some("testuser1")).unwrap();
        store.update(67890, Some("testuser2")).unwrap();
        assert_eq!(store.user_id("testuser2"), Some(67890));

        store.update(12345, Some("testuser1_updated")).unwrap();
        assert_eq!(store.user_id("testuser1"), None);
        assert_eq!(store.user_id("testuser1_updated"), Some(12345));
        assert_eq!(store.username(12345).as_deref(), Some("testuser1_updated"));

        assert!(store.remove(67890).unwrap());
        assert!(!store.remove(67890).unwrap());
        assert_eq!(store.username(67890), None);

        let reopened = UserStore::open(&path).unwrap();
        assert_eq!(reopened.username(12345).as_deref(), Some("testuser1_updated"));
        assert_eq!(reopened.user_id("testuser2"), None);
    }
}
