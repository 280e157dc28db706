//! Token persistence
//!
//! A store keeps at most one session. [`FileTokenStore`] writes the three
//! values (`access_token`, `refresh_token`, `expires_at`) as a small JSON
//! document; a missing or unreadable document loads as "no session".

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::warn;

use crate::{error::ClientError, session::Session};

/// Where the session survives restarts
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Result<Option<Session>, ClientError>;
    fn save(&self, session: &Session) -> Result<(), ClientError>;
    fn clear(&self) -> Result<(), ClientError>;
}

/// Process-local store; the session dies with the process.
#[derive(Default)]
pub struct MemoryTokenStore {
    session: Mutex<Option<Session>>,
}

impl MemoryTokenStore {
    fn slot(&self) -> Result<std::sync::MutexGuard<'_, Option<Session>>, ClientError> {
        self.session
            .lock()
            .map_err(|_| io::Error::other("token store lock poisoned").into())
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<Session>, ClientError> {
        Ok(self.slot()?.clone())
    }

    fn save(&self, session: &Session) -> Result<(), ClientError> {
        *self.slot()? = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), ClientError> {
        *self.slot()? = None;
        Ok(())
    }
}

/// JSON file store
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Option<Session>, ClientError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str::<Session>(&raw) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                warn!(
                    "Ignoring unreadable token file {}: {}",
                    self.path.display(),
                    e
                );
                Ok(None)
            }
        }
    }

    fn save(&self, session: &Session) -> Result<(), ClientError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }

        // Write next to the target and rename so a crash never leaves half a file.
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(session)?)?;
        restrict_permissions(&tmp)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), ClientError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tokio_test::assert_ok;

    fn session() -> Session {
        Session {
            access_token: "access-1".to_string(),
            refresh_token: "refresh-1".to_string(),
            expires_at: Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryTokenStore::default();
        assert!(store.load().unwrap().is_none());

        store.save(&session()).unwrap();
        assert_eq!(store.load().unwrap(), Some(session()));

        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_file_store_persists_three_string_values() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("nested").join("session.json"));

        store.save(&session()).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        let object = raw.as_object().unwrap();
        assert_eq!(object.len(), 3);
        assert_eq!(object["access_token"], "access-1");
        assert_eq!(object["refresh_token"], "refresh-1");
        assert!(object["expires_at"].as_str().unwrap().starts_with("2026-10-16T12:00:00"));

        let reopened = FileTokenStore::new(store.path());
        assert_eq!(reopened.load().unwrap(), Some(session()));
    }

    #[test]
    fn test_file_store_clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("session.json"));

        assert_ok!(store.clear());
        store.save(&session()).unwrap();
        assert_ok!(store.clear());
        assert_ok!(store.clear());
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_corrupt_file_loads_as_no_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = FileTokenStore::new(&path);
        assert!(store.load().unwrap().is_none());
    }
}
