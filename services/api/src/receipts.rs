//! Payment receipt storage on local disk

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::Result;
use common::validation::ReceiptKind;
use tracing::{info, warn};
use uuid::Uuid;

/// Stores receipts as `<root>/<user id>/<random id>.<ext>`
#[derive(Debug, Clone)]
pub struct ReceiptStore {
    root: PathBuf,
}

impl ReceiptStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// # Environment Variables
    /// - `RECEIPT_DIR`: Receipt directory (default: "./data/receipts")
    pub fn from_env() -> Self {
        let root = std::env::var("RECEIPT_DIR").unwrap_or_else(|_| "./data/receipts".to_string());
        Self::new(root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write an already validated receipt and return its storage key.
    pub async fn save(&self, user_id: Uuid, kind: ReceiptKind, bytes: &[u8]) -> Result<String> {
        let key = format!("{}/{}.{}", user_id, Uuid::new_v4(), kind.extension());
        let path = self.root.join(&key);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;

        info!("Stored {} byte receipt as {}", bytes.len(), key);
        Ok(key)
    }

    pub async fn read(&self, key: &str) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(self.path_for(key)?).await?)
    }

    /// Delete a stored receipt. A missing file is not an error.
    pub async fn remove(&self, key: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path_for(key)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("Receipt {} was already gone", key);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        if relative.is_absolute()
            || relative
                .components()
                .any(|c| !matches!(c, std::path::Component::Normal(_)))
        {
            anyhow::bail!("Invalid receipt key: {}", key);
        }
        Ok(self.root.join(relative))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_save_read_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReceiptStore::new(dir.path());
        let user_id = Uuid::new_v4();

        let key = store
            .save(user_id, ReceiptKind::Pdf, b"%PDF-1.7 receipt")
            .await
            .unwrap();

        assert!(key.starts_with(&user_id.to_string()));
        assert!(key.ends_with(".pdf"));
        assert_eq!(store.read(&key).await.unwrap(), b"%PDF-1.7 receipt");

        assert_ok!(store.remove(&key).await);
        assert_err!(store.read(&key).await);
        assert_ok!(store.remove(&key).await);
    }

    #[tokio::test]
    async fn test_rejects_keys_outside_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReceiptStore::new(dir.path());

        assert_err!(store.read("../etc/passwd").await);
        assert_err!(store.remove("/etc/passwd").await);
    }
}
