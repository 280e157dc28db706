//! Payment receipt files

use std::fmt;
use std::path::Path;

use common::{
    ValidationError,
    validation::{MAX_RECEIPT_BYTES, ReceiptKind, validate_receipt},
};
use reqwest::multipart::Part;

use crate::error::ClientError;

const OCTET_STREAM: &str = "application/octet-stream";

/// A proof-of-payment file ready to upload
#[derive(Clone)]
pub struct ReceiptFile {
    file_name: String,
    content_type: String,
    bytes: Vec<u8>,
}

impl ReceiptFile {
    /// Wrap in-memory content. Without an explicit content type the file
    /// name's extension decides.
    pub fn new(file_name: impl Into<String>, content_type: Option<&str>, bytes: Vec<u8>) -> Self {
        let file_name = file_name.into();
        let content_type = content_type
            .map(str::to_string)
            .or_else(|| ReceiptKind::from_file_name(&file_name).map(|k| k.content_type().to_string()))
            .unwrap_or_else(|| OCTET_STREAM.to_string());

        Self {
            file_name,
            content_type,
            bytes,
        }
    }

    /// Read a receipt from disk. Files over the size limit are refused
    /// before their content is read.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let path = path.as_ref();
        let size = tokio::fs::metadata(path).await?.len();
        if size > MAX_RECEIPT_BYTES as u64 {
            return Err(ValidationError::ReceiptTooLarge {
                size: usize::try_from(size).unwrap_or(usize::MAX),
                limit: MAX_RECEIPT_BYTES,
            }
            .into());
        }

        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "receipt".to_string());

        Ok(Self::new(file_name, None, bytes))
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Check type, size and content signature (JPEG, PNG or PDF, at most
    /// 5 MiB).
    pub fn validate(&self) -> Result<ReceiptKind, ValidationError> {
        validate_receipt(&self.file_name, Some(&self.content_type), &self.bytes)
    }

    pub(crate) fn to_part(&self) -> Result<Part, ClientError> {
        let part = Part::bytes(self.bytes.clone())
            .file_name(self.file_name.clone())
            .mime_str(&self.content_type)?;
        Ok(part)
    }
}

impl fmt::Debug for ReceiptFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReceiptFile")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PDF: &[u8] = b"%PDF-1.4\n%receipt\n";

    #[test]
    fn test_content_type_inferred_from_extension() {
        let receipt = ReceiptFile::new("Bank Slip.PDF", None, PDF.to_vec());
        assert_eq!(receipt.content_type(), "application/pdf");
        assert_eq!(receipt.validate(), Ok(ReceiptKind::Pdf));

        let unknown = ReceiptFile::new("notes.txt", None, b"hello".to_vec());
        assert_eq!(unknown.content_type(), "application/octet-stream");
        assert!(matches!(
            unknown.validate(),
            Err(ValidationError::UnsupportedReceiptType(_))
        ));
    }

    #[tokio::test]
    async fn test_from_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("receipt.pdf");
        tokio::fs::write(&path, PDF).await.unwrap();

        let receipt = ReceiptFile::from_path(&path).await.unwrap();
        assert_eq!(receipt.file_name(), "receipt.pdf");
        assert_eq!(receipt.len(), PDF.len());
        assert!(receipt.validate().is_ok());
    }

    #[tokio::test]
    async fn test_from_path_refuses_oversized_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.png");
        let file = std::fs::File::create(&path).unwrap();
        file.set_len(MAX_RECEIPT_BYTES as u64 + 1).unwrap();

        let err = ReceiptFile::from_path(&path).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Validation(ValidationError::ReceiptTooLarge { .. })
        ));
    }
}
