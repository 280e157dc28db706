//! Input validation utilities
//!
//! Account fields are checked on registration and profile edits; receipt
//! files are checked both by the client before upload and by the API on
//! receipt.

use regex::Regex;
use std::sync::OnceLock;

use crate::error::ValidationError;

/// Largest accepted receipt upload: 5 MiB.
pub const MAX_RECEIPT_BYTES: usize = 5 * 1024 * 1024;

/// Validate email
pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if email.is_empty() {
        return Err(ValidationError::MissingField("email"));
    }

    if email.len() > 254 {
        return Err(ValidationError::invalid(
            "email",
            "must be at most 254 characters long",
        ));
    }

    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = EMAIL_REGEX.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
            .expect("Failed to compile email regex")
    });

    if !regex.is_match(email) {
        return Err(ValidationError::invalid("email", "invalid email format"));
    }

    Ok(())
}

/// Validate password
pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.is_empty() {
        return Err(ValidationError::MissingField("password"));
    }

    if password.len() < 8 {
        return Err(ValidationError::invalid(
            "password",
            "must be at least 8 characters long",
        ));
    }

    if password.len() > 128 {
        return Err(ValidationError::invalid(
            "password",
            "must be at most 128 characters long",
        ));
    }

    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());

    if !has_upper || !has_lower || !has_digit {
        return Err(ValidationError::invalid(
            "password",
            "must contain an uppercase letter, a lowercase letter and a digit",
        ));
    }

    Ok(())
}

/// Validate full name
pub fn validate_full_name(full_name: &str) -> Result<(), ValidationError> {
    let trimmed = full_name.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingField("full_name"));
    }

    if trimmed.chars().count() > 100 {
        return Err(ValidationError::invalid(
            "full_name",
            "must be at most 100 characters long",
        ));
    }

    Ok(())
}

/// Validate a WhatsApp number in international format, e.g. `+8801712345678`
pub fn validate_whatsapp_number(number: &str) -> Result<(), ValidationError> {
    static PHONE_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = PHONE_REGEX
        .get_or_init(|| Regex::new(r"^\+?[0-9]{8,15}$").expect("Failed to compile phone regex"));

    let compact: String = number
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();

    if !regex.is_match(&compact) {
        return Err(ValidationError::invalid(
            "whatsapp_number",
            "must be 8 to 15 digits, optionally prefixed with +",
        ));
    }

    Ok(())
}

/// Validate the reason an admin gives when rejecting an enrollment
pub fn validate_rejection_reason(reason: &str) -> Result<(), ValidationError> {
    let trimmed = reason.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingField("reason"));
    }

    if trimmed.chars().count() > 500 {
        return Err(ValidationError::invalid(
            "reason",
            "must be at most 500 characters long",
        ));
    }

    Ok(())
}

/// Accepted payment receipt formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptKind {
    Jpeg,
    Png,
    Pdf,
}

impl ReceiptKind {
    /// Recognize a MIME type, ignoring parameters such as `; charset=...`.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            "image/jpeg" | "image/jpg" => Some(ReceiptKind::Jpeg),
            "image/png" => Some(ReceiptKind::Png),
            "application/pdf" => Some(ReceiptKind::Pdf),
            _ => None,
        }
    }

    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let (_, extension) = file_name.rsplit_once('.')?;
        match extension.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(ReceiptKind::Jpeg),
            "png" => Some(ReceiptKind::Png),
            "pdf" => Some(ReceiptKind::Pdf),
            _ => None,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ReceiptKind::Jpeg => "image/jpeg",
            ReceiptKind::Png => "image/png",
            ReceiptKind::Pdf => "application/pdf",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ReceiptKind::Jpeg => "jpg",
            ReceiptKind::Png => "png",
            ReceiptKind::Pdf => "pdf",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ReceiptKind::Jpeg => "a JPEG image",
            ReceiptKind::Png => "a PNG image",
            ReceiptKind::Pdf => "a PDF document",
        }
    }

    /// Check the leading magic bytes of the file.
    pub fn matches_signature(&self, bytes: &[u8]) -> bool {
        match self {
            ReceiptKind::Jpeg => bytes.starts_with(&[0xFF, 0xD8, 0xFF]),
            ReceiptKind::Png => bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]),
            ReceiptKind::Pdf => bytes.starts_with(b"%PDF-"),
        }
    }
}

/// Validate a payment receipt upload
///
/// The declared content type wins when it is a recognized one. A missing or
/// generic (`application/octet-stream`) content type falls back to the file
/// extension. The content must then be non-empty, at most
/// [`MAX_RECEIPT_BYTES`], and start with the signature of its kind.
pub fn validate_receipt(
    file_name: &str,
    content_type: Option<&str>,
    bytes: &[u8],
) -> Result<ReceiptKind, ValidationError> {
    let kind = match content_type {
        Some(ct) if !ct.trim().eq_ignore_ascii_case("application/octet-stream") => {
            ReceiptKind::from_content_type(ct)
                .ok_or_else(|| ValidationError::UnsupportedReceiptType(ct.to_string()))?
        }
        _ => ReceiptKind::from_file_name(file_name)
            .ok_or_else(|| ValidationError::UnsupportedReceiptType(file_name.to_string()))?,
    };

    if bytes.is_empty() {
        return Err(ValidationError::EmptyReceipt);
    }

    if bytes.len() > MAX_RECEIPT_BYTES {
        return Err(ValidationError::ReceiptTooLarge {
            size: bytes.len(),
            limit: MAX_RECEIPT_BYTES,
        });
    }

    if !kind.matches_signature(bytes) {
        return Err(ValidationError::ReceiptContentMismatch(kind.label()));
    }

    Ok(kind)
}
