//! Error types for RidiSync
//!
//! This module defines error types using thiserror for ergonomic error handling.
//! Errors are categorized by domain (crypto, vault, file, API, etc.) so that
//! batch callers can decide whether a failure is terminal for one book only
//! or for the whole run.
//!
//! ## Categories
//!
//! ### Book decryption (terminal for the book being processed)
//! - `MissingFile` - auxiliary (`.dat`) or payload file absent
//! - `InvalidPadding` - PKCS7 check failed
//! - `ShortPlaintext` - key record below the minimum length
//! - `InvalidKeyLength` - derived key is not 16 bytes
//! - `UnsupportedFormat` - no `.epub`/`.pdf` payload in the book folder
//! - `DecryptionFailed` - malformed ciphertext layout (IV/block size)
//!
//! ### Vault (degrades, never propagated past the caller boundary)
//! - `VaultUnavailable` - keychain or settings file unreachable or undecryptable
//!
//! ### Metadata (always non-fatal)
//! - `MetadataUnavailable` - title or cover could not be recovered
//!
//! ### File/Library, API, Configuration
//! - `FileNotFound`, `FileAlreadyExists`, `NoBooksFound`, `PlatformNotSupported`
//! - `AuthenticationFailed`, `NetworkError`, `InvalidApiResponse`
//! - `ConfigurationError`

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our RidiError type
pub type Result<T> = std::result::Result<T, RidiError>;

/// Main error type for RidiSync
#[derive(Error, Debug)]
pub enum RidiError {
    // ===== Crypto/DRM Errors =====

    /// Auxiliary or payload file does not exist
    #[error("Missing {kind} file: {}", path.display())]
    MissingFile {
        /// Which file of the book ("data" or "book")
        kind: &'static str,
        path: PathBuf,
    },

    /// PKCS7 padding is malformed
    #[error("Invalid PKCS7 padding")]
    InvalidPadding,

    /// Decrypted key record is shorter than the vendor layout requires
    #[error(".dat plaintext too short: {len} bytes")]
    ShortPlaintext { len: usize },

    /// Derived key does not have the required length
    #[error("Invalid session key length: {len} bytes")]
    InvalidKeyLength { len: usize },

    /// Book folder has no recognized payload file
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Ciphertext layout is unusable (missing IV, partial block)
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    // ===== Vault Errors =====

    /// Keychain or encrypted settings store unreachable or undecryptable
    #[error("Vault unavailable: {0}")]
    VaultUnavailable(String),

    // ===== Metadata Errors =====

    /// Title or cover could not be recovered
    #[error("Metadata unavailable: {0}")]
    MetadataUnavailable(String),

    // ===== File/Library Errors =====

    /// File or directory not found
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// Every collision-free name candidate is taken
    #[error("File already exists: {0}")]
    FileAlreadyExists(String),

    /// Library scan or filter produced no books
    #[error("No books found: {0}")]
    NoBooksFound(String),

    /// Platform-specific operation not supported
    #[error("Platform not supported: {0}")]
    PlatformNotSupported(String),

    // ===== API Errors =====

    /// Token refresh or device lookup rejected
    #[error("API authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Network connectivity error
    #[error("Network error: {message}")]
    NetworkError {
        message: String,
        /// Whether this error might be transient
        is_transient: bool,
    },

    /// API returned invalid or unexpected response format
    #[error("Invalid API response: {0}")]
    InvalidApiResponse(String),

    // ===== Configuration Errors =====

    /// Configuration file error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    // ===== Runtime Errors =====

    /// A blocking worker panicked or was cancelled
    #[error("Background task failed: {0}")]
    TaskFailed(String),

    // ===== External Library Errors =====

    /// HTTP client error from reqwest
    #[error("HTTP client error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<tokio::task::JoinError> for RidiError {
    fn from(err: tokio::task::JoinError) -> Self {
        RidiError::TaskFailed(err.to_string())
    }
}

// Helper methods for creating common errors
impl RidiError {
    /// Create a MissingFile error for the auxiliary `.dat` file
    pub fn missing_data<P: Into<PathBuf>>(path: P) -> Self {
        RidiError::MissingFile {
            kind: "data",
            path: path.into(),
        }
    }

    /// Create a MissingFile error for the payload file
    pub fn missing_book<P: Into<PathBuf>>(path: P) -> Self {
        RidiError::MissingFile {
            kind: "book",
            path: path.into(),
        }
    }

    /// Create a NetworkError
    pub fn network_error<S: Into<String>>(message: S, is_transient: bool) -> Self {
        RidiError::NetworkError {
            message: message.into(),
            is_transient,
        }
    }

    /// Check if error is related to DRM/crypto operations
    ///
    /// These abort the export of a single book but never a batch.
    pub fn is_crypto_error(&self) -> bool {
        matches!(
            self,
            RidiError::InvalidPadding
                | RidiError::ShortPlaintext { .. }
                | RidiError::InvalidKeyLength { .. }
                | RidiError::DecryptionFailed(_)
        )
    }

    /// Check if error is related to file/disk operations
    pub fn is_file_error(&self) -> bool {
        matches!(
            self,
            RidiError::MissingFile { .. }
                | RidiError::FileNotFound(_)
                | RidiError::FileAlreadyExists(_)
                | RidiError::UnsupportedFormat(_)
                | RidiError::IoError(_)
        )
    }

    /// Get user-friendly error message suitable for display
    pub fn user_message(&self) -> String {
        match self {
            RidiError::MissingFile { kind: "data", path } => format!(
                "Key file missing ({}). Open the book once in the RIDI app to download it.",
                path.display()
            ),
            RidiError::InvalidPadding | RidiError::ShortPlaintext { .. } => {
                "Could not decrypt the book key. The selected device may not match this library."
                    .to_string()
            }
            RidiError::VaultUnavailable(_) => {
                "Could not read the RIDI app login state. Please log in manually.".to_string()
            }
            RidiError::PlatformNotSupported(what) => {
                format!("{} is only supported on Windows and macOS.", what)
            }
            _ => self.to_string(),
        }
    }
}
