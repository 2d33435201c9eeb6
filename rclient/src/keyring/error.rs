//! Keyring error types.

/// Error type for local key storage and signing.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum KeyringError {
    /// No key stored under the label.
    #[error("no key labelled {0:?}")]
    NotFound(String),

    /// The password does not open the key.
    #[error("wrong password for key {0:?}")]
    BadPassword(String),

    /// A key is already stored under the label.
    #[error("a key labelled {0:?} already exists")]
    AlreadyExists(String),

    /// Bytes that are not a usable private key.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// A stored key record is unreadable or uses unsupported parameters.
    #[error("corrupt key record: {0}")]
    Corrupt(String),

    /// Signing failed.
    #[error("signing failed: {0}")]
    Signing(String),

    /// I/O error on the keystore file.
    #[error("keystore I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The keystore file is not valid JSON.
    #[error("keystore JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl KeyringError {
    /// Create a not-found error.
    #[must_use]
    pub fn not_found(label: impl Into<String>) -> Self {
        Self::NotFound(label.into())
    }

    /// Create a bad-password error.
    #[must_use]
    pub fn bad_password(label: impl Into<String>) -> Self {
        Self::BadPassword(label.into())
    }

    /// Create an invalid-key error.
    #[must_use]
    pub fn invalid_key(msg: impl Into<String>) -> Self {
        Self::InvalidKey(msg.into())
    }

    /// Create a corrupt-record error.
    #[must_use]
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::Corrupt(msg.into())
    }

    /// Create a signing error.
    #[must_use]
    pub fn signing(msg: impl Into<String>) -> Self {
        Self::Signing(msg.into())
    }
}
