//! Error types for kmsenv operations.

use thiserror::Error;

/// Result type alias using [`KmsEnvError`].
pub type Result<T> = std::result::Result<T, KmsEnvError>;

/// Errors that can occur while resolving decryptors or decrypting config values.
///
/// Errors reported by a [`KmsClient`](crate::KmsClient) are returned to the caller
/// of [`decrypt`](crate::decrypt) as-is; nothing in this crate retries or recovers.
#[derive(Debug, Error)]
pub enum KmsEnvError {
    /// Ciphertext in a config value is not valid base64.
    #[error("invalid base64 ciphertext: {0}")]
    InvalidCiphertext(#[from] base64::DecodeError),

    /// Decrypted plaintext is not valid UTF-8.
    #[error("decrypted plaintext is not valid UTF-8: {0}")]
    InvalidPlaintext(#[from] std::string::FromUtf8Error),

    /// The KMS response carried no plaintext.
    #[error("KMS response for {0} contained no plaintext")]
    EmptyPlaintext(String),

    /// The crypto key (or its key ring) does not exist.
    #[error("crypto key not found: {0}")]
    NotFound(String),

    /// Caller is not allowed to use the crypto key.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The KMS client rejected a decrypt call.
    #[error("{key_path}: decrypt failed: {source}")]
    Decrypt {
        /// Full resource name of the crypto key
        key_path: String,
        /// Underlying client error
        #[source]
        source: anyhow::Error,
    },

    /// No KMS client could be constructed.
    #[error("no KMS client available: {0}")]
    ClientUnavailable(String),

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error (catch-all).
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl KmsEnvError {
    /// Creates a decrypt error carrying the key path that was used.
    ///
    /// # Example
    ///
    /// ```
    /// use kmsenv::KmsEnvError;
    ///
    /// let err = KmsEnvError::decrypt_failed(
    ///     "projects/p/locations/global/keyRings/r/cryptoKeys/k",
    ///     anyhow::anyhow!("ciphertext is corrupted"),
    /// );
    ///
    /// assert_eq!(
    ///     err.to_string(),
    ///     "projects/p/locations/global/keyRings/r/cryptoKeys/k: decrypt failed: ciphertext is corrupted"
    /// );
    /// ```
    pub fn decrypt_failed(key_path: impl Into<String>, err: impl Into<anyhow::Error>) -> Self {
        Self::Decrypt {
            key_path: key_path.into(),
            source: err.into(),
        }
    }
}
