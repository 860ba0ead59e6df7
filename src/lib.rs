//! Kmsenv - Decrypt KMS-encrypted values in configuration.
//!
//! Kmsenv walks a flat environment map or a nested configuration tree,
//! decrypts every value marked as encrypted with a key-management service,
//! and returns a new configuration with plaintext in place of ciphertext.
//!
//! # Marking values
//!
//! - A string whose key ends in `encrypted` (any case, optional leading `_`)
//!   is base64 ciphertext. `PASSWORD_ENCRYPTED` becomes `PASSWORD`,
//!   `passwordencrypted` becomes `password`.
//! - A nested map whose only key is `encrypted` collapses into the decrypted
//!   value: `{"password": {"encrypted": "..."}}` becomes `{"password": "..."}`.
//! - Everything else is copied unchanged.
//!
//! # Quick Start
//!
//! ```no_run
//! #[tokio::main]
//! async fn main() -> kmsenv::Result<()> {
//!     // DATABASE_PASSWORD_ENCRYPTED=CiQA... becomes DATABASE_PASSWORD=...
//!     let env = kmsenv::decrypt_process_env().await?;
//!
//!     if let Some(password) = env.get("DATABASE_PASSWORD").and_then(|v| v.as_str()) {
//!         println!("password has {} characters", password.len());
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Key selection
//!
//! | Variable | Purpose | Default |
//! |----------|---------|---------|
//! | `KMS_PROJECT_ID` | Project owning the key ring | `PROJECT_ID`, `GOOGLE_CLOUD_PROJECT`, `GCLOUD_PROJECT`, `GCP_PROJECT` |
//! | `KMS_LOCATION` | Key ring location | `global` |
//! | `KMS_KEY_RING` | Key ring name | |
//! | `KMS_CRYPTO_KEY` | Crypto key name | |
//!
//! Pass a [`KmsConfig`] to override any of them per call.
//!
//! # Feature Flags
//!
//! | Feature | Client |
//! |---------|--------|
//! | `mock` (default) | In-memory [`clients::mock::MockKmsClient`] for tests |
//! | `gcp` | Google Cloud KMS through Application Default Credentials |
//!
//! ```toml
//! [dependencies]
//! kmsenv = { version = "0.1", features = ["gcp"] }
//! ```

pub mod clients;
pub mod config;
pub mod env;
pub mod error;
pub mod factory;
pub mod kms;
pub mod provider;
pub mod value;
pub mod walker;

pub use config::{KmsConfig, ResolvedKmsConfig};
pub use error::{KmsEnvError, Result};
pub use kms::{DecryptRequest, DecryptResponse, Decryptor, KmsClient};
pub use provider::DecryptorProvider;
pub use value::{Config, Value};

/// Decrypts every marked value in `config`.
///
/// With `config` set to `None` the process environment is decrypted instead
/// (see [`env::snapshot`]). `kms_config` selects the crypto key; `None` takes
/// everything from the environment.
///
/// The input is never modified. A tree without marked values is returned as a
/// copy without creating a KMS client.
///
/// # Errors
///
/// The first failed decryption fails the whole call; no partial result is
/// returned.
///
/// # Example
///
/// ```no_run
/// use kmsenv::{KmsConfig, Value};
/// use serde_json::json;
///
/// #[tokio::main]
/// async fn main() -> kmsenv::Result<()> {
///     let config = kmsenv::value::from_json(json!({
///         "postgres": {
///             "user": "alice",
///             "password": { "encrypted": "CiQAk2p..." }
///         }
///     }))?;
///
///     let kms = KmsConfig::new().with_ring("app").with_key("config");
///     let decrypted = kmsenv::decrypt(Some(&config), Some(&kms)).await?;
///
///     let postgres = decrypted["postgres"].as_map().unwrap();
///     assert!(matches!(postgres["password"], Value::String(_)));
///     Ok(())
/// }
/// ```
pub async fn decrypt(config: Option<&Config>, kms_config: Option<&KmsConfig>) -> Result<Config> {
    let provider = provider::global();
    match config {
        Some(config) => provider.decrypt(config, kms_config).await,
        None => provider.decrypt(&env::snapshot(), kms_config).await,
    }
}

/// Decrypts the process environment with the default crypto key.
pub async fn decrypt_process_env() -> Result<Config> {
    provider::global().decrypt_process_env().await
}

/// Returns the process-wide decryptor for `kms_config`.
///
/// Equal configurations always return the same [`Decryptor`] instance.
pub fn get_decryptor(kms_config: Option<&KmsConfig>) -> Result<Decryptor> {
    provider::global().get_decryptor(kms_config)
}
