//! Recursive config decryption.
//!
//! Entries are handled by value shape:
//!
//! - nested maps are decrypted recursively, and a map whose only key is
//!   `encrypted` collapses into its decrypted value;
//! - strings under a key ending in `encrypted` (any case, optional leading
//!   `_`) are decrypted and stored under the key without that suffix;
//! - everything else is copied.
//!
//! Siblings are decrypted concurrently. The decryptor is requested from the
//! provider only when the first marked entry is reached, so a tree without
//! marked entries never builds a KMS client.

use crate::provider::DecryptorProvider;
use crate::value::{Config, Value};
use crate::{Decryptor, KmsConfig, Result};
use futures::future::{try_join_all, BoxFuture, FutureExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::OnceCell;
use tracing::debug;

const SUFFIX: &str = "encrypted";

/// Key of the single entry in a map that collapses into its parent key.
pub const SENTINEL_KEY: &str = "encrypted";

/// Strips the `encrypted` suffix (case-insensitive, with an optional preceding
/// underscore) from `key`.
///
/// Returns `None` when `key` is not marked as encrypted.
///
/// ```
/// use kmsenv::walker::strip_encrypted_suffix;
///
/// assert_eq!(strip_encrypted_suffix("PASSWORD_ENCRYPTED"), Some("PASSWORD"));
/// assert_eq!(strip_encrypted_suffix("passwordencrypted"), Some("password"));
/// assert_eq!(strip_encrypted_suffix("Api_Key_Encrypted"), Some("Api_Key"));
/// assert_eq!(strip_encrypted_suffix("ENCRYPTED_PASSWORD"), None);
/// ```
pub fn strip_encrypted_suffix(key: &str) -> Option<&str> {
    let split = key.len().checked_sub(SUFFIX.len())?;
    if !key.is_char_boundary(split) || !key[split..].eq_ignore_ascii_case(SUFFIX) {
        return None;
    }

    let prefix = &key[..split];
    Some(prefix.strip_suffix('_').unwrap_or(prefix))
}

/// Decryptor shared by one walk, requested on first use.
struct LazyDecryptor<'a> {
    provider: &'a DecryptorProvider,
    kms_config: Option<&'a KmsConfig>,
    cell: OnceCell<Decryptor>,
    decrypted: AtomicUsize,
}

impl LazyDecryptor<'_> {
    async fn decrypt(&self, ciphertext: &str) -> Result<String> {
        let decryptor = self
            .cell
            .get_or_try_init(|| async { self.provider.get_decryptor(self.kms_config) })
            .await?;

        let plaintext = decryptor.decrypt(ciphertext).await?;
        self.decrypted.fetch_add(1, Ordering::Relaxed);
        Ok(plaintext)
    }
}

/// Decrypts `config` with decryptors from `provider`.
pub(crate) async fn decrypt_tree(
    provider: &DecryptorProvider,
    config: &Config,
    kms_config: Option<&KmsConfig>,
) -> Result<Config> {
    let lazy = LazyDecryptor {
        provider,
        kms_config,
        cell: OnceCell::new(),
        decrypted: AtomicUsize::new(0),
    };

    let output = walk(&lazy, config).await?;

    debug!(
        entries = config.len(),
        decrypted = lazy.decrypted.load(Ordering::Relaxed),
        "decrypted config"
    );
    Ok(output)
}

fn walk<'a>(lazy: &'a LazyDecryptor<'a>, config: &'a Config) -> BoxFuture<'a, Result<Config>> {
    async move {
        let entries = try_join_all(
            config
                .iter()
                .map(|(key, value)| decrypt_entry(lazy, key, value)),
        )
        .await?;

        Ok(entries.into_iter().collect())
    }
    .boxed()
}

async fn decrypt_entry<'a>(
    lazy: &'a LazyDecryptor<'a>,
    key: &'a str,
    value: &'a Value,
) -> Result<(String, Value)> {
    match value {
        Value::Map(nested) => {
            let mut decrypted = walk(lazy, nested).await?;

            if nested.len() == 1 && nested.contains_key(SENTINEL_KEY) {
                if let Some((_, inner)) = decrypted.pop_first() {
                    return Ok((key.to_string(), inner));
                }
            }

            Ok((key.to_string(), Value::Map(decrypted)))
        }
        Value::String(ciphertext) => match strip_encrypted_suffix(key) {
            Some(name) => {
                let plaintext = lazy.decrypt(ciphertext).await?;
                Ok((name.to_string(), Value::String(plaintext)))
            }
            None => Ok((key.to_string(), value.clone())),
        },
        Value::Other(_) => Ok((key.to_string(), value.clone())),
    }
}


#[cfg(all(test, feature = "mock"))]
mod walk_tests {
    use super::*;
    use crate::clients::mock::MockKmsClient;
    use crate::value::from_json;
    use crate::{KmsClient, KmsEnvError};
    use base64::Engine;
    use serde_json::json;
    use std::sync::Arc;

    fn base64(value: &str) -> String {
        base64::engine::general_purpose::STANDARD.encode(value)
    }

    fn provider_with(client: Arc<MockKmsClient>) -> DecryptorProvider {
        DecryptorProvider::new(Arc::new(move || Ok(client.clone() as Arc<dyn KmsClient>)))
            .with_env(Arc::new(|_: &str| None::<String>))
    }

    #[tokio::test]
    async fn test_passthrough_never_builds_decryptor() {
        let client = Arc::new(MockKmsClient::new());
        let provider = provider_with(client.clone());
        let config = from_json(json!({ "USER": "alice", "FOO": "bar" })).unwrap();

        let output = provider.decrypt(&config, None).await.unwrap();

        assert_eq!(output, config);
        assert_eq!(client.key_path_calls(), 0);
        assert_eq!(client.decrypt_calls(), 0);
    }

    #[tokio::test]
    async fn test_renames_and_decrypts_flat_entries() {
        let client = Arc::new(MockKmsClient::new());
        let provider = provider_with(client.clone());
        let config = from_json(json!({
            "USER": "alice",
            "PASSWORD_ENCRYPTED": base64("hunter2"),
            "API_KEY_ENCRYPTED": base64("sk-123"),
        }))
        .unwrap();

        let output = provider.decrypt(&config, None).await.unwrap();

        assert_eq!(
            output,
            from_json(json!({ "USER": "alice", "PASSWORD": "hunter2", "API_KEY": "sk-123" }))
                .unwrap()
        );
        assert_eq!(client.key_path_calls(), 1);
        assert_eq!(client.decrypt_calls(), 2);
    }

    #[tokio::test]
    async fn test_flattens_sentinel_map() {
        let client = Arc::new(MockKmsClient::new().with_plaintext("secret-text"));
        let provider = provider_with(client);
        let config = from_json(json!({
            "password": { "encrypted": base64("secret-text") }
        }))
        .unwrap();

        let output = provider.decrypt(&config, None).await.unwrap();

        assert_eq!(output, from_json(json!({ "password": "secret-text" })).unwrap());
    }

    #[tokio::test]
    async fn test_map_with_sentinel_and_siblings_stays_nested() {
        let client = Arc::new(MockKmsClient::new());
        let provider = provider_with(client);
        let config = from_json(json!({
            "password": { "encrypted": base64("pw"), "rotated": "2024-01-01" }
        }))
        .unwrap();

        let output = provider.decrypt(&config, None).await.unwrap();

        assert_eq!(
            output,
            from_json(json!({ "password": { "": "pw", "rotated": "2024-01-01" } })).unwrap()
        );
    }

    #[tokio::test]
    async fn test_opaque_values_pass_through() {
        let client = Arc::new(MockKmsClient::new());
        let provider = provider_with(client.clone());
        let config = from_json(json!({
            "PORT_ENCRYPTED": 5432,
            "hosts": ["a", "b"],
            "debug": null,
        }))
        .unwrap();

        let output = provider.decrypt(&config, None).await.unwrap();

        assert_eq!(output, config);
        assert_eq!(client.decrypt_calls(), 0);
    }

    #[tokio::test]
    async fn test_error_fails_whole_walk() {
        let mut client = MockKmsClient::new();
        client.decrypt_error = Some(KmsEnvError::PermissionDenied("test".to_string()));
        let provider = provider_with(Arc::new(client));
        let config = from_json(json!({
            "USER": "alice",
            "postgres": { "passwordencrypted": base64("pw") },
        }))
        .unwrap();

        let result = provider.decrypt(&config, None).await;

        assert!(matches!(result, Err(KmsEnvError::PermissionDenied(_))));
    }

    #[tokio::test]
    async fn test_colliding_names_keep_last_key_in_order() {
        let client = Arc::new(MockKmsClient::new());
        let provider = provider_with(client.clone());
        let config = from_json(json!({
            "PASSWORD": "plain",
            "PASSWORD_ENCRYPTED": base64("decrypted"),
            "a_encrypted": base64("underscore"),
            "aencrypted": base64("bare"),
        }))
        .unwrap();

        let output = provider.decrypt(&config, None).await.unwrap();

        // A plain key always sorts before its marked form, so the decrypted
        // value wins; "a_encrypted" sorts before "aencrypted".
        assert_eq!(
            output,
            from_json(json!({ "PASSWORD": "decrypted", "a": "bare" })).unwrap()
        );
        assert_eq!(client.decrypt_calls(), 3);
    }

    #[tokio::test]
    async fn test_does_not_mutate_input() {
        let client = Arc::new(MockKmsClient::new());
        let provider = provider_with(client);
        let config = from_json(json!({ "KEY_ENCRYPTED": base64("v") })).unwrap();
        let before = config.clone();

        provider.decrypt(&config, None).await.unwrap();

        assert_eq!(config, before);
    }
}
