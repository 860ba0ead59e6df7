//! KMS client trait and the decryptor bound to a single crypto key.
//!
//! This module defines the [`KmsClient`] trait that every key-management
//! integration must satisfy, and [`Decryptor`], the handle the config walker
//! uses to turn base64 ciphertext into plaintext.

use crate::Result;
use async_trait::async_trait;
use base64::Engine;
use std::fmt;
use std::sync::Arc;

/// Request sent to [`KmsClient::decrypt`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptRequest {
    /// Raw ciphertext bytes (already base64-decoded)
    pub ciphertext: Vec<u8>,
    /// Full resource name of the crypto key
    pub name: String,
}

/// Response returned by [`KmsClient::decrypt`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptResponse {
    /// Decrypted bytes
    pub plaintext: Vec<u8>,
}

/// KmsClient represents an external key-management service.
///
/// All implementations must be `Send + Sync` so one client can serve concurrent
/// decrypt calls from sibling config entries.
///
/// # Implementations
///
/// - **SDK-based**: Google Cloud KMS (`gcp` feature)
/// - **Testing**: Mock client with call counters and error injection (`mock` feature)
#[async_trait]
pub trait KmsClient: Send + Sync {
    /// Formats the full resource name of a crypto key.
    ///
    /// This is pure formatting and must not perform network calls.
    fn crypto_key_path(&self, project: &str, location: &str, ring: &str, key: &str) -> String;

    /// Decrypts ciphertext with the crypto key named in the request.
    ///
    /// # Errors
    ///
    /// - [`KmsEnvError::NotFound`](crate::KmsEnvError::NotFound): key does not exist
    /// - [`KmsEnvError::PermissionDenied`](crate::KmsEnvError::PermissionDenied):
    ///   caller may not use the key
    /// - [`KmsEnvError::Decrypt`](crate::KmsEnvError::Decrypt): any other rejection
    async fn decrypt(&self, request: DecryptRequest) -> Result<DecryptResponse>;
}

struct Bound {
    client: Arc<dyn KmsClient>,
    key_path: String,
}

/// Decrypts base64 ciphertext with one crypto key.
///
/// A `Decryptor` is a cheap handle: clones share the same client and key path.
/// Use [`Decryptor::ptr_eq`] to check whether two handles are the same instance.
#[derive(Clone)]
pub struct Decryptor {
    inner: Arc<Bound>,
}

impl Decryptor {
    /// Binds `client` to the crypto key at `key_path`.
    pub fn new(client: Arc<dyn KmsClient>, key_path: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Bound {
                client,
                key_path: key_path.into(),
            }),
        }
    }

    /// Returns the crypto key this decryptor is bound to.
    pub fn key_path(&self) -> &str {
        &self.inner.key_path
    }

    /// Decodes `ciphertext` from base64, decrypts it and returns the plaintext.
    ///
    /// ASCII whitespace anywhere in `ciphertext` is ignored, so line-wrapped
    /// `base64` output decodes as-is. Client errors are returned unchanged.
    ///
    /// # Errors
    ///
    /// - [`KmsEnvError::InvalidCiphertext`](crate::KmsEnvError::InvalidCiphertext):
    ///   `ciphertext` is not base64
    /// - [`KmsEnvError::InvalidPlaintext`](crate::KmsEnvError::InvalidPlaintext):
    ///   decrypted bytes are not UTF-8
    /// - any error returned by the [`KmsClient`]
    pub async fn decrypt(&self, ciphertext: &str) -> Result<String> {
        let compact: String = ciphertext.split_ascii_whitespace().collect();
        let ciphertext = base64::engine::general_purpose::STANDARD.decode(compact)?;

        let response = self
            .inner
            .client
            .decrypt(DecryptRequest {
                ciphertext,
                name: self.inner.key_path.clone(),
            })
            .await?;

        Ok(String::from_utf8(response.plaintext)?)
    }

    /// Returns `true` if both handles refer to the same decryptor instance.
    pub fn ptr_eq(&self, other: &Decryptor) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Decryptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decryptor")
            .field("key_path", &self.inner.key_path)
            .finish_non_exhaustive()
    }
}

#[cfg(all(test, feature = "mock"))]
mod tests {
    use super::*;
    use crate::clients::mock::MockKmsClient;
    use crate::KmsEnvError;

    const KEY_PATH: &str = "gcloud/resource/path";

    fn base64(value: &str) -> String {
        base64::engine::general_purpose::STANDARD.encode(value)
    }

    #[tokio::test]
    async fn test_forwards_decoded_ciphertext_and_key_path() {
        let client = Arc::new(MockKmsClient::new().with_plaintext("secret"));
        let decryptor = Decryptor::new(client.clone(), KEY_PATH);

        let plaintext = decryptor.decrypt(&base64("encrypted secret")).await.unwrap();

        assert_eq!(plaintext, "secret");
        assert_eq!(
            client.last_request(),
            Some(DecryptRequest {
                ciphertext: b"encrypted secret".to_vec(),
                name: KEY_PATH.to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_rejects_invalid_base64() {
        let client = Arc::new(MockKmsClient::new());
        let decryptor = Decryptor::new(client.clone(), KEY_PATH);

        let result = decryptor.decrypt("%%% not base64 %%%").await;

        assert!(matches!(result, Err(KmsEnvError::InvalidCiphertext(_))));
        assert_eq!(client.decrypt_calls(), 0);
    }

    #[tokio::test]
    async fn test_accepts_line_wrapped_base64() {
        let client = Arc::new(MockKmsClient::new());
        let decryptor = Decryptor::new(client.clone(), KEY_PATH);
        let secret = "a".repeat(80);

        // `base64` without -w0 wraps at 76 columns
        let encoded = base64(&secret);
        let wrapped = format!("{}\n{}\n", &encoded[..76], &encoded[76..]);

        let plaintext = decryptor.decrypt(&wrapped).await.unwrap();

        assert_eq!(plaintext, secret);
        assert_eq!(client.last_request().unwrap().ciphertext, secret.as_bytes());
    }

    #[tokio::test]
    async fn test_ignores_surrounding_and_inner_whitespace() {
        let decryptor = Decryptor::new(Arc::new(MockKmsClient::new()), KEY_PATH);

        let plaintext = decryptor.decrypt("  c2Vj\r\n cmV0\t\n").await.unwrap();

        assert_eq!(plaintext, "secret");
    }

    #[tokio::test]
    async fn test_client_error_is_returned_unchanged() {
        let mut client = MockKmsClient::new();
        client.decrypt_error = Some(KmsEnvError::PermissionDenied("test".to_string()));
        let decryptor = Decryptor::new(Arc::new(client), KEY_PATH);

        let result = decryptor.decrypt(&base64("x")).await;

        assert!(matches!(result, Err(KmsEnvError::PermissionDenied(ref m)) if m == "test"));
    }

    #[tokio::test]
    async fn test_rejects_non_utf8_plaintext() {
        let client = Arc::new(MockKmsClient::new());
        let decryptor = Decryptor::new(client, KEY_PATH);
        let ciphertext = base64::engine::general_purpose::STANDARD.encode([0xff, 0xfe]);

        let result = decryptor.decrypt(&ciphertext).await;

        assert!(matches!(result, Err(KmsEnvError::InvalidPlaintext(_))));
    }

    #[test]
    fn test_clones_share_identity() {
        let client: Arc<dyn KmsClient> = Arc::new(MockKmsClient::new());
        let a = Decryptor::new(client.clone(), KEY_PATH);
        let b = a.clone();
        let c = Decryptor::new(client, KEY_PATH);

        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&c));
        assert_eq!(a.key_path(), KEY_PATH);
    }
}
