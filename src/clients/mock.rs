//! Mock KMS client for testing.
//!
//! This client decrypts in memory and records every call so tests can assert
//! how (and how often) the key-management service was used.

use crate::kms::{DecryptRequest, DecryptResponse, KmsClient};
use crate::{KmsEnvError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Barrier;

/// Mock KMS client for testing.
///
/// By default the "plaintext" is the ciphertext itself, so decrypting
/// `base64("abc")` yields `"abc"`. Use [`MockKmsClient::with_plaintext`] to
/// return a fixed value instead.
///
/// # Example
///
/// ```
/// use kmsenv::clients::mock::MockKmsClient;
/// use kmsenv::{Decryptor, KmsEnvError};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> kmsenv::Result<()> {
///     let client = Arc::new(MockKmsClient::new().with_plaintext("secret"));
///     let decryptor = Decryptor::new(client.clone(), "projects/p/locations/global/keyRings/r/cryptoKeys/k");
///
///     assert_eq!(decryptor.decrypt("Y2lwaGVydGV4dA==").await?, "secret");
///     assert_eq!(client.decrypt_calls(), 1);
///
///     // Test error conditions
///     let mut failing = MockKmsClient::new();
///     failing.decrypt_error = Some(KmsEnvError::PermissionDenied("test".to_string()));
///     let decryptor = Decryptor::new(Arc::new(failing), "projects/p");
///     assert!(decryptor.decrypt("Y2lwaGVydGV4dA==").await.is_err());
///
///     Ok(())
/// }
/// ```
#[derive(Default)]
pub struct MockKmsClient {
    plaintext: Option<Vec<u8>>,
    barrier: Option<Barrier>,
    key_path_args: Mutex<Vec<[String; 4]>>,
    requests: Mutex<Vec<DecryptRequest>>,
    key_path_calls: AtomicUsize,
    decrypt_calls: AtomicUsize,

    /// Error to return from `decrypt()`
    pub decrypt_error: Option<KmsEnvError>,
}

impl MockKmsClient {
    /// Creates a mock client that echoes ciphertext back as plaintext.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `plaintext` from every decrypt call.
    pub fn with_plaintext(mut self, plaintext: impl Into<Vec<u8>>) -> Self {
        self.plaintext = Some(plaintext.into());
        self
    }

    /// Holds every decrypt call until `n` calls are in flight at once.
    ///
    /// Useful to prove that callers issue decrypts concurrently: with sequential
    /// callers the first call never completes.
    pub fn with_barrier(mut self, n: usize) -> Self {
        self.barrier = Some(Barrier::new(n));
        self
    }

    /// Number of `crypto_key_path()` calls.
    pub fn key_path_calls(&self) -> usize {
        self.key_path_calls.load(Ordering::SeqCst)
    }

    /// Arguments of the most recent `crypto_key_path()` call, as
    /// `[project, location, ring, key]`.
    pub fn last_key_path_args(&self) -> Option<[String; 4]> {
        lock(&self.key_path_args).last().cloned()
    }

    /// Number of `decrypt()` calls issued, including ones still in flight.
    pub fn decrypt_calls(&self) -> usize {
        self.decrypt_calls.load(Ordering::SeqCst)
    }

    /// All decrypt requests received so far.
    pub fn requests(&self) -> Vec<DecryptRequest> {
        lock(&self.requests).clone()
    }

    /// The most recent decrypt request.
    pub fn last_request(&self) -> Option<DecryptRequest> {
        lock(&self.requests).last().cloned()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Reproduces an injected error; variants that can't be cloned are wrapped.
fn replay(err: &KmsEnvError) -> KmsEnvError {
    match err {
        KmsEnvError::NotFound(m) => KmsEnvError::NotFound(m.clone()),
        KmsEnvError::PermissionDenied(m) => KmsEnvError::PermissionDenied(m.clone()),
        KmsEnvError::EmptyPlaintext(m) => KmsEnvError::EmptyPlaintext(m.clone()),
        KmsEnvError::ClientUnavailable(m) => KmsEnvError::ClientUnavailable(m.clone()),
        other => KmsEnvError::Other(anyhow::anyhow!("{}", other)),
    }
}

#[async_trait]
impl KmsClient for MockKmsClient {
    fn crypto_key_path(&self, project: &str, location: &str, ring: &str, key: &str) -> String {
        self.key_path_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.key_path_args).push([
            project.to_string(),
            location.to_string(),
            ring.to_string(),
            key.to_string(),
        ]);
        format!(
            "projects/{}/locations/{}/keyRings/{}/cryptoKeys/{}",
            project, location, ring, key
        )
    }

    async fn decrypt(&self, request: DecryptRequest) -> Result<DecryptResponse> {
        self.decrypt_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.requests).push(request.clone());

        if let Some(barrier) = &self.barrier {
            barrier.wait().await;
        }

        if let Some(ref err) = self.decrypt_error {
            return Err(replay(err));
        }

        let plaintext = self.plaintext.clone().unwrap_or(request.ciphertext);
        Ok(DecryptResponse { plaintext })
    }
}
