//! Memoized decryptor construction.
//!
//! A [`DecryptorProvider`] turns an optional [`KmsConfig`] into a [`Decryptor`],
//! building at most one decryptor (one client, one key path) per distinct
//! configuration value for its whole lifetime.

use crate::config::process_env_lookup;
use crate::factory::{self, ClientFactory};
use crate::value::Config;
use crate::{env, walker, Decryptor, KmsConfig, Result};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use tracing::debug;

/// Environment lookup used to resolve KMS defaults.
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Builds and caches decryptors keyed by KMS configuration.
///
/// `None` and `Some(KmsConfig::default())` are distinct cache keys even though
/// both resolve entirely from the environment.
///
/// # Example
///
/// ```
/// use kmsenv::clients::mock::MockKmsClient;
/// use kmsenv::{DecryptorProvider, KmsClient, KmsConfig};
/// use std::sync::Arc;
///
/// let provider = DecryptorProvider::new(Arc::new(|| {
///     Ok(Arc::new(MockKmsClient::new()) as Arc<dyn KmsClient>)
/// }));
///
/// let config = KmsConfig::new().with_project("p").with_ring("r").with_key("k");
/// let a = provider.get_decryptor(Some(&config)).unwrap();
/// let b = provider.get_decryptor(Some(&config.clone())).unwrap();
///
/// assert!(a.ptr_eq(&b));
/// assert_eq!(a.key_path(), "projects/p/locations/global/keyRings/r/cryptoKeys/k");
/// ```
pub struct DecryptorProvider {
    client_factory: ClientFactory,
    env: EnvLookup,
    cache: Mutex<HashMap<Option<KmsConfig>, Decryptor>>,
}

impl DecryptorProvider {
    /// Creates a provider that builds clients with `client_factory` and reads
    /// defaults from the process environment.
    ///
    /// `client_factory` runs while this provider's cache lock is held. It must
    /// not call back into the same provider ([`get_decryptor`](Self::get_decryptor),
    /// [`decrypt`](Self::decrypt) or [`clear_cache`](Self::clear_cache)); doing so
    /// deadlocks. Other providers may be used freely.
    pub fn new(client_factory: ClientFactory) -> Self {
        Self {
            client_factory,
            env: Arc::new(process_env_lookup),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Replaces the environment used to resolve KMS defaults.
    pub fn with_env(mut self, env: EnvLookup) -> Self {
        self.env = env;
        self
    }

    /// Returns the decryptor for `config`, building it on first request.
    ///
    /// The first request for a configuration constructs one client and formats
    /// one key path; later requests with an equal configuration return the same
    /// instance without touching the client.
    ///
    /// The cache lock is held across the client factory call, so concurrent
    /// first requests for one configuration build a single client.
    ///
    /// # Errors
    ///
    /// Returns whatever the client factory returns when it fails. Failed
    /// constructions are not cached.
    pub fn get_decryptor(&self, config: Option<&KmsConfig>) -> Result<Decryptor> {
        let mut cache = lock(&self.cache);
        let cache_key = config.cloned();

        if let Some(decryptor) = cache.get(&cache_key) {
            return Ok(decryptor.clone());
        }

        let resolved = cache_key
            .clone()
            .unwrap_or_default()
            .resolve_with(&*self.env);
        let client = (self.client_factory)()?;
        let key_path = client.crypto_key_path(
            &resolved.project,
            &resolved.location,
            &resolved.ring,
            &resolved.key,
        );
        debug!(key_path = %key_path, "created KMS decryptor");

        let decryptor = Decryptor::new(client, key_path);
        cache.insert(cache_key, decryptor.clone());
        Ok(decryptor)
    }

    /// Decrypts every marked value in `config`.
    ///
    /// See [`crate::decrypt`] for the rules.
    pub async fn decrypt(&self, config: &Config, kms_config: Option<&KmsConfig>) -> Result<Config> {
        walker::decrypt_tree(self, config, kms_config).await
    }

    /// Decrypts a snapshot of the process environment.
    pub async fn decrypt_process_env(&self) -> Result<Config> {
        self.decrypt(&env::snapshot(), None).await
    }

    /// Drops every cached decryptor.
    ///
    /// Intended for tests; production code has no reason to rebuild clients.
    pub fn clear_cache(&self) {
        lock(&self.cache).clear();
    }
}

impl fmt::Debug for DecryptorProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecryptorProvider")
            .field("cached", &lock(&self.cache).len())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

static GLOBAL: OnceLock<DecryptorProvider> = OnceLock::new();

/// Returns the process-wide provider used by [`crate::decrypt`] and
/// [`crate::get_decryptor`].
///
/// Its clients come from [`factory::new_client`].
pub fn global() -> &'static DecryptorProvider {
    GLOBAL.get_or_init(|| {
        let client_factory: ClientFactory = Arc::new(factory::new_client);
        DecryptorProvider::new(client_factory)
    })
}
