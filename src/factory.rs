//! Process-wide KMS client registration.

use crate::{KmsClient, Result};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

/// Factory function type for creating KMS clients.
pub type ClientFactory = Arc<dyn Fn() -> Result<Arc<dyn KmsClient>> + Send + Sync>;

static CLIENT_FACTORY: OnceLock<RwLock<Option<ClientFactory>>> = OnceLock::new();

fn registry() -> &'static RwLock<Option<ClientFactory>> {
    CLIENT_FACTORY.get_or_init(|| RwLock::new(None))
}

/// Registers the client factory used by the process-wide provider.
///
/// Replaces any previous registration. Decryptors that were already created
/// keep the client they were built with.
///
/// The factory runs while the process-wide provider holds its cache lock. It
/// must not call [`crate::get_decryptor`], [`crate::decrypt`] or
/// [`crate::decrypt_process_env`]; doing so deadlocks.
///
/// # Example
///
/// ```
/// use kmsenv::clients::mock::MockKmsClient;
/// use kmsenv::factory::register_client_factory;
/// use kmsenv::KmsClient;
/// use std::sync::Arc;
///
/// register_client_factory(Arc::new(|| {
///     Ok(Arc::new(MockKmsClient::new()) as Arc<dyn KmsClient>)
/// }));
/// ```
pub fn register_client_factory(factory: ClientFactory) {
    let mut reg = registry().write().unwrap_or_else(PoisonError::into_inner);
    *reg = Some(factory);
}

/// Creates a new KMS client.
///
/// Uses the registered factory when there is one, otherwise the Google Cloud
/// KMS client if the `gcp` feature is enabled.
///
/// # Errors
///
/// Returns [`KmsEnvError::ClientUnavailable`] if no factory is registered and no
/// SDK client is compiled in, or whatever the registered factory returns.
pub fn new_client() -> Result<Arc<dyn KmsClient>> {
    let factory = registry()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();

    match factory {
        Some(factory) => factory(),
        None => default_client(),
    }
}

#[cfg(feature = "gcp")]
fn default_client() -> Result<Arc<dyn KmsClient>> {
    Ok(Arc::new(crate::clients::gcp::GcpKmsClient::new()))
}

#[cfg(not(feature = "gcp"))]
fn default_client() -> Result<Arc<dyn KmsClient>> {
    Err(crate::KmsEnvError::ClientUnavailable(
        "no client registered (did you enable the 'gcp' feature flag?)".to_string(),
    ))
}
