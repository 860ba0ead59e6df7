//! KMS key selection and environment defaults.

use serde::{Deserialize, Serialize};

/// Environment variable holding the KMS project, checked before any platform default.
pub const KMS_PROJECT_ID: &str = "KMS_PROJECT_ID";

/// Platform-provided project variables, checked in this order after [`KMS_PROJECT_ID`].
pub const PROJECT_ID_FALLBACKS: [&str; 4] = [
    "PROJECT_ID",
    "GOOGLE_CLOUD_PROJECT", // App Engine
    "GCLOUD_PROJECT",       // Cloud Functions (deprecated)
    "GCP_PROJECT",          // Cloud Functions
];

/// Environment variable holding the key ring location.
pub const KMS_LOCATION: &str = "KMS_LOCATION";

/// Environment variable holding the key ring name.
pub const KMS_KEY_RING: &str = "KMS_KEY_RING";

/// Environment variable holding the crypto key name.
pub const KMS_CRYPTO_KEY: &str = "KMS_CRYPTO_KEY";

/// Location used when neither the config nor `KMS_LOCATION` provides one.
pub const DEFAULT_LOCATION: &str = "global";

/// Selects the crypto key used for decryption.
///
/// Every field is optional. Missing fields are filled from the environment when
/// the config is resolved, so `KmsConfig::default()` means "use the environment".
///
/// ```
/// use kmsenv::KmsConfig;
///
/// let config = KmsConfig::new()
///     .with_project("my-project")
///     .with_location("europe-west1")
///     .with_ring("app")
///     .with_key("config");
///
/// assert_eq!(config.location.as_deref(), Some("europe-west1"));
/// ```
///
/// A config can also be loaded from JSON; missing fields stay `None`:
///
/// ```
/// use kmsenv::KmsConfig;
///
/// let config: KmsConfig = serde_json::from_str(r#"{"ring": "app", "key": "config"}"#).unwrap();
/// assert_eq!(config, KmsConfig::new().with_ring("app").with_key("config"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct KmsConfig {
    /// GCP project that owns the key ring
    pub project: Option<String>,
    /// Key ring location (e.g. "global", "europe-west1")
    pub location: Option<String>,
    /// Key ring name
    pub ring: Option<String>,
    /// Crypto key name
    pub key: Option<String>,
}

impl KmsConfig {
    /// Creates an empty configuration that defers every field to the environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Captures the current process environment into an explicit configuration.
    ///
    /// Fields with no matching variable stay `None`.
    pub fn from_env() -> Self {
        Self::default().fill_from(&process_env_lookup)
    }

    /// Sets the project.
    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    /// Sets the key ring location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Sets the key ring name.
    pub fn with_ring(mut self, ring: impl Into<String>) -> Self {
        self.ring = Some(ring.into());
        self
    }

    /// Sets the crypto key name.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Resolves every field using the process environment.
    pub fn resolve(&self) -> ResolvedKmsConfig {
        self.resolve_with(&process_env_lookup)
    }

    /// Resolves every field using `lookup` as the environment.
    ///
    /// Precedence is explicit field, then environment, then (for location only)
    /// [`DEFAULT_LOCATION`]. Empty strings count as unset at every step.
    pub fn resolve_with<F>(&self, lookup: &F) -> ResolvedKmsConfig
    where
        F: Fn(&str) -> Option<String> + ?Sized,
    {
        let filled = self.fill_from(lookup);
        ResolvedKmsConfig {
            project: filled.project.unwrap_or_default(),
            location: filled
                .location
                .unwrap_or_else(|| DEFAULT_LOCATION.to_string()),
            ring: filled.ring.unwrap_or_default(),
            key: filled.key.unwrap_or_default(),
        }
    }

    fn fill_from<F>(&self, lookup: &F) -> Self
    where
        F: Fn(&str) -> Option<String> + ?Sized,
    {
        let env = |name: &str| lookup(name).filter(|v| !v.is_empty());

        let project = non_empty(&self.project).or_else(|| {
            std::iter::once(KMS_PROJECT_ID)
                .chain(PROJECT_ID_FALLBACKS)
                .find_map(env)
        });

        Self {
            project,
            location: non_empty(&self.location).or_else(|| env(KMS_LOCATION)),
            ring: non_empty(&self.ring).or_else(|| env(KMS_KEY_RING)),
            key: non_empty(&self.key).or_else(|| env(KMS_CRYPTO_KEY)),
        }
    }
}

/// A [`KmsConfig`] with every field resolved.
///
/// The project, ring and key may still be empty when nothing provided them. They
/// are not validated here; the KMS client rejects the resulting key path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedKmsConfig {
    /// GCP project
    pub project: String,
    /// Key ring location
    pub location: String,
    /// Key ring name
    pub ring: String,
    /// Crypto key name
    pub key: String,
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.clone().filter(|v| !v.is_empty())
}

/// Reads a variable from the process environment, ignoring non-UTF-8 values.
pub(crate) fn process_env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}
