//! Google Cloud KMS client.
//!
//! Uses the official Google API client library with Application Default
//! Credentials (ADC), which can be:
//! - Service account key file (GOOGLE_APPLICATION_CREDENTIALS)
//! - gcloud auth application-default login
//! - GCE/GKE/Cloud Run metadata server
//!
//! The API hub is built on the first decrypt call, so constructing a
//! [`GcpKmsClient`] never touches the network.

use crate::kms::{DecryptRequest, DecryptResponse, KmsClient};
use crate::{KmsEnvError, Result};
use async_trait::async_trait;
use google_cloudkms1::api::DecryptRequest as ApiDecryptRequest;
use google_cloudkms1::{hyper, hyper_rustls, oauth2, CloudKMS};
use tokio::sync::OnceCell;
use tracing::{info, warn};

type Hub = CloudKMS<hyper_rustls::HttpsConnector<hyper::client::HttpConnector>>;

/// Google Cloud KMS client.
#[derive(Default)]
pub struct GcpKmsClient {
    hub: OnceCell<Hub>,
}

impl GcpKmsClient {
    /// Creates a client; credentials are loaded on first use.
    pub fn new() -> Self {
        Self::default()
    }

    async fn hub(&self) -> Result<&Hub> {
        self.hub.get_or_try_init(build_hub).await
    }
}

async fn build_hub() -> Result<Hub> {
    let connector = hyper_rustls::HttpsConnectorBuilder::new()
        .with_native_roots()
        .map_err(|e| {
            KmsEnvError::ClientUnavailable(format!("failed to load native TLS roots: {}", e))
        })?
        .https_or_http()
        .enable_http1()
        .build();
    let client = hyper::Client::builder().build(connector);

    let opts = oauth2::ApplicationDefaultCredentialsFlowOpts::default();
    let auth_builder = oauth2::ApplicationDefaultCredentialsAuthenticator::builder(opts).await;

    let auth = match auth_builder {
        oauth2::authenticator::ApplicationDefaultCredentialsTypes::InstanceMetadata(auth) => {
            auth.build().await.map_err(|e| {
                KmsEnvError::ClientUnavailable(format!("failed to build GCP auth: {}", e))
            })?
        }
        oauth2::authenticator::ApplicationDefaultCredentialsTypes::ServiceAccount(auth) => {
            auth.build().await.map_err(|e| {
                KmsEnvError::ClientUnavailable(format!("failed to build GCP auth: {}", e))
            })?
        }
    };

    info!("initialized Cloud KMS client");
    Ok(CloudKMS::new(client, auth))
}

#[async_trait]
impl KmsClient for GcpKmsClient {
    fn crypto_key_path(&self, project: &str, location: &str, ring: &str, key: &str) -> String {
        format!(
            "projects/{}/locations/{}/keyRings/{}/cryptoKeys/{}",
            project, location, ring, key
        )
    }

    async fn decrypt(&self, request: DecryptRequest) -> Result<DecryptResponse> {
        let hub = self.hub().await?;
        let name = request.name;

        let api_request = ApiDecryptRequest {
            ciphertext: Some(request.ciphertext),
            ..Default::default()
        };

        let (_, response) = hub
            .projects()
            .locations_key_rings_crypto_keys_decrypt(api_request, &name)
            .doit()
            .await
            .map_err(|e| {
                warn!(key_path = %name, error = %e, "Cloud KMS decrypt failed");
                let message = e.to_string();
                if message.contains("NOT_FOUND") {
                    KmsEnvError::NotFound(name.clone())
                } else if message.contains("PERMISSION_DENIED") {
                    KmsEnvError::PermissionDenied(name.clone())
                } else {
                    KmsEnvError::decrypt_failed(name.clone(), anyhow::anyhow!(message))
                }
            })?;

        let plaintext = response
            .plaintext
            .ok_or_else(|| KmsEnvError::EmptyPlaintext(name.clone()))?;

        Ok(DecryptResponse { plaintext })
    }
}
