//! Google Cloud KMS integration tests.
//!
//! These tests need Application Default Credentials and a key ring named
//! `integration-test` with a crypto key `default` in the `global` location.
//!
//! Run with:
//!   echo -n foo | gcloud kms encrypt --location global --keyring integration-test \
//!       --key default --plaintext-file - --ciphertext-file - | base64 -w0
//!   KMSENV_TEST_CIPHERTEXT=<output> cargo test --test integration_gcp --features gcp -- --ignored

#![cfg(feature = "gcp")]

use kmsenv::clients::gcp::GcpKmsClient;
use kmsenv::{DecryptorProvider, KmsClient, KmsConfig};
use serde_json::json;
use std::sync::Arc;

fn project_id() -> Option<String> {
    ["PROJECT_ID", "GOOGLE_CLOUD_PROJECT", "GCLOUD_PROJECT", "GCP_PROJECT"]
        .iter()
        .find_map(|name| std::env::var(name).ok().filter(|v| !v.is_empty()))
}

fn kms_config() -> KmsConfig {
    let config = KmsConfig::new()
        .with_location("global")
        .with_ring("integration-test")
        .with_key("default");

    match project_id() {
        Some(project) => config.with_project(project),
        None => config,
    }
}

fn ciphertext() -> String {
    std::env::var("KMSENV_TEST_CIPHERTEXT").expect("KMSENV_TEST_CIPHERTEXT must be set")
}

fn provider() -> DecryptorProvider {
    DecryptorProvider::new(Arc::new(|| {
        Ok(Arc::new(GcpKmsClient::new()) as Arc<dyn KmsClient>)
    }))
}

#[tokio::test]
#[ignore] // Run only with GCP credentials
async fn test_decodes_base64_ciphertext() {
    let provider = provider();
    let decryptor = provider
        .get_decryptor(Some(&kms_config()))
        .expect("Failed to build decryptor");

    let plaintext = decryptor
        .decrypt(&ciphertext())
        .await
        .expect("Failed to decrypt");

    assert_eq!(plaintext, "foo");
}

#[tokio::test]
#[ignore] // Run only with GCP credentials
async fn test_decrypts_nested_config() {
    let provider = provider();
    let config = kmsenv::value::from_json(json!({
        "service": { "token": { "encrypted": ciphertext() } }
    }))
    .unwrap();

    let decrypted = provider
        .decrypt(&config, Some(&kms_config()))
        .await
        .expect("Failed to decrypt config");

    let service = decrypted["service"].as_map().unwrap();
    assert_eq!(service["token"].as_str(), Some("foo"));
}

#[tokio::test]
#[ignore] // Run only with GCP credentials
async fn test_unknown_key_fails() {
    let provider = provider();
    let config = kms_config().with_key("kmsenv-does-not-exist");
    let decryptor = provider.get_decryptor(Some(&config)).unwrap();

    let result = decryptor.decrypt(&ciphertext()).await;

    assert!(result.is_err());
}
