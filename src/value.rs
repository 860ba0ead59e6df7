//! Configuration trees.
//!
//! A [`Config`] maps keys to [`Value`]s, which are strings, nested configs, or
//! opaque leaves that are carried through decryption untouched.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// A configuration mapping.
pub type Config = BTreeMap<String, Value>;

/// A single configuration value.
///
/// Deserializes from any JSON value: strings and objects map to
/// [`Value::String`] and [`Value::Map`], everything else to [`Value::Other`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// A string, possibly base64 ciphertext
    String(String),
    /// A nested configuration
    Map(Config),
    /// Numbers, booleans, null and arrays
    Other(serde_json::Value),
}

impl Value {
    /// Returns the string if this is a [`Value::String`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the nested config if this is a [`Value::Map`].
    pub fn as_map(&self) -> Option<&Config> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<Config> for Value {
    fn from(map: Config) -> Self {
        Self::Map(map)
    }
}

/// Converts a JSON value into a config. The top level must be an object.
pub fn from_json(value: serde_json::Value) -> Result<Config> {
    Ok(serde_json::from_value(value)?)
}

/// Parses a config from a JSON document.
pub fn from_json_str(s: &str) -> Result<Config> {
    Ok(serde_json::from_str(s)?)
}

/// Reads a config from a JSON file.
///
/// ```no_run
/// #[tokio::main]
/// async fn main() -> kmsenv::Result<()> {
///     let config = kmsenv::value::read_json_file("config/production.json").await?;
///     let decrypted = kmsenv::decrypt(Some(&config), None).await?;
///     println!("{} keys", decrypted.len());
///     Ok(())
/// }
/// ```
pub async fn read_json_file(path: impl AsRef<Path>) -> Result<Config> {
    let contents = tokio::fs::read_to_string(path).await?;
    from_json_str(&contents)
}
