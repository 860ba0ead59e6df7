//! Process environment snapshots.

use crate::value::{Config, Value};

/// Variable prefixes injected by package-manager tooling (`npm run`, etc.).
///
/// Such variables are never secrets, and names like
/// `npm_package_dependencies__msp_encrypted` would otherwise look encrypted.
pub const TOOLING_PREFIXES: [&str; 2] = ["npm_package_", "npm_config_"];

/// Captures the process environment as a flat config.
///
/// Variables whose name or value is not valid UTF-8 are skipped, as are
/// variables starting with one of [`TOOLING_PREFIXES`].
pub fn snapshot() -> Config {
    from_vars(
        std::env::vars_os()
            .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?))),
    )
}

fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Config {
    vars.into_iter()
        .filter(|(key, _)| !is_tooling_variable(key))
        .map(|(key, value)| (key, Value::String(value)))
        .collect()
}

fn is_tooling_variable(key: &str) -> bool {
    TOOLING_PREFIXES.iter().any(|prefix| key.starts_with(prefix))
}
