use std::path::Path;

use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};

use super::logging::LoggingConfig;
use super::store::StoreConfig;

/// Prefix for environment overrides, e.g. `TENANTAUTH_AUTHORITY__BASE_URL`.
pub const ENV_PREFIX: &str = "TENANTAUTH_";

/// A top-level enum for versioned configurations.
#[derive(Deserialize, Serialize, JsonSchema)]
#[serde(tag = "version")]
pub enum Config {
    #[serde(rename = "1.0.0")]
    ConfigV1(ConfigV1),
}

/// Main config for v1.0.0: where the authority lives, where the credential is kept,
/// and how to log.
#[derive(Deserialize, Serialize, Debug, JsonSchema, Clone)]
pub struct ConfigV1 {
    pub authority: AuthorityConfig,
    pub store: StoreConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// The remote authority that issues and validates credentials.
#[derive(Deserialize, Serialize, Debug, JsonSchema, Clone)]
pub struct AuthorityConfig {
    /// Base URL the `/auth/...` paths are appended to, e.g. `https://shell.example/api`.
    pub base_url: String,
    #[serde(default = "default_timeout_in_ms")]
    pub timeout_in_ms: u64,
}

fn default_timeout_in_ms() -> u64 {
    10_000
}

/// Load config from a YAML file, with `TENANTAUTH_` environment variables layered on top.
pub fn load_config(path: impl AsRef<Path>) -> Result<ConfigV1, figment::Error> {
    let figment = Figment::new()
        .merge(Yaml::file(path.as_ref()))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));
    extract(figment)
}

/// Parse config from a YAML string (no environment overrides).
pub fn config_from_yaml(yaml: &str) -> Result<ConfigV1, figment::Error> {
    extract(Figment::new().merge(Yaml::string(yaml)))
}

fn extract(figment: Figment) -> Result<ConfigV1, figment::Error> {
    match figment.extract::<Config>()? {
        Config::ConfigV1(c) => Ok(c),
    }
    // handle configuration migration between versions here when necessary
}

/// Print the JSON schema for the configuration to stdout.
pub fn print_schema() -> Result<(), serde_json::Error> {
    let schema = schema_for!(Config);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}
