//! Shared configuration for the `csi` IPv6 tooling.
//!
//! TOML profiles, credential resolution (env + keyring + plaintext),
//! and translation to `csm_api::TransportConfig`. The CLI layers its
//! flag overrides on top.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use csm_api::{TlsMode, TransportConfig};

/// Gateway every CSM service is reachable through from a management node.
pub const DEFAULT_API_GATEWAY: &str = "https://api-gw-service-nmn.local";

/// Keyring service name tokens are stored under.
pub const KEYRING_SERVICE: &str = "csm-ipv6";

/// Environment variable CSM tooling conventionally exports the gateway
/// token in.
pub const TOKEN_ENV: &str = "TOKEN";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("unknown profile '{profile}'")]
    UnknownProfile { profile: String },

    #[error("no API token configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named system profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default)]
    pub insecure: bool,

    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            insecure: false,
            timeout: default_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_timeout() -> u64 {
    30
}

/// A named system profile.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct Profile {
    /// SLS base URL; defaults to the API gateway.
    pub sls_url: Option<String>,

    /// BSS base URL; defaults to the API gateway.
    pub bss_url: Option<String>,

    /// Gateway token in plaintext. Prefer the keyring or `token_env`.
    pub token: Option<String>,

    /// Environment variable name containing the token.
    pub token_env: Option<String>,

    /// Path to the gateway CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Override insecure TLS setting.
    pub insecure: Option<bool>,

    /// Override timeout (seconds).
    pub timeout: Option<u64>,

    /// Subnets targeted when `--subnets` is not given.
    pub subnets: Option<Vec<String>>,

    /// Supernet exception set used when `--supernet-subnets` is not given.
    pub supernet_subnets: Option<Vec<String>>,
}

impl Profile {
    pub fn sls_url(&self) -> &str {
        self.sls_url.as_deref().unwrap_or(DEFAULT_API_GATEWAY)
    }

    pub fn bss_url(&self) -> &str {
        self.bss_url.as_deref().unwrap_or(DEFAULT_API_GATEWAY)
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "hpe", "csm-ipv6").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("csm-ipv6");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load Config from `path` + `CSI_`-prefixed environment variables.
///
/// A missing file is not an error; defaults apply.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    debug!(path = %path.display(), "loading configuration");
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("CSI_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if it cannot be read.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

impl Config {
    /// Name of the profile to use: explicit, configured default, or
    /// `"default"`.
    pub fn profile_name<'a>(&'a self, explicit: Option<&'a str>) -> &'a str {
        explicit
            .or(self.default_profile.as_deref())
            .unwrap_or("default")
    }

    /// Look up a profile. The implicit `default` profile may be absent, in
    /// which case an empty one is returned; any other missing name is an
    /// error.
    pub fn profile(&self, name: &str) -> Result<Profile, ConfigError> {
        match self.profiles.get(name) {
            Some(profile) => Ok(profile.clone()),
            None if name == "default" => Ok(Profile::default()),
            None => Err(ConfigError::UnknownProfile {
                profile: name.into(),
            }),
        }
    }
}

// ── Credential resolution (without CLI flags) ───────────────────────

/// Resolve the gateway token from the credential chain (no CLI flag step):
/// profile `token_env` → `TOKEN` → system keyring → plaintext profile value.
pub fn resolve_token(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    resolve_token_with(
        profile,
        profile_name,
        |name| std::env::var(name).ok(),
        |account| {
            keyring::Entry::new(KEYRING_SERVICE, account)
                .and_then(|entry| entry.get_password())
                .ok()
        },
    )
}

fn resolve_token_with(
    profile: &Profile,
    profile_name: &str,
    env: impl Fn(&str) -> Option<String>,
    keyring: impl Fn(&str) -> Option<String>,
) -> Result<SecretString, ConfigError> {
    let non_empty = |v: String| (!v.trim().is_empty()).then_some(v);

    // 1. Profile's token_env → env var lookup
    if let Some(token) = profile.token_env.as_deref().and_then(&env).and_then(non_empty) {
        debug!(profile = profile_name, "token from profile token_env");
        return Ok(SecretString::from(token));
    }

    // 2. Conventional TOKEN variable
    if let Some(token) = env(TOKEN_ENV).and_then(non_empty) {
        debug!(profile = profile_name, "token from {TOKEN_ENV}");
        return Ok(SecretString::from(token));
    }

    // 3. System keyring
    if let Some(token) = keyring(&format!("{profile_name}/token")).and_then(non_empty) {
        debug!(profile = profile_name, "token from keyring");
        return Ok(SecretString::from(token));
    }

    // 4. Plaintext in config
    if let Some(token) = profile.token.clone().and_then(non_empty) {
        return Ok(SecretString::from(token));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Build a `TransportConfig` from a profile and global defaults, without CLI
/// flag overrides. The token is attached by the caller.
pub fn profile_to_transport(profile: &Profile, defaults: &Defaults) -> TransportConfig {
    let tls = if profile.insecure.unwrap_or(defaults.insecure) {
        TlsMode::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsMode::CustomCa(ca_path.clone())
    } else {
        TlsMode::System
    };

    TransportConfig {
        tls,
        timeout: Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout)),
        ..TransportConfig::default()
    }
}

/// Validate a service base URL.
pub fn validate_url(field: &str, value: &str) -> Result<url::Url, ConfigError> {
    let url: url::Url = value.parse().map_err(|e| ConfigError::Validation {
        field: field.into(),
        reason: format!("invalid URL {value}: {e}"),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::Validation {
            field: field.into(),
            reason: format!("unsupported scheme {}", url.scheme()),
        });
    }
    Ok(url)
}
