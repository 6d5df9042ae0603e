//! Bridges the CLI's global flags with the `csm-config` profile file.
//!
//! Flags override the profile, the profile overrides built-in defaults.

use csm_api::{TlsMode, TransportConfig};
use csm_config::{Config, Profile};
use secrecy::SecretString;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Everything needed to talk to SLS and BSS for one run.
#[derive(Debug)]
pub struct ServiceSettings {
    pub profile_name: String,
    pub sls_url: String,
    pub bss_url: String,
    pub transport: TransportConfig,
}

/// Resolve the active profile of `cfg` against the global flags.
pub fn resolve_settings_with(
    global: &GlobalOpts,
    cfg: &Config,
) -> Result<ServiceSettings, CliError> {
    let profile_name = cfg.profile_name(global.profile.as_deref()).to_owned();
    let profile = cfg.profile(&profile_name)?;

    let sls_url = global
        .sls_url
        .clone()
        .unwrap_or_else(|| profile.sls_url().to_owned());
    let bss_url = global
        .bss_url
        .clone()
        .unwrap_or_else(|| profile.bss_url().to_owned());
    csm_config::validate_url("sls_url", &sls_url)?;
    csm_config::validate_url("bss_url", &bss_url)?;

    let mut transport = csm_config::profile_to_transport(&profile, &cfg.defaults);
    if global.insecure {
        transport.tls = TlsMode::DangerAcceptInvalid;
    }
    if let Some(secs) = global.timeout {
        transport.timeout = std::time::Duration::from_secs(secs);
    }

    let token = resolve_token(global, &profile, &profile_name)?;
    let transport = transport.with_token(token);

    Ok(ServiceSettings {
        profile_name,
        sls_url,
        bss_url,
        transport,
    })
}

/// `--token` / `CSI_TOKEN` first, then the profile credential chain.
fn resolve_token(
    global: &GlobalOpts,
    profile: &Profile,
    profile_name: &str,
) -> Result<SecretString, CliError> {
    if let Some(token) = global.token.as_deref().filter(|t| !t.trim().is_empty()) {
        tracing::debug!(profile = profile_name, "token from command line");
        return Ok(SecretString::from(token.to_owned()));
    }
    Ok(csm_config::resolve_token(profile, profile_name)?)
}
