//! CLI error types with miette diagnostics.
//!
//! Maps configuration, client and run failures onto user-facing errors and
//! the documented process exit codes.

use miette::Diagnostic;
use thiserror::Error;

use csm_config::ConfigError;
use csm_core::{CoreError, RunPhase};

/// Process exit codes.
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    /// SLS/BSS read or discovery failure.
    pub const DISCOVERY: i32 = 1;
    /// At least one network could not be planned.
    pub const PLANNING: i32 = 2;
    /// A write failed during commit.
    pub const COMMIT: i32 = 3;
    /// Invalid arguments or configuration.
    pub const USAGE: i32 = 4;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Configuration ────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(csi::validation))]
    Validation { field: String, reason: String },

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(csi::profile_not_found),
        help("Profiles are read from {path}")
    )]
    ProfileNotFound { name: String, path: String },

    #[error("No API token available for profile '{profile}'")]
    #[diagnostic(
        code(csi::no_credentials),
        help(
            "Pass --token, export TOKEN (or CSI_TOKEN), set token_env in the profile,\n\
             or store one in the keyring under csm-ipv6/{profile}/token."
        )
    )]
    NoCredentials { profile: String },

    #[error("Configuration error: {message}")]
    #[diagnostic(code(csi::config))]
    Config { message: String },

    #[error("{0}")]
    #[diagnostic(
        code(csi::retrofit),
        help("See: csi patch csm ipv6 --help")
    )]
    Core(#[source] CoreError),

    #[error("Could not build {service} client")]
    #[diagnostic(
        code(csi::client),
        help("Check the service URL and the ca_cert path in your profile.")
    )]
    Client {
        service: &'static str,
        #[source]
        source: csm_api::Error,
    },

    #[error("Refusing to commit without confirmation")]
    #[diagnostic(
        code(csi::confirmation_required),
        help("stdin is not a terminal. Pass --yes (-y) to commit non-interactively.")
    )]
    ConfirmationRequired,

    // ── Run failures ─────────────────────────────────────────────────
    #[error("Retrofit {phase} failed: {message}")]
    #[diagnostic(
        code(csi::run_failed),
        help("Backups of the pre-run and planned state are in {backup_dir}")
    )]
    RunFailed {
        phase: RunPhase,
        message: String,
        backup_dir: String,
    },

    // ── Output ───────────────────────────────────────────────────────
    #[error("Could not render output: {message}")]
    #[diagnostic(code(csi::render))]
    Render { message: String },

    #[error(transparent)]
    #[diagnostic(code(csi::io))]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Validation { .. }
            | Self::ProfileNotFound { .. }
            | Self::NoCredentials { .. }
            | Self::Config { .. }
            | Self::Client { .. }
            | Self::ConfirmationRequired => exit_code::USAGE,
            Self::Core(e) if e.is_configuration() => exit_code::USAGE,
            Self::RunFailed { phase, .. } => phase_exit_code(*phase),
            Self::Core(_) | Self::Render { .. } | Self::Io(_) => exit_code::DISCOVERY,
        }
    }
}

/// Exit code for a run that stopped in `phase`.
pub fn phase_exit_code(phase: RunPhase) -> i32 {
    match phase {
        RunPhase::Planning | RunPhase::Validating => exit_code::PLANNING,
        RunPhase::Committing => exit_code::COMMIT,
        RunPhase::Idle => exit_code::USAGE,
        RunPhase::Discovering
        | RunPhase::DryRunHalt
        | RunPhase::Reporting
        | RunPhase::Done
        | RunPhase::Failed => exit_code::DISCOVERY,
    }
}

// ── Conversions ──────────────────────────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::UnknownProfile { profile } => Self::ProfileNotFound {
                name: profile,
                path: csm_config::config_path().display().to_string(),
            },
            ConfigError::NoCredentials { profile } => Self::NoCredentials { profile },
            ConfigError::Figment(e) => Self::Config {
                message: e.to_string(),
            },
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        Self::Core(err)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        Self::Render {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for CliError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Render {
            message: err.to_string(),
        }
    }
}
