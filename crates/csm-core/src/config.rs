// ── Run configuration ──
//
// Everything that shapes one retrofit run. The CLI builds a
// `RetrofitConfig` and hands it to the `Orchestrator`; core never reads
// flags or config files itself.

use std::collections::HashSet;
use std::path::PathBuf;

use csm_api::UpsertMethod;
use serde::Serialize;

use crate::allocator;
use crate::error::CoreError;

/// Subnets targeted when the operator does not pass `--subnets`.
pub const DEFAULT_SUBNETS: &[&str] = &["bootstrap_dhcp", "network_hardware"];

/// Networks cleared by `--remove` when no network is named explicitly.
pub const DEFAULT_REMOVE_NETWORKS: &[&str] = &["CMN", "CHN"];

/// Add IPv6 data, or clear it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, strum::Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum RetrofitMode {
    #[default]
    Add,
    Remove,
}

/// What happens to the remaining BSS writes after one node fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, strum::Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum BootWritePolicy {
    /// Stop at the first failed node; already-written nodes stand.
    #[default]
    AbortOnFirst,
    /// Keep writing unrelated nodes and report every failure.
    BestEffort,
}

/// One network to retrofit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkTarget {
    /// Network name as known to SLS (`CMN`, `CHN`, ...). Matched
    /// case-insensitively.
    pub name: String,
    /// Operator-supplied IPv6 supernet. Required in add mode.
    pub cidr6: Option<String>,
    /// Operator-supplied network gateway. Derived when absent.
    pub gateway6: Option<String>,
}

impl NetworkTarget {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cidr6: None,
            gateway6: None,
        }
    }

    pub fn with_cidr6(mut self, cidr6: impl Into<String>) -> Self {
        self.cidr6 = Some(cidr6.into());
        self
    }

    pub fn with_gateway6(mut self, gateway6: impl Into<String>) -> Self {
        self.gateway6 = Some(gateway6.into());
        self
    }
}

/// Configuration for one orchestrator run.
#[derive(Debug, Clone)]
pub struct RetrofitConfig {
    pub mode: RetrofitMode,
    /// Overwrite existing IPv6 data instead of skipping it.
    pub force: bool,
    /// Perform remote writes. `false` is a dry run.
    pub commit: bool,
    pub networks: Vec<NetworkTarget>,
    /// Subnets to carve, in carve order.
    pub subnets: Vec<String>,
    /// Supernet exceptions: `subnet` (any targeted network) or
    /// `NETWORK/subnet` (one network).
    pub supernet_subnets: Vec<String>,
    pub backup_dir: PathBuf,
    /// Stamp appended to every backup file name.
    pub run_timestamp: String,
    pub boot_write_policy: BootWritePolicy,
    pub upsert_method: UpsertMethod,
}

impl RetrofitConfig {
    /// A dry-run add configuration with default subnets.
    pub fn new(backup_dir: impl Into<PathBuf>, run_timestamp: impl Into<String>) -> Self {
        Self {
            mode: RetrofitMode::Add,
            force: false,
            commit: false,
            networks: Vec::new(),
            subnets: DEFAULT_SUBNETS.iter().map(|s| (*s).to_owned()).collect(),
            supernet_subnets: Vec::new(),
            backup_dir: backup_dir.into(),
            run_timestamp: run_timestamp.into(),
            boot_write_policy: BootWritePolicy::default(),
            upsert_method: UpsertMethod::default(),
        }
    }

    /// Whether `subnet` of `network` shares the network's own block.
    pub fn is_supernetted(&self, network: &str, subnet: &str) -> bool {
        self.supernet_subnets.iter().any(|entry| match entry.split_once('/') {
            Some((net, sub)) => net.eq_ignore_ascii_case(network) && sub == subnet,
            None => entry == subnet,
        })
    }

    /// Reject inconsistent configurations before anything is fetched.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.force && self.mode == RetrofitMode::Remove {
            return Err(CoreError::Config {
                message: "--force and --remove are mutually exclusive".into(),
            });
        }

        if self.networks.is_empty() {
            return Err(CoreError::Config {
                message: match self.mode {
                    RetrofitMode::Add => "no network was given an IPv6 CIDR".into(),
                    RetrofitMode::Remove => "no network selected for removal".into(),
                },
            });
        }

        if self.mode == RetrofitMode::Add && self.subnets.is_empty() {
            return Err(CoreError::Config {
                message: "subnet selection is empty".into(),
            });
        }

        let mut seen = HashSet::new();
        for target in &self.networks {
            if !seen.insert(target.name.to_ascii_uppercase()) {
                return Err(CoreError::Config {
                    message: format!("network {} is targeted twice", target.name),
                });
            }
            if self.mode == RetrofitMode::Add {
                self.validate_target(target)?;
            }
        }

        Ok(())
    }

    fn validate_target(&self, target: &NetworkTarget) -> Result<(), CoreError> {
        let Some(cidr6) = target.cidr6.as_deref() else {
            return Err(CoreError::Config {
                message: format!("network {} needs an IPv6 CIDR", target.name),
            });
        };
        let supernet = allocator::parse_supernet(&target.name, cidr6)?;
        allocator::resolve_gateway(&target.name, supernet, target.gateway6.as_deref())?;
        Ok(())
    }
}
