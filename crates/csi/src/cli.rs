//! Clap derive structures for the `csi` CLI.
//!
//! Defines the command tree, global flags, and shared types. Kept free of
//! crate-internal imports so `build.rs` can include it for man pages.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// csi -- CSM site tooling
#[derive(Debug, Parser)]
#[command(
    name = "csi",
    version,
    about = "CSM site tooling: retrofit IPv6 onto customer networks",
    long_about = "Plans and applies IPv6 addressing for CSM customer networks.\n\n\
        Reads the System Layout Service (SLS), carves the operator-supplied\n\
        IPv6 prefixes into subnets, assigns reservation addresses and mirrors\n\
        node addresses into the Boot Script Service (BSS). Runs are dry runs\n\
        unless --commit is given; every run writes JSON backups.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Configuration profile to use
    #[arg(long, short = 'p', env = "CSI_PROFILE", global = true)]
    pub profile: Option<String>,

    /// SLS base URL (overrides profile)
    #[arg(long, env = "CSI_SLS_URL", global = true)]
    pub sls_url: Option<String>,

    /// BSS base URL (overrides profile)
    #[arg(long, env = "CSI_BSS_URL", global = true)]
    pub bss_url: Option<String>,

    /// API gateway bearer token
    #[arg(long, env = "CSI_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "CSI_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "CSI_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds (default 30)
    #[arg(long, env = "CSI_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output Enum ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty tables (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Patch live system data
    Patch(PatchArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

// ── patch ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct PatchArgs {
    #[command(subcommand)]
    pub command: PatchCommand,
}

#[derive(Debug, Subcommand)]
pub enum PatchCommand {
    /// Patch CSM services
    Csm(CsmArgs),
}

#[derive(Debug, Args)]
pub struct CsmArgs {
    #[command(subcommand)]
    pub command: CsmCommand,
}

#[derive(Debug, Subcommand)]
pub enum CsmCommand {
    /// Add (or remove) IPv6 addressing on customer networks
    #[command(
        after_help = "Examples:\n  \
            csi patch csm ipv6 --cmn-cidr6 2001:db8:1::/64\n  \
            csi patch csm ipv6 --cmn-cidr6 2001:db8:1::/64 --chn-cidr6 2001:db8:2::/64 --commit\n  \
            csi patch csm ipv6 --remove --commit\n\n\
            Exit codes:\n  \
            0  success\n  \
            1  SLS/BSS read failed\n  \
            2  a network could not be planned (with --commit, the others are still written)\n  \
            3  a write failed\n  \
            4  invalid arguments or configuration"
    )]
    Ipv6(Ipv6Args),
}

#[derive(Debug, Args)]
pub struct Ipv6Args {
    /// Write changes to SLS and BSS (default is a dry run)
    #[arg(long)]
    pub commit: bool,

    /// Overwrite existing IPv6 data
    #[arg(long, conflicts_with = "remove")]
    pub force: bool,

    /// Clear IPv6 data instead of adding it
    #[arg(long)]
    pub remove: bool,

    /// Backup directory (default ./csm-ipv6-backup-<timestamp>)
    #[arg(long, value_name = "DIR")]
    pub backup_dir: Option<PathBuf>,

    /// Subnets to carve, in order (default bootstrap_dhcp,network_hardware)
    #[arg(long, value_name = "LIST", value_delimiter = ',')]
    pub subnets: Option<Vec<String>>,

    /// Subnets sharing their network's own prefix: SUBNET or NETWORK/SUBNET
    #[arg(long, value_name = "LIST", value_delimiter = ',')]
    pub supernet_subnets: Option<Vec<String>>,

    /// IPv6 prefix for CMN
    #[arg(long, value_name = "CIDR")]
    pub cmn_cidr6: Option<String>,

    /// IPv6 gateway for CMN (default: first host of the prefix)
    #[arg(long, value_name = "ADDR")]
    pub cmn_gateway6: Option<String>,

    /// IPv6 prefix for CHN
    #[arg(long, value_name = "CIDR")]
    pub chn_cidr6: Option<String>,

    /// IPv6 gateway for CHN (default: first host of the prefix)
    #[arg(long, value_name = "ADDR")]
    pub chn_gateway6: Option<String>,

    /// IPv6 prefix for any other network (repeatable)
    #[arg(long = "cidr6", value_name = "NAME=CIDR", value_parser = parse_network_value)]
    pub cidr6: Vec<NetworkValue>,

    /// IPv6 gateway for any other network (repeatable)
    #[arg(long = "gateway6", value_name = "NAME=ADDR", value_parser = parse_network_value)]
    pub gateway6: Vec<NetworkValue>,

    /// What to do with remaining BSS writes after one fails
    #[arg(long, value_enum, default_value = "abort-on-first")]
    pub boot_write_policy: BootWritePolicyArg,

    /// HTTP method used to write boot parameters
    #[arg(long, value_enum, default_value = "put")]
    pub upsert_method: UpsertMethodArg,
}

/// `NAME=VALUE` pair naming a network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkValue {
    pub network: String,
    pub value: String,
}

fn parse_network_value(raw: &str) -> Result<NetworkValue, String> {
    let (network, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{raw}'"))?;
    let network = network.trim();
    let value = value.trim();
    if network.is_empty() || value.is_empty() {
        return Err(format!("expected NAME=VALUE, got '{raw}'"));
    }
    Ok(NetworkValue {
        network: network.to_ascii_uppercase(),
        value: value.to_owned(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BootWritePolicyArg {
    /// Stop at the first failed node
    AbortOnFirst,
    /// Keep writing the remaining nodes
    BestEffort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum UpsertMethodArg {
    /// Replace the whole record
    Put,
    /// Merge into the existing record
    Patch,
}
