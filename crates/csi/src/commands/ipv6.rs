//! `csi patch csm ipv6` handler.

use std::path::PathBuf;

use chrono::Local;
use tracing::{debug, warn};

use csm_api::{BssClient, SlsClient, UpsertMethod};
use csm_config::Profile;
use csm_core::{
    BootWritePolicy, DEFAULT_REMOVE_NETWORKS, DEFAULT_SUBNETS, NetworkTarget, Orchestrator,
    RetrofitConfig, RetrofitMode, run_timestamp,
};

use crate::cli::{
    BootWritePolicyArg, GlobalOpts, Ipv6Args, NetworkValue, OutputFormat, UpsertMethodArg,
};
use crate::commands::util;
use crate::config;
use crate::error::CliError;
use crate::output;

pub async fn handle(args: Ipv6Args, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = csm_config::load_config()?;
    let profile_name = cfg.profile_name(global.profile.as_deref()).to_owned();
    let profile = cfg.profile(&profile_name)?;

    let timestamp = run_timestamp(Local::now());
    let retrofit = build_retrofit_config(&args, &profile, &timestamp)?;
    retrofit.validate()?;

    let settings = config::resolve_settings_with(global, &cfg)?;
    debug!(
        profile = %settings.profile_name,
        sls = %settings.sls_url,
        bss = %settings.bss_url,
        "resolved service endpoints"
    );

    if retrofit.commit {
        let names: Vec<&str> = retrofit.networks.iter().map(|n| n.name.as_str()).collect();
        let prompt = format!(
            "{} IPv6 data on {} in SLS and BSS?",
            match retrofit.mode {
                RetrofitMode::Add => "Write",
                RetrofitMode::Remove => "Clear",
            },
            names.join(", ")
        );
        if !util::confirm(&prompt, global.yes)? {
            if !global.quiet {
                eprintln!("Aborted, nothing written.");
            }
            return Ok(());
        }
    }

    let sls = SlsClient::new(&settings.sls_url, &settings.transport)
        .map_err(|source| CliError::Client { service: "SLS", source })?;
    let bss = BssClient::new(&settings.bss_url, &settings.transport)
        .map_err(|source| CliError::Client { service: "BSS", source })?;

    let mut orchestrator = Orchestrator::new(retrofit, sls, bss);
    let report = orchestrator.run().await?;

    let color = global.output == OutputFormat::Table && output::should_color();
    let rendered = output::render_report(global.output, &report, color)?;
    output::print_output(&rendered, global.quiet);

    match report.failure {
        Some(failure) => Err(CliError::RunFailed {
            phase: failure.phase,
            message: failure.message,
            backup_dir: report.backup_dir.display().to_string(),
        }),
        None => Ok(()),
    }
}

/// Translate command-line flags (and profile defaults) into a run config.
pub fn build_retrofit_config(
    args: &Ipv6Args,
    profile: &Profile,
    timestamp: &str,
) -> Result<RetrofitConfig, CliError> {
    let backup_dir = args
        .backup_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("./csm-ipv6-backup-{timestamp}")));
    let mut retrofit = RetrofitConfig::new(backup_dir, timestamp);

    retrofit.mode = if args.remove {
        RetrofitMode::Remove
    } else {
        RetrofitMode::Add
    };
    retrofit.force = args.force;
    retrofit.commit = args.commit;
    retrofit.boot_write_policy = match args.boot_write_policy {
        BootWritePolicyArg::AbortOnFirst => BootWritePolicy::AbortOnFirst,
        BootWritePolicyArg::BestEffort => BootWritePolicy::BestEffort,
    };
    retrofit.upsert_method = match args.upsert_method {
        UpsertMethodArg::Put => UpsertMethod::Put,
        UpsertMethodArg::Patch => UpsertMethod::Patch,
    };

    retrofit.subnets = match args.subnets.as_ref().or(profile.subnets.as_ref()) {
        Some(list) => util::clean_list(list),
        None => DEFAULT_SUBNETS.iter().map(|s| (*s).to_owned()).collect(),
    };
    retrofit.supernet_subnets = args
        .supernet_subnets
        .as_ref()
        .or(profile.supernet_subnets.as_ref())
        .map(|list| util::clean_list(list))
        .unwrap_or_default();

    let (cidrs, gateways) = network_flags(args);
    retrofit.networks = match retrofit.mode {
        RetrofitMode::Add => add_targets(&cidrs, &gateways)?,
        RetrofitMode::Remove => remove_targets(&cidrs, &gateways),
    };

    Ok(retrofit)
}

/// Per-network flags flattened into `NAME=VALUE` pairs, CMN and CHN first.
fn network_flags(args: &Ipv6Args) -> (Vec<NetworkValue>, Vec<NetworkValue>) {
    let named = |network: &str, value: Option<&String>| {
        value.map(|v| NetworkValue {
            network: network.to_owned(),
            value: v.trim().to_owned(),
        })
    };

    let cidrs = named("CMN", args.cmn_cidr6.as_ref())
        .into_iter()
        .chain(named("CHN", args.chn_cidr6.as_ref()))
        .chain(args.cidr6.iter().cloned())
        .collect();
    let gateways = named("CMN", args.cmn_gateway6.as_ref())
        .into_iter()
        .chain(named("CHN", args.chn_gateway6.as_ref()))
        .chain(args.gateway6.iter().cloned())
        .collect();
    (cidrs, gateways)
}

fn add_targets(
    cidrs: &[NetworkValue],
    gateways: &[NetworkValue],
) -> Result<Vec<NetworkTarget>, CliError> {
    if let Some(orphan) = gateways
        .iter()
        .find(|g| !cidrs.iter().any(|c| c.network.eq_ignore_ascii_case(&g.network)))
    {
        return Err(CliError::Validation {
            field: "gateway6".into(),
            reason: format!("{} has a gateway but no IPv6 CIDR", orphan.network),
        });
    }

    Ok(cidrs
        .iter()
        .map(|c| {
            let target = NetworkTarget::new(&c.network).with_cidr6(&c.value);
            match gateways
                .iter()
                .find(|g| g.network.eq_ignore_ascii_case(&c.network))
            {
                Some(g) => target.with_gateway6(&g.value),
                None => target,
            }
        })
        .collect())
}

fn remove_targets(cidrs: &[NetworkValue], gateways: &[NetworkValue]) -> Vec<NetworkTarget> {
    if !gateways.is_empty() {
        warn!("gateway flags are ignored with --remove");
    }
    if cidrs.is_empty() {
        return DEFAULT_REMOVE_NETWORKS
            .iter()
            .map(|name| NetworkTarget::new(*name))
            .collect();
    }
    cidrs
        .iter()
        .map(|c| NetworkTarget::new(&c.network))
        .collect()
}
