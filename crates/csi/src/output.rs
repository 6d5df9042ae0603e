//! Output formatting: tables, JSON, YAML.
//!
//! Table output renders the run report as one table per section plus a
//! colored summary line. Structured formats serialize the report as is.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use tabled::{Table, Tabled, settings::Style};

use csm_core::{
    Conflict, NetworkAllocation, NetworkOutcome, NodeOutcome, OutcomeStatus, RunReport,
};

use crate::cli::OutputFormat;
use crate::error::CliError;

/// Color only when writing to a terminal and `NO_COLOR` is unset.
pub fn should_color() -> bool {
    io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none()
}

// ── Rows ─────────────────────────────────────────────────────────────

#[derive(Tabled)]
struct NetworkRow {
    #[tabled(rename = "Network")]
    network: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

impl From<&NetworkOutcome> for NetworkRow {
    fn from(n: &NetworkOutcome) -> Self {
        Self {
            network: n.network.clone(),
            status: n.status.to_string(),
            detail: n.detail.clone().unwrap_or_default(),
        }
    }
}

#[derive(Tabled)]
struct AllocationRow {
    #[tabled(rename = "Network")]
    network: String,
    #[tabled(rename = "Subnet")]
    subnet: String,
    #[tabled(rename = "CIDR6")]
    cidr6: String,
    #[tabled(rename = "Gateway6")]
    gateway6: String,
    #[tabled(rename = "Pool")]
    pool: String,
}

fn allocation_rows(alloc: &NetworkAllocation) -> impl Iterator<Item = AllocationRow> + '_ {
    alloc.subnets.iter().map(|s| AllocationRow {
        network: alloc.network.clone(),
        subnet: s.name.clone(),
        cidr6: s.cidr6.to_string(),
        gateway6: s.gateway6.to_string(),
        pool: if s.supernetted {
            s.pool.to_string()
        } else {
            String::new()
        },
    })
}

#[derive(Tabled)]
struct NodeRow {
    #[tabled(rename = "Node")]
    xname: String,
    #[tabled(rename = "Networks")]
    networks: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

impl From<&NodeOutcome> for NodeRow {
    fn from(n: &NodeOutcome) -> Self {
        Self {
            xname: n.xname.clone(),
            networks: n.networks.join(","),
            status: n.status.to_string(),
            detail: n.detail.clone().unwrap_or_default(),
        }
    }
}

#[derive(Tabled)]
struct ConflictRow {
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Entity")]
    entity: String,
    #[tabled(rename = "Existing fields")]
    fields: String,
}

impl From<&Conflict> for ConflictRow {
    fn from(c: &Conflict) -> Self {
        Self {
            kind: c.kind.to_string(),
            entity: c.entity.clone(),
            fields: c.fields.join(","),
        }
    }
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a run report in the chosen format.
pub fn render_report(
    format: OutputFormat,
    report: &RunReport,
    color: bool,
) -> Result<String, CliError> {
    match format {
        OutputFormat::Table => Ok(render_report_table(report, color)),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(report)?),
        OutputFormat::JsonCompact => Ok(serde_json::to_string(report)?),
        OutputFormat::Yaml => Ok(serde_yaml::to_string(report)?),
    }
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

// ── Table view ───────────────────────────────────────────────────────

fn render_table<R: Tabled>(rows: impl IntoIterator<Item = R>) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

fn render_report_table(report: &RunReport, color: bool) -> String {
    let mut sections = Vec::new();

    if !report.allocations.is_empty() {
        sections.push(render_table(
            report.allocations.iter().flat_map(allocation_rows),
        ));
    }
    if !report.networks.is_empty() {
        sections.push(render_table(report.networks.iter().map(NetworkRow::from)));
    }
    if !report.nodes.is_empty() {
        sections.push(render_table(report.nodes.iter().map(NodeRow::from)));
    }
    if report.conflicts_skipped() {
        sections.push(render_table(report.conflicts.iter().map(ConflictRow::from)));
    }
    sections.push(summary_line(report, color));
    sections.join("\n\n")
}

/// One-line verdict: dry run or commit, counts, conflicts, backups.
pub fn summary_line(report: &RunReport, color: bool) -> String {
    let verdict = match (report.committed, report.is_success()) {
        (false, true) => "Dry run complete, nothing written",
        (false, false) => "Dry run failed, nothing written",
        (true, true) => "Committed",
        (true, false) => "Commit incomplete",
    };
    let verdict = if !color {
        verdict.to_owned()
    } else if report.is_success() {
        verdict.green().bold().to_string()
    } else {
        verdict.red().bold().to_string()
    };

    let counts = if report.committed {
        format!(
            "{} applied, {} unchanged, {} failed, {} skipped",
            report.count(OutcomeStatus::Applied),
            report.count(OutcomeStatus::Unchanged),
            report.count(OutcomeStatus::Failed),
            report.count(OutcomeStatus::Skipped),
        )
    } else {
        format!(
            "{} would apply, {} unchanged",
            report.count(OutcomeStatus::WouldApply),
            report.count(OutcomeStatus::Unchanged),
        )
    };

    let mut line = format!("{verdict} ({} mode): {counts}", report.mode);
    if report.conflicts_skipped() {
        let note = format!(
            "{} conflicts skipped, rerun with --force to overwrite",
            report.conflicts.len()
        );
        line.push_str("; ");
        if color {
            line.push_str(&note.yellow().to_string());
        } else {
            line.push_str(&note);
        }
    }
    line.push_str(&format!("\nBackups: {}", report.backup_dir.display()));
    line
}
