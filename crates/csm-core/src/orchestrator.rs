// ── Retrofit orchestrator ──
//
// Drives one run through Discovering → Planning → Validating →
// (DryRunHalt | Committing) → Reporting. Discovery yields a dump, planning
// yields a `PatchPlan`, commit consumes the plan. Every remote call is
// awaited before the next one starts.

use std::collections::HashSet;

use csm_api::{DumpState, NetworkDescriptor};
use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::allocator::{self, SubnetDemand};
use crate::assignment::{self, Assignment, NetworkAssignment, replace};
use crate::backup::BackupWriter;
use crate::config::{BootWritePolicy, NetworkTarget, RetrofitConfig, RetrofitMode};
use crate::error::{CoreError, ServiceKind};
use crate::identity::{IdentityClassifier, XnameClassifier};
use crate::plan::{
    BootUpdate, Conflict, EntityChange, EntityKind, NetworkPlan, PatchPlan, PlanFailure,
};
use crate::report::{NetworkOutcome, NodeOutcome, OutcomeStatus, RunFailure, RunPhase, RunReport};
use crate::service::{BootParameterService, TopologyService};

/// A fatal error together with the phase it stopped the run in.
type PhaseError = (RunPhase, CoreError);

/// One retrofit run over a topology and a boot parameter service.
pub struct Orchestrator<T, B, C = XnameClassifier> {
    config: RetrofitConfig,
    topology: T,
    boot: B,
    classifier: C,
    phase: RunPhase,
}

impl<T, B> Orchestrator<T, B, XnameClassifier>
where
    T: TopologyService + Sync,
    B: BootParameterService + Sync,
{
    pub fn new(config: RetrofitConfig, topology: T, boot: B) -> Self {
        Self::with_classifier(config, topology, boot, XnameClassifier)
    }
}

impl<T, B, C> Orchestrator<T, B, C>
where
    T: TopologyService + Sync,
    B: BootParameterService + Sync,
    C: IdentityClassifier + Sync,
{
    pub fn with_classifier(config: RetrofitConfig, topology: T, boot: B, classifier: C) -> Self {
        Self {
            config,
            topology,
            boot,
            classifier,
            phase: RunPhase::Idle,
        }
    }

    pub fn config(&self) -> &RetrofitConfig {
        &self.config
    }

    /// Current state machine phase.
    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    fn enter(&mut self, phase: RunPhase) {
        info!(from = %self.phase, to = %phase, "phase transition");
        self.phase = phase;
    }

    /// Execute the run.
    ///
    /// Only configuration errors are returned as `Err`; every later
    /// failure is recorded in the report together with the phase it
    /// happened in, so partially committed runs still produce a full
    /// outcome list.
    pub async fn run(&mut self) -> Result<RunReport, CoreError> {
        self.config.validate()?;

        let mut backups =
            BackupWriter::new(self.config.backup_dir.clone(), self.config.run_timestamp.clone());
        let mut report = RunReport::new(
            self.config.mode,
            self.config.commit,
            self.config.backup_dir.clone(),
        );

        info!(
            mode = %self.config.mode,
            commit = self.config.commit,
            force = self.config.force,
            backup_dir = %self.config.backup_dir.display(),
            "starting IPv6 retrofit"
        );

        match self.execute(&mut backups, &mut report).await {
            Ok(()) => {}
            Err((phase, err)) => {
                error!(%phase, error = %err, "run failed");
                report.failure = Some(RunFailure {
                    phase,
                    message: err.to_string(),
                });
            }
        }

        self.enter(RunPhase::Reporting);
        report.backups = backups.written().to_vec();
        let final_phase = if report.failure.is_some() {
            RunPhase::Failed
        } else {
            RunPhase::Done
        };
        self.enter(final_phase);
        report.phase = final_phase;
        Ok(report)
    }

    async fn execute(
        &mut self,
        backups: &mut BackupWriter,
        report: &mut RunReport,
    ) -> Result<(), PhaseError> {
        // ── Discovering ──
        self.enter(RunPhase::Discovering);
        let dump = self.topology.fetch_all().await.map_err(|e| {
            (
                RunPhase::Discovering,
                CoreError::service(ServiceKind::Topology, "fetch", "dumpstate", e),
            )
        })?;
        info!(networks = dump.networks.len(), "fetched SLS dump");
        backups
            .write("sls-dumpstate", &dump)
            .map_err(|e| (RunPhase::Discovering, e))?;

        // ── Planning ──
        self.enter(RunPhase::Planning);
        let plan = self.plan(&dump).await?;

        backups
            .write("bss-bootparameters-original", &plan.original_boot_parameters())
            .map_err(|e| (RunPhase::Planning, e))?;
        backups
            .write("sls-networks-planned", &plan.planned_networks())
            .map_err(|e| (RunPhase::Planning, e))?;
        backups
            .write("bss-bootparameters-planned", &plan.planned_boot_parameters())
            .map_err(|e| (RunPhase::Planning, e))?;

        report.allocations = plan
            .networks
            .iter()
            .filter_map(|n| n.allocation.clone())
            .collect();
        report.changes.clone_from(&plan.changes);
        report.conflicts.clone_from(&plan.conflicts);
        for failure in &plan.failures {
            report.networks.push(NetworkOutcome {
                network: failure.network.clone(),
                status: OutcomeStatus::PlanningFailed,
                detail: Some(failure.error.to_string()),
            });
        }
        for network in &plan.absent {
            report.networks.push(NetworkOutcome {
                network: network.clone(),
                status: OutcomeStatus::Absent,
                detail: Some("not present in SLS".into()),
            });
        }

        // ── Validating ──
        self.enter(RunPhase::Validating);
        if plan.has_conflicts() {
            warn!(
                conflicts = plan.conflicts.len(),
                "existing IPv6 data was left in place; rerun with --force to overwrite"
            );
        }

        if self.config.commit {
            self.enter(RunPhase::Committing);
            self.commit(&plan, backups, report).await?;
        } else {
            self.enter(RunPhase::DryRunHalt);
            dry_run_outcomes(&plan, report);
        }

        if !plan.failures.is_empty() {
            return Err((
                RunPhase::Planning,
                CoreError::PlanningFailed {
                    networks: plan.failures.iter().map(|f| f.network.clone()).collect(),
                    applied: report
                        .networks
                        .iter()
                        .filter(|n| n.status == OutcomeStatus::Applied)
                        .map(|n| n.network.clone())
                        .collect(),
                },
            ));
        }
        Ok(())
    }

    // ── Planning ─────────────────────────────────────────────────────

    async fn plan(&self, dump: &DumpState) -> Result<PatchPlan, PhaseError> {
        let mut plan = PatchPlan::new(self.config.mode);
        let mut matched = HashSet::new();

        for (key, network) in &dump.networks {
            let Some(target) = self.target_for(key, network) else {
                continue;
            };
            matched.insert(target.name.to_ascii_uppercase());

            let planned = match self.config.mode {
                RetrofitMode::Add => self.plan_add(target, network),
                RetrofitMode::Remove => Ok((assignment::clear_network(network), None)),
            };

            match planned {
                Ok((assigned, allocation)) => {
                    let NetworkAssignment {
                        network: updated,
                        assignments,
                        changes,
                        conflicts,
                    } = assigned;
                    debug!(
                        network = %key,
                        changes = changes.len(),
                        conflicts = conflicts.len(),
                        "planned network"
                    );
                    plan.changes.extend(changes);
                    plan.conflicts.extend(conflicts);
                    plan.networks.push(NetworkPlan {
                        name: key.clone(),
                        changed: updated != *network,
                        network: updated,
                        allocation,
                        assignments,
                    });
                }
                Err(e @ CoreError::UnparseableAddress { .. }) => {
                    return Err((RunPhase::Planning, e));
                }
                Err(e) => {
                    warn!(network = %key, error = %e, "network could not be planned");
                    plan.failures.push(PlanFailure {
                        network: key.clone(),
                        error: e,
                    });
                }
            }
        }

        for target in &self.config.networks {
            if matched.contains(&target.name.to_ascii_uppercase()) {
                continue;
            }
            match self.config.mode {
                RetrofitMode::Add => plan.failures.push(PlanFailure {
                    network: target.name.clone(),
                    error: CoreError::NetworkNotFound {
                        network: target.name.clone(),
                    },
                }),
                RetrofitMode::Remove => {
                    info!(network = %target.name, "network not in SLS, nothing to remove");
                    plan.absent.push(target.name.clone());
                }
            }
        }

        let boot = self.plan_boot_parameters(&plan.networks).await?;
        plan.boot_updates = boot.updates;
        plan.changes.extend(boot.changes);
        plan.conflicts.extend(boot.conflicts);

        info!(
            networks = plan.networks.len(),
            failed = plan.failures.len(),
            nodes = plan.boot_updates.len(),
            conflicts = plan.conflicts.len(),
            "plan complete"
        );
        Ok(plan)
    }

    fn target_for(&self, key: &str, network: &NetworkDescriptor) -> Option<&NetworkTarget> {
        self.config.networks.iter().find(|t| {
            t.name.eq_ignore_ascii_case(key) || t.name.eq_ignore_ascii_case(&network.name)
        })
    }

    fn plan_add(
        &self,
        target: &NetworkTarget,
        network: &NetworkDescriptor,
    ) -> Result<(NetworkAssignment, Option<allocator::NetworkAllocation>), CoreError> {
        let name = network.name.as_str();
        let cidr6 = target.cidr6.as_deref().ok_or_else(|| CoreError::Config {
            message: format!("network {name} needs an IPv6 CIDR"),
        })?;
        let supernet = allocator::parse_supernet(name, cidr6)?;
        let (gateway, derived) =
            allocator::resolve_gateway(name, supernet, target.gateway6.as_deref())?;

        let mut demands = Vec::new();
        for subnet_name in &self.config.subnets {
            let Some(subnet) = network.subnet(subnet_name) else {
                debug!(network = name, subnet = %subnet_name, "subnet not present, skipping");
                continue;
            };
            // Order check first: a bad IPv4 address fails the run even
            // when this network would also fail to allocate.
            assignment::ipv4_order(name, subnet)?;
            demands.push(SubnetDemand {
                name: subnet.name.clone(),
                required: u128::try_from(subnet.ip_reservations.len()).unwrap_or(u128::MAX),
                supernetted: self.config.is_supernetted(name, &subnet.name),
            });
        }

        let allocation = allocator::allocate(name, supernet, gateway, derived, &demands)?;
        let assigned = assignment::assign_network(network, &allocation, self.config.force)?;
        Ok((assigned, Some(allocation)))
    }

    async fn plan_boot_parameters(&self, networks: &[NetworkPlan]) -> Result<BootPlan, PhaseError> {
        let mut out = BootPlan::default();
        let mut missing = HashSet::new();
        let mut seen = HashSet::new();

        for assignment in networks.iter().flat_map(|n| &n.assignments) {
            let Some(owner) = assignment.owner.as_deref() else {
                debug!(reservation = %assignment.reservation, "no owner tag, skipping BSS");
                continue;
            };
            let xname = match self.classifier.classify(owner) {
                Ok(x) if x.is_node() => x,
                Ok(x) => {
                    debug!(owner, kind = %x.kind(), "not a node, skipping BSS");
                    continue;
                }
                Err(e) => {
                    debug!(owner, error = %e, "unclassified owner, skipping BSS");
                    continue;
                }
            };
            let xname = xname.as_str();

            if missing.contains(xname) {
                continue;
            }
            if !seen.insert((xname.to_owned(), assignment.network.to_ascii_lowercase())) {
                debug!(xname, network = %assignment.network, "node already planned for network");
                continue;
            }

            if !out.updates.contains_key(xname) {
                let fetched = self.boot.fetch(xname).await.map_err(|e| {
                    (
                        RunPhase::Discovering,
                        CoreError::service(ServiceKind::BootParameters, "fetch", xname, e),
                    )
                })?;
                let Some(record) = fetched else {
                    debug!(xname, "no boot parameters, skipping BSS");
                    missing.insert(xname.to_owned());
                    continue;
                };
                out.updates.insert(
                    xname.to_owned(),
                    BootUpdate {
                        xname: xname.to_owned(),
                        original: record.clone(),
                        record,
                        networks: Vec::new(),
                    },
                );
            }

            if let Some(update) = out.updates.get_mut(xname) {
                apply_ipam(
                    update,
                    assignment,
                    self.config.force,
                    &mut out.changes,
                    &mut out.conflicts,
                );
            }
        }

        Ok(out)
    }

    // ── Committing ───────────────────────────────────────────────────

    async fn commit(
        &self,
        plan: &PatchPlan,
        backups: &mut BackupWriter,
        report: &mut RunReport,
    ) -> Result<(), PhaseError> {
        let mut failure: Option<CoreError> = None;
        let mut backup_failure: Option<CoreError> = None;

        for network_plan in &plan.networks {
            let name = network_plan.name.as_str();
            let (status, detail) = if !network_plan.changed {
                (OutcomeStatus::Unchanged, None)
            } else if failure.is_some() {
                (
                    OutcomeStatus::Skipped,
                    Some("earlier SLS write failed".to_owned()),
                )
            } else {
                match self.write_network(network_plan).await {
                    Ok(()) => (
                        OutcomeStatus::Applied,
                        backup_written(
                            backups,
                            &format!("sls-network-{name}-committed"),
                            name,
                            &network_plan.network,
                            &mut backup_failure,
                        ),
                    ),
                    Err(e) => {
                        error!(network = name, error = %e, "SLS write failed");
                        let detail = e.to_string();
                        failure = Some(e);
                        (OutcomeStatus::Failed, Some(detail))
                    }
                }
            };
            report.networks.push(NetworkOutcome {
                network: name.to_owned(),
                status,
                detail,
            });
        }

        if let Some(err) = failure {
            for update in plan.boot_updates.values().filter(|u| u.changed()) {
                report.nodes.push(NodeOutcome {
                    xname: update.xname.clone(),
                    networks: update.networks.clone(),
                    status: OutcomeStatus::Skipped,
                    detail: Some("SLS commit failed".into()),
                });
            }
            return Err((RunPhase::Committing, err));
        }

        let mut first_failure: Option<CoreError> = None;
        let mut failed = 0usize;
        let abort = self.config.boot_write_policy == BootWritePolicy::AbortOnFirst;

        for update in plan.boot_updates.values() {
            let xname = update.xname.as_str();
            let (status, detail) = if !update.changed() {
                (OutcomeStatus::Unchanged, None)
            } else if abort && first_failure.is_some() {
                (
                    OutcomeStatus::Skipped,
                    Some("earlier BSS write failed".to_owned()),
                )
            } else {
                match self.write_boot_parameters(update).await {
                    Ok(()) => (
                        OutcomeStatus::Applied,
                        backup_written(
                            backups,
                            &format!("bss-bootparameters-{xname}-committed"),
                            xname,
                            &update.record,
                            &mut backup_failure,
                        ),
                    ),
                    Err(e) => {
                        error!(xname, error = %e, "BSS write failed");
                        failed += 1;
                        let detail = e.to_string();
                        first_failure.get_or_insert(e);
                        (OutcomeStatus::Failed, Some(detail))
                    }
                }
            };
            report.nodes.push(NodeOutcome {
                xname: xname.to_owned(),
                networks: update.networks.clone(),
                status,
                detail,
            });
        }

        match (first_failure, backup_failure) {
            (None, None) => Ok(()),
            (None, Some(e)) => Err((RunPhase::Committing, e)),
            (Some(e), _) if failed == 1 => Err((RunPhase::Committing, e)),
            (Some(e), _) => Err((
                RunPhase::Committing,
                CoreError::BootWritesFailed {
                    failed,
                    first: Box::new(e),
                },
            )),
        }
    }

    async fn write_network(&self, network_plan: &NetworkPlan) -> Result<(), CoreError> {
        let name = network_plan.name.as_str();
        self.topology
            .put_network(&network_plan.network)
            .await
            .map_err(|e| CoreError::service(ServiceKind::Topology, "update", name, e))?;
        info!(network = name, "updated SLS network");
        Ok(())
    }

    async fn write_boot_parameters(&self, update: &BootUpdate) -> Result<(), CoreError> {
        let xname = update.xname.as_str();
        self.boot
            .put(&update.record, self.config.upsert_method)
            .await
            .map_err(|e| CoreError::service(ServiceKind::BootParameters, "update", xname, e))?;
        info!(xname, networks = ?update.networks, "updated BSS boot parameters");
        Ok(())
    }
}

/// Back up a record that was just written.
///
/// A failed backup leaves the write in place: the error is kept in
/// `failure` for the run and returned as the outcome detail.
fn backup_written<P: Serialize + ?Sized>(
    backups: &mut BackupWriter,
    name: &str,
    entity: &str,
    payload: &P,
    failure: &mut Option<CoreError>,
) -> Option<String> {
    let err = backups.write(name, payload).err()?;
    let err = CoreError::UnrecordedWrite {
        entity: entity.to_owned(),
        source: Box::new(err),
    };
    error!(entity, error = %err, "committed backup failed");
    let detail = err.to_string();
    failure.get_or_insert(err);
    Some(detail)
}

/// Node-side half of the plan.
#[derive(Debug, Default)]
struct BootPlan {
    updates: IndexMap<String, BootUpdate>,
    changes: Vec<EntityChange>,
    conflicts: Vec<Conflict>,
}

/// Mirror one reservation assignment into the node's IPAM entry.
fn apply_ipam(
    update: &mut BootUpdate,
    assignment: &Assignment,
    force: bool,
    changes: &mut Vec<EntityChange>,
    conflicts: &mut Vec<Conflict>,
) {
    let network = assignment.network.to_ascii_lowercase();
    let entity = format!("{}/{network}", update.xname);
    let Some(entry) = update.record.ipam_entry_mut(&assignment.network) else {
        debug!(%entity, "no IPAM entry for network, skipping");
        return;
    };

    let (ip6, gateway6) = match assignment.address {
        Some(address) => {
            if entry.has_ipv6() && !force {
                let mut fields = Vec::new();
                if entry.ip6.is_some() {
                    fields.push("ip6".to_owned());
                }
                if entry.gateway6.is_some() {
                    fields.push("gateway6".to_owned());
                }
                debug!(%entity, "existing IPv6 IPAM data, skipping");
                conflicts.push(Conflict {
                    kind: EntityKind::BootParameters,
                    entity,
                    fields,
                });
                return;
            }
            (
                Some(address.to_string()),
                assignment.gateway6.map(|g| g.to_string()),
            )
        }
        None => (None, None),
    };

    let mut fields = Vec::new();
    if replace(&mut entry.ip6, ip6) {
        fields.push("ip6".to_owned());
    }
    if replace(&mut entry.gateway6, gateway6) {
        fields.push("gateway6".to_owned());
    }
    if !fields.is_empty() {
        changes.push(EntityChange {
            kind: EntityKind::BootParameters,
            entity,
            fields,
        });
    }
    if !update.networks.contains(&network) {
        update.networks.push(network);
    }
}

fn dry_run_outcomes(plan: &PatchPlan, report: &mut RunReport) {
    for network_plan in &plan.networks {
        report.networks.push(NetworkOutcome {
            network: network_plan.name.clone(),
            status: if network_plan.changed {
                OutcomeStatus::WouldApply
            } else {
                OutcomeStatus::Unchanged
            },
            detail: None,
        });
    }
    for update in plan.boot_updates.values() {
        report.nodes.push(NodeOutcome {
            xname: update.xname.clone(),
            networks: update.networks.clone(),
            status: if update.changed() {
                OutcomeStatus::WouldApply
            } else {
                OutcomeStatus::Unchanged
            },
            detail: None,
        });
    }
}
