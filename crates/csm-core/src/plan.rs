// ── Patch plan ──
//
// The in-memory delta produced by planning. Discovery data is never
// touched; every planned record is a modified clone, so the plan can be
// dumped to backups, inspected and dropped without side effects.

use csm_api::{BootParameterRecord, NetworkDescriptor};
use indexmap::IndexMap;
use serde::Serialize;

use crate::allocator::NetworkAllocation;
use crate::assignment::Assignment;
use crate::config::RetrofitMode;
use crate::error::CoreError;

/// Kind of record a change or conflict concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum EntityKind {
    Network,
    Subnet,
    Reservation,
    BootParameters,
}

/// IPv6 data left unwritten because existing data was found and `force`
/// was not given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conflict {
    pub kind: EntityKind,
    /// `NETWORK`, `NETWORK/subnet`, `NETWORK/subnet/reservation` or
    /// `xname/network`.
    pub entity: String,
    pub fields: Vec<String>,
}

/// A field-level modification the plan will make.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityChange {
    pub kind: EntityKind,
    pub entity: String,
    pub fields: Vec<String>,
}

/// Planned state of one network.
#[derive(Debug, Clone)]
pub struct NetworkPlan {
    /// Network name as it appears in the dump.
    pub name: String,
    /// The updated record, ready to be written back.
    pub network: NetworkDescriptor,
    /// Carve result; `None` in remove mode.
    pub allocation: Option<NetworkAllocation>,
    pub assignments: Vec<Assignment>,
    /// Whether `network` differs from the discovered record.
    pub changed: bool,
}

/// Planned boot parameter update for one node.
#[derive(Debug, Clone)]
pub struct BootUpdate {
    pub xname: String,
    pub original: BootParameterRecord,
    pub record: BootParameterRecord,
    /// Networks whose IPAM entry was touched.
    pub networks: Vec<String>,
}

impl BootUpdate {
    pub fn changed(&self) -> bool {
        self.original != self.record
    }
}

/// A targeted network that could not be planned.
#[derive(Debug)]
pub struct PlanFailure {
    pub network: String,
    pub error: CoreError,
}

/// Everything one run intends to write.
#[derive(Debug, Default)]
pub struct PatchPlan {
    pub mode: RetrofitMode,
    /// Planned networks in dump order.
    pub networks: Vec<NetworkPlan>,
    pub failures: Vec<PlanFailure>,
    /// Remove-mode targets missing from the dump.
    pub absent: Vec<String>,
    /// Node updates keyed by xname, in the order nodes were first met.
    pub boot_updates: IndexMap<String, BootUpdate>,
    pub changes: Vec<EntityChange>,
    pub conflicts: Vec<Conflict>,
}

impl PatchPlan {
    pub fn new(mode: RetrofitMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    /// Planned network records keyed by name, for the plan backup.
    pub fn planned_networks(&self) -> IndexMap<&str, &NetworkDescriptor> {
        self.networks
            .iter()
            .map(|p| (p.name.as_str(), &p.network))
            .collect()
    }

    /// Boot records as fetched, for the pre-commit backup.
    pub fn original_boot_parameters(&self) -> Vec<&BootParameterRecord> {
        self.boot_updates.values().map(|u| &u.original).collect()
    }

    /// Boot records as they will be written.
    pub fn planned_boot_parameters(&self) -> Vec<&BootParameterRecord> {
        self.boot_updates
            .values()
            .filter(|u| u.changed())
            .map(|u| &u.record)
            .collect()
    }
}
