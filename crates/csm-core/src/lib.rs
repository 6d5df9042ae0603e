// csm-core: IPv6 retrofit planning and orchestration for CSM management
// networks.
//
// The allocator and assignment engine are pure; the orchestrator drives
// them against SLS and BSS through the `service` traits and records
// every step in a `RunReport`.

pub mod allocator;
pub mod assignment;
pub mod backup;
pub mod config;
pub mod error;
pub mod identity;
pub mod orchestrator;
pub mod plan;
pub mod report;
pub mod service;

pub use allocator::{CarvedSubnet, NetworkAllocation, SubnetDemand};
pub use assignment::Assignment;
pub use backup::{BackupWriter, run_timestamp};
pub use config::{
    BootWritePolicy, DEFAULT_REMOVE_NETWORKS, DEFAULT_SUBNETS, NetworkTarget, RetrofitConfig,
    RetrofitMode,
};
pub use error::{CoreError, ServiceKind};
pub use identity::{HardwareKind, IdentityClassifier, Xname, XnameClassifier};
pub use orchestrator::Orchestrator;
pub use plan::{Conflict, EntityChange, EntityKind, PatchPlan};
pub use report::{NetworkOutcome, NodeOutcome, OutcomeStatus, RunFailure, RunPhase, RunReport};
pub use service::{BootParameterService, TopologyService};
