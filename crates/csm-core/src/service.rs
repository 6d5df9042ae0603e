// ── Service seams ──
//
// The orchestrator talks to SLS and BSS through these traits so tests can
// drive it with in-memory fakes. The HTTP clients implement them directly.

use std::future::Future;

use csm_api::{BootParameterRecord, BssClient, DumpState, NetworkDescriptor, SlsClient, UpsertMethod};

/// System of record for networks, subnets and reservations.
pub trait TopologyService {
    /// Full topology dump.
    fn fetch_all(&self) -> impl Future<Output = Result<DumpState, csm_api::Error>> + Send;

    /// Replace one network record.
    fn put_network(
        &self,
        network: &NetworkDescriptor,
    ) -> impl Future<Output = Result<(), csm_api::Error>> + Send;
}

/// System of record for per-node boot parameters.
pub trait BootParameterService {
    /// Boot record of one node; `None` when the service has none.
    fn fetch(
        &self,
        xname: &str,
    ) -> impl Future<Output = Result<Option<BootParameterRecord>, csm_api::Error>> + Send;

    fn put(
        &self,
        record: &BootParameterRecord,
        method: UpsertMethod,
    ) -> impl Future<Output = Result<(), csm_api::Error>> + Send;
}

impl TopologyService for SlsClient {
    fn fetch_all(&self) -> impl Future<Output = Result<DumpState, csm_api::Error>> + Send {
        self.dump_state()
    }

    fn put_network(
        &self,
        network: &NetworkDescriptor,
    ) -> impl Future<Output = Result<(), csm_api::Error>> + Send {
        SlsClient::put_network(self, network)
    }
}

impl BootParameterService for BssClient {
    fn fetch(
        &self,
        xname: &str,
    ) -> impl Future<Output = Result<Option<BootParameterRecord>, csm_api::Error>> + Send {
        self.get_boot_parameters(xname)
    }

    fn put(
        &self,
        record: &BootParameterRecord,
        method: UpsertMethod,
    ) -> impl Future<Output = Result<(), csm_api::Error>> + Send {
        self.upsert_boot_parameters(record, method)
    }
}
