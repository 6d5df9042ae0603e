#![allow(clippy::unwrap_used)]

// Orchestrator tests against in-memory SLS and BSS fakes.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

use csm_api::{
    BootParameterRecord, DumpState, IpReservation, NetworkDescriptor, NetworkProperties,
    SubnetDescriptor, UpsertMethod,
};
use csm_core::{
    BootParameterService, BootWritePolicy, CoreError, NetworkTarget, Orchestrator, OutcomeStatus,
    RetrofitConfig, RetrofitMode, RunPhase, TopologyService,
};
use pretty_assertions::assert_eq;
use serde_json::json;

const NODE_A: &str = "x3000c0s1b0n0";
const NODE_B: &str = "x3000c0s2b0n0";

// ── Fakes ───────────────────────────────────────────────────────────

#[derive(Default)]
struct SlsState {
    dump: DumpState,
    puts: Vec<NetworkDescriptor>,
    fail_fetch: bool,
    fail_put: HashSet<String>,
}

#[derive(Clone, Default)]
struct FakeSls(Arc<Mutex<SlsState>>);

impl FakeSls {
    fn new(networks: Vec<NetworkDescriptor>) -> Self {
        let sls = Self::default();
        {
            let mut state = sls.0.lock().unwrap();
            for network in networks {
                state.dump.networks.insert(network.name.clone(), network);
            }
        }
        sls
    }

    fn network(&self, name: &str) -> NetworkDescriptor {
        self.0.lock().unwrap().dump.networks[name].clone()
    }

    fn put_count(&self) -> usize {
        self.0.lock().unwrap().puts.len()
    }
}

fn server_error(message: &str) -> csm_api::Error {
    csm_api::Error::Api {
        status: 500,
        message: message.into(),
        detail: None,
    }
}

impl TopologyService for FakeSls {
    async fn fetch_all(&self) -> Result<DumpState, csm_api::Error> {
        let state = self.0.lock().unwrap();
        if state.fail_fetch {
            return Err(server_error("dumpstate unavailable"));
        }
        Ok(state.dump.clone())
    }

    async fn put_network(&self, network: &NetworkDescriptor) -> Result<(), csm_api::Error> {
        let mut state = self.0.lock().unwrap();
        if state.fail_put.contains(&network.name) {
            return Err(server_error("write rejected"));
        }
        state.puts.push(network.clone());
        state
            .dump
            .networks
            .insert(network.name.clone(), network.clone());
        Ok(())
    }
}

#[derive(Default)]
struct BssState {
    records: Vec<BootParameterRecord>,
    puts: Vec<(BootParameterRecord, UpsertMethod)>,
    fail_fetch: bool,
    fail_put: HashSet<String>,
}

#[derive(Clone, Default)]
struct FakeBss(Arc<Mutex<BssState>>);

impl FakeBss {
    fn new(records: Vec<BootParameterRecord>) -> Self {
        let bss = Self::default();
        bss.0.lock().unwrap().records = records;
        bss
    }

    fn record(&self, xname: &str) -> BootParameterRecord {
        let state = self.0.lock().unwrap();
        state
            .records
            .iter()
            .find(|r| r.host() == Some(xname))
            .cloned()
            .unwrap()
    }

    fn put_hosts(&self) -> Vec<String> {
        self.0
            .lock()
            .unwrap()
            .puts
            .iter()
            .map(|(r, _)| r.host().unwrap_or_default().to_owned())
            .collect()
    }
}

impl BootParameterService for FakeBss {
    async fn fetch(&self, xname: &str) -> Result<Option<BootParameterRecord>, csm_api::Error> {
        let state = self.0.lock().unwrap();
        if state.fail_fetch {
            return Err(server_error("bss unavailable"));
        }
        Ok(state.records.iter().find(|r| r.host() == Some(xname)).cloned())
    }

    async fn put(
        &self,
        record: &BootParameterRecord,
        method: UpsertMethod,
    ) -> Result<(), csm_api::Error> {
        let mut state = self.0.lock().unwrap();
        let host = record.host().unwrap_or_default().to_owned();
        if state.fail_put.contains(&host) {
            return Err(server_error("write rejected"));
        }
        state.puts.push((record.clone(), method));
        if let Some(existing) = state.records.iter_mut().find(|r| r.host() == Some(host.as_str())) {
            *existing = record.clone();
        }
        Ok(())
    }
}

// ── Fixtures ────────────────────────────────────────────────────────

fn reservation(name: &str, ip: &str, owner: &str) -> IpReservation {
    IpReservation {
        name: name.into(),
        ip_address: ip.into(),
        comment: Some(owner.into()),
        ..IpReservation::default()
    }
}

fn network(name: &str, reservations: Vec<IpReservation>) -> NetworkDescriptor {
    NetworkDescriptor {
        name: name.into(),
        full_name: format!("{name} network"),
        network_type: "ethernet".into(),
        properties: NetworkProperties {
            cidr: Some("10.0.0.0/24".into()),
            subnets: vec![SubnetDescriptor {
                name: "bootstrap_dhcp".into(),
                cidr: Some("10.0.0.0/24".into()),
                gateway: Some("10.0.0.254".into()),
                vlan_id: 6,
                ip_reservations: reservations,
                ..SubnetDescriptor::default()
            }],
            ..NetworkProperties::default()
        },
        ..NetworkDescriptor::default()
    }
}

fn cmn() -> NetworkDescriptor {
    network(
        "CMN",
        vec![
            reservation("switch-a", "10.0.0.3", "x3000c0w14"),
            reservation("node-b", "10.0.0.2", NODE_B),
            reservation("node-a", "10.0.0.1", NODE_A),
        ],
    )
}

fn chn() -> NetworkDescriptor {
    network(
        "CHN",
        vec![
            reservation("node-a", "10.0.0.1", NODE_A),
            reservation("node-b", "10.0.0.2", NODE_B),
        ],
    )
}

fn boot_record(xname: &str) -> BootParameterRecord {
    serde_json::from_value(json!({
        "hosts": [xname],
        "kernel": "s3://boot-images/kernel",
        "cloud-init": {
            "meta-data": {
                "ipam": {
                    "cmn": { "gateway": "10.0.0.254", "ip": "10.0.0.1/24", "vlanid": 6 },
                    "chn": { "gateway": "10.0.0.254", "ip": "10.0.0.1/24", "vlanid": 7 }
                }
            },
            "user-data": {}
        }
    }))
    .unwrap()
}

fn fixtures() -> (FakeSls, FakeBss) {
    (
        FakeSls::new(vec![cmn()]),
        FakeBss::new(vec![boot_record(NODE_A), boot_record(NODE_B)]),
    )
}

fn add_config(dir: &Path, timestamp: &str, commit: bool) -> RetrofitConfig {
    let mut config = RetrofitConfig::new(dir, timestamp);
    config.commit = commit;
    config.networks = vec![NetworkTarget::new("CMN").with_cidr6("2001:db8:1::/64")];
    config
}

fn reservation_ipv6(network: &NetworkDescriptor, name: &str) -> Option<String> {
    network.properties.subnets[0]
        .ip_reservations
        .iter()
        .find(|r| r.name == name)
        .and_then(|r| r.ip_address6.clone())
}

fn ipam(record: &BootParameterRecord, network: &str) -> (Option<String>, Option<String>) {
    let mut record = record.clone();
    let entry = record.ipam_entry_mut(network).unwrap();
    (entry.ip6.clone(), entry.gateway6.clone())
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn commit_assigns_in_ipv4_order_and_writes_nodes_only() {
    let dir = tempfile::tempdir().unwrap();
    let (sls, bss) = fixtures();
    let config = add_config(dir.path(), "20260101T000000", true);

    let report = Orchestrator::new(config, sls.clone(), bss.clone())
        .run()
        .await
        .unwrap();

    assert!(report.is_success(), "{:?}", report.failure);
    assert_eq!(report.phase, RunPhase::Done);
    assert!(!report.conflicts_skipped());

    let cmn = sls.network("CMN");
    assert_eq!(cmn.properties.cidr6.as_deref(), Some("2001:db8:1::/64"));
    let subnet = &cmn.properties.subnets[0];
    assert_eq!(subnet.gateway6.as_deref(), Some("2001:db8:1::1"));
    assert_eq!(reservation_ipv6(&cmn, "node-a").as_deref(), Some("2001:db8:1::2"));
    assert_eq!(reservation_ipv6(&cmn, "node-b").as_deref(), Some("2001:db8:1::3"));
    assert_eq!(reservation_ipv6(&cmn, "switch-a").as_deref(), Some("2001:db8:1::4"));

    assert_eq!(sls.put_count(), 1);
    assert_eq!(bss.put_hosts(), [NODE_A, NODE_B]);
    assert_eq!(
        ipam(&bss.record(NODE_A), "cmn"),
        (
            Some("2001:db8:1::2/124".into()),
            Some("2001:db8:1::1".into())
        )
    );
    // Untouched networks and unmodelled fields survive.
    assert_eq!(ipam(&bss.record(NODE_B), "chn"), (None, None));
    assert_eq!(
        bss.record(NODE_B).extra.get("kernel"),
        Some(&json!("s3://boot-images/kernel"))
    );

    assert_eq!(report.network_status("CMN"), Some(OutcomeStatus::Applied));
    assert_eq!(report.node_status(NODE_A), Some(OutcomeStatus::Applied));
    assert_eq!(report.node_status(NODE_B), Some(OutcomeStatus::Applied));
    assert_eq!(report.allocations.len(), 1);
}

#[tokio::test]
async fn commit_writes_every_backup_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let (sls, bss) = fixtures();
    let ts = "20260101T000000";
    let report = Orchestrator::new(add_config(dir.path(), ts, true), sls, bss)
        .run()
        .await
        .unwrap();

    let mut names: Vec<String> = report
        .backups
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(
        names,
        [
            format!("bss-bootparameters-original-{ts}.json"),
            format!("bss-bootparameters-planned-{ts}.json"),
            format!("bss-bootparameters-{NODE_A}-committed-{ts}.json"),
            format!("bss-bootparameters-{NODE_B}-committed-{ts}.json"),
            format!("sls-dumpstate-{ts}.json"),
            format!("sls-network-CMN-committed-{ts}.json"),
            format!("sls-networks-planned-{ts}.json"),
        ]
    );
    for path in &report.backups {
        assert!(path.starts_with(dir.path()));
        assert!(path.exists());
    }

    // The dump backup is in SLS's own schema.
    let dump: DumpState = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join(format!("sls-dumpstate-{ts}.json"))).unwrap(),
    )
    .unwrap();
    assert_eq!(dump.networks["CMN"], cmn());
}

#[tokio::test]
async fn dry_run_makes_no_writes() {
    let dir = tempfile::tempdir().unwrap();
    let (sls, bss) = fixtures();
    let report = Orchestrator::new(add_config(dir.path(), "20260101T000000", false), sls.clone(), bss.clone())
        .run()
        .await
        .unwrap();

    assert!(report.is_success());
    assert!(!report.committed);
    assert_eq!(sls.put_count(), 0);
    assert!(bss.put_hosts().is_empty());
    assert_eq!(sls.network("CMN"), cmn());
    assert_eq!(report.network_status("CMN"), Some(OutcomeStatus::WouldApply));
    assert_eq!(report.node_status(NODE_A), Some(OutcomeStatus::WouldApply));
    // Same planning evidence as a commit run.
    assert_eq!(report.backups.len(), 4);
}

#[tokio::test]
async fn second_run_without_force_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let (sls, bss) = fixtures();

    Orchestrator::new(add_config(dir.path(), "20260101T000000", true), sls.clone(), bss.clone())
        .run()
        .await
        .unwrap();
    let after_first = sls.network("CMN");

    let report = Orchestrator::new(add_config(dir.path(), "20260101T000100", true), sls.clone(), bss.clone())
        .run()
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(sls.network("CMN"), after_first);
    assert_eq!(sls.put_count(), 1);
    assert_eq!(bss.put_hosts().len(), 2);
    assert!(report.conflicts_skipped());
    assert!(report.changes.is_empty());
    assert_eq!(report.network_status("CMN"), Some(OutcomeStatus::Unchanged));

    let entities: Vec<&str> = report.conflicts.iter().map(|c| c.entity.as_str()).collect();
    assert_eq!(
        entities,
        [
            "CMN",
            "CMN/bootstrap_dhcp",
            "CMN/bootstrap_dhcp/node-a",
            "CMN/bootstrap_dhcp/node-b",
            "CMN/bootstrap_dhcp/switch-a",
        ]
    );
}

#[tokio::test]
async fn remove_undoes_add() {
    let dir = tempfile::tempdir().unwrap();
    let (sls, bss) = fixtures();

    Orchestrator::new(add_config(dir.path(), "20260101T000000", true), sls.clone(), bss.clone())
        .run()
        .await
        .unwrap();

    let mut remove = RetrofitConfig::new(dir.path(), "20260101T000100");
    remove.mode = RetrofitMode::Remove;
    remove.commit = true;
    remove.networks = vec![NetworkTarget::new("CMN"), NetworkTarget::new("CHN")];
    let report = Orchestrator::new(remove, sls.clone(), bss.clone())
        .run()
        .await
        .unwrap();

    assert!(report.is_success(), "{:?}", report.failure);
    assert_eq!(sls.network("CMN"), cmn());
    assert_eq!(bss.record(NODE_A), boot_record(NODE_A));
    assert_eq!(bss.record(NODE_B), boot_record(NODE_B));
    assert_eq!(report.network_status("CHN"), Some(OutcomeStatus::Absent));
}

#[tokio::test]
async fn sls_failure_skips_remaining_writes() {
    let dir = tempfile::tempdir().unwrap();
    let sls = FakeSls::new(vec![cmn(), chn()]);
    let bss = FakeBss::new(vec![boot_record(NODE_A), boot_record(NODE_B)]);
    sls.0.lock().unwrap().fail_put.insert("CMN".into());

    let mut config = add_config(dir.path(), "20260101T000000", true);
    config
        .networks
        .push(NetworkTarget::new("CHN").with_cidr6("2001:db8:2::/64"));

    let report = Orchestrator::new(config, sls.clone(), bss.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(report.phase, RunPhase::Failed);
    assert_eq!(report.failed_phase(), Some(RunPhase::Committing));
    assert_eq!(report.network_status("CMN"), Some(OutcomeStatus::Failed));
    assert_eq!(report.network_status("CHN"), Some(OutcomeStatus::Skipped));
    assert_eq!(sls.put_count(), 0);
    assert!(bss.put_hosts().is_empty());
    assert_eq!(report.node_status(NODE_A), Some(OutcomeStatus::Skipped));
}

#[tokio::test]
async fn boot_failure_aborts_remaining_nodes_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let (sls, bss) = fixtures();
    bss.0.lock().unwrap().fail_put.insert(NODE_A.into());

    let report = Orchestrator::new(add_config(dir.path(), "20260101T000000", true), sls.clone(), bss.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(report.failed_phase(), Some(RunPhase::Committing));
    assert_eq!(report.network_status("CMN"), Some(OutcomeStatus::Applied));
    assert_eq!(report.node_status(NODE_A), Some(OutcomeStatus::Failed));
    assert_eq!(report.node_status(NODE_B), Some(OutcomeStatus::Skipped));
    assert!(bss.put_hosts().is_empty());
    // Applied SLS writes stand.
    assert_eq!(sls.put_count(), 1);
}

#[tokio::test]
async fn best_effort_keeps_writing_other_nodes() {
    let dir = tempfile::tempdir().unwrap();
    let (sls, bss) = fixtures();
    bss.0.lock().unwrap().fail_put.insert(NODE_A.into());

    let mut config = add_config(dir.path(), "20260101T000000", true);
    config.boot_write_policy = BootWritePolicy::BestEffort;
    let report = Orchestrator::new(config, sls, bss.clone()).run().await.unwrap();

    assert_eq!(report.failed_phase(), Some(RunPhase::Committing));
    assert_eq!(report.node_status(NODE_A), Some(OutcomeStatus::Failed));
    assert_eq!(report.node_status(NODE_B), Some(OutcomeStatus::Applied));
    assert_eq!(bss.put_hosts(), [NODE_B]);
}

#[tokio::test]
async fn capacity_failure_is_per_network() {
    let dir = tempfile::tempdir().unwrap();
    let crowded = network(
        "CHN",
        (1..=40)
            .map(|i| reservation(&format!("host-{i}"), &format!("10.0.0.{i}"), "free text"))
            .collect(),
    );
    let sls = FakeSls::new(vec![cmn(), crowded]);
    let bss = FakeBss::new(vec![boot_record(NODE_A), boot_record(NODE_B)]);

    let mut config = add_config(dir.path(), "20260101T000000", true);
    config
        .networks
        .push(NetworkTarget::new("CHN").with_cidr6("2001:db8:2::/124"));

    let report = Orchestrator::new(config, sls.clone(), bss.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(report.failed_phase(), Some(RunPhase::Planning));
    assert_eq!(report.network_status("CHN"), Some(OutcomeStatus::PlanningFailed));
    assert_eq!(report.network_status("CMN"), Some(OutcomeStatus::Applied));
    assert_eq!(sls.put_count(), 1);
    assert_eq!(bss.put_hosts().len(), 2);
}

#[tokio::test]
async fn planning_failure_message_names_committed_networks() {
    let dir = tempfile::tempdir().unwrap();
    let crowded = network(
        "CHN",
        (1..=40)
            .map(|i| reservation(&format!("host-{i}"), &format!("10.0.0.{i}"), "free text"))
            .collect(),
    );
    let sls = FakeSls::new(vec![cmn(), crowded]);
    let bss = FakeBss::new(vec![boot_record(NODE_A), boot_record(NODE_B)]);

    let mut config = add_config(dir.path(), "20260101T000000", true);
    config
        .networks
        .push(NetworkTarget::new("CHN").with_cidr6("2001:db8:2::/124"));
    let report = Orchestrator::new(config, sls, bss).run().await.unwrap();

    let failure = report.failure.unwrap();
    assert_eq!(failure.phase, RunPhase::Planning);
    assert_eq!(
        failure.message,
        "Planning failed for network(s): CHN (other networks were committed: CMN)"
    );
}

#[tokio::test]
async fn dry_run_planning_failure_mentions_no_commit() {
    let dir = tempfile::tempdir().unwrap();
    let (sls, bss) = fixtures();
    let mut config = add_config(dir.path(), "20260101T000000", false);
    config
        .networks
        .push(NetworkTarget::new("CHN").with_cidr6("2001:db8:2::/64"));

    let report = Orchestrator::new(config, sls, bss).run().await.unwrap();
    assert_eq!(
        report.failure.unwrap().message,
        "Planning failed for network(s): CHN"
    );
}

#[tokio::test]
async fn existing_network_prefix_leaves_network_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let mut preset = cmn();
    preset.properties.cidr6 = Some("2001:db8:9::/64".into());
    let sls = FakeSls::new(vec![preset.clone()]);
    let bss = FakeBss::new(vec![boot_record(NODE_A), boot_record(NODE_B)]);

    let report = Orchestrator::new(add_config(dir.path(), "20260101T000000", true), sls.clone(), bss.clone())
        .run()
        .await
        .unwrap();

    assert!(report.is_success(), "{:?}", report.failure);
    assert_eq!(sls.put_count(), 0);
    assert!(bss.put_hosts().is_empty());
    let cmn = sls.network("CMN");
    assert_eq!(cmn, preset);
    assert_eq!(cmn.properties.subnets[0].cidr6, None);
    assert_eq!(reservation_ipv6(&cmn, "node-a"), None);
    assert_eq!(report.network_status("CMN"), Some(OutcomeStatus::Unchanged));
    assert!(report.changes.is_empty());

    let entities: Vec<&str> = report.conflicts.iter().map(|c| c.entity.as_str()).collect();
    assert_eq!(
        entities,
        [
            "CMN",
            "CMN/bootstrap_dhcp",
            "CMN/bootstrap_dhcp/node-a",
            "CMN/bootstrap_dhcp/node-b",
            "CMN/bootstrap_dhcp/switch-a",
        ]
    );
}

#[tokio::test]
async fn remove_clears_boot_data_left_after_sls_was_cleared() {
    let dir = tempfile::tempdir().unwrap();
    let stale = |xname: &str, ip6: &str| {
        let mut record = boot_record(xname);
        let entry = record.ipam_entry_mut("cmn").unwrap();
        entry.ip6 = Some(ip6.into());
        entry.gateway6 = Some("2001:db8:1::1".into());
        record
    };
    let sls = FakeSls::new(vec![cmn()]);
    let bss = FakeBss::new(vec![
        stale(NODE_A, "2001:db8:1::2/124"),
        stale(NODE_B, "2001:db8:1::3/124"),
    ]);

    let mut remove = RetrofitConfig::new(dir.path(), "20260101T000000");
    remove.mode = RetrofitMode::Remove;
    remove.commit = true;
    remove.networks = vec![NetworkTarget::new("CMN")];
    let report = Orchestrator::new(remove, sls.clone(), bss.clone())
        .run()
        .await
        .unwrap();

    assert!(report.is_success(), "{:?}", report.failure);
    assert_eq!(sls.put_count(), 0);
    assert_eq!(report.network_status("CMN"), Some(OutcomeStatus::Unchanged));
    assert_eq!(report.node_status(NODE_A), Some(OutcomeStatus::Applied));
    assert_eq!(report.node_status(NODE_B), Some(OutcomeStatus::Applied));
    assert_eq!(ipam(&bss.record(NODE_A), "cmn"), (None, None));
    assert_eq!(bss.record(NODE_A), boot_record(NODE_A));
    assert_eq!(bss.record(NODE_B), boot_record(NODE_B));
}

#[tokio::test]
async fn failed_backup_after_sls_write_still_writes_nodes() {
    let dir = tempfile::tempdir().unwrap();
    let ts = "20260101T000000";
    let (sls, bss) = fixtures();
    // Occupy the committed artifact's name; backups are write-once.
    let taken = dir.path().join(format!("sls-network-CMN-committed-{ts}.json"));
    std::fs::write(&taken, "{}\n").unwrap();

    let report = Orchestrator::new(add_config(dir.path(), ts, true), sls.clone(), bss.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(report.failed_phase(), Some(RunPhase::Committing));
    assert_eq!(sls.put_count(), 1);
    assert_eq!(report.network_status("CMN"), Some(OutcomeStatus::Applied));
    assert_eq!(bss.put_hosts(), [NODE_A, NODE_B]);
    assert_eq!(report.node_status(NODE_A), Some(OutcomeStatus::Applied));
    assert_eq!(report.node_status(NODE_B), Some(OutcomeStatus::Applied));

    let outcome = report.networks.iter().find(|n| n.network == "CMN").unwrap();
    let detail = outcome.detail.as_deref().unwrap();
    assert!(detail.starts_with("CMN was written"), "{detail}");
    let failure = report.failure.as_ref().unwrap();
    assert!(failure.message.starts_with("CMN was written"), "{}", failure.message);
    assert_eq!(std::fs::read_to_string(&taken).unwrap(), "{}\n");
    assert!(!report.backups.contains(&taken));
}

#[tokio::test]
async fn unparseable_ipv4_fails_the_whole_run() {
    let dir = tempfile::tempdir().unwrap();
    let broken = network("CHN", vec![reservation("bad", "10.0.0.x", NODE_A)]);
    let sls = FakeSls::new(vec![cmn(), broken]);
    let bss = FakeBss::new(vec![boot_record(NODE_A)]);

    let mut config = add_config(dir.path(), "20260101T000000", true);
    config
        .networks
        .push(NetworkTarget::new("CHN").with_cidr6("2001:db8:2::/64"));

    let report = Orchestrator::new(config, sls.clone(), bss.clone())
        .run()
        .await
        .unwrap();

    let failure = report.failure.as_ref().unwrap();
    assert_eq!(failure.phase, RunPhase::Planning);
    assert!(failure.message.contains("10.0.0.x"), "{}", failure.message);
    assert_eq!(sls.put_count(), 0);
    assert!(bss.put_hosts().is_empty());
    assert!(report.networks.is_empty());
}

#[tokio::test]
async fn discovery_failure_touches_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let (sls, bss) = fixtures();
    sls.0.lock().unwrap().fail_fetch = true;

    let report = Orchestrator::new(add_config(dir.path(), "20260101T000000", true), sls.clone(), bss)
        .run()
        .await
        .unwrap();

    assert_eq!(report.failed_phase(), Some(RunPhase::Discovering));
    assert!(report.backups.is_empty());
    assert_eq!(sls.put_count(), 0);
}

#[tokio::test]
async fn boot_fetch_failure_is_a_discovery_failure() {
    let dir = tempfile::tempdir().unwrap();
    let (sls, bss) = fixtures();
    bss.0.lock().unwrap().fail_fetch = true;

    let report = Orchestrator::new(add_config(dir.path(), "20260101T000000", true), sls.clone(), bss)
        .run()
        .await
        .unwrap();

    assert_eq!(report.failed_phase(), Some(RunPhase::Discovering));
    assert_eq!(sls.put_count(), 0);
}

#[tokio::test]
async fn node_without_boot_record_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let sls = FakeSls::new(vec![cmn()]);
    let bss = FakeBss::new(vec![boot_record(NODE_A)]);

    let report = Orchestrator::new(add_config(dir.path(), "20260101T000000", true), sls, bss.clone())
        .run()
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(bss.put_hosts(), [NODE_A]);
    assert_eq!(report.node_status(NODE_B), None);
}

#[tokio::test]
async fn missing_target_network_fails_planning() {
    let dir = tempfile::tempdir().unwrap();
    let (sls, bss) = fixtures();
    let mut config = add_config(dir.path(), "20260101T000000", false);
    config.networks = vec![NetworkTarget::new("CHN").with_cidr6("2001:db8:2::/64")];

    let report = Orchestrator::new(config, sls, bss).run().await.unwrap();
    assert_eq!(report.failed_phase(), Some(RunPhase::Planning));
    assert_eq!(report.network_status("CHN"), Some(OutcomeStatus::PlanningFailed));
}

#[tokio::test]
async fn invalid_configuration_is_rejected_before_discovery() {
    let dir = tempfile::tempdir().unwrap();
    let (sls, bss) = fixtures();
    let mut config = add_config(dir.path(), "20260101T000000", true);
    config.mode = RetrofitMode::Remove;
    config.force = true;

    let mut orchestrator = Orchestrator::new(config, sls, bss);
    let err = orchestrator.run().await.unwrap_err();
    assert!(matches!(err, CoreError::Config { .. }));
    assert_eq!(orchestrator.phase(), RunPhase::Idle);
    assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
}
