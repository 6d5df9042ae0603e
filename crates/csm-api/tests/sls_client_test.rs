#![allow(clippy::unwrap_used)]
// Integration tests for `SlsClient` using wiremock.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use csm_api::{Error, RetryPolicy, SlsClient, TransportConfig};

// ── Helpers ─────────────────────────────────────────────────────────

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 2,
        backoff: Duration::from_millis(1),
    }
}

async fn setup() -> (MockServer, SlsClient) {
    let server = MockServer::start().await;
    let transport = TransportConfig::default().with_retry(fast_retry());
    let client = SlsClient::new(&server.uri(), &transport).unwrap();
    (server, client)
}

fn dumpstate() -> serde_json::Value {
    json!({
        "Hardware": { "x3000c0s1b0n0": { "Xname": "x3000c0s1b0n0" } },
        "Networks": {
            "CMN": {
                "Name": "CMN",
                "FullName": "Customer Management Network",
                "Type": "ethernet",
                "ExtraProperties": {
                    "CIDR": "10.103.0.0/24",
                    "Subnets": [{
                        "Name": "bootstrap_dhcp",
                        "CIDR": "10.103.0.0/25",
                        "Gateway": "10.103.0.1",
                        "VlanID": 6,
                        "IPReservations": [
                            { "Name": "ncn-m001", "IPAddress": "10.103.0.4", "Comment": "x3000c0s1b0n0" }
                        ]
                    }]
                }
            },
            "NMN": {
                "Name": "NMN",
                "Type": "ethernet",
                "ExtraProperties": { "CIDR": "10.252.0.0/17", "Subnets": [] }
            }
        }
    })
}

// ── Discovery ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_dump_state() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/apis/sls/v1/dumpstate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(dumpstate()))
        .mount(&server)
        .await;

    let dump = client.dump_state().await.unwrap();

    assert_eq!(dump.networks.len(), 2);
    let names: Vec<&str> = dump.networks.keys().map(String::as_str).collect();
    assert_eq!(names, ["CMN", "NMN"]);
    let cmn = &dump.networks["CMN"];
    assert_eq!(cmn.properties.subnets[0].ip_reservations[0].ip_address, "10.103.0.4");
    assert!(dump.extra.contains_key("Hardware"));
}

#[tokio::test]
async fn test_bearer_token_is_sent() {
    let server = MockServer::start().await;
    let transport = TransportConfig::default().with_token("s3cr3t".to_owned().into());
    let client = SlsClient::new(&server.uri(), &transport).unwrap();

    Mock::given(method("GET"))
        .and(path("/apis/sls/v1/dumpstate"))
        .and(header("Authorization", "Bearer s3cr3t"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Networks": {} })))
        .expect(1)
        .mount(&server)
        .await;

    let dump = client.dump_state().await.unwrap();
    assert!(dump.networks.is_empty());
}

#[tokio::test]
async fn test_transient_get_is_retried() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/apis/sls/v1/dumpstate"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/apis/sls/v1/dumpstate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(dumpstate()))
        .mount(&server)
        .await;

    let dump = client.dump_state().await.unwrap();
    assert_eq!(dump.networks.len(), 2);
}

// ── Commit ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_put_network() {
    let (server, client) = setup().await;

    Mock::given(method("PUT"))
        .and(path("/apis/sls/v1/networks/CMN"))
        .and(body_partial_json(json!({
            "Name": "CMN",
            "ExtraProperties": { "CIDR6": "2001:db8:1::/64" }
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let dump: csm_api::DumpState = serde_json::from_value(dumpstate()).unwrap();
    let mut cmn = dump.networks["CMN"].clone();
    cmn.properties.cidr6 = Some("2001:db8:1::/64".into());

    client.put_network(&cmn).await.unwrap();
}

#[tokio::test]
async fn test_put_is_not_retried() {
    let (server, client) = setup().await;

    Mock::given(method("PUT"))
        .and(path("/apis/sls/v1/networks/CMN"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let network = csm_api::NetworkDescriptor {
        name: "CMN".into(),
        ..Default::default()
    };
    let result = client.put_network(&network).await;

    assert!(
        matches!(result, Err(Error::Api { status: 503, .. })),
        "expected Api 503 error, got: {result:?}"
    );
}

// ── Error tests ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_unauthorized() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let result = client.dump_state().await;

    assert!(
        matches!(result, Err(Error::Authentication { .. })),
        "expected Authentication error, got: {result:?}"
    );
}

#[tokio::test]
async fn test_problem_details_are_parsed() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/apis/sls/v1/dumpstate"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "type": "about:blank",
            "title": "Bad Request",
            "detail": "database unavailable",
            "status": 400
        })))
        .mount(&server)
        .await;

    match client.dump_state().await {
        Err(Error::Api {
            status,
            ref message,
            ref detail,
        }) => {
            assert_eq!(status, 400);
            assert_eq!(message, "Bad Request");
            assert_eq!(detail.as_deref(), Some("database unavailable"));
        }
        other => panic!("expected Api error, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_malformed_body() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/apis/sls/v1/dumpstate"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
        .mount(&server)
        .await;

    let result = client.dump_state().await;
    assert!(
        matches!(result, Err(Error::Deserialization { .. })),
        "expected Deserialization error, got: {result:?}"
    );
}
