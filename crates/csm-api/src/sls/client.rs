// SLS client
//
// Only the two endpoints the retrofit needs: the full dump for discovery
// and per-network replacement for commit.

use tracing::debug;

use crate::client::ServiceClient;
use crate::error::Error;
use crate::sls::models::{DumpState, NetworkDescriptor};
use crate::transport::TransportConfig;

/// API prefix of SLS behind the gateway.
pub const SLS_API_PREFIX: &str = "apis/sls/v1";

/// Async client for the System Layout Service.
#[derive(Debug, Clone)]
pub struct SlsClient {
    inner: ServiceClient,
}

impl SlsClient {
    /// Build from the gateway (or direct service) URL and transport config.
    pub fn new(base_url: &str, transport: &TransportConfig) -> Result<Self, Error> {
        Ok(Self {
            inner: ServiceClient::new(base_url, SLS_API_PREFIX, transport)?,
        })
    }

    pub fn base_url(&self) -> &url::Url {
        self.inner.base_url()
    }

    /// Fetch the whole SLS state.
    ///
    /// `GET /dumpstate`
    pub async fn dump_state(&self) -> Result<DumpState, Error> {
        debug!("fetching SLS dumpstate");
        self.inner.get("dumpstate", &[]).await
    }

    /// Replace one network record.
    ///
    /// `PUT /networks/{name}`
    pub async fn put_network(&self, network: &NetworkDescriptor) -> Result<(), Error> {
        debug!(network = %network.name, "updating SLS network");
        self.inner
            .put(&format!("networks/{}", network.name), network)
            .await
    }
}
