// BSS client
//
// Lookup by host xname and whole-record upsert. BSS answers an unknown
// host with either 404 or an empty array depending on version; both mean
// "no record".

use std::fmt;

use tracing::debug;

use crate::bss::models::BootParameterRecord;
use crate::client::ServiceClient;
use crate::error::Error;
use crate::transport::TransportConfig;

/// API prefix of BSS behind the gateway.
pub const BSS_API_PREFIX: &str = "apis/bss/boot/v1";

/// How a boot parameter record is written back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpsertMethod {
    /// Replace the record (`PUT`).
    #[default]
    Put,
    /// Merge into the existing record (`PATCH`).
    Patch,
}

impl fmt::Display for UpsertMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Put => f.write_str("PUT"),
            Self::Patch => f.write_str("PATCH"),
        }
    }
}

/// Async client for the Boot Script Service.
#[derive(Debug, Clone)]
pub struct BssClient {
    inner: ServiceClient,
}

impl BssClient {
    /// Build from the gateway (or direct service) URL and transport config.
    pub fn new(base_url: &str, transport: &TransportConfig) -> Result<Self, Error> {
        Ok(Self {
            inner: ServiceClient::new(base_url, BSS_API_PREFIX, transport)?,
        })
    }

    pub fn base_url(&self) -> &url::Url {
        self.inner.base_url()
    }

    /// Fetch the boot parameters of one host.
    ///
    /// `GET /bootparameters?name={xname}`; `Ok(None)` when BSS has no record.
    pub async fn get_boot_parameters(
        &self,
        xname: &str,
    ) -> Result<Option<BootParameterRecord>, Error> {
        debug!(xname, "fetching boot parameters");
        match self
            .inner
            .get::<Vec<BootParameterRecord>>("bootparameters", &[("name", xname)])
            .await
        {
            Ok(records) => Ok(records.into_iter().next()),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Write a boot parameter record back.
    ///
    /// `PUT /bootparameters` or `PATCH /bootparameters`
    pub async fn upsert_boot_parameters(
        &self,
        record: &BootParameterRecord,
        method: UpsertMethod,
    ) -> Result<(), Error> {
        debug!(hosts = ?record.hosts, %method, "writing boot parameters");
        match method {
            UpsertMethod::Put => self.inner.put("bootparameters", record).await,
            UpsertMethod::Patch => self.inner.patch("bootparameters", record).await,
        }
    }
}
