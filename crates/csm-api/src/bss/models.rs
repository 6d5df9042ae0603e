// BSS wire models
//
// A boot parameter record carries kernel/initrd/params plus a cloud-init
// document. Only the IPAM block under `cloud-init.meta-data.ipam` is
// modelled; everything else rides along in flattened `extra` maps.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One BSS boot parameter record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BootParameterRecord {
    /// Host xnames this record applies to. Per-node records carry exactly one.
    #[serde(default)]
    pub hosts: Vec<String>,

    #[serde(rename = "cloud-init", default, skip_serializing_if = "Option::is_none")]
    pub cloud_init: Option<CloudInit>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CloudInit {
    #[serde(rename = "meta-data", default, skip_serializing_if = "Option::is_none")]
    pub meta_data: Option<MetaData>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetaData {
    /// Per-network IPAM entries keyed by lowercase network name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipam: Option<IndexMap<String, IpamEntry>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Per-network addressing consumed by node provisioning.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IpamEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,

    /// IPv4 address in CIDR notation (`10.103.0.4/25`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway6: Option<String>,

    /// IPv6 address in CIDR notation (`2001:db8:1::2/64`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip6: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_device: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vlanid: Option<u16>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl BootParameterRecord {
    /// The host this record belongs to (first entry of `hosts`).
    pub fn host(&self) -> Option<&str> {
        self.hosts.first().map(String::as_str)
    }

    /// Mutable IPAM entry for `network`, matched case-insensitively.
    pub fn ipam_entry_mut(&mut self, network: &str) -> Option<&mut IpamEntry> {
        self.cloud_init
            .as_mut()?
            .meta_data
            .as_mut()?
            .ipam
            .as_mut()?
            .iter_mut()
            .find(|(key, _)| key.eq_ignore_ascii_case(network))
            .map(|(_, entry)| entry)
    }
}

impl IpamEntry {
    pub fn has_ipv6(&self) -> bool {
        crate::sls::models::is_set(self.ip6.as_ref())
            || crate::sls::models::is_set(self.gateway6.as_ref())
    }
}
