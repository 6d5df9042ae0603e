// SLS wire models
//
// Field names follow the SLS schema exactly (PascalCase, `CIDR6`,
// `IPAddress6`, ...). Every struct keeps the fields it does not model in a
// flattened `extra` map so a fetched record can be written back, or dumped
// to a backup file and hand-edited, without loss.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `GET /dumpstate` payload: every network (and hardware, untouched) SLS knows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DumpState {
    /// Networks keyed by name, in the order SLS returned them.
    #[serde(rename = "Networks", default)]
    pub networks: IndexMap<String, NetworkDescriptor>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A named L3 network (`CMN`, `CHN`, `NMN`, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkDescriptor {
    #[serde(rename = "Name")]
    pub name: String,

    #[serde(rename = "FullName", default)]
    pub full_name: String,

    #[serde(rename = "IPRanges", default, skip_serializing_if = "Vec::is_empty")]
    pub ip_ranges: Vec<String>,

    #[serde(rename = "Type", default)]
    pub network_type: String,

    #[serde(rename = "ExtraProperties", default)]
    pub properties: NetworkProperties,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `ExtraProperties` block of a network.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkProperties {
    #[serde(rename = "CIDR", default, skip_serializing_if = "Option::is_none")]
    pub cidr: Option<String>,

    #[serde(rename = "CIDR6", default, skip_serializing_if = "Option::is_none")]
    pub cidr6: Option<String>,

    #[serde(rename = "Subnets", default)]
    pub subnets: Vec<SubnetDescriptor>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A named subnet inside a network.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubnetDescriptor {
    #[serde(rename = "Name")]
    pub name: String,

    #[serde(rename = "FullName", default, skip_serializing_if = "String::is_empty")]
    pub full_name: String,

    #[serde(rename = "CIDR", default, skip_serializing_if = "Option::is_none")]
    pub cidr: Option<String>,

    #[serde(rename = "CIDR6", default, skip_serializing_if = "Option::is_none")]
    pub cidr6: Option<String>,

    #[serde(rename = "Gateway", default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,

    #[serde(rename = "Gateway6", default, skip_serializing_if = "Option::is_none")]
    pub gateway6: Option<String>,

    #[serde(rename = "VlanID", default)]
    pub vlan_id: u16,

    #[serde(rename = "IPReservations", default, skip_serializing_if = "Vec::is_empty")]
    pub ip_reservations: Vec<IpReservation>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A single address grant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IpReservation {
    /// Hostname (`ncn-m001`, `sw-spine-001`, ...).
    #[serde(rename = "Name")]
    pub name: String,

    /// IPv4 address, kept as text: an unparseable value is a planning
    /// error, not a decode error.
    #[serde(rename = "IPAddress", default)]
    pub ip_address: String,

    #[serde(rename = "IPAddress6", default, skip_serializing_if = "Option::is_none")]
    pub ip_address6: Option<String>,

    /// Free-text owner tag; by convention the owner's xname.
    #[serde(rename = "Comment", default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    #[serde(rename = "Aliases", default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `true` when an optional string field carries a non-blank value.
pub(crate) fn is_set(field: Option<&String>) -> bool {
    field.is_some_and(|v| !v.trim().is_empty())
}

impl NetworkDescriptor {
    pub fn has_cidr6(&self) -> bool {
        is_set(self.properties.cidr6.as_ref())
    }

    pub fn subnet(&self, name: &str) -> Option<&SubnetDescriptor> {
        self.properties.subnets.iter().find(|s| s.name == name)
    }
}

impl SubnetDescriptor {
    pub fn has_cidr6(&self) -> bool {
        is_set(self.cidr6.as_ref())
    }

    pub fn has_gateway6(&self) -> bool {
        is_set(self.gateway6.as_ref())
    }
}

impl IpReservation {
    pub fn has_ipv6(&self) -> bool {
        is_set(self.ip_address6.as_ref())
    }
}
