// ── Reservation assignment ──
//
// Maps carved pools onto existing reservations, one IPv6 address per
// reservation, in ascending IPv4 order. Every reservation consumes its
// ordinal slot whether or not it is written, so a partially conflicted
// subnet still lines up with a forced rerun.

use std::net::{Ipv4Addr, Ipv6Addr};

use csm_api::{NetworkDescriptor, SubnetDescriptor};
use ipnet::Ipv6Net;
use serde::Serialize;
use tracing::debug;

use crate::allocator::{CarvedSubnet, NetworkAllocation, offset};
use crate::error::CoreError;
use crate::plan::{Conflict, EntityChange, EntityKind};

/// One reservation whose IPv6 address was set or cleared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assignment {
    pub network: String,
    pub subnet: String,
    pub reservation: String,
    /// Owner tag copied from the reservation comment.
    pub owner: Option<String>,
    /// Address with the subnet's recorded prefix; `None` when cleared.
    pub address: Option<Ipv6Net>,
    pub gateway6: Option<Ipv6Addr>,
}

/// Result of assigning (or clearing) one network.
#[derive(Debug, Clone, Default)]
pub struct NetworkAssignment {
    pub network: NetworkDescriptor,
    pub assignments: Vec<Assignment>,
    pub changes: Vec<EntityChange>,
    pub conflicts: Vec<Conflict>,
}

impl NetworkAssignment {
    pub fn changed(&self) -> bool {
        !self.changes.is_empty()
    }

    fn conflict(&mut self, kind: EntityKind, entity: String, fields: &[&str]) {
        debug!(%kind, %entity, ?fields, "existing IPv6 data, skipping");
        self.conflicts.push(Conflict {
            kind,
            entity,
            fields: fields.iter().map(|f| (*f).to_owned()).collect(),
        });
    }

    fn change(&mut self, kind: EntityKind, entity: String, fields: Vec<&str>) {
        if fields.is_empty() {
            return;
        }
        self.changes.push(EntityChange {
            kind,
            entity,
            fields: fields.into_iter().map(str::to_owned).collect(),
        });
    }
}

/// Assign IPv6 data from `allocation` onto a copy of `source`.
pub fn assign_network(
    source: &NetworkDescriptor,
    allocation: &NetworkAllocation,
    force: bool,
) -> Result<NetworkAssignment, CoreError> {
    let name = source.name.clone();
    let mut network = source.clone();
    let mut out = NetworkAssignment::default();

    if source.has_cidr6() && !force {
        // Subnets must stay inside the network's recorded CIDR6.
        hold_network(source, allocation, &mut out)?;
        out.network = network;
        return Ok(out);
    }
    if replace(
        &mut network.properties.cidr6,
        Some(allocation.supernet.to_string()),
    ) {
        out.change(EntityKind::Network, name.clone(), vec!["CIDR6"]);
    }

    for carved in &allocation.subnets {
        let Some(subnet) = network
            .properties
            .subnets
            .iter_mut()
            .find(|s| s.name == carved.name)
        else {
            debug!(network = %name, subnet = %carved.name, "subnet not present, nothing to assign");
            continue;
        };
        assign_subnet(&name, subnet, carved, allocation.gateway, force, &mut out)?;
    }

    out.network = network;
    Ok(out)
}

/// Record a conflict for the network and every subnet and reservation
/// `allocation` would have touched, writing nothing.
fn hold_network(
    network: &NetworkDescriptor,
    allocation: &NetworkAllocation,
    out: &mut NetworkAssignment,
) -> Result<(), CoreError> {
    let name = network.name.clone();
    out.conflict(EntityKind::Network, name.clone(), &["CIDR6"]);

    for carved in &allocation.subnets {
        let Some(subnet) = network.subnet(&carved.name) else {
            continue;
        };
        let entity = format!("{name}/{}", subnet.name);
        let mut fields = ipv6_fields(subnet);
        if fields.is_empty() {
            fields = vec!["CIDR6", "Gateway6"];
        }
        out.conflict(EntityKind::Subnet, entity.clone(), &fields);

        for idx in ipv4_order(&name, subnet)? {
            let reservation = &subnet.ip_reservations[idx];
            out.conflict(
                EntityKind::Reservation,
                format!("{entity}/{}", reservation.name),
                &["IPAddress6"],
            );
        }
    }
    Ok(())
}

/// IPv6 fields already set on `subnet`.
fn ipv6_fields(subnet: &SubnetDescriptor) -> Vec<&'static str> {
    let mut fields = Vec::new();
    if subnet.has_cidr6() {
        fields.push("CIDR6");
    }
    if subnet.has_gateway6() {
        fields.push("Gateway6");
    }
    fields
}

fn assign_subnet(
    network: &str,
    subnet: &mut SubnetDescriptor,
    carved: &CarvedSubnet,
    network_gateway: Ipv6Addr,
    force: bool,
    out: &mut NetworkAssignment,
) -> Result<(), CoreError> {
    let entity = format!("{network}/{}", subnet.name);
    let order = ipv4_order(network, subnet)?;

    let existing = ipv6_fields(subnet);
    let subnet_conflict = !existing.is_empty() && !force;

    if subnet_conflict {
        out.conflict(EntityKind::Subnet, entity.clone(), &existing);
    } else {
        let mut fields = Vec::new();
        if replace(&mut subnet.cidr6, Some(carved.cidr6.to_string())) {
            fields.push("CIDR6");
        }
        if replace(&mut subnet.gateway6, Some(carved.gateway6.to_string())) {
            fields.push("Gateway6");
        }
        out.change(EntityKind::Subnet, entity.clone(), fields);
    }

    let mut slots = AddressSlots::new(carved, network_gateway);
    let prefix = carved.cidr6.prefix_len();

    for idx in order {
        let slot = slots.next_slot().ok_or_else(|| CoreError::CapacityExceeded {
            network: network.into(),
            supernet: carved.pool.to_string(),
            required: u128::try_from(subnet.ip_reservations.len()).unwrap_or(u128::MAX),
        })?;
        let reservation = &mut subnet.ip_reservations[idx];
        let res_entity = format!("{entity}/{}", reservation.name);

        if subnet_conflict || (reservation.has_ipv6() && !force) {
            out.conflict(EntityKind::Reservation, res_entity, &["IPAddress6"]);
            continue;
        }

        let address = Ipv6Net::new(slot, prefix).map_err(|e| CoreError::InvalidCidr {
            network: network.into(),
            value: carved.cidr6.to_string(),
            reason: e.to_string(),
        })?;
        if replace(&mut reservation.ip_address6, Some(slot.to_string())) {
            out.change(EntityKind::Reservation, res_entity, vec!["IPAddress6"]);
        }
        out.assignments.push(Assignment {
            network: network.into(),
            subnet: subnet.name.clone(),
            reservation: reservation.name.clone(),
            owner: reservation.comment.clone(),
            address: Some(address),
            gateway6: Some(carved.gateway6),
        });
    }

    Ok(())
}

/// Clear every IPv6 field of a copy of `source`.
///
/// Every reservation yields a cleared assignment, including ones with no
/// IPv6 address left in SLS, so node IPAM entries still get cleared after
/// a remove run that stopped between the SLS and BSS writes.
pub fn clear_network(source: &NetworkDescriptor) -> NetworkAssignment {
    let name = source.name.clone();
    let mut network = source.clone();
    let mut out = NetworkAssignment::default();

    if replace(&mut network.properties.cidr6, None) {
        out.change(EntityKind::Network, name.clone(), vec!["CIDR6"]);
    }

    for subnet in &mut network.properties.subnets {
        let entity = format!("{name}/{}", subnet.name);
        let mut fields = Vec::new();
        if replace(&mut subnet.cidr6, None) {
            fields.push("CIDR6");
        }
        if replace(&mut subnet.gateway6, None) {
            fields.push("Gateway6");
        }
        out.change(EntityKind::Subnet, entity.clone(), fields);

        for reservation in &mut subnet.ip_reservations {
            if replace(&mut reservation.ip_address6, None) {
                out.change(
                    EntityKind::Reservation,
                    format!("{entity}/{}", reservation.name),
                    vec!["IPAddress6"],
                );
            }
            out.assignments.push(Assignment {
                network: name.clone(),
                subnet: subnet.name.clone(),
                reservation: reservation.name.clone(),
                owner: reservation.comment.clone(),
                address: None,
                gateway6: None,
            });
        }
    }

    out.network = network;
    out
}

/// Reservation indices sorted by numeric IPv4 address, name breaking ties.
pub fn ipv4_order(network: &str, subnet: &SubnetDescriptor) -> Result<Vec<usize>, CoreError> {
    let mut keyed = subnet
        .ip_reservations
        .iter()
        .enumerate()
        .map(|(idx, r)| {
            r.ip_address
                .trim()
                .parse::<Ipv4Addr>()
                .map(|ip| (ip, r.name.as_str(), idx))
                .map_err(|_| CoreError::UnparseableAddress {
                    network: network.into(),
                    subnet: subnet.name.clone(),
                    reservation: r.name.clone(),
                    value: r.ip_address.clone(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;
    keyed.sort_unstable();
    Ok(keyed.into_iter().map(|(_, _, idx)| idx).collect())
}

/// `true` when the field changed.
pub(crate) fn replace(field: &mut Option<String>, value: Option<String>) -> bool {
    if *field == value {
        return false;
    }
    *field = value;
    true
}

/// Host addresses of a pool in ascending order, never the network gateway.
///
/// Slots start at `::2`: `::0` is the subnet-router anycast address and
/// `::1` is the pool gateway.
struct AddressSlots {
    next: u128,
    last: u128,
    skip: [u128; 2],
}

impl AddressSlots {
    fn new(carved: &CarvedSubnet, network_gateway: Ipv6Addr) -> Self {
        Self {
            next: u128::from(offset(carved.pool.network(), 2)),
            last: u128::from(carved.pool.broadcast()),
            skip: [u128::from(carved.pool_gateway), u128::from(network_gateway)],
        }
    }

    fn next_slot(&mut self) -> Option<Ipv6Addr> {
        while self.next <= self.last {
            let candidate = self.next;
            self.next = self.next.checked_add(1)?;
            if !self.skip.contains(&candidate) {
                return Some(Ipv6Addr::from(candidate));
            }
        }
        None
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::allocator::{self, SubnetDemand};
    use csm_api::{IpReservation, NetworkProperties};
    use pretty_assertions::assert_eq;

    fn reservation(name: &str, ip: &str, owner: &str) -> IpReservation {
        IpReservation {
            name: name.into(),
            ip_address: ip.into(),
            comment: Some(owner.into()),
            ..IpReservation::default()
        }
    }

    fn cmn() -> NetworkDescriptor {
        NetworkDescriptor {
            name: "CMN".into(),
            properties: NetworkProperties {
                cidr: Some("10.0.0.0/24".into()),
                subnets: vec![SubnetDescriptor {
                    name: "bootstrap_dhcp".into(),
                    cidr: Some("10.0.0.0/24".into()),
                    ip_reservations: vec![
                        reservation("switch-a", "10.0.0.3", "x3000c0w14"),
                        reservation("node-b", "10.0.0.2", "x3000c0s2b0n0"),
                        reservation("node-a", "10.0.0.1", "x3000c0s1b0n0"),
                    ],
                    ..SubnetDescriptor::default()
                }],
                ..NetworkProperties::default()
            },
            ..NetworkDescriptor::default()
        }
    }

    fn allocation(network: &NetworkDescriptor) -> NetworkAllocation {
        let supernet = allocator::parse_supernet("CMN", "2001:db8:1::/64").unwrap();
        let (gateway, derived) = allocator::resolve_gateway("CMN", supernet, None).unwrap();
        let demands = vec![SubnetDemand {
            name: "bootstrap_dhcp".into(),
            required: network.properties.subnets[0].ip_reservations.len() as u128,
            supernetted: false,
        }];
        allocator::allocate("CMN", supernet, gateway, derived, &demands).unwrap()
    }

    fn ipv6_of<'a>(net: &'a NetworkDescriptor, name: &str) -> Option<&'a str> {
        net.properties.subnets[0]
            .ip_reservations
            .iter()
            .find(|r| r.name == name)
            .and_then(|r| r.ip_address6.as_deref())
    }

    #[test]
    fn addresses_follow_ipv4_order() {
        let source = cmn();
        let out = assign_network(&source, &allocation(&source), false).unwrap();

        assert_eq!(ipv6_of(&out.network, "node-a"), Some("2001:db8:1::2"));
        assert_eq!(ipv6_of(&out.network, "node-b"), Some("2001:db8:1::3"));
        assert_eq!(ipv6_of(&out.network, "switch-a"), Some("2001:db8:1::4"));
        assert_eq!(out.network.properties.cidr6.as_deref(), Some("2001:db8:1::/64"));
        let subnet = &out.network.properties.subnets[0];
        assert_eq!(subnet.cidr6.as_deref(), Some("2001:db8:1::/124"));
        assert_eq!(subnet.gateway6.as_deref(), Some("2001:db8:1::1"));
        assert!(out.conflicts.is_empty());

        let owners: Vec<_> = out.assignments.iter().map(|a| a.reservation.as_str()).collect();
        assert_eq!(owners, ["node-a", "node-b", "switch-a"]);
        assert_eq!(
            out.assignments[0].address.unwrap().to_string(),
            "2001:db8:1::2/124"
        );
    }

    #[test]
    fn source_is_not_mutated() {
        let source = cmn();
        let before = source.clone();
        let _ = assign_network(&source, &allocation(&source), true).unwrap();
        assert_eq!(source, before);
    }

    #[test]
    fn second_pass_conflicts_everywhere() {
        let source = cmn();
        let alloc = allocation(&source);
        let first = assign_network(&source, &alloc, false).unwrap();
        let second = assign_network(&first.network, &alloc, false).unwrap();

        assert!(!second.changed());
        assert!(second.assignments.is_empty());
        assert_eq!(second.network, first.network);
        let entities: Vec<_> = second.conflicts.iter().map(|c| c.entity.as_str()).collect();
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

    #[test]
    fn force_overwrites_existing_values() {
        let mut source = cmn();
        source.properties.subnets[0].ip_reservations[2].ip_address6 = Some("fd00::99".into());
        let out = assign_network(&source, &allocation(&source), true).unwrap();
        assert_eq!(ipv6_of(&out.network, "node-a"), Some("2001:db8:1::2"));
        assert!(out.conflicts.is_empty());
    }

    #[test]
    fn conflicted_reservation_keeps_its_slot() {
        let mut source = cmn();
        // node-a already has an address; node-b must still get ::3.
        source.properties.subnets[0].ip_reservations[2].ip_address6 = Some("fd00::99".into());
        let out = assign_network(&source, &allocation(&source), false).unwrap();
        assert_eq!(ipv6_of(&out.network, "node-a"), Some("fd00::99"));
        assert_eq!(ipv6_of(&out.network, "node-b"), Some("2001:db8:1::3"));
        assert_eq!(out.conflicts.len(), 1);
    }

    #[test]
    fn unparseable_ipv4_is_fatal() {
        let mut source = cmn();
        source.properties.subnets[0].ip_reservations[0].ip_address = "10.0.0.300".into();
        let err = assign_network(&source, &allocation(&source), false).unwrap_err();
        assert!(matches!(
            err,
            CoreError::UnparseableAddress { ref reservation, .. } if reservation == "switch-a"
        ));
    }

    #[test]
    fn ipv4_order_is_numeric() {
        let subnet = SubnetDescriptor {
            name: "s".into(),
            ip_reservations: vec![
                reservation("ten", "10.0.0.10", ""),
                reservation("nine", "10.0.0.9", ""),
            ],
            ..SubnetDescriptor::default()
        };
        assert_eq!(ipv4_order("CMN", &subnet).unwrap(), vec![1, 0]);
    }

    #[test]
    fn clear_undoes_assignment() {
        let source = cmn();
        let added = assign_network(&source, &allocation(&source), false).unwrap();
        let cleared = clear_network(&added.network);

        assert_eq!(cleared.network, source);
        assert_eq!(cleared.assignments.len(), 3);
        assert!(cleared.assignments.iter().all(|a| a.address.is_none()));

        let again = clear_network(&cleared.network);
        assert!(!again.changed());
        assert_eq!(again.assignments.len(), 3);
    }

    #[test]
    fn clear_covers_reservations_already_clean_in_sls() {
        let cleared = clear_network(&cmn());
        assert!(!cleared.changed());
        let names: Vec<_> = cleared.assignments.iter().map(|a| a.reservation.as_str()).collect();
        assert_eq!(names, ["switch-a", "node-b", "node-a"]);
        assert!(cleared.assignments.iter().all(|a| a.address.is_none()));
        assert_eq!(cleared.assignments[2].owner.as_deref(), Some("x3000c0s1b0n0"));
    }

    #[test]
    fn existing_network_prefix_holds_the_whole_network() {
        let mut source = cmn();
        source.properties.cidr6 = Some("2001:db8:9::/64".into());
        let out = assign_network(&source, &allocation(&source), false).unwrap();

        assert_eq!(out.network, source);
        assert!(!out.changed());
        assert!(out.assignments.is_empty());
        let conflicts: Vec<_> = out
            .conflicts
            .iter()
            .map(|c| (c.entity.as_str(), c.fields.join(",")))
            .collect();
        assert_eq!(
            conflicts,
            [
                ("CMN", "CIDR6".to_owned()),
                ("CMN/bootstrap_dhcp", "CIDR6,Gateway6".to_owned()),
                ("CMN/bootstrap_dhcp/node-a", "IPAddress6".to_owned()),
                ("CMN/bootstrap_dhcp/node-b", "IPAddress6".to_owned()),
                ("CMN/bootstrap_dhcp/switch-a", "IPAddress6".to_owned()),
            ]
        );
    }

    #[test]
    fn first_slot_skips_anycast_and_gateway() {
        let source = cmn();
        let alloc = allocation(&source);
        let mut slots = AddressSlots::new(&alloc.subnets[0], alloc.gateway);
        assert_eq!(slots.next_slot(), Some("2001:db8:1::2".parse().unwrap()));
    }
}
