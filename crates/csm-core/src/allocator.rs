// ── IPv6 address-space allocator ──
//
// Carves one operator-supplied supernet into aligned, non-overlapping
// blocks, one per targeted subnet, in the order the subnets were selected.
// Block sizes are powers of two rounded to nibble boundaries so carved
// prefixes read cleanly in hex.

use std::net::Ipv6Addr;

use ipnet::{IpNet, Ipv6Net};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::CoreError;

/// Smallest block ever carved (`/124`, 16 addresses).
const MIN_BLOCK_BITS: u8 = 4;

/// Addresses every block withholds: its network address and its gateway.
const BLOCK_OVERHEAD: u128 = 2;

/// Address demand of one subnet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetDemand {
    pub name: String,
    /// Number of reservations that need an IPv6 address.
    pub required: u128,
    /// Shares the network's own CIDR6/gateway instead of getting its own.
    pub supernetted: bool,
}

/// Result of carving one subnet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CarvedSubnet {
    pub name: String,
    /// Block reservation addresses are drawn from.
    pub pool: Ipv6Net,
    /// First host address of `pool`; never handed to a reservation.
    pub pool_gateway: Ipv6Addr,
    /// CIDR6 written to the subnet record.
    pub cidr6: Ipv6Net,
    /// Gateway6 written to the subnet record.
    pub gateway6: Ipv6Addr,
    pub supernetted: bool,
}

/// Carve result for one network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkAllocation {
    pub network: String,
    pub supernet: Ipv6Net,
    pub gateway: Ipv6Addr,
    /// `true` when the gateway was derived rather than supplied.
    pub gateway_derived: bool,
    pub subnets: Vec<CarvedSubnet>,
}

impl NetworkAllocation {
    pub fn subnet(&self, name: &str) -> Option<&CarvedSubnet> {
        self.subnets.iter().find(|s| s.name == name)
    }
}

/// Parse an operator-supplied supernet.
///
/// Host bits are truncated (`2001:db8:1::5/64` → `2001:db8:1::/64`).
/// IPv4 prefixes, the unspecified network and prefixes too long to hold
/// a gateway are rejected.
pub fn parse_supernet(network: &str, value: &str) -> Result<Ipv6Net, CoreError> {
    let invalid = |reason: &str| CoreError::InvalidCidr {
        network: network.into(),
        value: value.into(),
        reason: reason.into(),
    };

    let net = match value.trim().parse::<IpNet>() {
        Ok(IpNet::V6(net)) => net.trunc(),
        Ok(IpNet::V4(_)) => return Err(invalid("not an IPv6 prefix")),
        Err(e) => return Err(invalid(&e.to_string())),
    };

    if net.network().is_unspecified() {
        return Err(invalid("unspecified network, no gateway can be derived"));
    }
    if net.prefix_len() > 128 - MIN_BLOCK_BITS {
        return Err(invalid("prefix too long to carve subnets from"));
    }
    Ok(net)
}

/// Resolve the network gateway: the explicit value when given (it must lie
/// inside the supernet), otherwise the supernet's first host address.
///
/// Returns the gateway and whether it was derived.
pub fn resolve_gateway(
    network: &str,
    supernet: Ipv6Net,
    explicit: Option<&str>,
) -> Result<(Ipv6Addr, bool), CoreError> {
    let Some(value) = explicit.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok((offset(supernet.network(), 1), true));
    };

    let invalid = |reason: String| CoreError::InvalidGateway {
        network: network.into(),
        value: value.into(),
        reason,
    };

    // Accept `addr/len` as written in SLS records; only the address matters.
    let addr_part = value.split_once('/').map_or(value, |(addr, _)| addr);
    let addr: Ipv6Addr = addr_part.parse().map_err(|e| invalid(format!("{e}")))?;

    if !supernet.contains(&addr) {
        return Err(invalid(format!("outside {supernet}")));
    }
    if addr == supernet.network() {
        return Err(invalid("is the network address".into()));
    }
    Ok((addr, false))
}

/// Carve `supernet` for `demands`, in order.
pub fn allocate(
    network: &str,
    supernet: Ipv6Net,
    gateway: Ipv6Addr,
    gateway_derived: bool,
    demands: &[SubnetDemand],
) -> Result<NetworkAllocation, CoreError> {
    if gateway_derived {
        warn!(
            network,
            %gateway,
            "no IPv6 gateway supplied, derived first host address; review before commit"
        );
    }

    let total: u128 = demands.iter().map(|d| d.required).sum();
    let exceeded = || CoreError::CapacityExceeded {
        network: network.into(),
        supernet: supernet.to_string(),
        required: total,
    };

    let end = u128::from(supernet.broadcast());
    let mut cursor = u128::from(supernet.network());
    let mut subnets = Vec::with_capacity(demands.len());

    for demand in demands {
        let (start, prefix) = place_block(supernet, gateway, cursor, demand.required)
            .ok_or_else(exceeded)?;
        let size = 1u128 << (128 - prefix);
        let last = start.checked_add(size - 1).ok_or_else(exceeded)?;
        if last > end {
            return Err(exceeded());
        }

        let pool = Ipv6Net::new(Ipv6Addr::from(start), prefix).map_err(|e| {
            CoreError::InvalidCidr {
                network: network.into(),
                value: supernet.to_string(),
                reason: e.to_string(),
            }
        })?;
        let pool_gateway = offset(pool.network(), 1);

        let (cidr6, gateway6) = if demand.supernetted {
            (supernet, gateway)
        } else {
            (pool, pool_gateway)
        };

        debug!(
            network,
            subnet = %demand.name,
            required = demand.required,
            %pool,
            supernetted = demand.supernetted,
            "carved subnet"
        );

        subnets.push(CarvedSubnet {
            name: demand.name.clone(),
            pool,
            pool_gateway,
            cidr6,
            gateway6,
            supernetted: demand.supernetted,
        });

        cursor = match last.checked_add(1) {
            Some(next) => next,
            None => end.saturating_add(1),
        };
    }

    Ok(NetworkAllocation {
        network: network.into(),
        supernet,
        gateway,
        gateway_derived,
        subnets,
    })
}

/// Prefix length of the smallest nibble-aligned block holding `required`
/// hosts plus `overhead` withheld addresses.
pub fn block_prefix(required: u128, overhead: u128) -> Option<u8> {
    let needed = required.checked_add(overhead)?;
    let bits = ceil_log2(needed).max(MIN_BLOCK_BITS);
    let bits = bits.div_ceil(4) * 4;
    if bits >= 128 {
        return None;
    }
    Some(128 - bits)
}

/// Aligned start and prefix for the next block at or after `cursor`.
///
/// A network gateway that falls inside the block past its own gateway costs
/// the block one more address.
fn place_block(
    supernet: Ipv6Net,
    gateway: Ipv6Addr,
    cursor: u128,
    required: u128,
) -> Option<(u128, u8)> {
    let gw = u128::from(gateway);
    let mut overhead = BLOCK_OVERHEAD;

    loop {
        let prefix = block_prefix(required, overhead)?;
        if prefix < supernet.prefix_len() {
            return None;
        }
        let start = align_up(cursor, 128 - prefix)?;
        let size = 1u128 << (128 - prefix);

        let gateway_inside = gw >= start && gw - start >= 2 && gw - start < size;
        if gateway_inside && overhead == BLOCK_OVERHEAD {
            overhead += 1;
            continue;
        }
        return Some((start, prefix));
    }
}

fn align_up(value: u128, bits: u8) -> Option<u128> {
    if bits >= 128 {
        return (value == 0).then_some(0);
    }
    let mask = (1u128 << bits) - 1;
    value.checked_add(mask).map(|v| v & !mask)
}

fn ceil_log2(n: u128) -> u8 {
    if n <= 1 {
        return 0;
    }
    // n - 1 has its highest bit at floor(log2(n - 1)).
    u8::try_from(128 - (n - 1).leading_zeros()).unwrap_or(128)
}

/// `base + n`, saturating at the top of the address space.
pub(crate) fn offset(base: Ipv6Addr, n: u128) -> Ipv6Addr {
    Ipv6Addr::from(u128::from(base).saturating_add(n))
}
