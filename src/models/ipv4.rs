//! IPv4 address and CIDR block utilities.
//!
//! Provides [`Ipv4`] for representing CIDR blocks, the address arithmetic used
//! to walk them, and [`split_into_subnets`] which partitions a parent block.

use crate::error::{Error, Result};
use serde::de;
use serde::{Deserialize, Deserializer, Serialize};
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Maximum length for an IPv4 subnet mask (32 bits).
pub const MAX_LENGTH: u8 = 32;

/// Smallest subnet AWS allows.
pub const MIN_AWS_SUBNET_MASK: u8 = 28;

fn too_long(len: u8) -> Error {
    Error::InvalidCidr(format!("network length /{len} is too long"))
}

/// Convert a CIDR prefix length to a subnet mask as u32.
///
/// # Examples
/// ```
/// use aws_subnet_reconcile::models::get_cidr_mask;
/// assert_eq!(get_cidr_mask(24).unwrap(), 0xFFFFFF00);
/// ```
pub fn get_cidr_mask(len: u8) -> Result<u32> {
    if len > MAX_LENGTH {
        Err(too_long(len))
    } else {
        let right_len = MAX_LENGTH - len;
        let all_bits = u32::MAX as u64;

        let mask = (all_bits >> right_len) << right_len;

        Ok(mask as u32)
    }
}

/// Get the network address for a given IP and prefix length.
pub fn cut_addr(addr: Ipv4Addr, len: u8) -> Result<Ipv4Addr> {
    let mask = get_cidr_mask(len)?;
    Ok(Ipv4Addr::from(u32::from(addr) & mask))
}

/// Calculate the next block after the given [`Ipv4`] block.
///
/// If `mask` is provided, the next block will use that mask size.
pub fn next_subnet_ipv4(ipv4: Ipv4, mask: Option<u8>) -> Result<Ipv4> {
    let current_mask = ipv4.mask;
    let new_mask = mask.unwrap_or(current_mask);
    if new_mask <= current_mask {
        // eq or larger block (smaller mask)
        let next_subnet = ip_after_subnet(ipv4.addr, new_mask)?;
        Ok(Ipv4 {
            addr: next_subnet,
            mask: new_mask,
        })
    } else {
        // smaller block starts right after our broadcast
        let current_broadcast = broadcast_addr(ipv4.addr, current_mask)?;
        let next_subnet = ip_after_subnet(current_broadcast, new_mask)?;
        Ok(Ipv4 {
            addr: next_subnet,
            mask: new_mask,
        })
    }
}

/// Returns the IP address following the given block.
pub fn ip_after_subnet(addr: Ipv4Addr, cidr: u8) -> Result<Ipv4Addr> {
    let network_bits = u32::from(addr) & get_cidr_mask(cidr)?;
    let subnet_size = 1u64 << (MAX_LENGTH - cidr);
    let next = network_bits as u64 + subnet_size;
    if next > u32::MAX as u64 {
        return Err(Error::InvalidCidr(format!(
            "no address after {addr}/{cidr}"
        )));
    }
    Ok(Ipv4Addr::from(next as u32))
}

/// Calculate the broadcast address for a given IP and prefix length.
pub fn broadcast_addr(addr: Ipv4Addr, len: u8) -> Result<Ipv4Addr> {
    let mask = get_cidr_mask(len)?;
    let network_bits = u32::from(addr) & mask;
    Ok(Ipv4Addr::from(network_bits | !mask))
}

/// Number of usable host addresses in an AWS subnet.
///
/// AWS reserves 5 addresses per subnet (network, router, DNS, future use and
/// broadcast) and refuses subnets smaller than /28.
pub fn num_aws_hosts(len: u8) -> Result<u64> {
    if len > MIN_AWS_SUBNET_MASK {
        Err(Error::InvalidCidr(format!(
            "/{len} is smaller than the minimum AWS subnet /{MIN_AWS_SUBNET_MASK}"
        )))
    } else {
        Ok((1u64 << (MAX_LENGTH - len)) - 5)
    }
}

/// Split `parent` into `count` equally sized, contiguous blocks.
///
/// The new prefix length is the parent's plus `ceil(log2(count))` bits, so a
/// count that is not a power of two leaves the tail of the parent unused.
/// Blocks are returned in ascending address order.
///
/// # Examples
/// ```
/// use aws_subnet_reconcile::models::split_into_subnets;
/// let blocks = split_into_subnets("10.0.0.0/16", 3).unwrap();
/// let blocks: Vec<String> = blocks.iter().map(|b| b.to_string()).collect();
/// assert_eq!(blocks, ["10.0.0.0/18", "10.0.64.0/18", "10.0.128.0/18"]);
/// ```
pub fn split_into_subnets(parent: &str, count: usize) -> Result<Vec<Ipv4>> {
    let parent = Ipv4::new(parent)?.network()?;
    if count == 0 {
        return Err(Error::InvalidCidr(format!(
            "cannot split {parent} into zero subnets"
        )));
    }
    if count == 1 {
        return Ok(vec![parent]);
    }

    let extra_bits = usize::BITS - (count - 1).leading_zeros();
    let new_mask = parent.mask as u32 + extra_bits;
    if new_mask > MAX_LENGTH as u32 {
        return Err(Error::InvalidCidr(format!(
            "cannot split {parent} into {count} subnets: /{new_mask} exceeds /{MAX_LENGTH}"
        )));
    }
    let new_mask = new_mask as u8;

    let mut blocks = Vec::with_capacity(count);
    let mut block = Ipv4 {
        addr: parent.addr,
        mask: new_mask,
    };
    blocks.push(block);
    while blocks.len() < count {
        block = next_subnet_ipv4(block, None)?;
        blocks.push(block);
    }
    log::trace!("split {parent} into {count}: {blocks:?}");
    Ok(blocks)
}

/// IPv4 address with CIDR notation support.
#[derive(Eq, Ord, Debug, Copy, Clone, Hash)]
pub struct Ipv4 {
    /// The IPv4 address.
    pub addr: Ipv4Addr,
    /// The subnet mask length (0-32).
    pub mask: u8,
}

impl Serialize for Ipv4 {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Ipv4 {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Ipv4, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ipv4::new(&s).map_err(de::Error::custom)
    }
}

impl Ipv4 {
    /// Create a new [`Ipv4`] from a CIDR string (e.g., "10.0.0.0/24").
    pub fn new(addr_cidr: &str) -> Result<Ipv4> {
        let addr_cidr = addr_cidr.trim();
        let (addr, mask) = addr_cidr
            .split_once('/')
            .ok_or_else(|| Error::InvalidCidr(format!("missing prefix length in {addr_cidr:?}")))?;
        let addr: Ipv4Addr = addr
            .parse()
            .map_err(|_| Error::InvalidCidr(format!("invalid address {addr:?}")))?;
        let mask: u8 = mask
            .parse()
            .map_err(|_| Error::InvalidCidr(format!("invalid prefix length {mask:?}")))?;
        if mask > MAX_LENGTH {
            return Err(too_long(mask));
        }
        Ok(Ipv4 { addr, mask })
    }

    /// The same block with host bits cleared.
    pub fn network(&self) -> Result<Ipv4> {
        Ok(Ipv4 {
            addr: cut_addr(self.addr, self.mask)?,
            mask: self.mask,
        })
    }

    /// Get the broadcast address for this block.
    pub fn broadcast(&self) -> Result<Ipv4> {
        let broadcast = broadcast_addr(self.addr, self.mask)?;
        Ok(Ipv4 {
            addr: broadcast,
            mask: self.mask,
        })
    }

    /// Lowest (network) address in the block.
    pub fn lo(&self) -> Ipv4Addr {
        // mask is validated on construction, so the shift cannot fail
        let mask = get_cidr_mask(self.mask).unwrap_or(u32::MAX);
        Ipv4Addr::from(u32::from(self.addr) & mask)
    }

    /// Highest (broadcast) address in the block.
    pub fn hi(&self) -> Ipv4Addr {
        let mask = get_cidr_mask(self.mask).unwrap_or(u32::MAX);
        Ipv4Addr::from((u32::from(self.addr) & mask) | !mask)
    }

    /// True if `ip` falls inside this block.
    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        self.lo() <= ip && ip <= self.hi()
    }

    /// True if the two blocks share any address.
    pub fn overlaps(&self, other: &Ipv4) -> bool {
        self.lo() <= other.hi() && other.lo() <= self.hi()
    }

    /// True if `other` lies entirely inside this block.
    pub fn covers(&self, other: &Ipv4) -> bool {
        self.mask <= other.mask && self.contains(other.lo())
    }
}

impl FromStr for Ipv4 {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ipv4::new(s)
    }
}

impl std::fmt::Display for Ipv4 {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}/{}", self.addr, self.mask)
    }
}

impl PartialEq for Ipv4 {
    fn eq(&self, other: &Ipv4) -> bool {
        self.addr == other.addr && self.mask == other.mask
    }
}

impl PartialOrd for Ipv4 {
    fn partial_cmp(&self, other: &Ipv4) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
