//! IPv4 CIDR blocks.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use stackline_common::error::{Result, StacklineError};

/// An IPv4 network block such as `10.0.0.0/16`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ipv4Cidr {
    network: Ipv4Addr,
    prefix: u8,
}

impl Ipv4Cidr {
    /// Creates a block, rejecting addresses with host bits set.
    ///
    /// # Errors
    ///
    /// Returns an error if `prefix > 32` or `network` has host bits set.
    pub fn new(network: Ipv4Addr, prefix: u8) -> Result<Self> {
        if prefix > 32 {
            return Err(StacklineError::config(format!(
                "invalid prefix length /{prefix}"
            )));
        }
        let cidr = Self { network, prefix };
        if u32::from(network) & !cidr.netmask() != 0 {
            return Err(StacklineError::config(format!(
                "{network}/{prefix} has host bits set"
            )));
        }
        Ok(cidr)
    }

    /// Returns the network address.
    #[must_use]
    pub const fn network(&self) -> Ipv4Addr {
        self.network
    }

    /// Returns the prefix length.
    #[must_use]
    pub const fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Returns the number of addresses in the block.
    #[must_use]
    pub const fn size(&self) -> u64 {
        1u64 << (32 - self.prefix as u32)
    }

    const fn netmask(&self) -> u32 {
        if self.prefix == 0 {
            0
        } else {
            u32::MAX << (32 - self.prefix as u32)
        }
    }

    fn first(&self) -> u64 {
        u64::from(u32::from(self.network))
    }

    fn last(&self) -> u64 {
        self.first() + self.size() - 1
    }

    /// Returns how many `/mask` blocks fit in this block.
    #[must_use]
    pub const fn subnet_count(&self, mask: u8) -> u64 {
        if mask < self.prefix || mask > 32 {
            0
        } else {
            1u64 << (mask - self.prefix) as u32
        }
    }

    /// Returns the `index`-th `/mask` block inside this block.
    ///
    /// # Errors
    ///
    /// Returns an error if `mask` is shorter than this block's prefix or
    /// `index` lies outside the block.
    pub fn subnet(&self, mask: u8, index: u64) -> Result<Self> {
        let count = self.subnet_count(mask);
        if index >= count {
            return Err(StacklineError::config(format!(
                "{self} has room for {count} /{mask} subnets, index {index} requested"
            )));
        }
        let step = 1u64 << (32 - u32::from(mask));
        let start = self.first() + index * step;
        let addr = u32::try_from(start)
            .map_err(|_| StacklineError::config(format!("subnet {index} of {self} overflows")))?;
        Self::new(Ipv4Addr::from(addr), mask)
    }

    /// Returns whether `other` lies entirely inside this block.
    #[must_use]
    pub fn contains(&self, other: &Self) -> bool {
        other.first() >= self.first() && other.last() <= self.last()
    }

    /// Returns whether the two blocks share at least one address.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.first() <= other.last() && other.first() <= self.last()
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

impl FromStr for Ipv4Cidr {
    type Err = StacklineError;

    fn from_str(s: &str) -> Result<Self> {
        let (addr, prefix) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| StacklineError::config(format!("CIDR block without prefix: {s}")))?;
        let network: Ipv4Addr = addr
            .parse()
            .map_err(|_| StacklineError::config(format!("invalid IPv4 address in {s}")))?;
        let prefix: u8 = prefix
            .parse()
            .map_err(|_| StacklineError::config(format!("invalid prefix length in {s}")))?;
        Self::new(network, prefix)
    }
}

impl TryFrom<String> for Ipv4Cidr {
    type Error = StacklineError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Ipv4Cidr> for String {
    fn from(value: Ipv4Cidr) -> Self {
        value.to_string()
    }
}
