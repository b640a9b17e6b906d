//! IPv4 CIDR block parsing, validation, and subnet carving.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::DeclError;

/// A validated IPv4 CIDR block, e.g. `10.0.0.0/16`.
///
/// Serialised as its canonical string form so it can appear directly in
/// template properties and in environment-supplied configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cidr {
    addr: Ipv4Addr,
    prefix_len: u8,
}

impl Cidr {
    /// Construct a block, rejecting prefix lengths above 32.
    pub fn new(addr: Ipv4Addr, prefix_len: u8) -> Result<Self, DeclError> {
        if prefix_len > 32 {
            return Err(DeclError::InvalidCidr(
                format!("{addr}/{prefix_len}"),
                "prefix length must be 32 or less".into(),
            ));
        }
        Ok(Self { addr, prefix_len })
    }

    /// A /32 block covering a single trusted host.
    pub fn host(addr: Ipv4Addr) -> Self {
        Self {
            addr,
            prefix_len: 32,
        }
    }

    /// The block matching all addresses, `0.0.0.0/0`.
    pub fn any() -> Self {
        Self {
            addr: Ipv4Addr::UNSPECIFIED,
            prefix_len: 0,
        }
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// The network address of this block (host bits masked off).
    pub fn network(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.addr) & self.mask())
    }

    fn mask(&self) -> u32 {
        if self.prefix_len == 0 {
            0
        } else {
            u32::MAX << (32 - self.prefix_len)
        }
    }

    /// The `index`-th sub-block of `new_prefix_len` bits carved out of this
    /// block, counting from the network address upward.
    ///
    /// Carving is deterministic: the same `(block, prefix, index)` triple
    /// always yields the same sub-block, and distinct indices never overlap.
    ///
    /// # Errors
    ///
    /// Returns [`DeclError::SubnetOutOfRange`] if the new prefix is not
    /// strictly longer than this block's, exceeds 32, or the index falls
    /// outside the number of sub-blocks that fit.
    pub fn nth_subnet(&self, new_prefix_len: u8, index: u32) -> Result<Self, DeclError> {
        let out_of_range = || DeclError::SubnetOutOfRange {
            block: self.to_string(),
            prefix_len: new_prefix_len,
            index,
        };

        if new_prefix_len <= self.prefix_len || new_prefix_len > 32 {
            return Err(out_of_range());
        }
        let extra_bits = new_prefix_len - self.prefix_len;
        let count: u64 = 1u64 << extra_bits;
        if u64::from(index) >= count {
            return Err(out_of_range());
        }

        let shift = 32 - new_prefix_len;
        let base = u32::from(self.network());
        Ok(Self {
            addr: Ipv4Addr::from(base | (index << shift)),
            prefix_len: new_prefix_len,
        })
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix_len)
    }
}

impl FromStr for Cidr {
    type Err = DeclError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |why: &str| DeclError::InvalidCidr(s.to_owned(), why.to_owned());

        let (addr_part, len_part) = s
            .split_once('/')
            .ok_or_else(|| invalid("expected address/prefix form"))?;
        let addr: Ipv4Addr = addr_part
            .parse()
            .map_err(|_| invalid("malformed IPv4 address"))?;
        let prefix_len: u8 = len_part
            .parse()
            .map_err(|_| invalid("malformed prefix length"))?;
        Self::new(addr, prefix_len).map_err(|_| invalid("prefix length must be 32 or less"))
    }
}

impl Serialize for Cidr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Cidr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
