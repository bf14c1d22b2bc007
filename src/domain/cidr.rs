// Copyright (c) 2025 - Cowboy AI, Inc.
//! CIDR Block Value Object
//!
//! An IPv4 address block in CIDR notation, validated on construction.
//! Invariants:
//! - Prefix length 0-32
//! - Canonical form: host bits are masked off, so the stored address is
//!   always the network address
//!
//! Subnet carving is a pure function of `(parent, new_prefix, index)`,
//! which is what makes derived subnet identifiers reproducible across
//! repeated builds of the same request.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use thiserror::Error;

/// CIDR validation and carving errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CidrError {
    #[error("Invalid CIDR notation: {0}")]
    InvalidCidr(String),

    #[error("Invalid prefix length: {0} (must be 0-32)")]
    InvalidPrefixLength(u8),

    #[error("Subnet prefix /{child} is shorter than parent prefix /{parent}")]
    PrefixTooShort { parent: u8, child: u8 },

    #[error("Subnet index {index} out of range (parent holds {capacity} /{prefix} blocks)")]
    IndexOutOfRange {
        index: u32,
        capacity: u64,
        prefix: u8,
    },
}

/// An IPv4 CIDR block (network address + prefix length)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CidrBlock {
    network: Ipv4Addr,
    prefix: u8,
}

impl CidrBlock {
    /// Create a block from an address and prefix length.
    ///
    /// Host bits are masked off so the result is canonical.
    pub fn new(address: Ipv4Addr, prefix: u8) -> Result<Self, CidrError> {
        if prefix > 32 {
            return Err(CidrError::InvalidPrefixLength(prefix));
        }

        let network = Ipv4Addr::from(u32::from(address) & prefix_mask(prefix));
        Ok(Self { network, prefix })
    }

    /// Parse CIDR notation (e.g., "10.0.0.0/16")
    pub fn parse(cidr: impl AsRef<str>) -> Result<Self, CidrError> {
        let cidr = cidr.as_ref();

        let (addr_str, prefix_str) = cidr
            .split_once('/')
            .ok_or_else(|| CidrError::InvalidCidr(cidr.to_string()))?;

        let address = Ipv4Addr::from_str(addr_str)
            .map_err(|_| CidrError::InvalidCidr(cidr.to_string()))?;

        let prefix = prefix_str
            .parse::<u8>()
            .map_err(|_| CidrError::InvalidCidr(cidr.to_string()))?;

        Self::new(address, prefix)
    }

    /// Network address of the block
    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    /// Prefix length
    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Number of addresses in the block
    pub fn size(&self) -> u64 {
        1u64 << (32 - self.prefix)
    }

    /// Number of child blocks of `child_prefix` this block can hold
    pub fn capacity(&self, child_prefix: u8) -> Result<u64, CidrError> {
        if child_prefix > 32 {
            return Err(CidrError::InvalidPrefixLength(child_prefix));
        }
        if child_prefix < self.prefix {
            return Err(CidrError::PrefixTooShort {
                parent: self.prefix,
                child: child_prefix,
            });
        }
        Ok(1u64 << (child_prefix - self.prefix))
    }

    /// Check whether `other` is entirely inside this block
    pub fn contains(&self, other: &CidrBlock) -> bool {
        other.prefix >= self.prefix
            && (u32::from(other.network) & prefix_mask(self.prefix)) == u32::from(self.network)
    }

    /// Check whether two blocks share any address.
    ///
    /// For CIDR blocks, overlap implies one contains the other.
    pub fn overlaps(&self, other: &CidrBlock) -> bool {
        self.contains(other) || other.contains(self)
    }

    /// Carve the `index`-th child block of `child_prefix` out of this block.
    ///
    /// Children are laid out in address order: index 0 starts at the parent
    /// network address, index 1 immediately after, and so on.
    pub fn subnet(&self, child_prefix: u8, index: u32) -> Result<CidrBlock, CidrError> {
        let capacity = self.capacity(child_prefix)?;
        if u64::from(index) >= capacity {
            return Err(CidrError::IndexOutOfRange {
                index,
                capacity,
                prefix: child_prefix,
            });
        }

        // u64 math: a /0 child spans the whole address space
        let child_size = 1u64 << (32 - child_prefix);
        let base = u64::from(u32::from(self.network)) + u64::from(index) * child_size;
        CidrBlock::new(Ipv4Addr::from(base as u32), child_prefix)
    }
}

fn prefix_mask(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - prefix)
    }
}

impl fmt::Display for CidrBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

impl FromStr for CidrBlock {
    type Err = CidrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for CidrBlock {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CidrBlock {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(de::Error::custom)
    }
}
