// Copyright (c) 2025 - Cowboy AI, Inc.
//! Network Request Model and Validation Invariants
//!
//! `NetworkRequest` is the validated, defaulted input to topology synthesis.
//! It is constructed once per inbound message, immutable thereafter, and
//! consumed by the topology builder.
//!
//! # Invariants
//!
//! - Name is a valid resource label (it seeds every derived identifier)
//! - At least one subnet is requested
//! - Private subnets require at least one public subnet (the NAT gateway
//!   must live in a public subnet)
//! - The parent block can host every requested subnet as a disjoint /24

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::domain::cidr::CidrBlock;

/// Prefix length of every carved subnet.
///
/// Public subnets take indices `0..public_subnets`; private subnets start
/// at offset `public_subnets`, so the two tiers never collide even though
/// both are carved from the same parent block.
pub const SUBNET_PREFIX: u8 = 24;

/// Maximum length of a network name
pub const MAX_NAME_LEN: usize = 63;

/// Validation failure identifying the offending request field
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Invalid {field}: {reason}")]
pub struct ValidationError {
    /// Request field that failed validation
    pub field: &'static str,

    /// Human-readable reason
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// A validated network provisioning request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkRequest {
    /// Network name, seeds every derived resource identifier
    pub name: String,

    /// Parent address block the subnets are carved from
    pub cidr: CidrBlock,

    /// Number of public subnets (direct internet egress)
    pub public_subnets: u32,

    /// Number of private subnets (egress via NAT only)
    pub private_subnets: u32,

    /// Tags applied to every taggable resource
    pub tags: BTreeMap<String, String>,
}

impl NetworkRequest {
    /// Construct a validated request.
    pub fn new(
        name: impl Into<String>,
        cidr: CidrBlock,
        public_subnets: u32,
        private_subnets: u32,
        tags: BTreeMap<String, String>,
    ) -> Result<Self, ValidationError> {
        let request = Self {
            name: name.into(),
            cidr,
            public_subnets,
            private_subnets,
            tags,
        };
        request.validate()?;
        Ok(request)
    }

    /// Check every request invariant.
    ///
    /// Pure; returns the first violation found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_name(&self.name)?;

        let total = u64::from(self.public_subnets) + u64::from(self.private_subnets);
        if total == 0 {
            return Err(ValidationError::new(
                "public_subnets",
                "at least one subnet is required",
            ));
        }

        // A NAT path needs a public subnet to host the NAT gateway
        if self.private_subnets > 0 && self.public_subnets == 0 {
            return Err(ValidationError::new(
                "public_subnets",
                "private subnets require at least one public subnet for the NAT gateway",
            ));
        }

        let capacity = self.cidr.capacity(SUBNET_PREFIX).map_err(|e| {
            ValidationError::new(
                "cidr",
                format!(
                    "cannot carve /{SUBNET_PREFIX} subnets from {}: {e}",
                    self.cidr
                ),
            )
        })?;

        if total > capacity {
            return Err(ValidationError::new(
                "cidr",
                format!(
                    "{} holds only {capacity} /{SUBNET_PREFIX} subnets, {total} requested",
                    self.cidr
                ),
            ));
        }

        Ok(())
    }

    /// Total number of subnets requested
    pub fn total_subnets(&self) -> u32 {
        self.public_subnets + self.private_subnets
    }

    /// Whether the topology will include a NAT path
    pub fn wants_nat(&self) -> bool {
        self.private_subnets > 0
    }
}

/// Validate a network name as a resource label
fn validate_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::new("name", "name cannot be empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(ValidationError::new(
            "name",
            format!("name exceeds {MAX_NAME_LEN} characters"),
        ));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(ValidationError::new(
            "name",
            "name must be lowercase alphanumeric with hyphens",
        ));
    }
    if name.starts_with('-') || name.ends_with('-') {
        return Err(ValidationError::new(
            "name",
            "name cannot start or end with a hyphen",
        ));
    }
    Ok(())
}
