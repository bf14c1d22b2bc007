// Copyright (c) 2025 - Cowboy AI, Inc.
//! Stack Key Resolver
//!
//! A [`StackKey`] is the stable identity of a provisioning unit - the scope
//! under which the external engine reconciles one or more topologies as a
//! single state unit. Repeated requests for the same logical network resolve
//! to the same key and therefore converge instead of duplicating.
//!
//! Resolution is pure and deterministic; no I/O.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of one provisioning unit (project + unit name)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StackKey {
    /// Engine project the unit belongs to
    pub project: String,

    /// Unit name within the project
    pub unit: String,
}

impl StackKey {
    /// Key for single-network mode: one unit per network name.
    ///
    /// Isolates the blast radius of a failed apply to one network.
    pub fn for_network(project: impl Into<String>, network: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            unit: network.into(),
        }
    }

    /// Key for batched mode: one shared unit for a whole batch.
    ///
    /// Fewer engine round-trips at the cost of coupled failure domains -
    /// a documented trade-off, not a defect.
    pub fn shared(project: impl Into<String>, stack_name: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            unit: stack_name.into(),
        }
    }
}

impl fmt::Display for StackKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.project, self.unit)
    }
}

/// How inbound requests map onto provisioning units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupingMode {
    /// One orchestration call per network, each under its own unit
    #[default]
    PerNetwork,

    /// All requests of one poll cycle grouped under a shared unit per project
    Batched,
}
