// Copyright (c) 2025 - Cowboy AI, Inc.
//! Provisioning Engine Boundary
//!
//! The external declarative engine is a consumed capability: it owns all
//! persisted infrastructure state, diffs the submitted graph against that
//! state, and applies the difference. This module only specifies the
//! interface the orchestrator drives.
//!
//! Failure signatures the orchestrator must recognize are tagged on
//! [`EngineFault`] rather than carried as exception hierarchies: a
//! concurrent update on the same unit, a unit that exists in an unexpected
//! state, and opaque engine failures with their diagnostic text preserved.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use crate::stack::StackKey;
use crate::topology::ResourceSpec;

/// Failure reported by the provisioning engine
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineFault {
    /// Another operation is in flight on the same unit
    #[error("Concurrent update on unit {unit}: {detail}")]
    ConcurrentUpdate { unit: String, detail: String },

    /// Unit exists but in an unexpected state (e.g., creation raced)
    #[error("Unit {unit} in unexpected state: {detail}")]
    UnitState { unit: String, detail: String },

    /// Any other engine failure; original diagnostic text preserved
    #[error("Engine failure: {0}")]
    Other(String),
}

/// Handle to a selected or created provisioning unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitHandle {
    /// Unit identity
    pub key: StackKey,

    /// Engine-assigned session token for this attachment
    pub token: String,
}

/// Result of a successful apply
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Exported outputs (network id, subnet ids, ...); may be empty
    pub outputs: BTreeMap<String, serde_json::Value>,

    /// Optional engine summary text
    pub summary: Option<String>,
}

/// Declarative provisioning engine driven by the orchestrator.
///
/// Implementations must make `select_or_create_unit` idempotent: attaching
/// to an existing unit and creating a fresh one are the same operation from
/// the caller's perspective. They must not assume exclusivity - a concurrent
/// caller may be mid-operation on the same unit, and `apply` must then fail
/// with [`EngineFault::ConcurrentUpdate`] rather than interleave.
#[async_trait]
pub trait ProvisioningEngine: Send + Sync {
    /// Select the unit if it exists, create it otherwise, and stage the
    /// desired-state graph on it.
    async fn select_or_create_unit(
        &self,
        key: &StackKey,
        graph: &[ResourceSpec],
    ) -> Result<UnitHandle, EngineFault>;

    /// Install engine-level dependencies the graph needs (provider plugins)
    async fn install_dependencies(&self, handle: &UnitHandle) -> Result<(), EngineFault>;

    /// Set engine-level configuration (target region, credentials context)
    async fn configure(&self, handle: &UnitHandle, key: &str, value: &str)
        -> Result<(), EngineFault>;

    /// Sync the engine's belief about live state before applying
    async fn reconcile(&self, handle: &UnitHandle) -> Result<(), EngineFault>;

    /// Apply the staged graph; blocks for the duration of convergence
    async fn apply(&self, handle: &UnitHandle) -> Result<ApplyReport, EngineFault>;
}

// Several orchestrators may drive one shared engine.
#[async_trait]
impl<E: ProvisioningEngine> ProvisioningEngine for Arc<E> {
    async fn select_or_create_unit(
        &self,
        key: &StackKey,
        graph: &[ResourceSpec],
    ) -> Result<UnitHandle, EngineFault> {
        (**self).select_or_create_unit(key, graph).await
    }

    async fn install_dependencies(&self, handle: &UnitHandle) -> Result<(), EngineFault> {
        (**self).install_dependencies(handle).await
    }

    async fn configure(
        &self,
        handle: &UnitHandle,
        key: &str,
        value: &str,
    ) -> Result<(), EngineFault> {
        (**self).configure(handle, key, value).await
    }

    async fn reconcile(&self, handle: &UnitHandle) -> Result<(), EngineFault> {
        (**self).reconcile(handle).await
    }

    async fn apply(&self, handle: &UnitHandle) -> Result<ApplyReport, EngineFault> {
        (**self).apply(handle).await
    }
}
