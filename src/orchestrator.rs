// Copyright (c) 2025 - Cowboy AI, Inc.
//! Provisioning Orchestrator
//!
//! Drives the external engine through a fixed call sequence for one unit:
//!
//! ```text
//! SelectOrCreateUnit → InstallDependencies → Configure →
//!     (optional) Reconcile → Apply → CollectOutputs
//! ```
//!
//! One call to [`Orchestrator::apply`] is one attempt: there is no local
//! retry loop. Retry policy belongs to the caller - a blind in-process
//! retry of a concurrency conflict risks compounding the race it lost.
//!
//! Every terminal outcome is logged before it is returned, so failures are
//! observable even when the caller only inspects the status.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::engine::{ApplyReport, EngineFault, ProvisioningEngine, UnitHandle};
use crate::stack::StackKey;
use crate::topology::{merge_graphs, NetworkTopology};

/// Terminal status of one orchestration attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningStatus {
    /// Apply succeeded and exported outputs
    Applied,

    /// Apply succeeded but exported nothing - suspicious, not wrong
    AppliedNoOutputs,

    /// Apply failed with a classified error
    Failed,
}

/// Classified failure of an orchestration attempt
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApplyFailure {
    /// Another operation was in flight on the same unit; not retried here
    #[error("Concurrent operation on unit {unit}: {detail}")]
    ConcurrencyConflict { unit: String, detail: String },

    /// The unit exists but in an unexpected state
    #[error("Unit {unit} in unexpected state: {detail}")]
    UnitStateConflict { unit: String, detail: String },

    /// Opaque engine failure, original diagnostic preserved
    #[error("Engine error: {0}")]
    EngineError(String),
}

impl ApplyFailure {
    fn from_fault(fault: EngineFault) -> Self {
        match fault {
            EngineFault::ConcurrentUpdate { unit, detail } => {
                ApplyFailure::ConcurrencyConflict { unit, detail }
            }
            EngineFault::UnitState { unit, detail } => {
                ApplyFailure::UnitStateConflict { unit, detail }
            }
            EngineFault::Other(detail) => ApplyFailure::EngineError(detail),
        }
    }
}

/// Result of one orchestration attempt, returned to the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningOutcome {
    /// Unit the attempt ran against
    pub unit: StackKey,

    /// Terminal status
    pub status: ProvisioningStatus,

    /// Exported outputs (empty unless `Applied`)
    pub outputs: BTreeMap<String, serde_json::Value>,

    /// Classified error (present iff `Failed`)
    pub error: Option<ApplyFailure>,

    /// When the attempt reached its terminal state
    pub finished_at: DateTime<Utc>,
}

impl ProvisioningOutcome {
    /// Whether the attempt failed
    pub fn is_failure(&self) -> bool {
        self.status == ProvisioningStatus::Failed
    }

    fn applied(unit: StackKey, report: ApplyReport) -> Self {
        let status = if report.outputs.is_empty() {
            ProvisioningStatus::AppliedNoOutputs
        } else {
            ProvisioningStatus::Applied
        };
        Self {
            unit,
            status,
            outputs: report.outputs,
            error: None,
            finished_at: Utc::now(),
        }
    }

    fn failed(unit: StackKey, failure: ApplyFailure) -> Self {
        Self {
            unit,
            status: ProvisioningStatus::Failed,
            outputs: BTreeMap::new(),
            error: Some(failure),
            finished_at: Utc::now(),
        }
    }
}

/// Orchestrator options, fixed at construction
#[derive(Debug, Clone, Default)]
pub struct OrchestratorOptions {
    /// Target region handed to the engine via `configure`
    pub region: Option<String>,

    /// Sync observed state before applying. Explicit, never silently on:
    /// some callers skip it for latency, others require it to avoid acting
    /// on stale state.
    pub reconcile_state: bool,
}

/// Drives one engine call sequence per [`apply`](Orchestrator::apply)
pub struct Orchestrator<E> {
    engine: E,
    options: OrchestratorOptions,
}

impl<E: ProvisioningEngine> Orchestrator<E> {
    /// Create an orchestrator over the given engine
    pub fn new(engine: E, options: OrchestratorOptions) -> Self {
        Self { engine, options }
    }

    /// Access to the underlying engine
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Submit the batch of topologies to the engine under one unit and
    /// classify the result.
    ///
    /// Graphs merge in request order; the merged graph is handed over in a
    /// single submission, atomic from this caller's perspective.
    pub async fn apply(
        &self,
        key: &StackKey,
        topologies: &[NetworkTopology],
    ) -> ProvisioningOutcome {
        let graph = merge_graphs(topologies);
        info!(
            unit = %key,
            networks = topologies.len(),
            resources = graph.len(),
            "Submitting topology graph"
        );

        match self.run_sequence(key, &graph).await {
            Ok(report) => {
                let outcome = ProvisioningOutcome::applied(key.clone(), report);
                match outcome.status {
                    ProvisioningStatus::AppliedNoOutputs => {
                        warn!(unit = %key, "Apply completed but exported no outputs");
                    }
                    _ => {
                        info!(unit = %key, outputs = outcome.outputs.len(), "Apply completed");
                    }
                }
                outcome
            }
            Err(fault) => {
                let failure = ApplyFailure::from_fault(fault);
                error!(unit = %key, %failure, "Apply failed");
                ProvisioningOutcome::failed(key.clone(), failure)
            }
        }
    }

    async fn run_sequence(
        &self,
        key: &StackKey,
        graph: &[crate::topology::ResourceSpec],
    ) -> Result<ApplyReport, EngineFault> {
        let handle: UnitHandle = self.engine.select_or_create_unit(key, graph).await?;

        self.engine.install_dependencies(&handle).await?;

        if let Some(region) = &self.options.region {
            self.engine.configure(&handle, "region", region).await?;
        }

        if self.options.reconcile_state {
            info!(unit = %key, "Reconciling observed state before apply");
            self.engine.reconcile(&handle).await?;
        }

        self.engine.apply(&handle).await
    }
}
