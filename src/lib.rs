//! Queue-driven network provisioning service
//!
//! Consumes network provisioning requests from a work queue, synthesizes
//! deterministic VPC topologies, and drives an external provisioning
//! engine to converge each provisioning unit on its desired state.
//!
//! ```text
//! queue → intake → topology builder → orchestrator → engine
//!                                          │
//!                                   delete after terminal
//! ```

pub mod config;
pub mod domain;
pub mod engine;
pub mod errors;
pub mod intake;
pub mod orchestrator;
pub mod queue;
pub mod stack;
pub mod state_machine;
pub mod topology;
pub mod worker;

// Re-export commonly used types
pub use config::{ProvisionerConfig, QueueConfig, RequestDefaults};
pub use domain::{CidrBlock, CidrError, NetworkRequest, ValidationError, SUBNET_PREFIX};
pub use engine::{ApplyReport, EngineFault, ProvisioningEngine, UnitHandle};
pub use errors::{TransportError, TransportResult};
pub use intake::{Disposition, IntakeRecord, RawProvisionMessage};
pub use orchestrator::{
    ApplyFailure, Orchestrator, OrchestratorOptions, ProvisioningOutcome, ProvisioningStatus,
};
pub use queue::{JetStreamQueue, MessageQueue, QueueMessage, ReceiptHandle};
pub use stack::{GroupingMode, StackKey};
pub use topology::{NetworkTopology, ResourceKind, ResourceSpec};
pub use worker::{ProcessedMessage, QueueWorker};
