// Copyright (c) 2025 - Cowboy AI, Inc.
//! Queue Loop
//!
//! Long-polls the work queue, hands batches through intake and the
//! topology builder, submits each unit group to the orchestrator, and
//! deletes messages from the queue.
//!
//! # Deletion contract
//!
//! A message is deleted exactly once, and only after its handling reached
//! a terminal outcome - success, out-of-scope, or a *reported* failure
//! (validation rejection or classified engine error). A concurrency
//! conflict is not terminal: the losing message is left on the queue and
//! redelivered after the visibility timeout, as is anything whose
//! processing crashed mid-flight. The per-message lifecycle FSM enforces
//! this: `Delete` is only a legal transition out of `Terminal`.
//!
//! Transport errors back off and retry the poll loop itself, never the
//! business operation.

use std::collections::HashMap;
use tracing::{error, info, warn};

use crate::config::ProvisionerConfig;
use crate::domain::ValidationError;
use crate::engine::ProvisioningEngine;
use crate::errors::TransportResult;
use crate::intake::{self, Disposition, IntakeRecord};
use crate::orchestrator::{ApplyFailure, Orchestrator, ProvisioningOutcome};
use crate::queue::MessageQueue;
use crate::state_machine::message_lifecycle::{MessageEvent, MessageState, Terminality};
use crate::state_machine::StateMachine;
use crate::topology::{self, NetworkTopology};

/// Per-message processing report for one poll cycle
#[derive(Debug, Clone)]
pub struct ProcessedMessage {
    /// Transport-level message id
    pub message_id: String,

    /// Final lifecycle state the message reached this cycle
    pub state: MessageState,

    /// Orchestration outcome, if the message reached the engine
    pub outcome: Option<ProvisioningOutcome>,

    /// Intake or build rejection, if any
    pub rejection: Option<ValidationError>,
}

/// The provisioning worker: one logical consumer polling sequentially
pub struct QueueWorker<Q, E> {
    queue: Q,
    orchestrator: Orchestrator<E>,
    config: ProvisionerConfig,
}

impl<Q: MessageQueue, E: ProvisioningEngine> QueueWorker<Q, E> {
    /// Create a worker over a queue and an engine
    pub fn new(queue: Q, engine: E, config: ProvisionerConfig) -> Self {
        let orchestrator = Orchestrator::new(engine, config.orchestrator_options());
        Self {
            queue,
            orchestrator,
            config,
        }
    }

    /// Poll forever. Transport errors back off the loop and retry polling.
    pub async fn run(&self) {
        info!(
            stream = %self.config.queue.stream_name,
            grouping = ?self.config.grouping,
            "Starting provisioning worker"
        );

        loop {
            match self.poll_once().await {
                Ok(processed) => {
                    if !processed.is_empty() {
                        info!(count = processed.len(), "Poll cycle complete");
                    }
                }
                Err(e) => {
                    warn!(error = %e, backoff = ?self.config.poll_backoff, "Transport error, backing off");
                    tokio::time::sleep(self.config.poll_backoff).await;
                }
            }
        }
    }

    /// One poll cycle: receive, normalize, build, apply, delete.
    pub async fn poll_once(&self) -> TransportResult<Vec<ProcessedMessage>> {
        let messages = self
            .queue
            .receive(self.config.queue.max_messages, self.config.queue.wait_time)
            .await?;

        if messages.is_empty() {
            return Ok(Vec::new());
        }

        let records = intake::normalize(&messages, &self.config.defaults);

        let mut states: Vec<MessageState> = vec![MessageState::Received; records.len()];
        let mut outcomes: Vec<Option<ProvisioningOutcome>> = vec![None; records.len()];
        let mut rejections = vec![None; records.len()];
        let mut topologies: HashMap<usize, NetworkTopology> = HashMap::new();

        // Normalize and build in arrival order; per-message failures are
        // isolated and never abort the batch
        for (index, record) in records.iter().enumerate() {
            advance(&mut states[index], MessageEvent::BeginProcessing, record);

            match &record.disposition {
                Disposition::Requested(request) => match topology::build(request) {
                    Ok(topology) => {
                        topologies.insert(index, topology);
                    }
                    Err(e) => {
                        error!(message_id = %record.message_id, error = %e, "Topology build rejected request");
                        rejections[index] = Some(e);
                        advance(
                            &mut states[index],
                            MessageEvent::Finish(Terminality::Failed),
                            record,
                        );
                    }
                },
                Disposition::OutOfScope => {
                    info!(message_id = %record.message_id, "Message does not request network provisioning");
                    advance(
                        &mut states[index],
                        MessageEvent::Finish(Terminality::Succeeded),
                        record,
                    );
                }
                Disposition::Rejected(e) => {
                    error!(message_id = %record.message_id, error = %e, "Message rejected at intake");
                    rejections[index] = Some(e.clone());
                    advance(
                        &mut states[index],
                        MessageEvent::Finish(Terminality::Failed),
                        record,
                    );
                }
            }
        }

        // One orchestration call per provisioning unit
        let groups =
            intake::group_by_unit(&records, self.config.grouping, &self.config.stack_name);
        for group in groups {
            let built: Vec<usize> = group
                .indices
                .iter()
                .copied()
                .filter(|i| topologies.contains_key(i))
                .collect();
            if built.is_empty() {
                continue;
            }

            let batch: Vec<NetworkTopology> =
                built.iter().map(|i| topologies[i].clone()).collect();
            let outcome = self.orchestrator.apply(&group.key, &batch).await;

            // A lost race is not terminal: the message stays on the queue
            // and the visibility timeout redelivers it for another attempt
            if matches!(
                outcome.error,
                Some(ApplyFailure::ConcurrencyConflict { .. })
            ) {
                warn!(unit = %group.key, "Concurrent update lost; leaving messages for redelivery");
                for index in built {
                    outcomes[index] = Some(outcome.clone());
                }
                continue;
            }

            let terminality = if outcome.is_failure() {
                Terminality::Failed
            } else {
                Terminality::Succeeded
            };
            for index in built {
                outcomes[index] = Some(outcome.clone());
                advance(&mut states[index], MessageEvent::Finish(terminality), &records[index]);
            }
        }

        // Delete only messages that reached a terminal outcome. A failed
        // delete leaves the message for redelivery, which at-least-once
        // processing tolerates.
        for (index, record) in records.iter().enumerate() {
            if !states[index].is_terminal() {
                continue;
            }
            match self.queue.delete(&record.receipt).await {
                Ok(()) => advance(&mut states[index], MessageEvent::Delete, record),
                Err(e) => {
                    warn!(message_id = %record.message_id, error = %e, "Delete failed; message will be redelivered");
                }
            }
        }

        Ok(records
            .iter()
            .enumerate()
            .map(|(index, record)| ProcessedMessage {
                message_id: record.message_id.clone(),
                state: states[index],
                outcome: outcomes[index].take(),
                rejection: rejections[index].take(),
            })
            .collect())
    }

    /// Access the orchestrator (mainly for tests)
    pub fn orchestrator(&self) -> &Orchestrator<E> {
        &self.orchestrator
    }
}

/// Apply one lifecycle transition, logging (never panicking) on an
/// illegal one - an illegal transition here is a worker bug, and the
/// message is left undeleted for redelivery.
fn advance(state: &mut MessageState, event: MessageEvent, record: &IntakeRecord) {
    match state.transition(&event) {
        Ok(next) => *state = next,
        Err(e) => {
            error!(message_id = %record.message_id, error = %e, "Illegal message lifecycle transition");
        }
    }
}
