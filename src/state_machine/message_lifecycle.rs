// Copyright (c) 2025 - Cowboy AI, Inc.
//! Message Lifecycle State Machine
//!
//! Every queue message moves through an explicit lifecycle:
//!
//! ```text
//! Received → Processing → Terminal{Succeeded|Failed} → Deleted
//! ```
//!
//! Deletion is only reachable from a terminal state. A crash anywhere
//! before `Terminal` leaves the message undeleted, so the queue's
//! visibility timeout redelivers it - crash safety is a property of the
//! state machine, not of where the delete call happens to sit in the
//! code.
//!
//! `Terminal(Failed)` is a *reported* failure: the message is still
//! deleted, because redelivering a request that failed validation or was
//! classified by the engine would only fail the same way again. A
//! concurrency conflict never reaches `Terminal` - the message stays in
//! `Processing` and the queue's redelivery retries it once the race is
//! over.

use super::{StateMachine, TransitionError, TransitionResult};
use std::fmt;

/// How a message's processing concluded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminality {
    /// Applied, applied without outputs, or out of scope
    Succeeded,

    /// Rejected at intake or failed with a classified engine error
    Failed,
}

/// Lifecycle state of one received message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageState {
    /// Pulled from the queue, not yet examined
    Received,

    /// Being normalized, built, or applied
    Processing,

    /// Processing concluded with a reported outcome
    Terminal(Terminality),

    /// Removed from the queue; final
    Deleted,
}

impl MessageState {
    /// Whether the message reached a reported outcome
    pub fn is_terminal(&self) -> bool {
        matches!(self, MessageState::Terminal(_))
    }
}

impl fmt::Display for MessageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageState::Received => write!(f, "received"),
            MessageState::Processing => write!(f, "processing"),
            MessageState::Terminal(Terminality::Succeeded) => write!(f, "terminal:succeeded"),
            MessageState::Terminal(Terminality::Failed) => write!(f, "terminal:failed"),
            MessageState::Deleted => write!(f, "deleted"),
        }
    }
}

/// Lifecycle input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageEvent {
    /// Start working on the message
    BeginProcessing,

    /// Record the reported outcome
    Finish(Terminality),

    /// Remove the message from the queue
    Delete,
}

impl fmt::Display for MessageEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageEvent::BeginProcessing => write!(f, "begin_processing"),
            MessageEvent::Finish(Terminality::Succeeded) => write!(f, "finish:succeeded"),
            MessageEvent::Finish(Terminality::Failed) => write!(f, "finish:failed"),
            MessageEvent::Delete => write!(f, "delete"),
        }
    }
}

impl StateMachine for MessageState {
    type Input = MessageEvent;

    fn transition(&self, input: &Self::Input) -> TransitionResult<Self> {
        use MessageEvent::*;
        use MessageState::*;

        match (self, input) {
            (Received, BeginProcessing) => Ok(Processing),
            (Processing, Finish(t)) => Ok(Terminal(*t)),
            (Terminal(_), Delete) => Ok(Deleted),
            (from, input) => Err(TransitionError::InvalidTransition {
                from: from.to_string(),
                input: input.to_string(),
            }),
        }
    }
}
