//! Error types for the queue transport boundary

use thiserror::Error;

/// Errors raised by the message queue transport.
///
/// Transport failures back off the poll loop itself; they never fail a
/// business operation, because no message reaches a terminal state through
/// a transport error.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Queue connection error
    #[error("Queue connection error: {0}")]
    Connection(String),

    /// Receiving a batch failed
    #[error("Queue receive error: {0}")]
    Receive(String),

    /// Acknowledging (deleting) a message failed
    #[error("Queue acknowledge error: {0}")]
    Acknowledge(String),
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;
