//! Outbound trigger queue seam.
//!
//! # Responsibility
//! - Decouple the propagation coordinator from the message transport; the
//!   engine only needs "enqueue one trigger per referrer".
//!
//! # Invariants
//! - Enqueued triggers reuse the inbound message shape verbatim.
//! - Delivery is at-least-once; consumers rely on the intake gate, not on
//!   the queue, for duplicate safety.

use crate::model::trigger::TriggerMessage;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug)]
pub enum QueueError {
    /// The transport refused or lost the trigger.
    Transport(String),
}

impl Display for QueueError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(message) => write!(f, "trigger transport failed: {message}"),
        }
    }
}

impl Error for QueueError {}

/// Sink for propagation triggers.
pub trait TriggerQueue {
    fn enqueue(&mut self, trigger: TriggerMessage) -> QueueResult<()>;
}

/// Buffering queue; hosts drain it into their transport after each batch,
/// and tests inspect it directly.
#[derive(Debug, Default)]
pub struct InMemoryTriggerQueue {
    pending: Vec<TriggerMessage>,
}

impl InMemoryTriggerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns all buffered triggers in enqueue order.
    pub fn drain(&mut self) -> Vec<TriggerMessage> {
        std::mem::take(&mut self.pending)
    }

    /// Buffered triggers in enqueue order.
    pub fn pending(&self) -> &[TriggerMessage] {
        &self.pending
    }
}

impl TriggerQueue for InMemoryTriggerQueue {
    fn enqueue(&mut self, trigger: TriggerMessage) -> QueueResult<()> {
        self.pending.push(trigger);
        Ok(())
    }
}
