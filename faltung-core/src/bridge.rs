//! Worker scheduling and completion boundaries
//!
//! Bounded channels stand in for the host's non-blocking work
//! dispatch: the audio side only ever `try_send`s, the worker side may
//! block on `recv`. Acknowledgments travel the other way and carry no
//! payload; receiving one means "the offline engine is ready, proceed
//! to swap".

use crossbeam_channel::{Sender, TrySendError};

/// Capacity of the audio -> worker request queue
pub(crate) const WORK_QUEUE_CAPACITY: usize = 64;
/// Capacity of the worker -> audio acknowledgment queue
pub(crate) const RESPONSE_QUEUE_CAPACITY: usize = 16;

/// A unit of work handed to the out-of-band context
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkRequest {
    /// Raw control event, forwarded verbatim and decoded on the worker
    Control(Vec<u8>),
    /// Payload-less request: reinitialize for a new buffer size
    Reinit,
}

/// Completion signal from the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkResponse {
    /// Preparation finished successfully; the commit handler may swap
    Applied,
}

/// Non-blocking handle for scheduling out-of-band work from the audio
/// context
pub struct WorkScheduler {
    tx: Sender<WorkRequest>,
}

impl WorkScheduler {
    pub(crate) fn new(tx: Sender<WorkRequest>) -> Self {
        Self { tx }
    }

    /// Hand a request to the worker. Returns immediately; `false`
    /// means the queue is full or the worker is gone and the request
    /// was dropped.
    pub fn schedule(&self, request: WorkRequest) -> bool {
        match self.tx.try_send(request) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => false,
        }
    }
}
