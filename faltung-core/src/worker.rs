//! Offline configurator - the worker-context half
//!
//! Runs with no deadline and may block and allocate freely. Each
//! scheduled request prepares the offline engine: allocate and seed it
//! if needed, apply the decoded change, reinitialize, then send the
//! zero-length acknowledgment that lets the audio side swap.

use crate::bridge::{WorkRequest, WorkResponse};
use crate::codec::{ChangeRequest, CodecError};
use crate::engine::{EngineError, EngineFactory, EngineParam};
use crate::gate::ReinitGate;
use crate::slots::EngineSlots;
use crossbeam_channel::{Receiver, Sender};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced to the worker infrastructure
#[derive(Error, Debug)]
pub enum WorkError {
    /// Offline engine allocation failed; the cycle was abandoned and
    /// the gate cleared
    #[error("out of space for the offline engine")]
    OutOfSpace,
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// The worker-context end of the reconfiguration protocol
pub struct OfflineConfigurator<F: EngineFactory> {
    slots: Arc<EngineSlots<F::Engine>>,
    gate: Arc<ReinitGate>,
    factory: F,
    requests: Receiver<WorkRequest>,
    responses: Sender<WorkResponse>,
    sample_rate: u32,
    channels_in: usize,
    channels_out: usize,
    block_size: Arc<AtomicUsize>,
}

impl<F: EngineFactory> OfflineConfigurator<F> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        slots: Arc<EngineSlots<F::Engine>>,
        gate: Arc<ReinitGate>,
        factory: F,
        requests: Receiver<WorkRequest>,
        responses: Sender<WorkResponse>,
        sample_rate: u32,
        channels_in: usize,
        channels_out: usize,
        block_size: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            slots,
            gate,
            factory,
            requests,
            responses,
            sample_rate,
            channels_in,
            channels_out,
            block_size,
        }
    }

    /// Prepare the offline engine for one scheduled request.
    pub fn handle(&self, request: WorkRequest) -> Result<(), WorkError> {
        // join the cycle in flight, or open a new one; every request
        // is gated uniformly so at most one commit follows
        let opened = self.gate.try_enter();
        // a reinit rides on a cycle the dispatcher opened before
        // scheduling it, so a reinit failure abandons that cycle too
        let owns_cycle = opened || matches!(request, WorkRequest::Reinit);

        let prep = self.slots.begin_prepare();

        if let Err(err) = prep.ensure_offline_with(|| self.factory.allocate()) {
            // no acknowledgment will ever arrive, so no stale pending
            // state may survive
            tracing::error!(%err, "offline engine allocation failed");
            self.gate.leave();
            return Err(WorkError::OutOfSpace);
        }

        match request {
            // the zero-length request: only the buffer size changed
            WorkRequest::Reinit => {}
            WorkRequest::Control(bytes) => match ChangeRequest::decode(&bytes) {
                Ok(ChangeRequest::SetImpulseResponse { path }) => {
                    tracing::info!(%path, "loading impulse response");
                    if let Err(err) = prep.configure(EngineParam::IrFile(PathBuf::from(path))) {
                        tracing::error!(%err, "offline engine rejected the impulse response");
                        drop(prep);
                        if owns_cycle {
                            self.gate.leave();
                        }
                        return Err(err.into());
                    }
                }
                Ok(ChangeRequest::ChangeBufferSize) => {}
                Err(err) => {
                    // discard without touching the offline engine; no
                    // response is sent, so a cycle this request opened
                    // has to be closed here
                    tracing::warn!(%err, "unrecognized control event discarded");
                    if owns_cycle {
                        self.gate.leave();
                    }
                    return Ok(());
                }
            },
        }

        if let Err(err) = prep.initialize(
            self.sample_rate,
            self.channels_in,
            self.channels_out,
            self.block_size.load(Ordering::Acquire),
        ) {
            // abandoned cycle: no acknowledgment will arrive, so the
            // gate must not stay pending
            tracing::error!(%err, "offline engine initialization failed");
            drop(prep);
            if owns_cycle {
                self.gate.leave();
            }
            return Err(err.into());
        }
        drop(prep);

        // zero-length acknowledgment: proceed to swap. The request
        // queue is wider than the acknowledgment queue, so the send
        // may wait for the audio side to drain; this context may block
        if self.responses.send(WorkResponse::Applied).is_err() {
            // audio side hung up; nothing is left to commit
            self.gate.leave();
        }
        Ok(())
    }

    /// Handle one queued request, if any. Returns whether a request
    /// was processed. For hosts that poll the worker instead of
    /// dedicating a thread to it.
    pub fn try_run_once(&self) -> bool {
        match self.requests.try_recv() {
            Ok(request) => {
                if let Err(err) = self.handle(request) {
                    tracing::error!(%err, "reconfiguration request failed");
                }
                true
            }
            Err(_) => false,
        }
    }

    /// Block on the request queue until the audio side hangs up.
    pub fn run_loop(self) {
        while let Ok(request) = self.requests.recv() {
            if let Err(err) = self.handle(request) {
                tracing::error!(%err, "reconfiguration request failed");
            }
        }
        tracing::debug!("offline configurator shutting down");
    }
}
