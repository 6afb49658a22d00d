//! Work dispatcher and commit handler - the audio-context half
//!
//! [`ConvolverUnit::run`] is called once per audio block and must never
//! block, allocate, or wait unboundedly: it drains completion
//! acknowledgments, forwards control events to the worker, raises a
//! synthetic reinit request when the host buffer size changed, and
//! finally convolves the block through the online engine.

use crate::bridge::{
    WorkRequest, WorkResponse, WorkScheduler, RESPONSE_QUEUE_CAPACITY, WORK_QUEUE_CAPACITY,
};
use crate::codec::Notification;
use crate::engine::{ConvolutionEngine, EngineFactory, ParamKey};
use crate::gate::ReinitGate;
use crate::slots::EngineSlots;
use crate::worker::OfflineConfigurator;
use crossbeam_channel::{bounded, Receiver};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Smallest block size the convolution engine accepts
pub const MIN_BLOCK_SIZE: usize = 64;
/// Largest block size the convolution engine accepts
pub const MAX_BLOCK_SIZE: usize = 4096;

/// A block size is usable iff it is a power of two within
/// [`MIN_BLOCK_SIZE`, `MAX_BLOCK_SIZE`].
pub fn valid_block_size(n_samples: usize) -> bool {
    (MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&n_samples) && n_samples.is_power_of_two()
}

/// Stream parameters the unit is created with
#[derive(Debug, Clone)]
pub struct UnitConfig {
    pub sample_rate: u32,
    pub channels_in: usize,
    pub channels_out: usize,
    /// Initial host buffer size; must satisfy [`valid_block_size`]
    pub block_size: usize,
}

impl Default for UnitConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels_in: 1,
            channels_out: 1,
            block_size: 1024,
        }
    }
}

/// The audio-context end of the reconfiguration protocol
pub struct ConvolverUnit<E: ConvolutionEngine> {
    slots: Arc<EngineSlots<E>>,
    gate: Arc<ReinitGate>,
    scheduler: WorkScheduler,
    responses: Receiver<WorkResponse>,
    block_size: Arc<AtomicUsize>,
    /// An acknowledgment arrived but the swap was deferred because the
    /// worker was still preparing a follow-up request
    commit_pending: bool,
    notifications: Vec<Notification>,
}

impl<E: ConvolutionEngine> ConvolverUnit<E> {
    /// Build a connected unit/configurator pair. The unit belongs on
    /// the audio context, the configurator on the worker context.
    pub fn create<F>(config: UnitConfig, factory: F) -> (Self, OfflineConfigurator<F>)
    where
        F: EngineFactory<Engine = E>,
    {
        debug_assert!(valid_block_size(config.block_size));

        let slots = Arc::new(EngineSlots::new());
        let gate = Arc::new(ReinitGate::new());
        let block_size = Arc::new(AtomicUsize::new(config.block_size));
        let (work_tx, work_rx) = bounded(WORK_QUEUE_CAPACITY);
        let (resp_tx, resp_rx) = bounded(RESPONSE_QUEUE_CAPACITY);

        let unit = Self {
            slots: Arc::clone(&slots),
            gate: Arc::clone(&gate),
            scheduler: WorkScheduler::new(work_tx),
            responses: resp_rx,
            block_size: Arc::clone(&block_size),
            commit_pending: false,
            // at most one commit per block, so this never regrows
            notifications: Vec::with_capacity(4),
        };
        let configurator = OfflineConfigurator::new(
            slots,
            gate,
            factory,
            work_rx,
            resp_tx,
            config.sample_rate,
            config.channels_in,
            config.channels_out,
            block_size,
        );
        (unit, configurator)
    }

    /// Process one audio block.
    ///
    /// `events` are the raw control events delivered for this block,
    /// in arrival order; they are moved to the worker without being
    /// decoded or copied. Returns the notifications emitted during
    /// this block (at most one per committed reconfiguration).
    pub fn run(
        &mut self,
        inputs: &[&[f32]],
        outputs: &mut [&mut [f32]],
        n_samples: usize,
        events: impl IntoIterator<Item = Vec<u8>>,
    ) -> &[Notification] {
        self.notifications.clear();
        self.drain_responses();

        for event in events {
            if !self.scheduler.schedule(WorkRequest::Control(event)) {
                tracing::warn!("work queue full, control event dropped");
            }
        }

        let configured = self.block_size.load(Ordering::Acquire);
        if n_samples != configured {
            if !valid_block_size(n_samples) {
                tracing::debug!(n_samples, "unsupported block size, emitting silence");
                silence(outputs, n_samples);
                return &self.notifications;
            }
            if self.gate.try_enter() {
                self.block_size.store(n_samples, Ordering::Release);
                if !self.scheduler.schedule(WorkRequest::Reinit) {
                    // no acknowledgment will ever arrive for this
                    // cycle, so roll the trigger back entirely
                    tracing::warn!("work queue full, buffer size change postponed");
                    self.block_size.store(configured, Ordering::Release);
                    self.gate.leave();
                }
            }
            // otherwise a reconfiguration is already in flight and the
            // storm of size reports collapses into that one cycle
        }

        self.slots.with_online(|engine| match engine {
            Some(engine) => engine.process(inputs, outputs, n_samples),
            None => silence(outputs, n_samples),
        });

        &self.notifications
    }

    /// Notifications emitted by the most recent [`ConvolverUnit::run`].
    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    fn drain_responses(&mut self) {
        while let Ok(WorkResponse::Applied) = self.responses.try_recv() {
            if self.gate.is_pending() {
                // acknowledgments within one cycle coalesce into a
                // single commit
                self.commit_pending = true;
            } else {
                tracing::warn!("stale completion acknowledgment ignored");
            }
        }
        if self.commit_pending && self.commit() {
            self.commit_pending = false;
        }
    }

    /// Swap the prepared engine in, notify, and clear the gate. Only
    /// pointer-sized state changes happen here.
    fn commit(&mut self) -> bool {
        if !self.slots.try_swap() {
            // the worker is preparing a follow-up request in the same
            // cycle; retry on a later block
            return false;
        }
        if let Some(path) = self.slots.query_online(ParamKey::IrFile) {
            self.notifications
                .push(Notification::ActiveConfiguration { path });
        }
        self.gate.leave();
        true
    }
}

fn silence(outputs: &mut [&mut [f32]], n_samples: usize) {
    for channel in outputs.iter_mut() {
        let n = n_samples.min(channel.len());
        channel[..n].fill(0.0);
    }
}
