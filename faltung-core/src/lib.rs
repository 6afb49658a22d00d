//! Reconfiguration core for real-time audio convolution processors
//!
//! This crate implements the control-plane protocol that lets a host
//! change the active impulse response or its audio buffer size without
//! stalling or glitching the real-time audio path:
//! - Codec: size-prefixed, self-describing binary change events
//! - Gate: single-slot guard coalescing buffer-size change storms
//! - Slots: two-slot engine arena with an atomic online-index swap
//! - Processor: per-block dispatcher and commit handler (audio context)
//! - Worker: offline engine preparation (out-of-band context)
//!
//! The convolution math itself stays behind the [`ConvolutionEngine`]
//! trait.

mod bridge;
mod codec;
mod engine;
mod gate;
mod processor;
mod slots;
mod worker;

pub use bridge::{WorkRequest, WorkResponse, WorkScheduler};
pub use codec::{ChangeRequest, CodecError, Notification, CODEC_VERSION, MAX_PATH_BYTES};
pub use engine::{
    ConvolutionEngine, EngineConfig, EngineError, EngineFactory, EngineParam, ParamKey,
};
pub use gate::ReinitGate;
pub use processor::{valid_block_size, ConvolverUnit, UnitConfig, MAX_BLOCK_SIZE, MIN_BLOCK_SIZE};
pub use slots::{EngineSlots, PrepareGuard};
pub use worker::{OfflineConfigurator, WorkError};
