//! Engine boundary - the convolution engine behind the control plane
//!
//! The actual convolution math lives behind [`ConvolutionEngine`]. The
//! control plane only allocates engines, clones configuration between
//! them, mutates the offline instance and initializes it; it never
//! inspects what an engine does with a block of audio.

use std::path::PathBuf;
use thiserror::Error;

/// Errors reported across the engine boundary
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("engine allocation failed")]
    AllocationFailed,
    #[error("unsupported engine parameter")]
    UnsupportedParam,
    #[error("engine initialization failed: {0}")]
    InitFailed(String),
    #[error("no engine in the offline slot")]
    NoOfflineEngine,
}

/// Keys for querying engine configuration values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKey {
    IrFile,
    Gain,
}

/// A single configurable engine parameter
#[derive(Debug, Clone, PartialEq)]
pub enum EngineParam {
    /// Path of the impulse response file to convolve with
    IrFile(PathBuf),
    /// Output gain applied to the convolved signal
    Gain(f32),
}

/// Configuration snapshot of an engine
///
/// Cloned from the online engine into a freshly allocated offline
/// engine, then selectively mutated, so parameters unrelated to a
/// change survive it.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub ir_file: Option<PathBuf>,
    pub gain: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ir_file: None,
            gain: 1.0,
        }
    }
}

/// A convolution engine instance
///
/// Two instances exist at any time: the online one, read exclusively by
/// the audio path, and the offline one, owned by the worker while a
/// reconfiguration is being prepared. `initialize` may be slow and is
/// only ever called off the audio path; `process` must be real-time
/// safe.
pub trait ConvolutionEngine: Send {
    /// Copy out the current configuration snapshot.
    fn snapshot(&self) -> EngineConfig;

    /// Overwrite the configuration from a snapshot.
    fn restore(&mut self, config: EngineConfig);

    /// Mutate a single configuration parameter.
    fn set_param(&mut self, param: EngineParam) -> Result<(), EngineError>;

    /// Bind sample rate, channel counts and block size. May block and
    /// allocate; runs on the worker context only.
    fn initialize(
        &mut self,
        sample_rate: u32,
        channels_in: usize,
        channels_out: usize,
        block_size: usize,
    ) -> Result<(), EngineError>;

    /// Convolve one block of audio. Real-time safe.
    fn process(&mut self, inputs: &[&[f32]], outputs: &mut [&mut [f32]], n_samples: usize);

    /// Look up a configuration value by key.
    fn query(&self, key: ParamKey) -> Option<String>;
}

/// Allocates engine instances for the offline slot
///
/// Allocation failure is the resource-exhaustion path of the protocol:
/// the cycle is abandoned, the gate cleared, and the online engine left
/// untouched.
pub trait EngineFactory: Send {
    type Engine: ConvolutionEngine;

    fn allocate(&self) -> Result<Self::Engine, EngineError>;
}
