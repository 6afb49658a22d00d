//! Pass-through stand-in for a partitioned convolution engine
//!
//! Applies only the configured output gain so the protocol can be
//! heard working; a real engine would decode the impulse response and
//! run partitioned FFT convolution here. Initialization fails when the
//! configured impulse response path does not exist, which exercises
//! the no-commit outcome end to end.

use faltung_core::{ConvolutionEngine, EngineConfig, EngineError, EngineFactory, EngineParam, ParamKey};

pub struct DirectEngine {
    config: EngineConfig,
    initialized: bool,
}

impl ConvolutionEngine for DirectEngine {
    fn snapshot(&self) -> EngineConfig {
        self.config.clone()
    }

    fn restore(&mut self, config: EngineConfig) {
        self.config = config;
    }

    fn set_param(&mut self, param: EngineParam) -> Result<(), EngineError> {
        match param {
            EngineParam::IrFile(path) => self.config.ir_file = Some(path),
            EngineParam::Gain(gain) => self.config.gain = gain,
        }
        Ok(())
    }

    fn initialize(
        &mut self,
        _sample_rate: u32,
        _channels_in: usize,
        _channels_out: usize,
        _block_size: usize,
    ) -> Result<(), EngineError> {
        if let Some(path) = &self.config.ir_file {
            if !path.exists() {
                return Err(EngineError::InitFailed(format!(
                    "impulse response not found: {}",
                    path.display()
                )));
            }
        }
        self.initialized = true;
        Ok(())
    }

    fn process(&mut self, inputs: &[&[f32]], outputs: &mut [&mut [f32]], n_samples: usize) {
        for (index, channel) in outputs.iter_mut().enumerate() {
            let n = n_samples.min(channel.len());
            match inputs.get(index).or_else(|| inputs.first()) {
                Some(input) if self.initialized => {
                    let n = n.min(input.len());
                    for (out, sample) in channel[..n].iter_mut().zip(&input[..n]) {
                        *out = sample * self.config.gain;
                    }
                }
                _ => channel[..n].fill(0.0),
            }
        }
    }

    fn query(&self, key: ParamKey) -> Option<String> {
        match key {
            ParamKey::IrFile => self
                .config
                .ir_file
                .as_ref()
                .map(|p| p.display().to_string()),
            ParamKey::Gain => Some(self.config.gain.to_string()),
        }
    }
}

/// Allocates [`DirectEngine`] instances with a fixed initial gain
pub struct DirectFactory {
    pub gain: f32,
}

impl EngineFactory for DirectFactory {
    type Engine = DirectEngine;

    fn allocate(&self) -> Result<DirectEngine, EngineError> {
        Ok(DirectEngine {
            config: EngineConfig {
                ir_file: None,
                gain: self.gain,
            },
            initialized: false,
        })
    }
}
