//! Faltung - standalone demo host
//!
//! Plays a test tone through the convolver and drives the
//! reconfiguration protocol from a line-oriented console: control
//! events travel through a lock-free ring into the audio callback,
//! exactly as a plugin host would deliver them on its control port.

mod engine;

use std::io::{self, BufRead};
use std::thread;

use anyhow::{anyhow, Context};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::HeapRb;
use tracing_subscriber::EnvFilter;

use engine::DirectFactory;
use faltung_core::{ChangeRequest, ConvolverUnit, UnitConfig, MAX_BLOCK_SIZE};

/// Test tone frequency in Hz
const TONE_HZ: f32 = 220.0;
/// Test tone level
const TONE_LEVEL: f32 = 0.4;
/// Initial engine output gain
const INITIAL_GAIN: f32 = 0.8;

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let ir_path = std::env::args().nth(1);

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| anyhow!("no audio output device found"))?;
    let config = device
        .default_output_config()
        .context("failed to get audio output config")?;

    let sample_rate = config.sample_rate().0;
    let channels = config.channels() as usize;
    tracing::info!(sample_rate, channels, "opening output stream");

    let unit_config = UnitConfig {
        sample_rate,
        channels_in: 1,
        channels_out: 1,
        block_size: 1024,
    };
    let (mut unit, configurator) =
        ConvolverUnit::create(unit_config, DirectFactory { gain: INITIAL_GAIN });

    let worker = thread::spawn(move || configurator.run_loop());

    // control events: console -> audio callback
    let ring = HeapRb::<Vec<u8>>::new(16);
    let (mut event_tx, mut event_rx) = ring.split();

    if let Some(path) = ir_path {
        let event = ChangeRequest::SetImpulseResponse { path }.encode()?;
        let _ = event_tx.try_push(event);
    }

    // pre-allocated buffers; the callback itself never allocates
    let mut tone = vec![0.0f32; MAX_BLOCK_SIZE];
    let mut mono = vec![0.0f32; MAX_BLOCK_SIZE];
    let mut phase = 0.0f32;
    let phase_step = TONE_HZ / sample_rate as f32;

    let stream = device.build_output_stream(
        &config.into(),
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            let frames = data.len() / channels;
            if frames > MAX_BLOCK_SIZE {
                data.fill(0.0);
                return;
            }

            for sample in tone[..frames].iter_mut() {
                *sample = (phase * std::f32::consts::TAU).sin() * TONE_LEVEL;
                phase = (phase + phase_step).fract();
            }

            unit.run(
                &[&tone[..frames]],
                &mut [&mut mono[..frames]],
                frames,
                std::iter::from_fn(|| event_rx.try_pop()),
            );
            for note in unit.notifications() {
                tracing::info!(?note, "configuration committed");
            }

            for (frame, sample) in mono[..frames].iter().enumerate() {
                for channel in 0..channels {
                    data[frame * channels + channel] = *sample;
                }
            }
        },
        |err| {
            tracing::error!(%err, "audio stream error");
        },
        None,
    )?;
    stream.play()?;

    println!("faltung demo host");
    println!("commands: load <ir-file>   quit");

    for line in io::stdin().lock().lines() {
        let line = line?;
        let line = line.trim();
        if line == "quit" || line == "q" {
            break;
        }
        if let Some(path) = line.strip_prefix("load ") {
            let event = ChangeRequest::SetImpulseResponse {
                path: path.trim().to_string(),
            }
            .encode()?;
            if event_tx.try_push(event).is_err() {
                eprintln!("control queue full, try again");
            }
        } else if !line.is_empty() {
            eprintln!("unknown command: {line}");
        }
    }

    // dropping the stream drops the unit, which hangs up the worker
    drop(stream);
    worker
        .join()
        .map_err(|_| anyhow!("worker thread panicked"))?;
    Ok(())
}
