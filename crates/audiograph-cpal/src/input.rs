//! Opens a cpal input stream and pushes its captured samples into a ring
//! buffer. Grounded on the teacher's own input-stream builder
//! (`firewheel-cpal/src/input.rs`), trimmed down: this backend does not
//! resample capture audio to the output sample rate, and does not wire the
//! captured samples into the graph itself (see DESIGN.md) -- the ring
//! buffer exists only to let [`crate::DataCallback`] gate its warm-up
//! window on real capture availability rather than an arbitrary delay.

use std::sync::mpsc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use audiograph_core::error::StartStreamError;
use audiograph_core::ring_buffer::{ring_buffer, RingBufferConsumer};

use crate::{CpalStartError, CpalStreamError, BUILD_STREAM_TIMEOUT};

/// The configuration of an input audio stream opened alongside the output
/// stream, purely to gate the device adapter's warm-up window.
#[derive(Debug, Clone, PartialEq)]
pub struct CpalInputConfig {
    /// The input device name. `None` uses the system default input device.
    pub device_name: Option<String>,
    /// Whether to fall back to the default input device when the named one
    /// can't be found or opened.
    pub fallback: bool,
    /// Ring buffer capacity in seconds of audio at the input device's
    /// sample rate.
    pub capacity_seconds: f64,
}

impl Default for CpalInputConfig {
    fn default() -> Self {
        Self { device_name: None, fallback: true, capacity_seconds: 2.0 }
    }
}

pub(crate) fn start_capture(
    host: &cpal::Host,
    config: &CpalInputConfig,
    _output_sample_rate: cpal::SampleRate,
    err_tx: mpsc::Sender<CpalStreamError>,
) -> Result<(cpal::Stream, RingBufferConsumer, usize), StartStreamError<CpalStartError>> {
    let in_device = resolve_input_device(host, config.device_name.as_deref(), config.fallback)?;
    let in_device_name = in_device.name().unwrap_or_else(|e| {
        log::warn!("failed to read audio input device name: {e}");
        String::from("unknown device")
    });

    let default_config = in_device
        .default_input_config()
        .map_err(|e| StartStreamError::Backend(CpalStartError::DefaultConfig(e.to_string())))?;

    let num_in_channels = default_config.channels() as usize;
    let stream_config = cpal::StreamConfig {
        channels: default_config.channels(),
        sample_rate: default_config.sample_rate(),
        buffer_size: cpal::BufferSize::Default,
    };

    let capacity = (config.capacity_seconds * stream_config.sample_rate.0 as f64 * num_in_channels as f64) as usize;
    let (mut prod, cons) = ring_buffer(capacity.max(num_in_channels));

    log::info!("starting cpal input stream on \"{in_device_name}\" with {stream_config:?}");

    let err_tx_in = err_tx;
    let stream = in_device
        .build_input_stream(
            &stream_config,
            move |input: &[f32], _info: &cpal::InputCallbackInfo| {
                let pushed = prod.push_slice_lossy(input);
                if pushed < input.len() {
                    log::warn!("capture ring buffer overflowed; discarding {} samples", input.len() - pushed);
                }
            },
            move |err| {
                let _ = err_tx_in.send(CpalStreamError(err.to_string()));
            },
            Some(BUILD_STREAM_TIMEOUT),
        )
        .map_err(|e| StartStreamError::Backend(CpalStartError::BuildStream(e.to_string())))?;

    stream.play().map_err(|e| StartStreamError::Backend(CpalStartError::PlayStream(e.to_string())))?;

    Ok((stream, cons, num_in_channels))
}

fn resolve_input_device(
    host: &cpal::Host,
    name: Option<&str>,
    fallback: bool,
) -> Result<cpal::Device, StartStreamError<CpalStartError>> {
    if let Some(name) = name {
        match host.input_devices() {
            Ok(mut devices) => {
                if let Some(d) = devices.find(|d| d.name().map(|n| n == name).unwrap_or(false)) {
                    return Ok(d);
                }
                if !fallback {
                    return Err(StartStreamError::Backend(CpalStartError::DeviceNotFound(name.to_string())));
                }
                log::warn!("input device \"{name}\" not found, falling back to default");
            }
            Err(e) => {
                if !fallback {
                    return Err(StartStreamError::Backend(CpalStartError::Enumeration(e.to_string())));
                }
                log::warn!("failed to enumerate input devices: {e}, falling back to default");
            }
        }
    }

    host.default_input_device().ok_or(StartStreamError::NoDefaultDevice)
}
