//! A [`DeviceBackend`] implementation backed by the `cpal` crate: opens the
//! platform's default (or a named) output device and bridges its host
//! callback to [`Context::render_quantum`]. Optionally also opens an input
//! stream purely to gate the warm-up window described below; wiring
//! captured audio into the graph itself is left to client code (see
//! DESIGN.md).
//!
//! The host callback's buffer size rarely lines up with the engine's fixed
//! 128-frame render quantum, so [`DataCallback`] carries the tail of the
//! last rendered quantum across calls and only renders a fresh one once
//! that tail is exhausted.

mod input;

use std::sync::mpsc;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use audiograph_core::error::{StartStreamError, StreamError};
use audiograph_core::ring_buffer::RingBufferConsumer;
use audiograph_core::sample::{Bus, BLOCK_FRAMES};
use audiograph_graph::backend::{DeviceBackend, DeviceInfo};
use audiograph_graph::context::Context;

pub use input::CpalInputConfig;

const BUILD_STREAM_TIMEOUT: Duration = Duration::from_secs(5);
/// Quanta of capture audio to accumulate before the render path starts
/// consuming it, matching the device adapter's warm-up rule.
const WARM_UP_QUANTA: usize = 4;

/// Configuration for [`CpalBackend::start_stream`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CpalConfig {
    /// The host to use. `None` uses the system default.
    pub host: Option<cpal::HostId>,
    /// The output device name. `None` uses the system default output
    /// device.
    pub output_device_name: Option<String>,
    /// If `Some`, also open an input stream used to gate the output
    /// stream's warm-up window (see the device adapter algorithm in
    /// DESIGN.md). The captured samples themselves are discarded.
    pub input: Option<CpalInputConfig>,
    /// Whether to fall back to the default output device when the named
    /// one can't be found or opened.
    pub fallback: bool,
}

/// A cpal-backed [`DeviceBackend`]. One instance owns the platform output
/// stream (and, if requested, the input stream) for the lifetime of a
/// [`Context`].
pub struct CpalBackend {
    _out_stream: cpal::Stream,
    _in_stream: Option<cpal::Stream>,
    from_err_rx: mpsc::Receiver<CpalStreamError>,
}

impl DeviceBackend for CpalBackend {
    type Config = CpalConfig;
    type StartStreamError = CpalStartError;
    type StreamError = CpalStreamError;

    fn available_input_devices() -> Vec<DeviceInfo> {
        enumerate(|h| h.input_devices(), |d| d.default_input_config().is_ok(), |h| h.default_input_device())
    }

    fn available_output_devices() -> Vec<DeviceInfo> {
        enumerate(|h| h.output_devices(), |d| d.default_output_config().is_ok(), |h| h.default_output_device())
    }

    fn start_stream(
        config: Self::Config,
        context: std::sync::Arc<Context>,
    ) -> Result<(Self, u32), StartStreamError<Self::StartStreamError>> {
        log::info!("attempting to start cpal audio stream");

        let host = resolve_host(config.host);

        let out_device = resolve_output_device(&host, config.output_device_name.as_deref(), config.fallback)?;
        let out_device_name = device_name(&out_device);

        let target_sample_rate = context.sample_rate();
        let out_stream_config = negotiate_output_config(&out_device, target_sample_rate, config.fallback)?;
        let num_out_channels = out_stream_config.channels as usize;

        let (err_tx, from_err_rx) = mpsc::channel();

        let (in_stream, capture_cons, num_in_channels) = if let Some(input_cfg) = &config.input {
            let (stream, cons, channels) =
                input::start_capture(&host, input_cfg, out_stream_config.sample_rate, err_tx.clone())?;
            (Some(stream), Some(cons), channels)
        } else {
            (None, None, 0)
        };

        let warm_up_frames = if num_in_channels > 0 {
            WARM_UP_QUANTA * BLOCK_FRAMES * num_in_channels
        } else {
            0
        };

        let mut data_callback = DataCallback {
            context: context.clone(),
            num_out_channels,
            pending: Vec::with_capacity(num_out_channels * BLOCK_FRAMES),
            capture_cons,
            warm_up_frames,
            warmed_up: warm_up_frames == 0,
            predicted_next_callback: None,
            last_underrun_warning: None,
        };

        log::info!("starting cpal output stream on \"{out_device_name}\" with {out_stream_config:?}");

        let err_tx_out = err_tx;
        let out_stream = out_device
            .build_output_stream(
                &out_stream_config,
                move |output: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                    data_callback.fill(output);
                },
                move |err| {
                    let _ = err_tx_out.send(CpalStreamError(err.to_string()));
                },
                Some(BUILD_STREAM_TIMEOUT),
            )
            .map_err(|e| StartStreamError::Backend(CpalStartError::BuildStream(e.to_string())))?;

        out_stream.play().map_err(|e| StartStreamError::Backend(CpalStartError::PlayStream(e.to_string())))?;

        Ok((
            Self {
                _out_stream: out_stream,
                _in_stream: in_stream,
                from_err_rx,
            },
            out_stream_config.sample_rate.0,
        ))
    }

    fn poll_status(&mut self) -> Result<(), StreamError<Self::StreamError>> {
        match self.from_err_rx.try_recv() {
            Ok(e) => Err(StreamError::Backend(e)),
            Err(mpsc::TryRecvError::Empty) => Ok(()),
            Err(mpsc::TryRecvError::Disconnected) => Err(StreamError::StreamStopped),
        }
    }
}

fn enumerate(
    list: impl Fn(&cpal::Host) -> Result<cpal::Devices, cpal::DevicesError>,
    has_config: impl Fn(&cpal::Device) -> bool,
    default: impl Fn(&cpal::Host) -> Option<cpal::Device>,
) -> Vec<DeviceInfo> {
    let host = cpal::default_host();
    let default_name = default(&host).and_then(|d| d.name().ok());

    match list(&host) {
        Ok(devices) => devices
            .filter_map(|d| {
                let name = d.name().ok()?;
                if !has_config(&d) {
                    return None;
                }
                let is_default = default_name.as_deref() == Some(name.as_str());
                let num_channels = d
                    .default_output_config()
                    .map(|c| c.channels())
                    .or_else(|_| d.default_input_config().map(|c| c.channels()))
                    .unwrap_or(0);
                Some(DeviceInfo { name, num_channels, is_default })
            })
            .collect(),
        Err(e) => {
            log::warn!("failed to enumerate cpal devices: {e}");
            Vec::new()
        }
    }
}

fn resolve_host(requested: Option<cpal::HostId>) -> cpal::Host {
    match requested {
        Some(id) => cpal::host_from_id(id).unwrap_or_else(|e| {
            log::warn!("requested audio host {id:?} is unavailable: {e}. falling back to the default host");
            cpal::default_host()
        }),
        None => cpal::default_host(),
    }
}

fn resolve_output_device(
    host: &cpal::Host,
    name: Option<&str>,
    fallback: bool,
) -> Result<cpal::Device, StartStreamError<CpalStartError>> {
    if let Some(name) = name {
        match host.output_devices() {
            Ok(mut devices) => {
                if let Some(d) = devices.find(|d| d.name().map(|n| n == name).unwrap_or(false)) {
                    return Ok(d);
                }
                if !fallback {
                    return Err(StartStreamError::Backend(CpalStartError::DeviceNotFound(name.to_string())));
                }
                log::warn!("output device \"{name}\" not found, falling back to default");
            }
            Err(e) => {
                if !fallback {
                    return Err(StartStreamError::Backend(CpalStartError::Enumeration(e.to_string())));
                }
                log::warn!("failed to enumerate output devices: {e}, falling back to default");
            }
        }
    }

    host.default_output_device().ok_or(StartStreamError::NoDefaultDevice)
}

fn negotiate_output_config(
    device: &cpal::Device,
    target_sample_rate: u32,
    fallback: bool,
) -> Result<cpal::StreamConfig, StartStreamError<CpalStartError>> {
    let default_config = device
        .default_output_config()
        .map_err(|e| StartStreamError::Backend(CpalStartError::DefaultConfig(e.to_string())))?;

    let supports_target = device
        .supported_output_configs()
        .map_err(|e| StartStreamError::Backend(CpalStartError::Enumeration(e.to_string())))?
        .any(|c| c.try_with_sample_rate(cpal::SampleRate(target_sample_rate)).is_some());

    let sample_rate = if supports_target {
        target_sample_rate
    } else if fallback {
        log::warn!(
            "output device does not support {target_sample_rate} Hz; opening at its default rate \
             ({} Hz) instead -- audio will run at the wrong pitch since this backend does not resample",
            default_config.sample_rate().0
        );
        default_config.sample_rate().0
    } else {
        return Err(StartStreamError::UnsupportedConfig);
    };

    Ok(cpal::StreamConfig {
        channels: default_config.channels(),
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    })
}

fn device_name(device: &cpal::Device) -> String {
    device.name().unwrap_or_else(|e| {
        log::warn!("failed to read audio device name: {e}");
        String::from("unknown device")
    })
}

/// Bridges the host's variable-size output callback to
/// [`Context::render_quantum`]'s fixed 128-frame blocks, per the device
/// adapter algorithm: carry the tail of the last rendered quantum across
/// calls, and gate the very first render on the capture warm-up window.
struct DataCallback {
    context: std::sync::Arc<Context>,
    num_out_channels: usize,
    /// Interleaved samples from the last-rendered quantum not yet copied
    /// into a host buffer.
    pending: Vec<f32>,
    /// Capture ring buffer consumer, retained only to gate the warm-up
    /// window below -- nothing drains its samples into the graph. Wiring
    /// captured audio into a node's input is left to client code; see
    /// DESIGN.md.
    capture_cons: Option<RingBufferConsumer>,
    warm_up_frames: usize,
    warmed_up: bool,
    predicted_next_callback: Option<Instant>,
    last_underrun_warning: Option<Instant>,
}

/// Underrun warnings are real-time-unsafe (they allocate/format), so they're
/// rate-limited to at most one per this interval.
const UNDERRUN_WARNING_INTERVAL: Duration = Duration::from_secs(2);

impl DataCallback {
    fn fill(&mut self, output: &mut [f32]) {
        let now = Instant::now();
        if let Some(predicted) = self.predicted_next_callback {
            if now > predicted {
                let should_warn = self
                    .last_underrun_warning
                    .map(|last| now.duration_since(last) >= UNDERRUN_WARNING_INTERVAL)
                    .unwrap_or(true);
                if should_warn {
                    log::warn!("cpal output callback ran late; an underrun likely occurred");
                    self.last_underrun_warning = Some(now);
                }
            }
        }

        let total_frames = output.len() / self.num_out_channels;
        self.predicted_next_callback = Some(
            now + Duration::from_secs_f64(total_frames as f64 / self.context.sample_rate() as f64 * 1.2),
        );

        if !self.warmed_up {
            let available = self.capture_cons.as_ref().map(|c| c.available_for_reading()).unwrap_or(0);
            if available >= self.warm_up_frames {
                self.warmed_up = true;
            } else {
                output.fill(0.0);
                return;
            }
        }

        let mut produced = 0;
        while produced < total_frames {
            if self.pending.is_empty() {
                let bus = self.context.render_quantum(BLOCK_FRAMES);
                interleave_into(&bus, self.num_out_channels, &mut self.pending);
            }

            let available_frames = self.pending.len() / self.num_out_channels;
            let take = available_frames.min(total_frames - produced);
            let src_len = take * self.num_out_channels;
            let dst_start = produced * self.num_out_channels;
            output[dst_start..dst_start + src_len].copy_from_slice(&self.pending[..src_len]);
            self.pending.drain(..src_len);
            produced += take;
        }
    }
}

/// Interleaves `bus` into `out`, resizing it to `frames * device_channels`.
/// Channel counts are reconciled per the spec's device adapter rule: mono
/// duplicates to every device channel, and a bus with more channels than
/// the device simply has its extras dropped (silence is never invented for
/// a channel the bus actually has data for).
fn interleave_into(bus: &Bus, device_channels: usize, out: &mut Vec<f32>) {
    let frames = bus.frames();
    out.clear();
    out.resize(frames * device_channels, 0.0);

    let bus_channels = bus.num_channels();
    for frame in 0..frames {
        for ch in 0..device_channels {
            let sample = if bus_channels == 1 {
                bus.channel(0).data()[frame]
            } else if ch < bus_channels {
                bus.channel(ch).data()[frame]
            } else {
                0.0
            };
            out[frame * device_channels + ch] = sample;
        }
    }
}

/// An error that can occur while starting a cpal stream.
#[derive(Debug, thiserror::Error)]
pub enum CpalStartError {
    #[error("audio device not found: {0}")]
    DeviceNotFound(String),
    #[error("failed to enumerate audio devices: {0}")]
    Enumeration(String),
    #[error("failed to get the device's default stream config: {0}")]
    DefaultConfig(String),
    #[error("failed to build the audio stream: {0}")]
    BuildStream(String),
    #[error("failed to start the audio stream: {0}")]
    PlayStream(String),
}

/// A steady-state cpal stream error surfaced through `poll_status`.
#[derive(Debug, Clone, thiserror::Error)]
#[error("cpal stream error: {0}")]
pub struct CpalStreamError(String);

#[cfg(test)]
mod tests {
    use super::*;
    use audiograph_core::channel_config::ChannelCount as CC;

    #[test]
    fn interleave_mono_bus_duplicates_to_stereo_device() {
        let mut bus = Bus::new(CC::MONO, 4, 44_100);
        bus.channel_mut(0).data_mut().copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);

        let mut out = Vec::new();
        interleave_into(&bus, 2, &mut out);

        assert_eq!(out, vec![1.0, 1.0, 2.0, 2.0, 3.0, 3.0, 4.0, 4.0]);
    }

    #[test]
    fn interleave_stereo_bus_to_stereo_device_passes_through() {
        let mut bus = Bus::new(CC::STEREO, 2, 44_100);
        bus.channel_mut(0).data_mut().copy_from_slice(&[1.0, 2.0]);
        bus.channel_mut(1).data_mut().copy_from_slice(&[10.0, 20.0]);

        let mut out = Vec::new();
        interleave_into(&bus, 2, &mut out);

        assert_eq!(out, vec![1.0, 10.0, 2.0, 20.0]);
    }
}
