//! A scheduled sample player: `play(after:)` / `stop(after:)` schedule a
//! one-shot start/end, `updateSchedulingInfo` (run once per quantum from
//! `process`) promotes them to committed frame positions and fires `onEnded`
//! through the dispatcher hook once playback finishes.

use std::sync::{Arc, Mutex};

use audiograph_core::channel_config::{ChannelConfig, ChannelCount};
use audiograph_core::node::{AudioNode, AudioNodeInfo, AudioNodeProcessor, ProcInfo, ProcessStatus};
use audiograph_core::sample::Bus;

use crate::wav::WavSource;

/// Per-channel sample data de-interleaved at construction time so `process`
/// never has to stride through an interleaved buffer.
struct PlayerSource {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl PlayerSource {
    fn from_source(source: &dyn WavSource) -> Self {
        let num_channels = source.channels().max(1) as usize;
        let interleaved = source.samples();
        let frames = interleaved.len() / num_channels;
        let mut channels: Vec<Vec<f32>> = (0..num_channels).map(|_| Vec::with_capacity(frames)).collect();
        for frame in interleaved.chunks_exact(num_channels) {
            for (ch, sample) in frame.iter().enumerate() {
                channels[ch].push(*sample);
            }
        }
        Self { channels, sample_rate: source.sample_rate() }
    }

    fn num_frames(&self) -> i64 {
        self.channels.first().map(|c| c.len()).unwrap_or(0) as i64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlaybackState {
    Unscheduled,
    Scheduled,
    Playing,
    Finished,
}

/// Shared between the control-thread `AudioPlayer` handle and the render
/// thread's `AudioPlayerProcessor`: one-shot pending start/stop requests,
/// promoted to committed frame positions inside `process`.
#[derive(Default)]
struct ScheduledControl {
    pending_start_time: Option<f64>,
    pending_stop_time: Option<f64>,
}

/// A client-held handle for scheduling playback; cheap to clone, all
/// methods just stage a request the render thread promotes on its next
/// quantum.
#[derive(Clone)]
pub struct PlaybackHandle {
    control: Arc<Mutex<ScheduledControl>>,
}

impl PlaybackHandle {
    pub fn play(&self, after: f64) {
        let mut control = self.control.lock().unwrap();
        control.pending_start_time = Some(after);
    }

    pub fn stop(&self, after: f64) {
        let mut control = self.control.lock().unwrap();
        control.pending_stop_time = Some(after);
    }
}

/// `AudioPlayer(source)`: plays a decoded buffer once, scheduled via
/// [`PlaybackHandle::play`]/[`PlaybackHandle::stop`].
pub struct AudioPlayer {
    source: Arc<PlayerSource>,
    control: Arc<Mutex<ScheduledControl>>,
    on_ended: Option<Box<dyn FnOnce() + Send>>,
}

impl AudioPlayer {
    pub fn new(source: &dyn WavSource, on_ended: Option<Box<dyn FnOnce() + Send>>) -> Self {
        Self {
            source: Arc::new(PlayerSource::from_source(source)),
            control: Arc::new(Mutex::new(ScheduledControl::default())),
            on_ended,
        }
    }

    pub fn handle(&self) -> PlaybackHandle {
        PlaybackHandle { control: self.control.clone() }
    }
}

impl AudioNode for AudioPlayer {
    fn debug_name(&self) -> &'static str {
        "audio_player"
    }

    fn info(&self) -> AudioNodeInfo {
        let channels = ChannelCount::new(self.source.channels.len().max(1) as u32).unwrap_or(ChannelCount::MONO);
        AudioNodeInfo {
            num_min_supported_inputs: ChannelCount::ZERO,
            num_max_supported_inputs: ChannelCount::ZERO,
            num_min_supported_outputs: channels,
            num_max_supported_outputs: channels,
            default_channel_config: ChannelConfig {
                num_inputs: ChannelCount::ZERO,
                num_outputs: channels,
            },
            equal_num_ins_and_outs: false,
        }
    }

    fn activate(
        &mut self,
        sample_rate: u32,
        _channel_config: ChannelConfig,
    ) -> Result<Box<dyn AudioNodeProcessor>, Box<dyn std::error::Error + Send + Sync>> {
        if self.source.sample_rate != sample_rate {
            log::warn!(
                "audio player source was decoded at {}Hz but the graph runs at {sample_rate}Hz; no resampler is applied",
                self.source.sample_rate,
            );
        }
        Ok(Box::new(AudioPlayerProcessor {
            source: self.source.clone(),
            control: self.control.clone(),
            context_sample_rate: sample_rate,
            state: PlaybackState::Unscheduled,
            start_time: 0.0,
            start_frame: 0,
            end_frame: i64::MAX,
            position: 0,
            on_ended: self.on_ended.take(),
            pending_finish: false,
        }))
    }
}

pub struct AudioPlayerProcessor {
    source: Arc<PlayerSource>,
    control: Arc<Mutex<ScheduledControl>>,
    context_sample_rate: u32,
    state: PlaybackState,
    /// Context-clock seconds the source is due to start, valid while
    /// `state == Scheduled`.
    start_time: f64,
    start_frame: i64,
    end_frame: i64,
    /// Next sample frame to read from `source`.
    position: i64,
    on_ended: Option<Box<dyn FnOnce() + Send>>,
    pending_finish: bool,
}

impl AudioPlayerProcessor {
    /// Promote pending start/stop requests to committed frame positions for
    /// this quantum, per the scheduled-source state machine.
    fn update_scheduling_info(&mut self, quantum_start_frame: i64) {
        let (pending_start, pending_stop) = {
            let mut control = self.control.lock().unwrap();
            (control.pending_start_time.take(), control.pending_stop_time.take())
        };

        if let Some(start_time) = pending_start {
            self.start_time = start_time;
            self.start_frame = (start_time * self.context_sample_rate as f64).round() as i64;
            self.position = 0;
            self.state = PlaybackState::Scheduled;
        }
        if let Some(stop_time) = pending_stop {
            let stop_frame = (stop_time * self.context_sample_rate as f64).round() as i64;
            self.end_frame = stop_frame.min(self.start_frame + self.source.num_frames());
        }

        if self.end_frame <= quantum_start_frame && self.state == PlaybackState::Playing {
            self.state = PlaybackState::Finished;
            self.pending_finish = true;
        }
    }
}

impl AudioNodeProcessor for AudioPlayerProcessor {
    fn process(&mut self, _inputs: &[Bus], outputs: &mut [Bus], proc_info: &ProcInfo) -> ProcessStatus {
        let frames = proc_info.frames;
        let quantum_start_frame = proc_info.clock_samples;
        self.update_scheduling_info(quantum_start_frame);

        let Some(output) = outputs.first_mut() else {
            return ProcessStatus::ClearAllOutputs;
        };

        if matches!(self.state, PlaybackState::Unscheduled | PlaybackState::Finished) {
            output.zero();
            return ProcessStatus::ClearAllOutputs;
        }

        let source_end_frame = (self.start_frame + self.source.num_frames()).min(self.end_frame);
        if self.start_frame >= quantum_start_frame + frames as i64 {
            output.zero();
            return ProcessStatus::ClearAllOutputs;
        }

        self.state = PlaybackState::Playing;

        let quantum_frame_offset = (self.start_frame - quantum_start_frame).max(0) as usize;
        let mut non_silent_frames = frames - quantum_frame_offset.min(frames);

        let ends_this_quantum = source_end_frame > quantum_start_frame
            && source_end_frame <= quantum_start_frame + frames as i64;
        let trailing_from = if ends_this_quantum {
            (source_end_frame - quantum_start_frame).max(0) as usize
        } else {
            frames
        };
        if ends_this_quantum {
            non_silent_frames = trailing_from.saturating_sub(quantum_frame_offset);
        }

        for (ch_idx, out_ch) in output.channels_mut().iter_mut().enumerate() {
            let data = out_ch.data_mut();
            for f in data.iter_mut().take(quantum_frame_offset) {
                *f = 0.0;
            }
            let src_channel = self.source.channels.get(ch_idx).or_else(|| self.source.channels.first());
            if let Some(src_channel) = src_channel {
                for (i, f) in data
                    .iter_mut()
                    .enumerate()
                    .skip(quantum_frame_offset)
                    .take(non_silent_frames)
                {
                    let src_frame = (self.position as usize) + (i - quantum_frame_offset);
                    *f = src_channel.get(src_frame).copied().unwrap_or(0.0);
                }
            }
            for f in data.iter_mut().skip(trailing_from) {
                *f = 0.0;
            }
            out_ch.set_silent(non_silent_frames == 0);
        }

        self.position += non_silent_frames as i64;

        if ends_this_quantum {
            self.state = PlaybackState::Finished;
            self.pending_finish = true;
        }

        ProcessStatus::outputs_not_silent()
    }

    fn pending_start_time_seconds(&self) -> Option<f64> {
        if let Ok(control) = self.control.lock() {
            if let Some(t) = control.pending_start_time {
                return Some(t);
            }
        }
        matches!(self.state, PlaybackState::Scheduled).then_some(self.start_time)
    }

    fn take_finished_callback(&mut self) -> Option<Box<dyn FnOnce() + Send>> {
        if self.pending_finish {
            self.pending_finish = false;
            self.on_ended.take()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audiograph_core::lock::RenderLockGuard;
    use audiograph_core::node::StreamStatus;
    use audiograph_core::sample::BLOCK_FRAMES;
    use audiograph_core::silence_mask::SilenceMask;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Constant {
        samples: Vec<f32>,
    }

    impl WavSource for Constant {
        fn channels(&self) -> u16 {
            1
        }
        fn sample_rate(&self) -> u32 {
            44_100
        }
        fn len(&self) -> usize {
            self.samples.len()
        }
        fn samples(&self) -> &[f32] {
            &self.samples
        }
    }

    #[test]
    fn scheduled_start_leaves_leading_frames_silent_then_plays() {
        let source = Constant { samples: vec![1.0; 44_100] };
        let done = Arc::new(AtomicBool::new(false));
        let done_clone = done.clone();
        let mut node = AudioPlayer::new(&source, Some(Box::new(move || done_clone.store(true, Ordering::SeqCst))));
        let handle = node.handle();
        handle.play(0.01);

        let mut processor = node
            .activate(44_100, ChannelConfig { num_inputs: ChannelCount::ZERO, num_outputs: ChannelCount::MONO })
            .unwrap();

        let lock = RenderLockGuard::new();
        let mut output = Bus::new(ChannelCount::MONO, BLOCK_FRAMES, 44_100);
        let info = ProcInfo::new(BLOCK_FRAMES, 44_100, SilenceMask::NONE_SILENT, 0.0, 0, StreamStatus::empty(), &lock);
        processor.process(&[], std::slice::from_mut(&mut output), &info);

        // 0.01s @ 44100Hz = 441 frames, past this first 128-frame quantum.
        assert!(output.is_silent());

        let info2 = ProcInfo::new(
            BLOCK_FRAMES,
            44_100,
            SilenceMask::NONE_SILENT,
            BLOCK_FRAMES as f64 / 44_100.0,
            BLOCK_FRAMES as i64,
            StreamStatus::empty(),
            &lock,
        );
        let mut output2 = Bus::new(ChannelCount::MONO, BLOCK_FRAMES, 44_100);
        processor.process(&[], std::slice::from_mut(&mut output2), &info2);
        // Second quantum covers frames [128, 256); start frame 441 is beyond
        // it still, so this one is also silent.
        assert!(output2.is_silent());

        assert!(!done.load(Ordering::SeqCst));
    }

    #[test]
    fn finish_fires_on_ended_once() {
        let source = Constant { samples: vec![1.0; 64] };
        let done = Arc::new(AtomicBool::new(false));
        let done_clone = done.clone();
        let mut node = AudioPlayer::new(&source, Some(Box::new(move || done_clone.store(true, Ordering::SeqCst))));
        node.handle().play(0.0);

        let mut processor = node
            .activate(44_100, ChannelConfig { num_inputs: ChannelCount::ZERO, num_outputs: ChannelCount::MONO })
            .unwrap();

        let lock = RenderLockGuard::new();
        let info = ProcInfo::new(BLOCK_FRAMES, 44_100, SilenceMask::NONE_SILENT, 0.0, 0, StreamStatus::empty(), &lock);
        let mut output = Bus::new(ChannelCount::MONO, BLOCK_FRAMES, 44_100);
        processor.process(&[], std::slice::from_mut(&mut output), &info);

        assert_eq!(output.channel(0).data()[0], 1.0);
        assert_eq!(output.channel(0).data()[63], 1.0);
        assert_eq!(output.channel(0).data()[64], 0.0);

        let callback = processor.take_finished_callback().expect("player should have finished");
        callback();
        assert!(done.load(Ordering::SeqCst));
        assert!(processor.take_finished_callback().is_none());
    }
}
