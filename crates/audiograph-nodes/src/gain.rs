//! A single-parameter gain stage: applies `gain` to its input with the
//! bus-level de-zippering algorithm (see `audiograph_core::sample::Bus`).

use std::sync::{Arc, Mutex};

use audiograph_core::channel_config::{ChannelConfig, ChannelCount};
use audiograph_core::node::{AudioNode, AudioNodeInfo, AudioNodeProcessor, ProcInfo, ProcessStatus};
use audiograph_core::param::Param;
use audiograph_core::sample::{Bus, BLOCK_FRAMES};

/// A handle to a node's named parameter, shared between the control thread
/// (automation calls) and the render thread (`process`).
#[derive(Clone)]
pub struct ParamHandle(Arc<Mutex<Param>>);

impl ParamHandle {
    pub(crate) fn new(param: Param) -> Self {
        Self(Arc::new(Mutex::new(param)))
    }

    /// The shared `Param` itself, for handing to a processor at `activate`.
    pub(crate) fn inner(&self) -> Arc<Mutex<Param>> {
        self.0.clone()
    }

    pub fn set_value(&self, value: f32) {
        self.0.lock().unwrap().set_value(value);
    }

    pub fn set_value_at_time(&self, value: f32, time: f64) {
        self.0.lock().unwrap().set_value_at_time(value, time);
    }

    pub fn linear_ramp_to_value_at_time(&self, value: f32, time: f64) {
        self.0.lock().unwrap().linear_ramp_to_value_at_time(value, time);
    }

    pub fn exponential_ramp_to_value_at_time(&self, value: f32, time: f64) {
        self.0.lock().unwrap().exponential_ramp_to_value_at_time(value, time);
    }

    pub fn cancel_scheduled_values(&self, start_time: f64) {
        self.0.lock().unwrap().cancel_scheduled_values(start_time);
    }

    pub fn value(&self) -> f32 {
        self.0.lock().unwrap().value()
    }
}

/// `GainNode(defaultGain)`: one parameter, `"gain"`, defaulting to
/// `default_gain`. Mono-through-32-channel pass-through topology
/// (`equal_num_ins_and_outs`), so it adapts to whatever its input negotiates.
pub struct GainNode {
    gain: ParamHandle,
}

impl GainNode {
    pub fn new(default_gain: f32) -> Self {
        Self {
            gain: ParamHandle::new(Param::new("gain", default_gain, f32::NEG_INFINITY, f32::INFINITY)),
        }
    }

    pub fn parameter(&self, name: &str) -> Option<ParamHandle> {
        (name == "gain").then(|| self.gain.clone())
    }
}

impl AudioNode for GainNode {
    fn debug_name(&self) -> &'static str {
        "gain"
    }

    fn info(&self) -> AudioNodeInfo {
        AudioNodeInfo {
            num_min_supported_inputs: ChannelCount::MONO,
            num_max_supported_inputs: ChannelCount::MAX,
            num_min_supported_outputs: ChannelCount::MONO,
            num_max_supported_outputs: ChannelCount::MAX,
            default_channel_config: ChannelConfig {
                num_inputs: ChannelCount::STEREO,
                num_outputs: ChannelCount::STEREO,
            },
            equal_num_ins_and_outs: true,
        }
    }

    fn activate(
        &mut self,
        sample_rate: u32,
        _channel_config: ChannelConfig,
    ) -> Result<Box<dyn AudioNodeProcessor>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(Box::new(GainProcessor {
            gain: self.gain.inner(),
            sample_rate,
            gain_values: vec![0.0; BLOCK_FRAMES],
        }))
    }
}

pub struct GainProcessor {
    gain: Arc<Mutex<Param>>,
    sample_rate: u32,
    gain_values: Vec<f32>,
}

impl AudioNodeProcessor for GainProcessor {
    fn process(&mut self, inputs: &[Bus], outputs: &mut [Bus], proc_info: &ProcInfo) -> ProcessStatus {
        let Some(input) = inputs.first() else {
            return ProcessStatus::ClearAllOutputs;
        };
        let Some(output) = outputs.first_mut() else {
            return ProcessStatus::ClearAllOutputs;
        };

        if input.is_silent() {
            output.zero();
            return ProcessStatus::ClearAllOutputs;
        }

        let mut param = self.gain.lock().unwrap();
        if param.has_sample_accurate_values() {
            let values = &mut self.gain_values[..proc_info.frames];
            let start = proc_info.clock_seconds;
            let end = start + proc_info.frames as f64 * proc_info.sample_rate_recip;
            param.calculate_sample_accurate_values(start, end, self.sample_rate as f64, values);
            output.copy_with_sample_accurate_gain_values(input, values);
        } else {
            let gain = param.value();
            output.copy_with_gain(input, 1.0, gain);
        }

        ProcessStatus::outputs_not_silent()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audiograph_core::channel_config::ChannelCount;
    use audiograph_core::lock::RenderLockGuard;
    use audiograph_core::node::StreamStatus;
    use audiograph_core::silence_mask::SilenceMask;

    fn proc_info(lock: &RenderLockGuard, sample_rate: u32) -> ProcInfo<'_> {
        ProcInfo::new(BLOCK_FRAMES, sample_rate, SilenceMask::NONE_SILENT, 0.0, 0, StreamStatus::empty(), lock)
    }

    #[test]
    fn constant_gain_halves_amplitude() {
        let mut node = GainNode::new(0.5);
        let mut processor = node.activate(44_100, ChannelConfig { num_inputs: ChannelCount::MONO, num_outputs: ChannelCount::MONO }).unwrap();

        let mut input = Bus::new(ChannelCount::MONO, BLOCK_FRAMES, 44_100);
        input.channels_mut()[0].fill(0.5);
        let mut output = Bus::new(ChannelCount::MONO, BLOCK_FRAMES, 44_100);

        let lock = RenderLockGuard::new();
        let info = proc_info(&lock, 44_100);
        for _ in 0..20 {
            processor.process(&[input.clone()], std::slice::from_mut(&mut output), &info);
        }

        let last = *output.channel(0).data().last().unwrap();
        assert!((last - 0.25).abs() < 1e-5, "{last}");
    }

    #[test]
    fn silent_input_clears_output() {
        let mut node = GainNode::new(1.0);
        let mut processor = node.activate(44_100, ChannelConfig { num_inputs: ChannelCount::MONO, num_outputs: ChannelCount::MONO }).unwrap();

        let input = Bus::new(ChannelCount::MONO, BLOCK_FRAMES, 44_100);
        let mut output = Bus::new(ChannelCount::MONO, BLOCK_FRAMES, 44_100);
        output.channels_mut()[0].fill(1.0);

        let lock = RenderLockGuard::new();
        let info = proc_info(&lock, 44_100);
        let status = processor.process(&[input], std::slice::from_mut(&mut output), &info);
        assert_eq!(status, ProcessStatus::ClearAllOutputs);
    }
}
