//! An equal-power stereo panner: mono or stereo in, stereo out, one
//! parameter (`"pan"`, range `[-1.0, 1.0]`).

use std::sync::{Arc, Mutex};

use audiograph_core::channel_config::{ChannelConfig, ChannelCount};
use audiograph_core::dsp::pan_law::PanLaw;
use audiograph_core::node::{AudioNode, AudioNodeInfo, AudioNodeProcessor, ProcInfo, ProcessStatus};
use audiograph_core::param::Param;
use audiograph_core::sample::Bus;

use crate::gain::ParamHandle;

/// `PannerNode(sampleRate)`: equal-power pan law by default, matching the
/// testable property in the panner's spec (center at `cos(pi/4), sin(pi/4)`).
pub struct PannerNode {
    pan: ParamHandle,
    law: PanLaw,
}

impl PannerNode {
    pub fn new(_sample_rate: u32) -> Self {
        Self::with_pan_law(PanLaw::default())
    }

    pub fn with_pan_law(law: PanLaw) -> Self {
        Self {
            pan: ParamHandle::new(Param::new("pan", 0.0, -1.0, 1.0)),
            law,
        }
    }

    pub fn parameter(&self, name: &str) -> Option<ParamHandle> {
        (name == "pan").then(|| self.pan.clone())
    }
}

impl AudioNode for PannerNode {
    fn debug_name(&self) -> &'static str {
        "panner"
    }

    fn info(&self) -> AudioNodeInfo {
        AudioNodeInfo {
            num_min_supported_inputs: ChannelCount::MONO,
            num_max_supported_inputs: ChannelCount::STEREO,
            num_min_supported_outputs: ChannelCount::STEREO,
            num_max_supported_outputs: ChannelCount::STEREO,
            default_channel_config: ChannelConfig {
                num_inputs: ChannelCount::MONO,
                num_outputs: ChannelCount::STEREO,
            },
            equal_num_ins_and_outs: false,
        }
    }

    fn activate(
        &mut self,
        _sample_rate: u32,
        _channel_config: ChannelConfig,
    ) -> Result<Box<dyn AudioNodeProcessor>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(Box::new(PannerProcessor {
            pan: self.pan.inner(),
            law: self.law,
        }))
    }
}

pub struct PannerProcessor {
    pan: Arc<Mutex<Param>>,
    law: PanLaw,
}

impl AudioNodeProcessor for PannerProcessor {
    fn process(&mut self, inputs: &[Bus], outputs: &mut [Bus], _proc_info: &ProcInfo) -> ProcessStatus {
        let Some(input) = inputs.first() else {
            return ProcessStatus::ClearAllOutputs;
        };
        let Some(output) = outputs.first_mut() else {
            return ProcessStatus::ClearAllOutputs;
        };

        if input.is_silent() || output.num_channels() < 2 {
            output.zero();
            return ProcessStatus::ClearAllOutputs;
        }

        let pan = self.pan.lock().unwrap().value();
        let (gain_l, gain_r) = self.law.compute_gains(pan);

        let mono = input.num_channels() == 1;
        let frames = output.frames().min(input.frames());
        for frame in 0..frames {
            let (l_in, r_in) = if mono {
                let s = input.channel(0).data()[frame];
                (s, s)
            } else {
                (input.channel(0).data()[frame], input.channel(1).data()[frame])
            };
            output.channel_mut(0).data_mut()[frame] = l_in * gain_l;
            output.channel_mut(1).data_mut()[frame] = r_in * gain_r;
        }
        output.channel_mut(0).set_silent(false);
        output.channel_mut(1).set_silent(false);

        ProcessStatus::outputs_not_silent()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audiograph_core::lock::RenderLockGuard;
    use audiograph_core::node::StreamStatus;
    use audiograph_core::sample::BLOCK_FRAMES;
    use audiograph_core::silence_mask::SilenceMask;

    fn pull(law: PanLaw, pan: f32) -> (f32, f32) {
        let mut node = PannerNode::with_pan_law(law);
        node.parameter("pan").unwrap().set_value(pan);
        let mut processor = node
            .activate(44_100, ChannelConfig { num_inputs: ChannelCount::MONO, num_outputs: ChannelCount::STEREO })
            .unwrap();

        let mut input = Bus::new(ChannelCount::MONO, BLOCK_FRAMES, 44_100);
        input.channels_mut()[0].fill(1.0);
        let mut output = Bus::new(ChannelCount::STEREO, BLOCK_FRAMES, 44_100);

        let lock = RenderLockGuard::new();
        let info = ProcInfo::new(BLOCK_FRAMES, 44_100, SilenceMask::NONE_SILENT, 0.0, 0, StreamStatus::empty(), &lock);
        processor.process(&[input], std::slice::from_mut(&mut output), &info);

        (output.channel(0).data()[0], output.channel(1).data()[0])
    }

    #[test]
    fn center_pan_is_equal_power_half() {
        let (l, r) = pull(PanLaw::EqualPower3dB, 0.0);
        let expected = core::f32::consts::FRAC_1_SQRT_2;
        assert!((l - expected).abs() < 1e-3);
        assert!((r - expected).abs() < 1e-3);
    }

    #[test]
    fn hard_left_and_right() {
        let (l, r) = pull(PanLaw::EqualPower3dB, -1.0);
        assert!((l - 1.0).abs() < 1e-3);
        assert!(r.abs() < 1e-3);

        let (l, r) = pull(PanLaw::EqualPower3dB, 1.0);
        assert!(l.abs() < 1e-3);
        assert!((r - 1.0).abs() < 1e-3);
    }
}
