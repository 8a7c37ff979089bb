//! Writes its input to a [`WavSink`] every quantum. Meant to be registered
//! as an automatic pull node alongside the device destination.

use audiograph_core::channel_config::{ChannelConfig, ChannelCount};
use audiograph_core::node::{AudioNode, AudioNodeInfo, AudioNodeProcessor, ProcInfo, ProcessStatus};
use audiograph_core::sample::Bus;

use crate::wav::WavSink;

/// `AudioRecorderNode(outputChannels)`: interleaves its input and forwards
/// it to a `WavSink` one quantum at a time.
pub struct AudioRecorderNode {
    num_channels: ChannelCount,
    sink: Box<dyn WavSink>,
}

impl AudioRecorderNode {
    pub fn new(output_channels: u32, sink: Box<dyn WavSink>) -> Self {
        Self {
            num_channels: ChannelCount::new(output_channels.max(1)).unwrap_or(ChannelCount::MONO),
            sink,
        }
    }
}

impl AudioNode for AudioRecorderNode {
    fn debug_name(&self) -> &'static str {
        "audio_recorder"
    }

    fn info(&self) -> AudioNodeInfo {
        AudioNodeInfo {
            num_min_supported_inputs: ChannelCount::MONO,
            num_max_supported_inputs: ChannelCount::MAX,
            num_min_supported_outputs: ChannelCount::ZERO,
            num_max_supported_outputs: ChannelCount::ZERO,
            default_channel_config: ChannelConfig {
                num_inputs: self.num_channels,
                num_outputs: ChannelCount::ZERO,
            },
            equal_num_ins_and_outs: false,
        }
    }

    fn activate(
        &mut self,
        _sample_rate: u32,
        _channel_config: ChannelConfig,
    ) -> Result<Box<dyn AudioNodeProcessor>, Box<dyn std::error::Error + Send + Sync>> {
        // The sink is only ever touched from the render thread once
        // activated -- there is exactly one `AudioRecorderProcessor` and the
        // node itself is dropped once the graph owns it.
        let sink = std::mem::replace(&mut self.sink, Box::new(NullSink));
        Ok(Box::new(AudioRecorderProcessor { sink, interleave_scratch: Vec::new() }))
    }
}

struct NullSink;
impl WavSink for NullSink {
    fn write_interleaved(&mut self, _samples: &[f32]) -> std::io::Result<()> {
        Ok(())
    }
    fn finalize(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

pub struct AudioRecorderProcessor {
    sink: Box<dyn WavSink>,
    interleave_scratch: Vec<f32>,
}

impl AudioNodeProcessor for AudioRecorderProcessor {
    fn process(&mut self, inputs: &[Bus], _outputs: &mut [Bus], _proc_info: &ProcInfo) -> ProcessStatus {
        let Some(input) = inputs.first() else {
            return ProcessStatus::ClearAllOutputs;
        };

        let frames = input.frames();
        let channels = input.num_channels();
        self.interleave_scratch.clear();
        self.interleave_scratch.resize(frames * channels, 0.0);
        for frame in 0..frames {
            for ch in 0..channels {
                self.interleave_scratch[frame * channels + ch] = input.channel(ch).data()[frame];
            }
        }

        if let Err(err) = self.sink.write_interleaved(&self.interleave_scratch) {
            log::warn!("recorder sink write failed: {err}");
        }

        ProcessStatus::ClearAllOutputs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audiograph_core::lock::RenderLockGuard;
    use audiograph_core::node::StreamStatus;
    use audiograph_core::sample::BLOCK_FRAMES;
    use audiograph_core::silence_mask::SilenceMask;

    use crate::wav::MemoryWav;

    #[test]
    fn records_interleaved_samples() {
        let sink = MemoryWav { channels: 1, sample_rate: 44_100, samples: Vec::new() };
        let mut node = AudioRecorderNode::new(1, Box::new(sink));
        let mut processor = node
            .activate(44_100, ChannelConfig { num_inputs: ChannelCount::MONO, num_outputs: ChannelCount::ZERO })
            .unwrap();

        let mut input = Bus::new(ChannelCount::MONO, BLOCK_FRAMES, 44_100);
        input.channels_mut()[0].fill(0.25);

        let lock = RenderLockGuard::new();
        let info = ProcInfo::new(BLOCK_FRAMES, 44_100, SilenceMask::NONE_SILENT, 0.0, 0, StreamStatus::empty(), &lock);
        processor.process(&[input], &mut [], &info);

        assert_eq!(processor.interleave_scratch.len(), BLOCK_FRAMES);
        assert!(processor.interleave_scratch.iter().all(|&s| s == 0.25));
    }
}
