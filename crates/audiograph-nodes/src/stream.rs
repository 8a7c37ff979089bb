//! A source node driven entirely by a client-supplied callback, for feeding
//! synthesized or externally-decoded audio into the graph without a
//! dedicated node type per use case.

use std::sync::{Arc, Mutex};

use audiograph_core::channel_config::{ChannelConfig, ChannelCount};
use audiograph_core::node::{AudioNode, AudioNodeInfo, AudioNodeProcessor, ProcInfo, ProcessStatus};
use audiograph_core::sample::Bus;

/// Called once per quantum on the render thread; must fill every channel in
/// `output` and never block or allocate.
pub type StreamCallback = dyn FnMut(&mut Bus, &ProcInfo) + Send;

/// `StreamNode(channels)`: a source whose output is entirely produced by a
/// client callback, set with [`StreamNode::set`].
pub struct StreamNode {
    num_channels: ChannelCount,
    callback: Arc<Mutex<Option<Box<StreamCallback>>>>,
}

impl StreamNode {
    pub fn new(channels: u32) -> Self {
        Self {
            num_channels: ChannelCount::new(channels.max(1)).unwrap_or(ChannelCount::STEREO),
            callback: Arc::new(Mutex::new(None)),
        }
    }

    /// Install (or replace) the callback that produces this node's output.
    /// Safe to call after the graph is running; the processor picks up the
    /// new callback on its next quantum.
    pub fn set(&self, callback: impl FnMut(&mut Bus, &ProcInfo) + Send + 'static) {
        *self.callback.lock().unwrap() = Some(Box::new(callback));
    }
}

impl AudioNode for StreamNode {
    fn debug_name(&self) -> &'static str {
        "stream"
    }

    fn info(&self) -> AudioNodeInfo {
        AudioNodeInfo {
            num_min_supported_inputs: ChannelCount::ZERO,
            num_max_supported_inputs: ChannelCount::ZERO,
            num_min_supported_outputs: self.num_channels,
            num_max_supported_outputs: self.num_channels,
            default_channel_config: ChannelConfig {
                num_inputs: ChannelCount::ZERO,
                num_outputs: self.num_channels,
            },
            equal_num_ins_and_outs: false,
        }
    }

    fn activate(
        &mut self,
        _sample_rate: u32,
        _channel_config: ChannelConfig,
    ) -> Result<Box<dyn AudioNodeProcessor>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(Box::new(StreamProcessor { callback: self.callback.clone() }))
    }
}

pub struct StreamProcessor {
    callback: Arc<Mutex<Option<Box<StreamCallback>>>>,
}

impl AudioNodeProcessor for StreamProcessor {
    fn process(&mut self, _inputs: &[Bus], outputs: &mut [Bus], proc_info: &ProcInfo) -> ProcessStatus {
        let Some(output) = outputs.first_mut() else {
            return ProcessStatus::ClearAllOutputs;
        };

        let mut guard = self.callback.lock().unwrap();
        match guard.as_mut() {
            Some(callback) => {
                output.zero();
                callback(output, proc_info);
                ProcessStatus::outputs_not_silent()
            }
            None => ProcessStatus::ClearAllOutputs,
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

    #[test]
    fn callback_fills_output() {
        let mut node = StreamNode::new(1);
        node.set(|bus, _info| {
            for ch in bus.channels_mut() {
                ch.fill(0.75);
            }
        });

        let mut processor = node
            .activate(44_100, ChannelConfig { num_inputs: ChannelCount::ZERO, num_outputs: ChannelCount::MONO })
            .unwrap();

        let lock = RenderLockGuard::new();
        let info = ProcInfo::new(BLOCK_FRAMES, 44_100, SilenceMask::NONE_SILENT, 0.0, 0, StreamStatus::empty(), &lock);
        let mut output = Bus::new(ChannelCount::MONO, BLOCK_FRAMES, 44_100);
        processor.process(&[], std::slice::from_mut(&mut output), &info);

        assert_eq!(output.channel(0).data()[0], 0.75);
    }

    #[test]
    fn no_callback_is_silent() {
        let mut node = StreamNode::new(1);
        let mut processor = node
            .activate(44_100, ChannelConfig { num_inputs: ChannelCount::ZERO, num_outputs: ChannelCount::MONO })
            .unwrap();

        let lock = RenderLockGuard::new();
        let info = ProcInfo::new(BLOCK_FRAMES, 44_100, SilenceMask::NONE_SILENT, 0.0, 0, StreamStatus::empty(), &lock);
        let mut output = Bus::new(ChannelCount::MONO, BLOCK_FRAMES, 44_100);
        let status = processor.process(&[], std::slice::from_mut(&mut output), &info);
        assert_eq!(status, ProcessStatus::ClearAllOutputs);
    }
}
