//! A peak/RMS meter: an automatic-pull sink (no graph output) that exposes
//! its last quantum's readings to the control thread through a lock-free
//! cell, so a UI can poll it without touching the render lock.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use audiograph_core::atomic_float::AtomicF64;
use audiograph_core::channel_config::{ChannelConfig, ChannelCount};
use audiograph_core::node::{AudioNode, AudioNodeInfo, AudioNodeProcessor, ProcInfo, ProcessStatus};
use audiograph_core::sample::Bus;

/// The last render quantum's peak and RMS amplitude, averaged across
/// channels. Read with [`MeteringNode::reading`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeterReading {
    pub peak: f32,
    pub rms: f32,
}

struct MeterCell {
    peak: AtomicF64,
    rms: AtomicF64,
}

/// `MeteringNode(outputChannels)`: meant to be registered as an automatic
/// pull node (it has no outputs, so nothing downstream would otherwise keep
/// it running every quantum).
pub struct MeteringNode {
    num_channels: ChannelCount,
    cell: Arc<MeterCell>,
}

impl MeteringNode {
    pub fn new(output_channels: u32) -> Self {
        Self {
            num_channels: ChannelCount::new(output_channels.max(1)).unwrap_or(ChannelCount::STEREO),
            cell: Arc::new(MeterCell { peak: AtomicF64::new(0.0), rms: AtomicF64::new(0.0) }),
        }
    }

    pub fn reading(&self) -> MeterReading {
        MeterReading {
            peak: self.cell.peak.load(Ordering::Relaxed) as f32,
            rms: self.cell.rms.load(Ordering::Relaxed) as f32,
        }
    }
}

impl AudioNode for MeteringNode {
    fn debug_name(&self) -> &'static str {
        "metering"
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
        Ok(Box::new(MeteringProcessor { cell: self.cell.clone() }))
    }
}

pub struct MeteringProcessor {
    cell: Arc<MeterCell>,
}

impl AudioNodeProcessor for MeteringProcessor {
    fn process(&mut self, inputs: &[Bus], _outputs: &mut [Bus], _proc_info: &ProcInfo) -> ProcessStatus {
        let Some(input) = inputs.first() else {
            return ProcessStatus::ClearAllOutputs;
        };

        let mut peak = 0.0f32;
        let mut sum_sq = 0.0f64;
        let mut count = 0usize;
        for channel in input.channels() {
            for &s in channel.data() {
                peak = peak.max(s.abs());
                sum_sq += (s as f64) * (s as f64);
                count += 1;
            }
        }
        let rms = if count > 0 { (sum_sq / count as f64).sqrt() as f32 } else { 0.0 };

        self.cell.peak.store(peak as f64, Ordering::Relaxed);
        self.cell.rms.store(rms as f64, Ordering::Relaxed);

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

    #[test]
    fn reports_peak_and_rms_of_constant_signal() {
        let mut node = MeteringNode::new(1);
        let mut processor = node
            .activate(44_100, ChannelConfig { num_inputs: ChannelCount::MONO, num_outputs: ChannelCount::ZERO })
            .unwrap();

        let mut input = Bus::new(ChannelCount::MONO, BLOCK_FRAMES, 44_100);
        input.channels_mut()[0].fill(0.5);

        let lock = RenderLockGuard::new();
        let info = ProcInfo::new(BLOCK_FRAMES, 44_100, SilenceMask::NONE_SILENT, 0.0, 0, StreamStatus::empty(), &lock);
        processor.process(&[input], &mut [], &info);

        let reading = node.reading();
        assert!((reading.peak - 0.5).abs() < 1e-6);
        assert!((reading.rms - 0.5).abs() < 1e-6);
    }
}
