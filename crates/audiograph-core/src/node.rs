//! The abstract processing unit: lifecycle, channel-count negotiation, and
//! the per-quantum `process` contract.

use crate::channel_config::{ChannelConfig, ChannelConfigError, ChannelCount};
use crate::lock::RenderLockGuard;
use crate::sample::Bus;
use crate::silence_mask::SilenceMask;
use bitflags::bitflags;

bitflags! {
    /// Status flags for the underlying audio stream, threaded into
    /// [`ProcInfo`] so a node can react to over/underrun without the
    /// render path ever raising an error.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StreamStatus: u32 {
        const INPUT_OVERFLOW = 1 << 0;
        const OUTPUT_UNDERFLOW = 1 << 1;
    }
}

/// Per-quantum context handed to [`AudioNodeProcessor::process`].
pub struct ProcInfo<'a> {
    pub frames: usize,
    pub sample_rate: u32,
    pub sample_rate_recip: f64,
    pub in_silence_mask: SilenceMask,
    pub out_silence_mask: SilenceMask,
    /// Absolute context clock at the start of this quantum, in seconds.
    pub clock_seconds: f64,
    /// Absolute context clock at the start of this quantum, in samples.
    pub clock_samples: i64,
    pub stream_status: StreamStatus,
    _render_lock: &'a RenderLockGuard<'a>,
}

impl<'a> ProcInfo<'a> {
    pub fn new(
        frames: usize,
        sample_rate: u32,
        in_silence_mask: SilenceMask,
        clock_seconds: f64,
        clock_samples: i64,
        stream_status: StreamStatus,
        render_lock: &'a RenderLockGuard<'a>,
    ) -> Self {
        Self {
            frames,
            sample_rate,
            sample_rate_recip: (sample_rate as f64).recip(),
            in_silence_mask,
            out_silence_mask: SilenceMask::NONE_SILENT,
            clock_seconds,
            clock_samples,
            stream_status,
            _render_lock: render_lock,
        }
    }
}

/// What a node's `process` call did to its outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    /// The node produced silence this quantum; all outputs should be
    /// treated (and zeroed, if not already) as silent.
    ClearAllOutputs,
    /// The node passed its inputs through unchanged; downstream consumers
    /// should treat output silence the same as input silence.
    Bypass,
    /// The node wrote new output data; `out_silence_mask` reports which
    /// output channels, if any, are known to still be silent.
    OutputsModified { out_silence_mask: SilenceMask },
}

impl ProcessStatus {
    pub fn outputs_modified(mask: SilenceMask) -> Self {
        Self::OutputsModified {
            out_silence_mask: mask,
        }
    }

    pub fn outputs_not_silent() -> Self {
        Self::OutputsModified {
            out_silence_mask: SilenceMask::NONE_SILENT,
        }
    }
}

/// Static information about a node's supported channel configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioNodeInfo {
    pub num_min_supported_inputs: ChannelCount,
    pub num_max_supported_inputs: ChannelCount,
    pub num_min_supported_outputs: ChannelCount,
    pub num_max_supported_outputs: ChannelCount,
    pub default_channel_config: ChannelConfig,
    pub equal_num_ins_and_outs: bool,
}

impl AudioNodeInfo {
    pub fn verify(&self, config: ChannelConfig) -> Result<(), ChannelConfigError> {
        config.verify(
            self.num_min_supported_inputs,
            self.num_max_supported_inputs,
            self.num_min_supported_outputs,
            self.num_max_supported_outputs,
            self.equal_num_ins_and_outs,
        )
    }
}

/// The control-thread half of a node: constructed by client code, holds
/// whatever configuration the node needs, and produces the realtime-thread
/// [`AudioNodeProcessor`] when the graph activates it.
pub trait AudioNode: Send {
    fn debug_name(&self) -> &'static str;

    fn info(&self) -> AudioNodeInfo;

    /// Construct the realtime-thread processor for this node. Called once,
    /// under the graph lock, when the node is added to a running graph (or
    /// when the graph (re)starts).
    fn activate(
        &mut self,
        sample_rate: u32,
        channel_config: ChannelConfig,
    ) -> Result<Box<dyn AudioNodeProcessor>, Box<dyn std::error::Error + Send + Sync>>;
}

/// The realtime-thread half of a node. Constructed by [`AudioNode::activate`]
/// and driven once per quantum by the graph's pull protocol.
pub trait AudioNodeProcessor: Send {
    /// Process one render quantum. `inputs`/`outputs` are the node's
    /// negotiated channel buses; `proc_info` carries clock and silence-hint
    /// context. Guaranteed to be called at most once per quantum by the
    /// pull protocol's `processIfNecessary` guard.
    fn process(&mut self, inputs: &[Bus], outputs: &mut [Bus], proc_info: &ProcInfo) -> ProcessStatus;

    /// How many seconds of non-silent output this node can still produce
    /// after its inputs have gone fully silent (e.g. a reverb's tail).
    /// Silence is not allowed to propagate through this node until this
    /// much time, plus [`AudioNodeProcessor::latency_seconds`], has
    /// elapsed since the last non-silent input.
    fn tail_time_seconds(&self) -> f64 {
        0.0
    }

    /// Algorithmic latency between an input arriving and it affecting the
    /// output (e.g. a lookahead limiter), in seconds.
    fn latency_seconds(&self) -> f64 {
        0.0
    }

    /// For a scheduled source awaiting its `play(after:)` time: the
    /// context-clock second it is due to start, if that time hasn't
    /// arrived yet. The deferred-connect logic uses this to decide whether
    /// wiring an edge into this node must wait (see the two-phase connect
    /// queue); nodes that are not scheduled sources, or whose source has
    /// already started, return `None`.
    fn pending_start_time_seconds(&self) -> Option<f64> {
        None
    }

    /// Take a pending "finished" callback (e.g. [`AudioPlayer`]'s `onEnded`),
    /// if one became ready during the last `process` call. Called once per
    /// quantum by the graph after processing this node; the returned
    /// closure runs later on the dispatcher thread, never on the render
    /// thread itself.
    ///
    /// [`AudioPlayer`]: https://docs.rs/audiograph-nodes/latest/audiograph_nodes/struct.AudioPlayer.html
    fn take_finished_callback(&mut self) -> Option<Box<dyn FnOnce() + Send>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_status_helpers() {
        let status = ProcessStatus::outputs_not_silent();
        assert!(matches!(status, ProcessStatus::OutputsModified { .. }));
    }
}
