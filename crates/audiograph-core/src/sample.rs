//! The fixed-size sample buffer, [`Channel`], and multi-channel [`Bus`] that
//! every node pulls and writes through.

use crate::channel_config::{ChannelCount, ChannelInterpretation};
use crate::dsp::algo::{vadd, vmul};

/// The fixed number of frames processed per render quantum.
///
/// This is a compile-time constant, not a config field: every bus, summing
/// junction, and scratch buffer in the graph is sized against it.
pub const BLOCK_FRAMES: usize = 128;

/// Default sample rate used when a context is constructed without an
/// explicit rate.
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Denormal numbers below this magnitude are snapped to `0.0` after a gain
/// ramp, matching the flush-to-zero behavior real-time DSP code relies on to
/// avoid the CPU cost of denormal arithmetic.
const DENORMAL_FLOOR: f32 = 1.0e-15;

/// A single contiguous channel of audio samples.
///
/// Writing into the channel (via [`Channel::data_mut`]) is expected to clear
/// the silent flag; [`Channel::zero`] sets it. Copying from a silent channel
/// must zero the destination rather than memcpy, so that silence keeps
/// propagating downstream without ever re-deriving it from sample content.
#[derive(Debug, Clone)]
pub struct Channel {
    data: Box<[f32]>,
    silent: bool,
}

impl Channel {
    pub fn new(frames: usize) -> Self {
        Self {
            data: vec![0.0; frames].into_boxed_slice(),
            silent: true,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn is_silent(&self) -> bool {
        self.silent
    }

    #[inline]
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Mutable access to the raw samples. The caller is responsible for
    /// calling [`Channel::set_silent`]`(false)` if it writes non-zero data;
    /// most callers should prefer [`Channel::copy_from`] or
    /// [`Channel::fill`] which maintain the flag automatically.
    #[inline]
    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    #[inline]
    pub fn set_silent(&mut self, silent: bool) {
        self.silent = silent;
    }

    pub fn zero(&mut self) {
        self.data.fill(0.0);
        self.silent = true;
    }

    pub fn fill(&mut self, value: f32) {
        self.data.fill(value);
        self.silent = value == 0.0;
    }

    /// Copy `frames` samples from `source`. If `source` is silent, this
    /// zeroes `self` instead of copying (a silent source's buffer content is
    /// unspecified garbage from a prior quantum, so memcpy-ing it would be
    /// wrong even though the values happen to be finite floats).
    pub fn copy_from(&mut self, source: &Channel, frames: usize) {
        if source.is_silent() {
            self.zero();
            return;
        }
        let frames = frames.min(self.data.len()).min(source.data.len());
        self.data[..frames].copy_from_slice(&source.data[..frames]);
        self.silent = false;
    }

    pub fn sum_from(&mut self, source: &Channel, frames: usize) {
        if source.is_silent() {
            return;
        }
        let frames = frames.min(self.data.len()).min(source.data.len());
        vadd(&mut self.data[..frames], &source.data[..frames]);
        self.silent = false;
    }
}

impl AsMut<[f32]> for Channel {
    fn as_mut(&mut self) -> &mut [f32] {
        self.data_mut()
    }
}

/// An ordered collection of channels sharing a sample rate and frame count.
///
/// Channel count is immutable after construction (resizing a bus means
/// building a new one; see [`Bus::resized`]). `is_silent()` holds iff every
/// channel is silent. Gain de-zipper state (`last_mix_gain`, `is_first_time`)
/// is owned here and is read/written only while the render lock is held.
#[derive(Debug, Clone)]
pub struct Bus {
    channels: Vec<Channel>,
    sample_rate: u32,
    frames: usize,
    last_mix_gain: f32,
    is_first_time: bool,
}

impl Bus {
    pub fn new(num_channels: ChannelCount, frames: usize, sample_rate: u32) -> Self {
        let n: usize = num_channels.into();
        Self {
            channels: (0..n.max(1)).map(|_| Channel::new(frames)).collect(),
            sample_rate,
            frames,
            last_mix_gain: 1.0,
            is_first_time: true,
        }
    }

    pub fn silent(num_channels: ChannelCount, frames: usize, sample_rate: u32) -> Self {
        Self::new(num_channels, frames, sample_rate)
    }

    #[inline]
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    #[inline]
    pub fn frames(&self) -> usize {
        self.frames
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[inline]
    pub fn channel(&self, index: usize) -> &Channel {
        &self.channels[index]
    }

    #[inline]
    pub fn channel_mut(&mut self, index: usize) -> &mut Channel {
        &mut self.channels[index]
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn channels_mut(&mut self) -> &mut [Channel] {
        &mut self.channels
    }

    pub fn is_silent(&self) -> bool {
        self.channels.iter().all(Channel::is_silent)
    }

    pub fn zero(&mut self) {
        for ch in &mut self.channels {
            ch.zero();
        }
    }

    /// Returns a new bus with a different channel count but the same
    /// sample rate and frame length; used when channel-count negotiation
    /// changes an output's desired channel count at a quantum boundary.
    pub fn resized(&self, num_channels: ChannelCount) -> Self {
        Self::new(num_channels, self.frames, self.sample_rate)
    }

    /// Reallocate in place only if `self`'s shape doesn't already match --
    /// a no-op in the steady state, where a node's persistent render
    /// storage keeps the same channel count and frame length every
    /// quantum. Used instead of [`Bus::resized`] on the hot render path so
    /// a stable topology never allocates after the first quantum.
    pub fn ensure_shape(&mut self, num_channels: ChannelCount, frames: usize, sample_rate: u32) {
        if self.num_channels() != usize::from(num_channels) || self.frames != frames {
            *self = Self::new(num_channels, frames, sample_rate);
        } else {
            self.sample_rate = sample_rate;
        }
    }

    /// Plain copy, honoring `source`'s silence (see [`Channel::copy_from`]),
    /// remapped through the parent node's channel interpretation when
    /// channel counts differ.
    pub fn copy_from(&mut self, source: &Bus, interpretation: ChannelInterpretation) {
        mix_into(self, source, interpretation, MixOp::Copy);
    }

    /// Sum `source` into `self`, remapped through `interpretation` when
    /// channel counts differ. Used by summing junctions with more than one
    /// connected output.
    pub fn sum_from(&mut self, source: &Bus, interpretation: ChannelInterpretation) {
        mix_into(self, source, interpretation, MixOp::Sum);
    }

    /// Apply a gain to `source` into `self` with per-block de-zippering, per
    /// the bus-gain algorithm: a flat multiply when the gain step is small,
    /// else a per-sample ramp toward the target at a fixed rate.
    pub fn copy_with_gain(&mut self, source: &Bus, bus_gain: f32, target_gain: f32) {
        let topology_matches = self.num_channels() == source.num_channels();
        if !topology_matches || source.is_silent() {
            self.zero();
            return;
        }

        let total_desired_gain = bus_gain * target_gain;
        let mut gain = if self.is_first_time {
            total_desired_gain
        } else {
            self.last_mix_gain
        };

        let frames = self.frames.min(source.frames);

        if (total_desired_gain - gain).abs() < 0.001 {
            for (dst_ch, src_ch) in self.channels.iter_mut().zip(source.channels.iter()) {
                for i in 0..frames {
                    dst_ch.data_mut()[i] = src_ch.data()[i] * total_desired_gain;
                }
                dst_ch.set_silent(false);
            }
            gain = total_desired_gain;
        } else {
            let mut ramp = vec![0.0f32; frames];
            let mut g = gain;
            for slot in ramp.iter_mut() {
                g += (total_desired_gain - g) * 0.005;
                *slot = g;
            }
            for (dst_ch, src_ch) in self.channels.iter_mut().zip(source.channels.iter()) {
                for i in 0..frames {
                    let mut v = src_ch.data()[i] * ramp[i];
                    if v.abs() < DENORMAL_FLOOR {
                        v = 0.0;
                    }
                    dst_ch.data_mut()[i] = v;
                }
                dst_ch.set_silent(false);
            }
            gain = g;
        }

        self.last_mix_gain = gain;
        self.is_first_time = false;
    }

    /// Multiply `source` by a caller-supplied per-sample gain buffer
    /// (sample-accurate param automation). When `source` is mono and
    /// `self` carries more channels, channel 0 is broadcast to all of them.
    pub fn copy_with_sample_accurate_gain_values(&mut self, source: &Bus, gains: &[f32]) {
        if source.is_silent() {
            self.zero();
            return;
        }
        let frames = self.frames.min(source.frames).min(gains.len());
        let broadcast_mono = source.num_channels() == 1 && self.num_channels() > 1;

        for (ch_idx, dst_ch) in self.channels.iter_mut().enumerate() {
            let src_idx = if broadcast_mono { 0 } else { ch_idx };
            if src_idx >= source.num_channels() {
                dst_ch.zero();
                continue;
            }
            let src_ch = &source.channels[src_idx];
            vmul(&mut dst_ch.data_mut()[..frames], &src_ch.data()[..frames], &gains[..frames]);
            dst_ch.set_silent(false);
        }
    }

    pub fn reset_dezipper(&mut self) {
        self.is_first_time = true;
    }
}

enum MixOp {
    Copy,
    Sum,
}

/// Mix-down/up rules shared by [`Bus::copy_from`] and [`Bus::sum_from`].
///
/// `speakers`: mono<->stereo duplicates/averages; otherwise discrete.
/// `discrete`: pairwise by channel index; unmatched destination channels are
/// left untouched by a sum, or zeroed by a copy.
fn mix_into(dst: &mut Bus, src: &Bus, interpretation: ChannelInterpretation, op: MixOp) {
    let frames = dst.frames.min(src.frames);
    let (dst_n, src_n) = (dst.num_channels(), src.num_channels());

    if src.is_silent() {
        if matches!(op, MixOp::Copy) {
            dst.zero();
        }
        return;
    }

    let speakers = matches!(interpretation, ChannelInterpretation::Speakers);

    if speakers && src_n == 1 && dst_n == 2 {
        // mono -> stereo: duplicate to L/R.
        for ch in 0..2 {
            match op {
                MixOp::Copy => dst.channels[ch].copy_from(&src.channels[0], frames),
                MixOp::Sum => dst.channels[ch].sum_from(&src.channels[0], frames),
            }
        }
        return;
    }

    if speakers && src_n == 2 && dst_n == 1 {
        // stereo -> mono: average (L+R)/2.
        let l = src.channels[0].data();
        let r = src.channels[1].data();
        match op {
            MixOp::Copy => dst.channels[0].zero(),
            MixOp::Sum => {}
        }
        let out = dst.channels[0].data_mut();
        for i in 0..frames {
            out[i] += 0.5 * (l[i] + r[i]);
        }
        dst.channels[0].set_silent(false);
        return;
    }

    // discrete: pairwise by index.
    let n = dst_n.min(src_n);
    for ch in 0..n {
        match op {
            MixOp::Copy => dst.channels[ch].copy_from(&src.channels[ch], frames),
            MixOp::Sum => dst.channels[ch].sum_from(&src.channels[ch], frames),
        }
    }
    if matches!(op, MixOp::Copy) {
        for ch in n..dst_n {
            dst.channels[ch].zero();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_from_silent_zeroes_destination() {
        let src = Bus::new(ChannelCount::STEREO, BLOCK_FRAMES, DEFAULT_SAMPLE_RATE);
        let mut dst = Bus::new(ChannelCount::STEREO, BLOCK_FRAMES, DEFAULT_SAMPLE_RATE);
        for ch in dst.channels_mut() {
            ch.fill(1.0);
        }
        dst.copy_from(&src, ChannelInterpretation::Speakers);
        assert!(dst.is_silent());
        assert!(dst.channels()[0].data().iter().all(|&s| s == 0.0));
    }

    #[test]
    fn mono_to_stereo_duplicates() {
        let mut src = Bus::new(ChannelCount::MONO, BLOCK_FRAMES, DEFAULT_SAMPLE_RATE);
        src.channels_mut()[0].fill(0.5);
        let mut dst = Bus::new(ChannelCount::STEREO, BLOCK_FRAMES, DEFAULT_SAMPLE_RATE);
        dst.copy_from(&src, ChannelInterpretation::Speakers);
        assert_eq!(dst.channel(0).data()[0], 0.5);
        assert_eq!(dst.channel(1).data()[0], 0.5);
    }

    #[test]
    fn stereo_to_mono_averages() {
        let mut src = Bus::new(ChannelCount::STEREO, BLOCK_FRAMES, DEFAULT_SAMPLE_RATE);
        src.channels_mut()[0].fill(1.0);
        src.channels_mut()[1].fill(-1.0);
        let mut dst = Bus::new(ChannelCount::MONO, BLOCK_FRAMES, DEFAULT_SAMPLE_RATE);
        dst.copy_from(&src, ChannelInterpretation::Speakers);
        assert!(dst.channel(0).data().iter().all(|&s| s.abs() < 1e-7));
    }

    #[test]
    fn gain_dezip_converges_to_target() {
        let mut src = Bus::new(ChannelCount::MONO, BLOCK_FRAMES, DEFAULT_SAMPLE_RATE);
        src.channels_mut()[0].fill(0.5);
        let mut dst = Bus::new(ChannelCount::MONO, BLOCK_FRAMES, DEFAULT_SAMPLE_RATE);

        for _ in 0..20 {
            dst.copy_with_gain(&src, 1.0, 0.5);
        }

        let last = *dst.channel(0).data().last().unwrap();
        assert!((last - 0.25).abs() < 1e-6, "{last}");
    }

    #[test]
    fn gain_dezip_is_monotonic_on_step_from_zero() {
        let mut src = Bus::new(ChannelCount::MONO, BLOCK_FRAMES, DEFAULT_SAMPLE_RATE);
        src.channels_mut()[0].fill(1.0);
        let mut dst = Bus::new(ChannelCount::MONO, BLOCK_FRAMES, DEFAULT_SAMPLE_RATE);
        dst.reset_dezipper();
        dst.last_mix_gain = 0.0;
        dst.is_first_time = false;

        dst.copy_with_gain(&src, 1.0, 1.0);

        let data = dst.channel(0).data();
        for pair in data.windows(2) {
            assert!(pair[1] >= pair[0] - 1e-6);
        }
    }
}
