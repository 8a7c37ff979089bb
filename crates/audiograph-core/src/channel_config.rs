use core::fmt;

/// The maximum number of channels a bus or node port may carry.
pub const MAX_CHANNELS: u32 = 32;

/// A supported number of channels on an audio node or bus.
///
/// This number cannot be greater than [`MAX_CHANNELS`].
#[repr(transparent)]
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelCount(u32);

impl ChannelCount {
    pub const ZERO: Self = Self(0);
    pub const MONO: Self = Self(1);
    pub const STEREO: Self = Self(2);
    pub const MAX: Self = Self(MAX_CHANNELS);

    /// Create a new [`ChannelCount`].
    ///
    /// Returns `None` if `count` is greater than [`MAX_CHANNELS`].
    #[inline]
    pub const fn new(count: u32) -> Option<Self> {
        if count <= MAX_CHANNELS {
            Some(Self(count))
        } else {
            None
        }
    }

    #[inline]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

impl From<usize> for ChannelCount {
    fn from(value: usize) -> Self {
        Self::new(value as u32).expect("channel count exceeds MAX_CHANNELS")
    }
}

impl From<ChannelCount> for u32 {
    #[inline]
    fn from(value: ChannelCount) -> Self {
        value.get()
    }
}

impl From<ChannelCount> for usize {
    #[inline]
    fn from(value: ChannelCount) -> Self {
        value.get() as usize
    }
}

/// How a node decides the number of channels to use, renegotiated whenever
/// an input's fan-in changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelCountMode {
    /// Use the largest channel count among connected outputs.
    #[default]
    Max,
    /// `min(largest connected output channel count, node.channel_count)`.
    ClampedMax,
    /// Always use `node.channel_count`, regardless of what is connected.
    Explicit,
}

/// How channels are combined when summing or mixing between different
/// channel counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelInterpretation {
    /// Mono\<->stereo up/down-mixing rules apply (see [`crate::dsp::mix`]).
    #[default]
    Speakers,
    /// Channels are combined strictly pairwise by index; unmatched channels
    /// are zeroed rather than mixed.
    Discrete,
}

/// The negotiated number of input/output channels on a node.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    pub num_inputs: ChannelCount,
    pub num_outputs: ChannelCount,
}

impl ChannelConfig {
    pub fn new(num_inputs: impl Into<ChannelCount>, num_outputs: impl Into<ChannelCount>) -> Self {
        Self {
            num_inputs: num_inputs.into(),
            num_outputs: num_outputs.into(),
        }
    }

    pub fn verify(
        &self,
        min_num_inputs: ChannelCount,
        max_num_inputs: ChannelCount,
        min_num_outputs: ChannelCount,
        max_num_outputs: ChannelCount,
        equal_num_ins_outs: bool,
    ) -> Result<(), ChannelConfigError> {
        if self.num_inputs.get() < min_num_inputs.get()
            || self.num_inputs.get() > max_num_inputs.get()
        {
            Err(ChannelConfigError::InvalidNumInputs {
                min: min_num_inputs,
                max: max_num_inputs,
                got: self.num_inputs,
            })
        } else if self.num_outputs.get() < min_num_outputs.get()
            || self.num_outputs.get() > max_num_outputs.get()
        {
            Err(ChannelConfigError::InvalidNumOutputs {
                min: min_num_outputs,
                max: max_num_outputs,
                got: self.num_outputs,
            })
        } else if equal_num_ins_outs && self.num_inputs.get() != self.num_outputs.get() {
            Err(ChannelConfigError::NumInOutNotEqual {
                got_in: self.num_inputs,
                got_out: self.num_outputs,
            })
        } else {
            Ok(())
        }
    }
}

impl From<(usize, usize)> for ChannelConfig {
    fn from(value: (usize, usize)) -> Self {
        Self::new(value.0, value.1)
    }
}

/// An invalid channel configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ChannelConfigError {
    #[error("invalid number of input channels | got: {got}, min: {min}, max: {max}", got = got.get(), min = min.get(), max = max.get())]
    InvalidNumInputs {
        min: ChannelCount,
        max: ChannelCount,
        got: ChannelCount,
    },
    #[error("invalid number of output channels | got: {got}, min: {min}, max: {max}", got = got.get(), min = min.get(), max = max.get())]
    InvalidNumOutputs {
        min: ChannelCount,
        max: ChannelCount,
        got: ChannelCount,
    },
    #[error("number of input channels does not equal number of output channels | in: {got_in}, out: {got_out}", got_in = got_in.get(), got_out = got_out.get())]
    NumInOutNotEqual {
        got_in: ChannelCount,
        got_out: ChannelCount,
    },
    #[error("requested {requested} channels, which exceeds the maximum of {max}")]
    TooManyChannels { requested: u32, max: u32 },
}

impl fmt::Display for ChannelCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_over_max() {
        assert!(ChannelCount::new(MAX_CHANNELS + 1).is_none());
        assert!(ChannelCount::new(MAX_CHANNELS).is_some());
    }

    #[test]
    fn verify_catches_mismatched_in_out() {
        let cfg = ChannelConfig::new(1usize, 2usize);
        let err = cfg
            .verify(
                ChannelCount::MONO,
                ChannelCount::MAX,
                ChannelCount::MONO,
                ChannelCount::MAX,
                true,
            )
            .unwrap_err();
        assert!(matches!(err, ChannelConfigError::NumInOutNotEqual { .. }));
    }
}
