//! The narrow seam `AudioRecorderNode`/`AudioPlayer` use to reach a WAV
//! encoder/decoder without this crate depending on one directly (decode/encode
//! are collaborator concerns, out of scope for the core per the engine's
//! error-handling design). A minimal `hound`-free default is provided for
//! tests only.

/// Receives 32-bit float PCM frames from `AudioRecorderNode` as they are
/// captured, one render quantum at a time, interleaved.
pub trait WavSink: Send {
    fn write_interleaved(&mut self, samples: &[f32]) -> std::io::Result<()>;
    fn finalize(&mut self) -> std::io::Result<()>;
}

/// Supplies interleaved 32-bit float PCM frames to `AudioPlayer`, along with
/// the channel count and sample rate the samples were captured at.
pub trait WavSource: Send {
    fn channels(&self) -> u16;
    fn sample_rate(&self) -> u32;
    /// Total interleaved sample count (`frames * channels`).
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn samples(&self) -> &[f32];
}

/// An in-memory `WavSource`/`WavSink` pair used by tests so recorder/player
/// round-trips don't need a real file or decoder.
#[cfg(test)]
pub struct MemoryWav {
    pub channels: u16,
    pub sample_rate: u32,
    pub samples: Vec<f32>,
}

#[cfg(test)]
impl WavSource for MemoryWav {
    fn channels(&self) -> u16 {
        self.channels
    }
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
    fn len(&self) -> usize {
        self.samples.len()
    }
    fn samples(&self) -> &[f32] {
        &self.samples
    }
}

#[cfg(test)]
impl WavSink for MemoryWav {
    fn write_interleaved(&mut self, samples: &[f32]) -> std::io::Result<()> {
        self.samples.extend_from_slice(samples);
        Ok(())
    }
    fn finalize(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
