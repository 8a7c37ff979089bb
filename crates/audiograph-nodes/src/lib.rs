//! Concrete node implementations built on top of `audiograph-core`'s
//! processing primitives: a gain stage, an equal-power panner, a scheduled
//! sample player, a WAV recorder, a peak/RMS meter, and a client-driven
//! stream source.
//!
//! Each node is a pair: a control-thread `AudioNode` (constructed by client
//! code, owns whatever state survives a graph restart) and a render-thread
//! `AudioNodeProcessor` built from it in `activate`. Parameters are exposed
//! as `audiograph_core::param::Param`, so `setValueAtTime`-style automation
//! works uniformly across nodes.

mod gain;
mod meter;
mod pan;
mod player;
mod recorder;
mod stream;
mod wav;

pub use gain::{GainNode, GainProcessor, ParamHandle};
pub use meter::{MeterReading, MeteringNode, MeteringProcessor};
pub use pan::{PannerNode, PannerProcessor};
pub use player::{AudioPlayer, AudioPlayerProcessor, PlaybackHandle};
pub use recorder::{AudioRecorderNode, AudioRecorderProcessor};
pub use stream::{StreamNode, StreamProcessor};
pub use wav::{WavSink, WavSource};
