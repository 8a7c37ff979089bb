pub mod atomic_float;
pub mod channel_config;
pub mod dsp;
pub mod error;
pub mod lock;
pub mod node;
pub mod param;
pub mod ring_buffer;
pub mod sample;

mod silence_mask;

pub use silence_mask::SilenceMask;

extern crate self as audiograph_core;

/// Engine-wide tunables fixed at context construction, as opposed to the
/// per-node, per-param state that changes while the graph is running.
///
/// [`sample::BLOCK_FRAMES`] is deliberately not a field here: the render
/// quantum size is a compile-time constant, not something a running graph
/// can be reconfigured to use.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraphConfig {
    pub sample_rate: u32,
    /// Size of the device-callback <-> render-thread ring buffers, expressed
    /// in seconds of audio at `sample_rate`.
    pub ring_buffer_capacity_seconds: f64,
    /// Length of the equal-power crossfade applied during the two-phase
    /// disconnect (`connect` -> `disconnect` -> `finishDisconnect`).
    pub disconnect_crossfade_seconds: f64,
    /// How many render quanta the update thread sleeps for between
    /// wake-ups when the pending-connection queue is empty.
    pub update_thread_wake_quanta: u32,
    /// Bound on the control-to-render dispatcher queue; a full queue means
    /// the control thread is outpacing the render thread's drain rate.
    pub dispatcher_queue_capacity: usize,
    /// Render quanta of silence pushed through the device adapter before
    /// the first real quantum, so the host's callback never starves while
    /// the ring buffer fills.
    pub warm_up_quanta: u32,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            sample_rate: sample::DEFAULT_SAMPLE_RATE,
            ring_buffer_capacity_seconds: 2.0,
            disconnect_crossfade_seconds: 0.1,
            update_thread_wake_quanta: 16,
            dispatcher_queue_capacity: 256,
            warm_up_quanta: 4,
        }
    }
}
