//! Error types for every fallible boundary the graph exposes to client code.
//!
//! The render path itself never raises (failures there degrade to silence,
//! see the bus-silence invariants); these types cover graph edits, stream
//! lifecycle, and decode collaborators only.

use crate::channel_config::ChannelConfigError;

/// Returned by `connect`/`disconnect`/`connect_param` on the context.
///
/// Validation and topology failures are reported synchronously to the
/// caller; the pending connection queue is left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GraphEditError {
    #[error("node id does not refer to a node in this graph")]
    InvalidNodeId,
    #[error("input index {index} out of range (node has {max} inputs)")]
    InvalidInputIndex { index: u32, max: u32 },
    #[error("output index {index} out of range (node has {max} outputs)")]
    InvalidOutputIndex { index: u32, max: u32 },
    #[error("connecting this edge would create a cycle in the graph")]
    CycleDetected,
    #[error(transparent)]
    ChannelConfigMismatch(#[from] ChannelConfigError),
}

/// Failure to start the device stream, generic over the backend's own
/// start-failure type so each backend can report driver-specific detail.
#[derive(Debug, thiserror::Error)]
pub enum StartStreamError<B> {
    #[error("no default audio device is available")]
    NoDefaultDevice,
    #[error("the requested stream configuration is not supported by the device")]
    UnsupportedConfig,
    #[error("backend error: {0}")]
    Backend(#[source] B),
}

/// A steady-state stream error surfaced through `poll_status`, generic over
/// the backend's own error type. Never thrown across the render boundary
/// itself -- the render path degrades to silence instead.
#[derive(Debug, thiserror::Error)]
pub enum StreamError<B> {
    #[error("backend error: {0}")]
    Backend(#[source] B),
    #[error("the audio stream stopped unexpectedly")]
    StreamStopped,
}

/// Reported by a `Decoder` collaborator; the core never constructs one
/// directly, only forwards what the collaborator returns.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("unsupported audio format")]
    UnsupportedFormat,
    #[error("audio data was truncated before decoding completed")]
    Truncated,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
