//! The backend-agnostic seam between [`crate::context::Context`] and a
//! concrete device I/O library. One real implementation exists
//! (`audiograph-cpal`'s `CpalBackend`); tests exercise this trait against a
//! mock that feeds synthetic callbacks without opening a device.

use audiograph_core::error::{StartStreamError, StreamError};

/// One enumerated input or output device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    pub num_channels: u16,
    pub is_default: bool,
}

/// A device I/O backend: owns the platform stream, bridges its callback to
/// [`crate::context::Context::render_quantum`], and reports steady-state
/// errors without ever panicking the render thread.
///
/// Enumeration must never panic even when the platform API itself fails;
/// implementations should log a `warn` and return what could be
/// enumerated rather than propagate the failure.
pub trait DeviceBackend: Sized {
    type Config;

    fn available_input_devices() -> Vec<DeviceInfo> {
        Vec::new()
    }

    fn available_output_devices() -> Vec<DeviceInfo> {
        Vec::new()
    }

    /// Open the platform stream and start calling back into `context` on
    /// the realtime I/O thread. Returns the backend handle and the sample
    /// rate the device actually opened at (which may differ from what
    /// `config` requested).
    fn start_stream(
        config: Self::Config,
        context: std::sync::Arc<crate::context::Context>,
    ) -> Result<(Self, u32), StartStreamError<Self::StartStreamError>>;

    /// Poll for steady-state stream errors (device disconnect, driver
    /// error). Never called from the realtime thread itself.
    fn poll_status(&mut self) -> Result<(), StreamError<Self::StreamError>>;

    type StartStreamError: std::error::Error;
    type StreamError: std::error::Error;
}
