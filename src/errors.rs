use crate::acquisition::ControllerState;
use crate::types::{AoiRect, ColorMode, SensorGeometry};
use thiserror::Error;

/// Error reported by a camera backend.
///
/// Backends know nothing about controller state; they only describe what the
/// hardware (or its stand-in) rejected. The controller converts these into
/// [`CameraError::DriverOperationFailed`] at its boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct DriverError {
    pub message: String,
}

impl DriverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors surfaced by the acquisition controller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CameraError {
    #[error("no camera detected")]
    NoCameraDetected,

    #[error("no supported color mode, tried {tried:?}")]
    UnsupportedColorMode { tried: Vec<ColorMode> },

    #[error("AOI {rect} does not fit sensor {geometry}")]
    InvalidAoi {
        rect: AoiRect,
        geometry: SensorGeometry,
    },

    #[error("no frame buffer available while {state:?}")]
    BufferUnavailable { state: ControllerState },

    #[error("driver operation `{operation}` failed: {source}")]
    DriverOperationFailed {
        operation: &'static str,
        source: DriverError,
    },

    #[error("sample offset {offset} does not fit a {width}x{height} frame")]
    FrameTooSmall {
        offset: u32,
        width: u32,
        height: u32,
    },
}

impl CameraError {
    /// Wrap a backend failure with the name of the operation that hit it.
    pub fn driver(operation: &'static str, source: DriverError) -> Self {
        Self::DriverOperationFailed { operation, source }
    }
}
