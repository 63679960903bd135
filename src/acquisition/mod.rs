//! Acquisition core: controller, raw decoding and frame sinks.

pub mod controller;
pub mod decode;
pub mod sink;

pub use controller::{AcquisitionController, ConnectOptions, ControllerState};
pub use sink::{FrameQueue, FrameSink};
