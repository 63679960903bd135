//! CMOSBench: industrial CMOS camera acquisition and AOI control
//!
//! This crate is the acquisition core of a lab bench application for
//! studying industrial monochrome CMOS sensors: live frame capture, sensor
//! tuning (exposure, frame rate, black level) and safe Area-Of-Interest
//! reconfiguration, with bit-depth-correct decoding of 8/10/12-bit frames.
//!
//! # Features
//! - Backend-agnostic camera access through the `driver` traits
//! - Capture loop paced by the sensor's frame rate
//! - Atomic AOI/buffer reconfiguration (stop, free, set, alloc, start)
//! - 8/10/12-bit mono decoding with display projection
//! - Pixel neighborhood sampling and histograms for charting
//! - Deterministic simulated camera for offline use
//!
//! # Usage
//! ```rust
//! use cmosbench::{AcquisitionController, ConnectOptions, SimulatedBackend};
//!
//! let controller = AcquisitionController::connect(
//!     Box::new(SimulatedBackend::new()),
//!     ConnectOptions::default(),
//! )?;
//! let frame = controller.pull_frame()?;
//! println!("{}x{} {}", frame.width, frame.height, frame.color_mode);
//! controller.disconnect();
//! # Ok::<(), cmosbench::CameraError>(())
//! ```

pub mod acquisition;
pub mod analysis;
pub mod config;
pub mod controls;
pub mod driver;
pub mod errors;
pub mod testing;
pub mod timing;
pub mod types;

// Re-exports for convenience
pub use acquisition::{
    AcquisitionController, ConnectOptions, ControllerState, FrameQueue, FrameSink,
};
pub use config::BenchConfig;
pub use driver::{first_backend_with_device, CameraBackend, CameraDevice, SimulatedBackend};
pub use errors::{CameraError, DriverError};
pub use types::{
    AoiRect, ColorMode, DeviceDescriptor, DisplayFrame, RawFrame, SensorGeometry,
};

/// Initialize logging for the acquisition core.
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "cmosbench=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
    }
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
}
