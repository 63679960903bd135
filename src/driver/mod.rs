//! Camera backend capability contract.
//!
//! The acquisition controller is written against these traits only; a
//! concrete backend (vendor SDK wrapper or the simulated camera) is picked
//! once at startup by [`first_backend_with_device`].

use crate::errors::DriverError;
use crate::types::{AoiRect, ColorMode, DeviceDescriptor, SensorGeometry};

pub mod simulated;

pub use simulated::{SimulatedBackend, SimulatedSpec};

/// A camera family that can enumerate and open devices.
pub trait CameraBackend: Send {
    fn name(&self) -> &'static str;

    fn list_devices(&self) -> Result<Vec<DeviceDescriptor>, DriverError>;

    fn open(&self, index: usize) -> Result<Box<dyn CameraDevice>, DriverError>;
}

/// One open camera.
///
/// Buffer lifecycle contract: `read_latest_frame` is only valid between
/// `allocate` + `start_capture` and the matching `stop_capture` + `free`.
/// A buffer must never survive an AOI or color-mode change; callers free and
/// reallocate around every reconfiguration.
pub trait CameraDevice: Send {
    fn sensor_geometry(&self) -> SensorGeometry;

    fn set_color_mode(&mut self, mode: ColorMode) -> Result<(), DriverError>;

    fn set_aoi(&mut self, rect: AoiRect) -> Result<(), DriverError>;
    fn aoi(&self) -> AoiRect;

    /// Exposure range in microseconds, `(min, max)`.
    fn exposure_range_us(&self) -> (f64, f64);
    fn exposure_us(&self) -> f64;
    fn set_exposure_us(&mut self, exposure_us: f64) -> Result<(), DriverError>;

    /// Frame time range in seconds, `(min, max, step)`.
    fn frame_time_range_s(&self) -> (f64, f64, f64);
    fn frame_rate_hz(&self) -> f64;
    fn set_frame_rate_hz(&mut self, rate_hz: f64) -> Result<(), DriverError>;

    fn black_level_range(&self) -> (u32, u32);
    fn black_level(&self) -> u32;
    fn set_black_level(&mut self, level: u32) -> Result<(), DriverError>;

    fn allocate(&mut self) -> Result<(), DriverError>;
    fn free(&mut self) -> Result<(), DriverError>;
    fn start_capture(&mut self) -> Result<(), DriverError>;
    fn stop_capture(&mut self) -> Result<(), DriverError>;

    /// Latest frame as raw bytes, `width * height * bytes_per_pixel` long.
    fn read_latest_frame(&mut self) -> Result<Vec<u8>, DriverError>;
}

/// Probe backends in order and return the first that reports a device,
/// together with its device list.
///
/// This replaces per-vendor import probing: register every candidate backend
/// and let enumeration decide which one drives the session.
pub fn first_backend_with_device(
    backends: Vec<Box<dyn CameraBackend>>,
) -> Option<(Box<dyn CameraBackend>, Vec<DeviceDescriptor>)> {
    for backend in backends {
        match backend.list_devices() {
            Ok(devices) if !devices.is_empty() => {
                log::info!(
                    "using {} backend, {} device(s) found",
                    backend.name(),
                    devices.len()
                );
                return Some((backend, devices));
            }
            Ok(_) => {
                log::debug!("backend {} reports no devices", backend.name());
            }
            Err(e) => {
                log::warn!("backend {} enumeration failed: {}", backend.name(), e);
            }
        }
    }
    None
}
