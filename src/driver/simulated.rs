//! Simulated camera backend.
//!
//! A deterministic software camera for offline development and tests. It
//! enforces the buffer lifecycle strictly: reading without an allocated,
//! capturing buffer is an error, as is double allocation or freeing a
//! buffer mid-capture. That strictness is what lets the test suite prove
//! the controller's stop/free/set/alloc/start ordering.

use crate::driver::{CameraBackend, CameraDevice};
use crate::errors::DriverError;
use crate::testing::synthetic_mono_frame;
use crate::types::{AoiRect, ColorMode, DeviceDescriptor, SensorGeometry};

/// Characteristics of one simulated device.
#[derive(Debug, Clone)]
pub struct SimulatedSpec {
    pub serial: String,
    pub model: String,
    pub geometry: SensorGeometry,
    pub supported_modes: Vec<ColorMode>,
    /// `(min, max)` in microseconds.
    pub exposure_range_us: (f64, f64),
    /// `(min, max, step)` in seconds.
    pub frame_time_range_s: (f64, f64, f64),
    pub black_level_range: (u32, u32),
}

impl Default for SimulatedSpec {
    fn default() -> Self {
        Self {
            serial: "4103216907".to_string(),
            model: "SimCam UI-1240".to_string(),
            geometry: SensorGeometry {
                max_width: 1280,
                max_height: 1024,
            },
            supported_modes: vec![ColorMode::Mono12, ColorMode::Mono10, ColorMode::Mono8],
            exposure_range_us: (10.0, 500_000.0),
            frame_time_range_s: (0.002, 1.0, 0.001),
            black_level_range: (0, 255),
        }
    }
}

impl SimulatedSpec {
    /// A device that only accepts `Mono8`, for fallback-chain testing.
    pub fn mono8_only() -> Self {
        Self {
            supported_modes: vec![ColorMode::Mono8],
            ..Self::default()
        }
    }
}

/// Backend exposing zero or more simulated devices.
pub struct SimulatedBackend {
    specs: Vec<SimulatedSpec>,
}

impl SimulatedBackend {
    /// One default device.
    pub fn new() -> Self {
        Self {
            specs: vec![SimulatedSpec::default()],
        }
    }

    pub fn with_specs(specs: Vec<SimulatedSpec>) -> Self {
        Self { specs }
    }

    /// No devices at all.
    pub fn empty() -> Self {
        Self { specs: Vec::new() }
    }
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraBackend for SimulatedBackend {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn list_devices(&self) -> Result<Vec<DeviceDescriptor>, DriverError> {
        Ok(self
            .specs
            .iter()
            .enumerate()
            .map(|(index, spec)| DeviceDescriptor {
                index,
                serial: spec.serial.clone(),
                model: spec.model.clone(),
            })
            .collect())
    }

    fn open(&self, index: usize) -> Result<Box<dyn CameraDevice>, DriverError> {
        let spec = self
            .specs
            .get(index)
            .cloned()
            .ok_or_else(|| DriverError::new(format!("no device at index {index}")))?;
        log::debug!("opening simulated device {} ({})", index, spec.model);
        Ok(Box::new(SimulatedCamera::new(spec)))
    }
}

/// One open simulated camera.
pub struct SimulatedCamera {
    spec: SimulatedSpec,
    mode: ColorMode,
    aoi: AoiRect,
    exposure_us: f64,
    frame_rate_hz: f64,
    black_level: u32,
    allocated: bool,
    capturing: bool,
    frames_served: u64,
}

impl SimulatedCamera {
    fn new(spec: SimulatedSpec) -> Self {
        let aoi = AoiRect::full_sensor(spec.geometry);
        let exposure_us = spec.exposure_range_us.0;
        // free-run default, clamped into the achievable rate window
        let frame_rate_hz =
            25.0f64.clamp(1.0 / spec.frame_time_range_s.1, 1.0 / spec.frame_time_range_s.0);
        let black_level = spec.black_level_range.0;
        Self {
            spec,
            mode: ColorMode::Mono8,
            aoi,
            exposure_us,
            frame_rate_hz,
            black_level,
            allocated: false,
            capturing: false,
            frames_served: 0,
        }
    }
}

impl CameraDevice for SimulatedCamera {
    fn sensor_geometry(&self) -> SensorGeometry {
        self.spec.geometry
    }

    fn set_color_mode(&mut self, mode: ColorMode) -> Result<(), DriverError> {
        if self.allocated {
            return Err(DriverError::new("set_color_mode while buffer allocated"));
        }
        if !self.spec.supported_modes.contains(&mode) {
            return Err(DriverError::new(format!("color mode {mode} not supported")));
        }
        self.mode = mode;
        Ok(())
    }

    fn set_aoi(&mut self, rect: AoiRect) -> Result<(), DriverError> {
        if self.allocated {
            return Err(DriverError::new("set_aoi while buffer allocated"));
        }
        let geometry = self.spec.geometry;
        if u64::from(rect.x) + u64::from(rect.width) > u64::from(geometry.max_width)
            || u64::from(rect.y) + u64::from(rect.height) > u64::from(geometry.max_height)
        {
            return Err(DriverError::new(format!(
                "AOI {rect} exceeds sensor {geometry}"
            )));
        }
        self.aoi = rect;
        Ok(())
    }

    fn aoi(&self) -> AoiRect {
        self.aoi
    }

    fn exposure_range_us(&self) -> (f64, f64) {
        self.spec.exposure_range_us
    }

    fn exposure_us(&self) -> f64 {
        self.exposure_us
    }

    fn set_exposure_us(&mut self, exposure_us: f64) -> Result<(), DriverError> {
        let (min, max) = self.spec.exposure_range_us;
        if !(min..=max).contains(&exposure_us) {
            return Err(DriverError::new(format!(
                "exposure {exposure_us} us outside [{min}, {max}]"
            )));
        }
        self.exposure_us = exposure_us;
        Ok(())
    }

    fn frame_time_range_s(&self) -> (f64, f64, f64) {
        self.spec.frame_time_range_s
    }

    fn frame_rate_hz(&self) -> f64 {
        self.frame_rate_hz
    }

    fn set_frame_rate_hz(&mut self, rate_hz: f64) -> Result<(), DriverError> {
        let (min_t, max_t, _) = self.spec.frame_time_range_s;
        let (min_hz, max_hz) = (1.0 / max_t, 1.0 / min_t);
        if !(min_hz..=max_hz).contains(&rate_hz) {
            return Err(DriverError::new(format!(
                "frame rate {rate_hz} Hz outside [{min_hz:.3}, {max_hz:.3}]"
            )));
        }
        self.frame_rate_hz = rate_hz;
        Ok(())
    }

    fn black_level_range(&self) -> (u32, u32) {
        self.spec.black_level_range
    }

    fn black_level(&self) -> u32 {
        self.black_level
    }

    fn set_black_level(&mut self, level: u32) -> Result<(), DriverError> {
        let (min, max) = self.spec.black_level_range;
        if !(min..=max).contains(&level) {
            return Err(DriverError::new(format!(
                "black level {level} outside [{min}, {max}]"
            )));
        }
        self.black_level = level;
        Ok(())
    }

    fn allocate(&mut self) -> Result<(), DriverError> {
        if self.allocated {
            return Err(DriverError::new("buffer already allocated"));
        }
        self.allocated = true;
        Ok(())
    }

    fn free(&mut self) -> Result<(), DriverError> {
        if self.capturing {
            return Err(DriverError::new("free while capture is running"));
        }
        if !self.allocated {
            return Err(DriverError::new("no buffer allocated"));
        }
        self.allocated = false;
        Ok(())
    }

    fn start_capture(&mut self) -> Result<(), DriverError> {
        if !self.allocated {
            return Err(DriverError::new("start_capture without a buffer"));
        }
        if self.capturing {
            return Err(DriverError::new("capture already running"));
        }
        self.capturing = true;
        Ok(())
    }

    fn stop_capture(&mut self) -> Result<(), DriverError> {
        if !self.capturing {
            return Err(DriverError::new("capture not running"));
        }
        self.capturing = false;
        Ok(())
    }

    fn read_latest_frame(&mut self) -> Result<Vec<u8>, DriverError> {
        if !self.allocated || !self.capturing {
            return Err(DriverError::new("no active capture to read from"));
        }
        self.frames_served += 1;
        Ok(synthetic_mono_frame(
            self.frames_served,
            self.aoi.width,
            self.aoi.height,
            self.mode,
            self.black_level as u16,
        ))
    }
}
