//! Core data model: color modes, sensor geometry, AOI rectangles and frames.

use crate::errors::CameraError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Monochrome pixel formats supported by the acquisition core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColorMode {
    Mono8,
    Mono10,
    Mono12,
}

impl ColorMode {
    /// Fallback order used at connect time: deepest first.
    pub const FALLBACK_CHAIN: [ColorMode; 3] =
        [ColorMode::Mono12, ColorMode::Mono10, ColorMode::Mono8];

    pub fn bits_per_pixel(self) -> u32 {
        match self {
            ColorMode::Mono8 => 8,
            ColorMode::Mono10 => 10,
            ColorMode::Mono12 => 12,
        }
    }

    pub fn bytes_per_pixel(self) -> u32 {
        self.bits_per_pixel().div_ceil(8)
    }

    /// Right shift that maps a native sample onto the 8-bit display range.
    pub fn display_shift(self) -> u32 {
        self.bits_per_pixel() - 8
    }

    /// Largest sample value this mode can produce.
    pub fn max_sample(self) -> u16 {
        ((1u32 << self.bits_per_pixel()) - 1) as u16
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ColorMode::Mono8 => "Mono8",
            ColorMode::Mono10 => "Mono10",
            ColorMode::Mono12 => "Mono12",
        }
    }

    /// The fallback candidates tried at connect time, starting from
    /// `preferred` and walking down [`ColorMode::FALLBACK_CHAIN`].
    pub fn fallback_candidates(preferred: ColorMode) -> Vec<ColorMode> {
        let start = Self::FALLBACK_CHAIN
            .iter()
            .position(|&m| m == preferred)
            .unwrap_or(0);
        Self::FALLBACK_CHAIN[start..].to_vec()
    }
}

impl fmt::Display for ColorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColorMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Mono8" => Ok(Self::Mono8),
            "Mono10" => Ok(Self::Mono10),
            "Mono12" => Ok(Self::Mono12),
            _ => Err(()),
        }
    }
}

/// Sensor dimensions, queried once at connect time and immutable after.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorGeometry {
    pub max_width: u32,
    pub max_height: u32,
}

impl fmt::Display for SensorGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.max_width, self.max_height)
    }
}

/// Active capture rectangle, in sensor pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AoiRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl AoiRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The whole-sensor rectangle for the given geometry.
    pub fn full_sensor(geometry: SensorGeometry) -> Self {
        Self {
            x: 0,
            y: 0,
            width: geometry.max_width,
            height: geometry.max_height,
        }
    }

    /// Check the geometry invariant: the rectangle must be non-empty and lie
    /// entirely on the sensor.
    pub fn validate(&self, geometry: &SensorGeometry) -> Result<(), CameraError> {
        let fits = self.width >= 1
            && self.height >= 1
            && self.x.checked_add(self.width).is_some_and(|r| r <= geometry.max_width)
            && self.y.checked_add(self.height).is_some_and(|b| b <= geometry.max_height);
        if fits {
            Ok(())
        } else {
            Err(CameraError::InvalidAoi {
                rect: *self,
                geometry: *geometry,
            })
        }
    }

}

impl fmt::Display for AoiRect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

/// One enumerated camera, as reported by a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub index: usize,
    pub serial: String,
    pub model: String,
}

/// A decoded frame at the sensor's native bit depth.
///
/// Samples are stored one `u16` per pixel regardless of depth; only the low
/// `bits_per_pixel` bits are meaningful. Superseded by the next pull; the
/// core keeps no frame history.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub sequence: u64,
    pub timestamp_us: u64,
    pub captured_at: DateTime<Utc>,
    pub color_mode: ColorMode,
    pub width: u32,
    pub height: u32,
    samples: Vec<u16>,
}

impl RawFrame {
    pub(crate) fn new(
        sequence: u64,
        timestamp_us: u64,
        captured_at: DateTime<Utc>,
        color_mode: ColorMode,
        width: u32,
        height: u32,
        samples: Vec<u16>,
    ) -> Self {
        Self {
            sequence,
            timestamp_us,
            captured_at,
            color_mode,
            width,
            height,
            samples,
        }
    }

    /// Build a frame from pre-decoded samples. Returns `None` when the sample
    /// count does not match the dimensions.
    pub fn from_samples(
        color_mode: ColorMode,
        width: u32,
        height: u32,
        samples: Vec<u16>,
    ) -> Option<Self> {
        if samples.len() != (width as usize) * (height as usize) {
            return None;
        }
        Some(Self::new(0, 0, Utc::now(), color_mode, width, height, samples))
    }

    /// Sample at `(x, y)`, row-major. `None` when out of bounds.
    pub fn sample(&self, x: u32, y: u32) -> Option<u16> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.samples
            .get((y as usize) * (self.width as usize) + (x as usize))
            .copied()
    }

    pub fn samples(&self) -> &[u16] {
        &self.samples
    }

    /// Project onto the 8-bit display range by the mode's right shift,
    /// saturating at 255.
    pub fn to_display(&self) -> DisplayFrame {
        let shift = self.color_mode.display_shift();
        let data = self
            .samples
            .iter()
            .map(|&s| (s >> shift).min(255) as u8)
            .collect();
        DisplayFrame {
            sequence: self.sequence,
            timestamp_us: self.timestamp_us,
            width: self.width,
            height: self.height,
            data,
        }
    }
}

/// An 8-bit-per-pixel projection of a [`RawFrame`], ready for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayFrame {
    pub sequence: u64,
    pub timestamp_us: u64,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl DisplayFrame {
    pub fn pixel(&self, x: u32, y: u32) -> Option<u8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data
            .get((y as usize) * (self.width as usize) + (x as usize))
            .copied()
    }

    /// Save as an 8-bit grayscale PNG.
    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> image::ImageResult<()> {
        let img = image::GrayImage::from_raw(self.width, self.height, self.data.clone())
            .ok_or_else(|| {
                image::ImageError::Parameter(image::error::ParameterError::from_kind(
                    image::error::ParameterErrorKind::DimensionMismatch,
                ))
            })?;
        img.save(path)
    }
}
