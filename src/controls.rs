//! Sensor control schema.
//!
//! One uniform surface for the three tunable sensor settings, so GUI layers
//! bind sliders to a descriptor list instead of wiring each setting by hand.
//! Ranges are not hardcoded here; they are filled in from the open device.

use crate::errors::DriverError;
use serde::Serialize;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ControlId {
    ExposureTime,
    FrameRate,
    BlackLevel,
}

impl FromStr for ControlId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ExposureTime" => Ok(Self::ExposureTime),
            "FrameRate" => Ok(Self::FrameRate),
            "BlackLevel" => Ok(Self::BlackLevel),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ControlKind {
    F64,
    U32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum ControlValue {
    F64(f64),
    U32(u32),
}

/// One control with its device-reported range.
#[derive(Debug, Clone, Serialize)]
pub struct ControlInfo {
    pub id: ControlId,
    pub kind: ControlKind,
    pub min_f64: Option<f64>,
    pub max_f64: Option<f64>,
    pub min_u32: Option<u32>,
    pub max_u32: Option<u32>,
}

/// Build the descriptor list from device-queried ranges.
pub fn control_infos(
    exposure_range_us: (f64, f64),
    fps_range: (u32, u32),
    black_level_range: (u32, u32),
) -> Vec<ControlInfo> {
    vec![
        ControlInfo {
            id: ControlId::ExposureTime,
            kind: ControlKind::F64,
            min_f64: Some(exposure_range_us.0),
            max_f64: Some(exposure_range_us.1),
            min_u32: None,
            max_u32: None,
        },
        ControlInfo {
            id: ControlId::FrameRate,
            kind: ControlKind::F64,
            min_f64: Some(f64::from(fps_range.0)),
            max_f64: Some(f64::from(fps_range.1)),
            min_u32: None,
            max_u32: None,
        },
        ControlInfo {
            id: ControlId::BlackLevel,
            kind: ControlKind::U32,
            min_f64: None,
            max_f64: None,
            min_u32: Some(black_level_range.0),
            max_u32: Some(black_level_range.1),
        },
    ]
}

/// Check a candidate value against a control's kind and range. Failures read
/// like driver rejections because the controller surfaces them as such.
pub fn validate_control_value(info: &ControlInfo, value: &ControlValue) -> Result<(), DriverError> {
    match (info.kind, value) {
        (ControlKind::F64, ControlValue::F64(v)) => {
            if let Some(min) = info.min_f64 {
                if *v < min {
                    return Err(DriverError::new(format!(
                        "{:?} value {v} below minimum {min}",
                        info.id
                    )));
                }
            }
            if let Some(max) = info.max_f64 {
                if *v > max {
                    return Err(DriverError::new(format!(
                        "{:?} value {v} above maximum {max}",
                        info.id
                    )));
                }
            }
            Ok(())
        }
        (ControlKind::U32, ControlValue::U32(v)) => {
            if let Some(min) = info.min_u32 {
                if *v < min {
                    return Err(DriverError::new(format!(
                        "{:?} value {v} below minimum {min}",
                        info.id
                    )));
                }
            }
            if let Some(max) = info.max_u32 {
                if *v > max {
                    return Err(DriverError::new(format!(
                        "{:?} value {v} above maximum {max}",
                        info.id
                    )));
                }
            }
            Ok(())
        }
        _ => Err(DriverError::new(format!(
            "{:?} value kind mismatch",
            info.id
        ))),
    }
}
