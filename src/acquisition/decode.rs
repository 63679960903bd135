//! Raw buffer decoding.
//!
//! Sensors with more than 8 bits per pixel deliver each sample in a 16-bit
//! little-endian container; 8-bit sensors deliver one byte per pixel. The
//! display projection right-shifts by `bits_per_pixel - 8` so the brightest
//! sample lands on 255 whatever the depth.

use crate::errors::DriverError;
use crate::types::ColorMode;

/// Decode driver bytes into one native-depth sample per pixel.
///
/// The buffer must be exactly `width * height * bytes_per_pixel` long;
/// anything else is a violation of the driver contract.
pub fn decode_samples(
    bytes: &[u8],
    mode: ColorMode,
    width: u32,
    height: u32,
) -> Result<Vec<u16>, DriverError> {
    let pixels = (width as usize) * (height as usize);
    let expected = pixels * mode.bytes_per_pixel() as usize;
    if bytes.len() != expected {
        return Err(DriverError::new(format!(
            "frame buffer is {} bytes, expected {expected} for {width}x{height} {mode}",
            bytes.len()
        )));
    }

    let samples = if mode.bytes_per_pixel() == 1 {
        bytes.iter().map(|&b| u16::from(b)).collect()
    } else {
        bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect()
    };
    Ok(samples)
}
