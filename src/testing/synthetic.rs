//! Synthetic monochrome sensor frames.
//!
//! Deterministic stand-in for real sensor output, so the simulated backend
//! and the test suite agree on frame content without hardware attached.

use crate::types::ColorMode;

/// Generate one raw frame as the driver would hand it out: one sample per
/// pixel, little-endian, at the container width of `mode`.
///
/// The pattern is a diagonal gradient offset by the sequence number and the
/// black level, folded into the mode's sample range. Two calls with the same
/// arguments produce identical bytes.
pub fn synthetic_mono_frame(
    sequence: u64,
    width: u32,
    height: u32,
    mode: ColorMode,
    black_level: u16,
) -> Vec<u8> {
    let max = mode.max_sample();
    let black = black_level.min(max);
    let span = u32::from(max - black) + 1;

    let pixels = (width as usize) * (height as usize);
    let mut data = Vec::with_capacity(pixels * mode.bytes_per_pixel() as usize);

    let base = (sequence % u64::from(span)) as u32;
    for y in 0..height {
        for x in 0..width {
            let sample = black + ((base + x + y) % span) as u16;
            if mode.bytes_per_pixel() == 1 {
                data.push(sample as u8);
            } else {
                data.extend_from_slice(&sample.to_le_bytes());
            }
        }
    }
    data
}
