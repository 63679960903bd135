//! Pixel analysis helpers for charting and histograms.
//!
//! Pure functions over decoded frames; nothing here touches the camera.

use crate::errors::CameraError;
use crate::types::{DisplayFrame, RawFrame};

/// The four native-depth samples `offset` pixels from the frame center,
/// in `+x, -x, +y, -y` order.
///
/// Fails with [`CameraError::FrameTooSmall`] when `center ± offset` leaves
/// the frame on either axis.
pub fn sample_neighborhood(frame: &RawFrame, offset: u32) -> Result<[u16; 4], CameraError> {
    let (cx, cy) = (frame.width / 2, frame.height / 2);
    if offset > cx || offset > cy || cx + offset >= frame.width || cy + offset >= frame.height {
        return Err(CameraError::FrameTooSmall {
            offset,
            width: frame.width,
            height: frame.height,
        });
    }

    let samples = frame.samples();
    let at = |x: u32, y: u32| samples[(y as usize) * (frame.width as usize) + (x as usize)];
    Ok([
        at(cx + offset, cy),
        at(cx - offset, cy),
        at(cx, cy + offset),
        at(cx, cy - offset),
    ])
}

/// Histogram of a raw frame with one bin per representable sample value
/// (`2^bits_per_pixel` bins).
pub fn histogram(frame: &RawFrame) -> Vec<u32> {
    let mut bins = vec![0u32; 1 << frame.color_mode.bits_per_pixel()];
    for &sample in frame.samples() {
        if let Some(bin) = bins.get_mut(sample as usize) {
            *bin += 1;
        }
    }
    bins
}

/// 256-bin histogram of a display frame.
pub fn display_histogram(frame: &DisplayFrame) -> [u32; 256] {
    let mut bins = [0u32; 256];
    for &value in &frame.data {
        bins[value as usize] += 1;
    }
    bins
}
