//! APA102-style LED strip output.
//!
//! A frame is a 4-byte zero start marker, one `[0xE0 | brightness, blue,
//! green, red]` record per LED, and `ceil(n / 16)` bytes of `0xFF` to clock
//! the data through the whole strip.

mod renderer;
mod sink;

pub use renderer::{LedRenderer, RendererSettings};
pub use sink::{LedSink, SpiSink};

use crate::color::Rgb;
use crate::signal::SignalError;
use thiserror::Error;

/// Largest value of the 5-bit hardware brightness field.
pub const MAX_DEVICE_BRIGHTNESS: u8 = 31;

const START_FRAME: [u8; 4] = [0x00; 4];
const LED_HEADER: u8 = 0xE0;

#[derive(Debug, Error)]
pub enum LedError {
    #[error("LED sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("partial LED frame write: {written} of {expected} bytes")]
    PartialWrite { written: usize, expected: usize },

    #[error(transparent)]
    Signal(#[from] SignalError),
}

/// One LED: color plus its animation-level and hardware-level brightness.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pixel {
    pub color: Rgb,
    /// Software brightness in [0, 1].
    pub brightness: f32,
    /// Hardware brightness in [0, 31].
    pub device_brightness: u8,
}

impl Pixel {
    pub fn new(color: Rgb, brightness: f32, device_brightness: u8) -> Self {
        Self {
            color,
            brightness,
            device_brightness,
        }
    }
}

/// Bytes in a frame for `led_count` LEDs.
pub fn frame_len(led_count: usize) -> usize {
    START_FRAME.len() + 4 * led_count + led_count.div_ceil(16)
}

fn scale_channel(value: u8, factor: f32) -> u8 {
    let scaled = value as f32 * factor;
    if scaled.is_nan() {
        return 0;
    }
    scaled.round().clamp(0.0, 255.0) as u8
}

/// Encode a full strip frame.
///
/// Color channels are scaled by the pixel's brightness and `user_brightness`.
/// The hardware field is the pixel's device brightness scaled by
/// `device_limit / 31`.
pub fn encode_frame(pixels: &[Pixel], user_brightness: f32, device_limit: u8) -> Vec<u8> {
    let user_brightness = user_brightness.clamp(0.0, 1.0);
    let device_limit = device_limit.min(MAX_DEVICE_BRIGHTNESS) as u16;

    let mut frame = Vec::with_capacity(frame_len(pixels.len()));
    frame.extend_from_slice(&START_FRAME);
    for pixel in pixels {
        let device = pixel.device_brightness.min(MAX_DEVICE_BRIGHTNESS) as u16;
        let hardware = (device * device_limit / MAX_DEVICE_BRIGHTNESS as u16) as u8 & 0x1F;
        let factor = pixel.brightness.clamp(0.0, 1.0) * user_brightness;
        frame.extend_from_slice(&[
            LED_HEADER | hardware,
            scale_channel(pixel.color.b, factor),
            scale_channel(pixel.color.g, factor),
            scale_channel(pixel.color.r, factor),
        ]);
    }
    frame.resize(frame.len() + pixels.len().div_ceil(16), 0xFF);
    frame
}

/// Estimated strip current in milliamps.
pub fn estimate_current_ma(pixels: &[Pixel], milliamps_per_led: f32) -> f32 {
    pixels
        .iter()
        .map(|p| p.color.intensity() * p.brightness.clamp(0.0, 1.0) * milliamps_per_led)
        .sum()
}
