use super::Animation;
use crate::color::Rgb;
use crate::grid::{PixelGrid, PixelMatrix};
use crate::signal::{self, Signal, SignalError, SignalRegistry};

const DEFAULT_FRAME_RATE: f32 = 30.0;

/// Stereo spectrum bars: left channel in red on the left half of the grid,
/// right channel in blue on the right half, growing up from the bottom row.
pub struct SpectrumBars {
    left: Signal<Vec<f32>>,
    right: Signal<Vec<f32>>,
    frame_rate: f32,
}

impl SpectrumBars {
    pub fn new(registry: &SignalRegistry) -> Result<Self, SignalError> {
        Ok(Self {
            left: registry.get(signal::BANDS_LEFT_NORMALIZED)?,
            right: registry.get(signal::BANDS_RIGHT_NORMALIZED)?,
            frame_rate: DEFAULT_FRAME_RATE,
        })
    }

    pub fn with_frame_rate(mut self, frame_rate: f32) -> Self {
        self.frame_rate = frame_rate;
        self
    }
}

impl Animation for SpectrumBars {
    fn name(&self) -> &'static str {
        "bars"
    }

    fn frame_rate(&self) -> f32 {
        self.frame_rate
    }

    fn render_frame(&mut self, grid: &PixelGrid) {
        let left = self.left.get();
        let right = self.right.get();
        let half = grid.width() / 2;

        grid.update(|pixels| {
            for row in pixels.iter_mut() {
                row.fill(Rgb::BLACK);
            }
            draw_bars(pixels, &left, 0, half, Rgb::RED);
            draw_bars(pixels, &right, half, half, Rgb::BLUE);
        });
    }
}

/// Number of lit rows for a normalized level.
pub fn bar_height(level: f32, height: usize) -> usize {
    if !level.is_finite() || level <= 0.0 {
        return 0;
    }
    ((level * height as f32) as usize).min(height)
}

/// Stretch `levels` across `width` columns starting at `x0`.
fn draw_bars(pixels: &mut PixelMatrix, levels: &[f32], x0: usize, width: usize, color: Rgb) {
    if levels.is_empty() || width == 0 {
        return;
    }
    let height = pixels.len();
    for column in 0..width {
        let band = column * levels.len() / width;
        let lit = bar_height(levels[band], height);
        for k in 0..lit {
            if let Some(pixel) = pixels[height - 1 - k].get_mut(x0 + column) {
                *pixel = color;
            }
        }
    }
}
