use super::Animation;
use crate::audio::BinStatistics;
use crate::color::{ColorMapping, Rgb};
use crate::grid::PixelGrid;
use crate::signal::{self, Signal, SignalError, SignalRegistry};
use tracing::warn;

const DEFAULT_FRAME_RATE: f32 = 100.0;

/// Scrolling color history of the loudest bin.
///
/// Every tick the rows move up by one and the last row is filled with a color
/// whose hue follows the peak bin's position inside the render range and whose
/// brightness follows its level.
pub struct ScrollingRainbow {
    bins: Signal<BinStatistics>,
    mapping: Option<Signal<ColorMapping>>,
    frame_rate: f32,
}

impl ScrollingRainbow {
    pub fn new(registry: &SignalRegistry) -> Result<Self, SignalError> {
        let bins = registry.get(signal::BIN_DATA_LEFT)?;
        let mapping = match registry.get(signal::COLOR_MAPPING_TYPE) {
            Ok(mapping) => Some(mapping),
            Err(e) => {
                warn!("{}, using linear color mapping", e);
                None
            }
        };
        Ok(Self {
            bins,
            mapping,
            frame_rate: DEFAULT_FRAME_RATE,
        })
    }

    pub fn with_frame_rate(mut self, frame_rate: f32) -> Self {
        self.frame_rate = frame_rate;
        self
    }

    fn current_color(&self) -> Rgb {
        let bins = self.bins.get();
        let mapping = self
            .mapping
            .as_ref()
            .map(Signal::get)
            .unwrap_or_default();
        peak_color(&bins, mapping)
    }
}

/// Color for the peak bin of `bins` under `mapping`.
pub fn peak_color(bins: &BinStatistics, mapping: ColorMapping) -> Rgb {
    let position = bins.max_bin.saturating_sub(bins.first_bin) as f32;
    mapping.color(position, bins.total_bins as f32, bins.max_normalized)
}

impl Animation for ScrollingRainbow {
    fn name(&self) -> &'static str {
        "rainbow"
    }

    fn frame_rate(&self) -> f32 {
        self.frame_rate
    }

    fn render_frame(&mut self, grid: &PixelGrid) {
        let color = self.current_color();
        grid.update(|pixels| {
            if pixels.is_empty() {
                return;
            }
            pixels.rotate_left(1);
            if let Some(last) = pixels.last_mut() {
                last.fill(color);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::create_grid_signal;
    use crate::signal::SignalOptions;

    fn setup(width: usize, height: usize) -> (SignalRegistry, PixelGrid) {
        let registry = SignalRegistry::new();
        registry
            .create::<BinStatistics>(signal::BIN_DATA_LEFT, SignalOptions::local())
            .unwrap();
        registry
            .create::<ColorMapping>(signal::COLOR_MAPPING_TYPE, SignalOptions::local())
            .unwrap();
        create_grid_signal(&registry, None, width, height).unwrap();
        let grid = PixelGrid::from_registry(&registry, width, height).unwrap();
        (registry, grid)
    }

    fn peak(max_bin: u32, total: u32, level: f32) -> BinStatistics {
        BinStatistics {
            first_bin: 0,
            max_bin,
            total_bins: total,
            max_normalized: level,
            ..BinStatistics::default()
        }
    }

    #[test]
    fn test_peak_color_hue_follows_position() {
        assert_eq!(peak_color(&peak(0, 100, 1.0), ColorMapping::Linear), Rgb::RED);
        assert_eq!(
            peak_color(&peak(100, 300, 1.0), ColorMapping::Linear),
            Rgb::new(0, 255, 0)
        );
        assert_eq!(peak_color(&peak(50, 100, 0.0), ColorMapping::Linear), Rgb::BLACK);
    }

    #[test]
    fn test_position_is_relative_to_range_start() {
        let bins = BinStatistics {
            first_bin: 200,
            max_bin: 300,
            total_bins: 300,
            max_normalized: 1.0,
            ..BinStatistics::default()
        };
        assert_eq!(peak_color(&bins, ColorMapping::Linear), Rgb::new(0, 255, 0));
    }

    #[test]
    fn test_rows_scroll_toward_top_and_new_row_enters_last() {
        let (registry, grid) = setup(2, 3);
        let bins: Signal<BinStatistics> = registry.get(signal::BIN_DATA_LEFT).unwrap();
        let mut rainbow = ScrollingRainbow::new(&registry).unwrap();

        bins.set(peak(0, 10, 1.0));
        rainbow.render_frame(&grid);
        assert_eq!(grid.get_value(0, 2), Rgb::RED);
        assert_eq!(grid.get_value(1, 2), Rgb::RED);
        assert_eq!(grid.get_value(0, 1), Rgb::BLACK);

        bins.set(peak(0, 10, 0.0));
        rainbow.render_frame(&grid);
        assert_eq!(grid.get_value(0, 1), Rgb::RED);
        assert_eq!(grid.get_value(0, 2), Rgb::BLACK);
    }

    #[test]
    fn test_mapping_signal_is_optional() {
        let registry = SignalRegistry::new();
        registry
            .create::<BinStatistics>(signal::BIN_DATA_LEFT, SignalOptions::local())
            .unwrap();
        assert!(ScrollingRainbow::new(&registry).is_ok());
    }
}
