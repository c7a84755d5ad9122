use palette::{Hsv, IntoColor, Srgb};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// 8-bit RGB triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);
    pub const RED: Rgb = Rgb::new(255, 0, 0);
    pub const BLUE: Rgb = Rgb::new(0, 0, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Channel sum as a fraction of full white, in [0, 3].
    pub fn intensity(&self) -> f32 {
        (self.r as f32 + self.g as f32 + self.b as f32) / 255.0
    }
}

/// HSV to 8-bit RGB. Hue in degrees (wrapped), saturation and value in [0, 1].
pub fn hsv_to_rgb(hue: f32, saturation: f32, value: f32) -> Rgb {
    let hsv = Hsv::new(
        hue.rem_euclid(360.0),
        saturation.clamp(0.0, 1.0),
        value.clamp(0.0, 1.0),
    );
    let rgb: Srgb = hsv.into_color();
    Rgb::new(to_byte(rgb.red), to_byte(rgb.green), to_byte(rgb.blue))
}

fn to_byte(channel: f32) -> u8 {
    (channel * 255.0).round().clamp(0.0, 255.0) as u8
}

/// How a bin position is spread over the hue circle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub enum ColorMapping {
    #[default]
    #[serde(alias = "linear")]
    Linear,
    #[serde(alias = "log2")]
    Log2,
    #[serde(alias = "log10")]
    Log10,
}

impl FromStr for ColorMapping {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "linear" => Ok(Self::Linear),
            "log2" => Ok(Self::Log2),
            "log10" => Ok(Self::Log10),
            _ => Err(format!("Unknown color mapping: {}", s)),
        }
    }
}

impl ColorMapping {
    /// Hue in degrees for bin `position` out of `total` bins.
    ///
    /// Fewer than two bins give hue 0.
    pub fn hue(&self, position: f32, total: f32) -> f32 {
        if total.is_nan() || total <= 1.0 || !position.is_finite() {
            return 0.0;
        }
        let position = position.clamp(0.0, total);
        let fraction = match self {
            ColorMapping::Linear => position / total,
            ColorMapping::Log2 => (position + 1.0).log2() / total.log2(),
            ColorMapping::Log10 => (position + 1.0).log10() / total.log10(),
        };
        (fraction * 360.0).clamp(0.0, 360.0)
    }

    /// Fully saturated color for a bin, with brightness from `amplitude`.
    pub fn color(&self, position: f32, total: f32, amplitude: f32) -> Rgb {
        hsv_to_rgb(self.hue(position, total), 1.0, amplitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_primary_hues() {
        assert_eq!(hsv_to_rgb(0.0, 1.0, 1.0), Rgb::new(255, 0, 0));
        assert_eq!(hsv_to_rgb(120.0, 1.0, 1.0), Rgb::new(0, 255, 0));
        assert_eq!(hsv_to_rgb(240.0, 1.0, 1.0), Rgb::new(0, 0, 255));
        assert_eq!(hsv_to_rgb(360.0, 1.0, 1.0), Rgb::new(255, 0, 0));
    }

    #[test]
    fn test_value_scales_brightness() {
        assert_eq!(hsv_to_rgb(0.0, 1.0, 0.0), Rgb::BLACK);
        assert_eq!(hsv_to_rgb(200.0, 0.0, 1.0), Rgb::new(255, 255, 255));
        assert_eq!(hsv_to_rgb(0.0, 1.0, 2.0), Rgb::RED);
    }

    #[test]
    fn test_linear_hue() {
        assert_relative_eq!(ColorMapping::Linear.hue(0.0, 100.0), 0.0);
        assert_relative_eq!(ColorMapping::Linear.hue(50.0, 100.0), 180.0);
        assert_relative_eq!(ColorMapping::Linear.hue(100.0, 100.0), 360.0);
    }

    #[test]
    fn test_log_hues_agree_and_reach_full_circle() {
        let total = 64.0;
        for position in [0.0, 3.0, 15.0, 63.0] {
            assert_relative_eq!(
                ColorMapping::Log2.hue(position, total),
                ColorMapping::Log10.hue(position, total),
                epsilon = 1e-3
            );
        }
        assert_relative_eq!(ColorMapping::Log2.hue(63.0, total), 360.0, epsilon = 1e-3);
    }

    #[test]
    fn test_degenerate_totals_give_zero_hue() {
        assert_eq!(ColorMapping::Log2.hue(0.0, 1.0), 0.0);
        assert_eq!(ColorMapping::Linear.hue(3.0, 0.0), 0.0);
        assert_eq!(ColorMapping::Log10.hue(f32::NAN, 10.0), 0.0);
    }

    #[test]
    fn test_color_mapping_from_str() {
        assert_eq!("LOG2".parse::<ColorMapping>(), Ok(ColorMapping::Log2));
        assert!("cubic".parse::<ColorMapping>().is_err());
    }

    #[test]
    fn test_color_mapping_serializes_by_name() {
        let json = serde_json::to_string(&ColorMapping::Log10).unwrap();
        assert_eq!(json, "\"Log10\"");
    }
}
