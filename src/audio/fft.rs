use rustfft::{num_complex::Complex, Fft, FftPlanner};
use serde::{Deserialize, Serialize};
use std::f32::consts::SQRT_2;
use std::sync::Arc;

/// Center frequencies of the 32 ISO-style perceptual bands, in Hz.
pub const BAND_CENTERS: [f32; 32] = [
    16.0, 20.0, 25.0, 31.5, 40.0, 50.0, 63.0, 80.0, 100.0, 125.0, 160.0, 200.0, 250.0, 315.0,
    400.0, 500.0, 630.0, 800.0, 1000.0, 1250.0, 1600.0, 2000.0, 2500.0, 3150.0, 4000.0, 5000.0,
    6300.0, 8000.0, 10000.0, 12500.0, 16000.0, 20000.0,
];

pub const BAND_COUNT: usize = BAND_CENTERS.len();

/// Floor applied to amplitudes before taking a logarithm.
const MIN_AMPLITUDE: f32 = 1e-12;

/// Display labels for the bands: `"16 Hz"`, `"31.5 Hz"`, ...
pub fn band_labels() -> Vec<String> {
    BAND_CENTERS.iter().map(|&c| format!("{} Hz", c)).collect()
}

/// Frequency edges of band `index`: midpoints between neighbouring centers,
/// and `center / √2` or `center * √2` at the two ends.
pub fn band_edges(index: usize) -> (f32, f32) {
    let center = BAND_CENTERS[index];
    let lower = if index == 0 {
        center / SQRT_2
    } else {
        (BAND_CENTERS[index - 1] + center) / 2.0
    };
    let upper = if index == BAND_COUNT - 1 {
        center * SQRT_2
    } else {
        (center + BAND_CENTERS[index + 1]) / 2.0
    };
    (lower, upper)
}

/// Inclusive magnitude-bin range covered by each band.
pub fn band_bin_ranges(fft_size: usize, sample_rate: u32) -> Vec<(usize, usize)> {
    let resolution = sample_rate as f32 / fft_size as f32;
    let last_bin = (fft_size / 2).saturating_sub(1);
    (0..BAND_COUNT)
        .map(|i| {
            let (lower, upper) = band_edges(i);
            let start = ((lower / resolution).floor() as usize).min(last_bin);
            let end = ((upper / resolution).ceil() as usize).min(last_bin);
            (start, end)
        })
        .collect()
}

/// Amplitude to calibrated dB, floored so silence stays finite.
pub fn amplitude_to_db(amplitude: f32, mic_offset_db: f32) -> f32 {
    20.0 * amplitude.max(MIN_AMPLITUDE).log10() + mic_offset_db
}

/// Map a dB value onto [0, 1] between `min_db` and `max_db`.
///
/// A non-positive range is treated as 1 dB wide. Non-finite input maps to 0.
pub fn normalize_db(db: f32, min_db: f32, max_db: f32) -> f32 {
    let mut range = max_db - min_db;
    if range.is_nan() || range <= 0.0 {
        range = 1.0;
    }
    let normalized = (db - min_db) / range;
    if normalized.is_nan() {
        return 0.0;
    }
    normalized.clamp(0.0, 1.0)
}

/// Peak and trough of the magnitude spectrum within the render frequency range.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinStatistics {
    /// First bin of the searched range.
    pub first_bin: u32,
    pub min_bin: u32,
    pub max_bin: u32,
    pub total_bins: u32,
    pub min_value: f32,
    pub max_value: f32,
    /// `max_value` in calibrated dB, normalized against the current thresholds.
    pub max_normalized: f32,
}

/// Live-tunable analysis parameters, read once per window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub min_db: f32,
    pub max_db: f32,
    pub min_render_frequency: f32,
    pub max_render_frequency: f32,
}

impl Thresholds {
    pub fn with_defaults(sample_rate: u32) -> Self {
        Self {
            min_db: 30.0,
            max_db: 90.0,
            min_render_frequency: 0.0,
            max_render_frequency: sample_rate as f32 / 2.0,
        }
    }
}

/// Fixed parameters of the transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectrumSettings {
    pub fft_size: usize,
    pub sample_rate: u32,
    /// Largest sample magnitude the device can produce.
    pub max_value: i32,
    pub mic_offset_db: f32,
}

impl Default for SpectrumSettings {
    fn default() -> Self {
        Self {
            fft_size: 8192,
            sample_rate: 48_000,
            max_value: (1 << 23) - 1,
            mic_offset_db: 120.0,
        }
    }
}

/// Everything derived from one analysis window of one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumFrame {
    pub bands_db: Vec<f32>,
    pub bands_normalized: Vec<f32>,
    pub power_db: f32,
    pub power_normalized: f32,
    pub bins: BinStatistics,
}

/// Window to bands transform. Owns the FFT plan and scratch buffers.
pub struct SpectrumProcessor {
    settings: SpectrumSettings,
    fft: Arc<dyn Fft<f32>>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    magnitudes: Vec<f32>,
    band_ranges: Vec<(usize, usize)>,
}

impl SpectrumProcessor {
    pub fn new(settings: SpectrumSettings) -> Self {
        let fft_size = settings.fft_size.max(2);
        let settings = SpectrumSettings {
            fft_size,
            sample_rate: settings.sample_rate.max(1),
            max_value: settings.max_value.max(1),
            ..settings
        };

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];

        Self {
            band_ranges: band_bin_ranges(fft_size, settings.sample_rate),
            settings,
            fft,
            buffer: vec![Complex::new(0.0, 0.0); fft_size],
            scratch,
            magnitudes: vec![0.0; fft_size / 2],
        }
    }

    pub fn settings(&self) -> &SpectrumSettings {
        &self.settings
    }

    /// Hz per magnitude bin.
    pub fn bin_resolution(&self) -> f32 {
        self.settings.sample_rate as f32 / self.settings.fft_size as f32
    }

    /// One-sided magnitude spectrum of the last processed window.
    pub fn magnitudes(&self) -> &[f32] {
        &self.magnitudes
    }

    pub fn process(&mut self, window: &[i32], thresholds: &Thresholds) -> SpectrumFrame {
        let fft_size = self.settings.fft_size;
        let scale = self.settings.max_value as f32;

        // Short windows are zero padded
        let mut sum_squares = 0.0f32;
        for (i, slot) in self.buffer.iter_mut().enumerate() {
            let sample = window.get(i).map_or(0.0, |&s| s as f32 / scale);
            sum_squares += sample * sample;
            *slot = Complex::new(sample, 0.0);
        }

        let count = window.len().min(fft_size);
        let rms = if count > 0 {
            (sum_squares / count as f32).sqrt()
        } else {
            0.0
        };
        let power_db = amplitude_to_db(rms, self.settings.mic_offset_db).max(thresholds.min_db);
        let power_normalized = normalize_db(power_db, thresholds.min_db, thresholds.max_db);

        self.fft
            .process_with_scratch(&mut self.buffer, &mut self.scratch);

        let n = fft_size as f32;
        for (magnitude, bin) in self.magnitudes.iter_mut().zip(self.buffer.iter()) {
            *magnitude = bin.norm() / n * SQRT_2;
        }

        let bands = self.band_amplitudes();
        let bands_db: Vec<f32> = bands
            .iter()
            .map(|&a| amplitude_to_db(a, self.settings.mic_offset_db))
            .collect();
        let bands_normalized = bands_db
            .iter()
            .map(|&db| normalize_db(db, thresholds.min_db, thresholds.max_db))
            .collect();

        let mut bins = bin_statistics(
            &self.magnitudes,
            self.bin_resolution(),
            thresholds.min_render_frequency,
            thresholds.max_render_frequency,
        );
        bins.max_normalized = normalize_db(
            amplitude_to_db(bins.max_value, self.settings.mic_offset_db),
            thresholds.min_db,
            thresholds.max_db,
        );

        SpectrumFrame {
            bands_db,
            bands_normalized,
            power_db,
            power_normalized,
            bins,
        }
    }

    /// RMS of the magnitudes inside each band.
    fn band_amplitudes(&self) -> Vec<f32> {
        self.band_ranges
            .iter()
            .map(|&(start, end)| {
                let bins = &self.magnitudes[start..=end];
                let sum: f32 = bins.iter().map(|m| m * m).sum();
                (sum / bins.len() as f32).sqrt()
            })
            .collect()
    }
}

fn bin_index(i: usize) -> u32 {
    u32::try_from(i).unwrap_or(u32::MAX)
}

/// Locate the weakest and strongest bins between two frequencies.
///
/// Both bounds are clamped to the valid bin range first; an empty or
/// inverted range degenerates to the single bin at the lower bound.
pub fn bin_statistics(
    magnitudes: &[f32],
    resolution: f32,
    min_frequency: f32,
    max_frequency: f32,
) -> BinStatistics {
    if magnitudes.is_empty() {
        return BinStatistics::default();
    }
    let last = magnitudes.len() - 1;
    let to_bin = |frequency: f32, round: fn(f32) -> f32| -> usize {
        let bin = round(frequency.max(0.0) / resolution);
        if bin.is_finite() {
            (bin as usize).min(last)
        } else {
            last
        }
    };
    let low = to_bin(min_frequency, f32::floor);
    let high = to_bin(max_frequency, f32::ceil).max(low);

    let mut stats = BinStatistics {
        first_bin: bin_index(low),
        min_bin: bin_index(low),
        max_bin: bin_index(low),
        total_bins: bin_index(high - low + 1),
        min_value: magnitudes[low],
        max_value: magnitudes[low],
        max_normalized: 0.0,
    };
    for (i, &value) in magnitudes.iter().enumerate().take(high + 1).skip(low) {
        if value < stats.min_value {
            stats.min_value = value;
            stats.min_bin = bin_index(i);
        }
        if value > stats.max_value {
            stats.max_value = value;
            stats.max_bin = bin_index(i);
        }
    }
    stats
}
