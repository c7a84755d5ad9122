use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::animation::AnimationKind;
use crate::audio::{AnalyzerSettings, CaptureSettings, SampleFormat, SpectrumSettings, Thresholds};
use crate::catalog::SignalDefaults;
use crate::cli::Args;
use crate::color::ColorMapping;
use crate::led::{RendererSettings, MAX_DEVICE_BRIGHTNESS};
use crate::network::ServerSettings;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    Microphone,
    Sine,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub spectrum: SpectrumConfig,
    pub grid: GridConfig,
    pub led: LedConfig,
    pub server: ServerSettings,
    pub monitor: MonitorConfig,
    pub watchdog: WatchdogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub device: Option<String>,
    pub sample_rate: u32,
    pub frames_per_read: usize,
    pub sample_format: SampleFormat,
    pub source: SourceKind,
    pub sine_frequency: f32,
    /// Fraction of full scale.
    pub sine_amplitude: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: 48_000,
            frames_per_read: 1024,
            sample_format: SampleFormat::S24,
            source: SourceKind::Microphone,
            sine_frequency: 1000.0,
            sine_amplitude: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrumConfig {
    pub fft_size: usize,
    pub min_step: usize,
    pub mic_offset_db: f32,
    pub min_db: f32,
    pub max_db: f32,
    pub min_render_frequency: f32,
    /// Defaults to the Nyquist frequency.
    pub max_render_frequency: Option<f32>,
    pub color_mapping: ColorMapping,
}

impl Default for SpectrumConfig {
    fn default() -> Self {
        Self {
            fft_size: 8192,
            min_step: 512,
            mic_offset_db: 120.0,
            min_db: 30.0,
            max_db: 90.0,
            min_render_frequency: 0.0,
            max_render_frequency: None,
            color_mapping: ColorMapping::Linear,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub width: usize,
    pub height: usize,
    pub animation: AnimationKind,
    /// Overrides the animation's own rate.
    pub frame_rate: Option<f32>,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            width: 32,
            height: 8,
            animation: AnimationKind::Bars,
            frame_rate: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedConfig {
    /// Output is disabled when unset.
    pub spi_device: Option<PathBuf>,
    pub render_rate_hz: f32,
    pub user_brightness: f32,
    pub device_brightness: u8,
    pub pixel_brightness: f32,
    pub milliamps_per_led: f32,
    /// Dim frames whose estimated draw exceeds this.
    pub max_current_ma: Option<f32>,
}

impl Default for LedConfig {
    fn default() -> Self {
        let renderer = RendererSettings::default();
        Self {
            spi_device: None,
            render_rate_hz: renderer.render_rate_hz,
            user_brightness: renderer.user_brightness,
            device_brightness: renderer.device_brightness,
            pixel_brightness: renderer.pixel_brightness,
            milliamps_per_led: renderer.milliamps_per_led,
            max_current_ma: renderer.max_current_ma,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    /// Disk usage is reported for the filesystem holding this path.
    pub disk_path: PathBuf,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 1,
            disk_path: PathBuf::from("/"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    pub enabled: bool,
    pub device: Option<PathBuf>,
    pub interval_secs: u64,
    /// Audio capture counts as hung after this long without a read.
    pub audio_timeout_secs: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            device: None,
            interval_secs: 5,
            audio_timeout_secs: 10,
        }
    }
}

impl WatchdogConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn audio_timeout(&self) -> Duration {
        Duration::from_secs(self.audio_timeout_secs.max(1))
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        Ok(config)
    }

    /// Get the default XDG config path (~/.config/soundstrip/config.toml)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("soundstrip").join("config.toml"))
    }

    /// Load config from the default XDG path if it exists.
    /// Returns None if the file doesn't exist, logs a warning on parse errors.
    pub fn load_from_default_path() -> Option<Self> {
        let path = Self::default_path()?;
        if !path.exists() {
            return None;
        }
        match Self::load(&path) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!("{:#}. Using defaults.", e);
                None
            }
        }
    }

    /// Initialize default config file at XDG path, returns the path
    pub fn init_default_config() -> Result<PathBuf> {
        let path = Self::default_path()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        Self::write_template(&path)?;
        Ok(path)
    }

    pub fn write_template(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(path, Self::generate_config_template())
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Generate a commented TOML config template
    pub fn generate_config_template() -> String {
        r#"# Soundstrip Configuration
# This file is auto-generated. Edit as needed.

[audio]
# PulseAudio source name (omit for the default source)
# device = "alsa_input.platform-soc_sound.stereo-fallback"
sample_rate = 48000
# Stereo frames per blocking read
frames_per_read = 1024
# Sample container: "s24" (24 bits in 32) or "s32"
sample_format = "s24"
# "microphone" or "sine" (synthetic test tone)
source = "microphone"
sine_frequency = 1000.0
# Fraction of full scale (0.0-1.0)
sine_amplitude = 0.5

[spectrum]
# Analysis window in samples (power of two)
fft_size = 8192
# Minimum advance between windows in samples
min_step = 512
# Calibration offset added to every dB value
mic_offset_db = 120.0
# dB range mapped onto 0.0-1.0
min_db = 30.0
max_db = 90.0
# Frequency range used for peak-bin statistics (Hz)
min_render_frequency = 0.0
# max_render_frequency = 24000.0
# Hue mapping for the rainbow animation: "linear", "log2", "log10"
color_mapping = "linear"

[grid]
width = 32
height = 8
# "bars" or "rainbow"
animation = "bars"
# frame_rate = 60.0

[led]
# SPI device for the APA102 strip (omit to disable LED output)
# spi_device = "/dev/spidev0.0"
render_rate_hz = 100.0
# Software brightness (0.0-1.0)
user_brightness = 1.0
# Hardware brightness limit (0-31)
device_brightness = 31
pixel_brightness = 1.0
# Full-white current per LED, for the current estimate
milliamps_per_led = 20.0
# Dim frames whose estimated draw exceeds this many milliamps
# max_current_ma = 2000.0

[server]
enabled = true
bind = "0.0.0.0:8080"
# Messages buffered per client before new ones are dropped
outbound_queue = 500

[monitor]
enabled = true
interval_secs = 1
disk_path = "/"

[watchdog]
enabled = false
# device = "/dev/watchdog"
interval_secs = 5
audio_timeout_secs = 10
"#
        .to_string()
    }

    /// Merge CLI arguments into config (CLI takes priority)
    pub fn merge_args(&mut self, args: &Args) {
        // Audio settings
        if let Some(ref device) = args.device {
            self.audio.device = Some(device.clone());
        }
        if let Some(rate) = args.sample_rate {
            self.audio.sample_rate = rate;
        }
        if let Some(frequency) = args.sine {
            self.audio.source = SourceKind::Sine;
            self.audio.sine_frequency = frequency;
        }

        // Spectrum settings
        if let Some(mapping) = args.color_mapping {
            self.spectrum.color_mapping = mapping;
        }

        // Grid settings
        if let Some(animation) = args.animation {
            self.grid.animation = animation;
        }
        if let Some(rate) = args.frame_rate {
            self.grid.frame_rate = Some(rate);
        }
        if let Some(width) = args.width {
            self.grid.width = width;
        }
        if let Some(height) = args.height {
            self.grid.height = height;
        }

        // LED settings
        if let Some(ref device) = args.spi_device {
            self.led.spi_device = Some(device.clone());
        }
        if let Some(brightness) = args.brightness {
            self.led.user_brightness = brightness.clamp(0.0, 1.0);
        }

        // Server settings
        if let Some(bind) = args.bind {
            self.server.bind = bind;
        }
        if args.no_server {
            self.server.enabled = false;
        }

        // Watchdog settings
        if let Some(ref device) = args.watchdog_device {
            self.watchdog.enabled = true;
            self.watchdog.device = Some(device.clone());
        }
    }

    pub fn capture_settings(&self) -> CaptureSettings {
        CaptureSettings {
            device: self.audio.device.clone(),
            sample_rate: self.audio.sample_rate,
            frames_per_read: self.audio.frames_per_read,
            sample_format: self.audio.sample_format,
        }
    }

    pub fn analyzer_settings(&self) -> AnalyzerSettings {
        AnalyzerSettings {
            spectrum: SpectrumSettings {
                fft_size: self.spectrum.fft_size,
                sample_rate: self.audio.sample_rate,
                max_value: self.audio.sample_format.max_value(),
                mic_offset_db: self.spectrum.mic_offset_db,
            },
            min_step: self.spectrum.min_step,
        }
    }

    pub fn thresholds(&self) -> Thresholds {
        let defaults = Thresholds::with_defaults(self.audio.sample_rate);
        Thresholds {
            min_db: self.spectrum.min_db,
            max_db: self.spectrum.max_db,
            min_render_frequency: self.spectrum.min_render_frequency,
            max_render_frequency: self
                .spectrum
                .max_render_frequency
                .unwrap_or(defaults.max_render_frequency),
        }
    }

    pub fn signal_defaults(&self) -> SignalDefaults {
        SignalDefaults {
            thresholds: self.thresholds(),
            color_mapping: self.spectrum.color_mapping,
            grid_width: self.grid.width,
            grid_height: self.grid.height,
            user_brightness: self.led.user_brightness.clamp(0.0, 1.0),
            device_brightness: self.led.device_brightness.min(MAX_DEVICE_BRIGHTNESS),
        }
    }

    pub fn renderer_settings(&self) -> RendererSettings {
        RendererSettings {
            render_rate_hz: self.led.render_rate_hz,
            user_brightness: self.led.user_brightness,
            device_brightness: self.led.device_brightness,
            pixel_brightness: self.led.pixel_brightness,
            milliamps_per_led: self.led.milliamps_per_led,
            max_current_ma: self.led.max_current_ma,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_template_parses_to_defaults() {
        let parsed: Config = toml::from_str(&Config::generate_config_template()).unwrap();
        let defaults = Config::default();
        assert_eq!(parsed.audio.sample_rate, defaults.audio.sample_rate);
        assert_eq!(parsed.audio.sample_format, defaults.audio.sample_format);
        assert_eq!(parsed.spectrum.fft_size, defaults.spectrum.fft_size);
        assert_eq!(parsed.spectrum.color_mapping, ColorMapping::Linear);
        assert_eq!(parsed.grid.animation, AnimationKind::Bars);
        assert_eq!(parsed.led.device_brightness, 31);
        assert_eq!(parsed.server.bind, defaults.server.bind);
        assert_eq!(parsed.monitor.disk_path, defaults.monitor.disk_path);
        assert!(!parsed.watchdog.enabled);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[grid]\nanimation = \"rainbow\"\nwidth = 16\n\n[spectrum]\ncolor_mapping = \"log2\""
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.grid.animation, AnimationKind::Rainbow);
        assert_eq!(config.grid.width, 16);
        assert_eq!(config.grid.height, 8);
        assert_eq!(config.spectrum.color_mapping, ColorMapping::Log2);
        assert_eq!(config.audio.frames_per_read, 1024);
        assert_eq!(config.monitor.disk_path, PathBuf::from("/"));
    }

    #[test]
    fn test_load_reports_path_on_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[grid]\nwidth = \"wide\"").unwrap();
        let err = Config::load(file.path()).unwrap_err();
        assert!(
            format!("{:#}", err).contains(&file.path().display().to_string()),
            "error lacks path: {:#}",
            err
        );
    }

    #[test]
    fn test_write_template_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        Config::write_template(&path).unwrap();
        assert!(Config::load(&path).is_ok());
    }

    #[test]
    fn test_merge_args_overrides() {
        let mut config = Config::default();
        let args = Args {
            sine: Some(440.0),
            animation: Some(AnimationKind::Rainbow),
            brightness: Some(3.0),
            no_server: true,
            watchdog_device: Some(PathBuf::from("/dev/watchdog")),
            ..Args::default()
        };
        config.merge_args(&args);

        assert_eq!(config.audio.source, SourceKind::Sine);
        assert_eq!(config.audio.sine_frequency, 440.0);
        assert_eq!(config.grid.animation, AnimationKind::Rainbow);
        assert_eq!(config.led.user_brightness, 1.0);
        assert!(!config.server.enabled);
        assert!(config.watchdog.enabled);
    }

    #[test]
    fn test_thresholds_default_to_nyquist() {
        let mut config = Config::default();
        config.audio.sample_rate = 44_100;
        assert_eq!(config.thresholds().max_render_frequency, 22_050.0);
        config.spectrum.max_render_frequency = Some(8_000.0);
        assert_eq!(config.thresholds().max_render_frequency, 8_000.0);
    }

    #[test]
    fn test_analyzer_settings_follow_sample_format() {
        let mut config = Config::default();
        config.audio.sample_format = SampleFormat::S32;
        assert_eq!(config.analyzer_settings().spectrum.max_value, i32::MAX);
    }
}
