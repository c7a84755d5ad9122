use libpulse_binding as pulse;
use libpulse_simple_binding as psimple;
use pulse::def::BufferAttr;
use pulse::sample::{Format, Spec};
use pulse::stream::Direction;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture device error: {0}")]
    Device(String),

    #[error("capture read failed: {0}")]
    Read(String),

    /// The read was interrupted because the source is stopping.
    #[error("capture aborted")]
    Aborted,
}

/// Integer sample container delivered by the capture device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    /// 24-bit samples in the low bits of a 32-bit little-endian word.
    #[default]
    S24,
    /// 32-bit little-endian samples.
    S32,
}

impl SampleFormat {
    /// Largest representable sample magnitude; used to normalize to [-1, 1].
    pub fn max_value(self) -> i32 {
        match self {
            SampleFormat::S24 => (1 << 23) - 1,
            SampleFormat::S32 => i32::MAX,
        }
    }

    fn pulse_format(self) -> Format {
        match self {
            SampleFormat::S24 => Format::S24_32le,
            SampleFormat::S32 => Format::S32le,
        }
    }

    fn decode(self, bytes: [u8; 4]) -> i32 {
        let raw = i32::from_le_bytes(bytes);
        match self {
            SampleFormat::S24 => (raw << 8) >> 8,
            SampleFormat::S32 => raw,
        }
    }
}

impl std::str::FromStr for SampleFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "s24" | "s24_le" | "s24_32le" => Ok(SampleFormat::S24),
            "s32" | "s32_le" | "s32le" => Ok(SampleFormat::S32),
            _ => Err(format!("Unknown sample format: {}", s)),
        }
    }
}

/// Device parameters for live capture.
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    /// PulseAudio source name; `None` uses the server default.
    pub device: Option<String>,
    pub sample_rate: u32,
    /// Stereo frames per blocking read.
    pub frames_per_read: usize,
    pub sample_format: SampleFormat,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: 48_000,
            frames_per_read: 1024,
            sample_format: SampleFormat::S24,
        }
    }
}

/// Forces an in-flight blocking read to return [`CaptureError::Aborted`].
pub type Interrupter = Arc<dyn Fn() + Send + Sync>;

/// Blocking source of interleaved stereo frames.
pub trait CaptureDevice: Send + 'static {
    /// Fill `buffer` with interleaved `[left, right, left, right, ..]` samples.
    fn read(&mut self, buffer: &mut [i32]) -> Result<(), CaptureError>;

    /// Reset the stream after a failed read.
    fn recover(&mut self) -> Result<(), CaptureError>;

    /// Handle that can abort a blocked read from another thread, if supported.
    fn interrupter(&self) -> Option<Interrupter> {
        None
    }
}

/// List available PulseAudio/PipeWire sources.
///
/// Returns a list of `(name, state)` tuples parsed from `pactl list short sources`.
pub fn list_sources() -> Result<Vec<(String, String)>, CaptureError> {
    let output = std::process::Command::new("pactl")
        .args(["list", "short", "sources"])
        .output()
        .map_err(|e| CaptureError::Device(format!("Failed to run pactl: {}", e)))?;

    if !output.status.success() {
        return Err(CaptureError::Device(
            "pactl list short sources failed".to_string(),
        ));
    }

    let text = String::from_utf8_lossy(&output.stdout);
    Ok(parse_source_list(&text))
}

fn parse_source_list(text: &str) -> Vec<(String, String)> {
    let mut sources = Vec::new();
    for line in text.lines() {
        // Format: <id>\t<name>\t<module>\t<sample_spec>\t<state>
        let cols: Vec<&str> = line.split('\t').collect();
        if cols.len() >= 5 {
            sources.push((cols[1].to_string(), cols[4].to_string()));
        }
    }
    sources
}

/// Record buffering that delivers one read's worth of frames per fragment.
///
/// The server default fragment is about two seconds, which a blocking read
/// would wait out in full.
fn record_buffer_attr(settings: &CaptureSettings) -> BufferAttr {
    let bytes = settings.frames_per_read.max(1).saturating_mul(2 * 4);
    BufferAttr {
        maxlength: u32::MAX,
        tlength: u32::MAX,
        prebuf: u32::MAX,
        minreq: u32::MAX,
        fragsize: u32::try_from(bytes).unwrap_or(u32::MAX),
    }
}

/// Stereo microphone capture through the PulseAudio simple API.
///
/// The simple API cannot abort a read from another thread, so there is no
/// interrupter. Reads return once per fragment while the source is live.
pub struct PulseDevice {
    pulse: psimple::Simple,
    format: SampleFormat,
    bytes: Vec<u8>,
}

impl PulseDevice {
    pub fn open(settings: &CaptureSettings) -> Result<Self, CaptureError> {
        let spec = Spec {
            format: settings.sample_format.pulse_format(),
            channels: 2,
            rate: settings.sample_rate,
        };

        if !spec.is_valid() {
            return Err(CaptureError::Device(
                "Invalid PulseAudio sample spec".to_string(),
            ));
        }

        info!(
            "Using audio device: {}",
            settings.device.as_deref().unwrap_or("default")
        );

        let attr = record_buffer_attr(settings);
        let pulse = psimple::Simple::new(
            None,                       // Use default server
            "soundstrip",               // Application name
            Direction::Record,          // Recording stream
            settings.device.as_deref(), // Device name (None = default)
            "microphone",               // Stream description
            &spec,                      // Sample format
            None,                       // Default channel map
            Some(&attr),                // One read per fragment
        )
        .map_err(|e| CaptureError::Device(format!("Failed to connect to PulseAudio: {:?}", e)))?;

        info!(
            "Connected to PulseAudio: {} Hz, {:?}, {} frames per read",
            settings.sample_rate, settings.sample_format, settings.frames_per_read
        );

        Ok(Self {
            pulse,
            format: settings.sample_format,
            bytes: Vec::new(),
        })
    }
}

impl CaptureDevice for PulseDevice {
    fn read(&mut self, buffer: &mut [i32]) -> Result<(), CaptureError> {
        self.bytes.resize(buffer.len() * 4, 0);
        self.pulse
            .read(&mut self.bytes)
            .map_err(|e| CaptureError::Read(format!("{:?}", e)))?;

        for (sample, chunk) in buffer.iter_mut().zip(self.bytes.chunks_exact(4)) {
            *sample = self.format.decode([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Ok(())
    }

    fn recover(&mut self) -> Result<(), CaptureError> {
        warn!("Flushing PulseAudio stream after read error");
        self.pulse
            .flush()
            .map_err(|e| CaptureError::Device(format!("Failed to flush stream: {:?}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragment_matches_one_read() {
        let settings = CaptureSettings {
            frames_per_read: 1024,
            ..CaptureSettings::default()
        };
        let attr = record_buffer_attr(&settings);
        assert_eq!(attr.fragsize, 1024 * 2 * 4);
        assert_eq!(attr.maxlength, u32::MAX);

        let empty = CaptureSettings {
            frames_per_read: 0,
            ..CaptureSettings::default()
        };
        assert_eq!(record_buffer_attr(&empty).fragsize, 8);
    }

    #[test]
    fn test_s24_sign_extension() {
        let format = SampleFormat::S24;
        assert_eq!(format.decode([0xff, 0xff, 0x7f, 0x00]), (1 << 23) - 1);
        assert_eq!(format.decode([0x00, 0x00, 0x80, 0x00]), -(1 << 23));
        assert_eq!(format.decode([0xff, 0xff, 0xff, 0x00]), -1);
    }

    #[test]
    fn test_s32_passthrough() {
        assert_eq!(SampleFormat::S32.decode((-5i32).to_le_bytes()), -5);
        assert_eq!(SampleFormat::S32.max_value(), i32::MAX);
    }

    #[test]
    fn test_sample_format_from_str() {
        assert_eq!("S24".parse::<SampleFormat>(), Ok(SampleFormat::S24));
        assert_eq!("s32le".parse::<SampleFormat>(), Ok(SampleFormat::S32));
        assert!("f32".parse::<SampleFormat>().is_err());
    }

    #[test]
    fn test_parse_source_list() {
        let text = "0\talsa_input.mic\tmodule-alsa-card.c\ts32le 2ch 48000Hz\tRUNNING\n\
                    1\tbroken line\n";
        let sources = parse_source_list(text);
        assert_eq!(
            sources,
            vec![("alsa_input.mic".to_string(), "RUNNING".to_string())]
        );
    }
}
