use crate::animation::AnimationKind;
use crate::color::ColorMapping;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug, Default)]
#[command(name = "soundstrip")]
#[command(author, version, about = "Audio spectrum analyzer driving an LED matrix")]
pub struct Args {
    /// Config file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Write a commented config template to the default path and exit
    #[arg(long)]
    pub init_config: bool,

    /// List PulseAudio capture sources and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Log filter, e.g. "debug" or "soundstrip=trace"
    #[arg(long)]
    pub log_level: Option<String>,

    /// Capture device name
    #[arg(short, long)]
    pub device: Option<String>,

    /// Capture sample rate in Hz
    #[arg(long)]
    pub sample_rate: Option<u32>,

    /// Use a synthetic sine tone at this frequency instead of the microphone
    #[arg(long)]
    pub sine: Option<f32>,

    /// Animation: bars or rainbow
    #[arg(short, long)]
    pub animation: Option<AnimationKind>,

    /// Animation frame rate override
    #[arg(long)]
    pub frame_rate: Option<f32>,

    /// Hue mapping for the rainbow animation: linear, log2, log10
    #[arg(long)]
    pub color_mapping: Option<ColorMapping>,

    /// Grid width in pixels
    #[arg(long)]
    pub width: Option<usize>,

    /// Grid height in pixels
    #[arg(long)]
    pub height: Option<usize>,

    /// SPI device driving the LED strip
    #[arg(long)]
    pub spi_device: Option<PathBuf>,

    /// Software brightness (0.0-1.0)
    #[arg(long)]
    pub brightness: Option<f32>,

    /// Websocket bind address
    #[arg(long)]
    pub bind: Option<SocketAddr>,

    /// Disable the websocket server
    #[arg(long)]
    pub no_server: bool,

    /// Hardware watchdog device; enables the watchdog
    #[arg(long)]
    pub watchdog_device: Option<PathBuf>,
}
