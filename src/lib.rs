//! Real-time audio spectrum analysis driving an addressable LED matrix.
//!
//! Audio capture publishes raw samples on [`signal::Signal`]s, the spectrum
//! analyzer turns them into band levels and peak-bin statistics, animations
//! render those into a [`grid::PixelGrid`], and the LED renderer streams the
//! grid to an APA102 strip. Every signal can be mirrored to websocket clients.

pub mod animation;
pub mod audio;
pub mod catalog;
pub mod cli;
pub mod color;
pub mod config;
pub mod grid;
pub mod led;
pub mod network;
pub mod ring_buffer;
pub mod signal;
pub mod system_monitor;
pub mod timing;
pub mod watchdog;
