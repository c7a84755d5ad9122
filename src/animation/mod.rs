mod bars;
mod rainbow;

pub use bars::SpectrumBars;
pub use rainbow::ScrollingRainbow;

use crate::grid::PixelGrid;
use crate::signal::{SignalError, SignalRegistry};
use crate::timing::{FrameClock, FrameStats};
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{info, warn};

/// One animation variant: advances the grid by one frame per tick.
pub trait Animation: Send {
    fn name(&self) -> &'static str;

    /// Ticks per second.
    fn frame_rate(&self) -> f32;

    /// Compute the next frame from the current signal values.
    fn render_frame(&mut self, grid: &PixelGrid);
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AnimationKind {
    #[default]
    Bars,
    Rainbow,
}

impl FromStr for AnimationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bars" | "spectrum" => Ok(Self::Bars),
            "rainbow" | "scroll" => Ok(Self::Rainbow),
            _ => Err(format!("Unknown animation: {}", s)),
        }
    }
}

impl AnimationKind {
    /// Build the variant, resolving the signals it reads.
    ///
    /// `frame_rate` overrides the variant's default rate when set.
    pub fn build(
        self,
        registry: &SignalRegistry,
        frame_rate: Option<f32>,
    ) -> Result<Box<dyn Animation>, SignalError> {
        Ok(match self {
            AnimationKind::Bars => {
                let mut bars = SpectrumBars::new(registry)?;
                if let Some(rate) = frame_rate {
                    bars = bars.with_frame_rate(rate);
                }
                Box::new(bars)
            }
            AnimationKind::Rainbow => {
                let mut rainbow = ScrollingRainbow::new(registry)?;
                if let Some(rate) = frame_rate {
                    rainbow = rainbow.with_frame_rate(rate);
                }
                Box::new(rainbow)
            }
        })
    }
}

/// Drives one animation on its own thread at the animation's frame rate.
///
/// Each tick renders into the grid, publishes it with [`PixelGrid::notify`],
/// then sleeps for whatever is left of the frame period.
pub struct AnimationRunner {
    name: &'static str,
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl AnimationRunner {
    pub fn start(mut animation: Box<dyn Animation>, grid: Arc<PixelGrid>) -> std::io::Result<Self> {
        let name = animation.name();
        let (stop_tx, stop_rx) = bounded::<()>(0);

        let thread = thread::Builder::new()
            .name(format!("animation-{}", name))
            .spawn(move || {
                let mut clock = FrameClock::from_rate(animation.frame_rate());
                let mut stats = FrameStats::new(format!("Animation {}", name), 256);
                loop {
                    clock.begin();
                    animation.render_frame(&grid);
                    grid.notify();
                    stats.record(clock.elapsed());

                    match stop_rx.recv_timeout(clock.remaining()) {
                        Err(RecvTimeoutError::Timeout) => {}
                        _ => break,
                    }
                }
            })?;

        info!("Animation started: {}", name);
        Ok(Self {
            name,
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Stop after the frame in progress and join the thread.
    pub fn stop(&mut self) {
        self.stop_tx.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Animation thread {} panicked", self.name);
            }
            info!("Animation stopped: {}", self.name);
        }
    }
}

impl Drop for AnimationRunner {
    fn drop(&mut self) {
        self.stop();
    }
}
