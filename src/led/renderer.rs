use super::{encode_frame, estimate_current_ma, LedError, LedSink, Pixel, MAX_DEVICE_BRIGHTNESS};
use crate::grid::PixelMatrix;
use crate::signal::{self, OriginId, Signal, SignalRegistry, SignalValue, Subscription};
use crate::timing::{FrameClock, FrameStats, LogThrottle};
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

const CURRENT_REPORT_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererSettings {
    pub render_rate_hz: f32,
    /// Initial software brightness in [0, 1].
    pub user_brightness: f32,
    /// Initial hardware brightness limit in [0, 31].
    pub device_brightness: u8,
    /// Brightness applied to every grid pixel before the global limits.
    pub pixel_brightness: f32,
    pub milliamps_per_led: f32,
    /// Frames estimated above this draw are dimmed to fit.
    pub max_current_ma: Option<f32>,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            render_rate_hz: 100.0,
            user_brightness: 1.0,
            device_brightness: MAX_DEVICE_BRIGHTNESS,
            pixel_brightness: 1.0,
            milliamps_per_led: 20.0,
            max_current_ma: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Brightness {
    user: f32,
    device: u8,
}

fn clamp_user(value: f32) -> Option<f32> {
    if value.is_nan() {
        None
    } else {
        Some(value.clamp(0.0, 1.0))
    }
}

/// User brightness reduced so the frame's estimated draw stays under `ceiling`.
fn limit_user_brightness(user: f32, full_draw_ma: f32, ceiling: f32) -> f32 {
    let drawn = full_draw_ma * user;
    if drawn > ceiling {
        user * ceiling.max(0.0) / drawn
    } else {
        user
    }
}

/// Grid contents flattened row-major: LED `y * width + x`.
fn strip_pixels(matrix: &PixelMatrix, pixel_brightness: f32) -> Vec<Pixel> {
    matrix
        .iter()
        .flatten()
        .map(|&color| Pixel::new(color, pixel_brightness, MAX_DEVICE_BRIGHTNESS))
        .collect()
}

/// Streams the pixel grid to an LED strip at a fixed rate.
///
/// Each tick snapshots the `Pixel Grid` signal, encodes the frame with the
/// current global brightness limits and writes it to the sink. Write errors
/// are logged (throttled) and the next tick tries again.
pub struct LedRenderer {
    grid: Signal<PixelMatrix>,
    brightness: Arc<Mutex<Brightness>>,
    user_signal: Option<Signal<f32>>,
    device_signal: Option<Signal<u8>>,
    origin: OriginId,
    settings: RendererSettings,
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
    _subscriptions: Vec<Subscription>,
}

impl LedRenderer {
    pub fn start(
        registry: &SignalRegistry,
        mut sink: Box<dyn LedSink>,
        settings: RendererSettings,
    ) -> Result<Self, LedError> {
        let grid: Signal<PixelMatrix> = registry.get(signal::PIXEL_GRID)?;
        let user_signal = optional::<f32>(registry, signal::LED_USER_BRIGHTNESS);
        let device_signal = optional::<u8>(registry, signal::LED_DEVICE_BRIGHTNESS);
        let current_signal = optional::<f32>(registry, signal::LED_CURRENT_DRAW);

        let brightness = Arc::new(Mutex::new(Brightness {
            user: clamp_user(settings.user_brightness).unwrap_or(1.0),
            device: settings.device_brightness.min(MAX_DEVICE_BRIGHTNESS),
        }));
        let origin = OriginId::next();
        let mut subscriptions = Vec::new();

        if let Some(user) = &user_signal {
            let brightness = brightness.clone();
            subscriptions.push(user.subscribe(move |value, from| {
                if from == Some(origin) {
                    return;
                }
                if let Some(value) = clamp_user(*value) {
                    brightness.lock().user = value;
                }
            }));
        }
        if let Some(device) = &device_signal {
            let brightness = brightness.clone();
            subscriptions.push(device.subscribe(move |value, from| {
                if from != Some(origin) {
                    brightness.lock().device = (*value).min(MAX_DEVICE_BRIGHTNESS);
                }
            }));
        }

        let (stop_tx, stop_rx) = bounded::<()>(0);
        let thread_grid = grid.clone();
        let thread_brightness = brightness.clone();

        let thread = thread::Builder::new()
            .name("led-renderer".into())
            .spawn(move || {
                let mut clock = FrameClock::from_rate(settings.render_rate_hz);
                let mut stats = FrameStats::new("LED renderer", 256);
                let throttle = LogThrottle::default();
                let mut last_report = Instant::now();

                loop {
                    clock.begin();
                    let pixels = strip_pixels(&thread_grid.get(), settings.pixel_brightness);
                    let limits = *thread_brightness.lock();
                    let user = match settings.max_current_ma {
                        Some(ceiling) => limit_user_brightness(
                            limits.user,
                            estimate_current_ma(&pixels, settings.milliamps_per_led),
                            ceiling,
                        ),
                        None => limits.user,
                    };
                    let frame = encode_frame(&pixels, user, limits.device);

                    if let Err(e) = sink.write_frame(&frame) {
                        if throttle.allow("write") {
                            error!("LED frame write failed: {}", e);
                        }
                    }

                    if last_report.elapsed() >= CURRENT_REPORT_INTERVAL {
                        if let Some(current) = &current_signal {
                            current.set(estimate_current_ma(&pixels, settings.milliamps_per_led));
                        }
                        last_report = Instant::now();
                    }
                    stats.record(clock.elapsed());

                    match stop_rx.recv_timeout(clock.remaining()) {
                        Err(RecvTimeoutError::Timeout) => {}
                        _ => break,
                    }
                }
            })?;

        let initial = *brightness.lock();
        info!(
            "LED renderer started at {} Hz (user {:.2}, device {})",
            settings.render_rate_hz, initial.user, initial.device
        );
        Ok(Self {
            grid,
            brightness,
            user_signal,
            device_signal,
            origin,
            settings,
            stop_tx: Some(stop_tx),
            thread: Some(thread),
            _subscriptions: subscriptions,
        })
    }

    /// Software brightness, clamped to [0, 1]. NaN is ignored.
    pub fn set_user_global_brightness(&self, value: f32) {
        let Some(value) = clamp_user(value) else {
            warn!("Ignoring NaN user brightness");
            return;
        };
        self.brightness.lock().user = value;
        if let Some(signal) = &self.user_signal {
            signal.set_from(value, Some(self.origin));
        }
    }

    /// Hardware brightness limit, clamped to [0, 31].
    pub fn set_device_global_brightness(&self, value: u8) {
        let value = value.min(MAX_DEVICE_BRIGHTNESS);
        self.brightness.lock().device = value;
        if let Some(signal) = &self.device_signal {
            signal.set_from(value, Some(self.origin));
        }
    }

    pub fn user_global_brightness(&self) -> f32 {
        self.brightness.lock().user
    }

    pub fn device_global_brightness(&self) -> u8 {
        self.brightness.lock().device
    }

    /// Current estimate for the grid as it is now, in milliamps.
    pub fn estimate_current(&self) -> f32 {
        let pixels = strip_pixels(&self.grid.get(), self.settings.pixel_brightness);
        estimate_current_ma(&pixels, self.settings.milliamps_per_led)
    }

    pub fn stop(&mut self) {
        self.stop_tx.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("LED renderer thread panicked");
            }
            info!("LED renderer stopped");
        }
    }
}

impl Drop for LedRenderer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn optional<T: SignalValue>(registry: &SignalRegistry, name: &str) -> Option<Signal<T>> {
    match registry.get(name) {
        Ok(signal) => Some(signal),
        Err(e) => {
            warn!("{}, LED renderer runs without it", e);
            None
        }
    }
}
