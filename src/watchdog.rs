//! Software liveness timers backed by the hardware watchdog.
//!
//! Components create a [`WatchdogTimer`] and feed it from their main loop. A
//! monitor thread checks every watched timer once per interval; while all of
//! them are alive it pets the watchdog device, otherwise it stops petting and
//! lets the hardware reboot the board.

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum WatchdogError {
    #[error("failed to open watchdog device {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to spawn watchdog monitor: {0}")]
    Spawn(#[source] std::io::Error),
}

struct TimerState {
    id: u64,
    timeout: Duration,
    last_feed: Mutex<Instant>,
}

/// Liveness timer; alive while fed more recently than its timeout.
#[derive(Clone)]
pub struct WatchdogTimer {
    state: Arc<TimerState>,
}

impl WatchdogTimer {
    fn new(timeout: Duration) -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self {
            state: Arc::new(TimerState {
                id: NEXT.fetch_add(1, Ordering::Relaxed),
                timeout,
                last_feed: Mutex::new(Instant::now()),
            }),
        }
    }

    pub fn feed(&self) {
        *self.state.last_feed.lock() = Instant::now();
    }

    pub fn is_alive(&self) -> bool {
        self.state.last_feed.lock().elapsed() < self.state.timeout
    }

    pub fn timeout(&self) -> Duration {
        self.state.timeout
    }
}

/// Supervisor owning the monitor thread and the set of watched timers.
pub struct Watchdog {
    watched: Arc<Mutex<Vec<WatchdogTimer>>>,
    stop_tx: Option<Sender<()>>,
    monitor: Option<JoinHandle<()>>,
}

impl Watchdog {
    /// Start monitoring. With no device the monitor only logs its verdicts.
    pub fn start(device: Option<&Path>, interval: Duration) -> Result<Self, WatchdogError> {
        let device = match device {
            Some(path) => {
                let file = OpenOptions::new().write(true).open(path).map_err(|source| {
                    WatchdogError::Open {
                        path: path.to_path_buf(),
                        source,
                    }
                })?;
                info!("Watchdog device opened: {}", path.display());
                Some(file)
            }
            None => {
                info!("Watchdog running without a device");
                None
            }
        };

        let watched: Arc<Mutex<Vec<WatchdogTimer>>> = Arc::new(Mutex::new(Vec::new()));
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let monitor_watched = watched.clone();
        let monitor = thread::Builder::new()
            .name("watchdog".into())
            .spawn(move || {
                let mut device = device;
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        _ => break,
                    }
                    let all_alive = monitor_watched.lock().iter().all(WatchdogTimer::is_alive);
                    if all_alive {
                        pet(&mut device);
                    } else {
                        error!("One or more watchdog timers not responding");
                    }
                }
                debug!("Watchdog monitor stopped");
            })
            .map_err(WatchdogError::Spawn)?;

        Ok(Self {
            watched,
            stop_tx: Some(stop_tx),
            monitor: Some(monitor),
        })
    }

    /// Create a timer that is not yet watched.
    pub fn create_timer(&self, timeout: Duration) -> WatchdogTimer {
        WatchdogTimer::new(timeout)
    }

    /// Include a timer in the liveness check; feeds it first.
    pub fn watch(&self, timer: &WatchdogTimer) {
        timer.feed();
        let mut watched = self.watched.lock();
        if !watched.iter().any(|t| t.state.id == timer.state.id) {
            watched.push(timer.clone());
        }
    }

    pub fn unwatch(&self, timer: &WatchdogTimer) {
        self.watched.lock().retain(|t| t.state.id != timer.state.id);
    }

    /// Whether every watched timer is currently alive.
    pub fn all_alive(&self) -> bool {
        self.watched.lock().iter().all(WatchdogTimer::is_alive)
    }

    pub fn stop(&mut self) {
        self.stop_tx.take();
        if let Some(handle) = self.monitor.take() {
            if handle.join().is_err() {
                warn!("Watchdog monitor thread panicked");
            }
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.stop();
    }
}

fn pet(device: &mut Option<File>) {
    if let Some(file) = device {
        if let Err(e) = file.write_all(b"V").and_then(|_| file.flush()) {
            warn!("Failed to pet watchdog: {}", e);
        }
    }
}
