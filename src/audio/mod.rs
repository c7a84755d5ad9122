mod accumulator;
mod analyzer;
mod capture;
mod fft;
mod sine;

pub use accumulator::{hop_size, SpectrumAccumulator, DEFAULT_MIN_STEP};
pub use analyzer::{AnalyzerError, AnalyzerSettings, SpectrumAnalyzer};
pub use capture::{
    list_sources, CaptureDevice, CaptureError, CaptureSettings, Interrupter, PulseDevice,
    SampleFormat,
};
pub use fft::{
    amplitude_to_db, band_bin_ranges, band_edges, band_labels, bin_statistics, normalize_db,
    BinStatistics, SpectrumFrame, SpectrumProcessor, SpectrumSettings, Thresholds, BAND_CENTERS,
    BAND_COUNT,
};
pub use sine::SineDevice;

use crate::signal::{self, Signal, SignalError, SignalRegistry};
use crate::watchdog::WatchdogTimer;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelType {
    Left,
    Right,
}

/// Split interleaved stereo samples into left and right vectors.
pub fn deinterleave(interleaved: &[i32]) -> (Vec<i32>, Vec<i32>) {
    let frames = interleaved.len() / 2;
    let mut left = Vec::with_capacity(frames);
    let mut right = Vec::with_capacity(frames);
    for frame in interleaved.chunks_exact(2) {
        left.push(frame[0]);
        right.push(frame[1]);
    }
    (left, right)
}

struct RunningCapture {
    /// Set on stop; publishing happens under this lock.
    stopped: Arc<Mutex<bool>>,
    interrupter: Option<Interrupter>,
    /// Disconnects when the capture thread exits.
    done: Receiver<()>,
    thread: JoinHandle<()>,
    label: &'static str,
}

/// Publishes captured stereo audio to the microphone channel signals.
///
/// Only one capture runs at a time: starting a new one stops the previous.
pub struct AudioSource {
    left: Signal<Vec<i32>>,
    right: Signal<Vec<i32>>,
    watchdog: Option<WatchdogTimer>,
    running: Option<RunningCapture>,
}

impl AudioSource {
    pub fn new(registry: &SignalRegistry) -> Result<Self, SignalError> {
        Ok(Self {
            left: registry.get(signal::MICROPHONE_LEFT)?,
            right: registry.get(signal::MICROPHONE_RIGHT)?,
            watchdog: None,
            running: None,
        })
    }

    /// Feed `timer` after every successful read.
    pub fn with_watchdog(mut self, timer: WatchdogTimer) -> Self {
        self.watchdog = Some(timer);
        self
    }

    /// Open the configured PulseAudio source and start capturing.
    pub fn start_microphone(&mut self, settings: &CaptureSettings) -> Result<(), CaptureError> {
        self.stop();
        let device = PulseDevice::open(settings)?;
        self.start_device("microphone", Box::new(device), settings.frames_per_read)
    }

    /// Publish a synthetic sine tone instead of live audio.
    pub fn start_sine(
        &mut self,
        frequency: f32,
        amplitude: f32,
        settings: &CaptureSettings,
    ) -> Result<(), CaptureError> {
        info!("Starting sine source: {} Hz at {:.2} of full scale", frequency, amplitude);
        let device = SineDevice::new(
            frequency,
            amplitude,
            settings.sample_format.max_value(),
            settings.sample_rate,
        );
        self.start_device("sine", Box::new(device), settings.frames_per_read)
    }

    /// Start a capture thread reading `frames_per_read` stereo frames per iteration.
    pub fn start_device(
        &mut self,
        label: &'static str,
        device: Box<dyn CaptureDevice>,
        frames_per_read: usize,
    ) -> Result<(), CaptureError> {
        self.stop();

        let stopped = Arc::new(Mutex::new(false));
        let interrupter = device.interrupter();
        let left = self.left.clone();
        let right = self.right.clone();
        let watchdog = self.watchdog.clone();
        let thread_stopped = stopped.clone();
        let frames = frames_per_read.max(1);
        let (done_tx, done) = bounded::<()>(0);

        let thread = thread::Builder::new()
            .name(format!("capture-{}", label))
            .spawn(move || {
                let _done = done_tx;
                capture_loop(device, frames, left, right, thread_stopped, watchdog)
            })
            .map_err(|e| CaptureError::Device(format!("Failed to spawn capture thread: {}", e)))?;

        info!("Audio source started ({})", label);
        self.running = Some(RunningCapture {
            stopped,
            interrupter,
            done,
            thread,
            label,
        });
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Stop capturing. No samples are published once this returns.
    ///
    /// A read that cannot be interrupted and stays blocked past
    /// [`STOP_TIMEOUT`] is left to finish on its own thread.
    pub fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        *running.stopped.lock() = true;
        if let Some(interrupt) = &running.interrupter {
            interrupt();
        }
        match running.done.recv_timeout(STOP_TIMEOUT) {
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "Capture thread ({}) still blocked in a read, detaching it",
                    running.label
                );
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if running.thread.join().is_err() {
                    error!("Capture thread ({}) panicked", running.label);
                }
            }
        }
        info!("Audio source stopped ({})", running.label);
    }
}

impl Drop for AudioSource {
    fn drop(&mut self) {
        self.stop();
    }
}

const RECOVERY_BACKOFF: Duration = Duration::from_millis(100);

/// How long [`AudioSource::stop`] waits for the capture thread to exit.
pub const STOP_TIMEOUT: Duration = Duration::from_millis(500);

fn capture_loop(
    mut device: Box<dyn CaptureDevice>,
    frames: usize,
    left: Signal<Vec<i32>>,
    right: Signal<Vec<i32>>,
    stopped: Arc<Mutex<bool>>,
    watchdog: Option<WatchdogTimer>,
) {
    let mut buffer = vec![0i32; frames * 2];

    while !*stopped.lock() {
        match device.read(&mut buffer) {
            Ok(()) => {}
            Err(CaptureError::Aborted) => break,
            Err(e) => {
                warn!("{}", e);
                if let Err(e) = device.recover() {
                    error!("Capture recovery failed: {}", e);
                    thread::sleep(RECOVERY_BACKOFF);
                }
                continue;
            }
        }

        let (l, r) = deinterleave(&buffer);
        {
            let stopped = stopped.lock();
            if *stopped {
                break;
            }
            left.set(l);
            right.set(r);
        }

        if let Some(timer) = &watchdog {
            timer.feed();
        }
    }
    debug!("Stop flag set, ending capture loop");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::SignalOptions;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn registry_with_mics() -> SignalRegistry {
        let registry = SignalRegistry::new();
        registry
            .create::<Vec<i32>>(signal::MICROPHONE_LEFT, SignalOptions::local())
            .unwrap();
        registry
            .create::<Vec<i32>>(signal::MICROPHONE_RIGHT, SignalOptions::local())
            .unwrap();
        registry
    }

    /// Replays scripted read results, then idles until stopped.
    struct ScriptedDevice {
        script: VecDeque<Result<i32, CaptureError>>,
        recoveries: Arc<AtomicUsize>,
    }

    impl CaptureDevice for ScriptedDevice {
        fn read(&mut self, buffer: &mut [i32]) -> Result<(), CaptureError> {
            match self.script.pop_front() {
                Some(Ok(value)) => {
                    buffer.fill(value);
                    Ok(())
                }
                Some(Err(e)) => Err(e),
                None => {
                    thread::sleep(Duration::from_millis(5));
                    Err(CaptureError::Read("idle".into()))
                }
            }
        }

        fn recover(&mut self) -> Result<(), CaptureError> {
            self.recoveries.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Delivers one buffer, then blocks until released, with no interrupter.
    struct StuckDevice {
        delivered: bool,
        release: crossbeam_channel::Receiver<i32>,
    }

    impl CaptureDevice for StuckDevice {
        fn read(&mut self, buffer: &mut [i32]) -> Result<(), CaptureError> {
            if !self.delivered {
                self.delivered = true;
                buffer.fill(1);
                return Ok(());
            }
            match self.release.recv() {
                Ok(value) => {
                    buffer.fill(value);
                    Ok(())
                }
                Err(_) => Err(CaptureError::Aborted),
            }
        }

        fn recover(&mut self) -> Result<(), CaptureError> {
            Ok(())
        }
    }

    #[test]
    fn test_deinterleave_splits_channels() {
        let (left, right) = deinterleave(&[1, -1, 2, -2, 3, -3]);
        assert_eq!(left, vec![1, 2, 3]);
        assert_eq!(right, vec![-1, -2, -3]);
    }

    #[test]
    fn test_deinterleave_ignores_trailing_half_frame() {
        let (left, right) = deinterleave(&[1, 2, 3]);
        assert_eq!(left, vec![1]);
        assert_eq!(right, vec![2]);
    }

    #[test]
    fn test_missing_signals_are_fatal() {
        let registry = SignalRegistry::new();
        assert!(matches!(
            AudioSource::new(&registry),
            Err(SignalError::NotFound(_))
        ));
    }

    #[test]
    fn test_read_error_recovers_and_continues() {
        let registry = registry_with_mics();
        let left: Signal<Vec<i32>> = registry.get(signal::MICROPHONE_LEFT).unwrap();
        let received = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let _sub = {
            let received = received.clone();
            left.subscribe(move |samples, _| received.lock().push(samples[0]))
        };

        let recoveries = Arc::new(AtomicUsize::new(0));
        let device = ScriptedDevice {
            script: VecDeque::from(vec![
                Ok(1),
                Err(CaptureError::Read("overrun".into())),
                Ok(2),
            ]),
            recoveries: recoveries.clone(),
        };

        let mut source = AudioSource::new(&registry).unwrap();
        source.start_device("scripted", Box::new(device), 4).unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while received.lock().len() < 2 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
        source.stop();

        assert_eq!(*received.lock(), vec![1, 2]);
        assert!(recoveries.load(Ordering::SeqCst) >= 1);
        assert!(!source.is_running());
    }

    #[test]
    fn test_stop_does_not_hang_on_blocked_read() {
        let registry = registry_with_mics();
        let left: Signal<Vec<i32>> = registry.get(signal::MICROPHONE_LEFT).unwrap();
        let received = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let _sub = {
            let received = received.clone();
            left.subscribe(move |samples, _| received.lock().push(samples[0]))
        };

        let (release, release_rx) = crossbeam_channel::bounded::<i32>(1);
        let device = StuckDevice {
            delivered: false,
            release: release_rx,
        };
        let mut source = AudioSource::new(&registry).unwrap();
        source.start_device("stuck", Box::new(device), 4).unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while received.lock().is_empty() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }

        let started = std::time::Instant::now();
        source.stop();
        assert!(started.elapsed() < STOP_TIMEOUT + Duration::from_secs(1));
        assert!(!source.is_running());

        // The detached read completes after stop and must not publish
        release.send(7).unwrap();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(*received.lock(), vec![1]);
    }

    #[test]
    fn test_watchdog_fed_on_successful_reads() {
        let registry = registry_with_mics();
        let watchdog = crate::watchdog::Watchdog::start(None, Duration::from_secs(60)).unwrap();
        let timer = watchdog.create_timer(Duration::from_millis(30));
        thread::sleep(Duration::from_millis(40));
        assert!(!timer.is_alive());

        let settings = CaptureSettings {
            frames_per_read: 48,
            ..CaptureSettings::default()
        };
        let mut source = AudioSource::new(&registry).unwrap().with_watchdog(timer.clone());
        source.start_sine(440.0, 0.5, &settings).unwrap();
        thread::sleep(Duration::from_millis(20));
        assert!(timer.is_alive());
        source.stop();
    }
}
