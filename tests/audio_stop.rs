use crossbeam_channel::{bounded, Receiver, Sender};
use soundstrip::audio::{
    AudioSource, CaptureDevice, CaptureError, CaptureSettings, Interrupter,
};
use soundstrip::signal::{self, Signal, SignalOptions, SignalRegistry};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Serves a few reads, then blocks until interrupted.
struct BlockingDevice {
    remaining: usize,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
}

impl BlockingDevice {
    fn new(reads_before_blocking: usize) -> Self {
        let (wake_tx, wake_rx) = bounded(1);
        Self {
            remaining: reads_before_blocking,
            wake_tx,
            wake_rx,
        }
    }
}

impl CaptureDevice for BlockingDevice {
    fn read(&mut self, buffer: &mut [i32]) -> Result<(), CaptureError> {
        if self.remaining > 0 {
            self.remaining -= 1;
            buffer.fill(1);
            return Ok(());
        }
        let _ = self.wake_rx.recv();
        Err(CaptureError::Aborted)
    }

    fn recover(&mut self) -> Result<(), CaptureError> {
        Ok(())
    }

    fn interrupter(&self) -> Option<Interrupter> {
        let wake = self.wake_tx.clone();
        Some(Arc::new(move || {
            let _ = wake.try_send(());
        }))
    }
}

fn setup() -> (SignalRegistry, Arc<AtomicUsize>, signal::Subscription) {
    let registry = SignalRegistry::new();
    for name in [signal::MICROPHONE_LEFT, signal::MICROPHONE_RIGHT] {
        registry
            .create::<Vec<i32>>(name, SignalOptions::local())
            .unwrap();
    }
    let writes = Arc::new(AtomicUsize::new(0));
    let left: Signal<Vec<i32>> = registry.get(signal::MICROPHONE_LEFT).unwrap();
    let sub = {
        let writes = writes.clone();
        left.subscribe(move |_, _| {
            writes.fetch_add(1, Ordering::SeqCst);
        })
    };
    (registry, writes, sub)
}

#[test]
fn test_stop_unblocks_pending_read() {
    let (registry, writes, _sub) = setup();
    let mut source = AudioSource::new(&registry).unwrap();
    source
        .start_device("blocking", Box::new(BlockingDevice::new(3)), 64)
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(2);
    while writes.load(Ordering::SeqCst) < 3 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(writes.load(Ordering::SeqCst), 3);

    let started = Instant::now();
    source.stop();
    assert!(
        started.elapsed() < Duration::from_secs(1),
        "stop took {:?}",
        started.elapsed()
    );
    assert!(!source.is_running());

    let after_stop = writes.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(50));
    assert_eq!(writes.load(Ordering::SeqCst), after_stop);
}

#[test]
fn test_sine_source_stops_promptly_and_goes_quiet() {
    let (registry, writes, _sub) = setup();
    let mut source = AudioSource::new(&registry).unwrap();
    source
        .start_sine(1000.0, 0.5, &CaptureSettings::default())
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(2);
    while writes.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert!(writes.load(Ordering::SeqCst) > 0, "sine source never published");

    let started = Instant::now();
    source.stop();
    assert!(started.elapsed() < Duration::from_secs(1));

    let after_stop = writes.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(100));
    assert_eq!(writes.load(Ordering::SeqCst), after_stop);
}

#[test]
fn test_starting_again_replaces_running_capture() {
    let (registry, _writes, _sub) = setup();
    let mut source = AudioSource::new(&registry).unwrap();
    source
        .start_device("first", Box::new(BlockingDevice::new(0)), 64)
        .unwrap();
    let started = Instant::now();
    source
        .start_device("second", Box::new(BlockingDevice::new(0)), 64)
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(source.is_running());
    source.stop();
}
