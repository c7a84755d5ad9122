use super::capture::{CaptureDevice, CaptureError, Interrupter};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use std::f64::consts::TAU;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Synthetic stereo source producing a phase-continuous sine tone in real time.
pub struct SineDevice {
    frequency: f64,
    amplitude: f64,
    sample_rate: u32,
    phase: f64,
    next_deadline: Option<Instant>,
    wake_rx: Receiver<()>,
    interrupter: Interrupter,
}

impl SineDevice {
    /// `amplitude` is a fraction of `max_value` in [0, 1].
    pub fn new(frequency: f32, amplitude: f32, max_value: i32, sample_rate: u32) -> Self {
        let (wake_tx, wake_rx) = bounded::<()>(1);
        let amplitude = f64::from(amplitude.clamp(0.0, 1.0)) * f64::from(max_value);
        Self {
            frequency: f64::from(frequency),
            amplitude,
            sample_rate: sample_rate.max(1),
            phase: 0.0,
            next_deadline: None,
            wake_rx,
            interrupter: Arc::new(move || {
                let _ = wake_tx.try_send(());
            }),
        }
    }

    /// Fill `buffer` with the next interleaved frames without pacing.
    pub fn generate(&mut self, buffer: &mut [i32]) {
        let step = TAU * self.frequency / f64::from(self.sample_rate);
        for frame in buffer.chunks_exact_mut(2) {
            let value = (self.amplitude * self.phase.sin()).round() as i32;
            frame[0] = value;
            frame[1] = value;
            self.phase = (self.phase + step) % TAU;
        }
    }
}

impl CaptureDevice for SineDevice {
    fn read(&mut self, buffer: &mut [i32]) -> Result<(), CaptureError> {
        let frames = (buffer.len() / 2) as f64;
        let period = Duration::from_secs_f64(frames / f64::from(self.sample_rate));
        let deadline = self.next_deadline.unwrap_or_else(Instant::now) + period;

        let timeout = deadline.saturating_duration_since(Instant::now());
        match self.wake_rx.recv_timeout(timeout) {
            Ok(()) => return Err(CaptureError::Aborted),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return Err(CaptureError::Aborted),
        }

        // Fall back to wall clock after a long stall instead of bursting to catch up.
        let now = Instant::now();
        self.next_deadline = Some(if now > deadline + period { now } else { deadline });

        self.generate(buffer);
        Ok(())
    }

    fn recover(&mut self) -> Result<(), CaptureError> {
        self.next_deadline = None;
        Ok(())
    }

    fn interrupter(&self) -> Option<Interrupter> {
        Some(self.interrupter.clone())
    }
}
