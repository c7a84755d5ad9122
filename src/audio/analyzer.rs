use super::accumulator::{hop_size, SpectrumAccumulator, DEFAULT_MIN_STEP};
use super::fft::{BinStatistics, SpectrumFrame, SpectrumProcessor, SpectrumSettings, Thresholds};
use super::ChannelType;
use crate::signal::{self, Signal, SignalError, SignalRegistry, Subscription};
use crossbeam_channel::{select, unbounded, Receiver, Sender, TryRecvError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error(transparent)]
    Signal(#[from] SignalError),

    #[error("failed to spawn spectrum worker: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Fixed analyzer parameters.
#[derive(Debug, Clone, Copy)]
pub struct AnalyzerSettings {
    pub spectrum: SpectrumSettings,
    /// Minimum advance between windows, in samples.
    pub min_step: usize,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            spectrum: SpectrumSettings::default(),
            min_step: DEFAULT_MIN_STEP,
        }
    }
}

struct Packet {
    samples: Vec<i32>,
    channel: ChannelType,
}

/// Output signals for one channel.
#[derive(Clone)]
struct ChannelOutputs {
    bands_db: Signal<Vec<f32>>,
    bands_normalized: Signal<Vec<f32>>,
    power_db: Signal<f32>,
    power_normalized: Signal<f32>,
    bins: Signal<BinStatistics>,
}

impl ChannelOutputs {
    fn resolve(registry: &SignalRegistry, channel: ChannelType) -> Result<Self, SignalError> {
        let (bands_db, bands_normalized, power_db, power_normalized, bins) = match channel {
            ChannelType::Left => (
                signal::BANDS_LEFT_SPL,
                signal::BANDS_LEFT_NORMALIZED,
                signal::POWER_LEFT_SPL,
                signal::POWER_LEFT_NORMALIZED,
                signal::BIN_DATA_LEFT,
            ),
            ChannelType::Right => (
                signal::BANDS_RIGHT_SPL,
                signal::BANDS_RIGHT_NORMALIZED,
                signal::POWER_RIGHT_SPL,
                signal::POWER_RIGHT_NORMALIZED,
                signal::BIN_DATA_RIGHT,
            ),
        };
        Ok(Self {
            bands_db: registry.get(bands_db)?,
            bands_normalized: registry.get(bands_normalized)?,
            power_db: registry.get(power_db)?,
            power_normalized: registry.get(power_normalized)?,
            bins: registry.get(bins)?,
        })
    }

    fn publish(&self, frame: SpectrumFrame) {
        self.bands_db.set(frame.bands_db);
        self.bands_normalized.set(frame.bands_normalized);
        self.power_db.set(frame.power_db);
        self.power_normalized.set(frame.power_normalized);
        self.bins.set(frame.bins);
    }
}

/// Spectrum analysis of the two microphone channels on a dedicated worker.
///
/// Sample vectors arriving on the microphone signals are queued without
/// blocking the capture thread. The worker slides an analysis window over each
/// channel and publishes band levels, total power and bin statistics for
/// every window.
pub struct SpectrumAnalyzer {
    packet_tx: Sender<Packet>,
    stop_tx: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
    thresholds: Arc<Mutex<Thresholds>>,
    subscriptions: Vec<Subscription>,
}

impl SpectrumAnalyzer {
    /// Resolve the input and output signals and start the worker.
    ///
    /// Missing microphone or output signals are an error. Missing tuning
    /// signals fall back to defaults.
    pub fn start(
        registry: &SignalRegistry,
        settings: AnalyzerSettings,
    ) -> Result<Self, AnalyzerError> {
        let left_input: Signal<Vec<i32>> = registry.get(signal::MICROPHONE_LEFT)?;
        let right_input: Signal<Vec<i32>> = registry.get(signal::MICROPHONE_RIGHT)?;
        let left_outputs = ChannelOutputs::resolve(registry, ChannelType::Left)?;
        let right_outputs = ChannelOutputs::resolve(registry, ChannelType::Right)?;

        let thresholds = Arc::new(Mutex::new(Thresholds::with_defaults(
            settings.spectrum.sample_rate,
        )));
        let (packet_tx, packet_rx) = unbounded::<Packet>();
        let mut subscriptions = Vec::new();

        for (input, channel) in [
            (&left_input, ChannelType::Left),
            (&right_input, ChannelType::Right),
        ] {
            let tx = packet_tx.clone();
            subscriptions.push(input.subscribe(move |samples, _| {
                // Disconnected only while shutting down
                let _ = tx.send(Packet {
                    samples: samples.clone(),
                    channel,
                });
            }));
        }

        subscriptions.extend(Self::bind_tuning(registry, &thresholds));

        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
        let worker_thresholds = thresholds.clone();
        let worker = thread::Builder::new()
            .name("spectrum".into())
            .spawn(move || {
                let mut worker =
                    Worker::new(settings, worker_thresholds, left_outputs, right_outputs);
                worker.run(packet_rx, stop_rx);
            })
            .map_err(AnalyzerError::Spawn)?;

        info!(
            "Spectrum analyzer started: window {} samples, hop {} samples",
            settings.spectrum.fft_size,
            hop_size(settings.spectrum.fft_size, settings.min_step)
        );

        Ok(Self {
            packet_tx,
            stop_tx: Some(stop_tx),
            worker: Some(worker),
            thresholds,
            subscriptions,
        })
    }

    fn bind_tuning(
        registry: &SignalRegistry,
        thresholds: &Arc<Mutex<Thresholds>>,
    ) -> Vec<Subscription> {
        type Setter = fn(&mut Thresholds, f32);
        let bindings: [(&str, Setter); 4] = [
            (signal::MIN_DB, |t, v| t.min_db = v),
            (signal::MAX_DB, |t, v| t.max_db = v),
            (signal::MIN_RENDER_FREQUENCY, |t, v| t.min_render_frequency = v),
            (signal::MAX_RENDER_FREQUENCY, |t, v| t.max_render_frequency = v),
        ];

        let mut subscriptions = Vec::new();
        for (name, apply) in bindings {
            match registry.get::<f32>(name) {
                Ok(tuning) => {
                    apply(&mut thresholds.lock(), tuning.get());
                    let thresholds = thresholds.clone();
                    let name = name.to_string();
                    subscriptions.push(tuning.subscribe(move |&value, _| {
                        info!("Spectrum analyzer: {} set to {}", name, value);
                        apply(&mut thresholds.lock(), value);
                    }));
                }
                Err(e) => warn!("{}, using default", e),
            }
        }
        subscriptions
    }

    /// Queue samples for analysis without going through the input signals.
    pub fn add_data(&self, samples: Vec<i32>, channel: ChannelType) {
        let _ = self.packet_tx.send(Packet { samples, channel });
    }

    pub fn thresholds(&self) -> Thresholds {
        *self.thresholds.lock()
    }

    /// Detach from the inputs, wake the worker and wait for it to exit.
    pub fn stop(&mut self) {
        self.subscriptions.clear();
        self.stop_tx.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Spectrum worker panicked");
            }
            info!("Spectrum analyzer stopped");
        }
    }
}

impl Drop for SpectrumAnalyzer {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker {
    processor: SpectrumProcessor,
    thresholds: Arc<Mutex<Thresholds>>,
    left: (SpectrumAccumulator, ChannelOutputs),
    right: (SpectrumAccumulator, ChannelOutputs),
}

impl Worker {
    fn new(
        settings: AnalyzerSettings,
        thresholds: Arc<Mutex<Thresholds>>,
        left: ChannelOutputs,
        right: ChannelOutputs,
    ) -> Self {
        let window = settings.spectrum.fft_size;
        let hop = hop_size(window, settings.min_step);
        Self {
            processor: SpectrumProcessor::new(settings.spectrum),
            thresholds,
            left: (SpectrumAccumulator::new(window, hop), left),
            right: (SpectrumAccumulator::new(window, hop), right),
        }
    }

    fn run(&mut self, packets: Receiver<Packet>, stop: Receiver<()>) {
        loop {
            if let Err(TryRecvError::Disconnected) = stop.try_recv() {
                break;
            }
            select! {
                recv(packets) -> packet => match packet {
                    Ok(packet) => self.handle(packet),
                    Err(_) => break,
                },
                recv(stop) -> _ => break,
            }
        }
        debug!("Spectrum worker exiting");
    }

    fn handle(&mut self, packet: Packet) {
        let (accumulator, outputs) = match packet.channel {
            ChannelType::Left => (&mut self.left.0, &self.left.1),
            ChannelType::Right => (&mut self.right.0, &self.right.1),
        };
        accumulator.push(&packet.samples);

        while let Some(window) = accumulator.next_window() {
            let thresholds = *self.thresholds.lock();
            let frame = self.processor.process(&window, &thresholds);
            trace!(
                "{:?} channel: power {:.1} dB ({:.2}), bands {:?}",
                packet.channel,
                frame.power_db,
                frame.power_normalized,
                frame.bands_db
            );
            outputs.publish(frame);
        }
    }
}
