//! Startup registration of every signal the application uses.
//!
//! Components resolve their signals by name afterwards, so this must run
//! before any of them is constructed.

use crate::audio::{band_labels, BinStatistics, Thresholds};
use crate::color::ColorMapping;
use crate::grid::create_grid_signal;
use crate::led::MAX_DEVICE_BRIGHTNESS;
use crate::signal::{
    self, int_vector_encoder, json_encoder, labeled_json_encoder, NetworkSink, SignalError,
    SignalOptions, SignalRegistry, SignalValue,
};
use std::sync::Arc;
use tracing::info;

/// Initial values for the tunable signals.
#[derive(Debug, Clone, Copy)]
pub struct SignalDefaults {
    pub thresholds: Thresholds,
    pub color_mapping: ColorMapping,
    pub grid_width: usize,
    pub grid_height: usize,
    pub user_brightness: f32,
    pub device_brightness: u8,
}

impl Default for SignalDefaults {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::with_defaults(48_000),
            color_mapping: ColorMapping::default(),
            grid_width: 32,
            grid_height: 8,
            user_brightness: 1.0,
            device_brightness: MAX_DEVICE_BRIGHTNESS,
        }
    }
}

fn json<T: SignalValue>(
    registry: &SignalRegistry,
    sink: Option<&Arc<dyn NetworkSink>>,
    name: &str,
    initial: T,
) -> Result<(), SignalError> {
    registry.create_with(name, initial, SignalOptions::maybe_published(sink, json_encoder()))?;
    Ok(())
}

/// Register the full signal set, published through `sink` when given.
pub fn create_signals(
    registry: &SignalRegistry,
    sink: Option<&Arc<dyn NetworkSink>>,
    defaults: &SignalDefaults,
) -> Result<(), SignalError> {
    for name in [signal::MICROPHONE_LEFT, signal::MICROPHONE_RIGHT] {
        registry.create::<Vec<i32>>(
            name,
            SignalOptions::maybe_published(sink, int_vector_encoder()),
        )?;
    }

    let labels = band_labels();
    for name in [
        signal::BANDS_LEFT_SPL,
        signal::BANDS_RIGHT_SPL,
        signal::BANDS_LEFT_NORMALIZED,
        signal::BANDS_RIGHT_NORMALIZED,
    ] {
        registry.create::<Vec<f32>>(
            name,
            SignalOptions::maybe_published(sink, labeled_json_encoder(labels.clone())),
        )?;
    }

    for name in [
        signal::POWER_LEFT_SPL,
        signal::POWER_RIGHT_SPL,
        signal::POWER_LEFT_NORMALIZED,
        signal::POWER_RIGHT_NORMALIZED,
    ] {
        json(registry, sink, name, 0.0f32)?;
    }
    for name in [signal::BIN_DATA_LEFT, signal::BIN_DATA_RIGHT] {
        json(registry, sink, name, BinStatistics::default())?;
    }

    let t = defaults.thresholds;
    json(registry, sink, signal::MIN_DB, t.min_db)?;
    json(registry, sink, signal::MAX_DB, t.max_db)?;
    json(registry, sink, signal::MIN_RENDER_FREQUENCY, t.min_render_frequency)?;
    json(registry, sink, signal::MAX_RENDER_FREQUENCY, t.max_render_frequency)?;
    json(registry, sink, signal::COLOR_MAPPING_TYPE, defaults.color_mapping)?;

    create_grid_signal(registry, sink, defaults.grid_width, defaults.grid_height)?;

    json(registry, sink, signal::LED_USER_BRIGHTNESS, defaults.user_brightness)?;
    json(registry, sink, signal::LED_DEVICE_BRIGHTNESS, defaults.device_brightness)?;
    json(registry, sink, signal::LED_CURRENT_DRAW, 0.0f32)?;

    for name in [
        signal::CPU_USAGE,
        signal::MEMORY_USAGE,
        signal::CPU_TEMP,
        signal::LOAD_AVG,
        signal::UPTIME,
        signal::DISK_USAGE,
        signal::NETWORK_USAGE,
    ] {
        json(registry, sink, name, String::new())?;
    }

    info!("Registered {} signals", registry.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::PixelMatrix;
    use crate::signal::{Signal, WireMessage};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        messages: Mutex<Vec<(String, WireMessage)>>,
    }

    impl NetworkSink for Recorder {
        fn publish(&self, signal: &str, message: WireMessage) {
            self.messages.lock().push((signal.to_string(), message));
        }
    }

    #[test]
    fn test_every_signal_is_registered_with_its_type() {
        let registry = SignalRegistry::new();
        create_signals(&registry, None, &SignalDefaults::default()).unwrap();
        assert_eq!(registry.len(), 28);

        registry.get::<Vec<i32>>(signal::MICROPHONE_LEFT).unwrap();
        registry.get::<Vec<f32>>(signal::BANDS_RIGHT_NORMALIZED).unwrap();
        registry.get::<f32>(signal::POWER_LEFT_SPL).unwrap();
        registry.get::<BinStatistics>(signal::BIN_DATA_RIGHT).unwrap();
        registry.get::<ColorMapping>(signal::COLOR_MAPPING_TYPE).unwrap();
        registry.get::<u8>(signal::LED_DEVICE_BRIGHTNESS).unwrap();
        registry.get::<String>(signal::UPTIME).unwrap();
        registry.get::<String>(signal::NETWORK_USAGE).unwrap();

        let grid: Signal<PixelMatrix> = registry.get(signal::PIXEL_GRID).unwrap();
        assert_eq!(grid.get().len(), 8);
        assert_eq!(grid.get()[0].len(), 32);
    }

    #[test]
    fn test_tuning_defaults_are_applied() {
        let registry = SignalRegistry::new();
        let defaults = SignalDefaults {
            color_mapping: ColorMapping::Log10,
            ..SignalDefaults::default()
        };
        create_signals(&registry, None, &defaults).unwrap();
        let min_db: Signal<f32> = registry.get(signal::MIN_DB).unwrap();
        assert_eq!(min_db.get(), 30.0);
        let mapping: Signal<ColorMapping> = registry.get(signal::COLOR_MAPPING_TYPE).unwrap();
        assert_eq!(mapping.get(), ColorMapping::Log10);
    }

    #[test]
    fn test_band_signals_publish_labels() {
        let recorder = Arc::new(Recorder::default());
        let sink: Arc<dyn NetworkSink> = recorder.clone();
        let registry = SignalRegistry::new();
        create_signals(&registry, Some(&sink), &SignalDefaults::default()).unwrap();

        let bands: Signal<Vec<f32>> = registry.get(signal::BANDS_LEFT_SPL).unwrap();
        bands.set(vec![0.0; 32]);
        let messages = recorder.messages.lock();
        let (name, WireMessage::Text(text)) = &messages[0] else {
            panic!("expected a text frame");
        };
        assert_eq!(name, signal::BANDS_LEFT_SPL);
        assert!(text.contains("\"labels\""), "got: {}", text);
        assert!(text.contains("16 Hz"), "got: {}", text);
    }

    #[test]
    fn test_registration_is_repeatable() {
        let registry = SignalRegistry::new();
        create_signals(&registry, None, &SignalDefaults::default()).unwrap();
        create_signals(&registry, None, &SignalDefaults::default()).unwrap();
        assert_eq!(registry.len(), 28);
    }
}
