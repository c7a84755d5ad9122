use parking_lot::Mutex;
use soundstrip::color::{hsv_to_rgb, Rgb};
use soundstrip::grid::{create_grid_signal, PixelGrid};
use soundstrip::led::{encode_frame, LedError, LedRenderer, LedSink, Pixel, RendererSettings};
use soundstrip::signal::{self, SignalOptions, SignalRegistry};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Clone, Default)]
struct CapturingSink {
    frames: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl LedSink for CapturingSink {
    fn write_frame(&mut self, frame: &[u8]) -> Result<usize, LedError> {
        self.frames.lock().push(frame.to_vec());
        Ok(frame.len())
    }
}

#[test]
fn test_primary_hues() {
    assert_eq!(hsv_to_rgb(0.0, 1.0, 1.0), Rgb::new(255, 0, 0));
    assert_eq!(hsv_to_rgb(120.0, 1.0, 1.0), Rgb::new(0, 255, 0));
    assert_eq!(hsv_to_rgb(240.0, 1.0, 1.0), Rgb::new(0, 0, 255));
    assert_eq!(hsv_to_rgb(360.0, 1.0, 1.0), Rgb::new(255, 0, 0));
}

#[test]
fn test_zero_brightness_frames_are_dark() {
    let pixels = vec![Pixel::new(Rgb::new(255, 255, 255), 1.0, 31); 3];

    let dark = encode_frame(&pixels, 0.0, 31);
    for led in dark[4..16].chunks(4) {
        assert_eq!(led, &[0xFF, 0, 0, 0]);
    }

    let no_current = encode_frame(&pixels, 1.0, 0);
    for led in no_current[4..16].chunks(4) {
        assert_eq!(led, &[0xE0, 255, 255, 255]);
    }
    assert_eq!(&no_current[16..], &[0xFF]);
}

#[test]
fn test_renderer_goes_dark_after_user_brightness_zero() {
    let registry = SignalRegistry::new();
    let grid_signal = create_grid_signal(&registry, None, 4, 2).unwrap();
    registry
        .create_with(signal::LED_USER_BRIGHTNESS, 1.0f32, SignalOptions::local())
        .unwrap();
    let grid = PixelGrid::new(4, 2, grid_signal);
    grid.clear(Rgb::new(200, 100, 50));
    grid.notify();

    let sink = CapturingSink::default();
    let frames = sink.frames.clone();
    let settings = RendererSettings {
        render_rate_hz: 200.0,
        ..RendererSettings::default()
    };
    let mut renderer = LedRenderer::start(&registry, Box::new(sink), settings).unwrap();
    renderer.set_user_global_brightness(0.0);

    let seen_before = frames.lock().len();
    let deadline = Instant::now() + Duration::from_secs(2);
    while frames.lock().len() < seen_before + 2 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    renderer.stop();

    let frames = frames.lock();
    let last = frames.last().expect("renderer wrote no frames");
    assert_eq!(last.len(), 4 + 8 * 4 + 1);
    for led in last[4..36].chunks(4) {
        assert_eq!(&led[1..], &[0, 0, 0]);
        assert_eq!(led[0], 0xFF);
    }
}
