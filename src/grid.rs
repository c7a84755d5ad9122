//! Shared pixel matrix written by animations and read by the LED renderer.

use crate::color::Rgb;
use crate::signal::{
    self, write_binary_header, BinaryMessageType, Encoder, NetworkSink, Signal, SignalError,
    SignalOptions, SignalRegistry, WireMessage,
};
use parking_lot::Mutex;
use std::sync::Arc;

/// Row-major matrix of colors: `pixels[y][x]`.
pub type PixelMatrix = Vec<Vec<Rgb>>;

/// Binary pixel-matrix encoding: `u16` rows, `u16` cols, then flat RGB triples.
pub fn pixel_matrix_encoder() -> Encoder<PixelMatrix> {
    Arc::new(|name: &str, matrix: &PixelMatrix| {
        let rows = matrix.len().min(u16::MAX as usize);
        let cols = matrix
            .first()
            .map_or(0, |row| row.len())
            .min(u16::MAX as usize);

        let mut bytes = Vec::with_capacity(3 + name.len() + 4 + rows * cols * 3);
        write_binary_header(&mut bytes, BinaryMessageType::PixelMatrix, name);
        bytes.extend_from_slice(&(rows as u16).to_be_bytes());
        bytes.extend_from_slice(&(cols as u16).to_be_bytes());
        for row in matrix.iter().take(rows) {
            for x in 0..cols {
                let pixel = row.get(x).copied().unwrap_or_default();
                bytes.extend_from_slice(&[pixel.r, pixel.g, pixel.b]);
            }
        }
        Ok(WireMessage::Binary(bytes))
    })
}

/// Register the pixel grid signal, published with the binary matrix encoding.
pub fn create_grid_signal(
    registry: &SignalRegistry,
    sink: Option<&Arc<dyn NetworkSink>>,
    width: usize,
    height: usize,
) -> Result<Signal<PixelMatrix>, SignalError> {
    registry.create_with(
        signal::PIXEL_GRID,
        vec![vec![Rgb::BLACK; width]; height],
        SignalOptions::maybe_published(sink, pixel_matrix_encoder()),
    )
}

/// Fixed-size mutable color buffer.
///
/// Writes and reads outside the grid are ignored or return black.
/// [`PixelGrid::notify`] publishes a snapshot through the grid signal.
pub struct PixelGrid {
    width: usize,
    height: usize,
    pixels: Mutex<PixelMatrix>,
    signal: Signal<PixelMatrix>,
}

impl PixelGrid {
    pub fn new(width: usize, height: usize, signal: Signal<PixelMatrix>) -> Self {
        Self {
            width,
            height,
            pixels: Mutex::new(vec![vec![Rgb::BLACK; width]; height]),
            signal,
        }
    }

    /// Create the grid and resolve its signal from `registry`.
    pub fn from_registry(
        registry: &SignalRegistry,
        width: usize,
        height: usize,
    ) -> Result<Self, SignalError> {
        Ok(Self::new(width, height, registry.get(signal::PIXEL_GRID)?))
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn len(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn set_pixel(&self, x: usize, y: usize, color: Rgb) {
        if x < self.width && y < self.height {
            self.pixels.lock()[y][x] = color;
        }
    }

    pub fn get_value(&self, x: usize, y: usize) -> Rgb {
        if x < self.width && y < self.height {
            self.pixels.lock()[y][x]
        } else {
            Rgb::BLACK
        }
    }

    pub fn clear(&self, color: Rgb) {
        for row in self.pixels.lock().iter_mut() {
            row.fill(color);
        }
    }

    /// Apply several edits under one lock.
    pub fn update<F: FnOnce(&mut PixelMatrix)>(&self, edit: F) {
        edit(&mut self.pixels.lock());
    }

    /// Copy of the current contents.
    pub fn snapshot(&self) -> PixelMatrix {
        self.pixels.lock().clone()
    }

    /// Publish the current contents to subscribers and the network.
    pub fn notify(&self) {
        let snapshot = self.snapshot();
        self.signal.set(snapshot);
    }

    pub fn signal(&self) -> &Signal<PixelMatrix> {
        &self.signal
    }
}
