use super::LedError;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// Destination for encoded strip frames.
pub trait LedSink: Send {
    /// Write one whole frame, returning the number of bytes accepted.
    fn write_frame(&mut self, frame: &[u8]) -> Result<usize, LedError>;
}

/// spidev character device (e.g. `/dev/spidev0.0`).
///
/// Each frame is handed to the kernel in a single `write`, which the spidev
/// driver turns into one SPI transfer.
pub struct SpiSink {
    path: PathBuf,
    file: File,
}

impl SpiSink {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().write(true).open(&path)?;
        info!("Opened LED device {}", path.display());
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LedSink for SpiSink {
    fn write_frame(&mut self, frame: &[u8]) -> Result<usize, LedError> {
        let written = self.file.write(frame)?;
        if written != frame.len() {
            return Err(LedError::PartialWrite {
                written,
                expected: frame.len(),
            });
        }
        Ok(written)
    }
}
