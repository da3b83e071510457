//! Crate-level error types.

use std::path::PathBuf;

use crate::sequence::SequenceStep;

/// Errors that can occur while preparing or displaying an image.
///
/// Every pipeline stage fails fast with its own variant; nothing is retried
/// automatically. A failed upload or sequence leaves the device in whatever
/// state the last accepted command put it in, and the caller restarts the
/// whole pipeline from the loader.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The bitmap declares a bit depth the pipeline does not accept.
    #[error("unsupported bitmap format: {bit_depth}-bit (expected 1-bit)")]
    UnsupportedFormat { bit_depth: u16 },

    /// The bitmap file does not exist.
    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    /// The bitmap file could not be read or is truncated/corrupt.
    #[error("bitmap read failed: {0}")]
    Io(#[from] std::io::Error),

    /// A pixel buffer size could not be computed or allocated.
    #[error("buffer allocation failed: {0}")]
    Allocation(String),

    /// RLE compression overflowed its worst-case output bound.
    #[error("splash encoding overflowed worst-case buffer ({written} > {capacity})")]
    Encode { written: usize, capacity: usize },

    /// The device rejected a control command.
    #[error("device rejected {command}")]
    Protocol { command: &'static str },

    /// A bulk data chunk transfer failed mid-upload.
    ///
    /// Carries the byte offset at which the upload stopped. Partial uploads
    /// are not resumable; restart from offset 0.
    #[error("upload transfer failed at offset {offset}: {source}")]
    Transfer {
        offset: usize,
        #[source]
        source: Box<Error>,
    },

    /// A pattern sequencing step failed.
    #[error("pattern sequence failed at step {step}: {source}")]
    Sequence {
        step: SequenceStep,
        #[source]
        source: Box<Error>,
    },

    /// USB communication error.
    #[error("USB error: {0}")]
    Usb(#[from] rusb::Error),

    /// No DLPC900 was found on the bus.
    #[error("no DLPC900 device found")]
    DeviceNotFound,

    /// Device returned a malformed or short response.
    #[error("invalid device response to {command}")]
    InvalidResponse { command: &'static str },

    /// A bounded wait elapsed without the device reporting completion.
    #[error("timed out waiting for {what} after {attempts} polls")]
    Timeout { what: &'static str, attempts: u32 },
}

impl Error {
    /// Wrap an error as a transfer failure at the given upload offset.
    pub(crate) fn transfer_at(offset: usize, source: Error) -> Self {
        Self::Transfer {
            offset,
            source: Box::new(source),
        }
    }

    /// Wrap an error as a sequence failure at the given step.
    pub(crate) fn at_step(step: SequenceStep, source: Error) -> Self {
        Self::Sequence {
            step,
            source: Box::new(source),
        }
    }
}

/// Crate-level result type.
pub type Result<T> = std::result::Result<T, Error>;
