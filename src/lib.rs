//! Host-side control of the TI DLPC900 DMD controller over USB.
//!
//! The crate's core is the pattern upload pipeline: it takes a 1-bit bitmap,
//! expands it to the 24-bit layout the controller's splash format requires,
//! run-length-encodes it, streams it to an on-device image bank in bounded
//! USB packets, and drives the mailbox/pattern-LUT handshake that makes the
//! DMD display it.
//!
//! # Getting Started
//!
//! ```no_run
//! use dlpc900::{display_bmp, DisplayConfig, DmdDevice, Repeat};
//!
//! let mut device = DmdDevice::open()?;
//! println!("firmware: {}", device.version()?);
//!
//! let config = DisplayConfig::default()
//!     .with_exposure_us(1_000_000)
//!     .with_repeat(Repeat::Forever);
//! display_bmp(&mut device, "pattern.bmp", &config)?;
//! # Ok::<(), dlpc900::Error>(())
//! ```
//!
//! # Pipeline
//!
//! Data flows strictly forward, with no caching between requests:
//!
//! ```text
//! load_bmp -> expand_to_24bit -> encode_rle -> upload -> PatternSequencer
//! ```
//!
//! Each stage fails fast with its own [`Error`] variant and nothing is
//! retried automatically; a failed request is rerun from the loader.
//!
//! # Transport Seam
//!
//! All device I/O goes through the [`Transport`] trait. [`DmdDevice::open`]
//! uses the rusb-backed [`transport::UsbTransport`]; tests drive the same
//! pipeline against scripted in-memory transports.
//!
//! I/O is single-threaded, synchronous and blocking throughout. Bounded
//! waits (sequence validation) poll at a configurable interval and attempt
//! count ([`PollConfig`], default 10 ms x 500) and time out rather than hang.

pub mod bitmap;
pub mod device;
mod error;
pub mod pipeline;
pub mod poll;
pub mod protocol;
pub mod sequence;
pub mod splash;
pub mod transport;
pub mod upload;

// Crate-level error types
pub use error::{Error, Result};

// Device session and pass-through commands
pub use device::{DeviceStatus, DmdDevice, FirmwareVersion, LedEnables, PowerMode};

// Pipeline stages
pub use bitmap::{expand_to_24bit, load_bmp, Image};
pub use pipeline::{display_bmp, display_image, display_solid, DisplayConfig};
pub use splash::{decode_rle, encode_rle};
pub use upload::{upload, UploadSession};

// Protocol types
pub use protocol::{DisplayMode, Opcode, PatternLutEntry, Repeat, TestPattern};

// Sequencer
pub use sequence::{PatternSequencer, SequencerState, SequenceStep};

// Polling configuration
pub use poll::PollConfig;

// Transport seam
pub use transport::Transport;
