//! The full upload-and-display pipeline.
//!
//! Data flows strictly forward: loader -> expander -> encoder -> uploader ->
//! sequencer. Every buffer lives for exactly one display request; on success
//! or failure alike, images and splash data drop when this module returns.

use std::path::Path;

use log::info;

use crate::bitmap::{self, Image};
use crate::device::{DmdDevice, LedEnables};
use crate::error::Result;
use crate::protocol::{DisplayMode, PatternLutEntry, Repeat};
use crate::splash;
use crate::transport::Transport;

/// Exposure and sequencing parameters for a display request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayConfig {
    /// Exposure time per pattern, microseconds.
    pub exposure_us: u32,
    /// Bit depth the sequencer displays the pattern at.
    pub bit_depth: u8,
    /// LED select mask (bit 0 red, 1 green, 2 blue).
    pub led_mask: u8,
    /// How many times the pattern repeats.
    pub repeat: Repeat,
    /// Run the device-side sequence validation before starting.
    ///
    /// On by default; callers chasing setup latency can switch it off.
    pub validate: bool,
    /// Destination image bank on the device.
    pub image_index: u16,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            exposure_us: 10_000_000,
            bit_depth: 8,
            led_mask: 7,
            repeat: Repeat::Count(1),
            validate: true,
            image_index: 0,
        }
    }
}

impl DisplayConfig {
    pub fn with_exposure_us(mut self, exposure_us: u32) -> Self {
        self.exposure_us = exposure_us;
        self
    }

    pub fn with_led_mask(mut self, led_mask: u8) -> Self {
        self.led_mask = led_mask;
        self
    }

    pub fn with_repeat(mut self, repeat: Repeat) -> Self {
        self.repeat = repeat;
        self
    }

    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    fn lut_entry(&self) -> PatternLutEntry {
        PatternLutEntry::single(self.image_index, self.exposure_us, self.bit_depth, self.led_mask)
    }
}

/// Load a 1-bit BMP file and display it on the DMD.
///
/// Fails before any device I/O if the file is missing, truncated, or not
/// 1-bit. On any stage failure the error propagates unchanged and all
/// buffers built so far are released.
pub fn display_bmp<T: Transport>(
    device: &mut DmdDevice<T>,
    path: impl AsRef<Path>,
    config: &DisplayConfig,
) -> Result<()> {
    let image = bitmap::load_bmp(path)?;
    display_image(device, image, config)
}

/// Display a synthesized solid field (all-white or all-black).
pub fn display_solid<T: Transport>(
    device: &mut DmdDevice<T>,
    width: u32,
    height: u32,
    white: bool,
    config: &DisplayConfig,
) -> Result<()> {
    let image = Image::solid_1bit(width, height, white)?;
    display_image(device, image, config)
}

/// Push an in-memory 1-bit image through expansion, encoding, upload and
/// sequencing.
pub fn display_image<T: Transport>(
    device: &mut DmdDevice<T>,
    source: Image,
    config: &DisplayConfig,
) -> Result<()> {
    let expanded = bitmap::expand_to_24bit(&source)?;
    // The 1-bit source is no longer needed once expansion succeeded.
    drop(source);

    let encoded = splash::encode_rle(&expanded)?;
    drop(expanded);

    // Pattern data streams from the host, so the device must be in
    // on-the-fly mode with nothing currently displaying.
    device.set_display_mode(DisplayMode::Otf)?;
    device.stop_pattern()?;
    device.set_led_enables(LedEnables::all())?;

    device.upload_image(config.image_index, &encoded)?;
    device.start_pattern(&config.lut_entry(), config.repeat, config.validate)?;

    info!("image displayed (bank {})", config.image_index);
    Ok(())
}
