//! DLPC900 command table and wire-level constants.
//!
//! Every device operation the crate issues goes through one [`Opcode`]
//! table instead of per-command wrapper functions. An opcode carries its
//! 16-bit USB command code (CMD2 in the high byte, CMD3 in the low byte)
//! and a stable name used in error reporting.

/// USB HID report payload size for the DLPC900.
pub const REPORT_SIZE: usize = 64;

/// Maximum pattern-data payload per chunk transfer.
pub const MAX_CHUNK_PAYLOAD: usize = 504;

/// Mailbox LUT record size in bytes.
pub const LUT_RECORD_SIZE: usize = 10;

/// Validation-status busy bit: set while the device is still checking.
pub const VALIDATION_BUSY: u8 = 0x80;

/// DLPC900 command opcodes used by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Hardware status byte.
    StatusHw,
    /// System status byte.
    StatusSys,
    /// Main status byte.
    StatusMain,
    /// Firmware version quadruple (app, API, software config, sequencer config).
    Version,
    /// Power mode (normal / standby).
    PowerMode,
    /// Software reset of the controller.
    SoftwareReset,
    /// Internal test pattern generator select.
    TestPattern,
    /// DMD saver (idle) mode.
    DmdSaver,
    /// LED driver enables.
    LedEnable,
    /// Pattern display mode selection (disabled / splash / video / on-the-fly).
    DisplayMode,
    /// Pattern display start / stop / pause.
    PatternDisplay,
    /// Pattern configuration: LUT entry count and repeat count.
    PatternConfig,
    /// Mailbox open / close.
    MailboxControl,
    /// Mailbox write address.
    MailboxAddress,
    /// Mailbox data (LUT records).
    MailboxData,
    /// Start sequence validation / read validation status.
    Validate,
    /// Begin pattern memory load: image index and total byte count.
    PatternMemLoadInit,
    /// Pattern memory data chunk.
    PatternMemLoadData,
}

impl Opcode {
    /// The 16-bit USB command code for this opcode.
    pub fn code(self) -> u16 {
        match self {
            Opcode::StatusHw => 0x1A0A,
            Opcode::StatusSys => 0x1A0B,
            Opcode::StatusMain => 0x1A0C,
            Opcode::Version => 0x0205,
            Opcode::PowerMode => 0x0200,
            Opcode::SoftwareReset => 0x0802,
            Opcode::TestPattern => 0x1203,
            Opcode::DmdSaver => 0x0201,
            Opcode::LedEnable => 0x1A07,
            Opcode::DisplayMode => 0x1A1B,
            Opcode::PatternDisplay => 0x1A24,
            Opcode::PatternConfig => 0x1A31,
            Opcode::MailboxControl => 0x1A33,
            Opcode::MailboxAddress => 0x1A32,
            Opcode::MailboxData => 0x1A34,
            Opcode::Validate => 0x1A1A,
            Opcode::PatternMemLoadInit => 0x1A2A,
            Opcode::PatternMemLoadData => 0x1A2B,
        }
    }

    /// Stable name used in `Protocol` errors and logs.
    pub fn name(self) -> &'static str {
        match self {
            Opcode::StatusHw => "status (hardware)",
            Opcode::StatusSys => "status (system)",
            Opcode::StatusMain => "status (main)",
            Opcode::Version => "version",
            Opcode::PowerMode => "power mode",
            Opcode::SoftwareReset => "software reset",
            Opcode::TestPattern => "test pattern select",
            Opcode::DmdSaver => "DMD saver mode",
            Opcode::LedEnable => "LED enable",
            Opcode::DisplayMode => "display mode",
            Opcode::PatternDisplay => "pattern display",
            Opcode::PatternConfig => "pattern config",
            Opcode::MailboxControl => "mailbox control",
            Opcode::MailboxAddress => "mailbox address",
            Opcode::MailboxData => "mailbox data",
            Opcode::Validate => "sequence validation",
            Opcode::PatternMemLoadInit => "pattern memory load init",
            Opcode::PatternMemLoadData => "pattern memory load data",
        }
    }
}

/// Display mode selection (opcode [`Opcode::DisplayMode`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    /// Pattern display disabled (video input shown).
    Disabled = 0,
    /// Pre-stored patterns from flash.
    Splash = 1,
    /// Video pattern mode.
    Video = 2,
    /// On-the-fly mode: pattern data streamed from the host.
    Otf = 3,
}

impl DisplayMode {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Disabled),
            1 => Some(Self::Splash),
            2 => Some(Self::Video),
            3 => Some(Self::Otf),
            _ => None,
        }
    }
}

/// Internal test patterns (opcode [`Opcode::TestPattern`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestPattern {
    SolidField = 0,
    HorizontalRamp = 1,
    VerticalLines = 5,
    Grid = 6,
    Checkerboard = 7,
    ColorBars = 9,
}

/// Pattern display control values (opcode [`Opcode::PatternDisplay`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternControl {
    Stop = 0,
    Pause = 1,
    Start = 2,
}

/// How many times the sequencer repeats the pattern LUT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repeat {
    /// Repeat until explicitly stopped (device sentinel 0).
    Forever,
    /// Run the LUT the given number of times.
    Count(u32),
}

impl Repeat {
    /// The raw repeat-count field the device expects.
    pub fn raw(self) -> u32 {
        match self {
            Repeat::Forever => 0,
            Repeat::Count(n) => n,
        }
    }
}

/// One pattern LUT entry, written through the mailbox.
///
/// Exactly one entry (pattern index 0) is used by the upload pipeline, but
/// the record layout is general.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternLutEntry {
    /// Position of this entry in the LUT.
    pub pattern_index: u16,
    /// Exposure time in microseconds. Must be > 0.
    pub exposure_us: u32,
    /// Clear the DMD after the exposure.
    pub clear_after: bool,
    /// Displayed bit depth (1 or 8).
    pub bit_depth: u8,
    /// LED select mask, bit 0 = red, 1 = green, 2 = blue. Must be <= 7.
    pub led_mask: u8,
    /// Wait for an external trigger before exposing.
    pub wait_for_trigger: bool,
    /// Dark time after the exposure, microseconds.
    pub dark_time_us: u32,
    /// Disable the trigger-2 output for this pattern.
    pub trigger_out: bool,
    /// Index of the uploaded splash image this pattern reads from.
    pub image_index: u16,
    /// Bit plane within the splash image.
    pub bit_plane: u8,
}

impl PatternLutEntry {
    /// A single-entry LUT record referencing `image_index`, in the shape the
    /// upload pipeline uses: pattern 0, bit plane 0, no triggers.
    pub fn single(image_index: u16, exposure_us: u32, bit_depth: u8, led_mask: u8) -> Self {
        Self {
            pattern_index: 0,
            exposure_us,
            clear_after: true,
            bit_depth,
            led_mask,
            wait_for_trigger: false,
            dark_time_us: 0,
            trigger_out: false,
            image_index,
            bit_plane: 0,
        }
    }

    /// Field invariants checked before the entry is sent to the device.
    pub fn is_valid(&self) -> bool {
        self.exposure_us > 0
            && self.led_mask <= 7
            && (self.bit_depth == 1 || self.bit_depth == 8)
            && self.bit_plane < 24
    }

    /// Pack into the 10-byte mailbox record.
    ///
    /// Layout: exposure (u24 LE), flags byte (clear, depth-1, LED mask,
    /// wait-trigger), dark time (u24 LE), trigger byte, image index and bit
    /// plane (u16 LE, index in bits 0-10, plane in bits 11-15).
    pub fn pack(&self) -> [u8; LUT_RECORD_SIZE] {
        let mut record = [0u8; LUT_RECORD_SIZE];
        record[0..3].copy_from_slice(&self.exposure_us.to_le_bytes()[0..3]);
        record[3] = (self.clear_after as u8)
            | (self.bit_depth.saturating_sub(1) << 1)
            | (self.led_mask << 4)
            | ((self.wait_for_trigger as u8) << 7);
        record[4..7].copy_from_slice(&self.dark_time_us.to_le_bytes()[0..3]);
        record[7] = self.trigger_out as u8;
        let image_field = (self.image_index & 0x07FF) | ((self.bit_plane as u16) << 11);
        record[8..10].copy_from_slice(&image_field.to_le_bytes());
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_codes_are_unique() {
        let ops = [
            Opcode::StatusHw,
            Opcode::StatusSys,
            Opcode::StatusMain,
            Opcode::Version,
            Opcode::PowerMode,
            Opcode::SoftwareReset,
            Opcode::TestPattern,
            Opcode::DmdSaver,
            Opcode::LedEnable,
            Opcode::DisplayMode,
            Opcode::PatternDisplay,
            Opcode::PatternConfig,
            Opcode::MailboxControl,
            Opcode::MailboxAddress,
            Opcode::MailboxData,
            Opcode::Validate,
            Opcode::PatternMemLoadInit,
            Opcode::PatternMemLoadData,
        ];
        let codes: std::collections::HashSet<u16> = ops.iter().map(|op| op.code()).collect();
        assert_eq!(codes.len(), ops.len());
    }

    #[test]
    fn test_lut_entry_packs_exposure_and_flags() {
        let entry = PatternLutEntry::single(3, 1_000_000, 8, 7);
        assert!(entry.is_valid());

        let record = entry.pack();
        // 1_000_000 = 0x0F4240
        assert_eq!(&record[0..3], &[0x40, 0x42, 0x0F]);
        // clear=1, depth-1=7 in bits 1-3, LED=7 in bits 4-6, no trigger
        assert_eq!(record[3], 0b0111_1111);
        assert_eq!(&record[4..7], &[0, 0, 0]);
        assert_eq!(record[7], 0);
        assert_eq!(u16::from_le_bytes([record[8], record[9]]), 3);
    }

    #[test]
    fn test_lut_entry_rejects_bad_fields() {
        let mut entry = PatternLutEntry::single(0, 0, 8, 7);
        assert!(!entry.is_valid()); // zero exposure
        entry.exposure_us = 1;
        entry.led_mask = 8;
        assert!(!entry.is_valid()); // mask out of range
        entry.led_mask = 7;
        entry.bit_depth = 4;
        assert!(!entry.is_valid()); // unsupported depth
    }

    #[test]
    fn test_pack_tolerates_zero_bit_depth() {
        // A zero depth never passes is_valid, but pack must not underflow
        // if handed one anyway.
        let mut entry = PatternLutEntry::single(0, 1, 8, 7);
        entry.bit_depth = 0;
        let record = entry.pack();
        assert_eq!(record[3] >> 1 & 0x07, 0);
    }

    #[test]
    fn test_repeat_forever_uses_device_sentinel() {
        assert_eq!(Repeat::Forever.raw(), 0);
        assert_eq!(Repeat::Count(5).raw(), 5);
    }
}
