//! Device session: an explicit handle owning the transport and exposing the
//! controller's command surface.
//!
//! There is no process-wide device state; every operation goes through a
//! [`DmdDevice`] the caller constructed, and exactly one caller drives a
//! session at a time.

use std::fmt;

use log::info;

use crate::error::{Error, Result};
use crate::poll::PollConfig;
use crate::protocol::{
    DisplayMode, Opcode, PatternControl, PatternLutEntry, Repeat, TestPattern,
};
use crate::sequence::PatternSequencer;
use crate::transport::{Transport, UsbTransport};
use crate::upload::{self, UploadSession};

/// Controller status bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStatus {
    pub hardware: u8,
    pub system: u8,
    pub main: u8,
}

/// Firmware version quadruple, each packed as major.minor.patch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FirmwareVersion {
    pub app: u32,
    pub api: u32,
    pub sw_config: u32,
    pub seq_config: u32,
}

impl FirmwareVersion {
    fn fmt_part(version: u32) -> String {
        format!(
            "{}.{}.{}",
            (version >> 24) & 0xFF,
            (version >> 16) & 0xFF,
            version & 0xFFFF
        )
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "app {}, API {}",
            Self::fmt_part(self.app),
            Self::fmt_part(self.api)
        )
    }
}

/// LED driver enables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedEnables {
    /// LEDs follow the pattern sequencer instead of the static enables.
    pub sequencer_controlled: bool,
    pub red: bool,
    pub green: bool,
    pub blue: bool,
}

impl LedEnables {
    /// All channels on, sequencer controlled.
    pub fn all() -> Self {
        Self {
            sequencer_controlled: true,
            red: true,
            green: true,
            blue: true,
        }
    }

    fn pack(self) -> u8 {
        (self.red as u8)
            | ((self.green as u8) << 1)
            | ((self.blue as u8) << 2)
            | ((self.sequencer_controlled as u8) << 3)
    }

    fn unpack(raw: u8) -> Self {
        Self {
            red: raw & 0x01 != 0,
            green: raw & 0x02 != 0,
            blue: raw & 0x04 != 0,
            sequencer_controlled: raw & 0x08 != 0,
        }
    }
}

/// Power mode reported by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerMode {
    Normal,
    Standby,
}

/// A session with one DLPC900 controller.
///
/// Generic over [`Transport`] so the full pipeline runs against a mock in
/// tests; production code uses [`DmdDevice::open`] for the USB transport.
pub struct DmdDevice<T: Transport> {
    transport: T,
    poll: PollConfig,
}

impl DmdDevice<UsbTransport> {
    /// Find and open the first DLPC900 on the bus.
    pub fn open() -> Result<Self> {
        Ok(Self::with_transport(UsbTransport::open()?))
    }
}

impl<T: Transport> DmdDevice<T> {
    /// Build a session over an already-open transport.
    pub fn with_transport(transport: T) -> Self {
        Self {
            transport,
            poll: PollConfig::default(),
        }
    }

    /// Override the poll bound used for device-side waits.
    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    fn read_byte(&mut self, op: Opcode) -> Result<u8> {
        let mut buf = [0u8; 1];
        let n = self.transport.read(op, &mut buf)?;
        if n < 1 {
            return Err(Error::InvalidResponse { command: op.name() });
        }
        Ok(buf[0])
    }

    // Status and identity

    /// Read the hardware, system and main status bytes.
    pub fn status(&mut self) -> Result<DeviceStatus> {
        Ok(DeviceStatus {
            hardware: self.read_byte(Opcode::StatusHw)?,
            system: self.read_byte(Opcode::StatusSys)?,
            main: self.read_byte(Opcode::StatusMain)?,
        })
    }

    /// Read the firmware version quadruple.
    pub fn version(&mut self) -> Result<FirmwareVersion> {
        let mut buf = [0u8; 16];
        let n = self.transport.read(Opcode::Version, &mut buf)?;
        if n < 16 {
            return Err(Error::InvalidResponse {
                command: Opcode::Version.name(),
            });
        }
        let word = |i: usize| u32::from_le_bytes([buf[i], buf[i + 1], buf[i + 2], buf[i + 3]]);
        Ok(FirmwareVersion {
            app: word(0),
            api: word(4),
            sw_config: word(8),
            seq_config: word(12),
        })
    }

    // Display mode

    pub fn display_mode(&mut self) -> Result<DisplayMode> {
        let raw = self.read_byte(Opcode::DisplayMode)?;
        DisplayMode::from_raw(raw).ok_or(Error::InvalidResponse {
            command: Opcode::DisplayMode.name(),
        })
    }

    pub fn set_display_mode(&mut self, mode: DisplayMode) -> Result<()> {
        self.transport.write(Opcode::DisplayMode, &[mode as u8])?;
        info!("display mode set to {mode:?}");
        Ok(())
    }

    // LED control

    pub fn led_enables(&mut self) -> Result<LedEnables> {
        Ok(LedEnables::unpack(self.read_byte(Opcode::LedEnable)?))
    }

    pub fn set_led_enables(&mut self, enables: LedEnables) -> Result<()> {
        self.transport.write(Opcode::LedEnable, &[enables.pack()])
    }

    // Power management

    pub fn power_mode(&mut self) -> Result<PowerMode> {
        Ok(if self.read_byte(Opcode::PowerMode)? == 1 {
            PowerMode::Standby
        } else {
            PowerMode::Normal
        })
    }

    pub fn set_power_mode(&mut self, mode: PowerMode) -> Result<()> {
        let raw = matches!(mode, PowerMode::Standby) as u8;
        self.transport.write(Opcode::PowerMode, &[raw])
    }

    /// Whether the DMD saver (mirror idle) mode is active.
    pub fn dmd_saver(&mut self) -> Result<bool> {
        Ok(self.read_byte(Opcode::DmdSaver)? == 1)
    }

    pub fn set_dmd_saver(&mut self, enabled: bool) -> Result<()> {
        self.transport.write(Opcode::DmdSaver, &[enabled as u8])
    }

    /// Flip the DMD saver mode and return the new state.
    pub fn toggle_dmd_saver(&mut self) -> Result<bool> {
        let next = !self.dmd_saver()?;
        self.set_dmd_saver(next)?;
        Ok(next)
    }

    /// Reboot the controller firmware. The USB link drops and the device
    /// re-enumerates, so the transport must be reopened afterwards.
    pub fn software_reset(&mut self) -> Result<()> {
        self.transport.write(Opcode::SoftwareReset, &[1])
    }

    /// Show one of the controller's internal test patterns.
    pub fn show_test_pattern(&mut self, pattern: TestPattern) -> Result<()> {
        self.transport.write(Opcode::TestPattern, &[pattern as u8])
    }

    // Pattern pipeline entry points

    /// Upload an encoded splash buffer into the given image bank.
    pub fn upload_image(&mut self, image_index: u16, data: &[u8]) -> Result<UploadSession> {
        upload::upload(&mut self.transport, image_index, data)
    }

    /// Run the pattern-LUT handshake and start displaying.
    pub fn start_pattern(
        &mut self,
        entry: &PatternLutEntry,
        repeat: Repeat,
        validate: bool,
    ) -> Result<()> {
        PatternSequencer::new(&mut self.transport)
            .with_poll(self.poll)
            .run(entry, repeat, validate)
    }

    /// Stop any running pattern display.
    pub fn stop_pattern(&mut self) -> Result<()> {
        self.transport
            .write(Opcode::PatternDisplay, &[PatternControl::Stop as u8])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Transport returning canned read payloads per opcode.
    struct CannedTransport {
        reads: std::collections::HashMap<u16, Vec<u8>>,
        writes: Vec<(Opcode, Vec<u8>)>,
    }

    impl CannedTransport {
        fn new() -> Self {
            Self {
                reads: Default::default(),
                writes: Vec::new(),
            }
        }

        fn with_read(mut self, op: Opcode, data: &[u8]) -> Self {
            self.reads.insert(op.code(), data.to_vec());
            self
        }
    }

    impl Transport for CannedTransport {
        fn write(&mut self, op: Opcode, payload: &[u8]) -> Result<()> {
            self.writes.push((op, payload.to_vec()));
            Ok(())
        }

        fn read(&mut self, op: Opcode, buf: &mut [u8]) -> Result<usize> {
            let data = self
                .reads
                .get(&op.code())
                .ok_or(Error::Protocol { command: op.name() })?;
            let n = data.len().min(buf.len());
            buf[..n].copy_from_slice(&data[..n]);
            Ok(n)
        }
    }

    #[test]
    fn test_status_reads_three_bytes() {
        let transport = CannedTransport::new()
            .with_read(Opcode::StatusHw, &[0x01])
            .with_read(Opcode::StatusSys, &[0x02])
            .with_read(Opcode::StatusMain, &[0x0C]);
        let mut device = DmdDevice::with_transport(transport);
        let status = device.status().unwrap();
        assert_eq!(
            status,
            DeviceStatus {
                hardware: 0x01,
                system: 0x02,
                main: 0x0C
            }
        );
    }

    #[test]
    fn test_version_parses_quadruple() {
        let mut data = Vec::new();
        for word in [0x0102_0003u32, 0x0203_0004, 0x0304_0005, 0x0405_0006] {
            data.extend_from_slice(&word.to_le_bytes());
        }
        let transport = CannedTransport::new().with_read(Opcode::Version, &data);
        let mut device = DmdDevice::with_transport(transport);
        let version = device.version().unwrap();
        assert_eq!(version.app, 0x0102_0003);
        assert_eq!(version.seq_config, 0x0405_0006);
        assert_eq!(FirmwareVersion::fmt_part(version.app), "1.2.3");
    }

    #[test]
    fn test_short_version_response_is_invalid() {
        let transport = CannedTransport::new().with_read(Opcode::Version, &[0u8; 8]);
        let mut device = DmdDevice::with_transport(transport);
        assert!(matches!(
            device.version().unwrap_err(),
            Error::InvalidResponse { .. }
        ));
    }

    #[test]
    fn test_display_mode_round_trip() {
        let transport = CannedTransport::new().with_read(Opcode::DisplayMode, &[3]);
        let mut device = DmdDevice::with_transport(transport);
        assert_eq!(device.display_mode().unwrap(), DisplayMode::Otf);

        device.set_display_mode(DisplayMode::Disabled).unwrap();
        let (op, payload) = device.transport_mut().writes.last().unwrap().clone();
        assert_eq!(op, Opcode::DisplayMode);
        assert_eq!(payload, vec![0]);
    }

    #[test]
    fn test_unknown_display_mode_is_invalid_response() {
        let transport = CannedTransport::new().with_read(Opcode::DisplayMode, &[9]);
        let mut device = DmdDevice::with_transport(transport);
        assert!(matches!(
            device.display_mode().unwrap_err(),
            Error::InvalidResponse { .. }
        ));
    }

    #[test]
    fn test_led_enables_pack_unpack() {
        let all = LedEnables::all();
        assert_eq!(all.pack(), 0b1111);
        let some = LedEnables::unpack(0b0101);
        assert!(some.red && !some.green && some.blue && !some.sequencer_controlled);
    }

    #[test]
    fn test_software_reset_writes_one_byte() {
        let mut device = DmdDevice::with_transport(CannedTransport::new());
        device.software_reset().unwrap();
        assert_eq!(
            device.transport_mut().writes,
            vec![(Opcode::SoftwareReset, vec![1])]
        );
    }

    #[test]
    fn test_show_test_pattern_selects_checkerboard() {
        let mut device = DmdDevice::with_transport(CannedTransport::new());
        device.show_test_pattern(TestPattern::Checkerboard).unwrap();
        assert_eq!(
            device.transport_mut().writes,
            vec![(Opcode::TestPattern, vec![7])]
        );
    }

    #[test]
    fn test_toggle_dmd_saver_flips_state() {
        let transport = CannedTransport::new().with_read(Opcode::DmdSaver, &[0]);
        let mut device = DmdDevice::with_transport(transport);
        assert!(device.toggle_dmd_saver().unwrap());
        let (op, payload) = device.transport_mut().writes.last().unwrap().clone();
        assert_eq!(op, Opcode::DmdSaver);
        assert_eq!(payload, vec![1]);
    }
}
