//! USB transport seam between the pipeline and the physical controller.
//!
//! The pipeline, uploader and sequencer are generic over [`Transport`], a
//! blocking command-level interface. [`UsbTransport`] is the real rusb-backed
//! implementation speaking the controller's HID report framing; tests drive
//! the same code paths with a scripted mock instead.

use std::time::Duration;

use log::{debug, info};
use rusb::{Context, DeviceHandle, UsbContext};

use crate::error::{Error, Result};
use crate::protocol::{Opcode, REPORT_SIZE};

/// TI USB vendor ID.
const VENDOR_ID: u16 = 0x0451;
/// DLPC900 product ID (LightCrafter 6500/9000 family).
const PRODUCT_ID: u16 = 0xC900;

/// HID interrupt endpoints.
const ENDPOINT_OUT: u8 = 0x01;
const ENDPOINT_IN: u8 = 0x81;
const INTERFACE: u8 = 0;

/// Timeout for a single interrupt transfer.
const TRANSFER_TIMEOUT: Duration = Duration::from_millis(2000);

/// Header bytes preceding the command payload in the first report.
const HEADER_LEN: usize = 6;
/// Flags byte: host-to-device write, no reply requested.
const FLAG_WRITE: u8 = 0x00;
/// Flags byte: read request, reply required.
const FLAG_READ: u8 = 0xC0;
/// Error bit in a response flags byte.
const FLAG_ERROR: u8 = 0x20;

/// Blocking command-level transport to a DLPC900.
///
/// Both calls block until the device responds or the transport's fixed
/// timeout elapses. Implementations are not required to be thread-safe;
/// exactly one caller drives a transport at a time.
pub trait Transport {
    /// Issue a write command with the given payload.
    fn write(&mut self, op: Opcode, payload: &[u8]) -> Result<()>;

    /// Issue a read command, filling `buf` with the response payload.
    ///
    /// Returns the number of response bytes written into `buf`.
    fn read(&mut self, op: Opcode, buf: &mut [u8]) -> Result<usize>;
}

/// rusb-backed [`Transport`] implementation.
///
/// Commands are framed as 64-byte HID reports: a six-byte header (flags,
/// sequence, payload length, command code) followed by payload bytes, with
/// continuation reports carrying any remainder.
pub struct UsbTransport {
    handle: DeviceHandle<Context>,
    sequence: u8,
}

impl UsbTransport {
    /// Find the first DLPC900 on the bus and open it.
    pub fn open() -> Result<Self> {
        let context = Context::new()?;
        let device = context
            .devices()?
            .iter()
            .find(|dev| {
                dev.device_descriptor()
                    .map(|desc| desc.vendor_id() == VENDOR_ID && desc.product_id() == PRODUCT_ID)
                    .unwrap_or(false)
            })
            .ok_or(Error::DeviceNotFound)?;

        let handle = device.open()?;
        // The kernel HID driver claims the interface on most hosts.
        let _ = handle.set_auto_detach_kernel_driver(true);
        handle.claim_interface(INTERFACE)?;

        info!(
            "opened DLPC900 on bus {:03} address {:03}",
            device.bus_number(),
            device.address()
        );
        Ok(Self {
            handle,
            sequence: 0,
        })
    }

    fn next_sequence(&mut self) -> u8 {
        self.sequence = self.sequence.wrapping_add(1);
        self.sequence
    }

    /// Frame and send one command message, splitting across reports.
    fn send_message(&mut self, flags: u8, op: Opcode, payload: &[u8]) -> Result<()> {
        let code = op.code();
        // Declared length covers the two command bytes plus the payload.
        let declared = (payload.len() + 2) as u16;

        let mut report = [0u8; REPORT_SIZE];
        report[0] = flags;
        report[1] = self.next_sequence();
        report[2..4].copy_from_slice(&declared.to_le_bytes());
        report[4] = (code & 0xFF) as u8;
        report[5] = (code >> 8) as u8;

        let first = payload.len().min(REPORT_SIZE - HEADER_LEN);
        report[HEADER_LEN..HEADER_LEN + first].copy_from_slice(&payload[..first]);
        self.write_report(&report)?;

        let mut sent = first;
        while sent < payload.len() {
            let mut report = [0u8; REPORT_SIZE];
            let n = (payload.len() - sent).min(REPORT_SIZE);
            report[..n].copy_from_slice(&payload[sent..sent + n]);
            self.write_report(&report)?;
            sent += n;
        }
        Ok(())
    }

    fn write_report(&self, report: &[u8; REPORT_SIZE]) -> Result<()> {
        let transferred = self
            .handle
            .write_interrupt(ENDPOINT_OUT, report, TRANSFER_TIMEOUT)?;
        if transferred != REPORT_SIZE {
            return Err(Error::Usb(rusb::Error::Io));
        }
        Ok(())
    }

    fn read_report(&self) -> Result<[u8; REPORT_SIZE]> {
        let mut report = [0u8; REPORT_SIZE];
        let transferred = self
            .handle
            .read_interrupt(ENDPOINT_IN, &mut report, TRANSFER_TIMEOUT)?;
        if transferred != REPORT_SIZE {
            return Err(Error::Usb(rusb::Error::Io));
        }
        Ok(report)
    }
}

impl Transport for UsbTransport {
    fn write(&mut self, op: Opcode, payload: &[u8]) -> Result<()> {
        debug!("write {:#06x} ({}), {} bytes", op.code(), op.name(), payload.len());
        self.send_message(FLAG_WRITE, op, payload)
    }

    fn read(&mut self, op: Opcode, buf: &mut [u8]) -> Result<usize> {
        debug!("read {:#06x} ({})", op.code(), op.name());
        self.send_message(FLAG_READ, op, &[])?;

        // Responses echo flags, sequence and length but not the command code,
        // so payload starts at byte 4.
        let report = self.read_report()?;
        if report[0] & FLAG_ERROR != 0 {
            return Err(Error::Protocol { command: op.name() });
        }
        let length = u16::from_le_bytes([report[2], report[3]]) as usize;
        if length > REPORT_SIZE - 4 {
            // Long responses would span reports; none of the commands this
            // crate reads come close to one report.
            return Err(Error::InvalidResponse { command: op.name() });
        }
        let n = length.min(buf.len());
        buf[..n].copy_from_slice(&report[4..4 + n]);
        Ok(n)
    }
}

impl Drop for UsbTransport {
    fn drop(&mut self) {
        let _ = self.handle.release_interface(INTERFACE);
    }
}
