//! Pattern-LUT sequencing: the mailbox handshake that makes the device
//! display an uploaded image.
//!
//! The sequencer walks a fixed chain of device commands, each guarded by the
//! previous step's success:
//!
//! ```text
//! Idle -> LutConfigured -> MailboxOpen -> LutSent -> MailboxClosed
//!      -> ConfigSet -> Validated -> Running
//! ```
//!
//! Any failing step aborts the whole sequence with [`Error::Sequence`]
//! naming the step; no rollback is attempted beyond the invariant that the
//! mailbox is never left open. The caller recovers by explicitly stopping
//! the display and rerunning the sequence.

use std::fmt;

use log::{debug, info};

use crate::error::{Error, Result};
use crate::poll::{poll_until, PollConfig};
use crate::protocol::{Opcode, PatternControl, PatternLutEntry, Repeat, VALIDATION_BUSY};
use crate::transport::Transport;

/// Mailbox mode selector values for [`Opcode::MailboxControl`].
const MAILBOX_CLOSE: u8 = 0;
const MAILBOX_PATTERN_LUT: u8 = 2;

/// Error bits in the validation status byte (pending when the busy bit is set).
const VALIDATION_ERROR_MASK: u8 = 0x1F;

/// The step a sequence failure occurred at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceStep {
    StopDisplay,
    AddLutEntry,
    OpenMailbox,
    SendLut,
    CloseMailbox,
    SetConfig,
    Validate,
    StartDisplay,
}

impl fmt::Display for SequenceStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SequenceStep::StopDisplay => "stop display",
            SequenceStep::AddLutEntry => "add LUT entry",
            SequenceStep::OpenMailbox => "open mailbox",
            SequenceStep::SendLut => "send LUT",
            SequenceStep::CloseMailbox => "close mailbox",
            SequenceStep::SetConfig => "set pattern config",
            SequenceStep::Validate => "validate sequence",
            SequenceStep::StartDisplay => "start display",
        };
        f.write_str(name)
    }
}

/// Sequencer states, in transition order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerState {
    Idle,
    LutConfigured,
    MailboxOpen,
    LutSent,
    MailboxClosed,
    ConfigSet,
    Validated,
    Running,
}

/// Drives the pattern-LUT handshake over a [`Transport`].
pub struct PatternSequencer<'a, T: Transport> {
    transport: &'a mut T,
    state: SequencerState,
    poll: PollConfig,
}

impl<'a, T: Transport> PatternSequencer<'a, T> {
    pub fn new(transport: &'a mut T) -> Self {
        Self {
            transport,
            state: SequencerState::Idle,
            poll: PollConfig::default(),
        }
    }

    /// Override the poll bound used while waiting for validation.
    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// The state the sequencer last reached.
    pub fn state(&self) -> SequencerState {
        self.state
    }

    /// Run the full sequence for one LUT entry and start the display.
    ///
    /// `validate` controls the optional device-side consistency check before
    /// start; some callers skip it for speed.
    pub fn run(&mut self, entry: &PatternLutEntry, repeat: Repeat, validate: bool) -> Result<()> {
        self.stop_display()?;
        self.configure_lut(entry)?;
        self.send_lut_via_mailbox(entry)?;
        self.set_pattern_config(1, repeat)?;
        if validate {
            self.validate_sequence()?;
        } else {
            debug!("skipping sequence validation (disabled by caller)");
            self.state = SequencerState::Validated;
        }
        self.start_display()?;
        info!(
            "pattern running: image {}, exposure {} us, repeat {:?}",
            entry.image_index, entry.exposure_us, repeat
        );
        Ok(())
    }

    /// Step 1: stop any in-progress display, resetting device-side state.
    fn stop_display(&mut self) -> Result<()> {
        self.transport
            .write(Opcode::PatternDisplay, &[PatternControl::Stop as u8])
            .map_err(|e| Error::at_step(SequenceStep::StopDisplay, e))?;
        self.state = SequencerState::Idle;
        Ok(())
    }

    /// Step 2: check the single LUT entry before anything touches the device.
    fn configure_lut(&mut self, entry: &PatternLutEntry) -> Result<()> {
        if !entry.is_valid() {
            return Err(Error::at_step(
                SequenceStep::AddLutEntry,
                Error::Protocol {
                    command: "pattern LUT entry fields",
                },
            ));
        }
        self.state = SequencerState::LutConfigured;
        Ok(())
    }

    /// Steps 3-5: open the mailbox, write the LUT record, close the mailbox.
    ///
    /// A failure after the mailbox opened still closes it before the error
    /// surfaces; a close failure is itself fatal.
    fn send_lut_via_mailbox(&mut self, entry: &PatternLutEntry) -> Result<()> {
        self.transport
            .write(Opcode::MailboxControl, &[MAILBOX_PATTERN_LUT])
            .map_err(|e| Error::at_step(SequenceStep::OpenMailbox, e))?;

        let opened = (|| -> Result<()> {
            self.transport
                .write(Opcode::MailboxAddress, &0u16.to_le_bytes())
                .map_err(|e| Error::at_step(SequenceStep::OpenMailbox, e))?;
            self.state = SequencerState::MailboxOpen;

            self.transport
                .write(Opcode::MailboxData, &entry.pack())
                .map_err(|e| Error::at_step(SequenceStep::SendLut, e))?;
            self.state = SequencerState::LutSent;
            Ok(())
        })();

        let closed = self
            .transport
            .write(Opcode::MailboxControl, &[MAILBOX_CLOSE]);

        // The failure that happened first wins; a close failure alone is fatal.
        opened?;
        closed.map_err(|e| Error::at_step(SequenceStep::CloseMailbox, e))?;
        self.state = SequencerState::MailboxClosed;
        Ok(())
    }

    /// Step 6: declare the LUT size and repeat count.
    fn set_pattern_config(&mut self, entries: u16, repeat: Repeat) -> Result<()> {
        let mut payload = [0u8; 6];
        payload[0..2].copy_from_slice(&entries.to_le_bytes());
        payload[2..6].copy_from_slice(&repeat.raw().to_le_bytes());
        self.transport
            .write(Opcode::PatternConfig, &payload)
            .map_err(|e| Error::at_step(SequenceStep::SetConfig, e))?;
        self.state = SequencerState::ConfigSet;
        Ok(())
    }

    /// Step 7: device-side sequence validation, polled until the busy bit
    /// clears or the poll bound elapses.
    fn validate_sequence(&mut self) -> Result<()> {
        self.transport
            .write(Opcode::Validate, &[0])
            .map_err(|e| Error::at_step(SequenceStep::Validate, e))?;

        let status = poll_until(self.poll, "sequence validation", || {
            let mut buf = [0u8; 1];
            let n = self.transport.read(Opcode::Validate, &mut buf)?;
            if n < 1 {
                return Err(Error::InvalidResponse {
                    command: Opcode::Validate.name(),
                });
            }
            if buf[0] & VALIDATION_BUSY != 0 {
                Ok(None)
            } else {
                Ok(Some(buf[0]))
            }
        })
        .map_err(|e| Error::at_step(SequenceStep::Validate, e))?;

        if status & VALIDATION_ERROR_MASK != 0 {
            debug!("validation status {status:#04x}");
            return Err(Error::at_step(
                SequenceStep::Validate,
                Error::Protocol {
                    command: Opcode::Validate.name(),
                },
            ));
        }
        self.state = SequencerState::Validated;
        Ok(())
    }

    /// Step 8: start the display. Only reachable once every earlier step
    /// succeeded.
    fn start_display(&mut self) -> Result<()> {
        self.transport
            .write(Opcode::PatternDisplay, &[PatternControl::Start as u8])
            .map_err(|e| Error::at_step(SequenceStep::StartDisplay, e))?;
        self.state = SequencerState::Running;
        Ok(())
    }
}
