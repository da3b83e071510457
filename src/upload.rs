//! Packetized upload of an encoded splash buffer into device memory.

use log::{debug, info};

use crate::error::{Error, Result};
use crate::protocol::{Opcode, MAX_CHUNK_PAYLOAD};
use crate::transport::Transport;

/// Progress of one in-flight upload.
///
/// Invariant: `0 <= offset <= total`; the upload is complete only when
/// `offset == total`. A session that failed mid-stream is not resumable —
/// the whole upload restarts from offset 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadSession {
    /// Destination image bank on the device.
    pub image_index: u16,
    /// Total bytes to transfer.
    pub total: usize,
    /// Bytes accepted by the device so far.
    pub offset: usize,
}

impl UploadSession {
    pub fn new(image_index: u16, total: usize) -> Self {
        Self {
            image_index,
            total,
            offset: 0,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.offset == self.total
    }
}

/// Stream an encoded splash buffer to the device at the given image index.
///
/// One begin-load write declares the destination and total length; the data
/// then flows in chunks of at most [`MAX_CHUNK_PAYLOAD`] bytes, one write
/// per chunk. There is no acknowledgment or checksum beyond the transport's
/// own transfer status. The first failed chunk aborts the upload with
/// [`Error::Transfer`] carrying the byte offset it stopped at.
pub fn upload<T: Transport>(transport: &mut T, image_index: u16, data: &[u8]) -> Result<UploadSession> {
    let mut session = UploadSession::new(image_index, data.len());

    let mut init = [0u8; 6];
    init[0..2].copy_from_slice(&image_index.to_le_bytes());
    init[2..6].copy_from_slice(&(data.len() as u32).to_le_bytes());
    transport
        .write(Opcode::PatternMemLoadInit, &init)
        .map_err(|_| Error::Protocol {
            command: Opcode::PatternMemLoadInit.name(),
        })?;
    debug!("begin-load accepted: index {image_index}, {} bytes", data.len());

    for chunk in data.chunks(MAX_CHUNK_PAYLOAD) {
        // Each chunk payload is prefixed with its own length.
        let mut payload = Vec::with_capacity(2 + chunk.len());
        payload.extend_from_slice(&(chunk.len() as u16).to_le_bytes());
        payload.extend_from_slice(chunk);

        transport
            .write(Opcode::PatternMemLoadData, &payload)
            .map_err(|e| Error::transfer_at(session.offset, e))?;
        session.offset += chunk.len();
    }

    debug_assert!(session.is_complete());
    info!(
        "uploaded {} bytes to image index {} in {} chunks",
        session.total,
        image_index,
        session.total.div_ceil(MAX_CHUNK_PAYLOAD)
    );
    Ok(session)
}
