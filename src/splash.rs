//! Run-length encoding of 24-bit images into the controller's splash format.
//!
//! The on-device representation collapses runs of identical 24-bit pixels,
//! scanned in row-major order, into fixed-size records: a little-endian u16
//! run length followed by the R, G, B bytes. Runs longer than [`MAX_RUN`]
//! are split across records. The decoder exists as the reference inverse for
//! verifying losslessness.

use log::debug;

use crate::bitmap::Image;
use crate::error::{Error, Result};

/// Longest run a single record can express.
pub const MAX_RUN: usize = u16::MAX as usize;

/// Bytes per RLE record: u16 run length + RGB triple.
pub const RECORD_SIZE: usize = 5;

/// Worst-case encoded size for an image: one record per pixel.
///
/// Always at least `width * height * 3`, the raw 24-bit payload size.
pub fn worst_case_len(width: u32, height: u32) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(RECORD_SIZE))
        .ok_or_else(|| Error::Allocation(format!("{width}x{height} splash buffer")))
}

/// RLE-compress a 24-bit image into a splash byte buffer.
///
/// The output buffer is pre-allocated at the worst-case bound and truncated
/// to the actual compressed length. Overflowing the bound cannot happen with
/// a well-formed image but is still checked and surfaces [`Error::Encode`].
pub fn encode_rle(image: &Image) -> Result<Vec<u8>> {
    assert_eq!(image.bit_depth(), 24, "splash encoder input must be 24-bit");

    let capacity = worst_case_len(image.width(), image.height())?;
    let mut out = Vec::with_capacity(capacity);

    let mut run: Option<([u8; 3], usize)> = None;
    for y in 0..image.height() {
        for x in 0..image.width() {
            let pixel = image.rgb_at(x, y);
            run = match run.take() {
                Some((color, count)) if color == pixel && count < MAX_RUN => {
                    Some((color, count + 1))
                }
                Some((color, count)) => {
                    emit_record(&mut out, color, count, capacity)?;
                    Some((pixel, 1))
                }
                None => Some((pixel, 1)),
            };
        }
    }
    if let Some((color, count)) = run {
        emit_record(&mut out, color, count, capacity)?;
    }

    debug!(
        "splash encode: {}x{} -> {} bytes ({} records)",
        image.width(),
        image.height(),
        out.len(),
        out.len() / RECORD_SIZE
    );
    Ok(out)
}

fn emit_record(out: &mut Vec<u8>, color: [u8; 3], count: usize, capacity: usize) -> Result<()> {
    debug_assert!(count >= 1 && count <= MAX_RUN);
    if out.len() + RECORD_SIZE > capacity {
        return Err(Error::Encode {
            written: out.len() + RECORD_SIZE,
            capacity,
        });
    }
    out.extend_from_slice(&(count as u16).to_le_bytes());
    out.extend_from_slice(&color);
    Ok(())
}

/// Reference decoder: reconstruct the 24-bit pixel grid from splash bytes.
///
/// Decoding stops once `width * height` pixels have been produced; a buffer
/// that ends early or runs past the grid is malformed.
pub fn decode_rle(data: &[u8], width: u32, height: u32) -> Result<Image> {
    let mut image = Image::new(width, height, 24)?;
    let total = width as usize * height as usize;
    let mut produced = 0usize;

    let malformed = |msg: &str| {
        Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, msg.to_string()))
    };

    for record in data.chunks(RECORD_SIZE) {
        if record.len() < RECORD_SIZE {
            return Err(malformed("truncated splash record"));
        }
        let count = u16::from_le_bytes([record[0], record[1]]) as usize;
        let color = [record[2], record[3], record[4]];
        if count == 0 || produced + count > total {
            return Err(malformed("splash run length out of range"));
        }
        for _ in 0..count {
            let x = (produced % width as usize) as u32;
            let y = (produced / width as usize) as u32;
            let idx = y as usize * image.stride() + x as usize * 3;
            image.buffer_mut()[idx..idx + 3].copy_from_slice(&color);
            produced += 1;
        }
    }

    if produced != total {
        return Err(malformed("splash data ends before the pixel grid is full"));
    }
    Ok(image)
}
