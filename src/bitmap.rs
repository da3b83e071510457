//! 1-bit bitmap loading and expansion to the 24-bit layout the splash
//! encoder works on.
//!
//! The loader understands exactly the subset of the Windows BMP format the
//! projector workflow produces: uncompressed, 1 bit per pixel, bottom-up.
//! Header metadata is validated before any pixel data is read, so a file of
//! the wrong depth is rejected without touching the device.

use std::fs;
use std::io;
use std::path::Path;

use log::debug;

use crate::error::{Error, Result};

/// Byte offset of the pixel-data offset field in the BMP file header.
const OFFSET_PIXEL_DATA: usize = 10;
/// Byte offset of the width field in the DIB header.
const OFFSET_WIDTH: usize = 18;
/// Byte offset of the height field in the DIB header.
const OFFSET_HEIGHT: usize = 22;
/// Byte offset of the bits-per-pixel field in the DIB header.
const OFFSET_BIT_DEPTH: usize = 28;
/// Byte offset of the compression field in the DIB header.
const OFFSET_COMPRESSION: usize = 30;
/// Minimum size of the file header plus a BITMAPINFOHEADER.
const MIN_HEADER_LEN: usize = 54;

/// An in-memory raster image, row-major, top-down.
///
/// Rows are padded to 4-byte alignment (the BMP stride rule), so
/// `stride >= ceil(width * bit_depth / 8)`. Only 1-bit (MSB-first packed)
/// and 24-bit (RGB triples) layouts are used by this crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    width: u32,
    height: u32,
    bit_depth: u16,
    stride: usize,
    buffer: Vec<u8>,
}

impl Image {
    /// Allocate a zeroed image of the given dimensions and bit depth.
    pub fn new(width: u32, height: u32, bit_depth: u16) -> Result<Self> {
        let stride = row_stride(width, bit_depth)?;
        let size = stride
            .checked_mul(height as usize)
            .ok_or_else(|| Error::Allocation(format!("{width}x{height}x{bit_depth} image")))?;
        Ok(Self {
            width,
            height,
            bit_depth,
            stride,
            buffer: vec![0u8; size],
        })
    }

    /// Allocate a 1-bit image with every bit set to `bit`.
    ///
    /// Used to synthesize solid white/black fields without a source file.
    pub fn solid_1bit(width: u32, height: u32, bit: bool) -> Result<Self> {
        let mut image = Self::new(width, height, 1)?;
        if bit {
            image.buffer.fill(0xFF);
        }
        Ok(image)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bit_depth(&self) -> u16 {
        self.bit_depth
    }

    /// Bytes per row, including alignment padding.
    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut [u8] {
        &mut self.buffer
    }

    /// Read the 1-bit pixel at (x, y). Panics if the image is not 1-bit.
    pub fn bit_at(&self, x: u32, y: u32) -> bool {
        assert_eq!(self.bit_depth, 1);
        let byte = self.buffer[y as usize * self.stride + (x / 8) as usize];
        (byte >> (7 - (x % 8))) & 1 == 1
    }

    /// Read the RGB triple at (x, y). Panics if the image is not 24-bit.
    pub fn rgb_at(&self, x: u32, y: u32) -> [u8; 3] {
        assert_eq!(self.bit_depth, 24);
        let idx = y as usize * self.stride + x as usize * 3;
        [self.buffer[idx], self.buffer[idx + 1], self.buffer[idx + 2]]
    }
}

/// Bytes per row for a given width and depth, padded to 4-byte alignment.
fn row_stride(width: u32, bit_depth: u16) -> Result<usize> {
    let bits = (width as usize)
        .checked_mul(bit_depth as usize)
        .ok_or_else(|| Error::Allocation(format!("row of {width} {bit_depth}-bit pixels")))?;
    Ok(bits.div_ceil(8).div_ceil(4) * 4)
}

fn read_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

/// Load a 1-bit BMP file into a top-down [`Image`].
///
/// Header metadata is checked first: anything other than an uncompressed
/// 1-bit BMP is rejected with [`Error::UnsupportedFormat`] before pixel data
/// is read. The palette table is intentionally not consulted; bit 1 always
/// means white downstream.
pub fn load_bmp(path: impl AsRef<Path>) -> Result<Image> {
    let path = path.as_ref();
    let data = fs::read(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => Error::FileNotFound(path.to_path_buf()),
        _ => Error::Io(e),
    })?;
    parse_bmp(&data)
}

/// Parse BMP bytes into a top-down 1-bit [`Image`].
pub fn parse_bmp(data: &[u8]) -> Result<Image> {
    if data.len() < MIN_HEADER_LEN || &data[0..2] != b"BM" {
        return Err(Error::Io(io::Error::new(
            io::ErrorKind::InvalidData,
            "not a BMP file",
        )));
    }

    let bit_depth = read_u16(data, OFFSET_BIT_DEPTH);
    if bit_depth != 1 {
        return Err(Error::UnsupportedFormat { bit_depth });
    }
    if read_u32(data, OFFSET_COMPRESSION) != 0 {
        return Err(Error::Io(io::Error::new(
            io::ErrorKind::InvalidData,
            "compressed BMP not supported",
        )));
    }

    let width = read_u32(data, OFFSET_WIDTH);
    let raw_height = read_u32(data, OFFSET_HEIGHT) as i32;
    // Negative height means top-down row order.
    let top_down = raw_height < 0;
    let height = raw_height.unsigned_abs();
    if width == 0 || height == 0 {
        return Err(Error::Io(io::Error::new(
            io::ErrorKind::InvalidData,
            "zero-sized BMP",
        )));
    }

    let pixel_offset = read_u32(data, OFFSET_PIXEL_DATA) as usize;

    // Bound-check against the file size before trusting the header
    // dimensions with an allocation.
    let stride = row_stride(width, 1)?;
    let pixel_len = stride
        .checked_mul(height as usize)
        .and_then(|len| pixel_offset.checked_add(len))
        .ok_or_else(|| Error::Allocation(format!("{width}x{height} 1-bit image")))?;
    if data.len() < pixel_len {
        return Err(Error::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "BMP pixel data truncated",
        )));
    }

    let mut image = Image::new(width, height, 1)?;

    for row in 0..height as usize {
        // BMP stores rows bottom-up unless the height is negative.
        let src_row = if top_down {
            row
        } else {
            height as usize - 1 - row
        };
        let src = pixel_offset + src_row * stride;
        let dst = row * stride;
        image.buffer_mut()[dst..dst + stride].copy_from_slice(&data[src..src + stride]);
    }

    debug!("loaded {width}x{height} 1-bit bitmap (stride {stride})");
    Ok(image)
}

/// Expand a 1-bit image to a 24-bit RGB image of identical dimensions.
///
/// Source bits are MSB-first within each byte; bit 1 maps to intensity 255,
/// bit 0 to intensity 0, written as R=G=B into the destination. Any palette
/// in the source file is ignored.
pub fn expand_to_24bit(source: &Image) -> Result<Image> {
    assert_eq!(source.bit_depth(), 1, "expansion input must be 1-bit");

    let mut dest = Image::new(source.width(), source.height(), 24)?;
    let stride1 = source.stride();
    let stride24 = dest.stride();

    for y in 0..source.height() as usize {
        for x in 0..source.width() as usize {
            let byte = source.buffer()[y * stride1 + x / 8];
            let bit = (byte >> (7 - (x % 8))) & 1;
            let intensity = if bit == 1 { 255 } else { 0 };

            let idx = y * stride24 + x * 3;
            dest.buffer_mut()[idx] = intensity;
            dest.buffer_mut()[idx + 1] = intensity;
            dest.buffer_mut()[idx + 2] = intensity;
        }
    }

    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a minimal 1-bit BMP byte blob (bottom-up) from packed rows.
    pub(crate) fn make_bmp_1bit(width: u32, height: u32, rows_top_down: &[Vec<u8>]) -> Vec<u8> {
        let stride = ((width as usize).div_ceil(8)).div_ceil(4) * 4;
        // 14-byte file header + 40-byte info header + 2-entry palette
        let pixel_offset = 14 + 40 + 8;
        let mut data = vec![0u8; pixel_offset + stride * height as usize];
        data[0] = b'B';
        data[1] = b'M';
        data[OFFSET_PIXEL_DATA..OFFSET_PIXEL_DATA + 4]
            .copy_from_slice(&(pixel_offset as u32).to_le_bytes());
        data[14..18].copy_from_slice(&40u32.to_le_bytes());
        data[OFFSET_WIDTH..OFFSET_WIDTH + 4].copy_from_slice(&width.to_le_bytes());
        data[OFFSET_HEIGHT..OFFSET_HEIGHT + 4].copy_from_slice(&height.to_le_bytes());
        data[26] = 1; // planes
        data[OFFSET_BIT_DEPTH] = 1;

        for (row, bytes) in rows_top_down.iter().enumerate() {
            // bottom-up storage
            let dst = pixel_offset + (height as usize - 1 - row) * stride;
            data[dst..dst + bytes.len()].copy_from_slice(bytes);
        }
        data
    }

    #[test]
    fn test_parse_rejects_non_bmp() {
        let err = parse_bmp(b"not a bitmap at all, far too short").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_parse_rejects_wrong_bit_depth() {
        let mut data = make_bmp_1bit(8, 1, &[vec![0xFF]]);
        data[OFFSET_BIT_DEPTH] = 24;
        let err = parse_bmp(&data).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat { bit_depth: 24 }));
    }

    #[test]
    fn test_parse_rejects_truncated_pixel_data() {
        let mut data = make_bmp_1bit(32, 4, &vec![vec![0; 4]; 4]);
        data.truncate(data.len() - 5);
        let err = parse_bmp(&data).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_huge_header_dimensions_fail_without_allocating() {
        // A 54-byte file claiming a multi-exabyte pixel grid must come back
        // as a truncation error, not an allocation attempt.
        let mut data = make_bmp_1bit(8, 1, &[vec![0xFF]]);
        data[OFFSET_WIDTH..OFFSET_WIDTH + 4].copy_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
        data[OFFSET_HEIGHT..OFFSET_HEIGHT + 4].copy_from_slice(&0x4000_0000u32.to_le_bytes());
        let err = parse_bmp(&data).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_parse_flips_bottom_up_rows() {
        // Row 0 (top) all ones, row 1 all zeros.
        let data = make_bmp_1bit(8, 2, &[vec![0xFF], vec![0x00]]);
        let image = parse_bmp(&data).unwrap();
        assert!(image.bit_at(0, 0));
        assert!(image.bit_at(7, 0));
        assert!(!image.bit_at(0, 1));
    }

    #[test]
    fn test_load_missing_file_is_file_not_found() {
        let err = load_bmp("/nonexistent/pattern.bmp").unwrap_err();
        assert!(matches!(err, Error::FileNotFound(_)));
    }

    #[test]
    fn test_load_from_temp_file() {
        let data = make_bmp_1bit(8, 1, &[vec![0b1010_0000]]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pattern.bmp");
        std::fs::write(&path, &data).unwrap();

        let image = load_bmp(&path).unwrap();
        assert_eq!(image.width(), 8);
        assert!(image.bit_at(0, 0));
        assert!(!image.bit_at(1, 0));
        assert!(image.bit_at(2, 0));
    }

    #[test]
    fn test_stride_is_padded_to_four_bytes() {
        // 9 pixels at 1bpp need 2 bytes, padded to 4.
        let image = Image::new(9, 3, 1).unwrap();
        assert_eq!(image.stride(), 4);
        assert_eq!(image.buffer().len(), 12);

        // 3 pixels at 24bpp need 9 bytes, padded to 12.
        let image = Image::new(3, 1, 24).unwrap();
        assert_eq!(image.stride(), 12);
    }

    #[test]
    fn test_expand_maps_bits_to_black_and_white() {
        let mut source = Image::new(8, 2, 1).unwrap();
        source.buffer_mut()[0] = 0b1000_0001; // row 0: first and last pixel set

        let dest = expand_to_24bit(&source).unwrap();
        assert_eq!(dest.bit_depth(), 24);
        assert_eq!(dest.width(), 8);
        assert_eq!(dest.height(), 2);
        assert_eq!(dest.rgb_at(0, 0), [255, 255, 255]);
        assert_eq!(dest.rgb_at(1, 0), [0, 0, 0]);
        assert_eq!(dest.rgb_at(7, 0), [255, 255, 255]);
        assert_eq!(dest.rgb_at(0, 1), [0, 0, 0]);
    }

    #[test]
    fn test_expand_output_is_pure_grey_levels() {
        let source = Image::solid_1bit(13, 7, true).unwrap();
        let dest = expand_to_24bit(&source).unwrap();
        for y in 0..7 {
            for x in 0..13 {
                let [r, g, b] = dest.rgb_at(x, y);
                assert_eq!(r, g);
                assert_eq!(g, b);
                assert!(r == 0 || r == 255);
            }
        }
    }
}
