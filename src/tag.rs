//! Locate length-prefixed tag records in a raw byte buffer.
//!
//! A record starts with a 2-byte tag code followed by a
//! big-endian `u16` length. The length counts itself and
//! the payload, so the record spans `L + 2` bytes from the
//! tag code and the payload starts 4 bytes in:
//!
//! - 0x0: tag code
//! - 0x2: int16u length `L` (big-endian)
//! - 0x4..L+2: payload
//!
//! This is the layout of JPEG APPn segments. Large blobs
//! (the raw thermal data of an R-JPEG, for instance) are
//! split into several segments with the same marker placed
//! back to back; [`find_tag`] stitches them together.
use byteordered::ByteOrdered;

use crate::error::{Error, Result};

/// JPEG APPn marker codes.
pub mod markers {
    pub const APP0: [u8; 2] = [0xff, 0xe0];
    pub const APP1: [u8; 2] = [0xff, 0xe1];
    pub const APP2: [u8; 2] = [0xff, 0xe2];
    pub const APP3: [u8; 2] = [0xff, 0xe3];
    pub const APP4: [u8; 2] = [0xff, 0xe4];
    pub const APP5: [u8; 2] = [0xff, 0xe5];
    pub const APP6: [u8; 2] = [0xff, 0xe6];
    pub const APP7: [u8; 2] = [0xff, 0xe7];

    /// Marker code of `APPn`, if `n` is a valid APP index.
    pub fn app(n: u8) -> Option<[u8; 2]> {
        (n < 16).then(|| [0xff, 0xe0 + n])
    }
}

/// Position of a single record inside the scanned buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagRecord {
    pub offset: usize,
    pub length: u16,
}

impl TagRecord {
    /// Offset one past the last byte of the record.
    pub fn end(&self) -> usize {
        self.offset + self.length as usize + 2
    }
}

/// Records found for one tag, concatenated in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagData {
    /// Header and payload of every record.
    pub tag_bytes: Vec<u8>,
    /// Payload of every record.
    pub data_bytes: Vec<u8>,
    pub records: Vec<TagRecord>,
}

/// Find the first record tagged `tag` in `buffer`, plus any
/// records with the same tag that follow it contiguously.
///
/// Fails with [`Error::TagNotFound`] if `tag` does not occur
/// in the buffer, and with [`Error::MalformedRecord`] if a
/// record's length is shorter than its own length field or
/// runs past the end of the buffer. No partial data is
/// returned on failure.
pub fn find_tag(tag: [u8; 2], buffer: &[u8]) -> Result<TagData> {
    let mut offset = buffer
        .windows(2)
        .position(|w| w == tag)
        .ok_or(Error::TagNotFound(tag))?;

    let mut out = TagData::default();
    loop {
        let record = read_record(buffer, offset)?;
        let end = record.end();
        out.tag_bytes.extend_from_slice(&buffer[offset..end]);
        out.data_bytes.extend_from_slice(&buffer[offset + 4..end]);
        out.records.push(record);

        // `end >= offset + 4`, so the scan always moves forward.
        match buffer.get(end..end + 2) {
            Some(next) if next == tag => offset = end,
            _ => break,
        }
    }
    Ok(out)
}

fn read_record(buffer: &[u8], offset: usize) -> Result<TagRecord> {
    let malformed = |claimed| Error::MalformedRecord {
        offset,
        claimed,
        available: buffer.len() - offset,
    };

    let header = buffer
        .get(offset + 2..offset + 4)
        .ok_or_else(|| malformed(0))?;
    let length = ByteOrdered::be(header).read_u16()?;

    let record = TagRecord { offset, length };
    if length < 2 || record.end() > buffer.len() {
        return Err(malformed(length as usize));
    }
    Ok(record)
}
