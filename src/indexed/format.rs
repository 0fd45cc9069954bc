//! Container file format constants and header.
//!
//! Layout:
//! ```text
//! 0..5    magic "SCCIO"
//! 5       frozen flag (0xFF once the file was completely written)
//! 6..8    version (u16 LE)
//! 8       compression flag (1 = zlib)
//! 9..16   reserved (zero)
//! 16..24  uncompressed body length (u64 LE)
//! 24..    body (encoded directory tree)
//! ```

use byteorder::{ByteOrder, LittleEndian};

use crate::util::{Error, Result};

/// Magic bytes at the start of a container file.
pub const MAGIC: &[u8; 5] = b"SCCIO";

/// Size of the file header in bytes.
pub const HEADER_SIZE: usize = 24;

/// Offset of the frozen flag in the header.
pub const FROZEN_OFFSET: usize = 5;

/// Offset of the version in the header.
pub const VERSION_OFFSET: usize = 6;

/// Offset of the compression flag in the header.
pub const COMPRESSION_OFFSET: usize = 8;

/// Offset of the uncompressed body length in the header.
pub const BODY_LEN_OFFSET: usize = 16;

/// Current format version.
pub const CURRENT_VERSION: u16 = 1;

/// Frozen flag value when the file is finalized.
pub const FROZEN_FLAG: u8 = 0xFF;

/// Parsed container header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContainerHeader {
    pub frozen: bool,
    pub version: u16,
    pub compressed: bool,
    pub body_len: u64,
}

impl ContainerHeader {
    pub fn new(compressed: bool, body_len: u64) -> Self {
        Self {
            frozen: true,
            version: CURRENT_VERSION,
            compressed,
            body_len,
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[..MAGIC.len()].copy_from_slice(MAGIC);
        buf[FROZEN_OFFSET] = if self.frozen { FROZEN_FLAG } else { 0 };
        LittleEndian::write_u16(&mut buf[VERSION_OFFSET..], self.version);
        buf[COMPRESSION_OFFSET] = self.compressed as u8;
        LittleEndian::write_u64(&mut buf[BODY_LEN_OFFSET..], self.body_len);
        buf
    }

    /// Parse and validate a header.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(Error::corrupted(format!(
                "file too short for header ({} bytes)",
                data.len()
            )));
        }
        if &data[..MAGIC.len()] != MAGIC {
            return Err(Error::corrupted("bad magic"));
        }
        let header = Self {
            frozen: data[FROZEN_OFFSET] == FROZEN_FLAG,
            version: LittleEndian::read_u16(&data[VERSION_OFFSET..]),
            compressed: data[COMPRESSION_OFFSET] != 0,
            body_len: LittleEndian::read_u64(&data[BODY_LEN_OFFSET..]),
        };
        if header.version > CURRENT_VERSION {
            return Err(Error::corrupted(format!(
                "unsupported format version {}",
                header.version
            )));
        }
        if !header.frozen {
            return Err(Error::corrupted("file was not finalized"));
        }
        Ok(header)
    }
}
