//! Packet header definition and serialization.
//!
//! Every packet starts with a fixed 64-byte header. Two header families
//! exist; they share the layout and differ only in their token pair and in
//! how bytes 6..10 are used.
//!
//! # Header Format
//!
//! ```text
//!  0      2                6               10              14
//! +------+----------------+---------------+---------------+--------------------//--+
//! |start | version (4xu8) | payload count | avatar index  | avatar name (32 bytes)  |
//! +------+----------------+---------------+---------------+--------------------//--+
//!  46              50                                      62     64
//! +---------------+---------------------------------------+------+
//! | frame index   | reserved (3 x u32)                    | end  |
//! +---------------+---------------------------------------+------+
//! ```
//!
//! All multi-byte fields are little-endian. For [`HeaderFormat::Bvh`] the
//! payload count is a `u16` at offset 6 followed by the displacement and
//! reference flags at offsets 8 and 9.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Header size in bytes.
pub const HEADER_SIZE: usize = 64;

/// Size of the fixed avatar name field.
pub const AVATAR_NAME_LEN: usize = 32;

/// Size of one payload element (`f32`).
pub const VALUE_SIZE: usize = 4;

const VERSION_OFFSET: usize = 2;
const COUNT_OFFSET: usize = 6;
const AVATAR_INDEX_OFFSET: usize = 10;
const AVATAR_NAME_OFFSET: usize = 14;
const FRAME_INDEX_OFFSET: usize = 46;
const RESERVED_OFFSET: usize = 50;
const END_TOKEN_OFFSET: usize = 62;

/// Packet family, identified by its start/end token pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HeaderFormat {
    /// Calculation data: `0x88FF` .. `0x99FF`, 32-bit payload count.
    #[default]
    Calc,

    /// BVH data: `0xDDFF` .. `0xEEFF`, 16-bit payload count plus flags.
    Bvh,
}

impl HeaderFormat {
    /// Token expected at offset 0.
    pub const fn start_token(self) -> u16 {
        match self {
            Self::Calc => 0x88FF,
            Self::Bvh => 0xDDFF,
        }
    }

    /// Token expected at offset 62.
    pub const fn end_token(self) -> u16 {
        match self {
            Self::Calc => 0x99FF,
            Self::Bvh => 0xEEFF,
        }
    }

    /// Data version the rig reports for this family.
    pub const fn default_version(self) -> DataVersion {
        match self {
            Self::Calc => DataVersion::new(1, 0, 0, 3),
            Self::Bvh => DataVersion::new(1, 1, 0, 0),
        }
    }

    /// Largest payload count the header can express.
    pub const fn max_payload_count(self) -> u32 {
        match self {
            Self::Calc => u32::MAX,
            Self::Bvh => u16::MAX as u32,
        }
    }

    /// Returns true if both tokens belong to this family.
    pub const fn matches(self, start_token: u16, end_token: u16) -> bool {
        start_token == self.start_token() && end_token == self.end_token()
    }
}

impl fmt::Display for HeaderFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Calc => write!(f, "calc"),
            Self::Bvh => write!(f, "bvh"),
        }
    }
}

impl FromStr for HeaderFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "calc" => Ok(Self::Calc),
            "bvh" => Ok(Self::Bvh),
            other => Err(Error::Config(format!("unknown header format '{other}'"))),
        }
    }
}

/// Four-byte structured version tag.
///
/// On the wire the bytes are ordered build, revision, minor, major.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DataVersion {
    pub major: u8,
    pub minor: u8,
    pub revision: u8,
    pub build: u8,
}

impl DataVersion {
    pub const fn new(major: u8, minor: u8, revision: u8, build: u8) -> Self {
        Self {
            major,
            minor,
            revision,
            build,
        }
    }

    const fn from_wire(bytes: [u8; 4]) -> Self {
        Self::new(bytes[3], bytes[2], bytes[1], bytes[0])
    }

    const fn to_wire(self) -> [u8; 4] {
        [self.build, self.revision, self.minor, self.major]
    }
}

impl fmt::Display for DataVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}.{}", self.major, self.minor, self.revision, self.build)
    }
}

/// Decoded packet header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketHeader {
    /// Packet family; determines the token pair.
    pub format: HeaderFormat,

    /// Data format version.
    pub version: DataVersion,

    /// Number of `f32` values following the header.
    pub payload_count: u32,

    /// Index of the avatar this frame belongs to.
    pub avatar_index: u32,

    /// Avatar name, decoded up to the first NUL.
    pub avatar_name: String,

    /// Monotonic frame counter assigned by the rig.
    pub frame_index: u32,

    /// Reserved words; carried through untouched.
    pub reserved: [u32; 3],

    /// BVH only: payload carries per-bone displacement.
    pub with_displacement: bool,

    /// BVH only: payload starts with reference bone data.
    pub with_reference: bool,
}

impl PacketHeader {
    /// Creates a header with the family's default version and no flags.
    pub fn new(
        format: HeaderFormat,
        avatar_index: u32,
        avatar_name: impl Into<String>,
        frame_index: u32,
        payload_count: u32,
    ) -> Self {
        Self {
            format,
            version: format.default_version(),
            payload_count,
            avatar_index,
            avatar_name: avatar_name.into(),
            frame_index,
            reserved: [0; 3],
            with_displacement: false,
            with_reference: false,
        }
    }

    /// Payload size in bytes.
    pub fn payload_size(&self) -> usize {
        self.payload_count as usize * VALUE_SIZE
    }

    /// Total packet size (header + payload) in bytes.
    pub fn packet_size(&self) -> usize {
        HEADER_SIZE + self.payload_size()
    }

    /// Reads the start and end tokens without validating them.
    pub fn read_tokens(buf: &[u8; HEADER_SIZE]) -> (u16, u16) {
        (
            read_u16(buf, 0),
            read_u16(buf, END_TOKEN_OFFSET),
        )
    }

    /// Decodes a header of the given family.
    ///
    /// Returns `None` when the tokens do not belong to `format`.
    pub fn decode(format: HeaderFormat, buf: &[u8; HEADER_SIZE]) -> Option<Self> {
        let (start, end) = Self::read_tokens(buf);
        if !format.matches(start, end) {
            return None;
        }

        let mut version = [0u8; 4];
        version.copy_from_slice(&buf[VERSION_OFFSET..VERSION_OFFSET + 4]);

        let (payload_count, with_displacement, with_reference) = match format {
            HeaderFormat::Calc => (read_u32(buf, COUNT_OFFSET), false, false),
            HeaderFormat::Bvh => (
                read_u16(buf, COUNT_OFFSET) as u32,
                buf[COUNT_OFFSET + 2] != 0,
                buf[COUNT_OFFSET + 3] != 0,
            ),
        };

        let name_field = &buf[AVATAR_NAME_OFFSET..AVATAR_NAME_OFFSET + AVATAR_NAME_LEN];
        let name_len = name_field
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(AVATAR_NAME_LEN);
        let avatar_name = String::from_utf8_lossy(&name_field[..name_len]).into_owned();

        Some(Self {
            format,
            version: DataVersion::from_wire(version),
            payload_count,
            avatar_index: read_u32(buf, AVATAR_INDEX_OFFSET),
            avatar_name,
            frame_index: read_u32(buf, FRAME_INDEX_OFFSET),
            reserved: [
                read_u32(buf, RESERVED_OFFSET),
                read_u32(buf, RESERVED_OFFSET + 4),
                read_u32(buf, RESERVED_OFFSET + 8),
            ],
            with_displacement,
            with_reference,
        })
    }

    /// Serializes the header.
    ///
    /// Fails if the avatar name does not fit the 32-byte field or the
    /// payload count exceeds what the family can express.
    pub fn encode(&self) -> Result<[u8; HEADER_SIZE]> {
        let name = self.avatar_name.as_bytes();
        if name.len() > AVATAR_NAME_LEN {
            return Err(Error::Encode(format!(
                "avatar name is {} bytes, field holds {}",
                name.len(),
                AVATAR_NAME_LEN
            )));
        }
        if self.payload_count > self.format.max_payload_count() {
            return Err(Error::Encode(format!(
                "payload count {} exceeds {} limit {}",
                self.payload_count,
                self.format,
                self.format.max_payload_count()
            )));
        }

        let mut buf = [0u8; HEADER_SIZE];
        buf[0..2].copy_from_slice(&self.format.start_token().to_le_bytes());
        buf[VERSION_OFFSET..VERSION_OFFSET + 4].copy_from_slice(&self.version.to_wire());
        match self.format {
            HeaderFormat::Calc => {
                buf[COUNT_OFFSET..COUNT_OFFSET + 4]
                    .copy_from_slice(&self.payload_count.to_le_bytes());
            }
            HeaderFormat::Bvh => {
                buf[COUNT_OFFSET..COUNT_OFFSET + 2]
                    .copy_from_slice(&(self.payload_count as u16).to_le_bytes());
                buf[COUNT_OFFSET + 2] = self.with_displacement as u8;
                buf[COUNT_OFFSET + 3] = self.with_reference as u8;
            }
        }
        buf[AVATAR_INDEX_OFFSET..AVATAR_INDEX_OFFSET + 4]
            .copy_from_slice(&self.avatar_index.to_le_bytes());
        buf[AVATAR_NAME_OFFSET..AVATAR_NAME_OFFSET + name.len()].copy_from_slice(name);
        buf[FRAME_INDEX_OFFSET..FRAME_INDEX_OFFSET + 4]
            .copy_from_slice(&self.frame_index.to_le_bytes());
        for (i, word) in self.reserved.iter().enumerate() {
            let at = RESERVED_OFFSET + i * 4;
            buf[at..at + 4].copy_from_slice(&word.to_le_bytes());
        }
        buf[END_TOKEN_OFFSET..HEADER_SIZE].copy_from_slice(&self.format.end_token().to_le_bytes());

        Ok(buf)
    }
}

fn read_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calc_header_roundtrip() {
        let mut header = PacketHeader::new(HeaderFormat::Calc, 2, "Robot", 77, 338);
        header.reserved = [1, 2, 3];

        let bytes = header.encode().unwrap();
        assert_eq!(&bytes[0..2], &[0xFF, 0x88]);
        assert_eq!(&bytes[62..64], &[0xFF, 0x99]);

        let decoded = PacketHeader::decode(HeaderFormat::Calc, &bytes).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(decoded.packet_size(), HEADER_SIZE + 338 * 4);
    }

    #[test]
    fn test_field_offsets() {
        let header = PacketHeader::new(HeaderFormat::Calc, 0x0A0B0C0D, "A", 0x01020304, 5);
        let bytes = header.encode().unwrap();

        // version 1.0.0.3 is stored build first
        assert_eq!(&bytes[2..6], &[3, 0, 0, 1]);
        assert_eq!(&bytes[6..10], &5u32.to_le_bytes());
        assert_eq!(&bytes[10..14], &0x0A0B0C0Du32.to_le_bytes());
        assert_eq!(bytes[14], b'A');
        assert!(bytes[15..46].iter().all(|&b| b == 0));
        assert_eq!(&bytes[46..50], &0x01020304u32.to_le_bytes());
    }

    #[test]
    fn test_bvh_flags() {
        let mut header = PacketHeader::new(HeaderFormat::Bvh, 1, "bvh", 9, 354);
        header.with_displacement = true;

        let bytes = header.encode().unwrap();
        assert_eq!(&bytes[0..2], &0xDDFFu16.to_le_bytes());
        assert_eq!(bytes[8], 1);
        assert_eq!(bytes[9], 0);

        let decoded = PacketHeader::decode(HeaderFormat::Bvh, &bytes).unwrap();
        assert!(decoded.with_displacement);
        assert!(!decoded.with_reference);
        assert_eq!(decoded.payload_count, 354);
    }

    #[test]
    fn test_wrong_family_rejected() {
        let bytes = PacketHeader::new(HeaderFormat::Bvh, 0, "", 0, 1)
            .encode()
            .unwrap();
        assert!(PacketHeader::decode(HeaderFormat::Calc, &bytes).is_none());
        assert_eq!(PacketHeader::read_tokens(&bytes), (0xDDFF, 0xEEFF));
    }

    #[test]
    fn test_encode_limits() {
        let long_name = "x".repeat(AVATAR_NAME_LEN + 1);
        let header = PacketHeader::new(HeaderFormat::Calc, 0, long_name, 0, 0);
        assert!(matches!(header.encode(), Err(Error::Encode(_))));

        let header = PacketHeader::new(HeaderFormat::Bvh, 0, "", 0, 70_000);
        assert!(matches!(header.encode(), Err(Error::Encode(_))));
    }

    #[test]
    fn test_full_width_name() {
        let name = "n".repeat(AVATAR_NAME_LEN);
        let header = PacketHeader::new(HeaderFormat::Calc, 0, name.clone(), 0, 0);
        let decoded = PacketHeader::decode(HeaderFormat::Calc, &header.encode().unwrap()).unwrap();
        assert_eq!(decoded.avatar_name, name);
    }

    #[test]
    fn test_format_parse() {
        assert_eq!("CALC".parse::<HeaderFormat>().unwrap(), HeaderFormat::Calc);
        assert_eq!("bvh".parse::<HeaderFormat>().unwrap(), HeaderFormat::Bvh);
        assert!("tcp".parse::<HeaderFormat>().is_err());
        assert_eq!(DataVersion::new(1, 1, 0, 0).to_string(), "1.1.0.0");
    }
}
