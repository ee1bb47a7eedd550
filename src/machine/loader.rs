//! The binary loader: parse and validate the versioned container format.
//!
//! Layout (all integers little-endian, strings raw bytes):
//!
//! ```text
//! u16  header_size            incl. this field
//! u8   header_version_major   = 1
//! u8   header_version_minor   = 0
//! u16  header_version_rev     = 0 (written high byte first; see below)
//! u8   machine_name_len
//! ..   machine_name           = "Pendragon"
//! u8   machine_version_major  = 1
//! u8   machine_version_minor  = 0
//! u16  machine_version_rev    = 0
//! u16  program_name_len       truncated to 32 at write
//! ..   program_name
//! u32  data_segment_size      ‖ data bytes
//! u32  code_segment_size      ‖ code bytes
//! ```
//!
//! The writer emits version revisions as `rev_hi, rev_lo`; since only
//! revision 0 is accepted, the parse below (little-endian) matches the
//! written byte sequence exactly.

use derive_more::{Display, Error};

use crate::common::Byte;
use crate::isa::{HEADER_VERSION, MACHINE_NAME, MACHINE_VERSION};

/// Loader failures.
#[derive(Clone, PartialEq, Eq, Debug, Display, Error)]
pub enum LoadError {
    #[display("invalid binary: {reason}")]
    InvalidBinary { reason: String },
    #[display("machine mismatch: {reason}")]
    MachineMismatch { reason: String },
}

fn invalid(reason: impl Into<String>) -> LoadError {
    LoadError::InvalidBinary {
        reason: reason.into(),
    }
}

/// A three-part version as stored in the header.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
#[display("{major}.{minor}.{revision}")]
pub struct Version {
    pub major: u8,
    pub minor: u8,
    pub revision: u16,
}

impl From<(u8, u8, u16)> for Version {
    fn from((major, minor, revision): (u8, u8, u16)) -> Self {
        Version {
            major,
            minor,
            revision,
        }
    }
}

/// The parsed header.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Header {
    pub header_size: u16,
    pub header_version: Version,
    pub machine_name: String,
    pub machine_version: Version,
    pub program_name: String,
}

/// A parsed, validated binary.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Binary {
    pub header: Header,
    pub data: Vec<Byte>,
    pub code: Vec<Byte>,
}

/// A bounds-checked cursor over the input slice.
struct Reader<'a> {
    data: &'a [Byte],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [Byte]) -> Self {
        Reader { data, pos: 0 }
    }

    fn take(&mut self, len: usize, what: &str) -> Result<&'a [Byte], LoadError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| invalid(format!("unexpected end of data reading {what}")))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self, what: &str) -> Result<u8, LoadError> {
        Ok(self.take(1, what)?[0])
    }

    fn u16(&mut self, what: &str) -> Result<u16, LoadError> {
        let bytes = self.take(2, what)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn u32(&mut self, what: &str) -> Result<u32, LoadError> {
        let bytes = self.take(4, what)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn string(&mut self, len: usize, what: &str) -> Result<String, LoadError> {
        let bytes = self.take(len, what)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    fn version(&mut self, what: &str) -> Result<Version, LoadError> {
        Ok(Version {
            major: self.u8(what)?,
            minor: self.u8(what)?,
            revision: self.u16(what)?,
        })
    }
}

impl Binary {
    /// Parse a byte slice into header plus data and code segments.
    pub fn parse(data: &[Byte]) -> Result<Binary, LoadError> {
        let mut reader = Reader::new(data);

        let header_size = reader.u16("header size")?;
        let header_version = reader.version("header version")?;
        let machine_name_len = reader.u8("machine name size")?;
        let machine_name = reader.string(machine_name_len.into(), "machine name")?;
        let machine_version = reader.version("machine version")?;
        let program_name_len = reader.u16("program name size")?;
        let program_name = reader.string(program_name_len.into(), "program name")?;

        let header = Header {
            header_size,
            header_version,
            machine_name,
            machine_version,
            program_name,
        };
        header.validate()?;

        let data_len = reader.u32("data segment size")?;
        let data_segment = reader.take(data_len as usize, "data segment")?.to_vec();
        let code_len = reader.u32("code segment size")?;
        let code_segment = reader.take(code_len as usize, "code segment")?.to_vec();

        Ok(Binary {
            header,
            data: data_segment,
            code: code_segment,
        })
    }
}

impl Header {
    fn validate(&self) -> Result<(), LoadError> {
        let supported = Version::from(HEADER_VERSION);
        if self.header_version != supported {
            return Err(invalid(format!(
                "unsupported binary format version {} (expected {supported})",
                self.header_version
            )));
        }
        if self.machine_name != MACHINE_NAME {
            return Err(LoadError::MachineMismatch {
                reason: format!(
                    "binary is for machine '{}' but this is '{MACHINE_NAME}'",
                    self.machine_name
                ),
            });
        }
        let machine = Version::from(MACHINE_VERSION);
        if self.machine_version != machine {
            return Err(LoadError::MachineMismatch {
                reason: format!(
                    "binary requires machine version {} but this is {machine}",
                    self.machine_version
                ),
            });
        }
        Ok(())
    }
}
