//! Module file header (48 bytes).
//!
//! Layout:
//! - 0-3: magic `b"ILWV"`
//! - 4-5: format version
//! - 6-7: flags (reserved, must be zero)
//! - 8-11: payload length in bytes
//! - 12-43: SHA256 of the payload
//! - 44-47: reserved

use super::bytes::DecodeError;
use super::{MAGIC, VERSION};

/// Size of the encoded header.
pub const HEADER_SIZE: usize = 48;

/// File header preceding the module payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    pub magic: [u8; 4],
    pub version: u16,
    pub flags: u16,
    pub payload_len: u32,
    pub checksum: [u8; 32],
}

impl Header {
    /// Header for a payload.
    pub fn for_payload(payload: &[u8]) -> Self {
        Header {
            magic: MAGIC,
            version: VERSION,
            flags: 0,
            payload_len: payload.len() as u32,
            checksum: crate::util::hash::sha256_digest(payload),
        }
    }

    /// Decode the header from the start of a file.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() < HEADER_SIZE {
            return Err(DecodeError::new(
                bytes.len(),
                format!("file too short for header ({} bytes)", bytes.len()),
            ));
        }

        let mut checksum = [0u8; 32];
        checksum.copy_from_slice(&bytes[12..44]);

        Ok(Header {
            magic: [bytes[0], bytes[1], bytes[2], bytes[3]],
            version: u16::from_le_bytes([bytes[4], bytes[5]]),
            flags: u16::from_le_bytes([bytes[6], bytes[7]]),
            payload_len: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
            checksum,
        })
    }

    /// Encode header to 48 bytes.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4..6].copy_from_slice(&self.version.to_le_bytes());
        bytes[6..8].copy_from_slice(&self.flags.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.payload_len.to_le_bytes());
        bytes[12..44].copy_from_slice(&self.checksum);
        bytes
    }

    pub fn validate_magic(&self) -> bool {
        self.magic == MAGIC
    }

    pub fn validate_version(&self) -> bool {
        self.version == VERSION
    }

    /// Check magic, version, flags, length and checksum against the payload.
    pub fn validate(&self, payload: &[u8]) -> Result<(), DecodeError> {
        if !self.validate_magic() {
            return Err(DecodeError::new(0, "not a module file (bad magic)"));
        }
        if !self.validate_version() {
            return Err(DecodeError::new(
                4,
                format!(
                    "unsupported format version {} (expected {})",
                    self.version, VERSION
                ),
            ));
        }
        if self.flags != 0 {
            return Err(DecodeError::new(6, format!("unknown header flags {:#06x}", self.flags)));
        }
        if self.payload_len as usize != payload.len() {
            return Err(DecodeError::new(
                8,
                format!(
                    "payload length mismatch: header says {}, file has {}",
                    self.payload_len,
                    payload.len()
                ),
            ));
        }
        if crate::util::hash::sha256_digest(payload) != self.checksum {
            return Err(DecodeError::new(12, "checksum mismatch"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let header = Header::for_payload(b"payload");
        let decoded = Header::from_bytes(&header.to_bytes()).unwrap();
        assert_eq!(decoded, header);
        assert!(decoded.validate(b"payload").is_ok());
    }

    #[test]
    fn test_header_checksum_mismatch() {
        let header = Header::for_payload(b"payload");
        let err = header.validate(b"pAyload").unwrap_err();
        assert!(err.message.contains("checksum"));
    }

    #[test]
    fn test_header_bad_magic() {
        let mut bytes = Header::for_payload(b"").to_bytes();
        bytes[0] = b'X';
        let header = Header::from_bytes(&bytes).unwrap();
        assert!(header.validate(b"").unwrap_err().message.contains("magic"));
    }

    #[test]
    fn test_header_too_short() {
        assert!(Header::from_bytes(&[0u8; 10]).is_err());
    }
}
