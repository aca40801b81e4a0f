use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{node::NodeId, store::BatchOp};

/// The current format version of the TreeDB log file.
const VERSION: u32 = 1;

/// A special sequence of bytes that is used at the beginning of the log file for validation.
const MAGIC: u32 = 0x7EED_B0B1;

/// Represents the header of a TreeDB log file.
///
/// ```plain
/// ┌───────┬─────────┬─────────┬─────────┬─────────┬─────┐
/// │ Magic │ Version │ Frame 0 │ Frame 1 │ Frame 2 │ ••• │
/// └───────┴─────────┴─────────┴─────────┴─────────┴─────┘
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Header {
    magic: u32,
    version: u32,
}

#[derive(Error, Debug)]
pub(crate) enum ValidationError {
    #[error("the TreeDB log file is invalid")]
    FileInvalid,
    #[error("the file format version is mismatched")]
    VersionMismatched,
}

impl Header {
    pub(crate) const SIZE: usize = 8;

    #[inline]
    pub(crate) fn new() -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
        }
    }

    #[inline]
    pub(crate) fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0; Self::SIZE];
        bytes[..4].copy_from_slice(&self.magic.to_le_bytes());
        bytes[4..].copy_from_slice(&self.version.to_le_bytes());
        bytes
    }

    /// Decodes the header and checks the magic number and version.
    pub(crate) fn from_bytes(bytes: &[u8]) -> Result<Self, ValidationError> {
        let word = |range: std::ops::Range<usize>| {
            bytes
                .get(range)
                .and_then(|b| b.try_into().ok())
                .map(u32::from_le_bytes)
                .ok_or(ValidationError::FileInvalid)
        };

        let header = Self {
            magic: word(0..4)?,
            version: word(4..8)?,
        };
        if header.magic != MAGIC {
            Err(ValidationError::FileInvalid)
        } else if header.version != VERSION {
            Err(ValidationError::VersionMismatched)
        } else {
            Ok(header)
        }
    }
}

/// A record appended to the log.
///
/// Ops only take effect once the `Commit` that closes their batch is in the log, so a
/// batch torn by a crash is dropped as a whole on replay.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) enum Record<K, V> {
    Op(BatchOp<K, V>),
    Commit,
    Root { id: Option<NodeId> },
}

/// The id-only view of a record, enough to rebuild the offset index without decoding
/// keys and values.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) enum RecordHead {
    Op(OpHead),
    Commit,
    Root { id: Option<NodeId> },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub(crate) enum OpHead {
    Put { id: NodeId },
    Delete { id: NodeId },
}

#[derive(Error, Debug, PartialEq, Eq)]
pub(crate) enum FrameError {
    #[error("the frame is truncated")]
    Truncated,
    #[error("the frame checksum is mismatched")]
    ChecksumMismatched,
    #[error("a payload of {0} bytes does not fit in a frame")]
    Oversized(usize),
}

/// A length-prefixed, checksummed frame carrying one encoded record.
///
/// ```plain
/// ┌─────┬───────┬───────────────────┐
/// │ Len │ CRC32 │      Payload      │
/// └─────┴───────┴───────────────────┘
/// ```
pub(crate) struct Frame;

impl Frame {
    pub(crate) const HEADER_SIZE: usize = 8;

    /// Appends a frame holding `payload` to `buf`.
    pub(crate) fn encode(payload: &[u8], buf: &mut Vec<u8>) -> Result<(), FrameError> {
        let len = Self::encoded_len(payload.len())?;
        buf.reserve(Self::HEADER_SIZE + payload.len());
        buf.extend_from_slice(&len.to_le_bytes());
        buf.extend_from_slice(&crc32fast::hash(payload).to_le_bytes());
        buf.extend_from_slice(payload);
        Ok(())
    }

    /// The length prefix for a payload of `len` bytes.
    #[inline]
    fn encoded_len(len: usize) -> Result<u32, FrameError> {
        u32::try_from(len).map_err(|_| FrameError::Oversized(len))
    }

    /// The payload length announced by a frame header.
    #[inline]
    pub(crate) fn payload_len(header: &[u8]) -> Result<usize, FrameError> {
        header
            .get(..4)
            .and_then(|b| b.try_into().ok())
            .map(|b| u32::from_le_bytes(b) as usize)
            .ok_or(FrameError::Truncated)
    }

    /// Decodes the frame at the start of `bytes`, returning its payload and its total size.
    pub(crate) fn decode(bytes: &[u8]) -> Result<(&[u8], usize), FrameError> {
        let len = Self::payload_len(bytes)?;
        let checksum = bytes
            .get(4..Self::HEADER_SIZE)
            .and_then(|b| b.try_into().ok())
            .map(u32::from_le_bytes)
            .ok_or(FrameError::Truncated)?;

        let end = Self::HEADER_SIZE + len;
        let payload = bytes
            .get(Self::HEADER_SIZE..end)
            .ok_or(FrameError::Truncated)?;

        if crc32fast::hash(payload) != checksum {
            return Err(FrameError::ChecksumMismatched);
        }
        Ok((payload, end))
    }
}
