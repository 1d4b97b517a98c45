//! Wire framing: `[0x47 0x44] [type] [payload..] [checksum]`.
//!
//! Inbound datagrams are validated into a borrowed [`Frame`] view. Outbound
//! frames are assembled into a fixed-capacity [`OutboundFrame`] with a fresh
//! trailer from [`crate::checksum`].

use arrayvec::ArrayVec;
use serde::{Deserialize, Serialize};
use static_assertions::{const_assert, const_assert_eq};
use thiserror::Error;

use crate::checksum;

pub const HEADER: [u8; 2] = [0x47, 0x44];

/// The heartbeat is a fixed byte sequence. Its trailer is not the codec
/// checksum of the first three bytes, so it is matched exactly.
pub const HEARTBEAT_FRAME: [u8; 4] = [0x47, 0x44, 0x04, 0x1B];

/// Header + type + checksum.
pub const MIN_FRAME_SIZE: usize = 4;
/// Largest defined frame (SetThruster: index byte + f32).
pub const MAX_FRAME_SIZE: usize = 9;
/// Largest datagram the driver will stage. Anything longer can never be a
/// valid frame.
pub const MAX_DATAGRAM_SIZE: usize = 32;

const TYPE_OFFSET: usize = 2;
const PAYLOAD_OFFSET: usize = 3;

const_assert_eq!(HEARTBEAT_FRAME.len(), MIN_FRAME_SIZE);
const_assert!(MAX_FRAME_SIZE <= MAX_DATAGRAM_SIZE);
const_assert!(MIN_FRAME_SIZE == HEADER.len() + 2);

pub const MAX_PAYLOAD_SIZE: usize = MAX_FRAME_SIZE - MIN_FRAME_SIZE;

pub type Datagram = heapless::Vec<u8, MAX_DATAGRAM_SIZE>;
pub type Payload = ArrayVec<u8, MAX_PAYLOAD_SIZE>;
pub type OutboundFrame = ArrayVec<u8, MAX_FRAME_SIZE>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame too short ({len} bytes)")]
    TooShort { len: usize },
    #[error("bad header {0:#04x} {1:#04x}")]
    BadHeader(u8, u8),
    #[error("checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    BadChecksum { expected: u8, actual: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("payload of {len} bytes does not fit in a frame")]
pub struct PayloadTooLarge {
    pub len: usize,
}

/// A validated inbound frame borrowed from the staged datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    bytes: &'a [u8],
}

impl<'a> Frame<'a> {
    /// Validate header and trailer. Does not look at the type byte.
    pub fn parse(bytes: &'a [u8]) -> Result<Self, FrameError> {
        if bytes.len() < MIN_FRAME_SIZE {
            return Err(FrameError::TooShort { len: bytes.len() });
        }
        if bytes[..HEADER.len()] != HEADER {
            return Err(FrameError::BadHeader(bytes[0], bytes[1]));
        }

        if !checksum::verify(bytes) {
            let (&actual, body) = bytes
                .split_last()
                .ok_or(FrameError::TooShort { len: 0 })?;
            return Err(FrameError::BadChecksum {
                expected: checksum::checksum(body),
                actual,
            });
        }

        Ok(Self { bytes })
    }

    pub fn type_code(&self) -> u8 {
        self.bytes[TYPE_OFFSET]
    }

    /// Bytes between the type code and the checksum trailer.
    pub fn payload(&self) -> &'a [u8] {
        &self.bytes[PAYLOAD_OFFSET..self.bytes.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }
}

/// What is kept of a datagram too long to stage: its type code and length.
///
/// No defined frame carries more than [`MAX_PAYLOAD_SIZE`] payload bytes, so
/// these two are all the dispatcher needs to answer it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OversizedFrame {
    type_code: u8,
    len: usize,
}

impl OversizedFrame {
    /// Validate `bytes` like [`Frame::parse`] and keep only the summary.
    pub fn parse(bytes: &[u8]) -> Result<Self, FrameError> {
        let frame = Frame::parse(bytes)?;
        Ok(Self {
            type_code: frame.type_code(),
            len: frame.len(),
        })
    }

    pub fn type_code(&self) -> u8 {
        self.type_code
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

pub fn is_heartbeat(bytes: &[u8]) -> bool {
    bytes == HEARTBEAT_FRAME
}

/// Assemble `header + type_code + payload + checksum`.
pub fn encode(type_code: u8, payload: &[u8]) -> Result<OutboundFrame, PayloadTooLarge> {
    let payload =
        Payload::try_from(payload).map_err(|_| PayloadTooLarge { len: payload.len() })?;
    Ok(encode_payload(type_code, &payload))
}

pub fn encode_payload(type_code: u8, payload: &Payload) -> OutboundFrame {
    let mut frame = OutboundFrame::new();
    frame.extend(HEADER);
    frame.push(type_code);
    frame.extend(payload.iter().copied());
    let trailer = checksum::checksum(&frame);
    frame.push(trailer);
    frame
}

/// Byte order of the f32 carried by SetThruster.
///
/// Both endpoints must agree; nothing on the wire says which one is in use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FloatByteOrder {
    #[default]
    Little,
    Big,
}

impl FloatByteOrder {
    pub fn decode(self, bytes: [u8; 4]) -> f32 {
        match self {
            FloatByteOrder::Little => f32::from_le_bytes(bytes),
            FloatByteOrder::Big => f32::from_be_bytes(bytes),
        }
    }

    pub fn encode(self, value: f32) -> [u8; 4] {
        match self {
            FloatByteOrder::Little => value.to_le_bytes(),
            FloatByteOrder::Big => value.to_be_bytes(),
        }
    }
}

impl core::str::FromStr for FloatByteOrder {
    type Err = alloc::string::String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "little" | "le" => Ok(FloatByteOrder::Little),
            "big" | "be" => Ok(FloatByteOrder::Big),
            other => Err(alloc::format!("unknown byte order '{other}'")),
        }
    }
}
