//! Request payload layouts.
//!
//! ```text
//! 825 Register      [0..255]   name
//! 826 PublicKey     [0..255]   name, [255..415] public key
//! 827 Reconnect     [0..255]   name
//! 828 FileChunk     [0..4]     content size (u32 LE)
//!                   [4..8]     original file size (u32 LE)
//!                   [8..10]    chunk sequence number (u16 LE)
//!                   [10..12]   total chunk count (u16 LE)
//!                   [12..267]  file name
//!                   [267..]    chunk content
//! 900/901/902 Crc   [0..255]   file name (a shorter payload is the whole name)
//!                   [255..]    ignored (some clients append their CRC-32)
//! ```

use bytes::Bytes;

use crate::error::ProtocolError;
use crate::header::{NAME_LEN, PUBLIC_KEY_LEN};

/// Offset of chunk content inside a 828 payload.
pub const FILE_CHUNK_PREFIX_LEN: usize = 12 + NAME_LEN;

/// Numeric request codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum RequestCode {
    Register = 825,
    PublicKey = 826,
    Reconnect = 827,
    FileChunk = 828,
    CrcValid = 900,
    CrcRetry = 901,
    CrcAbort = 902,
}

impl TryFrom<u16> for RequestCode {
    type Error = u16;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            825 => Ok(Self::Register),
            826 => Ok(Self::PublicKey),
            827 => Ok(Self::Reconnect),
            828 => Ok(Self::FileChunk),
            900 => Ok(Self::CrcValid),
            901 => Ok(Self::CrcRetry),
            902 => Ok(Self::CrcAbort),
            other => Err(other),
        }
    }
}

/// Client verdict after comparing its checksum with the server's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrcStatus {
    /// Checksums match.
    Valid,
    /// Mismatch, the client will send the whole file again.
    Retry,
    /// Mismatch, the client gave up.
    Abort,
}

/// One piece of an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChunk {
    pub content_size: u32,
    pub orig_file_size: u32,
    pub sequence: u16,
    pub total_chunks: u16,
    pub file_name: String,
    pub content: Bytes,
}

/// Decoded request payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Register { name: String },
    PublicKey { name: String, public_key: Bytes },
    Reconnect { name: String },
    FileChunk(FileChunk),
    Crc { status: CrcStatus, file_name: String },
    /// Unrecognized code. Carries no payload fields.
    Unknown { code: u16 },
}

/// Decode a payload according to its request code.
pub fn decode_payload(code: u16, payload: Bytes) -> Result<Request, ProtocolError> {
    let Ok(kind) = RequestCode::try_from(code) else {
        return Ok(Request::Unknown { code });
    };

    let request = match kind {
        RequestCode::Register => {
            require_len(code, &payload, NAME_LEN)?;
            Request::Register {
                name: decode_str(&payload[..NAME_LEN]),
            }
        }
        RequestCode::PublicKey => {
            require_len(code, &payload, NAME_LEN + PUBLIC_KEY_LEN)?;
            Request::PublicKey {
                name: decode_str(&payload[..NAME_LEN]),
                public_key: payload.slice(NAME_LEN..NAME_LEN + PUBLIC_KEY_LEN),
            }
        }
        RequestCode::Reconnect => {
            require_len(code, &payload, NAME_LEN)?;
            Request::Reconnect {
                name: decode_str(&payload[..NAME_LEN]),
            }
        }
        RequestCode::FileChunk => {
            require_len(code, &payload, FILE_CHUNK_PREFIX_LEN)?;
            Request::FileChunk(FileChunk {
                content_size: u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]),
                orig_file_size: u32::from_le_bytes([payload[4], payload[5], payload[6], payload[7]]),
                sequence: u16::from_le_bytes([payload[8], payload[9]]),
                total_chunks: u16::from_le_bytes([payload[10], payload[11]]),
                file_name: decode_str(&payload[12..FILE_CHUNK_PREFIX_LEN]),
                content: payload.slice(FILE_CHUNK_PREFIX_LEN..),
            })
        }
        RequestCode::CrcValid | RequestCode::CrcRetry | RequestCode::CrcAbort => {
            let status = match kind {
                RequestCode::CrcValid => CrcStatus::Valid,
                RequestCode::CrcRetry => CrcStatus::Retry,
                _ => CrcStatus::Abort,
            };
            Request::Crc {
                status,
                file_name: decode_str(&payload[..payload.len().min(NAME_LEN)]),
            }
        }
    };

    Ok(request)
}

/// Decode a null-padded string field, replacing invalid UTF-8.
/// The string ends at the first NUL.
pub fn decode_str(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// Write `s` into a fixed-width null-padded field, truncating if needed.
pub fn encode_str(dst: &mut impl bytes::BufMut, s: &str, width: usize) {
    let bytes = s.as_bytes();
    let n = bytes.len().min(width);
    dst.put_slice(&bytes[..n]);
    dst.put_bytes(0, width - n);
}

fn require_len(code: u16, payload: &[u8], expected: usize) -> Result<(), ProtocolError> {
    if payload.len() < expected {
        return Err(ProtocolError::TruncatedPayload {
            code,
            expected,
            actual: payload.len(),
        });
    }
    Ok(())
}
