//! Request and response headers.
//!
//! ```text
//! Request (23 bytes):
//! [0..16]   Client identity
//! [16]      Protocol version
//! [17..19]  Request code (u16 LE)
//! [19..23]  Payload length (u32 LE)
//!
//! Response (7 bytes):
//! [0]       Protocol version (always SERVER_VERSION)
//! [1..3]    Response code (u16 LE)
//! [3..7]    Payload length (u32 LE)
//! ```

use std::fmt;

use bytes::BufMut;

use crate::error::ProtocolError;

/// Client identity length in bytes.
pub const CLIENT_ID_LEN: usize = 16;

/// Request header size in bytes.
pub const REQUEST_HEADER_LEN: usize = 23;

/// Response header size in bytes.
pub const RESPONSE_HEADER_LEN: usize = 7;

/// Version stamped on every response.
pub const SERVER_VERSION: u8 = 3;

/// Width of every fixed name field (user name, file name).
pub const NAME_LEN: usize = 255;

/// Width of the public key field in a key update.
pub const PUBLIC_KEY_LEN: usize = 160;

/// 16-byte opaque client identity.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ClientId([u8; CLIENT_ID_LEN]);

impl ClientId {
    /// The identity presented by clients that have not registered yet.
    pub const ZERO: ClientId = ClientId([0u8; CLIENT_ID_LEN]);

    pub const fn from_bytes(bytes: [u8; CLIENT_ID_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; CLIENT_ID_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl TryFrom<&[u8]> for ClientId {
    type Error = std::array::TryFromSliceError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        Ok(Self(value.try_into()?))
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClientId({})", self.to_hex())
    }
}

/// Parsed request header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHeader {
    pub client_id: ClientId,
    pub version: u8,
    pub code: u16,
    pub payload_len: u32,
}

impl RequestHeader {
    /// Decode a header from exactly one header's worth of bytes.
    /// Extra trailing bytes are ignored.
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < REQUEST_HEADER_LEN {
            return Err(ProtocolError::MalformedHeader {
                expected: REQUEST_HEADER_LEN,
                actual: data.len(),
            });
        }
        let mut client_id = [0u8; CLIENT_ID_LEN];
        client_id.copy_from_slice(&data[0..16]);
        let version = data[16];
        let code = u16::from_le_bytes([data[17], data[18]]);
        let payload_len = u32::from_le_bytes([data[19], data[20], data[21], data[22]]);

        Ok(Self {
            client_id: ClientId(client_id),
            version,
            code,
            payload_len,
        })
    }

    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_slice(self.client_id.as_bytes());
        dst.put_u8(self.version);
        dst.put_u16_le(self.code);
        dst.put_u32_le(self.payload_len);
    }

    pub fn to_bytes(&self) -> [u8; REQUEST_HEADER_LEN] {
        let mut buf = [0u8; REQUEST_HEADER_LEN];
        self.encode(&mut &mut buf[..]);
        buf
    }
}

/// Parsed response header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    pub version: u8,
    pub code: u16,
    pub payload_len: u32,
}

impl ResponseHeader {
    pub fn new(code: u16, payload_len: u32) -> Self {
        Self {
            version: SERVER_VERSION,
            code,
            payload_len,
        }
    }

    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < RESPONSE_HEADER_LEN {
            return Err(ProtocolError::MalformedHeader {
                expected: RESPONSE_HEADER_LEN,
                actual: data.len(),
            });
        }
        Ok(Self {
            version: data[0],
            code: u16::from_le_bytes([data[1], data[2]]),
            payload_len: u32::from_le_bytes([data[3], data[4], data[5], data[6]]),
        })
    }

    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_u8(self.version);
        dst.put_u16_le(self.code);
        dst.put_u32_le(self.payload_len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_header_roundtrip() {
        let headers = [
            RequestHeader {
                client_id: ClientId::ZERO,
                version: 3,
                code: 825,
                payload_len: 255,
            },
            RequestHeader {
                client_id: ClientId::from_bytes([0xAB; 16]),
                version: 0xFF,
                code: u16::MAX,
                payload_len: u32::MAX,
            },
        ];

        for header in headers {
            let bytes = header.to_bytes();
            assert_eq!(RequestHeader::decode(&bytes).unwrap(), header);
        }
    }

    #[test]
    fn request_header_is_little_endian() {
        let header = RequestHeader {
            client_id: ClientId::from_bytes([1; 16]),
            version: 3,
            code: 828,
            payload_len: 0x0102_0304,
        };
        let bytes = header.to_bytes();
        assert_eq!(&bytes[0..16], &[1u8; 16]);
        assert_eq!(bytes[16], 3);
        assert_eq!(&bytes[17..19], &[0x3C, 0x03]);
        assert_eq!(&bytes[19..23], &[0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn short_header_is_malformed() {
        let err = RequestHeader::decode(&[0u8; 22]).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::MalformedHeader { expected: 23, actual: 22 }
        ));
    }

    #[test]
    fn response_header_roundtrip() {
        let header = ResponseHeader::new(1603, 279);
        let mut buf = Vec::new();
        header.encode(&mut buf);
        assert_eq!(buf.len(), RESPONSE_HEADER_LEN);
        assert_eq!(buf[0], SERVER_VERSION);
        assert_eq!(ResponseHeader::decode(&buf).unwrap(), header);
    }

    #[test]
    fn client_id_displays_as_hex() {
        let id = ClientId::from_bytes([0x0F; 16]);
        assert_eq!(id.to_string(), "0f".repeat(16));
    }
}
