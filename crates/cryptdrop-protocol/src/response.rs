use bytes::{BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;
use crate::header::{CLIENT_ID_LEN, ClientId, NAME_LEN, RESPONSE_HEADER_LEN, ResponseHeader};
use crate::request::{decode_str, encode_str};

/// Numeric response codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ResponseCode {
    RegistrationOk = 1600,
    RegistrationFailed = 1601,
    PublicKeyAccepted = 1602,
    FileAccepted = 1603,
    Accepted = 1604,
    ReconnectOk = 1605,
    ReconnectDenied = 1606,
    GeneralError = 1607,
}

/// Server response. Exactly one is produced per decoded request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    RegistrationOk {
        client_id: ClientId,
    },
    RegistrationFailed,
    PublicKeyAccepted {
        client_id: ClientId,
        encrypted_key: Bytes,
    },
    FileAccepted {
        client_id: ClientId,
        content_size: u32,
        file_name: String,
        checksum: u32,
    },
    Accepted {
        client_id: ClientId,
    },
    ReconnectOk {
        client_id: ClientId,
        encrypted_key: Bytes,
    },
    ReconnectDenied {
        client_id: ClientId,
    },
    GeneralError {
        client_id: ClientId,
    },
}

impl Response {
    pub fn code(&self) -> ResponseCode {
        match self {
            Self::RegistrationOk { .. } => ResponseCode::RegistrationOk,
            Self::RegistrationFailed => ResponseCode::RegistrationFailed,
            Self::PublicKeyAccepted { .. } => ResponseCode::PublicKeyAccepted,
            Self::FileAccepted { .. } => ResponseCode::FileAccepted,
            Self::Accepted { .. } => ResponseCode::Accepted,
            Self::ReconnectOk { .. } => ResponseCode::ReconnectOk,
            Self::ReconnectDenied { .. } => ResponseCode::ReconnectDenied,
            Self::GeneralError { .. } => ResponseCode::GeneralError,
        }
    }

    pub fn payload_len(&self) -> usize {
        match self {
            Self::RegistrationFailed => 0,
            Self::RegistrationOk { .. }
            | Self::Accepted { .. }
            | Self::ReconnectDenied { .. }
            | Self::GeneralError { .. } => CLIENT_ID_LEN,
            Self::PublicKeyAccepted { encrypted_key, .. }
            | Self::ReconnectOk { encrypted_key, .. } => CLIENT_ID_LEN + encrypted_key.len(),
            Self::FileAccepted { .. } => CLIENT_ID_LEN + 4 + NAME_LEN + 4,
        }
    }

    /// Append header and payload to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) {
        let payload_len = self.payload_len();
        dst.reserve(RESPONSE_HEADER_LEN + payload_len);
        ResponseHeader::new(self.code() as u16, payload_len as u32).encode(dst);

        match self {
            Self::RegistrationFailed => {}
            Self::RegistrationOk { client_id }
            | Self::Accepted { client_id }
            | Self::ReconnectDenied { client_id }
            | Self::GeneralError { client_id } => {
                dst.put_slice(client_id.as_bytes());
            }
            Self::PublicKeyAccepted {
                client_id,
                encrypted_key,
            }
            | Self::ReconnectOk {
                client_id,
                encrypted_key,
            } => {
                dst.put_slice(client_id.as_bytes());
                dst.put_slice(encrypted_key);
            }
            Self::FileAccepted {
                client_id,
                content_size,
                file_name,
                checksum,
            } => {
                dst.put_slice(client_id.as_bytes());
                dst.put_u32_le(*content_size);
                encode_str(dst, file_name, NAME_LEN);
                dst.put_u32_le(*checksum);
            }
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Decode a response payload. Used by clients and tests.
    pub fn decode(header: &ResponseHeader, payload: &[u8]) -> Result<Self, ProtocolError> {
        let need = |expected: usize| -> Result<(), ProtocolError> {
            if payload.len() < expected {
                return Err(ProtocolError::TruncatedPayload {
                    code: header.code,
                    expected,
                    actual: payload.len(),
                });
            }
            Ok(())
        };
        let client_id = |p: &[u8]| ClientId::try_from(&p[..CLIENT_ID_LEN]).unwrap_or_default();

        let response = match header.code {
            1600 => {
                need(CLIENT_ID_LEN)?;
                Self::RegistrationOk {
                    client_id: client_id(payload),
                }
            }
            1602 | 1605 => {
                need(CLIENT_ID_LEN)?;
                let client_id = client_id(payload);
                let encrypted_key = Bytes::copy_from_slice(&payload[CLIENT_ID_LEN..]);
                if header.code == 1602 {
                    Self::PublicKeyAccepted {
                        client_id,
                        encrypted_key,
                    }
                } else {
                    Self::ReconnectOk {
                        client_id,
                        encrypted_key,
                    }
                }
            }
            1603 => {
                need(CLIENT_ID_LEN + 4 + NAME_LEN + 4)?;
                let size_at = CLIENT_ID_LEN;
                let name_at = size_at + 4;
                let crc_at = name_at + NAME_LEN;
                Self::FileAccepted {
                    client_id: client_id(payload),
                    content_size: u32::from_le_bytes(
                        payload[size_at..name_at].try_into().unwrap_or_default(),
                    ),
                    file_name: decode_str(&payload[name_at..crc_at]),
                    checksum: u32::from_le_bytes(
                        payload[crc_at..crc_at + 4].try_into().unwrap_or_default(),
                    ),
                }
            }
            1604 | 1606 | 1607 => {
                need(CLIENT_ID_LEN)?;
                let client_id = client_id(payload);
                match header.code {
                    1604 => Self::Accepted { client_id },
                    1606 => Self::ReconnectDenied { client_id },
                    _ => Self::GeneralError { client_id },
                }
            }
            1601 => Self::RegistrationFailed,
            _ => Self::GeneralError {
                client_id: ClientId::ZERO,
            },
        };

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> ClientId {
        ClientId::from_bytes(*b"0123456789abcdef")
    }

    #[test]
    fn registration_failed_has_empty_payload() {
        let bytes = Response::RegistrationFailed.to_bytes();
        assert_eq!(&bytes[..], &[3, 0x41, 0x06, 0, 0, 0, 0]);
    }

    #[test]
    fn accepted_carries_identity() {
        let bytes = Response::Accepted { client_id: id() }.to_bytes();
        assert_eq!(bytes.len(), RESPONSE_HEADER_LEN + CLIENT_ID_LEN);
        let header = ResponseHeader::decode(&bytes).unwrap();
        assert_eq!(header.code, 1604);
        assert_eq!(header.payload_len, 16);
        assert_eq!(&bytes[RESPONSE_HEADER_LEN..], id().as_bytes());
    }

    #[test]
    fn file_accepted_layout() {
        let response = Response::FileAccepted {
            client_id: id(),
            content_size: 0x1122_3344,
            file_name: "notes.txt".into(),
            checksum: 0xCAFE_BABE,
        };
        let bytes = response.to_bytes();
        assert_eq!(bytes.len(), RESPONSE_HEADER_LEN + 279);

        let payload = &bytes[RESPONSE_HEADER_LEN..];
        assert_eq!(&payload[16..20], &[0x44, 0x33, 0x22, 0x11]);
        assert_eq!(&payload[20..29], b"notes.txt");
        assert!(payload[29..275].iter().all(|&b| b == 0));
        assert_eq!(&payload[275..279], &0xCAFE_BABEu32.to_le_bytes());

        let header = ResponseHeader::decode(&bytes).unwrap();
        assert_eq!(Response::decode(&header, payload).unwrap(), response);
    }

    #[test]
    fn key_responses_append_encrypted_key() {
        let response = Response::ReconnectOk {
            client_id: id(),
            encrypted_key: Bytes::from_static(&[9u8; 128]),
        };
        let bytes = response.to_bytes();
        let header = ResponseHeader::decode(&bytes).unwrap();
        assert_eq!(header.code, 1605);
        assert_eq!(header.payload_len as usize, 16 + 128);
        assert_eq!(
            Response::decode(&header, &bytes[RESPONSE_HEADER_LEN..]).unwrap(),
            response
        );
    }
}
