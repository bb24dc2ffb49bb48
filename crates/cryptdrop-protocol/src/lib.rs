/// Cryptdrop wire protocol.
///
/// Byte-exact codec for the encrypted file upload protocol:
/// - 23-byte request header / 7-byte response header, little-endian
/// - Fixed-width, null-padded string fields decoded permissively
/// - Seven request payload layouts and eight response layouts
/// - Stream framing over partial reads (`ServerCodec`)

pub mod codec;
pub mod error;
pub mod header;
pub mod request;
pub mod response;

// Re-export key types for convenience.
pub use codec::{Inbound, ServerCodec};
pub use error::ProtocolError;
pub use header::{
    CLIENT_ID_LEN, ClientId, NAME_LEN, PUBLIC_KEY_LEN, REQUEST_HEADER_LEN, RESPONSE_HEADER_LEN,
    RequestHeader, ResponseHeader, SERVER_VERSION,
};
pub use request::{CrcStatus, FileChunk, Request, RequestCode, decode_payload};
pub use response::{Response, ResponseCode};
