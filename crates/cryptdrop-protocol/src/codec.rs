//! Stream framing for the server side of a connection.
//!
//! Bytes arrive in arbitrary pieces. The decoder buffers until a whole
//! header is present, then until the whole payload is present, and only
//! then yields a frame. Payloads above `max_payload` are not buffered:
//! the header is yielded as `Inbound::Oversized` and the payload bytes are
//! skipped as they arrive.

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use crate::error::ProtocolError;
use crate::header::{REQUEST_HEADER_LEN, RequestHeader};
use crate::response::Response;

/// Default payload cap (16 MB).
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// One unit handed to the session layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Frame {
        header: RequestHeader,
        payload: Bytes,
    },
    /// Declared payload exceeds the cap; its bytes are being discarded.
    Oversized(RequestHeader),
}

#[derive(Debug, Clone, Copy)]
enum DecodeState {
    Header,
    Payload(RequestHeader),
    Discard { remaining: usize },
}

/// Request decoder / response encoder.
#[derive(Debug)]
pub struct ServerCodec {
    state: DecodeState,
    max_payload: usize,
}

impl ServerCodec {
    pub fn new(max_payload: usize) -> Self {
        Self {
            state: DecodeState::Header,
            max_payload,
        }
    }
}

impl Default for ServerCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAYLOAD)
    }
}

impl Decoder for ServerCodec {
    type Item = Inbound;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Inbound>, ProtocolError> {
        loop {
            match self.state {
                DecodeState::Header => {
                    if src.len() < REQUEST_HEADER_LEN {
                        src.reserve(REQUEST_HEADER_LEN - src.len());
                        return Ok(None);
                    }
                    let header = RequestHeader::decode(&src[..REQUEST_HEADER_LEN])?;
                    src.advance(REQUEST_HEADER_LEN);

                    let len = header.payload_len as usize;
                    if len > self.max_payload {
                        self.state = DecodeState::Discard { remaining: len };
                        return Ok(Some(Inbound::Oversized(header)));
                    }
                    self.state = DecodeState::Payload(header);
                }
                DecodeState::Payload(header) => {
                    let len = header.payload_len as usize;
                    if src.len() < len {
                        src.reserve(len - src.len());
                        return Ok(None);
                    }
                    let payload = src.split_to(len).freeze();
                    self.state = DecodeState::Header;
                    return Ok(Some(Inbound::Frame { header, payload }));
                }
                DecodeState::Discard { remaining } => {
                    let n = remaining.min(src.len());
                    src.advance(n);
                    if n < remaining {
                        self.state = DecodeState::Discard {
                            remaining: remaining - n,
                        };
                        return Ok(None);
                    }
                    self.state = DecodeState::Header;
                }
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Inbound>, ProtocolError> {
        match self.decode(buf)? {
            Some(frame) => Ok(Some(frame)),
            None => {
                if !buf.is_empty() {
                    debug!("Peer closed with {} bytes of an incomplete frame", buf.len());
                    buf.clear();
                }
                Ok(None)
            }
        }
    }
}

impl Encoder<Response> for ServerCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Response, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        item.encode(dst);
        Ok(())
    }
}
