//! Reassembly of chunked uploads.
//!
//! One table holds every in-progress upload, indexed by
//! (client identity, file name). Each session records the connection that
//! owns it: a chunk for the same key from a different connection is refused,
//! and closing a connection drops every session it owns.
//!
//! Chunks are appended in arrival order. A transfer completes when a chunk's
//! sequence number equals the total chunk count declared by the first chunk.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;

use bytes::BytesMut;
use cryptdrop_protocol::{ClientId, FileChunk};
use thiserror::Error;

/// Stable per-socket identifier, assigned on accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransferError {
    #[error("size mismatch for {file_name}: declared {expected} bytes, received {actual}")]
    SizeMismatch {
        file_name: String,
        expected: usize,
        actual: usize,
    },

    #[error("{file_name} is already being uploaded on {owner}")]
    TransferInProgress {
        file_name: String,
        owner: ConnectionId,
    },

    #[error("{file_name} declares {declared} bytes, limit is {limit}")]
    ContentTooLarge {
        file_name: String,
        declared: usize,
        limit: usize,
    },

    #[error("{conn} already has {limit} uploads in progress")]
    TooManyTransfers { conn: ConnectionId, limit: usize },
}

/// Default cap on the declared (encrypted) size of one upload.
pub const DEFAULT_MAX_CONTENT_SIZE: usize = 1024 * 1024 * 1024;

/// Default cap on unfinished uploads owned by one connection.
pub const DEFAULT_MAX_TRANSFERS_PER_CONNECTION: usize = 16;

/// Bounds on what clients can make the table hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferLimits {
    pub max_content_size: usize,
    pub max_transfers_per_connection: usize,
}

impl Default for TransferLimits {
    fn default() -> Self {
        Self {
            max_content_size: DEFAULT_MAX_CONTENT_SIZE,
            max_transfers_per_connection: DEFAULT_MAX_TRANSFERS_PER_CONNECTION,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TransferKey {
    client_id: ClientId,
    file_name: String,
}

/// Reassembly state for one upload.
#[derive(Debug)]
struct TransferSession {
    owner: ConnectionId,
    buffer: BytesMut,
    content_size: u32,
    orig_file_size: u32,
    total_chunks: u16,
    chunks_received: u32,
}

/// A fully received upload, still encrypted.
#[derive(Debug)]
pub struct CompletedTransfer {
    pub file_name: String,
    pub content: BytesMut,
    pub content_size: u32,
    pub orig_file_size: u32,
    pub chunks_received: u32,
}

/// Result of accepting one chunk.
#[derive(Debug)]
pub enum ChunkOutcome {
    Pending { received: u32, total: u16 },
    Complete(CompletedTransfer),
}

#[derive(Debug, Default)]
pub struct TransferTable {
    sessions: HashMap<TransferKey, TransferSession>,
    limits: TransferLimits,
}

impl TransferTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: TransferLimits) -> Self {
        Self {
            sessions: HashMap::new(),
            limits,
        }
    }

    /// Append a chunk to its session, creating the session on first sight.
    ///
    /// The session is removed when the upload completes or fails, so nothing
    /// outlives the response to the final chunk. Buffers grow with the bytes
    /// actually received, never with the size a client declares.
    pub fn accept_chunk(
        &mut self,
        conn: ConnectionId,
        client_id: ClientId,
        chunk: FileChunk,
    ) -> Result<ChunkOutcome, TransferError> {
        let key = TransferKey {
            client_id,
            file_name: chunk.file_name,
        };

        if !self.sessions.contains_key(&key) {
            self.check_new_session(conn, &key, chunk.content_size)?;
        }

        let mut entry = match self.sessions.entry(key) {
            Entry::Occupied(entry) => entry,
            Entry::Vacant(entry) => entry.insert_entry(TransferSession {
                owner: conn,
                buffer: BytesMut::new(),
                content_size: chunk.content_size,
                orig_file_size: chunk.orig_file_size,
                total_chunks: chunk.total_chunks,
                chunks_received: 0,
            }),
        };

        let owner = entry.get().owner;
        if owner != conn {
            return Err(TransferError::TransferInProgress {
                file_name: entry.key().file_name.clone(),
                owner,
            });
        }

        let expected = entry.get().content_size as usize;
        let actual = entry.get().buffer.len() + chunk.content.len();
        if actual > expected {
            let (key, _) = entry.remove_entry();
            return Err(TransferError::SizeMismatch {
                file_name: key.file_name,
                expected,
                actual,
            });
        }

        let session = entry.get_mut();
        session.buffer.extend_from_slice(&chunk.content);
        session.chunks_received += 1;

        if chunk.sequence != session.total_chunks {
            return Ok(ChunkOutcome::Pending {
                received: session.chunks_received,
                total: session.total_chunks,
            });
        }

        let (key, session) = entry.remove_entry();
        if session.buffer.len() != expected {
            return Err(TransferError::SizeMismatch {
                file_name: key.file_name,
                expected,
                actual: session.buffer.len(),
            });
        }

        Ok(ChunkOutcome::Complete(CompletedTransfer {
            file_name: key.file_name,
            content: session.buffer,
            content_size: session.content_size,
            orig_file_size: session.orig_file_size,
            chunks_received: session.chunks_received,
        }))
    }

    fn check_new_session(
        &self,
        conn: ConnectionId,
        key: &TransferKey,
        content_size: u32,
    ) -> Result<(), TransferError> {
        let declared = content_size as usize;
        if declared > self.limits.max_content_size {
            return Err(TransferError::ContentTooLarge {
                file_name: key.file_name.clone(),
                declared,
                limit: self.limits.max_content_size,
            });
        }

        let owned = self.sessions.values().filter(|s| s.owner == conn).count();
        if owned >= self.limits.max_transfers_per_connection {
            return Err(TransferError::TooManyTransfers {
                conn,
                limit: self.limits.max_transfers_per_connection,
            });
        }
        Ok(())
    }

    /// Drop every session owned by `conn`. Returns how many were dropped.
    pub fn drop_connection(&mut self, conn: ConnectionId) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| session.owner != conn);
        before - self.sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    #[cfg(test)]
    fn reserved_bytes(&self) -> usize {
        self.sessions.values().map(|s| s.buffer.capacity()).sum()
    }
}
