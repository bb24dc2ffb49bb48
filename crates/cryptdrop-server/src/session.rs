//! Request dispatch.
//!
//! Every decoded frame goes through [`ServerState::handle`], which produces
//! exactly one response. Handler errors and panics are turned into a
//! response here and never reach the connection loop.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use cryptdrop_db::{ClientRow, Database};
use cryptdrop_protocol::{
    ClientId, FileChunk, ProtocolError, Request, RequestCode, RequestHeader, Response,
    SERVER_VERSION, decode_payload,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::SizeMismatchPolicy;
use crate::integrity;
use crate::key_exchange;
use crate::storage::Storage;
use crate::transfer::{ChunkOutcome, ConnectionId, TransferError, TransferLimits, TransferTable};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("name '{0}' is already registered")]
    NameTaken(String),

    #[error("user name is empty")]
    InvalidName,

    #[error("unknown client identity {0}")]
    UnknownIdentity(ClientId),

    #[error("name mismatch for {client_id}: stored '{stored}', presented '{presented}'")]
    NameMismatch {
        client_id: ClientId,
        stored: String,
        presented: String,
    },

    #[error("client {0} has no public key on record")]
    NoPublicKey(ClientId),

    #[error("freshly generated identity {0} already exists")]
    IdentityCollision(ClientId),

    #[error("unknown request code {0}")]
    UnknownCode(u16),

    #[error("decrypted {file_name} is {actual} bytes, client declared {expected}")]
    OriginalSizeMismatch {
        file_name: String,
        expected: usize,
        actual: usize,
    },

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl SessionError {
    /// The single response sent for a failed request.
    fn into_response(self, code: u16, client_id: ClientId) -> Response {
        match self {
            Self::NameTaken(_) | Self::InvalidName => Response::RegistrationFailed,
            Self::NameMismatch { .. } | Self::NoPublicKey(_) => {
                Response::ReconnectDenied { client_id }
            }
            Self::UnknownIdentity(_) if code == RequestCode::Reconnect as u16 => {
                Response::ReconnectDenied { client_id }
            }
            _ => Response::GeneralError { client_id },
        }
    }
}

/// State shared by every connection.
pub struct ServerState {
    db: Database,
    storage: Storage,
    transfers: Mutex<TransferTable>,
    size_policy: SizeMismatchPolicy,
}

impl ServerState {
    pub fn new(db: Database, storage: Storage, size_policy: SizeMismatchPolicy) -> Self {
        Self {
            db,
            storage,
            transfers: Mutex::new(TransferTable::new()),
            size_policy,
        }
    }

    /// Replace the default bounds on in-progress uploads.
    pub fn with_transfer_limits(mut self, limits: TransferLimits) -> Self {
        self.transfers = Mutex::new(TransferTable::with_limits(limits));
        self
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Handle one decoded frame. Never fails; every error becomes a response.
    pub fn handle(&self, conn: ConnectionId, header: &RequestHeader, payload: Bytes) -> Response {
        if header.version != SERVER_VERSION {
            debug!(
                "{}: request version {} differs from server version {}",
                conn, header.version, SERVER_VERSION
            );
        }

        let result = panic::catch_unwind(AssertUnwindSafe(|| self.dispatch(conn, header, payload)));

        match result {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                let client_id = self.known_identity(&header.client_id);
                match &e {
                    SessionError::IdentityCollision(_)
                    | SessionError::Internal(_)
                    | SessionError::Protocol(ProtocolError::Io(_)) => error!(
                        "{}: request {} from {} failed: {:#}",
                        conn,
                        header.code,
                        self.client_info(&header.client_id),
                        e
                    ),
                    _ => warn!(
                        "{}: request {} from {} rejected: {}",
                        conn,
                        header.code,
                        self.client_info(&header.client_id),
                        e
                    ),
                }
                e.into_response(header.code, client_id)
            }
            Err(_) => {
                error!(
                    "{}: handler for request {} from {} panicked",
                    conn,
                    header.code,
                    self.client_info(&header.client_id)
                );
                Response::GeneralError {
                    client_id: self.known_identity(&header.client_id),
                }
            }
        }
    }

    /// Forget everything tied to a closed connection.
    pub fn connection_closed(&self, conn: ConnectionId) {
        let dropped = self.transfers().drop_connection(conn);
        if dropped > 0 {
            info!("{}: discarded {} unfinished upload(s)", conn, dropped);
        }
    }

    /// The identity to echo in an error response: the caller's own if it is
    /// registered, zero otherwise.
    pub fn known_identity(&self, client_id: &ClientId) -> ClientId {
        match self.db.get_client(client_id) {
            Ok(Some(row)) => row.id,
            _ => ClientId::ZERO,
        }
    }

    /// Hex identity, plus the stored user name when there is one.
    pub fn client_info(&self, client_id: &ClientId) -> String {
        match self.db.get_client(client_id) {
            Ok(Some(row)) => format!("client '{}' ({})", row.name, client_id),
            _ => format!("client {}", client_id),
        }
    }

    fn dispatch(
        &self,
        conn: ConnectionId,
        header: &RequestHeader,
        payload: Bytes,
    ) -> Result<Response, SessionError> {
        let request = decode_payload(header.code, payload)?;
        let client_id = header.client_id;

        match request {
            Request::Register { name } => key_exchange::register(&self.db, &name),
            Request::PublicKey { name, public_key } => {
                let client = self.require_client(&client_id)?;
                key_exchange::accept_public_key(&self.db, &client, &name, &public_key)
            }
            Request::Reconnect { name } => {
                let client = self.require_client(&client_id)?;
                key_exchange::reconnect(&self.db, &client, &name)
            }
            Request::FileChunk(chunk) => {
                let client = self.require_client(&client_id)?;
                self.receive_chunk(conn, &client, chunk)
            }
            Request::Crc { status, file_name } => {
                let client = self.require_client(&client_id)?;
                integrity::acknowledge(&self.db, &client, status, &file_name)
            }
            Request::Unknown { code } => Err(SessionError::UnknownCode(code)),
        }
    }

    fn receive_chunk(
        &self,
        conn: ConnectionId,
        client: &ClientRow,
        chunk: FileChunk,
    ) -> Result<Response, SessionError> {
        let sequence = chunk.sequence;
        let outcome = self.transfers().accept_chunk(conn, client.id, chunk)?;

        match outcome {
            ChunkOutcome::Pending { received, total } => {
                debug!(
                    "{}: chunk {}/{} from client '{}' ({} received)",
                    conn, sequence, total, client.name, received
                );
                Ok(Response::Accepted {
                    client_id: client.id,
                })
            }
            ChunkOutcome::Complete(done) => {
                integrity::finish_upload(&self.db, &self.storage, self.size_policy, client, done)
            }
        }
    }

    fn require_client(&self, client_id: &ClientId) -> Result<ClientRow, SessionError> {
        self.db
            .get_client(client_id)?
            .ok_or(SessionError::UnknownIdentity(*client_id))
    }

    fn transfers(&self) -> MutexGuard<'_, TransferTable> {
        self.transfers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
