//! Database row types. These map directly to SQLite rows.

use cryptdrop_protocol::ClientId;

/// Key-exchange progress of a registered client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    /// Has an identity and a symmetric key, no public key yet.
    Registered,
    /// Public key stored; the symmetric key has been delivered.
    KeyNegotiated,
}

#[derive(Debug, Clone)]
pub struct ClientRow {
    pub id: ClientId,
    pub name: String,
    pub public_key: Option<Vec<u8>>,
    pub last_seen: String,
    pub symmetric_key: Vec<u8>,
}

impl ClientRow {
    pub fn key_state(&self) -> KeyState {
        match self.public_key {
            Some(_) => KeyState::KeyNegotiated,
            None => KeyState::Registered,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRow {
    pub client_id: ClientId,
    pub file_name: String,
    pub path_name: String,
    pub verified: bool,
}
