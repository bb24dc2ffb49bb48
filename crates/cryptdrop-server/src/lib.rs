/// Cryptdrop server.
///
/// Accepts encrypted file uploads over the cryptdrop wire protocol:
/// - client registration and RSA-wrapped delivery of a per-client AES key
/// - chunked uploads reassembled per (client, file name)
/// - decryption, storage and CRC-32 acknowledgement of completed files

pub mod config;
pub mod integrity;
pub mod key_exchange;
pub mod server;
pub mod session;
pub mod storage;
pub mod transfer;

pub use config::{Config, SizeMismatchPolicy};
pub use server::Server;
pub use session::{ServerState, SessionError};
pub use storage::Storage;
pub use transfer::ConnectionId;
