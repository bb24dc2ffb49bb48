/// Cryptdrop Crypto Library
///
/// Primitives the transfer protocol invokes:
/// - AES-256-GCM for file content, nonce carried as a ciphertext prefix
/// - RSA-OAEP (SHA-1) to hand the per-client AES key to its owner
/// - CRC-32 checksums over stored files
///
/// The server never encrypts file content or unwraps keys, so those helpers
/// sit behind the `client` feature.

pub mod checksum;
pub mod encrypt;
pub mod keys;
