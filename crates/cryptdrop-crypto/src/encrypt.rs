use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use anyhow::{Result, anyhow};

/// AES-GCM nonce size, stored in front of the ciphertext.
pub const NONCE_LEN: usize = 12;

/// GCM authentication tag size, appended by the cipher.
pub const TAG_LEN: usize = 16;

/// AES block size.
pub const BLOCK_SIZE: usize = 16;

/// Encrypt `plaintext` with AES-256-GCM.
/// Returns `nonce || ciphertext || tag`.
#[cfg(feature = "client")]
pub fn encrypt(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    use rand_core::{OsRng, RngCore};

    let cipher = cipher_for(key)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| anyhow!("Encryption failed: {}", e))?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt `nonce || ciphertext || tag` produced by [`encrypt`].
pub fn decrypt(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < NONCE_LEN + TAG_LEN {
        return Err(anyhow!(
            "Ciphertext too short: {} bytes, need at least {}",
            data.len(),
            NONCE_LEN + TAG_LEN
        ));
    }
    let cipher = cipher_for(key)?;
    let (nonce, ciphertext) = data.split_at(NONCE_LEN);

    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|e| anyhow!("Decryption failed: {}", e))
}

fn cipher_for(key: &[u8]) -> Result<Aes256Gcm> {
    Aes256Gcm::new_from_slice(key).map_err(|_| anyhow!("Invalid AES key length: {}", key.len()))
}
