use anyhow::{Result, anyhow};
use rand_core::{OsRng, RngCore};
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::{Oaep, RsaPublicKey};
use sha1::Sha1;

/// AES-256 key size.
pub const SYMMETRIC_KEY_LEN: usize = 32;

/// Generate a random 256-bit key for AES-256-GCM.
/// One key per client, created at registration and never rotated.
pub fn generate_symmetric_key() -> [u8; SYMMETRIC_KEY_LEN] {
    let mut key = [0u8; SYMMETRIC_KEY_LEN];
    OsRng.fill_bytes(&mut key);
    key
}

/// Parse a client public key.
///
/// Accepts X.509 SubjectPublicKeyInfo or PKCS#1 DER. The wire field is fixed
/// width, so anything after the outer DER sequence is padding and ignored.
pub fn parse_public_key(bytes: &[u8]) -> Result<RsaPublicKey> {
    let end = der_sequence_len(bytes)
        .filter(|&n| n <= bytes.len())
        .ok_or_else(|| anyhow!("Public key is not a complete DER sequence"))?;
    let der = &bytes[..end];

    RsaPublicKey::from_public_key_der(der)
        .or_else(|_| RsaPublicKey::from_pkcs1_der(der))
        .map_err(|e| anyhow!("Invalid RSA public key: {}", e))
}

/// Encrypt a symmetric key under the client's RSA public key (OAEP, SHA-1).
pub fn wrap_key(symmetric_key: &[u8], public_key: &[u8]) -> Result<Vec<u8>> {
    let public = parse_public_key(public_key)?;
    public
        .encrypt(&mut OsRng, Oaep::new::<Sha1>(), symmetric_key)
        .map_err(|e| anyhow!("Key wrapping failed: {}", e))
}

/// Total length of the DER SEQUENCE at the start of `bytes`, header included.
fn der_sequence_len(bytes: &[u8]) -> Option<usize> {
    if bytes.len() < 2 || bytes[0] != 0x30 {
        return None;
    }
    let first = bytes[1] as usize;
    if first < 0x80 {
        return Some(2 + first);
    }
    let n = first & 0x7F;
    if n == 0 || n > 4 || bytes.len() < 2 + n {
        return None;
    }
    let len = bytes[2..2 + n]
        .iter()
        .fold(0usize, |acc, &b| (acc << 8) | b as usize);
    Some(2 + n + len)
}

/// Generate an RSA keypair (client side).
#[cfg(feature = "client")]
pub fn generate_keypair(bits: usize) -> Result<rsa::RsaPrivateKey> {
    rsa::RsaPrivateKey::new(&mut OsRng, bits).map_err(|e| anyhow!("Key generation failed: {}", e))
}

/// PKCS#1 DER encoding of the public half, as sent in a key update.
#[cfg(feature = "client")]
pub fn public_key_der(private: &rsa::RsaPrivateKey) -> Result<Vec<u8>> {
    use rsa::pkcs1::EncodeRsaPublicKey;

    let der = RsaPublicKey::from(private)
        .to_pkcs1_der()
        .map_err(|e| anyhow!("Public key encoding failed: {}", e))?;
    Ok(der.as_bytes().to_vec())
}

/// Recover a symmetric key wrapped by [`wrap_key`].
#[cfg(feature = "client")]
pub fn unwrap_key(wrapped: &[u8], private: &rsa::RsaPrivateKey) -> Result<Vec<u8>> {
    private
        .decrypt(Oaep::new::<Sha1>(), wrapped)
        .map_err(|e| anyhow!("Key unwrapping failed: {}", e))
}

#[cfg(all(test, feature = "client"))]
mod tests {
    use rsa::pkcs8::EncodePublicKey;

    use super::*;

    #[test]
    fn symmetric_keys_are_random() {
        assert_ne!(generate_symmetric_key(), generate_symmetric_key());
    }

    #[test]
    fn wrap_unwrap_with_padded_pkcs1_key() {
        let private = generate_keypair(1024).unwrap();
        let mut field = public_key_der(&private).unwrap();
        assert!(field.len() <= 160);
        field.resize(160, 0);

        let key = generate_symmetric_key();
        let wrapped = wrap_key(&key, &field).unwrap();
        assert_eq!(wrapped.len(), 128);
        assert_eq!(unwrap_key(&wrapped, &private).unwrap(), key);
    }

    #[test]
    fn accepts_spki_encoding() {
        let private = generate_keypair(1024).unwrap();
        let spki = RsaPublicKey::from(&private).to_public_key_der().unwrap();

        let key = generate_symmetric_key();
        let wrapped = wrap_key(&key, spki.as_bytes()).unwrap();
        assert_eq!(unwrap_key(&wrapped, &private).unwrap(), key);
    }

    #[test]
    fn rejects_garbage_key() {
        assert!(wrap_key(&[1u8; 32], &[0u8; 160]).is_err());
        assert!(wrap_key(&[1u8; 32], &[0x30, 0x81]).is_err());
    }

    #[test]
    fn der_length_forms() {
        assert_eq!(der_sequence_len(&[0x30, 0x03, 1, 2, 3]), Some(5));
        assert_eq!(der_sequence_len(&[0x30, 0x81, 0x9d]), Some(160));
        assert_eq!(der_sequence_len(&[0x30, 0x82, 0x01, 0x0a]), Some(270));
        assert_eq!(der_sequence_len(&[0x02, 0x01]), None);
    }
}
