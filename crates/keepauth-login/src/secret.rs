//! Symmetric password decryption.
//!
//! When a decryption key is configured, the stored password is
//! ChaCha20-Poly1305 ciphertext: `base64(nonce || box)` under a
//! `base64(32-byte key)`. Decryption happens just before the password is
//! typed into the form; the plaintext never rests anywhere else.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chacha20poly1305::aead::Aead;
use chacha20poly1305::{ChaCha20Poly1305, Key, KeyInit, Nonce};
use rand::RngCore;
use thiserror::Error;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("password key is not valid base64")]
    KeyEncoding,

    #[error("password key must decode to {KEY_LEN} bytes")]
    KeyLength,

    #[error("password ciphertext is not valid base64")]
    CiphertextEncoding,

    #[error("password ciphertext is truncated")]
    CiphertextLength,

    #[error("password decryption failed; the key does not match the ciphertext")]
    Decrypt,

    #[error("decrypted password is not valid UTF-8")]
    PlaintextEncoding,
}

fn cipher_for(key_b64: &str) -> Result<ChaCha20Poly1305, SecretError> {
    let key_bytes = BASE64
        .decode(key_b64.trim())
        .map_err(|_| SecretError::KeyEncoding)?;
    if key_bytes.len() != KEY_LEN {
        return Err(SecretError::KeyLength);
    }
    Ok(ChaCha20Poly1305::new(Key::from_slice(&key_bytes)))
}

/// Decrypt a stored password with the configured key.
pub fn decrypt_password(ciphertext_b64: &str, key_b64: &str) -> Result<String, SecretError> {
    let cipher = cipher_for(key_b64)?;
    let raw = BASE64
        .decode(ciphertext_b64.trim())
        .map_err(|_| SecretError::CiphertextEncoding)?;
    if raw.len() <= NONCE_LEN {
        return Err(SecretError::CiphertextLength);
    }
    let (nonce, boxed) = raw.split_at(NONCE_LEN);
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce), boxed)
        .map_err(|_| SecretError::Decrypt)?;
    String::from_utf8(plaintext).map_err(|_| SecretError::PlaintextEncoding)
}

/// Encrypt a password for storage. Operator-side helper, counterpart of
/// [`decrypt_password`].
pub fn encrypt_password(plaintext: &str, key_b64: &str) -> Result<String, SecretError> {
    let cipher = cipher_for(key_b64)?;
    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);
    let boxed = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
        .map_err(|_| SecretError::Decrypt)?;
    let mut raw = Vec::with_capacity(NONCE_LEN + boxed.len());
    raw.extend_from_slice(&nonce);
    raw.extend_from_slice(&boxed);
    Ok(BASE64.encode(raw))
}

/// Generate a fresh base64 key for [`encrypt_password`].
#[must_use]
pub fn generate_key() -> String {
    let mut key = [0u8; KEY_LEN];
    rand::thread_rng().fill_bytes(&mut key);
    BASE64.encode(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_then_decrypt_recovers_plaintext() {
        let key = generate_key();
        let ciphertext = encrypt_password("s3cret!", &key).expect("encrypts");
        assert_eq!(decrypt_password(&ciphertext, &key).expect("decrypts"), "s3cret!");
    }

    #[test]
    fn wrong_key_is_rejected() {
        let ciphertext = encrypt_password("s3cret!", &generate_key()).expect("encrypts");
        assert!(matches!(
            decrypt_password(&ciphertext, &generate_key()),
            Err(SecretError::Decrypt)
        ));
    }

    #[test]
    fn malformed_inputs_are_classified() {
        let key = generate_key();
        assert!(matches!(
            decrypt_password("!!!", &key),
            Err(SecretError::CiphertextEncoding)
        ));
        assert!(matches!(
            decrypt_password("AAAA", &key),
            Err(SecretError::CiphertextLength)
        ));
        assert!(matches!(
            decrypt_password("AAAA", "short"),
            Err(SecretError::KeyEncoding) | Err(SecretError::KeyLength)
        ));
    }
}
