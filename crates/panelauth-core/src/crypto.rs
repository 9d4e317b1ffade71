//! Symmetric encryption of the password field before it leaves the client.
//!
//! The backend and the client share a secret. A 256-bit key is derived from
//! it with Argon2id, and each password is sealed with ChaCha20-Poly1305 under
//! a fresh random nonce. The wire form is `base64(nonce || ciphertext)`.

use argon2::Argon2;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use thiserror::Error;

/// Fixed application salt. The shared secret is the only varying input, so
/// both ends derive the same key.
const KEY_SALT: &[u8] = b"panelauth.password.v1";

const NONCE_LEN: usize = 12;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption key must not be empty")]
    EmptyKey,

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Password encryption failed")]
    Encrypt,

    #[error("Password decryption failed")]
    Decrypt,
}

#[derive(Clone)]
pub struct PasswordCipher {
    cipher: ChaCha20Poly1305,
}

impl PasswordCipher {
    pub fn new(shared_secret: &str) -> Result<Self, CryptoError> {
        if shared_secret.is_empty() {
            return Err(CryptoError::EmptyKey);
        }

        let mut key = [0u8; 32];
        Argon2::default()
            .hash_password_into(shared_secret.as_bytes(), KEY_SALT, &mut key)
            .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

        Ok(Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(&key)),
        })
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|_| CryptoError::Encrypt)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(sealed))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String, CryptoError> {
        let sealed = STANDARD.decode(encoded).map_err(|_| CryptoError::Decrypt)?;
        if sealed.len() <= NONCE_LEN {
            return Err(CryptoError::Decrypt);
        }

        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::Decrypt)?;
        String::from_utf8(plaintext).map_err(|_| CryptoError::Decrypt)
    }
}

impl std::fmt::Debug for PasswordCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PasswordCipher(..)")
    }
}
