use chacha20poly1305::{
    aead::{Aead, KeyInit, OsRng},
    XChaCha20Poly1305, XNonce,
};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use thiserror::Error;

/// XChaCha20 nonce length.
pub const NONCE_LEN: usize = 24;

/// Poly1305 tag length.
pub const TAG_LEN: usize = 16;

#[derive(Error, Debug)]
pub enum EncryptionError {
    #[error("Encryption failed")]
    EncryptionFailed,
    #[error("Decryption failed")]
    DecryptionFailed,
    #[error("Invalid key length")]
    InvalidKeyLength,
    #[error("Key derivation failed")]
    KeyDerivationFailed,
}

pub type Result<T> = std::result::Result<T, EncryptionError>;

fn cipher_for(key: &[u8]) -> Result<XChaCha20Poly1305> {
    if key.len() != 32 {
        return Err(EncryptionError::InvalidKeyLength);
    }
    XChaCha20Poly1305::new_from_slice(key).map_err(|_| EncryptionError::InvalidKeyLength)
}

fn seal(cipher: &XChaCha20Poly1305, nonce_bytes: &[u8; NONCE_LEN], plaintext: &[u8]) -> Result<Vec<u8>> {
    let nonce = XNonce::from_slice(nonce_bytes);
    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| EncryptionError::EncryptionFailed)?;

    let mut result = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    result.extend_from_slice(nonce_bytes);
    result.extend_from_slice(&ciphertext);
    Ok(result)
}

/// Encrypt a message using XChaCha20-Poly1305 with a random nonce
///
/// # Arguments
/// * `plaintext` - The message to encrypt
/// * `key` - 32-byte encryption key
///
/// # Returns
/// Encrypted message with prepended nonce (24 bytes + ciphertext)
pub fn encrypt_message(plaintext: &[u8], key: &[u8]) -> Result<Vec<u8>> {
    let cipher = cipher_for(key)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);

    seal(&cipher, &nonce_bytes, plaintext)
}

/// Encrypt with a nonce derived from the key and the plaintext.
///
/// Identical (key, plaintext) pairs always produce identical output, which is
/// what lets two devices holding the same logical config state emit the same
/// blob. The nonce is a keyed BLAKE3 hash, so it never repeats for distinct
/// plaintexts under one key.
///
/// # Returns
/// Encrypted message with prepended nonce (24 bytes + ciphertext)
pub fn encrypt_deterministic(plaintext: &[u8], key: &[u8]) -> Result<Vec<u8>> {
    let cipher = cipher_for(key)?;

    let mut key_arr = [0u8; 32];
    key_arr.copy_from_slice(key);
    let digest = blake3::keyed_hash(&key_arr, plaintext);
    let mut nonce_bytes = [0u8; NONCE_LEN];
    nonce_bytes.copy_from_slice(&digest.as_bytes()[..NONCE_LEN]);

    seal(&cipher, &nonce_bytes, plaintext)
}

/// Decrypt a message using XChaCha20-Poly1305
///
/// # Arguments
/// * `encrypted_data` - Encrypted message with prepended nonce (24 bytes + ciphertext)
/// * `key` - 32-byte encryption key
///
/// # Returns
/// Decrypted plaintext
pub fn decrypt_message(encrypted_data: &[u8], key: &[u8]) -> Result<Vec<u8>> {
    let cipher = cipher_for(key)?;

    // Validate minimum length (nonce + tag)
    if encrypted_data.len() < NONCE_LEN + TAG_LEN {
        return Err(EncryptionError::DecryptionFailed);
    }

    let (nonce_bytes, ciphertext) = encrypted_data.split_at(NONCE_LEN);
    let nonce = XNonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| EncryptionError::DecryptionFailed)
}

/// Generate a random 32-byte key
pub fn generate_key() -> [u8; 32] {
    let mut key = [0u8; 32];
    OsRng.fill_bytes(&mut key);
    key
}

/// Derive a 32-byte symmetric key from secret material using HKDF-SHA256
///
/// # Arguments
/// * `ikm` - Input keying material (e.g. an Ed25519 seed)
/// * `info` - Context string separating independent keys
///
/// # Returns
/// 32-byte derived key
pub fn derive_key(ikm: &[u8], info: &[u8]) -> Result<[u8; 32]> {
    let hkdf = Hkdf::<Sha256>::new(None, ikm);
    let mut okm = [0u8; 32];
    hkdf.expand(info, &mut okm)
        .map_err(|_| EncryptionError::KeyDerivationFailed)?;
    Ok(okm)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt() {
        let key = generate_key();
        let plaintext = b"Hello, swarm!";

        let encrypted = encrypt_message(plaintext, &key).unwrap();
        assert_eq!(encrypted.len(), NONCE_LEN + plaintext.len() + TAG_LEN);

        let decrypted = decrypt_message(&encrypted, &key).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_decrypt_with_wrong_key() {
        let encrypted = encrypt_message(b"secret", &generate_key()).unwrap();
        assert!(decrypt_message(&encrypted, &generate_key()).is_err());
    }

    #[test]
    fn test_invalid_key_length() {
        assert!(matches!(
            encrypt_message(b"x", &[0u8; 16]),
            Err(EncryptionError::InvalidKeyLength)
        ));
    }

    #[test]
    fn test_deterministic_encryption_is_stable() {
        let key = [7u8; 32];
        let a = encrypt_deterministic(b"same state", &key).unwrap();
        let b = encrypt_deterministic(b"same state", &key).unwrap();
        let c = encrypt_deterministic(b"other state", &key).unwrap();
        assert_eq!(a, b);
        assert_ne!(a[..NONCE_LEN], c[..NONCE_LEN]);
        assert_eq!(decrypt_message(&a, &key).unwrap(), b"same state");
    }

    #[test]
    fn test_truncated_ciphertext_rejected() {
        assert!(decrypt_message(&[0u8; 10], &[1u8; 32]).is_err());
    }

    #[test]
    fn test_derive_key_domain_separation() {
        let seed = [3u8; 32];
        let a = derive_key(&seed, b"swarm-config/UserProfile").unwrap();
        let b = derive_key(&seed, b"swarm-config/Contacts").unwrap();
        assert_ne!(a, b);
        assert_eq!(a, derive_key(&seed, b"swarm-config/UserProfile").unwrap());
    }
}
