use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SigningError {
    #[error("Invalid secret key: expected 32-byte seed or 64-byte seed||pubkey, got {0} bytes")]
    InvalidSecretKeyLength(usize),
    #[error("Secret key public half does not match its seed")]
    PublicKeyMismatch,
    #[error("Invalid key length")]
    InvalidKeyLength,
    #[error("Invalid public key")]
    InvalidPublicKey,
    #[error("Invalid signature")]
    InvalidSignature,
}

pub type Result<T> = std::result::Result<T, SigningError>;

/// Generate an Ed25519 keypair
///
/// # Returns
/// (public_key, seed) - Both as 32-byte arrays
pub fn generate_keypair() -> ([u8; 32], [u8; 32]) {
    let signing_key = SigningKey::generate(&mut OsRng);
    (signing_key.verifying_key().to_bytes(), signing_key.to_bytes())
}

/// Parse Ed25519 secret key material.
///
/// Accepts either a bare 32-byte seed or the 64-byte `seed || pubkey` layout.
/// For the 64-byte form the public half must match the seed.
pub fn signing_key_from_secret(secret: &[u8]) -> Result<SigningKey> {
    match secret.len() {
        32 | 64 => {
            let mut seed = [0u8; 32];
            seed.copy_from_slice(&secret[..32]);
            let signing_key = SigningKey::from_bytes(&seed);
            if secret.len() == 64 && signing_key.verifying_key().as_bytes()[..] != secret[32..] {
                return Err(SigningError::PublicKeyMismatch);
            }
            Ok(signing_key)
        }
        n => Err(SigningError::InvalidSecretKeyLength(n)),
    }
}

/// Parse a 32-byte Ed25519 public key.
pub fn verifying_key_from_bytes(public_key: &[u8]) -> Result<VerifyingKey> {
    let bytes: [u8; 32] = public_key
        .try_into()
        .map_err(|_| SigningError::InvalidKeyLength)?;
    VerifyingKey::from_bytes(&bytes).map_err(|_| SigningError::InvalidPublicKey)
}

/// Sign data with an Ed25519 secret key
///
/// # Arguments
/// * `data` - Data to sign
/// * `secret_key` - 32-byte seed or 64-byte seed||pubkey
///
/// # Returns
/// 64-byte signature
pub fn sign_data(data: &[u8], secret_key: &[u8]) -> Result<[u8; 64]> {
    let signing_key = signing_key_from_secret(secret_key)?;
    Ok(signing_key.sign(data).to_bytes())
}

/// Verify Ed25519 signature
///
/// # Arguments
/// * `data` - Original data
/// * `signature` - 64-byte signature
/// * `public_key` - 32-byte Ed25519 public key
///
/// # Returns
/// True if signature is valid
pub fn verify_signature(data: &[u8], signature: &[u8], public_key: &[u8]) -> Result<bool> {
    let verifying_key = verifying_key_from_bytes(public_key)?;

    let sig_bytes: [u8; 64] = signature
        .try_into()
        .map_err(|_| SigningError::InvalidSignature)?;
    let sig = Signature::from_bytes(&sig_bytes);

    Ok(verifying_key.verify(data, &sig).is_ok())
}

/// Derive public key from a secret key
///
/// # Arguments
/// * `secret_key` - 32-byte seed or 64-byte seed||pubkey
///
/// # Returns
/// 32-byte public key
pub fn derive_public_key(secret_key: &[u8]) -> Result<[u8; 32]> {
    Ok(signing_key_from_secret(secret_key)?.verifying_key().to_bytes())
}
