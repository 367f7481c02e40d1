use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha512};
use thiserror::Error;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroize;

#[derive(Error, Debug)]
pub enum KeyExchangeError {
    #[error("Invalid key length")]
    InvalidKeyLength,
    #[error("Invalid Ed25519 public key")]
    InvalidPublicKey,
}

pub type Result<T> = std::result::Result<T, KeyExchangeError>;

/// Generate a static X25519 keypair
///
/// # Returns
/// (public_key, secret_key) - Both as 32-byte arrays
pub fn generate_static_keypair() -> ([u8; 32], [u8; 32]) {
    let secret = StaticSecret::random_from_rng(OsRng);
    let public = PublicKey::from(&secret);

    (public.to_bytes(), secret.to_bytes())
}

/// Convert an Ed25519 public key to its X25519 (Montgomery) form
///
/// # Arguments
/// * `ed25519_pub` - 32-byte Ed25519 public key
///
/// # Returns
/// 32-byte X25519 public key
pub fn derive_curve_key(ed25519_pub: &[u8]) -> Result<[u8; 32]> {
    let bytes: [u8; 32] = ed25519_pub
        .try_into()
        .map_err(|_| KeyExchangeError::InvalidKeyLength)?;
    let verifying_key =
        VerifyingKey::from_bytes(&bytes).map_err(|_| KeyExchangeError::InvalidPublicKey)?;
    Ok(verifying_key.to_montgomery().to_bytes())
}

/// X25519 secret matching [`derive_curve_key`] of the same identity.
///
/// Ed25519 expands its seed with SHA-512 and clamps the lower half; X25519
/// clamps on use, so the unclamped lower half is the curve secret.
pub fn curve_secret_from_seed(signing_key: &SigningKey) -> StaticSecret {
    let mut digest = Sha512::digest(signing_key.as_bytes());
    let mut lower = [0u8; 32];
    lower.copy_from_slice(&digest[..32]);
    digest.as_mut_slice().zeroize();
    let secret = StaticSecret::from(lower);
    lower.zeroize();
    secret
}

/// Derive shared secret using X25519
///
/// # Arguments
/// * `our_private_key` - Our 32-byte X25519 private key
/// * `their_public_key` - Their 32-byte X25519 public key
///
/// # Returns
/// 32-byte shared secret
pub fn derive_shared_secret(our_private_key: &[u8], their_public_key: &[u8]) -> Result<[u8; 32]> {
    let secret_bytes: [u8; 32] = our_private_key
        .try_into()
        .map_err(|_| KeyExchangeError::InvalidKeyLength)?;
    let public_bytes: [u8; 32] = their_public_key
        .try_into()
        .map_err(|_| KeyExchangeError::InvalidKeyLength)?;

    let secret = StaticSecret::from(secret_bytes);
    let public = PublicKey::from(public_bytes);

    Ok(secret.diffie_hellman(&public).to_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_exchange() {
        let (alice_public, alice_private) = generate_static_keypair();
        let (bob_public, bob_private) = generate_static_keypair();

        let alice_shared = derive_shared_secret(&alice_private, &bob_public).unwrap();
        let bob_shared = derive_shared_secret(&bob_private, &alice_public).unwrap();

        assert_eq!(alice_shared, bob_shared);
    }

    #[test]
    fn test_curve_conversion_matches_secret() {
        let signing_key = SigningKey::generate(&mut OsRng);
        let curve_pub = derive_curve_key(signing_key.verifying_key().as_bytes()).unwrap();
        let curve_secret = curve_secret_from_seed(&signing_key);
        assert_eq!(PublicKey::from(&curve_secret).to_bytes(), curve_pub);
    }

    #[test]
    fn test_invalid_key_length() {
        assert!(derive_shared_secret(&[0u8; 16], &[0u8; 32]).is_err());
        assert!(derive_curve_key(&[0u8; 31]).is_err());
    }
}
