/// Ed25519 key blinding for delegated sub-account credentials.
///
/// A member's identity point `A = a·B` is multiplied by a blinding factor
/// `k` derived from the group and member public keys. The member alone can
/// sign for `k·A` (its scalar becomes `k·a`), while storage only ever sees
/// the blinded point.
use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use curve25519_dalek::scalar::Scalar;
use ed25519_dalek::hazmat::{raw_sign, ExpandedSecretKey};
use ed25519_dalek::{SigningKey, VerifyingKey};
use sha2::{Digest, Sha512};
use thiserror::Error;

const BLIND_FACTOR_DOMAIN: &[u8] = b"swarm-config subaccount";
const BLIND_PREFIX_DOMAIN: &[u8] = b"swarm-config subaccount nonce";

#[derive(Error, Debug)]
pub enum BlindingError {
    #[error("Invalid Ed25519 public key")]
    InvalidPublicKey,
}

pub type Result<T> = std::result::Result<T, BlindingError>;

/// Blinded signing key. Only ever lives in memory for one signing call.
pub struct BlindedKeypair {
    pub public: [u8; 32],
    secret: ExpandedSecretKey,
}

fn wide_hash(parts: &[&[u8]]) -> [u8; 64] {
    let mut hasher = Sha512::new();
    for part in parts {
        hasher.update(part);
    }
    let mut out = [0u8; 64];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Blinding factor `k = H(domain || group_pubkey || member_pubkey) mod l`.
pub fn blinding_factor(group_pubkey: &[u8; 32], member_pubkey: &[u8; 32]) -> Scalar {
    let wide = wide_hash(&[BLIND_FACTOR_DOMAIN, group_pubkey, member_pubkey]);
    Scalar::from_bytes_mod_order_wide(&wide)
}

/// Blind a member's public key for a group.
///
/// # Arguments
/// * `group_pubkey` - 32-byte Ed25519 group public key
/// * `member_pubkey` - 32-byte Ed25519 member public key
///
/// # Returns
/// 32-byte blinded Ed25519 public key `k·A`
pub fn blind_public_key(group_pubkey: &[u8; 32], member_pubkey: &[u8; 32]) -> Result<[u8; 32]> {
    let point = CompressedEdwardsY(*member_pubkey)
        .decompress()
        .ok_or(BlindingError::InvalidPublicKey)?;
    let k = blinding_factor(group_pubkey, member_pubkey);
    Ok((&k * &point).compress().to_bytes())
}

/// Blind a member's signing key for a group.
///
/// The resulting public half always equals
/// `blind_public_key(group_pubkey, member.verifying_key())`.
pub fn blind_key(group_pubkey: &[u8; 32], member: &SigningKey) -> BlindedKeypair {
    let member_pub = member.verifying_key().to_bytes();
    let k = blinding_factor(group_pubkey, &member_pub);

    let expanded = ExpandedSecretKey::from(member.as_bytes());
    let scalar = k * expanded.scalar;

    let prefix_hash = wide_hash(&[BLIND_PREFIX_DOMAIN, &expanded.hash_prefix, k.as_bytes()]);
    let mut hash_prefix = [0u8; 32];
    hash_prefix.copy_from_slice(&prefix_hash[..32]);

    let public = EdwardsPoint::mul_base(&scalar).compress().to_bytes();
    BlindedKeypair {
        public,
        secret: ExpandedSecretKey {
            scalar,
            hash_prefix,
        },
    }
}

/// Sign `message` with a blinded key; verifies as a plain Ed25519 signature
/// under `keypair.public`.
pub fn blinded_sign(keypair: &BlindedKeypair, message: &[u8]) -> Result<[u8; 64]> {
    let verifying_key =
        VerifyingKey::from_bytes(&keypair.public).map_err(|_| BlindingError::InvalidPublicKey)?;
    Ok(raw_sign::<Sha512>(&keypair.secret, message, &verifying_key).to_bytes())
}
