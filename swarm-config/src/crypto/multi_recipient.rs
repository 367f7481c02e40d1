/// One sealed envelope readable by several X25519 recipients.
///
/// Every entry is XChaCha20-Poly1305 under a key derived with BLAKE3 from
/// the static DH secret, both X25519 public keys and a caller-chosen domain.
/// Entries are stored sorted by ciphertext, so their position says nothing
/// about which recipient they belong to. A recipient tries each entry until
/// one opens.
use serde::{Deserialize, Serialize};
use thiserror::Error;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroize;

use crate::crypto::{encryption, key_exchange, signing};
use crate::limits::MAX_BLOB_BYTES;

const ENVELOPE_VERSION: u8 = 1;
const ENTRY_KEY_CONTEXT: &str = "swarm-config 2024-01 multi-recipient entry";

/// Longest accepted domain string.
pub const MAX_DOMAIN_LEN: usize = 64;

#[derive(Error, Debug)]
pub enum MultiRecipientError {
    #[error("Invalid secret key: {0}")]
    InvalidSecretKey(String),
    #[error("Invalid X25519 public key")]
    InvalidPublicKey,
    #[error("Domain must be 1-{} bytes", MAX_DOMAIN_LEN)]
    InvalidDomain,
    #[error("No recipients given")]
    NoRecipients,
    #[error("{0} messages for {1} recipients")]
    CountMismatch(usize, usize),
    #[error("Malformed envelope: {0}")]
    Malformed(String),
    #[error("Encryption failed: {0}")]
    Encryption(#[from] encryption::EncryptionError),
}

pub type Result<T> = std::result::Result<T, MultiRecipientError>;

#[derive(Serialize, Deserialize)]
struct Envelope {
    version: u8,
    entries: Vec<Vec<u8>>,
}

fn check_domain(domain: &str) -> Result<()> {
    if domain.is_empty() || domain.len() > MAX_DOMAIN_LEN {
        return Err(MultiRecipientError::InvalidDomain);
    }
    Ok(())
}

fn curve_secret(ed25519_secret: &[u8]) -> Result<StaticSecret> {
    let signing_key = signing::signing_key_from_secret(ed25519_secret)
        .map_err(|e| MultiRecipientError::InvalidSecretKey(e.to_string()))?;
    Ok(key_exchange::curve_secret_from_seed(&signing_key))
}

fn entry_key(
    secret: &StaticSecret,
    sender: &[u8; 32],
    recipient: &[u8; 32],
    ours_is_sender: bool,
    domain: &str,
) -> Result<[u8; 32]> {
    let their = if ours_is_sender { recipient } else { sender };
    let shared = secret.diffie_hellman(&PublicKey::from(*their));
    if !shared.was_contributory() {
        return Err(MultiRecipientError::InvalidPublicKey);
    }
    let mut hasher = blake3::Hasher::new_derive_key(ENTRY_KEY_CONTEXT);
    hasher.update(&[domain.len() as u8]);
    hasher.update(domain.as_bytes());
    hasher.update(shared.as_bytes());
    hasher.update(sender);
    hasher.update(recipient);
    Ok(*hasher.finalize().as_bytes())
}

/// Seal messages for several recipients in one envelope.
///
/// # Arguments
/// * `messages` - One message for everybody, or one per recipient in order
/// * `recipients` - X25519 public keys of the recipients
/// * `ed25519_secret` - Sender's Ed25519 secret (seed or seed||pubkey)
/// * `domain` - Separates envelopes of unrelated features
///
/// # Returns
/// The encoded envelope
pub fn encrypt_for_multiple(
    messages: &[&[u8]],
    recipients: &[[u8; 32]],
    ed25519_secret: &[u8],
    domain: &str,
) -> Result<Vec<u8>> {
    check_domain(domain)?;
    if recipients.is_empty() {
        return Err(MultiRecipientError::NoRecipients);
    }
    if messages.len() != 1 && messages.len() != recipients.len() {
        return Err(MultiRecipientError::CountMismatch(messages.len(), recipients.len()));
    }

    let secret = curve_secret(ed25519_secret)?;
    let sender = PublicKey::from(&secret).to_bytes();

    let mut entries = Vec::with_capacity(recipients.len());
    for (i, recipient) in recipients.iter().enumerate() {
        let message = messages[if messages.len() == 1 { 0 } else { i }];
        let mut key = entry_key(&secret, &sender, recipient, true, domain)?;
        let sealed = encryption::encrypt_message(message, &key);
        key.zeroize();
        entries.push(sealed?);
    }
    entries.sort();

    let encoded = bincode::serialize(&Envelope {
        version: ENVELOPE_VERSION,
        entries,
    })
    .map_err(|e| MultiRecipientError::Malformed(e.to_string()))?;
    log::debug!(
        target: "crypto",
        "sealed {} byte envelope for {} recipients in {}",
        encoded.len(),
        recipients.len(),
        domain
    );
    Ok(encoded)
}

/// Open the entry of an envelope addressed to us.
///
/// # Arguments
/// * `envelope` - Output of [`encrypt_for_multiple`]
/// * `ed25519_secret` - Recipient's Ed25519 secret (seed or seed||pubkey)
/// * `sender_x25519` - Sender's X25519 public key
/// * `domain` - Must match the domain used to seal
///
/// # Returns
/// The message, or `None` if no entry is addressed to us
pub fn decrypt_for_multiple(
    envelope: &[u8],
    ed25519_secret: &[u8],
    sender_x25519: &[u8],
    domain: &str,
) -> Result<Option<Vec<u8>>> {
    check_domain(domain)?;
    let sender: [u8; 32] = sender_x25519
        .try_into()
        .map_err(|_| MultiRecipientError::InvalidPublicKey)?;
    if envelope.len() > MAX_BLOB_BYTES {
        return Err(MultiRecipientError::Malformed(format!(
            "{} bytes exceeds {}",
            envelope.len(),
            MAX_BLOB_BYTES
        )));
    }
    let decoded: Envelope = bincode::deserialize(envelope)
        .map_err(|e| MultiRecipientError::Malformed(e.to_string()))?;
    if decoded.version != ENVELOPE_VERSION {
        return Err(MultiRecipientError::Malformed(format!(
            "unsupported version {}",
            decoded.version
        )));
    }

    let secret = curve_secret(ed25519_secret)?;
    let me = PublicKey::from(&secret).to_bytes();
    let mut key = entry_key(&secret, &sender, &me, false, domain)?;
    let opened = decoded
        .entries
        .iter()
        .find_map(|entry| encryption::decrypt_message(entry, &key).ok());
    key.zeroize();
    Ok(opened)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::signing::generate_keypair;

    struct Party {
        seed: [u8; 32],
        x25519: [u8; 32],
    }

    fn party() -> Party {
        let (public, seed) = generate_keypair();
        Party {
            seed,
            x25519: key_exchange::derive_curve_key(&public).unwrap(),
        }
    }

    #[test]
    fn test_each_recipient_reads_own_message() {
        let sender = party();
        let (alice, bob) = (party(), party());
        let envelope = encrypt_for_multiple(
            &[&b"for alice"[..], &b"for bob"[..]],
            &[alice.x25519, bob.x25519],
            &sender.seed,
            "test-invite",
        )
        .unwrap();

        let opened = |p: &Party| decrypt_for_multiple(&envelope, &p.seed, &sender.x25519, "test-invite").unwrap();
        assert_eq!(opened(&alice), Some(b"for alice".to_vec()));
        assert_eq!(opened(&bob), Some(b"for bob".to_vec()));
        assert_eq!(opened(&party()), None);

        assert_eq!(
            decrypt_for_multiple(&envelope, &alice.seed, &sender.x25519, "other-feature").unwrap(),
            None
        );
        assert_eq!(
            decrypt_for_multiple(&envelope, &alice.seed, &party().x25519, "test-invite").unwrap(),
            None
        );
    }

    #[test]
    fn test_single_message_broadcast() {
        let sender = party();
        let recipients: Vec<Party> = (0..3).map(|_| party()).collect();
        let keys: Vec<[u8; 32]> = recipients.iter().map(|p| p.x25519).collect();
        let envelope = encrypt_for_multiple(&[&b"hello all"[..]], &keys, &sender.seed, "broadcast").unwrap();
        for p in &recipients {
            assert_eq!(
                decrypt_for_multiple(&envelope, &p.seed, &sender.x25519, "broadcast").unwrap(),
                Some(b"hello all".to_vec())
            );
        }
    }

    #[test]
    fn test_bad_arguments() {
        let sender = party();
        let r = party();
        assert!(matches!(
            encrypt_for_multiple(&[&b"a"[..], &b"b"[..]], &[r.x25519], &sender.seed, "d"),
            Err(MultiRecipientError::CountMismatch(2, 1))
        ));
        assert!(matches!(
            encrypt_for_multiple(&[&b"a"[..]], &[], &sender.seed, "d"),
            Err(MultiRecipientError::NoRecipients)
        ));
        assert!(matches!(
            encrypt_for_multiple(&[&b"a"[..]], &[r.x25519], &sender.seed, ""),
            Err(MultiRecipientError::InvalidDomain)
        ));
        assert!(matches!(
            encrypt_for_multiple(&[&b"a"[..]], &[r.x25519], &sender.seed, &"d".repeat(MAX_DOMAIN_LEN + 1)),
            Err(MultiRecipientError::InvalidDomain)
        ));
        assert!(matches!(
            encrypt_for_multiple(&[&b"a"[..]], &[[0u8; 32]], &sender.seed, "d"),
            Err(MultiRecipientError::InvalidPublicKey)
        ));
        assert!(matches!(
            encrypt_for_multiple(&[&b"a"[..]], &[r.x25519], &sender.seed[..31], "d"),
            Err(MultiRecipientError::InvalidSecretKey(_))
        ));

        let envelope = encrypt_for_multiple(&[&b"a"[..]], &[r.x25519], &sender.seed, "d").unwrap();
        assert!(matches!(
            decrypt_for_multiple(&envelope[..envelope.len() / 2], &r.seed, &sender.x25519, "d"),
            Err(MultiRecipientError::Malformed(_))
        ));
        assert!(matches!(
            decrypt_for_multiple(&envelope, &r.seed, &sender.x25519[..16], "d"),
            Err(MultiRecipientError::InvalidPublicKey)
        ));
    }
}
