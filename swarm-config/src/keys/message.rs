/// Key-distribution message format.
///
/// ```text
/// SignedKeyMessage { body, signature(64) }     signature = group key over body
/// body = KeyMessage {
///     generation, ephemeral_pubkey,
///     member_entries: sorted [XChaCha20-Poly1305(entry_key_i, group_key)],
///     admin_entry: XChaCha20-Poly1305(admin_key, AdminEntry { key, recipients }),
///     supplement,
/// }
/// entry_key_i = BLAKE3-derive_key(DH(eph, X_i) || eph_pub || X_i)
/// ```
///
/// `X_i` is the X25519 form of member i's Ed25519 key. Members try every
/// entry with their own entry key; entry order reveals nothing about who the
/// recipients are. Admin devices recover key and recipient list from the
/// admin entry, keyed from the group seed.
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use serde_big_array::BigArray;
use std::collections::BTreeSet;
use thiserror::Error;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroize;

use crate::crypto::{encryption, key_exchange};
use crate::ids::AccountID;
use crate::limits::MAX_BLOB_BYTES;

use super::{KeysError, Result};

const ENTRY_KEY_CONTEXT: &str = "swarm-config 2024-01 key entry";
const ADMIN_KEY_INFO: &[u8] = b"swarm-config/keys-admin";

/// Why an inbound key message was not loaded. Logged, never returned.
#[derive(Error, Debug)]
pub(crate) enum KeyMessageError {
    #[error("message too large ({0} bytes)")]
    TooLarge(usize),
    #[error("malformed: {0}")]
    Malformed(String),
    #[error("bad group signature")]
    BadSignature,
    #[error("no entry addressed to this account")]
    NotForUs,
}

#[derive(Serialize, Deserialize)]
struct SignedKeyMessage {
    body: Vec<u8>,
    #[serde(with = "BigArray")]
    signature: [u8; 64],
}

#[derive(Serialize, Deserialize)]
struct KeyMessage {
    generation: u64,
    ephemeral_pubkey: [u8; 32],
    member_entries: Vec<Vec<u8>>,
    admin_entry: Vec<u8>,
    supplement: bool,
}

#[derive(Serialize, Deserialize)]
struct AdminEntry {
    key: [u8; 32],
    recipients: Vec<AccountID>,
}

/// A successfully opened key message.
pub(crate) struct OpenedKey {
    pub generation: u64,
    pub key: [u8; 32],
    pub supplement: bool,
    /// Only known when opened through the admin entry.
    pub recipients: Option<Vec<AccountID>>,
}

impl Drop for OpenedKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

/// Key protecting the admin entry, derived from the group seed.
pub(crate) fn admin_entry_key(group_signer: &SigningKey) -> Result<[u8; 32]> {
    Ok(encryption::derive_key(group_signer.as_bytes(), ADMIN_KEY_INFO)?)
}

fn entry_key(shared: &[u8; 32], ephemeral_pubkey: &[u8; 32], member_x25519: &[u8; 32]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(ENTRY_KEY_CONTEXT);
    hasher.update(shared);
    hasher.update(ephemeral_pubkey);
    hasher.update(member_x25519);
    *hasher.finalize().as_bytes()
}

/// Build and sign a key message distributing `key` to `recipients`.
pub(crate) fn build(
    group_signer: &SigningKey,
    generation: u64,
    key: &[u8; 32],
    recipients: &BTreeSet<AccountID>,
    supplement: bool,
) -> Result<Vec<u8>> {
    let (ephemeral_pubkey, mut ephemeral_secret) = key_exchange::generate_static_keypair();

    let mut member_entries = Vec::with_capacity(recipients.len());
    for member in recipients {
        let member_x25519 = key_exchange::derive_curve_key(&member.pubkey())?;
        let mut shared = key_exchange::derive_shared_secret(&ephemeral_secret, &member_x25519)?;
        let mut k = entry_key(&shared, &ephemeral_pubkey, &member_x25519);
        let entry = encryption::encrypt_message(key, &k);
        shared.zeroize();
        k.zeroize();
        member_entries.push(entry?);
    }
    ephemeral_secret.zeroize();
    member_entries.sort();

    let admin = AdminEntry {
        key: *key,
        recipients: recipients.iter().copied().collect(),
    };
    let mut admin_plain =
        bincode::serialize(&admin).map_err(|e| KeysError::Encode(e.to_string()))?;
    let mut admin_key = admin_entry_key(group_signer)?;
    let admin_entry = encryption::encrypt_message(&admin_plain, &admin_key);
    admin_plain.zeroize();
    admin_key.zeroize();

    let body = bincode::serialize(&KeyMessage {
        generation,
        ephemeral_pubkey,
        member_entries,
        admin_entry: admin_entry?,
        supplement,
    })
    .map_err(|e| KeysError::Encode(e.to_string()))?;

    let signature = group_signer.sign(&body).to_bytes();
    bincode::serialize(&SignedKeyMessage { body, signature })
        .map_err(|e| KeysError::Encode(e.to_string()))
}

/// Verify and open a key message.
///
/// Admins (`admin_key` set) read the admin entry; everyone else searches the
/// member entries with their X25519 secret.
pub(crate) fn open(
    blob: &[u8],
    group_pubkey: &VerifyingKey,
    user_curve: &StaticSecret,
    admin_key: Option<&[u8; 32]>,
) -> std::result::Result<OpenedKey, KeyMessageError> {
    if blob.len() > MAX_BLOB_BYTES {
        return Err(KeyMessageError::TooLarge(blob.len()));
    }
    let signed: SignedKeyMessage =
        bincode::deserialize(blob).map_err(|e| KeyMessageError::Malformed(e.to_string()))?;
    group_pubkey
        .verify(&signed.body, &Signature::from_bytes(&signed.signature))
        .map_err(|_| KeyMessageError::BadSignature)?;
    let message: KeyMessage = bincode::deserialize(&signed.body)
        .map_err(|e| KeyMessageError::Malformed(e.to_string()))?;

    if let Some(admin_key) = admin_key {
        if let Ok(mut plain) = encryption::decrypt_message(&message.admin_entry, admin_key) {
            let parsed: std::result::Result<AdminEntry, _> = bincode::deserialize(&plain);
            plain.zeroize();
            let entry = parsed.map_err(|e| KeyMessageError::Malformed(e.to_string()))?;
            return Ok(OpenedKey {
                generation: message.generation,
                key: entry.key,
                supplement: message.supplement,
                recipients: Some(entry.recipients),
            });
        }
    }

    let my_x25519 = PublicKey::from(user_curve).to_bytes();
    let mut shared = user_curve
        .diffie_hellman(&PublicKey::from(message.ephemeral_pubkey))
        .to_bytes();
    let mut k = entry_key(&shared, &message.ephemeral_pubkey, &my_x25519);
    shared.zeroize();

    let found = message
        .member_entries
        .iter()
        .find_map(|entry| encryption::decrypt_message(entry, &k).ok());
    k.zeroize();

    let mut plain = found.ok_or(KeyMessageError::NotForUs)?;
    let key: std::result::Result<[u8; 32], _> = plain.as_slice().try_into();
    plain.zeroize();
    let key = key.map_err(|_| KeyMessageError::Malformed("entry is not a 32-byte key".into()))?;

    Ok(OpenedKey {
        generation: message.generation,
        key,
        supplement: message.supplement,
        recipients: None,
    })
}
