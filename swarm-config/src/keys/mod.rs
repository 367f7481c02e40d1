/// Group key engine.
///
/// Holds the symmetric key generations a closed group encrypts its
/// `GroupInfo` / `GroupMembers` configs and its messages with:
///
/// - admins `rekey` to rotate to a new generation addressed to every current
///   member, or `key_supplement` to grant the current generation to new ones
/// - every device `load_key_message`s the distribution messages it fetches
/// - `encrypt_message` / `decrypt_message` seal group chat messages
/// - sub-account helpers issue and use delegated storage credentials
///
/// The info and members objects are only borrowed for the duration of a
/// call; after every key change their key lists are refreshed.
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use serde_big_array::BigArray;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use subtle::ConstantTimeEq;
use thiserror::Error;
use x25519_dalek::StaticSecret;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::config::{GroupInfo, GroupMembers};
use crate::crypto::blinding;
use crate::crypto::encryption::{self, EncryptionError};
use crate::crypto::key_exchange::{self, KeyExchangeError};
use crate::crypto::signing;
use crate::ids::{AccountID, IdError};
use crate::limits::{now_ms, RetentionPolicy, MAX_MESSAGE_PLAINTEXT, MESSAGE_PADDING_BUCKET};
use crate::namespace::Namespace;

pub mod message;
pub mod subaccount;

pub use subaccount::{verify_subaccount_auth, SubaccountToken, SwarmAuth};

const DUMP_VERSION: u8 = 1;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum KeysError {
    #[error("Invalid secret key: {0}")]
    InvalidSecretKey(String),

    #[error("Invalid group public key")]
    InvalidPublicKey,

    #[error("Info/members objects belong to a different group")]
    GroupMismatch,

    #[error("Operation requires the group admin key")]
    NotAdmin,

    #[error("No group key available")]
    NoKey,

    #[error("Message is {0} bytes, limit is {1}")]
    MessageTooLarge(usize, usize),

    #[error("Key generation counter is exhausted")]
    GenerationExhausted,

    #[error("Message is not decryptable with any retained key")]
    NotDecryptable,

    #[error("Sender signature is invalid")]
    BadSenderSignature,

    #[error("Malformed message: {0}")]
    Malformed(String),

    #[error("Invalid sub-account: {0}")]
    InvalidSubaccount(String),

    #[error("Corrupt dump: {0}")]
    CorruptDump(String),

    #[error("Encoding failed: {0}")]
    Encode(String),

    #[error("Encryption failed: {0}")]
    Encryption(#[from] EncryptionError),

    #[error("Key exchange failed: {0}")]
    KeyExchange(#[from] KeyExchangeError),

    #[error("Invalid id: {0}")]
    InvalidId(#[from] IdError),
}

pub type Result<T> = std::result::Result<T, KeysError>;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One symmetric key generation.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct KeyGeneration {
    pub generation: u64,
    pub key: [u8; 32],
    pub timestamp_ms: i64,
}

impl KeyGeneration {
    fn order_key(&self) -> (u64, i64, [u8; 32]) {
        (self.generation, self.timestamp_ms, self.key)
    }
}

impl fmt::Debug for KeyGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyGeneration")
            .field("generation", &self.generation)
            .field("timestamp_ms", &self.timestamp_ms)
            .finish_non_exhaustive()
    }
}

/// Key created by a local `rekey` whose message is not yet loaded back.
#[derive(Clone, Serialize, Deserialize)]
struct PendingKey {
    generation: u64,
    key: [u8; 32],
    timestamp_ms: i64,
    message: Vec<u8>,
}

impl Drop for PendingKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

/// A decrypted group message and its verified sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedMessage {
    pub sender: AccountID,
    pub plaintext: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct InnerMessage {
    sender: [u8; 32],
    #[serde(with = "BigArray")]
    signature: [u8; 64],
    content: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct KeysDump {
    version: u8,
    keys: Vec<KeyGeneration>,
    active_hashes: BTreeMap<u64, BTreeSet<String>>,
    pending: Option<PendingKey>,
    recipients: BTreeSet<AccountID>,
}

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

pub struct Keys {
    user_key: SigningKey,
    user_curve: StaticSecret,
    group_pubkey: VerifyingKey,
    group_signer: Option<SigningKey>,
    /// Retained generations, oldest first.
    keys: Vec<KeyGeneration>,
    /// Stored key-message hashes per generation.
    active_hashes: BTreeMap<u64, BTreeSet<String>>,
    pending: Option<PendingKey>,
    /// Admin only: accounts the current generation was distributed to.
    recipients: BTreeSet<AccountID>,
    needs_dump: bool,
    retention: RetentionPolicy,
}

impl Keys {
    /// Open the key engine for a group.
    ///
    /// # Arguments
    /// * `user_secret` - Our Ed25519 secret key (32-byte seed or 64-byte seed||pubkey)
    /// * `group_pubkey` - 32-byte group Ed25519 public key
    /// * `group_secret` - Group secret key when this device is an admin
    /// * `dump` - Previous `dump()` output
    /// * `info`, `members` - The group's config objects; their key lists are
    ///   refreshed from the restored state
    pub fn new(
        user_secret: &[u8],
        group_pubkey: &[u8],
        group_secret: Option<&[u8]>,
        dump: Option<&[u8]>,
        info: &mut GroupInfo,
        members: &mut GroupMembers,
    ) -> Result<Self> {
        let user_key = signing::signing_key_from_secret(user_secret)
            .map_err(|e| KeysError::InvalidSecretKey(e.to_string()))?;
        let group_pubkey =
            signing::verifying_key_from_bytes(group_pubkey).map_err(|_| KeysError::InvalidPublicKey)?;
        let group_signer = match group_secret {
            Some(secret) => {
                let key = signing::signing_key_from_secret(secret)
                    .map_err(|e| KeysError::InvalidSecretKey(e.to_string()))?;
                if key.verifying_key() != group_pubkey {
                    return Err(KeysError::InvalidSecretKey(
                        "group secret key does not match group public key".into(),
                    ));
                }
                Some(key)
            }
            None => None,
        };

        let mut keys = Keys {
            user_curve: key_exchange::curve_secret_from_seed(&user_key),
            user_key,
            group_pubkey,
            group_signer,
            keys: Vec::new(),
            active_hashes: BTreeMap::new(),
            pending: None,
            recipients: BTreeSet::new(),
            needs_dump: false,
            retention: RetentionPolicy::default(),
        };
        if let Some(bytes) = dump {
            keys.restore(bytes)?;
        }
        keys.refresh(info, members)?;
        Ok(keys)
    }

    /// Replace the generation retention policy. Applied on the next change.
    pub fn set_retention(&mut self, retention: RetentionPolicy) {
        self.retention = retention;
    }

    fn restore(&mut self, bytes: &[u8]) -> Result<()> {
        let dump: KeysDump =
            bincode::deserialize(bytes).map_err(|e| KeysError::CorruptDump(e.to_string()))?;
        if dump.version != DUMP_VERSION {
            return Err(KeysError::CorruptDump(format!(
                "unsupported dump version {}",
                dump.version
            )));
        }
        let mut keys = dump.keys.clone();
        keys.sort_by_key(|k| k.order_key());
        self.keys = keys;
        self.active_hashes = dump.active_hashes.clone();
        self.pending = dump.pending.clone();
        self.recipients = dump.recipients.clone();
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn storage_namespace(&self) -> Namespace {
        Namespace::GroupKeys
    }

    /// This device holds the group admin key.
    pub fn admin(&self) -> bool {
        self.group_signer.is_some()
    }

    pub fn group_id(&self) -> AccountID {
        AccountID::group(self.group_pubkey.as_bytes())
    }

    /// Any key known, including a pending one.
    pub fn has_key(&self) -> bool {
        self.pending.is_some() || !self.keys.is_empty()
    }

    /// Newest generation known; 0 without any key.
    pub fn current_generation(&self) -> u64 {
        let loaded = self.keys.last().map_or(0, |k| k.generation);
        let pending = self.pending.as_ref().map_or(0, |p| p.generation);
        loaded.max(pending)
    }

    /// Every usable key, newest first. A pending key comes first.
    pub fn group_keys(&self) -> Vec<[u8; 32]> {
        self.pending
            .iter()
            .map(|p| p.key)
            .chain(self.keys.iter().rev().map(|k| k.key))
            .collect()
    }

    /// Number of retained (loaded) generations.
    pub fn size(&self) -> usize {
        self.keys.len()
    }

    pub fn pending_key(&self) -> Option<[u8; 32]> {
        self.pending.as_ref().map(|p| p.key)
    }

    /// Key message from the last local `rekey`, to be stored in the
    /// `GroupKeys` namespace and loaded back once stored.
    pub fn pending_config(&self) -> Option<&[u8]> {
        self.pending.as_ref().map(|p| p.message.as_slice())
    }

    /// Hashes of stored key messages for retained generations.
    pub fn current_hashes(&self) -> Vec<String> {
        let all: BTreeSet<&String> = self.active_hashes.values().flatten().collect();
        all.into_iter().cloned().collect()
    }

    pub fn needs_dump(&self) -> bool {
        self.needs_dump
    }

    /// Admin hint: a rekey is advisable because there is no key yet, two
    /// admins rotated concurrently, or membership no longer matches the
    /// current generation's recipients.
    pub fn needs_rekey(&self, members: &GroupMembers) -> bool {
        if !self.admin() {
            return false;
        }
        if self.pending.is_some() {
            return false;
        }
        let Some(newest) = self.keys.last() else {
            return true;
        };
        let at_newest = self
            .keys
            .iter()
            .filter(|k| k.generation == newest.generation)
            .count();
        at_newest > 1 || self.recipients != members.key_recipients()
    }

    // -----------------------------------------------------------------------
    // Rotation
    // -----------------------------------------------------------------------

    fn signer(&self) -> Result<&SigningKey> {
        self.group_signer.as_ref().ok_or(KeysError::NotAdmin)
    }

    fn check_group(&self, info: &GroupInfo, members: &GroupMembers) -> Result<()> {
        let ours = Some(self.group_pubkey.to_bytes());
        if info.group_pubkey() != ours || members.group_pubkey() != ours {
            return Err(KeysError::GroupMismatch);
        }
        Ok(())
    }

    fn refresh(&self, info: &mut GroupInfo, members: &mut GroupMembers) -> Result<()> {
        self.check_group(info, members)?;
        let keys = self.group_keys();
        info.replace_keys(keys.clone());
        members.replace_keys(keys);
        Ok(())
    }

    /// Rotate to a new generation addressed to every current member.
    ///
    /// The new key is usable immediately; info and members are marked dirty
    /// so they get re-encrypted with it. Returns the key message to store.
    pub fn rekey(&mut self, info: &mut GroupInfo, members: &mut GroupMembers) -> Result<Vec<u8>> {
        self.check_group(info, members)?;
        let signer = self.signer()?;

        let generation = if self.has_key() {
            self.current_generation()
                .checked_add(1)
                .ok_or(KeysError::GenerationExhausted)?
        } else {
            0
        };
        let key = encryption::generate_key();
        let recipients = members.key_recipients();
        let message = message::build(signer, generation, &key, &recipients, false)?;

        self.pending = Some(PendingKey {
            generation,
            key,
            timestamp_ms: now_ms(),
            message: message.clone(),
        });
        self.recipients = recipients;
        self.needs_dump = true;

        self.refresh(info, members)?;
        info.mark_dirty();
        members.mark_dirty();

        log::debug!(
            target: "keys",
            "group {} rekeyed to generation {} for {} members",
            self.group_id(),
            generation,
            self.recipients.len()
        );
        Ok(message)
    }

    /// Distribute the current generation to `account_ids` without rotating.
    pub fn key_supplement(&mut self, account_ids: &[AccountID]) -> Result<Vec<u8>> {
        let signer = self.signer()?;
        let (generation, key) = match (&self.pending, self.keys.last()) {
            (Some(p), _) => (p.generation, p.key),
            (None, Some(k)) => (k.generation, k.key),
            (None, None) => return Err(KeysError::NoKey),
        };
        for id in account_ids {
            if id.is_group() {
                return Err(IdError::UnknownPrefix(id.prefix()).into());
            }
        }
        let targets: BTreeSet<AccountID> = account_ids.iter().copied().collect();
        let message = message::build(signer, generation, &key, &targets, true)?;

        self.recipients.extend(targets);
        self.needs_dump = true;
        log::debug!(
            target: "keys",
            "group {} supplement for generation {} to {} accounts",
            self.group_id(),
            generation,
            account_ids.len()
        );
        Ok(message)
    }

    /// Load a stored key-distribution message.
    ///
    /// Returns true if a new key was installed. Messages that are not
    /// addressed to us, fail verification, repeat a known key, or fall
    /// outside the retention window return false.
    pub fn load_key_message(
        &mut self,
        hash: &str,
        blob: &[u8],
        timestamp_ms: i64,
        info: &mut GroupInfo,
        members: &mut GroupMembers,
    ) -> bool {
        if let Err(e) = self.check_group(info, members) {
            log::warn!(target: "keys", "key message {} not loaded: {}", hash, e);
            return false;
        }

        let mut admin_key = match &self.group_signer {
            Some(signer) => match message::admin_entry_key(signer) {
                Ok(k) => Some(k),
                Err(e) => {
                    log::warn!(target: "keys", "admin key derivation failed: {}", e);
                    None
                }
            },
            None => None,
        };
        let opened = message::open(blob, &self.group_pubkey, &self.user_curve, admin_key.as_ref());
        if let Some(k) = admin_key.as_mut() {
            k.zeroize();
        }
        let opened = match opened {
            Ok(o) => o,
            Err(message::KeyMessageError::NotForUs) => {
                log::debug!(target: "keys", "key message {} not addressed to us", hash);
                return false;
            }
            Err(e) => {
                log::warn!(target: "keys", "rejected key message {}: {}", hash, e);
                return false;
            }
        };

        if let Some(recipients) = opened.recipients.as_ref() {
            self.absorb_recipients(opened.generation, opened.supplement, recipients);
        }

        let candidate = KeyGeneration {
            generation: opened.generation,
            key: opened.key,
            timestamp_ms,
        };
        let duplicate = self
            .keys
            .iter()
            .any(|k| k.generation == candidate.generation && k.key == candidate.key);

        if duplicate {
            if self.active_hashes.entry(candidate.generation).or_default().insert(hash.to_string()) {
                self.needs_dump = true;
            }
            log::debug!(
                target: "keys",
                "key message {} repeats generation {}",
                hash,
                candidate.generation
            );
            return false;
        }

        let generation = candidate.generation;
        let key = candidate.key;
        self.keys.push(candidate);
        self.keys.sort_by_key(|k| k.order_key());
        self.prune();
        if !self.keys.iter().any(|k| k.generation == generation && k.key == key) {
            log::warn!(
                target: "keys",
                "key message {} for generation {} is beyond retention",
                hash,
                generation
            );
            return false;
        }

        self.active_hashes
            .entry(generation)
            .or_default()
            .insert(hash.to_string());
        if self
            .pending
            .as_ref()
            .map_or(false, |p| p.generation == generation && p.key == key)
        {
            self.pending = None;
        }
        self.needs_dump = true;

        if let Err(e) = self.refresh(info, members) {
            log::warn!(target: "keys", "key refresh failed: {}", e);
        }
        log::debug!(
            target: "keys",
            "group {} loaded generation {} (now {})",
            self.group_id(),
            generation,
            self.current_generation()
        );
        true
    }

    fn absorb_recipients(&mut self, generation: u64, supplement: bool, recipients: &[AccountID]) {
        if generation < self.current_generation() {
            return;
        }
        if supplement {
            self.recipients.extend(recipients.iter().copied());
        } else {
            self.recipients = recipients.iter().copied().collect();
        }
    }

    /// Drop generations outside the retention policy. The newest generation
    /// is always kept; ages are measured from its timestamp.
    fn prune(&mut self) {
        let Some(newest) = self.keys.last() else {
            return;
        };
        let newest_ts = newest.timestamp_ms;
        let newest_order = newest.order_key();
        let max_age = self.retention.max_age_ms;
        self.keys
            .retain(|k| k.order_key() == newest_order || newest_ts.saturating_sub(k.timestamp_ms) <= max_age);

        let cap = self.retention.max_generations.max(1);
        if self.keys.len() > cap {
            let excess = self.keys.len() - cap;
            self.keys.drain(..excess);
        }

        let kept: BTreeSet<u64> = self.keys.iter().map(|k| k.generation).collect();
        let before = self.active_hashes.len();
        self.active_hashes.retain(|g, _| kept.contains(g));
        if self.active_hashes.len() != before {
            log::debug!(
                target: "keys",
                "pruned {} expired generations",
                before - self.active_hashes.len()
            );
        }
    }

    // -----------------------------------------------------------------------
    // Group messages
    // -----------------------------------------------------------------------

    /// Encrypt a group message with the newest key.
    ///
    /// The content is signed by our account key, padded to a multiple of
    /// `MESSAGE_PADDING_BUCKET` and sealed with a random nonce.
    pub fn encrypt_message(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        if plaintext.len() > MAX_MESSAGE_PLAINTEXT {
            return Err(KeysError::MessageTooLarge(plaintext.len(), MAX_MESSAGE_PLAINTEXT));
        }
        let key = self.group_keys().into_iter().next().ok_or(KeysError::NoKey)?;

        let mut to_sign = Vec::with_capacity(32 + plaintext.len());
        to_sign.extend_from_slice(self.group_pubkey.as_bytes());
        to_sign.extend_from_slice(plaintext);
        let inner = InnerMessage {
            sender: self.user_key.verifying_key().to_bytes(),
            signature: self.user_key.sign(&to_sign).to_bytes(),
            content: plaintext.to_vec(),
        };
        let encoded = bincode::serialize(&inner).map_err(|e| KeysError::Encode(e.to_string()))?;

        let mut padded = pad(&encoded);
        let sealed = encryption::encrypt_message(&padded, &key);
        padded.zeroize();
        Ok(sealed?)
    }

    /// Decrypt a group message, trying every retained key newest first.
    pub fn decrypt_message(&self, ciphertext: &[u8]) -> Result<DecryptedMessage> {
        let mut padded = self
            .group_keys()
            .iter()
            .find_map(|key| encryption::decrypt_message(ciphertext, key).ok())
            .ok_or(KeysError::NotDecryptable)?;
        let inner = unpad(&padded).and_then(|bytes| {
            bincode::deserialize::<InnerMessage>(bytes).map_err(|e| KeysError::Malformed(e.to_string()))
        });
        padded.zeroize();
        let inner = inner?;

        let sender_key =
            VerifyingKey::from_bytes(&inner.sender).map_err(|_| KeysError::BadSenderSignature)?;
        let mut signed = Vec::with_capacity(32 + inner.content.len());
        signed.extend_from_slice(self.group_pubkey.as_bytes());
        signed.extend_from_slice(&inner.content);
        sender_key
            .verify(&signed, &Signature::from_bytes(&inner.signature))
            .map_err(|_| KeysError::BadSenderSignature)?;

        Ok(DecryptedMessage {
            sender: AccountID::user(&inner.sender),
            plaintext: inner.content,
        })
    }

    // -----------------------------------------------------------------------
    // Sub-accounts
    // -----------------------------------------------------------------------

    /// Token for `member` with the given permissions. Needs no admin key.
    pub fn swarm_subaccount_token(
        &self,
        member: &AccountID,
        write: bool,
        delete: bool,
    ) -> Result<[u8; subaccount::TOKEN_LEN]> {
        let blinded = subaccount::blinded_pubkey_for(self.group_pubkey.as_bytes(), &member.pubkey())?;
        Ok(SubaccountToken::new(blinded, write, delete).to_bytes())
    }

    /// Admin-signed credential (`token || signature`) for `member`.
    pub fn swarm_make_subaccount(
        &self,
        member: &AccountID,
        write: bool,
        delete: bool,
    ) -> Result<[u8; subaccount::CREDENTIAL_LEN]> {
        let signer = self.signer()?;
        let token = self.swarm_subaccount_token(member, write, delete)?;
        let sig = signer.sign(&token).to_bytes();

        let mut credential = [0u8; subaccount::CREDENTIAL_LEN];
        credential[..subaccount::TOKEN_LEN].copy_from_slice(&token);
        credential[subaccount::TOKEN_LEN..].copy_from_slice(&sig);
        Ok(credential)
    }

    /// Sign a storage request with the credential an admin issued to us.
    pub fn swarm_subaccount_sign(&self, request: &[u8], signing_value: &[u8]) -> Result<SwarmAuth> {
        let (token, admin_sig) = subaccount::split_credential(signing_value)?;
        let blinded = blinding::blind_key(self.group_pubkey.as_bytes(), &self.user_key);
        if !bool::from(blinded.public[..].ct_eq(&token.blinded_pubkey[..])) {
            return Err(KeysError::InvalidSubaccount(
                "credential was issued to a different account".into(),
            ));
        }
        let signature = blinding::blinded_sign(&blinded, request)
            .map_err(|e| KeysError::InvalidSubaccount(e.to_string()))?;
        Ok(SwarmAuth::new(
            &signing_value[..subaccount::TOKEN_LEN],
            &admin_sig.to_bytes(),
            &signature,
        ))
    }

    // -----------------------------------------------------------------------
    // Dump
    // -----------------------------------------------------------------------

    pub fn dump(&mut self) -> Result<Vec<u8>> {
        let dump = KeysDump {
            version: DUMP_VERSION,
            keys: self.keys.clone(),
            active_hashes: self.active_hashes.clone(),
            pending: self.pending.clone(),
            recipients: self.recipients.clone(),
        };
        let bytes = bincode::serialize(&dump).map_err(|e| KeysError::Encode(e.to_string()))?;
        self.needs_dump = false;
        Ok(bytes)
    }
}

/// `len (u32 LE) || data || zeros`, rounded up to the padding bucket.
fn pad(data: &[u8]) -> Vec<u8> {
    let used = 4 + data.len();
    let total = used.div_ceil(MESSAGE_PADDING_BUCKET) * MESSAGE_PADDING_BUCKET;
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(data);
    out.resize(total, 0);
    out
}

fn unpad(padded: &[u8]) -> Result<&[u8]> {
    if padded.len() < 4 {
        return Err(KeysError::Malformed("padding header missing".into()));
    }
    let mut len_bytes = [0u8; 4];
    len_bytes.copy_from_slice(&padded[..4]);
    let len = u32::from_le_bytes(len_bytes) as usize;
    padded
        .get(4..4 + len)
        .ok_or_else(|| KeysError::Malformed("padding length out of range".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GroupMember, RemovedStatus};
    use crate::crypto::signing::generate_keypair;
    use rand::rngs::OsRng;

    struct Device {
        user: SigningKey,
        keys: Keys,
        info: GroupInfo,
        members: GroupMembers,
    }

    impl Device {
        fn id(&self) -> AccountID {
            AccountID::user(&self.user.verifying_key().to_bytes())
        }

        fn load(&mut self, hash: &str, blob: &[u8], timestamp_ms: i64) -> bool {
            self.keys
                .load_key_message(hash, blob, timestamp_ms, &mut self.info, &mut self.members)
        }

        fn rekey(&mut self) -> Result<Vec<u8>> {
            self.keys.rekey(&mut self.info, &mut self.members)
        }
    }

    fn device(group_pk: &[u8; 32], group_sk: Option<&[u8; 32]>) -> Device {
        let user = SigningKey::generate(&mut OsRng);
        let secret = group_sk.map(|s| &s[..]);
        let mut info = GroupInfo::new(group_pk, secret, None).unwrap();
        let mut members = GroupMembers::new(group_pk, secret, None).unwrap();
        let keys = Keys::new(user.as_bytes(), group_pk, secret, None, &mut info, &mut members).unwrap();
        Device {
            user,
            keys,
            info,
            members,
        }
    }

    /// Admin device plus `n` member devices, all listed in the admin's
    /// member list.
    fn group(n: usize) -> ([u8; 32], Device, Vec<Device>) {
        let (pk, sk) = generate_keypair();
        let mut admin = device(&pk, Some(&sk));
        let others: Vec<Device> = (0..n).map(|_| device(&pk, None)).collect();
        let mut me = GroupMember::new(admin.id());
        me.admin = true;
        admin.members.set(&me).unwrap();
        for d in &others {
            admin.members.set(&GroupMember::new(d.id())).unwrap();
        }
        (pk, admin, others)
    }

    #[test]
    fn test_rekey_refuses_to_wrap_generation() {
        let (pk, sk) = generate_keypair();
        let mut admin = device(&pk, Some(&sk));
        let mut me = GroupMember::new(admin.id());
        me.admin = true;
        admin.members.set(&me).unwrap();

        let recipients: BTreeSet<AccountID> = [admin.id()].into_iter().collect();
        let last = message::build(&SigningKey::from_bytes(&sk), u64::MAX, &[7u8; 32], &recipients, false)
            .unwrap();
        assert!(admin.load("kmax", &last, 1_000));
        assert_eq!(admin.keys.current_generation(), u64::MAX);

        let before = admin.keys.group_keys();
        assert!(matches!(admin.rekey(), Err(KeysError::GenerationExhausted)));
        assert_eq!(admin.keys.group_keys(), before);
        assert!(admin.keys.pending_config().is_none());
        assert_eq!(admin.keys.current_generation(), u64::MAX);
    }

    #[test]
    fn test_rekey_reaches_every_member() {
        let (pk, mut admin, mut others) = group(2);
        let mut outsider = device(&pk, None);

        assert!(!admin.keys.has_key());
        let msg = admin.rekey().unwrap();
        assert_eq!(admin.keys.current_generation(), 0);
        assert_eq!(admin.keys.pending_config(), Some(msg.as_slice()));
        assert!(admin.info.is_dirty());
        assert!(admin.members.is_dirty());

        assert!(admin.load("k0", &msg, 1_000));
        assert!(admin.keys.pending_config().is_none());
        assert!(!admin.load("k0", &msg, 1_000));
        assert_eq!(admin.keys.current_hashes(), vec!["k0".to_string()]);

        let key = admin.keys.group_keys()[0];
        for d in others.iter_mut() {
            assert!(d.load("k0", &msg, 1_000));
            assert!(!d.load("k0", &msg, 1_000));
            assert_eq!(d.keys.group_keys(), vec![key]);
            assert!(!d.keys.admin());
        }
        assert!(!outsider.load("k0", &msg, 1_000));
        assert!(!outsider.keys.has_key());

        // Configs sealed with the new key reach members.
        admin.info.set_name("Book club").unwrap();
        let pushed = admin.info.push().unwrap();
        admin.info.confirm_pushed(pushed.seqno, "i1");
        let member = &mut others[0];
        assert_eq!(member.info.merge(&[("i1".into(), pushed.blob)]), 1);
        assert_eq!(member.info.name(), Some("Book club"));
    }

    #[test]
    fn test_messages_between_members() {
        let (_, mut admin, mut others) = group(1);
        let msg = admin.rekey().unwrap();
        let bob = &mut others[0];
        assert!(bob.load("k0", &msg, 1_000));

        let sealed = admin.keys.encrypt_message(b"hello group").unwrap();
        let opened = bob.keys.decrypt_message(&sealed).unwrap();
        assert_eq!(opened.plaintext, b"hello group");
        assert_eq!(opened.sender, admin.id());

        let empty = bob.keys.encrypt_message(b"").unwrap();
        let opened = admin.keys.decrypt_message(&empty).unwrap();
        assert!(opened.plaintext.is_empty());
        assert_eq!(opened.sender, bob.id());

        let big = vec![0u8; MAX_MESSAGE_PLAINTEXT + 1];
        assert!(matches!(
            admin.keys.encrypt_message(&big),
            Err(KeysError::MessageTooLarge(_, _))
        ));

        let mut tampered = sealed.clone();
        let last = tampered.len() - 1;
        tampered[last] ^= 1;
        assert!(matches!(
            bob.keys.decrypt_message(&tampered),
            Err(KeysError::NotDecryptable)
        ));
    }

    #[test]
    fn test_padding_hides_length() {
        let a = pad(b"x");
        let b = pad(&[7u8; 200]);
        assert_eq!(a.len(), MESSAGE_PADDING_BUCKET);
        assert_eq!(b.len(), MESSAGE_PADDING_BUCKET);
        assert_eq!(pad(&[0u8; 253]).len(), 2 * MESSAGE_PADDING_BUCKET);
        assert_eq!(unpad(&b).unwrap(), &[7u8; 200][..]);
        assert!(unpad(&[1, 0]).is_err());
        assert!(unpad(&[9, 0, 0, 0, 1]).is_err());
    }

    #[test]
    fn test_no_key_cannot_encrypt() {
        let (_, admin, _) = group(0);
        assert!(matches!(admin.keys.encrypt_message(b"hi"), Err(KeysError::NoKey)));
        assert!(matches!(
            admin.keys.decrypt_message(&[0u8; 64]),
            Err(KeysError::NotDecryptable)
        ));
    }

    #[test]
    fn test_generations_load_out_of_order() {
        let (_, mut admin, mut others) = group(1);
        let m0 = admin.rekey().unwrap();
        let m1 = admin.rekey().unwrap();
        let m2 = admin.rekey().unwrap();
        assert_eq!(admin.keys.current_generation(), 2);
        let newest = admin.keys.pending_key().unwrap();

        let bob = &mut others[0];
        assert!(bob.load("k2", &m2, 3_000));
        assert_eq!(bob.keys.current_generation(), 2);
        assert!(bob.load("k0", &m0, 1_000));
        assert_eq!(bob.keys.current_generation(), 2);
        assert_eq!(bob.keys.group_keys()[0], newest);
        assert!(bob.load("k1", &m1, 2_000));
        assert_eq!(bob.keys.size(), 3);
        assert_eq!(bob.keys.group_keys()[0], newest);
        assert_eq!(bob.keys.current_hashes().len(), 3);
    }

    #[test]
    fn test_retention_drops_old_generations() {
        let (_, mut admin, mut others) = group(1);
        let m0 = admin.rekey().unwrap();
        let old = admin.keys.encrypt_message(b"from gen 0").unwrap();
        let m1 = admin.rekey().unwrap();
        let m2 = admin.rekey().unwrap();

        let bob = &mut others[0];
        bob.keys.set_retention(RetentionPolicy {
            max_age_ms: 1_000,
            max_generations: 32,
        });
        assert!(bob.load("k0", &m0, 0));
        assert!(bob.load("k1", &m1, 500));
        assert_eq!(bob.keys.decrypt_message(&old).unwrap().plaintext, b"from gen 0");

        assert!(bob.load("k2", &m2, 5_000));
        assert_eq!(bob.keys.size(), 1);
        assert_eq!(bob.keys.current_hashes(), vec!["k2".to_string()]);
        assert!(matches!(
            bob.keys.decrypt_message(&old),
            Err(KeysError::NotDecryptable)
        ));
        assert!(!bob.load("k0", &m0, 0));
        assert_eq!(bob.keys.size(), 1);
    }

    #[test]
    fn test_generation_cap() {
        let (_, mut admin, mut others) = group(1);
        let bob = &mut others[0];
        bob.keys.set_retention(RetentionPolicy {
            max_age_ms: i64::MAX,
            max_generations: 2,
        });
        for i in 0..4 {
            let msg = admin.rekey().unwrap();
            assert!(bob.load(&format!("k{}", i), &msg, i * 10));
        }
        assert_eq!(bob.keys.size(), 2);
        assert_eq!(bob.keys.current_generation(), 3);
    }

    #[test]
    fn test_member_cannot_administer() {
        let (_, mut admin, mut others) = group(1);
        let msg = admin.rekey().unwrap();
        let bob = &mut others[0];
        assert!(bob.load("k0", &msg, 1_000));
        let before = bob.keys.group_keys();
        let bob_id = bob.id();

        assert!(matches!(bob.rekey(), Err(KeysError::NotAdmin)));
        assert!(matches!(
            bob.keys.key_supplement(&[bob_id]),
            Err(KeysError::NotAdmin)
        ));
        assert!(matches!(
            bob.keys.swarm_make_subaccount(&bob_id, true, true),
            Err(KeysError::NotAdmin)
        ));
        assert_eq!(bob.keys.group_keys(), before);
        assert_eq!(bob.keys.current_generation(), 0);
        assert!(!bob.info.is_dirty());
        assert!(!bob.keys.needs_rekey(&bob.members));
    }

    #[test]
    fn test_supplement_and_needs_rekey() {
        let (pk, mut admin, mut others) = group(1);
        assert!(admin.keys.needs_rekey(&admin.members));
        let msg = admin.rekey().unwrap();
        assert!(!admin.keys.needs_rekey(&admin.members));
        assert!(admin.load("k0", &msg, 1_000));
        assert!(others[0].load("k0", &msg, 1_000));
        assert!(!admin.keys.needs_rekey(&admin.members));

        let mut dave = device(&pk, None);
        admin.members.set(&GroupMember::new(dave.id())).unwrap();
        assert!(admin.keys.needs_rekey(&admin.members));

        let supplement = admin.keys.key_supplement(&[dave.id()]).unwrap();
        assert!(!admin.keys.needs_rekey(&admin.members));
        assert!(dave.load("s0", &supplement, 2_000));
        assert_eq!(dave.keys.group_keys(), admin.keys.group_keys());
        assert!(!admin.load("s0", &supplement, 2_000));

        let group_id = admin.keys.group_id();
        assert!(admin.keys.key_supplement(&[group_id]).is_err());

        let bob_id = others[0].id();
        let mut bob = admin.members.get(&bob_id).unwrap();
        bob.removed = RemovedStatus::Removed;
        admin.members.set(&bob).unwrap();
        assert!(admin.keys.needs_rekey(&admin.members));
    }

    #[test]
    fn test_supplement_without_key() {
        let (_, mut admin, others) = group(1);
        assert!(matches!(
            admin.keys.key_supplement(&[others[0].id()]),
            Err(KeysError::NoKey)
        ));
    }

    #[test]
    fn test_subaccount_sign_and_verify() {
        let (pk, mut admin, mut others) = group(2);
        let msg = admin.rekey().unwrap();
        let bob_id = others[0].id();
        let credential = admin.keys.swarm_make_subaccount(&bob_id, true, false).unwrap();

        let bob = &mut others[0];
        assert!(bob.load("k0", &msg, 1_000));
        let token = bob.keys.swarm_subaccount_token(&bob_id, true, false).unwrap();
        assert_eq!(&credential[..subaccount::TOKEN_LEN], &token[..]);

        let auth = bob.keys.swarm_subaccount_sign(b"store 42", &credential).unwrap();
        let parsed = verify_subaccount_auth(&pk, b"store 42", &auth).unwrap();
        assert!(parsed.can_write());
        assert!(!parsed.can_delete());
        assert!(verify_subaccount_auth(&pk, b"store 43", &auth).is_err());

        let carol = &others[1];
        assert!(matches!(
            carol.keys.swarm_subaccount_sign(b"store 42", &credential),
            Err(KeysError::InvalidSubaccount(_))
        ));
    }

    #[test]
    fn test_dump_restore() {
        let (pk, mut admin, mut others) = group(1);
        let m0 = admin.rekey().unwrap();
        let bob = &mut others[0];
        assert!(bob.load("k0", &m0, 1_000));
        let m1 = admin.rekey().unwrap();
        assert!(bob.load("k1", &m1, 2_000));
        assert!(bob.keys.needs_dump());

        let dump = bob.keys.dump().unwrap();
        assert!(!bob.keys.needs_dump());
        let restored = Keys::new(
            bob.user.as_bytes(),
            &pk,
            None,
            Some(dump.as_slice()),
            &mut bob.info,
            &mut bob.members,
        )
        .unwrap();
        assert_eq!(restored.group_keys(), bob.keys.group_keys());
        assert_eq!(restored.current_generation(), 1);
        assert_eq!(restored.current_hashes(), bob.keys.current_hashes());

        let admin_dump = admin.keys.dump().unwrap();
        let sk = admin.keys.group_signer.as_ref().unwrap().to_bytes();
        let restored_admin = Keys::new(
            admin.user.as_bytes(),
            &pk,
            Some(&sk),
            Some(admin_dump.as_slice()),
            &mut admin.info,
            &mut admin.members,
        )
        .unwrap();
        assert_eq!(restored_admin.pending_config(), Some(m1.as_slice()));

        assert!(matches!(
            Keys::new(bob.user.as_bytes(), &pk, None, Some(&b"junk"[..]), &mut bob.info, &mut bob.members),
            Err(KeysError::CorruptDump(_))
        ));
    }

    #[test]
    fn test_objects_from_other_group_rejected() {
        let (pk, _) = generate_keypair();
        let (other_pk, _) = generate_keypair();
        let user = SigningKey::generate(&mut OsRng);
        let mut info = GroupInfo::new(&other_pk, None, None).unwrap();
        let mut members = GroupMembers::new(&pk, None, None).unwrap();
        assert!(matches!(
            Keys::new(user.as_bytes(), &pk, None, None, &mut info, &mut members),
            Err(KeysError::GroupMismatch)
        ));
        assert!(matches!(
            Keys::new(&[1u8; 5], &pk, None, None, &mut info, &mut members),
            Err(KeysError::InvalidSecretKey(_))
        ));
    }
}
