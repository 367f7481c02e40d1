/// Generic config sync engine.
///
/// `ConfigBase<D>` owns one config document and tracks its sync lifecycle
/// against the swarm:
///
/// - local edits bump the sequence number once and mark the object dirty
/// - `push` seals the whole document into an encrypted blob
/// - `confirm_pushed` records where the blob was stored and cleans the object
/// - `merge` folds blobs written by other devices into the document
///
/// Blobs are `[version][nonce 24][XChaCha20-Poly1305 ciphertext]` over a
/// bincode `ConfigMessage` carrying the CBOR-encoded document. The nonce is
/// derived from key and plaintext, so identical states always produce
/// identical blobs. Group namespaces are additionally signed by the group key.
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crdt::{cbor_bytes, Crdt, Writer};
use crate::crypto::{encryption, signing};
use crate::ids::{DeviceID, IdError};
use crate::limits::{now_ms, MAX_BLOB_BYTES, MAX_MERGE_BATCH, TOMBSTONE_RETENTION_MS};
use crate::namespace::Namespace;

const BLOB_VERSION: u8 = 1;
const DUMP_VERSION: u8 = 2;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid secret key: {0}")]
    InvalidSecretKey(String),

    #[error("Invalid group public key")]
    InvalidPublicKey,

    #[error("Corrupt dump: {0}")]
    CorruptDump(String),

    #[error("Config is read-only without the group admin key")]
    ReadOnly,

    #[error("No encryption key available for {0}")]
    NoEncryptionKey(Namespace),

    #[error("{0} is not a {1} namespace")]
    WrongNamespace(Namespace, &'static str),

    #[error("{field} exceeds {max} bytes")]
    ValueTooLong { field: &'static str, max: usize },

    #[error("Encoding failed: {0}")]
    Encode(String),

    #[error("Encryption failed: {0}")]
    Encryption(#[from] encryption::EncryptionError),

    #[error("Invalid id: {0}")]
    InvalidId(#[from] IdError),

    #[error("Invalid community URL: {0}")]
    InvalidUrl(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Why a single merge input was rejected. Never escapes `merge`.
#[derive(Error, Debug)]
enum BlobError {
    #[error("unsupported blob version {0}")]
    Version(u8),
    #[error("blob too large ({0} bytes)")]
    TooLarge(usize),
    #[error("not decryptable with any known key")]
    Undecryptable,
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error("blob belongs to namespace {0}")]
    ForeignNamespace(i16),
    #[error("missing or invalid group signature")]
    BadSignature,
}

// ---------------------------------------------------------------------------
// Document contract
// ---------------------------------------------------------------------------

/// A mergeable config document bound to one storage namespace.
pub trait ConfigDocument:
    Crdt + Clone + Default + PartialEq + Serialize + DeserializeOwned
{
    const NAMESPACE: Namespace;

    /// Drop removal tombstones older than the retention window.
    fn prune_tombstones(&mut self, _now_ms: i64, _retention_ms: i64) -> usize {
        0
    }
}

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Output of [`ConfigBase::push`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushResult {
    pub seqno: i64,
    pub blob: Vec<u8>,
    /// Previously stored hashes this blob supersedes; delete them once the
    /// new blob is stored.
    pub obsolete_hashes: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncState {
    /// Local state is represented by a stored blob.
    Clean,
    /// Local edits not yet pushed.
    Dirty,
    /// Pushed, waiting for `confirm_pushed`.
    Waiting,
}

// ---------------------------------------------------------------------------
// Wire and dump formats
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
struct ConfigMessage {
    namespace: i16,
    seqno: i64,
    body: Vec<u8>,
    signature: Option<Vec<u8>>,
}

#[derive(Serialize, Deserialize)]
struct ConfigDump {
    version: u8,
    namespace: i16,
    seqno: i64,
    state: SyncState,
    device: DeviceID,
    clock: u64,
    current_hash: Option<String>,
    stored_hashes: BTreeSet<String>,
    old_hashes: BTreeSet<String>,
    pending_obsolete: Option<(i64, Vec<String>)>,
    body: Vec<u8>,
}

fn signable_bytes(namespace: i16, seqno: i64, body: &[u8]) -> Result<Vec<u8>> {
    bincode::serialize(&(b"swarm-config-v1", namespace, seqno, body))
        .map_err(|e| ConfigError::Encode(e.to_string()))
}

// ---------------------------------------------------------------------------
// Sealing keys
// ---------------------------------------------------------------------------

#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub(crate) struct SymmetricKey(pub(crate) [u8; 32]);

enum Sealing {
    /// User namespaces: one key derived from the account seed.
    User { key: SymmetricKey },
    /// Group namespaces: keys from the group key engine, newest first.
    Group {
        group_pubkey: VerifyingKey,
        signer: Option<SigningKey>,
        keys: Vec<SymmetricKey>,
    },
}

// ---------------------------------------------------------------------------
// ConfigBase
// ---------------------------------------------------------------------------

pub struct ConfigBase<D: ConfigDocument> {
    doc: D,
    seqno: i64,
    state: SyncState,
    device: DeviceID,
    clock: u64,
    current_hash: Option<String>,
    stored_hashes: BTreeSet<String>,
    /// Stored blobs superseded by local state, to be deleted by the next push.
    old_hashes: BTreeSet<String>,
    pending_obsolete: Option<(i64, Vec<String>)>,
    needs_dump: bool,
    sealing: Sealing,
}

impl<D: ConfigDocument> ConfigBase<D> {
    /// Build a user-namespace object from the account's Ed25519 secret key
    /// (32-byte seed or 64-byte seed||pubkey), optionally restoring a dump.
    pub(crate) fn with_user_key(secret_key: &[u8], dump: Option<&[u8]>) -> Result<Self> {
        if D::NAMESPACE.is_group() {
            return Err(ConfigError::WrongNamespace(D::NAMESPACE, "user"));
        }
        let signing_key = signing::signing_key_from_secret(secret_key)
            .map_err(|e| ConfigError::InvalidSecretKey(e.to_string()))?;
        let info = format!("swarm-config/{}", D::NAMESPACE.encryption_domain());
        let key = encryption::derive_key(signing_key.as_bytes(), info.as_bytes())?;
        Self::with_sealing(Sealing::User { key: SymmetricKey(key) }, dump)
    }

    /// Build a group-namespace object. Without `group_secret` the object can
    /// merge but not push.
    pub(crate) fn with_group_key(
        group_pubkey: &[u8],
        group_secret: Option<&[u8]>,
        dump: Option<&[u8]>,
    ) -> Result<Self> {
        if !D::NAMESPACE.is_group() {
            return Err(ConfigError::WrongNamespace(D::NAMESPACE, "group"));
        }
        let group_pubkey = signing::verifying_key_from_bytes(group_pubkey)
            .map_err(|_| ConfigError::InvalidPublicKey)?;
        let signer = match group_secret {
            Some(secret) => {
                let key = signing::signing_key_from_secret(secret)
                    .map_err(|e| ConfigError::InvalidSecretKey(e.to_string()))?;
                if key.verifying_key() != group_pubkey {
                    return Err(ConfigError::InvalidSecretKey(
                        "group secret key does not match group public key".into(),
                    ));
                }
                Some(key)
            }
            None => None,
        };
        Self::with_sealing(
            Sealing::Group {
                group_pubkey,
                signer,
                keys: Vec::new(),
            },
            dump,
        )
    }

    fn with_sealing(sealing: Sealing, dump: Option<&[u8]>) -> Result<Self> {
        let mut base = ConfigBase {
            doc: D::default(),
            seqno: 0,
            state: SyncState::Clean,
            device: DeviceID::random(),
            clock: 0,
            current_hash: None,
            stored_hashes: BTreeSet::new(),
            old_hashes: BTreeSet::new(),
            pending_obsolete: None,
            needs_dump: false,
            sealing,
        };
        if let Some(bytes) = dump {
            base.restore(bytes)?;
        }
        Ok(base)
    }

    fn restore(&mut self, bytes: &[u8]) -> Result<()> {
        let dump: ConfigDump =
            bincode::deserialize(bytes).map_err(|e| ConfigError::CorruptDump(e.to_string()))?;
        if dump.version != DUMP_VERSION {
            return Err(ConfigError::CorruptDump(format!(
                "unsupported dump version {}",
                dump.version
            )));
        }
        if dump.namespace != D::NAMESPACE.id() {
            return Err(ConfigError::CorruptDump(format!(
                "dump is for namespace {}, expected {}",
                dump.namespace,
                D::NAMESPACE.id()
            )));
        }
        let doc: D = ciborium::from_reader(dump.body.as_slice())
            .map_err(|e| ConfigError::CorruptDump(e.to_string()))?;

        self.doc = doc;
        self.seqno = dump.seqno;
        self.state = dump.state;
        self.device = dump.device;
        self.clock = dump.clock;
        self.current_hash = dump.current_hash;
        self.stored_hashes = dump.stored_hashes;
        self.old_hashes = dump.old_hashes;
        self.pending_obsolete = dump.pending_obsolete;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn storage_namespace(&self) -> Namespace {
        D::NAMESPACE
    }

    pub fn encryption_domain(&self) -> &'static str {
        D::NAMESPACE.encryption_domain()
    }

    /// Local edits exist that have not been pushed yet.
    pub fn is_dirty(&self) -> bool {
        self.state == SyncState::Dirty
    }

    /// Dirty, the last push was never confirmed, or superseded blobs still
    /// need deleting.
    pub fn needs_push(&self) -> bool {
        self.state != SyncState::Clean || !self.old_hashes.is_empty()
    }

    /// State changed since the last `dump()`.
    pub fn needs_dump(&self) -> bool {
        self.needs_dump
    }

    pub fn seqno(&self) -> i64 {
        self.seqno
    }

    pub fn sync_state(&self) -> SyncState {
        self.state
    }

    /// Read-only access to the document.
    pub fn document(&self) -> &D {
        &self.doc
    }

    /// BLAKE3 over the canonical document encoding. Replicas holding the
    /// same logical state report the same hash.
    pub fn state_hash(&self) -> [u8; 32] {
        *blake3::hash(&cbor_bytes(&self.doc)).as_bytes()
    }

    /// Hashes currently known to hold this object's state on the swarm.
    pub fn current_hashes(&self) -> Vec<String> {
        self.stored_hashes.iter().cloned().collect()
    }

    /// Group public key for group namespaces.
    pub(crate) fn group_pubkey(&self) -> Option<[u8; 32]> {
        match &self.sealing {
            Sealing::Group { group_pubkey, .. } => Some(group_pubkey.to_bytes()),
            Sealing::User { .. } => None,
        }
    }

    /// Group objects without the admin key cannot push.
    pub fn is_readonly(&self) -> bool {
        matches!(self.sealing, Sealing::Group { signer: None, .. })
    }

    // -----------------------------------------------------------------------
    // Local edits
    // -----------------------------------------------------------------------

    /// Run a local edit. The object is dirtied only if the document changed.
    pub(crate) fn edit<R>(&mut self, f: impl FnOnce(&mut D, &mut Writer) -> R) -> R {
        let mut writer = Writer::new(
            self.clock.max(self.doc.max_lamport()),
            self.device,
            now_ms(),
        );
        let before = self.doc.clone();
        let out = f(&mut self.doc, &mut writer);
        self.clock = writer.clock();
        if self.doc != before {
            self.mark_changed();
        }
        out
    }

    /// Like [`edit`](Self::edit), but rejected on read-only group objects.
    pub(crate) fn admin_edit<R>(&mut self, f: impl FnOnce(&mut D, &mut Writer) -> R) -> Result<R> {
        if self.is_readonly() {
            return Err(ConfigError::ReadOnly);
        }
        Ok(self.edit(f))
    }

    fn mark_changed(&mut self) {
        if self.state != SyncState::Dirty {
            self.seqno += 1;
            self.state = SyncState::Dirty;
            log::debug!(target: "config", "{} dirty at seqno {}", D::NAMESPACE, self.seqno);
        }
        self.needs_dump = true;
    }

    /// Force a re-push of unchanged content, e.g. after a group key rotation.
    pub(crate) fn mark_dirty(&mut self) {
        self.mark_changed();
    }

    /// Install group keys, newest first. No-op for user namespaces.
    pub(crate) fn replace_keys(&mut self, new_keys: Vec<[u8; 32]>) {
        if let Sealing::Group { keys, .. } = &mut self.sealing {
            *keys = new_keys.into_iter().map(SymmetricKey).collect();
        }
    }

    // -----------------------------------------------------------------------
    // Push / confirm
    // -----------------------------------------------------------------------

    /// Seal the current state into a blob.
    ///
    /// Returns the blob, its seqno and the stored hashes it supersedes. The
    /// object stays unclean until [`confirm_pushed`](Self::confirm_pushed).
    pub fn push(&mut self) -> Result<PushResult> {
        if self.is_readonly() {
            return Err(ConfigError::ReadOnly);
        }

        if self.state == SyncState::Dirty {
            let pruned = self.doc.prune_tombstones(now_ms(), TOMBSTONE_RETENTION_MS);
            if pruned > 0 {
                log::debug!(target: "config", "{} pruned {} tombstones", D::NAMESPACE, pruned);
            }
        }

        let blob = self.seal()?;

        let mut obsolete_hashes: Vec<String> = self
            .stored_hashes
            .iter()
            .filter(|h| {
                self.state != SyncState::Clean || self.current_hash.as_deref() != Some(h.as_str())
            })
            .chain(self.old_hashes.iter())
            .cloned()
            .collect();
        obsolete_hashes.sort();
        obsolete_hashes.dedup();

        if self.state == SyncState::Dirty {
            self.state = SyncState::Waiting;
            self.needs_dump = true;
        }
        self.pending_obsolete = Some((self.seqno, obsolete_hashes.clone()));

        log::debug!(
            target: "config",
            "{} push seqno {} ({} bytes, {} obsolete)",
            D::NAMESPACE,
            self.seqno,
            blob.len(),
            obsolete_hashes.len()
        );

        Ok(PushResult {
            seqno: self.seqno,
            blob,
            obsolete_hashes,
        })
    }

    /// Record that the blob pushed with `seqno` is stored under `hash`.
    ///
    /// Cleans the object if no edits happened since that push; newer edits
    /// stay dirty. Hashes the push declared obsolete are retired.
    pub fn confirm_pushed(&mut self, seqno: i64, hash: &str) {
        if let Some((pending_seqno, obsolete)) = self.pending_obsolete.take() {
            if pending_seqno == seqno {
                for h in &obsolete {
                    self.stored_hashes.remove(h);
                    self.old_hashes.remove(h);
                }
            } else {
                self.pending_obsolete = Some((pending_seqno, obsolete));
            }
        }

        if seqno == self.seqno {
            if self.state == SyncState::Waiting {
                self.state = SyncState::Clean;
            }
            if self.state == SyncState::Clean {
                self.current_hash = Some(hash.to_string());
            }
        } else {
            log::debug!(
                target: "config",
                "{} confirm for stale seqno {} (now {})",
                D::NAMESPACE,
                seqno,
                self.seqno
            );
        }

        self.stored_hashes.insert(hash.to_string());
        self.needs_dump = true;
    }

    fn encryption_key(&self) -> Result<&[u8; 32]> {
        match &self.sealing {
            Sealing::User { key } => Ok(&key.0),
            Sealing::Group { keys, .. } => keys
                .first()
                .map(|k| &k.0)
                .ok_or(ConfigError::NoEncryptionKey(D::NAMESPACE)),
        }
    }

    fn seal(&self) -> Result<Vec<u8>> {
        let namespace = D::NAMESPACE.id();
        let body = cbor_bytes(&self.doc);
        let signature = match &self.sealing {
            Sealing::Group {
                signer: Some(signer),
                ..
            } => Some(
                signer
                    .sign(&signable_bytes(namespace, self.seqno, &body)?)
                    .to_bytes()
                    .to_vec(),
            ),
            _ => None,
        };
        let message = ConfigMessage {
            namespace,
            seqno: self.seqno,
            body,
            signature,
        };
        let plaintext =
            bincode::serialize(&message).map_err(|e| ConfigError::Encode(e.to_string()))?;

        let sealed = encryption::encrypt_deterministic(&plaintext, self.encryption_key()?)?;
        let mut blob = Vec::with_capacity(1 + sealed.len());
        blob.push(BLOB_VERSION);
        blob.extend_from_slice(&sealed);
        Ok(blob)
    }

    // -----------------------------------------------------------------------
    // Merge
    // -----------------------------------------------------------------------

    fn open(&self, blob: &[u8]) -> std::result::Result<(i64, D), BlobError> {
        if blob.len() > MAX_BLOB_BYTES {
            return Err(BlobError::TooLarge(blob.len()));
        }
        let (&version, sealed) = blob.split_first().ok_or(BlobError::Malformed("empty".into()))?;
        if version != BLOB_VERSION {
            return Err(BlobError::Version(version));
        }

        let plaintext = match &self.sealing {
            Sealing::User { key } => encryption::decrypt_message(sealed, &key.0).ok(),
            Sealing::Group { keys, .. } => keys
                .iter()
                .find_map(|k| encryption::decrypt_message(sealed, &k.0).ok()),
        }
        .ok_or(BlobError::Undecryptable)?;

        let message: ConfigMessage = bincode::deserialize(&plaintext)
            .map_err(|e| BlobError::Malformed(e.to_string()))?;
        if message.namespace != D::NAMESPACE.id() {
            return Err(BlobError::ForeignNamespace(message.namespace));
        }

        if let Sealing::Group { group_pubkey, .. } = &self.sealing {
            let sig_bytes: [u8; 64] = message
                .signature
                .as_deref()
                .and_then(|s| s.try_into().ok())
                .ok_or(BlobError::BadSignature)?;
            let signed = signable_bytes(message.namespace, message.seqno, &message.body)
                .map_err(|e| BlobError::Malformed(e.to_string()))?;
            group_pubkey
                .verify(&signed, &Signature::from_bytes(&sig_bytes))
                .map_err(|_| BlobError::BadSignature)?;
        }

        let doc: D = ciborium::from_reader(message.body.as_slice())
            .map_err(|e| BlobError::Malformed(e.to_string()))?;
        Ok((message.seqno, doc))
    }

    /// Fold stored blobs into local state.
    ///
    /// Inputs whose hash is already known contribute nothing; inputs that
    /// fail to decrypt, verify or parse are skipped. Older blobs whose
    /// content is already held locally are queued for deletion instead of
    /// being counted. Returns how many inputs were folded in.
    pub fn merge(&mut self, inputs: &[(String, Vec<u8>)]) -> usize {
        // Cap after a canonical sort so the surviving inputs do not depend on
        // caller order. Duplicate hashes keep the smallest blob.
        let mut candidates: Vec<&(String, Vec<u8>)> = inputs
            .iter()
            .filter(|(hash, _)| !self.stored_hashes.contains(hash) && !self.old_hashes.contains(hash))
            .collect();
        candidates.sort();
        candidates.dedup_by(|a, b| a.0 == b.0);
        if candidates.len() > MAX_MERGE_BATCH {
            log::warn!(
                target: "config",
                "{} merge batch truncated from {} to {} inputs",
                D::NAMESPACE,
                candidates.len(),
                MAX_MERGE_BATCH
            );
            candidates.truncate(MAX_MERGE_BATCH);
        }

        let mut accepted = Vec::new();
        for (hash, blob) in candidates {
            match self.open(blob) {
                Ok((seqno, doc)) => accepted.push((seqno, hash.clone(), doc)),
                Err(e) => {
                    log::warn!(target: "config", "{} skipping merge input {}: {}", D::NAMESPACE, hash, e)
                }
            }
        }

        // Canonical order so the resulting seqno is independent of input order.
        accepted.sort_by(|a, b| (a.0, &a.1).cmp(&(b.0, &b.1)));

        let mut count = 0;
        let mut changed = false;
        for (seqno, hash, doc) in accepted {
            if self.fold(seqno, hash, doc) {
                count += 1;
            }
            changed = true;
        }
        if changed {
            self.needs_dump = true;
        }
        count
    }

    /// Returns false if the blob was superseded and only queued for deletion.
    fn fold(&mut self, seqno: i64, hash: String, incoming: D) -> bool {
        let mut merged = self.doc.clone();
        merged.merge(&incoming);

        if merged == incoming && seqno >= self.seqno {
            // Incoming blob already holds everything we have.
            self.doc = merged;
            self.seqno = seqno;
            self.state = SyncState::Clean;
            self.current_hash = Some(hash.clone());
        } else if merged == self.doc && seqno < self.seqno {
            log::debug!(target: "config", "{} {} is superseded (seqno {})", D::NAMESPACE, hash, seqno);
            self.old_hashes.insert(hash);
            return false;
        } else {
            self.doc = merged;
            if !(self.state == SyncState::Dirty && self.seqno > seqno) {
                self.seqno = self.seqno.max(seqno) + 1;
            }
            self.state = SyncState::Dirty;
            log::debug!(
                target: "config",
                "{} merge conflict with {}, re-push at seqno {}",
                D::NAMESPACE,
                hash,
                self.seqno
            );
        }

        self.stored_hashes.insert(hash);
        self.clock = self.clock.max(self.doc.max_lamport());
        true
    }

    // -----------------------------------------------------------------------
    // Dump
    // -----------------------------------------------------------------------

    /// Full local snapshot for persistence. Not mergeable by other devices.
    pub fn dump(&mut self) -> Result<Vec<u8>> {
        let dump = ConfigDump {
            version: DUMP_VERSION,
            namespace: D::NAMESPACE.id(),
            seqno: self.seqno,
            state: self.state,
            device: self.device,
            clock: self.clock,
            current_hash: self.current_hash.clone(),
            stored_hashes: self.stored_hashes.clone(),
            old_hashes: self.old_hashes.clone(),
            pending_obsolete: self.pending_obsolete.clone(),
            body: cbor_bytes(&self.doc),
        };
        let bytes = bincode::serialize(&dump).map_err(|e| ConfigError::Encode(e.to_string()))?;
        self.needs_dump = false;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Contacts, GroupInfo, UserProfile};
    use crate::crypto::signing::generate_keypair;
    use crate::ids::AccountID;

    fn seed() -> [u8; 32] {
        generate_keypair().1
    }

    fn blob_of(config: &mut Contacts, hash: &str) -> (String, Vec<u8>) {
        let pushed = config.push().unwrap();
        config.confirm_pushed(pushed.seqno, hash);
        (hash.to_string(), pushed.blob)
    }

    #[test]
    fn test_push_confirm_round_trip() {
        let mut profile = UserProfile::new(&seed(), None).unwrap();
        profile.set_name("Alice").unwrap();
        assert_eq!(profile.sync_state(), SyncState::Dirty);

        let pushed = profile.push().unwrap();
        assert_eq!(profile.sync_state(), SyncState::Waiting);
        profile.confirm_pushed(pushed.seqno, "h1");

        assert!(!profile.is_dirty());
        assert!(!profile.needs_push());
        assert!(profile.current_hashes().contains(&"h1".to_string()));
    }

    #[test]
    fn test_edit_while_waiting_survives_confirm() {
        let mut profile = UserProfile::new(&seed(), None).unwrap();
        profile.set_name("Alice").unwrap();
        let first = profile.push().unwrap();
        profile.set_name("Alicia").unwrap();
        assert_eq!(profile.seqno(), 2);

        profile.confirm_pushed(first.seqno, "h1");
        assert!(profile.is_dirty());
        assert_eq!(profile.current_hashes(), vec!["h1".to_string()]);

        let second = profile.push().unwrap();
        assert_eq!(second.seqno, 2);
        assert_eq!(second.obsolete_hashes, vec!["h1".to_string()]);
        profile.confirm_pushed(second.seqno, "h2");
        assert_eq!(profile.current_hashes(), vec!["h2".to_string()]);
    }

    #[test]
    fn test_needs_dump_tracking() {
        let mut profile = UserProfile::new(&seed(), None).unwrap();
        assert!(!profile.needs_dump());
        profile.set_name("Alice").unwrap();
        assert!(profile.needs_dump());
        profile.dump().unwrap();
        assert!(!profile.needs_dump());
        let pushed = profile.push().unwrap();
        profile.dump().unwrap();
        profile.confirm_pushed(pushed.seqno, "h1");
        assert!(profile.needs_dump());
    }

    #[test]
    fn test_merge_idempotent() {
        let seed = seed();
        let id = AccountID::user(&generate_keypair().0);
        let mut writer = Contacts::new(&seed, None).unwrap();
        writer.set_name(&id, "Alice").unwrap();
        let input = blob_of(&mut writer, "h1");

        let mut reader = Contacts::new(&seed, None).unwrap();
        assert_eq!(reader.merge(&[input.clone(), input.clone()]), 1);
        let hash_once = reader.state_hash();
        let seqno_once = reader.seqno();
        let dump_once = reader.dump().unwrap();

        assert_eq!(reader.merge(&[input]), 0);
        assert_eq!(reader.state_hash(), hash_once);
        assert_eq!(reader.seqno(), seqno_once);
        assert!(!reader.needs_dump());
        assert_eq!(reader.dump().unwrap(), dump_once);
    }

    #[test]
    fn test_merge_commutative_over_permutations() {
        let seed = seed();
        let ids: Vec<AccountID> = (0..3).map(|_| AccountID::user(&generate_keypair().0)).collect();
        let mut inputs = Vec::new();
        for (i, id) in ids.iter().enumerate() {
            let mut device = Contacts::new(&seed, None).unwrap();
            device.set_name(id, &format!("member {}", i)).unwrap();
            device.set_name(&ids[0], &format!("shared {}", i)).unwrap();
            inputs.push(blob_of(&mut device, &format!("h{}", i)));
        }

        let orders = [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];
        let mut results = Vec::new();
        for order in orders {
            let batch: Vec<(String, Vec<u8>)> = order.iter().map(|&i| inputs[i].clone()).collect();
            let mut reader = Contacts::new(&seed, None).unwrap();
            assert_eq!(reader.merge(&batch), 3);
            let push = reader.push().unwrap();
            results.push((reader.state_hash(), reader.seqno(), push.blob, reader.current_hashes()));
        }
        assert!(results.windows(2).all(|w| w[0] == w[1]));

        // One input per call converges to the same document too.
        let mut stepwise = Contacts::new(&seed, None).unwrap();
        for i in [2, 0, 1] {
            stepwise.merge(&[inputs[i].clone()]);
        }
        assert_eq!(stepwise.state_hash(), results[0].0);
        assert_eq!(stepwise.len(), 3);
    }

    #[test]
    fn test_superseded_hash_is_retired_not_current() {
        let seed = seed();
        let mut profile = UserProfile::new(&seed, None).unwrap();
        profile.set_name("Alice").unwrap();
        let first = profile.push().unwrap();
        profile.confirm_pushed(first.seqno, "h1");
        profile.set_name("Alicia").unwrap();
        let second = profile.push().unwrap();
        profile.confirm_pushed(second.seqno, "h2");
        assert_eq!(profile.current_hashes(), vec!["h2".to_string()]);
        assert!(!profile.needs_push());

        // The swarm keeps serving h1 until its delete lands.
        let fetched = [
            ("h1".to_string(), first.blob.clone()),
            ("h2".to_string(), second.blob.clone()),
        ];
        assert_eq!(profile.merge(&fetched), 0);
        assert_eq!(profile.current_hashes(), vec!["h2".to_string()]);
        assert_eq!(profile.name(), Some("Alicia"));
        assert_eq!(profile.seqno(), 2);
        assert!(!profile.is_dirty());
        assert!(profile.needs_push());

        let restored = UserProfile::new(&seed, Some(&profile.dump().unwrap())).unwrap();
        assert!(restored.needs_push());

        let retry = profile.push().unwrap();
        assert_eq!(retry.seqno, 2);
        assert_eq!(retry.obsolete_hashes, vec!["h1".to_string()]);
        assert_eq!(profile.merge(&fetched), 0);
        profile.confirm_pushed(retry.seqno, "h2");
        assert!(!profile.needs_push());
        assert_eq!(profile.current_hashes(), vec!["h2".to_string()]);
    }

    #[test]
    fn test_oversized_batch_independent_of_order() {
        let seed = seed();
        let id = AccountID::user(&generate_keypair().0);
        let mut writer = Contacts::new(&seed, None).unwrap();
        writer.set_name(&id, "Alice").unwrap();
        let valid = blob_of(&mut writer, "a-valid");
        let junk: Vec<(String, Vec<u8>)> = (0..MAX_MERGE_BATCH)
            .map(|i| (format!("junk-{:04}", i), vec![BLOB_VERSION, i as u8]))
            .collect();

        let mut valid_first = vec![valid.clone()];
        valid_first.extend(junk.iter().cloned());
        let mut valid_last = junk;
        valid_last.push(valid);

        let mut a = Contacts::new(&seed, None).unwrap();
        let mut b = Contacts::new(&seed, None).unwrap();
        assert_eq!(a.merge(&valid_first), 1);
        assert_eq!(b.merge(&valid_last), 1);
        assert_eq!(a.state_hash(), b.state_hash());
        assert_eq!(a.current_hashes(), b.current_hashes());
        assert_eq!(b.len(), 1);
    }

    #[test]
    fn test_dump_restore_fidelity() {
        let seed = seed();
        let id = AccountID::user(&generate_keypair().0);
        let mut original = Contacts::new(&seed, None).unwrap();
        original.set_name(&id, "Alice").unwrap();
        original.set_nickname(&id, "Ally").unwrap();
        blob_of(&mut original, "h1");
        let dump = original.dump().unwrap();

        let mut restored = Contacts::new(&seed, Some(&dump)).unwrap();
        assert_eq!(restored.seqno(), original.seqno());
        assert_eq!(restored.state_hash(), original.state_hash());
        assert_eq!(restored.push().unwrap(), original.push().unwrap());

        let mut direct = Contacts::new(&seed, None).unwrap();
        direct.set_name(&id, "Alice").unwrap();
        direct.set_nickname(&id, "Ally").unwrap();
        let from_direct = blob_of(&mut direct, "h2");
        let from_restored = blob_of(&mut restored, "h1");

        direct.merge(&[from_restored]);
        restored.merge(&[from_direct]);
        assert_eq!(direct.get(&id), restored.get(&id));
        assert_eq!(direct.state_hash(), restored.state_hash());
    }

    #[test]
    fn test_dirty_merge_keeps_higher_local_seqno() {
        let seed = seed();
        let mut remote = UserProfile::new(&seed, None).unwrap();
        remote.set_name("Remote").unwrap();
        let pushed = remote.push().unwrap();
        assert_eq!(pushed.seqno, 1);

        let mut local = UserProfile::new(&seed, None).unwrap();
        for n in 0..3 {
            local.set_nts_priority(n + 1);
            let p = local.push().unwrap();
            local.confirm_pushed(p.seqno, &format!("l{}", n));
        }
        local.set_nts_priority(9);
        assert_eq!(local.seqno(), 4);
        assert!(local.is_dirty());

        assert_eq!(local.merge(&[("r1".into(), pushed.blob)]), 1);
        assert_eq!(local.seqno(), 4);
        assert!(local.is_dirty());
        assert_eq!(local.nts_priority(), 9);
    }

    #[test]
    fn test_clean_merge_of_older_conflict_bumps_seqno() {
        let seed = seed();
        let mut remote = UserProfile::new(&seed, None).unwrap();
        remote.set_name("Remote").unwrap();
        let pushed = remote.push().unwrap();

        let mut local = UserProfile::new(&seed, None).unwrap();
        for n in 0..2 {
            local.set_nts_priority(n + 1);
            let p = local.push().unwrap();
            local.confirm_pushed(p.seqno, &format!("l{}", n));
        }
        assert_eq!(local.seqno(), 2);

        local.merge(&[("r1".into(), pushed.blob)]);
        assert_eq!(local.seqno(), 3);
        assert!(local.is_dirty());
        let next = local.push().unwrap();
        assert_eq!(next.seqno, 3);
        assert_eq!(next.obsolete_hashes, vec!["l1".to_string(), "r1".to_string()]);
    }

    #[test]
    fn test_merge_skips_bad_inputs() {
        let seed = seed();
        let id = AccountID::user(&generate_keypair().0);
        let mut writer = Contacts::new(&seed, None).unwrap();
        writer.set_name(&id, "Alice").unwrap();
        let (hash, blob) = blob_of(&mut writer, "good");

        let mut wrong_version = blob.clone();
        wrong_version[0] = 9;
        let mut tampered = blob.clone();
        let last = tampered.len() - 1;
        tampered[last] ^= 0x01;
        let oversized = vec![BLOB_VERSION; MAX_BLOB_BYTES + 1];

        let mut reader = Contacts::new(&seed, None).unwrap();
        let merged = reader.merge(&[
            ("v".into(), wrong_version),
            ("t".into(), tampered),
            ("o".into(), oversized),
            ("e".into(), Vec::new()),
            (hash, blob),
        ]);
        assert_eq!(merged, 1);
        assert_eq!(reader.current_hashes(), vec!["good".to_string()]);
        assert_eq!(reader.len(), 1);
    }

    #[test]
    fn test_blob_for_other_namespace_rejected() {
        let seed = seed();
        let mut profile = UserProfile::new(&seed, None).unwrap();
        profile.set_name("Alice").unwrap();
        let blob = profile.push().unwrap().blob;

        let mut contacts = Contacts::new(&seed, None).unwrap();
        assert_eq!(contacts.merge(&[("p".into(), blob)]), 0);
    }

    #[test]
    fn test_corrupt_and_foreign_dumps() {
        let seed = seed();
        let mut profile = UserProfile::new(&seed, None).unwrap();
        let dump = profile.dump().unwrap();

        assert!(matches!(
            Contacts::new(&seed, Some(&dump)),
            Err(ConfigError::CorruptDump(_))
        ));
        let mut bumped = dump.clone();
        bumped[0] = DUMP_VERSION + 1;
        assert!(matches!(
            UserProfile::new(&seed, Some(&bumped)),
            Err(ConfigError::CorruptDump(_))
        ));
        assert!(UserProfile::new(&seed, Some(&dump)).is_ok());
    }

    #[test]
    fn test_secret_key_forms() {
        let (public, seed) = generate_keypair();
        let full = [seed, public].concat();
        assert!(UserProfile::new(&full, None).is_ok());

        let mut mismatched = full.clone();
        mismatched[40] ^= 0xff;
        assert!(matches!(
            UserProfile::new(&mismatched, None),
            Err(ConfigError::InvalidSecretKey(_))
        ));
        assert!(matches!(
            UserProfile::new(&seed[..31], None),
            Err(ConfigError::InvalidSecretKey(_))
        ));
    }

    #[test]
    fn test_group_merge_across_key_rotation() {
        let (pk, sk) = generate_keypair();
        let (old_key, new_key) = ([1u8; 32], [2u8; 32]);
        let mut admin = GroupInfo::new(&pk, Some(&sk), None).unwrap();
        admin.replace_keys(vec![old_key]);
        admin.set_name("Before").unwrap();
        let old_blob = admin.push().unwrap().blob;

        let mut rotated = GroupInfo::new(&pk, None, None).unwrap();
        rotated.replace_keys(vec![new_key, old_key]);
        assert_eq!(rotated.merge(&[("old".into(), old_blob.clone())]), 1);
        assert_eq!(rotated.name(), Some("Before"));

        let mut new_only = GroupInfo::new(&pk, None, None).unwrap();
        new_only.replace_keys(vec![new_key]);
        assert_eq!(new_only.merge(&[("old".into(), old_blob)]), 0);
    }

    #[test]
    fn test_user_constructor_rejects_group_namespace() {
        let (pk, _) = generate_keypair();
        assert!(matches!(
            ConfigBase::<crate::config::contacts::ContactsDoc>::with_group_key(&pk, None, None),
            Err(ConfigError::WrongNamespace(Namespace::Contacts, "group"))
        ));
        assert!(matches!(
            GroupInfo::new(&[0u8; 5], None, None),
            Err(ConfigError::InvalidPublicKey)
        ));
    }
}
