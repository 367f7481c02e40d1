/// Engine guardrails and retention tunables.
///
/// These constants bound blob sizes, merge batch work, and how long key
/// generations and tombstones are retained.

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Max plaintext accepted by `Keys::encrypt_message`.
pub const MAX_MESSAGE_PLAINTEXT: usize = 64 * 1024; // 64 KB

/// Encrypted group messages are padded up to a multiple of this.
pub const MESSAGE_PADDING_BUCKET: usize = 256;

/// Max bytes for display names (profile, contact, group, member).
pub const MAX_NAME_LENGTH: usize = 100;

/// Max bytes for a group description.
pub const MAX_DESCRIPTION_LENGTH: usize = 2_000;

/// Max size of a config push blob or a key-distribution message.
pub const MAX_BLOB_BYTES: usize = 1024 * 1024; // 1 MB

/// Max inputs considered per `merge` call; the rest are skipped.
pub const MAX_MERGE_BATCH: usize = 1_000;

/// Superseded key generations stay usable this long after the newest
/// generation was created.
pub const KEY_RETENTION_MS: i64 = 30 * DAY_MS;

/// Hard cap on retained key generations.
pub const MAX_RETAINED_GENERATIONS: usize = 32;

/// Removal tombstones are dropped this long after the removal.
pub const TOMBSTONE_RETENTION_MS: i64 = 30 * DAY_MS;

/// Retention policy for superseded key generations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Keep a superseded generation while `newest.timestamp - gen.timestamp`
    /// is at most this.
    pub max_age_ms: i64,
    /// Never keep more generations than this (the newest is always kept).
    pub max_generations: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        RetentionPolicy {
            max_age_ms: KEY_RETENTION_MS,
            max_generations: MAX_RETAINED_GENERATIONS,
        }
    }
}

/// Current wall-clock time in milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
