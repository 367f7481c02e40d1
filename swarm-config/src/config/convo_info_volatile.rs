/// Volatile per-conversation state: read markers and unread flags.
///
/// Conversations are keyed by [`ConvoKey`], a tagged union over the four
/// conversation kinds. `last_read` only moves forward on merge.
use serde::{Deserialize, Serialize};

use crate::config::base::{ConfigBase, ConfigDocument, Result};
use crate::config::community;
use crate::crdt::{crdt_fields, Lww, LwwMap, MaxRegister};
use crate::ids::{AccountID, IdError};
use crate::namespace::Namespace;

// ---------------------------------------------------------------------------
// Keys and public views
// ---------------------------------------------------------------------------

/// Stable identity of a conversation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConvoKey {
    OneToOne(AccountID),
    /// Community room; both parts are stored lowercased.
    Community { base_url: String, room: String },
    Group(AccountID),
    LegacyGroup(AccountID),
}

impl ConvoKey {
    /// Community key with the URL and room normalized.
    pub fn community(base_url: &str, room: &str) -> Self {
        ConvoKey::Community {
            base_url: community::normalize_base_url(base_url),
            room: community::normalize_room(room),
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            ConvoKey::OneToOne(id) | ConvoKey::LegacyGroup(id) if id.is_group() => {
                Err(IdError::UnknownPrefix(id.prefix()).into())
            }
            ConvoKey::Group(id) if !id.is_group() => {
                Err(IdError::UnknownPrefix(id.prefix()).into())
            }
            _ => Ok(()),
        }
    }
}

/// One conversation's volatile state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conversation {
    OneToOne {
        account_id: AccountID,
        last_read: i64,
        unread: bool,
    },
    Community {
        base_url: String,
        room: String,
        pubkey: [u8; 32],
        last_read: i64,
        unread: bool,
    },
    Group {
        group_id: AccountID,
        last_read: i64,
        unread: bool,
    },
    LegacyGroup {
        group_id: AccountID,
        last_read: i64,
        unread: bool,
    },
}

impl Conversation {
    fn from_entry(key: &ConvoKey, entry: &ConvoEntry) -> Self {
        let last_read = entry.last_read.get();
        let unread = *entry.unread.get();
        match key {
            ConvoKey::OneToOne(id) => Conversation::OneToOne {
                account_id: *id,
                last_read,
                unread,
            },
            ConvoKey::Community { base_url, room } => Conversation::Community {
                base_url: base_url.clone(),
                room: room.clone(),
                pubkey: *entry.pubkey.get(),
                last_read,
                unread,
            },
            ConvoKey::Group(id) => Conversation::Group {
                group_id: *id,
                last_read,
                unread,
            },
            ConvoKey::LegacyGroup(id) => Conversation::LegacyGroup {
                group_id: *id,
                last_read,
                unread,
            },
        }
    }

    pub fn key(&self) -> ConvoKey {
        match self {
            Conversation::OneToOne { account_id, .. } => ConvoKey::OneToOne(*account_id),
            Conversation::Community { base_url, room, .. } => ConvoKey::community(base_url, room),
            Conversation::Group { group_id, .. } => ConvoKey::Group(*group_id),
            Conversation::LegacyGroup { group_id, .. } => ConvoKey::LegacyGroup(*group_id),
        }
    }

    /// Unix milliseconds of the newest read message.
    pub fn last_read(&self) -> i64 {
        match self {
            Conversation::OneToOne { last_read, .. }
            | Conversation::Community { last_read, .. }
            | Conversation::Group { last_read, .. }
            | Conversation::LegacyGroup { last_read, .. } => *last_read,
        }
    }

    /// Manually marked unread.
    pub fn unread(&self) -> bool {
        match self {
            Conversation::OneToOne { unread, .. }
            | Conversation::Community { unread, .. }
            | Conversation::Group { unread, .. }
            | Conversation::LegacyGroup { unread, .. } => *unread,
        }
    }

    /// Full `{base_url}/{room}?public_key=...` URL for community conversations.
    pub fn community_url(&self) -> Option<String> {
        match self {
            Conversation::Community {
                base_url,
                room,
                pubkey,
                ..
            } => Some(community::full_url(base_url, room, pubkey)),
            _ => None,
        }
    }

    /// Move the read marker forward; older timestamps are ignored.
    pub fn mark_read(&mut self, timestamp_ms: i64) {
        match self {
            Conversation::OneToOne { last_read, .. }
            | Conversation::Community { last_read, .. }
            | Conversation::Group { last_read, .. }
            | Conversation::LegacyGroup { last_read, .. } => {
                *last_read = (*last_read).max(timestamp_ms)
            }
        }
    }

    pub fn set_unread(&mut self, value: bool) {
        match self {
            Conversation::OneToOne { unread, .. }
            | Conversation::Community { unread, .. }
            | Conversation::Group { unread, .. }
            | Conversation::LegacyGroup { unread, .. } => *unread = value,
        }
    }

    fn blank(key: &ConvoKey) -> Self {
        Conversation::from_entry(key, &ConvoEntry::default())
    }
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ConvoEntry {
    last_read: MaxRegister<i64>,
    unread: Lww<bool>,
    pubkey: Lww<[u8; 32]>,
}

crdt_fields!(ConvoEntry {
    last_read,
    unread,
    pubkey,
});

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ConvoInfoVolatileDoc {
    convos: LwwMap<ConvoKey, ConvoEntry>,
}

crdt_fields!(ConvoInfoVolatileDoc { convos });

impl ConfigDocument for ConvoInfoVolatileDoc {
    const NAMESPACE: Namespace = Namespace::ConvoInfoVolatile;

    fn prune_tombstones(&mut self, now_ms: i64, retention_ms: i64) -> usize {
        self.convos.prune_tombstones(now_ms, retention_ms)
    }
}

pub type ConvoInfoVolatile = ConfigBase<ConvoInfoVolatileDoc>;

impl ConvoInfoVolatile {
    pub fn new(secret_key: &[u8], dump: Option<&[u8]>) -> Result<Self> {
        Self::with_user_key(secret_key, dump)
    }

    // -----------------------------------------------------------------------
    // Generic access
    // -----------------------------------------------------------------------

    pub fn get(&self, key: &ConvoKey) -> Option<Conversation> {
        self.document()
            .convos
            .get(key)
            .map(|e| Conversation::from_entry(key, e))
    }

    /// Stored conversation or a blank one; nothing is stored until `set`.
    pub fn get_or_construct(&self, key: &ConvoKey) -> Conversation {
        self.get(key).unwrap_or_else(|| Conversation::blank(key))
    }

    pub fn set(&mut self, convo: &Conversation) -> Result<()> {
        let key = convo.key();
        key.validate()?;
        self.edit(|doc, w| {
            let created = w.stamp();
            let (entry, _) = doc.convos.upsert(key, created);
            entry.last_read.raise(convo.last_read());
            entry.unread.set(convo.unread(), w.stamp());
            if let Conversation::Community { pubkey, .. } = convo {
                entry.pubkey.set(*pubkey, w.stamp());
            }
        });
        Ok(())
    }

    /// Remove a conversation. Its `last_read` marker is kept: re-adding the
    /// conversation resumes from the old marker rather than from zero.
    pub fn erase(&mut self, key: &ConvoKey) -> bool {
        self.edit(|doc, w| {
            let tombstone = w.tombstone();
            doc.convos.remove(key, tombstone)
        })
    }

    /// Erase every conversation matching `predicate`; returns how many.
    pub fn erase_all(&mut self, predicate: impl Fn(&Conversation) -> bool) -> usize {
        let doomed: Vec<ConvoKey> = self
            .all()
            .into_iter()
            .filter(|c| predicate(c))
            .map(|c| c.key())
            .collect();
        if doomed.is_empty() {
            return 0;
        }
        self.edit(|doc, w| {
            let tombstone = w.tombstone();
            doomed
                .iter()
                .filter(|k| doc.convos.remove(k, tombstone))
                .count()
        })
    }

    /// All conversations in key order: one-to-one, communities, groups,
    /// legacy groups.
    pub fn all(&self) -> Vec<Conversation> {
        self.document()
            .convos
            .iter()
            .map(|(k, e)| Conversation::from_entry(k, e))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.document().convos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.document().convos.is_empty()
    }

    fn count_where(&self, f: impl Fn(&ConvoKey) -> bool) -> usize {
        self.document().convos.keys().filter(|&k| f(k)).count()
    }

    pub fn len_one_to_one(&self) -> usize {
        self.count_where(|k| matches!(k, ConvoKey::OneToOne(_)))
    }

    pub fn len_communities(&self) -> usize {
        self.count_where(|k| matches!(k, ConvoKey::Community { .. }))
    }

    pub fn len_groups(&self) -> usize {
        self.count_where(|k| matches!(k, ConvoKey::Group(_)))
    }

    pub fn len_legacy_groups(&self) -> usize {
        self.count_where(|k| matches!(k, ConvoKey::LegacyGroup(_)))
    }

    // -----------------------------------------------------------------------
    // Per-kind helpers
    // -----------------------------------------------------------------------

    pub fn get_one_to_one(&self, account_id: &AccountID) -> Option<Conversation> {
        self.get(&ConvoKey::OneToOne(*account_id))
    }

    pub fn get_or_construct_one_to_one(&self, account_id: &AccountID) -> Conversation {
        self.get_or_construct(&ConvoKey::OneToOne(*account_id))
    }

    pub fn erase_one_to_one(&mut self, account_id: &AccountID) -> bool {
        self.erase(&ConvoKey::OneToOne(*account_id))
    }

    pub fn get_community(&self, base_url: &str, room: &str) -> Option<Conversation> {
        self.get(&ConvoKey::community(base_url, room))
    }

    /// Existing community conversation, or a blank one carrying `pubkey`.
    pub fn get_or_construct_community(
        &self,
        base_url: &str,
        room: &str,
        pubkey: [u8; 32],
    ) -> Conversation {
        let key = ConvoKey::community(base_url, room);
        let mut convo = self.get_or_construct(&key);
        if let Conversation::Community { pubkey: pk, .. } = &mut convo {
            *pk = pubkey;
        }
        convo
    }

    pub fn erase_community(&mut self, base_url: &str, room: &str) -> bool {
        self.erase(&ConvoKey::community(base_url, room))
    }

    pub fn get_group(&self, group_id: &AccountID) -> Option<Conversation> {
        self.get(&ConvoKey::Group(*group_id))
    }

    pub fn get_or_construct_group(&self, group_id: &AccountID) -> Conversation {
        self.get_or_construct(&ConvoKey::Group(*group_id))
    }

    pub fn erase_group(&mut self, group_id: &AccountID) -> bool {
        self.erase(&ConvoKey::Group(*group_id))
    }

    pub fn get_legacy_group(&self, group_id: &AccountID) -> Option<Conversation> {
        self.get(&ConvoKey::LegacyGroup(*group_id))
    }

    pub fn get_or_construct_legacy_group(&self, group_id: &AccountID) -> Conversation {
        self.get_or_construct(&ConvoKey::LegacyGroup(*group_id))
    }

    pub fn erase_legacy_group(&mut self, group_id: &AccountID) -> bool {
        self.erase(&ConvoKey::LegacyGroup(*group_id))
    }
}
