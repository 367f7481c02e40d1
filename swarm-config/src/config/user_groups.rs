/// Groups the account belongs to: communities, legacy groups and closed
/// groups (the ones managed by [`GroupInfo`](crate::config::GroupInfo),
/// [`GroupMembers`](crate::config::GroupMembers) and [`Keys`](crate::keys::Keys)).
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::base::{ConfigBase, ConfigDocument, ConfigError, Result};
use crate::config::community;
use crate::config::{check_name, non_empty, PRIORITY_VISIBLE};
use crate::crdt::{crdt_fields, Flag, Lww, LwwMap};
use crate::crypto::signing;
use crate::ids::{AccountID, IdError};
use crate::limits::now_ms;
use crate::namespace::Namespace;

// ---------------------------------------------------------------------------
// Public views
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommunityInfo {
    /// Lowercased server URL without a trailing slash.
    pub base_url: String,
    /// Lowercased room token.
    pub room: String,
    pub pubkey: [u8; 32],
    pub priority: i64,
}

impl CommunityInfo {
    /// Visible community from a `{base_url}/{room}?public_key=...` URL.
    pub fn from_full_url(url: &str) -> Result<Self> {
        let (base_url, room, pubkey) = community::parse_full_url(url)?;
        Ok(CommunityInfo {
            base_url,
            room,
            pubkey,
            priority: PRIORITY_VISIBLE,
        })
    }

    pub fn full_url(&self) -> String {
        community::full_url(&self.base_url, &self.room, &self.pubkey)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyGroupInfo {
    pub group_id: AccountID,
    pub name: Option<String>,
    /// Member id to admin flag.
    pub members: BTreeMap<AccountID, bool>,
    pub enc_pubkey: Vec<u8>,
    pub enc_seckey: Vec<u8>,
    pub priority: i64,
    /// Disappearing-message timer in seconds, 0 when off.
    pub disappearing_timer: i64,
    /// Unix seconds.
    pub joined_at: i64,
}

impl LegacyGroupInfo {
    pub fn new(group_id: AccountID) -> Self {
        LegacyGroupInfo {
            group_id,
            name: None,
            members: BTreeMap::new(),
            enc_pubkey: Vec::new(),
            enc_seckey: Vec::new(),
            priority: PRIORITY_VISIBLE,
            disappearing_timer: 0,
            joined_at: 0,
        }
    }

    /// Add or update a member. Returns true if anything changed.
    pub fn insert(&mut self, member: AccountID, admin: bool) -> bool {
        self.members.insert(member, admin) != Some(admin)
    }

    pub fn erase(&mut self, member: &AccountID) -> bool {
        self.members.remove(member).is_some()
    }

    /// (admins, non-admins)
    pub fn counts(&self) -> (usize, usize) {
        let admins = self.members.values().filter(|a| **a).count();
        (admins, self.members.len() - admins)
    }
}

/// A closed group this account is in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosedGroupInfo {
    pub group_id: AccountID,
    /// Group Ed25519 secret (seed || pubkey); empty unless we are an admin.
    pub secret_key: Vec<u8>,
    /// Sub-account credential issued by an admin; used by non-admins.
    pub auth_data: Vec<u8>,
    pub name: Option<String>,
    pub priority: i64,
    /// Invited but not yet accepted.
    pub invited: bool,
    /// Unix seconds.
    pub joined_at: i64,
    /// The group was destroyed by an admin; sticky.
    pub destroyed: bool,
}

impl ClosedGroupInfo {
    pub fn new(group_id: AccountID) -> Self {
        ClosedGroupInfo {
            group_id,
            secret_key: Vec::new(),
            auth_data: Vec::new(),
            name: None,
            priority: PRIORITY_VISIBLE,
            invited: false,
            joined_at: 0,
            destroyed: false,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.secret_key.len() == 64
    }
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct CommunityEntry {
    pubkey: Lww<[u8; 32]>,
    priority: Lww<i64>,
}

crdt_fields!(CommunityEntry { pubkey, priority });

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct LegacyGroupEntry {
    name: Lww<Option<String>>,
    members: LwwMap<AccountID, Lww<bool>>,
    enc_pubkey: Lww<Vec<u8>>,
    enc_seckey: Lww<Vec<u8>>,
    priority: Lww<i64>,
    disappearing_timer: Lww<i64>,
    joined_at: Lww<i64>,
}

crdt_fields!(LegacyGroupEntry {
    name,
    members,
    enc_pubkey,
    enc_seckey,
    priority,
    disappearing_timer,
    joined_at,
});

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct GroupEntry {
    secret_key: Lww<Vec<u8>>,
    auth_data: Lww<Vec<u8>>,
    name: Lww<Option<String>>,
    priority: Lww<i64>,
    invited: Lww<bool>,
    joined_at: Lww<i64>,
    destroyed: Flag,
}

crdt_fields!(GroupEntry {
    secret_key,
    auth_data,
    name,
    priority,
    invited,
    joined_at,
    destroyed,
});

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct UserGroupsDoc {
    communities: LwwMap<(String, String), CommunityEntry>,
    legacy_groups: LwwMap<AccountID, LegacyGroupEntry>,
    groups: LwwMap<AccountID, GroupEntry>,
}

crdt_fields!(UserGroupsDoc {
    communities,
    legacy_groups,
    groups,
});

impl ConfigDocument for UserGroupsDoc {
    const NAMESPACE: Namespace = Namespace::UserGroups;

    fn prune_tombstones(&mut self, now_ms: i64, retention_ms: i64) -> usize {
        let mut pruned = self.communities.prune_tombstones(now_ms, retention_ms)
            + self.legacy_groups.prune_tombstones(now_ms, retention_ms)
            + self.groups.prune_tombstones(now_ms, retention_ms);
        for entry in self.legacy_groups.values_mut() {
            pruned += entry.members.prune_tombstones(now_ms, retention_ms);
        }
        pruned
    }
}

fn community_key(base_url: &str, room: &str) -> (String, String) {
    (community::normalize_base_url(base_url), community::normalize_room(room))
}

fn expect_user_id(id: &AccountID) -> Result<()> {
    if id.is_group() {
        return Err(IdError::UnknownPrefix(id.prefix()).into());
    }
    Ok(())
}

fn expect_group_id(id: &AccountID) -> Result<()> {
    if !id.is_group() {
        return Err(IdError::UnknownPrefix(id.prefix()).into());
    }
    Ok(())
}

pub type UserGroups = ConfigBase<UserGroupsDoc>;

impl UserGroups {
    pub fn new(secret_key: &[u8], dump: Option<&[u8]>) -> Result<Self> {
        Self::with_user_key(secret_key, dump)
    }

    pub fn len(&self) -> usize {
        self.len_communities() + self.len_legacy_groups() + self.len_groups()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // -----------------------------------------------------------------------
    // Communities
    // -----------------------------------------------------------------------

    pub fn get_community(&self, base_url: &str, room: &str) -> Option<CommunityInfo> {
        let key = community_key(base_url, room);
        self.document()
            .communities
            .get(&key)
            .map(|e| community_info(&key, e))
    }

    pub fn get_or_construct_community(
        &self,
        base_url: &str,
        room: &str,
        pubkey: [u8; 32],
    ) -> CommunityInfo {
        let mut info = self.get_community(base_url, room).unwrap_or_else(|| {
            let (base_url, room) = community_key(base_url, room);
            CommunityInfo {
                base_url,
                room,
                pubkey,
                priority: PRIORITY_VISIBLE,
            }
        });
        info.pubkey = pubkey;
        info
    }

    pub fn set_community(&mut self, info: &CommunityInfo) {
        let key = community_key(&info.base_url, &info.room);
        self.edit(|doc, w| {
            let created = w.stamp();
            let (entry, _) = doc.communities.upsert(key, created);
            entry.pubkey.set(info.pubkey, w.stamp());
            entry.priority.set(info.priority, w.stamp());
        });
    }

    pub fn erase_community(&mut self, base_url: &str, room: &str) -> bool {
        let key = community_key(base_url, room);
        self.edit(|doc, w| {
            let tombstone = w.tombstone();
            doc.communities.remove(&key, tombstone)
        })
    }

    pub fn all_communities(&self) -> Vec<CommunityInfo> {
        self.document()
            .communities
            .iter()
            .map(|(k, e)| community_info(k, e))
            .collect()
    }

    pub fn len_communities(&self) -> usize {
        self.document().communities.len()
    }

    // -----------------------------------------------------------------------
    // Legacy groups
    // -----------------------------------------------------------------------

    pub fn get_legacy_group(&self, group_id: &AccountID) -> Option<LegacyGroupInfo> {
        self.document()
            .legacy_groups
            .get(group_id)
            .map(|e| legacy_group_info(group_id, e))
    }

    pub fn get_or_construct_legacy_group(&self, group_id: &AccountID) -> LegacyGroupInfo {
        self.get_legacy_group(group_id)
            .unwrap_or_else(|| LegacyGroupInfo::new(*group_id))
    }

    /// Store `info`. Members missing from `info.members` are removed.
    pub fn set_legacy_group(&mut self, info: &LegacyGroupInfo) -> Result<()> {
        expect_user_id(&info.group_id)?;
        let name = info.name.as_deref().and_then(non_empty);
        check_name(name.as_deref().unwrap_or_default())?;

        self.edit(|doc, w| {
            let created = w.stamp();
            let (entry, _) = doc.legacy_groups.upsert(info.group_id, created);
            entry.name.set(name, w.stamp());
            entry.enc_pubkey.set(info.enc_pubkey.clone(), w.stamp());
            entry.enc_seckey.set(info.enc_seckey.clone(), w.stamp());
            entry.priority.set(info.priority, w.stamp());
            entry.disappearing_timer.set(info.disappearing_timer, w.stamp());
            entry.joined_at.set(info.joined_at, w.stamp());

            let departed: Vec<AccountID> = entry
                .members
                .keys()
                .filter(|id| !info.members.contains_key(id))
                .copied()
                .collect();
            for id in &departed {
                let tombstone = w.tombstone();
                entry.members.remove(id, tombstone);
            }
            for (id, admin) in &info.members {
                let joined = w.stamp();
                let (flag, _) = entry.members.upsert(*id, joined);
                flag.set(*admin, w.stamp());
            }
        });
        Ok(())
    }

    pub fn erase_legacy_group(&mut self, group_id: &AccountID) -> bool {
        self.edit(|doc, w| {
            let tombstone = w.tombstone();
            doc.legacy_groups.remove(group_id, tombstone)
        })
    }

    pub fn all_legacy_groups(&self) -> Vec<LegacyGroupInfo> {
        self.document()
            .legacy_groups
            .iter()
            .map(|(id, e)| legacy_group_info(id, e))
            .collect()
    }

    pub fn len_legacy_groups(&self) -> usize {
        self.document().legacy_groups.len()
    }

    // -----------------------------------------------------------------------
    // Closed groups
    // -----------------------------------------------------------------------

    /// Generate a fresh group identity with us as admin. The result is not
    /// stored until passed to [`set_group`](Self::set_group).
    pub fn create_group(&self) -> ClosedGroupInfo {
        let (public, seed) = signing::generate_keypair();
        let mut info = ClosedGroupInfo::new(AccountID::group(&public));
        info.secret_key = [seed, public].concat();
        info.joined_at = now_ms() / 1000;
        info
    }

    pub fn get_group(&self, group_id: &AccountID) -> Option<ClosedGroupInfo> {
        self.document()
            .groups
            .get(group_id)
            .map(|e| group_info(group_id, e))
    }

    pub fn get_or_construct_group(&self, group_id: &AccountID) -> ClosedGroupInfo {
        self.get_group(group_id)
            .unwrap_or_else(|| ClosedGroupInfo::new(*group_id))
    }

    /// Store `info`. A non-empty secret key must be the 64-byte group key
    /// matching the group id.
    pub fn set_group(&mut self, info: &ClosedGroupInfo) -> Result<()> {
        expect_group_id(&info.group_id)?;
        if !info.secret_key.is_empty() {
            let key = signing::signing_key_from_secret(&info.secret_key)
                .map_err(|e| ConfigError::InvalidSecretKey(e.to_string()))?;
            if info.secret_key.len() != 64 || key.verifying_key().to_bytes() != info.group_id.pubkey() {
                return Err(ConfigError::InvalidSecretKey(
                    "group secret key does not match group id".into(),
                ));
            }
        }
        let name = info.name.as_deref().and_then(non_empty);
        check_name(name.as_deref().unwrap_or_default())?;

        self.edit(|doc, w| {
            let created = w.stamp();
            let (entry, _) = doc.groups.upsert(info.group_id, created);
            entry.secret_key.set(info.secret_key.clone(), w.stamp());
            entry.auth_data.set(info.auth_data.clone(), w.stamp());
            entry.name.set(name, w.stamp());
            entry.priority.set(info.priority, w.stamp());
            entry.invited.set(info.invited, w.stamp());
            entry.joined_at.set(info.joined_at, w.stamp());
            if info.destroyed {
                entry.destroyed.set();
            }
        });
        Ok(())
    }

    pub fn erase_group(&mut self, group_id: &AccountID) -> bool {
        self.edit(|doc, w| {
            let tombstone = w.tombstone();
            doc.groups.remove(group_id, tombstone)
        })
    }

    pub fn all_groups(&self) -> Vec<ClosedGroupInfo> {
        self.document()
            .groups
            .iter()
            .map(|(id, e)| group_info(id, e))
            .collect()
    }

    pub fn len_groups(&self) -> usize {
        self.document().groups.len()
    }
}

fn community_info(key: &(String, String), entry: &CommunityEntry) -> CommunityInfo {
    CommunityInfo {
        base_url: key.0.clone(),
        room: key.1.clone(),
        pubkey: *entry.pubkey.get(),
        priority: *entry.priority.get(),
    }
}

fn legacy_group_info(id: &AccountID, entry: &LegacyGroupEntry) -> LegacyGroupInfo {
    LegacyGroupInfo {
        group_id: *id,
        name: entry.name.get().clone(),
        members: entry
            .members
            .iter()
            .map(|(member, admin)| (*member, *admin.get()))
            .collect(),
        enc_pubkey: entry.enc_pubkey.get().clone(),
        enc_seckey: entry.enc_seckey.get().clone(),
        priority: *entry.priority.get(),
        disappearing_timer: *entry.disappearing_timer.get(),
        joined_at: *entry.joined_at.get(),
    }
}

fn group_info(id: &AccountID, entry: &GroupEntry) -> ClosedGroupInfo {
    ClosedGroupInfo {
        group_id: *id,
        secret_key: entry.secret_key.get().clone(),
        auth_data: entry.auth_data.get().clone(),
        name: entry.name.get().clone(),
        priority: *entry.priority.get(),
        invited: *entry.invited.get(),
        joined_at: *entry.joined_at.get(),
        destroyed: entry.destroyed.get(),
    }
}
