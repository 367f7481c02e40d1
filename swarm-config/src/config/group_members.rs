/// Group membership list with invite, promotion and removal status.
///
/// Only admins can write. [`GroupMembers::key_recipients`] is the set the
/// key engine encrypts new generations for.
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::config::base::{ConfigBase, ConfigDocument, Result};
use crate::config::{check_name, non_empty, ProfilePic};
use crate::crdt::{crdt_fields, Lww, LwwMap};
use crate::ids::{AccountID, IdError};
use crate::namespace::Namespace;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InviteStatus {
    #[default]
    NotSent,
    Sent,
    Failed,
    Accepted,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PromotionStatus {
    #[default]
    NotPromoted,
    Pending,
    Sent,
    Failed,
    Accepted,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RemovedStatus {
    #[default]
    NotRemoved,
    Removed,
    /// Removed, and their messages should be deleted too.
    RemovedWithMessages,
}

/// Public view of one member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMember {
    pub account_id: AccountID,
    pub name: Option<String>,
    pub profile_pic: ProfilePic,
    pub admin: bool,
    pub invite: InviteStatus,
    pub promotion: PromotionStatus,
    pub removed: RemovedStatus,
    /// Joined via a key supplement rather than a full rekey.
    pub supplement: bool,
}

impl GroupMember {
    pub fn new(account_id: AccountID) -> Self {
        GroupMember {
            account_id,
            name: None,
            profile_pic: ProfilePic::default(),
            admin: false,
            invite: InviteStatus::NotSent,
            promotion: PromotionStatus::NotPromoted,
            removed: RemovedStatus::NotRemoved,
            supplement: false,
        }
    }

    pub fn is_removed(&self) -> bool {
        self.removed != RemovedStatus::NotRemoved
    }

    /// Admin, or has accepted a promotion.
    pub fn is_promoted(&self) -> bool {
        self.admin || self.promotion == PromotionStatus::Accepted
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct MemberEntry {
    name: Lww<Option<String>>,
    profile_pic: Lww<ProfilePic>,
    admin: Lww<bool>,
    invite: Lww<InviteStatus>,
    promotion: Lww<PromotionStatus>,
    removed: Lww<RemovedStatus>,
    supplement: Lww<bool>,
}

crdt_fields!(MemberEntry {
    name,
    profile_pic,
    admin,
    invite,
    promotion,
    removed,
    supplement,
});

impl MemberEntry {
    fn to_member(&self, account_id: AccountID) -> GroupMember {
        GroupMember {
            account_id,
            name: self.name.get().clone(),
            profile_pic: self.profile_pic.get().clone(),
            admin: *self.admin.get(),
            invite: *self.invite.get(),
            promotion: *self.promotion.get(),
            removed: *self.removed.get(),
            supplement: *self.supplement.get(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct GroupMembersDoc {
    members: LwwMap<AccountID, MemberEntry>,
}

crdt_fields!(GroupMembersDoc { members });

impl ConfigDocument for GroupMembersDoc {
    const NAMESPACE: Namespace = Namespace::GroupMembers;

    fn prune_tombstones(&mut self, now_ms: i64, retention_ms: i64) -> usize {
        self.members.prune_tombstones(now_ms, retention_ms)
    }
}

pub type GroupMembers = ConfigBase<GroupMembersDoc>;

impl GroupMembers {
    pub fn new(group_pubkey: &[u8], group_secret: Option<&[u8]>, dump: Option<&[u8]>) -> Result<Self> {
        Self::with_group_key(group_pubkey, group_secret, dump)
    }

    pub fn get(&self, account_id: &AccountID) -> Option<GroupMember> {
        self.document()
            .members
            .get(account_id)
            .map(|e| e.to_member(*account_id))
    }

    /// Stored member or a blank one; nothing is stored until `set`.
    pub fn get_or_construct(&self, account_id: &AccountID) -> GroupMember {
        self.get(account_id)
            .unwrap_or_else(|| GroupMember::new(*account_id))
    }

    pub fn set(&mut self, member: &GroupMember) -> Result<()> {
        if member.account_id.is_group() {
            return Err(IdError::UnknownPrefix(member.account_id.prefix()).into());
        }
        let name = member.name.as_deref().and_then(non_empty);
        check_name(name.as_deref().unwrap_or_default())?;

        self.admin_edit(|doc, w| {
            let created = w.stamp();
            let (entry, _) = doc.members.upsert(member.account_id, created);
            entry.name.set(name, w.stamp());
            entry.profile_pic.set(member.profile_pic.clone(), w.stamp());
            entry.admin.set(member.admin, w.stamp());
            entry.invite.set(member.invite, w.stamp());
            entry.promotion.set(member.promotion, w.stamp());
            entry.removed.set(member.removed, w.stamp());
            entry.supplement.set(member.supplement, w.stamp());
        })
    }

    /// Drop a member entirely. Returns false if absent.
    pub fn erase(&mut self, account_id: &AccountID) -> Result<bool> {
        self.admin_edit(|doc, w| {
            let tombstone = w.tombstone();
            doc.members.remove(account_id, tombstone)
        })
    }

    pub fn all(&self) -> Vec<GroupMember> {
        self.document()
            .members
            .iter()
            .map(|(id, e)| e.to_member(*id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.document().members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.document().members.is_empty()
    }

    /// Members that should receive the group key: everyone not removed.
    pub fn key_recipients(&self) -> BTreeSet<AccountID> {
        self.document()
            .members
            .iter()
            .filter(|(_, e)| *e.removed.get() == RemovedStatus::NotRemoved)
            .map(|(id, _)| *id)
            .collect()
    }
}
