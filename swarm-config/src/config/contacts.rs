/// Contact list: per-account names, nicknames, approval and block state.
///
/// Entries are keyed by the contact's account id and merge field by field,
/// so a name set on one device and a nickname set on another both survive.
use serde::{Deserialize, Serialize};

use crate::config::base::{ConfigBase, ConfigDocument, Result};
use crate::config::{check_name, non_empty, ExpiryMode, ProfilePic, PRIORITY_VISIBLE};
use crate::crdt::{crdt_fields, Lww, LwwMap};
use crate::ids::{AccountID, IdError};
use crate::namespace::Namespace;

/// Public view of one contact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub account_id: AccountID,
    pub name: Option<String>,
    pub nickname: Option<String>,
    pub profile_pic: ProfilePic,
    /// We accepted their message request.
    pub approved: bool,
    /// They accepted ours.
    pub approved_me: bool,
    pub blocked: bool,
    pub priority: i64,
    pub expiry: ExpiryMode,
    /// Unix seconds when the contact was added.
    pub created: i64,
}

impl Contact {
    pub fn new(account_id: AccountID) -> Self {
        Contact {
            account_id,
            name: None,
            nickname: None,
            profile_pic: ProfilePic::default(),
            approved: false,
            approved_me: false,
            blocked: false,
            priority: PRIORITY_VISIBLE,
            expiry: ExpiryMode::None,
            created: 0,
        }
    }

    /// Nickname if set, else the contact's own name.
    pub fn display_name(&self) -> Option<&str> {
        self.nickname.as_deref().or(self.name.as_deref())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ContactEntry {
    name: Lww<Option<String>>,
    nickname: Lww<Option<String>>,
    profile_pic: Lww<ProfilePic>,
    approved: Lww<bool>,
    approved_me: Lww<bool>,
    blocked: Lww<bool>,
    priority: Lww<i64>,
    expiry: Lww<ExpiryMode>,
    created: Lww<i64>,
}

crdt_fields!(ContactEntry {
    name,
    nickname,
    profile_pic,
    approved,
    approved_me,
    blocked,
    priority,
    expiry,
    created,
});

impl ContactEntry {
    fn to_contact(&self, account_id: AccountID) -> Contact {
        Contact {
            account_id,
            name: self.name.get().clone(),
            nickname: self.nickname.get().clone(),
            profile_pic: self.profile_pic.get().clone(),
            approved: *self.approved.get(),
            approved_me: *self.approved_me.get(),
            blocked: *self.blocked.get(),
            priority: *self.priority.get(),
            expiry: *self.expiry.get(),
            created: *self.created.get(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ContactsDoc {
    contacts: LwwMap<AccountID, ContactEntry>,
}

crdt_fields!(ContactsDoc { contacts });

impl ConfigDocument for ContactsDoc {
    const NAMESPACE: Namespace = Namespace::Contacts;

    fn prune_tombstones(&mut self, now_ms: i64, retention_ms: i64) -> usize {
        self.contacts.prune_tombstones(now_ms, retention_ms)
    }
}

pub type Contacts = ConfigBase<ContactsDoc>;

impl Contacts {
    pub fn new(secret_key: &[u8], dump: Option<&[u8]>) -> Result<Self> {
        Self::with_user_key(secret_key, dump)
    }

    pub fn get(&self, account_id: &AccountID) -> Option<Contact> {
        self.document()
            .contacts
            .get(account_id)
            .map(|e| e.to_contact(*account_id))
    }

    /// Stored contact, or a blank one for `account_id`. Nothing is stored
    /// until the result is passed to [`set`](Self::set).
    pub fn get_or_construct(&self, account_id: &AccountID) -> Contact {
        self.get(account_id)
            .unwrap_or_else(|| Contact::new(*account_id))
    }

    /// Store every field of `contact`. Unchanged fields keep their stamps.
    pub fn set(&mut self, contact: &Contact) -> Result<()> {
        if contact.account_id.is_group() {
            return Err(IdError::UnknownPrefix(contact.account_id.prefix()).into());
        }
        let name = contact.name.as_deref().and_then(non_empty);
        let nickname = contact.nickname.as_deref().and_then(non_empty);
        check_name(name.as_deref().unwrap_or_default())?;
        check_name(nickname.as_deref().unwrap_or_default())?;

        self.edit(|doc, w| {
            let created = w.stamp();
            let (entry, _) = doc.contacts.upsert(contact.account_id, created);
            entry.name.set(name, w.stamp());
            entry.nickname.set(nickname, w.stamp());
            entry.profile_pic.set(contact.profile_pic.clone(), w.stamp());
            entry.approved.set(contact.approved, w.stamp());
            entry.approved_me.set(contact.approved_me, w.stamp());
            entry.blocked.set(contact.blocked, w.stamp());
            entry.priority.set(contact.priority, w.stamp());
            entry.expiry.set(contact.expiry, w.stamp());
            entry.created.set(contact.created, w.stamp());
        });
        Ok(())
    }

    /// Set only the name, creating the contact if needed.
    pub fn set_name(&mut self, account_id: &AccountID, name: &str) -> Result<()> {
        let mut contact = self.get_or_construct(account_id);
        contact.name = non_empty(name);
        self.set(&contact)
    }

    /// Set only the nickname, creating the contact if needed.
    pub fn set_nickname(&mut self, account_id: &AccountID, nickname: &str) -> Result<()> {
        let mut contact = self.get_or_construct(account_id);
        contact.nickname = non_empty(nickname);
        self.set(&contact)
    }

    /// Remove a contact. Returns false if it was not present.
    pub fn erase(&mut self, account_id: &AccountID) -> bool {
        self.edit(|doc, w| {
            let tombstone = w.tombstone();
            doc.contacts.remove(account_id, tombstone)
        })
    }

    /// All contacts in account id order.
    pub fn all(&self) -> Vec<Contact> {
        self.document()
            .contacts
            .iter()
            .map(|(id, e)| e.to_contact(*id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.document().contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.document().contacts.is_empty()
    }
}
