/// Per-namespace config objects.
///
/// Each object is a [`ConfigBase`] around a namespace-specific document:
///
/// | Object | Namespace |
/// |--------|-----------|
/// | [`UserProfile`] | `UserProfile` |
/// | [`Contacts`] | `Contacts` |
/// | [`ConvoInfoVolatile`] | `ConvoInfoVolatile` |
/// | [`UserGroups`] | `UserGroups` |
/// | [`GroupInfo`] | `GroupInfo` |
/// | [`GroupMembers`] | `GroupMembers` |
use serde::{Deserialize, Serialize};

use crate::limits::{MAX_DESCRIPTION_LENGTH, MAX_NAME_LENGTH};
use crate::namespace::Namespace;

pub mod base;
pub mod community;
pub mod contacts;
pub mod convo_info_volatile;
pub mod group_info;
pub mod group_members;
pub mod user_groups;
pub mod user_profile;

pub use base::{ConfigBase, ConfigDocument, ConfigError, PushResult, Result, SyncState};
pub use contacts::{Contact, Contacts};
pub use convo_info_volatile::{ConvoInfoVolatile, ConvoKey, Conversation};
pub use group_info::GroupInfo;
pub use group_members::{GroupMember, GroupMembers, InviteStatus, PromotionStatus, RemovedStatus};
pub use user_groups::{ClosedGroupInfo, CommunityInfo, LegacyGroupInfo, UserGroups};
pub use user_profile::UserProfile;

// ---------------------------------------------------------------------------
// Shared field types
// ---------------------------------------------------------------------------

/// Conversation hidden from the list.
pub const PRIORITY_HIDDEN: i64 = -1;
/// Default priority.
pub const PRIORITY_VISIBLE: i64 = 0;
/// Pinned; larger values pin higher.
pub const PRIORITY_PINNED: i64 = 1;

/// Profile picture: download URL plus its 32-byte decryption key.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ProfilePic {
    pub url: String,
    pub key: Vec<u8>,
}

impl ProfilePic {
    pub fn new(url: impl Into<String>, key: impl Into<Vec<u8>>) -> Self {
        ProfilePic {
            url: url.into(),
            key: key.into(),
        }
    }

    /// A picture is only usable with both a URL and a 32-byte key.
    pub fn is_set(&self) -> bool {
        !self.url.is_empty() && self.key.len() == 32
    }
}

/// Disappearing-message setting.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExpiryMode {
    #[default]
    None,
    /// Expire this many seconds after sending.
    AfterSend(i64),
    /// Expire this many seconds after being read.
    AfterRead(i64),
}

pub(crate) fn check_len(field: &'static str, value: &str, max: usize) -> Result<()> {
    if value.len() > max {
        return Err(ConfigError::ValueTooLong { field, max });
    }
    Ok(())
}

pub(crate) fn check_name(value: &str) -> Result<()> {
    check_len("name", value, MAX_NAME_LENGTH)
}

pub(crate) fn check_description(value: &str) -> Result<()> {
    check_len("description", value, MAX_DESCRIPTION_LENGTH)
}

/// Empty strings clear optional text fields.
pub(crate) fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

// ---------------------------------------------------------------------------
// SyncedConfig
// ---------------------------------------------------------------------------

/// Namespace-independent sync surface of every config object.
pub trait SyncedConfig {
    fn storage_namespace(&self) -> Namespace;
    fn encryption_domain(&self) -> &'static str;
    fn is_dirty(&self) -> bool;
    fn needs_push(&self) -> bool;
    fn needs_dump(&self) -> bool;
    fn seqno(&self) -> i64;
    fn push(&mut self) -> Result<PushResult>;
    fn confirm_pushed(&mut self, seqno: i64, hash: &str);
    fn merge(&mut self, inputs: &[(String, Vec<u8>)]) -> usize;
    fn current_hashes(&self) -> Vec<String>;
    fn dump(&mut self) -> Result<Vec<u8>>;
}

impl<D: ConfigDocument> SyncedConfig for ConfigBase<D> {
    fn storage_namespace(&self) -> Namespace {
        ConfigBase::storage_namespace(self)
    }

    fn encryption_domain(&self) -> &'static str {
        ConfigBase::encryption_domain(self)
    }

    fn is_dirty(&self) -> bool {
        ConfigBase::is_dirty(self)
    }

    fn needs_push(&self) -> bool {
        ConfigBase::needs_push(self)
    }

    fn needs_dump(&self) -> bool {
        ConfigBase::needs_dump(self)
    }

    fn seqno(&self) -> i64 {
        ConfigBase::seqno(self)
    }

    fn push(&mut self) -> Result<PushResult> {
        ConfigBase::push(self)
    }

    fn confirm_pushed(&mut self, seqno: i64, hash: &str) {
        ConfigBase::confirm_pushed(self, seqno, hash)
    }

    fn merge(&mut self, inputs: &[(String, Vec<u8>)]) -> usize {
        ConfigBase::merge(self, inputs)
    }

    fn current_hashes(&self) -> Vec<String> {
        ConfigBase::current_hashes(self)
    }

    fn dump(&mut self) -> Result<Vec<u8>> {
        ConfigBase::dump(self)
    }
}

// ---------------------------------------------------------------------------
// AnyConfig
// ---------------------------------------------------------------------------

/// Any config object, tagged by kind.
pub enum AnyConfig {
    UserProfile(UserProfile),
    Contacts(Contacts),
    ConvoInfoVolatile(ConvoInfoVolatile),
    UserGroups(UserGroups),
    GroupInfo(GroupInfo),
    GroupMembers(GroupMembers),
}

impl AnyConfig {
    /// Construct the user-namespace object that owns `namespace`.
    pub fn new_user(namespace: Namespace, secret_key: &[u8], dump: Option<&[u8]>) -> Result<Self> {
        Ok(match namespace {
            Namespace::UserProfile => AnyConfig::UserProfile(UserProfile::new(secret_key, dump)?),
            Namespace::Contacts => AnyConfig::Contacts(Contacts::new(secret_key, dump)?),
            Namespace::ConvoInfoVolatile => {
                AnyConfig::ConvoInfoVolatile(ConvoInfoVolatile::new(secret_key, dump)?)
            }
            Namespace::UserGroups => AnyConfig::UserGroups(UserGroups::new(secret_key, dump)?),
            other => return Err(ConfigError::WrongNamespace(other, "user config")),
        })
    }

    /// Construct the group-namespace object that owns `namespace`.
    pub fn new_group(
        namespace: Namespace,
        group_pubkey: &[u8],
        group_secret: Option<&[u8]>,
        dump: Option<&[u8]>,
    ) -> Result<Self> {
        Ok(match namespace {
            Namespace::GroupInfo => {
                AnyConfig::GroupInfo(GroupInfo::new(group_pubkey, group_secret, dump)?)
            }
            Namespace::GroupMembers => {
                AnyConfig::GroupMembers(GroupMembers::new(group_pubkey, group_secret, dump)?)
            }
            other => return Err(ConfigError::WrongNamespace(other, "group config")),
        })
    }

    pub fn as_synced(&self) -> &dyn SyncedConfig {
        match self {
            AnyConfig::UserProfile(c) => c,
            AnyConfig::Contacts(c) => c,
            AnyConfig::ConvoInfoVolatile(c) => c,
            AnyConfig::UserGroups(c) => c,
            AnyConfig::GroupInfo(c) => c,
            AnyConfig::GroupMembers(c) => c,
        }
    }

    pub fn as_synced_mut(&mut self) -> &mut dyn SyncedConfig {
        match self {
            AnyConfig::UserProfile(c) => c,
            AnyConfig::Contacts(c) => c,
            AnyConfig::ConvoInfoVolatile(c) => c,
            AnyConfig::UserGroups(c) => c,
            AnyConfig::GroupInfo(c) => c,
            AnyConfig::GroupMembers(c) => c,
        }
    }

    pub fn namespace(&self) -> Namespace {
        self.as_synced().storage_namespace()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::signing::generate_keypair;

    #[test]
    fn test_any_config_routes_by_namespace() {
        let (_, seed) = generate_keypair();
        for ns in [
            Namespace::UserProfile,
            Namespace::Contacts,
            Namespace::ConvoInfoVolatile,
            Namespace::UserGroups,
        ] {
            let config = AnyConfig::new_user(ns, &seed, None).unwrap();
            assert_eq!(config.namespace(), ns);
        }
        assert!(matches!(
            AnyConfig::new_user(Namespace::GroupKeys, &seed, None),
            Err(ConfigError::WrongNamespace(Namespace::GroupKeys, _))
        ));
    }

    #[test]
    fn test_any_config_group_kinds() {
        let (group_pub, group_seed) = generate_keypair();
        let info = AnyConfig::new_group(Namespace::GroupInfo, &group_pub, Some(&group_seed), None)
            .unwrap();
        assert_eq!(info.namespace(), Namespace::GroupInfo);
        assert!(AnyConfig::new_group(Namespace::Contacts, &group_pub, None, None).is_err());
    }

    #[test]
    fn test_dump_restores_through_any_config() {
        let (_, seed) = generate_keypair();
        let mut profile = UserProfile::new(&seed, None).unwrap();
        profile.set_name("Kallie").unwrap();
        let dump = profile.dump().unwrap();

        let restored = AnyConfig::new_user(Namespace::UserProfile, &seed, Some(&dump)).unwrap();
        match restored {
            AnyConfig::UserProfile(p) => assert_eq!(p.name(), Some("Kallie")),
            _ => panic!("wrong kind"),
        }
        assert!(AnyConfig::new_user(Namespace::Contacts, &seed, Some(&dump)).is_err());
    }

    #[test]
    fn test_profile_pic_is_set() {
        assert!(!ProfilePic::default().is_set());
        assert!(ProfilePic::new("http://example.org/pic", vec![7u8; 32]).is_set());
        assert!(!ProfilePic::new("http://example.org/pic", vec![7u8; 16]).is_set());
    }
}
