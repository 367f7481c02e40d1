/// Storage namespaces.
///
/// Every config object routes its blobs to one fixed namespace on the swarm.
/// The numeric ids are part of the storage contract and never change.
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Namespace {
    UserProfile,
    Contacts,
    ConvoInfoVolatile,
    UserGroups,
    GroupMessages,
    GroupKeys,
    GroupInfo,
    GroupMembers,
}

impl Namespace {
    /// Every namespace, in id order.
    pub const ALL: [Namespace; 8] = [
        Namespace::UserProfile,
        Namespace::Contacts,
        Namespace::ConvoInfoVolatile,
        Namespace::UserGroups,
        Namespace::GroupMessages,
        Namespace::GroupKeys,
        Namespace::GroupInfo,
        Namespace::GroupMembers,
    ];

    /// Stable storage id.
    pub fn id(self) -> i16 {
        match self {
            Namespace::UserProfile => 2,
            Namespace::Contacts => 3,
            Namespace::ConvoInfoVolatile => 4,
            Namespace::UserGroups => 5,
            Namespace::GroupMessages => 11,
            Namespace::GroupKeys => 12,
            Namespace::GroupInfo => 13,
            Namespace::GroupMembers => 14,
        }
    }

    pub fn from_id(id: i16) -> Option<Namespace> {
        Namespace::ALL.into_iter().find(|ns| ns.id() == id)
    }

    pub fn name(self) -> &'static str {
        match self {
            Namespace::UserProfile => "UserProfile",
            Namespace::Contacts => "Contacts",
            Namespace::ConvoInfoVolatile => "ConvoInfoVolatile",
            Namespace::UserGroups => "UserGroups",
            Namespace::GroupMessages => "GroupMessages",
            Namespace::GroupKeys => "GroupKeys",
            Namespace::GroupInfo => "GroupInfo",
            Namespace::GroupMembers => "GroupMembers",
        }
    }

    /// Domain string mixed into the blob encryption key.
    pub fn encryption_domain(self) -> &'static str {
        self.name()
    }

    /// Namespaces that live in a group's swarm rather than the user's.
    pub fn is_group(self) -> bool {
        matches!(
            self,
            Namespace::GroupMessages
                | Namespace::GroupKeys
                | Namespace::GroupInfo
                | Namespace::GroupMembers
        )
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
