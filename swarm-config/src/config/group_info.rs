/// Shared group metadata, written by admins and read by every member.
use serde::{Deserialize, Serialize};

use crate::config::base::{ConfigBase, ConfigDocument, Result};
use crate::config::{check_description, check_name, non_empty, ProfilePic};
use crate::crdt::{crdt_fields, Flag, Lww, MaxRegister};
use crate::ids::AccountID;
use crate::namespace::Namespace;

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct GroupInfoDoc {
    name: Lww<Option<String>>,
    description: Lww<Option<String>>,
    profile_pic: Lww<ProfilePic>,
    created: Lww<Option<i64>>,
    expiry_timer: Lww<i64>,
    delete_before: MaxRegister<i64>,
    delete_attachments_before: MaxRegister<i64>,
    destroyed: Flag,
}

crdt_fields!(GroupInfoDoc {
    name,
    description,
    profile_pic,
    created,
    expiry_timer,
    delete_before,
    delete_attachments_before,
    destroyed,
});

impl ConfigDocument for GroupInfoDoc {
    const NAMESPACE: Namespace = Namespace::GroupInfo;
}

pub type GroupInfo = ConfigBase<GroupInfoDoc>;

impl GroupInfo {
    /// Open the info object for a group. Pass the group secret key to get
    /// a writable (admin) object.
    pub fn new(group_pubkey: &[u8], group_secret: Option<&[u8]>, dump: Option<&[u8]>) -> Result<Self> {
        Self::with_group_key(group_pubkey, group_secret, dump)
    }

    /// The group's account id (`03` prefix).
    pub fn id(&self) -> AccountID {
        AccountID::group(&self.group_pubkey().unwrap_or_default())
    }

    pub fn name(&self) -> Option<&str> {
        self.document().name.get().as_deref()
    }

    pub fn set_name(&mut self, name: &str) -> Result<()> {
        check_name(name)?;
        self.admin_edit(|doc, w| doc.name.set(non_empty(name), w.stamp()))?;
        Ok(())
    }

    pub fn description(&self) -> Option<&str> {
        self.document().description.get().as_deref()
    }

    pub fn set_description(&mut self, description: &str) -> Result<()> {
        check_description(description)?;
        self.admin_edit(|doc, w| doc.description.set(non_empty(description), w.stamp()))?;
        Ok(())
    }

    pub fn profile_pic(&self) -> &ProfilePic {
        self.document().profile_pic.get()
    }

    pub fn set_profile_pic(&mut self, pic: ProfilePic) -> Result<()> {
        self.admin_edit(|doc, w| doc.profile_pic.set(pic, w.stamp()))?;
        Ok(())
    }

    /// Unix seconds the group was created, if recorded.
    pub fn created(&self) -> Option<i64> {
        *self.document().created.get()
    }

    pub fn set_created(&mut self, timestamp: i64) -> Result<()> {
        self.admin_edit(|doc, w| doc.created.set(Some(timestamp), w.stamp()))?;
        Ok(())
    }

    /// Disappearing-message timer in seconds; 0 when off.
    pub fn expiry_timer(&self) -> i64 {
        *self.document().expiry_timer.get()
    }

    pub fn set_expiry_timer(&mut self, seconds: i64) -> Result<()> {
        self.admin_edit(|doc, w| doc.expiry_timer.set(seconds.max(0), w.stamp()))?;
        Ok(())
    }

    /// Messages sent before this unix timestamp should be deleted.
    pub fn delete_before(&self) -> i64 {
        self.document().delete_before.get()
    }

    /// Raise the delete-before cutoff; lower values are ignored.
    pub fn set_delete_before(&mut self, timestamp: i64) -> Result<()> {
        self.admin_edit(|doc, _| doc.delete_before.raise(timestamp))?;
        Ok(())
    }

    /// Attachments sent before this unix timestamp should be deleted.
    pub fn delete_attachments_before(&self) -> i64 {
        self.document().delete_attachments_before.get()
    }

    pub fn set_delete_attachments_before(&mut self, timestamp: i64) -> Result<()> {
        self.admin_edit(|doc, _| doc.delete_attachments_before.raise(timestamp))?;
        Ok(())
    }

    pub fn is_destroyed(&self) -> bool {
        self.document().destroyed.get()
    }

    /// Permanently mark the group destroyed. Cannot be undone.
    pub fn destroy_group(&mut self) -> Result<()> {
        self.admin_edit(|doc, _| doc.destroyed.set())?;
        log::debug!(target: "config", "group {} destroyed", self.id());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;
    use crate::crypto::signing::generate_keypair;

    fn admin_and_member() -> (GroupInfo, GroupInfo) {
        let (pk, sk) = generate_keypair();
        let mut admin = GroupInfo::new(&pk, Some(&sk), None).unwrap();
        let mut member = GroupInfo::new(&pk, None, None).unwrap();
        let key = [0x42u8; 32];
        admin.replace_keys(vec![key]);
        member.replace_keys(vec![key]);
        (admin, member)
    }

    #[test]
    fn test_admin_edits_reach_member() {
        let (mut admin, mut member) = admin_and_member();
        assert!(!admin.is_readonly());
        assert!(member.is_readonly());
        assert!(admin.id().is_group());
        assert_eq!(admin.id(), member.id());

        admin.set_name("Study Group").unwrap();
        admin.set_description("Tuesdays").unwrap();
        admin.set_created(1_700_000_000).unwrap();
        admin.set_expiry_timer(3600).unwrap();
        let pushed = admin.push().unwrap();
        admin.confirm_pushed(pushed.seqno, "h1");

        assert_eq!(member.merge(&[("h1".into(), pushed.blob)]), 1);
        assert_eq!(member.name(), Some("Study Group"));
        assert_eq!(member.description(), Some("Tuesdays"));
        assert_eq!(member.created(), Some(1_700_000_000));
        assert_eq!(member.expiry_timer(), 3600);
        assert!(!member.needs_push());
    }

    #[test]
    fn test_member_cannot_write() {
        let (_, mut member) = admin_and_member();
        assert!(matches!(member.set_name("nope"), Err(ConfigError::ReadOnly)));
        assert!(matches!(member.destroy_group(), Err(ConfigError::ReadOnly)));
        assert!(matches!(member.push(), Err(ConfigError::ReadOnly)));
        assert!(!member.needs_push());
    }

    #[test]
    fn test_delete_before_only_rises() {
        let (mut admin, _) = admin_and_member();
        admin.set_delete_before(500).unwrap();
        admin.set_delete_before(100).unwrap();
        assert_eq!(admin.delete_before(), 500);
        admin.set_delete_attachments_before(42).unwrap();
        assert_eq!(admin.delete_attachments_before(), 42);
    }

    #[test]
    fn test_destroy_survives_concurrent_rename() {
        let (pk, sk) = generate_keypair();
        let key = [7u8; 32];
        let mut a = GroupInfo::new(&pk, Some(&sk), None).unwrap();
        let mut b = GroupInfo::new(&pk, Some(&sk), None).unwrap();
        a.replace_keys(vec![key]);
        b.replace_keys(vec![key]);

        a.destroy_group().unwrap();
        b.set_name("Renamed").unwrap();
        let pa = a.push().unwrap();
        let pb = b.push().unwrap();
        a.merge(&[("hb".into(), pb.blob)]);
        b.merge(&[("ha".into(), pa.blob)]);

        for side in [&a, &b] {
            assert!(side.is_destroyed());
            assert_eq!(side.name(), Some("Renamed"));
        }
        assert_eq!(a.state_hash(), b.state_hash());
    }

    #[test]
    fn test_push_without_keys_fails() {
        let (pk, sk) = generate_keypair();
        let mut admin = GroupInfo::new(&pk, Some(&sk), None).unwrap();
        admin.set_name("x").unwrap();
        assert!(matches!(
            admin.push(),
            Err(ConfigError::NoEncryptionKey(Namespace::GroupInfo))
        ));
    }

    #[test]
    fn test_forged_blob_rejected() {
        let (pk, sk) = generate_keypair();
        let (_, other_sk) = generate_keypair();
        let key = [9u8; 32];
        let mut admin = GroupInfo::new(&pk, Some(&sk), None).unwrap();
        admin.replace_keys(vec![key]);
        assert!(GroupInfo::new(&pk, Some(&other_sk), None).is_err());

        // Same symmetric key but signed by a different group.
        let (forger_pk, forger_sk) = generate_keypair();
        let mut forger = GroupInfo::new(&forger_pk, Some(&forger_sk), None).unwrap();
        forger.replace_keys(vec![key]);
        forger.set_name("Phish").unwrap();
        let forged = forger.push().unwrap().blob;

        assert_eq!(admin.merge(&[("f".into(), forged)]), 0);
        assert!(admin.name().is_none());
    }
}
