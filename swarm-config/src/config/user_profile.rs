/// The account's own profile: display name, avatar, note-to-self settings.
use serde::{Deserialize, Serialize};

use crate::config::base::{ConfigBase, ConfigDocument, Result};
use crate::config::{check_name, non_empty, ExpiryMode, ProfilePic};
use crate::crdt::{crdt_fields, Lww};
use crate::namespace::Namespace;

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct UserProfileDoc {
    name: Lww<Option<String>>,
    profile_pic: Lww<ProfilePic>,
    nts_priority: Lww<i64>,
    nts_expiry: Lww<ExpiryMode>,
    blinded_msgreqs: Lww<Option<bool>>,
}

crdt_fields!(UserProfileDoc {
    name,
    profile_pic,
    nts_priority,
    nts_expiry,
    blinded_msgreqs,
});

impl ConfigDocument for UserProfileDoc {
    const NAMESPACE: Namespace = Namespace::UserProfile;
}

pub type UserProfile = ConfigBase<UserProfileDoc>;

impl UserProfile {
    /// Open the profile for the account owning `secret_key`.
    pub fn new(secret_key: &[u8], dump: Option<&[u8]>) -> Result<Self> {
        Self::with_user_key(secret_key, dump)
    }

    pub fn name(&self) -> Option<&str> {
        self.document().name.get().as_deref()
    }

    /// Set the display name; an empty string clears it.
    pub fn set_name(&mut self, name: &str) -> Result<()> {
        check_name(name)?;
        self.edit(|doc, w| doc.name.set(non_empty(name), w.stamp()));
        Ok(())
    }

    pub fn profile_pic(&self) -> &ProfilePic {
        self.document().profile_pic.get()
    }

    pub fn set_profile_pic(&mut self, pic: ProfilePic) {
        self.edit(|doc, w| doc.profile_pic.set(pic, w.stamp()));
    }

    /// Note-to-self conversation priority.
    pub fn nts_priority(&self) -> i64 {
        *self.document().nts_priority.get()
    }

    pub fn set_nts_priority(&mut self, priority: i64) {
        self.edit(|doc, w| doc.nts_priority.set(priority, w.stamp()));
    }

    /// Note-to-self disappearing-message setting.
    pub fn nts_expiry(&self) -> ExpiryMode {
        *self.document().nts_expiry.get()
    }

    pub fn set_nts_expiry(&mut self, mode: ExpiryMode) {
        self.edit(|doc, w| doc.nts_expiry.set(mode, w.stamp()));
    }

    /// Whether community message requests are accepted. Defaults to true.
    pub fn community_message_requests(&self) -> bool {
        self.document().blinded_msgreqs.get().unwrap_or(true)
    }

    /// Whether the community message request setting was ever set.
    pub fn is_community_message_requests_set(&self) -> bool {
        self.document().blinded_msgreqs.get().is_some()
    }

    pub fn set_community_message_requests(&mut self, enabled: bool) {
        self.edit(|doc, w| doc.blinded_msgreqs.set(Some(enabled), w.stamp()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;
    use crate::crypto::signing::generate_keypair;

    fn seed() -> [u8; 32] {
        generate_keypair().1
    }

    #[test]
    fn test_empty_profile_push() {
        let mut profile = UserProfile::new(&seed(), None).unwrap();
        assert!(!profile.needs_push());
        assert!(!profile.needs_dump());
        assert_eq!(profile.encryption_domain(), "UserProfile");
        assert_eq!(profile.storage_namespace(), Namespace::UserProfile);

        let pushed = profile.push().unwrap();
        assert_eq!(pushed.seqno, 0);
        assert!(pushed.obsolete_hashes.is_empty());
        assert!(profile.name().is_none());
    }

    #[test]
    fn test_edit_push_confirm_cycle() {
        let mut profile = UserProfile::new(&seed(), None).unwrap();
        profile.set_name("Kallie").unwrap();
        profile.set_profile_pic(ProfilePic::new("http://example.org/omg-pic-123.bmp", vec![0xAA; 32]));
        profile.set_nts_priority(9);
        assert!(profile.is_dirty());
        assert!(profile.needs_push());

        let pushed = profile.push().unwrap();
        assert_eq!(pushed.seqno, 1);
        assert!(!profile.is_dirty());
        assert!(profile.needs_push());

        profile.confirm_pushed(pushed.seqno, "fakehash1");
        assert!(!profile.needs_push());
        assert_eq!(profile.current_hashes(), vec!["fakehash1".to_string()]);
        assert_eq!(profile.nts_priority(), 9);
    }

    #[test]
    fn test_noop_write_stays_clean() {
        let mut profile = UserProfile::new(&seed(), None).unwrap();
        profile.set_name("").unwrap();
        assert!(!profile.is_dirty());
        profile.set_nts_priority(0);
        assert!(!profile.needs_push());
    }

    #[test]
    fn test_name_too_long_rejected() {
        let mut profile = UserProfile::new(&seed(), None).unwrap();
        let long = "x".repeat(101);
        assert!(matches!(
            profile.set_name(&long),
            Err(ConfigError::ValueTooLong { field: "name", .. })
        ));
        assert!(!profile.is_dirty());
    }

    #[test]
    fn test_concurrent_edits_converge() {
        let seed = seed();
        let mut a = UserProfile::new(&seed, None).unwrap();
        a.set_name("Nibbler").unwrap();
        let p1 = a.push().unwrap();
        a.confirm_pushed(p1.seqno, "hash1");

        let mut b = UserProfile::new(&seed, None).unwrap();
        assert_eq!(b.merge(&[("hash1".into(), p1.blob.clone())]), 1);
        assert_eq!(b.seqno(), 1);
        assert!(!b.needs_push());

        a.set_name("Raz").unwrap();
        b.set_nts_expiry(ExpiryMode::AfterSend(3600));
        let pa = a.push().unwrap();
        let pb = b.push().unwrap();
        assert_eq!(pa.seqno, 2);
        assert_eq!(pb.seqno, 2);
        a.confirm_pushed(pa.seqno, "hash2a");
        b.confirm_pushed(pb.seqno, "hash2b");

        assert_eq!(a.merge(&[("hash2b".into(), pb.blob.clone())]), 1);
        assert_eq!(b.merge(&[("hash2a".into(), pa.blob.clone())]), 1);
        assert!(a.needs_push() && b.needs_push());
        assert_eq!(a.seqno(), 3);
        assert_eq!(b.seqno(), 3);

        assert_eq!(a.name(), Some("Raz"));
        assert_eq!(b.name(), Some("Raz"));
        assert_eq!(a.nts_expiry(), ExpiryMode::AfterSend(3600));
        assert_eq!(a.state_hash(), b.state_hash());

        let pa3 = a.push().unwrap();
        a.confirm_pushed(pa3.seqno, "hash3");
        assert_eq!(b.merge(&[("hash3".into(), pa3.blob)]), 1);
        assert!(!b.needs_push());
        assert_eq!(b.push().unwrap().seqno, 3);
    }

    #[test]
    fn test_merge_from_other_account_is_skipped() {
        let mut mine = UserProfile::new(&seed(), None).unwrap();
        let mut theirs = UserProfile::new(&seed(), None).unwrap();
        theirs.set_name("Mallory").unwrap();
        let blob = theirs.push().unwrap().blob;

        assert_eq!(mine.merge(&[("h".into(), blob)]), 0);
        assert!(mine.name().is_none());
        assert!(mine.current_hashes().is_empty());
    }

    #[test]
    fn test_community_message_requests_default() {
        let mut profile = UserProfile::new(&seed(), None).unwrap();
        assert!(profile.community_message_requests());
        assert!(!profile.is_community_message_requests_set());
        profile.set_community_message_requests(false);
        assert!(!profile.community_message_requests());
        assert!(profile.is_community_message_requests_set());
    }

    #[test]
    fn test_invalid_secret_key_rejected() {
        assert!(matches!(
            UserProfile::new(&[0u8; 20], None),
            Err(ConfigError::InvalidSecretKey(_))
        ));
        assert!(matches!(
            UserProfile::new(&seed(), Some(&[1, 2, 3])),
            Err(ConfigError::CorruptDump(_))
        ));
    }
}
