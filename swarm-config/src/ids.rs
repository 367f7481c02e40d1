/// Core identity types.
///
/// - `DeviceID`: 16-byte per-instance writer identity used in merge stamps
/// - `AccountID`: 33-byte prefixed Ed25519 identity (user accounts and groups)
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_big_array::BigArray;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum IdError {
    #[error("Invalid hex: {0}")]
    InvalidHex(String),

    #[error("Account id must be 33 bytes (66 hex chars), got {0} bytes")]
    InvalidLength(usize),

    #[error("Unknown account id prefix 0x{0:02x}")]
    UnknownPrefix(u8),
}

// ---------------------------------------------------------------------------
// DeviceID
// ---------------------------------------------------------------------------

/// Writer identity for field stamps.
///
/// Random per config instance and persisted in its dump, so two devices
/// sharing one account never produce colliding stamps.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DeviceID(pub [u8; 16]);

impl DeviceID {
    /// Fresh random DeviceID.
    pub fn random() -> Self {
        let mut id = [0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut id);
        DeviceID(id)
    }

    /// Derive a DeviceID from an Ed25519 public key.
    pub fn from_pubkey(pubkey: &[u8; 32]) -> Self {
        let hash = blake3::hash(pubkey);
        let mut id = [0u8; 16];
        id.copy_from_slice(&hash.as_bytes()[..16]);
        DeviceID(id)
    }

    /// Hex-encode for display/storage.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl Ord for DeviceID {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl PartialOrd for DeviceID {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for DeviceID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceID({})", &self.to_hex()[..8])
    }
}

// ---------------------------------------------------------------------------
// AccountID
// ---------------------------------------------------------------------------

/// Prefixed Ed25519 identity: `prefix || pubkey`, shown as 66 hex chars.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountID(#[serde(with = "BigArray")] pub [u8; 33]);

impl AccountID {
    /// Prefix byte for user accounts.
    pub const USER_PREFIX: u8 = 0x05;
    /// Prefix byte for groups.
    pub const GROUP_PREFIX: u8 = 0x03;

    fn with_prefix(prefix: u8, pubkey: &[u8; 32]) -> Self {
        let mut id = [0u8; 33];
        id[0] = prefix;
        id[1..].copy_from_slice(pubkey);
        AccountID(id)
    }

    /// User account id for an Ed25519 public key.
    pub fn user(pubkey: &[u8; 32]) -> Self {
        Self::with_prefix(Self::USER_PREFIX, pubkey)
    }

    /// Group id for a group Ed25519 public key.
    pub fn group(pubkey: &[u8; 32]) -> Self {
        Self::with_prefix(Self::GROUP_PREFIX, pubkey)
    }

    pub fn prefix(&self) -> u8 {
        self.0[0]
    }

    pub fn is_group(&self) -> bool {
        self.prefix() == Self::GROUP_PREFIX
    }

    /// The Ed25519 public key without prefix.
    pub fn pubkey(&self) -> [u8; 32] {
        let mut key = [0u8; 32];
        key.copy_from_slice(&self.0[1..]);
        key
    }

    pub fn as_bytes(&self) -> &[u8; 33] {
        &self.0
    }

    /// Hex-encode for display/storage.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Decode from hex string.
    pub fn from_hex(s: &str) -> Result<Self, IdError> {
        let bytes = hex::decode(s).map_err(|e| IdError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    /// Decode from raw prefixed bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, IdError> {
        let id: [u8; 33] = bytes
            .try_into()
            .map_err(|_| IdError::InvalidLength(bytes.len()))?;
        match id[0] {
            Self::USER_PREFIX | Self::GROUP_PREFIX => Ok(AccountID(id)),
            other => Err(IdError::UnknownPrefix(other)),
        }
    }
}

impl FromStr for AccountID {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Ord for AccountID {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl PartialOrd for AccountID {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for AccountID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountID({}…)", &self.to_hex()[..10])
    }
}

impl fmt::Display for AccountID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}
