//! # Swarm Config
//!
//! **Encrypted, mergeable config objects synced through untrusted storage.**
//!
//! A user's account state (profile, contacts, conversation read markers,
//! group memberships) and each closed group's state (info, members, keys)
//! live as encrypted blobs in per-namespace storage. Every device pushes its
//! own state and merges what others pushed; the merge is order-independent,
//! so all devices converge without coordination.
//!
//! ## Quick Start
//!
//! ```rust
//! use swarm_config::config::UserProfile;
//! use swarm_config::crypto::generate_keypair;
//!
//! let (_, seed) = generate_keypair();
//! let mut phone = UserProfile::new(&seed, None).unwrap();
//! let mut laptop = UserProfile::new(&seed, None).unwrap();
//!
//! phone.set_name("Ada").unwrap();
//! let pushed = phone.push().unwrap();
//! phone.confirm_pushed(pushed.seqno, "hash-1");
//!
//! laptop.merge(&[("hash-1".to_string(), pushed.blob)]);
//! assert_eq!(laptop.name(), Some("Ada"));
//! ```
//!
//! ## Architecture
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`crypto`] | XChaCha20-Poly1305 sealing, Ed25519 signing, X25519 exchange, key blinding |
//! | [`ids`] | Account and device identifiers |
//! | [`namespace`] | Storage namespace registry |
//! | [`crdt`] | Field-level merge primitives (LWW registers, max registers, maps) |
//! | [`config`] | `ConfigBase` sync state machine and the per-namespace objects |
//! | [`keys`] | Group key rotation, group message encryption, sub-accounts |
//! | [`limits`] | Size limits and retention tunables |
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `std` | Yes | Standard library support |
//! | `wasm` | No | WebAssembly support (`getrandom/js`) |

#![allow(
    clippy::empty_line_after_doc_comments,
    clippy::doc_lazy_continuation,
    clippy::too_many_arguments,
    clippy::type_complexity,
    clippy::new_ret_no_self
)]

// ── Public modules ──────────────────────────────────────────────────────────

/// Cryptographic primitives: encryption, signing, key exchange, blinding.
pub mod crypto;

/// Account ids (66-hex, prefixed) and per-instance device ids.
pub mod ids;

/// Storage namespaces and their stable numeric ids.
pub mod namespace;

/// Size limits, retention windows and the wall clock.
pub mod limits;

/// Conflict-free field types that config documents are built from.
pub mod crdt;

/// Config objects: the shared sync base and one type per namespace.
pub mod config;

/// Group key generations, key distribution and group messages.
pub mod keys;

// ── Re-exports for convenience ──────────────────────────────────────────────

pub use config::{
    AnyConfig, ConfigBase, ConfigError, Contacts, ConvoInfoVolatile, GroupInfo, GroupMembers,
    PushResult, SyncState, SyncedConfig, UserGroups, UserProfile,
};

pub use ids::{AccountID, DeviceID, IdError};

pub use keys::{DecryptedMessage, KeyGeneration, Keys, KeysError, SwarmAuth};

pub use namespace::Namespace;

// ── Library metadata ────────────────────────────────────────────────────────

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn version() -> &'static str {
    VERSION
}

// ── Tests ───────────────────────────────────────────────────────────────────
