// Crate-level lint configuration: stylistic lints only; correctness lints stay on.
#![allow(
    clippy::empty_line_after_doc_comments,
    clippy::doc_lazy_continuation,
    clippy::too_many_arguments,
    clippy::missing_safety_doc
)]

// ── Re-export the core engine ───────────────────────────────────────────────
pub use swarm_config::{config, crypto, keys, namespace};

// ── Boundary layer ──────────────────────────────────────────────────────────

/// Safe handle-based operations; the only code that touches engine objects.
pub mod api;
/// C ABI (`sc_*`) over a process-wide arena.
pub mod c_api;
/// Error kinds and the single error translation point.
pub mod error;
/// Handle arena with per-instance locks.
pub mod handles;

pub use error::{ErrorKind, FfiError};
pub use handles::{Handle, HandleArena};

// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library version
pub fn get_version() -> &'static str {
    VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!get_version().is_empty());
        assert_eq!(VERSION, swarm_config::VERSION);
    }
}
