/// Boundary error type and its stable integer codes.
///
/// Every error that leaves the library through the C ABI is translated here,
/// and only here, into an [`ErrorKind`].
use swarm_config::{ConfigError, KeysError};
use thiserror::Error;

/// Stable result codes returned by every `sc_*` function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ErrorKind {
    Ok = 0,
    NullPointer = -1,
    InvalidHandle = -2,
    WrongKind = -3,
    InvalidArgument = -4,
    InvalidKey = -5,
    CorruptDump = -6,
    ReadOnly = -7,
    NotAdmin = -8,
    NoKey = -9,
    NotDecryptable = -10,
    TooLarge = -11,
    Internal = -99,
}

#[derive(Error, Debug)]
pub enum FfiError {
    #[error("Null pointer for {0}")]
    NullPointer(&'static str),

    #[error("Unknown or freed handle {0}")]
    InvalidHandle(u64),

    #[error("Handle {0} is not a {1}")]
    WrongKind(u64, &'static str),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Keys error: {0}")]
    Keys(#[from] KeysError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, FfiError>;

impl FfiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FfiError::NullPointer(_) => ErrorKind::NullPointer,
            FfiError::InvalidHandle(_) => ErrorKind::InvalidHandle,
            FfiError::WrongKind(..) => ErrorKind::WrongKind,
            FfiError::InvalidArgument(_) | FfiError::Json(_) => ErrorKind::InvalidArgument,
            FfiError::Internal(_) => ErrorKind::Internal,
            FfiError::Config(e) => match e {
                ConfigError::InvalidSecretKey(_) | ConfigError::InvalidPublicKey => {
                    ErrorKind::InvalidKey
                }
                ConfigError::CorruptDump(_) => ErrorKind::CorruptDump,
                ConfigError::ReadOnly => ErrorKind::ReadOnly,
                ConfigError::NoEncryptionKey(_) => ErrorKind::NoKey,
                ConfigError::WrongNamespace(..) => ErrorKind::WrongKind,
                ConfigError::ValueTooLong { .. } => ErrorKind::TooLarge,
                ConfigError::InvalidId(_) | ConfigError::InvalidUrl(_) => ErrorKind::InvalidArgument,
                ConfigError::Encode(_) | ConfigError::Encryption(_) => ErrorKind::Internal,
            },
            FfiError::Keys(e) => match e {
                KeysError::InvalidSecretKey(_) | KeysError::InvalidPublicKey => {
                    ErrorKind::InvalidKey
                }
                KeysError::GroupMismatch
                | KeysError::Malformed(_)
                | KeysError::InvalidSubaccount(_)
                | KeysError::InvalidId(_) => ErrorKind::InvalidArgument,
                KeysError::NotAdmin => ErrorKind::NotAdmin,
                KeysError::NoKey => ErrorKind::NoKey,
                KeysError::MessageTooLarge(..) | KeysError::GenerationExhausted => ErrorKind::TooLarge,
                KeysError::NotDecryptable | KeysError::BadSenderSignature => {
                    ErrorKind::NotDecryptable
                }
                KeysError::CorruptDump(_) => ErrorKind::CorruptDump,
                KeysError::Encode(_) | KeysError::Encryption(_) | KeysError::KeyExchange(_) => {
                    ErrorKind::Internal
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(ErrorKind::Ok as i32, 0);
        assert_eq!(ErrorKind::InvalidHandle as i32, -2);
        assert_eq!(ErrorKind::NotDecryptable as i32, -10);
        assert_eq!(ErrorKind::Internal as i32, -99);
    }

    #[test]
    fn test_translation() {
        assert_eq!(FfiError::from(ConfigError::ReadOnly).kind(), ErrorKind::ReadOnly);
        assert_eq!(FfiError::from(KeysError::NotAdmin).kind(), ErrorKind::NotAdmin);
        assert_eq!(
            FfiError::from(KeysError::MessageTooLarge(70_000, 65_536)).kind(),
            ErrorKind::TooLarge
        );
        assert_eq!(FfiError::from(KeysError::GenerationExhausted).kind(), ErrorKind::TooLarge);
        assert_eq!(
            FfiError::from(ConfigError::InvalidUrl("no room".into())).kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(FfiError::InvalidHandle(9).kind(), ErrorKind::InvalidHandle);
    }
}
