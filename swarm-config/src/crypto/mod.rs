pub mod blinding;
pub mod encryption;
pub mod key_exchange;
pub mod multi_recipient;
pub mod signing;

pub use blinding::{blind_key, blind_public_key, blinded_sign, BlindedKeypair, BlindingError};
pub use encryption::{
    decrypt_message, derive_key, encrypt_deterministic, encrypt_message, generate_key,
    EncryptionError,
};
pub use key_exchange::{
    curve_secret_from_seed, derive_curve_key, derive_shared_secret, generate_static_keypair,
    KeyExchangeError,
};
pub use multi_recipient::{decrypt_for_multiple, encrypt_for_multiple, MultiRecipientError};
pub use signing::{
    derive_public_key, generate_keypair, sign_data, signing_key_from_secret, verify_signature,
    verifying_key_from_bytes, SigningError,
};
