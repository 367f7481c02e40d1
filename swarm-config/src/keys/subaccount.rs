/// Delegated storage credentials for group members.
///
/// An admin signs a 36-byte token naming a member's *blinded* key and the
/// permissions granted. The member proves possession of the blinded key by
/// signing each storage request with it, so storage can authorize the
/// request without learning the member's identity.
///
/// Token layout: `[0x03][flags][0][0][blinded pubkey (32)]`, flags bit 0 =
/// read (always set), bit 1 = write, bit 2 = delete.
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::crypto::blinding;

use super::{KeysError, Result};

pub const TOKEN_LEN: usize = 36;
pub const CREDENTIAL_LEN: usize = TOKEN_LEN + 64;

const TOKEN_PREFIX: u8 = 0x03;
pub const FLAG_READ: u8 = 0b001;
pub const FLAG_WRITE: u8 = 0b010;
pub const FLAG_DELETE: u8 = 0b100;

/// Parsed sub-account token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubaccountToken {
    pub flags: u8,
    pub blinded_pubkey: [u8; 32],
}

impl SubaccountToken {
    pub fn new(blinded_pubkey: [u8; 32], write: bool, delete: bool) -> Self {
        let mut flags = FLAG_READ;
        if write {
            flags |= FLAG_WRITE;
        }
        if delete {
            flags |= FLAG_DELETE;
        }
        SubaccountToken {
            flags,
            blinded_pubkey,
        }
    }

    pub fn can_write(&self) -> bool {
        self.flags & FLAG_WRITE != 0
    }

    pub fn can_delete(&self) -> bool {
        self.flags & FLAG_DELETE != 0
    }

    pub fn to_bytes(&self) -> [u8; TOKEN_LEN] {
        let mut out = [0u8; TOKEN_LEN];
        out[0] = TOKEN_PREFIX;
        out[1] = self.flags;
        out[4..].copy_from_slice(&self.blinded_pubkey);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != TOKEN_LEN {
            return Err(KeysError::InvalidSubaccount(format!(
                "token must be {} bytes, got {}",
                TOKEN_LEN,
                bytes.len()
            )));
        }
        if bytes[0] != TOKEN_PREFIX || bytes[1] & FLAG_READ == 0 || bytes[2] != 0 || bytes[3] != 0 {
            return Err(KeysError::InvalidSubaccount("bad token header".into()));
        }
        let mut blinded_pubkey = [0u8; 32];
        blinded_pubkey.copy_from_slice(&bytes[4..]);
        Ok(SubaccountToken {
            flags: bytes[1],
            blinded_pubkey,
        })
    }
}

/// Storage request authorization, base64-encoded for the storage API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwarmAuth {
    /// The 36-byte token.
    pub subaccount: String,
    /// Admin signature over the token.
    pub subaccount_sig: String,
    /// Blinded-key signature over the request.
    pub signature: String,
}

impl SwarmAuth {
    pub(crate) fn new(token: &[u8], admin_sig: &[u8], signature: &[u8]) -> Self {
        SwarmAuth {
            subaccount: BASE64.encode(token),
            subaccount_sig: BASE64.encode(admin_sig),
            signature: BASE64.encode(signature),
        }
    }
}

fn decode(field: &str, value: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(value)
        .map_err(|e| KeysError::InvalidSubaccount(format!("{}: {}", field, e)))
}

fn signature_from(field: &str, bytes: &[u8]) -> Result<Signature> {
    let arr: [u8; 64] = bytes
        .try_into()
        .map_err(|_| KeysError::InvalidSubaccount(format!("{} must be 64 bytes", field)))?;
    Ok(Signature::from_bytes(&arr))
}

/// Split a 100-byte credential into token and admin signature.
pub(crate) fn split_credential(credential: &[u8]) -> Result<(SubaccountToken, Signature)> {
    if credential.len() != CREDENTIAL_LEN {
        return Err(KeysError::InvalidSubaccount(format!(
            "credential must be {} bytes, got {}",
            CREDENTIAL_LEN,
            credential.len()
        )));
    }
    let token = SubaccountToken::from_bytes(&credential[..TOKEN_LEN])?;
    let sig = signature_from("admin signature", &credential[TOKEN_LEN..])?;
    Ok((token, sig))
}

/// Storage-side check of a sub-account request.
///
/// Verifies the admin signature over the token with the group key and the
/// request signature with the token's blinded key. Returns the token so the
/// caller can check its permissions.
///
/// # Arguments
/// * `group_pubkey` - 32-byte Ed25519 group public key
/// * `message` - The signed request bytes
/// * `auth` - Authorization produced by `Keys::swarm_subaccount_sign`
pub fn verify_subaccount_auth(
    group_pubkey: &[u8; 32],
    message: &[u8],
    auth: &SwarmAuth,
) -> Result<SubaccountToken> {
    let token_bytes = decode("subaccount", &auth.subaccount)?;
    let token = SubaccountToken::from_bytes(&token_bytes)?;

    let group = VerifyingKey::from_bytes(group_pubkey).map_err(|_| KeysError::InvalidPublicKey)?;
    let admin_sig = signature_from("subaccount_sig", &decode("subaccount_sig", &auth.subaccount_sig)?)?;
    group
        .verify(&token_bytes, &admin_sig)
        .map_err(|_| KeysError::InvalidSubaccount("token not signed by the group".into()))?;

    let blinded = VerifyingKey::from_bytes(&token.blinded_pubkey)
        .map_err(|_| KeysError::InvalidSubaccount("blinded key is not a valid point".into()))?;
    let request_sig = signature_from("signature", &decode("signature", &auth.signature)?)?;
    blinded
        .verify(message, &request_sig)
        .map_err(|_| KeysError::InvalidSubaccount("request signature mismatch".into()))?;

    Ok(token)
}

/// Blinded pubkey a member will sign with inside `group_pubkey`.
pub(crate) fn blinded_pubkey_for(group_pubkey: &[u8; 32], member_pubkey: &[u8; 32]) -> Result<[u8; 32]> {
    blinding::blind_public_key(group_pubkey, member_pubkey)
        .map_err(|_| KeysError::InvalidSubaccount("member key is not a valid point".into()))
}
