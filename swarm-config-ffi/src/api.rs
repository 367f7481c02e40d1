/// Safe operations over a [`HandleArena`].
///
/// This is the whole boundary surface; `c_api` only marshals pointers into
/// these calls. Structured results are JSON with binary fields in base64.
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use serde::{Deserialize, Serialize};

use swarm_config::config::{AnyConfig, CommunityInfo};
use swarm_config::{AccountID, Keys, Namespace};

use crate::error::{FfiError, Result};
use crate::handles::{
    as_config, as_group_info, as_group_members, as_keys, lock, lock_in_order, Handle, HandleArena,
    Object,
};

/// JSON shape of a push result.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct PushJson {
    pub seqno: i64,
    /// base64
    pub data: String,
    pub obsolete: Vec<String>,
}

/// JSON shape of one merge input.
#[derive(Serialize, Deserialize, Debug)]
pub struct MergeInputJson {
    pub hash: String,
    /// base64
    pub data: String,
}

/// JSON shape of a decrypted group message.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct DecryptedJson {
    /// 66-char hex account id
    pub sender: String,
    /// base64
    pub plaintext: String,
}

fn namespace(id: i16) -> Result<Namespace> {
    Namespace::from_id(id).ok_or_else(|| FfiError::InvalidArgument(format!("unknown namespace {}", id)))
}

fn with_config<R>(arena: &HandleArena, handle: Handle, f: impl FnOnce(&mut AnyConfig) -> Result<R>) -> Result<R> {
    let shared = arena.get(handle)?;
    let mut guard = lock(&shared)?;
    let config = as_config(&mut guard, handle)?;
    f(config)
}

fn account_id(hex: &str) -> Result<AccountID> {
    AccountID::from_hex(hex).map_err(|e| FfiError::InvalidArgument(format!("account id: {}", e)))
}

fn with_keys<R>(arena: &HandleArena, handle: Handle, f: impl FnOnce(&mut Keys) -> Result<R>) -> Result<R> {
    let shared = arena.get(handle)?;
    let mut guard = lock(&shared)?;
    let keys = as_keys(&mut guard, handle)?;
    f(keys)
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

pub fn config_new_user(
    arena: &HandleArena,
    namespace_id: i16,
    secret_key: &[u8],
    dump: Option<&[u8]>,
) -> Result<Handle> {
    let config = AnyConfig::new_user(namespace(namespace_id)?, secret_key, dump)?;
    arena.insert(Object::Config(config))
}

pub fn config_new_group(
    arena: &HandleArena,
    namespace_id: i16,
    group_pubkey: &[u8],
    group_secret: Option<&[u8]>,
    dump: Option<&[u8]>,
) -> Result<Handle> {
    let config = AnyConfig::new_group(namespace(namespace_id)?, group_pubkey, group_secret, dump)?;
    arena.insert(Object::Config(config))
}

/// Open the key engine; `info` and `members` must be that group's objects.
pub fn keys_new(
    arena: &HandleArena,
    user_secret: &[u8],
    group_pubkey: &[u8],
    group_secret: Option<&[u8]>,
    dump: Option<&[u8]>,
    info: Handle,
    members: Handle,
) -> Result<Handle> {
    let handles = [info, members];
    let shared = arena.resolve(&handles)?;
    let keys = {
        let mut guards = lock_in_order(&handles, &shared)?;
        let [g_info, g_members] = &mut guards[..] else {
            return Err(FfiError::Internal("guard count".into()));
        };
        let info = as_group_info(g_info, info)?;
        let members = as_group_members(g_members, members)?;
        Keys::new(user_secret, group_pubkey, group_secret, dump, info, members)?
    };
    arena.insert(Object::Keys(keys))
}

pub fn free(arena: &HandleArena, handle: Handle) -> Result<()> {
    arena.remove(handle)
}

// ---------------------------------------------------------------------------
// Config sync
// ---------------------------------------------------------------------------

pub fn config_namespace(arena: &HandleArena, handle: Handle) -> Result<i16> {
    with_config(arena, handle, |c| Ok(c.namespace().id()))
}

pub fn config_encryption_domain(arena: &HandleArena, handle: Handle) -> Result<String> {
    with_config(arena, handle, |c| Ok(c.as_synced().encryption_domain().to_string()))
}

pub fn config_is_dirty(arena: &HandleArena, handle: Handle) -> Result<bool> {
    with_config(arena, handle, |c| Ok(c.as_synced().is_dirty()))
}

pub fn config_needs_push(arena: &HandleArena, handle: Handle) -> Result<bool> {
    with_config(arena, handle, |c| Ok(c.as_synced().needs_push()))
}

pub fn config_needs_dump(arena: &HandleArena, handle: Handle) -> Result<bool> {
    with_config(arena, handle, |c| Ok(c.as_synced().needs_dump()))
}

pub fn config_push(arena: &HandleArena, handle: Handle) -> Result<String> {
    let pushed = with_config(arena, handle, |c| Ok(c.as_synced_mut().push()?))?;
    Ok(serde_json::to_string(&PushJson {
        seqno: pushed.seqno,
        data: B64.encode(&pushed.blob),
        obsolete: pushed.obsolete_hashes,
    })?)
}

pub fn config_confirm_pushed(arena: &HandleArena, handle: Handle, seqno: i64, hash: &str) -> Result<()> {
    with_config(arena, handle, |c| {
        c.as_synced_mut().confirm_pushed(seqno, hash);
        Ok(())
    })
}

/// Merge a JSON array of `{hash, data}` inputs. Returns the accepted count.
pub fn config_merge(arena: &HandleArena, handle: Handle, inputs_json: &str) -> Result<usize> {
    let inputs: Vec<MergeInputJson> = serde_json::from_str(inputs_json)?;
    let decoded = inputs
        .into_iter()
        .map(|i| {
            B64.decode(&i.data)
                .map(|data| (i.hash, data))
                .map_err(|e| FfiError::InvalidArgument(format!("merge data: {}", e)))
        })
        .collect::<Result<Vec<_>>>()?;
    with_config(arena, handle, |c| Ok(c.as_synced_mut().merge(&decoded)))
}

/// JSON array of the stored hashes holding this object's state.
pub fn config_current_hashes(arena: &HandleArena, handle: Handle) -> Result<String> {
    let hashes = with_config(arena, handle, |c| Ok(c.as_synced().current_hashes()))?;
    Ok(serde_json::to_string(&hashes)?)
}

pub fn config_dump(arena: &HandleArena, handle: Handle) -> Result<Vec<u8>> {
    with_config(arena, handle, |c| Ok(c.as_synced_mut().dump()?))
}

// ---------------------------------------------------------------------------
// Document edits
// ---------------------------------------------------------------------------

pub fn profile_set_name(arena: &HandleArena, handle: Handle, name: &str) -> Result<()> {
    with_config(arena, handle, |c| match c {
        AnyConfig::UserProfile(profile) => Ok(profile.set_name(name)?),
        _ => Err(FfiError::WrongKind(handle.0, "user profile")),
    })
}

pub fn contacts_set_name(arena: &HandleArena, handle: Handle, account_hex: &str, name: &str) -> Result<()> {
    let id = account_id(account_hex)?;
    with_config(arena, handle, |c| match c {
        AnyConfig::Contacts(contacts) => Ok(contacts.set_name(&id, name)?),
        _ => Err(FfiError::WrongKind(handle.0, "contacts")),
    })
}

pub fn contacts_set_nickname(
    arena: &HandleArena,
    handle: Handle,
    account_hex: &str,
    nickname: &str,
) -> Result<()> {
    let id = account_id(account_hex)?;
    with_config(arena, handle, |c| match c {
        AnyConfig::Contacts(contacts) => Ok(contacts.set_nickname(&id, nickname)?),
        _ => Err(FfiError::WrongKind(handle.0, "contacts")),
    })
}

/// Returns whether the contact existed.
pub fn contacts_erase(arena: &HandleArena, handle: Handle, account_hex: &str) -> Result<bool> {
    let id = account_id(account_hex)?;
    with_config(arena, handle, |c| match c {
        AnyConfig::Contacts(contacts) => Ok(contacts.erase(&id)),
        _ => Err(FfiError::WrongKind(handle.0, "contacts")),
    })
}

/// Add or update a community from its full URL.
pub fn user_groups_set_community(arena: &HandleArena, handle: Handle, full_url: &str) -> Result<()> {
    let parsed = CommunityInfo::from_full_url(full_url)?;
    with_config(arena, handle, |c| match c {
        AnyConfig::UserGroups(groups) => {
            let info = groups.get_or_construct_community(&parsed.base_url, &parsed.room, parsed.pubkey);
            groups.set_community(&info);
            Ok(())
        }
        _ => Err(FfiError::WrongKind(handle.0, "user groups")),
    })
}

pub fn group_info_set_name(arena: &HandleArena, handle: Handle, name: &str) -> Result<()> {
    with_config(arena, handle, |c| match c {
        AnyConfig::GroupInfo(info) => Ok(info.set_name(name)?),
        _ => Err(FfiError::WrongKind(handle.0, "group info")),
    })
}

pub fn group_info_set_description(arena: &HandleArena, handle: Handle, description: &str) -> Result<()> {
    with_config(arena, handle, |c| match c {
        AnyConfig::GroupInfo(info) => Ok(info.set_description(description)?),
        _ => Err(FfiError::WrongKind(handle.0, "group info")),
    })
}

// ---------------------------------------------------------------------------
// Group keys
// ---------------------------------------------------------------------------

/// Run `f` with the key engine and its group objects locked in handle order.
fn with_group<R>(
    arena: &HandleArena,
    keys: Handle,
    info: Handle,
    members: Handle,
    f: impl FnOnce(&mut Keys, &mut swarm_config::GroupInfo, &mut swarm_config::GroupMembers) -> Result<R>,
) -> Result<R> {
    let handles = [keys, info, members];
    let shared = arena.resolve(&handles)?;
    let mut guards = lock_in_order(&handles, &shared)?;
    let [g_keys, g_info, g_members] = &mut guards[..] else {
        return Err(FfiError::Internal("guard count".into()));
    };
    let keys = as_keys(g_keys, keys)?;
    let info = as_group_info(g_info, info)?;
    let members = as_group_members(g_members, members)?;
    f(keys, info, members)
}

pub fn keys_rekey(arena: &HandleArena, keys: Handle, info: Handle, members: Handle) -> Result<Vec<u8>> {
    with_group(arena, keys, info, members, |k, i, m| Ok(k.rekey(i, m)?))
}

pub fn keys_load_message(
    arena: &HandleArena,
    keys: Handle,
    info: Handle,
    members: Handle,
    hash: &str,
    message: &[u8],
    timestamp_ms: i64,
) -> Result<bool> {
    with_group(arena, keys, info, members, |k, i, m| {
        Ok(k.load_key_message(hash, message, timestamp_ms, i, m))
    })
}

pub fn keys_needs_rekey(arena: &HandleArena, keys: Handle, info: Handle, members: Handle) -> Result<bool> {
    with_group(arena, keys, info, members, |k, _, m| Ok(k.needs_rekey(m)))
}

pub fn keys_pending_config(arena: &HandleArena, keys: Handle) -> Result<Option<Vec<u8>>> {
    with_keys(arena, keys, |k| Ok(k.pending_config().map(<[u8]>::to_vec)))
}

pub fn keys_current_generation(arena: &HandleArena, keys: Handle) -> Result<u64> {
    with_keys(arena, keys, |k| Ok(k.current_generation()))
}

pub fn keys_encrypt(arena: &HandleArena, keys: Handle, plaintext: &[u8]) -> Result<Vec<u8>> {
    with_keys(arena, keys, |k| Ok(k.encrypt_message(plaintext)?))
}

pub fn keys_decrypt(arena: &HandleArena, keys: Handle, ciphertext: &[u8]) -> Result<String> {
    let msg = with_keys(arena, keys, |k| Ok(k.decrypt_message(ciphertext)?))?;
    Ok(serde_json::to_string(&DecryptedJson {
        sender: msg.sender.to_hex(),
        plaintext: B64.encode(&msg.plaintext),
    })?)
}

pub fn keys_admin(arena: &HandleArena, keys: Handle) -> Result<bool> {
    with_keys(arena, keys, |k| Ok(k.admin()))
}

/// JSON array of base64 keys, newest first.
pub fn keys_group_keys(arena: &HandleArena, keys: Handle) -> Result<String> {
    let all = with_keys(arena, keys, |k| Ok(k.group_keys()))?;
    let encoded: Vec<String> = all.iter().map(|k| B64.encode(k)).collect();
    Ok(serde_json::to_string(&encoded)?)
}

pub fn keys_pending_key(arena: &HandleArena, keys: Handle) -> Result<Option<Vec<u8>>> {
    with_keys(arena, keys, |k| Ok(k.pending_key().map(|key| key.to_vec())))
}

/// Key message for a JSON array of hex account ids.
pub fn keys_key_supplement(arena: &HandleArena, keys: Handle, ids_json: &str) -> Result<Vec<u8>> {
    let hexes: Vec<String> = serde_json::from_str(ids_json)?;
    let ids = hexes.iter().map(|h| account_id(h)).collect::<Result<Vec<_>>>()?;
    with_keys(arena, keys, |k| Ok(k.key_supplement(&ids)?))
}

pub fn keys_subaccount_token(
    arena: &HandleArena,
    keys: Handle,
    member_hex: &str,
    write: bool,
    delete: bool,
) -> Result<Vec<u8>> {
    let member = account_id(member_hex)?;
    with_keys(arena, keys, |k| Ok(k.swarm_subaccount_token(&member, write, delete)?.to_vec()))
}

pub fn keys_make_subaccount(
    arena: &HandleArena,
    keys: Handle,
    member_hex: &str,
    write: bool,
    delete: bool,
) -> Result<Vec<u8>> {
    let member = account_id(member_hex)?;
    with_keys(arena, keys, |k| Ok(k.swarm_make_subaccount(&member, write, delete)?.to_vec()))
}

/// JSON `{"subaccount", "subaccount_sig", "signature"}`, all base64.
pub fn keys_subaccount_sign(
    arena: &HandleArena,
    keys: Handle,
    request: &[u8],
    signing_value: &[u8],
) -> Result<String> {
    let auth = with_keys(arena, keys, |k| Ok(k.swarm_subaccount_sign(request, signing_value)?))?;
    Ok(serde_json::to_string(&auth)?)
}

pub fn keys_current_hashes(arena: &HandleArena, keys: Handle) -> Result<String> {
    let hashes = with_keys(arena, keys, |k| Ok(k.current_hashes()))?;
    Ok(serde_json::to_string(&hashes)?)
}

pub fn keys_dump(arena: &HandleArena, keys: Handle) -> Result<Vec<u8>> {
    with_keys(arena, keys, |k| Ok(k.dump()?))
}
