/// C ABI over the process-wide handle arena.
///
/// Every function returns an `i32` [`ErrorKind`] code (0 on success) and
/// writes results through out-pointers. On failure `sc_last_error()` gives
/// the message for the calling thread. Buffers and strings handed out must
/// be released with `sc_free_buffer()` / `sc_free_string()`.
use once_cell::sync::Lazy;
use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::slice;

use crate::api;
use crate::error::{ErrorKind, FfiError, Result};
use crate::handles::{Handle, HandleArena};

static ARENA: Lazy<HandleArena> = Lazy::new(HandleArena::new);

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

// ─────────────────────── Buffers ───────────────────────

/// Byte buffer returned to the caller. Free with `sc_free_buffer()`.
#[repr(C)]
pub struct SCBuffer {
    pub data: *mut u8,
    pub len: usize,
    pub cap: usize,
}

impl SCBuffer {
    fn from_vec(v: Vec<u8>) -> Self {
        let mut v = std::mem::ManuallyDrop::new(v);
        SCBuffer {
            data: v.as_mut_ptr(),
            len: v.len(),
            cap: v.capacity(),
        }
    }

    fn null() -> Self {
        SCBuffer {
            data: ptr::null_mut(),
            len: 0,
            cap: 0,
        }
    }
}

/// Release a buffer returned by this library.
///
/// # Safety
/// `buf` must come from this library and must not be freed twice.
#[no_mangle]
pub unsafe extern "C" fn sc_free_buffer(buf: SCBuffer) {
    if !buf.data.is_null() {
        drop(Vec::from_raw_parts(buf.data, buf.len, buf.cap));
    }
}

/// Release a string returned by this library.
///
/// # Safety
/// `s` must come from this library and must not be freed twice.
#[no_mangle]
pub unsafe extern "C" fn sc_free_string(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}

// ─────────────────────── Argument helpers ───────────────────────

unsafe fn bytes<'a>(data: *const u8, len: usize, name: &'static str) -> Result<&'a [u8]> {
    if data.is_null() {
        return Err(FfiError::NullPointer(name));
    }
    Ok(slice::from_raw_parts(data, len))
}

/// Null means "not given".
unsafe fn optional_bytes<'a>(data: *const u8, len: usize) -> Option<&'a [u8]> {
    if data.is_null() {
        None
    } else {
        Some(slice::from_raw_parts(data, len))
    }
}

unsafe fn string<'a>(s: *const c_char, name: &'static str) -> Result<&'a str> {
    if s.is_null() {
        return Err(FfiError::NullPointer(name));
    }
    CStr::from_ptr(s)
        .to_str()
        .map_err(|_| FfiError::InvalidArgument(format!("{} is not UTF-8", name)))
}

unsafe fn write_out<T>(out: *mut T, value: T, name: &'static str) -> Result<()> {
    if out.is_null() {
        return Err(FfiError::NullPointer(name));
    }
    ptr::write(out, value);
    Ok(())
}

fn set_last_error(message: String) {
    let message = CString::new(message).unwrap_or_default();
    LAST_ERROR.with(|slot| *slot.borrow_mut() = Some(message));
}

/// Run `f`, translating errors and panics into a result code.
fn run(name: &str, f: impl FnOnce() -> Result<()>) -> i32 {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => ErrorKind::Ok as i32,
        Ok(Err(e)) => {
            log::error!(target: "ffi", "{} failed: {}", name, e);
            let code = e.kind() as i32;
            set_last_error(e.to_string());
            code
        }
        Err(_) => {
            log::error!(target: "ffi", "{} panicked", name);
            set_last_error(format!("{} panicked", name));
            ErrorKind::Internal as i32
        }
    }
}

/// Message of the last failed call on this thread, or null.
/// Free with `sc_free_string()`.
#[no_mangle]
pub extern "C" fn sc_last_error() -> *mut c_char {
    LAST_ERROR.with(|slot| {
        slot.borrow()
            .as_ref()
            .map_or(ptr::null_mut(), |s| s.clone().into_raw())
    })
}

/// Library version string. Free with `sc_free_string()`.
#[no_mangle]
pub extern "C" fn sc_version() -> *mut c_char {
    CString::new(swarm_config::VERSION)
        .unwrap_or_default()
        .into_raw()
}

// ─────────────────────── Lifecycle ───────────────────────

/// Create a user config for `namespace` (storage id).
///
/// # Safety
/// `secret` must point to `secret_len` bytes; `dump` may be null, otherwise
/// it must point to `dump_len` bytes; `out_handle` must be writable.
#[no_mangle]
pub unsafe extern "C" fn sc_config_new_user(
    namespace: i16,
    secret: *const u8,
    secret_len: usize,
    dump: *const u8,
    dump_len: usize,
    out_handle: *mut u64,
) -> i32 {
    run("sc_config_new_user", || {
        let secret = bytes(secret, secret_len, "secret")?;
        let handle = api::config_new_user(&ARENA, namespace, secret, optional_bytes(dump, dump_len))?;
        write_out(out_handle, handle.0, "out_handle")
    })
}

/// Create a group config for `namespace`. `group_secret` null for non-admins.
///
/// # Safety
/// `group_pubkey` must point to 32 bytes; nullable pointers follow
/// `sc_config_new_user`.
#[no_mangle]
pub unsafe extern "C" fn sc_config_new_group(
    namespace: i16,
    group_pubkey: *const u8,
    group_secret: *const u8,
    group_secret_len: usize,
    dump: *const u8,
    dump_len: usize,
    out_handle: *mut u64,
) -> i32 {
    run("sc_config_new_group", || {
        let pubkey = bytes(group_pubkey, 32, "group_pubkey")?;
        let handle = api::config_new_group(
            &ARENA,
            namespace,
            pubkey,
            optional_bytes(group_secret, group_secret_len),
            optional_bytes(dump, dump_len),
        )?;
        write_out(out_handle, handle.0, "out_handle")
    })
}

/// Create the key engine for a group whose info/members handles exist.
///
/// # Safety
/// Pointer rules follow `sc_config_new_group`; `user_secret` must point to
/// `user_secret_len` bytes.
#[no_mangle]
pub unsafe extern "C" fn sc_keys_new(
    user_secret: *const u8,
    user_secret_len: usize,
    group_pubkey: *const u8,
    group_secret: *const u8,
    group_secret_len: usize,
    dump: *const u8,
    dump_len: usize,
    info: u64,
    members: u64,
    out_handle: *mut u64,
) -> i32 {
    run("sc_keys_new", || {
        let handle = api::keys_new(
            &ARENA,
            bytes(user_secret, user_secret_len, "user_secret")?,
            bytes(group_pubkey, 32, "group_pubkey")?,
            optional_bytes(group_secret, group_secret_len),
            optional_bytes(dump, dump_len),
            Handle(info),
            Handle(members),
        )?;
        write_out(out_handle, handle.0, "out_handle")
    })
}

/// Free a config or keys handle.
#[no_mangle]
pub extern "C" fn sc_free(handle: u64) -> i32 {
    run("sc_free", || api::free(&ARENA, Handle(handle)))
}

// ─────────────────────── Config sync ───────────────────────

/// # Safety
/// `out` must be writable.
#[no_mangle]
pub unsafe extern "C" fn sc_config_needs_push(handle: u64, out: *mut bool) -> i32 {
    run("sc_config_needs_push", || {
        let value = api::config_needs_push(&ARENA, Handle(handle))?;
        write_out(out, value, "out")
    })
}

/// # Safety
/// `out` must be writable.
#[no_mangle]
pub unsafe extern "C" fn sc_config_needs_dump(handle: u64, out: *mut bool) -> i32 {
    run("sc_config_needs_dump", || {
        let value = api::config_needs_dump(&ARENA, Handle(handle))?;
        write_out(out, value, "out")
    })
}

/// Push; `out_json` receives `{"seqno", "data" (base64), "obsolete"}`.
///
/// # Safety
/// `out_json` must be writable.
#[no_mangle]
pub unsafe extern "C" fn sc_config_push(handle: u64, out_json: *mut SCBuffer) -> i32 {
    run("sc_config_push", || {
        let json = api::config_push(&ARENA, Handle(handle))?;
        write_out(out_json, SCBuffer::from_vec(json.into_bytes()), "out_json")
    })
}

/// # Safety
/// `hash` must be a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn sc_config_confirm_pushed(handle: u64, seqno: i64, hash: *const c_char) -> i32 {
    run("sc_config_confirm_pushed", || {
        let hash = string(hash, "hash")?;
        api::config_confirm_pushed(&ARENA, Handle(handle), seqno, hash)
    })
}

/// Merge `[{"hash", "data" (base64)}, ...]`; `out_count` receives how many
/// inputs were accepted.
///
/// # Safety
/// `inputs_json` must be a NUL-terminated string; `out_count` writable.
#[no_mangle]
pub unsafe extern "C" fn sc_config_merge(
    handle: u64,
    inputs_json: *const c_char,
    out_count: *mut usize,
) -> i32 {
    run("sc_config_merge", || {
        let inputs = string(inputs_json, "inputs_json")?;
        let count = api::config_merge(&ARENA, Handle(handle), inputs)?;
        write_out(out_count, count, "out_count")
    })
}

/// # Safety
/// `out_json` must be writable.
#[no_mangle]
pub unsafe extern "C" fn sc_config_current_hashes(handle: u64, out_json: *mut SCBuffer) -> i32 {
    run("sc_config_current_hashes", || {
        let json = api::config_current_hashes(&ARENA, Handle(handle))?;
        write_out(out_json, SCBuffer::from_vec(json.into_bytes()), "out_json")
    })
}

/// # Safety
/// `out_dump` must be writable.
#[no_mangle]
pub unsafe extern "C" fn sc_config_dump(handle: u64, out_dump: *mut SCBuffer) -> i32 {
    run("sc_config_dump", || {
        let dump = api::config_dump(&ARENA, Handle(handle))?;
        write_out(out_dump, SCBuffer::from_vec(dump), "out_dump")
    })
}

/// # Safety
/// `out` must be writable.
#[no_mangle]
pub unsafe extern "C" fn sc_config_is_dirty(handle: u64, out: *mut bool) -> i32 {
    run("sc_config_is_dirty", || {
        let value = api::config_is_dirty(&ARENA, Handle(handle))?;
        write_out(out, value, "out")
    })
}

/// Encryption domain name of the object's namespace, as UTF-8 bytes.
///
/// # Safety
/// `out_domain` must be writable.
#[no_mangle]
pub unsafe extern "C" fn sc_config_encryption_domain(handle: u64, out_domain: *mut SCBuffer) -> i32 {
    run("sc_config_encryption_domain", || {
        let domain = api::config_encryption_domain(&ARENA, Handle(handle))?;
        write_out(out_domain, SCBuffer::from_vec(domain.into_bytes()), "out_domain")
    })
}

// ─────────────────────── Document edits ───────────────────────

/// # Safety
/// `name` must be a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn sc_profile_set_name(handle: u64, name: *const c_char) -> i32 {
    run("sc_profile_set_name", || {
        api::profile_set_name(&ARENA, Handle(handle), string(name, "name")?)
    })
}

/// # Safety
/// `account_id` (66 hex chars) and `name` must be NUL-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn sc_contacts_set_name(
    handle: u64,
    account_id: *const c_char,
    name: *const c_char,
) -> i32 {
    run("sc_contacts_set_name", || {
        api::contacts_set_name(
            &ARENA,
            Handle(handle),
            string(account_id, "account_id")?,
            string(name, "name")?,
        )
    })
}

/// # Safety
/// `account_id` and `nickname` must be NUL-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn sc_contacts_set_nickname(
    handle: u64,
    account_id: *const c_char,
    nickname: *const c_char,
) -> i32 {
    run("sc_contacts_set_nickname", || {
        api::contacts_set_nickname(
            &ARENA,
            Handle(handle),
            string(account_id, "account_id")?,
            string(nickname, "nickname")?,
        )
    })
}

/// `out_erased` is false if there was no such contact.
///
/// # Safety
/// `account_id` must be a NUL-terminated string; `out_erased` writable.
#[no_mangle]
pub unsafe extern "C" fn sc_contacts_erase(handle: u64, account_id: *const c_char, out_erased: *mut bool) -> i32 {
    run("sc_contacts_erase", || {
        let erased = api::contacts_erase(&ARENA, Handle(handle), string(account_id, "account_id")?)?;
        write_out(out_erased, erased, "out_erased")
    })
}

/// Add or update a community from `{base_url}/{room}?public_key={key}`.
///
/// # Safety
/// `full_url` must be a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn sc_user_groups_set_community(handle: u64, full_url: *const c_char) -> i32 {
    run("sc_user_groups_set_community", || {
        api::user_groups_set_community(&ARENA, Handle(handle), string(full_url, "full_url")?)
    })
}

/// # Safety
/// `name` must be a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn sc_group_info_set_name(handle: u64, name: *const c_char) -> i32 {
    run("sc_group_info_set_name", || {
        api::group_info_set_name(&ARENA, Handle(handle), string(name, "name")?)
    })
}

/// # Safety
/// `description` must be a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn sc_group_info_set_description(handle: u64, description: *const c_char) -> i32 {
    run("sc_group_info_set_description", || {
        api::group_info_set_description(&ARENA, Handle(handle), string(description, "description")?)
    })
}

// ─────────────────────── Group keys ───────────────────────

/// Rotate the group key. `out_message` receives the key message to store.
///
/// # Safety
/// `out_message` must be writable.
#[no_mangle]
pub unsafe extern "C" fn sc_keys_rekey(
    keys: u64,
    info: u64,
    members: u64,
    out_message: *mut SCBuffer,
) -> i32 {
    run("sc_keys_rekey", || {
        let message = api::keys_rekey(&ARENA, Handle(keys), Handle(info), Handle(members))?;
        write_out(out_message, SCBuffer::from_vec(message), "out_message")
    })
}

/// Load a stored key message; `out_loaded` is true if a new key was installed.
///
/// # Safety
/// `hash` NUL-terminated, `message` points to `message_len` bytes,
/// `out_loaded` writable.
#[no_mangle]
pub unsafe extern "C" fn sc_keys_load_message(
    keys: u64,
    info: u64,
    members: u64,
    hash: *const c_char,
    message: *const u8,
    message_len: usize,
    timestamp_ms: i64,
    out_loaded: *mut bool,
) -> i32 {
    run("sc_keys_load_message", || {
        let loaded = api::keys_load_message(
            &ARENA,
            Handle(keys),
            Handle(info),
            Handle(members),
            string(hash, "hash")?,
            bytes(message, message_len, "message")?,
            timestamp_ms,
        )?;
        write_out(out_loaded, loaded, "out_loaded")
    })
}

/// # Safety
/// `out` must be writable.
#[no_mangle]
pub unsafe extern "C" fn sc_keys_needs_rekey(keys: u64, info: u64, members: u64, out: *mut bool) -> i32 {
    run("sc_keys_needs_rekey", || {
        let value = api::keys_needs_rekey(&ARENA, Handle(keys), Handle(info), Handle(members))?;
        write_out(out, value, "out")
    })
}

/// Pending key message, or a null buffer if there is none.
///
/// # Safety
/// `out_message` must be writable.
#[no_mangle]
pub unsafe extern "C" fn sc_keys_pending_config(keys: u64, out_message: *mut SCBuffer) -> i32 {
    run("sc_keys_pending_config", || {
        let buf = match api::keys_pending_config(&ARENA, Handle(keys))? {
            Some(message) => SCBuffer::from_vec(message),
            None => SCBuffer::null(),
        };
        write_out(out_message, buf, "out_message")
    })
}

/// # Safety
/// `out` must be writable.
#[no_mangle]
pub unsafe extern "C" fn sc_keys_current_generation(keys: u64, out: *mut u64) -> i32 {
    run("sc_keys_current_generation", || {
        let generation = api::keys_current_generation(&ARENA, Handle(keys))?;
        write_out(out, generation, "out")
    })
}

/// # Safety
/// `plaintext` points to `plaintext_len` bytes; `out_ciphertext` writable.
#[no_mangle]
pub unsafe extern "C" fn sc_keys_encrypt(
    keys: u64,
    plaintext: *const u8,
    plaintext_len: usize,
    out_ciphertext: *mut SCBuffer,
) -> i32 {
    run("sc_keys_encrypt", || {
        let plaintext = bytes(plaintext, plaintext_len, "plaintext")?;
        let sealed = api::keys_encrypt(&ARENA, Handle(keys), plaintext)?;
        write_out(out_ciphertext, SCBuffer::from_vec(sealed), "out_ciphertext")
    })
}

/// Decrypt; `out_json` receives `{"sender" (hex), "plaintext" (base64)}`.
///
/// # Safety
/// `ciphertext` points to `ciphertext_len` bytes; `out_json` writable.
#[no_mangle]
pub unsafe extern "C" fn sc_keys_decrypt(
    keys: u64,
    ciphertext: *const u8,
    ciphertext_len: usize,
    out_json: *mut SCBuffer,
) -> i32 {
    run("sc_keys_decrypt", || {
        let ciphertext = bytes(ciphertext, ciphertext_len, "ciphertext")?;
        let json = api::keys_decrypt(&ARENA, Handle(keys), ciphertext)?;
        write_out(out_json, SCBuffer::from_vec(json.into_bytes()), "out_json")
    })
}

/// # Safety
/// `out` must be writable.
#[no_mangle]
pub unsafe extern "C" fn sc_keys_admin(keys: u64, out: *mut bool) -> i32 {
    run("sc_keys_admin", || {
        let value = api::keys_admin(&ARENA, Handle(keys))?;
        write_out(out, value, "out")
    })
}

/// `out_json` receives the usable keys, newest first, as base64 strings.
///
/// # Safety
/// `out_json` must be writable.
#[no_mangle]
pub unsafe extern "C" fn sc_keys_group_keys(keys: u64, out_json: *mut SCBuffer) -> i32 {
    run("sc_keys_group_keys", || {
        let json = api::keys_group_keys(&ARENA, Handle(keys))?;
        write_out(out_json, SCBuffer::from_vec(json.into_bytes()), "out_json")
    })
}

/// Key of an unconfirmed rekey, or a null buffer if there is none.
///
/// # Safety
/// `out_key` must be writable.
#[no_mangle]
pub unsafe extern "C" fn sc_keys_pending_key(keys: u64, out_key: *mut SCBuffer) -> i32 {
    run("sc_keys_pending_key", || {
        let buf = match api::keys_pending_key(&ARENA, Handle(keys))? {
            Some(key) => SCBuffer::from_vec(key),
            None => SCBuffer::null(),
        };
        write_out(out_key, buf, "out_key")
    })
}

/// Key message giving the current key to `["<hex account id>", ...]`.
///
/// # Safety
/// `ids_json` must be a NUL-terminated string; `out_message` writable.
#[no_mangle]
pub unsafe extern "C" fn sc_keys_key_supplement(keys: u64, ids_json: *const c_char, out_message: *mut SCBuffer) -> i32 {
    run("sc_keys_key_supplement", || {
        let message = api::keys_key_supplement(&ARENA, Handle(keys), string(ids_json, "ids_json")?)?;
        write_out(out_message, SCBuffer::from_vec(message), "out_message")
    })
}

/// Unsigned sub-account token for `member`.
///
/// # Safety
/// `member` must be a NUL-terminated string; `out_token` writable.
#[no_mangle]
pub unsafe extern "C" fn sc_keys_subaccount_token(
    keys: u64,
    member: *const c_char,
    write: bool,
    delete: bool,
    out_token: *mut SCBuffer,
) -> i32 {
    run("sc_keys_subaccount_token", || {
        let token = api::keys_subaccount_token(&ARENA, Handle(keys), string(member, "member")?, write, delete)?;
        write_out(out_token, SCBuffer::from_vec(token), "out_token")
    })
}

/// Admin-signed sub-account credential for `member`.
///
/// # Safety
/// `member` must be a NUL-terminated string; `out_credential` writable.
#[no_mangle]
pub unsafe extern "C" fn sc_keys_make_subaccount(
    keys: u64,
    member: *const c_char,
    write: bool,
    delete: bool,
    out_credential: *mut SCBuffer,
) -> i32 {
    run("sc_keys_make_subaccount", || {
        let credential = api::keys_make_subaccount(&ARENA, Handle(keys), string(member, "member")?, write, delete)?;
        write_out(out_credential, SCBuffer::from_vec(credential), "out_credential")
    })
}

/// Sign a storage request; `out_json` receives
/// `{"subaccount", "subaccount_sig", "signature"}` in base64.
///
/// # Safety
/// `request` and `credential` point to their lengths in bytes; `out_json`
/// writable.
#[no_mangle]
pub unsafe extern "C" fn sc_keys_subaccount_sign(
    keys: u64,
    request: *const u8,
    request_len: usize,
    credential: *const u8,
    credential_len: usize,
    out_json: *mut SCBuffer,
) -> i32 {
    run("sc_keys_subaccount_sign", || {
        let json = api::keys_subaccount_sign(
            &ARENA,
            Handle(keys),
            bytes(request, request_len, "request")?,
            bytes(credential, credential_len, "credential")?,
        )?;
        write_out(out_json, SCBuffer::from_vec(json.into_bytes()), "out_json")
    })
}

/// # Safety
/// `out_json` must be writable.
#[no_mangle]
pub unsafe extern "C" fn sc_keys_current_hashes(keys: u64, out_json: *mut SCBuffer) -> i32 {
    run("sc_keys_current_hashes", || {
        let json = api::keys_current_hashes(&ARENA, Handle(keys))?;
        write_out(out_json, SCBuffer::from_vec(json.into_bytes()), "out_json")
    })
}

/// # Safety
/// `out_dump` must be writable.
#[no_mangle]
pub unsafe extern "C" fn sc_keys_dump(keys: u64, out_dump: *mut SCBuffer) -> i32 {
    run("sc_keys_dump", || {
        let dump = api::keys_dump(&ARENA, Handle(keys))?;
        write_out(out_dump, SCBuffer::from_vec(dump), "out_dump")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarm_config::crypto::generate_keypair;
    use swarm_config::Namespace;

    unsafe fn take(buf: SCBuffer) -> Vec<u8> {
        let out = slice::from_raw_parts(buf.data, buf.len).to_vec();
        sc_free_buffer(buf);
        out
    }

    #[test]
    fn test_push_and_merge_through_c_abi() {
        let (_, seed) = generate_keypair();
        unsafe {
            let mut a = 0u64;
            let mut b = 0u64;
            let ns = Namespace::UserProfile.id();
            assert_eq!(sc_config_new_user(ns, seed.as_ptr(), 32, ptr::null(), 0, &mut a), 0);
            assert_eq!(sc_config_new_user(ns, seed.as_ptr(), 32, ptr::null(), 0, &mut b), 0);
            assert_ne!(a, b);

            let mut buf = SCBuffer::null();
            assert_eq!(sc_config_push(a, &mut buf), 0);
            let pushed: api::PushJson = serde_json::from_slice(&take(buf)).unwrap();
            let hash = CString::new("h0").unwrap();
            assert_eq!(sc_config_confirm_pushed(a, pushed.seqno, hash.as_ptr()), 0);

            let inputs =
                CString::new(format!(r#"[{{"hash":"h0","data":"{}"}}]"#, pushed.data)).unwrap();
            let mut count = 0usize;
            assert_eq!(sc_config_merge(b, inputs.as_ptr(), &mut count), 0);
            assert_eq!(count, 1);

            let mut needs_push = true;
            assert_eq!(sc_config_needs_push(b, &mut needs_push), 0);
            assert!(!needs_push);

            assert_eq!(sc_free(a), 0);
            assert_eq!(sc_free(b), 0);
        }
    }

    #[test]
    fn test_edit_and_key_queries_through_c_abi() {
        let (_, seed) = generate_keypair();
        let (group_pub, group_seed) = generate_keypair();
        unsafe {
            let mut profile = 0u64;
            let ns = Namespace::UserProfile.id();
            assert_eq!(sc_config_new_user(ns, seed.as_ptr(), 32, ptr::null(), 0, &mut profile), 0);
            let name = CString::new("Alice").unwrap();
            assert_eq!(sc_profile_set_name(profile, name.as_ptr()), 0);
            assert_eq!(sc_profile_set_name(profile, ptr::null()), ErrorKind::NullPointer as i32);
            let mut dirty = false;
            assert_eq!(sc_config_is_dirty(profile, &mut dirty), 0);
            assert!(dirty);
            let mut buf = SCBuffer::null();
            assert_eq!(sc_config_encryption_domain(profile, &mut buf), 0);
            assert_eq!(take(buf), Namespace::UserProfile.encryption_domain().as_bytes());

            let (mut info, mut members, mut keys) = (0u64, 0u64, 0u64);
            let info_ns = Namespace::GroupInfo.id();
            let members_ns = Namespace::GroupMembers.id();
            let gp = group_pub.as_ptr();
            let gs = group_seed.as_ptr();
            assert_eq!(sc_config_new_group(info_ns, gp, gs, 32, ptr::null(), 0, &mut info), 0);
            assert_eq!(sc_config_new_group(members_ns, gp, gs, 32, ptr::null(), 0, &mut members), 0);
            assert_eq!(
                sc_keys_new(seed.as_ptr(), 32, gp, gs, 32, ptr::null(), 0, info, members, &mut keys),
                0
            );
            let mut admin = false;
            assert_eq!(sc_keys_admin(keys, &mut admin), 0);
            assert!(admin);

            let mut pending = SCBuffer::null();
            assert_eq!(sc_keys_pending_key(keys, &mut pending), 0);
            assert!(pending.data.is_null());
            let mut message = SCBuffer::null();
            assert_eq!(sc_keys_rekey(keys, info, members, &mut message), 0);
            take(message);
            assert_eq!(sc_keys_pending_key(keys, &mut pending), 0);
            assert_eq!(take(pending).len(), 32);

            for h in [profile, info, members, keys] {
                assert_eq!(sc_free(h), 0);
            }
        }
    }

    #[test]
    fn test_errors_set_last_error() {
        unsafe {
            let mut handle = 0u64;
            let code = sc_config_new_user(2, ptr::null(), 0, ptr::null(), 0, &mut handle);
            assert_eq!(code, ErrorKind::NullPointer as i32);
            let msg = sc_last_error();
            assert!(!msg.is_null());
            assert!(CStr::from_ptr(msg).to_str().unwrap().contains("secret"));
            sc_free_string(msg);

            assert_eq!(sc_free(u64::MAX), ErrorKind::InvalidHandle as i32);
            let mut out = false;
            assert_eq!(
                sc_config_needs_push(u64::MAX, &mut out),
                ErrorKind::InvalidHandle as i32
            );
        }
    }

    #[test]
    fn test_version_string() {
        let v = sc_version();
        let s = unsafe { CStr::from_ptr(v) }.to_str().unwrap().to_string();
        unsafe { sc_free_string(v) };
        assert_eq!(s, swarm_config::VERSION);
    }
}
