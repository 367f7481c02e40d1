/// Community server URLs.
///
/// A full URL is `{base_url}/{room}?public_key={hex}`. Parsing also accepts
/// the `/r/{room}` path form and base64 public keys. Base URLs and rooms are
/// normalized the same way everywhere a community is used as a key.
use base64::{engine::general_purpose, Engine as _};

use crate::config::base::{ConfigError, Result};

pub const MAX_ROOM_LEN: usize = 64;

const PUBKEY_PARAM: &str = "public_key=";

/// Lowercase, without trailing slashes or the scheme's default port.
pub fn normalize_base_url(base_url: &str) -> String {
    let mut url = base_url.trim_end_matches('/').to_ascii_lowercase();
    for (scheme, port) in [("http://", ":80"), ("https://", ":443")] {
        if url.starts_with(scheme) && url.ends_with(port) {
            url.truncate(url.len() - port.len());
        }
    }
    url
}

pub fn normalize_room(room: &str) -> String {
    room.to_ascii_lowercase()
}

/// `{base_url}/{room}?public_key={hex}` with both parts normalized.
pub fn full_url(base_url: &str, room: &str, pubkey: &[u8; 32]) -> String {
    format!(
        "{}/{}?{}{}",
        normalize_base_url(base_url),
        normalize_room(room),
        PUBKEY_PARAM,
        hex::encode(pubkey)
    )
}

/// Split a full community URL into normalized base URL, room and pubkey.
pub fn parse_full_url(url: &str) -> Result<(String, String, [u8; 32])> {
    let (path, query) = url
        .split_once('?')
        .ok_or_else(|| invalid("missing public_key parameter"))?;
    let pubkey = query
        .split('&')
        .find_map(|param| param.strip_prefix(PUBKEY_PARAM))
        .ok_or_else(|| invalid("missing public_key parameter"))
        .and_then(decode_pubkey)?;

    let lowered = path.to_ascii_lowercase();
    let scheme_len = ["http://", "https://"]
        .iter()
        .find(|s| lowered.starts_with(**s))
        .map(|s| s.len())
        .ok_or_else(|| invalid("scheme must be http or https"))?;
    let host_end = path[scheme_len..]
        .find('/')
        .map(|i| scheme_len + i)
        .ok_or_else(|| invalid("missing room"))?;
    if host_end == scheme_len {
        return Err(invalid("missing host"));
    }

    let room_path = &path[host_end + 1..];
    let room = room_path
        .strip_prefix("r/")
        .unwrap_or(room_path)
        .trim_end_matches('/');
    validate_room(room)?;

    Ok((normalize_base_url(&path[..host_end]), normalize_room(room), pubkey))
}

fn validate_room(room: &str) -> Result<()> {
    if room.is_empty() || room.len() > MAX_ROOM_LEN {
        return Err(invalid("room must be 1-64 characters"));
    }
    if !room
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    {
        return Err(invalid("room may only contain letters, digits, '-' and '_'"));
    }
    Ok(())
}

/// 64 hex digits, or 32 bytes of standard or URL-safe base64.
fn decode_pubkey(encoded: &str) -> Result<[u8; 32]> {
    let bytes = if encoded.len() == 64 {
        hex::decode(encoded).ok()
    } else {
        [
            general_purpose::STANDARD,
            general_purpose::STANDARD_NO_PAD,
            general_purpose::URL_SAFE,
            general_purpose::URL_SAFE_NO_PAD,
        ]
        .iter()
        .find_map(|engine| engine.decode(encoded).ok())
    };
    bytes
        .and_then(|b| <[u8; 32]>::try_from(b).ok())
        .ok_or_else(|| invalid("public_key is not 32 bytes of hex or base64"))
}

fn invalid(reason: &str) -> ConfigError {
    ConfigError::InvalidUrl(reason.to_string())
}
