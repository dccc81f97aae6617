//! NIP-19 bech32 identifiers (`npub`, `nsec`, `note`).
//!
//! Encode paths fall back to returning the input untouched when it cannot be
//! encoded, so callers can pass either form. Decoding used for profile
//! resolution is strict.

use bech32::{Bech32, Hrp};

use crate::error::{Error, Result};

const NPUB_HRP: &str = "npub";
const NSEC_HRP: &str = "nsec";
const NOTE_HRP: &str = "note";

/// A decoded NIP-19 entity, each carrying a 32-byte value as lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Nip19Entity {
    Pubkey(String),
    SecretKey(String),
    Note(String),
}

impl Nip19Entity {
    /// The raw hex payload regardless of entity type.
    pub fn into_hex(self) -> String {
        match self {
            Self::Pubkey(hex) | Self::SecretKey(hex) | Self::Note(hex) => hex,
        }
    }
}

/// Decode an `npub`, `nsec` or `note` string.
pub fn decode(identifier: &str) -> Result<Nip19Entity> {
    let (hrp, data) = bech32::decode(identifier.trim())
        .map_err(|e| Error::InvalidIdentifier(format!("{identifier}: {e}")))?;
    if data.len() != 32 {
        return Err(Error::InvalidIdentifier(format!(
            "{identifier}: expected 32 bytes, got {}",
            data.len()
        )));
    }
    let value = hex::encode(data);
    match hrp.as_str() {
        NPUB_HRP => Ok(Nip19Entity::Pubkey(value)),
        NSEC_HRP => Ok(Nip19Entity::SecretKey(value)),
        NOTE_HRP => Ok(Nip19Entity::Note(value)),
        other => Err(Error::InvalidIdentifier(format!(
            "{identifier}: unsupported prefix {other}"
        ))),
    }
}

/// Decode an author reference to a hex public key.
///
/// Accepts an `npub` or a 64-character hex key. Anything else, including a
/// well-formed `nsec` or `note`, is an invalid identifier.
pub fn decode_public_key(identifier: &str) -> Result<String> {
    let identifier = identifier.trim();
    if is_hex32(identifier) {
        return Ok(identifier.to_ascii_lowercase());
    }
    match decode(identifier)? {
        Nip19Entity::Pubkey(hex) => Ok(hex),
        _ => Err(Error::InvalidIdentifier(format!(
            "{identifier}: not a public key"
        ))),
    }
}

/// Decode any supported entity, or return the input unchanged when it is not
/// valid bech32 (already raw hex, most likely).
pub fn decode_or_raw(identifier: &str) -> String {
    decode(identifier)
        .map(Nip19Entity::into_hex)
        .unwrap_or_else(|_| identifier.to_string())
}

pub fn encode_npub(pubkey_hex: &str) -> Result<String> {
    encode(NPUB_HRP, pubkey_hex)
}

pub fn encode_nsec(secret_hex: &str) -> Result<String> {
    encode(NSEC_HRP, secret_hex)
}

pub fn encode_note(event_id_hex: &str) -> Result<String> {
    encode(NOTE_HRP, event_id_hex)
}

/// [`encode_npub`], or the input if it cannot be encoded.
pub fn encode_npub_or_raw(pubkey_hex: &str) -> String {
    encode_npub(pubkey_hex).unwrap_or_else(|_| pubkey_hex.to_string())
}

/// [`encode_nsec`], or the input if it cannot be encoded.
pub fn encode_nsec_or_raw(secret_hex: &str) -> String {
    encode_nsec(secret_hex).unwrap_or_else(|_| secret_hex.to_string())
}

/// [`encode_note`], or the input if it cannot be encoded.
pub fn encode_note_or_raw(event_id_hex: &str) -> String {
    encode_note(event_id_hex).unwrap_or_else(|_| event_id_hex.to_string())
}

fn encode(hrp: &str, value_hex: &str) -> Result<String> {
    if !is_hex32(value_hex) {
        return Err(Error::InvalidIdentifier(format!(
            "{value_hex}: expected 64 hex characters"
        )));
    }
    let data = hex::decode(value_hex).map_err(|e| Error::InvalidIdentifier(e.to_string()))?;
    let hrp = Hrp::parse(hrp).map_err(|e| Error::InvalidIdentifier(e.to_string()))?;
    bech32::encode::<Bech32>(hrp, &data).map_err(|e| Error::InvalidIdentifier(e.to_string()))
}

fn is_hex32(s: &str) -> bool {
    s.len() == 64 && s.chars().all(|c| c.is_ascii_hexdigit())
}
