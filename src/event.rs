//! Nostr event model.

use secp256k1::{schnorr::Signature, Message, XOnlyPublicKey, SECP256K1};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Profile metadata (`set_metadata`).
pub const METADATA: u32 = 0;
/// NIP-04 encrypted direct message.
pub const ENCRYPTED_DIRECT_MESSAGE: u32 = 4;
/// NIP-57 zap request, delivered to the payee's LNURL callback.
pub const ZAP_REQUEST: u32 = 9734;
/// NIP-57 zap receipt, published after the invoice is paid.
pub const ZAP_RECEIPT: u32 = 9735;

/// Wrapper for a Nostr tag expressed as an array of strings.
///
/// Tags appear as small arrays where the first element denotes the type and the
/// following elements hold data. The ones this crate reads or writes:
///
/// - `p` – references another author's public key
/// - `e` – links to another event ID
/// - `relays` – relay hints for where a zap receipt should be published
/// - `bolt11` – the paid Lightning invoice
/// - `description` – the serialized zap request a receipt acknowledges
///
/// Each tag is stored verbatim so uncommon or custom tags are preserved. For
/// example, a `["p", "abc"]` tag from the protocol is represented as
/// `Tag(vec!["p".into(), "abc".into()])`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Tag(pub Vec<String>);

impl Tag {
    /// Build a tag from its name followed by its values.
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Tag(fields.into_iter().map(Into::into).collect())
    }

    /// The discriminator, e.g. `"p"`.
    pub fn name(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    /// Everything after the discriminator.
    pub fn values(&self) -> &[String] {
        self.0.get(1..).unwrap_or_default()
    }
}

/// Return the first tag named `name`. Protocol lookups always take the first
/// match, so tag order matters.
pub fn first_tag<'a>(tags: &'a [Tag], name: &str) -> Option<&'a Tag> {
    tags.iter().find(|tag| tag.name() == Some(name))
}

/// Append `tag` unless an identical tag is already present.
///
/// Returns `true` when the tag was appended.
pub fn append_unique(tags: &mut Vec<Tag>, tag: Tag) -> bool {
    if tags.contains(&tag) {
        return false;
    }
    tags.push(tag);
    true
}

/// Signed Nostr event. Immutable once signed; identity is the `id`.
///
/// ```json
/// {
///   "id": "aa11",
///   "pubkey": "3bf0...",
///   "kind": 9735,
///   "created_at": 1700000000,
///   "tags": [["p", "abc"], ["bolt11", "lnbc1..."]],
///   "content": "",
///   "sig": "deadbeef"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Event {
    /// Event identifier (hex of SHA-256 hash).
    pub id: String,
    /// Author public key (hex, x-only).
    pub pubkey: String,
    /// Kind number, e.g. `0` or `9735`.
    pub kind: u32,
    /// Unix timestamp of creation.
    pub created_at: u64,
    /// Ordered tags.
    pub tags: Vec<Tag>,
    /// Event content body.
    pub content: String,
    /// Schnorr signature over the event hash.
    pub sig: String,
}

impl Event {
    /// First tag named `name`.
    pub fn first_tag(&self, name: &str) -> Option<&Tag> {
        first_tag(&self.tags, name)
    }

    /// Recompute the canonical hash from the signed fields.
    pub fn hash(&self) -> Result<[u8; 32]> {
        canonical_hash(&self.pubkey, self.created_at, self.kind, &self.tags, &self.content)
    }

    /// Verify the event's ID and Schnorr signature.
    pub fn verify(&self) -> Result<()> {
        let hash = self.hash()?;
        if hex::encode(hash) != self.id {
            return Err(Error::InvalidEvent("id mismatch".into()));
        }
        let sig = hex::decode(&self.sig)
            .ok()
            .and_then(|bytes| Signature::from_slice(&bytes).ok())
            .ok_or_else(|| Error::InvalidEvent("malformed signature".into()))?;
        let pk = hex::decode(&self.pubkey)
            .ok()
            .and_then(|bytes| XOnlyPublicKey::from_slice(&bytes).ok())
            .ok_or_else(|| Error::InvalidEvent("malformed pubkey".into()))?;
        let msg = Message::from_digest(hash);
        SECP256K1
            .verify_schnorr(&sig, &msg, &pk)
            .map_err(|e| Error::InvalidEvent(format!("bad signature: {e}")))
    }
}

/// Event fields before signing. Produced in memory and consumed by a
/// [`Signer`](crate::keys::Signer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedEvent {
    pub pubkey: String,
    pub created_at: u64,
    pub kind: u32,
    pub tags: Vec<Tag>,
    pub content: String,
}

impl UnsignedEvent {
    /// Start an event of `kind` authored by `pubkey`, stamped with the current time.
    pub fn new(pubkey: impl Into<String>, kind: u32) -> Self {
        Self {
            pubkey: pubkey.into(),
            created_at: unix_now(),
            kind,
            tags: vec![],
            content: String::new(),
        }
    }

    pub fn hash(&self) -> Result<[u8; 32]> {
        canonical_hash(&self.pubkey, self.created_at, self.kind, &self.tags, &self.content)
    }

    /// Attach the computed id and signature.
    pub(crate) fn into_signed(self, id: String, sig: String) -> Event {
        Event {
            id,
            pubkey: self.pubkey,
            kind: self.kind,
            created_at: self.created_at,
            tags: self.tags,
            content: self.content,
            sig,
        }
    }
}

impl From<Event> for UnsignedEvent {
    fn from(ev: Event) -> Self {
        Self {
            pubkey: ev.pubkey,
            created_at: ev.created_at,
            kind: ev.kind,
            tags: ev.tags,
            content: ev.content,
        }
    }
}

/// NIP-01 canonical serialization hash.
fn canonical_hash(
    pubkey: &str,
    created_at: u64,
    kind: u32,
    tags: &[Tag],
    content: &str,
) -> Result<[u8; 32]> {
    let arr = serde_json::json!([0, pubkey, created_at, kind, tags, content]);
    let data = serde_json::to_vec(&arr)?;
    Ok(Sha256::digest(&data).into())
}

pub(crate) fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
