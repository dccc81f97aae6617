//! Encrypted direct messages (kind 4).

use crate::error::Result;
use crate::event::{Event, Tag, UnsignedEvent, ENCRYPTED_DIRECT_MESSAGE};
use crate::keys::{Keys, Signer};
use crate::nip19;

/// Content encryption for direct messages, keyed by an ECDH shared secret.
///
/// Implement this with NIP-04 (AES-256-CBC, `base64?iv=base64`) to talk to
/// other clients; no implementation is bundled.
pub trait Cipher: Send + Sync {
    fn encrypt(&self, plaintext: &str, shared_secret: &[u8; 32]) -> Result<String>;
}

/// Build and sign a direct message from `keys` to `receiver`.
///
/// `receiver` may be an `npub` or hex. Any failure deriving the secret,
/// encrypting or signing aborts without producing an event.
pub fn compose_direct_message(
    keys: &Keys,
    receiver: &str,
    plaintext: &str,
    cipher: &dyn Cipher,
) -> Result<Event> {
    let receiver = nip19::decode_or_raw(receiver);
    let secret = keys.shared_secret(&receiver)?;
    let content = cipher.encrypt(plaintext, &secret)?;

    let mut message = UnsignedEvent::new(keys.public_key(), ENCRYPTED_DIRECT_MESSAGE);
    message.tags.push(Tag::new(["p".to_string(), receiver]));
    message.content = content;
    keys.sign(message)
}
