//! NIP-57 zap receipts.
//!
//! A zap request (kind 9734) reaches the service through an LNURL callback.
//! Once its invoice is paid, the service publishes a zap receipt (kind 9735)
//! to the relays the request asked for, plus its own defaults.

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::event::{append_unique, Event, Tag, UnsignedEvent, ZAP_RECEIPT};
use crate::keys::Signer;

/// Build and sign the receipt acknowledging `zap_request`, paid via `bolt11`.
///
/// Tags, in order: the request's first `p` tag, `["bolt11", invoice]`,
/// `["description", <request JSON>]`, then the request's first `e` tag if it
/// has one. Nothing is signed when the `p` tag is missing.
pub fn compose_receipt<S>(zap_request: &Event, bolt11: &str, signer: &S) -> Result<Event>
where
    S: Signer + ?Sized,
{
    let payee = zap_request
        .first_tag("p")
        .filter(|tag| !tag.values().is_empty())
        .ok_or(Error::MissingTag("p"))?;
    let description = serde_json::to_string(zap_request)?;

    let mut receipt = UnsignedEvent::new(signer.public_key(), ZAP_RECEIPT);
    receipt.tags = vec![
        payee.clone(),
        Tag::new(["bolt11", bolt11]),
        Tag::new(["description".to_string(), description]),
    ];
    if let Some(target) = zap_request.first_tag("e") {
        append_unique(&mut receipt.tags, target.clone());
    }

    let receipt = signer.sign(receipt)?;
    tracing::debug!(receipt = %receipt.id, request = %zap_request.id, "zap receipt signed");
    Ok(receipt)
}

/// Relays the zap request asked the receipt to be published to.
///
/// Empty when there is no `relays` tag; callers fall back to their defaults.
pub fn extract_relay_hints(zap_request: &Event) -> Vec<String> {
    zap_request
        .first_tag("relays")
        .map(|tag| tag.values().to_vec())
        .unwrap_or_default()
}

/// Hex SHA-256 of a serialized zap request, the value a zap invoice's
/// description hash commits to.
pub fn description_hash(zap_request_json: &str) -> String {
    hex::encode(Sha256::digest(zap_request_json.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ZAP_REQUEST;
    use crate::keys::Keys;

    fn zap_request(tags: Vec<Tag>) -> Event {
        Event {
            id: "de".repeat(32),
            pubkey: "ab".repeat(32),
            kind: ZAP_REQUEST,
            created_at: 1_700_000_000,
            tags,
            content: "great post".into(),
            sig: "00".repeat(64),
        }
    }

    fn standard_request() -> Event {
        zap_request(vec![
            Tag::new(["p", "abc"]),
            Tag::new(["e", "def"]),
            Tag::new(["relays", "wss://x", "wss://y"]),
        ])
    }

    fn count(ev: &Event, name: &str) -> usize {
        ev.tags.iter().filter(|t| t.name() == Some(name)).count()
    }

    struct BrokenSigner;

    impl Signer for BrokenSigner {
        fn public_key(&self) -> String {
            "ab".repeat(32)
        }

        fn sign(&self, _event: UnsignedEvent) -> Result<Event> {
            Err(Error::Signing("hardware key unplugged".into()))
        }
    }

    #[test]
    fn receipt_carries_required_tags() {
        let keys = Keys::generate();
        let request = standard_request();

        let receipt = compose_receipt(&request, "lnbc1...", &keys).unwrap();

        assert_eq!(receipt.kind, ZAP_RECEIPT);
        assert_eq!(receipt.pubkey, keys.public_key_hex());
        assert_eq!(count(&receipt, "p"), 1);
        assert_eq!(receipt.first_tag("p"), Some(&Tag::new(["p", "abc"])));
        assert_eq!(count(&receipt, "bolt11"), 1);
        assert_eq!(
            receipt.first_tag("bolt11"),
            Some(&Tag::new(["bolt11", "lnbc1..."]))
        );
        assert_eq!(count(&receipt, "description"), 1);
        let embedded: Event =
            serde_json::from_str(&receipt.first_tag("description").unwrap().values()[0]).unwrap();
        assert_eq!(embedded, request);
        assert_eq!(count(&receipt, "e"), 1);
        assert_eq!(receipt.first_tag("e"), Some(&Tag::new(["e", "def"])));
        assert_eq!(count(&receipt, "relays"), 0);
        receipt.verify().unwrap();
    }

    #[test]
    fn receipt_without_target_has_no_e_tag() {
        let request = zap_request(vec![Tag::new(["p", "abc"])]);
        let receipt = compose_receipt(&request, "lnbc1", &Keys::generate()).unwrap();
        assert_eq!(receipt.tags.len(), 3);
        assert_eq!(count(&receipt, "e"), 0);
    }

    #[test]
    fn only_first_p_and_e_are_copied() {
        let request = zap_request(vec![
            Tag::new(["p", "first"]),
            Tag::new(["p", "second"]),
            Tag::new(["e", "one"]),
            Tag::new(["e", "two"]),
        ]);
        let receipt = compose_receipt(&request, "lnbc1", &Keys::generate()).unwrap();
        assert_eq!(receipt.first_tag("p").unwrap().values(), ["first".to_string()]);
        assert_eq!(count(&receipt, "e"), 1);
        assert_eq!(receipt.first_tag("e").unwrap().values(), ["one".to_string()]);
    }

    #[test]
    fn missing_p_tag_is_decode_error() {
        let request = zap_request(vec![Tag::new(["e", "def"])]);
        let err = compose_receipt(&request, "lnbc1", &Keys::generate()).unwrap_err();
        assert!(matches!(err, Error::MissingTag("p")));
        assert_eq!(err.class(), crate::error::ErrorClass::ProtocolDecode);

        let bare = zap_request(vec![Tag::new(["p"])]);
        assert!(compose_receipt(&bare, "lnbc1", &Keys::generate()).is_err());
    }

    #[test]
    fn signer_failure_aborts() {
        let err = compose_receipt(&standard_request(), "lnbc1", &BrokenSigner).unwrap_err();
        assert_eq!(err.class(), crate::error::ErrorClass::SigningFailure);
    }

    #[test]
    fn relay_hints_follow_tag_name() {
        assert_eq!(
            extract_relay_hints(&standard_request()),
            vec!["wss://x".to_string(), "wss://y".to_string()]
        );
        assert!(extract_relay_hints(&zap_request(vec![Tag::new(["p", "abc"])])).is_empty());
        assert!(extract_relay_hints(&zap_request(vec![Tag::new(["relays"])])).is_empty());
    }

    #[test]
    fn description_hash_is_sha256_hex() {
        assert_eq!(
            description_hash(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        let json = serde_json::to_string(&standard_request()).unwrap();
        assert_eq!(description_hash(&json).len(), 64);
    }
}
