//! Service key material and event signing.

use std::fmt;

use secp256k1::{ecdh, Keypair, Message, Parity, XOnlyPublicKey, SECP256K1};

use crate::error::{Error, Result};
use crate::event::{Event, UnsignedEvent};
use crate::nip19::{self, Nip19Entity};

/// Anything able to turn an [`UnsignedEvent`] into a signed [`Event`].
///
/// The composer and service only see this trait, so tests can swap in a
/// signer that fails on demand.
pub trait Signer: Send + Sync {
    /// Hex x-only public key events will be authored under.
    fn public_key(&self) -> String;

    /// Compute the id and signature. `event.pubkey` is overwritten with
    /// [`Signer::public_key`].
    fn sign(&self, event: UnsignedEvent) -> Result<Event>;
}

/// A secp256k1 keypair used for BIP-340 signatures.
#[derive(Clone)]
pub struct Keys {
    keypair: Keypair,
    public_key: XOnlyPublicKey,
}

impl Keys {
    /// Parse secret key material given as `nsec` or 64-character hex.
    pub fn parse(secret: &str) -> Result<Self> {
        let secret = secret.trim();
        let hex_secret = match nip19::decode(secret) {
            Ok(Nip19Entity::SecretKey(hex)) => hex,
            Ok(_) => return Err(Error::Signing("expected a secret key".into())),
            Err(_) => secret.to_string(),
        };
        let bytes = hex::decode(&hex_secret)
            .map_err(|e| Error::Signing(format!("secret key is not hex: {e}")))?;
        let keypair = Keypair::from_seckey_slice(SECP256K1, &bytes)
            .map_err(|e| Error::Signing(format!("invalid secret key: {e}")))?;
        Ok(Self::from_keypair(keypair))
    }

    /// Fresh random keys.
    pub fn generate() -> Self {
        let (secret, _) = SECP256K1.generate_keypair(&mut rand::thread_rng());
        Self::from_keypair(Keypair::from_secret_key(SECP256K1, &secret))
    }

    fn from_keypair(keypair: Keypair) -> Self {
        let (public_key, _) = keypair.x_only_public_key();
        Self {
            keypair,
            public_key,
        }
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key.serialize())
    }

    pub fn secret_key_hex(&self) -> String {
        hex::encode(self.keypair.secret_bytes())
    }

    /// ECDH shared secret with `peer` (hex x-only key): the x coordinate of
    /// the shared point, as used by NIP-04.
    pub fn shared_secret(&self, peer: &str) -> Result<[u8; 32]> {
        let peer = hex::decode(peer)
            .ok()
            .and_then(|bytes| XOnlyPublicKey::from_slice(&bytes).ok())
            .ok_or_else(|| Error::Signing(format!("invalid peer key {peer}")))?;
        let point = ecdh::shared_secret_point(
            &peer.public_key(Parity::Even),
            &self.keypair.secret_key(),
        );
        let mut x = [0u8; 32];
        x.copy_from_slice(&point[..32]);
        Ok(x)
    }
}

impl fmt::Debug for Keys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keys")
            .field("public_key", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}

impl Signer for Keys {
    fn public_key(&self) -> String {
        self.public_key_hex()
    }

    fn sign(&self, mut event: UnsignedEvent) -> Result<Event> {
        event.pubkey = self.public_key_hex();
        let hash = event.hash()?;
        let aux: [u8; 32] = rand::random();
        let sig = SECP256K1.sign_schnorr_with_aux_rand(
            &Message::from_digest(hash),
            &self.keypair,
            &aux,
        );
        Ok(event.into_signed(hex::encode(hash), hex::encode(sig.serialize())))
    }
}
