//! Service facade wiring relay selection, broadcast, lookup and signing.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::broadcast::{BroadcastReport, Broadcaster};
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::event::{Event, UnsignedEvent};
use crate::keys::{Keys, Signer};
use crate::message::{compose_direct_message, Cipher};
use crate::profile::{ProfileRecord, ProfileResolver};
use crate::receipt::{compose_receipt, extract_relay_hints};
use crate::relays::RelaySet;
use crate::transport::Transport;

/// One logical service: a key, a default relay list and a transport.
///
/// Several services with different keys or relays can coexist in one
/// process; none of them touch global state.
pub struct Service<T> {
    keys: Option<Keys>,
    defaults: Arc<[String]>,
    broadcaster: Broadcaster<T>,
    resolver: ProfileResolver<T>,
}

impl<T> Clone for Service<T> {
    fn clone(&self) -> Self {
        Self {
            keys: self.keys.clone(),
            defaults: self.defaults.clone(),
            broadcaster: self.broadcaster.clone(),
            resolver: self.resolver.clone(),
        }
    }
}

impl<T: Transport> Service<T> {
    pub fn new(settings: &Settings, keys: Option<Keys>, transport: Arc<T>) -> Self {
        let defaults: Vec<String> = RelaySet::sanitize(&settings.relays, Vec::<String>::new()).into_vec();
        Self {
            keys,
            defaults: defaults.into(),
            broadcaster: Broadcaster::new(transport.clone(), settings.broadcast.clone()),
            resolver: ProfileResolver::new(transport, settings.resolver.clone()),
        }
    }

    pub fn keys(&self) -> Option<&Keys> {
        self.keys.as_ref()
    }

    pub fn default_relays(&self) -> &[String] {
        &self.defaults
    }

    /// `caller` relays first, then the configured defaults.
    pub fn relays_for<I>(&self, caller: I) -> RelaySet
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        RelaySet::sanitize(caller, self.defaults.iter())
    }

    /// Broadcast an already-signed event and wait for every relay.
    pub async fn publish(&self, event: &Event, caller_relays: &[String]) -> BroadcastReport {
        let relays = self.relays_for(caller_relays);
        self.broadcaster.broadcast(event, &relays).await
    }

    /// Broadcast in the background; failures are only logged unless the
    /// handle is awaited.
    pub fn publish_detached(&self, event: Event, caller_relays: &[String]) -> JoinHandle<BroadcastReport> {
        let relays = self.relays_for(caller_relays);
        self.broadcaster.spawn(event, relays)
    }

    /// Resolve a profile from `relays`, or the defaults when none are given.
    pub async fn resolve_profile(
        &self,
        identifier: &str,
        relays: Option<&[String]>,
    ) -> Result<ProfileRecord> {
        let relays = match relays {
            Some(relays) if !relays.is_empty() => {
                RelaySet::sanitize(relays, Vec::<String>::new()).into_vec()
            }
            _ => self.defaults.to_vec(),
        };
        self.resolver.resolve(identifier, &relays).await
    }

    /// Sign with the service key.
    pub fn sign(&self, event: UnsignedEvent) -> Result<Event> {
        self.signer()?.sign(event)
    }

    /// Compose and sign the receipt for a paid zap request, then publish it
    /// in the background to the request's relay hints plus the defaults.
    pub fn emit_receipt(
        &self,
        zap_request: &Event,
        bolt11: &str,
    ) -> Result<(Event, JoinHandle<BroadcastReport>)> {
        let receipt = compose_receipt(zap_request, bolt11, self.signer()?)?;
        let relays = self.relays_for(extract_relay_hints(zap_request));
        tracing::info!(receipt = %receipt.id, relays = relays.len(), "publishing zap receipt");
        let handle = self.broadcaster.spawn(receipt.clone(), relays);
        Ok((receipt, handle))
    }

    /// Encrypt, sign and broadcast a direct message to the default relays.
    ///
    /// The crate ships no NIP-04 cipher; the caller supplies one through
    /// [`Cipher`].
    pub async fn send_direct_message(
        &self,
        receiver: &str,
        plaintext: &str,
        cipher: &dyn Cipher,
    ) -> Result<BroadcastReport> {
        let message = compose_direct_message(self.signer()?, receiver, plaintext, cipher)?;
        Ok(self.publish(&message, &[]).await)
    }

    fn signer(&self) -> Result<&Keys> {
        self.keys.as_ref().ok_or(Error::MissingKey)
    }
}
