//! Sequential profile lookup across relays.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::time::timeout;

use crate::error::{Error, Result};
use crate::event::{Event, METADATA};
use crate::nip19;
use crate::transport::{Connection, Filter, Transport};

/// Descriptive fields from a kind-0 metadata event.
///
/// Unknown keys are kept in `extra` so nothing the author published is lost.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileRecord {
    /// Author the record belongs to (hex). Filled from the event, not the
    /// content.
    #[serde(default, skip_deserializing)]
    pub pubkey: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(
        default,
        alias = "displayName",
        skip_serializing_if = "Option::is_none"
    )]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub about: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub banner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nip05: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lud06: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lud16: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ProfileRecord {
    /// Parse a metadata event's JSON content.
    pub fn from_event(event: &Event) -> Result<Self> {
        if event.kind != METADATA {
            return Err(Error::InvalidEvent(format!(
                "expected kind {METADATA}, got {}",
                event.kind
            )));
        }
        let mut record: ProfileRecord = serde_json::from_str(&event.content)
            .map_err(|e| Error::InvalidEvent(format!("metadata content: {e}")))?;
        record.extra.remove("pubkey");
        record.pubkey = event.pubkey.clone();
        Ok(record)
    }
}

/// Timeouts for [`ProfileResolver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    pub connect_timeout: Duration,
    /// Bound on waiting for stored events or end-of-results.
    pub query_timeout: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(3),
            query_timeout: Duration::from_secs(3),
        }
    }
}

/// Resolves profiles by asking relays one at a time, in order, stopping at
/// the first one that answers with a record. Relays are never retried within
/// a call.
pub struct ProfileResolver<T> {
    transport: Arc<T>,
    config: ResolverConfig,
}

impl<T> Clone for ProfileResolver<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            config: self.config.clone(),
        }
    }
}

impl<T: Transport> ProfileResolver<T> {
    pub fn new(transport: Arc<T>, config: ResolverConfig) -> Self {
        Self { transport, config }
    }

    /// Resolve `identifier` (`npub` or hex key) against `relays`.
    ///
    /// The identifier is decoded before any relay is contacted; a bad one
    /// fails immediately with [`Error::InvalidIdentifier`].
    pub async fn resolve(&self, identifier: &str, relays: &[String]) -> Result<ProfileRecord> {
        let pubkey = nip19::decode_public_key(identifier)?;
        let filter = Filter::latest(pubkey.as_str(), METADATA);

        for relay in relays {
            match self.query(relay, &pubkey, &filter).await {
                Ok(Some(record)) => {
                    tracing::debug!(relay = %relay, pubkey = %pubkey, "profile resolved");
                    return Ok(record);
                }
                Ok(None) => tracing::debug!(relay = %relay, pubkey = %pubkey, "no metadata"),
                Err(e) => tracing::debug!(relay = %relay, error = %e, "profile lookup failed"),
            }
        }

        tracing::info!(identifier, relays = relays.len(), "profile not found");
        Err(Error::ProfileNotFound {
            identifier: identifier.to_string(),
            relays: relays.to_vec(),
        })
    }

    async fn query(&self, relay: &str, pubkey: &str, filter: &Filter) -> Result<Option<ProfileRecord>> {
        let mut conn = timeout(self.config.connect_timeout, self.transport.connect(relay))
            .await
            .map_err(|_| Error::Timeout {
                relay: relay.to_string(),
                stage: "connect",
                timeout: self.config.connect_timeout,
            })??;
        let fetched = timeout(self.config.query_timeout, conn.fetch(filter)).await;
        let _ = timeout(self.config.query_timeout, conn.close()).await;
        let events = fetched.map_err(|_| Error::Timeout {
            relay: relay.to_string(),
            stage: "query",
            timeout: self.config.query_timeout,
        })??;

        events
            .iter()
            .find(|ev| ev.kind == METADATA && ev.pubkey == pubkey)
            .map(ProfileRecord::from_event)
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::fake::{Behaviour, FakeTransport};
    use tokio::time::Instant;

    const PUBKEY: &str = "3bf0c63fcb93463407af97a5e5ee64fa883d107ef9e558472c4eb9aaaefa459d";
    const NPUB: &str = "npub180cvv07tjdrrgpa0j7j7tmnyl2yr6yr7l8j4s3evf6u64th6gkwsyjh6w6";

    fn metadata(content: &str) -> Event {
        Event {
            id: "aa11".into(),
            pubkey: PUBKEY.into(),
            kind: METADATA,
            created_at: 1,
            tags: vec![],
            content: content.into(),
            sig: String::new(),
        }
    }

    fn urls(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn falls_back_until_a_relay_answers() {
        let transport = Arc::new(
            FakeTransport::new()
                .relay("wss://r1", Behaviour::down())
                .relay("wss://r2", Behaviour::with_events(vec![]))
                .relay(
                    "wss://r3",
                    Behaviour::with_events(vec![metadata(
                        r#"{"name":"jack","displayName":"Jack","about":"hi","picture":"https://p/x.png","pronouns":"they"}"#,
                    )]),
                ),
        );
        let resolver = ProfileResolver::new(transport.clone(), ResolverConfig::default());

        let record = resolver
            .resolve(NPUB, &urls(&["wss://r1", "wss://r2", "wss://r3", "wss://r4"]))
            .await
            .unwrap();

        assert_eq!(record.pubkey, PUBKEY);
        assert_eq!(record.name.as_deref(), Some("jack"));
        assert_eq!(record.display_name.as_deref(), Some("Jack"));
        assert_eq!(record.picture.as_deref(), Some("https://p/x.png"));
        assert_eq!(record.extra["pronouns"], "they");
        assert_eq!(transport.connects(), urls(&["wss://r1", "wss://r2", "wss://r3"]));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_relays_name_everything_tried() {
        let transport = Arc::new(
            FakeTransport::new()
                .relay("wss://r1", Behaviour::down())
                .relay("wss://r2", Behaviour::broken_query())
                .relay("wss://r3", Behaviour::with_events(vec![])),
        );
        let resolver = ProfileResolver::new(transport.clone(), ResolverConfig::default());
        let relays = urls(&["wss://r1", "wss://r2", "wss://r3"]);

        let err = resolver.resolve(PUBKEY, &relays).await.unwrap_err();

        match err {
            Error::ProfileNotFound { identifier, relays: tried } => {
                assert_eq!(identifier, PUBKEY);
                assert_eq!(tried, relays);
            }
            other => panic!("unexpected {other:?}"),
        }
        // Each relay is tried exactly once.
        assert_eq!(transport.connects(), relays);
    }

    #[tokio::test]
    async fn bad_identifier_contacts_no_relay() {
        let transport = Arc::new(FakeTransport::new());
        let resolver = ProfileResolver::new(transport.clone(), ResolverConfig::default());

        let err = resolver
            .resolve("npub1garbage", &urls(&["wss://r1"]))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidIdentifier(_)));
        assert!(transport.connects().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn hung_relay_times_out_and_advances() {
        let transport = Arc::new(
            FakeTransport::new()
                .relay("wss://slow", Behaviour::hanging())
                .relay("wss://ok", Behaviour::with_events(vec![metadata(r#"{"name":"a"}"#)])),
        );
        let resolver = ProfileResolver::new(transport, ResolverConfig::default());

        let start = Instant::now();
        let record = resolver
            .resolve(PUBKEY, &urls(&["wss://slow", "wss://ok"]))
            .await
            .unwrap();

        assert_eq!(record.name.as_deref(), Some("a"));
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(3));
        assert!(elapsed < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn unparseable_metadata_advances() {
        let transport = Arc::new(
            FakeTransport::new()
                .relay("wss://junk", Behaviour::with_events(vec![metadata("not json")]))
                .relay("wss://ok", Behaviour::with_events(vec![metadata(r#"{"about":"x"}"#)])),
        );
        let resolver = ProfileResolver::new(transport, ResolverConfig::default());

        let record = resolver
            .resolve(PUBKEY, &urls(&["wss://junk", "wss://ok"]))
            .await
            .unwrap();
        assert_eq!(record.about.as_deref(), Some("x"));
    }

    #[tokio::test]
    async fn ignores_events_from_other_authors() {
        let mut foreign = metadata(r#"{"name":"mallory"}"#);
        foreign.pubkey = "cd".repeat(32);
        let transport = Arc::new(
            FakeTransport::new().relay("wss://r1", Behaviour::with_events(vec![foreign])),
        );
        let resolver = ProfileResolver::new(transport, ResolverConfig::default());

        let err = resolver.resolve(PUBKEY, &urls(&["wss://r1"])).await.unwrap_err();
        assert!(matches!(err, Error::ProfileNotFound { .. }));
    }

    #[tokio::test]
    async fn empty_relay_list_is_not_found() {
        let resolver = ProfileResolver::new(Arc::new(FakeTransport::new()), ResolverConfig::default());
        let err = resolver.resolve(PUBKEY, &[]).await.unwrap_err();
        assert_eq!(err.class(), crate::error::ErrorClass::ExhaustedRelays);
    }

    #[test]
    fn record_serializes_known_and_extra_fields() {
        let record = ProfileRecord::from_event(&metadata(r#"{"display_name":"J","lud16":"j@x.com","bot":true}"#))
            .unwrap();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["pubkey"], PUBKEY);
        assert_eq!(json["display_name"], "J");
        assert_eq!(json["lud16"], "j@x.com");
        assert_eq!(json["bot"], true);
        assert!(json.get("about").is_none());
    }

    #[test]
    fn rejects_wrong_kind() {
        let mut ev = metadata("{}");
        ev.kind = 1;
        assert!(ProfileRecord::from_event(&ev).is_err());
    }
}
