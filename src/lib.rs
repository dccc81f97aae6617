//! Multi-relay Nostr distribution and resolution.
//!
//! Signed events fan out to many relays at once with bounded concurrency and
//! per-relay retry; profiles are resolved by asking relays one at a time
//! until one answers. Zap receipts and direct messages are composed on top.

pub mod broadcast;
pub mod config;
pub mod error;
pub mod event;
pub mod keys;
pub mod message;
pub mod nip19;
pub mod profile;
pub mod receipt;
pub mod relays;
pub mod server;
pub mod service;
pub mod transport;

pub use broadcast::{BroadcastConfig, BroadcastReport, Broadcaster, PublishOutcome};
pub use config::Settings;
pub use error::{Error, ErrorClass, Result};
pub use event::{Event, Tag, UnsignedEvent};
pub use keys::{Keys, Signer};
pub use message::{compose_direct_message, Cipher};
pub use profile::{ProfileRecord, ProfileResolver, ResolverConfig};
pub use receipt::{compose_receipt, description_hash, extract_relay_hints};
pub use relays::RelaySet;
pub use service::Service;
pub use transport::{Connection, Filter, Transport, WsTransport};
