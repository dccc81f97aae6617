//! Relay client transport.
//!
//! [`Transport`] opens one connection per call; there is no pooling. The
//! broadcaster and resolver wrap every call in their own deadline, so
//! implementations only need to report failures, not time them.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_socks::tcp::Socks5Stream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{client_async_tls, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::error::{Error, Result};
use crate::event::Event;

/// Opens connections to relays.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    type Connection: Connection;

    async fn connect(&self, relay: &str) -> Result<Self::Connection>;
}

/// A single open relay connection.
#[async_trait]
pub trait Connection: Send {
    /// Send the event and wait for the relay's acknowledgement.
    async fn publish(&mut self, event: &Event) -> Result<()>;

    /// Run a one-shot query, returning stored events up to end-of-results.
    async fn fetch(&mut self, filter: &Filter) -> Result<Vec<Event>>;

    async fn close(&mut self);
}

/// Subscription filter. Only the fields this crate queries by.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Filter {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub kinds: Vec<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl Filter {
    /// Latest event of `kind` by `author`.
    pub fn latest(author: impl Into<String>, kind: u32) -> Self {
        Self {
            authors: vec![author.into()],
            kinds: vec![kind],
            limit: Some(1),
        }
    }
}

/// WebSocket transport, optionally tunnelled through a SOCKS5 proxy.
#[derive(Debug, Clone, Default)]
pub struct WsTransport {
    tor_socks: Option<String>,
}

impl WsTransport {
    pub fn new(tor_socks: Option<String>) -> Self {
        Self { tor_socks }
    }
}

#[async_trait]
impl Transport for WsTransport {
    type Connection = WsConnection;

    async fn connect(&self, relay: &str) -> Result<WsConnection> {
        let ws = connect_ws(relay, self.tor_socks.as_deref()).await?;
        Ok(WsConnection {
            relay: relay.to_string(),
            ws,
        })
    }
}

type BoxedStream = Box<dyn AsyncReadWrite + Unpin + Send>;
type RelayStream = WebSocketStream<MaybeTlsStream<BoxedStream>>;

/// Open NIP-01 session with one relay.
pub struct WsConnection {
    relay: String,
    ws: RelayStream,
}

impl WsConnection {
    async fn send(&mut self, msg: Value) -> Result<()> {
        self.ws
            .send(Message::Text(msg.to_string()))
            .await
            .map_err(|e| Error::transport(&self.relay, e))
    }

    /// Next JSON array frame, skipping pings and non-array text. `None` once
    /// the relay closes the socket.
    async fn next_frame(&mut self) -> Result<Option<Vec<Value>>> {
        while let Some(msg) = self.ws.next().await {
            match msg.map_err(|e| Error::transport(&self.relay, e))? {
                Message::Text(txt) => {
                    if let Ok(Value::Array(arr)) = serde_json::from_str::<Value>(&txt) {
                        if let Some("NOTICE") = arr.first().and_then(|v| v.as_str()) {
                            let notice = arr.get(1).and_then(|v| v.as_str()).unwrap_or_default();
                            tracing::debug!(relay = %self.relay, notice, "relay notice");
                            continue;
                        }
                        return Ok(Some(arr));
                    }
                }
                Message::Close(_) => return Ok(None),
                _ => {}
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl Connection for WsConnection {
    async fn publish(&mut self, event: &Event) -> Result<()> {
        self.send(json!(["EVENT", event])).await?;
        while let Some(arr) = self.next_frame().await? {
            if arr.first().and_then(|v| v.as_str()) != Some("OK") {
                continue;
            }
            if arr.get(1).and_then(|v| v.as_str()) != Some(event.id.as_str()) {
                continue;
            }
            let accepted = arr.get(2).and_then(|v| v.as_bool()).unwrap_or(false);
            if accepted {
                return Ok(());
            }
            let reason = arr.get(3).and_then(|v| v.as_str()).unwrap_or_default();
            return Err(Error::Rejected {
                relay: self.relay.clone(),
                reason: reason.to_string(),
            });
        }
        Err(Error::transport(&self.relay, "closed before OK"))
    }

    async fn fetch(&mut self, filter: &Filter) -> Result<Vec<Event>> {
        let sub_id = hex::encode(rand::random::<[u8; 8]>());
        self.send(json!(["REQ", sub_id, filter])).await?;
        let mut events = Vec::new();
        let mut ended = false;
        while let Some(arr) = self.next_frame().await? {
            if arr.get(1).and_then(|v| v.as_str()) != Some(sub_id.as_str()) {
                continue;
            }
            match arr.first().and_then(|v| v.as_str()) {
                Some("EVENT") if arr.len() >= 3 => {
                    match serde_json::from_value::<Event>(arr[2].clone()) {
                        Ok(ev) => events.push(ev),
                        Err(e) => {
                            tracing::debug!(relay = %self.relay, error = %e, "skipping malformed event")
                        }
                    }
                    if filter.limit.is_some_and(|limit| events.len() >= limit) {
                        ended = true;
                        break;
                    }
                }
                Some("EOSE") => {
                    ended = true;
                    break;
                }
                Some("CLOSED") => {
                    let reason = arr.get(2).and_then(|v| v.as_str()).unwrap_or_default();
                    return Err(Error::transport(
                        &self.relay,
                        format!("subscription closed: {reason}"),
                    ));
                }
                _ => {}
            }
        }
        if !ended {
            return Err(Error::transport(&self.relay, "closed before EOSE"));
        }
        // Best effort; the connection is dropped right after anyway.
        let _ = self.send(json!(["CLOSE", sub_id])).await;
        Ok(events)
    }

    async fn close(&mut self) {
        let _ = self.ws.close(None).await;
    }
}

/// Establish a WebSocket connection, optionally via a SOCKS5 proxy.
///
/// `wss://` relays get a rustls session on top of the TCP or proxied stream.
async fn connect_ws(relay: &str, tor_socks: Option<&str>) -> Result<RelayStream> {
    let url = Url::parse(relay).map_err(|e| Error::connect(relay, e))?;
    let host = url
        .host_str()
        .ok_or_else(|| Error::connect(relay, "missing host"))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| Error::connect(relay, "missing port"))?;
    let req = relay
        .into_client_request()
        .map_err(|e| Error::connect(relay, e))?;
    let stream: BoxedStream = if let Some(proxy) = tor_socks {
        Box::new(
            Socks5Stream::connect(proxy, (host, port))
                .await
                .map_err(|e| Error::connect(relay, e))?,
        )
    } else {
        Box::new(
            TcpStream::connect((host, port))
                .await
                .map_err(|e| Error::connect(relay, e))?,
        )
    };
    let (ws, _) = client_async_tls(req, stream)
        .await
        .map_err(|e| Error::connect(relay, e))?;
    Ok(ws)
}

/// Blanket trait for boxed async read/write streams.
trait AsyncReadWrite: AsyncRead + AsyncWrite {}
impl<T: AsyncRead + AsyncWrite> AsyncReadWrite for T {}
