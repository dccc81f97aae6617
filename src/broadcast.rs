//! Bounded-concurrency event distribution with per-relay retry.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

use crate::error::{Error, Result};
use crate::event::Event;
use crate::relays::RelaySet;
use crate::transport::{Connection, Transport};

/// Tuning for [`Broadcaster`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastConfig {
    /// Relays attempted at the same time.
    pub concurrency: usize,
    /// Attempts per relay, including the first. Values below 1 act as 1.
    pub max_retries: u32,
    /// Delay before the second attempt; doubled after every failure.
    pub initial_backoff: Duration,
    pub connect_timeout: Duration,
    pub publish_timeout: Duration,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            concurrency: 20,
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(5),
            publish_timeout: Duration::from_secs(5),
        }
    }
}

/// Result of publishing to a single relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishOutcome {
    pub relay: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub attempts: u32,
}

/// Outcomes of one broadcast, in relay-set order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BroadcastReport {
    pub event_id: String,
    pub outcomes: Vec<PublishOutcome>,
}

impl BroadcastReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &PublishOutcome> {
        self.outcomes.iter().filter(|o| o.success)
    }

    pub fn failed(&self) -> impl Iterator<Item = &PublishOutcome> {
        self.outcomes.iter().filter(|o| !o.success)
    }

    /// True when at least one relay was tried and none accepted the event.
    /// An empty report is not a failure.
    pub fn is_total_failure(&self) -> bool {
        !self.outcomes.is_empty() && self.outcomes.iter().all(|o| !o.success)
    }

    /// Convert a total failure into [`Error::PublishFailed`].
    pub fn into_result(self) -> Result<Self> {
        if self.is_total_failure() {
            return Err(Error::PublishFailed {
                event_id: self.event_id,
                attempted: self.outcomes.len(),
            });
        }
        Ok(self)
    }
}

/// Publishes signed events to many relays at once.
///
/// Each relay runs in its own task, so a slow or broken relay never delays
/// the others beyond holding one admission slot.
pub struct Broadcaster<T> {
    transport: Arc<T>,
    config: BroadcastConfig,
}

impl<T> Clone for Broadcaster<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            config: self.config.clone(),
        }
    }
}

impl<T: Transport> Broadcaster<T> {
    pub fn new(transport: Arc<T>, config: BroadcastConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &BroadcastConfig {
        &self.config
    }

    /// Publish `event` to every relay in `relays` and wait for all of them.
    ///
    /// Relay failures never surface as an error here; inspect the report or
    /// call [`BroadcastReport::into_result`].
    pub async fn broadcast(&self, event: &Event, relays: &RelaySet) -> BroadcastReport {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let event = Arc::new(event.clone());

        let handles: Vec<_> = relays
            .iter()
            .map(|relay| {
                let semaphore = semaphore.clone();
                let transport = self.transport.clone();
                let config = self.config.clone();
                let event = event.clone();
                let relay = relay.to_string();
                tokio::spawn(async move {
                    let _permit = match semaphore.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(e) => return PublishOutcome::failed(relay, e.to_string(), 0),
                    };
                    publish_with_retry(transport.as_ref(), relay, &event, &config).await
                })
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for (relay, handle) in relays.iter().zip(handles) {
            let outcome = handle.await.unwrap_or_else(|e| {
                PublishOutcome::failed(relay.to_string(), format!("task failed: {e}"), 0)
            });
            outcomes.push(outcome);
        }

        let report = BroadcastReport {
            event_id: event.id.clone(),
            outcomes,
        };
        tracing::info!(
            event_id = %report.event_id,
            relays = report.outcomes.len(),
            succeeded = report.succeeded().count(),
            failed = report.failed().count(),
            "broadcast finished"
        );
        report
    }

    /// Fire-and-forget [`Broadcaster::broadcast`]. Outcomes are logged; the
    /// handle may be awaited or dropped.
    pub fn spawn(&self, event: Event, relays: RelaySet) -> JoinHandle<BroadcastReport> {
        let this = self.clone();
        tokio::spawn(async move {
            let report = this.broadcast(&event, &relays).await;
            for outcome in report.failed() {
                tracing::warn!(
                    relay = %outcome.relay,
                    event_id = %report.event_id,
                    error = outcome.last_error.as_deref().unwrap_or_default(),
                    "relay did not accept event"
                );
            }
            report
        })
    }
}

impl PublishOutcome {
    fn failed(relay: String, error: String, attempts: u32) -> Self {
        Self {
            relay,
            success: false,
            last_error: Some(error),
            attempts,
        }
    }
}

async fn publish_with_retry<T: Transport>(
    transport: &T,
    relay: String,
    event: &Event,
    config: &BroadcastConfig,
) -> PublishOutcome {
    let max_attempts = config.max_retries.max(1);
    let mut backoff = config.initial_backoff;
    let mut last_error = String::new();

    for attempt in 1..=max_attempts {
        match publish_once(transport, &relay, event, config).await {
            Ok(()) => {
                tracing::debug!(relay = %relay, attempt, event_id = %event.id, "published");
                return PublishOutcome {
                    relay,
                    success: true,
                    last_error: None,
                    attempts: attempt,
                };
            }
            Err(e) => {
                tracing::warn!(relay = %relay, attempt, error = %e, "publish attempt failed");
                last_error = e.to_string();
                if attempt < max_attempts {
                    sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                }
            }
        }
    }
    PublishOutcome::failed(relay, last_error, max_attempts)
}

/// One connect + publish on a fresh connection.
async fn publish_once<T: Transport>(
    transport: &T,
    relay: &str,
    event: &Event,
    config: &BroadcastConfig,
) -> Result<()> {
    let mut conn = timeout(config.connect_timeout, transport.connect(relay))
        .await
        .map_err(|_| Error::Timeout {
            relay: relay.to_string(),
            stage: "connect",
            timeout: config.connect_timeout,
        })??;
    let result = match timeout(config.publish_timeout, conn.publish(event)).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout {
            relay: relay.to_string(),
            stage: "publish",
            timeout: config.publish_timeout,
        }),
    };
    let _ = timeout(config.publish_timeout, conn.close()).await;
    result
}
