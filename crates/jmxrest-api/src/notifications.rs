//! Notification inbox with long-polling and recovery.
//!
//! The connector does not push notifications over a socket. Instead the
//! client creates a *notification area* on the server (a registrations
//! URL, an inbox URL and a client URL), subscribes to MBeans by posting
//! registrations, and long-polls the inbox. [`run_inbox`] drives that
//! loop on a background task and hands each batch to an [`InboxSink`].
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use jmxrest_api::notifications::{run_inbox, InboxConfig, NotificationInbox};
//! use tokio_util::sync::CancellationToken;
//!
//! let inbox = Arc::new(NotificationInbox::open(client, poll_client, &info.notifications, settings).await?);
//! inbox.subscribe("WebSphere:type=ThreadPoolStats,name=Default").await?;
//!
//! let cancel = CancellationToken::new();
//! tokio::spawn(run_inbox(inbox, sink, InboxConfig::default(), cancel.clone()));
//! ```

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::client::RestClient;
use crate::error::Error;
use crate::models::{NotificationArea, NotificationRecord, NotificationRegistration, NotificationSettings};

// ── InboxSink ────────────────────────────────────────────────────────

/// Receiver side of the inbox loop.
pub trait InboxSink: Send + Sync + 'static {
    /// Deliver one non-empty batch, in server order.
    fn deliver(&self, records: Vec<NotificationRecord>);

    /// Object names whose server-side registrations must be restored
    /// after the notification area is recreated.
    fn subscriptions(&self) -> Vec<String>;

    /// The loop stopped on its own: credentials were rejected or the
    /// retry limit was reached. `error` is the failure that ended it.
    /// Not called when the loop is cancelled.
    fn stopped(&self, _error: &Error) {}
}

// ── Config ───────────────────────────────────────────────────────────

/// Exponential backoff configuration for inbox errors.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first retry. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Maximum consecutive failures before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
        }
    }
}

/// Tuning for [`run_inbox`].
#[derive(Debug, Clone, Default)]
pub struct InboxConfig {
    /// Pause after an empty inbox poll. Zero polls again immediately
    /// (the server already holds the request open).
    pub fetch_interval: Duration,
    pub reconnect: ReconnectConfig,
}

// ── NotificationInbox ────────────────────────────────────────────────

/// A notification area on the server and the clients used to talk to it.
pub struct NotificationInbox {
    client: RestClient,
    /// Client whose timeout covers the inbox long-poll.
    poll_client: RestClient,
    notifications_url: Url,
    settings: NotificationSettings,
    area: ArcSwap<NotificationArea>,
}

impl NotificationInbox {
    /// Create a notification area by posting `settings` to the server's
    /// `notifications` URL.
    pub async fn open(
        client: RestClient,
        poll_client: RestClient,
        notifications_path: &str,
        settings: NotificationSettings,
    ) -> Result<Self, Error> {
        let notifications_url = client.resolve(notifications_path)?;
        let area: NotificationArea = client.post(notifications_url.clone(), &settings).await?;
        tracing::debug!(inbox = %area.inbox, "notification area created");

        Ok(Self {
            client,
            poll_client,
            notifications_url,
            settings,
            area: ArcSwap::from_pointee(area),
        })
    }

    /// The current notification area.
    pub fn area(&self) -> Arc<NotificationArea> {
        self.area.load_full()
    }

    /// Ask the server to route `object_name`'s notifications to this inbox.
    pub async fn subscribe(&self, object_name: &str) -> Result<(), Error> {
        let area = self.area();
        let url = self.client.resolve(&area.registrations)?;
        tracing::debug!(object_name, "adding server registration");
        self.client
            .post_empty(
                url,
                &NotificationRegistration {
                    object_name: object_name.to_owned(),
                    filters: Vec::new(),
                },
            )
            .await
    }

    /// Drop the server-side registration for `object_name`.
    pub async fn unsubscribe(&self, object_name: &str) -> Result<(), Error> {
        let area = self.area();
        let mut url = self.client.resolve(&area.registrations)?;
        url.path_segments_mut()
            .map_err(|()| Error::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .push(object_name);
        tracing::debug!(object_name, "removing server registration");
        self.client.delete(url).await
    }

    /// Long-poll the inbox once.
    ///
    /// HTTP 404/410 become [`Error::NotificationAreaGone`].
    pub async fn fetch(&self) -> Result<Vec<NotificationRecord>, Error> {
        let area = self.area();
        let url = self.poll_client.resolve(&area.inbox)?;
        match self.poll_client.get(url).await {
            Err(Error::Server { status, .. }) if status == 404 || status == 410 => {
                Err(Error::NotificationAreaGone { status })
            }
            other => other,
        }
    }

    /// Create a fresh notification area and restore `subscriptions` on it.
    pub async fn recreate(&self, subscriptions: &[String]) -> Result<(), Error> {
        let area: NotificationArea = self
            .client
            .post(self.notifications_url.clone(), &self.settings)
            .await?;
        self.area.store(Arc::new(area));

        for object_name in subscriptions {
            self.subscribe(object_name).await?;
        }
        tracing::info!(restored = subscriptions.len(), "notification area recreated");
        Ok(())
    }

    /// Release the notification client on the server.
    pub async fn close(&self) -> Result<(), Error> {
        let area = self.area();
        let url = self.client.resolve(&area.client)?;
        self.client.delete(url).await
    }
}

// ── Background polling loop ──────────────────────────────────────────

/// Main loop: poll → deliver → on error, backoff → poll again.
///
/// A batch handed to the sink is always delivered in full before the
/// loop observes cancellation, so awaiting the task after cancelling it
/// drains in-flight dispatch.
pub async fn run_inbox(
    inbox: Arc<NotificationInbox>,
    sink: Arc<dyn InboxSink>,
    config: InboxConfig,
    cancel: CancellationToken,
) {
    let mut attempt: u32 = 0;

    let failure = loop {
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => break None,
            result = inbox.fetch() => result,
        };

        match result {
            Ok(records) if records.is_empty() => {
                attempt = 0;
                if !config.fetch_interval.is_zero() && !sleep_or_cancel(config.fetch_interval, &cancel).await {
                    break None;
                }
            }
            Ok(records) => {
                attempt = 0;
                tracing::trace!(count = records.len(), "inbox batch received");
                sink.deliver(records);
            }
            Err(Error::NotificationAreaGone { status }) => {
                tracing::warn!(status, "notification area lost, recreating");
                if let Err(e) = inbox.recreate(&sink.subscriptions()).await {
                    tracing::warn!(error = %e, "failed to recreate notification area");
                    if e.is_auth_failure() || !backoff(&mut attempt, &config.reconnect, &cancel).await {
                        break Some(e);
                    }
                }
            }
            Err(e) if e.is_auth_failure() => {
                tracing::error!(error = %e, "inbox rejected credentials, stopping notification delivery");
                break Some(e);
            }
            Err(e) => {
                if e.is_transient() {
                    tracing::warn!(error = %e, status = ?e.status(), attempt, "inbox poll failed");
                } else {
                    tracing::error!(error = %e, status = ?e.status(), attempt, "inbox poll failed, not transient");
                }
                if !backoff(&mut attempt, &config.reconnect, &cancel).await {
                    break Some(e);
                }
            }
        }
    };

    match failure {
        Some(e) if !cancel.is_cancelled() => sink.stopped(&e),
        _ => tracing::debug!("inbox loop exiting"),
    }
}

/// Sleep for the next backoff delay. Returns `false` when the loop
/// should stop (cancelled or retry limit reached).
async fn backoff(attempt: &mut u32, reconnect: &ReconnectConfig, cancel: &CancellationToken) -> bool {
    if let Some(max) = reconnect.max_retries {
        if *attempt >= max {
            tracing::error!(max_retries = max, "inbox retry limit reached, giving up");
            return false;
        }
    }

    let delay = calculate_backoff(*attempt, reconnect);
    tracing::info!(
        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
        attempt = *attempt,
        "waiting before next inbox poll"
    );
    *attempt += 1;
    sleep_or_cancel(delay, cancel).await
}

async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(delay) => true,
    }
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) + jitter`
///
/// Jitter is +-25%, seeded from the attempt number.
fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = i32::try_from(attempt.min(30)).unwrap_or(30);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    let with_jitter = (capped * jitter_factor).max(0.0);

    Duration::from_secs_f64(with_jitter)
}

// ── Tests ────────────────────────────────────────────────────────────
