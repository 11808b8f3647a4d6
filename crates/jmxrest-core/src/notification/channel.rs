// ── Notification channel ──
//
// Listener registrations for one connection, and dispatch of the
// notifications the inbox task delivers. Registrations live in an
// RCU set: dispatch iterates a snapshot while register/unregister swap
// in a new vector.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use arc_swap::{ArcSwap, ArcSwapOption};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use jmxrest_api::notifications::{InboxConfig, InboxSink, NotificationInbox, run_inbox};
use jmxrest_api::NotificationRecord;

use super::{Handback, Notification, NotificationFilter, NotificationListener};
use crate::error::CoreError;

// ── Registration ─────────────────────────────────────────────────────

/// Identifies one registration. Returned by `register`, consumed by
/// `unregister`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistrationHandle(u64);

impl RegistrationHandle {
    pub fn id(self) -> u64 {
        self.0
    }
}

struct Registration {
    id: u64,
    source: Option<String>,
    listener: Arc<dyn NotificationListener>,
    filter: Option<Arc<dyn NotificationFilter>>,
    handback: Option<Handback>,
    /// Cleared on unregister; checked right before every invocation.
    active: AtomicBool,
}

impl Registration {
    fn wants(&self, notification: &Notification) -> bool {
        if self
            .source
            .as_deref()
            .is_some_and(|source| notification.source.as_deref() != Some(source))
        {
            return false;
        }
        let Some(ref filter) = self.filter else {
            return true;
        };
        catch_unwind(AssertUnwindSafe(|| filter.is_notification_enabled(notification))).unwrap_or_else(|_| {
            warn!(registration = self.id, "notification filter panicked, skipping listener");
            false
        })
    }
}

/// Counts from dispatching one notification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Registrations whose source and filter accepted the notification.
    pub matched: usize,
    /// Listeners that returned `Ok`.
    pub delivered: usize,
    /// Listeners that returned an error or panicked.
    pub failed: usize,
}

// ── NotificationChannel ──────────────────────────────────────────────

/// Notification registrations of a Connected connection.
///
/// Cheaply cloneable. Once the owning connection disconnects every clone
/// is closed: registrations are gone and `register` fails with
/// [`CoreError::NotConnected`].
///
/// The channel also closes when its inbox loop stops on its own. Listener
/// references are released then, and `register` fails with
/// [`CoreError::Authentication`] if the server rejected the credentials.
#[derive(Clone)]
pub struct NotificationChannel {
    inner: Arc<ChannelInner>,
}

struct ChannelInner {
    registrations: ArcSwap<Vec<Arc<Registration>>>,
    next_id: AtomicU64,
    open: AtomicBool,
    shut_down: AtomicBool,
    /// Set when the inbox loop stopped because credentials were rejected.
    auth_failure: ArcSwapOption<String>,
    inbox: Option<Arc<NotificationInbox>>,
    /// Serializes server-side subscribe/unsubscribe calls.
    server_ops: Mutex<()>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl NotificationChannel {
    /// Start the inbox loop for `inbox` and return the channel it feeds.
    pub(crate) async fn start(inbox: Arc<NotificationInbox>, config: InboxConfig, cancel: CancellationToken) -> Self {
        let inner = Arc::new(ChannelInner::new(Some(Arc::clone(&inbox)), cancel.clone()));
        let sink: Arc<dyn InboxSink> = Arc::clone(&inner) as Arc<dyn InboxSink>;
        let task = tokio::spawn(run_inbox(inbox, sink, config, cancel));
        *inner.task.lock().await = Some(task);
        Self { inner }
    }

    /// A channel with no server behind it. Dispatch is driven by hand.
    #[cfg(test)]
    pub(crate) fn detached() -> Self {
        Self {
            inner: Arc::new(ChannelInner::new(None, CancellationToken::new())),
        }
    }

    pub fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::Acquire)
    }

    /// Why the channel is closed, or `None` while it is open.
    pub fn closed_reason(&self) -> Option<CoreError> {
        (!self.is_open()).then(|| self.inner.closed_error())
    }

    /// Number of live registrations.
    pub fn registration_count(&self) -> usize {
        self.inner.registrations.load().len()
    }

    /// MBeans this channel holds server-side subscriptions for.
    pub fn subscriptions(&self) -> Vec<String> {
        self.inner.subscriptions()
    }

    // ── Registration ─────────────────────────────────────────────────

    /// Register `listener` for every notification the connection receives.
    pub fn register(
        &self,
        listener: Arc<dyn NotificationListener>,
        filter: Option<Arc<dyn NotificationFilter>>,
        handback: Option<Handback>,
    ) -> Result<RegistrationHandle, CoreError> {
        self.insert(None, listener, filter, handback)
    }

    /// Register `listener` for notifications emitted by `source` only.
    ///
    /// The first registration for a source subscribes to it on the
    /// server; later ones share that subscription.
    pub async fn register_for(
        &self,
        source: &str,
        listener: Arc<dyn NotificationListener>,
        filter: Option<Arc<dyn NotificationFilter>>,
        handback: Option<Handback>,
    ) -> Result<RegistrationHandle, CoreError> {
        if !self.is_open() {
            return Err(self.inner.closed_error());
        }

        let _ops = self.inner.server_ops.lock().await;
        if !self.inner.has_source(source) {
            if let Some(ref inbox) = self.inner.inbox {
                inbox.subscribe(source).await?;
            }
        }
        self.insert(Some(source.to_owned()), listener, filter, handback)
    }

    /// Remove a registration. Unknown or already removed handles are a
    /// no-op.
    ///
    /// Once this returns the listener is not invoked again, apart from
    /// an invocation that was already running.
    pub async fn unregister(&self, handle: RegistrationHandle) {
        let removed = self.inner.remove_where(|r| r.id == handle.0);
        for registration in removed {
            if let Some(source) = registration.source.as_deref() {
                self.release_source(source).await;
            }
        }
    }

    /// Remove every registration of `listener`. Returns how many were removed.
    pub async fn unregister_listener(&self, listener: &Arc<dyn NotificationListener>) -> usize {
        let target = Arc::as_ptr(listener).cast::<()>();
        let removed = self
            .inner
            .remove_where(|r| Arc::as_ptr(&r.listener).cast::<()>() == target);
        for registration in &removed {
            if let Some(source) = registration.source.as_deref() {
                self.release_source(source).await;
            }
        }
        removed.len()
    }

    fn insert(
        &self,
        source: Option<String>,
        listener: Arc<dyn NotificationListener>,
        filter: Option<Arc<dyn NotificationFilter>>,
        handback: Option<Handback>,
    ) -> Result<RegistrationHandle, CoreError> {
        if !self.is_open() {
            return Err(self.inner.closed_error());
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let registration = Arc::new(Registration {
            id,
            source,
            listener,
            filter,
            handback,
            active: AtomicBool::new(true),
        });
        self.inner.registrations.rcu(|current| {
            let mut next = current.to_vec();
            next.push(Arc::clone(&registration));
            next
        });

        // Lost a race with close: the swap there may have missed us.
        if !self.is_open() {
            self.inner.remove_where(|r| r.id == id);
            return Err(self.inner.closed_error());
        }

        debug!(registration = id, source = ?registration.source, "listener registered");
        Ok(RegistrationHandle(id))
    }

    async fn release_source(&self, source: &str) {
        let _ops = self.inner.server_ops.lock().await;
        if self.inner.has_source(source) || !self.is_open() {
            return;
        }
        if let Some(ref inbox) = self.inner.inbox {
            if let Err(e) = inbox.unsubscribe(source).await {
                warn!(source, error = %e, "failed to drop server-side subscription");
            }
        }
    }

    // ── Dispatch ─────────────────────────────────────────────────────

    /// Deliver one notification to every matching registration.
    pub(crate) fn dispatch(&self, notification: &Notification) -> DispatchOutcome {
        self.inner.dispatch(notification)
    }

    // ── Shutdown ─────────────────────────────────────────────────────

    /// Stop the inbox task, wait for in-flight dispatch, invalidate all
    /// registrations and release the notification client (best effort).
    pub(crate) async fn close(&self) {
        if self.inner.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.open.store(false, Ordering::Release);

        self.inner.cancel.cancel();
        if let Some(task) = self.inner.task.lock().await.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "inbox task ended abnormally");
            }
        }

        let dropped = self.inner.drop_registrations();

        if let Some(ref inbox) = self.inner.inbox {
            if let Err(e) = inbox.close().await {
                debug!(error = %e, "failed to release notification client");
            }
        }
        debug!(registrations = dropped, "notification channel closed");
    }
}

impl ChannelInner {
    fn new(inbox: Option<Arc<NotificationInbox>>, cancel: CancellationToken) -> Self {
        Self {
            registrations: ArcSwap::from_pointee(Vec::new()),
            next_id: AtomicU64::new(1),
            open: AtomicBool::new(true),
            shut_down: AtomicBool::new(false),
            auth_failure: ArcSwapOption::empty(),
            inbox,
            server_ops: Mutex::new(()),
            cancel,
            task: Mutex::new(None),
        }
    }

    fn closed_error(&self) -> CoreError {
        match self.auth_failure.load_full() {
            Some(message) => CoreError::Authentication {
                message: String::clone(&message),
            },
            None => CoreError::NotConnected,
        }
    }

    /// Empty the registration set and deactivate what was in it. Returns
    /// how many registrations were dropped.
    fn drop_registrations(&self) -> usize {
        let dropped = self.registrations.swap(Arc::new(Vec::new()));
        for registration in dropped.iter() {
            registration.active.store(false, Ordering::Release);
        }
        dropped.len()
    }

    fn has_source(&self, source: &str) -> bool {
        self.registrations
            .load()
            .iter()
            .any(|r| r.source.as_deref() == Some(source))
    }

    fn remove_where(&self, predicate: impl Fn(&Registration) -> bool) -> Vec<Arc<Registration>> {
        let mut removed = Vec::new();
        self.registrations.rcu(|current| {
            removed.clear();
            let mut kept = Vec::with_capacity(current.len());
            for registration in current.iter() {
                if predicate(registration) {
                    removed.push(Arc::clone(registration));
                } else {
                    kept.push(Arc::clone(registration));
                }
            }
            kept
        });
        for registration in &removed {
            registration.active.store(false, Ordering::Release);
            debug!(registration = registration.id, "listener unregistered");
        }
        removed
    }

    fn dispatch(&self, notification: &Notification) -> DispatchOutcome {
        let snapshot = self.registrations.load();
        let mut outcome = DispatchOutcome::default();

        for registration in snapshot.iter() {
            if !registration.wants(notification) {
                continue;
            }
            outcome.matched += 1;

            if !registration.active.load(Ordering::Acquire) {
                continue;
            }

            let result = catch_unwind(AssertUnwindSafe(|| {
                registration
                    .listener
                    .handle_notification(notification, registration.handback.as_ref())
            }));
            match result {
                Ok(Ok(())) => outcome.delivered += 1,
                Ok(Err(e)) => {
                    outcome.failed += 1;
                    warn!(
                        registration = registration.id,
                        notification_type = %notification.notification_type,
                        error = %e,
                        "notification listener failed"
                    );
                }
                Err(_) => {
                    outcome.failed += 1;
                    error!(
                        registration = registration.id,
                        notification_type = %notification.notification_type,
                        "notification listener panicked"
                    );
                }
            }
        }

        if outcome.matched == 0 {
            debug!(
                notification_type = %notification.notification_type,
                source = ?notification.source,
                sequence = notification.sequence_number,
                "notification lost: no matching listener"
            );
        }
        outcome
    }
}

impl InboxSink for ChannelInner {
    fn deliver(&self, records: Vec<NotificationRecord>) {
        for record in records {
            self.dispatch(&Notification::from(record));
        }
    }

    fn subscriptions(&self) -> Vec<String> {
        let mut sources: Vec<String> = self
            .registrations
            .load()
            .iter()
            .filter_map(|r| r.source.clone())
            .collect();
        sources.sort();
        sources.dedup();
        sources
    }

    fn stopped(&self, error: &jmxrest_api::Error) {
        if let jmxrest_api::Error::Authentication { message } = error {
            self.auth_failure.store(Some(Arc::new(message.clone())));
        }
        if !self.open.swap(false, Ordering::AcqRel) {
            return;
        }
        let dropped = self.drop_registrations();
        warn!(error = %error, registrations = dropped, "notification delivery stopped, channel closed");
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use super::*;
    use crate::notification::{AlwaysEnabled, ListenerError, TypePrefixFilter};

    struct Counter(AtomicUsize);

    impl Counter {
        fn new() -> Arc<Self> {
            Arc::new(Self(AtomicUsize::new(0)))
        }

        fn count(&self) -> usize {
            self.0.load(Ordering::SeqCst)
        }
    }

    impl NotificationListener for Counter {
        fn handle_notification(&self, _: &Notification, _: Option<&Handback>) -> Result<(), ListenerError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn note(kind: &str) -> Notification {
        Notification::new(kind)
    }

    #[test]
    fn no_filter_receives_everything() {
        let channel = NotificationChannel::detached();
        let counter = Counter::new();
        channel.register(counter.clone(), None, None).unwrap();

        for i in 0..5 {
            channel.dispatch(&note(&format!("app.event.{i}")));
        }
        assert_eq!(counter.count(), 5);
    }

    #[test]
    fn always_false_filter_blocks_everything() {
        let channel = NotificationChannel::detached();
        let counter = Counter::new();
        let never: Arc<dyn NotificationFilter> = Arc::new(|_: &Notification| false);
        channel.register(counter.clone(), Some(never), None).unwrap();

        let outcome = channel.dispatch(&note("app.event"));
        assert_eq!(counter.count(), 0);
        assert_eq!(outcome.matched, 0);
    }

    #[test]
    fn always_enabled_is_a_named_filter() {
        let channel = NotificationChannel::detached();
        let counter = Counter::new();
        let filter: Arc<dyn NotificationFilter> = Arc::new(AlwaysEnabled);
        channel.register(counter.clone(), Some(filter), None).unwrap();
        channel.dispatch(&note("anything"));
        assert_eq!(counter.count(), 1);
    }

    #[test]
    fn handback_is_returned_verbatim() {
        let channel = NotificationChannel::detached();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let listener = Arc::new(move |_: &Notification, handback: Option<&Handback>| -> Result<(), ListenerError> {
            let tag = handback.and_then(|h| h.downcast_ref::<&str>()).copied();
            sink.lock().unwrap().push(tag);
            Ok(())
        });

        let first: Handback = Arc::new("first");
        channel.register(listener.clone(), None, Some(first)).unwrap();
        channel.register(listener, None, None).unwrap();
        channel.dispatch(&note("x"));

        let seen = seen.lock().unwrap();
        assert_eq!(*seen, vec![Some("first"), None]);
    }

    #[test]
    fn failing_and_panicking_listeners_are_isolated() {
        let channel = NotificationChannel::detached();
        let failing = Arc::new(|_: &Notification, _: Option<&Handback>| -> Result<(), ListenerError> {
            Err("listener refused".into())
        });
        let panicking = Arc::new(|_: &Notification, _: Option<&Handback>| -> Result<(), ListenerError> {
            panic!("listener blew up")
        });
        let counter = Counter::new();

        channel.register(failing, None, None).unwrap();
        channel.register(panicking, None, None).unwrap();
        channel.register(counter.clone(), None, None).unwrap();

        let outcome = channel.dispatch(&note("x"));
        assert_eq!(counter.count(), 1);
        assert_eq!(outcome.delivered, 1);
        assert_eq!(outcome.failed, 2);
    }

    #[test]
    fn panicking_filter_skips_only_its_listener() {
        let channel = NotificationChannel::detached();
        let counter = Counter::new();
        let bad_filter: Arc<dyn NotificationFilter> = Arc::new(|_: &Notification| -> bool { panic!("filter blew up") });
        channel.register(Counter::new(), Some(bad_filter), None).unwrap();
        channel.register(counter.clone(), None, None).unwrap();

        channel.dispatch(&note("x"));
        assert_eq!(counter.count(), 1);
    }

    #[test]
    fn source_registrations_only_see_their_source() {
        let channel = NotificationChannel::detached();
        let counter = Counter::new();
        tokio_test::block_on(channel.register_for("WebSphere:type=JvmStats", counter.clone(), None, None)).unwrap();

        channel.dispatch(&note("x").with_source("WebSphere:type=JvmStats"));
        channel.dispatch(&note("x").with_source("WebSphere:type=Other"));
        channel.dispatch(&note("x"));

        assert_eq!(counter.count(), 1);
        assert_eq!(channel.subscriptions(), vec!["WebSphere:type=JvmStats".to_string()]);
    }

    #[test]
    fn unregister_stops_delivery() {
        let channel = NotificationChannel::detached();
        let counter = Counter::new();
        let handle = channel.register(counter.clone(), None, None).unwrap();

        channel.dispatch(&note("x"));
        tokio_test::block_on(channel.unregister(handle));
        channel.dispatch(&note("x"));

        assert_eq!(counter.count(), 1);
        assert_eq!(channel.registration_count(), 0);

        // Second unregister is a no-op.
        tokio_test::block_on(channel.unregister(handle));
    }

    #[test]
    fn unregister_from_inside_dispatch_takes_effect_immediately() {
        let channel = NotificationChannel::detached();
        let counter = Counter::new();

        // The first listener removes the second mid-dispatch. The
        // snapshot still holds it, but its active flag is already clear.
        let target = Arc::new(AtomicU64::new(0));
        let inner = Arc::clone(&channel.inner);
        let victim = Arc::clone(&target);
        let remover = Arc::new(move |_: &Notification, _: Option<&Handback>| -> Result<(), ListenerError> {
            let id = victim.load(Ordering::SeqCst);
            inner.remove_where(|r| r.id == id);
            Ok(())
        });
        channel.register(remover, None, None).unwrap();
        let handle = channel.register(counter.clone(), None, None).unwrap();
        target.store(handle.id(), Ordering::SeqCst);

        let outcome = channel.dispatch(&note("x"));
        assert_eq!(counter.count(), 0);
        assert_eq!(outcome.delivered, 1);
        assert_eq!(channel.registration_count(), 1);
    }

    #[test]
    fn unregister_listener_removes_all_its_registrations() {
        let channel = NotificationChannel::detached();
        let counter = Counter::new();
        let listener: Arc<dyn NotificationListener> = counter.clone();
        channel.register(Arc::clone(&listener), None, None).unwrap();
        channel
            .register(
                Arc::clone(&listener),
                Some(Arc::new(TypePrefixFilter::new().enable("app.")) as Arc<dyn NotificationFilter>),
                None,
            )
            .unwrap();
        channel.register(Counter::new(), None, None).unwrap();

        let removed = tokio_test::block_on(channel.unregister_listener(&listener));
        assert_eq!(removed, 2);
        assert_eq!(channel.registration_count(), 1);
    }

    #[test]
    fn close_invalidates_registrations() {
        let channel = NotificationChannel::detached();
        let counter = Counter::new();
        let handle = channel.register(counter.clone(), None, None).unwrap();
        let clone = channel.clone();

        tokio_test::block_on(channel.close());

        assert!(!clone.is_open());
        assert_eq!(clone.registration_count(), 0);
        clone.dispatch(&note("x"));
        assert_eq!(counter.count(), 0);
        assert!(matches!(
            clone.register(Counter::new(), None, None),
            Err(CoreError::NotConnected)
        ));

        // Unregistering after close is still a no-op.
        tokio_test::block_on(clone.unregister(handle));
    }

    #[test]
    fn unregister_during_dispatch_on_another_thread() {
        let channel = NotificationChannel::detached();
        let counter = Counter::new();
        let handle = channel.register(counter.clone(), None, None).unwrap();
        let running = Arc::new(AtomicBool::new(true));

        let dispatcher = {
            let channel = channel.clone();
            let running = Arc::clone(&running);
            std::thread::spawn(move || {
                while running.load(Ordering::SeqCst) {
                    channel.dispatch(&note("tick"));
                }
            })
        };

        while counter.count() < 100 {
            std::thread::yield_now();
        }
        tokio_test::block_on(channel.unregister(handle));
        let at_unregister = counter.count();

        std::thread::sleep(Duration::from_millis(50));
        running.store(false, Ordering::SeqCst);
        dispatcher.join().unwrap();

        // Only an invocation already past the active check may finish.
        let late = counter.count() - at_unregister;
        assert!(late <= 1, "{late} invocations after unregister returned");
        assert_eq!(channel.registration_count(), 0);
    }

    #[test]
    fn rejected_credentials_close_the_channel() {
        let channel = NotificationChannel::detached();
        let counter = Counter::new();
        channel.register(counter.clone(), None, None).unwrap();
        assert_eq!(Arc::strong_count(&counter), 2);

        channel.inner.stopped(&jmxrest_api::Error::Authentication {
            message: "server rejected credentials (HTTP 401)".into(),
        });

        assert!(!channel.is_open());
        assert_eq!(channel.registration_count(), 0);
        assert_eq!(Arc::strong_count(&counter), 1, "listener must be released");
        assert!(matches!(channel.closed_reason(), Some(CoreError::Authentication { .. })));
        match channel.register(Counter::new(), None, None) {
            Err(CoreError::Authentication { message }) => assert!(message.contains("401")),
            other => panic!("expected authentication error, got {other:?}"),
        }

        // Closing a stopped channel still finishes cleanly.
        tokio_test::block_on(channel.close());
        assert!(!channel.is_open());
    }

    #[test]
    fn exhausted_retries_close_the_channel() {
        let channel = NotificationChannel::detached();
        channel.register(Counter::new(), None, None).unwrap();

        channel.inner.stopped(&jmxrest_api::Error::Server {
            status: 503,
            message: "overloaded".into(),
        });

        assert!(!channel.is_open());
        assert!(matches!(
            channel.register(Counter::new(), None, None),
            Err(CoreError::NotConnected)
        ));
    }

    #[test]
    fn inbox_batches_dispatch_in_order() {
        let channel = NotificationChannel::detached();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        channel
            .register(
                Arc::new(move |n: &Notification, _: Option<&Handback>| -> Result<(), ListenerError> {
                    sink.lock().unwrap().push(n.sequence_number);
                    Ok(())
                }),
                None,
                None,
            )
            .unwrap();

        let records = (1..=3)
            .map(|seq| {
                serde_json::from_value::<NotificationRecord>(serde_json::json!({
                    "type": "app.tick",
                    "sequenceNumber": seq
                }))
                .unwrap()
            })
            .collect();
        channel.inner.deliver(records);

        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    }
}
