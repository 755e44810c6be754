//! Router: registration, enqueue policy, and the dispatch state machine.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::backoff;
use crate::context::DispatchContext;
use crate::domain::{DispatchError, Message, PatternError, QueueKey, StoreError};
use crate::matcher::MatchOptions;
use crate::ports::clock::{Clock, SystemClock};
use crate::ports::store::{CommitResult, DeliveryHandler, EnqueueOptions, QueueStore};
use crate::route::{Handler, Route};

/// Construction-time policy, fixed for the router's lifetime.
#[derive(Debug, Clone)]
pub struct RouterOptions {
    /// Prepend a fresh dead-letter key to every enqueue.
    pub enable_dlq: bool,
    /// Key prefix for generated dead-letter slots.
    pub dlq_prefix: QueueKey,
    /// Default wait before first delivery, overridable per enqueue.
    pub delay: Option<Duration>,
    /// Explicit backoff schedule; `None` freezes one jittered draw from the
    /// stock policy at construction.
    pub backoff_schedule: Option<Vec<Duration>>,
    /// Fail deliveries that are not shaped like a [`Message`], making the
    /// queue retry and eventually dead-letter them. When off they are
    /// acknowledged and dropped.
    pub reject_foreign: bool,
    /// Same policy for well-formed messages no route matches.
    pub reject_unmatched: bool,
    /// Pattern-compilation options applied by `on`.
    pub match_options: MatchOptions,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            enable_dlq: false,
            dlq_prefix: ["herd", "dlq"].into_iter().collect(),
            delay: None,
            backoff_schedule: None,
            reject_foreign: true,
            reject_unmatched: true,
            match_options: MatchOptions::default(),
        }
    }
}

/// Per-enqueue envelope content and delivery overrides.
#[derive(Debug, Clone, Default)]
pub struct EnqueueInit {
    pub body: Value,
    pub headers: Option<HashMap<String, String>>,
    /// Overrides the router-level delay when set.
    pub delay: Option<Duration>,
    /// Overrides the router's frozen schedule when set.
    pub backoff_schedule: Option<Vec<Duration>>,
    /// Caller-supplied dead-letter keys, appended after the generated one.
    pub keys_if_undelivered: Vec<QueueKey>,
}

#[derive(Debug, Default)]
pub struct ListenOptions {
    /// When the value flips to `true` the store handle is closed, which
    /// settles the delivery loop. In-flight handlers are not cancelled.
    pub shutdown: Option<watch::Receiver<bool>>,
}

/// Message-dispatch router over a durable queue store.
///
/// Routes are wired with [`Router::on`] before [`Router::listen`] starts;
/// registering while deliveries are in flight is not supported. Dispatch
/// itself never mutates the route table.
pub struct Router {
    store: Arc<dyn QueueStore>,
    clock: Arc<dyn Clock>,
    routes: RwLock<Vec<Route>>,
    backoff_schedule: Vec<Duration>,
    dlq_prefix: QueueKey,
    delay: Option<Duration>,
    enable_dlq: bool,
    reject_foreign: bool,
    reject_unmatched: bool,
    match_options: MatchOptions,
}

impl Router {
    pub fn new(store: Arc<dyn QueueStore>, options: RouterOptions) -> Arc<Self> {
        Self::with_clock(store, options, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn QueueStore>,
        options: RouterOptions,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let backoff_schedule = options
            .backoff_schedule
            .unwrap_or_else(backoff::default_schedule);
        Arc::new(Self {
            store,
            clock,
            routes: RwLock::new(Vec::new()),
            backoff_schedule,
            dlq_prefix: options.dlq_prefix,
            delay: options.delay,
            enable_dlq: options.enable_dlq,
            reject_foreign: options.reject_foreign,
            reject_unmatched: options.reject_unmatched,
            match_options: options.match_options,
        })
    }

    /// Compile `pattern` and register `handler` for it. Registering the same
    /// literal pattern again replaces the handler in place, keeping the
    /// original position in the first-match-wins order.
    pub fn on(&self, pattern: &str, handler: Arc<dyn Handler>) -> Result<(), PatternError> {
        let route = Route::new(pattern, handler, self.match_options)?;
        let mut routes = self.routes.write().unwrap();
        if let Some(slot) = routes.iter_mut().find(|r| r.pattern() == pattern) {
            debug!(pattern, "route handler replaced");
            *slot = route;
        } else {
            debug!(pattern, "route registered");
            routes.push(route);
        }
        Ok(())
    }

    /// Build the message envelope and hand it to the store.
    ///
    /// When the DLQ is enabled the undelivered-key list starts with
    /// `dlq_prefix + <enqueue-time millis>`, so every enqueued message gets
    /// its own dead-letter slot stamped now, not at redelivery time.
    pub async fn enqueue(&self, path: &str, init: EnqueueInit) -> Result<CommitResult, StoreError> {
        let message = Message::new(path, init.body, init.headers.unwrap_or_default());

        let mut keys = Vec::with_capacity(init.keys_if_undelivered.len() + 1);
        if self.enable_dlq {
            let mut key = self.dlq_prefix.clone();
            key.push(self.clock.now_millis());
            keys.push(key);
        }
        keys.extend(init.keys_if_undelivered);

        let options = EnqueueOptions {
            backoff_schedule: init
                .backoff_schedule
                .unwrap_or_else(|| self.backoff_schedule.clone()),
            delay: init.delay.or(self.delay),
            keys_if_undelivered: keys,
        };

        let value = serde_json::to_value(&message)?;
        self.store.enqueue(value, options).await
    }

    /// Subscribe the dispatch handler to the store's delivery loop. Completes
    /// once the store is closed, either via the shutdown signal or by a
    /// direct `close` on the handle.
    pub async fn listen(self: Arc<Self>, options: ListenOptions) -> Result<(), StoreError> {
        if let Some(mut shutdown) = options.shutdown {
            let store = Arc::clone(&self.store);
            tokio::spawn(async move {
                loop {
                    if *shutdown.borrow() {
                        store.close().await;
                        break;
                    }
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                }
            });
        }

        let store = Arc::clone(&self.store);
        store
            .listen_queue(Arc::new(RouterDispatcher { router: self }))
            .await
    }

    /// One delivered value through the state machine:
    /// validate, then match, then invoke; classify failures on the way.
    pub async fn dispatch(self: Arc<Self>, value: Value) -> Result<(), DispatchError> {
        // Validating
        let message = match Message::parse(value) {
            Ok(message) => message,
            Err(defect) => {
                warn!(%defect, "delivered value failed message validation");
                return if self.reject_foreign {
                    Err(DispatchError::Malformed(defect))
                } else {
                    Ok(())
                };
            }
        };

        // Matching: first registered-and-current route wins, no fallthrough.
        let matched = {
            let routes = self.routes.read().unwrap();
            routes
                .iter()
                .find_map(|route| route.matches(&message.path).map(|params| (route.clone(), params)))
        };

        let Some((route, params)) = matched else {
            warn!(path = %message.path, "no route matched");
            return if self.reject_unmatched {
                Err(DispatchError::NoRouteMatched(message.path))
            } else {
                Ok(())
            };
        };

        // Dispatching
        let path = message.path.clone();
        debug!(%path, pattern = route.pattern(), "route matched");
        let ctx = DispatchContext::new(message, params, Arc::clone(&self));
        route.handle(ctx).await.map_err(|error| {
            info!(%path, pattern = route.pattern(), %error, "handler failed");
            DispatchError::Handler(error)
        })
    }

    pub fn store(&self) -> &Arc<dyn QueueStore> {
        &self.store
    }

    pub fn backoff_schedule(&self) -> &[Duration] {
        &self.backoff_schedule
    }

    pub fn dlq_prefix(&self) -> &QueueKey {
        &self.dlq_prefix
    }

    pub fn route_count(&self) -> usize {
        self.routes.read().unwrap().len()
    }
}

/// Adapter the store calls back into; keeps `DeliveryHandler` off the public
/// surface of `Router` itself.
struct RouterDispatcher {
    router: Arc<Router>,
}

#[async_trait]
impl DeliveryHandler for RouterDispatcher {
    async fn deliver(&self, value: Value) -> Result<(), DispatchError> {
        Arc::clone(&self.router).dispatch(value).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BoxError, KeyPart, MessageDefect, MessageId};
    use crate::impls::InMemoryStore;
    use crate::matcher::PathParams;
    use crate::ports::clock::FixedClock;
    use chrono::{DateTime, Utc};
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct RecordingHandler {
        calls: Mutex<Vec<(String, PathParams, HashMap<String, String>)>>,
    }

    impl RecordingHandler {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<(String, PathParams, HashMap<String, String>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Handler for RecordingHandler {
        async fn handle(&self, ctx: DispatchContext) -> Result<(), BoxError> {
            self.calls.lock().unwrap().push((
                ctx.path().to_string(),
                ctx.params().clone(),
                ctx.headers().clone(),
            ));
            Ok(())
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl Handler for FailingHandler {
        async fn handle(&self, _ctx: DispatchContext) -> Result<(), BoxError> {
            Err("boom".into())
        }
    }

    /// Store that records enqueues and never delivers; for policy tests that
    /// only exercise the enqueue surface.
    #[derive(Default)]
    struct RecordingStore {
        enqueued: Mutex<Vec<(Value, EnqueueOptions)>>,
    }

    impl RecordingStore {
        fn enqueued(&self) -> Vec<(Value, EnqueueOptions)> {
            self.enqueued.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl QueueStore for RecordingStore {
        async fn enqueue(
            &self,
            value: Value,
            options: EnqueueOptions,
        ) -> Result<CommitResult, StoreError> {
            self.enqueued.lock().unwrap().push((value, options));
            Ok(CommitResult {
                id: MessageId::new(),
            })
        }

        async fn listen_queue(&self, _handler: Arc<dyn DeliveryHandler>) -> Result<(), StoreError> {
            Ok(())
        }

        async fn close(&self) {}
    }

    fn router(options: RouterOptions) -> Arc<Router> {
        Router::new(Arc::new(InMemoryStore::new()), options)
    }

    fn valid_message(path: &str) -> Value {
        json!({ "path": path, "body": 1, "headers": {} })
    }

    #[tokio::test]
    async fn dispatches_to_matching_route_with_params() {
        let r = router(RouterOptions::default());
        let handler = RecordingHandler::new();
        r.on("/users/:id", handler.clone()).unwrap();

        r.clone()
            .dispatch(json!({
                "path": "/users/42",
                "body": { "op": "sync" },
                "headers": { "trace": "t1" },
            }))
            .await
            .unwrap();

        let calls = handler.calls();
        assert_eq!(calls.len(), 1);
        let (path, params, headers) = &calls[0];
        assert_eq!(path, "/users/42");
        assert_eq!(params.get("id").map(String::as_str), Some("42"));
        assert_eq!(headers.get("trace").map(String::as_str), Some("t1"));
    }

    #[tokio::test]
    async fn first_registered_matching_route_wins() {
        let r = router(RouterOptions::default());
        let first = RecordingHandler::new();
        let second = RecordingHandler::new();
        r.on("/events/:kind", first.clone()).unwrap();
        r.on("/events/:other", second.clone()).unwrap();

        r.clone().dispatch(valid_message("/events/tick")).await.unwrap();

        assert_eq!(first.calls().len(), 1);
        assert!(second.calls().is_empty());
    }

    #[tokio::test]
    async fn reregistration_replaces_in_place() {
        let r = router(RouterOptions::default());
        let original = RecordingHandler::new();
        let shadow = RecordingHandler::new();
        let replacement = RecordingHandler::new();

        r.on("/jobs/:id", original.clone()).unwrap();
        r.on("/jobs/backup", shadow.clone()).unwrap();
        // Same literal pattern: replaces the handler but keeps position 0,
        // so the literal route registered later still never fires.
        r.on("/jobs/:id", replacement.clone()).unwrap();
        assert_eq!(r.route_count(), 2);

        r.clone().dispatch(valid_message("/jobs/backup")).await.unwrap();

        assert!(original.calls().is_empty());
        assert!(shadow.calls().is_empty());
        assert_eq!(replacement.calls().len(), 1);
    }

    #[tokio::test]
    async fn handler_failure_propagates_regardless_of_policy() {
        let r = router(RouterOptions {
            reject_foreign: false,
            reject_unmatched: false,
            ..RouterOptions::default()
        });
        r.on("/x", Arc::new(FailingHandler)).unwrap();

        let err = r.clone().dispatch(valid_message("/x")).await.unwrap_err();
        assert!(matches!(err, DispatchError::Handler(_)));
    }

    #[tokio::test]
    async fn unmatched_message_follows_reject_policy() {
        let r = router(RouterOptions::default());
        let err = r.clone().dispatch(valid_message("/nowhere")).await.unwrap_err();
        assert!(matches!(err, DispatchError::NoRouteMatched(path) if path == "/nowhere"));

        let lenient = router(RouterOptions {
            reject_unmatched: false,
            ..RouterOptions::default()
        });
        lenient.clone().dispatch(valid_message("/nowhere")).await.unwrap();
    }

    #[tokio::test]
    async fn foreign_value_follows_reject_policy() {
        let r = router(RouterOptions::default());
        let err = r.clone().dispatch(json!("not a message")).await.unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Malformed(MessageDefect::NotAnObject)
        ));

        let lenient = router(RouterOptions {
            reject_foreign: false,
            ..RouterOptions::default()
        });
        lenient.clone().dispatch(json!("not a message")).await.unwrap();
    }

    #[tokio::test]
    async fn bad_pattern_fails_at_registration() {
        let r = router(RouterOptions::default());
        let err = r.on("/broken/:", RecordingHandler::new()).unwrap_err();
        assert!(matches!(err, PatternError::EmptyParamName { .. }));
        assert_eq!(r.route_count(), 0);
    }

    #[tokio::test]
    async fn enqueue_with_dlq_prepends_timestamped_key() {
        let store = Arc::new(RecordingStore::default());
        let clock = FixedClock(DateTime::<Utc>::from_timestamp_millis(1_700_000_000_000).unwrap());
        let r = Router::with_clock(
            store.clone(),
            RouterOptions {
                enable_dlq: true,
                ..RouterOptions::default()
            },
            Arc::new(clock),
        );

        let caller_key: QueueKey = ["audit", "undelivered"].into_iter().collect();
        r.enqueue(
            "/x",
            EnqueueInit {
                keys_if_undelivered: vec![caller_key.clone()],
                ..EnqueueInit::default()
            },
        )
        .await
        .unwrap();

        let enqueued = store.enqueued();
        assert_eq!(enqueued.len(), 1);
        let (value, options) = &enqueued[0];
        assert_eq!(value["path"], "/x");
        assert_eq!(value["headers"], json!({}));

        assert_eq!(options.keys_if_undelivered.len(), 2);
        let dlq_key = &options.keys_if_undelivered[0];
        assert!(dlq_key.starts_with(r.dlq_prefix()));
        assert_eq!(
            dlq_key.parts().last(),
            Some(&KeyPart::Int(1_700_000_000_000))
        );
        assert_eq!(options.keys_if_undelivered[1], caller_key);
    }

    #[tokio::test]
    async fn enqueue_without_dlq_passes_caller_keys_through() {
        let store = Arc::new(RecordingStore::default());
        let r = Router::new(store.clone(), RouterOptions::default());

        r.enqueue("/x", EnqueueInit::default()).await.unwrap();

        let enqueued = store.enqueued();
        assert!(enqueued[0].1.keys_if_undelivered.is_empty());
    }

    #[tokio::test]
    async fn enqueue_overrides_beat_router_defaults() {
        let store = Arc::new(RecordingStore::default());
        let r = Router::new(
            store.clone(),
            RouterOptions {
                delay: Some(Duration::from_secs(5)),
                backoff_schedule: Some(vec![Duration::from_secs(1)]),
                ..RouterOptions::default()
            },
        );

        r.enqueue("/a", EnqueueInit::default()).await.unwrap();
        r.enqueue(
            "/b",
            EnqueueInit {
                delay: Some(Duration::from_millis(10)),
                backoff_schedule: Some(vec![Duration::from_millis(20)]),
                ..EnqueueInit::default()
            },
        )
        .await
        .unwrap();

        let enqueued = store.enqueued();
        assert_eq!(enqueued[0].1.delay, Some(Duration::from_secs(5)));
        assert_eq!(enqueued[0].1.backoff_schedule, vec![Duration::from_secs(1)]);
        assert_eq!(enqueued[1].1.delay, Some(Duration::from_millis(10)));
        assert_eq!(
            enqueued[1].1.backoff_schedule,
            vec![Duration::from_millis(20)]
        );
    }

    #[tokio::test]
    async fn frozen_schedule_is_reused_across_enqueues() {
        let store = Arc::new(RecordingStore::default());
        let r = Router::new(store.clone(), RouterOptions::default());

        r.enqueue("/a", EnqueueInit::default()).await.unwrap();
        r.enqueue("/b", EnqueueInit::default()).await.unwrap();

        let enqueued = store.enqueued();
        assert_eq!(enqueued[0].1.backoff_schedule, enqueued[1].1.backoff_schedule);
        assert_eq!(enqueued[0].1.backoff_schedule, r.backoff_schedule());
    }

    /// End to end through the in-memory store: a route that keeps failing is
    /// redelivered per schedule and lands in its dead-letter slot, then the
    /// shutdown signal settles the listen loop.
    #[tokio::test]
    async fn failed_messages_dead_letter_through_the_store() {
        let store = Arc::new(InMemoryStore::new());
        let r = Router::new(
            store.clone(),
            RouterOptions {
                enable_dlq: true,
                ..RouterOptions::default()
            },
        );

        let attempts = Arc::new(AtomicU32::new(0));
        struct CountingFailure(Arc<AtomicU32>);

        #[async_trait]
        impl Handler for CountingFailure {
            async fn handle(&self, _ctx: DispatchContext) -> Result<(), BoxError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Err("still failing".into())
            }
        }

        r.on("/flaky", Arc::new(CountingFailure(attempts.clone())))
            .unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let listen = tokio::spawn(r.clone().listen(ListenOptions {
            shutdown: Some(shutdown_rx),
        }));

        r.enqueue(
            "/flaky",
            EnqueueInit {
                body: json!({ "n": 1 }),
                backoff_schedule: Some(vec![
                    Duration::from_millis(10),
                    Duration::from_millis(20),
                ]),
                ..EnqueueInit::default()
            },
        )
        .await
        .unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;

        // Initial delivery plus one redelivery per schedule entry.
        assert_eq!(attempts.load(Ordering::SeqCst), 3);

        let keys = store.dead_letter_keys().await;
        assert_eq!(keys.len(), 1);
        assert!(keys[0].starts_with(r.dlq_prefix()));
        let dead = store.dead_letter(&keys[0]).await.unwrap();
        assert_eq!(dead["path"], "/flaky");

        shutdown_tx.send(true).unwrap();
        listen.await.unwrap().unwrap();
    }
}
