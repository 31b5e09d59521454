use std::{
    fmt,
    future::Future,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
};

use dashmap::DashMap;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::error::{CourtbotError, Rejection};

pub const RETRIEVE_PARTIES: &str = "retrieve-parties";
pub const RETRIEVE_PARTY_EVENTS: &str = "retrieve-party-events";

/// Name of the broadcast fired when providers of `topic` fail.
pub fn error_topic(topic: &str) -> String {
    format!("{}-error", topic)
}

/// The key a provider is asked about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub case_id: String,
    pub party_id: Option<String>,
}

impl Query {
    pub fn case(case_id: impl Into<String>) -> Self {
        Self { case_id: case_id.into(), party_id: None }
    }

    pub fn party(case_id: impl Into<String>, party_id: impl Into<String>) -> Self {
        Self { case_id: case_id.into(), party_id: Some(party_id.into()) }
    }
}

pub type Pending = BoxFuture<'static, Result<Value, Rejection>>;

/// The per-publish list of pending provider work.
///
/// Handlers only ever see `&mut ResultCollector` while they run, so entries
/// can be appended during the publish call and never afterwards.
#[derive(Default)]
pub struct ResultCollector {
    pending: Vec<Pending>,
}

impl ResultCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a piece of asynchronous provider work.
    pub fn push<F>(&mut self, work: F)
    where
        F: Future<Output = Result<Value, Rejection>> + Send + 'static,
    {
        self.pending.push(Box::pin(work));
    }

    /// Attach an already known value.
    pub fn resolve(&mut self, value: Value) {
        self.push(futures::future::ready(Ok(value)));
    }

    /// Attach an already known failure.
    pub fn reject(&mut self, rejection: impl Into<Rejection>) {
        let rejection = rejection.into();
        self.push(futures::future::ready(Err(rejection)));
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub(crate) fn into_pending(self) -> Vec<Pending> {
        self.pending
    }
}

impl fmt::Debug for ResultCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultCollector")
            .field("pending", &self.pending.len())
            .finish()
    }
}

pub type ProviderHandler = Arc<dyn Fn(&Query, &mut ResultCollector) + Send + Sync>;
pub type ErrorListener = Arc<dyn Fn(&[CourtbotError]) + Send + Sync>;

/// Typed publish/subscribe registry between the core and data providers.
///
/// Build one per process (or per test) and hand it to whoever publishes.
/// Registration is expected at start-up, before traffic.
#[derive(Clone, Default)]
pub struct ProviderBus {
    providers: Arc<DashMap<String, Vec<ProviderHandler>>>,
    error_listeners: Arc<DashMap<String, Vec<ErrorListener>>>,
}

impl ProviderBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a provider handler to a query topic.
    pub fn subscribe<F>(&self, topic: &str, handler: F)
    where
        F: Fn(&Query, &mut ResultCollector) + Send + Sync + 'static,
    {
        debug!(topic, "provider subscribed");
        self.providers
            .entry(topic.to_string())
            .or_default()
            .push(Arc::new(handler));
    }

    /// Listen to the `<topic>-error` broadcast.
    pub fn subscribe_errors<F>(&self, topic: &str, listener: F)
    where
        F: Fn(&[CourtbotError]) + Send + Sync + 'static,
    {
        self.error_listeners
            .entry(error_topic(topic))
            .or_default()
            .push(Arc::new(listener));
    }

    /// Invoke every current subscriber of `topic`, in subscription order, and
    /// hand back whatever work they attached.
    pub fn publish(&self, topic: &str, query: &Query) -> ResultCollector {
        // 1) clone the handler list so no map lock is held while handlers run
        let handlers: Vec<ProviderHandler> = match self.providers.get(topic) {
            Some(entry) => entry.value().clone(),
            None => Vec::new(),
        };

        // 2) let each one attach its work; a panicking handler counts as a rejection
        let mut collector = ResultCollector::new();
        for handler in handlers {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| handler(query, &mut collector))) {
                warn!(topic, "provider handler panicked");
                collector.reject(Rejection::from_panic(payload));
            }
        }
        trace!(topic, pending = collector.len(), "published query");
        collector
    }

    /// Fire the `<topic>-error` broadcast. Listeners cannot fail the caller.
    pub fn emit_errors(&self, topic: &str, errors: &[CourtbotError]) {
        let listeners: Vec<ErrorListener> = match self.error_listeners.get(&error_topic(topic)) {
            Some(entry) => entry.value().clone(),
            None => Vec::new(),
        };
        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(errors))).is_err() {
                warn!(topic, "error listener panicked");
            }
        }
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.providers.get(topic).map(|e| e.len()).unwrap_or(0)
    }

    /// Drop every provider and error listener.
    pub fn unsubscribe_all(&self) {
        self.providers.clear();
        self.error_listeners.clear();
    }
}

impl fmt::Debug for ProviderBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let topics: Vec<(String, usize)> = self
            .providers
            .iter()
            .map(|kv| (kv.key().clone(), kv.value().len()))
            .collect();
        f.debug_struct("ProviderBus")
            .field("topics", &topics)
            .field("error_topics", &self.error_listeners.len())
            .finish()
    }
}
