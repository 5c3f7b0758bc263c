//! In-process publish/subscribe for probe events
//!
//! ## Delivery policy
//!
//! - `dispatch` never waits for handlers. Every handler of the event's kind runs in its own
//!   task, so there is no ordering between handlers.
//! - Running handlers are capped by a semaphore. Tasks over the cap wait for a permit inside
//!   the task; the dispatcher itself is never blocked.
//! - Handler tasks alive at once (running or waiting) are capped by a second, larger semaphore
//!   whose permit is taken with `try_acquire` before spawning. When it is exhausted the delivery
//!   is dropped, logged at `warn` and counted in [`BusStats::dropped`].
//! - A handler error is logged at `warn` and counted. It is never retried and never reaches the
//!   dispatcher.
//! - [`EventBus::shutdown`] waits for every handler task that was already spawned.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::{debug, trace, warn};

use crate::model::TargetId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ProbeSucceeded,
    ProbeFailed,
}

impl EventKind {
    pub fn from_success(success: bool) -> Self {
        if success {
            EventKind::ProbeSucceeded
        } else {
            EventKind::ProbeFailed
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::ProbeSucceeded => "ping.successful",
            EventKind::ProbeFailed => "ping.unsuccessful",
        }
    }
}

/// Domain event emitted by the result aggregator for every flushed outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeEvent {
    pub kind: EventKind,
    pub target_id: TargetId,
    pub address: String,
    pub observed_at: DateTime<Utc>,
}

impl ProbeEvent {
    pub fn succeeded(&self) -> bool {
        self.kind == EventKind::ProbeSucceeded
    }
}

/// Subscriber to one or more event kinds
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Name used in log lines
    fn name(&self) -> &str;

    async fn handle(&self, event: &ProbeEvent) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusStats {
    pub dispatched: u64,
    pub handled: u64,
    pub failed: u64,
    /// Deliveries skipped because the handler backlog was full
    pub dropped: u64,
}

#[derive(Debug, Default)]
struct Counters {
    dispatched: AtomicU64,
    handled: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

/// Handler tasks allowed to exist at once when no backlog is given
pub const DEFAULT_HANDLER_BACKLOG: usize = 1024;

type HandlerMap = HashMap<EventKind, Vec<Arc<dyn EventHandler>>>;

pub struct EventBus {
    handlers: RwLock<HandlerMap>,
    limiter: Arc<Semaphore>,
    backlog: Arc<Semaphore>,
    tracker: TaskTracker,
    counters: Arc<Counters>,
}

impl EventBus {
    pub fn new(max_concurrent_handlers: usize) -> Self {
        Self::with_backlog(max_concurrent_handlers, DEFAULT_HANDLER_BACKLOG)
    }

    /// Bus running at most `max_concurrent_handlers` handlers, with at most `max_pending_handlers`
    /// handler tasks alive in total
    pub fn with_backlog(max_concurrent_handlers: usize, max_pending_handlers: usize) -> Self {
        let running = max_concurrent_handlers.max(1);
        Self {
            handlers: RwLock::new(HashMap::new()),
            limiter: Arc::new(Semaphore::new(running)),
            backlog: Arc::new(Semaphore::new(max_pending_handlers.max(running))),
            tracker: TaskTracker::new(),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Register `handler` for `kind`; handlers of one kind keep subscription order
    pub fn subscribe(&self, kind: EventKind, handler: Arc<dyn EventHandler>) {
        match self.handlers.write() {
            Ok(mut handlers) => {
                debug!("subscribing {} to {}", handler.name(), kind.as_str());
                handlers.entry(kind).or_default().push(handler);
            }
            Err(_) => warn!("handler table poisoned, {} not subscribed", handler.name()),
        }
    }

    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers
            .read()
            .map(|handlers| handlers.get(&kind).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    /// Start every handler of the event's kind and return how many were started
    ///
    /// Handlers that find the backlog full are skipped and counted as dropped.
    pub fn dispatch(&self, event: ProbeEvent) -> usize {
        let handlers = match self.handlers.read() {
            Ok(handlers) => handlers.get(&event.kind).cloned().unwrap_or_default(),
            Err(_) => {
                warn!("handler table poisoned, dropping {:?}", event.kind);
                return 0;
            }
        };

        self.counters.dispatched.fetch_add(1, Ordering::Relaxed);
        if handlers.is_empty() {
            trace!("no handlers for {}", event.kind.as_str());
            return 0;
        }

        let event = Arc::new(event);
        let mut started = 0;
        for handler in &handlers {
            let Ok(slot) = self.backlog.clone().try_acquire_owned() else {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "handler backlog full, {} skipped {} for target {}",
                    handler.name(),
                    event.kind.as_str(),
                    event.target_id
                );
                continue;
            };

            let handler = handler.clone();
            let event = event.clone();
            let limiter = self.limiter.clone();
            let counters = self.counters.clone();

            started += 1;
            self.tracker.spawn(async move {
                let _slot = slot;
                let Ok(_permit) = limiter.acquire_owned().await else {
                    return;
                };

                match handler.handle(&event).await {
                    Ok(()) => {
                        counters.handled.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        counters.failed.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            "{} failed on {} for target {}: {e:#}",
                            handler.name(),
                            event.kind.as_str(),
                            event.target_id
                        );
                    }
                }
            });
        }

        started
    }

    pub fn stats(&self) -> BusStats {
        BusStats {
            dispatched: self.counters.dispatched.load(Ordering::Relaxed),
            handled: self.counters.handled.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    /// Wait until every handler task started so far has finished
    ///
    /// Events dispatched while waiting are still delivered.
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Wait for in-flight handlers, then stop accepting permits
    pub async fn shutdown(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.limiter.close();
        debug!("event bus stopped");
    }
}
