//! Delivery policies and the dispatcher that applies them.

use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tracing::{debug, trace};

use crate::{ExecutionContext, Job, Subscription, SubscriptionId, WorkerQueue};

/// Where and when a handler runs relative to the call that triggered the event.
#[derive(Clone, Default)]
#[non_exhaustive]
pub enum Delivery {
    /// On the triggering thread, before `trigger()` returns.
    #[default]
    Immediate,

    /// As soon as possible on the given execution context. `trigger()` does not wait for it.
    Queued(Arc<dyn ExecutionContext>),

    /// No earlier than `delay` after the trigger, on `context` if given, otherwise on the
    /// event's default background context.
    Delayed {
        /// Where to run the handler. `None` means the event's default background context.
        context: Option<Arc<dyn ExecutionContext>>,

        /// Minimum time between the trigger and the handler call.
        delay: Duration,
    },
}

impl Delivery {
    /// On the triggering thread, before `trigger()` returns.
    #[must_use]
    pub fn immediate() -> Self {
        Self::Immediate
    }

    /// As soon as possible on `context`.
    #[must_use]
    pub fn queued(context: impl ExecutionContext) -> Self {
        Self::Queued(Arc::new(context))
    }

    /// After `delay`, on the event's default background context.
    #[must_use]
    pub fn delayed(delay: Duration) -> Self {
        Self::Delayed {
            context: None,
            delay,
        }
    }

    /// After `delay`, on `context`.
    #[must_use]
    pub fn delayed_on(context: impl ExecutionContext, delay: Duration) -> Self {
        Self::Delayed {
            context: Some(Arc::new(context)),
            delay,
        }
    }

    /// Whether the handler runs on the triggering thread.
    #[must_use]
    pub fn is_immediate(&self) -> bool {
        matches!(self, Self::Immediate)
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Immediate => write!(f, "Immediate"),
            Self::Queued(context) => f.debug_tuple("Queued").field(context).finish(),
            Self::Delayed { context, delay } => f
                .debug_struct("Delayed")
                .field("context", context)
                .field("delay", delay)
                .finish(),
        }
    }
}

/// Invokes handlers according to their delivery policy and counts the invocations.
pub(crate) struct Dispatcher {
    name: Cow<'static, str>,
    handled: AtomicU64,

    // Used by `Delivery::Delayed` without an explicit context. Created on first use unless the
    // event was built with a default context.
    default_context: OnceLock<Arc<dyn ExecutionContext>>,
}

impl Dispatcher {
    pub(crate) fn new(
        name: Cow<'static, str>,
        default_context: Option<Arc<dyn ExecutionContext>>,
    ) -> Self {
        Self {
            name,
            handled: AtomicU64::new(0),
            default_context: default_context.map_or_else(OnceLock::new, OnceLock::from),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn handled(&self) -> u64 {
        self.handled.load(Ordering::Relaxed)
    }

    fn default_context(&self) -> &Arc<dyn ExecutionContext> {
        self.default_context.get_or_init(|| {
            debug!(event = %self.name, "starting default background context");
            Arc::new(WorkerQueue::new(format!("{}-background", self.name)))
        })
    }

    /// Calls the handler right here if the owner is still alive. Otherwise hands the
    /// subscription to `on_dead` for removal.
    pub(crate) fn deliver<T, H, F>(&self, record: &Subscription<H>, payload: T, on_dead: F)
    where
        H: ?Sized + Fn(T),
        F: FnOnce(SubscriptionId),
    {
        if record.owner().is_alive() {
            (record.handler())(payload);
            self.handled.fetch_add(1, Ordering::Relaxed);
        } else {
            debug!(
                event = %self.name,
                subscription = ?record.id(),
                "owner dropped before delivery, removing subscription"
            );
            on_dead(record.id());
        }
    }

    /// Delivers the payload according to the subscription's delivery policy.
    ///
    /// Immediate deliveries complete before this returns. Queued and delayed ones are only
    /// scheduled; the owner liveness check happens when they run.
    pub(crate) fn dispatch<T, H, F>(
        self: &Arc<Self>,
        record: &Arc<Subscription<H>>,
        payload: T,
        on_dead: F,
    ) where
        T: Send + 'static,
        H: ?Sized + Fn(T) + Send + Sync + 'static,
        F: FnOnce(SubscriptionId) + Send + 'static,
    {
        match record.delivery() {
            Delivery::Immediate => self.deliver(record, payload, on_dead),
            Delivery::Queued(context) => {
                trace!(event = %self.name, subscription = ?record.id(), "queueing delivery");
                context.execute(self.job(record, payload, on_dead));
            }
            Delivery::Delayed { context, delay } => {
                trace!(
                    event = %self.name,
                    subscription = ?record.id(),
                    ?delay,
                    "scheduling delayed delivery"
                );
                let context = context.as_ref().unwrap_or_else(|| self.default_context());
                context.execute_after(*delay, self.job(record, payload, on_dead));
            }
        }
    }

    fn job<T, H, F>(self: &Arc<Self>, record: &Arc<Subscription<H>>, payload: T, on_dead: F) -> Job
    where
        T: Send + 'static,
        H: ?Sized + Fn(T) + Send + Sync + 'static,
        F: FnOnce(SubscriptionId) + Send + 'static,
    {
        let dispatcher = Arc::clone(self);
        let record = Arc::clone(record);

        Box::new(move || dispatcher.deliver(&record, payload, on_dead))
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("name", &self.name)
            .field("handled", &self.handled())
            .finish_non_exhaustive()
    }
}
