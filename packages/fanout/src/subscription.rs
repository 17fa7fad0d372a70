//! Subscription records and the options used to create them.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::{Delivery, OwnerId, OwnerProbe};

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque token identifying one subscription on an event.
///
/// Returned by the `subscribe` family of methods and accepted by `unsubscribe_id()` to remove
/// exactly that subscription, leaving other subscriptions of the same owner in place.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    fn next() -> Self {
        Self(NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// How a new subscription should be delivered.
///
/// The default is immediate delivery on the triggering thread, repeated for every trigger until
/// the subscription is removed.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
///
/// use fanout::{Delivery, SubscribeOptions, WorkerQueue};
///
/// let queue = WorkerQueue::new("background");
///
/// // Delivered once, a second after the trigger, on the worker.
/// let options = SubscribeOptions::new()
///     .delivery(Delivery::delayed_on(queue, Duration::from_secs(1)))
///     .onetime();
/// ```
#[derive(Clone, Debug, Default)]
pub struct SubscribeOptions {
    delivery: Delivery,
    onetime: bool,
}

impl SubscribeOptions {
    /// Immediate, persistent delivery.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets where and when the handler runs.
    #[must_use]
    pub fn delivery(self, delivery: Delivery) -> Self {
        Self { delivery, ..self }
    }

    /// Delivers to the handler at most once.
    ///
    /// The subscription is removed when the first trigger claims it, before the handler runs,
    /// so a handler that panics is not retained.
    #[must_use]
    pub fn onetime(self) -> Self {
        Self {
            onetime: true,
            ..self
        }
    }

    pub(crate) fn into_parts(self) -> (Delivery, bool) {
        (self.delivery, self.onetime)
    }
}

/// One registration of a handler on an event.
///
/// `H` is the unsized handler type, which differs between the thread-safe and the
/// single-threaded events.
pub(crate) struct Subscription<H: ?Sized> {
    id: SubscriptionId,
    owner: OwnerProbe,
    delivery: Delivery,
    onetime: bool,

    // Set by the first trigger that dispatches a one-time subscription. Triggers racing on other
    // threads, or re-entrant triggers from inside a handler, may still see the record in their
    // snapshot before it is removed; this makes sure only one of them delivers it.
    fired: AtomicBool,

    handler: Arc<H>,
}

impl<H: ?Sized> Subscription<H> {
    pub(crate) fn new(
        owner: OwnerProbe,
        delivery: Delivery,
        onetime: bool,
        handler: Arc<H>,
    ) -> Self {
        Self {
            id: SubscriptionId::next(),
            owner,
            delivery,
            onetime,
            fired: AtomicBool::new(false),
            handler,
        }
    }

    pub(crate) fn id(&self) -> SubscriptionId {
        self.id
    }

    pub(crate) fn owner(&self) -> &OwnerProbe {
        &self.owner
    }

    pub(crate) fn owner_id(&self) -> OwnerId {
        self.owner.id()
    }

    pub(crate) fn delivery(&self) -> &Delivery {
        &self.delivery
    }

    pub(crate) fn is_onetime(&self) -> bool {
        self.onetime
    }

    pub(crate) fn handler(&self) -> &H {
        &self.handler
    }

    /// Claims the right to dispatch this subscription for the current trigger.
    ///
    /// Always succeeds for persistent subscriptions. Succeeds exactly once for one-time ones.
    pub(crate) fn claim(&self) -> bool {
        !self.onetime || !self.fired.swap(true, Ordering::AcqRel)
    }
}

impl<H: ?Sized> fmt::Debug for Subscription<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("owner", &self.owner.id())
            .field("delivery", &self.delivery)
            .field("onetime", &self.onetime)
            .finish_non_exhaustive()
    }
}
