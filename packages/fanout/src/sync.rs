//! Thread-safe multi-subscriber events.
//!
//! All registry access goes through one mutex. Triggering copies the registry under that mutex,
//! releases it and only then calls handlers, so handlers may subscribe, unsubscribe or trigger
//! on the same event without deadlocking.

use std::any::type_name;
use std::borrow::Cow;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::{
    Dispatcher, ExecutionContext, Owner, Registry, SubscribeOptions, Subscription, SubscriptionId,
};

const DEFAULT_NAME: &str = "event";

pub(crate) type SyncHandler<T> = dyn Fn(T) + Send + Sync;

struct EventCore<T> {
    registry: Mutex<Registry<SyncHandler<T>>>,
    triggers: AtomicU64,
    dispatcher: Arc<Dispatcher>,
}

impl<T> EventCore<T> {
    fn name(&self) -> &str {
        self.dispatcher.name()
    }
}

/// A typed event that any number of owners can subscribe to, safe to use from many threads.
///
/// Handlers are called in subscription order every time the event is triggered. Where a handler
/// runs is decided per subscription by its [`Delivery`][crate::Delivery] policy.
///
/// Subscriptions are tied to an [`Owner`]. When the owner is dropped, its subscriptions stop
/// receiving deliveries and are removed from the event the next time it is triggered or
/// subscribed to.
///
/// Cloning an `Event` creates another handle to the same event.
///
/// For single-threaded use with handlers that are not `Send`, see
/// [`LocalEvent`][crate::LocalEvent].
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicU32, Ordering};
///
/// use fanout::{Event, Owner};
///
/// let event = Event::<u32>::new();
/// let owner = Owner::new();
/// let total = Arc::new(AtomicU32::new(0));
///
/// let total_clone = Arc::clone(&total);
/// event.subscribe(&owner, move |value| {
///     total_clone.fetch_add(value, Ordering::Relaxed);
/// });
///
/// event.trigger(2);
/// event.trigger(3);
///
/// assert_eq!(total.load(Ordering::Relaxed), 5);
/// assert_eq!(event.triggers_count(), 2);
/// ```
pub struct Event<T> {
    core: Arc<EventCore<T>>,
}

impl<T> Event<T>
where
    T: Clone + Send + 'static,
{
    /// Creates an event with default settings.
    ///
    /// Use [`Event::builder()`] to customize the event.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Creates a builder for configuring an event.
    #[must_use]
    pub fn builder() -> EventBuilder<T> {
        EventBuilder::new()
    }

    /// Name of the event, as given to the builder.
    #[must_use]
    pub fn name(&self) -> &str {
        self.core.name()
    }

    /// Subscribes a handler on behalf of `owner` with immediate, persistent delivery.
    ///
    /// The same owner may subscribe any number of times; each subscription is delivered
    /// separately.
    pub fn subscribe<F>(&self, owner: &Owner, handler: F) -> SubscriptionId
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        self.subscribe_with(owner, SubscribeOptions::new(), handler)
    }

    /// Subscribes a handler on behalf of `owner` with the given delivery options.
    ///
    /// # Example
    ///
    /// ```rust
    /// use fanout::{Event, Owner, SubscribeOptions};
    ///
    /// let event = Event::<&str>::new();
    /// let owner = Owner::new();
    ///
    /// event.subscribe_with(&owner, SubscribeOptions::new().onetime(), |message| {
    ///     println!("first message: {message}");
    /// });
    ///
    /// event.trigger("hello");
    /// event.trigger("world"); // Not delivered.
    ///
    /// assert_eq!(event.subscribers_count(), 0);
    /// ```
    pub fn subscribe_with<F>(
        &self,
        owner: &Owner,
        options: SubscribeOptions,
        handler: F,
    ) -> SubscriptionId
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let (delivery, onetime) = options.into_parts();
        let handler: Arc<SyncHandler<T>> = Arc::new(handler);
        let record = Arc::new(Subscription::new(owner.probe(), delivery, onetime, handler));
        let id = record.id();

        trace!(event = %self.name(), subscription = ?id, owner = ?owner.id(), ?record, "subscribe");

        let pruned = self.core.registry.lock().add(record);

        if pruned > 0 {
            debug!(event = %self.name(), pruned, "removed subscriptions of dropped owners");
        }

        id
    }

    /// Subscribes a handler that stays subscribed for as long as the returned guard lives.
    ///
    /// Dropping the guard removes the subscription before the drop returns and suppresses any
    /// queued or delayed deliveries that have not run yet.
    ///
    /// # Example
    ///
    /// ```rust
    /// use fanout::{Event, SubscribeOptions};
    ///
    /// let event = Event::<u32>::new();
    ///
    /// let guard = event.subscribe_scoped(SubscribeOptions::new(), |value| println!("{value}"));
    /// assert_eq!(event.subscribers_count(), 1);
    ///
    /// drop(guard);
    /// assert_eq!(event.subscribers_count(), 0);
    /// ```
    pub fn subscribe_scoped<F>(&self, options: SubscribeOptions, handler: F) -> SubscriptionGuard<T>
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let owner = Owner::new();
        let id = self.subscribe_with(&owner, options, handler);

        SubscriptionGuard {
            core: Arc::downgrade(&self.core),
            owner,
            id,
        }
    }

    /// Delivers `payload` to every subscription that exists at the time of the call.
    ///
    /// Immediate handlers have all completed when this returns; queued and delayed ones have been
    /// scheduled. Subscriptions added or removed by a handler while the trigger is in progress
    /// only take effect for later triggers.
    ///
    /// # Panics
    ///
    /// A panic in an immediate handler propagates to the caller. Handlers after it in
    /// subscription order do not receive this trigger.
    pub fn trigger(&self, payload: T) {
        self.core.triggers.fetch_add(1, Ordering::Relaxed);

        let snapshot = self.core.registry.lock().snapshot();

        trace!(event = %self.name(), subscribers = snapshot.len(), "trigger");

        for record in &snapshot {
            if !record.owner().is_alive() {
                debug!(
                    event = %self.name(),
                    subscription = ?record.id(),
                    "owner dropped, removing subscription"
                );
                self.core.registry.lock().remove_record(record.id());
                continue;
            }

            if !record.claim() {
                // A one-time subscription already fired for another trigger.
                continue;
            }

            // Removed before the handler runs; a panicking handler must not leave it registered.
            if record.is_onetime() {
                self.core.registry.lock().remove_record(record.id());
            }

            self.core.dispatcher.dispatch(
                record,
                payload.clone(),
                reaper(Arc::downgrade(&self.core)),
            );
        }
    }

    /// Removes every subscription made on behalf of `owner`.
    ///
    /// Does nothing if the owner has no subscriptions.
    pub fn unsubscribe(&self, owner: &Owner) {
        let removed = self.core.registry.lock().remove_owner(owner.id());
        trace!(event = %self.name(), owner = ?owner.id(), removed, "unsubscribe");
    }

    /// Removes exactly one subscription.
    ///
    /// Does nothing if the subscription has already been removed.
    pub fn unsubscribe_id(&self, id: SubscriptionId) {
        let removed = self.core.registry.lock().remove_record(id);
        trace!(event = %self.name(), subscription = ?id, removed, "unsubscribe");
    }

    /// Removes all subscriptions.
    pub fn unsubscribe_all(&self) {
        let removed = self.core.registry.lock().clear();
        trace!(event = %self.name(), removed, "unsubscribe all");
    }

    /// Number of subscriptions currently registered.
    ///
    /// Subscriptions of owners that have been dropped are counted until the event notices,
    /// which happens on the next trigger or subscribe.
    #[must_use]
    pub fn subscribers_count(&self) -> usize {
        self.core.registry.lock().len()
    }

    /// Number of times the event has been triggered since creation or the last reset.
    #[must_use]
    pub fn triggers_count(&self) -> u64 {
        self.core.triggers.load(Ordering::Relaxed)
    }

    /// Resets the trigger counter to zero.
    pub fn reset_triggers_count(&self) {
        self.core.triggers.store(0, Ordering::Relaxed);
    }

    /// Number of handler invocations so far, across all triggers and delivery policies.
    ///
    /// Queued and delayed deliveries are counted when they run, not when they are scheduled.
    #[must_use]
    pub fn handled_count(&self) -> u64 {
        self.core.dispatcher.handled()
    }
}

// Removes a subscription whose owner turned out to be dead when a delivery ran.
// Holds the event weakly so that pending deliveries do not keep it alive.
fn reaper<T>(core: Weak<EventCore<T>>) -> impl FnOnce(SubscriptionId) + Send + 'static
where
    T: 'static,
{
    move |id| {
        if let Some(core) = core.upgrade() {
            core.registry.lock().remove_record(id);
        }
    }
}

impl<T> Default for Event<T>
where
    T: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Event<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<T> fmt::Debug for Event<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("name", &self.core.name())
            .field("subscribers", &self.core.registry.lock().len())
            .field("triggers", &self.core.triggers.load(Ordering::Relaxed))
            .field("dispatcher", &self.core.dispatcher)
            .finish()
    }
}

/// Creates instances of [`Event`].
///
/// Use `Event::builder()` to create a new instance of this builder.
pub struct EventBuilder<T> {
    name: Cow<'static, str>,
    default_context: Option<Arc<dyn ExecutionContext>>,

    _payload: PhantomData<fn(T)>,
}

impl<T> EventBuilder<T>
where
    T: Clone + Send + 'static,
{
    fn new() -> Self {
        Self {
            name: Cow::Borrowed(DEFAULT_NAME),
            default_context: None,
            _payload: PhantomData,
        }
    }

    /// Sets the name of the event, used in log records and to name the default background
    /// context if one has to be created.
    ///
    /// Default is `event`.
    #[must_use]
    pub fn name(self, name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            ..self
        }
    }

    /// Sets the context that runs [`Delivery::Delayed`][crate::Delivery::Delayed] handlers that
    /// do not name a context of their own.
    ///
    /// If not set, the event starts its own [`WorkerQueue`][crate::WorkerQueue] the first time
    /// such a handler is triggered.
    #[must_use]
    pub fn default_context(self, context: impl ExecutionContext) -> Self {
        Self {
            default_context: Some(Arc::new(context)),
            ..self
        }
    }

    /// Builds the event.
    #[must_use]
    pub fn build(self) -> Event<T> {
        Event {
            core: Arc::new(EventCore {
                registry: Mutex::new(Registry::new()),
                triggers: AtomicU64::new(0),
                dispatcher: Arc::new(Dispatcher::new(self.name, self.default_context)),
            }),
        }
    }
}

impl<T> fmt::Debug for EventBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("name", &self.name)
            .field("default_context", &self.default_context)
            .finish()
    }
}

/// Keeps a subscription made with [`Event::subscribe_scoped()`] alive.
///
/// Dropping the guard unsubscribes.
#[must_use = "dropping the guard unsubscribes immediately"]
pub struct SubscriptionGuard<T> {
    core: Weak<EventCore<T>>,
    owner: Owner,
    id: SubscriptionId,
}

impl<T> SubscriptionGuard<T> {
    /// The subscription kept alive by this guard.
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// The owner the subscription was made on behalf of.
    ///
    /// Further subscriptions made with this owner, on any event, end when the guard is dropped,
    /// unless the owner is cloned.
    #[must_use]
    pub fn owner(&self) -> &Owner {
        &self.owner
    }
}

impl<T> Drop for SubscriptionGuard<T> {
    fn drop(&mut self) {
        if let Some(core) = self.core.upgrade() {
            let removed = core.registry.lock().remove_owner(self.owner.id());
            trace!(event = %core.name(), subscription = ?self.id, removed, "guard dropped");
        }
    }
}

impl<T> fmt::Debug for SubscriptionGuard<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("id", &self.id)
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::Duration;

    use static_assertions::assert_impl_all;
    use testing::{eventually, with_watchdog};

    use super::*;
    use crate::{Delivery, MockExecutionContext, WorkerQueue};

    fn counter() -> (Arc<AtomicUsize>, impl Fn(u32) + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        (count, move |_| {
            count_clone.fetch_add(1, Ordering::Relaxed);
        })
    }

    #[test]
    fn thread_safe_types() {
        assert_impl_all!(Event<u32>: Send, Sync, Clone);
        assert_impl_all!(SubscriptionGuard<u32>: Send, Sync);
        assert_impl_all!(EventBuilder<u32>: Send);
    }

    #[test]
    fn new_event_is_empty() {
        let event = Event::<u32>::new();

        assert_eq!(event.name(), DEFAULT_NAME);
        assert_eq!(event.subscribers_count(), 0);
        assert_eq!(event.triggers_count(), 0);
        assert_eq!(event.handled_count(), 0);
    }

    #[test]
    fn builder_sets_name() {
        let event = Event::<u32>::builder().name("clicks").build();

        assert_eq!(event.name(), "clicks");
    }

    #[test]
    fn trigger_delivers_payload_to_all_in_order() {
        let event = Event::<u32>::new();
        let owner = Owner::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in 0..3_u32 {
            let seen = Arc::clone(&seen);
            event.subscribe(&owner, move |value| seen.lock().push((tag, value)));
        }

        event.trigger(7);

        assert_eq!(*seen.lock(), vec![(0, 7), (1, 7), (2, 7)]);
        assert_eq!(event.triggers_count(), 1);
        assert_eq!(event.handled_count(), 3);
    }

    #[test]
    fn trigger_without_subscribers_counts() {
        let event = Event::<u32>::new();

        event.trigger(1);
        event.trigger(2);

        assert_eq!(event.triggers_count(), 2);
        assert_eq!(event.handled_count(), 0);
    }

    #[test]
    fn reset_triggers_count() {
        let event = Event::<u32>::new();

        event.trigger(1);
        event.reset_triggers_count();

        assert_eq!(event.triggers_count(), 0);
    }

    #[test]
    fn same_owner_subscribing_twice_gets_two_deliveries() {
        let event = Event::<u32>::new();
        let owner = Owner::new();
        let (count, handler) = counter();
        let handler = Arc::new(handler);

        let first = Arc::clone(&handler);
        event.subscribe(&owner, move |value| first(value));
        let second = Arc::clone(&handler);
        event.subscribe(&owner, move |value| second(value));

        event.trigger(1);

        assert_eq!(count.load(Ordering::Relaxed), 2);
        assert_eq!(event.subscribers_count(), 2);
    }

    #[test]
    fn unsubscribe_removes_all_records_of_owner() {
        let event = Event::<u32>::new();
        let owner = Owner::new();
        let other = Owner::new();
        let (count, handler) = counter();
        let handler = Arc::new(handler);

        for subscriber in [&owner, &owner, &other] {
            let handler = Arc::clone(&handler);
            event.subscribe(subscriber, move |value| handler(value));
        }

        event.unsubscribe(&owner);
        event.trigger(1);

        assert_eq!(event.subscribers_count(), 1);
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn unsubscribe_unknown_owner_is_noop() {
        let event = Event::<u32>::new();
        let owner = Owner::new();
        let stranger = Owner::new();

        event.subscribe(&owner, |_| {});
        event.unsubscribe(&stranger);

        assert_eq!(event.subscribers_count(), 1);
    }

    #[test]
    fn unsubscribe_id_removes_only_that_subscription() {
        let event = Event::<u32>::new();
        let owner = Owner::new();

        let first = event.subscribe(&owner, |_| {});
        event.subscribe(&owner, |_| {});

        event.unsubscribe_id(first);
        event.unsubscribe_id(first);

        assert_eq!(event.subscribers_count(), 1);
    }

    #[test]
    fn unsubscribe_all_then_trigger_calls_nothing() {
        let event = Event::<u32>::new();
        let owner = Owner::new();
        let (count, handler) = counter();

        event.subscribe(&owner, handler);
        event.unsubscribe_all();
        event.trigger(1);

        assert_eq!(event.subscribers_count(), 0);
        assert_eq!(event.triggers_count(), 1);
        assert_eq!(count.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn unsubscribe_all_during_trigger_still_delivers_snapshot() {
        let event = Event::<u32>::new();
        let owner = Owner::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let event_clone = event.clone();
        let calls_clone = Arc::clone(&calls);
        event.subscribe(&owner, move |_| {
            event_clone.unsubscribe_all();
            calls_clone.fetch_add(1, Ordering::Relaxed);
        });

        for _ in 0..2 {
            let calls_clone = Arc::clone(&calls);
            event.subscribe(&owner, move |_| {
                calls_clone.fetch_add(1, Ordering::Relaxed);
            });
        }

        event.trigger(1);

        assert_eq!(calls.load(Ordering::Relaxed), 3);
        assert_eq!(event.subscribers_count(), 0);

        event.trigger(1);

        assert_eq!(calls.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn unsubscribing_later_record_during_trigger_still_delivers_it_once() {
        let event = Event::<u32>::new();
        let first_owner = Owner::new();
        let second_owner = Owner::new();
        let (count, handler) = counter();

        let event_clone = event.clone();
        let second_clone = second_owner.clone();
        event.subscribe(&first_owner, move |_| event_clone.unsubscribe(&second_clone));
        event.subscribe(&second_owner, handler);

        event.trigger(1);
        assert_eq!(count.load(Ordering::Relaxed), 1);

        event.trigger(1);
        assert_eq!(count.load(Ordering::Relaxed), 1);
        assert_eq!(event.subscribers_count(), 1);
    }

    #[test]
    fn handler_unsubscribing_itself_fires_once() {
        let event = Event::<u32>::new();
        let owner = Owner::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let event_clone = event.clone();
        let owner_clone = owner.clone();
        let calls_clone = Arc::clone(&calls);
        event.subscribe(&owner, move |_| {
            event_clone.unsubscribe(&owner_clone);
            calls_clone.fetch_add(1, Ordering::Relaxed);
        });

        event.trigger(1);
        event.trigger(1);

        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert_eq!(event.subscribers_count(), 0);
        assert_eq!(event.triggers_count(), 2);
    }

    #[test]
    fn handler_unsubscribing_after_n_triggers() {
        const LIMIT: u64 = 3;

        let event = Event::<u32>::new();
        let owner = Owner::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let event_clone = event.clone();
        let owner_clone = owner.clone();
        let calls_clone = Arc::clone(&calls);
        event.subscribe(&owner, move |_| {
            if event_clone.triggers_count() >= LIMIT {
                event_clone.unsubscribe(&owner_clone);
            }
            calls_clone.fetch_add(1, Ordering::Relaxed);
        });

        for _ in 0..LIMIT * 2 {
            event.trigger(1);
        }

        assert_eq!(calls.load(Ordering::Relaxed), 3);
        assert_eq!(event.triggers_count(), LIMIT * 2);
        assert_eq!(event.subscribers_count(), 0);
    }

    #[test]
    fn subscribe_during_trigger_applies_to_next_trigger() {
        let event = Event::<u32>::new();
        let owner = Owner::new();
        let (count, handler) = counter();
        let handler = Arc::new(handler);

        let event_clone = event.clone();
        let owner_clone = owner.clone();
        event.subscribe_with(&owner, SubscribeOptions::new().onetime(), move |_| {
            let handler = Arc::clone(&handler);
            event_clone.subscribe(&owner_clone, move |value| handler(value));
        });

        event.trigger(1);
        assert_eq!(count.load(Ordering::Relaxed), 0);
        assert_eq!(event.subscribers_count(), 1);

        event.trigger(1);
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn onetime_fires_exactly_once() {
        let event = Event::<u32>::new();
        let owner = Owner::new();
        let (count, handler) = counter();

        event.subscribe_with(&owner, SubscribeOptions::new().onetime(), handler);
        event.subscribe(&owner, |_| {});

        for _ in 0..5 {
            event.trigger(1);
        }

        assert_eq!(count.load(Ordering::Relaxed), 1);
        assert_eq!(event.subscribers_count(), 1);
    }

    #[test]
    fn onetime_removal_keeps_other_records_of_same_owner() {
        let event = Event::<u32>::new();
        let owner = Owner::new();
        let (count, handler) = counter();

        event.subscribe_with(&owner, SubscribeOptions::new().onetime(), |_| {});
        event.subscribe(&owner, handler);

        event.trigger(1);
        event.trigger(1);

        assert_eq!(count.load(Ordering::Relaxed), 2);
        assert_eq!(event.subscribers_count(), 1);
    }

    #[test]
    fn panicking_onetime_handler_is_removed() {
        let event = Event::<u32>::new();
        let owner = Owner::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let calls_clone = Arc::clone(&calls);
        event.subscribe_with(&owner, SubscribeOptions::new().onetime(), move |_| {
            calls_clone.fetch_add(1, Ordering::Relaxed);
            panic!("onetime handler failure");
        });

        let result = panic::catch_unwind(AssertUnwindSafe(|| event.trigger(1)));
        assert!(result.is_err());

        event.trigger(2);
        event.trigger(3);

        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert_eq!(event.subscribers_count(), 0);
    }

    #[test]
    fn onetime_not_redelivered_by_reentrant_trigger() {
        let event = Event::<u32>::new();
        let owner = Owner::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let event_clone = event.clone();
        let calls_clone = Arc::clone(&calls);
        event.subscribe_with(&owner, SubscribeOptions::new().onetime(), move |value| {
            calls_clone.fetch_add(1, Ordering::Relaxed);

            if value == 0 {
                event_clone.trigger(1);
            }
        });

        event.trigger(0);

        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert_eq!(event.triggers_count(), 2);
    }

    #[test]
    fn dropped_owner_is_skipped_and_removed_on_trigger() {
        let event = Event::<u32>::new();
        let survivor = Owner::new();
        let doomed = Owner::new();
        let (survivor_count, survivor_handler) = counter();
        let (doomed_count, doomed_handler) = counter();
        let doomed_handler = Arc::new(doomed_handler);

        event.subscribe(&survivor, survivor_handler);
        for _ in 0..2 {
            let handler = Arc::clone(&doomed_handler);
            event.subscribe(&doomed, move |value| handler(value));
        }

        event.trigger(1);
        assert_eq!(event.subscribers_count(), 3);

        drop(doomed);
        event.trigger(1);

        assert_eq!(event.subscribers_count(), 1);
        assert_eq!(survivor_count.load(Ordering::Relaxed), 2);
        assert_eq!(doomed_count.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn dropped_owner_is_pruned_on_subscribe() {
        let event = Event::<u32>::new();
        let survivor = Owner::new();
        let doomed = Owner::new();

        event.subscribe(&doomed, |_| {});
        event.subscribe(&doomed, |_| {});
        drop(doomed);

        event.subscribe(&survivor, |_| {});

        assert_eq!(event.subscribers_count(), 1);
    }

    #[test]
    fn scoped_subscription_ends_with_guard() {
        let event = Event::<u32>::new();
        let (count, handler) = counter();

        let guard = event.subscribe_scoped(SubscribeOptions::new(), handler);
        event.trigger(1);

        drop(guard);
        event.trigger(1);

        assert_eq!(count.load(Ordering::Relaxed), 1);
        assert_eq!(event.subscribers_count(), 0);
    }

    #[test]
    fn guard_outliving_event_is_harmless() {
        let event = Event::<u32>::new();
        let guard = event.subscribe_scoped(SubscribeOptions::new(), |_| {});

        drop(event);
        drop(guard);
    }

    #[test]
    fn guard_owner_scopes_additional_subscriptions() {
        let event = Event::<u32>::new();
        let guard = event.subscribe_scoped(SubscribeOptions::new(), |_| {});

        event.subscribe(guard.owner(), |_| {});
        assert_eq!(event.subscribers_count(), 2);

        drop(guard);
        assert_eq!(event.subscribers_count(), 0);
    }

    #[test]
    fn queued_delivery_goes_through_context() {
        let event = Event::<u32>::new();
        let owner = Owner::new();
        let (count, handler) = counter();

        let mut context = MockExecutionContext::new();
        context.expect_execute().times(2).returning(|job| job());

        event.subscribe_with(
            &owner,
            SubscribeOptions::new().delivery(Delivery::queued(context)),
            handler,
        );

        event.trigger(1);
        event.trigger(2);

        assert_eq!(count.load(Ordering::Relaxed), 2);
        assert_eq!(event.handled_count(), 2);
    }

    #[test]
    fn delayed_without_context_uses_builder_default() {
        let mut context = MockExecutionContext::new();
        context
            .expect_execute_after()
            .times(1)
            .returning(|_, job| job());

        let event = Event::<u32>::builder().default_context(context).build();
        let owner = Owner::new();
        let (count, handler) = counter();

        event.subscribe_with(
            &owner,
            SubscribeOptions::new().delivery(Delivery::delayed(Duration::from_millis(5))),
            handler,
        );

        event.trigger(1);

        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn queued_delivery_runs_on_worker_thread() {
        with_watchdog(|| {
            let queue = WorkerQueue::new("sync-test-worker");
            let event = Event::<u32>::new();
            let owner = Owner::new();
            let threads = Arc::new(Mutex::new(Vec::new()));

            let threads_clone = Arc::clone(&threads);
            event.subscribe_with(
                &owner,
                SubscribeOptions::new().delivery(Delivery::queued(queue.clone())),
                move |_| {
                    threads_clone
                        .lock()
                        .push(thread::current().name().map(str::to_owned));
                },
            );

            event.trigger(1);
            event.trigger(2);
            queue.flush();

            assert_eq!(
                *threads.lock(),
                vec![
                    Some("sync-test-worker".to_owned()),
                    Some("sync-test-worker".to_owned())
                ]
            );
        });
    }

    #[test]
    fn delayed_delivery_on_lazily_created_context() {
        with_watchdog(|| {
            let event = Event::<u32>::builder().name("lazy").build();
            let owner = Owner::new();
            let (count, handler) = counter();

            event.subscribe_with(
                &owner,
                SubscribeOptions::new().delivery(Delivery::delayed(Duration::from_millis(20))),
                handler,
            );

            event.trigger(1);
            assert_eq!(count.load(Ordering::Relaxed), 0);

            assert!(eventually(Duration::from_secs(5), || {
                count.load(Ordering::Relaxed) == 1
            }));
            assert_eq!(event.handled_count(), 1);
        });
    }

    #[test]
    fn unrepresentable_delay_does_not_disturb_later_subscribers() {
        with_watchdog(|| {
            let queue = WorkerQueue::new("far-future");
            let event = Event::<u32>::new();
            let owner = Owner::new();
            let (delayed_count, delayed_handler) = counter();
            let (count, handler) = counter();

            event.subscribe_with(
                &owner,
                SubscribeOptions::new()
                    .delivery(Delivery::delayed_on(queue.clone(), Duration::MAX)),
                delayed_handler,
            );
            event.subscribe(&owner, handler);

            event.trigger(1);
            event.trigger(2);

            assert_eq!(count.load(Ordering::Relaxed), 2);
            assert_eq!(event.triggers_count(), 2);
            assert_eq!(event.subscribers_count(), 2);

            queue.flush();

            assert_eq!(delayed_count.load(Ordering::Relaxed), 0);
            assert_eq!(queue.pending(), 2);
        });
    }

    #[test]
    fn onetime_delayed_still_delivered_after_removal() {
        with_watchdog(|| {
            let queue = WorkerQueue::new("onetime-delayed");
            let event = Event::<u32>::new();
            let owner = Owner::new();
            let (count, handler) = counter();

            event.subscribe_with(
                &owner,
                SubscribeOptions::new()
                    .delivery(Delivery::delayed_on(queue, Duration::from_millis(10)))
                    .onetime(),
                handler,
            );

            event.trigger(1);
            event.trigger(1);

            // Removed as soon as it was scheduled.
            assert_eq!(event.subscribers_count(), 0);

            assert!(eventually(Duration::from_secs(5), || {
                count.load(Ordering::Relaxed) == 1
            }));
        });
    }

    #[test]
    fn guard_drop_suppresses_pending_delayed_delivery() {
        with_watchdog(|| {
            let queue = WorkerQueue::new("guarded-delayed");
            let event = Event::<u32>::new();
            let (count, handler) = counter();

            let guard = event.subscribe_scoped(
                SubscribeOptions::new()
                    .delivery(Delivery::delayed_on(queue.clone(), Duration::from_millis(50))),
                handler,
            );

            event.trigger(1);
            drop(guard);

            thread::sleep(Duration::from_millis(100));
            queue.flush();

            assert_eq!(count.load(Ordering::Relaxed), 0);
            assert_eq!(event.handled_count(), 0);
        });
    }

    #[test]
    fn owner_dropped_before_queued_delivery_removes_subscription() {
        let parked: Arc<Mutex<Vec<crate::Job>>> = Arc::new(Mutex::new(Vec::new()));

        let mut context = MockExecutionContext::new();
        let parked_clone = Arc::clone(&parked);
        context
            .expect_execute()
            .returning(move |job| parked_clone.lock().push(job));

        let event = Event::<u32>::new();
        let owner = Owner::new();
        let keeper = Owner::new();
        let (count, handler) = counter();

        event.subscribe_with(
            &owner,
            SubscribeOptions::new().delivery(Delivery::queued(context)),
            handler,
        );
        event.subscribe(&keeper, |_| {});

        event.trigger(1);
        drop(owner);

        for job in parked.lock().drain(..) {
            job();
        }

        assert_eq!(count.load(Ordering::Relaxed), 0);
        assert_eq!(event.subscribers_count(), 1);
    }

    #[test]
    fn trigger_from_many_threads() {
        with_watchdog(|| {
            const THREADS: usize = 8;
            const TRIGGERS_PER_THREAD: usize = 1_000;

            let event = Event::<u32>::new();
            let owner = Owner::new();
            let (count, handler) = counter();
            event.subscribe(&owner, handler);

            thread::scope(|s| {
                for _ in 0..THREADS {
                    s.spawn(|| {
                        for _ in 0..TRIGGERS_PER_THREAD {
                            event.trigger(1);
                        }
                    });
                }
            });

            let expected = THREADS * TRIGGERS_PER_THREAD;
            assert_eq!(event.triggers_count(), expected as u64);
            assert_eq!(count.load(Ordering::Relaxed), expected);
        });
    }

    #[test]
    fn concurrent_onetime_fires_once() {
        with_watchdog(|| {
            let event = Event::<u32>::new();
            let owner = Owner::new();
            let (count, handler) = counter();
            event.subscribe_with(&owner, SubscribeOptions::new().onetime(), handler);

            thread::scope(|s| {
                for _ in 0..8 {
                    s.spawn(|| {
                        for _ in 0..100 {
                            event.trigger(1);
                        }
                    });
                }
            });

            assert_eq!(count.load(Ordering::Relaxed), 1);
            assert_eq!(event.subscribers_count(), 0);
        });
    }

    #[test]
    fn debug_output_names_event() {
        let event = Event::<u32>::builder().name("debuggable").build();

        assert!(format!("{event:?}").contains("debuggable"));
    }
}
