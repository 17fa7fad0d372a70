//! Single-threaded multi-subscriber events.
//!
//! Same semantics as the thread-safe [`Event`][crate::Event] for immediate delivery, without
//! requiring handlers or payloads to be `Send`. Handlers always run on the triggering thread.
#![allow(
    clippy::arc_with_non_send_sync,
    reason = "records never leave the thread that owns the event"
)]

use std::any::type_name;
use std::borrow::Cow;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::{Delivery, Dispatcher, Owner, Registry, Subscription, SubscriptionId};

const DEFAULT_NAME: &str = "local-event";

type LocalHandler<T> = dyn Fn(T);

struct LocalCore<T> {
    registry: RefCell<Registry<LocalHandler<T>>>,
    triggers: Cell<u64>,
    dispatcher: Dispatcher,
}

/// A typed event for use within a single thread.
///
/// Handlers are called immediately, in subscription order, on the thread that triggers the
/// event. Cloning a `LocalEvent` creates another handle to the same event.
///
/// # Example
///
/// ```rust
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// use fanout::{LocalEvent, Owner};
///
/// let event = LocalEvent::<String>::new();
/// let owner = Owner::new();
/// let log = Rc::new(RefCell::new(Vec::new()));
///
/// let log_clone = Rc::clone(&log);
/// event.subscribe(&owner, move |message| log_clone.borrow_mut().push(message));
///
/// event.trigger("first".to_owned());
/// event.trigger("second".to_owned());
///
/// assert_eq!(*log.borrow(), vec!["first", "second"]);
/// ```
pub struct LocalEvent<T> {
    core: Rc<LocalCore<T>>,
}

impl<T> LocalEvent<T>
where
    T: Clone + 'static,
{
    /// Creates an event named `local-event`.
    #[must_use]
    pub fn new() -> Self {
        Self::named(DEFAULT_NAME)
    }

    /// Creates an event with a name used in log records.
    #[must_use]
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            core: Rc::new(LocalCore {
                registry: RefCell::new(Registry::new()),
                triggers: Cell::new(0),
                dispatcher: Dispatcher::new(name.into(), None),
            }),
        }
    }

    /// Name of the event, used in log records.
    #[must_use]
    pub fn name(&self) -> &str {
        self.core.dispatcher.name()
    }

    /// Subscribes a handler on behalf of `owner`, delivered on every trigger until removed.
    pub fn subscribe<F>(&self, owner: &Owner, handler: F) -> SubscriptionId
    where
        F: Fn(T) + 'static,
    {
        self.add(owner, false, Arc::new(handler))
    }

    /// Subscribes a handler on behalf of `owner` that is removed after its first delivery.
    pub fn subscribe_once<F>(&self, owner: &Owner, handler: F) -> SubscriptionId
    where
        F: Fn(T) + 'static,
    {
        self.add(owner, true, Arc::new(handler))
    }

    /// Subscribes a handler that stays subscribed for as long as the returned guard lives.
    pub fn subscribe_scoped<F>(&self, handler: F) -> LocalSubscriptionGuard<T>
    where
        F: Fn(T) + 'static,
    {
        let owner = Owner::new();
        let id = self.subscribe(&owner, handler);

        LocalSubscriptionGuard {
            core: Rc::downgrade(&self.core),
            owner,
            id,
        }
    }

    fn add(&self, owner: &Owner, onetime: bool, handler: Arc<LocalHandler<T>>) -> SubscriptionId {
        let record = Arc::new(Subscription::new(
            owner.probe(),
            Delivery::Immediate,
            onetime,
            handler,
        ));
        let id = record.id();

        trace!(event = %self.name(), subscription = ?id, owner = ?owner.id(), onetime, "subscribe");

        let pruned = self.core.registry.borrow_mut().add(record);

        if pruned > 0 {
            debug!(event = %self.name(), pruned, "removed subscriptions of dropped owners");
        }

        id
    }

    /// Calls every handler subscribed at the time of the call, in subscription order.
    ///
    /// # Panics
    ///
    /// A panic in a handler propagates to the caller. Handlers after it in subscription order do
    /// not receive this trigger.
    pub fn trigger(&self, payload: T) {
        self.core.triggers.set(self.core.triggers.get().wrapping_add(1));

        let snapshot = self.core.registry.borrow().snapshot();

        trace!(event = %self.name(), subscribers = snapshot.len(), "trigger");

        for record in &snapshot {
            if !record.owner().is_alive() {
                debug!(
                    event = %self.name(),
                    subscription = ?record.id(),
                    "owner dropped, removing subscription"
                );
                self.core.registry.borrow_mut().remove_record(record.id());
                continue;
            }

            if !record.claim() {
                continue;
            }

            if record.is_onetime() {
                self.core.registry.borrow_mut().remove_record(record.id());
            }

            self.core
                .dispatcher
                .deliver(record.as_ref(), payload.clone(), |id| {
                    self.core.registry.borrow_mut().remove_record(id);
                });
        }
    }

    /// Removes every subscription made on behalf of `owner`.
    pub fn unsubscribe(&self, owner: &Owner) {
        let removed = self.core.registry.borrow_mut().remove_owner(owner.id());
        trace!(event = %self.name(), owner = ?owner.id(), removed, "unsubscribe");
    }

    /// Removes exactly one subscription. Does nothing if it is already gone.
    pub fn unsubscribe_id(&self, id: SubscriptionId) {
        let removed = self.core.registry.borrow_mut().remove_record(id);
        trace!(event = %self.name(), subscription = ?id, removed, "unsubscribe");
    }

    /// Removes all subscriptions.
    pub fn unsubscribe_all(&self) {
        let removed = self.core.registry.borrow_mut().clear();
        trace!(event = %self.name(), removed, "unsubscribe all");
    }

    /// Number of subscriptions currently registered, including those of dropped owners that
    /// have not been noticed yet.
    #[must_use]
    pub fn subscribers_count(&self) -> usize {
        self.core.registry.borrow().len()
    }

    /// Number of times the event has been triggered since creation or the last reset.
    #[must_use]
    pub fn triggers_count(&self) -> u64 {
        self.core.triggers.get()
    }

    /// Resets the trigger counter to zero.
    pub fn reset_triggers_count(&self) {
        self.core.triggers.set(0);
    }

    /// Number of handler invocations so far.
    #[must_use]
    pub fn handled_count(&self) -> u64 {
        self.core.dispatcher.handled()
    }
}

impl<T> Default for LocalEvent<T>
where
    T: Clone + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for LocalEvent<T> {
    fn clone(&self) -> Self {
        Self {
            core: Rc::clone(&self.core),
        }
    }
}

impl<T> fmt::Debug for LocalEvent<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("name", &self.core.dispatcher.name())
            .field("triggers", &self.core.triggers.get())
            .finish_non_exhaustive()
    }
}

/// Keeps a subscription made with [`LocalEvent::subscribe_scoped()`] alive.
///
/// Dropping the guard unsubscribes.
#[must_use = "dropping the guard unsubscribes immediately"]
pub struct LocalSubscriptionGuard<T> {
    core: Weak<LocalCore<T>>,
    owner: Owner,
    id: SubscriptionId,
}

impl<T> LocalSubscriptionGuard<T> {
    /// The subscription kept alive by this guard.
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// The owner the subscription was made on behalf of.
    #[must_use]
    pub fn owner(&self) -> &Owner {
        &self.owner
    }
}

impl<T> Drop for LocalSubscriptionGuard<T> {
    fn drop(&mut self) {
        if let Some(core) = self.core.upgrade() {
            let removed = core.registry.borrow_mut().remove_owner(self.owner.id());
            trace!(
                event = %core.dispatcher.name(),
                subscription = ?self.id,
                removed,
                "guard dropped"
            );
        }
    }
}

impl<T> fmt::Debug for LocalSubscriptionGuard<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("id", &self.id)
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}
