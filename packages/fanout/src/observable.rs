//! Values that announce every assignment through an embedded event.

use std::any::type_name;
use std::cell::RefCell;
use std::fmt;

use parking_lot::ReentrantMutex;

use crate::{Event, LocalEvent, Owner, SubscribeOptions, SubscriptionId};

/// Payload of an observable's `changed` event.
#[expect(
    clippy::exhaustive_structs,
    reason = "a change is exactly a pair of values, nothing more will be added"
)]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Change<T> {
    /// The value that was just assigned.
    pub new: T,

    /// The value it replaced.
    pub old: T,
}

/// A thread-safe value that triggers an event on every assignment.
///
/// Every assignment triggers, including one that stores a value equal to the current one.
/// Observers receive a [`Change`] with both the new and the replaced value.
///
/// Assignments from different threads are serialized: an assignment and the immediate delivery
/// of its change form one unit that other threads cannot interleave with. Immediate observers run
/// on the assigning thread and may read or assign the value themselves.
///
/// # Example
///
/// ```rust
/// use std::sync::{Arc, Mutex};
///
/// use fanout::{Observable, Owner};
///
/// let temperature = Observable::new(20);
/// let owner = Owner::new();
/// let seen = Arc::new(Mutex::new(Vec::new()));
///
/// let seen_clone = Arc::clone(&seen);
/// temperature.bind(&owner, move |change| {
///     seen_clone.lock().unwrap().push((change.old, change.new));
/// });
///
/// temperature.set_value(21);
/// temperature.set_value(21);
///
/// assert_eq!(temperature.value(), 21);
/// assert_eq!(*seen.lock().unwrap(), vec![(20, 21), (21, 21)]);
/// ```
pub struct Observable<T> {
    value: ReentrantMutex<RefCell<T>>,
    changed: Event<Change<T>>,
}

impl<T> Observable<T>
where
    T: Clone + Send + 'static,
{
    /// Creates an observable holding `value`, with a default-configured `changed` event.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self::from_event(value, Event::builder().name("observable").build())
    }

    /// Creates an observable holding `value` that announces changes through `changed`.
    ///
    /// Use this to configure the event, for example to give it a name or a default execution
    /// context.
    #[must_use]
    pub fn from_event(value: T, changed: Event<Change<T>>) -> Self {
        Self {
            value: ReentrantMutex::new(RefCell::new(value)),
            changed,
        }
    }

    /// A clone of the current value.
    #[must_use]
    pub fn value(&self) -> T {
        self.with_value(T::clone)
    }

    /// Calls `f` with a reference to the current value.
    ///
    /// # Panics
    ///
    /// Panics if `f` assigns to the same observable.
    pub fn with_value<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let slot = self.value.lock();
        let value = slot.borrow();
        f(&value)
    }

    /// Stores `value` and triggers `changed`.
    pub fn set_value(&self, value: T) {
        drop(self.replace(value));
    }

    /// Stores `value`, triggers `changed` and returns the previous value.
    pub fn replace(&self, value: T) -> T {
        let slot = self.value.lock();

        // The borrow ends before any observer runs, so observers may touch the value.
        let old = slot.replace(value.clone());

        self.changed.trigger(Change {
            new: value,
            old: old.clone(),
        });

        old
    }

    /// Observes changes on behalf of `owner` with immediate, persistent delivery.
    pub fn bind<F>(&self, owner: &Owner, handler: F) -> SubscriptionId
    where
        F: Fn(Change<T>) + Send + Sync + 'static,
    {
        self.changed.subscribe(owner, handler)
    }

    /// Observes changes on behalf of `owner` with the given delivery options.
    pub fn bind_with<F>(
        &self,
        owner: &Owner,
        options: SubscribeOptions,
        handler: F,
    ) -> SubscriptionId
    where
        F: Fn(Change<T>) + Send + Sync + 'static,
    {
        self.changed.subscribe_with(owner, options, handler)
    }

    /// Stops all observation on behalf of `owner`.
    pub fn unbind(&self, owner: &Owner) {
        self.changed.unsubscribe(owner);
    }

    /// Stops all observation.
    pub fn unbind_all(&self) {
        self.changed.unsubscribe_all();
    }

    /// Number of active observer subscriptions.
    #[must_use]
    pub fn observers_count(&self) -> usize {
        self.changed.subscribers_count()
    }

    /// Number of assignments since creation or the last reset.
    #[must_use]
    pub fn triggers_count(&self) -> u64 {
        self.changed.triggers_count()
    }

    /// Resets the assignment counter to zero.
    pub fn reset_triggers_count(&self) {
        self.changed.reset_triggers_count();
    }

    /// The event triggered on every assignment.
    #[must_use]
    pub fn changed(&self) -> &Event<Change<T>> {
        &self.changed
    }
}

impl<T> Default for Observable<T>
where
    T: Clone + Default + Send + 'static,
{
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> fmt::Debug for Observable<T>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.value.lock();

        // An observer formatting the observable while it is being assigned sees no value.
        let mut debug = f.debug_struct(type_name::<Self>());
        match slot.try_borrow() {
            Ok(value) => debug.field("value", &*value),
            Err(_) => debug.field("value", &format_args!("<being assigned>")),
        };
        debug.field("changed", &self.changed).finish()
    }
}

/// A single-threaded value that triggers an event on every assignment.
///
/// # Example
///
/// ```rust
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// use fanout::{LocalObservable, Owner};
///
/// let name = LocalObservable::new(String::new());
/// let owner = Owner::new();
/// let calls = Rc::new(Cell::new(0));
///
/// let calls_clone = Rc::clone(&calls);
/// name.bind(&owner, move |change| {
///     assert_eq!(change.new, "x");
///     calls_clone.set(calls_clone.get() + 1);
/// });
///
/// name.set_value("x".to_owned());
///
/// assert_eq!(calls.get(), 1);
/// ```
pub struct LocalObservable<T> {
    value: RefCell<T>,
    changed: LocalEvent<Change<T>>,
}

impl<T> LocalObservable<T>
where
    T: Clone + 'static,
{
    /// Creates an observable holding `value`.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self::from_event(value, LocalEvent::named("local-observable"))
    }

    /// Creates an observable holding `value` that announces changes through `changed`.
    #[must_use]
    pub fn from_event(value: T, changed: LocalEvent<Change<T>>) -> Self {
        Self {
            value: RefCell::new(value),
            changed,
        }
    }

    /// A clone of the current value.
    #[must_use]
    pub fn value(&self) -> T {
        self.value.borrow().clone()
    }

    /// Calls `f` with a reference to the current value.
    ///
    /// # Panics
    ///
    /// Panics if `f` assigns to the same observable.
    pub fn with_value<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.value.borrow())
    }

    /// Stores `value` and triggers `changed`.
    pub fn set_value(&self, value: T) {
        drop(self.replace(value));
    }

    /// Stores `value`, triggers `changed` and returns the previous value.
    pub fn replace(&self, value: T) -> T {
        let old = self.value.replace(value.clone());

        self.changed.trigger(Change {
            new: value,
            old: old.clone(),
        });

        old
    }

    /// Observes changes on behalf of `owner`.
    pub fn bind<F>(&self, owner: &Owner, handler: F) -> SubscriptionId
    where
        F: Fn(Change<T>) + 'static,
    {
        self.changed.subscribe(owner, handler)
    }

    /// Stops all observation on behalf of `owner`.
    pub fn unbind(&self, owner: &Owner) {
        self.changed.unsubscribe(owner);
    }

    /// Stops all observation.
    pub fn unbind_all(&self) {
        self.changed.unsubscribe_all();
    }

    /// Number of active observer subscriptions.
    #[must_use]
    pub fn observers_count(&self) -> usize {
        self.changed.subscribers_count()
    }

    /// Number of assignments since creation or the last reset.
    #[must_use]
    pub fn triggers_count(&self) -> u64 {
        self.changed.triggers_count()
    }

    /// Resets the assignment counter to zero.
    pub fn reset_triggers_count(&self) {
        self.changed.reset_triggers_count();
    }

    /// The event triggered on every assignment.
    #[must_use]
    pub fn changed(&self) -> &LocalEvent<Change<T>> {
        &self.changed
    }
}

impl<T> Default for LocalObservable<T>
where
    T: Clone + Default + 'static,
{
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> fmt::Debug for LocalObservable<T>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct(type_name::<Self>());
        match self.value.try_borrow() {
            Ok(value) => debug.field("value", &*value),
            Err(_) => debug.field("value", &format_args!("<being assigned>")),
        };
        debug.field("changed", &self.changed).finish()
    }
}
