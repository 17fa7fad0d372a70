//! Typed multi-subscriber events and observable values for in-process notification.
//!
//! An [`Event`] fans a payload out to every handler subscribed to it. Handlers are registered on
//! behalf of an [`Owner`], a cheap liveness token. When the owner is dropped, its handlers stop
//! being called and are cleaned up automatically, so subscribers never have to remember to
//! unsubscribe.
//!
//! # Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicU32, Ordering};
//!
//! use fanout::{Event, Owner};
//!
//! let clicked = Event::<u32>::new();
//! let button_handler = Owner::new();
//! let clicks = Arc::new(AtomicU32::new(0));
//!
//! let clicks_clone = Arc::clone(&clicks);
//! clicked.subscribe(&button_handler, move |_| {
//!     clicks_clone.fetch_add(1, Ordering::Relaxed);
//! });
//!
//! clicked.trigger(1);
//! assert_eq!(clicks.load(Ordering::Relaxed), 1);
//!
//! // Dropping the owner ends its subscriptions.
//! drop(button_handler);
//! clicked.trigger(2);
//! assert_eq!(clicks.load(Ordering::Relaxed), 1);
//! assert_eq!(clicked.subscribers_count(), 0);
//! ```
//!
//! # Event types
//!
//! - [`Event`] can be shared between threads. Each subscription chooses a [`Delivery`] policy:
//!   immediately on the triggering thread, queued on an [`ExecutionContext`], or delayed.
//! - [`LocalEvent`] is for single-threaded use. Handlers and payloads need not be `Send` and are
//!   always called immediately.
//! - [`Observable`] and [`LocalObservable`] hold a value and trigger a [`Change`] event on every
//!   assignment.
//!
//! # Trigger semantics
//!
//! A trigger delivers to exactly the subscriptions that existed when it started, in subscription
//! order. Handlers may subscribe, unsubscribe or trigger the same event again; such changes take
//! effect for later triggers. No lock is held while a handler runs.
//!
//! # Execution contexts
//!
//! Queued and delayed handlers run on an [`ExecutionContext`]. [`WorkerQueue`] is the provided
//! implementation: a named background thread that runs jobs one at a time. An event that needs
//! to run a delayed handler without a context of its own starts a [`WorkerQueue`] on first use.

mod context;
mod delivery;
mod error;
mod local;
mod observable;
mod owner;
mod registry;
mod subscription;
mod sync;
mod worker_queue;

pub use context::*;
pub(crate) use delivery::Dispatcher;
pub use delivery::Delivery;
pub use error::*;
pub use local::*;
pub use observable::*;
pub(crate) use owner::{OwnerProbe, owners_dropped};
pub use owner::{Owner, OwnerId};
pub(crate) use registry::*;
pub(crate) use subscription::Subscription;
pub use subscription::{SubscribeOptions, SubscriptionId};
pub use sync::*;
pub use worker_queue::*;
