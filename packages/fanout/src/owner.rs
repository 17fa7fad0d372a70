//! Owner identity and liveness.
//!
//! Every subscription is registered on behalf of an [`Owner`]. The event never keeps the owner
//! alive: subscription records only hold a weak reference to the owner's liveness token, so once
//! the last clone of an [`Owner`] is dropped, all subscriptions registered through it become
//! inert and are removed from the registry at the next opportunity.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

static NEXT_OWNER_ID: AtomicU64 = AtomicU64::new(1);

// Bumped whenever the last clone of any owner is dropped. Registries compare this against the
// value they saw during their last sweep to decide whether a sweep can find anything at all.
static OWNERS_DROPPED: AtomicU64 = AtomicU64::new(0);

/// Opaque identity token of an [`Owner`].
///
/// Two owners never share an identity, even if one is dropped and another is created in the
/// same memory location.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct OwnerId(u64);

#[derive(Debug)]
struct Token {
    id: OwnerId,
}

impl Drop for Token {
    fn drop(&mut self) {
        OWNERS_DROPPED.fetch_add(1, Ordering::Release);
    }
}

/// The party on whose behalf handlers are subscribed to an event.
///
/// Embed an `Owner` in the type that subscribes. When that type is dropped, the owner goes with
/// it and every subscription made through it stops being delivered, without the subscriber
/// having to unsubscribe explicitly.
///
/// Clones share the same identity; the owner is considered alive as long as any clone exists.
///
/// # Example
///
/// ```rust
/// use fanout::{Event, Owner};
///
/// let event = Event::<u32>::new();
///
/// let owner = Owner::new();
/// event.subscribe(&owner, |value| println!("got {value}"));
/// assert_eq!(event.subscribers_count(), 1);
///
/// drop(owner);
///
/// // The handler is not called and the dead subscription is removed.
/// event.trigger(5);
/// assert_eq!(event.subscribers_count(), 0);
/// ```
#[derive(Clone)]
pub struct Owner {
    token: Arc<Token>,
}

impl Owner {
    /// Creates a new owner with a fresh identity.
    #[must_use]
    pub fn new() -> Self {
        let id = OwnerId(NEXT_OWNER_ID.fetch_add(1, Ordering::Relaxed));

        Self {
            token: Arc::new(Token { id }),
        }
    }

    /// The identity of this owner, shared by all of its clones.
    #[must_use]
    pub fn id(&self) -> OwnerId {
        self.token.id
    }

    pub(crate) fn probe(&self) -> OwnerProbe {
        OwnerProbe {
            id: self.token.id,
            token: Arc::downgrade(&self.token),
        }
    }
}

impl Default for Owner {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Owner")
            .field("id", &self.token.id)
            .field("clones", &Arc::strong_count(&self.token))
            .finish()
    }
}

/// Non-owning view of an [`Owner`], held by subscription records.
#[derive(Clone, Debug)]
pub(crate) struct OwnerProbe {
    id: OwnerId,
    token: Weak<Token>,
}

impl OwnerProbe {
    pub(crate) fn id(&self) -> OwnerId {
        self.id
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.token.strong_count() > 0
    }
}

/// How many owners have been dropped in this process so far.
pub(crate) fn owners_dropped() -> u64 {
    OWNERS_DROPPED.load(Ordering::Acquire)
}
