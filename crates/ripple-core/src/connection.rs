#![forbid(unsafe_code)]

//! Subscription handles.
//!
//! Every `connect` returns a [`Connection`]: the sole handle for cancelling
//! the registration. Connections are deliberately **not** RAII guards —
//! dropping the handle leaves the subscription live; only
//! [`close`](Connection::close) tears it down. (Compare a scope guard, which
//! would silently disconnect every listener whose handle the caller
//! discarded.)
//!
//! # Invariants
//!
//! 1. `close` is idempotent: the underlying teardown runs at most once.
//! 2. `once`, `at_prio`, and `hold_weakly` return the handle for chaining:
//!    `signal.connect(f).at_prio(2).once()`.
//! 3. Operations on a connection whose reactor has been dropped are no-ops;
//!    the registration observes the reactor gone.
//! 4. A [`Connection::closed`] handle (returned from subscriptions resolved
//!    immediately, e.g. on an already-completed future) accepts every
//!    operation silently.

use std::rc::{Rc, Weak};

use crate::reactor::{Core, Slot};

/// Object-safe operations a connection forwards to its registration.
trait Anchor {
    fn close(&self);
    fn is_closed(&self) -> bool;
    fn mark_once(&self);
    fn set_priority(&self, priority: i32);
    fn hold_weakly(&self);
}

/// Anchor for a live registration in some reactor.
struct SlotAnchor<E: 'static> {
    core: Weak<Core<E>>,
    slot: Rc<Slot<E>>,
}

impl<E: 'static> Anchor for SlotAnchor<E> {
    fn close(&self) {
        match self.core.upgrade() {
            Some(core) => core.disconnect(&self.slot),
            // Reactor already gone: the registration is logically dead, just
            // record the closure.
            None => {
                self.slot.closed.set(true);
                self.slot.spent.set(true);
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.slot.closed.get()
    }

    fn mark_once(&self) {
        if !self.slot.closed.get() {
            self.slot.once.set(true);
        }
    }

    fn set_priority(&self, priority: i32) {
        match self.core.upgrade() {
            Some(core) => core.set_priority(&self.slot, priority),
            None => {
                assert!(
                    !self.slot.closed.get(),
                    "at_prio() on a closed connection"
                );
                self.slot.priority.set(priority);
            }
        }
    }

    fn hold_weakly(&self) {
        assert!(
            !self.slot.closed.get(),
            "hold_weakly() on a closed connection"
        );
        self.slot.hold_weakly();
    }
}

/// Anchor for a connection that was born closed.
struct ClosedAnchor;

impl Anchor for ClosedAnchor {
    fn close(&self) {}
    fn is_closed(&self) -> bool {
        true
    }
    fn mark_once(&self) {}
    fn set_priority(&self, _priority: i32) {}
    fn hold_weakly(&self) {}
}

/// Anchor aggregating several child connections.
struct JoinAnchor {
    children: Vec<Connection>,
}

impl Anchor for JoinAnchor {
    fn close(&self) {
        for child in &self.children {
            child.close();
        }
    }

    fn is_closed(&self) -> bool {
        self.children.iter().all(Connection::is_closed)
    }

    fn mark_once(&self) {
        for child in &self.children {
            child.anchor.mark_once();
        }
    }

    fn set_priority(&self, priority: i32) {
        for child in &self.children {
            child.anchor.set_priority(priority);
        }
    }

    fn hold_weakly(&self) {
        for child in &self.children {
            child.anchor.hold_weakly();
        }
    }
}

/// A token representing one active subscription.
///
/// Cloning shares the underlying registration: closing any clone closes the
/// subscription.
#[derive(Clone)]
pub struct Connection {
    anchor: Rc<dyn Anchor>,
}

impl Connection {
    pub(crate) fn for_slot<E: 'static>(core: Weak<Core<E>>, slot: Rc<Slot<E>>) -> Self {
        Self {
            anchor: Rc::new(SlotAnchor { core, slot }),
        }
    }

    /// A handle that was never open. Returned from subscription sites that
    /// resolve immediately (an already-completed future) and usable as the
    /// "uninitialized" placeholder.
    #[must_use]
    pub fn closed() -> Self {
        Self {
            anchor: Rc::new(ClosedAnchor),
        }
    }

    /// Aggregate several connections into one: every operation on the
    /// result applies to each child.
    #[must_use]
    pub fn join(connections: Vec<Connection>) -> Self {
        Self {
            anchor: Rc::new(JoinAnchor {
                children: connections,
            }),
        }
    }

    /// Cancel the subscription. Idempotent. During a dispatch frame the
    /// removal is deferred; the in-flight frame still notifies the listener.
    pub fn close(&self) {
        self.anchor.close();
    }

    /// Whether the subscription has been torn down (or was born closed).
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.anchor.is_closed()
    }

    /// Mark the registration one-shot: it self-closes after its next
    /// invocation. Idempotent; silently ignored on a closed connection.
    #[must_use]
    pub fn once(self) -> Self {
        self.anchor.mark_once();
        self
    }

    /// Re-insert the registration at a new priority (higher runs earlier).
    /// Deferred if a dispatch frame is in flight.
    ///
    /// # Panics
    ///
    /// Panics if the connection was already closed by the caller.
    #[must_use]
    pub fn at_prio(self, priority: i32) -> Self {
        self.anchor.set_priority(priority);
        self
    }

    /// Downgrade the reactor's hold on the listener to a weak reference.
    /// Idempotent. The registration then lives exactly as long as some
    /// caller-owned clone of the listener `Rc`.
    ///
    /// # Panics
    ///
    /// Panics if the connection was already closed by the caller.
    #[must_use]
    pub fn hold_weakly(self) -> Self {
        self.anchor.hold_weakly();
        self
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("closed", &self.is_closed())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactor::Reactor;
    use std::cell::Cell;

    #[test]
    fn close_is_idempotent() {
        let reactor: Reactor<i32> = Reactor::new();
        let hits = Rc::new(Cell::new(0u32));
        let conn = {
            let hits = Rc::clone(&hits);
            reactor.connect(move |_| hits.set(hits.get() + 1))
        };

        conn.close();
        conn.close();
        assert!(conn.is_closed());
        reactor.notify(1);
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn clone_shares_registration() {
        let reactor: Reactor<i32> = Reactor::new();
        let conn = reactor.connect(|_| {});
        let twin = conn.clone();

        twin.close();
        assert!(conn.is_closed());
        assert!(!reactor.has_connections());
    }

    #[test]
    fn once_marks_one_shot() {
        let reactor: Reactor<i32> = Reactor::new();
        let hits = Rc::new(Cell::new(0u32));
        let _conn = {
            let hits = Rc::clone(&hits);
            reactor.connect(move |_| hits.set(hits.get() + 1)).once()
        };

        reactor.notify(1);
        reactor.notify(2);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn join_closes_all_children() {
        let reactor: Reactor<i32> = Reactor::new();
        let hits = Rc::new(Cell::new(0u32));
        let make = || {
            let hits = Rc::clone(&hits);
            reactor.connect(move |_| hits.set(hits.get() + 1))
        };

        let joined = Connection::join(vec![make(), make(), make()]);
        reactor.notify(1);
        assert_eq!(hits.get(), 3);

        joined.close();
        assert!(joined.is_closed());
        reactor.notify(2);
        assert_eq!(hits.get(), 3);
        assert!(!reactor.has_connections());
    }

    #[test]
    fn join_once_marks_all_children() {
        let reactor: Reactor<i32> = Reactor::new();
        let hits = Rc::new(Cell::new(0u32));
        let make = || {
            let hits = Rc::clone(&hits);
            reactor.connect(move |_| hits.set(hits.get() + 1))
        };

        let _joined = Connection::join(vec![make(), make()]).once();
        reactor.notify(1);
        reactor.notify(2);
        assert_eq!(hits.get(), 2, "each child fired exactly once");
    }

    #[test]
    fn closed_handle_accepts_everything() {
        let conn = Connection::closed();
        assert!(conn.is_closed());
        conn.close();
        let conn = conn.once().at_prio(3).hold_weakly();
        assert!(conn.is_closed());
    }

    #[test]
    #[should_panic(expected = "at_prio() on a closed connection")]
    fn at_prio_on_closed_connection_panics() {
        let reactor: Reactor<i32> = Reactor::new();
        let conn = reactor.connect(|_| {});
        conn.close();
        let _ = conn.at_prio(1);
    }

    #[test]
    #[should_panic(expected = "hold_weakly() on a closed connection")]
    fn hold_weakly_on_closed_connection_panics() {
        let reactor: Reactor<i32> = Reactor::new();
        let conn = reactor.connect(|_| {});
        conn.close();
        let _ = conn.hold_weakly();
    }

    #[test]
    fn operations_after_reactor_drop_are_noops() {
        let conn = {
            let reactor: Reactor<i32> = Reactor::new();
            reactor.connect(|_| {})
        };
        // Reactor is gone; the registration observes that and no-ops.
        conn.close();
        assert!(conn.is_closed());
    }
}
