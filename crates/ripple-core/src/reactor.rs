#![forbid(unsafe_code)]

//! The dispatch core: an ordered listener list with safe re-entrant
//! notification.
//!
//! A [`Reactor<E>`] owns a list of listener registrations (slots) sorted by
//! priority descending, insertion order ascending on ties, plus a FIFO of
//! operations deferred while a dispatch frame is in flight. Every reactive
//! entity in the library (signals, values, futures, collections) is a thin
//! shell around a reactor parameterized by its event shape.
//!
//! # Invariants
//!
//! 1. At most one dispatch frame per reactor is active at a time; a `notify`
//!    issued from inside a listener is queued and drained before the outer
//!    `notify` returns.
//! 2. The walk visits the snapshot taken at frame entry; connections added
//!    during the frame are installed when the frame ends and only see later
//!    dispatches.
//! 3. An explicit [`Connection::close`](crate::Connection::close) during a
//!    frame defers the removal through the FIFO, so the in-flight frame
//!    still notifies the slot; one-shot exhaustion and weak-listener death
//!    mark the slot spent immediately and suppress it in every later frame
//!    of the same drain.
//! 4. Listener panics are captured per slot; the walk and the deferred drain
//!    always run to completion and the list is left consistent before any
//!    captured failure is resurfaced.
//! 5. The wire/unwire hooks fire exactly once per 0→1 / 1→0 transition of
//!    the live-connection count, never from inside a walk.
//!
//! # Failure Modes
//!
//! - **Listener panics**: captured and resurfaced after the drain — a single
//!   panic is resumed verbatim, several are aggregated into one panic whose
//!   message lists each failure.
//! - **`clear_connections` during dispatch or with pending deferred
//!   operations**: panics (an embedder bug; the throw is deliberate).

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};
use std::rc::{Rc, Weak};

use crate::connection::Connection;
use crate::result::ListenerFailure;

/// A shared listener invoked with a borrowed event.
pub type ListenerRef<E> = Rc<dyn Fn(&E)>;

/// How a slot holds its listener.
enum Hold<E> {
    Strong(ListenerRef<E>),
    Weak(Weak<dyn Fn(&E)>),
}

/// One listener registration.
pub(crate) struct Slot<E> {
    hold: RefCell<Hold<E>>,
    pub(crate) priority: Cell<i32>,
    pub(crate) once: Cell<bool>,
    /// Set as soon as teardown is requested; governs connection-op
    /// idempotence and `has_connections`.
    pub(crate) closed: Cell<bool>,
    /// Set only when the slot must be skipped by in-flight and nested
    /// walks: one-shot already fired, or weak listener reclaimed.
    pub(crate) spent: Cell<bool>,
}

impl<E> Slot<E> {
    fn new(listener: ListenerRef<E>) -> Self {
        Self {
            hold: RefCell::new(Hold::Strong(listener)),
            priority: Cell::new(0),
            once: Cell::new(false),
            closed: Cell::new(false),
            spent: Cell::new(false),
        }
    }

    /// Resolve the listener, upgrading a weak hold. `None` means the weak
    /// listener has been reclaimed.
    fn resolve(&self) -> Option<ListenerRef<E>> {
        match &*self.hold.borrow() {
            Hold::Strong(listener) => Some(Rc::clone(listener)),
            Hold::Weak(weak) => weak.upgrade(),
        }
    }

    fn is_live(&self) -> bool {
        !self.closed.get() && self.resolve().is_some()
    }

    fn holds(&self, listener: &ListenerRef<E>) -> bool {
        self.resolve().is_some_and(|held| Rc::ptr_eq(&held, listener))
    }

    /// Downgrade a strong hold to a weak one. Idempotent.
    pub(crate) fn hold_weakly(&self) {
        let mut hold = self.hold.borrow_mut();
        if let Hold::Strong(listener) = &*hold {
            *hold = Hold::Weak(Rc::downgrade(listener));
        }
    }
}

/// An operation queued while a dispatch frame is in flight.
enum Deferred<E> {
    Add(Rc<Slot<E>>),
    Remove(Rc<Slot<E>>),
    Reprioritize(Rc<Slot<E>>, i32),
    Emit(E),
}

pub(crate) struct Core<E> {
    slots: RefCell<Vec<Rc<Slot<E>>>>,
    deferred: RefCell<VecDeque<Deferred<E>>>,
    dispatching: Cell<bool>,
    /// Whether the wire hook has fired more recently than the unwire hook.
    wired: Cell<bool>,
    wire: RefCell<Option<Rc<dyn Fn()>>>,
    unwire: RefCell<Option<Rc<dyn Fn()>>>,
}

impl<E: 'static> Core<E> {
    fn new() -> Self {
        Self {
            slots: RefCell::new(Vec::new()),
            deferred: RefCell::new(VecDeque::new()),
            dispatching: Cell::new(false),
            wired: Cell::new(false),
            wire: RefCell::new(None),
            unwire: RefCell::new(None),
        }
    }

    fn live_count(&self) -> usize {
        self.slots.borrow().iter().filter(|s| s.is_live()).count()
    }

    /// Fire wire/unwire hooks when the live-connection count crossed zero.
    /// Must be called with no outstanding borrows.
    fn sync_hooks(&self) {
        let live = self.live_count() > 0;
        if live && !self.wired.get() {
            self.wired.set(true);
            let hook = self.wire.borrow().clone();
            if let Some(hook) = hook {
                hook();
            }
        } else if !live && self.wired.get() {
            self.wired.set(false);
            let hook = self.unwire.borrow().clone();
            if let Some(hook) = hook {
                hook();
            }
        }
    }

    /// Insert a slot at its sorted position (priority descending, insertion
    /// order ascending on ties).
    fn install(&self, slot: Rc<Slot<E>>) {
        {
            let mut slots = self.slots.borrow_mut();
            let priority = slot.priority.get();
            let pos = slots
                .iter()
                .position(|s| s.priority.get() < priority)
                .unwrap_or(slots.len());
            slots.insert(pos, slot);
        }
        self.sync_hooks();
    }

    pub(crate) fn add(core: &Rc<Self>, listener: ListenerRef<E>) -> Connection {
        let slot = Rc::new(Slot::new(listener));
        if core.dispatching.get() {
            core.deferred
                .borrow_mut()
                .push_back(Deferred::Add(Rc::clone(&slot)));
        } else {
            core.install(Rc::clone(&slot));
        }
        Connection::for_slot(Rc::downgrade(core), slot)
    }

    /// Tear a slot down. Idempotent; removal is deferred while dispatching.
    pub(crate) fn disconnect(&self, slot: &Rc<Slot<E>>) {
        if slot.closed.replace(true) {
            return;
        }
        if self.dispatching.get() {
            self.deferred
                .borrow_mut()
                .push_back(Deferred::Remove(Rc::clone(slot)));
        } else {
            self.remove_now(slot);
        }
    }

    fn remove_now(&self, slot: &Rc<Slot<E>>) {
        {
            let mut slots = self.slots.borrow_mut();
            if let Some(pos) = slots.iter().position(|s| Rc::ptr_eq(s, slot)) {
                slots.remove(pos);
            }
        }
        self.sync_hooks();
    }

    /// Move a slot to a new priority (remove-then-reinsert, deferred while
    /// dispatching).
    ///
    /// # Panics
    ///
    /// Panics if the slot is already closed.
    pub(crate) fn set_priority(&self, slot: &Rc<Slot<E>>, priority: i32) {
        assert!(!slot.closed.get(), "at_prio() on a closed connection");
        if self.dispatching.get() {
            self.deferred
                .borrow_mut()
                .push_back(Deferred::Reprioritize(Rc::clone(slot), priority));
        } else {
            self.reposition(slot, priority);
        }
    }

    fn reposition(&self, slot: &Rc<Slot<E>>, priority: i32) {
        if slot.closed.get() {
            // Closed while the reprioritize was queued.
            return;
        }
        let mut slots = self.slots.borrow_mut();
        if let Some(pos) = slots.iter().position(|s| Rc::ptr_eq(s, slot)) {
            slots.remove(pos);
            slot.priority.set(priority);
            let pos = slots
                .iter()
                .position(|s| s.priority.get() < priority)
                .unwrap_or(slots.len());
            slots.insert(pos, Rc::clone(slot));
        }
    }

    pub(crate) fn disconnect_listener(&self, listener: &ListenerRef<E>) {
        let matches: Vec<Rc<Slot<E>>> = self
            .slots
            .borrow()
            .iter()
            .filter(|s| s.holds(listener))
            .cloned()
            .collect();
        for slot in &matches {
            self.disconnect(slot);
        }
    }

    /// Drop slots whose listener is gone (closed, or weakly held and
    /// reclaimed). Only legal outside a dispatch frame.
    fn prune_dead(&self) {
        let mut removed_any = false;
        self.slots.borrow_mut().retain(|slot| {
            if slot.is_live() {
                true
            } else {
                slot.closed.set(true);
                slot.spent.set(true);
                removed_any = true;
                false
            }
        });
        if removed_any {
            self.sync_hooks();
        }
    }

    pub(crate) fn has_connections(&self) -> bool {
        if !self.dispatching.get() {
            self.prune_dead();
        }
        self.live_count() > 0
    }

    /// # Panics
    ///
    /// Panics while a dispatch frame is active or deferred operations are
    /// pending.
    pub(crate) fn clear_connections(&self) {
        assert!(
            !self.dispatching.get(),
            "clear_connections() while dispatching"
        );
        assert!(
            self.deferred.borrow().is_empty(),
            "clear_connections() with pending deferred operations"
        );
        let removed: Vec<Rc<Slot<E>>> = self.slots.borrow_mut().drain(..).collect();
        for slot in &removed {
            slot.closed.set(true);
            slot.spent.set(true);
        }
        #[cfg(feature = "tracing")]
        tracing::trace!(removed = removed.len(), "reactor.clear_connections");
        self.sync_hooks();
    }

    pub(crate) fn set_wiring(&self, wire: impl Fn() + 'static, unwire: impl Fn() + 'static) {
        *self.wire.borrow_mut() = Some(Rc::new(wire));
        *self.unwire.borrow_mut() = Some(Rc::new(unwire));
        // Connections may already exist by the time a derived entity
        // finishes construction.
        self.sync_hooks();
    }

    pub(crate) fn notify(&self, event: E) {
        if self.dispatching.get() {
            self.deferred.borrow_mut().push_back(Deferred::Emit(event));
            return;
        }
        let mut failures: Vec<Box<dyn Any + Send>> = Vec::new();
        self.dispatch(&event, &mut failures);
        self.drain(&mut failures);
        Self::surface(failures);
    }

    /// Walk one frame over the current snapshot.
    fn dispatch(&self, event: &E, failures: &mut Vec<Box<dyn Any + Send>>) {
        self.dispatching.set(true);
        let snapshot: Vec<Rc<Slot<E>>> = self.slots.borrow().clone();
        for slot in snapshot {
            if slot.spent.get() {
                continue;
            }
            let Some(listener) = slot.resolve() else {
                // Weak listener reclaimed: the slot self-closes and the walk
                // skips it.
                slot.spent.set(true);
                if !slot.closed.replace(true) {
                    self.deferred
                        .borrow_mut()
                        .push_back(Deferred::Remove(Rc::clone(&slot)));
                }
                continue;
            };
            let outcome = catch_unwind(AssertUnwindSafe(|| listener(event)));
            if slot.once.get() {
                slot.spent.set(true);
                if !slot.closed.replace(true) {
                    self.deferred
                        .borrow_mut()
                        .push_back(Deferred::Remove(Rc::clone(&slot)));
                }
            }
            if let Err(payload) = outcome {
                failures.push(payload);
            }
        }
        self.dispatching.set(false);
    }

    /// Apply deferred operations to fixed point in insertion order. A
    /// drained `Emit` runs a fresh frame whose own deferred operations land
    /// in the same queue.
    fn drain(&self, failures: &mut Vec<Box<dyn Any + Send>>) {
        #[cfg(feature = "tracing")]
        {
            let pending = self.deferred.borrow().len();
            if pending > 0 {
                tracing::trace!(pending, "reactor.drain_deferred");
            }
        }
        loop {
            let op = self.deferred.borrow_mut().pop_front();
            let Some(op) = op else { break };
            match op {
                Deferred::Add(slot) => self.install(slot),
                Deferred::Remove(slot) => self.remove_now(&slot),
                Deferred::Reprioritize(slot, priority) => self.reposition(&slot, priority),
                Deferred::Emit(event) => self.dispatch(&event, failures),
            }
        }
    }

    fn surface(mut failures: Vec<Box<dyn Any + Send>>) {
        match failures.len() {
            0 => {}
            1 => resume_unwind(failures.pop().expect("length checked above")),
            _ => {
                let rendered: Vec<String> = failures
                    .iter()
                    .map(|payload| ListenerFailure::from_panic(payload.as_ref()).to_string())
                    .collect();
                panic!(
                    "{} listeners failed during dispatch: [{}]",
                    rendered.len(),
                    rendered.join("; ")
                );
            }
        }
    }
}

/// The base notifier: an ordered listener list with priorities, weak/strong
/// holding, one-shot semantics, and safe re-entrant dispatch.
///
/// Cloning a `Reactor` creates a new handle to the **same** listener list.
pub struct Reactor<E> {
    core: Rc<Core<E>>,
}

impl<E> Clone for Reactor<E> {
    fn clone(&self) -> Self {
        Self {
            core: Rc::clone(&self.core),
        }
    }
}

impl<E: 'static> Default for Reactor<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: 'static> Reactor<E> {
    /// Create an empty reactor.
    #[must_use]
    pub fn new() -> Self {
        Self {
            core: Rc::new(Core::new()),
        }
    }

    /// Register a listener at default priority 0. The returned
    /// [`Connection`] is the sole handle for cancelling it; dropping the
    /// handle leaves the subscription live.
    pub fn connect(&self, listener: impl Fn(&E) + 'static) -> Connection {
        self.connect_shared(Rc::new(listener))
    }

    /// Register a caller-owned listener. Co-owning the `Rc` is what makes
    /// [`Connection::hold_weakly`](crate::Connection::hold_weakly) useful:
    /// once downgraded, the registration lives exactly as long as the
    /// caller's clone.
    pub fn connect_shared(&self, listener: ListenerRef<E>) -> Connection {
        Core::add(&self.core, listener)
    }

    /// Remove every registration holding `listener` (by identity).
    pub fn disconnect_shared(&self, listener: &ListenerRef<E>) {
        self.core.disconnect_listener(listener);
    }

    /// Dispatch `event` to every live registration, in priority-descending,
    /// insertion-order-ascending order. Re-entrant calls are queued and
    /// drained before the outermost `notify` returns.
    ///
    /// # Panics
    ///
    /// Resurfaces listener panics after the frame and drain complete: a
    /// single panic verbatim, several as one aggregated panic.
    pub fn notify(&self, event: E) {
        self.core.notify(event);
    }

    /// Whether any live registration exists. Prunes reclaimed weak
    /// listeners as a side effect when idle.
    #[must_use]
    pub fn has_connections(&self) -> bool {
        self.core.has_connections()
    }

    /// Remove every registration.
    ///
    /// # Panics
    ///
    /// Panics while a dispatch frame is active or deferred operations are
    /// pending.
    pub fn clear_connections(&self) {
        self.core.clear_connections();
    }

    /// Install hooks fired on the 0→1 (`wire`) and 1→0 (`unwire`)
    /// transitions of the live-connection count. This is the extension
    /// point derived reactors use to attach to their upstream lazily.
    pub fn set_wiring(&self, wire: impl Fn() + 'static, unwire: impl Fn() + 'static) {
        self.core.set_wiring(wire, unwire);
    }

    /// Convenience over [`set_wiring`](Self::set_wiring) for the common
    /// derived-reactor shape: `attach` runs on the 0→1 transition and
    /// returns the upstream connection, which is closed on the 1→0
    /// transition.
    pub fn wire_upstream(&self, attach: impl Fn() -> Connection + 'static) {
        let holder: Rc<RefCell<Option<Connection>>> = Rc::new(RefCell::new(None));
        let unhook = Rc::clone(&holder);
        self.set_wiring(
            move || {
                *holder.borrow_mut() = Some(attach());
            },
            move || {
                if let Some(conn) = unhook.borrow_mut().take() {
                    conn.close();
                }
            },
        );
    }

    /// A weak handle used by derived entities to publish into this reactor
    /// without keeping it alive.
    #[must_use]
    pub fn downgrade(&self) -> WeakReactor<E> {
        WeakReactor {
            core: Rc::downgrade(&self.core),
        }
    }
}

/// Weak counterpart of [`Reactor`]; see [`Reactor::downgrade`].
pub struct WeakReactor<E> {
    core: Weak<Core<E>>,
}

impl<E> Clone for WeakReactor<E> {
    fn clone(&self) -> Self {
        Self {
            core: Weak::clone(&self.core),
        }
    }
}

impl<E: 'static> WeakReactor<E> {
    /// Upgrade back to a strong handle, if the reactor is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<Reactor<E>> {
        self.core.upgrade().map(|core| Reactor { core })
    }

    /// Notify if the reactor is still alive; silently drop the event
    /// otherwise.
    pub fn notify(&self, event: E) {
        if let Some(core) = self.core.upgrade() {
            core.notify(event);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{AssertUnwindSafe, catch_unwind};

    fn recorder() -> (Rc<RefCell<Vec<i32>>>, impl Fn(i32) -> ListenerRef<i32>) {
        let seen: Rc<RefCell<Vec<i32>>> = Rc::new(RefCell::new(Vec::new()));
        let make = {
            let seen = Rc::clone(&seen);
            move |tag: i32| -> ListenerRef<i32> {
                let seen = Rc::clone(&seen);
                Rc::new(move |_: &i32| seen.borrow_mut().push(tag))
            }
        };
        (seen, make)
    }

    #[test]
    fn listeners_run_in_priority_then_insertion_order() {
        let reactor: Reactor<i32> = Reactor::new();
        let (seen, make) = recorder();

        let _c2 = reactor.connect_shared(make(2)).at_prio(2);
        let _c4 = reactor.connect_shared(make(4)).at_prio(4);
        let _c3 = reactor.connect_shared(make(3)).at_prio(3);
        let _c1 = reactor.connect_shared(make(1)).at_prio(1);
        // Two at the same priority: earlier insertion wins.
        let _ca = reactor.connect_shared(make(30)).at_prio(3);

        reactor.notify(0);
        assert_eq!(*seen.borrow(), vec![4, 3, 30, 2, 1]);
    }

    #[test]
    fn add_during_dispatch_not_visible_to_current_frame() {
        let reactor: Reactor<i32> = Reactor::new();
        let late_hits = Rc::new(Cell::new(0u32));

        {
            let reactor2 = reactor.clone();
            let late_hits = Rc::clone(&late_hits);
            reactor.connect(move |_| {
                let late_hits = Rc::clone(&late_hits);
                reactor2.connect(move |_| late_hits.set(late_hits.get() + 1));
            });
        }

        reactor.notify(1);
        assert_eq!(late_hits.get(), 0, "fresh listener must miss the current frame");

        reactor.notify(2);
        // One listener was installed per previous emission.
        assert_eq!(late_hits.get(), 1);
    }

    #[test]
    fn close_during_dispatch_still_delivers_current_event() {
        let reactor: Reactor<i32> = Reactor::new();
        let (seen, make) = recorder();

        let target = reactor.connect_shared(make(7));
        {
            let target = target.clone();
            let _closer = reactor
                .connect(move |_| target.close())
                .at_prio(1);
        }

        reactor.notify(5);
        assert_eq!(*seen.borrow(), vec![7], "in-flight frame still notifies");

        reactor.notify(42);
        assert_eq!(*seen.borrow(), vec![7], "later frames do not");
    }

    #[test]
    fn nested_notify_queues_after_current_frame() {
        let reactor: Reactor<i32> = Reactor::new();
        let order: Rc<RefCell<Vec<(i32, i32)>>> = Rc::new(RefCell::new(Vec::new()));

        {
            let reactor2 = reactor.clone();
            let order = Rc::clone(&order);
            reactor.connect(move |v| {
                order.borrow_mut().push((1, *v));
                if *v == 1 {
                    reactor2.notify(2);
                }
            });
        }
        {
            let order = Rc::clone(&order);
            let _c = reactor.connect(move |v| order.borrow_mut().push((2, *v)));
        }

        reactor.notify(1);
        // Both listeners see event 1 before anyone sees the nested event 2.
        assert_eq!(*order.borrow(), vec![(1, 1), (2, 1), (1, 2), (2, 2)]);
    }

    #[test]
    fn one_shot_fires_once_even_across_nested_frames() {
        let reactor: Reactor<i32> = Reactor::new();
        let hits = Rc::new(Cell::new(0u32));

        {
            let reactor2 = reactor.clone();
            let hits = Rc::clone(&hits);
            let conn = reactor.connect(move |v| {
                hits.set(hits.get() + 1);
                if *v == 1 {
                    // Nested emission queued before this slot's removal.
                    reactor2.notify(2);
                }
            });
            let _conn = conn.once();
        }

        reactor.notify(1);
        assert_eq!(hits.get(), 1, "one-shot must not fire for the nested frame");
        reactor.notify(3);
        assert_eq!(hits.get(), 1);
        assert!(!reactor.has_connections());
    }

    #[test]
    fn weak_listener_death_self_closes() {
        let reactor: Reactor<i32> = Reactor::new();
        let hits = Rc::new(Cell::new(0u32));
        let listener: ListenerRef<i32> = {
            let hits = Rc::clone(&hits);
            Rc::new(move |_| hits.set(hits.get() + 1))
        };

        let _conn = reactor.connect_shared(Rc::clone(&listener)).hold_weakly();
        reactor.notify(1);
        assert_eq!(hits.get(), 1);

        drop(listener);
        assert!(!reactor.has_connections());
        reactor.notify(2);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn disconnect_shared_removes_by_identity() {
        let reactor: Reactor<i32> = Reactor::new();
        let hits = Rc::new(Cell::new(0u32));
        let listener: ListenerRef<i32> = {
            let hits = Rc::clone(&hits);
            Rc::new(move |_| hits.set(hits.get() + 1))
        };

        let _conn = reactor.connect_shared(Rc::clone(&listener));
        reactor.notify(1);
        reactor.disconnect_shared(&listener);
        reactor.notify(2);
        assert_eq!(hits.get(), 1);
        assert!(!reactor.has_connections());
    }

    #[test]
    fn panicking_listener_does_not_stop_the_frame() {
        let reactor: Reactor<i32> = Reactor::new();
        let (seen, make) = recorder();

        let _c1 = reactor.connect(|_| panic!("boom"));
        let _c2 = reactor.connect_shared(make(2));

        let err = catch_unwind(AssertUnwindSafe(|| reactor.notify(1))).unwrap_err();
        assert_eq!(err.downcast_ref::<&str>(), Some(&"boom"));
        assert_eq!(*seen.borrow(), vec![2], "later listeners still ran");

        // The reactor is fully usable afterwards.
        reactor.notify(2);
        assert_eq!(*seen.borrow(), vec![2, 2]);
    }

    #[test]
    fn multiple_listener_panics_aggregate() {
        let reactor: Reactor<i32> = Reactor::new();
        let _c1 = reactor.connect(|_| panic!("first"));
        let _c2 = reactor.connect(|_| panic!("second"));

        let err = catch_unwind(AssertUnwindSafe(|| reactor.notify(1))).unwrap_err();
        let message = err
            .downcast_ref::<String>()
            .expect("aggregated panics carry a String payload");
        assert!(message.contains("2 listeners failed"));
        assert!(message.contains("first"));
        assert!(message.contains("second"));
    }

    #[test]
    fn clear_connections_during_dispatch_is_captured_as_failure() {
        let reactor: Reactor<i32> = Reactor::new();
        {
            let reactor2 = reactor.clone();
            reactor.connect(move |_| reactor2.clear_connections());
        }

        let err = catch_unwind(AssertUnwindSafe(|| reactor.notify(1))).unwrap_err();
        let message = err
            .downcast_ref::<&str>()
            .expect("assert! with a literal message panics with a &str payload");
        assert!(message.contains("clear_connections() while dispatching"));
    }

    #[test]
    fn clear_connections_idle_drops_everything() {
        let reactor: Reactor<i32> = Reactor::new();
        let (seen, make) = recorder();
        let conn = reactor.connect_shared(make(1));

        reactor.clear_connections();
        assert!(!reactor.has_connections());
        reactor.notify(1);
        assert!(seen.borrow().is_empty());
        assert!(conn.is_closed());
    }

    #[test]
    fn wire_hooks_fire_on_transitions() {
        let reactor: Reactor<i32> = Reactor::new();
        let wires = Rc::new(Cell::new(0u32));
        let unwires = Rc::new(Cell::new(0u32));
        {
            let wires = Rc::clone(&wires);
            let unwires = Rc::clone(&unwires);
            reactor.set_wiring(
                move || wires.set(wires.get() + 1),
                move || unwires.set(unwires.get() + 1),
            );
        }

        let c1 = reactor.connect(|_| {});
        assert_eq!((wires.get(), unwires.get()), (1, 0));
        let c2 = reactor.connect(|_| {});
        assert_eq!((wires.get(), unwires.get()), (1, 0));

        c1.close();
        assert_eq!((wires.get(), unwires.get()), (1, 0));
        c2.close();
        assert_eq!((wires.get(), unwires.get()), (1, 1));

        let _c3 = reactor.connect(|_| {});
        assert_eq!((wires.get(), unwires.get()), (2, 1));
    }

    #[test]
    fn reprioritize_during_dispatch_defers() {
        let reactor: Reactor<i32> = Reactor::new();
        let (seen, make) = recorder();

        let a = reactor.connect_shared(make(1));
        let b = reactor.connect_shared(make(2));
        {
            let b = b.clone();
            let moved = Cell::new(false);
            let _mover = reactor
                .connect(move |_| {
                    if !moved.replace(true) {
                        // Re-home `b` above everyone; the current frame must
                        // be unaffected.
                        let _ = b.clone().at_prio(10);
                    }
                })
                .at_prio(5);
        }

        reactor.notify(0);
        // Mover ran first (prio 5), but within this frame `a` still
        // precedes `b`.
        assert_eq!(*seen.borrow(), vec![1, 2]);

        reactor.notify(0);
        // Now `b` (prio 10) outranks the mover and `a`.
        assert_eq!(*seen.borrow(), vec![1, 2, 2, 1]);

        drop(a);
    }
}
