#![forbid(unsafe_code)]

//! Event streams.
//!
//! A [`Signal<T>`] is a reactor that carries no state between emissions:
//! [`emit`](Signal::emit) synchronously dispatches one event to every
//! listener. Derived signals ([`map`](Signal::map), [`filter`](Signal::filter))
//! subscribe to their upstream lazily — they hold no upstream connection
//! while they themselves have no subscribers, attach on the 0→1 transition
//! and detach on 1→0.

use std::rc::Rc;

use ripple_core::{Connection, ListenerRef, Reactor};

use crate::future::{Future, Promise};

/// An event stream: emissions are dispatched synchronously to listeners.
///
/// Cloning shares the underlying listener list.
pub struct Signal<T> {
    pub(crate) reactor: Reactor<T>,
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            reactor: self.reactor.clone(),
        }
    }
}

impl<T: 'static> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> Signal<T> {
    /// Create a signal with no listeners.
    #[must_use]
    pub fn new() -> Self {
        Self {
            reactor: Reactor::new(),
        }
    }

    /// Dispatch `event` to every listener.
    ///
    /// # Panics
    ///
    /// Resurfaces listener panics once the dispatch frame and its deferred
    /// operations have completed.
    pub fn emit(&self, event: T) {
        self.reactor.notify(event);
    }

    /// Register a listener at default priority.
    pub fn connect(&self, listener: impl Fn(&T) + 'static) -> Connection {
        self.reactor.connect(listener)
    }

    /// Register a caller-owned listener (the entry point for weak holding).
    pub fn connect_shared(&self, listener: ListenerRef<T>) -> Connection {
        self.reactor.connect_shared(listener)
    }

    /// Whether any live listener is registered.
    #[must_use]
    pub fn has_connections(&self) -> bool {
        self.reactor.has_connections()
    }

    /// Remove every listener.
    ///
    /// # Panics
    ///
    /// Panics while a dispatch frame is active.
    pub fn clear_connections(&self) {
        self.reactor.clear_connections();
    }

    /// A derived signal carrying `f` of every emission.
    pub fn map<M: 'static>(&self, f: impl Fn(&T) -> M + 'static) -> Signal<M> {
        let mapped: Signal<M> = Signal::new();
        let upstream = self.clone();
        let out = mapped.reactor.downgrade();
        let f = Rc::new(f);
        mapped.reactor.wire_upstream(move || {
            let out = out.clone();
            let f = Rc::clone(&f);
            upstream.connect(move |event| out.notify(f(event)))
        });
        mapped
    }

    /// A derived signal carrying only the emissions satisfying `predicate`.
    pub fn filter(&self, predicate: impl Fn(&T) -> bool + 'static) -> Signal<T>
    where
        T: Clone,
    {
        let filtered: Signal<T> = Signal::new();
        let upstream = self.clone();
        let out = filtered.reactor.downgrade();
        let predicate = Rc::new(predicate);
        filtered.reactor.wire_upstream(move || {
            let out = out.clone();
            let predicate = Rc::clone(&predicate);
            upstream.connect(move |event| {
                if predicate(event) {
                    out.notify(event.clone());
                }
            })
        });
        filtered
    }

    /// A future completed with the next emission (installed as a one-shot).
    pub fn next(&self) -> Future<T>
    where
        T: Clone,
    {
        let promise = Promise::new();
        let complete = promise.clone();
        let _conn = self
            .connect(move |event| complete.succeed(event.clone()))
            .once();
        promise.into_future()
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal").finish()
    }
}

/// An event stream whose emissions carry no payload.
#[derive(Clone, Default)]
pub struct UnitSignal {
    signal: Signal<()>,
}

impl UnitSignal {
    /// Create a unit signal with no listeners.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatch one emission to every listener.
    pub fn emit(&self) {
        self.signal.emit(());
    }

    /// Register a listener at default priority.
    pub fn connect(&self, listener: impl Fn() + 'static) -> Connection {
        self.signal.connect(move |_: &()| listener())
    }

    /// Register a caller-owned listener (the entry point for weak holding).
    pub fn connect_shared(&self, listener: ListenerRef<()>) -> Connection {
        self.signal.connect_shared(listener)
    }

    /// Whether any live listener is registered.
    #[must_use]
    pub fn has_connections(&self) -> bool {
        self.signal.has_connections()
    }

    /// Remove every listener.
    ///
    /// # Panics
    ///
    /// Panics while a dispatch frame is active.
    pub fn clear_connections(&self) {
        self.signal.clear_connections();
    }

    /// A future completed by the next emission.
    pub fn next(&self) -> Future<()> {
        self.signal.next()
    }
}

impl std::fmt::Debug for UnitSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitSignal").finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
