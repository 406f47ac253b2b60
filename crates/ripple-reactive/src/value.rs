#![forbid(unsafe_code)]

//! Observable single-value cells.
//!
//! A [`Value<T>`] holds one current value and notifies listeners when it
//! changes. Listeners receive `(new, old)`; the cell is updated **before**
//! listeners run, so `get()` from inside a listener returns the new value.
//!
//! Combinator results ([`map`](Value::map), [`flat_map`](Value::flat_map),
//! and the [`values`](crate::values) utilities) are *derived* values: they
//! read through a closure on every `get()` and subscribe to their upstream
//! lazily, attaching on the 0→1 subscriber transition and detaching on 1→0.
//! Derived values are read-only — `update` on one is a contract violation.
//!
//! # Invariants
//!
//! 1. `update(v)` notifies iff `v` differs from the current value under
//!    `PartialEq`; `update_force(v)` notifies unconditionally; both return
//!    the previous value.
//! 2. Inside a listener, `get()` returns the new value.
//! 3. A derived value dispatches only when the mapped new value differs
//!    from the mapped old value.
//! 4. `connect_notify` closes the just-added connection before propagating
//!    a panic from the immediate invocation.

use std::cell::RefCell;
use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};
use std::rc::Rc;

use ripple_core::{Connection, ListenerRef, Reactor};

use crate::future::{Future, Promise};
use crate::signal::Signal;

/// The event dispatched on a value change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change<T> {
    /// The value after the change.
    pub new: T,
    /// The value before the change; absent only on the synthetic initial
    /// notification from [`Value::connect_notify`].
    pub old: Option<T>,
}

enum Backing<T> {
    Stored(RefCell<T>),
    Derived(Box<dyn Fn() -> T>),
}

struct ValueInner<T> {
    reactor: Reactor<Change<T>>,
    backing: Backing<T>,
}

/// An observable single-value cell.
///
/// Cloning shares the underlying cell and listener list.
pub struct Value<T> {
    inner: Rc<ValueInner<T>>,
}

impl<T> Clone for Value<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> Value<T> {
    /// Create a stored cell holding `value`.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(ValueInner {
                reactor: Reactor::new(),
                backing: Backing::Stored(RefCell::new(value)),
            }),
        }
    }

    /// Create a derived (read-only) value computing its current value on
    /// every read.
    pub(crate) fn derived(read: impl Fn() -> T + 'static) -> Self {
        Self {
            inner: Rc::new(ValueInner {
                reactor: Reactor::new(),
                backing: Backing::Derived(Box::new(read)),
            }),
        }
    }

    pub(crate) fn reactor(&self) -> &Reactor<Change<T>> {
        &self.inner.reactor
    }

    /// The current value.
    #[must_use]
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        match &self.inner.backing {
            Backing::Stored(cell) => cell.borrow().clone(),
            Backing::Derived(read) => read(),
        }
    }

    /// Store `value` and notify listeners iff it differs from the current
    /// value. Returns the previous value.
    ///
    /// # Panics
    ///
    /// Panics on a derived value, and resurfaces listener panics.
    pub fn update(&self, value: T) -> T
    where
        T: Clone + PartialEq,
    {
        self.write(value, false)
    }

    /// Store `value` and notify listeners unconditionally. Returns the
    /// previous value.
    ///
    /// # Panics
    ///
    /// Panics on a derived value, and resurfaces listener panics.
    pub fn update_force(&self, value: T) -> T
    where
        T: Clone + PartialEq,
    {
        self.write(value, true)
    }

    fn write(&self, value: T, force: bool) -> T
    where
        T: Clone + PartialEq,
    {
        let Backing::Stored(cell) = &self.inner.backing else {
            panic!("update() on a derived value");
        };
        let previous = {
            let mut stored = cell.borrow_mut();
            if !force && *stored == value {
                // Unchanged: the caller still gets the previous value,
                // which is structurally equal to the argument.
                return value;
            }
            std::mem::replace(&mut *stored, value.clone())
        };
        self.inner.reactor.notify(Change {
            new: value,
            old: Some(previous.clone()),
        });
        previous
    }

    /// Register a `(new, old)` listener at default priority.
    pub fn connect(&self, listener: impl Fn(&T, Option<&T>) + 'static) -> Connection {
        self.connect_shared(Rc::new(move |change: &Change<T>| {
            listener(&change.new, change.old.as_ref());
        }))
    }

    /// Register a caller-owned change listener (the entry point for weak
    /// holding).
    pub fn connect_shared(&self, listener: ListenerRef<Change<T>>) -> Connection {
        self.inner.reactor.connect_shared(listener)
    }

    /// Register a listener and immediately invoke it once with
    /// `(current, None)`.
    ///
    /// # Panics
    ///
    /// If the immediate invocation panics, the just-added connection is
    /// closed before the panic propagates.
    pub fn connect_notify(&self, listener: impl Fn(&T, Option<&T>) + 'static) -> Connection
    where
        T: Clone,
    {
        let listener: ListenerRef<Change<T>> = Rc::new(move |change: &Change<T>| {
            listener(&change.new, change.old.as_ref());
        });
        let conn = self.connect_shared(Rc::clone(&listener));
        let current = self.get();
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            listener(&Change {
                new: current,
                old: None,
            });
        }));
        if let Err(payload) = outcome {
            conn.close();
            resume_unwind(payload);
        }
        conn
    }

    /// Whether any live listener is registered.
    #[must_use]
    pub fn has_connections(&self) -> bool {
        self.inner.reactor.has_connections()
    }

    /// Remove every listener.
    ///
    /// # Panics
    ///
    /// Panics while a dispatch frame is active.
    pub fn clear_connections(&self) {
        self.inner.reactor.clear_connections();
    }

    /// A derived value carrying `f` of this value. Reads through on every
    /// `get()`; dispatches only when the mapped value actually changes.
    pub fn map<M>(&self, f: impl Fn(&T) -> M + 'static) -> Value<M>
    where
        T: Clone,
        M: Clone + PartialEq + 'static,
    {
        let f = Rc::new(f);
        let upstream = self.clone();
        let mapped = Value::derived({
            let upstream = upstream.clone();
            let f = Rc::clone(&f);
            move || f(&upstream.get())
        });
        let out = mapped.inner.reactor.downgrade();
        mapped.inner.reactor.wire_upstream(move || {
            let out = out.clone();
            let f = Rc::clone(&f);
            upstream.connect_shared(Rc::new(move |change: &Change<T>| {
                let new = f(&change.new);
                let old = change.old.as_ref().map(|old| f(old));
                if old.as_ref() != Some(&new) {
                    out.notify(Change { new, old });
                }
            }))
        });
        mapped
    }

    /// A derived value that follows the value selected by `f`: subscribe to
    /// this value to learn which inner value to subscribe to, and on each
    /// change detach from the old inner and attach to the new. The
    /// dispatched value is the inner's current.
    pub fn flat_map<M>(&self, f: impl Fn(&T) -> Value<M> + 'static) -> Value<M>
    where
        T: Clone,
        M: Clone + PartialEq + 'static,
    {
        let f = Rc::new(f);
        let outer = self.clone();
        let mapped = Value::derived({
            let outer = outer.clone();
            let f = Rc::clone(&f);
            move || f(&outer.get()).get()
        });
        let out = mapped.inner.reactor.downgrade();

        // Both the outer subscription and the re-pointable inner
        // subscription, owned while wired.
        struct Wiring {
            outer: Option<Connection>,
            inner: Option<Connection>,
        }
        let wiring: Rc<RefCell<Wiring>> = Rc::new(RefCell::new(Wiring {
            outer: None,
            inner: None,
        }));

        let attach_inner = {
            let out = out.clone();
            Rc::new(move |inner: &Value<M>| -> Connection {
                let out = out.clone();
                inner.connect_shared(Rc::new(move |change: &Change<M>| {
                    out.notify(change.clone());
                }))
            })
        };

        let wire = {
            let wiring = Rc::clone(&wiring);
            let attach_inner = Rc::clone(&attach_inner);
            let outer = outer.clone();
            let f = Rc::clone(&f);
            move || {
                let inner_conn = attach_inner(&f(&outer.get()));
                let outer_conn = outer.connect_shared(Rc::new({
                    let wiring = Rc::clone(&wiring);
                    let attach_inner = Rc::clone(&attach_inner);
                    let f = Rc::clone(&f);
                    let out = out.clone();
                    move |change: &Change<T>| {
                        let next_inner = f(&change.new);
                        let previous = change.old.as_ref().map(|old| f(old).get());
                        let detached = wiring.borrow_mut().inner.take();
                        if let Some(conn) = detached {
                            conn.close();
                        }
                        wiring.borrow_mut().inner = Some(attach_inner(&next_inner));
                        let current = next_inner.get();
                        if previous.as_ref() != Some(&current) {
                            out.notify(Change {
                                new: current,
                                old: previous,
                            });
                        }
                    }
                }));
                let mut state = wiring.borrow_mut();
                state.outer = Some(outer_conn);
                state.inner = Some(inner_conn);
            }
        };
        let unwire = {
            let wiring = Rc::clone(&wiring);
            move || {
                let (outer_conn, inner_conn) = {
                    let mut state = wiring.borrow_mut();
                    (state.outer.take(), state.inner.take())
                };
                if let Some(conn) = outer_conn {
                    conn.close();
                }
                if let Some(conn) = inner_conn {
                    conn.close();
                }
            }
        };
        mapped.inner.reactor.set_wiring(wire, unwire);
        mapped
    }

    /// Downgrade to event-stream semantics: a signal emitting each new
    /// value.
    pub fn changes(&self) -> Signal<T>
    where
        T: Clone,
    {
        let out: Signal<T> = Signal::new();
        let upstream = self.clone();
        let emit = out.reactor.downgrade();
        out.reactor.wire_upstream(move || {
            let emit = emit.clone();
            upstream.connect_shared(Rc::new(move |change: &Change<T>| {
                emit.notify(change.new.clone());
            }))
        });
        out
    }

    /// A future completed with the first value satisfying `predicate` —
    /// immediately if the current value does.
    pub fn when(&self, predicate: impl Fn(&T) -> bool + 'static) -> Future<T>
    where
        T: Clone,
    {
        let current = self.get();
        if predicate(&current) {
            return Future::success(current);
        }
        let promise = Promise::new();
        let holder: Rc<RefCell<Option<Connection>>> = Rc::new(RefCell::new(None));
        let conn = {
            let promise = promise.clone();
            let holder = Rc::clone(&holder);
            let fired = std::cell::Cell::new(false);
            self.connect(move |new, _old| {
                if fired.get() || !predicate(new) {
                    return;
                }
                fired.set(true);
                if let Some(conn) = holder.borrow_mut().take() {
                    conn.close();
                }
                promise.succeed(new.clone());
            })
        };
        *holder.borrow_mut() = Some(conn);
        promise.into_future()
    }
}

impl<T: std::fmt::Debug + Clone + 'static> std::fmt::Debug for Value<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Value").field("current", &self.get()).finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
