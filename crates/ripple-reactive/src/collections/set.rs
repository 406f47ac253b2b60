#![forbid(unsafe_code)]

//! Observable set of elements.

use std::cell::{Cell, RefCell};
use std::hash::Hash;
use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};
use std::rc::Rc;

use ahash::AHashSet;
use ripple_core::{Connection, ListenerRef, Reactor};

use super::SizeView;
use crate::value::{Change, Value};

/// A structural change to an [`RSet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetEvent<E> {
    /// `elem` was reported added (structurally new unless forced).
    Added {
        /// The affected element.
        elem: E,
    },
    /// `elem` was reported removed (structurally present unless forced).
    Removed {
        /// The affected element.
        elem: E,
    },
}

struct SetInner<E> {
    reactor: Reactor<SetEvent<E>>,
    elems: RefCell<AHashSet<E>>,
    size: SizeView,
}

/// An observable set of unique elements.
///
/// Cloning shares the underlying store and listener list.
pub struct RSet<E> {
    inner: Rc<SetInner<E>>,
}

impl<E> Clone for RSet<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<E: Clone + Eq + Hash + 'static> Default for RSet<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Clone + Eq + Hash + 'static> RSet<E> {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::wrap(AHashSet::new())
    }

    /// Wrap an existing backing set.
    #[must_use]
    pub fn wrap(elems: AHashSet<E>) -> Self {
        Self {
            inner: Rc::new(SetInner {
                reactor: Reactor::new(),
                elems: RefCell::new(elems),
                size: SizeView::new(),
            }),
        }
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.elems.borrow().len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.elems.borrow().is_empty()
    }

    /// Whether `elem` is present.
    #[must_use]
    pub fn contains(&self, elem: &E) -> bool {
        self.inner.elems.borrow().contains(elem)
    }

    /// A copy of the current contents.
    #[must_use]
    pub fn snapshot(&self) -> Vec<E> {
        self.inner.elems.borrow().iter().cloned().collect()
    }

    /// Iterate over a snapshot of the current contents.
    pub fn iter(&self) -> impl Iterator<Item = E> {
        self.snapshot().into_iter()
    }

    /// Insert `elem`, emitting `Added` iff it was structurally new.
    /// Returns whether the set changed.
    pub fn add(&self, elem: E) -> bool {
        let inserted = self.inner.elems.borrow_mut().insert(elem.clone());
        if inserted {
            self.emit(SetEvent::Added { elem });
        }
        inserted
    }

    /// Insert `elem`, emitting `Added` unconditionally.
    pub fn add_force(&self, elem: E) {
        let _ = self.inner.elems.borrow_mut().insert(elem.clone());
        self.emit(SetEvent::Added { elem });
    }

    /// Remove `elem`, emitting `Removed` iff it was present. Returns
    /// whether the set changed.
    pub fn remove(&self, elem: &E) -> bool {
        let removed = self.inner.elems.borrow_mut().remove(elem);
        if removed {
            self.emit(SetEvent::Removed { elem: elem.clone() });
        }
        removed
    }

    /// Remove `elem`, emitting `Removed` even when it was not present.
    pub fn remove_force(&self, elem: &E) {
        let _ = self.inner.elems.borrow_mut().remove(elem);
        self.emit(SetEvent::Removed { elem: elem.clone() });
    }

    /// Remove everything, emitting one `Removed` per element. The backing
    /// store is already empty while the removals dispatch.
    pub fn clear(&self) {
        let drained: Vec<E> = self.inner.elems.borrow_mut().drain().collect();
        for elem in drained {
            self.emit(SetEvent::Removed { elem });
        }
    }

    fn emit(&self, event: SetEvent<E>) {
        self.inner.reactor.notify(event);
        self.inner.size.refresh(self.len());
    }

    /// Register a structural listener at default priority.
    pub fn connect(&self, listener: impl Fn(&SetEvent<E>) + 'static) -> Connection {
        self.inner.reactor.connect(listener)
    }

    /// Register a caller-owned listener (the entry point for weak holding).
    pub fn connect_shared(&self, listener: ListenerRef<SetEvent<E>>) -> Connection {
        self.inner.reactor.connect_shared(listener)
    }

    /// Register a listener and immediately replay the current contents to
    /// it as one `Added` per element.
    ///
    /// # Panics
    ///
    /// If the replay panics, the just-added connection is closed before the
    /// panic propagates.
    pub fn connect_notify(&self, listener: impl Fn(&SetEvent<E>) + 'static) -> Connection {
        let listener: ListenerRef<SetEvent<E>> = Rc::new(listener);
        let conn = self.connect_shared(Rc::clone(&listener));
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            for elem in self.snapshot() {
                listener(&SetEvent::Added { elem });
            }
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

    /// The size as an observable value, refreshed after every
    /// notification.
    #[must_use]
    pub fn size_view(&self) -> Value<usize> {
        self.inner.size.get_or_init(self.len())
    }

    /// Whether `elem` is present, as a lazily wired observable value.
    ///
    /// The view tracks membership across forced (non-structural) events by
    /// re-reading the set, so `add_force` of an existing element stays
    /// silent.
    #[must_use]
    pub fn contains_view(&self, elem: E) -> Value<bool> {
        let set = self.clone();
        let derived = Value::derived({
            let set = set.clone();
            let elem = elem.clone();
            move || set.contains(&elem)
        });
        let out = derived.reactor().downgrade();
        derived.reactor().wire_upstream(move || {
            let out = out.clone();
            let elem = elem.clone();
            let last = Cell::new(set.contains(&elem));
            set.connect_shared(Rc::new(move |event: &SetEvent<E>| {
                let current = match event {
                    SetEvent::Added { elem: e } if *e == elem => true,
                    SetEvent::Removed { elem: e } if *e == elem => false,
                    _ => return,
                };
                if current != last.replace(current) {
                    out.notify(Change {
                        new: current,
                        old: Some(!current),
                    });
                }
            }))
        });
        derived
    }
}

impl<E: Clone + Eq + Hash + 'static> From<AHashSet<E>> for RSet<E> {
    fn from(elems: AHashSet<E>) -> Self {
        Self::wrap(elems)
    }
}

impl<E: Clone + Eq + Hash + 'static> FromIterator<E> for RSet<E> {
    fn from_iter<I: IntoIterator<Item = E>>(iter: I) -> Self {
        Self::wrap(iter.into_iter().collect())
    }
}

impl<E: std::fmt::Debug> std::fmt::Debug for RSet<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.inner.elems.borrow().iter()).finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
