#![forbid(unsafe_code)]

//! Observable ordered sequence.

use std::cell::RefCell;
use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};
use std::rc::Rc;

use ripple_core::{Connection, ListenerRef, Reactor};

use super::SizeView;
use crate::value::Value;

/// A structural change to an [`RList`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListEvent<E> {
    /// `elem` was inserted at `index`.
    Added {
        /// Position of the new element.
        index: usize,
        /// The inserted element.
        elem: E,
    },
    /// The element at `index` was replaced.
    Updated {
        /// Position of the replaced element.
        index: usize,
        /// The element now stored.
        new: E,
        /// The element previously stored.
        old: E,
    },
    /// `elem` was removed. `index` is `None` only when
    /// [`RList::remove_force`] reported an element that was not present.
    Removed {
        /// Position the element was removed from, if it was present.
        index: Option<usize>,
        /// The removed (or reported) element.
        elem: E,
    },
}

struct ListInner<E> {
    reactor: Reactor<ListEvent<E>>,
    elems: RefCell<Vec<E>>,
    size: SizeView,
}

/// An observable ordered sequence with indexed insertion, update, and
/// removal.
///
/// Cloning shares the underlying store and listener list.
pub struct RList<E> {
    inner: Rc<ListInner<E>>,
}

impl<E> Clone for RList<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<E: Clone + 'static> Default for RList<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Clone + 'static> RList<E> {
    /// Create an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::wrap(Vec::new())
    }

    /// Wrap an existing backing vector.
    #[must_use]
    pub fn wrap(elems: Vec<E>) -> Self {
        Self {
            inner: Rc::new(ListInner {
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

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.elems.borrow().is_empty()
    }

    /// The element at `index`, if any.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<E> {
        self.inner.elems.borrow().get(index).cloned()
    }

    /// A copy of the current contents.
    #[must_use]
    pub fn snapshot(&self) -> Vec<E> {
        self.inner.elems.borrow().clone()
    }

    /// Iterate over a snapshot of the current contents.
    pub fn iter(&self) -> impl Iterator<Item = E> {
        self.snapshot().into_iter()
    }

    /// Whether `elem` is present.
    #[must_use]
    pub fn contains(&self, elem: &E) -> bool
    where
        E: PartialEq,
    {
        self.inner.elems.borrow().contains(elem)
    }

    /// First index holding `elem`, if any.
    #[must_use]
    pub fn index_of(&self, elem: &E) -> Option<usize>
    where
        E: PartialEq,
    {
        self.inner.elems.borrow().iter().position(|e| e == elem)
    }

    /// Append `elem`, emitting `Added(len-1, elem)`.
    pub fn add(&self, elem: E) {
        let index = {
            let mut elems = self.inner.elems.borrow_mut();
            elems.push(elem.clone());
            elems.len() - 1
        };
        self.emit(ListEvent::Added { index, elem });
    }

    /// Insert `elem` at `index`, emitting `Added(index, elem)`.
    ///
    /// # Panics
    ///
    /// Panics if `index > len` (matching [`Vec::insert`]).
    pub fn insert(&self, index: usize, elem: E) {
        self.inner.elems.borrow_mut().insert(index, elem.clone());
        self.emit(ListEvent::Added { index, elem });
    }

    /// Replace the element at `index`, emitting `Updated`. Returns the
    /// previous element.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len`.
    pub fn set(&self, index: usize, elem: E) -> E {
        let old = {
            let mut elems = self.inner.elems.borrow_mut();
            std::mem::replace(&mut elems[index], elem.clone())
        };
        self.emit(ListEvent::Updated {
            index,
            new: elem,
            old: old.clone(),
        });
        old
    }

    /// Remove and return the element at `index`, emitting `Removed`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len`.
    pub fn remove_at(&self, index: usize) -> E {
        let elem = self.inner.elems.borrow_mut().remove(index);
        self.emit(ListEvent::Removed {
            index: Some(index),
            elem: elem.clone(),
        });
        elem
    }

    /// Remove the first occurrence of `elem`. Returns whether anything was
    /// removed; absent elements emit nothing.
    pub fn remove(&self, elem: &E) -> bool
    where
        E: PartialEq,
    {
        match self.index_of(elem) {
            Some(index) => {
                let _ = self.remove_at(index);
                true
            }
            None => false,
        }
    }

    /// Remove the first occurrence of `elem`, emitting `Removed` even when
    /// it was not present (with an absent index).
    pub fn remove_force(&self, elem: &E)
    where
        E: PartialEq,
    {
        match self.index_of(elem) {
            Some(index) => {
                let _ = self.remove_at(index);
            }
            None => self.emit(ListEvent::Removed {
                index: None,
                elem: elem.clone(),
            }),
        }
    }

    /// Keep only the elements satisfying `predicate`, emitting one
    /// `Removed` per dropped element exactly as direct removals would.
    pub fn retain(&self, predicate: impl Fn(&E) -> bool) {
        let mut index = 0;
        loop {
            let elem = {
                let elems = self.inner.elems.borrow();
                match elems.get(index) {
                    Some(elem) => elem.clone(),
                    None => break,
                }
            };
            if predicate(&elem) {
                index += 1;
                continue;
            }
            let _ = self.inner.elems.borrow_mut().remove(index);
            self.emit(ListEvent::Removed {
                index: Some(index),
                elem,
            });
        }
    }

    /// Remove everything, emitting one `Removed` per element in order. The
    /// backing store is already empty while the removals dispatch; each
    /// event carries index 0, exactly as front-to-back sequential removal
    /// would, so a mirroring listener can replay the stream.
    pub fn clear(&self) {
        let drained: Vec<E> = std::mem::take(&mut *self.inner.elems.borrow_mut());
        for elem in drained {
            self.emit(ListEvent::Removed {
                index: Some(0),
                elem,
            });
        }
    }

    fn emit(&self, event: ListEvent<E>) {
        self.inner.reactor.notify(event);
        self.inner.size.refresh(self.len());
    }

    /// Register a structural listener at default priority.
    pub fn connect(&self, listener: impl Fn(&ListEvent<E>) + 'static) -> Connection {
        self.inner.reactor.connect(listener)
    }

    /// Register a caller-owned listener (the entry point for weak holding).
    pub fn connect_shared(&self, listener: ListenerRef<ListEvent<E>>) -> Connection {
        self.inner.reactor.connect_shared(listener)
    }

    /// Register a listener and immediately replay the current contents to
    /// it as one `Added` per element.
    ///
    /// # Panics
    ///
    /// If the replay panics, the just-added connection is closed before the
    /// panic propagates.
    pub fn connect_notify(&self, listener: impl Fn(&ListEvent<E>) + 'static) -> Connection {
        let listener: ListenerRef<ListEvent<E>> = Rc::new(listener);
        let conn = self.connect_shared(Rc::clone(&listener));
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            for (index, elem) in self.snapshot().into_iter().enumerate() {
                listener(&ListEvent::Added { index, elem });
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
}

impl<E: Clone + 'static> From<Vec<E>> for RList<E> {
    fn from(elems: Vec<E>) -> Self {
        Self::wrap(elems)
    }
}

impl<E: Clone + 'static> FromIterator<E> for RList<E> {
    fn from_iter<I: IntoIterator<Item = E>>(iter: I) -> Self {
        Self::wrap(iter.into_iter().collect())
    }
}

impl<E: std::fmt::Debug> std::fmt::Debug for RList<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.inner.elems.borrow().iter()).finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn eventlog<E: Clone + 'static>(
        list: &RList<E>,
    ) -> (Rc<RefCell<Vec<ListEvent<E>>>>, Connection) {
        let events: Rc<RefCell<Vec<ListEvent<E>>>> = Rc::new(RefCell::new(Vec::new()));
        let conn = {
            let events = Rc::clone(&events);
            list.connect(move |event| events.borrow_mut().push(event.clone()))
        };
        (events, conn)
    }

    #[test]
    fn add_emits_trailing_index() {
        let list = RList::new();
        let (events, _conn) = eventlog(&list);

        list.add("a");
        list.add("b");
        assert_eq!(list.snapshot(), vec!["a", "b"]);
        assert_eq!(
            *events.borrow(),
            vec![
                ListEvent::Added { index: 0, elem: "a" },
                ListEvent::Added { index: 1, elem: "b" },
            ]
        );
    }

    #[test]
    fn insert_set_remove_round_trip() {
        let list = RList::from(vec![1, 3]);
        let (events, _conn) = eventlog(&list);

        list.insert(1, 2);
        assert_eq!(list.snapshot(), vec![1, 2, 3]);

        let old = list.set(0, 10);
        assert_eq!(old, 1);

        let removed = list.remove_at(2);
        assert_eq!(removed, 3);
        assert_eq!(list.snapshot(), vec![10, 2]);

        assert_eq!(
            *events.borrow(),
            vec![
                ListEvent::Added { index: 1, elem: 2 },
                ListEvent::Updated {
                    index: 0,
                    new: 10,
                    old: 1
                },
                ListEvent::Removed {
                    index: Some(2),
                    elem: 3
                },
            ]
        );
    }

    #[test]
    fn remove_by_element_is_silent_when_absent() {
        let list = RList::from(vec![5]);
        let (events, _conn) = eventlog(&list);

        assert!(!list.remove(&9));
        assert!(events.borrow().is_empty());

        assert!(list.remove(&5));
        assert_eq!(events.borrow().len(), 1);
    }

    #[test]
    fn remove_force_always_emits() {
        let list = RList::from(vec![5]);
        let (events, _conn) = eventlog(&list);

        list.remove_force(&9);
        assert_eq!(
            *events.borrow(),
            vec![ListEvent::Removed {
                index: None,
                elem: 9
            }]
        );
        assert_eq!(list.len(), 1, "absent removal leaves the store alone");
    }

    #[test]
    fn listeners_see_post_mutation_state() {
        let list = RList::new();
        let observed_len = Rc::new(std::cell::Cell::new(0usize));
        let _conn = {
            let list2 = list.clone();
            let observed_len = Rc::clone(&observed_len);
            list.connect(move |_| observed_len.set(list2.len()))
        };

        list.add(1);
        assert_eq!(observed_len.get(), 1);
    }

    #[test]
    fn clear_empties_store_before_emitting() {
        let list = RList::from(vec![1, 2]);
        let len_during_emission = Rc::new(RefCell::new(Vec::new()));
        let _conn = {
            let list2 = list.clone();
            let lens = Rc::clone(&len_during_emission);
            list.connect(move |_| lens.borrow_mut().push(list2.len()))
        };

        list.clear();
        assert_eq!(
            *len_during_emission.borrow(),
            vec![0, 0],
            "store is consistently empty during each removal"
        );
    }

    #[test]
    fn retain_emits_like_direct_removals() {
        let list = RList::from(vec![1, 2, 3, 4, 5]);
        let (events, _conn) = eventlog(&list);

        list.retain(|v| v % 2 == 0);
        assert_eq!(list.snapshot(), vec![2, 4]);
        assert_eq!(
            *events.borrow(),
            vec![
                ListEvent::Removed {
                    index: Some(0),
                    elem: 1
                },
                ListEvent::Removed {
                    index: Some(1),
                    elem: 3
                },
                ListEvent::Removed {
                    index: Some(2),
                    elem: 5
                },
            ]
        );
    }

    #[test]
    fn size_view_tracks_mutations() {
        let list = RList::new();
        let size = list.size_view();
        assert_eq!(size.get(), 0);

        list.add(1);
        list.add(2);
        assert_eq!(size.get(), 2);

        let _ = list.remove_at(0);
        assert_eq!(size.get(), 1);

        list.clear();
        assert_eq!(size.get(), 0);
    }

    #[test]
    fn connect_notify_replays_contents() {
        let list = RList::from(vec!["x", "y"]);
        let (events, _conn) = {
            let events: Rc<RefCell<Vec<ListEvent<&str>>>> = Rc::new(RefCell::new(Vec::new()));
            let conn = {
                let events = Rc::clone(&events);
                list.connect_notify(move |event| events.borrow_mut().push(event.clone()))
            };
            (events, conn)
        };

        assert_eq!(
            *events.borrow(),
            vec![
                ListEvent::Added { index: 0, elem: "x" },
                ListEvent::Added { index: 1, elem: "y" },
            ]
        );
    }

    #[test]
    fn connect_notify_replay_panic_closes_connection() {
        let list = RList::from(vec![1]);
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let _conn = list.connect_notify(|_| panic!("replay refused"));
        }));
        assert!(outcome.is_err());
        assert!(!list.has_connections());
    }
}
