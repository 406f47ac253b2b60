#![forbid(unsafe_code)]

//! Observable key→value mapping.

use std::cell::RefCell;
use std::hash::Hash;
use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};
use std::rc::Rc;

use ahash::AHashMap;
use ripple_core::{Connection, ListenerRef, Reactor};

use super::SizeView;
use crate::value::{Change, Value};

/// A structural change to an [`RMap`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapEvent<K, V> {
    /// `key` now maps to `new`; `old` is the previous mapping, if any.
    Put {
        /// The affected key.
        key: K,
        /// The value now stored.
        new: V,
        /// The value previously stored under `key`, if any.
        old: Option<V>,
    },
    /// `key` was removed. `old` is absent only when
    /// [`RMap::remove_force`] reported a key that was not present.
    Removed {
        /// The affected key.
        key: K,
        /// The value previously stored under `key`, if any.
        old: Option<V>,
    },
}

struct MapInner<K, V> {
    reactor: Reactor<MapEvent<K, V>>,
    entries: RefCell<AHashMap<K, V>>,
    size: SizeView,
}

/// An observable key→value mapping with unique keys.
///
/// Cloning shares the underlying store and listener list.
pub struct RMap<K, V> {
    inner: Rc<MapInner<K, V>>,
}

impl<K, V> Clone for RMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<K, V> Default for RMap<K, V>
where
    K: Clone + Eq + Hash + 'static,
    V: Clone + PartialEq + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> RMap<K, V>
where
    K: Clone + Eq + Hash + 'static,
    V: Clone + PartialEq + 'static,
{
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::wrap(AHashMap::new())
    }

    /// Wrap an existing backing map.
    #[must_use]
    pub fn wrap(entries: AHashMap<K, V>) -> Self {
        Self {
            inner: Rc::new(MapInner {
                reactor: Reactor::new(),
                entries: RefCell::new(entries),
                size: SizeView::new(),
            }),
        }
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.entries.borrow().len()
    }

    /// Whether the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.entries.borrow().is_empty()
    }

    /// Whether `key` is present.
    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.entries.borrow().contains_key(key)
    }

    /// The value stored under `key`, if any.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.entries.borrow().get(key).cloned()
    }

    /// The value stored under `key`, or `default`.
    #[must_use]
    pub fn get_or_else(&self, key: &K, default: V) -> V {
        self.get(key).unwrap_or(default)
    }

    /// A copy of the current keys.
    #[must_use]
    pub fn keys(&self) -> Vec<K> {
        self.inner.entries.borrow().keys().cloned().collect()
    }

    /// A copy of the current values.
    #[must_use]
    pub fn values(&self) -> Vec<V> {
        self.inner.entries.borrow().values().cloned().collect()
    }

    /// A copy of the current entries.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(K, V)> {
        self.inner
            .entries
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Map `key` to `value`, emitting `Put` iff the mapping actually
    /// changed. Returns the previous mapping.
    pub fn put(&self, key: K, value: V) -> Option<V> {
        let old = {
            let mut entries = self.inner.entries.borrow_mut();
            if entries.get(&key) == Some(&value) {
                return Some(value);
            }
            entries.insert(key.clone(), value.clone())
        };
        self.emit(MapEvent::Put {
            key,
            new: value,
            old: old.clone(),
        });
        old
    }

    /// Map `key` to `value`, emitting `Put` unconditionally. Returns the
    /// previous mapping.
    pub fn put_force(&self, key: K, value: V) -> Option<V> {
        let old = self
            .inner
            .entries
            .borrow_mut()
            .insert(key.clone(), value.clone());
        self.emit(MapEvent::Put {
            key,
            new: value,
            old: old.clone(),
        });
        old
    }

    /// Remove `key`, emitting `Removed` iff it was present. Returns the
    /// previous mapping.
    pub fn remove(&self, key: &K) -> Option<V> {
        let old = self.inner.entries.borrow_mut().remove(key)?;
        self.emit(MapEvent::Removed {
            key: key.clone(),
            old: Some(old.clone()),
        });
        Some(old)
    }

    /// Remove `key`, emitting `Removed` even when it was not present.
    /// Returns the previous mapping.
    pub fn remove_force(&self, key: &K) -> Option<V> {
        let old = self.inner.entries.borrow_mut().remove(key);
        self.emit(MapEvent::Removed {
            key: key.clone(),
            old: old.clone(),
        });
        old
    }

    /// Remove every entry, emitting one `Removed` per entry. The backing
    /// store is already empty while the removals dispatch.
    pub fn clear(&self) {
        let drained: Vec<(K, V)> = self
            .inner
            .entries
            .borrow_mut()
            .drain()
            .collect();
        for (key, old) in drained {
            self.emit(MapEvent::Removed {
                key,
                old: Some(old),
            });
        }
    }

    fn emit(&self, event: MapEvent<K, V>) {
        self.inner.reactor.notify(event);
        self.inner.size.refresh(self.len());
    }

    /// Register a structural listener at default priority.
    pub fn connect(&self, listener: impl Fn(&MapEvent<K, V>) + 'static) -> Connection {
        self.inner.reactor.connect(listener)
    }

    /// Register a caller-owned listener (the entry point for weak holding).
    pub fn connect_shared(&self, listener: ListenerRef<MapEvent<K, V>>) -> Connection {
        self.inner.reactor.connect_shared(listener)
    }

    /// Register a listener and immediately replay the current entries to it
    /// as one `Put` (with no previous mapping) per entry.
    ///
    /// # Panics
    ///
    /// If the replay panics, the just-added connection is closed before the
    /// panic propagates.
    pub fn connect_notify(&self, listener: impl Fn(&MapEvent<K, V>) + 'static) -> Connection {
        let listener: ListenerRef<MapEvent<K, V>> = Rc::new(listener);
        let conn = self.connect_shared(Rc::clone(&listener));
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            for (key, value) in self.snapshot() {
                listener(&MapEvent::Put {
                    key,
                    new: value,
                    old: None,
                });
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

    /// Whether `key` is present, as a lazily wired observable value.
    #[must_use]
    pub fn contains_key_view(&self, key: K) -> Value<bool> {
        let map = self.clone();
        let derived = Value::derived({
            let map = map.clone();
            let key = key.clone();
            move || map.contains_key(&key)
        });
        let out = derived.reactor().downgrade();
        derived.reactor().wire_upstream(move || {
            let out = out.clone();
            let key = key.clone();
            map.connect_shared(Rc::new(move |event: &MapEvent<K, V>| match event {
                MapEvent::Put { key: k, old, .. } if *k == key => {
                    if old.is_none() {
                        out.notify(Change {
                            new: true,
                            old: Some(false),
                        });
                    }
                }
                MapEvent::Removed { key: k, old } if *k == key => {
                    if old.is_some() {
                        out.notify(Change {
                            new: false,
                            old: Some(true),
                        });
                    }
                }
                _ => {}
            }))
        });
        derived
    }

    /// The mapping for `key`, as a lazily wired observable value updated on
    /// every `Put` and `Removed` touching the key.
    #[must_use]
    pub fn get_view(&self, key: K) -> Value<Option<V>> {
        let map = self.clone();
        let derived = Value::derived({
            let map = map.clone();
            let key = key.clone();
            move || map.get(&key)
        });
        let out = derived.reactor().downgrade();
        derived.reactor().wire_upstream(move || {
            let out = out.clone();
            let key = key.clone();
            map.connect_shared(Rc::new(move |event: &MapEvent<K, V>| match event {
                MapEvent::Put { key: k, new, old } if *k == key => {
                    out.notify(Change {
                        new: Some(new.clone()),
                        old: Some(old.clone()),
                    });
                }
                MapEvent::Removed { key: k, old } if *k == key => {
                    if old.is_some() {
                        out.notify(Change {
                            new: None,
                            old: Some(old.clone()),
                        });
                    }
                }
                _ => {}
            }))
        });
        derived
    }
}

impl<K, V> From<AHashMap<K, V>> for RMap<K, V>
where
    K: Clone + Eq + Hash + 'static,
    V: Clone + PartialEq + 'static,
{
    fn from(entries: AHashMap<K, V>) -> Self {
        Self::wrap(entries)
    }
}

impl<K, V> FromIterator<(K, V)> for RMap<K, V>
where
    K: Clone + Eq + Hash + 'static,
    V: Clone + PartialEq + 'static,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::wrap(iter.into_iter().collect())
    }
}

impl<K, V> std::fmt::Debug for RMap<K, V>
where
    K: std::fmt::Debug,
    V: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.inner.entries.borrow().iter()).finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn eventlog<K, V>(map: &RMap<K, V>) -> (Rc<RefCell<Vec<MapEvent<K, V>>>>, Connection)
    where
        K: Clone + Eq + Hash + 'static,
        V: Clone + PartialEq + 'static,
    {
        let events: Rc<RefCell<Vec<MapEvent<K, V>>>> = Rc::new(RefCell::new(Vec::new()));
        let conn = {
            let events = Rc::clone(&events);
            map.connect(move |event| events.borrow_mut().push(event.clone()))
        };
        (events, conn)
    }

    #[test]
    fn put_emits_only_on_change() {
        let map: RMap<&str, i32> = RMap::new();
        let (events, _conn) = eventlog(&map);

        assert_eq!(map.put("k", 1), None);
        assert_eq!(map.put("k", 1), Some(1), "same value: silent");
        assert_eq!(map.put("k", 2), Some(1));

        assert_eq!(
            *events.borrow(),
            vec![
                MapEvent::Put {
                    key: "k",
                    new: 1,
                    old: None
                },
                MapEvent::Put {
                    key: "k",
                    new: 2,
                    old: Some(1)
                },
            ]
        );
    }

    #[test]
    fn put_force_always_emits() {
        let map: RMap<&str, i32> = RMap::new();
        let (events, _conn) = eventlog(&map);

        let _ = map.put_force("k", 1);
        let _ = map.put_force("k", 1);
        assert_eq!(events.borrow().len(), 2);
    }

    #[test]
    fn remove_is_silent_when_absent() {
        let map: RMap<&str, i32> = RMap::new();
        let (events, _conn) = eventlog(&map);

        assert_eq!(map.remove(&"missing"), None);
        assert!(events.borrow().is_empty());

        let _ = map.put("k", 9);
        assert_eq!(map.remove(&"k"), Some(9));
        assert_eq!(events.borrow().len(), 2);
    }

    #[test]
    fn remove_force_emits_even_when_absent() {
        let map: RMap<&str, i32> = RMap::new();
        let (events, _conn) = eventlog(&map);

        assert_eq!(map.remove_force(&"ghost"), None);
        assert_eq!(
            *events.borrow(),
            vec![MapEvent::Removed {
                key: "ghost",
                old: None
            }]
        );
    }

    #[test]
    fn clear_snapshots_then_emits() {
        let map: RMap<&str, i32> = RMap::new();
        let _ = map.put("a", 1);
        let _ = map.put("b", 2);

        let len_during = Rc::new(RefCell::new(Vec::new()));
        let _conn = {
            let map2 = map.clone();
            let lens = Rc::clone(&len_during);
            map.connect(move |_| lens.borrow_mut().push(map2.len()))
        };

        map.clear();
        assert_eq!(*len_during.borrow(), vec![0, 0]);
        assert!(map.is_empty());
    }

    #[test]
    fn get_or_else_falls_back() {
        let map: RMap<&str, i32> = RMap::new();
        let _ = map.put("k", 5);
        assert_eq!(map.get_or_else(&"k", 0), 5);
        assert_eq!(map.get_or_else(&"missing", 7), 7);
    }

    #[test]
    fn contains_key_view_flips_on_presence_changes() {
        let map: RMap<&str, i32> = RMap::new();
        let present = map.contains_key_view("k");
        assert!(!present.get());

        let flips: Rc<RefCell<Vec<bool>>> = Rc::new(RefCell::new(Vec::new()));
        let _conn = {
            let flips = Rc::clone(&flips);
            present.connect(move |new, _| flips.borrow_mut().push(*new))
        };

        let _ = map.put("k", 1);
        let _ = map.put("k", 2); // value change: presence unchanged, silent
        let _ = map.remove(&"k");
        let _ = map.remove_force(&"k"); // absent removal: silent

        assert!(!present.get());
        assert_eq!(*flips.borrow(), vec![true, false]);
    }

    #[test]
    fn get_view_follows_the_key() {
        let map: RMap<&str, i32> = RMap::new();
        let view = map.get_view("k");
        assert_eq!(view.get(), None);

        let seen: Rc<RefCell<Vec<Option<i32>>>> = Rc::new(RefCell::new(Vec::new()));
        let _conn = {
            let seen = Rc::clone(&seen);
            view.connect(move |new, _| seen.borrow_mut().push(*new))
        };

        let _ = map.put("k", 1);
        let _ = map.put("other", 9); // different key: silent
        let _ = map.put("k", 2);
        let _ = map.remove(&"k");

        assert_eq!(*seen.borrow(), vec![Some(1), Some(2), None]);
        assert_eq!(view.get(), None);
    }

    #[test]
    fn views_detach_when_unobserved() {
        let map: RMap<&str, i32> = RMap::new();
        let view = map.get_view("k");
        assert!(!map.has_connections());

        let conn = view.connect(|_, _| {});
        assert!(map.has_connections());

        conn.close();
        assert!(!map.has_connections());
        // Still correct when read cold.
        let _ = map.put("k", 3);
        assert_eq!(view.get(), Some(3));
    }

    #[test]
    fn size_view_tracks_mutations() {
        let map: RMap<&str, i32> = RMap::new();
        let size = map.size_view();
        assert_eq!(size.get(), 0);

        let _ = map.put("a", 1);
        let _ = map.put("b", 2);
        assert_eq!(size.get(), 2);

        let _ = map.remove(&"a");
        assert_eq!(size.get(), 1);
    }

    #[test]
    fn connect_notify_replays_entries() {
        let map: RMap<&str, i32> = RMap::new();
        let _ = map.put("a", 1);

        let events: Rc<RefCell<Vec<MapEvent<&str, i32>>>> = Rc::new(RefCell::new(Vec::new()));
        let _conn = {
            let events = Rc::clone(&events);
            map.connect_notify(move |event| events.borrow_mut().push(event.clone()))
        };

        assert_eq!(
            *events.borrow(),
            vec![MapEvent::Put {
                key: "a",
                new: 1,
                old: None
            }]
        );
    }
}
