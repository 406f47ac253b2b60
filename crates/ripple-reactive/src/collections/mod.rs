#![forbid(unsafe_code)]

//! Observable containers.
//!
//! Each collection wraps a backing store plus a reactor dispatching
//! structured change events. Every mutation updates the backing store
//! **before** notifying, so listeners consulting the collection observe the
//! post-mutation state. Each collection also exposes a lazily initialized
//! `size_view` — an observable [`Value<usize>`](crate::Value) refreshed
//! after every notification.

mod list;
mod map;
mod set;

pub use list::{ListEvent, RList};
pub use map::{MapEvent, RMap};
pub use set::{RSet, SetEvent};

use std::cell::RefCell;

use crate::value::Value;

/// Lazily initialized observable size, shared by all three collections.
pub(crate) struct SizeView {
    view: RefCell<Option<Value<usize>>>,
}

impl SizeView {
    pub(crate) fn new() -> Self {
        Self {
            view: RefCell::new(None),
        }
    }

    pub(crate) fn get_or_init(&self, len: usize) -> Value<usize> {
        if let Some(view) = &*self.view.borrow() {
            return view.clone();
        }
        let view = Value::new(len);
        *self.view.borrow_mut() = Some(view.clone());
        view
    }

    /// Push the fresh size into the view, if it has been materialized.
    pub(crate) fn refresh(&self, len: usize) {
        let view = self.view.borrow().clone();
        if let Some(view) = view {
            let _ = view.update(len);
        }
    }
}
