#![forbid(unsafe_code)]

//! Cancellation-token aggregation.
//!
//! [`Closeable`] is the single-method capability behind every teardown
//! handle in the library; [`Connection`](crate::Connection) implements it.
//! [`Set`] collects closeables for a logical scope (a screen, a widget, a
//! simulation entity) and tears them all down at once.
//!
//! # Invariants
//!
//! 1. `Set::close` closes every child exactly once, even when some of them
//!    panic, then leaves the set empty and reusable.
//! 2. Child panics are captured and re-raised as one aggregate after every
//!    child has been visited.
//! 3. [`Noop`] and [`close_boxed`] support the "uninitialized slot" pattern:
//!    a field holding `Box<dyn Closeable>` can always be closed and swapped
//!    for a no-op.

use std::cell::RefCell;
use std::panic::{AssertUnwindSafe, catch_unwind};

use crate::connection::Connection;
use crate::result::ListenerFailure;

/// A single-method cancellation capability.
pub trait Closeable {
    /// Release whatever this handle guards. Implementations must be
    /// idempotent.
    fn close(&self);
}

impl Closeable for Connection {
    fn close(&self) {
        Connection::close(self);
    }
}

/// A closeable that does nothing. The canonical "uninitialized" value.
#[derive(Debug, Clone, Copy, Default)]
pub struct Noop;

impl Closeable for Noop {
    fn close(&self) {}
}

/// Close `closeable` and hand back a no-op to store in its place.
///
/// ```ignore
/// self.conn = ripple_core::closeable::close_boxed(std::mem::replace(
///     &mut self.conn,
///     Box::new(Noop),
/// ));
/// ```
#[must_use]
pub fn close_boxed(closeable: Box<dyn Closeable>) -> Box<dyn Closeable> {
    closeable.close();
    Box::new(Noop)
}

/// A single closeable that closes all of `closeables`.
#[must_use]
pub fn join(closeables: Vec<Box<dyn Closeable>>) -> impl Closeable {
    Joined { closeables }
}

struct Joined {
    closeables: Vec<Box<dyn Closeable>>,
}

impl Closeable for Joined {
    fn close(&self) {
        for closeable in &self.closeables {
            closeable.close();
        }
    }
}

/// An aggregate of cancellation tokens, closed as a unit.
#[derive(Default)]
pub struct Set {
    items: RefCell<Vec<Box<dyn Closeable>>>,
}

impl Set {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a closeable to the set.
    pub fn add(&self, closeable: impl Closeable + 'static) {
        self.items.borrow_mut().push(Box::new(closeable));
    }

    /// Number of held closeables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    /// Whether the set holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    /// Close every held closeable, clear the set, and re-raise any captured
    /// panics as one aggregate. The set is reusable afterwards.
    ///
    /// # Panics
    ///
    /// Panics after the sweep if any child's `close` panicked, with a
    /// message listing every failure.
    pub fn close(&self) {
        // Take the contents first so children adding to this set during
        // teardown start a fresh generation.
        let items: Vec<Box<dyn Closeable>> = self.items.borrow_mut().drain(..).collect();
        let mut failures: Vec<String> = Vec::new();
        for item in &items {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| item.close())) {
                failures.push(ListenerFailure::from_panic(payload.as_ref()).to_string());
            }
        }
        if !failures.is_empty() {
            panic!(
                "{} closeable(s) failed to close: [{}]",
                failures.len(),
                failures.join("; ")
            );
        }
    }
}

impl Closeable for Set {
    fn close(&self) {
        Set::close(self);
    }
}

impl std::fmt::Debug for Set {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Set").field("len", &self.len()).finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
