#![forbid(unsafe_code)]

//! Reactive primitives: observable models client code registers listeners
//! on.
//!
//! This crate provides the reactive entities built on the
//! [`ripple-core`](ripple_core) dispatch machinery:
//!
//! - [`Signal<T>`] / [`UnitSignal`]: event streams with synchronous
//!   emission and `map`/`filter`/`next` combinators.
//! - [`Value<T>`]: an observable single-value cell with change semantics,
//!   `map`/`flat_map`/`changes`/`when`, and the [`values`] utilities
//!   (logical aggregation, joins, signal bridges).
//! - [`Future<T>`] / [`Promise<T>`]: one-shot asynchronous results with
//!   monadic combinators and sequencing.
//! - [`RList`] / [`RMap`] / [`RSet`]: observable containers emitting
//!   structured change events, with derived size/membership/per-key views.
//!
//! # Architecture
//!
//! Everything is single-threaded shared ownership (`Rc`/`RefCell`), driven
//! synchronously from the embedder's loop. Dispatch is safe against
//! re-entrancy: listeners may connect, disconnect, and re-emit during a
//! notification, with well-defined ordering (see `ripple_core::Reactor`).
//! Derived entities subscribe to their upstream lazily — no subscribers, no
//! upstream connection.
//!
//! # Example
//!
//! ```
//! use ripple_reactive::Value;
//!
//! let temperature = Value::new(20);
//! let label = temperature.map(|celsius| format!("{celsius} °C"));
//!
//! let _conn = label.connect(|new, old| {
//!     println!("{old:?} -> {new}");
//! });
//!
//! temperature.update(21);
//! assert_eq!(label.get(), "21 °C");
//! ```

pub mod collections;
mod future;
mod signal;
mod value;
pub mod values;

pub use future::{Future, Promise, sequence2, sequence3};
pub use signal::{Signal, UnitSignal};
pub use value::{Change, Value};

pub use collections::{ListEvent, MapEvent, RList, RMap, RSet, SetEvent};

// The core machinery is part of this crate's public contract; re-export it
// so embedders depend on one crate.
pub use ripple_core::{
    Connection, ListenerRef, ListenerFailure, MultiFailure, Reactor, Reason, Try, WeakReactor,
    closeable, reason,
};
