#![forbid(unsafe_code)]

//! Dispatch and connection machinery for the ripple reactive primitives.
//!
//! This crate is the foundation the reactive entities in `ripple-reactive`
//! are built on:
//!
//! - [`Reactor`]: the base notifier — an ordered listener list with
//!   priorities, weak/strong holding, one-shot semantics, and safe
//!   re-entrant dispatch (listeners may add, remove, and re-notify during a
//!   frame).
//! - [`Connection`]: the token returned from every subscription and the
//!   sole handle for cancelling it.
//! - [`Try`]: the success-or-failure carrier delivered to future listeners,
//!   with opaque [`Reason`] failures and [`MultiFailure`] aggregation.
//! - [`closeable`]: cancellation-token aggregation (`Set`, `Noop`, `join`).
//!
//! # Threading
//!
//! The library is single-threaded by construction (`Rc`/`RefCell`); it is
//! driven synchronously from whatever loop the embedder runs. Nothing here
//! is `Send` or `Sync`.

pub mod closeable;
mod connection;
mod reactor;
mod result;

pub use connection::Connection;
pub use reactor::{ListenerRef, Reactor, WeakReactor};
pub use result::{ListenerFailure, MultiFailure, Reason, Try, reason};
