#![forbid(unsafe_code)]

//! Success-or-failure carriers used throughout the library.
//!
//! [`Try<T>`] is the algebraic result type delivered to future listeners and
//! produced by fallible combinators. Failures are opaque [`Reason`]s: shared
//! handles to any [`std::error::Error`], so the library never prescribes a
//! concrete error type to its embedder.
//!
//! # Invariants
//!
//! 1. `Try::success(v).map(f)` is `Try::success(f(v))`.
//! 2. `Try::failure(e).map(f)` never calls `f` and carries `e` unchanged.
//! 3. `recover` turns any failure into a success and leaves successes alone.
//! 4. A [`MultiFailure`] always carries at least the failures it was built
//!    from, in the order they were recorded.

use std::fmt;
use std::rc::Rc;

use thiserror::Error;

/// An opaque failure reason: a shared handle to any error value.
///
/// `Rc` rather than `Arc` because the library is single-threaded by design.
pub type Reason = Rc<dyn std::error::Error + 'static>;

/// Plain message error behind [`reason`].
#[derive(Debug, Clone, Error)]
#[error("{0}")]
struct MessageError(String);

/// Wrap a plain message into a [`Reason`].
///
/// Convenient for embedders (and tests) that have no richer error type at
/// hand: `promise.fail(reason("device unplugged"))`.
#[must_use]
pub fn reason(message: impl Into<String>) -> Reason {
    Rc::new(MessageError(message.into()))
}

/// A listener invocation that panicked, captured as a failure reason.
#[derive(Debug, Clone, Error)]
#[error("listener failed: {message}")]
pub struct ListenerFailure {
    /// Best-effort rendering of the panic payload.
    pub message: String,
}

impl ListenerFailure {
    /// Capture a panic payload as a listener failure.
    #[must_use]
    pub fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self { message }
    }
}

/// One or more failures accumulated by a single logical operation.
///
/// Produced by future sequencing (every failed input is recorded in arrival
/// order) and by [`closeable::Set::close`](crate::closeable::Set::close).
#[derive(Debug, Clone, Default)]
pub struct MultiFailure {
    failures: Vec<Reason>,
}

impl MultiFailure {
    /// Build from an ordered list of failures.
    #[must_use]
    pub fn new(failures: Vec<Reason>) -> Self {
        Self { failures }
    }

    /// Record another failure, preserving arrival order.
    pub fn push(&mut self, failure: Reason) {
        self.failures.push(failure);
    }

    /// The recorded failures, in arrival order.
    #[must_use]
    pub fn failures(&self) -> &[Reason] {
        &self.failures
    }

    /// Number of recorded failures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// Whether no failure has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for MultiFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failure(s)", self.failures.len())?;
        if self.failures.is_empty() {
            return Ok(());
        }
        write!(f, ": [")?;
        for (i, failure) in self.failures.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{failure}")?;
        }
        write!(f, "]")
    }
}

impl std::error::Error for MultiFailure {}

/// Algebraic success-or-failure carrier with monadic combinators.
#[derive(Debug, Clone)]
pub enum Try<T> {
    /// The computation produced a value.
    Success(T),
    /// The computation failed for the carried reason.
    Failure(Reason),
}

impl<T> Try<T> {
    /// A successful result.
    #[must_use]
    pub fn success(value: T) -> Self {
        Self::Success(value)
    }

    /// A failed result.
    #[must_use]
    pub fn failure(reason: Reason) -> Self {
        Self::Failure(reason)
    }

    /// Whether this is a success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Whether this is a failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    /// The success value.
    ///
    /// # Panics
    ///
    /// Panics with the carried reason if this is a failure.
    #[must_use]
    pub fn get(&self) -> &T {
        match self {
            Self::Success(value) => value,
            Self::Failure(reason) => panic!("Try::get() on a failure: {reason}"),
        }
    }

    /// The failure reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<&Reason> {
        match self {
            Self::Success(_) => None,
            Self::Failure(reason) => Some(reason),
        }
    }

    /// The success value, if any.
    #[must_use]
    pub fn ok(self) -> Option<T> {
        match self {
            Self::Success(value) => Some(value),
            Self::Failure(_) => None,
        }
    }

    /// Convert into a standard [`Result`].
    pub fn into_result(self) -> Result<T, Reason> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Failure(reason) => Err(reason),
        }
    }

    /// Transform the success value, passing failures through unchanged.
    #[must_use]
    pub fn map<M>(self, f: impl FnOnce(T) -> M) -> Try<M> {
        match self {
            Self::Success(value) => Try::Success(f(value)),
            Self::Failure(reason) => Try::Failure(reason),
        }
    }

    /// Chain a further fallible computation onto a success.
    #[must_use]
    pub fn flat_map<M>(self, f: impl FnOnce(T) -> Try<M>) -> Try<M> {
        match self {
            Self::Success(value) => f(value),
            Self::Failure(reason) => Try::Failure(reason),
        }
    }

    /// Turn a failure into a success, leaving successes alone.
    #[must_use]
    pub fn recover(self, f: impl FnOnce(&Reason) -> T) -> Try<T> {
        match self {
            Self::Success(value) => Try::Success(value),
            Self::Failure(reason) => Try::Success(f(&reason)),
        }
    }

    /// Borrowing transform used when dispatching a shared result onward.
    #[must_use]
    pub fn map_ref<M>(&self, f: impl FnOnce(&T) -> M) -> Try<M> {
        match self {
            Self::Success(value) => Try::Success(f(value)),
            Self::Failure(reason) => Try::Failure(Rc::clone(reason)),
        }
    }
}

impl<T> From<Result<T, Reason>> for Try<T> {
    fn from(result: Result<T, Reason>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(reason) => Self::Failure(reason),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_map_round_trip() {
        let t = Try::success(21).map(|v| v * 2);
        assert_eq!(*t.get(), 42);
    }

    #[test]
    fn failure_map_is_inert() {
        let t: Try<i32> = Try::failure(reason("boom"));
        let mapped = t.map(|v| v + 1);
        assert!(mapped.is_failure());
        assert_eq!(mapped.reason().unwrap().to_string(), "boom");
    }

    #[test]
    fn recover_round_trip() {
        let t: Try<String> = Try::failure(reason("boom"));
        let recovered = t.recover(|e| format!("saw {e}"));
        assert_eq!(recovered.get(), "saw boom");
    }

    #[test]
    fn recover_leaves_success_alone() {
        let t = Try::success(7).recover(|_| 0);
        assert_eq!(*t.get(), 7);
    }

    #[test]
    fn flat_map_chains() {
        let t = Try::success(2).flat_map(|v| Try::success(v * 10));
        assert_eq!(*t.get(), 20);

        let t = Try::success(2).flat_map(|_| Try::<i32>::failure(reason("nope")));
        assert!(t.is_failure());
    }

    #[test]
    #[should_panic(expected = "Try::get() on a failure")]
    fn get_on_failure_panics() {
        let t: Try<i32> = Try::failure(reason("boom"));
        let _ = t.get();
    }

    #[test]
    fn into_result() {
        assert_eq!(Try::success(1).into_result().unwrap(), 1);
        assert!(Try::<i32>::failure(reason("x")).into_result().is_err());
    }

    #[test]
    fn map_ref_shares_reason() {
        let r = reason("shared");
        let t: Try<i32> = Try::Failure(Rc::clone(&r));
        let mapped: Try<String> = t.map_ref(|v| v.to_string());
        assert!(Rc::ptr_eq(mapped.reason().unwrap(), &r));
    }

    #[test]
    fn multi_failure_display() {
        let mf = MultiFailure::new(vec![reason("a"), reason("b"), reason("c")]);
        assert_eq!(mf.len(), 3);
        assert_eq!(mf.to_string(), "3 failure(s): [a; b; c]");
    }

    #[test]
    fn multi_failure_empty() {
        let mf = MultiFailure::default();
        assert!(mf.is_empty());
        assert_eq!(mf.to_string(), "0 failure(s)");
    }

    #[test]
    fn listener_failure_from_str_payload() {
        let caught = std::panic::catch_unwind(|| panic!("str payload")).unwrap_err();
        let lf = ListenerFailure::from_panic(&*caught);
        assert_eq!(lf.message, "str payload");
    }

    #[test]
    fn listener_failure_from_string_payload() {
        let caught =
            std::panic::catch_unwind(|| panic!("value {}", 42)).unwrap_err();
        let lf = ListenerFailure::from_panic(&*caught);
        assert_eq!(lf.message, "value 42");
    }
}
