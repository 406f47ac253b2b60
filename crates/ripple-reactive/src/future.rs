#![forbid(unsafe_code)]

//! One-shot asynchronous results.
//!
//! A [`Future<T>`] is a single-value reactor for a result that arrives at
//! most once; a [`Promise<T>`] is a future its owner can complete. There is
//! no executor and no blocking `await`: completion happens synchronously on
//! the completer's stack, and [`Future::result`] is a non-blocking peek.
//!
//! # Invariants
//!
//! 1. The result, once set, is immutable; completing twice is a contract
//!    violation.
//! 2. Listeners registered before completion are notified exactly once and
//!    the listener list is cleared afterwards, so a long-lived completed
//!    future retains no listener closures.
//! 3. Listeners registered after completion are invoked synchronously and
//!    never enter the reactor list.
//! 4. A listener panic during completion neither prevents other listeners
//!    from being notified nor the future from being completed.

use std::cell::{Cell, RefCell};
use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};
use std::rc::Rc;

use ripple_core::{Connection, MultiFailure, Reactor, Reason, Try};

use crate::value::Value;

struct FutureInner<T> {
    result: RefCell<Option<Try<T>>>,
    reactor: Reactor<Try<T>>,
    /// Lazily created completion view, kept in sync by `complete`.
    completion: RefCell<Option<Value<bool>>>,
}

/// A read-only handle to a one-shot asynchronous result.
///
/// Cloning shares the underlying result box.
pub struct Future<T> {
    inner: Rc<FutureInner<T>>,
}

impl<T> Clone for Future<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> Future<T> {
    fn incomplete() -> Self {
        Self {
            inner: Rc::new(FutureInner {
                result: RefCell::new(None),
                reactor: Reactor::new(),
                completion: RefCell::new(None),
            }),
        }
    }

    fn completed(result: Try<T>) -> Self {
        Self {
            inner: Rc::new(FutureInner {
                result: RefCell::new(Some(result)),
                reactor: Reactor::new(),
                completion: RefCell::new(None),
            }),
        }
    }

    /// An already-successful future.
    #[must_use]
    pub fn success(value: T) -> Self {
        Self::completed(Try::Success(value))
    }

    /// An already-failed future.
    #[must_use]
    pub fn failure(reason: Reason) -> Self {
        Self::completed(Try::Failure(reason))
    }

    /// The result, if completed. Non-blocking.
    #[must_use]
    pub fn result(&self) -> Option<Try<T>>
    where
        T: Clone,
    {
        self.inner.result.borrow().clone()
    }

    /// Whether the future has completed, as a plain bool.
    #[must_use]
    pub fn is_complete_now(&self) -> bool {
        self.inner.result.borrow().is_some()
    }

    /// Whether the future has completed, as an observable value. Created
    /// lazily and kept in sync by completion.
    #[must_use]
    pub fn is_complete(&self) -> Value<bool> {
        if let Some(view) = &*self.inner.completion.borrow() {
            return view.clone();
        }
        let view = Value::new(self.is_complete_now());
        *self.inner.completion.borrow_mut() = Some(view.clone());
        view
    }

    /// Register a listener invoked with the result. If the future is
    /// already complete the listener runs synchronously now and the
    /// returned connection is born closed.
    pub fn on_complete(&self, listener: impl Fn(&Try<T>) + 'static) -> Connection
    where
        T: Clone,
    {
        let existing = self.inner.result.borrow().clone();
        if let Some(result) = existing {
            listener(&result);
            return Connection::closed();
        }
        self.inner.reactor.connect(listener)
    }

    /// Register a listener invoked only on success.
    pub fn on_success(&self, listener: impl Fn(&T) + 'static) -> Connection
    where
        T: Clone,
    {
        self.on_complete(move |result| {
            if let Try::Success(value) = result {
                listener(value);
            }
        })
    }

    /// Register a listener invoked only on failure.
    pub fn on_failure(&self, listener: impl Fn(&Reason) + 'static) -> Connection
    where
        T: Clone,
    {
        self.on_complete(move |result| {
            if let Try::Failure(reason) = result {
                listener(reason);
            }
        })
    }

    /// A future carrying `f` of this future's success; failures pass
    /// through unchanged.
    pub fn map<M>(&self, f: impl Fn(&T) -> M + 'static) -> Future<M>
    where
        T: Clone,
        M: Clone + 'static,
    {
        self.transform(move |result| result.map_ref(&f))
    }

    /// A future completed with an arbitrary transform of this future's
    /// result.
    pub fn transform<M>(&self, f: impl Fn(&Try<T>) -> Try<M> + 'static) -> Future<M>
    where
        T: Clone,
        M: Clone + 'static,
    {
        let promise = Promise::new();
        let forward = promise.clone();
        let _conn = self.on_complete(move |result| forward.complete(f(result)));
        promise.into_future()
    }

    /// Chain a further asynchronous step onto a success; failures pass
    /// through unchanged.
    pub fn flat_map<M>(&self, f: impl Fn(&T) -> Future<M> + 'static) -> Future<M>
    where
        T: Clone,
        M: Clone + 'static,
    {
        let promise = Promise::new();
        let forward = promise.clone();
        let _conn = self.on_complete(move |result| match result {
            Try::Success(value) => {
                let forward = forward.clone();
                let _inner = f(value).on_complete(move |inner| forward.complete(inner.clone()));
            }
            Try::Failure(reason) => forward.fail(Rc::clone(reason)),
        });
        promise.into_future()
    }

    /// Turn a failure into a success, leaving successes alone.
    pub fn recover(&self, f: impl Fn(&Reason) -> T + 'static) -> Future<T>
    where
        T: Clone,
    {
        self.transform(move |result| result.clone().recover(&f))
    }

    /// Complete with the ordered results of every input once all have
    /// completed. If any input fails, the aggregate fails with a
    /// [`MultiFailure`] carrying every individual failure in arrival order.
    /// Empty input succeeds immediately with an empty list.
    pub fn sequence(futures: Vec<Future<T>>) -> Future<Vec<T>>
    where
        T: Clone,
    {
        if futures.is_empty() {
            return Future::success(Vec::new());
        }
        let promise = Promise::new();
        let remaining = Rc::new(Cell::new(futures.len()));
        let results: Rc<RefCell<Vec<Option<T>>>> =
            Rc::new(RefCell::new(vec![None; futures.len()]));
        let failures: Rc<RefCell<Vec<Reason>>> = Rc::new(RefCell::new(Vec::new()));
        for (index, future) in futures.iter().enumerate() {
            let promise = promise.clone();
            let remaining = Rc::clone(&remaining);
            let results = Rc::clone(&results);
            let failures = Rc::clone(&failures);
            let _conn = future.on_complete(move |result| {
                match result {
                    Try::Success(value) => results.borrow_mut()[index] = Some(value.clone()),
                    Try::Failure(reason) => failures.borrow_mut().push(Rc::clone(reason)),
                }
                remaining.set(remaining.get() - 1);
                if remaining.get() > 0 {
                    return;
                }
                let recorded = failures.borrow();
                if recorded.is_empty() {
                    let values: Vec<T> = results
                        .borrow_mut()
                        .iter_mut()
                        .map(|slot| slot.take().expect("every input succeeded"))
                        .collect();
                    promise.succeed(values);
                } else {
                    promise.fail(Rc::new(MultiFailure::new(recorded.clone())));
                }
            });
        }
        promise.into_future()
    }

    /// Complete with the successful results only, in arrival order.
    /// Failures are silently dropped; the aggregate always succeeds.
    pub fn collect(futures: Vec<Future<T>>) -> Future<Vec<T>>
    where
        T: Clone,
    {
        if futures.is_empty() {
            return Future::success(Vec::new());
        }
        let promise = Promise::new();
        let remaining = Rc::new(Cell::new(futures.len()));
        let successes: Rc<RefCell<Vec<T>>> = Rc::new(RefCell::new(Vec::new()));
        for future in &futures {
            let promise = promise.clone();
            let remaining = Rc::clone(&remaining);
            let successes = Rc::clone(&successes);
            let _conn = future.on_complete(move |result| {
                if let Try::Success(value) = result {
                    successes.borrow_mut().push(value.clone());
                }
                remaining.set(remaining.get() - 1);
                if remaining.get() == 0 {
                    promise.succeed(successes.borrow_mut().drain(..).collect());
                }
            });
        }
        promise.into_future()
    }
}

/// Complete with both results once both inputs have completed, aggregating
/// failures like [`Future::sequence`].
pub fn sequence2<A, B>(a: &Future<A>, b: &Future<B>) -> Future<(A, B)>
where
    A: Clone + 'static,
    B: Clone + 'static,
{
    struct State<A, B> {
        a: Option<A>,
        b: Option<B>,
        failures: Vec<Reason>,
        remaining: usize,
    }
    let promise = Promise::new();
    let state = Rc::new(RefCell::new(State::<A, B> {
        a: None,
        b: None,
        failures: Vec::new(),
        remaining: 2,
    }));
    let finish = {
        let promise = promise.clone();
        move |state: &Rc<RefCell<State<A, B>>>| {
            let mut state = state.borrow_mut();
            state.remaining -= 1;
            if state.remaining > 0 {
                return;
            }
            if state.failures.is_empty() {
                let a = state.a.take().expect("first input succeeded");
                let b = state.b.take().expect("second input succeeded");
                drop(state);
                promise.succeed((a, b));
            } else {
                let aggregate = MultiFailure::new(std::mem::take(&mut state.failures));
                drop(state);
                promise.fail(Rc::new(aggregate));
            }
        }
    };
    {
        let state = Rc::clone(&state);
        let finish = finish.clone();
        let _conn = a.on_complete(move |result| {
            match result {
                Try::Success(value) => state.borrow_mut().a = Some(value.clone()),
                Try::Failure(reason) => state.borrow_mut().failures.push(Rc::clone(reason)),
            }
            finish(&state);
        });
    }
    {
        let state = Rc::clone(&state);
        let _conn = b.on_complete(move |result| {
            match result {
                Try::Success(value) => state.borrow_mut().b = Some(value.clone()),
                Try::Failure(reason) => state.borrow_mut().failures.push(Rc::clone(reason)),
            }
            finish(&state);
        });
    }
    promise.into_future()
}

/// Complete with all three results once all inputs have completed,
/// aggregating failures like [`Future::sequence`].
pub fn sequence3<A, B, C>(a: &Future<A>, b: &Future<B>, c: &Future<C>) -> Future<(A, B, C)>
where
    A: Clone + 'static,
    B: Clone + 'static,
    C: Clone + 'static,
{
    struct State<A, B, C> {
        a: Option<A>,
        b: Option<B>,
        c: Option<C>,
        failures: Vec<Reason>,
        remaining: usize,
    }
    let promise = Promise::new();
    let state = Rc::new(RefCell::new(State::<A, B, C> {
        a: None,
        b: None,
        c: None,
        failures: Vec::new(),
        remaining: 3,
    }));
    let finish = {
        let promise = promise.clone();
        move |state: &Rc<RefCell<State<A, B, C>>>| {
            let mut state = state.borrow_mut();
            state.remaining -= 1;
            if state.remaining > 0 {
                return;
            }
            if state.failures.is_empty() {
                let a = state.a.take().expect("first input succeeded");
                let b = state.b.take().expect("second input succeeded");
                let c = state.c.take().expect("third input succeeded");
                drop(state);
                promise.succeed((a, b, c));
            } else {
                let aggregate = MultiFailure::new(std::mem::take(&mut state.failures));
                drop(state);
                promise.fail(Rc::new(aggregate));
            }
        }
    };
    {
        let state = Rc::clone(&state);
        let finish = finish.clone();
        let _conn = a.on_complete(move |result| {
            match result {
                Try::Success(value) => state.borrow_mut().a = Some(value.clone()),
                Try::Failure(reason) => state.borrow_mut().failures.push(Rc::clone(reason)),
            }
            finish(&state);
        });
    }
    {
        let state = Rc::clone(&state);
        let finish = finish.clone();
        let _conn = b.on_complete(move |result| {
            match result {
                Try::Success(value) => state.borrow_mut().b = Some(value.clone()),
                Try::Failure(reason) => state.borrow_mut().failures.push(Rc::clone(reason)),
            }
            finish(&state);
        });
    }
    {
        let state = Rc::clone(&state);
        let _conn = c.on_complete(move |result| {
            match result {
                Try::Success(value) => state.borrow_mut().c = Some(value.clone()),
                Try::Failure(reason) => state.borrow_mut().failures.push(Rc::clone(reason)),
            }
            finish(&state);
        });
    }
    promise.into_future()
}

/// A future its owner can complete.
///
/// Cloning shares the underlying future.
pub struct Promise<T> {
    future: Future<T>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            future: self.future.clone(),
        }
    }
}

impl<T: 'static> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> Promise<T> {
    /// Create an incomplete promise.
    #[must_use]
    pub fn new() -> Self {
        Self {
            future: Future::incomplete(),
        }
    }

    /// Complete with `result`: store it, refresh the completion view,
    /// notify every registered listener, then clear the listener list.
    ///
    /// # Panics
    ///
    /// Panics if the promise is already completed, and resurfaces listener
    /// panics (after every listener has been notified and the list
    /// cleared).
    pub fn complete(&self, result: Try<T>)
    where
        T: Clone,
    {
        {
            let mut stored = self.future.inner.result.borrow_mut();
            assert!(
                stored.is_none(),
                "complete() on an already-completed promise"
            );
            *stored = Some(result.clone());
        }
        #[cfg(feature = "tracing")]
        tracing::trace!(success = result.is_success(), "promise.complete");
        let completion = self.future.inner.completion.borrow().clone();
        if let Some(view) = completion {
            let _ = view.update(true);
        }
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            self.future.inner.reactor.notify(result);
        }));
        // Completed futures must not retain listener closures.
        self.future.inner.reactor.clear_connections();
        if let Err(payload) = outcome {
            resume_unwind(payload);
        }
    }

    /// Complete successfully with `value`.
    ///
    /// # Panics
    ///
    /// Panics if the promise is already completed.
    pub fn succeed(&self, value: T)
    where
        T: Clone,
    {
        self.complete(Try::Success(value));
    }

    /// Complete with a failure.
    ///
    /// # Panics
    ///
    /// Panics if the promise is already completed.
    pub fn fail(&self, reason: Reason)
    where
        T: Clone,
    {
        self.complete(Try::Failure(reason));
    }

    /// A read-only handle sharing this promise's result box.
    #[must_use]
    pub fn future(&self) -> Future<T> {
        self.future.clone()
    }

    /// Consume the promise handle, returning the shared future.
    #[must_use]
    pub fn into_future(self) -> Future<T> {
        self.future
    }
}

impl<T: 'static> std::ops::Deref for Promise<T> {
    type Target = Future<T>;

    fn deref(&self) -> &Self::Target {
        &self.future
    }
}

impl<T> std::fmt::Debug for Future<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Future")
            .field("complete", &self.inner.result.borrow().is_some())
            .finish()
    }
}

impl<T: 'static> std::fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Promise")
            .field("complete", &self.is_complete_now())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
