#![forbid(unsafe_code)]

//! Combinators over observable values.
//!
//! Logical aggregation ([`and`], [`or`], [`all`], [`any`], [`not`]), tuple
//! joins ([`join2`], [`join3`]), and the signal bridges [`toggler`] and
//! [`as_value`].
//!
//! The combinator results are derived values: they read through on every
//! `get()` and subscribe to their upstreams lazily. [`toggler`] and
//! [`as_value`] are the exception — they return *stored* values kept fresh
//! by a persistent connection on the source signal, so they track emissions
//! even while unobserved.

use std::rc::Rc;

use ripple_core::Connection;

use crate::signal::{Signal, UnitSignal};
use crate::value::{Change, Value};

/// A derived value combining two upstreams through `f`.
fn combine2<A, B, T>(a: &Value<A>, b: &Value<B>, f: impl Fn(&A, &B) -> T + 'static) -> Value<T>
where
    A: Clone + 'static,
    B: Clone + 'static,
    T: Clone + PartialEq + 'static,
{
    let f = Rc::new(f);
    let (a, b) = (a.clone(), b.clone());
    let derived = Value::derived({
        let (a, b) = (a.clone(), b.clone());
        let f = Rc::clone(&f);
        move || f(&a.get(), &b.get())
    });
    let out = derived.reactor().downgrade();
    derived.reactor().wire_upstream(move || {
        let conn_a = a.connect_shared(Rc::new({
            let (b, f, out) = (b.clone(), Rc::clone(&f), out.clone());
            move |change: &Change<A>| {
                let new = f(&change.new, &b.get());
                let old = change.old.as_ref().map(|old_a| f(old_a, &b.get()));
                if old.as_ref() != Some(&new) {
                    out.notify(Change { new, old });
                }
            }
        }));
        let conn_b = b.connect_shared(Rc::new({
            let (a, f, out) = (a.clone(), Rc::clone(&f), out.clone());
            move |change: &Change<B>| {
                let new = f(&a.get(), &change.new);
                let old = change.old.as_ref().map(|old_b| f(&a.get(), old_b));
                if old.as_ref() != Some(&new) {
                    out.notify(Change { new, old });
                }
            }
        }));
        Connection::join(vec![conn_a, conn_b])
    });
    derived
}

/// A derived value combining three upstreams through `f`.
fn combine3<A, B, C, T>(
    a: &Value<A>,
    b: &Value<B>,
    c: &Value<C>,
    f: impl Fn(&A, &B, &C) -> T + 'static,
) -> Value<T>
where
    A: Clone + PartialEq + 'static,
    B: Clone + PartialEq + 'static,
    C: Clone + PartialEq + 'static,
    T: Clone + PartialEq + 'static,
{
    let f = Rc::new(f);
    let ab = join2(a, b);
    combine2(&ab, c, move |(a, b), c| f(a, b, c))
}

/// `true` iff both inputs are `true`.
#[must_use]
pub fn and(a: &Value<bool>, b: &Value<bool>) -> Value<bool> {
    combine2(a, b, |a, b| *a && *b)
}

/// `true` iff either input is `true`.
#[must_use]
pub fn or(a: &Value<bool>, b: &Value<bool>) -> Value<bool> {
    combine2(a, b, |a, b| *a || *b)
}

/// The logical negation of `value`.
#[must_use]
pub fn not(value: &Value<bool>) -> Value<bool> {
    value.map(|b| !b)
}

/// `true` iff every input is `true` (vacuously `true` for no inputs).
#[must_use]
pub fn all(values: &[Value<bool>]) -> Value<bool> {
    aggregate(values.to_vec(), |bools| bools.iter().all(|b| *b))
}

/// `true` iff any input is `true`.
#[must_use]
pub fn any(values: &[Value<bool>]) -> Value<bool> {
    aggregate(values.to_vec(), |bools| bools.iter().any(|b| *b))
}

fn aggregate(
    values: Vec<Value<bool>>,
    fold: impl Fn(&[bool]) -> bool + 'static,
) -> Value<bool> {
    let fold = Rc::new(fold);
    let shared = Rc::new(values);
    let derived = Value::derived({
        let shared = Rc::clone(&shared);
        let fold = Rc::clone(&fold);
        move || fold(&shared.iter().map(Value::get).collect::<Vec<_>>())
    });
    let out = derived.reactor().downgrade();
    derived.reactor().wire_upstream(move || {
        let mut conns = Vec::with_capacity(shared.len());
        for (index, value) in shared.iter().enumerate() {
            conns.push(value.connect_shared(Rc::new({
                let shared = Rc::clone(&shared);
                let fold = Rc::clone(&fold);
                let out = out.clone();
                move |change: &Change<bool>| {
                    let bools: Vec<bool> = shared.iter().map(Value::get).collect();
                    let new = fold(&bools);
                    let old = change.old.map(|old_bool| {
                        let mut prior = bools.clone();
                        prior[index] = old_bool;
                        fold(&prior)
                    });
                    if old != Some(new) {
                        out.notify(Change { new, old });
                    }
                }
            })));
        }
        Connection::join(conns)
    });
    derived
}

/// A derived value pairing both upstreams' currents.
#[must_use]
pub fn join2<A, B>(a: &Value<A>, b: &Value<B>) -> Value<(A, B)>
where
    A: Clone + PartialEq + 'static,
    B: Clone + PartialEq + 'static,
{
    combine2(a, b, |a, b| (a.clone(), b.clone()))
}

/// A derived value tripling all upstreams' currents.
#[must_use]
pub fn join3<A, B, C>(a: &Value<A>, b: &Value<B>, c: &Value<C>) -> Value<(A, B, C)>
where
    A: Clone + PartialEq + 'static,
    B: Clone + PartialEq + 'static,
    C: Clone + PartialEq + 'static,
{
    combine3(a, b, c, |a, b, c| (a.clone(), b.clone(), c.clone()))
}

/// A stored boolean flipped by every emission of `signal`, starting at
/// `initial`.
///
/// The returned value holds a persistent connection on the signal so it
/// tracks emissions even while unobserved.
#[must_use]
pub fn toggler(signal: &UnitSignal, initial: bool) -> Value<bool> {
    let value = Value::new(initial);
    let _conn = {
        let value = value.clone();
        signal.connect(move || {
            let flipped = !value.get();
            let _ = value.update(flipped);
        })
    };
    value
}

/// A stored value tracking the latest emission of `signal`, starting at
/// `initial`.
///
/// The returned value holds a persistent connection on the signal so it
/// tracks emissions even while unobserved. Consecutive equal emissions do
/// not notify (value change semantics).
#[must_use]
pub fn as_value<T>(signal: &Signal<T>, initial: T) -> Value<T>
where
    T: Clone + PartialEq + 'static,
{
    let value = Value::new(initial);
    let _conn = {
        let value = value.clone();
        signal.connect(move |event: &T| {
            let _ = value.update(event.clone());
        })
    };
    value
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
