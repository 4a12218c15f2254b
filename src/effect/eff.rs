//! Synchronous effects over a capability environment.
//!
//! An [`Eff<Env, A>`] is an immutable value describing a deferred,
//! possibly-failing computation that needs an environment of type `Env`.
//! Nothing runs until [`Eff::run`] supplies one; composition via `map`,
//! `and_then`, and friends stays lazy, failures short-circuit, and panics
//! inside the pipeline are captured at the evaluation boundary into a
//! structured [`Outcome`].
//!
//! Within a single `and_then` chain, steps execute strictly in the order
//! written, on the calling thread, to completion. [`Eff::fork`] is the one
//! operator that introduces parallelism, by handing the effect to a host
//! worker thread.
//!
//! # Examples
//!
//! ```rust
//! use affect::effect::Eff;
//! use affect::env::{CancelSource, CancelToken, HasCancel};
//! use affect::outcome::Outcome;
//!
//! #[derive(Clone)]
//! struct Env {
//!     cancel: CancelSource,
//! }
//!
//! impl HasCancel for Env {
//!     fn cancel_token(&self) -> CancelToken {
//!         self.cancel.token()
//!     }
//!
//!     fn with_fresh_cancellation(&self) -> Self {
//!         Self {
//!             cancel: CancelSource::new(),
//!         }
//!     }
//! }
//!
//! let pipeline = Eff::<Env, _>::pure(10)
//!     .map(|x| x * 2)
//!     .and_then(|x| Eff::pure(x + 1));
//!
//! let env = Env {
//!     cancel: CancelSource::new(),
//! };
//! assert_eq!(pipeline.run(&env), Outcome::Success(21));
//! ```

use std::fmt;
use std::sync::Arc;

use crate::control::Thunk;
use crate::env::HasCancel;
use crate::outcome::{ErrorInfo, Outcome, capture};

/// Function type for `Eff` internals.
type EffFn<Env, A> = Box<dyn FnOnce(&Env) -> Outcome<A> + Send>;

/// A lazy, synchronous, possibly-failing computation over an environment.
///
/// Effects have no identity beyond the computation they describe; running
/// one consumes it. Memoization is not implicit — two effects built from
/// the same closure evaluate independently — but an effect built from a
/// shared [`Thunk`] via [`Eff::from_thunk`] inherits the thunk's
/// exactly-once evaluation.
///
/// # Type Parameters
///
/// * `Env` - The capability environment the effect needs.
/// * `A` - The success value type.
pub struct Eff<Env, A> {
    run_fn: EffFn<Env, A>,
}

impl<Env, A> fmt::Debug for Eff<Env, A> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Eff")
            .field("run_fn", &"<deferred>")
            .finish()
    }
}

impl<Env, A> Eff<Env, A>
where
    Env: 'static,
    A: Send + 'static,
{
    /// Creates an effect from a closure producing a plain value.
    ///
    /// The closure does not run until [`Eff::run`]; a panic inside it
    /// becomes a `Failure` at that point.
    pub fn new<F>(action: F) -> Self
    where
        F: FnOnce(&Env) -> A + Send + 'static,
    {
        Self {
            run_fn: Box::new(move |env| Outcome::Success(action(env))),
        }
    }

    /// Wraps an already-computed value.
    pub fn pure(value: A) -> Self {
        Self {
            run_fn: Box::new(move |_| Outcome::Success(value)),
        }
    }

    /// An effect that always fails with the given error.
    pub fn fail(error: ErrorInfo) -> Self {
        Self {
            run_fn: Box::new(move |_| Outcome::Failure(error)),
        }
    }

    /// Lifts an outcome of either tag.
    pub fn from_outcome(outcome: Outcome<A>) -> Self {
        Self {
            run_fn: Box::new(move |_| outcome),
        }
    }

    /// Creates an effect from a closure producing an outcome.
    pub fn from_fn<F>(function: F) -> Self
    where
        F: FnOnce(&Env) -> Outcome<A> + Send + 'static,
    {
        Self {
            run_fn: Box::new(function),
        }
    }

    /// Reflects a projection of the environment back as a value.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use affect::effect::Eff;
    /// # use affect::env::{CancelSource, CancelToken, HasCancel};
    /// # #[derive(Clone)]
    /// # struct Env { limit: usize, cancel: CancelSource }
    /// # impl HasCancel for Env {
    /// #     fn cancel_token(&self) -> CancelToken { self.cancel.token() }
    /// #     fn with_fresh_cancellation(&self) -> Self {
    /// #         Self { limit: self.limit, cancel: CancelSource::new() }
    /// #     }
    /// # }
    ///
    /// let effect: Eff<Env, usize> = Eff::asks(|env: &Env| env.limit);
    /// # let env = Env { limit: 3, cancel: CancelSource::new() };
    /// # assert_eq!(effect.run(&env).into_value(), Some(3));
    /// ```
    pub fn asks<F>(projection: F) -> Self
    where
        F: FnOnce(&Env) -> A + Send + 'static,
    {
        Self::new(projection)
    }

    /// An effect evaluating a shared thunk, inheriting its exactly-once
    /// memoization: every effect built from the same thunk instance
    /// observes a single recipe invocation.
    pub fn from_thunk(thunk: Arc<Thunk<A>>) -> Self
    where
        A: Clone + Sync,
        Env: HasCancel,
    {
        Self {
            run_fn: Box::new(move |env| thunk.force(&env.cancel_token())),
        }
    }

    /// Evaluates the effect under the given environment.
    ///
    /// If the environment's cancellation token is already set, returns the
    /// distinguished cancellation failure without running the body. Panics
    /// anywhere in the pipeline are captured into a `Failure`.
    pub fn run(self, env: &Env) -> Outcome<A>
    where
        Env: HasCancel,
    {
        if env.cancel_token().is_canceled() {
            return Outcome::canceled();
        }
        let run_fn = self.run_fn;
        capture(move || run_fn(env))
    }

    /// Transforms the success value; failures pass through without
    /// invoking the function.
    pub fn map<B, F>(self, function: F) -> Eff<Env, B>
    where
        F: FnOnce(A) -> B + Send + 'static,
        B: Send + 'static,
    {
        Eff {
            run_fn: Box::new(move |env| (self.run_fn)(env).map(function)),
        }
    }

    /// Transforms the error; successes pass through unchanged.
    pub fn map_error<F>(self, function: F) -> Self
    where
        F: FnOnce(ErrorInfo) -> ErrorInfo + Send + 'static,
    {
        Self {
            run_fn: Box::new(move |env| (self.run_fn)(env).map_error(function)),
        }
    }

    /// Chains effects; a failure short-circuits without invoking the
    /// continuation.
    pub fn and_then<B, F>(self, function: F) -> Eff<Env, B>
    where
        F: FnOnce(A) -> Eff<Env, B> + Send + 'static,
        B: Send + 'static,
    {
        Eff {
            run_fn: Box::new(move |env| match (self.run_fn)(env) {
                Outcome::Success(value) => (function(value).run_fn)(env),
                Outcome::Failure(error) => Outcome::Failure(error),
            }),
        }
    }

    /// Sequences two effects, discarding the first value.
    pub fn then<B>(self, next: Eff<Env, B>) -> Eff<Env, B>
    where
        B: Send + 'static,
    {
        self.and_then(move |_| next)
    }

    /// Recovers from a failure by switching to another effect.
    pub fn recover<F>(self, function: F) -> Self
    where
        F: FnOnce(ErrorInfo) -> Self + Send + 'static,
    {
        Self {
            run_fn: Box::new(move |env| match (self.run_fn)(env) {
                Outcome::Success(value) => Outcome::Success(value),
                Outcome::Failure(error) => (function(error).run_fn)(env),
            }),
        }
    }

    /// Adapts this effect to an outer environment by narrowing it to the
    /// inner one this effect needs.
    ///
    /// The inner environment is a new value derived per evaluation; no
    /// shared mutable state is introduced.
    pub fn local<Outer, F>(self, narrow: F) -> Eff<Outer, A>
    where
        F: FnOnce(&Outer) -> Env + Send + 'static,
        Env: HasCancel,
        Outer: 'static,
    {
        Eff {
            run_fn: Box::new(move |outer| {
                let inner = narrow(outer);
                self.run(&inner)
            }),
        }
    }

    /// Runs this effect under a derived environment whose cancellation
    /// source is fresh and independent of the caller's.
    pub fn scoped_cancellation(self) -> Self
    where
        Env: HasCancel,
    {
        Self {
            run_fn: Box::new(move |env| {
                let scoped = env.with_fresh_cancellation();
                self.run(&scoped)
            }),
        }
    }

    /// Schedules this effect on a host worker thread and returns
    /// immediately with success, independent of the scheduled effect's
    /// eventual outcome. Only a scheduling failure — the spawn itself
    /// being rejected — surfaces as this effect's failure.
    pub fn fork(self) -> Eff<Env, ()>
    where
        Env: HasCancel + Clone + Send + 'static,
    {
        Eff {
            run_fn: Box::new(move |env| {
                let owned = env.clone();
                let spawned = std::thread::Builder::new()
                    .name("affect-fork".to_string())
                    .spawn(move || {
                        if let Outcome::Failure(error) = self.run(&owned) {
                            tracing::debug!(%error, "forked effect failed");
                        }
                    });
                match spawned {
                    Ok(_) => Outcome::Success(()),
                    Err(error) => Outcome::Failure(ErrorInfo::from(error)),
                }
            }),
        }
    }

    /// Scoped acquisition: runs `acquire`, then `use_fn` with the acquired
    /// resource, then `release` — exactly once, on every exit path of the
    /// use body, including failure and panic.
    ///
    /// If `acquire` fails, neither `use_fn` nor `release` is invoked.
    /// Release-failure policy: when the use body succeeded, a release
    /// failure surfaces as the effect's failure; when the use body already
    /// failed, the release failure is swallowed (logged) and the use
    /// body's failure wins.
    pub fn bracket<R, UseF, RelF>(acquire: Eff<Env, R>, use_fn: UseF, release: RelF) -> Self
    where
        R: Send + 'static,
        UseF: FnOnce(&R) -> Self + Send + 'static,
        RelF: FnOnce(R) -> Eff<Env, ()> + Send + 'static,
    {
        Self {
            run_fn: Box::new(move |env| {
                let resource = match capture(move || (acquire.run_fn)(env)) {
                    Outcome::Success(resource) => resource,
                    Outcome::Failure(error) => return Outcome::Failure(error),
                };

                let used = {
                    let resource_ref = &resource;
                    capture(move || (use_fn(resource_ref).run_fn)(env))
                };
                let released = capture(move || (release(resource).run_fn)(env));

                match (used, released) {
                    (Outcome::Success(value), Outcome::Success(())) => Outcome::Success(value),
                    (Outcome::Success(_), Outcome::Failure(release_error)) => {
                        Outcome::Failure(release_error)
                    }
                    (Outcome::Failure(error), Outcome::Failure(release_error)) => {
                        tracing::debug!(
                            %release_error,
                            "release failure swallowed after failed use body"
                        );
                        Outcome::Failure(error)
                    }
                    (failed @ Outcome::Failure(_), Outcome::Success(())) => failed,
                }
            }),
        }
    }
}

impl<Env> Eff<Env, Env>
where
    Env: Clone + Send + 'static,
{
    /// Reflects the whole running environment back as a value.
    pub fn ask() -> Self {
        Self {
            run_fn: Box::new(|env: &Env| Outcome::Success(env.clone())),
        }
    }
}
