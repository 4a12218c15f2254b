//! Asynchronous effects over a capability environment.
//!
//! An [`Aff<Env, A>`] is the suspending counterpart of
//! [`Eff`](super::Eff): the same lazy, environment-parameterized,
//! possibly-failing computation, except evaluation yields a future. The
//! bridge between the two worlds is [`Driver`], a host future that starts
//! the effect on first poll, forwards readiness, and captures panics into
//! the final [`Outcome`], so async effects plug directly into `await`,
//! `tokio::select!`, and task spawning.
//!
//! Cancellation is checked when evaluation starts and again at every
//! `and_then` boundary; a step already running is never interrupted
//! mid-flight.
//!
//! # Examples
//!
//! ```rust,ignore
//! use affect::effect::Aff;
//!
//! let pipeline = Aff::<Env, _>::pure(10)
//!     .map(|x| x * 2)
//!     .and_then(|x| Aff::pure(x + 1));
//!
//! let outcome = pipeline.run(&env).await;
//! assert_eq!(outcome.into_value(), Some(21));
//! ```

use std::fmt;
use std::future::{Future, ready};
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::CatchUnwind;
use pin_project_lite::pin_project;

use crate::control::{AsyncThunk, BoxFuture};
use crate::effect::{Eff, runtime};
use crate::env::HasCancel;
use crate::outcome::{ErrorInfo, Outcome};

/// Function type for `Aff` internals: given the environment, produce the
/// future that evaluates the effect, borrowing the environment for as
/// long as it runs.
type AffFn<Env, A> = Box<dyn for<'env> FnOnce(&'env Env) -> BoxFuture<'env, Outcome<A>> + Send>;

/// The deferred start function a [`Driver`] holds before its first poll.
type StartFn<'env, A> = Box<dyn FnOnce() -> BoxFuture<'env, Outcome<A>> + Send + 'env>;

/// A lazy, asynchronous, possibly-failing computation over an environment.
///
/// Nothing runs until [`Aff::run`] produces a [`Driver`] and that driver
/// is polled. Like its synchronous sibling, an `Aff` has no implicit
/// memoization; share an [`AsyncThunk`] via [`Aff::from_async_thunk`]
/// when exactly-once evaluation is wanted.
///
/// # Type Parameters
///
/// * `Env` - The capability environment the effect needs.
/// * `A` - The success value type.
pub struct Aff<Env, A> {
    run_fn: AffFn<Env, A>,
}

impl<Env, A> fmt::Debug for Aff<Env, A> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Aff")
            .field("run_fn", &"<deferred>")
            .finish()
    }
}

impl<Env, A> Aff<Env, A>
where
    Env: Sync + 'static,
    A: Send + 'static,
{
    /// Wraps an already-computed value.
    pub fn pure(value: A) -> Self {
        Self {
            run_fn: Box::new(move |_| Box::pin(ready(Outcome::Success(value)))),
        }
    }

    /// An effect that always fails with the given error.
    pub fn fail(error: ErrorInfo) -> Self {
        Self {
            run_fn: Box::new(move |_| Box::pin(ready(Outcome::Failure(error)))),
        }
    }

    /// Lifts an outcome of either tag.
    pub fn from_outcome(outcome: Outcome<A>) -> Self {
        Self {
            run_fn: Box::new(move |_| Box::pin(ready(outcome))),
        }
    }

    /// Creates an effect from a closure producing an evaluation future
    /// that may borrow the environment.
    pub fn from_fn<F>(function: F) -> Self
    where
        F: for<'env> FnOnce(&'env Env) -> BoxFuture<'env, Outcome<A>> + Send + 'static,
    {
        Self {
            run_fn: Box::new(function),
        }
    }

    /// Creates an effect from a closure producing an owned future.
    ///
    /// The closure receives the environment to clone what it needs; the
    /// returned future must not borrow it.
    pub fn from_async<F, Fut>(function: F) -> Self
    where
        F: FnOnce(&Env) -> Fut + Send + 'static,
        Fut: Future<Output = Outcome<A>> + Send + 'static,
    {
        Self {
            run_fn: Box::new(move |env| Box::pin(function(env))),
        }
    }

    /// Lifts an environment-independent future.
    pub fn from_future<Fut>(future: Fut) -> Self
    where
        Fut: Future<Output = A> + Send + 'static,
    {
        Self {
            run_fn: Box::new(move |_| Box::pin(future.map(Outcome::Success))),
        }
    }

    /// Lifts a synchronous effect into the async world.
    ///
    /// The synchronous body runs inline when evaluation starts, on the
    /// polling task.
    pub fn from_eff(effect: Eff<Env, A>) -> Self
    where
        Env: HasCancel,
    {
        Self {
            run_fn: Box::new(move |env| Box::pin(async move { effect.run(env) })),
        }
    }

    /// An effect evaluating a shared async thunk, inheriting its
    /// exactly-once memoization.
    pub fn from_async_thunk(thunk: AsyncThunk<A>) -> Self
    where
        A: Clone,
        Env: HasCancel,
    {
        Self {
            run_fn: Box::new(move |env| {
                Box::pin(async move { thunk.force(&env.cancel_token()).await })
            }),
        }
    }

    /// Reflects a projection of the environment back as a value.
    pub fn asks<F>(projection: F) -> Self
    where
        F: FnOnce(&Env) -> A + Send + 'static,
    {
        Self {
            run_fn: Box::new(move |env| Box::pin(ready(Outcome::Success(projection(env))))),
        }
    }

    /// Evaluates the effect under the given environment, returning the
    /// host future that drives it.
    ///
    /// The returned [`Driver`] does nothing until polled. A cancellation
    /// token observed set at that first poll resolves to the
    /// distinguished cancellation failure without starting the body.
    pub fn run(self, env: &Env) -> Driver<'_, A>
    where
        Env: HasCancel,
    {
        let run_fn = self.run_fn;
        Driver::new(Box::new(move || {
            if env.cancel_token().is_canceled() {
                Box::pin(ready(Outcome::canceled()))
            } else {
                run_fn(env)
            }
        }))
    }

    /// Evaluates the effect to completion from synchronous code.
    ///
    /// Uses the ambient runtime when one exists, the global fallback
    /// otherwise; an unbridgeable context (a current-thread runtime
    /// worker) becomes a logical failure.
    pub fn run_sync(self, env: &Env) -> Outcome<A>
    where
        Env: HasCancel,
    {
        match runtime::try_run_blocking(self.run(env)) {
            Ok(outcome) => outcome,
            Err(error) => Outcome::Failure(ErrorInfo::new(error.to_string())),
        }
    }

    /// Transforms the success value; failures pass through without
    /// invoking the function.
    pub fn map<B, F>(self, function: F) -> Aff<Env, B>
    where
        F: FnOnce(A) -> B + Send + 'static,
        B: Send + 'static,
    {
        Aff {
            run_fn: Box::new(move |env| {
                Box::pin(async move { (self.run_fn)(env).await.map(function) })
            }),
        }
    }

    /// Transforms the error; successes pass through unchanged.
    pub fn map_error<F>(self, function: F) -> Self
    where
        F: FnOnce(ErrorInfo) -> ErrorInfo + Send + 'static,
    {
        Self {
            run_fn: Box::new(move |env| {
                Box::pin(async move { (self.run_fn)(env).await.map_error(function) })
            }),
        }
    }

    /// Chains effects; a failure short-circuits, and a cancellation
    /// token observed set at this boundary stops the pipeline with the
    /// distinguished cancellation failure before the continuation runs.
    pub fn and_then<B, F>(self, function: F) -> Aff<Env, B>
    where
        F: FnOnce(A) -> Aff<Env, B> + Send + 'static,
        B: Send + 'static,
        Env: HasCancel,
    {
        Aff {
            run_fn: Box::new(move |env| {
                Box::pin(async move {
                    match (self.run_fn)(env).await {
                        Outcome::Success(value) => {
                            if env.cancel_token().is_canceled() {
                                return Outcome::canceled();
                            }
                            (function(value).run_fn)(env).await
                        }
                        Outcome::Failure(error) => Outcome::Failure(error),
                    }
                })
            }),
        }
    }

    /// Sequences two effects, discarding the first value.
    pub fn then<B>(self, next: Aff<Env, B>) -> Aff<Env, B>
    where
        B: Send + 'static,
        Env: HasCancel,
    {
        self.and_then(move |_| next)
    }

    /// Recovers from a failure by switching to another effect.
    pub fn recover<F>(self, function: F) -> Self
    where
        F: FnOnce(ErrorInfo) -> Self + Send + 'static,
    {
        Self {
            run_fn: Box::new(move |env| {
                Box::pin(async move {
                    match (self.run_fn)(env).await {
                        Outcome::Success(value) => Outcome::Success(value),
                        Outcome::Failure(error) => (function(error).run_fn)(env).await,
                    }
                })
            }),
        }
    }

    /// Adapts this effect to an outer environment by narrowing it to the
    /// inner one this effect needs.
    pub fn local<Outer, F>(self, narrow: F) -> Aff<Outer, A>
    where
        F: FnOnce(&Outer) -> Env + Send + 'static,
        Env: HasCancel + Send,
        Outer: Sync + 'static,
    {
        Aff {
            run_fn: Box::new(move |outer| {
                Box::pin(async move {
                    let inner = narrow(outer);
                    self.run(&inner).await
                })
            }),
        }
    }

    /// Runs this effect under a derived environment whose cancellation
    /// source is fresh and independent of the caller's.
    pub fn scoped_cancellation(self) -> Self
    where
        Env: HasCancel + Send,
    {
        Self {
            run_fn: Box::new(move |env| {
                Box::pin(async move {
                    let scoped = env.with_fresh_cancellation();
                    self.run(&scoped).await
                })
            }),
        }
    }

    /// Schedules this effect as a runtime task and returns immediately
    /// with success, independent of the scheduled effect's eventual
    /// outcome. Only a scheduling failure, that is no runtime being
    /// reachable, surfaces as this effect's failure.
    pub fn fork(self) -> Aff<Env, ()>
    where
        Env: HasCancel + Clone + Send + 'static,
    {
        Aff {
            run_fn: Box::new(move |env| {
                let owned = env.clone();
                Box::pin(async move {
                    let handle = match runtime::handle() {
                        Ok(handle) => handle,
                        Err(error) => return Outcome::Failure(ErrorInfo::new(error.to_string())),
                    };
                    handle.spawn(async move {
                        if let Outcome::Failure(error) = self.run(&owned).await {
                            tracing::debug!(%error, "forked effect failed");
                        }
                    });
                    Outcome::Success(())
                })
            }),
        }
    }

    /// Scoped acquisition: runs `acquire`, then `use_fn` with the
    /// acquired resource, then `release`. Exactly once, on every exit
    /// path of the use body, including failure and panic.
    ///
    /// Same release-failure policy as [`Eff::bracket`]: a release failure
    /// surfaces only when the use body succeeded, and is swallowed
    /// (logged) when the use body already failed.
    pub fn bracket<R, UseF, RelF>(acquire: Aff<Env, R>, use_fn: UseF, release: RelF) -> Self
    where
        R: Send + Sync + 'static,
        UseF: FnOnce(&R) -> Self + Send + 'static,
        RelF: FnOnce(R) -> Aff<Env, ()> + Send + 'static,
        Env: HasCancel,
    {
        Self {
            run_fn: Box::new(move |env| {
                Box::pin(async move {
                    let resource = match AssertUnwindSafe((acquire.run_fn)(env))
                        .catch_unwind()
                        .await
                    {
                        Ok(Outcome::Success(resource)) => resource,
                        Ok(Outcome::Failure(error)) => return Outcome::Failure(error),
                        Err(payload) => {
                            return Outcome::Failure(ErrorInfo::from_panic(payload.as_ref()));
                        }
                    };

                    let used = {
                        let resource_ref = &resource;
                        AssertUnwindSafe(async move { (use_fn(resource_ref).run_fn)(env).await })
                            .catch_unwind()
                            .await
                            .unwrap_or_else(|payload| {
                                Outcome::Failure(ErrorInfo::from_panic(payload.as_ref()))
                            })
                    };

                    let released =
                        AssertUnwindSafe(async move { (release(resource).run_fn)(env).await })
                            .catch_unwind()
                            .await
                            .unwrap_or_else(|payload| {
                                Outcome::Failure(ErrorInfo::from_panic(payload.as_ref()))
                            });

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
                })
            }),
        }
    }
}

impl<Env> Aff<Env, Env>
where
    Env: Clone + Send + Sync + 'static,
{
    /// Reflects the whole running environment back as a value.
    pub fn ask() -> Self {
        Self {
            run_fn: Box::new(|env: &Env| Box::pin(ready(Outcome::Success(env.clone())))),
        }
    }
}

// =============================================================================
// Driver: the future that hosts an evaluating effect
// =============================================================================

pin_project! {
    /// Host future for an evaluating [`Aff`].
    ///
    /// Created by [`Aff::run`]. The first poll starts the effect (or
    /// short-circuits to the cancellation failure), subsequent polls
    /// forward to the evaluation future, and a panic anywhere inside is
    /// captured into the final [`Outcome`]. Completes exactly once;
    /// polling after completion panics, as for any future.
    pub struct Driver<'env, A> {
        #[pin]
        state: DriverState<'env, A>,
    }
}

pin_project! {
    #[project = DriverStateProj]
    enum DriverState<'env, A> {
        Idle {
            start: Option<StartFn<'env, A>>,
        },
        Running {
            #[pin]
            future: CatchUnwind<AssertUnwindSafe<BoxFuture<'env, Outcome<A>>>>,
        },
        Finished,
    }
}

impl<'env, A> Driver<'env, A> {
    fn new(start: StartFn<'env, A>) -> Self {
        Self {
            state: DriverState::Idle { start: Some(start) },
        }
    }
}

impl<A> fmt::Debug for Driver<'_, A> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            DriverState::Idle { .. } => "idle",
            DriverState::Running { .. } => "running",
            DriverState::Finished => "finished",
        };
        formatter.debug_struct("Driver").field("state", &state).finish()
    }
}

impl<A> Future for Driver<'_, A> {
    type Output = Outcome<A>;

    fn poll(self: Pin<&mut Self>, context: &mut Context<'_>) -> Poll<Self::Output> {
        let mut this = self.project();
        loop {
            match this.state.as_mut().project() {
                DriverStateProj::Idle { start } => {
                    let start = start.take().expect("driver start function missing");
                    let future = AssertUnwindSafe(start()).catch_unwind();
                    this.state.set(DriverState::Running { future });
                }
                DriverStateProj::Running { future } => match future.poll(context) {
                    Poll::Ready(Ok(outcome)) => {
                        this.state.set(DriverState::Finished);
                        return Poll::Ready(outcome);
                    }
                    Poll::Ready(Err(payload)) => {
                        this.state.set(DriverState::Finished);
                        return Poll::Ready(Outcome::Failure(ErrorInfo::from_panic(
                            payload.as_ref(),
                        )));
                    }
                    Poll::Pending => return Poll::Pending,
                },
                DriverStateProj::Finished => panic!("Driver polled after completion"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{CancelSource, CancelToken};
    use crate::outcome::ErrorKind;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone)]
    struct TestEnv {
        cancel: CancelSource,
        limit: usize,
    }

    impl TestEnv {
        fn new() -> Self {
            Self {
                cancel: CancelSource::new(),
                limit: 3,
            }
        }
    }

    impl HasCancel for TestEnv {
        fn cancel_token(&self) -> CancelToken {
            self.cancel.token()
        }

        fn with_fresh_cancellation(&self) -> Self {
            Self {
                cancel: CancelSource::new(),
                limit: self.limit,
            }
        }
    }

    #[tokio::test]
    async fn test_pure_and_run() {
        let effect = Aff::<TestEnv, _>::pure(42);
        assert_eq!(effect.run(&TestEnv::new()).await, Outcome::Success(42));
    }

    #[tokio::test]
    async fn test_run_defers_until_polled() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);
        let effect = Aff::<TestEnv, _>::from_async(move |_| async move {
            counter_clone.fetch_add(1, Ordering::SeqCst);
            Outcome::Success(42)
        });

        let env = TestEnv::new();
        let driver = effect.run(&env);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(driver.await, Outcome::Success(42));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_map_and_then_chain() {
        let effect = Aff::<TestEnv, _>::pure(10)
            .map(|x| x * 2)
            .and_then(|x| Aff::pure(x + 1));
        assert_eq!(effect.run(&TestEnv::new()).await, Outcome::Success(21));
    }

    #[tokio::test]
    async fn test_failure_skips_continuation() {
        let touched = Arc::new(AtomicUsize::new(0));
        let touched_clone = Arc::clone(&touched);

        let effect = Aff::<TestEnv, i32>::fail(ErrorInfo::new("boom")).and_then(move |x| {
            touched_clone.fetch_add(1, Ordering::SeqCst);
            Aff::pure(x)
        });

        let outcome = effect.run(&TestEnv::new()).await;
        assert_eq!(outcome.error().map(ErrorInfo::message), Some("boom"));
        assert_eq!(touched.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_preset_cancellation_skips_body() {
        let invoked = Arc::new(AtomicUsize::new(0));
        let invoked_clone = Arc::clone(&invoked);
        let effect = Aff::<TestEnv, _>::from_async(move |_| async move {
            invoked_clone.fetch_add(1, Ordering::SeqCst);
            Outcome::Success(1)
        });

        let env = TestEnv::new();
        env.cancel.cancel();

        assert!(effect.run(&env).await.is_canceled());
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancellation_observed_at_bind_boundary() {
        let touched = Arc::new(AtomicUsize::new(0));
        let touched_clone = Arc::clone(&touched);

        // The first step runs to completion and cancels its own
        // environment; the boundary check then stops the pipeline.
        let effect = Aff::<TestEnv, _>::asks(|env: &TestEnv| {
            env.cancel.cancel();
            1
        })
        .and_then(move |x| {
            touched_clone.fetch_add(1, Ordering::SeqCst);
            Aff::pure(x)
        });

        assert!(effect.run(&TestEnv::new()).await.is_canceled());
        assert_eq!(touched.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_panic_in_future_is_captured() {
        let effect = Aff::<TestEnv, i32>::from_async(|_| async { panic!("async boom") });
        let outcome = effect.run(&TestEnv::new()).await;
        let error = outcome.into_error().unwrap();
        assert_eq!(error.kind(), ErrorKind::Panic);
        assert_eq!(error.panic_payload(), Some("async boom"));
    }

    #[tokio::test]
    async fn test_ask_asks_and_recover() {
        let env = TestEnv::new();
        let whole = Aff::<TestEnv, TestEnv>::ask().run(&env).await;
        assert_eq!(whole.into_value().map(|reflected| reflected.limit), Some(3));

        let recovered = Aff::<TestEnv, usize>::fail(ErrorInfo::new("boom"))
            .recover(|_| Aff::asks(|env: &TestEnv| env.limit))
            .run(&env)
            .await;
        assert_eq!(recovered, Outcome::Success(3));
    }

    #[tokio::test]
    async fn test_scoped_cancellation_isolates_subsystem() {
        let env = TestEnv::new();
        let effect = Aff::<TestEnv, _>::asks(|scoped: &TestEnv| {
            scoped.cancel.cancel();
            scoped.cancel_token().is_canceled()
        })
        .scoped_cancellation();

        assert_eq!(effect.run(&env).await, Outcome::Success(true));
        assert!(!env.cancel_token().is_canceled());
    }

    #[tokio::test]
    async fn test_from_eff_bridges_sync_pipeline() {
        let sync_effect = Eff::<TestEnv, _>::pure(20).map(|x| x + 1);
        let effect = Aff::from_eff(sync_effect);
        assert_eq!(effect.run(&TestEnv::new()).await, Outcome::Success(21));
    }

    #[tokio::test]
    async fn test_from_async_thunk_shares_memoization() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);
        let thunk = AsyncThunk::new(move || {
            Box::pin(async move {
                counter_clone.fetch_add(1, Ordering::SeqCst);
                Outcome::Success(42)
            })
        });

        let first = Aff::<TestEnv, _>::from_async_thunk(thunk.clone());
        let second = Aff::<TestEnv, _>::from_async_thunk(thunk);

        let env = TestEnv::new();
        assert_eq!(first.run(&env).await, Outcome::Success(42));
        assert_eq!(second.run(&env).await, Outcome::Success(42));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_fork_returns_success_and_runs_elsewhere() {
        let (sender, receiver) = tokio::sync::oneshot::channel();
        let sender = Arc::new(parking_lot::Mutex::new(Some(sender)));
        let effect = Aff::<TestEnv, _>::from_async(move |_| {
            let sender = Arc::clone(&sender);
            async move {
                if let Some(sender) = sender.lock().take() {
                    let _ = sender.send(42);
                }
                Outcome::Success(())
            }
        })
        .fork();

        assert_eq!(effect.run(&TestEnv::new()).await, Outcome::Success(()));
        assert_eq!(receiver.await, Ok(42));
    }

    #[tokio::test]
    async fn test_fork_hides_forked_failure() {
        let effect = Aff::<TestEnv, i32>::fail(ErrorInfo::new("invisible")).fork();
        assert_eq!(effect.run(&TestEnv::new()).await, Outcome::Success(()));
    }

    #[test]
    fn test_run_sync_outside_runtime() {
        let effect = Aff::<TestEnv, _>::pure(5).map(|x| x * 3);
        assert_eq!(effect.run_sync(&TestEnv::new()), Outcome::Success(15));
    }

    #[tokio::test]
    async fn test_bracket_use_failure_still_releases_once() {
        let released = Arc::new(AtomicUsize::new(0));
        let released_clone = Arc::clone(&released);

        let effect = Aff::<TestEnv, usize>::bracket(
            Aff::pure("handle"),
            |_| Aff::fail(ErrorInfo::new("use blew up")),
            move |_| {
                released_clone.fetch_add(1, Ordering::SeqCst);
                Aff::pure(())
            },
        );

        let outcome = effect.run(&TestEnv::new()).await;
        assert_eq!(outcome.error().map(ErrorInfo::message), Some("use blew up"));
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_bracket_use_panic_still_releases_once() {
        let released = Arc::new(AtomicUsize::new(0));
        let released_clone = Arc::clone(&released);

        let effect = Aff::<TestEnv, usize>::bracket(
            Aff::pure("handle"),
            |_| Aff::from_async(|_| async { panic!("use panicked") }),
            move |_| {
                released_clone.fetch_add(1, Ordering::SeqCst);
                Aff::pure(())
            },
        );

        let outcome = effect.run(&TestEnv::new()).await;
        assert_eq!(
            outcome.error().map(|error| error.kind()),
            Some(ErrorKind::Panic)
        );
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_bracket_release_failure_policy() {
        let surfaced = Aff::<TestEnv, usize>::bracket(
            Aff::pure("handle"),
            |handle| Aff::pure(handle.len()),
            |_| Aff::fail(ErrorInfo::new("release failed")),
        )
        .run(&TestEnv::new())
        .await;
        assert_eq!(
            surfaced.error().map(ErrorInfo::message),
            Some("release failed")
        );

        let swallowed = Aff::<TestEnv, usize>::bracket(
            Aff::pure("handle"),
            |_| Aff::fail(ErrorInfo::new("use failed")),
            |_| Aff::fail(ErrorInfo::new("release failed")),
        )
        .run(&TestEnv::new())
        .await;
        assert_eq!(
            swallowed.error().map(ErrorInfo::message),
            Some("use failed")
        );
    }

    #[tokio::test]
    async fn test_bracket_acquire_failure_skips_use_and_release() {
        let touched = Arc::new(AtomicUsize::new(0));
        let use_touched = Arc::clone(&touched);
        let release_touched = Arc::clone(&touched);

        let effect = Aff::<TestEnv, usize>::bracket(
            Aff::<TestEnv, &str>::fail(ErrorInfo::new("no resource")),
            move |handle| {
                use_touched.fetch_add(1, Ordering::SeqCst);
                Aff::pure(handle.len())
            },
            move |_| {
                release_touched.fetch_add(1, Ordering::SeqCst);
                Aff::pure(())
            },
        );

        let outcome = effect.run(&TestEnv::new()).await;
        assert_eq!(outcome.error().map(ErrorInfo::message), Some("no resource"));
        assert_eq!(touched.load(Ordering::SeqCst), 0);
    }
}
