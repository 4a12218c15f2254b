//! Race-free one-shot evaluation of deferred asynchronous computations.
//!
//! [`AsyncThunk`] is the asynchronous counterpart of
//! [`Thunk`](super::Thunk): the recipe produces a future of an
//! [`Outcome`], the first forcing task claims evaluation via the same
//! atomic state transition, and competitors park on a waiter list
//! (`tokio::sync::Notify`) instead of spinning, since an async context
//! can suspend cheaply. Handles are cheaply clonable so many tasks can
//! race a single instance; all of them observe the one cached outcome.

use std::fmt;
use std::future::Future;
use std::pin::{Pin, pin};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use futures::FutureExt;
use parking_lot::Mutex;
use std::panic::AssertUnwindSafe;
use tokio::sync::Notify;

use crate::env::CancelToken;
use crate::outcome::{ErrorInfo, Outcome};

/// A boxed future that is `Send`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// State: the recipe has not been claimed.
const STATE_PENDING: u8 = 0;
/// State: one task has claimed evaluation.
const STATE_RUNNING: u8 = 1;
/// State: terminal; the outcome is cached and the recipe discarded.
const STATE_SETTLED: u8 = 2;

/// The boxed async recipe a pending thunk holds.
type AsyncRecipe<A> = Box<dyn FnOnce() -> BoxFuture<'static, Outcome<A>> + Send>;

struct Inner<A> {
    state: AtomicU8,
    recipe: Mutex<Option<AsyncRecipe<A>>>,
    outcome: Mutex<Option<Outcome<A>>>,
    settled: Notify,
}

/// A deferred asynchronous computation of an [`Outcome`] that runs at
/// most once.
///
/// Cloning shares the underlying one-shot cell. The recipe future runs on
/// whichever task wins the claim; panics inside it are captured into a
/// `Failure`, and a cancellation token observed set before the recipe
/// starts settles the thunk to the distinguished cancellation failure
/// without invoking it.
///
/// # Examples
///
/// ```rust,ignore
/// use affect::control::AsyncThunk;
/// use affect::env::CancelSource;
/// use affect::outcome::Outcome;
///
/// #[tokio::main]
/// async fn main() {
///     let thunk = AsyncThunk::new(|| Box::pin(async { Outcome::Success(42) }));
///     let token = CancelSource::new().token();
///     assert_eq!(thunk.force(&token).await, Outcome::Success(42));
///     assert_eq!(thunk.force(&token).await, Outcome::Success(42));
/// }
/// ```
pub struct AsyncThunk<A> {
    inner: Arc<Inner<A>>,
}

impl<A> Clone for AsyncThunk<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A> AsyncThunk<A> {
    /// Creates a pending thunk from an async recipe.
    pub fn new<F>(recipe: F) -> Self
    where
        F: FnOnce() -> BoxFuture<'static, Outcome<A>> + Send + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                state: AtomicU8::new(STATE_PENDING),
                recipe: Mutex::new(Some(Box::new(recipe))),
                outcome: Mutex::new(None),
                settled: Notify::new(),
            }),
        }
    }

    /// Creates a thunk born settled with a success value.
    pub fn ready(value: A) -> Self {
        Self::from_outcome(Outcome::Success(value))
    }

    /// Creates a thunk born settled with either tag.
    pub fn from_outcome(outcome: Outcome<A>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: AtomicU8::new(STATE_SETTLED),
                recipe: Mutex::new(None),
                outcome: Mutex::new(Some(outcome)),
                settled: Notify::new(),
            }),
        }
    }

    /// Whether the thunk has reached its terminal state.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) == STATE_SETTLED
    }

    /// Returns a copy of the cached outcome without triggering evaluation.
    #[must_use]
    pub fn peek(&self) -> Option<Outcome<A>>
    where
        A: Clone,
    {
        if self.is_settled() {
            self.inner.outcome.lock().clone()
        } else {
            None
        }
    }
}

impl<A: Clone + Send> AsyncThunk<A> {
    /// Evaluates the thunk, returning its outcome.
    ///
    /// The winning task runs the recipe future with panics captured into a
    /// failure; losing tasks suspend on the waiter list and wake when the
    /// outcome is published. Settled thunks return immediately with no
    /// re-execution, and cancellation set after settlement has no effect.
    pub async fn force(&self, cancel: &CancelToken) -> Outcome<A> {
        loop {
            match self.inner.state.load(Ordering::Acquire) {
                STATE_SETTLED => {
                    return self
                        .inner
                        .outcome
                        .lock()
                        .clone()
                        .expect("async thunk settled without an outcome");
                }
                STATE_PENDING => {
                    if self
                        .inner
                        .state
                        .compare_exchange(
                            STATE_PENDING,
                            STATE_RUNNING,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                    {
                        return self.settle(cancel).await;
                    }
                }
                STATE_RUNNING => {
                    // Register on the waiter list before re-checking the
                    // state, so a publication between the check and the
                    // await cannot be missed.
                    let mut notified = pin!(self.inner.settled.notified());
                    notified.as_mut().enable();
                    if self.inner.state.load(Ordering::Acquire) == STATE_SETTLED {
                        continue;
                    }
                    notified.await;
                }
                _ => unreachable!("invalid async thunk state"),
            }
        }
    }

    /// Runs the recipe future and publishes the terminal outcome.
    ///
    /// Must only be called after winning the `PENDING -> RUNNING` claim.
    async fn settle(&self, cancel: &CancelToken) -> Outcome<A> {
        let recipe = self
            .inner
            .recipe
            .lock()
            .take()
            .expect("async thunk recipe missing in pending state");

        let outcome = if cancel.is_canceled() {
            drop(recipe);
            Outcome::canceled()
        } else {
            match AssertUnwindSafe(recipe()).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(payload) => Outcome::Failure(ErrorInfo::from_panic(payload.as_ref())),
            }
        };

        *self.inner.outcome.lock() = Some(outcome.clone());
        self.inner.state.store(STATE_SETTLED, Ordering::Release);
        self.inner.settled.notify_waiters();

        outcome
    }
}

impl<A: fmt::Debug> fmt::Debug for AsyncThunk<A> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.state.load(Ordering::Acquire) {
            STATE_SETTLED => formatter
                .debug_tuple("AsyncThunk")
                .field(&*self.inner.outcome.lock())
                .finish(),
            STATE_PENDING => formatter.write_str("AsyncThunk(<pending>)"),
            STATE_RUNNING => formatter.write_str("AsyncThunk(<running>)"),
            _ => unreachable!(),
        }
    }
}
