#![allow(unsafe_code)]
//! Race-free one-shot evaluation of deferred computations.
//!
//! A [`Thunk`] holds a recipe producing an [`Outcome`] that has not run
//! yet. The first `force` claims the right to evaluate; every competitor
//! observes the same cached outcome once evaluation settles, and the
//! recipe runs at most once. This is the sole place where "run exactly
//! once, concurrently safe" is implemented; effect composition is built on
//! top of it and never re-implements evaluation order.
//!
//! # Safety
//!
//! This module uses unsafe code for the atomic state machine whose settled
//! fast path is a plain `Acquire` load. The following invariants are
//! maintained:
//! - `outcome` is initialized exactly when `state` is `STATE_SETTLED`
//! - `recipe` is `Some` only while `state` is `STATE_PENDING`
//! - The `STATE_PENDING -> STATE_RUNNING` transition is claimed via
//!   `compare_exchange`, so a single thread executes the recipe
//! - Publication stores `STATE_SETTLED` with `Release`; readers load with
//!   `Acquire`
//!
//! # Panics and Cancellation
//!
//! A panic inside the recipe is captured and published as a `Failure` with
//! the panic payload attached; it never unwinds into a caller and never
//! leaves the thunk unusable. If the ambient cancellation token is set
//! before the claiming thread starts the recipe, the thunk settles to the
//! distinguished cancellation failure without ever invoking the recipe.
//!
//! # Waiting and Re-entry
//!
//! A thread that loses the claim race spins briefly for recipes that
//! settle quickly, then parks on a condition variable until the outcome is
//! published; a recipe may take arbitrarily long without disturbing its
//! waiters. The one wait that cannot end is forcing a thunk from within
//! its own recipe on the same thread, so the claiming thread records its
//! identity and a re-entrant force returns a logical failure instead of
//! deadlocking.
//!
//! # Examples
//!
//! ```rust
//! use affect::control::Thunk;
//! use affect::env::CancelSource;
//! use affect::outcome::Outcome;
//! use std::sync::Arc;
//! use std::thread;
//!
//! let thunk = Arc::new(Thunk::new(|| Outcome::Success(42)));
//! let token = CancelSource::new().token();
//!
//! let handles: Vec<_> = (0..10)
//!     .map(|_| {
//!         let thunk = Arc::clone(&thunk);
//!         let token = token.clone();
//!         thread::spawn(move || thunk.force(&token))
//!     })
//!     .collect();
//!
//! for handle in handles {
//!     assert_eq!(handle.join().unwrap(), Outcome::Success(42));
//! }
//! ```

use std::cell::UnsafeCell;
use std::fmt;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU8, Ordering};
use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex};

use crate::env::CancelToken;
use crate::outcome::{ErrorInfo, Outcome, capture};

/// State: the recipe has not been claimed.
const STATE_PENDING: u8 = 0;
/// State: one thread has claimed evaluation.
const STATE_RUNNING: u8 = 1;
/// State: terminal; the outcome is cached and the recipe discarded.
const STATE_SETTLED: u8 = 2;

/// The boxed recipe a pending thunk holds.
type Recipe<A> = Box<dyn FnOnce() -> Outcome<A> + Send>;

/// A deferred computation of an [`Outcome`] that runs at most once.
///
/// The lifecycle is `Pending -> Running -> Settled`; the settled outcome's
/// own kind distinguishes success, failure, and cancellation. A thunk
/// built from [`Thunk::ready`] or [`Thunk::from_outcome`] is born settled
/// and incurs no synchronization beyond an atomic load.
///
/// # Type Parameters
///
/// * `A` - The success value type; `Clone` so the cached outcome can be
///   fanned out to every caller.
///
/// # Thread Safety
///
/// `Send`/`Sync` when `A: Send + Sync`; after settlement, access is a
/// lock-free atomic load plus a clone of the cached outcome. The claimant
/// lock and condition variable are touched only while a recipe is in
/// flight.
pub struct Thunk<A> {
    state: AtomicU8,
    outcome: UnsafeCell<MaybeUninit<Outcome<A>>>,
    recipe: UnsafeCell<Option<Recipe<A>>>,
    claimant: Mutex<Option<ThreadId>>,
    settled: Condvar,
}

// # Safety
//
// - A: Send lets the cached outcome move to other threads
// - A: Sync lets concurrent readers clone from a shared &Outcome<A>
// - The recipe box is Send by construction
// - The atomic state machine guarantees a single writer and publishes the
//   outcome with Release before any Acquire reader dereferences it
unsafe impl<A: Send + Sync> Send for Thunk<A> {}
unsafe impl<A: Send + Sync> Sync for Thunk<A> {}

impl<A> Thunk<A> {
    /// Creates a pending thunk from a recipe.
    ///
    /// The recipe is invoked at most once, by whichever caller wins the
    /// claim on first `force`.
    pub fn new<F>(recipe: F) -> Self
    where
        F: FnOnce() -> Outcome<A> + Send + 'static,
    {
        Self {
            state: AtomicU8::new(STATE_PENDING),
            outcome: UnsafeCell::new(MaybeUninit::uninit()),
            recipe: UnsafeCell::new(Some(Box::new(recipe))),
            claimant: Mutex::new(None),
            settled: Condvar::new(),
        }
    }

    /// Creates a thunk born settled with a success value.
    pub fn ready(value: A) -> Self {
        Self::from_outcome(Outcome::Success(value))
    }

    /// Creates a thunk born settled with either tag.
    pub fn from_outcome(outcome: Outcome<A>) -> Self {
        Self {
            state: AtomicU8::new(STATE_SETTLED),
            outcome: UnsafeCell::new(MaybeUninit::new(outcome)),
            recipe: UnsafeCell::new(None),
            claimant: Mutex::new(None),
            settled: Condvar::new(),
        }
    }

    /// Whether the thunk has reached its terminal state.
    #[inline]
    pub fn is_settled(&self) -> bool {
        self.state.load(Ordering::Acquire) == STATE_SETTLED
    }

    /// Returns the cached outcome without triggering evaluation.
    #[inline]
    pub fn peek(&self) -> Option<&Outcome<A>> {
        if self.state.load(Ordering::Acquire) == STATE_SETTLED {
            // SAFETY: STATE_SETTLED means outcome is initialized.
            Some(unsafe { (*self.outcome.get()).assume_init_ref() })
        } else {
            None
        }
    }
}

impl<A: Clone> Thunk<A> {
    /// Backoff rounds spun before parking on the condition variable.
    const SPIN_ROUNDS: u32 = 16;

    /// Evaluates the thunk, returning its outcome.
    ///
    /// If pending, the calling thread attempts to claim evaluation; the
    /// winner runs the recipe (with panics captured into a failure) and
    /// publishes the result, while losers wait out the evaluation and then
    /// observe the same cached outcome, however long the recipe takes.
    /// Settled thunks return immediately with no re-execution. Forcing the
    /// thunk from within its own recipe on the same thread returns a
    /// logical failure.
    ///
    /// If `cancel` is set before the claim starts the recipe, the thunk
    /// settles to a cancellation failure and the recipe is discarded
    /// uninvoked. Setting `cancel` after settlement has no effect.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use affect::control::Thunk;
    /// use affect::env::CancelSource;
    /// use affect::outcome::Outcome;
    ///
    /// let thunk = Thunk::new(|| Outcome::Success(7));
    /// let token = CancelSource::new().token();
    /// assert_eq!(thunk.force(&token), Outcome::Success(7));
    /// assert_eq!(thunk.force(&token), Outcome::Success(7));
    /// ```
    pub fn force(&self, cancel: &CancelToken) -> Outcome<A> {
        let mut state = self.state.load(Ordering::Acquire);

        loop {
            match state {
                STATE_SETTLED => {
                    // SAFETY: settlement stores with Release after writing
                    // the outcome; the Acquire load above makes the write
                    // visible here.
                    return unsafe { (*self.outcome.get()).assume_init_ref() }.clone();
                }
                STATE_PENDING => {
                    match self.state.compare_exchange_weak(
                        STATE_PENDING,
                        STATE_RUNNING,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    ) {
                        Ok(_) => return self.settle(cancel),
                        Err(current_state) => state = current_state,
                    }
                }
                STATE_RUNNING => {
                    if !self.spin_briefly() {
                        if let Some(error) = self.wait_for_settlement() {
                            return Outcome::Failure(error);
                        }
                    }
                    state = self.state.load(Ordering::Acquire);
                }
                _ => unreachable!("invalid thunk state"),
            }
        }
    }

    /// Runs the recipe and publishes the terminal outcome.
    ///
    /// Must only be called after winning the `PENDING -> RUNNING` claim.
    fn settle(&self, cancel: &CancelToken) -> Outcome<A> {
        // Recorded before the recipe runs so a re-entrant force can
        // recognize its own claim.
        *self.claimant.lock() = Some(thread::current().id());

        // SAFETY: the compare_exchange succeeded, so only this thread is in
        // STATE_RUNNING and may touch the recipe slot.
        let recipe = unsafe { (*self.recipe.get()).take() }
            .expect("thunk recipe missing in pending state");

        let outcome = if cancel.is_canceled() {
            drop(recipe);
            Outcome::canceled()
        } else {
            capture(recipe)
        };

        // SAFETY: single writer; the slot is uninitialized until this write.
        unsafe {
            (*self.outcome.get()).write(outcome.clone());
        }
        // Release makes the outcome visible to waiters and later forcers.
        self.state.store(STATE_SETTLED, Ordering::Release);

        // Waiters re-check the state under this lock before parking, so
        // notifying while holding it cannot miss one.
        let mut claimant = self.claimant.lock();
        *claimant = None;
        self.settled.notify_all();
        drop(claimant);

        outcome
    }

    /// Spins with exponential backoff for recipes that settle quickly.
    ///
    /// Returns `true` once the state has left `STATE_RUNNING`.
    fn spin_briefly(&self) -> bool {
        for round in 0..Self::SPIN_ROUNDS {
            for _ in 0..(1u32 << round.min(6)) {
                std::hint::spin_loop();
            }
            if self.state.load(Ordering::Acquire) != STATE_RUNNING {
                return true;
            }
        }
        false
    }

    /// Parks until the claimant publishes, or detects re-entry.
    ///
    /// Returns the re-entrancy failure when the forcing thread is the
    /// claimant itself; `None` once the thunk has settled.
    fn wait_for_settlement(&self) -> Option<ErrorInfo> {
        let mut claimant = self.claimant.lock();
        loop {
            if self.state.load(Ordering::Acquire) == STATE_SETTLED {
                return None;
            }
            if *claimant == Some(thread::current().id()) {
                return Some(ErrorInfo::new(
                    "thunk forced from within its own recipe on the same thread",
                ));
            }
            self.settled.wait(&mut claimant);
        }
    }
}

impl<A: fmt::Debug> fmt::Debug for Thunk<A> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state.load(Ordering::Acquire) {
            STATE_SETTLED => {
                // SAFETY: STATE_SETTLED means outcome is initialized.
                let outcome = unsafe { (*self.outcome.get()).assume_init_ref() };
                formatter.debug_tuple("Thunk").field(outcome).finish()
            }
            STATE_PENDING => formatter.write_str("Thunk(<pending>)"),
            STATE_RUNNING => formatter.write_str("Thunk(<running>)"),
            _ => unreachable!(),
        }
    }
}

impl<A> Drop for Thunk<A> {
    fn drop(&mut self) {
        if *self.state.get_mut() == STATE_SETTLED {
            // SAFETY: STATE_SETTLED means outcome is initialized, and
            // &mut self guarantees exclusive access.
            unsafe {
                (*self.outcome.get()).assume_init_drop();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::CancelSource;
    use crate::outcome::ErrorKind;
    use rstest::rstest;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::sync::{Arc, OnceLock};
    use std::time::Duration;

    fn token() -> CancelToken {
        CancelSource::new().token()
    }

    #[rstest]
    fn test_pending_thunk_is_not_settled() {
        let thunk = Thunk::new(|| Outcome::Success(1));
        assert!(!thunk.is_settled());
        assert!(thunk.peek().is_none());
    }

    #[rstest]
    fn test_force_computes_and_caches() {
        let thunk = Thunk::new(|| Outcome::Success(42));
        assert_eq!(thunk.force(&token()), Outcome::Success(42));
        assert!(thunk.is_settled());
        assert_eq!(thunk.peek(), Some(&Outcome::Success(42)));
    }

    #[rstest]
    fn test_recipe_runs_at_most_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);
        let thunk = Thunk::new(move || {
            counter_clone.fetch_add(1, AtomicOrdering::SeqCst);
            Outcome::Success(42)
        });

        assert_eq!(counter.load(AtomicOrdering::SeqCst), 0);
        assert_eq!(thunk.force(&token()), Outcome::Success(42));
        assert_eq!(thunk.force(&token()), Outcome::Success(42));
        assert_eq!(counter.load(AtomicOrdering::SeqCst), 1);
    }

    #[rstest]
    fn test_ready_thunk_is_born_settled() {
        let thunk = Thunk::ready(5);
        assert!(thunk.is_settled());
        assert_eq!(thunk.force(&token()), Outcome::Success(5));
    }

    #[rstest]
    fn test_from_outcome_preserves_failure() {
        let thunk: Thunk<i32> = Thunk::from_outcome(Outcome::Failure(ErrorInfo::new("boom")));
        let outcome = thunk.force(&token());
        assert_eq!(outcome.error().map(ErrorInfo::message), Some("boom"));
    }

    #[rstest]
    fn test_panic_in_recipe_becomes_failure() {
        let thunk: Thunk<i32> = Thunk::new(|| panic!("exploded"));
        let outcome = thunk.force(&token());
        let error = outcome.into_error().unwrap();
        assert_eq!(error.kind(), ErrorKind::Panic);
        assert_eq!(error.panic_payload(), Some("exploded"));

        // The failure is cached, not poisonous; re-forcing returns it again.
        assert!(thunk.force(&token()).is_failure());
    }

    #[rstest]
    fn test_preset_cancellation_skips_recipe() {
        let invoked = Arc::new(AtomicUsize::new(0));
        let invoked_clone = Arc::clone(&invoked);
        let thunk = Thunk::new(move || {
            invoked_clone.fetch_add(1, AtomicOrdering::SeqCst);
            Outcome::Success(1)
        });

        let source = CancelSource::new();
        source.cancel();
        let outcome = thunk.force(&source.token());

        assert!(outcome.is_canceled());
        assert_eq!(invoked.load(AtomicOrdering::SeqCst), 0);
    }

    #[rstest]
    fn test_cancellation_after_settlement_is_ignored() {
        let thunk = Thunk::new(|| Outcome::Success(9));
        let source = CancelSource::new();
        assert_eq!(thunk.force(&source.token()), Outcome::Success(9));

        source.cancel();
        assert_eq!(thunk.force(&source.token()), Outcome::Success(9));
    }

    #[rstest]
    fn test_concurrent_forcing_runs_recipe_exactly_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);
        let thunk = Arc::new(Thunk::new(move || {
            counter_clone.fetch_add(1, AtomicOrdering::SeqCst);
            Outcome::Success(42)
        }));

        let handles: Vec<_> = (0..100)
            .map(|_| {
                let thunk = Arc::clone(&thunk);
                thread::spawn(move || thunk.force(&token()))
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), Outcome::Success(42));
        }
        assert_eq!(counter.load(AtomicOrdering::SeqCst), 1);
    }

    #[rstest]
    fn test_slow_recipe_waiters_observe_cached_outcome() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);
        let thunk = Arc::new(Thunk::new(move || {
            thread::sleep(Duration::from_millis(100));
            counter_clone.fetch_add(1, AtomicOrdering::SeqCst);
            Outcome::Success(42)
        }));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let thunk = Arc::clone(&thunk);
                thread::spawn(move || thunk.force(&token()))
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), Outcome::Success(42));
        }
        assert_eq!(counter.load(AtomicOrdering::SeqCst), 1);
    }

    #[rstest]
    fn test_reentrant_forcing_fails_instead_of_deadlocking() {
        let slot: Arc<OnceLock<Arc<Thunk<i32>>>> = Arc::new(OnceLock::new());
        let slot_clone = Arc::clone(&slot);
        let thunk = Arc::new(Thunk::new(move || {
            let inner = slot_clone.get().expect("thunk slot unset");
            inner.force(&token())
        }));
        slot.set(Arc::clone(&thunk)).expect("thunk slot already set");

        let outcome = thunk.force(&token());
        let error = outcome.into_error().unwrap();
        assert_eq!(error.kind(), ErrorKind::Logical);
        assert!(error.message().contains("own recipe"));
    }

    #[rstest]
    fn test_drop_releases_settled_value() {
        struct DropTracker {
            dropped: Arc<AtomicUsize>,
        }
        impl Clone for DropTracker {
            fn clone(&self) -> Self {
                Self {
                    dropped: Arc::clone(&self.dropped),
                }
            }
        }
        impl Drop for DropTracker {
            fn drop(&mut self) {
                self.dropped.fetch_add(1, AtomicOrdering::SeqCst);
            }
        }

        let dropped = Arc::new(AtomicUsize::new(0));
        let dropped_clone = Arc::clone(&dropped);

        let thunk = Thunk::new(move || {
            Outcome::Success(DropTracker {
                dropped: dropped_clone,
            })
        });
        drop(thunk.force(&token()));
        let before = dropped.load(AtomicOrdering::SeqCst);

        drop(thunk);
        assert_eq!(dropped.load(AtomicOrdering::SeqCst), before + 1);
    }

    #[rstest]
    fn test_debug_rendering() {
        let thunk = Thunk::new(|| Outcome::Success(1));
        assert_eq!(format!("{thunk:?}"), "Thunk(<pending>)");
        let _ = thunk.force(&token());
        assert!(format!("{thunk:?}").contains("Success"));
    }

    mod law_property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Forcing is idempotent: every force observes the first outcome.
            #[test]
            fn prop_force_is_idempotent(x in any::<i64>()) {
                let thunk = Thunk::new(move || Outcome::Success(x));
                let first = thunk.force(&token());
                let second = thunk.force(&token());
                prop_assert_eq!(first, Outcome::Success(x));
                prop_assert_eq!(second, Outcome::Success(x));
            }

            /// A ready thunk equals direct construction.
            #[test]
            fn prop_ready_round_trip(x in any::<i32>()) {
                let thunk = Thunk::ready(x);
                prop_assert_eq!(thunk.force(&token()), Outcome::Success(x));
            }
        }
    }
}
