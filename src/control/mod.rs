//! One-shot memoizing evaluators.
//!
//! This module holds the evaluators that turn a deferred computation into
//! an observable, cached [`Outcome`](crate::outcome::Outcome):
//!
//! - [`Thunk`]: synchronous, lock-free, spin-waiting competitors
//! - [`AsyncThunk`]: asynchronous, waiter-list competitors (requires the
//!   `async` feature)
//!
//! Everything above this layer composes thunks; nothing re-implements the
//! exactly-once discipline.

mod thunk;

pub use thunk::Thunk;

#[cfg(feature = "async")]
mod async_thunk;

#[cfg(feature = "async")]
pub use async_thunk::{AsyncThunk, BoxFuture};
