//! # affect
//!
//! An effect runtime for Rust: lazy, memoized, cancellation-aware
//! computations over capability environments.
//!
//! ## Overview
//!
//! This library represents deferred, possibly-failing computations as
//! first-class values and executes them under a caller-supplied
//! environment. It includes:
//!
//! - **Outcome**: a structured success/failure result type
//! - **Thunk**: race-free, one-shot memoizing evaluators (sync and async)
//! - **Capability Environments**: narrow facet traits (cancellation,
//!   console, filesystem, clock, mutable atoms, text codec) composed into
//!   user-defined environment types
//! - **Effect Types**: [`Eff`](effect::Eff) for synchronous and
//!   [`Aff`](effect::Aff) for asynchronous pipelines, with `map`,
//!   `and_then`, `fork`, `local`, and scoped acquisition via `bracket`
//! - **Async Bridge**: a lazy [`Driver`](effect::Driver) state machine that
//!   lets `.await` syntax run an effect while preserving laziness,
//!   cancellation, and panic capture
//!
//! ## Feature Flags
//!
//! - `async`: asynchronous effects, the async one-shot evaluator, and the
//!   shared tokio runtime (enabled by default)
//!
//! ## Example
//!
//! ```rust
//! use affect::prelude::*;
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
//! let effect = Eff::<Env, _>::pure(20)
//!     .map(|x| x + 1)
//!     .and_then(|x| Eff::pure(x * 2));
//!
//! let env = Env {
//!     cancel: CancelSource::new(),
//! };
//! assert_eq!(effect.run(&env), Outcome::Success(42));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_closure_for_method_calls)]

/// Prelude module for convenient imports.
///
/// Re-exports commonly used types and traits.
///
/// # Usage
///
/// ```rust
/// use affect::prelude::*;
/// ```
pub mod prelude {
    pub use crate::control::*;
    pub use crate::effect::*;
    pub use crate::env::*;
    pub use crate::outcome::*;
}

pub mod control;
pub mod effect;
pub mod env;
pub mod outcome;
