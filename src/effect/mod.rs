//! Effect types: computations as composable values.
//!
//! This module provides the two effect flavors built on the
//! [`outcome`](crate::outcome) and [`control`](crate::control) layers:
//!
//! - [`Eff`]: synchronous evaluation on the calling thread
//! - [`Aff`]: asynchronous evaluation through a [`Driver`] future
//!   (requires the `async` feature)
//!
//! Both are lazy values parameterized by a capability environment,
//! composed with `map`/`and_then`/`recover`, widened across environments
//! with `local`, and torn down deterministically with `bracket`. The
//! [`runtime`] module supplies the shared tokio runtime that lets async
//! effects be driven from synchronous code.

mod eff;

pub use eff::Eff;

#[cfg(feature = "async")]
mod aff;

#[cfg(feature = "async")]
pub mod runtime;

#[cfg(feature = "async")]
pub use aff::{Aff, Driver};

#[cfg(feature = "async")]
pub use runtime::BlockingError;
