//! Shared tokio runtime access for blocking interop.
//!
//! Async effects normally run on whatever runtime the caller already has.
//! When none exists, a lazily-built global multi-thread runtime steps in,
//! so [`Aff::run_sync`](super::Aff::run_sync) and
//! [`Aff::fork`](super::Aff::fork) work from plain synchronous code. The
//! one context that cannot be bridged is a current-thread runtime worker,
//! where blocking would deadlock the only driver thread; that surfaces as
//! a [`BlockingError`] instead.

use std::fmt;
use std::future::Future;
use std::sync::LazyLock;

use tokio::runtime::{Builder, Handle, Runtime, RuntimeFlavor};

/// Why a blocking bridge into async code could not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockingError {
    /// The caller is inside a current-thread runtime, which cannot block
    /// on a future without deadlocking its only worker.
    CurrentThreadRuntime,
    /// The caller is inside a runtime whose flavor this bridge does not
    /// know how to block on.
    UnsupportedRuntimeFlavor,
    /// No ambient runtime exists and the global fallback failed to build.
    RuntimeUnavailable,
}

impl fmt::Display for BlockingError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CurrentThreadRuntime => {
                write!(
                    formatter,
                    "cannot block on a future from within a current-thread runtime"
                )
            }
            Self::UnsupportedRuntimeFlavor => {
                write!(formatter, "unsupported runtime flavor for blocking bridge")
            }
            Self::RuntimeUnavailable => {
                write!(formatter, "global fallback runtime failed to initialize")
            }
        }
    }
}

impl std::error::Error for BlockingError {}

static GLOBAL_RUNTIME: LazyLock<std::io::Result<Runtime>> = LazyLock::new(|| {
    Builder::new_multi_thread()
        .worker_threads(num_cpus::get())
        .thread_name("affect-worker")
        .enable_all()
        .build()
});

thread_local! {
    static CACHED_HANDLE: std::cell::RefCell<Option<Handle>> =
        const { std::cell::RefCell::new(None) };
}

/// Returns a handle to the ambient runtime, falling back to the global
/// one when the caller is not inside any runtime.
///
/// The global handle is cached per thread, so repeated lookups outside a
/// runtime touch the shared `LazyLock` once.
pub fn handle() -> Result<Handle, BlockingError> {
    if let Ok(current) = Handle::try_current() {
        return Ok(current);
    }
    CACHED_HANDLE.with(|cell| {
        let mut cached = cell.borrow_mut();
        if let Some(handle) = cached.as_ref() {
            return Ok(handle.clone());
        }
        match &*GLOBAL_RUNTIME {
            Ok(runtime) => {
                let handle = runtime.handle().clone();
                *cached = Some(handle.clone());
                Ok(handle)
            }
            Err(_) => Err(BlockingError::RuntimeUnavailable),
        }
    })
}

/// Drives a future to completion from synchronous code.
///
/// Inside a multi-thread runtime the calling worker is moved to blocking
/// mode first so the runtime keeps making progress. Outside any runtime
/// the global fallback runtime drives the future.
pub fn try_run_blocking<F>(future: F) -> Result<F::Output, BlockingError>
where
    F: Future,
{
    if let Ok(current) = Handle::try_current() {
        return match current.runtime_flavor() {
            RuntimeFlavor::MultiThread => {
                Ok(tokio::task::block_in_place(|| current.block_on(future)))
            }
            RuntimeFlavor::CurrentThread => Err(BlockingError::CurrentThreadRuntime),
            _ => Err(BlockingError::UnsupportedRuntimeFlavor),
        };
    }
    match &*GLOBAL_RUNTIME {
        Ok(runtime) => Ok(runtime.block_on(future)),
        Err(_) => Err(BlockingError::RuntimeUnavailable),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocking_outside_any_runtime_uses_fallback() {
        let value = try_run_blocking(async { 21 * 2 }).unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_blocking_inside_multi_thread_runtime() {
        let value = try_run_blocking(async { 7 }).unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_blocking_inside_current_thread_runtime_is_rejected() {
        assert_eq!(
            try_run_blocking(async { 0 }).unwrap_err(),
            BlockingError::CurrentThreadRuntime
        );
    }

    #[tokio::test]
    async fn test_handle_resolves_ambient_runtime() {
        assert!(handle().is_ok());
    }

    #[test]
    fn test_handle_outside_runtime_serves_cached_global() {
        // Both lookups resolve; the second comes from the thread-local
        // cache and must still be usable.
        let first = handle().unwrap();
        let second = handle().unwrap();
        assert_eq!(first.block_on(async { 1 }), second.block_on(async { 1 }));
    }
}
