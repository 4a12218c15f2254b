//! Capability environments and cancellation.
//!
//! Effects are generic over an environment type that bundles the
//! side-effecting services they need. Rather than one monolithic context
//! trait, each capability is a narrow facet trait (`HasConsole`,
//! `HasFiles`, `HasClock`, ...) and an effect is written against exactly
//! the intersection of facets it uses. A concrete environment struct
//! implements all of them and is threaded, as an immutable snapshot,
//! through evaluation.
//!
//! Every runnable environment carries one cancellation source via
//! [`HasCancel`]. Cancellation is cooperative: setting the source does not
//! interrupt running code, it is observed at evaluation boundaries.
//! Derived environments produced by
//! [`with_fresh_cancellation`](HasCancel::with_fresh_cancellation) share
//! all other facets but own an independent source, scoping cancellation to
//! a subsystem.
//!
//! # Examples
//!
//! ```rust
//! use affect::env::{CancelSource, HasCancel};
//!
//! #[derive(Clone)]
//! struct Env {
//!     cancel: CancelSource,
//! }
//!
//! impl HasCancel for Env {
//!     fn cancel_token(&self) -> affect::env::CancelToken {
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
//! let env = Env {
//!     cancel: CancelSource::new(),
//! };
//! let scoped = env.with_fresh_cancellation();
//! scoped.cancel.cancel();
//! assert!(!env.cancel_token().is_canceled());
//! ```

pub mod live;

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use parking_lot::Mutex;

use crate::outcome::Outcome;

// =============================================================================
// Cancellation
// =============================================================================

/// The owning side of a cancellation signal.
///
/// Cloning a `CancelSource` shares the underlying signal; use
/// [`CancelSource::new`] for an independent one.
#[derive(Clone)]
pub struct CancelSource {
    flag: Arc<AtomicBool>,
}

impl CancelSource {
    /// Creates a fresh, unset cancellation source.
    #[must_use]
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Sets the cancellation signal.
    ///
    /// Idempotent; already-settled evaluations are unaffected.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Whether the signal has been set.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Returns a token observing this source.
    #[must_use]
    pub fn token(&self) -> CancelToken {
        CancelToken {
            flag: Arc::clone(&self.flag),
        }
    }
}

impl Default for CancelSource {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancelSource {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("CancelSource")
            .field("canceled", &self.is_canceled())
            .finish()
    }
}

/// The observing side of a cancellation signal.
///
/// Tokens are cheap to clone and safe to hand across thread-pool
/// boundaries; they only expose whether cancellation has been requested.
#[derive(Clone)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("CancelToken")
            .field("canceled", &self.is_canceled())
            .finish()
    }
}

// =============================================================================
// Capability Facets
// =============================================================================

/// Environments that carry a cancellation source.
///
/// This is the one facet the core requires of every runnable environment.
pub trait HasCancel {
    /// A token observing this environment's cancellation source.
    fn cancel_token(&self) -> CancelToken;

    /// A derived environment sharing every facet except the cancellation
    /// source, which is replaced with a brand-new, independent one.
    #[must_use]
    fn with_fresh_cancellation(&self) -> Self
    where
        Self: Sized;
}

/// A line-oriented console.
pub trait Console {
    /// Writes one line of output.
    fn print_line(&self, line: &str) -> Outcome<()>;

    /// Reads one line of input, without the trailing newline.
    fn read_line(&self) -> Outcome<String>;
}

/// Environments that expose a console.
pub trait HasConsole {
    /// The console facet.
    fn console(&self) -> &dyn Console;
}

/// A path-addressed text file store.
pub trait FileStore {
    /// Reads the full contents of a file as text.
    fn read_to_string(&self, path: &Path) -> Outcome<String>;

    /// Writes text to a file, replacing any existing contents.
    fn write_string(&self, path: &Path, contents: &str) -> Outcome<()>;
}

/// Environments that expose a file store.
pub trait HasFiles {
    /// The file store facet.
    fn files(&self) -> &dyn FileStore;
}

/// A source of wall-clock time.
pub trait Clock {
    /// The current time.
    fn now(&self) -> SystemTime;
}

/// Environments that expose a clock.
pub trait HasClock {
    /// The clock facet.
    fn clock(&self) -> &dyn Clock;
}

/// A text encoding/decoding scheme.
pub trait TextCodec {
    /// Encodes text into bytes.
    fn encode(&self, text: &str) -> Vec<u8>;

    /// Decodes bytes into text, failing on invalid input.
    fn decode(&self, bytes: &[u8]) -> Outcome<String>;
}

/// Environments that expose a text codec.
pub trait HasCodec {
    /// The codec facet.
    fn codec(&self) -> &dyn TextCodec;
}

/// An incremental line reader.
pub trait LineReader {
    /// The next line, or `None` once the input is exhausted.
    fn next_line(&self) -> Outcome<Option<String>>;
}

/// Environments that expose a line reader.
pub trait HasLineReader {
    /// The line reader facet.
    fn line_reader(&self) -> &dyn LineReader;
}

// =============================================================================
// Atom
// =============================================================================

/// A shared mutable cell, the atom-store facet as a value type.
///
/// Atoms are the only sanctioned mutable state an environment exposes to
/// effects. Handles are cheap to clone and share one cell.
///
/// # Examples
///
/// ```rust
/// use affect::env::Atom;
///
/// let atom = Atom::new(1);
/// let alias = atom.clone();
/// assert_eq!(atom.swap(5), 1);
/// assert_eq!(alias.get(), 5);
/// alias.update(|count| *count += 1);
/// assert_eq!(atom.get(), 6);
/// ```
pub struct Atom<T> {
    cell: Arc<Mutex<T>>,
}

impl<T> Clone for Atom<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T> Atom<T> {
    /// Creates an atom holding the given value.
    pub fn new(value: T) -> Self {
        Self {
            cell: Arc::new(Mutex::new(value)),
        }
    }

    /// Returns a copy of the current value.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.cell.lock().clone()
    }

    /// Replaces the current value.
    pub fn set(&self, value: T) {
        *self.cell.lock() = value;
    }

    /// Replaces the current value, returning the previous one.
    pub fn swap(&self, value: T) -> T {
        std::mem::replace(&mut *self.cell.lock(), value)
    }

    /// Mutates the current value in place under the lock.
    pub fn update<F>(&self, function: F)
    where
        F: FnOnce(&mut T),
    {
        function(&mut *self.cell.lock());
    }
}

impl<T: fmt::Debug> fmt::Debug for Atom<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Atom")
            .field("value", &*self.cell.lock())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::thread;

    #[rstest]
    fn test_cancel_source_starts_unset() {
        let source = CancelSource::new();
        assert!(!source.is_canceled());
        assert!(!source.token().is_canceled());
    }

    #[rstest]
    fn test_cancel_propagates_to_tokens() {
        let source = CancelSource::new();
        let token = source.token();
        source.cancel();
        assert!(token.is_canceled());
    }

    #[rstest]
    fn test_cancel_is_idempotent() {
        let source = CancelSource::new();
        source.cancel();
        source.cancel();
        assert!(source.is_canceled());
    }

    #[rstest]
    fn test_cloned_source_shares_signal() {
        let source = CancelSource::new();
        let alias = source.clone();
        alias.cancel();
        assert!(source.is_canceled());
    }

    #[rstest]
    fn test_token_crosses_threads() {
        let source = CancelSource::new();
        let token = source.token();
        source.cancel();
        let handle = thread::spawn(move || token.is_canceled());
        assert!(handle.join().unwrap());
    }

    #[rstest]
    fn test_atom_get_set_swap() {
        let atom = Atom::new(1);
        assert_eq!(atom.get(), 1);
        atom.set(2);
        assert_eq!(atom.swap(3), 2);
        assert_eq!(atom.get(), 3);
    }

    #[rstest]
    fn test_atom_update_under_contention() {
        let atom = Atom::new(0);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let atom = atom.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        atom.update(|count| *count += 1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(atom.get(), 800);
    }

    #[rstest]
    fn test_fresh_cancellation_is_independent() {
        #[derive(Clone)]
        struct Env {
            cancel: CancelSource,
            marker: u8,
        }

        impl HasCancel for Env {
            fn cancel_token(&self) -> CancelToken {
                self.cancel.token()
            }

            fn with_fresh_cancellation(&self) -> Self {
                Self {
                    cancel: CancelSource::new(),
                    marker: self.marker,
                }
            }
        }

        let outer = Env {
            cancel: CancelSource::new(),
            marker: 7,
        };
        let scoped = outer.with_fresh_cancellation();
        assert_eq!(scoped.marker, 7);

        scoped.cancel.cancel();
        assert!(!outer.cancel_token().is_canceled());

        outer.cancel.cancel();
        assert!(outer.cancel_token().is_canceled());
    }
}
