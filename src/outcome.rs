//! Structured results for effect evaluation.
//!
//! Evaluating an effect or forcing a thunk never unwinds into the caller.
//! Instead, every evaluation produces an [`Outcome`]: either `Success` with
//! the computed value, or `Failure` with a structured [`ErrorInfo`]
//! describing what went wrong. Panics raised inside a recipe are captured
//! at the evaluator boundary via [`capture`] and reported as failures with
//! [`ErrorKind::Panic`]; cancellation is a distinguished failure with
//! [`ErrorKind::Canceled`].
//!
//! # Examples
//!
//! ```rust
//! use affect::outcome::{ErrorInfo, Outcome};
//!
//! let outcome = Outcome::Success(21).map(|x| x * 2);
//! assert_eq!(outcome, Outcome::Success(42));
//!
//! let failed: Outcome<i32> = Outcome::Failure(ErrorInfo::new("boom"));
//! assert!(failed.is_failure());
//! ```

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};

// =============================================================================
// ErrorKind
// =============================================================================

/// Classifies a failure carried by [`ErrorInfo`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A failure raised deliberately by the computation.
    Logical,
    /// A panic raised during a recipe's execution, captured at the
    /// evaluator boundary.
    Panic,
    /// Evaluation was abandoned because the ambient cancellation signal
    /// was observed set.
    Canceled,
}

// =============================================================================
// ErrorInfo
// =============================================================================

/// A structured description of a failed evaluation.
///
/// `ErrorInfo` is a value, not thrown control flow. It carries a human
/// message, an optional numeric code, a [`ErrorKind`] tag, and — for
/// captured panics — the panic payload rendered as text.
///
/// # Examples
///
/// ```rust
/// use affect::outcome::{ErrorInfo, ErrorKind};
///
/// let error = ErrorInfo::new("file missing").with_code(2);
/// assert_eq!(error.message(), "file missing");
/// assert_eq!(error.code(), Some(2));
/// assert_eq!(error.kind(), ErrorKind::Logical);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    message: String,
    code: Option<i32>,
    kind: ErrorKind,
    panic_payload: Option<String>,
}

impl ErrorInfo {
    /// Creates a logical failure with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            kind: ErrorKind::Logical,
            panic_payload: None,
        }
    }

    /// Attaches a numeric code to the error.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use affect::outcome::ErrorInfo;
    ///
    /// let error = ErrorInfo::new("not found").with_code(404);
    /// assert_eq!(error.code(), Some(404));
    /// ```
    #[must_use]
    pub const fn with_code(mut self, code: i32) -> Self {
        self.code = Some(code);
        self
    }

    /// Creates the distinguished cancellation failure.
    #[must_use]
    pub fn canceled() -> Self {
        Self {
            message: "evaluation canceled".to_string(),
            code: None,
            kind: ErrorKind::Canceled,
            panic_payload: None,
        }
    }

    /// Creates a failure from a captured panic payload.
    ///
    /// The payload is rendered as text when it is a `&str` or `String`;
    /// other payload types are reported as an unknown panic.
    #[must_use]
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let text = payload
            .downcast_ref::<&str>()
            .map(|message| (*message).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string());
        Self {
            message: format!("recipe panicked: {text}"),
            code: None,
            kind: ErrorKind::Panic,
            panic_payload: Some(text),
        }
    }

    /// The human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The optional numeric code.
    #[must_use]
    pub const fn code(&self) -> Option<i32> {
        self.code
    }

    /// The failure classification.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The captured panic payload, if this failure wraps a panic.
    #[must_use]
    pub fn panic_payload(&self) -> Option<&str> {
        self.panic_payload.as_deref()
    }

    /// Whether this failure is the distinguished cancellation kind.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.kind == ErrorKind::Canceled
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(formatter, "{} (code {code})", self.message),
            None => write!(formatter, "{}", self.message),
        }
    }
}

impl std::error::Error for ErrorInfo {}

impl From<std::io::Error> for ErrorInfo {
    fn from(error: std::io::Error) -> Self {
        let mut info = Self::new(error.to_string());
        if let Some(code) = error.raw_os_error() {
            info = info.with_code(code);
        }
        info
    }
}

// =============================================================================
// Outcome
// =============================================================================

/// The result of evaluating a thunk or effect.
///
/// Exactly one variant is populated, and outcomes are immutable once
/// constructed. Equality is structural.
///
/// # Examples
///
/// ```rust
/// use affect::outcome::{ErrorInfo, Outcome};
///
/// let success = Outcome::Success(1);
/// assert!(success.is_success());
/// assert_eq!(success.value(), Some(&1));
///
/// let failure: Outcome<i32> = Outcome::Failure(ErrorInfo::new("boom"));
/// assert!(failure.value().is_none());
/// assert_eq!(failure.error().map(ErrorInfo::message), Some("boom"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<A> {
    /// The computation produced a value.
    Success(A),
    /// The computation failed with a structured error.
    Failure(ErrorInfo),
}

impl<A> Outcome<A> {
    /// Creates the distinguished cancellation failure.
    #[must_use]
    pub fn canceled() -> Self {
        Self::Failure(ErrorInfo::canceled())
    }

    /// Whether this outcome is a success.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Whether this outcome is a failure.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    /// Whether this outcome is a cancellation failure.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Failure(error) if error.is_canceled())
    }

    /// Returns a reference to the success value, if any.
    #[must_use]
    pub const fn value(&self) -> Option<&A> {
        match self {
            Self::Success(value) => Some(value),
            Self::Failure(_) => None,
        }
    }

    /// Returns a reference to the error, if any.
    #[must_use]
    pub const fn error(&self) -> Option<&ErrorInfo> {
        match self {
            Self::Success(_) => None,
            Self::Failure(error) => Some(error),
        }
    }

    /// Consumes the outcome, returning the success value if any.
    #[must_use]
    pub fn into_value(self) -> Option<A> {
        match self {
            Self::Success(value) => Some(value),
            Self::Failure(_) => None,
        }
    }

    /// Consumes the outcome, returning the error if any.
    #[must_use]
    pub fn into_error(self) -> Option<ErrorInfo> {
        match self {
            Self::Success(_) => None,
            Self::Failure(error) => Some(error),
        }
    }

    /// Transforms the success value; failures pass through unchanged.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use affect::outcome::Outcome;
    ///
    /// let outcome = Outcome::Success(21).map(|x| x * 2);
    /// assert_eq!(outcome, Outcome::Success(42));
    /// ```
    pub fn map<B, F>(self, function: F) -> Outcome<B>
    where
        F: FnOnce(A) -> B,
    {
        match self {
            Self::Success(value) => Outcome::Success(function(value)),
            Self::Failure(error) => Outcome::Failure(error),
        }
    }

    /// Transforms the error; successes pass through unchanged.
    pub fn map_error<F>(self, function: F) -> Self
    where
        F: FnOnce(ErrorInfo) -> ErrorInfo,
    {
        match self {
            Self::Success(value) => Self::Success(value),
            Self::Failure(error) => Self::Failure(function(error)),
        }
    }

    /// Chains a fallible continuation; failures short-circuit without
    /// invoking the function.
    pub fn and_then<B, F>(self, function: F) -> Outcome<B>
    where
        F: FnOnce(A) -> Outcome<B>,
    {
        match self {
            Self::Success(value) => function(value),
            Self::Failure(error) => Outcome::Failure(error),
        }
    }

    /// Converts into a `Result`.
    ///
    /// # Errors
    ///
    /// Returns the carried [`ErrorInfo`] when the outcome is a failure.
    pub fn into_result(self) -> Result<A, ErrorInfo> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Failure(error) => Err(error),
        }
    }

    /// Unwraps the success value, re-raising the failure as a panic.
    ///
    /// This is the escape hatch for callers driving effects with native
    /// sequential syntax who do not want to see a wrapped outcome. The
    /// panic message preserves the structured error's diagnostics.
    ///
    /// # Panics
    ///
    /// Panics with the carried error's display text when the outcome is a
    /// failure.
    #[must_use]
    pub fn expect_success(self) -> A {
        match self {
            Self::Success(value) => value,
            Self::Failure(error) => panic!("effect failed: {error}"),
        }
    }
}

impl<A> From<Result<A, ErrorInfo>> for Outcome<A> {
    fn from(result: Result<A, ErrorInfo>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(error) => Self::Failure(error),
        }
    }
}

// =============================================================================
// Panic Capture
// =============================================================================

/// Runs a fallible closure, converting a panic into a `Failure`.
///
/// This is the single place where native unwinds are translated into
/// outcomes; both evaluators and both effect types route recipe execution
/// through it so exceptions never escape the evaluator boundary.
///
/// # Examples
///
/// ```rust
/// use affect::outcome::{ErrorKind, Outcome, capture};
///
/// let outcome: Outcome<i32> = capture(|| panic!("boom"));
/// assert_eq!(outcome.error().map(|error| error.kind()), Some(ErrorKind::Panic));
/// ```
pub fn capture<A, F>(function: F) -> Outcome<A>
where
    F: FnOnce() -> Outcome<A>,
{
    match catch_unwind(AssertUnwindSafe(function)) {
        Ok(outcome) => outcome,
        Err(payload) => Outcome::Failure(ErrorInfo::from_panic(payload.as_ref())),
    }
}
