//! Rich diagnostic error types for the lifeplan engine.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes and help text so callers (and the HTTP layer) know
//! exactly what went wrong and whether retrying can help.

use miette::Diagnostic;
use thiserror::Error;

use crate::config::ConfigError;

/// Top-level error type for the planner.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum PlannerError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Task(#[from] TaskError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
}

impl PlannerError {
    /// Whether the caller may retry the same request and expect a different outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Upstream(_) | Self::Store(StoreError::Unavailable { .. }))
    }
}

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("I/O error: {source}")]
    #[diagnostic(
        code(lifeplan::store::io),
        help(
            "A filesystem operation failed. Check that the data directory exists, \
             has correct permissions, and that the disk is not full."
        )
    )]
    Io {
        #[source]
        source: std::io::Error,
    },

    #[error("database unavailable: {message}")]
    #[diagnostic(
        code(lifeplan::store::unavailable),
        help(
            "The task database could not be opened. Another process may hold the \
             lock on the database file; stop it or point --data-dir elsewhere."
        )
    )]
    Unavailable { message: String },

    #[error("redb transaction error: {message}")]
    #[diagnostic(
        code(lifeplan::store::redb),
        help(
            "The embedded database encountered a transaction error. \
             If the problem persists, move the database file aside and restart."
        )
    )]
    Redb { message: String },

    #[error("serialization error: {message}")]
    #[diagnostic(
        code(lifeplan::store::serde),
        help(
            "Failed to serialize or deserialize stored data. \
             This usually means the stored format changed between versions."
        )
    )]
    Serialization { message: String },
}

// ---------------------------------------------------------------------------
// Task errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum TaskError {
    #[error("task not found: {id}")]
    #[diagnostic(
        code(lifeplan::task::not_found),
        help("List tasks with `lifeplan tasks list` to find a valid id.")
    )]
    NotFound { id: String },

    #[error("invalid task field `{field}`: {message}")]
    #[diagnostic(
        code(lifeplan::task::validation),
        help(
            "Titles must be non-empty (at most 500 characters), priority and risk \
             must be within 0-100, and estimated_duration must be a positive number \
             of minutes no longer than a day."
        )
    )]
    Validation { field: String, message: String },

    #[error("task {id} cannot move from {from} to {to}")]
    #[diagnostic(
        code(lifeplan::task::invalid_transition),
        help("Completed tasks are terminal; create a new task instead of reopening one.")
    )]
    InvalidTransition { id: String, from: String, to: String },
}

impl TaskError {
    /// Shorthand for a validation failure on `field`.
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Plan errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum PlanError {
    #[error("no plan exists for {date}")]
    #[diagnostic(
        code(lifeplan::plan::not_found),
        help("Generate one with `lifeplan regenerate` (POST /plans/regenerate).")
    )]
    NotFound { date: String },

    #[error("invalid plan date: {input}")]
    #[diagnostic(
        code(lifeplan::plan::invalid_date),
        help("Dates use the ISO-8601 calendar format YYYY-MM-DD.")
    )]
    InvalidDate { input: String },

    #[error("unknown timezone: {name}")]
    #[diagnostic(
        code(lifeplan::plan::timezone),
        help("Use an IANA timezone name such as `Europe/Berlin` or `UTC`.")
    )]
    UnknownTimezone { name: String },

    #[error("invalid setting `{field}`: {message}")]
    #[diagnostic(
        code(lifeplan::plan::settings),
        help(
            "daily_budget_minutes must be within 1-1440 and day_start uses HH:MM \
             in the user's local time."
        )
    )]
    InvalidSettings { field: String, message: String },
}

// ---------------------------------------------------------------------------
// Upstream errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum UpstreamError {
    #[error("{service} unavailable: {message}")]
    #[diagnostic(
        code(lifeplan::upstream::unavailable),
        help("The collaborator could not be reached. The request can be retried.")
    )]
    Unavailable { service: String, message: String },

    #[error("{service} returned an unusable response: {message}")]
    #[diagnostic(
        code(lifeplan::upstream::bad_response),
        help("Check that the configured endpoint speaks the expected protocol.")
    )]
    BadResponse { service: String, message: String },
}

/// Convenience alias for planner operations.
pub type PlannerResult<T> = std::result::Result<T, PlannerError>;
