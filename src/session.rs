//! Per-request user context.
//!
//! The authentication gateway in front of `lifeplanned` resolves the caller and
//! forwards the user id in the `X-User-Id` header. Handlers turn that into a
//! [`Session`] and pass it explicitly to every [`Planner`](crate::planner::Planner)
//! operation.

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Header carrying the authenticated user id.
pub const USER_HEADER: &str = "x-user-id";

#[derive(Debug, Error, Diagnostic, PartialEq, Eq)]
pub enum SessionError {
    #[error("missing user identity")]
    #[diagnostic(
        code(lifeplan::session::missing),
        help("Requests must carry the X-User-Id header set by the authentication gateway.")
    )]
    Missing,

    #[error("invalid user id: {id:?}")]
    #[diagnostic(
        code(lifeplan::session::invalid),
        help("User ids may not contain '/' or control characters and are at most 128 bytes.")
    )]
    Invalid { id: String },
}

/// The user on whose behalf an operation runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Session {
    user_id: String,
}

impl Session {
    pub fn new(user_id: impl Into<String>) -> Result<Self, SessionError> {
        let raw = user_id.into();
        let user_id = raw.trim();
        if user_id.is_empty() {
            return Err(SessionError::Missing);
        }
        // User ids are embedded in store keys, which use '/' as separator.
        if user_id.len() > 128 || user_id.chars().any(|c| c == '/' || c.is_control()) {
            return Err(SessionError::Invalid {
                id: user_id.to_string(),
            });
        }
        Ok(Self {
            user_id: user_id.to_string(),
        })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

impl std::fmt::Display for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_and_accepts() {
        let s = Session::new("  alice ").unwrap();
        assert_eq!(s.user_id(), "alice");
        assert_eq!(s.to_string(), "alice");
    }

    #[test]
    fn rejects_blank_and_separators() {
        assert_eq!(Session::new("   "), Err(SessionError::Missing));
        assert!(matches!(
            Session::new("a/b"),
            Err(SessionError::Invalid { .. })
        ));
    }
}
