use thiserror::Error;

/// Result type alias for kernel operations.
pub type Result<T> = std::result::Result<T, CoordError>;

/// Errors the coordination kernel surfaces.
///
/// Each kind maps to a default HTTP status via [`CoordError::status_code`];
/// the HTTP layer does the final translation. Claim conflicts are NOT
/// errors: a conflicted claim attempt returns a normal
/// [`crate::models::ClaimOutcome`] listing the holders.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordError {
    /// A referenced id does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed or out-of-range input, circular dependency, forbidden
    /// gate command.
    #[error("validation error: {0}")]
    Validation(String),

    /// The operation collides with existing state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Auth material missing where required.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Auth material present but rejected.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The backing store failed.
    #[error("database error: {0}")]
    Database(String),

    /// Invariant violation or other unexpected failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoordError {
    pub fn task_not_found(id: &str) -> Self {
        Self::NotFound(format!("task '{id}' does not exist"))
    }

    pub fn gate_not_found(id: &str) -> Self {
        Self::NotFound(format!("gate '{id}' does not exist"))
    }

    pub fn blocker_not_found(id: &str) -> Self {
        Self::NotFound(format!("blocker '{id}' does not exist"))
    }

    pub fn agent_not_found(id: &str) -> Self {
        Self::NotFound(format!("agent '{id}' is not registered"))
    }

    pub fn empty_field(field: &str) -> Self {
        Self::Validation(format!("field '{field}' must not be empty"))
    }

    pub fn out_of_range(field: &str, detail: &str) -> Self {
        Self::Validation(format!("field '{field}' out of range: {detail}"))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CoordError::NotFound(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, CoordError::Validation(_))
    }

    /// Default HTTP status code for this error kind.
    pub fn status_code(&self) -> u16 {
        match self {
            CoordError::NotFound(_) => 404,
            CoordError::Validation(_) => 400,
            CoordError::Conflict(_) => 409,
            CoordError::Unauthorized(_) => 401,
            CoordError::Forbidden(_) => 403,
            CoordError::Database(_) => 500,
            CoordError::Internal(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_kinds() {
        assert_eq!(CoordError::task_not_found("t1").status_code(), 404);
        assert_eq!(CoordError::empty_field("title").status_code(), 400);
        assert_eq!(CoordError::Conflict("edge".into()).status_code(), 409);
        assert_eq!(
            CoordError::Unauthorized("no key".into()).status_code(),
            401
        );
        assert_eq!(CoordError::Forbidden("bad key".into()).status_code(), 403);
        assert_eq!(CoordError::Database("io".into()).status_code(), 500);
        assert_eq!(CoordError::Internal("bug".into()).status_code(), 500);
    }

    #[test]
    fn predicates() {
        assert!(CoordError::task_not_found("x").is_not_found());
        assert!(!CoordError::task_not_found("x").is_validation());
        assert!(CoordError::empty_field("f").is_validation());
    }

    #[test]
    fn messages_carry_context() {
        let err = CoordError::task_not_found("abcd");
        assert_eq!(err.to_string(), "not found: task 'abcd' does not exist");

        let err = CoordError::out_of_range("storyPoints", "must be 1..=21");
        assert!(err.to_string().contains("storyPoints"));
    }
}
