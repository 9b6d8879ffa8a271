/// Error taxonomy for the access core
///
/// Every public operation returns either a definite result or exactly one
/// [`AccessError`]. The core is transport-agnostic; HTTP callers map errors
/// with [`AccessError::status_code`] and [`AccessError::code`].
///
/// # Mapping
///
/// | Variant | Status | Code |
/// |---|---|---|
/// | `Invalid` | 400 | `invalid` |
/// | `Forbidden` | 403 | `forbidden` |
/// | `NotFound` | 404 | `not_found` |
/// | `Conflict` | 409 | `conflict` |
/// | `Expired` | 410 | `expired` |
/// | `Storage` | 500 | `internal_error` |
///
/// # Example
///
/// ```
/// use tasklane_access::error::AccessError;
///
/// let err = AccessError::Forbidden;
/// assert_eq!(err.status_code(), 403);
/// assert_eq!(err.code(), "forbidden");
/// ```

use crate::store::StoreError;

/// Result type alias for access-core operations
pub type AccessResult<T> = Result<T, AccessError>;

/// Unified error type of the access core
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    /// The principal may not perform the operation
    ///
    /// Carries no detail: "no role in this project" and "role too low" must be
    /// indistinguishable to the caller.
    #[error("Forbidden: you do not have permission to perform this action")]
    Forbidden,

    /// Resource, invitation or member absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Duplicate invite, last-owner violation, already a member, lost race
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Invitation past its expiry
    #[error("Expired: {0}")]
    Expired(String),

    /// Malformed input
    #[error("Invalid: {0}")]
    Invalid(String),

    /// Storage backend failure
    #[error("Storage error: {0}")]
    Storage(String),
}

impl AccessError {
    /// HTTP status code a transport layer should use
    pub fn status_code(&self) -> u16 {
        match self {
            AccessError::Invalid(_) => 400,
            AccessError::Forbidden => 403,
            AccessError::NotFound(_) => 404,
            AccessError::Conflict(_) => 409,
            AccessError::Expired(_) => 410,
            AccessError::Storage(_) => 500,
        }
    }

    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            AccessError::Invalid(_) => "invalid",
            AccessError::Forbidden => "forbidden",
            AccessError::NotFound(_) => "not_found",
            AccessError::Conflict(_) => "conflict",
            AccessError::Expired(_) => "expired",
            AccessError::Storage(_) => "internal_error",
        }
    }

    pub(crate) fn not_found(what: &str) -> Self {
        AccessError::NotFound(format!("{} not found", what))
    }
}

impl From<StoreError> for AccessError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => AccessError::not_found("Referenced resource"),
            StoreError::AlreadyExists => {
                AccessError::Conflict("A conflicting record already exists".to_string())
            }
            StoreError::Conflict => {
                AccessError::Conflict("The record was modified concurrently".to_string())
            }
            StoreError::Backend(msg) => {
                tracing::error!(error = %msg, "Storage backend failure");
                AccessError::Storage(msg)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(AccessError::Invalid("x".into()).status_code(), 400);
        assert_eq!(AccessError::Forbidden.status_code(), 403);
        assert_eq!(AccessError::NotFound("x".into()).status_code(), 404);
        assert_eq!(AccessError::Conflict("x".into()).status_code(), 409);
        assert_eq!(AccessError::Expired("x".into()).status_code(), 410);
        assert_eq!(AccessError::Storage("x".into()).status_code(), 500);
    }

    #[test]
    fn test_store_error_mapping() {
        assert!(matches!(
            AccessError::from(StoreError::NotFound),
            AccessError::NotFound(_)
        ));
        assert!(matches!(
            AccessError::from(StoreError::AlreadyExists),
            AccessError::Conflict(_)
        ));
        assert!(matches!(
            AccessError::from(StoreError::Conflict),
            AccessError::Conflict(_)
        ));
        assert!(matches!(
            AccessError::from(StoreError::Backend("down".into())),
            AccessError::Storage(_)
        ));
    }

    #[test]
    fn test_forbidden_message_is_generic() {
        let msg = AccessError::Forbidden.to_string();
        assert!(msg.starts_with("Forbidden"));
        assert!(!msg.contains("member"));
        assert!(!msg.contains("role"));
    }
}
