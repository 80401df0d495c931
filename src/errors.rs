//! Error handling module
//!
//! Structured error types for the toolkit. Only three conditions are fatal
//! to a role audit run: `NoActiveSession`, `SubscriptionNotFound` and
//! `AccessDenied`, all of which occur before collection starts. Every other
//! failure degrades the run to a smaller report instead of aborting it.

use thiserror::Error;

/// Main error type for identity audit operations
#[derive(Error, Debug)]
pub enum AuditError {
    /// No usable session context and no subscription supplied
    #[error("no active session: set AZURE_ACCESS_TOKEN and supply --subscription-id or AZURE_SUBSCRIPTION_ID")]
    NoActiveSession,

    /// The requested subscription does not exist or is not visible
    #[error("subscription not found: {0}")]
    SubscriptionNotFound(String),

    /// The session identity is not authorized for the requested context
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Role assignment fetch failed for one scope (non-fatal)
    #[error("failed to fetch role assignments for scope '{scope}': {reason}")]
    ScopeFetchFailed { scope: String, reason: String },

    /// Directory lookup for a principal failed (non-fatal)
    #[error("principal lookup failed for {principal_id}: {reason}")]
    PrincipalLookupFailed { principal_id: String, reason: String },

    /// A report output path could not be written (non-fatal per format)
    #[error("failed to write report to {path}: {reason}")]
    ReportWriteFailed { path: String, reason: String },

    /// Management API call error
    #[error("management API error: {0}")]
    ApiError(String),

    /// LDAP operation error
    #[error("LDAP operation failed: {0}")]
    LdapError(String),

    /// Input or directory-state validation error
    #[error("validation failed: {0}")]
    ValidationError(String),

    /// Parse error
    #[error("failed to parse data: {0}")]
    ParseError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(String),
}

impl AuditError {
    /// Whether this error must abort the run before collection
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AuditError::NoActiveSession
                | AuditError::SubscriptionNotFound(_)
                | AuditError::AccessDenied(_)
        )
    }
}

impl From<reqwest::Error> for AuditError {
    fn from(err: reqwest::Error) -> Self {
        AuditError::ApiError(err.to_string())
    }
}

impl From<ldap3::LdapError> for AuditError {
    fn from(err: ldap3::LdapError) -> Self {
        match err {
            ldap3::LdapError::LdapResult { result } => match result.rc {
                // 49 = Invalid credentials
                49 => AuditError::AccessDenied(format!("invalid credentials: {}", result.text)),
                // 50 = Insufficient access rights
                50 => AuditError::AccessDenied(format!(
                    "insufficient access rights: {}",
                    result.text
                )),
                // 32 = No such object
                32 => AuditError::ValidationError(format!("object not found: {}", result.text)),
                _ => {
                    AuditError::LdapError(format!("LDAP error code {}: {}", result.rc, result.text))
                }
            },
            ldap3::LdapError::EndOfStream => {
                AuditError::LdapError("connection closed unexpectedly".to_string())
            }
            ldap3::LdapError::Io { source } => {
                AuditError::LdapError(format!("I/O error: {}", source))
            }
            _ => AuditError::LdapError(err.to_string()),
        }
    }
}

impl From<std::io::Error> for AuditError {
    fn from(err: std::io::Error) -> Self {
        AuditError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for AuditError {
    fn from(err: serde_json::Error) -> Self {
        AuditError::ParseError(format!("JSON parse error: {}", err))
    }
}

/// Result type alias for toolkit operations
pub type Result<T> = std::result::Result<T, AuditError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AuditError::SubscriptionNotFound("1234".to_string());
        assert_eq!(err.to_string(), "subscription not found: 1234");

        let err = AuditError::ScopeFetchFailed {
            scope: "/subscriptions/x/resourceGroups/rg1".to_string(),
            reason: "timeout".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "failed to fetch role assignments for scope '/subscriptions/x/resourceGroups/rg1': timeout"
        );
    }

    #[test]
    fn test_fatal_classification() {
        assert!(AuditError::NoActiveSession.is_fatal());
        assert!(AuditError::SubscriptionNotFound("x".into()).is_fatal());
        assert!(AuditError::AccessDenied("x".into()).is_fatal());

        assert!(!AuditError::ScopeFetchFailed {
            scope: "s".into(),
            reason: "r".into()
        }
        .is_fatal());
        assert!(!AuditError::PrincipalLookupFailed {
            principal_id: "p".into(),
            reason: "r".into()
        }
        .is_fatal());
        assert!(!AuditError::ReportWriteFailed {
            path: "p".into(),
            reason: "r".into()
        }
        .is_fatal());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err: AuditError = io_err.into();
        assert!(matches!(err, AuditError::IoError(_)));
    }
}
