use std::fmt;

use crate::identity::AuthError;
use crate::store::StoreError;

/// Machine-readable error codes for callers that branch on failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    InvalidInput,
    InvalidCredentials,
    WeakPassword,
    EmailInUse,
    InvalidEmail,
    DocumentNotFound,
    PermissionDenied,
    BatchRejected,
    StoreUnavailable,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1002",
            Self::InvalidInput => "E2001",
            Self::InvalidCredentials => "E3001",
            Self::WeakPassword => "E3002",
            Self::EmailInUse => "E3003",
            Self::InvalidEmail => "E3004",
            Self::DocumentNotFound => "E4001",
            Self::PermissionDenied => "E4002",
            Self::BatchRejected => "E4003",
            Self::StoreUnavailable => "E5001",
        }
    }

    /// Short human-facing summary for logs and notifications.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::InvalidInput => "Invalid input",
            Self::InvalidCredentials => "Invalid email or password",
            Self::WeakPassword => "Password too weak",
            Self::EmailInUse => "Email already registered",
            Self::InvalidEmail => "Malformed email address",
            Self::DocumentNotFound => "Document not found",
            Self::PermissionDenied => "Permission denied by store rules",
            Self::BatchRejected => "Batch commit rejected",
            Self::StoreUnavailable => "Remote store unavailable",
        }
    }

    /// Optional remediation hint that can be surfaced to the user.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in taskforge/config.toml and retry."),
            Self::InvalidInput => None,
            Self::InvalidCredentials => Some("Check the email and password, or sign up first."),
            Self::WeakPassword => Some("Choose a longer password."),
            Self::EmailInUse => Some("Sign in with the existing account instead."),
            Self::InvalidEmail => Some("Use an address of the form name@example.com."),
            Self::DocumentNotFound => Some("The item was removed on another device; refresh."),
            Self::PermissionDenied => Some("Sign in again with the account that owns this item."),
            Self::BatchRejected => Some("Nothing was deleted. Retry the operation."),
            Self::StoreUnavailable => Some("Check the network connection and retry."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Errors returned by sync layer operations.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The remote store rejected or failed the operation.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The identity provider rejected the request.
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),

    /// A caller-supplied field failed validation.
    #[error("invalid {field}: {reason}")]
    InvalidInput {
        field: &'static str,
        reason: String,
    },
}

impl SyncError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field,
            reason: reason.into(),
        }
    }

    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Store(err) => err.code(),
            Self::Auth(err) => err.code(),
            Self::InvalidInput { .. } => ErrorCode::InvalidInput,
        }
    }

    /// Optional remediation hint.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}
