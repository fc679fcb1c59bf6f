//! Identity provider seam.
//!
//! Email/password authentication is an external collaborator. It hands out a
//! stable user id ([`Identity`]) and pushes sign-in/sign-out changes to
//! registered listeners. [`memory::InMemoryIdentityProvider`] implements the
//! same contract in-process.

pub mod memory;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ErrorCode;
use crate::listener::ListenerHandle;

/// Stable user id issued by the identity provider.
///
/// Used only as the partition key for ownership filtering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    #[must_use]
    pub fn new(uid: impl Into<String>) -> Self {
        Self(uid.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(uid: &str) -> Self {
        Self::new(uid)
    }
}

/// Callback receiving the current identity; `None` means signed out.
pub type IdentityListener = Box<dyn FnMut(Option<Identity>) + Send>;

/// Authentication failures, surfaced directly to the user.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// Unknown email or wrong password.
    #[error("invalid email or password")]
    InvalidCredentials,

    /// Password shorter than the provider's policy allows.
    #[error("password must be at least {min_len} characters")]
    WeakPassword { min_len: usize },

    /// Sign-up with an email that already has an account.
    #[error("an account already exists for {0}")]
    EmailInUse(String),

    /// Email is not of the form `local@domain`.
    #[error("malformed email address: {0}")]
    InvalidEmail(String),
}

impl AuthError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidCredentials => ErrorCode::InvalidCredentials,
            Self::WeakPassword { .. } => ErrorCode::WeakPassword,
            Self::EmailInUse(_) => ErrorCode::EmailInUse,
            Self::InvalidEmail(_) => ErrorCode::InvalidEmail,
        }
    }
}

/// Abstraction over the hosted authentication service.
pub trait IdentityProvider: Send + Sync {
    /// Register a listener. It fires once on registration with the current
    /// identity and again on every sign-in or sign-out.
    fn subscribe(&self, listener: IdentityListener) -> ListenerHandle;

    /// Sign in an existing account.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidCredentials`] on a bad email/password pair.
    fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Identity, AuthError>;

    /// Create an account and sign it in.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthError`] for policy violations or an existing account.
    fn sign_up_with_password(&self, email: &str, password: &str) -> Result<Identity, AuthError>;

    /// End the current session. Signing out while signed out is a no-op.
    fn sign_out(&self);
}
