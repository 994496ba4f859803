//! Authentication result types.

/// Result of a successful credential check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthResult {
    /// The verified username, used in the relay's hostname.
    pub username: String,
}

impl AuthResult {
    #[inline]
    pub fn for_user(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
        }
    }
}
