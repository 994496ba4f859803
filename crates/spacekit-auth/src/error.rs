/// Why a relay's credentials were not accepted.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("no user named {0:?}")]
    UnknownUser(String),

    #[error("api key mismatch for {username:?}")]
    WrongApiKey { username: String },

    /// A stored hash is not `<salt>$<hex digest>`; a config problem, not a
    /// bad login.
    #[error("stored api key hash for {username:?} is malformed")]
    MalformedHash { username: String },
}

impl AuthError {
    /// True when the relay presented bad credentials, false when the service
    /// itself is misconfigured.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, Self::MalformedHash { .. })
    }
}
