//! In-memory authentication backend.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::AuthError;
use crate::hash::{hash_api_key, is_valid_hash, verify_api_key};
use crate::result::AuthResult;
use crate::traits::AuthBackend;

/// Fixed table of users and their salted API key hashes.
///
/// Loaded from the service's `auth.users` configuration.
#[derive(Debug, Clone, Default)]
pub struct MemoryAuth {
    /// username -> `<salt>$<hex digest>`
    users: HashMap<String, String>,
}

impl MemoryAuth {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create from `(username, stored hash)` pairs.
    ///
    /// Fails if any stored hash is not in `<salt>$<hex digest>` form.
    pub fn from_hashed<I, U, H>(pairs: I) -> Result<Self, AuthError>
    where
        I: IntoIterator<Item = (U, H)>,
        U: Into<String>,
        H: Into<String>,
    {
        let mut auth = Self::new();
        for (username, hash) in pairs {
            auth.add_hashed(username, hash)?;
        }
        Ok(auth)
    }

    /// Create from `(username, plaintext api key)` pairs. Keys are hashed.
    ///
    /// # Example
    /// ```
    /// use spacekit_auth::MemoryAuth;
    ///
    /// let auth = MemoryAuth::from_plain([("alice", "key1"), ("bob", "key2")]);
    /// assert_eq!(auth.len(), 2);
    /// ```
    pub fn from_plain<I, U, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (U, K)>,
        U: Into<String>,
        K: AsRef<str>,
    {
        let mut auth = Self::new();
        for (username, apikey) in pairs {
            auth.add_user(username, apikey.as_ref());
        }
        auth
    }

    /// Add a user with a plaintext API key.
    pub fn add_user(&mut self, username: impl Into<String>, apikey: &str) {
        self.users.insert(username.into(), hash_api_key(apikey));
    }

    /// Add a user with an already-hashed API key.
    pub fn add_hashed(
        &mut self,
        username: impl Into<String>,
        hash: impl Into<String>,
    ) -> Result<(), AuthError> {
        let username = username.into();
        let hash = hash.into();
        if !is_valid_hash(&hash) {
            return Err(AuthError::MalformedHash { username });
        }
        self.users.insert(username, hash);
        Ok(())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.users.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl AuthBackend for MemoryAuth {
    async fn verify(&self, username: &str, apikey: &str) -> Result<AuthResult, AuthError> {
        let stored = self
            .users
            .get(username)
            .ok_or_else(|| AuthError::UnknownUser(username.to_string()))?;
        if !verify_api_key(apikey, stored) {
            return Err(AuthError::WrongApiKey {
                username: username.to_string(),
            });
        }
        Ok(AuthResult::for_user(username))
    }
}
