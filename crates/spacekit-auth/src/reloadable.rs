//! Swapping the user table without restarting the service.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::AuthError;
use crate::memory::MemoryAuth;
use crate::result::AuthResult;
use crate::traits::AuthBackend;

/// The service's live user table. SIGHUP re-reads `auth.users` and calls
/// [`replace`](Self::replace); a check already in progress keeps the table it
/// started with.
///
/// ```
/// use spacekit_auth::{MemoryAuth, ReloadableAuth};
///
/// let auth = ReloadableAuth::new(MemoryAuth::from_plain([("alice", "old")]));
/// let before = auth.replace(MemoryAuth::from_plain([("alice", "new"), ("bob", "b")]));
/// assert_eq!((before, auth.user_count()), (1, 2));
/// ```
#[derive(Debug)]
pub struct ReloadableAuth {
    users: RwLock<Arc<MemoryAuth>>,
}

impl ReloadableAuth {
    pub fn new(users: MemoryAuth) -> Self {
        Self {
            users: RwLock::new(Arc::new(users)),
        }
    }

    /// Install a new table, returning how many users the old one had.
    pub fn replace(&self, users: MemoryAuth) -> usize {
        let previous = std::mem::replace(&mut *self.users.write(), Arc::new(users));
        previous.len()
    }

    pub fn user_count(&self) -> usize {
        self.users.read().len()
    }

    fn snapshot(&self) -> Arc<MemoryAuth> {
        self.users.read().clone()
    }
}

#[async_trait]
impl AuthBackend for ReloadableAuth {
    async fn verify(&self, username: &str, apikey: &str) -> Result<AuthResult, AuthError> {
        let users = self.snapshot();
        users.verify(username, apikey).await
    }
}
