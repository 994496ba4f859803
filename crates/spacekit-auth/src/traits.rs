use std::sync::Arc;

use async_trait::async_trait;

use crate::error::AuthError;
use crate::result::AuthResult;

/// Checks the `x-spacekit-username` / `x-spacekit-apikey` pair a relay
/// presents on its control channel upgrade.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn verify(&self, username: &str, apikey: &str) -> Result<AuthResult, AuthError>;
}

#[async_trait]
impl<A: AuthBackend + ?Sized> AuthBackend for Arc<A> {
    async fn verify(&self, username: &str, apikey: &str) -> Result<AuthResult, AuthError> {
        A::verify(self, username, apikey).await
    }
}
