//! Pending HTTP-01 challenges, shared between issuers and the ACME responder.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

/// Token -> key authorization map.
///
/// Cheap to clone; all clones share the same table.
#[derive(Debug, Clone, Default)]
pub struct ChallengeStore {
    inner: Arc<RwLock<HashMap<String, String>>>,
}

impl ChallengeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, token: impl Into<String>, key_authorization: impl Into<String>) {
        self.inner
            .write()
            .insert(token.into(), key_authorization.into());
    }

    pub fn remove(&self, token: &str) -> Option<String> {
        self.inner.write().remove(token)
    }

    /// Key authorization for a pending token.
    pub fn get(&self, token: &str) -> Option<String> {
        self.inner.read().get(token).cloned()
    }

    pub fn clear(&self) {
        self.inner.write().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let store = ChallengeStore::new();
        let other = store.clone();
        store.insert("tok", "tok.thumb");
        assert_eq!(other.get("tok").as_deref(), Some("tok.thumb"));
        assert_eq!(other.remove("tok").as_deref(), Some("tok.thumb"));
        assert!(store.is_empty());
    }
}
