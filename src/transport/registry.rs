//! Session registry keyed by target path.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::transport::ConnectionPair;

// ============================================================================
// PairRegistry
// ============================================================================

/// Live sessions keyed by target path, at most one per path.
///
/// Only one DevTools client may proxy a given upstream target at a time; a
/// second client on the same path is declined without disturbing the first.
/// The registry is consulted by acceptor tasks before the upgrade and
/// mutated again during session teardown, so all access goes through a
/// mutex; critical sections are a single map operation.
///
/// [`try_register`](Self::try_register) is the sole source of truth: two
/// acceptors racing on the same path may both pass the pre-upgrade
/// [`contains`](Self::contains) check, but only one insert wins, and the
/// loser tears down its just-built pair.
#[derive(Default)]
pub struct PairRegistry {
    pairs: Mutex<FxHashMap<String, Arc<ConnectionPair>>>,
}

impl PairRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if a session is registered for this path.
    #[inline]
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.pairs.lock().contains_key(path)
    }

    /// Registers a pair for this path unless one is already present.
    ///
    /// Returns `true` on insert; `false` (leaving the registry untouched)
    /// when the path is already taken.
    #[must_use]
    pub fn try_register(&self, path: &str, pair: Arc<ConnectionPair>) -> bool {
        let mut pairs = self.pairs.lock();
        if pairs.contains_key(path) {
            return false;
        }
        pairs.insert(path.to_string(), pair);
        true
    }

    /// Removes the entry for this path, if present.
    pub fn unregister(&self, path: &str) {
        self.pairs.lock().remove(path);
    }

    /// Returns the number of live sessions.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.lock().len()
    }

    /// Returns `true` if no session is registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.lock().is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::transport::framed::tests::ws_pair;
    use crate::transport::{FramedConnection, Side};

    async fn test_pair(target: &str) -> Arc<ConnectionPair> {
        let (a, _a_peer) = ws_pair().await;
        let (b, _b_peer) = ws_pair().await;
        Arc::new(ConnectionPair::new(
            target,
            FramedConnection::new(Side::Devtools, a),
            FramedConnection::new(Side::Web, b),
        ))
    }

    #[tokio::test]
    async fn test_register_once() {
        let registry = PairRegistry::new();
        let pair = test_pair("/p/1").await;

        assert!(!registry.contains("/p/1"));
        assert!(registry.try_register("/p/1", pair));
        assert!(registry.contains("/p/1"));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_rejected() {
        let registry = PairRegistry::new();
        let first = test_pair("/p/1").await;
        let second = test_pair("/p/1").await;

        assert!(registry.try_register("/p/1", first));
        assert!(!registry.try_register("/p/1", second));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_unregister_allows_reregister() {
        let registry = PairRegistry::new();

        let pair = test_pair("/p/1").await;
        assert!(registry.try_register("/p/1", pair));

        registry.unregister("/p/1");
        assert!(!registry.contains("/p/1"));
        assert!(registry.is_empty());

        let pair = test_pair("/p/1").await;
        assert!(registry.try_register("/p/1", pair));
    }

    #[tokio::test]
    async fn test_unregister_missing_is_noop() {
        let registry = PairRegistry::new();
        registry.unregister("/never/registered");
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_paths_are_independent() {
        let registry = PairRegistry::new();

        assert!(registry.try_register("/p/1", test_pair("/p/1").await));
        assert!(registry.try_register("/p/2", test_pair("/p/2").await));
        assert_eq!(registry.len(), 2);

        registry.unregister("/p/1");
        assert!(registry.contains("/p/2"));
    }
}
