//! Session Management
//!
//! Session identifiers and an explicit per-session instance registry.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OnceCell};
use uuid::Uuid;

use crate::error::Result;

/// Unique session identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Slot for one session; empty until its instance has been built
type Slot<T> = Arc<OnceCell<Arc<T>>>;

/// Maps session ids to long-lived instances
///
/// Instances are created lazily and kept until evicted. The map lock only
/// guards slot lookup; building happens inside the id's own slot, so each id
/// is created at most once while other ids stay available.
pub struct SessionRegistry<T> {
    entries: Mutex<HashMap<SessionId, Slot<T>>>,
}

impl<T> Default for SessionRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SessionRegistry<T> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Look up an existing instance
    pub async fn get(&self, id: &SessionId) -> Option<Arc<T>> {
        self.entries.lock().await.get(id).and_then(|slot| slot.get().cloned())
    }

    /// Return the instance for `id`, building it with `create` if absent.
    ///
    /// Concurrent callers for the same id wait for one build; a failed build
    /// leaves the slot empty so the next caller retries.
    pub async fn get_or_create<F, Fut>(&self, id: &SessionId, create: F) -> Result<Arc<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let slot = Arc::clone(self.entries.lock().await.entry(id.clone()).or_default());

        slot.get_or_try_init(|| async {
            tracing::debug!(session = %id, "Creating session instance");
            create().await.map(Arc::new)
        })
        .await
        .cloned()
    }

    /// Insert or replace the instance for `id`
    pub async fn insert(&self, id: SessionId, instance: T) -> Arc<T> {
        let instance = Arc::new(instance);
        let slot = Arc::new(OnceCell::new_with(Some(Arc::clone(&instance))));
        self.entries.lock().await.insert(id, slot);
        instance
    }

    /// Remove an instance; callers still holding it keep it alive
    pub async fn evict(&self, id: &SessionId) -> Option<Arc<T>> {
        self.entries
            .lock()
            .await
            .remove(id)
            .and_then(|slot| slot.get().cloned())
    }

    /// Ids with a built instance, sorted
    pub async fn ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<_> = self
            .entries
            .lock()
            .await
            .iter()
            .filter(|(_, slot)| slot.initialized())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Number of built instances
    pub async fn len(&self) -> usize {
        self.entries
            .lock()
            .await
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
