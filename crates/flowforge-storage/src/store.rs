//! Generic two-tier repository façade: an in-memory index backed by an
//! injected durable writer. Reads are always served from memory; writes
//! go to memory first and then best-effort to the durable backend.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Durable backend seam. The default `NullDurable` is a no-op, so
/// `Store<T>` behaves as a pure in-memory repository until a real backend
/// is wired in.
#[async_trait]
pub trait Durable<T>: Send + Sync {
    async fn put(&self, id: Uuid, value: &T);
    async fn delete(&self, id: Uuid);
}

pub struct NullDurable;

#[async_trait]
impl<T: Send + Sync> Durable<T> for NullDurable {
    async fn put(&self, _id: Uuid, _value: &T) {}
    async fn delete(&self, _id: Uuid) {}
}

/// An in-memory index of `T` keyed by UUID, with an injected durable
/// write-through. Clone is cheap (shares the same lock and backend).
pub struct Store<T> {
    index: Arc<RwLock<HashMap<Uuid, T>>>,
    durable: Arc<dyn Durable<T>>,
}

impl<T> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            index: self.index.clone(),
            durable: self.durable.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Store<T> {
    pub fn new() -> Self {
        Self {
            index: Arc::new(RwLock::new(HashMap::new())),
            durable: Arc::new(NullDurable),
        }
    }

    pub fn with_durable(durable: Arc<dyn Durable<T>>) -> Self {
        Self {
            index: Arc::new(RwLock::new(HashMap::new())),
            durable,
        }
    }

    pub async fn put(&self, id: Uuid, value: T) {
        self.durable.put(id, &value).await;
        self.index.write().await.insert(id, value);
    }

    pub async fn get(&self, id: Uuid) -> Option<T> {
        self.index.read().await.get(&id).cloned()
    }

    pub async fn remove(&self, id: Uuid) -> Option<T> {
        let removed = self.index.write().await.remove(&id);
        if removed.is_some() {
            self.durable.delete(id).await;
        }
        removed
    }

    pub async fn list(&self) -> Vec<T> {
        self.index.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.index.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.index.read().await.is_empty()
    }

    /// Evict the oldest entries (by the supplied timestamp accessor) once
    /// the index exceeds `max`. Used by the run repository's bounded
    /// retention policy.
    pub async fn evict_fifo_over(&self, max: usize, ts_of: impl Fn(&T) -> chrono::DateTime<chrono::Utc>) {
        let mut index = self.index.write().await;
        if index.len() <= max {
            return;
        }
        let mut ids: Vec<(Uuid, chrono::DateTime<chrono::Utc>)> =
            index.iter().map(|(id, v)| (*id, ts_of(v))).collect();
        ids.sort_by_key(|(_, ts)| *ts);
        let overflow = index.len() - max;
        for (id, _) in ids.into_iter().take(overflow) {
            index.remove(&id);
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Default for Store<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_roundtrips() {
        let store: Store<String> = Store::new();
        let id = Uuid::now_v7();
        store.put(id, "hello".to_string()).await;
        assert_eq!(store.get(id).await, Some("hello".to_string()));
    }

    #[tokio::test]
    async fn remove_deletes_from_index() {
        let store: Store<String> = Store::new();
        let id = Uuid::now_v7();
        store.put(id, "hello".to_string()).await;
        assert!(store.remove(id).await.is_some());
        assert_eq!(store.get(id).await, None);
    }

    #[tokio::test]
    async fn clone_shares_the_same_backing_index() {
        let store: Store<String> = Store::new();
        let clone = store.clone();
        let id = Uuid::now_v7();
        store.put(id, "hello".to_string()).await;
        assert_eq!(clone.get(id).await, Some("hello".to_string()));
    }

    #[tokio::test]
    async fn fifo_eviction_drops_oldest_entries_over_the_cap() {
        use chrono::{Duration, Utc};

        #[derive(Clone)]
        struct Timestamped(chrono::DateTime<Utc>);

        let store: Store<Timestamped> = Store::new();
        let base = Utc::now();
        let mut ids = Vec::new();
        for i in 0..5 {
            let id = Uuid::now_v7();
            ids.push(id);
            store.put(id, Timestamped(base + Duration::seconds(i))).await;
        }

        store.evict_fifo_over(3, |t| t.0).await;

        assert_eq!(store.len().await, 3);
        assert!(store.get(ids[0]).await.is_none());
        assert!(store.get(ids[1]).await.is_none());
        assert!(store.get(ids[4]).await.is_some());
    }
}
