use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// An async mutex per key (entity id).
/// Writers to the same key queue up in FIFO order; different keys never contend.
#[derive(Debug, Clone)]
pub struct KeyedMutex {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedMutex {
    pub fn new() -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
        }
    }

    /// Acquires the lock for `key`; released when the guard is dropped.
    pub async fn lock(&self, key: &str) -> tokio::sync::OwnedMutexGuard<()> {
        let mutex = self
            .locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();

        mutex.lock_owned().await
    }

    /// True while some task holds or waits on `key`.
    pub fn is_pending(&self, key: &str) -> bool {
        self.locks
            .get(key)
            .map(|m| m.try_lock().is_err())
            .unwrap_or(false)
    }

    /// Drops the entry for `key` if no task holds or awaits it.
    pub fn remove_if_idle(&self, key: &str) -> bool {
        self.locks
            .remove_if(key, |_, mutex| Arc::strong_count(mutex) == 1)
            .is_some()
    }

    /// Removes locks that are not currently held by any task.
    pub fn cleanup(&self) {
        self.locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Default for KeyedMutex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_is_serialized() {
        let mutex = KeyedMutex::new();
        let guard = mutex.lock("c1").await;
        assert!(mutex.is_pending("c1"));

        let m2 = mutex.clone();
        let waiter = tokio::spawn(async move {
            let _g = m2.lock("c1").await;
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());
        drop(guard);
        waiter.await.unwrap();
        assert!(!mutex.is_pending("c1"));
    }

    #[tokio::test]
    async fn test_different_keys_do_not_contend() {
        let mutex = KeyedMutex::new();
        let _a = mutex.lock("a").await;
        let _b = tokio::time::timeout(Duration::from_millis(50), mutex.lock("b"))
            .await
            .expect("lock on another key must not block");
    }

    #[tokio::test]
    async fn test_cleanup_drops_idle_entries() {
        let mutex = KeyedMutex::new();
        {
            let _g = mutex.lock("x").await;
            mutex.cleanup();
            assert_eq!(mutex.len(), 1);
        }
        mutex.cleanup();
        assert!(mutex.is_empty());
    }

    #[tokio::test]
    async fn test_remove_if_idle_keeps_contended_keys() {
        let mutex = KeyedMutex::new();
        let guard = mutex.lock("c1").await;
        assert!(!mutex.remove_if_idle("c1"));
        drop(guard);
        assert!(mutex.remove_if_idle("c1"));
        assert!(mutex.is_empty());
        assert!(!mutex.remove_if_idle("missing"));
    }
}
