#[cfg(test)]
mod tests {
    use crate::error::StoreError;
    use crate::infrastructure::{CompareOutcome, LockStore};
    use crate::infrastructure_in_memory::InMemoryLockStore;
    use std::sync::Arc;
    use std::time::Duration;

    const KEY: &str = "lock:test:store";

    #[tokio::test]
    async fn test_in_memory_set_if_absent_is_exclusive() {
        let store = InMemoryLockStore::new();

        assert!(store.set_if_absent(KEY, "t1", Duration::from_secs(5)).await.unwrap());
        assert!(!store.set_if_absent(KEY, "t2", Duration::from_secs(5)).await.unwrap());
        assert_eq!(store.held_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_in_memory_compare_and_delete_outcomes() {
        let store = InMemoryLockStore::new();

        assert_eq!(
            store.compare_and_delete(KEY, "t1").await.unwrap(),
            CompareOutcome::Absent
        );

        store.set_if_absent(KEY, "t1", Duration::from_secs(5)).await.unwrap();
        assert_eq!(
            store.compare_and_delete(KEY, "other").await.unwrap(),
            CompareOutcome::HeldByOther
        );
        // The foreign attempt left the entry alone
        assert!(store.ttl(KEY).await.unwrap().is_some());

        assert_eq!(
            store.compare_and_delete(KEY, "t1").await.unwrap(),
            CompareOutcome::Matched
        );
        assert!(store.ttl(KEY).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_memory_compare_and_expire_only_for_owner() {
        let store = InMemoryLockStore::new();
        store.set_if_absent(KEY, "t1", Duration::from_secs(2)).await.unwrap();

        assert_eq!(
            store
                .compare_and_expire(KEY, "stale", Duration::from_secs(60))
                .await
                .unwrap(),
            CompareOutcome::HeldByOther
        );
        assert!(store.ttl(KEY).await.unwrap().unwrap() <= Duration::from_secs(2));

        assert_eq!(
            store
                .compare_and_expire(KEY, "t1", Duration::from_secs(60))
                .await
                .unwrap(),
            CompareOutcome::Matched
        );
        assert!(store.ttl(KEY).await.unwrap().unwrap() > Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_memory_entries_expire() {
        let store = InMemoryLockStore::new();
        store.set_if_absent(KEY, "t1", Duration::from_secs(1)).await.unwrap();

        tokio::time::advance(Duration::from_millis(999)).await;
        assert!(!store.set_if_absent(KEY, "t2", Duration::from_secs(1)).await.unwrap());

        tokio::time::advance(Duration::from_millis(2)).await;
        assert!(store.ttl(KEY).await.unwrap().is_none());
        assert_eq!(
            store
                .compare_and_expire(KEY, "t1", Duration::from_secs(1))
                .await
                .unwrap(),
            CompareOutcome::Absent
        );
        assert!(store.set_if_absent(KEY, "t2", Duration::from_secs(1)).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_memory_eviction() {
        let store = InMemoryLockStore::new();
        store.set_if_absent("lock:a:1", "t", Duration::from_millis(100)).await.unwrap();
        store.set_if_absent("lock:a:2", "t", Duration::from_millis(100)).await.unwrap();
        store.set_if_absent("lock:a:3", "t", Duration::from_secs(10)).await.unwrap();

        assert_eq!(store.evict_expired().unwrap(), 0);

        tokio::time::advance(Duration::from_millis(150)).await;
        assert_eq!(store.held_count().unwrap(), 1);
        assert_eq!(store.evict_expired().unwrap(), 2);
        assert_eq!(store.evict_expired().unwrap(), 0);
    }

    #[test]
    fn test_compare_outcome_from_reply() {
        assert_eq!(CompareOutcome::from_reply(1).unwrap(), CompareOutcome::Matched);
        assert_eq!(CompareOutcome::from_reply(0).unwrap(), CompareOutcome::Absent);
        assert_eq!(CompareOutcome::from_reply(-1).unwrap(), CompareOutcome::HeldByOther);
        assert!(matches!(
            CompareOutcome::from_reply(7),
            Err(StoreError::Protocol(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_reclaims_abandoned_keys() {
        let store = Arc::new(InMemoryLockStore::new());
        store.set_if_absent("lock:crashed:1", "t1", Duration::from_millis(10)).await.unwrap();
        store.set_if_absent("lock:crashed:2", "t2", Duration::from_millis(10)).await.unwrap();
        store.set_if_absent(KEY, "t3", Duration::from_secs(60)).await.unwrap();

        let sweeper = store.spawn_sweeper(Duration::from_millis(50));
        tokio::time::sleep(Duration::from_millis(120)).await;

        // already swept, nothing left to evict
        assert_eq!(store.evict_expired().unwrap(), 0);
        assert_eq!(store.held_count().unwrap(), 1);

        drop(store);
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(sweeper.is_finished());
    }
}
