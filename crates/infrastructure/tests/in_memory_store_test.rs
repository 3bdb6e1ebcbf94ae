use std::collections::HashSet;
use std::sync::Arc;

use scheduler_core::models::{Job, JobBuilder, Trigger, TriggerBuilder, TriggerPatch, TriggerState};
use scheduler_core::traits::JobStore;
use scheduler_core::SchedulerError;
use scheduler_infrastructure::InMemoryStore;

const SCHEDULER: &str = "test";

fn job(key: &str, job_type: &str) -> Job {
    JobBuilder::new()
        .with_key(key)
        .with_type(job_type)
        .build()
        .unwrap()
}

fn trigger(key: &str, job_key: &str) -> Trigger {
    TriggerBuilder::new()
        .with_key(key)
        .with_cron("0 * * * * *")
        .in_location("UTC")
        .build()
        .unwrap()
        .scheduled_for_job(job_key)
}

fn exhausted(key: &str, job_key: &str) -> Trigger {
    trigger(key, job_key).with_state(TriggerPatch::state(TriggerState::Exhausted))
}

#[tokio::test]
async fn test_insert_and_get() {
    let store = InMemoryStore::new();

    store.insert_job(SCHEDULER, &job("job1", "type1")).await.unwrap();
    store
        .insert_trigger(SCHEDULER, &trigger("t1", "job1"))
        .await
        .unwrap();

    let err = store
        .insert_job(SCHEDULER, &job("job1", "type1"))
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::JobAlreadyExists { .. }));

    let err = store
        .insert_trigger(SCHEDULER, &trigger("t1", "job1"))
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::TriggerAlreadyExists { .. }));

    let stored = store.get_job(SCHEDULER, "job1").await.unwrap().unwrap();
    assert_eq!(stored.job_type(), "type1");
    let stored = store.get_trigger(SCHEDULER, "t1").await.unwrap().unwrap();
    assert_eq!(stored.job_key(), "job1");
}

#[tokio::test]
async fn test_get_missing_is_not_an_error() {
    let store = InMemoryStore::new();
    assert!(store.get_job(SCHEDULER, "j1").await.unwrap().is_none());
    assert!(store.get_trigger(SCHEDULER, "t1").await.unwrap().is_none());
    assert!(store.get_jobs(SCHEDULER).await.unwrap().is_empty());
    assert!(store.get_triggers(SCHEDULER).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_update() {
    let store = InMemoryStore::new();

    let err = store
        .update_job(SCHEDULER, &job("j1", "type1"))
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::JobNotFound { .. }));
    let err = store
        .update_trigger(SCHEDULER, &trigger("t1", "j1"))
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::TriggerNotFound { .. }));

    store.insert_job(SCHEDULER, &job("j1", "type1")).await.unwrap();
    store
        .insert_trigger(SCHEDULER, &trigger("t1", "j1"))
        .await
        .unwrap();

    store.update_job(SCHEDULER, &job("j1", "type2")).await.unwrap();
    store
        .update_trigger(SCHEDULER, &exhausted("t1", "j1"))
        .await
        .unwrap();

    let j = store.get_job(SCHEDULER, "j1").await.unwrap().unwrap();
    assert_eq!(j.job_type(), "type2");
    let t = store.get_trigger(SCHEDULER, "t1").await.unwrap().unwrap();
    assert_eq!(t.state(), TriggerState::Exhausted);
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let store = InMemoryStore::new();
    assert!(!store.delete_job(SCHEDULER, "j1").await.unwrap());
    assert!(!store.delete_trigger(SCHEDULER, "t1").await.unwrap());

    store.insert_job(SCHEDULER, &job("j1", "type1")).await.unwrap();
    store
        .insert_trigger(SCHEDULER, &trigger("t1", "j1"))
        .await
        .unwrap();

    assert!(store.delete_job(SCHEDULER, "j1").await.unwrap());
    assert!(store.delete_trigger(SCHEDULER, "t1").await.unwrap());
    assert!(!store.delete_job(SCHEDULER, "j1").await.unwrap());
    assert!(!store.delete_trigger(SCHEDULER, "t1").await.unwrap());
}

#[tokio::test]
async fn test_namespace_isolation() {
    let store = InMemoryStore::new();

    store.insert_job("a", &job("j1", "type-a")).await.unwrap();
    store.insert_job("b", &job("j1", "type-b")).await.unwrap();
    store.insert_trigger("a", &trigger("t1", "j1")).await.unwrap();
    store.insert_trigger("b", &trigger("t1", "j1")).await.unwrap();

    assert_eq!(
        store.get_job("a", "j1").await.unwrap().unwrap().job_type(),
        "type-a"
    );
    assert_eq!(
        store.get_job("b", "j1").await.unwrap().unwrap().job_type(),
        "type-b"
    );
    assert_eq!(store.get_jobs("a").await.unwrap().len(), 1);
    assert_eq!(store.get_triggers("b").await.unwrap().len(), 1);

    // 认领只影响自己的命名空间
    assert_eq!(store.acquire_triggers("a").await.unwrap().len(), 1);
    let other = store.get_trigger("b", "t1").await.unwrap().unwrap();
    assert_eq!(other.state(), TriggerState::Scheduled);

    assert!(store.delete_job("a", "j1").await.unwrap());
    assert!(store.get_job("b", "j1").await.unwrap().is_some());
    assert!(store.get_jobs("c").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_triggers_by_job_key() {
    let store = InMemoryStore::new();

    for (key, job_key) in [("t1", "job1"), ("t2", "job1"), ("t3", "job2")] {
        store
            .insert_trigger(SCHEDULER, &trigger(key, job_key))
            .await
            .unwrap();
    }
    store
        .insert_trigger("other", &trigger("t1", "job1"))
        .await
        .unwrap();

    let mut deleted = store
        .delete_triggers_by_job_key(SCHEDULER, "job1")
        .await
        .unwrap();
    deleted.sort();
    assert_eq!(deleted, vec!["t1".to_string(), "t2".to_string()]);

    let remaining = store.get_triggers(SCHEDULER).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].key(), "t3");
    assert!(store.get_trigger("other", "t1").await.unwrap().is_some());

    assert!(store
        .delete_triggers_by_job_key("missing", "job1")
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_delete_exhausted_triggers() {
    let store = InMemoryStore::new();

    store
        .insert_trigger(SCHEDULER, &exhausted("e1", "job1"))
        .await
        .unwrap();
    store
        .insert_trigger(SCHEDULER, &exhausted("e2", "job1"))
        .await
        .unwrap();
    store
        .insert_trigger(SCHEDULER, &trigger("s1", "job1"))
        .await
        .unwrap();
    store
        .insert_trigger(SCHEDULER, &trigger("a1", "job1").acquired())
        .await
        .unwrap();
    store
        .insert_trigger("other", &exhausted("e1", "job1"))
        .await
        .unwrap();

    assert_eq!(store.delete_exhausted_triggers(SCHEDULER).await.unwrap(), 2);
    assert_eq!(store.delete_exhausted_triggers(SCHEDULER).await.unwrap(), 0);

    let mut keys: Vec<String> = store
        .get_triggers(SCHEDULER)
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.key().to_string())
        .collect();
    keys.sort();
    assert_eq!(keys, vec!["a1".to_string(), "s1".to_string()]);
    assert_eq!(store.get_triggers("other").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_acquire_only_claims_scheduled_triggers() {
    let store = InMemoryStore::new();

    store
        .insert_trigger(SCHEDULER, &trigger("s1", "job1"))
        .await
        .unwrap();
    store
        .insert_trigger(SCHEDULER, &trigger("a1", "job1").acquired())
        .await
        .unwrap();
    store
        .insert_trigger(SCHEDULER, &exhausted("e1", "job1"))
        .await
        .unwrap();

    let acquired = store.acquire_triggers(SCHEDULER).await.unwrap();
    assert_eq!(acquired.len(), 1);
    assert_eq!(acquired[0].key(), "s1");
    assert_eq!(acquired[0].state(), TriggerState::Acquired);

    let stored = store.get_trigger(SCHEDULER, "s1").await.unwrap().unwrap();
    assert_eq!(stored.state(), TriggerState::Acquired);
    assert!(store.acquire_triggers(SCHEDULER).await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_acquire_partitions_triggers() {
    let store = Arc::new(InMemoryStore::new());
    let total = 200;

    for i in 0..total {
        store
            .insert_trigger(SCHEDULER, &trigger(&format!("t{i}"), "job1"))
            .await
            .unwrap();
    }

    // 多个调用方多轮并发认领
    let callers = (0..8).map(|_| {
        let store = Arc::clone(&store);
        tokio::spawn(async move {
            let mut claimed = Vec::new();
            for _ in 0..5 {
                let batch = store.acquire_triggers(SCHEDULER).await.unwrap();
                claimed.extend(batch.into_iter().map(|t| t.key().to_string()));
                tokio::task::yield_now().await;
            }
            claimed
        })
    });

    let results = futures::future::join_all(callers).await;

    let mut seen = HashSet::new();
    for claimed in results {
        for key in claimed.unwrap() {
            assert!(seen.insert(key.clone()), "trigger {key} 被认领了两次");
        }
    }
    assert_eq!(seen.len(), total);

    let all = store.get_triggers(SCHEDULER).await.unwrap();
    assert!(all.iter().all(|t| t.state() == TriggerState::Acquired));
}
