//! Service-level scenarios for the caching, invalidation and timing wrappers.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use aggpipe_core::caching::{CacheKeyGenerator, TimedOperation};
use aggpipe_core::prelude::*;
use aggpipe_core::Document;
use parking_lot::Mutex;
use serde_json::json;

/// In-memory task repository shared by read and write operations.
#[derive(Default)]
struct TaskRepo {
    titles: Mutex<Vec<String>>,
    reads: AtomicUsize,
}

impl TaskRepo {
    fn list(&self, status: &str) -> Vec<Document> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.titles
            .lock()
            .iter()
            .map(|t| json!({ "title": t, "status": status }))
            .collect()
    }
}

fn list_key(status: &String) -> String {
    format!("TaskService.list:{status}")
}

#[tokio::test]
async fn test_read_through_and_write_invalidation() {
    let store = common::shared_store();
    let repo = Arc::new(TaskRepo::default());

    let reader = repo.clone();
    let list = operation("TaskService", "list", move |status: String| {
        let repo = reader.clone();
        async move { Ok(repo.list(&status)) }
    })
    .cached(
        store.clone(),
        MethodCacheOptions::with_ttl(Duration::from_secs(60)).key_fn(list_key),
    );

    let writer = repo.clone();
    let create = operation("TaskService", "create", move |(status, title): (String, String)| {
        let repo = writer.clone();
        async move {
            repo.titles.lock().push(title);
            Ok(status)
        }
    })
    .invalidating(
        store.clone(),
        InvalidationKeys::dynamic(|(status, _): &(String, String)| vec![list_key(status)]),
    );

    assert!(list.call("open".to_string()).await.unwrap().is_empty());
    assert!(list.call("open".to_string()).await.unwrap().is_empty());
    assert_eq!(repo.reads.load(Ordering::SeqCst), 1);

    create
        .call(("open".to_string(), "Write docs".to_string()))
        .await
        .unwrap();
    assert!(!store.has("TaskService.list:open"));

    let listed = list.call("open".to_string()).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(repo.reads.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_invalidation_keeps_unrelated_keys() {
    let store = common::shared_store();
    for key in ["a", "b", "c"] {
        store.set(key, json!(key), None);
    }

    let op = operation("Svc", "write", |_: ()| async { Ok(()) })
        .invalidating(store.clone(), InvalidationKeys::keys(["a", "c"]));
    op.call(()).await.unwrap();

    assert!(!store.has("a"));
    assert_eq!(store.get("b"), Some(json!("b")));
    assert!(!store.has("c"));
}

#[tokio::test]
async fn test_generated_keys_match_key_generator() {
    let store = common::shared_store();
    let op = operation("ProjectService", "summary", |id: String| async move {
        Ok(json!({ "project": id }))
    })
    .cached(store.clone(), MethodCacheOptions::default());

    op.call("p1".to_string()).await.unwrap();

    let key = CacheKeyGenerator::method_key("ProjectService", "summary", &"p1".to_string()).unwrap();
    assert!(store.has(&key));
}

#[tokio::test]
async fn test_timing_outside_cache_sees_every_call() {
    let store = common::shared_store();
    let executions = Arc::new(AtomicUsize::new(0));
    let counter = executions.clone();

    let op: TimedOperation<_, u32, u32> = operation("Svc", "slow_square", move |x: u32| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(15)).await;
            Ok(x * x)
        }
    })
    .cached(store, MethodCacheOptions::default())
    .timed(Duration::from_millis(5));
    let timings = op.timings();

    for _ in 0..3 {
        assert_eq!(op.call(7).await.unwrap(), 49);
    }

    assert_eq!(executions.load(Ordering::SeqCst), 1);
    assert_eq!(timings.calls(), 3);
    assert!(timings.max() >= Duration::from_millis(15));
    assert!(timings.total() >= timings.max());
}

#[tokio::test]
async fn test_concurrent_callers_share_one_store() {
    let store = common::shared_store();
    let executions = Arc::new(AtomicUsize::new(0));
    let counter = executions.clone();

    let op = Arc::new(
        operation("Svc", "lookup", move |id: u64| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(id + 1)
            }
        })
        .cached(store.clone(), MethodCacheOptions::default()),
    );

    // Warm the entry, then fan out.
    op.call(1).await.unwrap();
    let mut handles = Vec::new();
    for _ in 0..8 {
        let op = op.clone();
        handles.push(tokio::spawn(async move { op.call(1).await }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), 2);
    }

    assert_eq!(executions.load(Ordering::SeqCst), 1);
    assert_eq!(store.metrics().cache_hits, 8);
}
