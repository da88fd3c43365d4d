mod common;

use std::sync::atomic::Ordering;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use common::FakeStore;
use storebridge::ErrorKind;

#[test]
fn test_same_path_reuses_connection() {
    let store = FakeStore::new();
    let manager = store.manager();

    let first = manager.ensure_connection(Some("a.toml")).unwrap();
    let second = manager.ensure_connection(Some("a.toml")).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(store.connects.load(Ordering::SeqCst), 1);
    assert_eq!(manager.connect_count(), 1);
    assert_eq!(manager.current_config_path().as_deref(), Some("a.toml"));
}

#[test]
fn test_different_path_closes_before_reopening() {
    let store = FakeStore::new();
    let manager = store.manager();

    manager.ensure_connection(Some("a.toml")).unwrap();
    manager.ensure_connection(Some("b.toml")).unwrap();

    assert_eq!(store.events(), vec!["connect:a.toml", "close:a.toml", "connect:b.toml"]);
    assert_eq!(manager.current_config_path().as_deref(), Some("b.toml"));
    assert_eq!(store.closes.load(Ordering::SeqCst), 1);
}

#[test]
fn test_absent_path_after_connection_closes_and_fails() {
    let store = FakeStore::new();
    let manager = store.manager();

    manager.ensure_connection(Some("a.toml")).unwrap();
    let err = manager.ensure_connection(None).err().unwrap();

    assert_eq!(err.kind(), ErrorKind::Fatal);
    assert!(!manager.is_connected());
    assert!(manager.current_config_path().is_none());
    assert_eq!(store.events(), vec!["connect:a.toml", "close:a.toml"]);
}

#[test]
fn test_absent_path_without_connection_is_configuration_error() {
    let store = FakeStore::new();
    let manager = store.manager();

    let err = manager.ensure_connection(None).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Configuration);

    // An empty path counts as absent
    let err = manager.ensure_connection(Some("")).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert_eq!(store.connects.load(Ordering::SeqCst), 0);
}

#[test]
fn test_connect_failure_leaves_manager_retryable() {
    let store = FakeStore::new();
    let manager = store.manager();

    store.fail_connect.store(true, Ordering::SeqCst);
    let err = manager.ensure_connection(Some("a.toml")).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Fatal);
    assert!(!manager.is_connected());

    store.fail_connect.store(false, Ordering::SeqCst);
    manager.ensure_connection(Some("a.toml")).unwrap();
    assert!(manager.is_connected());
    assert_eq!(store.connects.load(Ordering::SeqCst), 1);
}

#[test]
fn test_failed_close_on_reconfiguration_leaves_manager_absent() {
    let store = FakeStore::new();
    let manager = store.manager();

    manager.ensure_connection(Some("a.toml")).unwrap();
    store.fail_client_close.store(true, Ordering::SeqCst);

    let err = manager.ensure_connection(Some("b.toml")).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Fatal);
    assert!(!manager.is_connected());

    store.fail_client_close.store(false, Ordering::SeqCst);
    manager.ensure_connection(Some("b.toml")).unwrap();
    assert_eq!(manager.current_config_path().as_deref(), Some("b.toml"));
}

#[test]
fn test_concurrent_construction_opens_one_connection() {
    let store = FakeStore::new();
    *store.connect_delay.lock() = Duration::from_millis(20);
    let manager = store.manager();

    let threads = 16;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let manager = manager.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                manager.ensure_connection(Some("shared.toml")).map(|_| ())
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    assert_eq!(store.connects.load(Ordering::SeqCst), 1);
    assert_eq!(store.closes.load(Ordering::SeqCst), 0);
}

#[test]
fn test_concurrent_reconfiguration_is_serialized() {
    let store = FakeStore::new();
    *store.connect_delay.lock() = Duration::from_millis(2);
    let manager = store.manager();

    let threads = 8;
    let rounds = 10;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|i| {
            let manager = manager.clone();
            let barrier = barrier.clone();
            let path = if i % 2 == 0 { "a.toml" } else { "b.toml" };
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..rounds {
                    manager.ensure_connection(Some(path)).map(|_| ())?;
                }
                Ok::<(), storebridge::StoreBridgeError>(())
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    // Every connect after the first is preceded by the close of the previous client
    let mut live = 0;
    for event in store.events() {
        if event.starts_with("connect:") {
            assert_eq!(live, 0, "connect while another client was live: {:?}", store.events());
            live += 1;
        } else if event.starts_with("close:") {
            assert_eq!(live, 1);
            live -= 1;
        }
    }
    assert_eq!(live, 1);
    assert_eq!(
        store.connects.load(Ordering::SeqCst) - store.closes.load(Ordering::SeqCst),
        1
    );
    assert!(manager.is_connected());
}

#[test]
fn test_acquire_cache() {
    let store = FakeStore::new();
    let manager = store.manager();

    let err = manager.acquire_cache("DEFAULT").err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Fatal);

    manager.ensure_connection(Some("a.toml")).unwrap();
    let cache = manager.acquire_cache("DEFAULT").unwrap();
    assert_eq!(cache.name(), "DEFAULT");

    store.missing_caches.lock().push("ghost".to_string());
    let err = manager.acquire_cache("ghost").err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Fatal);
    assert!(err.to_string().contains("ghost"));
}
