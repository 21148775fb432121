//! Integration tests for logd-storage
//!
//! These tests exercise ordering, pagination, retention and isolation
//! across logs through the public store API.

use chrono::{TimeZone, Utc};
use logd_core::{Direction, EventId, EventWithCursors};
use logd_storage::{LogStore, RetentionPolicy, Store, StoreConfig};
use tempfile::TempDir;

fn open_store(retention: RetentionPolicy) -> (Store, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let config = StoreConfig::new(temp_dir.path().join("logs").join("events.redb"))
        .with_sync_on_write(false)
        .with_retention(retention);
    (Store::open(config).unwrap(), temp_dir)
}

fn fill(log: &LogStore, count: usize) -> Vec<EventId> {
    (0..count)
        .map(|i| {
            log.add_event(Utc::now(), format!("event {}", i).as_bytes())
                .unwrap()
        })
        .collect()
}

fn ids(page: &[EventWithCursors]) -> Vec<EventId> {
    page.iter().map(|e| e.event.id).collect()
}

// ============================================================================
// Ordering
// ============================================================================

#[test]
fn test_full_read_is_ascending() {
    let (store, _temp) = open_store(RetentionPolicy::default());
    let log = store.log("web");
    let written = fill(&log, 50);

    let page = log.get_events(None, 50, Direction::Backward, None).unwrap();
    assert_eq!(ids(&page), written);
    assert!(ids(&page).windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_event_fields_survive_storage() {
    let (store, _temp) = open_store(RetentionPolicy::default());
    let log = store.log("api:err");
    let timestamp = Utc.with_ymd_and_hms(2023, 11, 2, 3, 4, 5).unwrap()
        + chrono::Duration::nanoseconds(987_654_321);
    let id = log.add_event(timestamp, b"panic: nil map").unwrap();

    let event = log.get_last_event().unwrap().unwrap();
    assert_eq!(event.id, id);
    assert_eq!(event.log, "api:err");
    assert_eq!(event.timestamp, timestamp);
    assert_eq!(&event.message[..], b"panic: nil map");
}

// ============================================================================
// Pagination
// ============================================================================

#[test]
fn test_backward_pagination_is_complete() {
    let (store, _temp) = open_store(RetentionPolicy::default());
    let log = store.log("web");
    let written = fill(&log, 23);

    let mut seen = Vec::new();
    let mut cursor: Option<EventId> = None;
    loop {
        let page = log
            .get_events(cursor.as_ref(), 5, Direction::Backward, None)
            .unwrap();
        let Some(first) = page.first() else {
            break;
        };
        cursor = Some(first.prev_cursor.id);
        let mut page_ids = ids(&page);
        page_ids.extend(seen);
        seen = page_ids;
    }

    assert_eq!(seen, written);
}

#[test]
fn test_forward_pagination_is_complete() {
    let (store, _temp) = open_store(RetentionPolicy::default());
    let log = store.log("web");
    let written = fill(&log, 17);

    let mut seen = Vec::new();
    let mut cursor: Option<EventId> = None;
    loop {
        let page = log
            .get_events(cursor.as_ref(), 4, Direction::Forward, None)
            .unwrap();
        let Some(last) = page.last() else {
            break;
        };
        cursor = Some(last.next_cursor.id);
        seen.extend(ids(&page));
    }

    assert_eq!(seen, written);
}

#[test]
fn test_most_recent_page_then_older() {
    let (store, _temp) = open_store(RetentionPolicy::default());
    let log = store.log("web");
    let written = fill(&log, 5);

    let newest = log.get_events(None, 2, Direction::Backward, None).unwrap();
    assert_eq!(ids(&newest), written[3..]);

    let older = log
        .get_events(
            Some(&newest[0].prev_cursor.id),
            2,
            Direction::Backward,
            None,
        )
        .unwrap();
    assert_eq!(ids(&older), written[1..3]);
}

#[test]
fn test_cursor_at_evicted_event_still_resumes() {
    let (store, _temp) = open_store(RetentionPolicy::new(5));
    let log = store.log("web");
    let written = fill(&log, 10);

    // written[2] is evicted below; it remains a valid scan position
    let stale = written[2];
    assert_eq!(log.remove_old_events().unwrap(), 5);

    let forward = log
        .get_events(Some(&stale), 100, Direction::Forward, None)
        .unwrap();
    assert_eq!(ids(&forward), written[5..]);

    let backward = log
        .get_events(Some(&stale), 100, Direction::Backward, None)
        .unwrap();
    assert!(backward.is_empty());
}

// ============================================================================
// Retention
// ============================================================================

#[test]
fn test_eviction_keeps_newest_events() {
    let (store, _temp) = open_store(RetentionPolicy::new(5000));
    let log = store.log("web");
    let written = fill(&log, 6000);

    assert_eq!(log.remove_old_events().unwrap(), 1000);
    assert_eq!(log.count_events().unwrap(), 5000);

    let remaining = log
        .get_events(None, 6000, Direction::Forward, None)
        .unwrap();
    assert_eq!(ids(&remaining), written[1000..]);

    // A second pass has nothing left to do
    assert_eq!(log.remove_old_events().unwrap(), 0);
}

#[test]
fn test_eviction_is_per_log() {
    let (store, _temp) = open_store(RetentionPolicy::new(3));
    let big = store.log("big");
    let small = store.log("small");
    fill(&big, 8);
    fill(&small, 2);

    assert_eq!(big.remove_old_events().unwrap(), 5);
    assert_eq!(small.remove_old_events().unwrap(), 0);
    assert_eq!(big.count_events().unwrap(), 3);
    assert_eq!(small.count_events().unwrap(), 2);
}

#[test]
fn test_eviction_at_exact_cap() {
    let (store, _temp) = open_store(RetentionPolicy::new(3));
    let log = store.log("web");
    fill(&log, 3);
    assert_eq!(log.remove_old_events().unwrap(), 0);
    assert_eq!(log.count_events().unwrap(), 3);

    fill(&log, 1);
    assert_eq!(log.remove_old_events().unwrap(), 1);
    assert_eq!(log.count_events().unwrap(), 3);
}

// ============================================================================
// Isolation
// ============================================================================

#[test]
fn test_prefix_names_do_not_leak() {
    let (store, _temp) = open_store(RetentionPolicy::default());
    let a = store.log("a");
    let ab = store.log("ab");
    let b = store.log("b");
    let a_ids = fill(&a, 3);
    let ab_ids = fill(&ab, 4);
    fill(&b, 2);

    let a_events = a.get_events(None, 100, Direction::Forward, None).unwrap();
    assert_eq!(ids(&a_events), a_ids);
    assert!(a_events.iter().all(|e| e.event.log == "a"));

    let ab_events = ab.get_events(None, 100, Direction::Backward, None).unwrap();
    assert_eq!(ids(&ab_events), ab_ids);

    a.clear_events().unwrap();
    assert_eq!(ab.count_events().unwrap(), 4);
    assert_eq!(b.count_events().unwrap(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_appends_to_different_logs() {
    let (store, _temp) = open_store(RetentionPolicy::default());

    let handles: Vec<_> = (0..4)
        .map(|n| {
            let log = store.log(format!("worker-{}", n));
            tokio::task::spawn_blocking(move || fill(&log, 200))
        })
        .collect();

    for (n, handle) in handles.into_iter().enumerate() {
        let written = handle.await.unwrap();
        let log = store.log(format!("worker-{}", n));
        let stored = log.get_events(None, 1000, Direction::Forward, None).unwrap();
        assert_eq!(ids(&stored), written);
    }

    assert_eq!(store.log_names().unwrap().len(), 4);
}
