//! Syslog listener over a real UDP socket

use std::time::Duration;

use chrono::{TimeZone, Utc};
use logd_collector::{Collector, CollectorConfig, GetEventsInput, SyslogConfig, SyslogListener, SyslogMessage};
use tempfile::TempDir;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_malformed_packets_are_skipped() {
    logd_logging::init_testing();
    let temp_dir = TempDir::new().unwrap();
    let collector = Collector::new(
        CollectorConfig::with_home_dir(temp_dir.path()).with_sync_on_write(false),
    );
    collector.start().await.unwrap();

    let config = SyslogConfig::default().with_bind_addr("127.0.0.1:0".parse().unwrap());
    let listener = SyslogListener::bind(config, collector.clone()).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let cancel = CancellationToken::new();
    let task = tokio::spawn(listener.run(cancel.clone()));

    let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket.send_to(b"this is not syslog", addr).await.unwrap();
    socket
        .send_to(&SyslogMessage::stream_line("web", "debug", at, "dropped").encode(), addr)
        .await
        .unwrap();
    socket
        .send_to(&SyslogMessage::stream_line("web", "out", at, "hello\n").encode(), addr)
        .await
        .unwrap();
    socket
        .send_to(&SyslogMessage::stream_line("db", "db", at, "ready").encode(), addr)
        .await
        .unwrap();

    let mut found = Vec::new();
    for _ in 0..500 {
        found = collector
            .get_events(GetEventsInput::for_logs(["web:out", "db", "web:debug", "web"]))
            .await
            .unwrap()
            .items;
        if found.len() >= 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(found.len(), 2);
    assert_eq!(found[0].log, "web:out");
    assert_eq!(&found[0].message[..], b"hello");
    assert_eq!(found[0].timestamp, at);
    assert_eq!(found[1].log, "db");
    assert_eq!(&found[1].message[..], b"ready");

    // The listener survived the bad packets
    assert!(!task.is_finished());
    cancel.cancel();
    task.await.unwrap().unwrap();
    collector.stop().await.unwrap();
}

#[tokio::test]
async fn test_unstorable_timestamp_is_dropped() {
    logd_logging::init_testing();
    let temp_dir = TempDir::new().unwrap();
    let collector = Collector::new(
        CollectorConfig::with_home_dir(temp_dir.path()).with_sync_on_write(false),
    );
    collector.start().await.unwrap();

    let config = SyslogConfig::default().with_bind_addr("127.0.0.1:0".parse().unwrap());
    let listener = SyslogListener::bind(config, collector.clone()).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let cancel = CancellationToken::new();
    let task = tokio::spawn(listener.run(cancel.clone()));

    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket
        .send_to(b"<14>1 1969-12-31T23:59:59Z - web - out - old", addr)
        .await
        .unwrap();
    let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    socket
        .send_to(&SyslogMessage::stream_line("web", "out", at, "new").encode(), addr)
        .await
        .unwrap();

    let mut found = Vec::new();
    for _ in 0..500 {
        found = collector
            .get_events(GetEventsInput::for_logs(["web:out"]))
            .await
            .unwrap()
            .items;
        if !found.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(found.len(), 1);
    assert_eq!(&found[0].message[..], b"new");
    assert!(!task.is_finished());

    cancel.cancel();
    task.await.unwrap().unwrap();
    collector.stop().await.unwrap();
}
