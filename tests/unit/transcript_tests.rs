//! Unit tests for the quiescence-based transcript reader.
//!
//! The reader is driven through a plain channel so that timing is under the
//! test's control. Margins are generous; these use the real clock.

use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use z5bot::interpreter::transcript::{spawn_output_pump, OUTPUT_CHANNEL_CAPACITY};
use z5bot::interpreter::TranscriptReader;
use z5bot::models::key::SessionKey;
use z5bot::models::reply::CompletionReason;

fn reader(idle_ms: u64, max_bytes: usize) -> (mpsc::Sender<Bytes>, TranscriptReader) {
    let (tx, rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);
    (
        tx,
        TranscriptReader::new(rx, Duration::from_millis(idle_ms), max_bytes),
    )
}

#[tokio::test]
async fn quiet_output_completes_reply() {
    let (tx, mut reader) = reader(100, 1024);
    tx.send(Bytes::from_static(b"West of House\r\n>")).await.expect("send");

    let reply = reader.read_reply(Duration::from_secs(3)).await;

    assert_eq!(reply.reason, CompletionReason::Complete);
    assert_eq!(reply.text, "West of House\n>");
    assert!(!reply.truncated);
}

#[tokio::test]
async fn bursts_closer_than_window_form_one_reply() {
    let (tx, mut reader) = reader(300, 1024);
    tokio::spawn(async move {
        tx.send(Bytes::from_static(b"first ")).await.expect("send");
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(Bytes::from_static(b"second")).await.expect("send");
        tokio::time::sleep(Duration::from_secs(2)).await;
    });

    let reply = reader.read_reply(Duration::from_secs(3)).await;

    assert_eq!(reply.reason, CompletionReason::Complete);
    assert_eq!(reply.text, "first second");
}

#[tokio::test]
async fn gap_longer_than_window_splits_replies() {
    let (tx, mut reader) = reader(100, 1024);
    tokio::spawn(async move {
        tx.send(Bytes::from_static(b"early")).await.expect("send");
        tokio::time::sleep(Duration::from_millis(500)).await;
        tx.send(Bytes::from_static(b"late")).await.expect("send");
        tokio::time::sleep(Duration::from_secs(2)).await;
    });

    let first = reader.read_reply(Duration::from_secs(3)).await;
    assert_eq!(first.reason, CompletionReason::Complete);
    assert_eq!(first.text, "early");

    let second = reader.read_reply(Duration::from_secs(3)).await;
    assert_eq!(second.reason, CompletionReason::Complete);
    assert_eq!(second.text, "late");
}

#[tokio::test]
async fn continuous_output_times_out_at_deadline() {
    let (tx, mut reader) = reader(150, 1 << 20);
    let producer = tokio::spawn(async move {
        for _ in 0..200 {
            if tx.send(Bytes::from_static(b"tick\n")).await.is_err() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    });

    let started = Instant::now();
    let reply = reader.read_reply(Duration::from_millis(600)).await;
    let elapsed = started.elapsed();

    assert_eq!(reply.reason, CompletionReason::TimedOut);
    assert!(reply.text.starts_with("tick\n"));
    assert!(elapsed >= Duration::from_millis(550), "returned early: {elapsed:?}");
    assert!(elapsed < Duration::from_millis(1500), "overran deadline: {elapsed:?}");
    producer.abort();
}

#[tokio::test]
async fn no_output_waits_for_full_timeout() {
    let (_tx, mut reader) = reader(50, 1024);

    let started = Instant::now();
    let reply = reader.read_reply(Duration::from_millis(400)).await;

    assert_eq!(reply.reason, CompletionReason::TimedOut);
    assert!(reply.text.is_empty());
    assert!(started.elapsed() >= Duration::from_millis(350));
}

#[tokio::test]
async fn closed_stream_reports_exit_with_tail() {
    let (tx, mut reader) = reader(100, 1024);
    tx.send(Bytes::from_static(b"Goodbye.\n")).await.expect("send");
    drop(tx);

    let reply = reader.read_reply(Duration::from_secs(3)).await;

    assert_eq!(reply.reason, CompletionReason::ProcessExited);
    assert_eq!(reply.text, "Goodbye.\n");
    assert!(reader.is_closed());

    let again = reader.read_reply(Duration::from_secs(3)).await;
    assert_eq!(again.reason, CompletionReason::ProcessExited);
    assert!(again.text.is_empty());
}

#[tokio::test]
async fn oversized_reply_is_truncated() {
    let (tx, mut reader) = reader(100, 8);
    tx.send(Bytes::from_static(b"0123456789")).await.expect("send");
    tx.send(Bytes::from_static(b"abcdef")).await.expect("send");

    let reply = reader.read_reply(Duration::from_secs(3)).await;

    assert_eq!(reply.text, "01234567");
    assert!(reply.truncated);
    assert_eq!(reply.reason, CompletionReason::Complete);
}

#[tokio::test]
async fn invalid_utf8_is_replaced() {
    let (tx, mut reader) = reader(100, 1024);
    tx.send(Bytes::from_static(&[b'a', 0xFF, b'b'])).await.expect("send");

    let reply = reader.read_reply(Duration::from_secs(3)).await;

    assert_eq!(reply.text, "a\u{FFFD}b");
}

#[tokio::test]
async fn drain_discards_buffered_output() {
    let (tx, mut reader) = reader(100, 1024);
    tx.send(Bytes::from_static(b"stale")).await.expect("send");

    assert_eq!(reader.drain(), 5);
    assert_eq!(reader.drain(), 0);

    tx.send(Bytes::from_static(b"fresh")).await.expect("send");
    let reply = reader.read_reply(Duration::from_secs(3)).await;
    assert_eq!(reply.text, "fresh");
}

#[tokio::test]
async fn output_pump_forwards_until_eof() {
    let (mut writer, read_half) = tokio::io::duplex(64);
    let (tx, rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);
    let pump = spawn_output_pump(
        SessionKey::new("pump"),
        "stdout",
        read_half,
        tx,
        CancellationToken::new(),
    );
    let mut reader = TranscriptReader::new(rx, Duration::from_millis(100), 1024);

    writer.write_all(b"hello").await.expect("write");
    let reply = reader.read_reply(Duration::from_secs(3)).await;
    assert_eq!(reply.text, "hello");
    assert_eq!(reply.reason, CompletionReason::Complete);

    drop(writer);
    let reply = reader.read_reply(Duration::from_secs(3)).await;
    assert_eq!(reply.reason, CompletionReason::ProcessExited);
    pump.await.expect("pump task");
}

#[tokio::test]
async fn output_pump_stops_on_cancel() {
    let (_writer, read_half) = tokio::io::duplex(64);
    let (tx, _rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);
    let cancel = CancellationToken::new();
    let pump = spawn_output_pump(SessionKey::new("pump"), "stderr", read_half, tx, cancel.clone());

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(2), pump)
        .await
        .expect("pump stops after cancel")
        .expect("pump task");
}
