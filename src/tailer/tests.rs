//! Tests for file tailing.

use std::{
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use crossbeam_channel::unbounded;
use rstest::{fixture, rstest};
use tempfile::TempDir;

use super::*;

#[fixture]
fn log_dir() -> TempDir {
    TempDir::new().expect("create temp dir")
}

fn append(path: &Path, data: &str) {
    let mut file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .expect("open for append");
    file.write_all(data.as_bytes()).expect("append data");
}

fn existing_file(dir: &TempDir, contents: &str) -> PathBuf {
    let path = dir.path().join("app.log");
    fs::write(&path, contents).expect("write initial contents");
    path
}

#[rstest]
fn starts_at_end_of_file(log_dir: TempDir) {
    let path = existing_file(&log_dir, "old line\n");
    let mut tail = FileTail::open_at_end(&path).expect("open tail");
    let mut batch = LineBatch::new();

    assert_eq!(tail.poll(&mut batch), TailStatus::Active);
    assert!(batch.take_lines().is_empty());

    append(&path, "hello\nworld\n");
    tail.poll(&mut batch);
    assert_eq!(batch.take_lines(), vec!["hello", "world"]);
}

#[rstest]
fn holds_partial_line_until_completed(log_dir: TempDir) {
    let path = existing_file(&log_dir, "");
    let mut tail = FileTail::open_at_end(&path).expect("open tail");
    let mut batch = LineBatch::new();

    append(&path, "par");
    tail.poll(&mut batch);
    assert!(batch.take_lines().is_empty());

    append(&path, "tial\n");
    tail.poll(&mut batch);
    assert_eq!(batch.take_lines(), vec!["partial"]);
}

#[rstest]
fn truncation_resets_to_new_end(log_dir: TempDir) {
    let path = existing_file(&log_dir, "");
    let mut tail = FileTail::open_at_end(&path).expect("open tail");
    let mut batch = LineBatch::new();

    append(&path, "first line that is long\n");
    tail.poll(&mut batch);
    assert_eq!(batch.take_lines(), vec!["first line that is long"]);

    File::create(&path).expect("truncate file");
    append(&path, "short\n");
    assert_eq!(tail.poll(&mut batch), TailStatus::Active);
    assert!(batch.take_lines().is_empty());
    assert_eq!(tail.offset(), "short\n".len() as u64);

    append(&path, "after\n");
    tail.poll(&mut batch);
    assert_eq!(batch.take_lines(), vec!["after"]);
}

#[cfg(unix)]
#[rstest]
fn follows_replaced_file(log_dir: TempDir) {
    let path = existing_file(&log_dir, "");
    let mut tail = FileTail::open_at_end(&path).expect("open tail");
    let mut batch = LineBatch::new();

    append(&path, "before\n");
    let rotated = log_dir.path().join("app.log.1");
    fs::rename(&path, &rotated).expect("rotate file");
    append(&path, "fresh\n");

    tail.poll(&mut batch);
    assert_eq!(batch.take_lines(), vec!["before", "fresh"]);
}

#[rstest]
fn truncation_discards_pending_partial_line(log_dir: TempDir) {
    let path = existing_file(&log_dir, "");
    let mut tail = FileTail::open_at_end(&path).expect("open tail");
    let mut batch = LineBatch::new();

    append(&path, "stale-partial");
    tail.poll(&mut batch);
    assert!(batch.take_lines().is_empty());

    File::create(&path).expect("truncate file");
    append(&path, "fresh\n");
    tail.poll(&mut batch);
    assert!(batch.take_lines().is_empty());

    append(&path, "next\n");
    tail.poll(&mut batch);
    assert_eq!(batch.take_lines(), vec!["next"]);
}

#[cfg(unix)]
#[rstest]
fn replaced_file_does_not_join_old_partial_line(log_dir: TempDir) {
    let path = existing_file(&log_dir, "");
    let mut tail = FileTail::open_at_end(&path).expect("open tail");
    let mut batch = LineBatch::new();

    append(&path, "stale-partial");
    fs::rename(&path, log_dir.path().join("app.log.1")).expect("rotate file");
    append(&path, "fresh\n");

    tail.poll(&mut batch);
    assert_eq!(batch.take_lines(), vec!["fresh"]);
}

#[rstest]
fn deleted_file_stays_active(log_dir: TempDir) {
    let path = existing_file(&log_dir, "");
    let mut tail = FileTail::open_at_end(&path).expect("open tail");
    fs::remove_file(&path).expect("remove file");
    let mut batch = LineBatch::new();
    assert_eq!(tail.poll(&mut batch), TailStatus::Active);
}

#[rstest]
fn open_missing_file_fails(log_dir: TempDir) {
    let err = FileTail::open_at_end(log_dir.path().join("missing.log")).expect_err("missing");
    assert_eq!(err.kind(), io::ErrorKind::NotFound);
}

#[rstest]
fn lossy_decodes_invalid_utf8(log_dir: TempDir) {
    let path = existing_file(&log_dir, "");
    let mut tail = FileTail::open_at_end(&path).expect("open tail");
    let mut file = OpenOptions::new().append(true).open(&path).expect("open");
    file.write_all(b"bad \xff byte\n").expect("write bytes");
    let mut batch = LineBatch::new();
    tail.poll(&mut batch);
    assert_eq!(batch.take_lines(), vec!["bad \u{fffd} byte"]);
}

#[rstest]
fn handler_sees_data_in_order(log_dir: TempDir) {
    struct Collect(Vec<u8>);
    impl TailHandler for Collect {
        fn on_data(&mut self, data: &[u8]) {
            self.0.extend_from_slice(data);
        }
        fn on_error(&mut self, err: io::Error) {
            panic!("unexpected error: {err}");
        }
    }

    let path = existing_file(&log_dir, "");
    let mut tail = FileTail::open_at_end(&path).expect("open tail");
    let payload = "x".repeat(200_000);
    append(&path, &payload);
    let mut collect = Collect(Vec::new());
    tail.poll(&mut collect);
    assert_eq!(collect.0, payload.as_bytes());
    assert_eq!(tail.offset(), payload.len() as u64);
}

#[rstest]
#[case("reactor", TailMode::Reactor)]
#[case("Threaded", TailMode::Threaded)]
fn parses_tail_mode(#[case] raw: &str, #[case] expected: TailMode) {
    assert_eq!(raw.parse::<TailMode>(), Ok(expected));
}

#[rstest]
fn worker_forwards_batches(log_dir: TempDir) {
    let path = existing_file(&log_dir, "ignored\n");
    let tail = FileTail::open_at_end(&path).expect("open tail");
    let (tx, rx) = unbounded();
    let mut worker = spawn_worker(7, tail, Duration::from_millis(10), tx).expect("spawn worker");

    append(&path, "one\ntwo\n");
    let mut received = Vec::new();
    while received.len() < 2 {
        match rx.recv_timeout(Duration::from_secs(2)).expect("tail event") {
            TailEvent::Lines { id, lines } => {
                assert_eq!(id, 7);
                received.extend(lines);
            }
            TailEvent::Failed { error, .. } => panic!("unexpected failure: {error}"),
        }
    }
    assert_eq!(received, vec!["one", "two"]);
    worker.stop();
}
