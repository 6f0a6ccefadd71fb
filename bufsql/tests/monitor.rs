//! Integration tests for the monitor loop

use std::fs;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use bufsql::{BufferStore, IngestionCycle, MemoryStore, Monitor, Uploader};
use tempfile::tempdir;

/// The loop keeps cycling until the flag drops, then returns the total
#[test]
fn test_runs_until_stopped() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("buffer.txt");
    fs::write(&path, "state:on\nstate:off\n").unwrap();

    let store = MemoryStore::new();
    let buffer = BufferStore::open(&path).unwrap();
    let cycle = IngestionCycle::new(buffer, store.clone(), Uploader::default(), 1);
    let mut monitor = Monitor::new(cycle, Duration::from_millis(10));
    let running = monitor.running();

    let mut reports = Vec::new();
    let total = monitor
        .run_with(|report| {
            reports.push(*report);
            if reports.len() == 1 {
                // The producer appends while the first cycle is reported.
                fs::write(&path, "state:idle\n").unwrap();
            }
            if reports.len() == 3 {
                running.store(false, Ordering::SeqCst);
            }
        })
        .unwrap();

    assert_eq!(total, 3);
    assert_eq!(reports.len(), 3);
    assert_eq!(reports[0].committed, 2);
    assert_eq!(reports[1].committed, 1);
    assert_eq!(reports[2].committed, 0);
    assert_eq!(store.committed().len(), 3);
}

/// A stop request is honoured during the sleep, not after the full interval
#[test]
fn test_stop_interrupts_sleep() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("buffer.txt");
    fs::write(&path, "").unwrap();

    let buffer = BufferStore::open(&path).unwrap();
    let cycle = IngestionCycle::new(buffer, MemoryStore::new(), Uploader::default(), 1);
    let mut monitor = Monitor::new(cycle, Duration::from_secs(30));
    let running = monitor.running();

    let stopper = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(100));
        running.store(false, Ordering::SeqCst);
    });

    let started = Instant::now();
    let total = monitor.run().unwrap();
    stopper.join().unwrap();

    assert_eq!(total, 0);
    assert!(started.elapsed() < Duration::from_secs(5));
}

/// A fatal store error ends the loop with that error
#[test]
fn test_fatal_error_stops_loop() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("buffer.txt");
    fs::write(&path, "state:on\n").unwrap();

    let store = MemoryStore::new();
    store.disconnect();
    let buffer = BufferStore::open(&path).unwrap();
    let cycle = IngestionCycle::new(buffer, store, Uploader::default(), 1);
    let mut monitor = Monitor::new(cycle, Duration::from_millis(10));

    assert!(monitor.run_with(|_| {}).is_err());
    assert_eq!(fs::read_to_string(&path).unwrap(), "state:on\n");
}

/// A rejected commit is not fatal: the loop keeps going and the lines land later
#[test]
fn test_rejected_commit_keeps_loop_running() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("buffer.txt");
    fs::write(&path, "state:on\n").unwrap();

    let store = MemoryStore::new();
    store.reject_commits(true);
    let buffer = BufferStore::open(&path).unwrap();
    let cycle = IngestionCycle::new(buffer, store.clone(), Uploader::default(), 1);
    let mut monitor = Monitor::new(cycle, Duration::from_millis(10));
    let running = monitor.running();

    let mut reports = Vec::new();
    let total = monitor
        .run_with(|report| {
            reports.push(*report);
            if reports.len() == 1 {
                store.reject_commits(false);
            }
            if reports.len() == 2 {
                running.store(false, Ordering::SeqCst);
            }
        })
        .unwrap();

    assert_eq!(total, 1);
    assert_eq!(reports[0].committed, 0);
    assert_eq!(reports[1].committed, 1);
    assert_eq!(fs::read_to_string(&path).unwrap(), "");
}
