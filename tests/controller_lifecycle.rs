mod common;

use std::time::{Duration, Instant};

use serde_json::json;

use common::{interval, wait_until, FakeAnalysis, FakeCapture, Harness};
use meadow_lib::config::{AppDirs, ConfigStore};
use meadow_lib::monitor::{
    Collaborators, ControllerOptions, DisplayState, MonitorController, MonitoringState,
};
use meadow_lib::MonitorError;

#[tokio::test(flavor = "multi_thread")]
async fn start_and_stop_are_idempotent() {
    let h = Harness::new(interval(60.0));
    let controller = &h.controller;

    assert!(controller.start().await.unwrap());
    assert!(!controller.start().await.unwrap());
    assert_eq!(controller.state(), MonitoringState::Running);
    assert_eq!(controller.cycles_launched(), 1);
    assert_eq!(controller.active_cycles(), 1);
    assert_eq!(*controller.display().borrow(), DisplayState::Active);

    assert!(controller.stop().await);
    assert!(!controller.stop().await);
    assert_eq!(controller.state(), MonitoringState::Stopped);
    h.settle().await;
    assert_eq!(*controller.display().borrow(), DisplayState::Idle);
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_interrupts_a_long_sleep() {
    let h = Harness::new(interval(60.0));
    h.controller.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let stopped_at = Instant::now();
    h.controller.stop().await;
    h.settle().await;

    assert!(stopped_at.elapsed() < Duration::from_secs(2));
    assert_eq!(h.capture.probe.calls(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn start_after_stop_launches_a_fresh_cycle() {
    let h = Harness::new(interval(60.0));
    h.controller.start().await.unwrap();
    h.controller.stop().await;
    assert!(h.controller.start().await.unwrap());

    assert_eq!(h.controller.cycles_launched(), 2);
    assert_eq!(h.controller.active_cycles(), 1);
    h.controller.shutdown().await;
    assert_eq!(h.controller.active_cycles(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn background_cycle_logs_every_iteration() {
    let h = Harness::new(interval(0.03));
    h.controller.start().await.unwrap();

    assert!(wait_until(Duration::from_secs(3), || h.capture.probe.calls() >= 3).await);
    h.controller.stop().await;
    h.settle().await;

    let entries = h.log_entries();
    assert_eq!(entries.len(), h.capture.successes());
    assert!(entries.iter().all(|entry| entry["origin"] == "background"));
    assert_eq!(h.capture.probe.max_in_flight(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_iteration_does_not_stop_the_cycle() {
    let h = Harness::with_fakes(
        interval(0.02),
        FakeCapture::failing_on([3]),
        FakeAnalysis::default(),
    );
    let mut events = h.controller.subscribe();
    h.controller.start().await.unwrap();

    assert!(wait_until(Duration::from_secs(3), || h.capture.probe.calls() >= 5).await);
    assert_eq!(h.controller.state(), MonitoringState::Running);
    h.controller.stop().await;
    h.settle().await;

    let calls = h.capture.probe.calls();
    assert_eq!(h.log_entries().len(), calls - 1);

    let mut failures = 0;
    while let Ok(event) = events.try_recv() {
        if let meadow_lib::monitor::MonitorEvent::IterationFailed { stage, .. } = event {
            assert_eq!(stage, "capture");
            failures += 1;
        }
    }
    assert_eq!(failures, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn one_offs_run_alongside_the_cycle() {
    let h = Harness::with_fakes(
        interval(0.02),
        FakeCapture::default().with_delay(Duration::from_millis(15)),
        FakeAnalysis::default(),
    );
    h.controller.start().await.unwrap();

    let (a, b, c) = tokio::join!(
        h.controller.analyze_once(),
        h.controller.analyze_once(),
        h.controller.analyze_once(),
    );
    a.unwrap();
    b.unwrap();
    c.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    h.controller.stop().await;
    h.settle().await;

    let entries = h.log_entries();
    let one_off = entries
        .iter()
        .filter(|entry| entry["origin"] == "one_off")
        .count();
    let background = entries.len() - one_off;

    assert_eq!(one_off, 3);
    assert!(background >= 1);
    assert_eq!(entries.len(), h.capture.probe.calls());
    // The cycle never stopped for the one-offs.
    assert_eq!(h.controller.cycles_launched(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_config_is_fatal_and_actionable() {
    let dir = tempfile::tempdir().unwrap();
    let dirs = AppDirs::new(dir.path().to_path_buf());
    let store = ConfigStore::new(dirs.config_file());

    let err = MonitorController::new(
        store,
        dirs.clone(),
        Collaborators::from_config(&Default::default()),
        ControllerOptions::default(),
    )
    .err()
    .unwrap();

    assert!(matches!(err, MonitorError::ConfigMissing { .. }));
    assert!(err.to_string().contains("web viewer"));
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_one_off_shows_error_until_next_action() {
    let h = Harness::with_fakes(
        interval(60.0),
        FakeCapture::failing_on([1]),
        FakeAnalysis::default(),
    );
    let display = h.controller.display();

    let err = h.controller.analyze_once().await.unwrap_err();
    assert!(matches!(err, MonitorError::Capture(_)));
    assert_eq!(h.controller.state(), MonitoringState::Stopped);
    match &*display.borrow() {
        DisplayState::Error(message) => assert!(message.contains("simulated capture failure")),
        other => panic!("expected error display, got {other:?}"),
    }

    h.controller.analyze_once().await.unwrap();
    assert_eq!(*display.borrow(), DisplayState::Idle);
    assert_eq!(h.log_entries().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn post_process_failure_leaves_entry_pending_for_reprocessing() {
    let h = Harness::with_fakes(
        json!({}),
        FakeCapture::default(),
        FakeAnalysis::with_summary("Consensus under partitions"),
    );
    h.write_config(json!({ "interval_seconds": 60, "notes_dir": h.notes_dir() }));
    assert!(h.controller.check_config_drift().await.unwrap());

    h.notes.set_failing(true);
    let err = h.controller.analyze_once().await.unwrap_err();
    assert!(matches!(err, MonitorError::PostProcess(_)));

    let entries = h.log_entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["notes"], "pending");

    h.notes.set_failing(false);
    let summary = h.controller.process_missing_logs().await.unwrap();
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(h.log_entries()[0]["notes"], "written");

    let summary = h.controller.process_missing_logs().await.unwrap();
    assert_eq!(summary.processed, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn successful_sequence_marks_notes_written() {
    let h = Harness::with_fakes(
        json!({}),
        FakeCapture::default(),
        FakeAnalysis::with_summary("Rust pinning"),
    );
    h.write_config(json!({ "notes_dir": h.notes_dir() }));
    h.controller.check_config_drift().await.unwrap();

    let entry = h.controller.analyze_once().await.unwrap();
    assert_eq!(entry.notes, meadow_lib::storage::NotesStatus::Written);
    assert_eq!(h.notes.written(), 1);

    assert_eq!(h.controller.generate_notes().await.unwrap(), 1);
    let snapshot = h.controller.metrics().get_snapshot().await;
    assert_eq!(snapshot.sequence_count, 1);
    assert_eq!(snapshot.notes_count, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn generate_notes_without_notes_dir_reports_missing_setting() {
    let h = Harness::new(interval(60.0));
    let err = h.controller.generate_notes().await.unwrap_err();
    assert!(matches!(err, MonitorError::MissingSetting { key: "notes_dir" }));
    assert!(matches!(*h.controller.display().borrow(), DisplayState::Error(_)));
    assert_eq!(h.notes.synth_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn status_reports_interval_and_cycles() {
    let h = Harness::new(interval(2.5));
    h.controller.start().await.unwrap();

    let status = h.controller.status();
    assert_eq!(status.state, MonitoringState::Running);
    assert_eq!(status.interval_ms, 2500);
    assert_eq!(status.label, "👁️");
    assert_eq!(status.active_cycles, 1);

    h.controller.shutdown().await;
    assert_eq!(h.controller.status().label, "📸");
}
