mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use serde_json::{json, Value};
use tokio::sync::Notify;

use common::*;
use eventlens_core::error::IngestError;
use eventlens_core::event::ProcessingStatus;
use eventlens_ingest::{run_channel, PipelineConfig, Stage, Upload};

fn records(count: usize) -> Value {
    Value::Array(
        (0..count)
            .map(|i| record(&format!("evt-{i}"), i as i64, None))
            .collect(),
    )
}

#[tokio::test]
async fn test_mixed_enrichment_outcomes_end_to_end() {
    let h = Harness::simple(
        FakeExtractor::returning(json!([
            record("e1", 0, Some("81.2.69.142")),
            record("e2", 1, Some("10.0.0.1")),
            record("e3", 2, None),
        ])),
        FakeEnricher::with(&[
            ("81.2.69.142", Reply::Ok(located(Some(0.9)))),
            ("10.0.0.1", Reply::Fail),
        ]),
    );

    let (control, handle) = run_channel();
    let outcome = h
        .pipeline
        .run(upload("export.json"), control)
        .await
        .expect("run succeeds");

    assert_eq!(outcome.processed_events, 3);
    assert_eq!(outcome.enriched_events, 1);

    let stored = h.store.stored_events();
    let ids: Vec<_> = stored.iter().map(|e| e.event_id.as_str()).collect();
    assert_eq!(ids, ["e1", "e2", "e3"]);
    let flags: Vec<_> = stored.iter().map(|e| e.is_enriched).collect();
    assert_eq!(flags, [true, false, false]);

    assert_eq!(stored[0].country.as_deref(), Some("PL"));
    assert_eq!(stored[0].organization.as_deref(), Some("Example Telecom"));
    assert!((stored[0].enrichment_confidence - 0.9).abs() < f64::EPSILON);
    for unenriched in &stored[1..] {
        assert_eq!(unenriched.country, None);
        assert_eq!(unenriched.city, None);
        assert_eq!(unenriched.enrichment_confidence, 0.0);
    }
    assert_eq!(stored[0].event_properties["path"], "/pricing");

    // No IP, no lookup.
    assert_eq!(h.enricher.total_calls(), 2);

    let sources = h.store.stored_sources();
    assert_eq!(sources.len(), 1);
    let source = &sources[0].source;
    assert_eq!(source.name, "export");
    assert_eq!(source.source_type, "amplitude_export");
    assert_eq!(source.file_url, "memory://uploads/export.json");
    assert_eq!(source.total_events, 3);
    assert_eq!(source.processed_events, 3);
    assert_eq!(source.enriched_events, 1);
    assert_eq!(source.processing_status, ProcessingStatus::Completed);

    let snapshot = handle.snapshot();
    assert_eq!(snapshot.stage, Stage::Completed);
    assert_eq!(snapshot.progress_percent, 100);
    assert_eq!(snapshot.total_events, Some(3));
    assert_eq!(snapshot.enriched_events, Some(1));
    assert_eq!(snapshot.data_source_id.as_deref(), Some(sources[0].id.as_str()));
    assert!(snapshot.error.is_none());
}

#[tokio::test]
async fn test_single_object_output_is_one_event() {
    let h = Harness::simple(
        FakeExtractor::returning(record("only", 0, None)),
        FakeEnricher::default(),
    );
    let (control, _handle) = run_channel();
    let outcome = h
        .pipeline
        .run(upload("one.json"), control)
        .await
        .expect("run succeeds");

    assert_eq!(outcome.data_source.source.total_events, 1);
    assert_eq!(h.store.stored_events().len(), 1);
}

#[tokio::test]
async fn test_empty_extraction_completes_with_empty_summary() {
    let h = Harness::simple(FakeExtractor::returning(json!([])), FakeEnricher::default());
    let (control, _handle) = run_channel();
    let outcome = h
        .pipeline
        .run(upload("empty.jsonl"), control)
        .await
        .expect("run succeeds");

    let source = &outcome.data_source.source;
    assert_eq!(source.total_events, 0);
    assert_eq!(source.date_range_start, None);
    assert_eq!(source.date_range_end, None);
    assert!(h.store.batch_sizes.lock().expect("lock").is_empty());
}

#[tokio::test]
async fn test_second_batch_failure_reports_written_count() {
    let h = Harness::new(
        FakeFileStore::default(),
        FakeExtractor::returning(records(100)),
        FakeEnricher::default(),
        MemoryStore::failing_after(1),
        PipelineConfig {
            batch_size: 50,
            ..PipelineConfig::default()
        },
    );

    let (control, handle) = run_channel();
    let err = h
        .pipeline
        .run(upload("big.json"), control)
        .await
        .expect_err("second batch fails");

    match &err {
        IngestError::Persistence { written, message } => {
            assert_eq!(*written, 50);
            assert!(message.contains("connection reset"));
        }
        other => panic!("expected persistence error, got {other:?}"),
    }
    // First batch stays committed; no summary for a failed run.
    assert_eq!(h.store.stored_events().len(), 50);
    assert!(h.store.stored_sources().is_empty());

    let snapshot = handle.snapshot();
    assert_eq!(snapshot.stage, Stage::Failed);
    let report = snapshot.error.expect("error report");
    assert_eq!(report.kind, "persistence_error");
    assert_eq!(report.events_written, Some(50));
}

#[tokio::test]
async fn test_storage_failure_stops_before_extraction() {
    let h = Harness::new(
        FakeFileStore {
            fail: true,
            ..FakeFileStore::default()
        },
        FakeExtractor::returning(records(3)),
        FakeEnricher::default(),
        MemoryStore::default(),
        PipelineConfig::default(),
    );

    let (control, handle) = run_channel();
    let err = h
        .pipeline
        .run(upload("export.json"), control)
        .await
        .expect_err("storage fails");

    assert!(matches!(err, IngestError::Storage(ref m) if m.contains("bucket unavailable")));
    assert_eq!(h.extractor.calls.load(Ordering::SeqCst), 0);
    assert!(h.store.stored_events().is_empty());
    assert!(h.store.stored_sources().is_empty());
    assert_eq!(handle.snapshot().error.expect("report").kind, "storage_error");
}

#[tokio::test(start_paused = true)]
async fn test_storage_timeout_fails_the_run() {
    // The gate is never opened, so `store` parks until the timeout fires.
    let h = Harness::new(
        FakeFileStore {
            gate: Some(Arc::new(Notify::new())),
            ..FakeFileStore::default()
        },
        FakeExtractor::returning(records(2)),
        FakeEnricher::default(),
        MemoryStore::default(),
        PipelineConfig {
            storage_timeout: Duration::from_millis(100),
            ..PipelineConfig::default()
        },
    );

    let (control, handle) = run_channel();
    let err = h
        .pipeline
        .run(upload("parked.json"), control)
        .await
        .expect_err("storage times out");

    assert_eq!(err, IngestError::Storage("storage timed out after 100ms".to_string()));
    assert_eq!(h.extractor.calls.load(Ordering::SeqCst), 0);
    assert!(h.store.stored_sources().is_empty());

    let snapshot = handle.snapshot();
    assert_eq!(snapshot.stage, Stage::Failed);
    assert_eq!(snapshot.progress_percent, 25);
    assert_eq!(snapshot.file_url, None);
}

#[tokio::test]
async fn test_extraction_error_surfaces_service_details() {
    let h = Harness::simple(
        FakeExtractor::failing("row 7: unparseable timestamp"),
        FakeEnricher::default(),
    );
    let (control, handle) = run_channel();
    let err = h
        .pipeline
        .run(upload("broken.csv"), control)
        .await
        .expect_err("extraction fails");

    assert_eq!(err.to_string(), "row 7: unparseable timestamp");
    assert_eq!(h.enricher.total_calls(), 0);
    assert!(h.store.stored_events().is_empty());
    assert!(h.store.stored_sources().is_empty());

    let snapshot = handle.snapshot();
    assert_eq!(snapshot.stage, Stage::Failed);
    // Reached Extracting before failing.
    assert_eq!(snapshot.progress_percent, 50);
}

#[tokio::test]
async fn test_invalid_record_fails_extraction() {
    let h = Harness::simple(
        FakeExtractor::returning(json!([
            record("ok", 0, None),
            { "event_id": "bad", "timestamp": "2024-03-01T09:00:00Z" }
        ])),
        FakeEnricher::default(),
    );
    let (control, _handle) = run_channel();
    let err = h
        .pipeline
        .run(upload("export.json"), control)
        .await
        .expect_err("missing event_type");

    assert_eq!(err.code(), "extraction_error");
    assert!(err.to_string().starts_with("record 1"));
    assert!(h.store.stored_events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_extraction_timeout_fails_the_run() {
    let mut extractor = FakeExtractor::returning(records(2));
    extractor.delay = Some(Duration::from_secs(600));
    let h = Harness::new(
        FakeFileStore::default(),
        extractor,
        FakeEnricher::default(),
        MemoryStore::default(),
        PipelineConfig {
            extraction_timeout: Duration::from_secs(5),
            ..PipelineConfig::default()
        },
    );

    let (control, _handle) = run_channel();
    let err = h
        .pipeline
        .run(upload("slow.json"), control)
        .await
        .expect_err("extraction times out");

    assert_eq!(err.code(), "extraction_error");
    assert!(err.to_string().contains("timed out"));
}

#[tokio::test]
async fn test_out_of_order_timestamps_use_min_and_max() {
    let h = Harness::simple(
        FakeExtractor::returning(json!([
            record("b", 30, None),
            record("a", 0, None),
            record("c", 90, None),
        ])),
        FakeEnricher::default(),
    );
    let (control, _handle) = run_channel();
    let outcome = h
        .pipeline
        .run(upload("shuffled.json"), control)
        .await
        .expect("run succeeds");

    let source = &outcome.data_source.source;
    assert_eq!(source.date_range_start, Some(base_time()));
    assert_eq!(
        source.date_range_end,
        Some(base_time() + ChronoDuration::minutes(90))
    );
    // Storage order is extraction order.
    let ids: Vec<_> = h
        .store
        .stored_events()
        .into_iter()
        .map(|e| e.event_id)
        .collect();
    assert_eq!(ids, ["b", "a", "c"]);
}

#[tokio::test]
async fn test_explicit_source_name_is_trimmed() {
    let h = Harness::simple(FakeExtractor::returning(records(1)), FakeEnricher::default());
    let (control, _handle) = run_channel();
    let outcome = h
        .pipeline
        .run(
            Upload {
                file_name: "amplitude_2024_03.json".to_string(),
                bytes: b"{}".to_vec(),
                source_name: Some("  March export ".to_string()),
            },
            control,
        )
        .await
        .expect("run succeeds");

    assert_eq!(outcome.data_source.source.name, "March export");
}

fn gated_harness(gate: Arc<Notify>) -> Harness {
    Harness::new(
        FakeFileStore {
            gate: Some(gate),
            ..FakeFileStore::default()
        },
        FakeExtractor::returning(records(3)),
        FakeEnricher::default(),
        MemoryStore::default(),
        PipelineConfig::default(),
    )
}

#[tokio::test]
async fn test_concurrent_run_is_rejected() {
    let gate = Arc::new(Notify::new());
    let h = gated_harness(gate.clone());

    let mut first = h
        .pipeline
        .start(upload("first.json"))
        .expect("first run starts");
    first
        .subscribe()
        .wait_for(|s| s.stage == Stage::Uploading)
        .await
        .expect("run reaches upload");
    assert!(h.pipeline.is_active());

    let err = h
        .pipeline
        .start(upload("second.json"))
        .expect_err("second run rejected");
    assert_eq!(err, IngestError::Busy);
    let (control, _handle) = run_channel();
    let err = h
        .pipeline
        .run(upload("third.json"), control)
        .await
        .expect_err("inline run rejected");
    assert_eq!(err, IngestError::Busy);

    gate.notify_one();
    let done = first.wait().await;
    assert_eq!(done.stage, Stage::Completed);
    assert_eq!(h.storage.calls.load(Ordering::SeqCst), 1);

    while h.pipeline.is_active() {
        tokio::task::yield_now().await;
    }
    gate.notify_one();
    let mut again = h
        .pipeline
        .start(upload("again.json"))
        .expect("pipeline free again");
    assert_eq!(again.wait().await.stage, Stage::Completed);
}

#[tokio::test]
async fn test_cancel_takes_effect_at_next_stage() {
    let gate = Arc::new(Notify::new());
    let h = gated_harness(gate.clone());

    let mut handle = h
        .pipeline
        .start(upload("export.json"))
        .expect("run starts");
    let uploading = handle
        .subscribe()
        .wait_for(|s| s.stage == Stage::Uploading)
        .await
        .expect("run reaches upload")
        .clone();
    assert_eq!(uploading.progress_percent, 25);
    assert_eq!(uploading.file_name.as_deref(), Some("export.json"));

    handle.cancel();
    gate.notify_one();

    let done = handle.wait().await;
    assert_eq!(done.stage, Stage::Failed);
    assert_eq!(done.error.expect("report").kind, "cancelled");
    // The in-flight upload finished; nothing after it ran.
    assert_eq!(done.file_url.as_deref(), Some("memory://uploads/export.json"));
    assert_eq!(h.extractor.calls.load(Ordering::SeqCst), 0);
    assert!(h.store.stored_events().is_empty());
    assert!(h.store.stored_sources().is_empty());
}

#[tokio::test]
async fn test_progress_never_decreases() {
    let h = Harness::simple(FakeExtractor::returning(records(5)), FakeEnricher::default());
    let mut handle = h
        .pipeline
        .start(upload("export.json"))
        .expect("run starts");

    let mut rx = handle.subscribe();
    let mut seen = vec![rx.borrow_and_update().progress_percent];
    while rx.changed().await.is_ok() {
        let snapshot = rx.borrow_and_update().clone();
        seen.push(snapshot.progress_percent);
        if snapshot.stage.is_terminal() {
            break;
        }
    }

    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "progress went backwards: {seen:?}");
    assert!(seen.iter().all(|p| [0, 25, 50, 75, 100].contains(p)));
    assert_eq!(handle.wait().await.progress_percent, 100);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_enrichment_stops_before_any_batch() {
    let slow = |ms| Reply::Slow(Duration::from_millis(ms), located(Some(0.9)));
    let h = Harness::simple(
        FakeExtractor::returning(json!([
            record("a", 0, Some("10.0.0.1")),
            record("b", 1, Some("10.0.0.2")),
        ])),
        FakeEnricher::with(&[("10.0.0.1", slow(2_000)), ("10.0.0.2", slow(3_000))]),
    );

    let mut handle = h
        .pipeline
        .start(upload("export.json"))
        .expect("run starts");
    handle
        .subscribe()
        .wait_for(|s| s.stage == Stage::Enriching)
        .await
        .expect("run reaches enrichment");
    handle.cancel();

    let done = handle.wait().await;
    assert_eq!(done.stage, Stage::Failed);
    assert_eq!(done.error.expect("report").kind, "cancelled");
    assert_eq!(done.progress_percent, 75);
    // Enrichment already under way ran to completion.
    assert_eq!(h.enricher.total_calls(), 2);
    assert_eq!(done.enriched_events, Some(2));
    assert!(h.store.batch_sizes.lock().expect("batch lock").is_empty());
    assert!(h.store.stored_events().is_empty());
    assert!(h.store.stored_sources().is_empty());
}
