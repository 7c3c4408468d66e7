//! End-to-end tests for the job pipeline on the local backend.
//!
//! Documents are synthesised with lopdf so the text layer is real; the
//! transformation service is replaced by in-process writers.

mod common;

use common::{
    config_with_concurrency, sample_pdf, unzip, upload, wire, wire_with, FailingWriter,
    RecordingWriter, SlowWriter,
};
use lesson_bundler::{
    ErrorKind, JobProgressCallback, JobState, JobStore, LocalStorage, Stage, Storage,
};
use pretty_assertions::assert_eq;
use std::sync::{Arc, Mutex};

fn local(dir: &std::path::Path) -> Arc<dyn Storage> {
    Arc::new(LocalStorage::new(dir.join("data")).expect("local storage"))
}

// ── Happy path ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn ten_page_document_pages_two_to_four() {
    let tmp = tempfile::tempdir().unwrap();
    let writer = Arc::new(RecordingWriter::default());
    let (service, worker) = wire(tmp.path(), local(tmp.path()), writer.clone());

    let doc_id = upload(&service, &sample_pdf(10)).await;
    let info = service.document_info(&doc_id).await.unwrap();
    assert_eq!(info.page_count, 10);

    let job = service.submit_job(&doc_id, 2, 4).await.unwrap();
    assert_eq!(job.state, JobState::Pending);
    assert!(job.result.is_none());

    let summary = worker.run_once().await.unwrap();
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 0);

    let status = service.job_status(&job.job_id).await.unwrap();
    assert_eq!(status.state, JobState::Succeeded);
    let result = status.result.expect("succeeded job has a result");
    assert_eq!(result.job_id, job.job_id);
    assert_eq!(result.bundle_key, format!("jobs/{}/bundle.zip", job.job_id));
    assert!(status.error.is_none());

    // The writer saw exactly pages 2..=4, in order.
    let inputs = writer.inputs.lock().unwrap();
    assert_eq!(inputs.len(), 1);
    let (text, range) = &inputs[0];
    assert_eq!((range.from_page(), range.to_page()), (2, 4));
    let p2 = text.find("[Page 2]").expect("page 2 marker");
    let p3 = text.find("[Page 3]").expect("page 3 marker");
    let p4 = text.find("[Page 4]").expect("page 4 marker");
    assert!(p2 < p3 && p3 < p4);
    assert!(!text.contains("[Page 1]"));
    assert!(!text.contains("[Page 5]"));
    assert!(text.contains("photosynthesis"));
    drop(inputs);

    let dest = tmp.path().join("out.zip");
    let written = service.download_bundle(&job.job_id, &dest).await.unwrap();
    let archive = std::fs::read(&dest).unwrap();
    assert_eq!(written, archive.len() as u64);

    let entries = unzip(&archive);
    let names: Vec<&str> = entries.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["lesson.txt", "meta.json"]);

    let script = String::from_utf8(entries[0].1.clone()).unwrap();
    assert!(!script.trim().is_empty());
    assert_eq!(script, "Welcome! Today we cover pages 2 to 4.");

    let meta: serde_json::Value = serde_json::from_slice(&entries[1].1).unwrap();
    assert_eq!(meta, serde_json::json!({"from_page": 2, "to_page": 4}));
}

#[tokio::test]
async fn bundle_location_names_a_local_file() {
    let tmp = tempfile::tempdir().unwrap();
    let (service, worker) = wire(
        tmp.path(),
        local(tmp.path()),
        Arc::new(RecordingWriter::default()),
    );
    let doc_id = upload(&service, &sample_pdf(3)).await;
    let job = service.submit_job(&doc_id, 1, 3).await.unwrap();
    worker.run_once().await.unwrap();

    let bundle = service.bundle_location(&job.job_id).await.unwrap();
    assert_eq!(bundle.suggested_file_name(), format!("lesson-{}.zip", job.job_id));
    match bundle.location {
        lesson_bundler::Resolved::Local(path) => assert!(path.is_file()),
        other => panic!("expected a local path, got {other:?}"),
    }
}

#[tokio::test]
async fn single_page_range_is_accepted() {
    let tmp = tempfile::tempdir().unwrap();
    let writer = Arc::new(RecordingWriter::default());
    let (service, worker) = wire(tmp.path(), local(tmp.path()), writer.clone());
    let doc_id = upload(&service, &sample_pdf(5)).await;

    let job = service.submit_job(&doc_id, 5, 5).await.unwrap();
    worker.run_once().await.unwrap();

    let status = service.job_status(&job.job_id).await.unwrap();
    assert_eq!(status.state, JobState::Succeeded);
    let inputs = writer.inputs.lock().unwrap();
    assert!(inputs[0].0.starts_with("[Page 5]"));
}

#[tokio::test]
async fn worker_drains_several_jobs() {
    let tmp = tempfile::tempdir().unwrap();
    let (service, worker) = wire(
        tmp.path(),
        local(tmp.path()),
        Arc::new(RecordingWriter::default()),
    );
    let doc_id = upload(&service, &sample_pdf(6)).await;

    let mut ids = Vec::new();
    for (from, to) in [(1, 2), (3, 4), (5, 6)] {
        ids.push(service.submit_job(&doc_id, from, to).await.unwrap().job_id);
    }

    let summary = worker.run_once().await.unwrap();
    assert_eq!(summary.succeeded, 3);
    assert_eq!(summary.processed(), 3);

    for id in &ids {
        let status = service.job_status(id).await.unwrap();
        assert_eq!(status.state, JobState::Succeeded);
    }
    // Nothing left to do.
    let again = worker.run_once().await.unwrap();
    assert_eq!(again.processed(), 0);
}

// ── Failures ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn transformation_failure_fails_the_job_without_a_bundle() {
    let tmp = tempfile::tempdir().unwrap();
    let storage = local(tmp.path());
    let (service, worker) = wire(tmp.path(), Arc::clone(&storage), Arc::new(FailingWriter));
    let doc_id = upload(&service, &sample_pdf(4)).await;
    let job = service.submit_job(&doc_id, 1, 2).await.unwrap();

    let summary = worker.run_once().await.unwrap();
    assert_eq!(summary.failed, 1);

    let status = service.job_status(&job.job_id).await.unwrap();
    assert_eq!(status.state, JobState::Failed);
    assert!(status.result.is_none());
    assert!(status.error.as_deref().unwrap_or_default().contains("503"));
    assert!(!storage.exists(&format!("jobs/{}/bundle.zip", job.job_id)).await);

    let err = service.bundle_location(&job.job_id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotComplete);
}

#[tokio::test]
async fn range_past_the_end_fails_the_job() {
    let tmp = tempfile::tempdir().unwrap();
    let (service, worker) = wire(
        tmp.path(),
        local(tmp.path()),
        Arc::new(RecordingWriter::default()),
    );
    let doc_id = upload(&service, &sample_pdf(10)).await;
    let job = service.submit_job(&doc_id, 9, 12).await.unwrap();

    worker.run_once().await.unwrap();

    let status = service.job_status(&job.job_id).await.unwrap();
    assert_eq!(status.state, JobState::Failed);
    assert!(status.error.unwrap().contains("out of range"));
}

#[tokio::test]
async fn pending_job_has_no_bundle_yet() {
    let tmp = tempfile::tempdir().unwrap();
    let (service, _worker) = wire(
        tmp.path(),
        local(tmp.path()),
        Arc::new(RecordingWriter::default()),
    );
    let doc_id = upload(&service, &sample_pdf(2)).await;
    let job = service.submit_job(&doc_id, 1, 1).await.unwrap();

    let err = service.bundle_location(&job.job_id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotComplete);

    let dest = tmp.path().join("never.zip");
    let err = service.download_bundle(&job.job_id, &dest).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotComplete);
    assert!(!dest.exists());
}

#[tokio::test]
async fn unknown_document_creates_no_job() {
    let tmp = tempfile::tempdir().unwrap();
    let (service, _worker) = wire(
        tmp.path(),
        local(tmp.path()),
        Arc::new(RecordingWriter::default()),
    );

    let err = service.submit_job("doesnotexist", 1, 2).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(service.jobs().pending().await.unwrap().is_empty());
}

#[tokio::test]
async fn inverted_range_creates_no_job() {
    let tmp = tempfile::tempdir().unwrap();
    let (service, _worker) = wire(
        tmp.path(),
        local(tmp.path()),
        Arc::new(RecordingWriter::default()),
    );
    let doc_id = upload(&service, &sample_pdf(6)).await;

    for (from, to) in [(5, 3), (0, 2)] {
        let err = service.submit_job(&doc_id, from, to).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest, "{from}-{to}");
    }
    assert!(service.jobs().pending().await.unwrap().is_empty());
}

#[tokio::test]
async fn non_pdf_upload_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let (service, _worker) = wire(
        tmp.path(),
        local(tmp.path()),
        Arc::new(RecordingWriter::default()),
    );
    let mut reader: &[u8] = b"hello";
    let err = service
        .upload_document(&mut reader, Some("text/plain"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    assert!(service.list_documents().await.unwrap().is_empty());
}

// ── Progress ─────────────────────────────────────────────────────────────────

#[derive(Default)]
struct StageRecorder {
    events: Mutex<Vec<String>>,
}

impl JobProgressCallback for StageRecorder {
    fn on_job_start(&self, _job_id: &str) {
        self.events.lock().unwrap().push("start".into());
    }

    fn on_stage(&self, _job_id: &str, stage: Stage) {
        self.events.lock().unwrap().push(stage.to_string());
    }

    fn on_job_complete(&self, _job_id: &str, _bundle_key: &str) {
        self.events.lock().unwrap().push("complete".into());
    }
}

#[tokio::test]
async fn progress_callback_sees_every_stage_in_order() {
    let tmp = tempfile::tempdir().unwrap();
    let config = common::test_config(tmp.path());
    let storage = local(tmp.path());
    let jobs = Arc::new(lesson_bundler::FileJobStore::new(&config.job_store_dir).unwrap());
    let service = lesson_bundler::LessonService::new(Arc::clone(&storage), jobs.clone(), &config);

    let recorder = Arc::new(StageRecorder::default());
    let pipeline = lesson_bundler::LessonPipeline::new(
        storage,
        common::test_extractor(&config),
        Arc::new(RecordingWriter::default()),
        &config,
    )
    .with_progress(recorder.clone());
    let worker = lesson_bundler::JobWorker::new(jobs, pipeline, &config);

    let doc_id = upload(&service, &sample_pdf(3)).await;
    service.submit_job(&doc_id, 1, 3).await.unwrap();
    worker.run_once().await.unwrap();

    let events = recorder.events.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![
            "start",
            "resolving document",
            "extracting text",
            "writing script",
            "assembling bundle",
            "storing bundle",
            "complete",
        ]
    );
}

// ── Worker loop ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn run_until_processes_jobs_then_stops() {
    let tmp = tempfile::tempdir().unwrap();
    let (service, worker) = wire(
        tmp.path(),
        local(tmp.path()),
        Arc::new(RecordingWriter::default()),
    );
    let doc_id = upload(&service, &sample_pdf(2)).await;
    let job = service.submit_job(&doc_id, 1, 2).await.unwrap();

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        worker
            .run_until(async {
                let _ = stop_rx.await;
            })
            .await
    });

    let mut state = JobState::Pending;
    for _ in 0..200 {
        state = service.job_status(&job.job_id).await.unwrap().state;
        if state.is_terminal() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(state, JobState::Succeeded);

    stop_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn shutdown_finishes_the_running_job_and_leaves_the_rest_pending() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config_with_concurrency(tmp.path(), 1);
    let writer = Arc::new(SlowWriter {
        delay: std::time::Duration::from_millis(300),
    });
    let (service, worker) = wire_with(&config, local(tmp.path()), writer.clone());
    let doc_id = upload(&service, &sample_pdf(2)).await;
    let first = service.submit_job(&doc_id, 1, 1).await.unwrap().job_id;
    let second = service.submit_job(&doc_id, 2, 2).await.unwrap().job_id;

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        worker
            .run_until(async {
                let _ = stop_rx.await;
            })
            .await
    });

    let mut running = false;
    for _ in 0..200 {
        for id in [&first, &second] {
            if service.job_status(id).await.unwrap().state == JobState::Running {
                running = true;
            }
        }
        if running {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    assert!(running, "no job started");

    stop_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();

    let mut states = Vec::new();
    for id in [&first, &second] {
        states.push((id.clone(), service.job_status(id).await.unwrap().state));
    }
    let succeeded: Vec<_> = states.iter().filter(|(_, s)| *s == JobState::Succeeded).collect();
    let pending: Vec<_> = states.iter().filter(|(_, s)| *s == JobState::Pending).collect();
    assert_eq!(succeeded.len(), 1, "{states:?}");
    assert_eq!(pending.len(), 1, "{states:?}");

    // The untouched job was never claimed, so the next worker picks it up.
    let marker = config.job_store_dir.join(format!("{}.claim", pending[0].0));
    assert!(!marker.exists());

    let (_service, next) = wire_with(&config, local(tmp.path()), writer);
    let summary = next.run_once().await.unwrap();
    assert_eq!(summary.succeeded, 1);
    assert_eq!(
        service.job_status(&pending[0].0).await.unwrap().state,
        JobState::Succeeded
    );
}
