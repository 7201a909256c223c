//! Status query tests
//!
//! What a polling client sees at each point of a job's life.

mod common;

use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};

use common::*;
use voxpipe::adapters::ObjectStore;
use voxpipe::core::{QueryError, StatusQueryHandler};
use voxpipe::config::Namespaces;
use voxpipe::domain::{Stage, StatusRecord};

#[tokio::test]
async fn test_unknown_job_is_pending() {
    let h = Harness::happy();

    let view = h.status.query(UPLOAD_KEY).await.unwrap();

    assert_eq!(view.record.status, Stage::Pending);
    assert_eq!(view.record.progress, 0);
    assert_eq!(view.record.file_key, UPLOAD_KEY);
    assert!(view.polling_recommended);
    assert!(!view.stale);
    assert!(view.resultado_download_url.is_none());
}

#[tokio::test]
async fn test_query_never_writes() {
    let h = Harness::happy();
    h.status.query(UPLOAD_KEY).await.unwrap();
    h.status.query(UPLOAD_KEY).await.unwrap();

    assert!(h.store.keys().await.is_empty());
}

#[tokio::test]
async fn test_in_progress_job_keeps_polling() {
    let h = Harness::happy();
    h.seed_status(&StatusRecord::new(UPLOAD_KEY, Stage::Analyzing, None))
        .await;

    let view = h.status.query(UPLOAD_KEY).await.unwrap();

    assert_eq!(view.record.status, Stage::Analyzing);
    assert_eq!(view.record.progress, 80);
    assert!(view.polling_recommended);
    assert!(view.transcripcion_download_url.is_none());
}

#[tokio::test]
async fn test_completed_job_has_download_urls() {
    let h = Harness::happy();
    h.intake.handle(&created(UPLOAD_KEY), "req-1").await;

    let view = h.status.query(UPLOAD_KEY).await.unwrap();

    assert_eq!(view.record.status, Stage::Completed);
    assert!(!view.polling_recommended);

    let result_key = view.record.resultado_key.clone().unwrap();
    let result_url = view.resultado_download_url.clone().unwrap();
    assert!(result_url.starts_with(&format!("{}/objects/{}?", BASE_URL, result_key)));
    assert!(result_url.contains("signature="));
    assert!(view.transcripcion_download_url.unwrap().contains("_transcripcion.json?"));
}

#[tokio::test]
async fn test_download_url_lifetime() {
    let h = Harness::happy();
    h.intake.handle(&created(UPLOAD_KEY), "req-1").await;
    let status = StatusQueryHandler::new(h.store.clone(), Namespaces::default())
        .with_result_grant_ttl(Duration::from_secs(60));

    let before = Utc::now().timestamp();
    let view = status.query(UPLOAD_KEY).await.unwrap();
    let url = view.resultado_download_url.unwrap();

    let expires: i64 = url
        .split("expires=")
        .nth(1)
        .and_then(|rest| rest.split('&').next())
        .unwrap()
        .parse()
        .unwrap();
    assert!(expires >= before + 60 && expires <= before + 61);
}

#[tokio::test]
async fn test_failed_job_stops_polling() {
    let h = Harness::happy();
    h.seed_status(&StatusRecord::failed(UPLOAD_KEY, "Transcription failed", None))
        .await;

    let view = h.status.query(UPLOAD_KEY).await.unwrap();

    assert_eq!(view.record.status, Stage::Error);
    assert!(!view.polling_recommended);
    assert!(view.record.message.contains("Transcription failed"));
    assert!(!view.stale);
}

#[tokio::test]
async fn test_stale_job_reported_as_error() {
    let h = Harness::happy();
    let mut stuck = StatusRecord::new(UPLOAD_KEY, Stage::Transcribing, Some("req-0".into()));
    stuck.timestamp = Utc::now() - ChronoDuration::minutes(45);
    h.seed_status(&stuck).await;

    let view = h.status.query(UPLOAD_KEY).await.unwrap();

    assert_eq!(view.record.status, Stage::Error);
    assert_eq!(view.record.progress, 0);
    assert!(view.stale);
    assert!(!view.polling_recommended);
    assert!(view.record.message.contains("stalled"));

    // The stored record is left alone
    assert_eq!(h.status_history().len(), 1);
    assert_eq!(h.status_history()[0].status, Stage::Transcribing);
}

#[tokio::test]
async fn test_stale_threshold_is_configurable() {
    let h = Harness::happy();
    let mut record = StatusRecord::new(UPLOAD_KEY, Stage::Transcribing, None);
    record.timestamp = Utc::now() - ChronoDuration::minutes(45);
    h.seed_status(&record).await;

    let patient = StatusQueryHandler::new(h.store.clone(), Namespaces::default())
        .with_stale_after(Duration::from_secs(3 * 3600));
    let view = patient.query(UPLOAD_KEY).await.unwrap();

    assert_eq!(view.record.status, Stage::Transcribing);
    assert!(view.polling_recommended);
}

#[tokio::test]
async fn test_empty_key_is_rejected() {
    let h = Harness::happy();

    for key in ["", "   "] {
        assert!(matches!(
            h.status.query(key).await,
            Err(QueryError::Validation(_))
        ));
    }
}

#[tokio::test]
async fn test_unstorable_key_is_rejected() {
    let h = Harness::happy();

    for key in ["uploads/a//b.mp3", "uploads/x/../y.mp3", "uploads/\\a.mp3"] {
        assert!(
            matches!(h.status.query(key).await, Err(QueryError::Validation(_))),
            "{key:?}"
        );
    }
    assert_eq!(h.store.call_count(), 0);
}

#[tokio::test]
async fn test_query_and_intake_agree_on_job() {
    let h = Harness::happy();
    let key = "uploads/20240101_090000_ff00aa11_notes.v2.m4a";
    h.upload(key).await;
    h.intake.handle(&created(key), "req-1").await;

    let view = h.status.query(key).await.unwrap();

    assert_eq!(view.record.status, Stage::Completed);
    assert!(h
        .store
        .exists("processing/20240101_090000_ff00aa11_notes.v2_status.json")
        .await
        .unwrap());
}
