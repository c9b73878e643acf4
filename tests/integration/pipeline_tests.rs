//! Pipeline integration tests.
//!
//! Tests verify:
//! - The GameBoy scenario end to end
//! - Validation happens before any I/O
//! - Temporary files are removed after every outcome
//! - Upload retry and verification behavior
//! - Batch isolation and ordering
//! - Ownership rules for originals, deletion and listing

use std::sync::atomic::Ordering;
use std::sync::Arc;

use bytes::Bytes;
use tempfile::TempDir;

use retropix::error::{EngineStage, Stage};
use retropix::pipeline::{CancelToken, ImageRequest, KeyStrategy};

use super::test_utils::{
    blocks_are_uniform, decode_png, distinct_colors, faulty_pipeline, gradient_jpeg, gradient_png,
    jpeg_request, memory_pipeline, memory_pipeline_with, solid_png, temp_entries, EngineFault,
    MemoryStore, TEST_BASE_URL,
};

// =============================================================================
// Successful Processing
// =============================================================================

#[tokio::test]
async fn test_gameboy_1024x768() {
    let store = MemoryStore::new();
    let temp = TempDir::new().unwrap();
    let pipeline = memory_pipeline(&store, temp.path());

    let request = jpeg_request(gradient_jpeg(1024, 768), "holiday.jpg", "user-1", "gameboy");
    let processed = pipeline.process(request, &CancelToken::new()).await.unwrap();

    assert!(processed.storage_key.starts_with("gameboy_"));
    assert!(processed.storage_key.ends_with(".png"));
    assert_eq!(
        processed.public_url,
        format!("{}/{}", TEST_BASE_URL, processed.storage_key)
    );
    assert_eq!(processed.original_name, "holiday.jpg");

    let stored = store.get(&processed.storage_key).await.unwrap();
    assert_eq!(stored.content_type, "image/png");
    assert_eq!(stored.bytes.len() as u64, processed.size_bytes);

    let output = decode_png(&stored.bytes);
    assert_eq!(output.dimensions(), (160, 160));
    assert!(distinct_colors(&output).len() <= 4);
    assert!(blocks_are_uniform(&output, 8));

    assert_eq!(temp_entries(temp.path()), 0);
    assert_eq!(store.verify_count(), 1);
}

#[tokio::test]
async fn test_every_style_produces_its_canvas() {
    let store = MemoryStore::new();
    let temp = TempDir::new().unwrap();
    let pipeline = memory_pipeline(&store, temp.path());
    let source = gradient_png(300, 200);

    for style in pipeline.styles().names() {
        let profile = pipeline.styles().get(style).unwrap();
        let request = ImageRequest::new(source.clone(), "a.png", "image/png", "u1", style);
        let processed = pipeline.process(request, &CancelToken::new()).await.unwrap();

        let output = decode_png(&store.get(&processed.storage_key).await.unwrap().bytes);
        assert_eq!(output.dimensions(), (profile.canvas_size, profile.canvas_size));
        assert!(distinct_colors(&output).len() <= profile.palette_size);
    }

    assert_eq!(store.len().await, 4);
    assert_eq!(temp_entries(temp.path()), 0);
}

#[tokio::test]
async fn test_same_input_same_output() {
    let store = MemoryStore::new();
    let temp = TempDir::new().unwrap();
    let pipeline = memory_pipeline(&store, temp.path());
    let source = gradient_jpeg(320, 240);

    let a = pipeline
        .process(
            jpeg_request(source.clone(), "a.jpg", "u1", "nes-retro"),
            &CancelToken::new(),
        )
        .await
        .unwrap();
    let b = pipeline
        .process(
            jpeg_request(source, "a.jpg", "u1", "nes-retro"),
            &CancelToken::new(),
        )
        .await
        .unwrap();

    assert_ne!(a.storage_key, b.storage_key);
    let first = store.get(&a.storage_key).await.unwrap();
    let second = store.get(&b.storage_key).await.unwrap();
    assert_eq!(first.bytes, second.bytes);
}

#[tokio::test]
async fn test_solid_color_source() {
    let store = MemoryStore::new();
    let temp = TempDir::new().unwrap();
    let pipeline = memory_pipeline(&store, temp.path());

    let request = ImageRequest::new(solid_png(64, 64, [200, 30, 30]), "red.png", "image/png", "u1", "8bit");
    let processed = pipeline.process(request, &CancelToken::new()).await.unwrap();

    let output = decode_png(&store.get(&processed.storage_key).await.unwrap().bytes);
    assert_eq!(distinct_colors(&output).len(), 1);
}

// =============================================================================
// Keys and Overwrites
// =============================================================================

#[tokio::test]
async fn test_target_key_last_write_wins() {
    let store = MemoryStore::new();
    let temp = TempDir::new().unwrap();
    let pipeline = memory_pipeline(&store, temp.path());

    let first = pipeline
        .process(
            jpeg_request(gradient_jpeg(100, 100), "a.jpg", "u1", "gameboy")
                .with_target_key("u1/avatar.png"),
            &CancelToken::new(),
        )
        .await
        .unwrap();
    let second = pipeline
        .process(
            ImageRequest::new(solid_png(50, 50, [0, 0, 255]), "b.png", "image/png", "u1", "extreme")
                .with_target_key("u1/avatar.png"),
            &CancelToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(first.public_url, second.public_url);
    assert_eq!(store.len().await, 1);

    let output = decode_png(&store.get("u1/avatar.png").await.unwrap().bytes);
    assert_eq!(output.dimensions(), (256, 256));
}

#[tokio::test]
async fn test_content_hash_keys_are_idempotent() {
    let store = MemoryStore::new();
    let temp = TempDir::new().unwrap();
    let pipeline =
        memory_pipeline_with(&store, temp.path(), |c| c.key_strategy = KeyStrategy::ContentHash);
    let source = gradient_jpeg(120, 80);

    let a = pipeline
        .process(jpeg_request(source.clone(), "a.jpg", "u1", "gameboy"), &CancelToken::new())
        .await
        .unwrap();
    let b = pipeline
        .process(jpeg_request(source.clone(), "b.jpg", "u2", "gameboy"), &CancelToken::new())
        .await
        .unwrap();
    let c = pipeline
        .process(jpeg_request(source, "a.jpg", "u1", "8bit"), &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(a.storage_key, b.storage_key);
    assert_ne!(a.storage_key, c.storage_key);
    assert_eq!(store.len().await, 2);
}

#[tokio::test]
async fn test_invalid_target_key_rejected_before_io() {
    let store = MemoryStore::new();
    let temp = TempDir::new().unwrap();
    let pipeline = memory_pipeline(&store, temp.path());

    let failure = pipeline
        .process(
            jpeg_request(gradient_jpeg(32, 32), "a.jpg", "u1", "gameboy")
                .with_target_key("../escape.png"),
            &CancelToken::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(failure.stage, Stage::Received);
    assert_eq!(failure.kind(), "invalid_key");
    assert_eq!(store.put_count(), 0);
}

// =============================================================================
// Validation Before I/O
// =============================================================================

#[tokio::test]
async fn test_unknown_style_fails_before_decode_and_upload() {
    let store = MemoryStore::new();
    let temp = TempDir::new().unwrap();
    let pipeline = memory_pipeline(&store, temp.path());

    let failure = pipeline
        .process(
            jpeg_request(gradient_jpeg(64, 64), "a.jpg", "u1", "snes"),
            &CancelToken::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(failure.stage, Stage::Received);
    assert_eq!(failure.kind(), "unknown_style");
    assert!(failure.to_string().contains("snes"));
    assert_eq!(store.put_count(), 0);
    assert_eq!(temp_entries(temp.path()), 0);
}

#[tokio::test]
async fn test_media_type_must_match_extension() {
    let store = MemoryStore::new();
    let temp = TempDir::new().unwrap();
    let pipeline = memory_pipeline(&store, temp.path());

    let request = ImageRequest::new(gradient_png(16, 16), "a.jpg", "image/png", "u1", "gameboy");
    let failure = pipeline.process(request, &CancelToken::new()).await.unwrap_err();
    assert_eq!(failure.kind(), "unsupported_media_type");

    let request = ImageRequest::new(Bytes::from_static(b"%PDF"), "a.pdf", "application/pdf", "u1", "gameboy");
    let failure = pipeline.process(request, &CancelToken::new()).await.unwrap_err();
    assert_eq!(failure.kind(), "unsupported_media_type");
    assert_eq!(failure.stage, Stage::Received);
    assert_eq!(store.put_count(), 0);
}

#[tokio::test]
async fn test_payload_too_large() {
    let store = MemoryStore::new();
    let temp = TempDir::new().unwrap();
    let pipeline = memory_pipeline_with(&store, temp.path(), |c| c.max_upload_bytes = 64);

    let failure = pipeline
        .process(
            jpeg_request(gradient_jpeg(64, 64), "a.jpg", "u1", "gameboy"),
            &CancelToken::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(failure.kind(), "payload_too_large");
    assert_eq!(temp_entries(temp.path()), 0);
}

#[tokio::test]
async fn test_empty_upload_rejected() {
    let store = MemoryStore::new();
    let temp = TempDir::new().unwrap();
    let pipeline = memory_pipeline(&store, temp.path());

    let failure = pipeline
        .process(jpeg_request(Bytes::new(), "a.jpg", "u1", "gameboy"), &CancelToken::new())
        .await
        .unwrap_err();
    assert_eq!(failure.kind(), "invalid_request");
}

// =============================================================================
// Failure Cleanup
// =============================================================================

#[tokio::test]
async fn test_decode_failure_cleans_up() {
    let store = MemoryStore::new();
    let temp = TempDir::new().unwrap();
    let pipeline = memory_pipeline(&store, temp.path());

    let garbage = Bytes::from_static(b"definitely not a jpeg, just some bytes");
    let failure = pipeline
        .process(jpeg_request(garbage, "a.jpg", "u1", "gameboy"), &CancelToken::new())
        .await
        .unwrap_err();

    assert_eq!(failure.stage, Stage::Decoding);
    assert_eq!(failure.kind(), "decode_error");
    assert_eq!(store.put_count(), 0);
    assert_eq!(temp_entries(temp.path()), 0);
}

#[tokio::test]
async fn test_upload_failure_cleans_up() {
    let store = MemoryStore::new();
    store.reject_puts();
    let temp = TempDir::new().unwrap();
    let pipeline = memory_pipeline(&store, temp.path());

    let failure = pipeline
        .process(
            jpeg_request(gradient_jpeg(48, 48), "a.jpg", "u1", "gameboy"),
            &CancelToken::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(failure.stage, Stage::Uploading);
    assert_eq!(failure.kind(), "upload_error");
    assert_eq!(store.put_count(), 1, "permanent errors are not retried");
    assert_eq!(temp_entries(temp.path()), 0);
}

#[tokio::test]
async fn test_transient_upload_failure_is_retried_once() {
    let store = MemoryStore::new();
    store.fail_next_puts(1);
    let temp = TempDir::new().unwrap();
    let pipeline = memory_pipeline(&store, temp.path());

    let processed = pipeline
        .process(
            jpeg_request(gradient_jpeg(48, 48), "a.jpg", "u1", "gameboy"),
            &CancelToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(store.put_count(), 2);
    assert!(store.get(&processed.storage_key).await.is_some());
}

#[tokio::test]
async fn test_second_transient_failure_is_surfaced() {
    let store = MemoryStore::new();
    store.fail_next_puts(2);
    let temp = TempDir::new().unwrap();
    let pipeline = memory_pipeline(&store, temp.path());

    let failure = pipeline
        .process(
            jpeg_request(gradient_jpeg(48, 48), "a.jpg", "u1", "gameboy"),
            &CancelToken::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(failure.stage, Stage::Uploading);
    assert_eq!(store.put_count(), 2);
    assert_eq!(temp_entries(temp.path()), 0);
}

#[tokio::test]
async fn test_verification_failure_cleans_up_and_is_not_retried() {
    let store = MemoryStore::new();
    store.hide_writes();
    let temp = TempDir::new().unwrap();
    let pipeline = memory_pipeline(&store, temp.path());

    let failure = pipeline
        .process(
            jpeg_request(gradient_jpeg(48, 48), "a.jpg", "u1", "gameboy"),
            &CancelToken::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(failure.stage, Stage::Verifying);
    assert_eq!(failure.kind(), "verification_failed");
    assert_eq!(store.put_count(), 1);
    assert_eq!(store.verify_count(), 1);
    assert_eq!(temp_entries(temp.path()), 0);
}

#[tokio::test]
async fn test_cancelled_request_does_no_work() {
    let store = MemoryStore::new();
    let temp = TempDir::new().unwrap();
    let pipeline = memory_pipeline(&store, temp.path());

    let cancel = CancelToken::new();
    cancel.cancel();

    let failure = pipeline
        .process(jpeg_request(gradient_jpeg(48, 48), "a.jpg", "u1", "gameboy"), &cancel)
        .await
        .unwrap_err();

    assert_eq!(failure.kind(), "cancelled");
    assert_eq!(store.put_count(), 0);
    assert_eq!(temp_entries(temp.path()), 0);
}

#[tokio::test]
async fn test_transform_failure_cleans_up() {
    for (stage, kind) in [
        (EngineStage::Quantize, "quantization_error"),
        (EngineStage::Encode, "encode_error"),
    ] {
        let store = MemoryStore::new();
        let temp = TempDir::new().unwrap();
        let (pipeline, spooled) = faulty_pipeline(&store, temp.path(), EngineFault::FailAt(stage));

        let failure = pipeline
            .process(
                jpeg_request(gradient_jpeg(48, 48), "a.jpg", "u1", "gameboy"),
                &CancelToken::new(),
            )
            .await
            .unwrap_err();

        assert_eq!(failure.stage, Stage::Transforming);
        assert_eq!(failure.kind(), kind);
        assert_eq!(spooled.load(Ordering::SeqCst), 1, "source was spooled before the engine ran");
        assert_eq!(temp_entries(temp.path()), 0);
        assert_eq!(store.put_count(), 0);
    }
}

#[tokio::test]
async fn test_cancel_during_transform_cleans_up() {
    let store = MemoryStore::new();
    let temp = TempDir::new().unwrap();
    let (pipeline, spooled) = faulty_pipeline(&store, temp.path(), EngineFault::CancelBeforeRun);

    let failure = pipeline
        .process(
            jpeg_request(gradient_jpeg(48, 48), "a.jpg", "u1", "gameboy"),
            &CancelToken::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(failure.kind(), "cancelled");
    assert_eq!(failure.stage, Stage::Decoding);
    assert_eq!(spooled.load(Ordering::SeqCst), 1);
    assert_eq!(temp_entries(temp.path()), 0);
    assert_eq!(store.put_count(), 0);
}

#[tokio::test]
async fn test_cancel_after_transform_skips_upload_and_cleans_up() {
    let store = MemoryStore::new();
    let temp = TempDir::new().unwrap();
    let (pipeline, spooled) = faulty_pipeline(&store, temp.path(), EngineFault::CancelAfterRun);

    let failure = pipeline
        .process(
            jpeg_request(gradient_jpeg(48, 48), "a.jpg", "u1", "gameboy"),
            &CancelToken::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(failure.kind(), "cancelled");
    assert_eq!(failure.stage, Stage::Uploading);
    assert_eq!(spooled.load(Ordering::SeqCst), 1);
    assert_eq!(temp_entries(temp.path()), 0);
    assert_eq!(store.put_count(), 0);
}

// =============================================================================
// Batches
// =============================================================================

#[tokio::test]
async fn test_batch_isolates_failures_and_keeps_order() {
    let store = MemoryStore::new();
    let temp = TempDir::new().unwrap();
    let pipeline = Arc::new(memory_pipeline(&store, temp.path()));

    let requests = vec![
        jpeg_request(gradient_jpeg(40, 30), "first.jpg", "u1", "gameboy"),
        jpeg_request(Bytes::from_static(b"broken"), "broken.jpg", "u1", "gameboy"),
        ImageRequest::new(gradient_png(30, 40), "third.png", "image/png", "u1", "8bit"),
        jpeg_request(gradient_jpeg(20, 20), "unknown.jpg", "u1", "snes"),
    ];

    let report = pipeline
        .process_batch(requests, &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(report.total(), 4);
    let names: Vec<_> = report.succeeded.iter().map(|p| p.original_name.as_str()).collect();
    assert_eq!(names, vec!["first.jpg", "third.png"]);

    assert_eq!(report.failed.len(), 2);
    assert_eq!(report.failed[0].original_name, "broken.jpg");
    assert_eq!(report.failed[0].error.kind, "decode_error");
    assert_eq!(report.failed[0].error.stage, Some(Stage::Decoding));
    assert_eq!(report.failed[1].original_name, "unknown.jpg");
    assert_eq!(report.failed[1].error.kind, "unknown_style");

    assert_eq!(store.len().await, 2);
    assert_eq!(temp_entries(temp.path()), 0);
}

#[tokio::test]
async fn test_batch_limits() {
    let store = MemoryStore::new();
    let temp = TempDir::new().unwrap();
    let pipeline = Arc::new(memory_pipeline_with(&store, temp.path(), |c| c.max_batch_size = 2));

    let failure = Arc::clone(&pipeline)
        .process_batch(Vec::new(), &CancelToken::new())
        .await
        .unwrap_err();
    assert_eq!(failure.kind(), "invalid_request");

    let requests = (0..3)
        .map(|i| jpeg_request(gradient_jpeg(8, 8), &format!("{}.jpg", i), "u1", "gameboy"))
        .collect();
    let failure = pipeline
        .process_batch(requests, &CancelToken::new())
        .await
        .unwrap_err();
    assert_eq!(failure.kind(), "payload_too_large");
    assert_eq!(store.put_count(), 0);
}

#[tokio::test]
async fn test_batch_report_json_shape() {
    let store = MemoryStore::new();
    let temp = TempDir::new().unwrap();
    let pipeline = Arc::new(memory_pipeline(&store, temp.path()));

    let report = pipeline
        .process_batch(
            vec![
                jpeg_request(gradient_jpeg(16, 16), "ok.jpg", "u1", "gameboy"),
                jpeg_request(gradient_jpeg(16, 16), "bad.jpg", "u1", "snes"),
            ],
            &CancelToken::new(),
        )
        .await
        .unwrap();

    let json = serde_json::to_value(&report).unwrap();
    assert!(json["succeeded"][0]["publicUrl"].is_string());
    assert_eq!(json["failed"][0]["originalName"], "bad.jpg");
    assert_eq!(json["failed"][0]["error"]["kind"], "unknown_style");
    assert_eq!(json["failed"][0]["error"]["stage"], "received");
}

// =============================================================================
// Originals, Deletion and Listing
// =============================================================================

#[tokio::test]
async fn test_store_original_under_owner_prefix() {
    let store = MemoryStore::new();
    let temp = TempDir::new().unwrap();
    let pipeline = memory_pipeline(&store, temp.path());
    let source = gradient_jpeg(64, 48);

    let stored = pipeline
        .store_original(jpeg_request(source.clone(), "Photo.JPEG", "user-7", ""))
        .await
        .unwrap();

    assert!(stored.storage_key.starts_with("user-7/"));
    assert!(stored.storage_key.ends_with(".jpg"));
    assert_eq!(stored.size_bytes, source.len() as u64);

    let entry = store.get(&stored.storage_key).await.unwrap();
    assert_eq!(entry.bytes, source);
    assert_eq!(entry.content_type, "image/jpeg");
}

#[tokio::test]
async fn test_store_original_rejects_foreign_target_key() {
    let store = MemoryStore::new();
    let temp = TempDir::new().unwrap();
    let pipeline = memory_pipeline(&store, temp.path());

    let failure = pipeline
        .store_original(
            jpeg_request(gradient_jpeg(8, 8), "a.jpg", "user-7", "").with_target_key("user-8/a.jpg"),
        )
        .await
        .unwrap_err();

    assert_eq!(failure.kind(), "forbidden");
    assert_eq!(store.put_count(), 0);
}

#[tokio::test]
async fn test_delete_owned() {
    let store = MemoryStore::new();
    store.seed("user-1/a.jpg", b"a").await;
    store.seed("user-2/b.jpg", b"b").await;
    let temp = TempDir::new().unwrap();
    let pipeline = memory_pipeline(&store, temp.path());

    pipeline.delete_owned("user-1", "user-1/a.jpg").await.unwrap();
    assert!(store.get("user-1/a.jpg").await.is_none());

    // Already gone
    pipeline.delete_owned("user-1", "user-1/a.jpg").await.unwrap();

    let err = pipeline.delete_owned("user-1", "user-2/b.jpg").await.unwrap_err();
    assert_eq!(err.kind(), "forbidden");
    assert!(store.get("user-2/b.jpg").await.is_some());

    // A bare prefix match is not ownership
    let err = pipeline.delete_owned("user", "user-1x/a.jpg").await.unwrap_err();
    assert_eq!(err.kind(), "forbidden");
}

#[tokio::test]
async fn test_delete_store_failure_is_reported() {
    let store = MemoryStore::new();
    store.seed("user-1/a.jpg", b"a").await;
    store.fail_deletes();
    let temp = TempDir::new().unwrap();
    let pipeline = memory_pipeline(&store, temp.path());

    let err = pipeline.delete_owned("user-1", "user-1/a.jpg").await.unwrap_err();
    assert_eq!(err.kind(), "upload_error");
}

#[tokio::test]
async fn test_list_owned() {
    let store = MemoryStore::new();
    store.seed("user-1/b.jpg", b"bb").await;
    store.seed("user-1/a.jpg", b"a").await;
    store.seed("user-10/c.jpg", b"c").await;
    store.seed("gameboy_x.png", b"x").await;
    let temp = TempDir::new().unwrap();
    let pipeline = memory_pipeline(&store, temp.path());

    let images = pipeline.list_owned("user-1").await.unwrap();
    let keys: Vec<_> = images.iter().map(|i| i.storage_key.as_str()).collect();
    assert_eq!(keys, vec!["user-1/a.jpg", "user-1/b.jpg"]);
    assert_eq!(images[0].name, "a.jpg");
    assert_eq!(images[1].size_bytes, 2);
    assert_eq!(images[0].public_url, format!("{}/user-1/a.jpg", TEST_BASE_URL));

    assert!(pipeline.list_owned("nobody").await.unwrap().is_empty());
    assert!(pipeline.list_owned("").await.is_err());
}
