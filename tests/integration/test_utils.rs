//! Test utilities for integration tests.
//!
//! This module provides an in-memory object store with fault injection and
//! helpers for building source images and pipelines.

use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, RgbaImage};
use tokio::sync::RwLock;

use retropix::error::{EngineStage, StoreError, TransformError};
use retropix::pipeline::{CancelToken, ImageRequest, Pipeline, PipelineConfig};
use retropix::store::{ObjectStore, ObjectStoreGateway, PublicUrlBuilder, StorageObject, StoredObjectInfo};
use retropix::style::{StyleProfile, StyleRegistry};
use retropix::transform::{EncodedImage, EngineFailure, ImageTransformer, TransformEngine};

/// Base URL used by every test gateway.
pub const TEST_BASE_URL: &str = "https://cdn.test/api/images";

// =============================================================================
// Memory Store with Fault Injection
// =============================================================================

/// A stored object.
#[derive(Debug, Clone)]
pub struct StoredEntry {
    pub bytes: Bytes,
    pub content_type: String,
}

/// An in-memory object store that can be told to misbehave.
///
/// Clones share state, so a test can keep a handle after moving one into a
/// gateway.
#[derive(Clone, Default)]
pub struct MemoryStore {
    objects: Arc<RwLock<HashMap<String, StoredEntry>>>,
    put_count: Arc<AtomicUsize>,
    verify_count: Arc<AtomicUsize>,
    transient_put_failures: Arc<AtomicUsize>,
    reject_puts: Arc<AtomicBool>,
    hide_writes: Arc<AtomicBool>,
    fail_deletes: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` puts with a transient connection error.
    pub fn fail_next_puts(&self, n: usize) {
        self.transient_put_failures.store(n, Ordering::SeqCst);
    }

    /// Fail every put with a permanent error.
    pub fn reject_puts(&self) {
        self.reject_puts.store(true, Ordering::SeqCst);
    }

    /// Accept writes but never report them as present.
    pub fn hide_writes(&self) {
        self.hide_writes.store(true, Ordering::SeqCst);
    }

    /// Fail every delete with a connection error.
    pub fn fail_deletes(&self) {
        self.fail_deletes.store(true, Ordering::SeqCst);
    }

    pub fn put_count(&self) -> usize {
        self.put_count.load(Ordering::SeqCst)
    }

    pub fn verify_count(&self) -> usize {
        self.verify_count.load(Ordering::SeqCst)
    }

    pub async fn get(&self, key: &str) -> Option<StoredEntry> {
        self.objects.read().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn keys(&self) -> HashSet<String> {
        self.objects.read().await.keys().cloned().collect()
    }

    /// Insert an object directly, bypassing fault injection.
    pub async fn seed(&self, key: &str, bytes: &'static [u8]) {
        self.objects.write().await.insert(
            key.to_string(),
            StoredEntry {
                bytes: Bytes::from_static(bytes),
                content_type: "application/octet-stream".to_string(),
            },
        );
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put(&self, object: &StorageObject) -> Result<(), StoreError> {
        self.put_count.fetch_add(1, Ordering::SeqCst);

        if self.reject_puts.load(Ordering::SeqCst) {
            return Err(StoreError::AccessDenied(format!("put {}", object.key)));
        }

        let pending = self.transient_put_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.transient_put_failures.store(pending - 1, Ordering::SeqCst);
            return Err(StoreError::Connection("connection reset".to_string()));
        }

        self.objects.write().await.insert(
            object.key.clone(),
            StoredEntry {
                bytes: object.bytes.clone(),
                content_type: object.content_type.clone(),
            },
        );
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        if self.hide_writes.load(Ordering::SeqCst) {
            return Ok(false);
        }
        Ok(self.objects.read().await.contains_key(key))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StoreError::Connection(format!("delete {}", key)));
        }
        match self.objects.write().await.remove(key) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(key.to_string())),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<StoredObjectInfo>, StoreError> {
        let objects = self.objects.read().await;
        let mut listed: Vec<_> = objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, entry)| StoredObjectInfo {
                key: key.clone(),
                size_bytes: entry.bytes.len() as u64,
                last_modified: None,
            })
            .collect();
        listed.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(listed)
    }

    async fn verify(&self, key: &str) -> Result<bool, StoreError> {
        self.verify_count.fetch_add(1, Ordering::SeqCst);
        self.exists(key).await
    }

    fn identifier(&self) -> &str {
        "memory://test"
    }
}

// =============================================================================
// Pipelines
// =============================================================================

// =============================================================================
// Engine with Fault Injection
// =============================================================================

/// What a [`FaultyEngine`] does instead of a clean run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineFault {
    /// Fail with an error attributed to the given stage
    FailAt(EngineStage),

    /// Cancel the token, then run the real engine
    CancelBeforeRun,

    /// Run the real engine, then cancel the token
    CancelAfterRun,
}

/// Wraps [`TransformEngine`] and misbehaves on purpose.
///
/// Records how many entries the spool directory held when it was called,
/// so tests can confirm the source was spooled before the failure.
pub struct FaultyEngine {
    fault: EngineFault,
    spool_dir: PathBuf,
    spooled_at_call: Arc<AtomicUsize>,
}

impl FaultyEngine {
    pub fn new(fault: EngineFault, spool_dir: &Path) -> Self {
        Self {
            fault,
            spool_dir: spool_dir.to_path_buf(),
            spooled_at_call: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared counter of spool entries seen on the last call.
    pub fn spooled_at_call(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.spooled_at_call)
    }
}

impl ImageTransformer for FaultyEngine {
    fn transform_checked(
        &self,
        source: &[u8],
        profile: &StyleProfile,
        cancel: &CancelToken,
    ) -> Result<EncodedImage, EngineFailure> {
        self.spooled_at_call
            .store(temp_entries(&self.spool_dir), Ordering::SeqCst);

        let engine = TransformEngine::new();
        match self.fault {
            EngineFault::FailAt(stage) => Err(EngineFailure {
                stage,
                error: injected_error(stage),
            }),
            EngineFault::CancelBeforeRun => {
                cancel.cancel();
                engine.transform_checked(source, profile, cancel)
            }
            EngineFault::CancelAfterRun => {
                let encoded = engine.transform_checked(source, profile, cancel);
                cancel.cancel();
                encoded
            }
        }
    }
}

fn injected_error(stage: EngineStage) -> TransformError {
    match stage {
        EngineStage::Decode => TransformError::Decode {
            message: "injected".to_string(),
        },
        EngineStage::Quantize => TransformError::Quantization {
            reason: "injected".to_string(),
        },
        EngineStage::Encode => TransformError::Encode {
            message: "injected".to_string(),
        },
        _ => TransformError::InvalidRaster {
            reason: "injected".to_string(),
        },
    }
}

/// Pipeline over `store` whose engine misbehaves as `fault` says.
///
/// Returns the shared spool counter alongside the pipeline.
pub fn faulty_pipeline(
    store: &MemoryStore,
    temp_dir: &Path,
    fault: EngineFault,
) -> (Pipeline<MemoryStore, FaultyEngine>, Arc<AtomicUsize>) {
    let engine = FaultyEngine::new(fault, temp_dir);
    let spooled = engine.spooled_at_call();
    let config = PipelineConfig {
        temp_dir: temp_dir.to_path_buf(),
        ..PipelineConfig::default()
    };

    let pipeline = Pipeline::new(
        StyleRegistry::new().unwrap(),
        engine,
        ObjectStoreGateway::new(store.clone(), PublicUrlBuilder::new(TEST_BASE_URL).unwrap()),
        config,
    );
    (pipeline, spooled)
}

/// Pipeline over `store`, spooling into `temp_dir`.
pub fn memory_pipeline(store: &MemoryStore, temp_dir: &Path) -> Pipeline<MemoryStore> {
    memory_pipeline_with(store, temp_dir, |_| {})
}

/// Pipeline over `store` with a customized config.
pub fn memory_pipeline_with(
    store: &MemoryStore,
    temp_dir: &Path,
    customize: impl FnOnce(&mut PipelineConfig),
) -> Pipeline<MemoryStore> {
    let mut config = PipelineConfig {
        temp_dir: temp_dir.to_path_buf(),
        ..PipelineConfig::default()
    };
    customize(&mut config);

    let urls = PublicUrlBuilder::new(TEST_BASE_URL).unwrap();
    Pipeline::new(
        StyleRegistry::new().unwrap(),
        TransformEngine::new(),
        ObjectStoreGateway::new(store.clone(), urls),
        config,
    )
}

/// Number of entries in `dir`.
pub fn temp_entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).unwrap().count()
}

// =============================================================================
// Image Fixtures
// =============================================================================

/// A colorful gradient, encoded as JPEG.
pub fn gradient_jpeg(width: u32, height: u32) -> Bytes {
    encode(DynamicImage::ImageRgb8(gradient(width, height)), ImageFormat::Jpeg)
}

/// A colorful gradient, encoded as PNG.
pub fn gradient_png(width: u32, height: u32) -> Bytes {
    encode(DynamicImage::ImageRgb8(gradient(width, height)), ImageFormat::Png)
}

/// A single flat color, encoded as PNG.
pub fn solid_png(width: u32, height: u32, color: [u8; 3]) -> Bytes {
    let img = RgbImage::from_pixel(width, height, Rgb(color));
    encode(DynamicImage::ImageRgb8(img), ImageFormat::Png)
}

fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            ((x * 7 + y * 3) % 256) as u8,
        ])
    })
}

fn encode(img: DynamicImage, format: ImageFormat) -> Bytes {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), format).unwrap();
    Bytes::from(buf)
}

/// Decode a stored PNG to RGBA.
pub fn decode_png(bytes: &[u8]) -> RgbaImage {
    image::load_from_memory_with_format(bytes, ImageFormat::Png)
        .unwrap()
        .to_rgba8()
}

/// Distinct colors in `img`.
pub fn distinct_colors(img: &RgbaImage) -> HashSet<[u8; 4]> {
    img.pixels().map(|p| p.0).collect()
}

/// Whether every `block` x `block` cell of `img` holds a single color.
pub fn blocks_are_uniform(img: &RgbaImage, block: u32) -> bool {
    let (width, height) = img.dimensions();
    for y in 0..height {
        for x in 0..width {
            let anchor = img.get_pixel(x - x % block, y - y % block);
            if img.get_pixel(x, y) != anchor {
                return false;
            }
        }
    }
    true
}

/// A JPEG request for `owner` in `style`.
pub fn jpeg_request(bytes: Bytes, name: &str, owner: &str, style: &str) -> ImageRequest {
    ImageRequest::new(bytes, name, "image/jpeg", owner, style)
}
