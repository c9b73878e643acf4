//! Configuration management for retropix.
//!
//! This module provides the CLI surface and its configuration:
//! - Command-line arguments via clap
//! - Environment variables with `RETROPIX_` prefix
//! - Sensible defaults for all optional settings
//!
//! # Example
//!
//! ```ignore
//! use clap::Parser;
//! use retropix::config::{Cli, Command};
//!
//! let cli = Cli::parse();
//! if let Command::Process(config) = cli.command {
//!     config.validate()?;
//!     println!("style: {}", config.style);
//! }
//! ```
//!
//! # Environment Variables
//!
//! Store and pipeline options can be set via environment variables:
//!
//! - `RETROPIX_STORE` - Storage backend, `local` or `s3` (default: local)
//! - `RETROPIX_S3_BUCKET` - S3 bucket name (required for `s3`)
//! - `RETROPIX_S3_ENDPOINT` - Custom S3 endpoint for S3-compatible services
//! - `RETROPIX_S3_REGION` - AWS region (default: us-east-1)
//! - `RETROPIX_LOCAL_DIR` - Directory for the `local` backend (default: ./uploads)
//! - `RETROPIX_PUBLIC_BASE_URL` - Base of generated public URLs
//! - `RETROPIX_MAX_UPLOAD_BYTES` - Per-file size limit (default: 5MB)
//! - `RETROPIX_MAX_BATCH_SIZE` - Files per batch (default: 6)
//! - `RETROPIX_TEMP_DIR` - Spool directory (default: system temp dir)
//! - `RETROPIX_KEY_STRATEGY` - `random` or `content-hash` (default: random)
//! - `RETROPIX_OWNER` - Owner id for uploads

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::pipeline::{
    KeyStrategy, PipelineConfig, DEFAULT_MAX_BATCH_SIZE, DEFAULT_MAX_UPLOAD_BYTES,
    DEFAULT_UPLOAD_RETRIES,
};
use crate::store::PublicUrlBuilder;

// =============================================================================
// Default Values
// =============================================================================

/// Default AWS region.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Default directory for the local backend.
pub const DEFAULT_LOCAL_DIR: &str = "./uploads";

/// Default public base URL for the local backend.
pub const DEFAULT_LOCAL_BASE_URL: &str = "http://localhost:3000/api/images";

// =============================================================================
// CLI Structure
// =============================================================================

/// retropix - retro pixel-art transforms for photos.
///
/// Turns photos into palette-limited pixel art in one of several retro
/// styles and publishes the results to S3 or a local directory.
#[derive(Parser, Debug, Clone)]
#[command(name = "retropix")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Transform images into a retro style and upload the results.
    Process(ProcessConfig),

    /// Upload original photos under the owner's prefix.
    Upload(UploadConfig),

    /// Delete an object owned by the given owner.
    Delete(DeleteConfig),

    /// List the objects stored under an owner's prefix.
    List(ListConfig),

    /// Print the public URL of a storage key.
    Url(UrlConfig),

    /// List the available styles.
    Styles,

    /// Check configuration and storage connectivity.
    Check(CheckConfig),
}

// =============================================================================
// Store Configuration
// =============================================================================

/// Storage backend kind.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreKind {
    /// Files in a local directory
    #[default]
    Local,

    /// AWS S3 or an S3-compatible service
    S3,
}

/// Storage backend selection, shared by every storage-facing command.
#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    /// Storage backend.
    #[arg(long, value_enum, default_value_t = StoreKind::Local, env = "RETROPIX_STORE")]
    pub store: StoreKind,

    /// S3 bucket name.
    #[arg(long, env = "RETROPIX_S3_BUCKET")]
    pub s3_bucket: Option<String>,

    /// Custom S3 endpoint URL for S3-compatible services (MinIO, etc.).
    ///
    /// If not specified, uses the default AWS S3 endpoint.
    #[arg(long, env = "RETROPIX_S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    /// AWS region for S3.
    #[arg(long, default_value = DEFAULT_REGION, env = "RETROPIX_S3_REGION")]
    pub s3_region: String,

    /// Directory backing the local store.
    #[arg(long, default_value = DEFAULT_LOCAL_DIR, env = "RETROPIX_LOCAL_DIR")]
    pub local_dir: PathBuf,

    /// Base URL prepended to storage keys in public URLs.
    ///
    /// Defaults to the bucket URL for S3 and to a localhost URL for the
    /// local store.
    #[arg(long, env = "RETROPIX_PUBLIC_BASE_URL")]
    pub public_base_url: Option<String>,
}

impl StoreArgs {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.store == StoreKind::S3 {
            match self.s3_bucket.as_deref() {
                None | Some("") => {
                    return Err(
                        "S3 bucket name is required. Set --s3-bucket or RETROPIX_S3_BUCKET"
                            .to_string(),
                    );
                }
                Some(_) => {}
            }
            if self.s3_region.is_empty() {
                return Err("S3 region must not be empty".to_string());
            }
        }

        if self.store == StoreKind::Local && self.local_dir.as_os_str().is_empty() {
            return Err("Local directory is required. Set --local-dir".to_string());
        }

        self.public_urls().map(|_| ())
    }

    /// The bucket name, or an empty string (call validate() first).
    pub fn bucket(&self) -> &str {
        self.s3_bucket.as_deref().unwrap_or("")
    }

    /// Build the public URL builder for the selected backend.
    pub fn public_urls(&self) -> Result<PublicUrlBuilder, String> {
        if let Some(ref base) = self.public_base_url {
            return PublicUrlBuilder::new(base);
        }

        match self.store {
            StoreKind::Local => PublicUrlBuilder::new(DEFAULT_LOCAL_BASE_URL),
            StoreKind::S3 => match self.s3_endpoint.as_deref() {
                Some(endpoint) => PublicUrlBuilder::for_s3_endpoint(endpoint, self.bucket()),
                None => PublicUrlBuilder::for_s3_bucket(self.bucket(), &self.s3_region),
            },
        }
    }
}

// =============================================================================
// Pipeline Configuration
// =============================================================================

/// Pipeline limits and policies.
#[derive(Args, Debug, Clone)]
pub struct PipelineArgs {
    /// Largest accepted source file, in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_UPLOAD_BYTES, env = "RETROPIX_MAX_UPLOAD_BYTES")]
    pub max_upload_bytes: usize,

    /// Largest number of files in one batch.
    #[arg(long, default_value_t = DEFAULT_MAX_BATCH_SIZE, env = "RETROPIX_MAX_BATCH_SIZE")]
    pub max_batch_size: usize,

    /// Directory for temporary spool files.
    #[arg(long, env = "RETROPIX_TEMP_DIR")]
    pub temp_dir: Option<PathBuf>,

    /// How generated storage keys are derived (`random` or `content-hash`).
    #[arg(long, default_value = "random", env = "RETROPIX_KEY_STRATEGY")]
    pub key_strategy: KeyStrategy,
}

impl PipelineArgs {
    pub fn to_pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            max_upload_bytes: self.max_upload_bytes,
            max_batch_size: self.max_batch_size,
            temp_dir: self.temp_dir.clone().unwrap_or_else(std::env::temp_dir),
            key_strategy: self.key_strategy,
            upload_retries: DEFAULT_UPLOAD_RETRIES,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        self.to_pipeline_config().validate()
    }
}

// =============================================================================
// Command Configuration
// =============================================================================

/// Configuration for the `process` command.
#[derive(Args, Debug, Clone)]
pub struct ProcessConfig {
    #[command(flatten)]
    pub store: StoreArgs,

    #[command(flatten)]
    pub pipeline: PipelineArgs,

    /// Style to apply (see `retropix styles`).
    #[arg(short, long)]
    pub style: String,

    /// Owner id recorded in logs and used for ownership checks.
    #[arg(long, env = "RETROPIX_OWNER")]
    pub owner: String,

    /// Storage key for the output (single file only).
    #[arg(long)]
    pub key: Option<String>,

    /// Image files to process.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

impl ProcessConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.store.validate()?;
        self.pipeline.validate()?;

        if self.style.is_empty() {
            return Err("Style is required. Set --style".to_string());
        }
        if self.owner.is_empty() {
            return Err("Owner is required. Set --owner or RETROPIX_OWNER".to_string());
        }
        if self.key.is_some() && self.files.len() != 1 {
            return Err("--key can only be used with a single file".to_string());
        }
        Ok(())
    }
}

/// Configuration for the `upload` command.
#[derive(Args, Debug, Clone)]
pub struct UploadConfig {
    #[command(flatten)]
    pub store: StoreArgs,

    #[command(flatten)]
    pub pipeline: PipelineArgs,

    /// Owner id; objects are stored under `<owner>/`.
    #[arg(long, env = "RETROPIX_OWNER")]
    pub owner: String,

    /// Photos to upload.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

impl UploadConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.store.validate()?;
        self.pipeline.validate()?;

        if self.owner.is_empty() {
            return Err("Owner is required. Set --owner or RETROPIX_OWNER".to_string());
        }
        if self.files.len() > self.pipeline.max_batch_size {
            return Err(format!(
                "At most {} files can be uploaded at once",
                self.pipeline.max_batch_size
            ));
        }
        Ok(())
    }
}

/// Configuration for the `delete` command.
#[derive(Args, Debug, Clone)]
pub struct DeleteConfig {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Owner id; only keys under `<owner>/` may be deleted.
    #[arg(long, env = "RETROPIX_OWNER")]
    pub owner: String,

    /// Storage key to delete.
    pub key: String,
}

/// Configuration for the `list` command.
#[derive(Args, Debug, Clone)]
pub struct ListConfig {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Owner id whose objects are listed.
    #[arg(long, env = "RETROPIX_OWNER")]
    pub owner: String,
}

/// Configuration for the `url` command.
#[derive(Args, Debug, Clone)]
pub struct UrlConfig {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Storage key.
    pub key: String,
}

/// Configuration for the `check` command.
#[derive(Args, Debug, Clone)]
pub struct CheckConfig {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Run every style over this image without uploading.
    #[arg(long)]
    pub sample: Option<PathBuf>,
}

// =============================================================================
// Tests
// =============================================================================
