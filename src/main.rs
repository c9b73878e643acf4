//! retropix - retro pixel-art transforms for photos.
//!
//! This binary wires the CLI to the pipeline and the configured store.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use bytes::Bytes;
use clap::Parser;
use serde::Serialize;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use retropix::{
    config::{
        CheckConfig, Cli, Command, DeleteConfig, ListConfig, ProcessConfig, StoreArgs, StoreKind,
        UploadConfig, UrlConfig,
    },
    pipeline::{
        extension_of, CancelToken, ErrorResponse, ImageRequest, MediaType, Pipeline,
        PipelineConfig,
    },
    store::{create_s3_client, LocalDirStore, ObjectStore, ObjectStoreGateway, S3Store},
    style::StyleRegistry,
    transform::TransformEngine,
    PipelineError,
};

type DynStore = Box<dyn ObjectStore>;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Process(config) => run_process(config).await,
        Command::Upload(config) => run_upload(config).await,
        Command::Delete(config) => run_delete(config).await,
        Command::List(config) => run_list(config).await,
        Command::Url(config) => run_url(config),
        Command::Styles => run_styles(),
        Command::Check(config) => run_check(config).await,
    }
}

// =============================================================================
// Process Command
// =============================================================================

async fn run_process(config: ProcessConfig) -> ExitCode {
    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let pipeline = match build_pipeline(&config.store, config.pipeline.to_pipeline_config()).await
    {
        Ok(p) => Arc::new(p),
        Err(e) => return fail(&e),
    };

    let mut requests = Vec::with_capacity(config.files.len());
    for file in &config.files {
        match read_request(file, &config.owner, &config.style).await {
            Ok(request) => requests.push(request),
            Err(e) => return fail(&e),
        }
    }
    if let (Some(key), Some(request)) = (config.key.as_ref(), requests.first_mut()) {
        request.target_key = Some(key.clone());
    }

    let cancel = cancel_on_ctrl_c();

    if requests.len() == 1 {
        let Some(request) = requests.pop() else {
            return ExitCode::FAILURE;
        };
        return match pipeline.process(request, &cancel).await {
            Ok(processed) => {
                print_json(&processed);
                ExitCode::SUCCESS
            }
            Err(failure) => {
                error!("{}", failure);
                print_json(&ErrorResponse::from(&failure));
                ExitCode::FAILURE
            }
        };
    }

    match pipeline.process_batch(requests, &cancel).await {
        Ok(report) => {
            print_json(&report);
            if report.all_succeeded() {
                ExitCode::SUCCESS
            } else {
                warn!("{} of {} images failed", report.failed.len(), report.total());
                ExitCode::FAILURE
            }
        }
        Err(failure) => {
            error!("{}", failure);
            print_json(&ErrorResponse::from(&failure));
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Upload Command
// =============================================================================

async fn run_upload(config: UploadConfig) -> ExitCode {
    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let pipeline = match build_pipeline(&config.store, config.pipeline.to_pipeline_config()).await
    {
        Ok(p) => p,
        Err(e) => return fail(&e),
    };

    let mut uploaded = Vec::new();
    let mut status = ExitCode::SUCCESS;

    for file in &config.files {
        let request = match read_request(file, &config.owner, "").await {
            Ok(r) => r,
            Err(e) => return fail(&e),
        };

        match pipeline.store_original(request).await {
            Ok(image) => uploaded.push(image),
            Err(failure) => {
                error!("{}: {}", file.display(), failure);
                print_json(&ErrorResponse::from(&failure));
                status = ExitCode::FAILURE;
            }
        }
    }

    print_json(&uploaded);
    status
}

// =============================================================================
// Delete / List / Url Commands
// =============================================================================

async fn run_delete(config: DeleteConfig) -> ExitCode {
    if let Err(e) = config.store.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let pipeline = match build_pipeline(&config.store, PipelineConfig::default()).await {
        Ok(p) => p,
        Err(e) => return fail(&e),
    };

    match pipeline.delete_owned(&config.owner, &config.key).await {
        Ok(()) => {
            info!("Deleted {}", config.key);
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

async fn run_list(config: ListConfig) -> ExitCode {
    if let Err(e) = config.store.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let pipeline = match build_pipeline(&config.store, PipelineConfig::default()).await {
        Ok(p) => p,
        Err(e) => return fail(&e),
    };

    match pipeline.list_owned(&config.owner).await {
        Ok(images) => {
            print_json(&images);
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

fn run_url(config: UrlConfig) -> ExitCode {
    let urls = match config.store.public_urls() {
        Ok(urls) => urls,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = retropix::store::validate_key(&config.key) {
        error!("Invalid key '{}': {}", config.key, e);
        return ExitCode::FAILURE;
    }

    println!("{}", urls.url_for(&config.key));
    ExitCode::SUCCESS
}

// =============================================================================
// Styles Command
// =============================================================================

fn run_styles() -> ExitCode {
    match StyleRegistry::new() {
        Ok(registry) => {
            let profiles: Vec<_> = registry.profiles().collect();
            print_json(&profiles);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Style registry error: {}", e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Check Command
// =============================================================================

async fn run_check(config: CheckConfig) -> ExitCode {
    println!("retropix Configuration Check");
    println!("════════════════════════════");
    println!();

    if let Err(e) = config.store.validate() {
        println!("✗ Configuration: {}", e);
        return ExitCode::FAILURE;
    }

    match config.store.store {
        StoreKind::S3 => {
            println!("✓ Bucket: {}", config.store.bucket());
            if let Some(ref endpoint) = config.store.s3_endpoint {
                println!("✓ Endpoint: {}", endpoint);
            }
            println!("✓ Region: {}", config.store.s3_region);
        }
        StoreKind::Local => {
            println!("✓ Directory: {}", config.store.local_dir.display());
        }
    }

    let registry = match StyleRegistry::new() {
        Ok(r) => {
            println!("✓ Styles: {}", r.names().join(", "));
            r
        }
        Err(e) => {
            println!("✗ Styles: {}", e);
            return ExitCode::FAILURE;
        }
    };
    println!();

    print!("Testing storage connection... ");
    let pipeline = match build_pipeline(&config.store, PipelineConfig::default()).await {
        Ok(p) => p,
        Err(e) => {
            println!("✗ failed");
            println!();
            println!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match pipeline.health_check().await {
        Ok(()) => println!("✓ success"),
        Err(e) => {
            println!("✗ failed");
            println!();
            println!("Error: {}", e);
            println!();
            println!("Please check:");
            if config.store.store == StoreKind::S3 {
                println!("  - Your AWS credentials are configured correctly");
                println!(
                    "  - The bucket '{}' exists and is accessible",
                    config.store.bucket()
                );
                if config.store.s3_endpoint.is_some() {
                    println!("  - The S3 endpoint is correct and reachable");
                }
            } else {
                println!("  - The directory is readable and writable");
            }
            return ExitCode::FAILURE;
        }
    }

    if let Some(ref sample) = config.sample {
        println!();
        println!("Transforming '{}':", sample.display());

        let source = match tokio::fs::read(sample).await {
            Ok(bytes) => bytes,
            Err(e) => {
                println!("  ✗ cannot read file: {}", e);
                return ExitCode::FAILURE;
            }
        };

        let engine = TransformEngine::new();
        for profile in registry.profiles() {
            match engine.transform(&source, profile) {
                Ok(output) => println!(
                    "  ✓ {:<10} {}x{}, {} colors, {} bytes",
                    profile.name,
                    output.width,
                    output.height,
                    output.palette_len,
                    output.len()
                ),
                Err(e) => {
                    println!("  ✗ {:<10} {}", profile.name, e);
                    return ExitCode::FAILURE;
                }
            }
        }
    }

    println!();
    println!("════════════════════════════");
    println!("✓ All checks passed!");

    ExitCode::SUCCESS
}

// =============================================================================
// Helpers
// =============================================================================

/// Initialize the tracing/logging subsystem.
///
/// Logs go to stderr so stdout stays machine-readable.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "retropix=debug"
    } else {
        "retropix=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Open the configured backend.
async fn open_store(args: &StoreArgs) -> Result<DynStore, PipelineError> {
    match args.store {
        StoreKind::S3 => {
            let client = create_s3_client(args.s3_endpoint.as_deref(), &args.s3_region).await;
            Ok(Box::new(S3Store::new(client, args.bucket())))
        }
        StoreKind::Local => {
            let store = LocalDirStore::new(&args.local_dir)
                .await
                .map_err(PipelineError::Upload)?;
            Ok(Box::new(store))
        }
    }
}

async fn build_pipeline(
    args: &StoreArgs,
    config: PipelineConfig,
) -> Result<Pipeline<DynStore>, PipelineError> {
    let urls = args
        .public_urls()
        .map_err(|reason| PipelineError::InvalidRequest { reason })?;
    let store = open_store(args).await?;
    let styles = StyleRegistry::new()?;

    info!(store = store.identifier(), base_url = urls.base(), "Store ready");

    Ok(Pipeline::new(
        styles,
        TransformEngine::new(),
        ObjectStoreGateway::new(store, urls),
        config,
    ))
}

/// Read `path` into a request, deriving the MIME type from its extension.
async fn read_request(path: &Path, owner: &str, style: &str) -> Result<ImageRequest, PipelineError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| PipelineError::InvalidRequest {
            reason: format!("cannot read {}: {}", path.display(), e),
        })?;

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mime = MediaType::from_extension(&extension_of(&filename))
        .map(|m| m.mime())
        .unwrap_or("application/octet-stream");

    Ok(ImageRequest::new(
        Bytes::from(bytes),
        filename,
        mime,
        owner,
        style,
    ))
}

/// Cancel outstanding work when Ctrl-C is pressed.
fn cancel_on_ctrl_c() -> CancelToken {
    let cancel = CancelToken::new();
    let handle = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            handle.cancel();
        }
    });
    cancel
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => error!("Failed to serialize output: {}", e),
    }
}

fn fail(err: &PipelineError) -> ExitCode {
    error!("{}", err);
    print_json(&ErrorResponse::from(err));
    ExitCode::FAILURE
}
