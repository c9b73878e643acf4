use async_trait::async_trait;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::debug;

use super::object_store::{ObjectStore, StorageObject, StoredObjectInfo};
use crate::error::StoreError;

/// `Cache-Control` set on every uploaded object.
pub const DEFAULT_CACHE_CONTROL: &str = "max-age=3600";

/// S3-backed implementation of ObjectStore.
///
/// Works with AWS S3 and S3-compatible storage (MinIO, R2, etc.). All
/// objects live in a single bucket; keys are used verbatim.
#[derive(Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
    identifier: String,
}

impl S3Store {
    /// Create a store for `bucket`. No request is made until first use.
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        let bucket = bucket.into();
        let identifier = format!("s3://{}", bucket);
        Self {
            client,
            bucket,
            identifier,
        }
    }

    /// Get the bucket name.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn location(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, key)
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put(&self, object: &StorageObject) -> Result<(), StoreError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&object.key)
            .content_type(&object.content_type)
            .content_length(object.bytes.len() as i64)
            .cache_control(DEFAULT_CACHE_CONTROL)
            .body(ByteStream::from(object.bytes.clone()))
            .send()
            .await
            .map_err(|e| classify_sdk_error(e, &self.location(&object.key)))?;

        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let result = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(e) => {
                // HeadObject has no body, so a missing key only shows up as
                // the modeled NotFound error or a bare 404 status
                let is_not_found = e
                    .as_service_error()
                    .map(|se| se.is_not_found())
                    .unwrap_or(false);

                if is_not_found {
                    return Ok(false);
                }

                match classify_sdk_error(e, &self.location(key)) {
                    StoreError::NotFound(_) => Ok(false),
                    other => Err(other),
                }
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        // S3 answers 204 for missing keys too, so NotFound is never reported
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify_sdk_error(e, &self.location(key)))?;

        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<StoredObjectInfo>, StoreError> {
        let mut objects = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix);
            if let Some(token) = continuation.take() {
                request = request.continuation_token(token);
            }

            let page = request
                .send()
                .await
                .map_err(|e| classify_sdk_error(e, &self.location(prefix)))?;

            for object in page.contents() {
                let Some(key) = object.key() else {
                    continue;
                };
                objects.push(StoredObjectInfo {
                    key: key.to_string(),
                    size_bytes: object.size().unwrap_or(0).max(0) as u64,
                    last_modified: object.last_modified().map(|t| t.secs()),
                });
            }

            match page.next_continuation_token() {
                Some(token) if page.is_truncated().unwrap_or(false) => {
                    debug!(bucket = %self.bucket, prefix, "Fetching next listing page");
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

/// Map an SDK error onto the store taxonomy.
///
/// Dispatch and timeout failures and 429/5xx responses are transient; 404 is
/// `NotFound` and 403 is `AccessDenied`. Anything else is reported as a plain
/// S3 error.
fn classify_sdk_error<E>(err: SdkError<E>, target: &str) -> StoreError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let message = format!("{}: {}", target, DisplayErrorContext(&err));

    if matches!(
        err,
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_)
    ) {
        return StoreError::Connection(message);
    }

    let status = err.raw_response().map(|r| r.status().as_u16());
    classify_status(status, target, message)
}

fn classify_status(status: Option<u16>, target: &str, message: String) -> StoreError {
    match status {
        Some(404) => StoreError::NotFound(target.to_string()),
        Some(403) => StoreError::AccessDenied(message),
        Some(status) if status == 429 || status >= 500 => {
            StoreError::Unavailable { status, message }
        }
        _ => StoreError::S3(message),
    }
}

/// Create an S3 client with optional custom endpoint and region.
///
/// Use a custom endpoint for S3-compatible services like MinIO:
/// ```ignore
/// let client = create_s3_client(Some("http://localhost:9000"), "us-east-1").await;
/// ```
///
/// For AWS S3, pass `None` to use the default endpoint:
/// ```ignore
/// let client = create_s3_client(None, "us-east-1").await;
/// ```
pub async fn create_s3_client(endpoint_url: Option<&str>, region: &str) -> Client {
    let region = aws_config::Region::new(region.to_string());
    let mut config_loader =
        aws_config::defaults(aws_config::BehaviorVersion::latest()).region(region);

    if let Some(endpoint) = endpoint_url {
        config_loader = config_loader.endpoint_url(endpoint);
    }

    let sdk_config = config_loader.load().await;

    // S3-compatible services generally need path-style addressing
    let s3_config = if endpoint_url.is_some() {
        aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build()
    } else {
        aws_sdk_s3::config::Builder::from(&sdk_config).build()
    };

    Client::from_conf(s3_config)
}
