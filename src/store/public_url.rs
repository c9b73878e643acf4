use url::Url;

/// Derives stable public URLs from storage keys.
///
/// The URL is `<base>/<key>` with each key segment percent-encoded. This is a
/// pure function of the base and the key: it never touches the store.
///
/// # Example
///
/// ```ignore
/// let urls = PublicUrlBuilder::new("https://cdn.example.com/api/images")?;
/// assert_eq!(
///     urls.url_for("user 1/a.png"),
///     "https://cdn.example.com/api/images/user%201/a.png"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicUrlBuilder {
    base: String,
}

impl PublicUrlBuilder {
    /// Create a builder for an absolute http(s) base URL.
    pub fn new(base: &str) -> Result<Self, String> {
        let parsed = Url::parse(base).map_err(|e| format!("invalid base URL '{}': {}", base, e))?;

        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(format!(
                "base URL '{}' must use http or https, got '{}'",
                base,
                parsed.scheme()
            ));
        }
        if parsed.query().is_some() || parsed.fragment().is_some() {
            return Err(format!(
                "base URL '{}' must not have a query or fragment",
                base
            ));
        }

        Ok(Self {
            base: parsed.as_str().trim_end_matches('/').to_string(),
        })
    }

    /// Virtual-hosted AWS S3 URL for `bucket` in `region`.
    pub fn for_s3_bucket(bucket: &str, region: &str) -> Result<Self, String> {
        Self::new(&format!("https://{}.s3.{}.amazonaws.com", bucket, region))
    }

    /// Path-style URL for a bucket behind a custom S3-compatible endpoint.
    pub fn for_s3_endpoint(endpoint: &str, bucket: &str) -> Result<Self, String> {
        Self::new(&format!(
            "{}/{}",
            endpoint.trim_end_matches('/'),
            urlencoding::encode(bucket)
        ))
    }

    /// Public URL of `key`.
    pub fn url_for(&self, key: &str) -> String {
        let encoded: Vec<_> = key.split('/').map(urlencoding::encode).collect();
        format!("{}/{}", self.base, encoded.join("/"))
    }

    pub fn base(&self) -> &str {
        &self.base
    }
}
