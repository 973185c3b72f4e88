//! S3-compatible storage backend
//!
//! Containers map to buckets. Object keys are the backup object names,
//! optionally under a fixed key prefix:
//! - {prefix}/{name} - chunk, manifest and block digest objects

use async_trait::async_trait;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use aws_sdk_s3::{primitives::ByteStream, Client};
use bytes::Bytes;
use tracing::{debug, instrument};

use crate::backend::ObjectStore;
use crate::error::{StorageError, StorageResult};

/// S3 storage backend configuration
#[derive(Debug, Clone)]
pub struct S3Config {
    /// Optional prefix for all keys
    pub prefix: Option<String>,
    /// Region (for AWS S3)
    pub region: Option<String>,
    /// Endpoint URL (for MinIO, R2, etc.)
    pub endpoint: Option<String>,
}

impl S3Config {
    /// Create config for AWS S3
    pub fn aws(region: &str) -> Self {
        Self {
            prefix: None,
            region: Some(region.to_string()),
            endpoint: None,
        }
    }

    /// Create config for S3-compatible service (MinIO, R2, etc.)
    pub fn compatible(endpoint: &str) -> Self {
        Self {
            prefix: None,
            region: None,
            endpoint: Some(endpoint.to_string()),
        }
    }

    /// Set a key prefix
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = Some(prefix.trim_end_matches('/').to_string());
        self
    }
}

/// S3 storage backend
pub struct S3Backend {
    client: Client,
    config: S3Config,
}

/// Transport-level failures: the request never got a response
fn is_transport<E, R>(err: &SdkError<E, R>) -> bool {
    matches!(
        err,
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_)
    )
}

/// Location constraint for new buckets
///
/// us-east-1 rejects an explicit constraint; every other AWS region requires
/// one. Custom endpoints get none.
fn bucket_configuration(region: Option<&str>) -> Option<CreateBucketConfiguration> {
    match region {
        Some(region) if region != "us-east-1" => Some(
            CreateBucketConfiguration::builder()
                .location_constraint(BucketLocationConstraint::from(region))
                .build(),
        ),
        _ => None,
    }
}

impl S3Backend {
    /// Create a new S3 backend
    pub async fn new(config: S3Config) -> StorageResult<Self> {
        let mut aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest());

        if let Some(region) = &config.region {
            aws_config = aws_config.region(aws_sdk_s3::config::Region::new(region.clone()));
        }

        if let Some(endpoint) = &config.endpoint {
            aws_config = aws_config.endpoint_url(endpoint);
        }

        let sdk_config = aws_config.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.endpoint.is_some()) // Use path style for non-AWS
            .build();

        let client = Client::from_conf(s3_config);

        Ok(Self { client, config })
    }

    /// Build a backend around an existing client
    pub fn from_client(client: Client, config: S3Config) -> Self {
        Self { client, config }
    }

    /// Apply optional prefix
    fn key(&self, name: &str) -> String {
        match &self.config.prefix {
            Some(prefix) => format!("{}/{}", prefix, name),
            None => name.to_string(),
        }
    }

    /// Strip optional prefix from a listed key
    fn strip_key<'a>(&self, key: &'a str) -> &'a str {
        match &self.config.prefix {
            Some(prefix) => key
                .strip_prefix(prefix.as_str())
                .and_then(|rest| rest.strip_prefix('/'))
                .unwrap_or(key),
            None => key,
        }
    }
}

#[async_trait]
impl ObjectStore for S3Backend {
    fn name(&self) -> &str {
        "s3"
    }

    async fn list_containers(&self) -> StorageResult<Vec<String>> {
        let response = self.client.list_buckets().send().await.map_err(|e| {
            if is_transport(&e) {
                StorageError::ConnectionFailure(e.to_string())
            } else {
                StorageError::ContainerError {
                    container: String::new(),
                    reason: e.into_service_error().to_string(),
                }
            }
        })?;

        Ok(response
            .buckets
            .unwrap_or_default()
            .into_iter()
            .filter_map(|bucket| bucket.name)
            .collect())
    }

    #[instrument(skip(self))]
    async fn create_container(&self, container: &str) -> StorageResult<()> {
        let request = self
            .client
            .create_bucket()
            .bucket(container)
            .set_create_bucket_configuration(bucket_configuration(self.config.region.as_deref()));

        match request.send().await {
            Ok(_) => Ok(()),
            Err(e) if is_transport(&e) => Err(StorageError::ConnectionFailure(e.to_string())),
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_bucket_already_owned_by_you() {
                    debug!("Bucket already exists");
                    Ok(())
                } else if service_error.is_bucket_already_exists() {
                    Err(StorageError::ContainerError {
                        container: container.to_string(),
                        reason: "bucket name is owned by another account".into(),
                    })
                } else {
                    Err(StorageError::ContainerError {
                        container: container.to_string(),
                        reason: service_error.to_string(),
                    })
                }
            }
        }
    }

    #[instrument(skip(self, data), fields(size = data.len()))]
    async fn put_object(&self, container: &str, name: &str, data: Bytes) -> StorageResult<()> {
        self.client
            .put_object()
            .bucket(container)
            .key(self.key(name))
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| {
                if is_transport(&e) {
                    StorageError::ConnectionFailure(e.to_string())
                } else {
                    StorageError::ObjectWriteFailure {
                        container: container.to_string(),
                        name: name.to_string(),
                        reason: e.into_service_error().to_string(),
                    }
                }
            })?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_object(&self, container: &str, name: &str) -> StorageResult<Bytes> {
        let response = match self
            .client
            .get_object()
            .bucket(container)
            .key(self.key(name))
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if is_transport(&e) => {
                return Err(StorageError::ConnectionFailure(e.to_string()))
            }
            Err(e) => {
                let service_error = e.into_service_error();
                return Err(if service_error.is_no_such_key() {
                    StorageError::ObjectNotFound {
                        container: container.to_string(),
                        name: name.to_string(),
                    }
                } else {
                    StorageError::ObjectReadFailure {
                        container: container.to_string(),
                        name: name.to_string(),
                        reason: service_error.to_string(),
                    }
                });
            }
        };

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::ObjectReadFailure {
                container: container.to_string(),
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        Ok(data.into_bytes())
    }

    #[instrument(skip(self))]
    async fn delete_object(&self, container: &str, name: &str) -> StorageResult<()> {
        // S3 reports success for missing keys
        self.client
            .delete_object()
            .bucket(container)
            .key(self.key(name))
            .send()
            .await
            .map_err(|e| {
                if is_transport(&e) {
                    StorageError::ConnectionFailure(e.to_string())
                } else {
                    StorageError::ObjectDeleteFailure {
                        container: container.to_string(),
                        name: name.to_string(),
                        reason: e.into_service_error().to_string(),
                    }
                }
            })?;

        Ok(())
    }

    async fn list_objects(&self, container: &str, prefix: &str) -> StorageResult<Vec<String>> {
        let full_prefix = self.key(prefix);
        let mut names = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(container)
                .prefix(&full_prefix);

            if let Some(token) = continuation_token.take() {
                request = request.continuation_token(token);
            }

            let response = request.send().await.map_err(|e| {
                if is_transport(&e) {
                    StorageError::ConnectionFailure(e.to_string())
                } else {
                    StorageError::ContainerError {
                        container: container.to_string(),
                        reason: e.into_service_error().to_string(),
                    }
                }
            })?;

            if let Some(contents) = response.contents {
                for object in contents {
                    if let Some(key) = object.key {
                        names.push(self.strip_key(&key).to_string());
                    }
                }
            }

            if response.is_truncated.unwrap_or(false) {
                continuation_token = response.next_continuation_token;
            } else {
                break;
            }
        }

        Ok(names)
    }
}
