use std::time::Duration;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::operation::create_bucket::CreateBucketError;
use aws_sdk_s3::operation::head_bucket::HeadBucketError;
use aws_sdk_s3::operation::head_object::HeadObjectError;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, ChecksumMode, CreateBucketConfiguration};
use aws_sdk_s3::{Client, error::SdkError};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};

use crate::application::ports::object_store_port::{ObjectStorePort, StoredObject};
use crate::bootstrap::config::S3Config;
use crate::infrastructure::storage::{object_key, sha256_hex};

pub struct S3ObjectStore {
    client: Client,
    bucket: String,
    endpoint_url: String,
    proxy_url: Option<String>,
    url_expiration: Duration,
}

impl S3ObjectStore {
    pub async fn new(cfg: &S3Config) -> anyhow::Result<Self> {
        let shared_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(cfg.region.clone()))
            .load()
            .await;

        let creds = Credentials::new(
            cfg.access_key.clone(),
            cfg.secret_key.clone(),
            None,
            None,
            "fastemplate-s3-static",
        );
        let conf = aws_sdk_s3::config::Builder::from(&shared_config)
            .credentials_provider(creds)
            .endpoint_url(cfg.endpoint_url.clone())
            .force_path_style(true)
            .build();
        let client = Client::from_conf(conf);

        let target = format!("bucket {} on {}", cfg.bucket_name, cfg.endpoint_url);
        ensure_bucket(&client, &cfg.bucket_name, &cfg.region)
            .await
            .with_context(|| format!("unable to access {target}"))?;
        tracing::info!(endpoint = %cfg.endpoint_url, bucket = %cfg.bucket_name, "s3_connected");

        Ok(Self {
            client,
            bucket: cfg.bucket_name.clone(),
            endpoint_url: cfg.endpoint_url.clone(),
            proxy_url: cfg.proxy_url.clone(),
            url_expiration: Duration::from_secs(cfg.url_expiration_secs),
        })
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("failed to delete object {key}"))?;
        Ok(())
    }
}

/// Points a presigned URL at the public proxy instead of the internal endpoint.
pub fn rewrite_origin(url: &str, endpoint_url: &str, proxy_url: Option<&str>) -> String {
    match proxy_url {
        Some(proxy) if !proxy.is_empty() => match url.strip_prefix(endpoint_url) {
            Some(rest) => format!("{proxy}{rest}"),
            None => url.to_string(),
        },
        _ => url.to_string(),
    }
}

#[async_trait]
impl ObjectStorePort for S3ObjectStore {
    async fn upload(&self, bytes: &[u8], content_type: &str) -> anyhow::Result<StoredObject> {
        let content_hash = sha256_hex(bytes);
        let key = object_key(chrono::Utc::now(), &content_hash, content_type);
        let checksum = STANDARD.encode(Sha256::digest(bytes));

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type(content_type)
            .checksum_sha256(&checksum)
            .body(ByteStream::from(bytes.to_vec()))
            .send()
            .await
            .with_context(|| format!("failed to upload object {key}"))?;
        tracing::info!(bucket = %self.bucket, key = %key, size = bytes.len(), "object_uploaded");

        // Integrity check against what the store actually kept
        let head = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&key)
            .checksum_mode(ChecksumMode::Enabled)
            .send()
            .await
            .with_context(|| format!("failed to read back object {key}"))?;
        let size_ok = head.content_length() == Some(bytes.len() as i64);
        let checksum_ok = head
            .checksum_sha256()
            .map(|stored| stored.split('-').next() == Some(checksum.as_str()))
            .unwrap_or(true);
        if !(size_ok && checksum_ok) {
            if let Err(err) = self.delete_object(&key).await {
                tracing::warn!(key = %key, error = ?err, "failed to delete corrupted upload");
            }
            anyhow::bail!(
                "data was corrupted during upload: {checksum} != {:?}",
                head.checksum_sha256()
            );
        }

        Ok(StoredObject {
            key,
            size: bytes.len() as i64,
            content_hash,
        })
    }

    async fn exists(&self, key: &str) -> anyhow::Result<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) => match err {
                SdkError::ServiceError(service_err) => {
                    let head_err: &HeadObjectError = service_err.err();
                    if head_err.is_not_found() {
                        Ok(false)
                    } else {
                        Err(anyhow!("head_object error for {}: {}", key, head_err))
                    }
                }
                other => Err(anyhow!("head_object failed for {}: {}", key, other)),
            },
        }
    }

    async fn public_url(&self, key: &str) -> anyhow::Result<Option<String>> {
        if !self.exists(key).await? {
            return Ok(None);
        }
        let presign = PresigningConfig::expires_in(self.url_expiration)?;
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presign)
            .await
            .with_context(|| format!("failed to presign {key}"))?;
        Ok(Some(rewrite_origin(request.uri(), &self.endpoint_url, self.proxy_url.as_deref())))
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.delete_object(key).await
    }
}

async fn ensure_bucket(client: &Client, bucket: &str, region: &str) -> anyhow::Result<()> {
    match client.head_bucket().bucket(bucket).send().await {
        Ok(_) => return Ok(()),
        Err(SdkError::ServiceError(service_err)) => {
            if !matches!(service_err.err(), HeadBucketError::NotFound(_)) {
                return Err(anyhow!(service_err.err().to_string()));
            }
        }
        Err(err) => return Err(anyhow!(err.to_string())),
    }

    let mut request = client.create_bucket().bucket(bucket);
    // us-east-1 rejects an explicit location constraint
    if region != "us-east-1" {
        request = request.create_bucket_configuration(
            CreateBucketConfiguration::builder()
                .location_constraint(BucketLocationConstraint::from(region))
                .build(),
        );
    }
    match request.send().await {
        Ok(_) => {
            tracing::info!(bucket = %bucket, "s3_bucket_created");
            Ok(())
        }
        Err(SdkError::ServiceError(service_err)) => match service_err.err() {
            CreateBucketError::BucketAlreadyOwnedByYou(_) => Ok(()),
            CreateBucketError::BucketAlreadyExists(_) => Ok(()),
            other => Err(anyhow!(other.to_string())),
        },
        Err(err) => Err(anyhow!(err.to_string())),
    }
}
