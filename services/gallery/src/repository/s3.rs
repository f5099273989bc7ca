use crate::config::{S3Config, MIN_MULTIPART_PART_BYTES};
use crate::error::{Error, Result};
use crate::repository::ObjectStorage;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client as S3Client;
use aws_types::region::Region;
use bytes::Bytes;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// S3 object storage for event covers and photos
pub struct S3Storage {
    client: S3Client,
    bucket: String,
    public_base: String,
    config: S3Config,
}

impl S3Storage {
    /// Create a new S3 storage client
    pub async fn new(config: &S3Config) -> anyhow::Result<Self> {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        // Configure custom endpoint for MinIO/LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        // Force path-style access for MinIO compatibility
        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = S3Client::from_conf(s3_config_builder.build());

        info!(
            bucket = %config.bucket,
            region = %config.region,
            "S3 storage initialized"
        );

        Ok(Self {
            client,
            bucket: config.bucket.clone(),
            public_base: public_base_url(config),
            config: config.clone(),
        })
    }

    /// Single-part upload for small files
    async fn simple_upload(&self, key: &str, data: Bytes, content_type: &str) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| storage_error("upload", key, e))?;

        Ok(())
    }

    /// Multipart upload for large files.
    ///
    /// Once the upload is created, any failure aborts it so no orphaned
    /// parts stay in the bucket.
    async fn multipart_upload(&self, key: &str, data: Bytes, content_type: &str) -> Result<()> {
        let create_response = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| storage_error("create multipart upload", key, e))?;

        let upload_id = create_response
            .upload_id()
            .ok_or_else(|| Error::Storage(format!("No upload ID returned for {}", key)))?
            .to_string();

        let result = self.upload_parts(key, &upload_id, data).await;
        abort_on_failure(key, result, || self.abort_multipart_upload(key, &upload_id)).await
    }

    /// Upload every part and complete the multipart upload
    async fn upload_parts(&self, key: &str, upload_id: &str, data: Bytes) -> Result<()> {
        let part_size = self.config.part_size_bytes.max(MIN_MULTIPART_PART_BYTES);
        let mut completed_parts = Vec::new();
        let mut part_number = 1;

        for chunk in data.chunks(part_size) {
            let upload_part_response = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(Bytes::copy_from_slice(chunk)))
                .send()
                .await
                .map_err(|e| storage_error("upload part", key, e))?;

            completed_parts.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .e_tag(upload_part_response.e_tag().unwrap_or_default())
                    .build(),
            );
            part_number += 1;
        }

        let completed_upload = CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed_upload)
            .send()
            .await
            .map_err(|e| storage_error("complete multipart upload", key, e))?;

        Ok(())
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<()> {
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| storage_error("abort multipart upload", key, e))?;

        metrics::counter!("gallery.storage.multipart_aborted").increment(1);
        Ok(())
    }
}

/// Run `abort` when `result` failed, keeping the original error
async fn abort_on_failure<T, A, F>(key: &str, result: Result<T>, abort: A) -> Result<T>
where
    A: FnOnce() -> F,
    F: Future<Output = Result<()>>,
{
    match result {
        Ok(value) => Ok(value),
        Err(e) => {
            match abort().await {
                Ok(()) => debug!(key = %key, "Multipart upload aborted"),
                Err(abort_err) => {
                    warn!(key = %key, error = %abort_err, "Failed to abort multipart upload")
                }
            }
            Err(e)
        }
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    #[instrument(skip(self, data), fields(size_bytes = data.len()))]
    async fn upload(&self, key: &str, data: Bytes, content_type: &str, upsert: bool) -> Result<()> {
        if !upsert && self.exists(key).await? {
            return Err(Error::Storage(format!("The resource already exists: {}", key)));
        }

        if data.len() > self.config.multipart_threshold_bytes {
            self.multipart_upload(key, data, content_type).await?;
        } else {
            self.simple_upload(key, data, content_type).await?;
        }

        debug!(key = %key, "Object uploaded");
        metrics::counter!("gallery.storage.uploads").increment(1);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| storage_error("remove", key, e))?;

        debug!(key = %key, "Object removed");
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                if e.as_service_error()
                    .map(|e| e.is_not_found())
                    .unwrap_or(false)
                {
                    Ok(false)
                } else {
                    Err(storage_error("check", key, e))
                }
            }
        }
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base, key)
    }

    async fn download_url(&self, key: &str, filename: &str) -> Result<String> {
        let expiry = Duration::from_secs(self.config.presigned_url_expiry_secs);
        let presigning_config = PresigningConfig::expires_in(expiry)
            .map_err(|e| Error::Storage(format!("Failed to create presigning config: {}", e)))?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .response_content_disposition(attachment_disposition(filename))
            .presigned(presigning_config)
            .await
            .map_err(|e| storage_error("presign", key, e))?;

        Ok(presigned.uri().to_string())
    }
}

fn storage_error(action: &str, key: &str, e: impl std::fmt::Display) -> Error {
    warn!(action = action, key = %key, error = %e, "Object storage request failed");
    Error::Storage(format!("Failed to {} {}: {}", action, key, e))
}

/// Base of public object URLs: explicit prefix, custom endpoint, or AWS host
fn public_base_url(config: &S3Config) -> String {
    if let Some(ref public_url) = config.public_url {
        return public_url.trim_end_matches('/').to_string();
    }

    match config.endpoint_url {
        Some(ref endpoint) if config.force_path_style => {
            format!("{}/{}", endpoint.trim_end_matches('/'), config.bucket)
        }
        Some(ref endpoint) => {
            let endpoint = endpoint.trim_end_matches('/');
            match endpoint.split_once("://") {
                Some((scheme, host)) => format!("{}://{}.{}", scheme, config.bucket, host),
                None => format!("{}/{}", endpoint, config.bucket),
            }
        }
        None => format!(
            "https://{}.s3.{}.amazonaws.com",
            config.bucket, config.region
        ),
    }
}

/// `Content-Disposition` value that forces a download under `filename`
fn attachment_disposition(filename: &str) -> String {
    let safe: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' | '\r' | '\n' => '_',
            c => c,
        })
        .collect();
    format!("attachment; filename=\"{}\"", safe)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> S3Config {
        S3Config {
            bucket: "wedding-events".to_string(),
            region: "eu-west-1".to_string(),
            endpoint_url: None,
            force_path_style: false,
            public_url: None,
            presigned_url_expiry_secs: 3600,
            multipart_threshold_bytes: 5 * 1024 * 1024,
            part_size_bytes: 5 * 1024 * 1024,
        }
    }

    #[test]
    fn test_public_base_aws_virtual_host() {
        assert_eq!(
            public_base_url(&test_config()),
            "https://wedding-events.s3.eu-west-1.amazonaws.com"
        );
    }

    #[test]
    fn test_public_base_path_style_endpoint() {
        let config = S3Config {
            endpoint_url: Some("http://localhost:9000/".to_string()),
            force_path_style: true,
            ..test_config()
        };
        assert_eq!(public_base_url(&config), "http://localhost:9000/wedding-events");
    }

    #[test]
    fn test_public_base_virtual_host_endpoint() {
        let config = S3Config {
            endpoint_url: Some("https://storage.example.com".to_string()),
            ..test_config()
        };
        assert_eq!(
            public_base_url(&config),
            "https://wedding-events.storage.example.com"
        );
    }

    #[test]
    fn test_public_base_explicit_prefix() {
        let config = S3Config {
            public_url: Some("https://cdn.example.com/photos/".to_string()),
            endpoint_url: Some("http://localhost:9000".to_string()),
            ..test_config()
        };
        assert_eq!(public_base_url(&config), "https://cdn.example.com/photos");
    }

    #[tokio::test]
    async fn test_failed_multipart_upload_is_aborted() {
        let aborted = std::cell::Cell::new(false);
        let flag = &aborted;
        let result: Result<()> = abort_on_failure(
            "1/party/1-big.jpg",
            Err(Error::Storage("Failed to upload part 1/party/1-big.jpg".to_string())),
            || async move {
                flag.set(true);
                Ok(())
            },
        )
        .await;

        assert!(aborted.get());
        assert_eq!(
            result.unwrap_err().to_string(),
            "Failed to upload part 1/party/1-big.jpg"
        );
    }

    #[tokio::test]
    async fn test_abort_failure_keeps_original_error() {
        let result: Result<()> = abort_on_failure(
            "1/party/1-big.jpg",
            Err(Error::Storage("complete failed".to_string())),
            || async { Err(Error::Storage("abort failed".to_string())) },
        )
        .await;

        assert_eq!(result.unwrap_err().to_string(), "complete failed");
    }

    #[tokio::test]
    async fn test_successful_upload_is_not_aborted() {
        let aborted = std::cell::Cell::new(false);
        let flag = &aborted;
        let result = abort_on_failure("1/party/1-big.jpg", Ok(42), || async move {
            flag.set(true);
            Ok(())
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert!(!aborted.get());
    }

    #[test]
    fn test_attachment_disposition_escapes_quotes() {
        assert_eq!(
            attachment_disposition("a.jpg"),
            "attachment; filename=\"a.jpg\""
        );
        assert_eq!(
            attachment_disposition("bad\"name.jpg"),
            "attachment; filename=\"bad_name.jpg\""
        );
    }
}
