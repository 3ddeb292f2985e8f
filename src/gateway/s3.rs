//! S3 gateway implementation using AWS SDK
//!
//! Drives the multipart upload protocol against one configured bucket. Part
//! URLs are SigV4 presigned `UploadPart` requests, so the client PUTs bytes
//! straight to the backend.

use super::traits::{GatewayError, ObjectStoreGateway, RemoteSession};
use crate::config::BackendConfig;
use crate::session::CompletedPart;
use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::timeout::TimeoutConfig;
use aws_sdk_s3::config::BehaviorVersion;
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::operation::abort_multipart_upload::AbortMultipartUploadError;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart as S3CompletedPart};
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, instrument};

/// SigV4 presigned URLs cannot outlive this.
pub const MAX_PRESIGN_VALIDITY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// S3 gateway bound to a single bucket
pub struct S3Gateway {
    client: Client,
    bucket: String,
    public_base_url: String,
}

impl S3Gateway {
    /// Build an S3 client from a BackendConfig without creating a gateway.
    pub fn build_client(config: &BackendConfig) -> Result<Client, GatewayError> {
        let BackendConfig::S3 {
            endpoint,
            region,
            force_path_style,
            access_key_id,
            secret_access_key,
            operation_timeout,
            ..
        } = config
        else {
            return Err(GatewayError::Other(
                "S3Gateway requires S3 configuration".to_string(),
            ));
        };

        // Require explicit credentials, never the ambient AWS credential chain
        let credentials = match (access_key_id, secret_access_key) {
            (Some(key_id), Some(secret)) => {
                Credentials::new(key_id, secret, None, None, "upload_orchestrator-config")
            }
            _ => {
                return Err(GatewayError::Other(
                    "S3 backend requires explicit credentials: set UPO_S3_ACCESS_KEY_ID and UPO_S3_SECRET_ACCESS_KEY".to_string(),
                ));
            }
        };

        let timeouts = TimeoutConfig::builder()
            .operation_timeout(*operation_timeout)
            .build();

        let mut s3_config_builder = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(region.clone()))
            .credentials_provider(credentials)
            .force_path_style(*force_path_style)
            .timeout_config(timeouts);

        if let Some(ep) = endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(ep);
        }

        Ok(Client::from_conf(s3_config_builder.build()))
    }

    /// Create a new S3 gateway from configuration
    pub fn new(config: &BackendConfig) -> Result<Self, GatewayError> {
        let client = Self::build_client(config)?;
        let BackendConfig::S3 {
            bucket,
            endpoint,
            region,
            public_base_url,
            ..
        } = config
        else {
            return Err(GatewayError::Other(
                "S3Gateway requires S3 configuration".to_string(),
            ));
        };

        let public_base_url = match (public_base_url, endpoint) {
            (Some(base), _) => base.trim_end_matches('/').to_string(),
            (None, Some(ep)) => format!("{}/{}", ep.trim_end_matches('/'), bucket),
            (None, None) => format!("https://{}.s3.{}.amazonaws.com", bucket, region),
        };

        debug!("S3Gateway initialized for bucket {}", bucket);
        Ok(Self {
            client,
            bucket: bucket.clone(),
            public_base_url,
        })
    }

    fn classify_s3_error(e: &SdkError<impl std::fmt::Debug>, context: &str) -> GatewayError {
        match e {
            SdkError::TimeoutError(_) => GatewayError::Timeout(context.to_string()),
            _ => GatewayError::S3(format!("{} failed: {:?}", context, e)),
        }
    }
}

fn to_chrono(dt: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(dt.secs(), dt.subsec_nanos())
}

#[async_trait]
impl ObjectStoreGateway for S3Gateway {
    #[instrument(skip(self))]
    async fn create_session(&self, key: &str, content_type: &str) -> Result<String, GatewayError> {
        let response = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| Self::classify_s3_error(&e, "create_multipart_upload"))?;

        let upload_id = response.upload_id().ok_or_else(|| {
            GatewayError::S3("create_multipart_upload returned no upload id".to_string())
        })?;

        debug!("S3 CreateMultipartUpload {}/{} -> {}", self.bucket, key, upload_id);
        Ok(upload_id.to_string())
    }

    #[instrument(skip(self))]
    async fn presign_part_upload(
        &self,
        key: &str,
        remote_session_id: &str,
        part_number: u32,
        validity: Duration,
    ) -> Result<String, GatewayError> {
        let presigning = PresigningConfig::expires_in(validity)
            .map_err(|e| GatewayError::Presign(e.to_string()))?;

        let part_number = i32::try_from(part_number)
            .map_err(|_| GatewayError::Presign(format!("part number {} out of range", part_number)))?;

        let request = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(remote_session_id)
            .part_number(part_number)
            .presigned(presigning)
            .await
            .map_err(|e| GatewayError::Presign(format!("upload_part: {:?}", e)))?;

        Ok(request.uri().to_string())
    }

    #[instrument(skip(self, parts), fields(parts = parts.len()))]
    async fn complete_session(
        &self,
        key: &str,
        remote_session_id: &str,
        parts: &[CompletedPart],
    ) -> Result<(), GatewayError> {
        let s3_parts: Vec<S3CompletedPart> = parts
            .iter()
            .map(|p| {
                S3CompletedPart::builder()
                    .part_number(p.part_number as i32)
                    .e_tag(p.quoted_etag())
                    .build()
            })
            .collect();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(remote_session_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(s3_parts))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| {
                if let SdkError::ServiceError(service_error) = &e {
                    if service_error.err().code() == Some("NoSuchUpload") {
                        return GatewayError::NoSuchUpload(remote_session_id.to_string());
                    }
                }
                Self::classify_s3_error(&e, "complete_multipart_upload")
            })?;

        debug!(
            "S3 CompleteMultipartUpload {}/{} ({} parts)",
            self.bucket,
            key,
            parts.len()
        );
        Ok(())
    }

    #[instrument(skip(self))]
    async fn abort_session(&self, key: &str, remote_session_id: &str) -> Result<(), GatewayError> {
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(remote_session_id)
            .send()
            .await
            .map_err(|e| {
                if let SdkError::ServiceError(service_error) = &e {
                    if matches!(
                        service_error.err(),
                        AbortMultipartUploadError::NoSuchUpload(_)
                    ) {
                        return GatewayError::NoSuchUpload(remote_session_id.to_string());
                    }
                }
                Self::classify_s3_error(&e, "abort_multipart_upload")
            })?;

        debug!("S3 AbortMultipartUpload {}/{} {}", self.bucket, key, remote_session_id);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_open_sessions(&self) -> Result<Vec<RemoteSession>, GatewayError> {
        let mut results = Vec::new();
        let mut key_marker: Option<String> = None;
        let mut upload_id_marker: Option<String> = None;

        loop {
            let response = self
                .client
                .list_multipart_uploads()
                .bucket(&self.bucket)
                .set_key_marker(key_marker.take())
                .set_upload_id_marker(upload_id_marker.take())
                .send()
                .await
                .map_err(|e| Self::classify_s3_error(&e, "list_multipart_uploads"))?;

            for upload in response.uploads() {
                let (Some(key), Some(upload_id)) = (upload.key(), upload.upload_id()) else {
                    continue;
                };
                // Without an initiation time the session's age is unknown; treat it as new.
                let initiated_at = upload
                    .initiated()
                    .and_then(to_chrono)
                    .unwrap_or_else(Utc::now);
                results.push(RemoteSession {
                    key: key.to_string(),
                    remote_session_id: upload_id.to_string(),
                    initiated_at,
                });
            }

            if response.is_truncated().unwrap_or(false) {
                key_marker = response.next_key_marker().map(str::to_string);
                upload_id_marker = response.next_upload_id_marker().map(str::to_string);
                if key_marker.is_none() && upload_id_marker.is_none() {
                    break;
                }
            } else {
                break;
            }
        }

        debug!("Listed {} open multipart uploads in {}", results.len(), self.bucket);
        Ok(results)
    }

    fn object_url(&self, key: &str) -> String {
        let encoded: Vec<String> = key
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        format!("{}/{}", self.public_base_url, encoded.join("/"))
    }
}
