//! 🪣 S3Store: `ObjectStore` over the AWS SDK.
//!
//! The upload handle buffers until it has a full part, so memory per open object stays at one
//! part (8 MiB) no matter how big the collection is. Objects smaller than one part never start a
//! multipart upload at all; `commit` sends them as a single `PutObject`.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    BucketLocationConstraint, CompletedMultipartUpload, CompletedPart, CreateBucketConfiguration,
};
use serde::Deserialize;
use tracing::{debug, info, trace, warn};

use crate::backends::{ObjectDownload, ObjectReader, ObjectStore, ObjectUpload};

// -- 📏 S3 wants parts of at least 5 MiB (except the last). 8 MiB keeps us well clear.
const PART_SIZE_BYTES: usize = 8 * 1024 * 1024;

// -- 🌎 the one region that refuses a LocationConstraint naming itself
const DEFAULT_REGION: &str = "us-east-1";

/// 🔧 S3 (or S3-compatible) connection settings. Credentials come from the usual AWS chain.
#[derive(Debug, Deserialize, Clone)]
pub struct S3StoreConfig {
    /// 🌎 AWS region. Defaults to us-east-1, where every bucket eventually retires.
    #[serde(default = "default_s3_region")]
    pub region: String,
    /// 🔌 Custom endpoint for S3-compatible gateways, e.g. `https://gateway.storjshare.io`.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Bucket in the path instead of the host name. Most self-hosted gateways want this.
    #[serde(default)]
    pub force_path_style: bool,
}

fn default_s3_region() -> String {
    DEFAULT_REGION.to_string()
}

#[derive(Debug, Clone)]
pub(crate) struct S3Store {
    client: Client,
    region: String,
}

impl S3Store {
    /// 🚀 Build a client from the environment (env vars → ~/.aws/config → IAM role), then
    /// bend it toward the configured region and endpoint.
    pub(crate) async fn new(config: S3StoreConfig) -> Result<Self> {
        let sdk_config = aws_config::from_env()
            .region(aws_sdk_s3::config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut builder =
            aws_sdk_s3::config::Builder::from(&sdk_config).force_path_style(config.force_path_style);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }
        info!(
            "🪣 S3 store ready (region {}, endpoint {})",
            config.region,
            config.endpoint.as_deref().unwrap_or("aws default")
        );

        Ok(Self {
            client: Client::from_conf(builder.build()),
            region: config.region,
        })
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    type Upload = S3Upload;

    async fn ensure_bucket(&self, bucket: &str) -> Result<()> {
        if self.stat_bucket(bucket).await.is_ok() {
            return Ok(());
        }
        info!("🏗️ bucket '{bucket}' not found, creating it");
        let mut request = self.client.create_bucket().bucket(bucket);
        if self.region != DEFAULT_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }
        request
            .send()
            .await
            .with_context(|| format!("💀 could not create bucket '{bucket}'"))?;
        Ok(())
    }

    async fn stat_bucket(&self, bucket: &str) -> Result<()> {
        self.client
            .head_bucket()
            .bucket(bucket)
            .send()
            .await
            .with_context(|| format!("💀 bucket '{bucket}' is missing or not ours to read"))?;
        Ok(())
    }

    async fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .into_paginator()
            .send();

        let mut keys = Vec::new();
        while let Some(page) = pages.next().await {
            let page =
                page.with_context(|| format!("💀 listing s3://{bucket}/{prefix} failed mid-page"))?;
            keys.extend(
                page.contents()
                    .iter()
                    .filter_map(|object| object.key())
                    .map(str::to_string),
            );
        }
        debug!("📋 s3://{bucket}/{prefix}: {} keys", keys.len());
        Ok(keys)
    }

    async fn open_upload(&self, bucket: &str, key: &str) -> Result<S3Upload> {
        Ok(S3Upload {
            client: self.client.clone(),
            bucket: bucket.to_string(),
            key: key.to_string(),
            pending: Vec::new(),
            upload_id: None,
            parts: Vec::new(),
        })
    }

    async fn open_download(&self, bucket: &str, key: &str) -> Result<ObjectDownload> {
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("💀 GetObject failed for s3://{bucket}/{key}"))?;

        let content_length = response.content_length().unwrap_or(0).max(0) as u64;
        let reader: ObjectReader = Box::new(response.body.into_async_read());
        Ok(ObjectDownload {
            content_length,
            reader,
        })
    }
}

/// 📤 One object on its way to S3. Nothing is visible until `commit`.
#[derive(Debug)]
pub(crate) struct S3Upload {
    client: Client,
    bucket: String,
    key: String,
    // -- bytes not yet shipped; never more than one part's worth after `append` returns
    pending: Vec<u8>,
    upload_id: Option<String>,
    parts: Vec<CompletedPart>,
}

impl S3Upload {
    async fn multipart_id(&mut self) -> Result<String> {
        if let Some(id) = &self.upload_id {
            return Ok(id.clone());
        }
        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .send()
            .await
            .with_context(|| format!("💀 could not start multipart upload for '{}'", self.key))?;
        let id = created
            .upload_id()
            .ok_or_else(|| anyhow!("💀 S3 started a multipart upload for '{}' without an id", self.key))?
            .to_string();
        debug!("📦 multipart upload {id} started for '{}'", self.key);
        self.upload_id = Some(id.clone());
        Ok(id)
    }

    async fn ship_part(&mut self, bytes: Vec<u8>) -> Result<()> {
        let upload_id = self.multipart_id().await?;
        let part_number = self.parts.len() as i32 + 1;
        let size = bytes.len();
        let uploaded = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&upload_id)
            .part_number(part_number)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .with_context(|| format!("💀 part {part_number} of '{}' failed", self.key))?;
        trace!("📦 part {part_number} of '{}' ({size} bytes) uploaded", self.key);
        self.parts.push(
            CompletedPart::builder()
                .set_e_tag(uploaded.e_tag().map(str::to_string))
                .part_number(part_number)
                .build(),
        );
        Ok(())
    }

    async fn complete_multipart(&mut self, upload_id: String) -> Result<()> {
        if !self.pending.is_empty() {
            let last = std::mem::take(&mut self.pending);
            self.ship_part(last).await?;
        }
        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(std::mem::take(&mut self.parts)))
                    .build(),
            )
            .send()
            .await
            .with_context(|| format!("💀 could not complete multipart upload of '{}'", self.key))?;
        Ok(())
    }
}

#[async_trait]
impl ObjectUpload for S3Upload {
    async fn append(&mut self, bytes: &[u8]) -> Result<()> {
        self.pending.extend_from_slice(bytes);
        while self.pending.len() >= PART_SIZE_BYTES {
            let rest = self.pending.split_off(PART_SIZE_BYTES);
            let part = std::mem::replace(&mut self.pending, rest);
            self.ship_part(part).await?;
        }
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        let Some(upload_id) = self.upload_id.clone() else {
            // -- 🎯 never filled a part: one PUT and done
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(&self.key)
                .body(ByteStream::from(std::mem::take(&mut self.pending)))
                .send()
                .await
                .with_context(|| format!("💀 PutObject failed for '{}'", self.key))?;
            return Ok(());
        };

        if let Err(err) = self.complete_multipart(upload_id.clone()).await {
            // -- 🧹 orphaned parts are billed forever; try to drop them, keep the original error
            if let Err(abort) = self
                .client
                .abort_multipart_upload()
                .bucket(&self.bucket)
                .key(&self.key)
                .upload_id(&upload_id)
                .send()
                .await
            {
                warn!("⚠️ could not abort multipart upload {upload_id}: {abort}");
            }
            return Err(err);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_region_defaults_to_the_florida_of_aws() {
        let config: S3StoreConfig = toml::from_str("").unwrap();
        assert_eq!(config.region, "us-east-1");
        assert!(config.endpoint.is_none());
        assert!(!config.force_path_style);
    }

    #[test]
    fn the_one_where_a_gateway_gets_path_style() {
        let config: S3StoreConfig = toml::from_str(
            r#"
            region = "eu-west-1"
            endpoint = "https://gateway.storjshare.io"
            force_path_style = true
            "#,
        )
        .unwrap();
        assert_eq!(config.region, "eu-west-1");
        assert_eq!(config.endpoint.as_deref(), Some("https://gateway.storjshare.io"));
        assert!(config.force_path_style);
    }
}
