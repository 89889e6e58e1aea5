//! S3 object store.

use async_trait::async_trait;
use aws_config::{Region, SdkConfig};
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use futures::TryStreamExt;
use http_body::Frame;
use http_body_util::StreamBody;
use tracing::debug;

use crate::error::Result;
use crate::provider::{ArchiveStream, ObjectStore, Provider};

use super::api_error;

/// S3 object store bound to one region.
#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    /// S3 client for the store's region.
    client: Client,
    /// Configuration used to build clients for buckets of other regions.
    config: aws_sdk_s3::Config,
    /// Region of `client`.
    region: String,
}

impl S3ObjectStore {
    /// Creates a store from an SDK configuration.
    #[must_use]
    pub fn new(config: &SdkConfig) -> Self {
        Self::from_conf(aws_sdk_s3::Config::from(config))
    }

    /// Creates a store from an S3 client configuration.
    #[must_use]
    pub fn from_conf(config: aws_sdk_s3::Config) -> Self {
        let region = config
            .region()
            .map_or_else(|| Provider::Aws.default_region().to_string(), ToString::to_string);

        Self {
            client: Client::from_conf(config.clone()),
            config,
            region,
        }
    }

    /// Returns a client for the region a bucket lives in.
    ///
    /// Source archives of cross-provider copies may live in any region, and
    /// S3 rejects reads through a client of the wrong region.
    async fn client_for_bucket(&self, bucket: &str) -> Result<Client> {
        let output = self
            .client
            .get_bucket_location()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| api_error("locate bucket", e))?;

        let region = bucket_region(output.location_constraint().map(BucketLocationConstraint::as_str));
        if region == self.region {
            return Ok(self.client.clone());
        }

        debug!("Bucket {bucket} lives in {region}");
        let config = self
            .config
            .to_builder()
            .region(Region::new(region.to_string()))
            .build();
        Ok(Client::from_conf(config))
    }
}

/// Maps a bucket location constraint onto its region.
fn bucket_region(constraint: Option<&str>) -> &str {
    match constraint {
        None | Some("") => Provider::Aws.default_region(),
        Some("EU") => "eu-west-1",
        Some(region) => region,
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    fn provider(&self) -> Provider {
        Provider::Aws
    }

    async fn list_buckets(&self) -> Result<Vec<String>> {
        let output = self
            .client
            .list_buckets()
            .send()
            .await
            .map_err(|e| api_error("list buckets", e))?;

        Ok(output
            .buckets()
            .iter()
            .filter_map(|bucket| bucket.name().map(str::to_string))
            .collect())
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(sdk_err) => {
                let service_err = sdk_err.into_service_error();
                if service_err.is_not_found() {
                    Ok(false)
                } else {
                    Err(api_error("check bucket", service_err))
                }
            }
        }
    }

    async fn create_bucket(&self, bucket: &str, location: Option<&str>) -> Result<()> {
        let configuration = location.map(|region| {
            CreateBucketConfiguration::builder()
                .location_constraint(BucketLocationConstraint::from(region))
                .build()
        });

        let result = self
            .client
            .create_bucket()
            .bucket(bucket)
            .set_create_bucket_configuration(configuration)
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(sdk_err) => {
                let service_err = sdk_err.into_service_error();
                if service_err.is_bucket_already_owned_by_you() {
                    debug!("Bucket {bucket} already owned");
                    Ok(())
                } else {
                    Err(api_error("create bucket", service_err))
                }
            }
        }
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<ArchiveStream> {
        let client = self.client_for_bucket(bucket).await?;

        let output = client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| api_error("get object", e))?;

        let length = output.content_length().and_then(|len| u64::try_from(len).ok());
        Ok(ArchiveStream::from_reader(output.body.into_async_read(), length))
    }

    async fn put_object(&self, bucket: &str, key: &str, body: ArchiveStream) -> Result<()> {
        let length = body.length().and_then(|len| i64::try_from(len).ok());
        let frames = body.into_chunks().map_ok(Frame::data);

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from_body_1_x(StreamBody::new(frames)))
            .set_content_length(length)
            .content_type("application/zip")
            .send()
            .await
            .map_err(|e| api_error("put object", e))?;

        Ok(())
    }
}
