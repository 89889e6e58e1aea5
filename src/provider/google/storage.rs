//! Cloud Storage object store.

use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::{Body, StatusCode, Url, header};
use serde::{Deserialize, Serialize};
use std::io;
use tracing::debug;

use crate::error::Result;
use crate::provider::{ArchiveStream, ObjectStore, Provider};

use super::{ApiFailure, GoogleRestClient, STORAGE_API_URL, endpoint, parse_base_url};

/// Cloud Storage object store of one project.
#[derive(Debug, Clone)]
pub struct GcsObjectStore {
    rest: GoogleRestClient,
    base_url: Url,
    project: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BucketList {
    #[serde(default)]
    items: Vec<BucketResource>,
    next_page_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct BucketResource {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<String>,
}

impl GcsObjectStore {
    /// Creates a store for `project` against the public API.
    ///
    /// # Errors
    ///
    /// Returns an error if the API URL is invalid.
    pub fn new(rest: GoogleRestClient, project: impl Into<String>) -> Result<Self> {
        Self::with_base_url(rest, project, STORAGE_API_URL)
    }

    /// Creates a store against a custom API URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn with_base_url(
        rest: GoogleRestClient,
        project: impl Into<String>,
        base_url: &str,
    ) -> Result<Self> {
        Ok(Self {
            rest,
            base_url: parse_base_url(base_url)?,
            project: project.into(),
        })
    }

    fn buckets_url(&self) -> Result<Url> {
        endpoint(&self.base_url, ["storage", "v1", "b"])
    }

    fn bucket_url(&self, bucket: &str) -> Result<Url> {
        endpoint(&self.base_url, ["storage", "v1", "b", bucket])
    }
}

#[async_trait]
impl ObjectStore for GcsObjectStore {
    fn provider(&self) -> Provider {
        Provider::Google
    }

    async fn list_buckets(&self) -> Result<Vec<String>> {
        let mut buckets = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .rest
                .http()
                .get(self.buckets_url()?)
                .query(&[("project", self.project.as_str())]);
            if let Some(token) = page_token.take() {
                request = request.query(&[("pageToken", token)]);
            }

            let page: BucketList = self.rest.send_json(request, "list buckets").await?;
            buckets.extend(page.items.into_iter().map(|b| b.name));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(buckets)
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        let request = self.rest.http().get(self.bucket_url(bucket)?);
        let response = self.rest.send_unchecked(request, "check bucket").await?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(ApiFailure::read(response).await.into_error("check bucket")),
        }
    }

    async fn create_bucket(&self, bucket: &str, location: Option<&str>) -> Result<()> {
        let body = BucketResource {
            name: bucket.to_string(),
            location: location.map(str::to_string),
        };
        let request = self
            .rest
            .http()
            .post(self.buckets_url()?)
            .query(&[("project", self.project.as_str())])
            .json(&body);

        let response = self.rest.send_unchecked(request, "create bucket").await?;
        if response.status().is_success() {
            return Ok(());
        }

        // Bucket names are global: a conflict only means success if the
        // project can read the bucket.
        let failure = ApiFailure::read(response).await;
        if failure.is_conflict() && matches!(self.bucket_exists(bucket).await, Ok(true)) {
            debug!("Bucket {bucket} already exists");
            return Ok(());
        }
        Err(failure.into_error("create bucket"))
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<ArchiveStream> {
        let url = endpoint(&self.base_url, ["storage", "v1", "b", bucket, "o", key])?;
        let request = self.rest.http().get(url).query(&[("alt", "media")]);

        let response = self.rest.send(request, "get object").await?;
        let length = response.content_length();
        Ok(ArchiveStream::new(
            response.bytes_stream().map_err(io::Error::other),
            length,
        ))
    }

    async fn put_object(&self, bucket: &str, key: &str, body: ArchiveStream) -> Result<()> {
        let url = endpoint(&self.base_url, ["upload", "storage", "v1", "b", bucket, "o"])?;
        let mut request = self
            .rest
            .http()
            .post(url)
            .query(&[("uploadType", "media"), ("name", key)])
            .header(header::CONTENT_TYPE, "application/zip");
        if let Some(length) = body.length() {
            request = request.header(header::CONTENT_LENGTH, length);
        }

        self.rest
            .send(request.body(Body::wrap_stream(body.into_chunks())), "put object")
            .await?;
        Ok(())
    }
}
