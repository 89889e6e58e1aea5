//! Archive staging.
//!
//! Before a function can be created or updated its archive must live in the
//! target provider's object store. The [`ArchiveStager`] resolves (or creates)
//! the deployment bucket of a region, uploads local archives, and copies
//! archives held by the other provider. Bucket resolution and cross-provider
//! copies are shared by every concurrent target of a run and run at most once
//! per key.

mod cache;

use std::path::Path;
use tracing::{debug, info};

use crate::error::{Result, TransferError};
use crate::planner::DeploymentTarget;
use crate::provider::{
    ARCHIVE_BUCKET_PREFIX, ArchiveReference, ArchiveSource, ArchiveStream, ObjectStore,
    Provider,
};

pub use cache::KeyedOnce;

/// Which deployment bucket of a provider a cache entry refers to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BucketScope {
    /// The bucket of one region.
    Region(String),
    /// The provider-wide default bucket.
    Default,
}

/// Key of the cross-provider copy ledger: source object, destination provider
/// and destination bucket.
type CopyKey = (ArchiveReference, Provider, String);

/// Stages archives into provider object stores.
#[derive(Debug, Default)]
pub struct ArchiveStager {
    buckets: KeyedOnce<(Provider, BucketScope), String>,
    copies: KeyedOnce<CopyKey, ArchiveReference>,
}

impl ArchiveStager {
    /// Creates a stager with empty caches.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the target's archive available in `destination` and returns the
    /// staged reference, also recorded in `target.staged`.
    ///
    /// `destination` must be the object store of the target's provider and
    /// region. `source` is the store of the archive's provider and is only
    /// used when the archive lives with the other provider.
    ///
    /// # Errors
    ///
    /// Returns a transfer error if the archive cannot be read or its URI is
    /// malformed, and a provider error if any storage call fails.
    pub async fn stage(
        &self,
        target: &mut DeploymentTarget,
        destination: &dyn ObjectStore,
        source: Option<&dyn ObjectStore>,
    ) -> Result<ArchiveReference> {
        let region_bucket = self.region_bucket(destination, &target.region).await?;

        let reference = match ArchiveSource::parse(&target.archive)? {
            ArchiveSource::Remote(reference) if reference.provider == target.provider => {
                debug!("Archive {reference} is native to {}", target.provider);
                reference
            }
            ArchiveSource::Remote(reference) => {
                let source = source.ok_or_else(|| TransferError::Unsupported {
                    archive: target.archive.clone(),
                    message: format!("no {} object store available", reference.provider),
                })?;
                let bucket = match target.provider {
                    Provider::Google => self.default_bucket(destination).await?,
                    Provider::Aws => region_bucket,
                };
                self.copy(&reference, source, destination, bucket).await?
            }
            ArchiveSource::Local(path) => {
                upload(&path, destination, region_bucket, &target.name).await?
            }
        };

        target.staged = Some(reference.clone());
        Ok(reference)
    }

    /// Returns the deployment bucket of a region, creating it if needed.
    ///
    /// Existing buckets are reused when their name carries the deployment
    /// prefix and the region.
    ///
    /// # Errors
    ///
    /// Returns an error if listing or creating buckets fails.
    pub async fn region_bucket(&self, store: &dyn ObjectStore, region: &str) -> Result<String> {
        let provider = store.provider();
        let key = (provider, BucketScope::Region(region.to_string()));

        self.buckets
            .get_or_try_init(&key, || async {
                let existing = store
                    .list_buckets()
                    .await?
                    .into_iter()
                    .find(|name| name.starts_with(ARCHIVE_BUCKET_PREFIX) && name.contains(region));

                if let Some(bucket) = existing {
                    debug!("{provider}: reusing bucket {bucket} for {region}");
                    return Ok(bucket);
                }

                let bucket = format!("{ARCHIVE_BUCKET_PREFIX}-{region}");
                let location = (region != provider.default_region()).then_some(region);
                info!("{provider}: creating bucket {bucket}");
                store.create_bucket(&bucket, location).await?;
                Ok(bucket)
            })
            .await
    }

    /// Returns the provider-wide default bucket, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if checking or creating the bucket fails.
    pub async fn default_bucket(&self, store: &dyn ObjectStore) -> Result<String> {
        let provider = store.provider();

        self.buckets
            .get_or_try_init(&(provider, BucketScope::Default), || async {
                if !store.bucket_exists(ARCHIVE_BUCKET_PREFIX).await? {
                    info!("{provider}: creating bucket {ARCHIVE_BUCKET_PREFIX}");
                    store.create_bucket(ARCHIVE_BUCKET_PREFIX, None).await?;
                }
                Ok(ARCHIVE_BUCKET_PREFIX.to_string())
            })
            .await
    }

    /// Copies `reference` into `bucket` of `destination` under the same key,
    /// once per (source, destination bucket).
    async fn copy(
        &self,
        reference: &ArchiveReference,
        source: &dyn ObjectStore,
        destination: &dyn ObjectStore,
        bucket: String,
    ) -> Result<ArchiveReference> {
        let key = (reference.clone(), destination.provider(), bucket);

        self.copies
            .get_or_try_init(&key, || async {
                let (_, provider, bucket) = &key;
                info!("Copying {reference} to {provider} bucket {bucket}");

                let body = source.get_object(&reference.bucket, &reference.key).await?;
                debug!("Streaming {reference} ({:?} bytes)", body.length());
                destination
                    .put_object(bucket, &reference.key, body)
                    .await?;

                Ok(ArchiveReference::new(*provider, bucket.clone(), reference.key.clone()))
            })
            .await
    }
}

/// Uploads a local archive under the function name.
async fn upload(
    path: &Path,
    destination: &dyn ObjectStore,
    bucket: String,
    name: &str,
) -> Result<ArchiveReference> {
    let body = ArchiveStream::from_path(path)
        .await
        .map_err(|source| TransferError::ReadArchive {
            path: path.to_path_buf(),
            source,
        })?;

    info!(
        "{}: uploading {} ({} bytes) to {bucket}/{name}",
        destination.provider(),
        path.display(),
        body.length().unwrap_or_default()
    );
    destination.put_object(&bucket, name, body).await?;

    Ok(ArchiveReference::new(destination.provider(), bucket, name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeployError;
    use crate::provider::fake::MemoryStore;
    use bytes::Bytes;
    use std::sync::Arc;
    use std::time::Duration;

    fn target(provider: Provider, archive: &str, region: &str) -> DeploymentTarget {
        DeploymentTarget {
            archive: archive.to_string(),
            name: String::from("hello"),
            memory_mb: 128,
            timeout_secs: 10,
            runtime: String::from("python3.12"),
            provider,
            handler_file: String::from("main"),
            handler_entry_point: String::from("handler"),
            region: region.to_string(),
            staged: None,
        }
    }

    #[tokio::test]
    async fn test_local_archive_shares_region_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("fn.zip");
        std::fs::write(&archive, b"zip-bytes").unwrap();
        let archive = archive.display().to_string();

        let stager = Arc::new(ArchiveStager::new());
        let store = Arc::new(MemoryStore::new(Provider::Aws).with_latency(Duration::from_millis(20)));

        let mut handles = Vec::new();
        for _ in 0..2 {
            let stager = Arc::clone(&stager);
            let store = Arc::clone(&store);
            let mut target = target(Provider::Aws, &archive, "eu-central-1");
            handles.push(tokio::spawn(async move {
                let reference = stager.stage(&mut target, store.as_ref(), None).await?;
                Ok::<_, DeployError>((reference, target))
            }));
        }

        for handle in handles {
            let (reference, target) = handle.await.unwrap().unwrap();
            assert_eq!(reference.uri(), "s3://godeploy-deployments-eu-central-1/hello");
            assert_eq!(target.staged, Some(reference));
        }

        assert_eq!(store.create_count(), 1);
        assert_eq!(store.put_count(), 2);
        assert_eq!(
            store.created_buckets(),
            vec![(
                String::from("godeploy-deployments-eu-central-1"),
                Some(String::from("eu-central-1"))
            )]
        );
        assert_eq!(
            store.object("godeploy-deployments-eu-central-1", "hello"),
            Some(Bytes::from_static(b"zip-bytes"))
        );
    }

    #[tokio::test]
    async fn test_large_local_archive_is_uploaded_whole() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("fn.zip");
        let content: Vec<u8> = (0..=250u8).cycle().take(100_000).collect();
        std::fs::write(&archive, &content).unwrap();

        let stager = ArchiveStager::new();
        let store = MemoryStore::new(Provider::Google);
        let mut target = target(Provider::Google, &archive.display().to_string(), "us-east1");

        let reference = stager.stage(&mut target, &store, None).await.unwrap();

        assert_eq!(reference.uri(), "gs://godeploy-deployments-us-east1/hello");
        assert_eq!(
            store.object("godeploy-deployments-us-east1", "hello"),
            Some(Bytes::from(content))
        );
    }

    #[tokio::test]
    async fn test_default_region_has_no_location() {
        let stager = ArchiveStager::new();
        let store = MemoryStore::new(Provider::Google);

        let bucket = stager.region_bucket(&store, "us-east1").await.unwrap();
        assert_eq!(bucket, "godeploy-deployments-us-east1");
        assert_eq!(store.created_buckets(), vec![(bucket, None)]);
    }

    #[tokio::test]
    async fn test_existing_region_bucket_is_reused() {
        let stager = ArchiveStager::new();
        let store = MemoryStore::new(Provider::Aws)
            .with_bucket("unrelated-eu-west-1")
            .with_bucket("godeploy-deployments-eu-west-1-abc");

        let bucket = stager.region_bucket(&store, "eu-west-1").await.unwrap();
        assert_eq!(bucket, "godeploy-deployments-eu-west-1-abc");
        assert_eq!(store.create_count(), 0);

        stager.region_bucket(&store, "eu-west-1").await.unwrap();
        assert_eq!(store.list_count(), 1);
    }

    #[tokio::test]
    async fn test_native_archive_is_not_copied() {
        let stager = ArchiveStager::new();
        let store = MemoryStore::new(Provider::Google);
        let mut target = target(Provider::Google, "gs://sources/fn.zip", "europe-west3");

        let reference = stager.stage(&mut target, &store, None).await.unwrap();

        assert_eq!(reference.uri(), "gs://sources/fn.zip");
        assert_eq!(store.put_count(), 0);
        assert_eq!(store.get_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_cross_copy_runs_once() {
        let stager = Arc::new(ArchiveStager::new());
        let source = Arc::new(
            MemoryStore::new(Provider::Aws)
                .with_latency(Duration::from_millis(20))
                .with_object("artifacts", "builds/fn.zip", b"payload"),
        );
        let destination = Arc::new(MemoryStore::new(Provider::Google));

        let mut handles = Vec::new();
        for region in ["europe-west3", "us-central1", "europe-west3"] {
            let stager = Arc::clone(&stager);
            let source = Arc::clone(&source);
            let destination = Arc::clone(&destination);
            let mut target = target(Provider::Google, "s3://artifacts/builds/fn.zip", region);
            handles.push(tokio::spawn(async move {
                stager
                    .stage(&mut target, destination.as_ref(), Some(source.as_ref()))
                    .await
            }));
        }

        for handle in handles {
            let reference = handle.await.unwrap().unwrap();
            assert_eq!(reference.uri(), "gs://godeploy-deployments/builds/fn.zip");
        }

        assert_eq!(source.get_count(), 1);
        assert_eq!(destination.put_count(), 1);
        assert_eq!(
            destination.object("godeploy-deployments", "builds/fn.zip"),
            Some(Bytes::from_static(b"payload"))
        );
    }

    #[tokio::test]
    async fn test_cross_copy_to_aws_uses_region_bucket() {
        let stager = ArchiveStager::new();
        let source = MemoryStore::new(Provider::Google).with_object("src", "fn.zip", b"payload");
        let destination = MemoryStore::new(Provider::Aws);

        let mut first = target(Provider::Aws, "gs://src/fn.zip", "eu-west-1");
        let mut second = target(Provider::Aws, "gs://src/fn.zip", "us-east-1");
        let a = stager.stage(&mut first, &destination, Some(&source)).await.unwrap();
        let b = stager.stage(&mut second, &destination, Some(&source)).await.unwrap();

        assert_eq!(a.uri(), "s3://godeploy-deployments-eu-west-1/fn.zip");
        assert_eq!(b.uri(), "s3://godeploy-deployments-us-east-1/fn.zip");
        assert_eq!(source.get_count(), 2);
    }

    #[tokio::test]
    async fn test_cross_copy_without_source_store() {
        let stager = ArchiveStager::new();
        let destination = MemoryStore::new(Provider::Aws);
        let mut target = target(Provider::Aws, "gs://src/fn.zip", "us-east-1");

        let result = stager.stage(&mut target, &destination, None).await;
        assert!(matches!(
            result,
            Err(DeployError::Transfer(TransferError::Unsupported { .. }))
        ));
    }

    #[tokio::test]
    async fn test_missing_local_archive() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.zip").display().to_string();
        let stager = ArchiveStager::new();
        let store = MemoryStore::new(Provider::Aws);

        let mut target = target(Provider::Aws, &missing, "us-east-1");
        let result = stager.stage(&mut target, &store, None).await;

        assert!(matches!(
            result,
            Err(DeployError::Transfer(TransferError::ReadArchive { .. }))
        ));
        assert!(target.staged.is_none());
    }

    #[tokio::test]
    async fn test_malformed_uri() {
        let stager = ArchiveStager::new();
        let store = MemoryStore::new(Provider::Aws);
        let mut target = target(Provider::Aws, "s3://bucket-only", "us-east-1");

        let result = stager.stage(&mut target, &store, None).await;
        assert!(matches!(
            result,
            Err(DeployError::Transfer(TransferError::InvalidUri { .. }))
        ));
    }
}
