//! In-memory provider clients for tests.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::error::{ProviderError, Result};

use super::{ArchiveStream, FunctionClient, FunctionDefinition, ObjectStore, Provider};

/// Object store backed by a map, counting every call.
#[derive(Debug)]
pub struct MemoryStore {
    provider: Provider,
    latency: Duration,
    buckets: Mutex<Vec<String>>,
    created: Mutex<Vec<(String, Option<String>)>>,
    objects: Mutex<HashMap<(String, String), Bytes>>,
    lists: AtomicUsize,
    gets: AtomicUsize,
    puts: AtomicUsize,
}

impl MemoryStore {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            latency: Duration::ZERO,
            buckets: Mutex::new(Vec::new()),
            created: Mutex::new(Vec::new()),
            objects: Mutex::new(HashMap::new()),
            lists: AtomicUsize::new(0),
            gets: AtomicUsize::new(0),
            puts: AtomicUsize::new(0),
        }
    }

    /// Delays every call, widening race windows.
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_bucket(self, bucket: &str) -> Self {
        self.buckets.lock().unwrap().push(bucket.to_string());
        self
    }

    pub fn with_object(self, bucket: &str, key: &str, body: &'static [u8]) -> Self {
        let this = self.with_bucket(bucket);
        this.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), Bytes::from_static(body));
        this
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    pub fn created_buckets(&self) -> Vec<(String, Option<String>)> {
        self.created.lock().unwrap().clone()
    }

    pub fn create_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    pub fn list_count(&self) -> usize {
        self.lists.load(Ordering::SeqCst)
    }

    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn list_buckets(&self) -> Result<Vec<String>> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        Ok(self.buckets.lock().unwrap().clone())
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        self.pause().await;
        Ok(self.buckets.lock().unwrap().iter().any(|b| b == bucket))
    }

    async fn create_bucket(&self, bucket: &str, location: Option<&str>) -> Result<()> {
        self.pause().await;
        self.created
            .lock()
            .unwrap()
            .push((bucket.to_string(), location.map(str::to_string)));
        self.buckets.lock().unwrap().push(bucket.to_string());
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<ArchiveStream> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        let body = self.object(bucket, key).ok_or_else(|| {
            ProviderError::api(self.provider, "get object", format!("{bucket}/{key} not found"))
        })?;
        let length = u64::try_from(body.len()).ok();
        Ok(ArchiveStream::new(futures::stream::iter([Ok(body)]), length))
    }

    async fn put_object(&self, bucket: &str, key: &str, body: ArchiveStream) -> Result<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        let body = body.read_all().await?;
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), body);
        Ok(())
    }
}

/// Counts calls in flight and remembers the highest count seen.
#[derive(Debug, Default)]
pub struct InFlight {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl InFlight {
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn enter(&self) -> InFlightGuard<'_> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        InFlightGuard(self)
    }
}

struct InFlightGuard<'a>(&'a InFlight);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Function client that creates every function and records the definitions.
#[derive(Debug)]
pub struct RecordingFunctions {
    provider: Provider,
    created: Mutex<Vec<FunctionDefinition>>,
    in_flight: Arc<InFlight>,
}

impl RecordingFunctions {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            created: Mutex::new(Vec::new()),
            in_flight: Arc::default(),
        }
    }

    /// Shares a gauge of concurrent creates with other clients.
    pub fn with_in_flight(mut self, in_flight: Arc<InFlight>) -> Self {
        self.in_flight = in_flight;
        self
    }

    pub fn created(&self) -> Vec<FunctionDefinition> {
        self.created.lock().unwrap().clone()
    }
}

#[async_trait]
impl FunctionClient for RecordingFunctions {
    async fn create_function(&self, function: &FunctionDefinition) -> Result<String> {
        let _guard = self.in_flight.enter();
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.created.lock().unwrap().push(function.clone());
        Ok(format!("{}:{}:{}", self.provider, function.region, function.name))
    }

    async fn update_function_config(&self, _function: &FunctionDefinition) -> Result<()> {
        Ok(())
    }

    async fn update_function_code(&self, function: &FunctionDefinition) -> Result<String> {
        Ok(format!("{}:{}:{}", self.provider, function.region, function.name))
    }

    async fn list_functions(&self) -> Result<Vec<String>> {
        Ok(self.created().into_iter().map(|f| f.name).collect())
    }
}
