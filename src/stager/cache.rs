//! Keyed once-cells.
//!
//! A [`KeyedOnce`] runs an async initializer at most once per key. Callers
//! racing on the same key wait for the first initializer and observe its
//! value; callers on distinct keys proceed in parallel. The map lock is only
//! held while looking up or inserting the cell, never across the initializer.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};

/// Map of per-key once-cells.
#[derive(Debug)]
pub struct KeyedOnce<K, V> {
    cells: Mutex<HashMap<K, Arc<OnceCell<V>>>>,
}

impl<K, V> Default for KeyedOnce<K, V> {
    fn default() -> Self {
        Self {
            cells: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V> KeyedOnce<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value for `key`, running `init` if no value is set yet.
    ///
    /// A failed initializer leaves the key empty, so the next caller retries.
    ///
    /// # Errors
    ///
    /// Returns the initializer's error.
    pub async fn get_or_try_init<E, F, Fut>(&self, key: &K, init: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let cell = {
            let mut cells = self.cells.lock().await;
            Arc::clone(cells.entry(key.clone()).or_default())
        };

        cell.get_or_try_init(init).await.cloned()
    }
}
