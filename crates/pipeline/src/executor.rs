//! Distribution of rechunk stages.

use crate::error::PipelineResult;
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tokio::task::{JoinError, JoinHandle};

/// Runs per-item transforms and groups keyed values.
///
/// A rechunk is two `distribute` passes joined by one `group_by_key`.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Apply `transform` to every item. Results come back in input order.
    /// The first failure aborts the pass.
    async fn distribute<T, U, F, Fut>(&self, items: Vec<T>, transform: F) -> PipelineResult<Vec<U>>
    where
        T: Send + 'static,
        U: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = PipelineResult<U>> + Send + 'static;

    /// Gather the values of each key, ordered by key.
    async fn group_by_key<K, V>(&self, pairs: Vec<(K, V)>) -> PipelineResult<Vec<(K, Vec<V>)>>
    where
        K: Ord + Send + 'static,
        V: Send + 'static;
}

/// In-process executor on the tokio runtime.
///
/// Each item runs as a spawned task; at most `concurrency` are in flight.
#[derive(Clone, Debug)]
pub struct LocalExecutor {
    concurrency: usize,
}

impl LocalExecutor {
    /// Create an executor. A concurrency of zero is treated as one.
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }
}

impl Default for LocalExecutor {
    fn default() -> Self {
        Self::new(rechunk_core::DEFAULT_CONCURRENCY)
    }
}

type Indexed<U> = (usize, PipelineResult<U>);

fn settle<U>(
    joined: Result<Indexed<U>, JoinError>,
    results: &mut [Option<U>],
) -> PipelineResult<()> {
    let (index, result) = joined?;
    results[index] = Some(result?);
    Ok(())
}

fn abort_all<U>(in_flight: &FuturesUnordered<JoinHandle<Indexed<U>>>) {
    for handle in in_flight.iter() {
        handle.abort();
    }
}

#[async_trait]
impl Executor for LocalExecutor {
    async fn distribute<T, U, F, Fut>(&self, items: Vec<T>, transform: F) -> PipelineResult<Vec<U>>
    where
        T: Send + 'static,
        U: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = PipelineResult<U>> + Send + 'static,
    {
        let transform = Arc::new(transform);
        let mut results: Vec<Option<U>> = (0..items.len()).map(|_| None).collect();
        let mut in_flight = FuturesUnordered::new();

        for (index, item) in items.into_iter().enumerate() {
            let transform = transform.clone();
            in_flight.push(tokio::spawn(async move { (index, transform(item).await) }));

            if in_flight.len() >= self.concurrency
                && let Some(joined) = in_flight.next().await
                && let Err(e) = settle(joined, &mut results)
            {
                abort_all(&in_flight);
                return Err(e);
            }
        }

        while let Some(joined) = in_flight.next().await {
            if let Err(e) = settle(joined, &mut results) {
                abort_all(&in_flight);
                return Err(e);
            }
        }

        Ok(results.into_iter().flatten().collect())
    }

    async fn group_by_key<K, V>(&self, pairs: Vec<(K, V)>) -> PipelineResult<Vec<(K, Vec<V>)>>
    where
        K: Ord + Send + 'static,
        V: Send + 'static,
    {
        let mut groups: BTreeMap<K, Vec<V>> = BTreeMap::new();
        for (key, value) in pairs {
            groups.entry(key).or_default().push(value);
        }
        Ok(groups.into_iter().collect())
    }
}
