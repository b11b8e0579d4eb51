//! Read-only access to the triple store.
//!
//! The pipeline never writes through [`TripleStore`]; every call is an
//! idempotent read and may be retried. Calls go through a [`ReadContext`],
//! which carries the run's [`CancelToken`] and [`RetryConfig`].

pub mod datafusion_store;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::error::{Result, SchemaError};

pub use datafusion_store::DataFusionTripleStore;

/// Aggregated references between instances of two classes through one predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeCount {
    /// The class at the other end of the edge
    pub class_uri: String,
    pub predicate_uri: String,
    pub count: u64,
}

/// Queries the pipeline and profiler run against the triples.
#[async_trait]
pub trait TripleStore: Send + Sync {
    /// Up to `limit` object values of a predicate. With `ordered`, values come
    /// sorted by (subject, object); otherwise in store order.
    async fn sample_objects(
        &self,
        predicate_uri: &str,
        limit: usize,
        ordered: bool,
    ) -> Result<Vec<String>>;

    /// For each predicate, the number of values every instance of `class_uri`
    /// carries. Instances without the predicate are not listed, and predicates
    /// no instance carries are absent from the map.
    async fn count_values_per_subject(
        &self,
        class_uri: &str,
        predicate_uris: &[String],
    ) -> Result<HashMap<String, Vec<u64>>>;

    /// Every class used as an `rdf:type` object, sorted.
    async fn class_uris(&self) -> Result<Vec<String>>;

    /// Number of distinct subjects typed as `class_uri`.
    async fn count_instances(&self, class_uri: &str) -> Result<u64>;

    /// `(predicate_uri, distinct subjects)` for each predicate used by instances of the class.
    async fn predicate_usage(&self, class_uri: &str) -> Result<Vec<(String, u64)>>;

    /// References from instances of the class to instances of other classes.
    async fn outgoing_references(&self, class_uri: &str) -> Result<Vec<EdgeCount>>;

    /// References from instances of other classes to instances of the class.
    async fn incoming_references(&self, class_uri: &str) -> Result<Vec<EdgeCount>>;
}

#[async_trait]
impl<T: TripleStore + ?Sized> TripleStore for Arc<T> {
    async fn sample_objects(
        &self,
        predicate_uri: &str,
        limit: usize,
        ordered: bool,
    ) -> Result<Vec<String>> {
        (**self).sample_objects(predicate_uri, limit, ordered).await
    }

    async fn count_values_per_subject(
        &self,
        class_uri: &str,
        predicate_uris: &[String],
    ) -> Result<HashMap<String, Vec<u64>>> {
        (**self)
            .count_values_per_subject(class_uri, predicate_uris)
            .await
    }

    async fn class_uris(&self) -> Result<Vec<String>> {
        (**self).class_uris().await
    }

    async fn count_instances(&self, class_uri: &str) -> Result<u64> {
        (**self).count_instances(class_uri).await
    }

    async fn predicate_usage(&self, class_uri: &str) -> Result<Vec<(String, u64)>> {
        (**self).predicate_usage(class_uri).await
    }

    async fn outgoing_references(&self, class_uri: &str) -> Result<Vec<EdgeCount>> {
        (**self).outgoing_references(class_uri).await
    }

    async fn incoming_references(&self, class_uri: &str) -> Result<Vec<EdgeCount>> {
        (**self).incoming_references(class_uri).await
    }
}

/// Cooperative cancellation signal shared by every clone.
#[derive(Debug, Clone)]
pub struct CancelToken {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            receiver,
        }
    }

    /// Cancels the run. Idempotent.
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Fails with [`SchemaError::Cancelled`] once cancelled.
    pub fn check(&self, operation: &str) -> Result<()> {
        if self.is_cancelled() {
            Err(SchemaError::Cancelled(operation.to_string()))
        } else {
            Ok(())
        }
    }

    /// Resolves when the token is cancelled.
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        // The sender lives as long as any clone of this token, so `changed`
        // only errors if we are already being dropped.
        while !*receiver.borrow_and_update() {
            if receiver.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Runs `future` unless the token fires first.
    pub async fn run<T, F>(&self, operation: &str, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check(operation)?;
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(SchemaError::Cancelled(operation.to_string())),
            result = future => result,
        }
    }
}

/// Cancellation and retry policy applied to every store read.
#[derive(Debug, Clone, Default)]
pub struct ReadContext {
    pub cancel: CancelToken,
    pub retry: RetryConfig,
}

impl ReadContext {
    pub fn new(cancel: CancelToken, retry: RetryConfig) -> Self {
        Self { cancel, retry }
    }

    /// Runs an idempotent read, retrying retryable failures with exponential backoff.
    pub async fn read<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.cancel.run(operation, op()).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    let backoff = self.retry.backoff(attempt);
                    warn!(
                        operation,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "Store read failed, retrying"
                    );
                    self.cancel
                        .run(operation, async {
                            tokio::time::sleep(backoff).await;
                            Ok(())
                        })
                        .await?;
                    attempt += 1;
                }
                Err(err) => {
                    debug!(operation, attempt, error = %err, "Store read failed");
                    return Err(err);
                }
            }
        }
    }
}
