//! Drives a replay run: resolve the functions subscribed to the
//! bucket, walk the paginated listing, group the objects into batches
//! of at most ten synthesized records, and invoke every subscribed
//! function once per batch. Individual failures are accumulated and
//! reported together at the end instead of aborting the run.

use crate::client::{FunctionService, ObjectPages, StorageService};
use crate::event;
use anyhow::{bail, Context, Result};
use aws_lambda_events::event::s3::S3Event;
use itertools::Itertools;
use std::fmt;
use thiserror::Error;
use tracing::{info, instrument, warn};

/// The invocation payload accepts at most this many records per
/// batch, currently the maximum accepted by AWS.
const MAX_BATCH_RECORDS: usize = 10;

/// The bucket (and optional key prefix) whose notifications are
/// replayed.
#[derive(Debug, Clone)]
pub struct Target {
    pub bucket: String,
    pub prefix: String,
}

impl Target {
    /// Builds a target, rejecting blank bucket names. An empty prefix
    /// matches every key.
    pub fn new(bucket: impl Into<String>, prefix: impl Into<String>) -> Result<Self> {
        let bucket = bucket.into();
        if bucket.trim().is_empty() {
            bail!("the target bucket name must not be blank");
        }
        Ok(Target {
            bucket,
            prefix: prefix.into(),
        })
    }
}

/// A single recorded failure from an otherwise-continuing run.
#[derive(Debug, Error)]
pub enum Failure {
    /// A listing page fetch failed; enumeration stopped there, but
    /// batches built from earlier pages were already delivered.
    #[error("listing bucket {bucket:?}: {cause:#}")]
    Listing { bucket: String, cause: anyhow::Error },

    /// One invocation of one function failed for one batch.
    #[error("invoking function {function:?}: {cause:#}")]
    Invocation {
        function: String,
        cause: anyhow::Error,
    },
}

/// The failures collected over a whole run. An empty aggregate means
/// the run succeeded.
#[derive(Debug, Default)]
pub struct ErrorAggregate {
    failures: Vec<Failure>,
}

impl ErrorAggregate {
    pub fn push(&mut self, failure: Failure) {
        self.failures.push(failure);
    }

    /// Folds another aggregate into this one.
    pub fn merge(&mut self, other: ErrorAggregate) {
        self.failures.extend(other.failures);
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn failures(&self) -> &[Failure] {
        &self.failures
    }

    /// Collapses the aggregate into a result: `Ok` if nothing failed.
    pub fn into_result(self) -> Result<(), ErrorAggregate> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ErrorAggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failure(s) occurred during the replay: {}",
            self.failures.len(),
            self.failures.iter().map(|failure| failure.to_string()).join("; ")
        )
    }
}

impl std::error::Error for ErrorAggregate {}

/// The outcome of a failed replay run.
#[derive(Debug, Error)]
pub enum ReplayError {
    /// The subscription lookup failed, so nothing was enumerated or
    /// invoked.
    #[error("querying the notification configuration of bucket {bucket:?}: {cause:#}")]
    Subscriptions { bucket: String, cause: anyhow::Error },

    /// The run completed but one or more listing or invocation calls
    /// failed along the way.
    #[error(transparent)]
    Failures(ErrorAggregate),
}

/// Serializes a batch and dispatches it to a single function.
async fn invoke_batch<F: FunctionService>(
    functions: &F,
    batch: &S3Event,
    function: &str,
) -> Result<()> {
    let payload = serde_json::to_vec(batch).context("Failed to serialize the event batch")?;
    functions.invoke_event(function, payload).await
}

/// Delivers one batch to every subscribed function, recording each
/// failed invocation without skipping the remaining functions.
async fn fan_out<F: FunctionService>(
    functions: &F,
    batch: &S3Event,
    subscribed: &[String],
    errors: &mut ErrorAggregate,
) -> usize {
    let mut invocations = 0;
    for function in subscribed {
        invocations += 1;
        if let Err(cause) = invoke_batch(functions, batch, function).await {
            warn!(
                "Invocation of function {:?} failed; continuing: {:#}",
                function, cause
            );
            errors.push(Failure::Invocation {
                function: function.clone(),
                cause,
            });
        }
    }
    invocations
}

/// Replays ObjectCreated notifications for every object in the target
/// bucket under the target prefix, invoking all subscribed functions
/// with batches of synthesized records. Returns `Ok` only if the
/// subscription lookup, every page fetch, and every invocation
/// succeeded; all non-fatal failures are reported together in the
/// returned aggregate.
#[instrument(skip(storage, functions))]
pub async fn replay<S: StorageService, F: FunctionService>(
    storage: &S,
    functions: &F,
    target: &Target,
    region: &str,
) -> Result<(), ReplayError> {
    let subscribed = storage
        .notification_functions(&target.bucket)
        .await
        .map_err(|cause| ReplayError::Subscriptions {
            bucket: target.bucket.clone(),
            cause,
        })?;
    info!(
        "Replaying notifications for bucket {:?} with prefix {:?} to {} function(s)",
        target.bucket,
        target.prefix,
        subscribed.len()
    );

    let mut errors = ErrorAggregate::default();
    let mut objects = 0;
    let mut batches = 0;
    let mut invocations = 0;
    let mut pages = ObjectPages::new(storage, &target.bucket, &target.prefix);
    while let Some(page) = pages.next_page().await {
        match page {
            Ok(entries) => {
                objects += entries.len();
                // Partial batches flush at the page boundary; a batch
                // never mixes entries from two pages.
                for chunk in entries.chunks(MAX_BATCH_RECORDS) {
                    let batch = event::batch(&target.bucket, region, chunk);
                    batches += 1;
                    invocations += fan_out(functions, &batch, &subscribed, &mut errors).await;
                }
            }
            Err(cause) => {
                warn!(
                    "Listing bucket {:?} failed; stopping enumeration: {:#}",
                    target.bucket, cause
                );
                errors.push(Failure::Listing {
                    bucket: target.bucket.clone(),
                    cause,
                });
            }
        }
    }

    info!(
        "Replay finished: {} object(s) in {} batch(es), {} invocation(s), {} failure(s)",
        objects,
        batches,
        invocations,
        errors.len()
    );
    errors.into_result().map_err(ReplayError::Failures)
}
