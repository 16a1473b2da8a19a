//! Defines the remote-service capabilities used by the replay: the
//! storage service that holds the objects and notification
//! configuration, and the function service that receives the
//! synthesized events. Both are traits so that tests can substitute
//! scripted fakes for the AWS clients.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::InvocationType;

/// A single object as reported by the storage listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    pub key: String,
    pub size: i64,
    pub e_tag: String,
}

/// One page of a bucket listing. A present continuation token means
/// more pages follow.
#[derive(Debug, Clone)]
pub struct ObjectPage {
    pub entries: Vec<ObjectEntry>,
    pub continuation: Option<String>,
}

/// Capability over the object-storage service: reading a bucket's
/// notification configuration and listing its contents one page at a
/// time.
#[async_trait]
pub trait StorageService {
    /// Returns the identifiers of the functions subscribed to the
    /// bucket's notifications. An unsubscribed bucket yields an empty
    /// vector, not an error.
    async fn notification_functions(&self, bucket: &str) -> Result<Vec<String>>;

    /// Fetches a single page of the bucket listing under the given
    /// prefix, continuing from the given token if present.
    async fn list_objects_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<&str>,
    ) -> Result<ObjectPage>;
}

/// Capability over the function-invocation service.
#[async_trait]
pub trait FunctionService {
    /// Triggers the function with the given payload without waiting
    /// for it to run to completion.
    async fn invoke_event(&self, function: &str, payload: Vec<u8>) -> Result<()>;
}

#[async_trait]
impl StorageService for aws_sdk_s3::Client {
    async fn notification_functions(&self, bucket: &str) -> Result<Vec<String>> {
        let config = self
            .get_bucket_notification_configuration()
            .bucket(bucket)
            .send()
            .await
            .with_context(|| {
                format!(
                    "Failed to read the notification configuration of bucket {:?}",
                    bucket
                )
            })?;
        Ok(config
            .lambda_function_configurations()
            .unwrap_or_default()
            .iter()
            .filter_map(|conf| conf.lambda_function_arn().map(String::from))
            .collect())
    }

    async fn list_objects_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<&str>,
    ) -> Result<ObjectPage> {
        let mut operation = self.list_objects_v2().bucket(bucket).prefix(prefix);
        if let Some(continuation_token) = continuation {
            operation = operation.continuation_token(continuation_token)
        }
        let response = operation.send().await.with_context(|| {
            format!(
                "Failed to list keys under {:?} in bucket {:?} \
                 using {} continuation token",
                prefix,
                bucket,
                if continuation.is_some() { "a" } else { "no" }
            )
        })?;
        Ok(ObjectPage {
            entries: response
                .contents()
                .unwrap_or_default()
                .iter()
                .filter_map(|object| {
                    object.key().map(|key| ObjectEntry {
                        key: String::from(key),
                        size: object.size(),
                        e_tag: String::from(object.e_tag().unwrap_or_default()),
                    })
                })
                .collect(),
            continuation: response.next_continuation_token().map(String::from),
        })
    }
}

#[async_trait]
impl FunctionService for aws_sdk_lambda::Client {
    async fn invoke_event(&self, function: &str, payload: Vec<u8>) -> Result<()> {
        let response = self
            .invoke()
            .function_name(function)
            .invocation_type(InvocationType::Event)
            .payload(Blob::new(payload))
            .send()
            .await
            .with_context(|| format!("Failed to invoke function {:?}", function))?;
        // 202 is the expected status code for Event invocations
        if response.status_code() != 202 {
            return Err(anyhow!(
                "Invocation of function {:?} was rejected with status code {}",
                function,
                response.status_code()
            ));
        }
        Ok(())
    }
}

/// Pull-based driver over the paginated bucket listing. Yields one
/// page of entries per call, threading the continuation token between
/// fetches, and becomes permanently exhausted after the last page or
/// after the first failed fetch. Not restartable.
pub struct ObjectPages<'a, S> {
    storage: &'a S,
    bucket: &'a str,
    prefix: &'a str,
    continuation: Option<String>,
    exhausted: bool,
}

impl<'a, S: StorageService> ObjectPages<'a, S> {
    pub fn new(storage: &'a S, bucket: &'a str, prefix: &'a str) -> Self {
        ObjectPages {
            storage,
            bucket,
            prefix,
            continuation: None,
            exhausted: false,
        }
    }

    /// Fetches the next page of entries, or `None` once the listing
    /// has ended. A failed fetch is yielded once and ends the
    /// listing.
    pub async fn next_page(&mut self) -> Option<Result<Vec<ObjectEntry>>> {
        if self.exhausted {
            return None;
        }
        match self
            .storage
            .list_objects_page(self.bucket, self.prefix, self.continuation.as_deref())
            .await
        {
            Ok(page) => {
                self.continuation = page.continuation;
                if self.continuation.is_none() {
                    self.exhausted = true;
                }
                Some(Ok(page.entries))
            }
            Err(e) => {
                self.exhausted = true;
                Some(Err(e))
            }
        }
    }
}
