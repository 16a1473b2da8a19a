//! Defines configuration as read from the environment.

use aws_config::{from_env, SdkConfig};
use serde::Deserialize;
use std::env;

/// The replay tool targets a single bucket, optionally narrowed to
/// keys under a prefix. The configuration must be given as
/// environment variables.
#[derive(Deserialize)]
pub struct Settings {
    /// The bucket whose notifications are replayed.
    pub bucket: String,

    /// Restricts the replay to objects whose key starts with this
    /// literal prefix. Omitting this replays notifications for every
    /// object in the bucket.
    #[serde(default)]
    pub key_prefix: String,
}

/// Builds the AWS service configuration shared by the S3 and Lambda
/// clients, honoring an `AWS_ENDPOINT_URL` override for local stacks.
pub async fn aws_service_config() -> SdkConfig {
    let endpoint_url_var = env::var("AWS_ENDPOINT_URL");
    if let Ok(endpoint_url) = endpoint_url_var {
        from_env()
            .endpoint_url(
                if endpoint_url.starts_with("http://") || endpoint_url.starts_with("https://") {
                    endpoint_url
                } else {
                    format!("https://{}", endpoint_url)
                },
            )
            .region("us-east-1") // should be OK since the endpoint was overridden
            .load()
    } else {
        from_env().load()
    }
    .await
}
