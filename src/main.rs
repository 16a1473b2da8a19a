use anyhow::{Context, Result};
use s3_replay::{conf, replay};

/// Re-deliver ObjectCreated notifications for the objects already in
/// a bucket, invoking every Lambda function subscribed to the
/// bucket's notifications.
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .without_time()
        .init();

    let settings: conf::Settings =
        envy::from_env().context("Failed to read settings from the environment")?;
    let target = replay::Target::new(settings.bucket, settings.key_prefix)?;

    let config = conf::aws_service_config().await;
    let region = config
        .region()
        .map(ToString::to_string)
        .unwrap_or_default();
    let storage = aws_sdk_s3::Client::new(&config);
    let functions = aws_sdk_lambda::Client::new(&config);

    replay::replay(&storage, &functions, &target, &region)
        .await
        .with_context(|| {
            format!(
                "Failed to replay notifications for bucket {:?}",
                target.bucket
            )
        })?;

    Ok(())
}
