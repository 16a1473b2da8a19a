//! Builds the synthetic S3 notification records delivered to the
//! subscribed functions. The records carry the schema a real
//! ObjectCreated notification would, except for the event time, which
//! is the wall-clock time of synthesis.

use crate::client::ObjectEntry;
use aws_lambda_events::event::s3::{
    S3Bucket, S3Entity, S3Event, S3EventRecord, S3Object, S3RequestParameters, S3UserIdentity,
};
use chrono::Utc;
use std::collections::HashMap;

/// The event name stamped on every synthesized record. Consumers may
/// match on the exact creation sub-type, so it is kept as-is rather
/// than generalized to `ObjectCreated:*`.
pub const EVENT_NAME: &str = "ObjectCreated:CompleteMultipartUpload";

/// Version of the record envelope.
const EVENT_VERSION: &str = "2.0";

/// Version of the nested s3 entity schema.
const SCHEMA_VERSION: &str = "1.0";

/// The well-known ARN of a bucket, derived from its name alone.
pub fn bucket_arn(bucket: &str) -> String {
    format!("arn:aws:s3:::{}", bucket)
}

/// Synthesizes the notification record for a single listed object.
pub fn record(bucket: &str, region: &str, entry: &ObjectEntry) -> S3EventRecord {
    S3EventRecord {
        event_version: Some(String::from(EVENT_VERSION)),
        event_source: Some(String::from("aws:s3")),
        aws_region: Some(String::from(region)),
        event_time: Utc::now(),
        event_name: Some(String::from(EVENT_NAME)),
        principal_id: S3UserIdentity { principal_id: None },
        request_parameters: S3RequestParameters {
            source_ip_address: None,
        },
        response_elements: HashMap::new(),
        s3: S3Entity {
            schema_version: Some(String::from(SCHEMA_VERSION)),
            configuration_id: None,
            bucket: S3Bucket {
                name: Some(String::from(bucket)),
                owner_identity: Some(S3UserIdentity { principal_id: None }),
                arn: Some(bucket_arn(bucket)),
            },
            object: S3Object {
                key: Some(entry.key.clone()),
                size: Some(entry.size),
                url_decoded_key: None,
                version_id: None,
                e_tag: Some(entry.e_tag.clone()),
                sequencer: None,
            },
        },
    }
}

/// Wraps the records for a batch of listed objects into the event
/// envelope the functions expect, preserving the listing order.
pub fn batch(bucket: &str, region: &str, entries: &[ObjectEntry]) -> S3Event {
    S3Event {
        records: entries
            .iter()
            .map(|entry| record(bucket, region, entry))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn sample_entry() -> ObjectEntry {
        ObjectEntry {
            key: String::from("a/b.txt"),
            size: 42,
            e_tag: String::from("abc123"),
        }
    }

    #[test]
    fn records_survive_the_trip_through_the_wire_format() {
        let event = batch("my-bucket", "us-east-1", &[sample_entry()]);
        let payload = serde_json::to_string(&event).unwrap();
        let received: S3Event = serde_json::from_str(&payload).unwrap();

        assert_eq!(received.records.len(), 1);
        let record = &received.records[0];
        assert_eq!(record.event_name.as_deref(), Some(EVENT_NAME));
        assert_eq!(record.event_source.as_deref(), Some("aws:s3"));
        assert_eq!(record.aws_region.as_deref(), Some("us-east-1"));
        assert_eq!(record.s3.bucket.name.as_deref(), Some("my-bucket"));
        assert_eq!(record.s3.bucket.arn.as_deref(), Some("arn:aws:s3:::my-bucket"));
        assert_eq!(record.s3.object.key.as_deref(), Some("a/b.txt"));
        assert_eq!(record.s3.object.size, Some(42));
        assert_eq!(record.s3.object.e_tag.as_deref(), Some("abc123"));
    }

    #[test]
    fn envelope_uses_the_notification_field_names() {
        let event = batch("my-bucket", "us-east-1", &[sample_entry()]);
        let value: Value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["Records"][0]["eventName"], EVENT_NAME);
        assert_eq!(value["Records"][0]["eventVersion"], "2.0");
        assert_eq!(value["Records"][0]["s3"]["s3SchemaVersion"], "1.0");
        assert_eq!(value["Records"][0]["s3"]["object"]["eTag"], "abc123");
        assert_eq!(value["Records"][0]["s3"]["object"]["size"], 42);
        assert!(value["Records"][0]["eventTime"].is_string());
    }

    #[test]
    fn batch_preserves_entry_order() {
        let entries: Vec<ObjectEntry> = (0..4)
            .map(|i| ObjectEntry {
                key: format!("k{}", i),
                size: i,
                e_tag: format!("t{}", i),
            })
            .collect();
        let event = batch("my-bucket", "eu-west-1", &entries);
        let keys: Vec<Option<&str>> = event
            .records
            .iter()
            .map(|record| record.s3.object.key.as_deref())
            .collect();
        assert_eq!(keys, vec![Some("k0"), Some("k1"), Some("k2"), Some("k3")]);
    }
}
