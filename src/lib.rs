//! Re-delivers S3 ObjectCreated notifications for objects that
//! already exist in a bucket, by synthesizing event records and
//! invoking every function subscribed to the bucket's notifications.

pub mod client;
pub mod conf;
pub mod event;
pub mod replay;
