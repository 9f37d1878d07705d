//! Provider backend implementations.

pub mod aws_s3;

pub use aws_s3::AwsS3Provider;
