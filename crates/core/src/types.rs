use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};

/// One entry of a bucket listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectDescriptor {
    pub key: String,
    pub size: u64,
    #[serde(serialize_with = "serialize_iso8601")]
    pub last_modified: DateTime<Utc>,
}

/// Listing of a bucket, optionally narrowed by a key prefix
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BucketListing {
    pub bucket: String,
    pub files: Vec<ObjectDescriptor>,
}

// `2024-05-01T12:00:00+00:00`, the offset form rather than `Z`
fn serialize_iso8601<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::AutoSi, false))
}
