//! Object-created trigger events.
//!
//! Two shapes are accepted:
//! - Storage notification envelope:
//!   `{"Records": [{"s3": {"bucket": {"name": ..}, "object": {"key": ..}}}]}`,
//!   whose keys arrive form-encoded (`+` for space, `%XX` escapes)
//! - Flat event `{"bucket": .., "key": ..}` with the key verbatim

use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::limits::ValidationError;

/// A newly created object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectCreated {
    pub bucket: String,
    pub key: String,
}

impl ObjectCreated {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

/// Extract every created object from a trigger payload
pub fn parse_trigger(event: &Value) -> Result<Vec<ObjectCreated>, ValidationError> {
    if let Some(records) = event.get("Records") {
        let records = records
            .as_array()
            .ok_or_else(|| ValidationError::MalformedEvent("Records is not a list".to_string()))?;
        if records.is_empty() {
            return Err(ValidationError::MissingField("Records"));
        }
        return records.iter().map(parse_record).collect();
    }

    let bucket = string_at(event, &["bucket"]).ok_or(ValidationError::MissingField("bucket"))?;
    let key = string_at(event, &["key"]).ok_or(ValidationError::MissingField("key"))?;
    Ok(vec![ObjectCreated::new(bucket, key)])
}

fn parse_record(record: &Value) -> Result<ObjectCreated, ValidationError> {
    let bucket = string_at(record, &["s3", "bucket", "name"])
        .ok_or(ValidationError::MissingField("s3.bucket.name"))?;
    let raw_key = string_at(record, &["s3", "object", "key"])
        .ok_or(ValidationError::MissingField("s3.object.key"))?;
    Ok(ObjectCreated::new(bucket, decode_key(raw_key)?))
}

fn string_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    path.iter()
        .try_fold(value, |v, field| v.get(*field))
        .and_then(Value::as_str)
}

/// Undo the form encoding of notification keys.
///
/// Stray `%` signs that do not start an escape are kept as they are.
fn decode_key(raw: &str) -> Result<String, ValidationError> {
    let mut url = Url::parse("http://localhost/")
        .map_err(|e| ValidationError::MalformedEvent(e.to_string()))?;
    url.set_query(Some(&format!("key={}", raw.replace('&', "%26"))));

    let key = url
        .query_pairs()
        .next()
        .map(|(_, value)| value.into_owned())
        .ok_or_else(|| ValidationError::MalformedEvent(format!("undecodable key: {}", raw)))?;

    if key.contains(char::REPLACEMENT_CHARACTER) && !raw.contains(char::REPLACEMENT_CHARACTER) {
        return Err(ValidationError::MalformedEvent(format!("key is not UTF-8: {}", raw)));
    }
    Ok(key)
}
