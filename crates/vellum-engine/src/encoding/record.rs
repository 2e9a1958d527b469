use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EncodingError, EngineError};

/// Stored form of a document: its data plus write metadata.
///
/// Encoded as a BSON document so the record bytes are self-describing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub data: Value,
    pub setter: String,
    /// Block timestamp of the first write.
    pub created: i64,
    /// Block timestamp of the latest write.
    pub updated: i64,
}

impl Record {
    pub fn encode(&self) -> Result<Vec<u8>, EncodingError> {
        Ok(bson::serialize_to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, EncodingError> {
        Ok(bson::deserialize_from_slice(bytes)?)
    }
}

/// Check that `value` can be written as BSON: integers must fit in an
/// `i64` and object keys may not contain NUL.
pub fn check_storable(value: &Value) -> Result<(), String> {
    match value {
        Value::Number(n) if !n.is_i64() && !n.is_f64() => {
            Err(format!("number {n} does not fit in a signed 64-bit integer"))
        }
        Value::Array(items) => items.iter().try_for_each(check_storable),
        Value::Object(map) => map.iter().try_for_each(|(k, v)| {
            if k.contains('\0') {
                return Err(format!("field name {k:?} contains a NUL byte"));
            }
            check_storable(v)
        }),
        _ => Ok(()),
    }
}

/// Serialize a value on the write path. A value BSON cannot hold is the
/// caller's fault, not the store's.
pub(crate) fn encode_for_write<T: Serialize>(value: &T) -> Result<Vec<u8>, EngineError> {
    bson::serialize_to_vec(value)
        .map_err(|e| EngineError::InvalidDocument(format!("cannot store value: {e}")))
}

/// Wrapper for storing non-document values (numbers, lists) as BSON.
#[derive(Serialize, Deserialize)]
pub(crate) struct Envelope<T> {
    pub value: T,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn record_round_trip() {
        let rec = Record {
            data: json!({
                "name": "Bob",
                "age": 20,
                "ratio": 0.5,
                "tags": ["a", null, true],
                "nested": {"x": -3}
            }),
            setter: "0xabc".into(),
            created: 10,
            updated: 12,
        };
        let bytes = rec.encode().unwrap();
        assert_eq!(Record::decode(&bytes).unwrap(), rec);
    }

    #[test]
    fn storable_values() {
        check_storable(&json!({"n": i64::MAX, "f": 1.5, "a": [{"neg": -1}]})).unwrap();
        assert!(check_storable(&json!({"n": u64::MAX})).is_err());
        assert!(check_storable(&json!({"a": [1, {"deep": u64::MAX}]})).is_err());
        assert!(check_storable(&json!({"bad\0key": 1})).is_err());
        assert!(matches!(
            encode_for_write(&json!({"n": u64::MAX})),
            Err(EngineError::InvalidDocument(_))
        ));
    }
}
