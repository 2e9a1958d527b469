use serde_json::Value;
use vellum_query::SortDirection;

use crate::error::EncodingError;

// ── Sortable encoding ──────────────────────────────────────────
//
// Index keys are concatenations of encoded components. Each encoding is
// prefix-free, so byte order of a concatenation equals the tuple order of its
// components. Type tags follow the cross-type order of `vellum_query::value`.
// Descending components are bit-inverted, which reverses their order while
// keeping them prefix-free.

const TAG_NULL: u8 = 0x10;
const TAG_FALSE: u8 = 0x20;
const TAG_TRUE: u8 = 0x21;
const TAG_NUMBER: u8 = 0x30;
const TAG_STRING: u8 = 0x40;
const TAG_ARRAY: u8 = 0x50;
const TAG_OBJECT: u8 = 0x60;

/// Terminates arrays and objects. Lower than every tag.
const END: u8 = 0x00;
/// `0x00` inside a string is written as `0x00 0xFF`; the string ends with
/// `0x00 0x01`.
const ESCAPE: u8 = 0xFF;
const STRING_END: u8 = 0x01;

#[inline]
fn encode_f64_sortable(f: f64) -> [u8; 8] {
    let bits = f.to_bits();
    let encoded = if (bits & 0x8000_0000_0000_0000) != 0 {
        !bits
    } else {
        bits ^ 0x8000_0000_0000_0000
    };
    encoded.to_be_bytes()
}

fn encode_str(s: &str, out: &mut Vec<u8>) {
    out.push(TAG_STRING);
    for &b in s.as_bytes() {
        out.push(b);
        if b == 0x00 {
            out.push(ESCAPE);
        }
    }
    out.push(0x00);
    out.push(STRING_END);
}

/// Append the ascending encoding of `v`.
pub fn encode_value(v: &Value, out: &mut Vec<u8>) {
    match v {
        Value::Null => out.push(TAG_NULL),
        Value::Bool(false) => out.push(TAG_FALSE),
        Value::Bool(true) => out.push(TAG_TRUE),
        Value::Number(n) => {
            out.push(TAG_NUMBER);
            out.extend_from_slice(&encode_f64_sortable(n.as_f64().unwrap_or(0.0)));
        }
        Value::String(s) => encode_str(s, out),
        Value::Array(items) => {
            out.push(TAG_ARRAY);
            for item in items {
                encode_value(item, out);
            }
            out.push(END);
        }
        Value::Object(map) => {
            out.push(TAG_OBJECT);
            for (k, item) in map {
                encode_str(k, out);
                encode_value(item, out);
            }
            out.push(END);
        }
    }
}

/// Append `v` encoded for an index position with the given direction.
pub fn encode_component(v: &Value, direction: SortDirection, out: &mut Vec<u8>) {
    let start = out.len();
    encode_value(v, out);
    if direction == SortDirection::Desc {
        for b in &mut out[start..] {
            *b = !*b;
        }
    }
}

/// Append a document id. Ids are encoded as ascending strings.
pub fn encode_id(id: &str, out: &mut Vec<u8>) {
    encode_str(id, out);
}

/// Decode an id written by [`encode_id`] that makes up all of `bytes`.
pub fn decode_id(bytes: &[u8]) -> Result<String, EncodingError> {
    let malformed = || EncodingError::MalformedKey("bad id encoding".into());
    let body = bytes
        .strip_prefix(&[TAG_STRING])
        .and_then(|b| b.strip_suffix(&[0x00, STRING_END]))
        .ok_or_else(malformed)?;
    let mut raw = Vec::with_capacity(body.len());
    let mut iter = body.iter().copied();
    while let Some(b) = iter.next() {
        raw.push(b);
        if b == 0x00 && iter.next() != Some(ESCAPE) {
            return Err(malformed());
        }
    }
    String::from_utf8(raw).map_err(|_| malformed())
}

/// Smallest byte string greater than every string starting with `prefix`,
/// or `None` if no such string exists (all bytes `0xFF`).
pub fn prefix_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut out = prefix.to_vec();
    while let Some(last) = out.pop() {
        if last < 0xFF {
            out.push(last + 1);
            return Some(out);
        }
    }
    None
}
