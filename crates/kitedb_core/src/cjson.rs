//! CJSON: the compact binary payload encoding.
//!
//! Layout per item: varuint field count, then per field a varuint name
//! tag (resolved through the namespace [`TagsMatcher`]) followed by a
//! typed value. Values are a type byte and a type-specific body;
//! arrays and nested objects recurse.

use kitedb_codec::{Decoder, Encoder};
use serde_json::{Map, Number, Value};

use crate::error::{Error, Result};
use crate::tags::TagsMatcher;

const TYPE_NULL: u8 = 0;
const TYPE_BOOL: u8 = 1;
const TYPE_INT: u8 = 2;
const TYPE_DOUBLE: u8 = 3;
const TYPE_STRING: u8 = 4;
const TYPE_ARRAY: u8 = 5;
const TYPE_OBJECT: u8 = 6;

/// Encodes a payload object as CJSON.
///
/// New field names are registered in `tags`; the returned boolean is
/// true when the matcher grew (the item's tags-updated condition).
pub fn encode(payload: &Value, tags: &mut TagsMatcher) -> Result<(Vec<u8>, bool)> {
    let obj = payload
        .as_object()
        .ok_or_else(|| Error::params("item payload must be a JSON object"))?;

    let mut enc = Encoder::new();
    let mut updated = false;
    encode_object(&mut enc, obj, tags, &mut updated)?;
    Ok((enc.into_bytes(), updated))
}

fn encode_object(
    enc: &mut Encoder,
    obj: &Map<String, Value>,
    tags: &mut TagsMatcher,
    updated: &mut bool,
) -> Result<()> {
    enc.put_varuint(obj.len() as u64);
    for (name, value) in obj {
        let (tag, added) = tags.get_or_add(name);
        *updated |= added;
        enc.put_varuint(u64::from(tag));
        encode_value(enc, value, tags, updated)?;
    }
    Ok(())
}

fn encode_value(
    enc: &mut Encoder,
    value: &Value,
    tags: &mut TagsMatcher,
    updated: &mut bool,
) -> Result<()> {
    match value {
        Value::Null => enc.put_u8(TYPE_NULL),
        Value::Bool(b) => {
            enc.put_u8(TYPE_BOOL);
            enc.put_u8(u8::from(*b));
        }
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                enc.put_u8(TYPE_INT);
                enc.put_varint(i);
            } else {
                enc.put_u8(TYPE_DOUBLE);
                enc.put_double(n.as_f64().unwrap_or(0.0));
            }
        }
        Value::String(s) => {
            enc.put_u8(TYPE_STRING);
            enc.put_vstring(s);
        }
        Value::Array(items) => {
            enc.put_u8(TYPE_ARRAY);
            enc.put_varuint(items.len() as u64);
            for item in items {
                encode_value(enc, item, tags, updated)?;
            }
        }
        Value::Object(obj) => {
            enc.put_u8(TYPE_OBJECT);
            encode_object(enc, obj, tags, updated)?;
        }
    }
    Ok(())
}

/// Decodes a CJSON payload against a matcher.
///
/// Every tag in the input must already be known to `tags`; a payload
/// encoded against a broader matcher fails with a parse error (the
/// caller merges matchers first).
pub fn decode(bytes: &[u8], tags: &TagsMatcher) -> Result<Value> {
    let mut dec = Decoder::new(bytes);
    let value = decode_object(&mut dec, tags)?;
    if !dec.eof() {
        return Err(Error::ParseBin("trailing bytes in CJSON payload".into()));
    }
    Ok(value)
}

fn decode_object(dec: &mut Decoder<'_>, tags: &TagsMatcher) -> Result<Value> {
    let count = dec.get_varuint()?;
    let mut obj = Map::new();
    for _ in 0..count {
        let tag = dec.get_varuint()? as u32;
        let name = tags
            .name_of(tag)
            .ok_or_else(|| Error::ParseBin(format!("unknown CJSON field tag {tag}")))?
            .to_owned();
        let value = decode_value(dec, tags)?;
        obj.insert(name, value);
    }
    Ok(Value::Object(obj))
}

fn decode_value(dec: &mut Decoder<'_>, tags: &TagsMatcher) -> Result<Value> {
    match dec.get_u8()? {
        TYPE_NULL => Ok(Value::Null),
        TYPE_BOOL => Ok(Value::Bool(dec.get_u8()? != 0)),
        TYPE_INT => Ok(Value::Number(Number::from(dec.get_varint()?))),
        TYPE_DOUBLE => {
            let d = dec.get_double()?;
            Number::from_f64(d)
                .map(Value::Number)
                .ok_or_else(|| Error::ParseBin("non-finite double in CJSON".into()))
        }
        TYPE_STRING => Ok(Value::String(dec.get_vstring()?)),
        TYPE_ARRAY => {
            let len = dec.get_varuint()?;
            let mut items = Vec::new();
            for _ in 0..len {
                items.push(decode_value(dec, tags)?);
            }
            Ok(Value::Array(items))
        }
        TYPE_OBJECT => decode_object(dec, tags),
        other => Err(Error::ParseBin(format!("unknown CJSON value type {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn roundtrip_flat_object() {
        let mut tm = TagsMatcher::new(1);
        let payload = json!({"id": 1, "v": "a", "ok": true, "none": null});
        let (bytes, updated) = encode(&payload, &mut tm).unwrap();
        assert!(updated);
        assert_eq!(decode(&bytes, &tm).unwrap(), payload);
    }

    #[test]
    fn roundtrip_nested() {
        let mut tm = TagsMatcher::new(1);
        let payload = json!({
            "id": 42,
            "tags": ["a", "b"],
            "inner": {"x": 1.5, "y": [-1, -2]}
        });
        let (bytes, _) = encode(&payload, &mut tm).unwrap();
        assert_eq!(decode(&bytes, &tm).unwrap(), payload);
    }

    #[test]
    fn second_encode_does_not_update_tags() {
        let mut tm = TagsMatcher::new(1);
        let payload = json!({"id": 1});
        let (_, first) = encode(&payload, &mut tm).unwrap();
        let (_, second) = encode(&payload, &mut tm).unwrap();
        assert!(first);
        assert!(!second);
    }

    #[test]
    fn decode_with_broader_matcher_preserves_fields() {
        // Encoding side registers the names; a decoder whose matcher
        // merged the encoder's sees identical observable fields.
        let mut master = TagsMatcher::new(1);
        let payload = json!({"id": 9, "v": "z"});
        let (bytes, _) = encode(&payload, &mut master).unwrap();

        let mut slave = TagsMatcher::new(2);
        assert!(slave.try_merge(&master));
        slave.get_or_add("extra");

        assert_eq!(decode(&bytes, &slave).unwrap(), payload);
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let mut master = TagsMatcher::new(1);
        let (bytes, _) = encode(&json!({"id": 1}), &mut master).unwrap();

        let empty = TagsMatcher::new(1);
        let err = decode(&bytes, &empty).unwrap_err();
        assert_eq!(err.code(), 8);
    }

    #[test]
    fn non_object_payload_is_rejected() {
        let mut tm = TagsMatcher::new(1);
        assert!(encode(&json!([1, 2]), &mut tm).is_err());
    }
}
