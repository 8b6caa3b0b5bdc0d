use mongodb::bson::{Bson, Document};
use serde_json::{Map, Number, Value};

/// Converts BSON into JSON a plain client can read: object ids become hex
/// strings and dates become RFC 3339 strings.
pub fn to_plain_json(value: Bson) -> Value {
    match value {
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        Bson::DateTime(dt) => match dt.try_to_rfc3339_string() {
            Ok(s) => Value::String(s),
            Err(_) => Value::from(dt.timestamp_millis()),
        },
        Bson::Document(doc) => document_to_plain_json(doc),
        Bson::Array(items) => Value::Array(items.into_iter().map(to_plain_json).collect()),
        Bson::String(s) => Value::String(s),
        Bson::Boolean(b) => Value::Bool(b),
        Bson::Int32(i) => Value::from(i),
        Bson::Int64(i) => Value::from(i),
        Bson::Double(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        Bson::Null | Bson::Undefined => Value::Null,
        other => other.into_relaxed_extjson(),
    }
}

pub fn document_to_plain_json(doc: Document) -> Value {
    Value::Object(
        doc.into_iter()
            .map(|(key, value)| (key, to_plain_json(value)))
            .collect::<Map<String, Value>>(),
    )
}
