//! Conversions between store types and the Firestore REST JSON format.
//!
//! Firestore wraps every value in a single-key object naming its type
//! (`{"stringValue": "milk"}`), encodes 64-bit integers as strings and
//! timestamps as RFC 3339. Server timestamps are not values at all: they are
//! field transforms attached to the write.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::store::{
    Collection, Direction, Document, DocumentId, FieldValue, Fields, Query, StoreError,
    StoreResult, Write,
};

/// Document as returned by the REST API.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct RawDocument {
    pub name: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
    pub update_time: Option<String>,
}

/// One element of a `runQuery` response stream.
#[derive(Debug, Deserialize)]
pub(super) struct RunQueryItem {
    pub document: Option<RawDocument>,
}

/// Encode a value. Returns `None` for the server timestamp sentinel.
pub(super) fn encode_value(value: &FieldValue) -> Option<Value> {
    let encoded = match value {
        FieldValue::Null => json!({ "nullValue": null }),
        FieldValue::Bool(b) => json!({ "booleanValue": b }),
        FieldValue::Integer(i) => json!({ "integerValue": i.to_string() }),
        FieldValue::Double(d) => json!({ "doubleValue": d }),
        FieldValue::String(s) => json!({ "stringValue": s }),
        FieldValue::Timestamp(ts) => {
            json!({ "timestampValue": ts.to_rfc3339_opts(SecondsFormat::Micros, true) })
        }
        FieldValue::ServerTimestamp => return None,
    };
    Some(encoded)
}

/// Split fields into encoded values and server-timestamp field paths.
pub(super) fn encode_fields(fields: &Fields) -> (Map<String, Value>, Vec<String>) {
    let mut encoded = Map::new();
    let mut server_timestamps = Vec::new();
    for (name, value) in fields {
        match encode_value(value) {
            Some(v) => {
                encoded.insert(name.clone(), v);
            }
            None => server_timestamps.push(name.clone()),
        }
    }
    (encoded, server_timestamps)
}

fn parse_timestamp(raw: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StoreError::Decode(format!("invalid timestamp {raw}: {e}")))
}

/// Decode a typed value object.
pub(super) fn decode_value(value: &Value) -> StoreResult<FieldValue> {
    let object = value
        .as_object()
        .ok_or_else(|| StoreError::Decode(format!("expected value object, got {value}")))?;
    let Some((kind, inner)) = object.iter().next() else {
        return Err(StoreError::Decode("empty value object".to_string()));
    };

    match kind.as_str() {
        "nullValue" => Ok(FieldValue::Null),
        "booleanValue" => inner
            .as_bool()
            .map(FieldValue::Bool)
            .ok_or_else(|| StoreError::Decode(format!("invalid boolean: {inner}"))),
        "integerValue" => inner
            .as_str()
            .and_then(|s| s.parse::<i64>().ok())
            .or_else(|| inner.as_i64())
            .map(FieldValue::Integer)
            .ok_or_else(|| StoreError::Decode(format!("invalid integer: {inner}"))),
        "doubleValue" => inner
            .as_f64()
            .map(FieldValue::Double)
            .ok_or_else(|| StoreError::Decode(format!("invalid double: {inner}"))),
        "stringValue" => inner
            .as_str()
            .map(FieldValue::from)
            .ok_or_else(|| StoreError::Decode(format!("invalid string: {inner}"))),
        "timestampValue" => inner
            .as_str()
            .ok_or_else(|| StoreError::Decode(format!("invalid timestamp: {inner}")))
            .and_then(parse_timestamp)
            .map(FieldValue::Timestamp),
        other => Err(StoreError::Decode(format!("unsupported value type: {other}"))),
    }
}

/// Decode a REST document into a store document.
pub(super) fn decode_document(raw: &RawDocument) -> StoreResult<Document> {
    let id = raw
        .name
        .rsplit('/')
        .next()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| StoreError::Decode(format!("invalid document name: {}", raw.name)))?;

    let fields = raw
        .fields
        .iter()
        .map(|(name, value)| decode_value(value).map(|v| (name.clone(), v)))
        .collect::<StoreResult<Fields>>()?;

    let update_time = raw.update_time.as_deref().map(parse_timestamp).transpose()?;

    Ok(Document {
        id: DocumentId::new(id),
        fields,
        update_time,
    })
}

/// Encode a write for `documents:commit`.
///
/// `documents_root` is the full resource name ending in `/documents`.
pub(super) fn encode_write(documents_root: &str, write: &Write) -> Value {
    let name = document_name(documents_root, write.collection(), write.id());
    match write {
        Write::Create { fields, .. } => encode_upsert(&name, fields, false, false),
        Write::Update { fields, .. } => encode_upsert(&name, fields, true, true),
        Write::Delete { .. } => json!({ "delete": name }),
    }
}

fn encode_upsert(name: &str, fields: &Fields, must_exist: bool, masked: bool) -> Value {
    let (encoded, server_timestamps) = encode_fields(fields);
    let mask: Vec<String> = encoded.keys().cloned().collect();

    let mut write = Map::new();
    write.insert("update".into(), json!({ "name": name, "fields": encoded }));
    write.insert("currentDocument".into(), json!({ "exists": must_exist }));
    if masked {
        write.insert("updateMask".into(), json!({ "fieldPaths": mask }));
    }
    if !server_timestamps.is_empty() {
        let transforms: Vec<Value> = server_timestamps
            .iter()
            .map(|path| json!({ "fieldPath": path, "setToServerValue": "REQUEST_TIME" }))
            .collect();
        write.insert("updateTransforms".into(), Value::Array(transforms));
    }
    Value::Object(write)
}

/// Full resource name of a document.
pub(super) fn document_name(documents_root: &str, collection: Collection, id: &DocumentId) -> String {
    format!("{documents_root}/{}/{id}", collection.name())
}

/// Encode a query as a `runQuery` request body.
pub(super) fn encode_query(query: &Query) -> Value {
    let mut structured = Map::new();
    structured.insert(
        "from".into(),
        json!([{ "collectionId": query.collection.name() }]),
    );

    let filters: Vec<Value> = query
        .filters
        .iter()
        .map(|filter| {
            json!({
                "fieldFilter": {
                    "field": { "fieldPath": filter.field },
                    "op": "EQUAL",
                    "value": encode_value(&filter.value).unwrap_or(json!({ "nullValue": null })),
                }
            })
        })
        .collect();
    match filters.len() {
        0 => {}
        1 => {
            if let Some(single) = filters.into_iter().next() {
                structured.insert("where".into(), single);
            }
        }
        _ => {
            structured.insert(
                "where".into(),
                json!({ "compositeFilter": { "op": "AND", "filters": filters } }),
            );
        }
    }

    if let Some((field, direction)) = &query.order_by {
        let direction = match direction {
            Direction::Ascending => "ASCENDING",
            Direction::Descending => "DESCENDING",
        };
        structured.insert(
            "orderBy".into(),
            json!([{ "field": { "fieldPath": field }, "direction": direction }]),
        );
    }

    if let Some(limit) = query.limit {
        structured.insert("limit".into(), json!(limit));
    }

    json!({ "structuredQuery": structured })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    const ROOT: &str = "projects/p/databases/(default)/documents";

    #[test]
    fn test_value_round_trip() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let values = [
            FieldValue::Null,
            FieldValue::Bool(true),
            FieldValue::Integer(-42),
            FieldValue::Double(2.5),
            FieldValue::from("milk"),
            FieldValue::Timestamp(ts),
        ];
        for value in values {
            let encoded = encode_value(&value).unwrap();
            assert_eq!(decode_value(&encoded).unwrap(), value);
        }
        assert!(encode_value(&FieldValue::ServerTimestamp).is_none());
    }

    #[test]
    fn test_integer_is_encoded_as_string() {
        assert_eq!(
            encode_value(&FieldValue::Integer(7)).unwrap(),
            json!({ "integerValue": "7" })
        );
    }

    #[test]
    fn test_decode_rejects_unknown_types() {
        assert!(decode_value(&json!({ "geoPointValue": {} })).is_err());
        assert!(decode_value(&json!("bare")).is_err());
    }

    #[test]
    fn test_decode_document_takes_id_from_name() {
        let raw: RawDocument = serde_json::from_value(json!({
            "name": format!("{ROOT}/produtos/abc123"),
            "fields": { "name": { "stringValue": "milk" } },
            "updateTime": "2024-05-01T12:30:00.123456Z"
        }))
        .unwrap();
        let doc = decode_document(&raw).unwrap();
        assert_eq!(doc.id.as_str(), "abc123");
        assert_eq!(doc.get_str("name"), Some("milk"));
        assert!(doc.update_time.is_some());
    }

    #[test]
    fn test_create_write_uses_precondition_and_transform() {
        let mut fields = Fields::new();
        fields.insert("name".into(), FieldValue::from("milk"));
        fields.insert("createdAt".into(), FieldValue::ServerTimestamp);
        let write = Write::Create {
            collection: Collection::ShoppingList,
            id: DocumentId::new("item1"),
            fields,
        };

        let encoded = encode_write(ROOT, &write);
        assert_eq!(encoded["update"]["name"], json!(format!("{ROOT}/lista_atual/item1")));
        assert_eq!(encoded["update"]["fields"]["name"], json!({ "stringValue": "milk" }));
        assert!(encoded["update"]["fields"].get("createdAt").is_none());
        assert_eq!(encoded["currentDocument"], json!({ "exists": false }));
        assert_eq!(encoded["updateTransforms"][0]["fieldPath"], json!("createdAt"));
        assert!(encoded.get("updateMask").is_none());
    }

    #[test]
    fn test_update_write_is_masked() {
        let mut fields = Fields::new();
        fields.insert("bestRegularPrice".into(), FieldValue::from("2.99"));
        let write = Write::Update {
            collection: Collection::Products,
            id: DocumentId::new("p1"),
            fields,
        };
        let encoded = encode_write(ROOT, &write);
        assert_eq!(encoded["updateMask"], json!({ "fieldPaths": ["bestRegularPrice"] }));
        assert_eq!(encoded["currentDocument"], json!({ "exists": true }));
    }

    #[test]
    fn test_delete_write() {
        let write = Write::Delete {
            collection: Collection::Markets,
            id: DocumentId::new("m1"),
        };
        assert_eq!(
            encode_write(ROOT, &write),
            json!({ "delete": format!("{ROOT}/mercados/m1") })
        );
    }

    #[test]
    fn test_encode_query() {
        let query = Query::collection(Collection::Products)
            .where_eq("name", "milk")
            .order_by("name", Direction::Descending)
            .limit(1);
        let body = encode_query(&query);
        let structured = &body["structuredQuery"];
        assert_eq!(structured["from"], json!([{ "collectionId": "produtos" }]));
        assert_eq!(structured["where"]["fieldFilter"]["op"], json!("EQUAL"));
        assert_eq!(structured["orderBy"][0]["direction"], json!("DESCENDING"));
        assert_eq!(structured["limit"], json!(1));
    }

    #[test]
    fn test_encode_query_combines_filters() {
        let query = Query::collection(Collection::Products)
            .where_eq("name", "milk")
            .where_eq("archived", false);
        let body = encode_query(&query);
        let composite = &body["structuredQuery"]["where"]["compositeFilter"];
        assert_eq!(composite["op"], json!("AND"));
        assert_eq!(composite["filters"].as_array().map(Vec::len), Some(2));
    }
}
