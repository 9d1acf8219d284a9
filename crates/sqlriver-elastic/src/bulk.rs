//! `_bulk` request rendering and response interpretation

use serde::{Deserialize, Serialize};
use sqlriver_core::{Batch, BackendError, IndexCreation};

/// Longest response excerpt carried in an error message
const MAX_ERROR_BODY: usize = 512;

#[derive(Serialize)]
struct Action<'a> {
    index: ActionMeta<'a>,
}

#[derive(Serialize)]
struct ActionMeta<'a> {
    #[serde(rename = "_index")]
    index: &'a str,
    #[serde(rename = "_type", skip_serializing_if = "Option::is_none")]
    doc_type: Option<&'a str>,
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
}

/// Render `batch` as an NDJSON `_bulk` body: one action line and one
/// source line per item, each newline-terminated.
///
/// `_type` is only sent to clusters that still have mapping types.
pub fn render_bulk(batch: &Batch, legacy_types: bool) -> Result<Vec<u8>, serde_json::Error> {
    let target = batch.target();
    let mut body = Vec::with_capacity(batch.len() * 128);
    for item in batch.items() {
        let action = Action {
            index: ActionMeta {
                index: &target.index,
                doc_type: legacy_types.then_some(target.doc_type.as_str()),
                id: item.id.as_deref(),
            },
        };
        serde_json::to_writer(&mut body, &action)?;
        body.push(b'\n');
        serde_json::to_writer(&mut body, &item.doc)?;
        body.push(b'\n');
    }
    Ok(body)
}

#[derive(Deserialize)]
struct BulkResponse {
    errors: bool,
    #[serde(default)]
    items: Vec<std::collections::HashMap<String, ItemResult>>,
}

#[derive(Deserialize)]
struct ItemResult {
    status: u16,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

impl ItemResult {
    fn failed(&self) -> bool {
        self.error.is_some() || self.status >= 300
    }

    fn reason(&self) -> String {
        match &self.error {
            Some(serde_json::Value::Object(e)) => {
                let kind = e.get("type").and_then(|v| v.as_str()).unwrap_or("error");
                let reason = e.get("reason").and_then(|v| v.as_str()).unwrap_or("");
                format!("{kind}: {reason}")
            }
            Some(other) => other.to_string(),
            None => format!("status {}", self.status),
        }
    }
}

/// Interpret a 2xx `_bulk` response body. Item-level failures become
/// [`BackendError::Rejected`].
pub fn parse_bulk_response(body: &str) -> Result<(), BackendError> {
    let response: BulkResponse = serde_json::from_str(body)?;
    if !response.errors {
        return Ok(());
    }
    let total = response.items.len();
    let mut failed = 0;
    let mut first = None;
    for result in response.items.iter().flat_map(|item| item.values()) {
        if result.failed() {
            failed += 1;
            first.get_or_insert_with(|| result.reason());
        }
    }
    Err(BackendError::Rejected {
        failed,
        total,
        reason: first.unwrap_or_else(|| "unknown".to_string()),
    })
}

/// Map the answer to `PUT /{index}` onto the index-creation contract.
pub fn classify_create_response(
    index: &str,
    status: u16,
    body: &str,
) -> Result<IndexCreation, BackendError> {
    if (200..300).contains(&status) {
        return Ok(IndexCreation::Created);
    }
    if body.contains("resource_already_exists_exception")
        || body.contains("index_already_exists_exception")
    {
        return Ok(IndexCreation::AlreadyExisted);
    }
    if status == 503 || body.contains("cluster_block_exception") {
        return Err(BackendError::ClusterBlocked(excerpt(body)));
    }
    Err(BackendError::Http {
        status: Some(status),
        message: format!("create index [{index}]: {}", excerpt(body)),
    })
}

pub(crate) fn excerpt(body: &str) -> String {
    match body.char_indices().nth(MAX_ERROR_BODY) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlriver_core::{Document, FieldValue, IndexTarget};

    fn batch() -> Batch {
        let mut batch = Batch::with_capacity(IndexTarget::new("people", "person"), 2);
        let mut d1 = Document::new();
        d1.insert("name", FieldValue::String("ada".into()));
        d1.insert("age", FieldValue::Int(36));
        batch.push(Some("1".into()), d1);
        let mut d2 = Document::new();
        d2.insert("name", FieldValue::Null);
        batch.push(None, d2);
        batch
    }

    #[test]
    fn render_without_types() {
        let body = String::from_utf8(render_bulk(&batch(), false).unwrap()).unwrap();
        assert_eq!(
            body,
            concat!(
                r#"{"index":{"_index":"people","_id":"1"}}"#,
                "\n",
                r#"{"name":"ada","age":36}"#,
                "\n",
                r#"{"index":{"_index":"people"}}"#,
                "\n",
                r#"{"name":null}"#,
                "\n",
            )
        );
    }

    #[test]
    fn render_with_legacy_types() {
        let body = String::from_utf8(render_bulk(&batch(), true).unwrap()).unwrap();
        let first = body.lines().next().unwrap();
        assert_eq!(
            first,
            r#"{"index":{"_index":"people","_type":"person","_id":"1"}}"#
        );
    }

    #[test]
    fn clean_response_is_ok() {
        let body = r#"{"took":3,"errors":false,"items":[{"index":{"_id":"1","status":201}}]}"#;
        assert!(parse_bulk_response(body).is_ok());
    }

    #[test]
    fn item_failures_are_counted() {
        let body = r#"{"took":3,"errors":true,"items":[
            {"index":{"_id":"1","status":201}},
            {"index":{"_id":"2","status":400,"error":{"type":"mapper_parsing_exception","reason":"failed to parse field [age]"}}},
            {"index":{"_id":"3","status":429,"error":{"type":"es_rejected_execution_exception","reason":"queue full"}}}
        ]}"#;
        match parse_bulk_response(body) {
            Err(BackendError::Rejected {
                failed,
                total,
                reason,
            }) => {
                assert_eq!((failed, total), (2, 3));
                assert_eq!(reason, "mapper_parsing_exception: failed to parse field [age]");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn garbage_response_is_serialize_error() {
        assert!(matches!(
            parse_bulk_response("<html>"),
            Err(BackendError::Serialize(_))
        ));
    }

    #[test]
    fn create_outcomes() {
        assert_eq!(
            classify_create_response("jdbc", 200, r#"{"acknowledged":true}"#).unwrap(),
            IndexCreation::Created
        );
        let exists = r#"{"error":{"type":"resource_already_exists_exception"},"status":400}"#;
        assert_eq!(
            classify_create_response("jdbc", 400, exists).unwrap(),
            IndexCreation::AlreadyExisted
        );
        let legacy = r#"{"error":"IndexAlreadyExistsException[[jdbc] already exists]","status":400,"type":"index_already_exists_exception"}"#;
        assert_eq!(
            classify_create_response("jdbc", 400, legacy).unwrap(),
            IndexCreation::AlreadyExisted
        );
    }

    #[test]
    fn create_blocked_and_hard_failures() {
        let blocked = classify_create_response("jdbc", 503, "").unwrap_err();
        assert!(blocked.is_soft_for_create());
        let block = r#"{"error":{"type":"cluster_block_exception"},"status":403}"#;
        assert!(classify_create_response("jdbc", 403, block)
            .unwrap_err()
            .is_soft_for_create());

        let hard = classify_create_response("jdbc", 401, "unauthorized").unwrap_err();
        assert!(!hard.is_soft_for_create());
        assert!(hard.to_string().contains("401"));
    }

    #[test]
    fn excerpt_truncates_long_bodies() {
        let long = "x".repeat(2 * MAX_ERROR_BODY);
        assert_eq!(excerpt(&long).len(), MAX_ERROR_BODY + 3);
        assert_eq!(excerpt("short"), "short");
    }
}
