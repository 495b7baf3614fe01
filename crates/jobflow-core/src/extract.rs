//! Field extraction from loosely shaped backend responses
//!
//! Several endpoints answer with more than one body shape (a field either at
//! the top level or nested under `data`, under either of two spellings). Each
//! extractor tries a fixed list of paths in priority order and reports an
//! error when none of them match; it never falls back to a default.

use serde_json::Value;

use crate::error::{CoreError, CoreResult};
use crate::models::JobHandle;

/// Where a job handle was found in a submit response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleShape {
    /// `{ "task_id": .. }`
    Flat,
    /// `{ "data": { "task_id": .. } }`
    Nested,
}

const HANDLE_PATHS: &[(HandleShape, &[&str])] = &[
    (HandleShape::Flat, &["task_id"]),
    (HandleShape::Flat, &["taskId"]),
    (HandleShape::Nested, &["data", "task_id"]),
    (HandleShape::Nested, &["data", "taskId"]),
];

const UPLOAD_URL_PATHS: &[&[&str]] = &[&["url"], &["data", "url"]];

const TOKEN_PATHS: &[&[&str]] = &[
    &["access_token"],
    &["token"],
    &["data", "access_token"],
    &["data", "token"],
];

/// Follow a key path through nested JSON objects
fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |node, key| node.get(*key))
}

/// Non-empty string or integer identifier
fn as_identifier(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Extract the job handle from a submit response.
///
/// The flat shape wins over the nested one when both are present.
pub fn extract_job_handle(response: &Value) -> CoreResult<(JobHandle, HandleShape)> {
    HANDLE_PATHS
        .iter()
        .find_map(|(shape, path)| {
            lookup(response, path)
                .and_then(as_identifier)
                .map(|id| (JobHandle::new(id), *shape))
        })
        .ok_or_else(|| CoreError::UnrecognizedShape(summarize(response)))
}

/// Extract a session token from a login response
pub fn extract_token(response: &Value) -> CoreResult<String> {
    TOKEN_PATHS
        .iter()
        .find_map(|path| match lookup(response, path) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            _ => None,
        })
        .ok_or(CoreError::MissingField("access_token"))
}

/// Extract the stored object URL from an upload response.
///
/// Returns `None` when no non-empty URL is present; whether that is an error
/// is up to the caller.
pub fn extract_upload_url(response: &Value) -> Option<String> {
    UPLOAD_URL_PATHS
        .iter()
        .find_map(|path| match lookup(response, path) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            _ => None,
        })
}

/// Top-level keys of a response, for error messages
fn summarize(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let keys: Vec<&str> = map.keys().map(String::as_str).collect();
            format!("object with keys [{}]", keys.join(", "))
        }
        Value::Null => "null".to_string(),
        Value::Array(_) => "array".to_string(),
        other => format!("scalar {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flat_and_nested_yield_same_handle() {
        let (flat, flat_shape) = extract_job_handle(&json!({ "taskId": "abc" })).unwrap();
        let (nested, nested_shape) =
            extract_job_handle(&json!({ "data": { "taskId": "abc" } })).unwrap();
        assert_eq!(flat, nested);
        assert_eq!(flat.as_str(), "abc");
        assert_eq!(flat_shape, HandleShape::Flat);
        assert_eq!(nested_shape, HandleShape::Nested);
    }

    #[test]
    fn test_snake_case_and_numeric_ids() {
        let (h, _) = extract_job_handle(&json!({ "task_id": 981 })).unwrap();
        assert_eq!(h.as_str(), "981");
        let (h, _) = extract_job_handle(&json!({ "code": 0, "data": { "task_id": "t-1" } })).unwrap();
        assert_eq!(h.as_str(), "t-1");
    }

    #[test]
    fn test_flat_has_priority() {
        let body = json!({ "task_id": "outer", "data": { "task_id": "inner" } });
        let (h, shape) = extract_job_handle(&body).unwrap();
        assert_eq!(h.as_str(), "outer");
        assert_eq!(shape, HandleShape::Flat);
    }

    #[test]
    fn test_empty_flat_id_falls_through_to_nested() {
        let body = json!({ "task_id": "", "data": { "task_id": "inner" } });
        let (h, shape) = extract_job_handle(&body).unwrap();
        assert_eq!(h.as_str(), "inner");
        assert_eq!(shape, HandleShape::Nested);
    }

    #[test]
    fn test_unrecognized_shape() {
        let err = extract_job_handle(&json!({ "message": "ok", "data": {} })).unwrap_err();
        assert!(matches!(err, CoreError::UnrecognizedShape(_)));
        assert!(err.to_string().contains("message"));

        assert!(extract_job_handle(&json!(null)).is_err());
        assert!(extract_job_handle(&json!({ "task_id": true })).is_err());
    }

    #[test]
    fn test_extract_token() {
        assert_eq!(extract_token(&json!({ "access_token": "a" })).unwrap(), "a");
        assert_eq!(extract_token(&json!({ "data": { "token": "b" } })).unwrap(), "b");
        assert_eq!(
            extract_token(&json!({ "detail": "bad" })),
            Err(CoreError::MissingField("access_token"))
        );
    }

    #[test]
    fn test_extract_upload_url() {
        assert_eq!(
            extract_upload_url(&json!({ "url": "http://cdn/a.png" })).as_deref(),
            Some("http://cdn/a.png")
        );
        assert_eq!(
            extract_upload_url(&json!({ "code": 0, "data": { "url": "http://cdn/b.png" } }))
                .as_deref(),
            Some("http://cdn/b.png")
        );
        assert_eq!(extract_upload_url(&json!({ "url": "" })), None);
        assert_eq!(extract_upload_url(&json!({ "code": 0 })), None);
    }
}
