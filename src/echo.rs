//! Turns an inbound request into the JSON summary returned by `/api`.

use crate::error::EchoError;
use chrono::{Local, NaiveDateTime};
use http::{HeaderMap, HeaderValue, header};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use utoipa::ToSchema;

/// Placeholder `body` carried by a response whose construction failed.
pub const ERROR_BODY: &str = "Error parsing request";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Deepest array/object nesting embedded as structure. Anything deeper is
/// echoed as raw text so building, serializing and dropping the value stays
/// within a worker's stack.
pub const MAX_JSON_DEPTH: usize = 512;

/// The verbs the `/api` route is registered for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum EchoMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl EchoMethod {
    pub const ALL: [EchoMethod; 4] = [
        EchoMethod::Get,
        EchoMethod::Post,
        EchoMethod::Put,
        EchoMethod::Delete,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EchoMethod::Get => "GET",
            EchoMethod::Post => "POST",
            EchoMethod::Put => "PUT",
            EchoMethod::Delete => "DELETE",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }

    /// Only POST and PUT carry a body into the echo.
    pub fn accepts_body(self) -> bool {
        matches!(self, EchoMethod::Post | EchoMethod::Put)
    }
}

impl fmt::Display for EchoMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What ends up in the `body` field.
#[derive(Clone, Debug, PartialEq)]
pub enum EchoBody {
    /// No body, or a whitespace-only one. Omitted from the JSON.
    Absent,
    /// The body parsed as JSON and is embedded as-is.
    Json(serde_json::Value),
    /// The body was text but not JSON.
    Raw(String),
    /// Response construction failed, see `EchoResponse::error`.
    ErrorPlaceholder,
}

impl EchoBody {
    /// Opportunistic decode: JSON if it parses, the raw text otherwise.
    pub fn interpret(raw: Option<&str>) -> EchoBody {
        let Some(raw) = raw else {
            return EchoBody::Absent;
        };
        if raw.trim().is_empty() {
            return EchoBody::Absent;
        }
        match parse_json(raw) {
            // a literal `null` has nothing to echo
            Some(serde_json::Value::Null) => EchoBody::Absent,
            Some(value) => EchoBody::Json(value),
            None => EchoBody::Raw(raw.to_string()),
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, EchoBody::Absent)
    }
}

/// Numbers keep their literal digits (`arbitrary_precision`), and nesting is
/// bounded by [`MAX_JSON_DEPTH`] instead of serde_json's default of 128.
fn parse_json(raw: &str) -> Option<serde_json::Value> {
    if nesting_depth(raw) > MAX_JSON_DEPTH {
        return None;
    }
    let mut de = serde_json::Deserializer::from_str(raw);
    de.disable_recursion_limit();
    let value = serde_json::Value::deserialize(&mut de).ok()?;
    de.end().ok()?;
    Some(value)
}

/// Deepest `[`/`{` nesting outside of string literals.
fn nesting_depth(raw: &str) -> usize {
    let (mut depth, mut deepest) = (0usize, 0usize);
    let (mut in_string, mut escaped) = (false, false);
    for b in raw.bytes() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'[' | b'{' => {
                depth += 1;
                deepest = deepest.max(depth);
            }
            b']' | b'}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    deepest
}

impl Serialize for EchoBody {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            EchoBody::Absent => serializer.serialize_none(),
            EchoBody::Json(value) => value.serialize(serializer),
            EchoBody::Raw(text) => serializer.serialize_str(text),
            EchoBody::ErrorPlaceholder => serializer.serialize_str(ERROR_BODY),
        }
    }
}

/// Everything the echo needs from the request, already detached from the
/// HTTP stack.
#[derive(Clone, Debug, Default)]
pub struct EchoRequest {
    pub headers: HeaderMap,
    pub request_uri: Option<String>,
    pub query_string: Option<String>,
    pub remote_addr: Option<String>,
    /// `None` for GET/DELETE, `Err` when the payload could not be read as text.
    pub body: Option<Result<String, EchoError>>,
}

#[derive(Clone, Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EchoResponse {
    pub method: EchoMethod,
    pub headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "EchoBody::is_absent")]
    #[schema(value_type = Object)]
    pub body: EchoBody,
    #[serde(serialize_with = "serialize_timestamp")]
    #[schema(value_type = String, example = "2024-01-01 12:00:00")]
    pub timestamp: NaiveDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_string: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_addr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn serialize_timestamp<S: Serializer>(ts: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(&ts.format(TIMESTAMP_FORMAT))
}

impl EchoResponse {
    /// Builds the echo for one request. Never fails: a construction error
    /// becomes the error variant.
    pub fn build(method: EchoMethod, request: EchoRequest) -> EchoResponse {
        let timestamp = Local::now().naive_local();
        match Self::try_build(method, request, timestamp) {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(target: "service::echo", %method, error = %e, "❌ error building API response");
                Self::failed(method, &e, timestamp)
            }
        }
    }

    fn try_build(
        method: EchoMethod,
        request: EchoRequest,
        timestamp: NaiveDateTime,
    ) -> Result<EchoResponse, EchoError> {
        let headers = extract_headers(&request.headers);
        let raw_body = request.body.transpose()?;
        let body = EchoBody::interpret(raw_body.as_deref());

        Ok(EchoResponse {
            method,
            user_agent: header_text(&request.headers, header::USER_AGENT),
            content_type: header_text(&request.headers, header::CONTENT_TYPE),
            headers,
            body,
            timestamp,
            request_uri: request.request_uri,
            query_string: request.query_string,
            remote_addr: request.remote_addr,
            error: None,
        })
    }

    fn failed(method: EchoMethod, cause: &EchoError, timestamp: NaiveDateTime) -> EchoResponse {
        EchoResponse {
            method,
            headers: BTreeMap::new(),
            body: EchoBody::ErrorPlaceholder,
            timestamp,
            request_uri: None,
            query_string: None,
            remote_addr: None,
            user_agent: None,
            content_type: None,
            error: Some(format!("Failed to parse request: {cause}")),
        }
    }
}

/// One entry per header name; the last value seen wins. Values are decoded
/// as UTF-8 with invalid sequences replaced, so obs-text never fails a request.
fn extract_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .map(|(name, value)| (name.to_string(), header_value_text(value)))
        .collect()
}

fn header_value_text(value: &HeaderValue) -> String {
    String::from_utf8_lossy(value.as_bytes()).into_owned()
}

fn header_text(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers.get(name).map(header_value_text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request_with_body(body: Option<&str>) -> EchoRequest {
        let mut headers = HeaderMap::new();
        headers.insert("x-custom-header", HeaderValue::from_static("test-value"));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        EchoRequest {
            headers,
            request_uri: Some("/api".into()),
            query_string: None,
            remote_addr: Some("127.0.0.1".into()),
            body: body.map(|b| Ok(b.to_string())),
        }
    }

    #[test]
    fn interpret_body_variants() {
        assert_eq!(EchoBody::interpret(None), EchoBody::Absent);
        assert_eq!(EchoBody::interpret(Some("  \n\t")), EchoBody::Absent);
        assert_eq!(EchoBody::interpret(Some("null")), EchoBody::Absent);
        assert_eq!(
            EchoBody::interpret(Some(r#"{"a":[1,2,{"b":null}]}"#)),
            EchoBody::Json(json!({"a": [1, 2, {"b": null}]}))
        );
        assert_eq!(EchoBody::interpret(Some("42")), EchoBody::Json(json!(42)));
        assert_eq!(
            EchoBody::interpret(Some("invalid json content")),
            EchoBody::Raw("invalid json content".into())
        );
        // truncated JSON is kept verbatim
        assert_eq!(
            EchoBody::interpret(Some(r#"{"message": "#)),
            EchoBody::Raw(r#"{"message": "#.into())
        );
    }

    #[test]
    fn json_body_is_embedded() {
        let response = EchoResponse::build(
            EchoMethod::Post,
            request_with_body(Some(r#"{"message":"Hello World"}"#)),
        );
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["method"], "POST");
        assert_eq!(value["body"], json!({"message": "Hello World"}));
        assert_eq!(value["requestUri"], "/api");
        assert_eq!(value["contentType"], "application/json");
        assert_eq!(value["headers"]["x-custom-header"], "test-value");
        assert!(value.get("error").is_none());
    }

    #[test]
    fn absent_fields_are_omitted() {
        let response = EchoResponse::build(EchoMethod::Get, request_with_body(None));
        let value = serde_json::to_value(&response).unwrap();
        let object = value.as_object().unwrap();
        assert!(!object.contains_key("body"));
        assert!(!object.contains_key("queryString"));
        assert!(!object.contains_key("userAgent"));
        assert!(!object.contains_key("error"));
    }

    #[test]
    fn timestamp_uses_fixed_pattern() {
        let response = EchoResponse::build(EchoMethod::Delete, request_with_body(None));
        let value = serde_json::to_value(&response).unwrap();
        let ts = value["timestamp"].as_str().unwrap();
        assert!(NaiveDateTime::parse_from_str(ts, TIMESTAMP_FORMAT).is_ok(), "{ts}");
    }

    #[test]
    fn duplicate_headers_keep_one_value() {
        let mut request = request_with_body(None);
        request
            .headers
            .append("x-dup", HeaderValue::from_static("first"));
        request
            .headers
            .append("x-dup", HeaderValue::from_static("second"));
        let response = EchoResponse::build(EchoMethod::Get, request);
        assert_eq!(response.headers.get("x-dup").map(String::as_str), Some("second"));
    }

    #[test]
    fn non_ascii_header_values_are_echoed() {
        let mut request = request_with_body(Some(r#"{"ok":true}"#));
        request
            .headers
            .insert("x-name", HeaderValue::from_bytes("café".as_bytes()).unwrap());
        request
            .headers
            .insert("x-binary", HeaderValue::from_bytes(&[b'a', 0xfa, 0xfb]).unwrap());
        let response = EchoResponse::build(EchoMethod::Put, request);

        assert!(response.error.is_none());
        assert_eq!(response.body, EchoBody::Json(json!({"ok": true})));
        assert_eq!(response.headers["x-name"], "café");
        assert_eq!(response.headers["x-binary"], "a\u{fffd}\u{fffd}");
        assert_eq!(response.request_uri.as_deref(), Some("/api"));
    }

    #[test]
    fn big_integers_keep_their_digits() {
        let raw = r#"{"id":12345678901234567890123,"ratio":0.1000000000000000055511}"#;
        let EchoBody::Json(value) = EchoBody::interpret(Some(raw)) else {
            panic!("expected JSON body");
        };
        assert_eq!(serde_json::to_string(&value).unwrap(), raw);
    }

    #[test]
    fn deep_nesting_stays_structured_up_to_the_limit() {
        let deep = format!("{}{}", "[".repeat(200), "]".repeat(200));
        let EchoBody::Json(value) = EchoBody::interpret(Some(&deep)) else {
            panic!("expected JSON body");
        };
        assert_eq!(serde_json::to_string(&value).unwrap(), deep);

        let too_deep = format!(
            "{}{}",
            "[".repeat(MAX_JSON_DEPTH + 1),
            "]".repeat(MAX_JSON_DEPTH + 1)
        );
        assert_eq!(
            EchoBody::interpret(Some(&too_deep)),
            EchoBody::Raw(too_deep.clone())
        );
    }

    #[test]
    fn brackets_inside_strings_do_not_count_as_nesting() {
        assert_eq!(nesting_depth(r#"{"a":"[[[{{\"]]"}"#), 1);
        assert_eq!(nesting_depth(r#"[[1],[2,[3]]]"#), 3);
        assert_eq!(nesting_depth("plain"), 0);
    }

    #[test]
    fn unreadable_body_yields_error_variant() {
        let mut request = request_with_body(None);
        request.body = Some(Err(EchoError::Body("stream did not contain valid UTF-8".into())));
        let response = EchoResponse::build(EchoMethod::Post, request);
        assert_eq!(response.body, EchoBody::ErrorPlaceholder);
        assert!(response.error.is_some());
    }
}
