//! Resource request/response shapes for synchronous interception sites.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

/// A request the engine is about to load.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequest {
    pub url: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_for_main_frame: Option<bool>,
}

impl ResourceRequest {
    /// A `GET` request with no headers.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: "GET".to_string(),
            headers: BTreeMap::new(),
            is_for_main_frame: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn for_main_frame(mut self, is_main_frame: bool) -> Self {
        self.is_for_main_frame = Some(is_main_frame);
        self
    }

    /// JSON arguments sent with the host invocation.
    pub(crate) fn to_host_args(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Bytes and metadata handed back to the engine.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResourceResponse {
    pub content_type: String,
    pub content_encoding: String,
    pub status_code: Option<u16>,
    pub reason_phrase: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub data: Vec<u8>,
}

impl ResourceResponse {
    pub fn new(content_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            content_type: content_type.into(),
            content_encoding: "utf-8".to_string(),
            data,
            ..Default::default()
        }
    }

    /// Empty body served for blocked requests.
    pub fn empty() -> Self {
        Self::new("text/plain", Vec::new())
    }

    /// Decode the host's reply payload.
    ///
    /// Returns `None` for `null`, for anything that is not an object, and
    /// when `data` is absent or is not an array of byte values. All of
    /// those mean "no response, fall back to default loading".
    pub fn from_host_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let data = decode_bytes(object.get("data")?)?;

        let string_field = |key: &str| object.get(key).and_then(Value::as_str).map(str::to_string);

        let headers = object
            .get("headers")
            .and_then(Value::as_object)
            .map(|map| {
                map.iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        Some(Self {
            content_type: string_field("contentType").unwrap_or_else(|| "text/plain".to_string()),
            content_encoding: string_field("contentEncoding").unwrap_or_else(|| "utf-8".to_string()),
            status_code: object
                .get("statusCode")
                .and_then(Value::as_u64)
                .and_then(|code| u16::try_from(code).ok()),
            reason_phrase: string_field("reasonPhrase"),
            headers,
            data,
        })
    }
}

fn decode_bytes(value: &Value) -> Option<Vec<u8>> {
    value
        .as_array()?
        .iter()
        .map(|b| b.as_u64().and_then(|b| u8::try_from(b).ok()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_host_value_keeps_exact_bytes_and_type() {
        let bytes: Vec<u8> = vec![0x89, b'P', b'N', b'G', 0, 255];
        let reply = json!({"contentType": "image/png", "data": bytes});

        let response = ResourceResponse::from_host_value(&reply).unwrap();
        assert_eq!(response.content_type, "image/png");
        assert_eq!(response.data, vec![0x89, b'P', b'N', b'G', 0, 255]);
        assert_eq!(response.content_encoding, "utf-8");
        assert_eq!(response.status_code, None);
    }

    #[test]
    fn from_host_value_reads_optional_fields() {
        let reply = json!({
            "contentType": "text/html",
            "contentEncoding": "gzip",
            "statusCode": 404,
            "reasonPhrase": "Not Found",
            "headers": {"x-test": "1", "ignored": 5},
            "data": []
        });

        let response = ResourceResponse::from_host_value(&reply).unwrap();
        assert_eq!(response.status_code, Some(404));
        assert_eq!(response.reason_phrase.as_deref(), Some("Not Found"));
        assert_eq!(response.content_encoding, "gzip");
        assert_eq!(response.headers.len(), 1);
        assert!(response.data.is_empty());
    }

    #[test]
    fn from_host_value_without_data_is_no_response() {
        assert!(ResourceResponse::from_host_value(&json!({"contentType": "a/b"})).is_none());
        assert!(ResourceResponse::from_host_value(&Value::Null).is_none());
    }

    #[test]
    fn from_host_value_rejects_out_of_range_bytes() {
        assert!(ResourceResponse::from_host_value(&json!({"data": [1, 300]})).is_none());
    }

    #[test]
    fn request_serializes_in_camel_case() {
        let request = ResourceRequest::get("custom://a.png")
            .with_header("Accept", "image/*")
            .for_main_frame(false);
        assert_eq!(
            request.to_host_args(),
            json!({
                "url": "custom://a.png",
                "method": "GET",
                "headers": {"Accept": "image/*"},
                "isForMainFrame": false
            })
        );
    }
}
