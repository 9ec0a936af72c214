//! Caller-supplied request values and the prepared request

use std::time::Duration;

use indexmap::IndexMap;
use openapi_endpoints::{scalar_to_string, HttpMethod};
use serde_json::{Map, Value};

/// A file upload: name, raw bytes and media type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    pub filename: String,
    pub content: Vec<u8>,
    pub media_type: String,
}

impl FilePart {
    pub fn new(
        filename: impl Into<String>,
        content: impl Into<Vec<u8>>,
        media_type: impl Into<String>,
    ) -> Self {
        Self {
            filename: filename.into(),
            content: content.into(),
            media_type: media_type.into(),
        }
    }
}

/// One form field
#[derive(Debug, Clone, PartialEq)]
pub enum FormValue {
    Text(Value),
    File(FilePart),
}

impl FormValue {
    /// A `[filename, content, media-type]` string triple becomes a file,
    /// anything else stays a plain field
    pub fn from_json(value: Value) -> Self {
        if let Value::Array(items) = &value {
            if let [Value::String(filename), Value::String(content), Value::String(media_type)] =
                items.as_slice()
            {
                return FormValue::File(FilePart::new(
                    filename.as_str(),
                    content.as_bytes(),
                    media_type.as_str(),
                ));
            }
        }
        FormValue::Text(value)
    }

    pub fn is_file(&self) -> bool {
        matches!(self, FormValue::File(_))
    }
}

impl From<Value> for FormValue {
    fn from(value: Value) -> Self {
        FormValue::from_json(value)
    }
}

impl From<FilePart> for FormValue {
    fn from(file: FilePart) -> Self {
        FormValue::File(file)
    }
}

/// Values for one invocation, already split by location
#[derive(Debug, Clone, Default)]
pub struct RequestParts {
    pub path: Map<String, Value>,
    pub query: Map<String, Value>,
    pub headers: IndexMap<String, String>,
    pub body: Option<Value>,
    pub form: IndexMap<String, FormValue>,
    /// Sent as `Authorization: Bearer ...` when the endpoint needs it
    pub bearer_token: Option<String>,
    /// Overrides the endpoint's recorded servers
    pub server_url: Option<String>,
    pub timeout: Option<Duration>,
}

impl RequestParts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.path.insert(name.into(), value.into());
        self
    }

    pub fn query_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn form_field(mut self, name: impl Into<String>, value: impl Into<FormValue>) -> Self {
        self.form.insert(name.into(), value.into());
        self
    }

    pub fn bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn server_url(mut self, server_url: impl Into<String>) -> Self {
        self.server_url = Some(server_url.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Case-insensitive header lookup
    pub fn find_header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// What goes into the request body
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    None,
    Json(Value),
    Form {
        data: Vec<(String, String)>,
        files: Vec<(String, FilePart)>,
        multipart: bool,
    },
    Raw(String),
}

/// A validated request, ready to be sent
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: IndexMap<String, String>,
    pub query: Vec<(String, String)>,
    pub payload: Payload,
    pub timeout: Option<Duration>,
}

impl PreparedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

pub(crate) fn find_header<'a>(headers: &'a IndexMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// Replace any header with the same name, ignoring case
pub(crate) fn set_header(headers: &mut IndexMap<String, String>, name: &str, value: String) {
    remove_header(headers, name);
    headers.insert(name.to_string(), value);
}

pub(crate) fn remove_header(headers: &mut IndexMap<String, String>, name: &str) {
    headers.retain(|key, _| !key.eq_ignore_ascii_case(name));
}

/// Flatten a value into key/value pairs; arrays repeat the key, nulls vanish
pub(crate) fn push_pairs(pairs: &mut Vec<(String, String)>, name: &str, value: &Value) {
    match value {
        Value::Null => {}
        Value::Array(items) => {
            for item in items.iter().filter(|item| !item.is_null()) {
                pairs.push((name.to_string(), scalar_to_string(item)));
            }
        }
        other => pairs.push((name.to_string(), scalar_to_string(other))),
    }
}
