//! Payload normalization for client notifications.
//!
//! Turns any body the worker may hand to observers into one canonical
//! string plus its [`content_hash`], so pages can detect changes by
//! comparing hashes.
//!
//! ### Dispatch
//! - The body shape is an explicit [`Body`] variant chosen by the caller,
//!   and every variant has exactly one rule.
//! - Responses branch on their declared content type (substring match):
//!   JSON is parsed and re-serialized compactly with key order kept,
//!   `text/*` and `application/xml` are read as text, `image/*`, `audio/*`
//!   and `video/*` bytes are transcoded one char per byte, anything else is
//!   read as text.
//!
//! Malformed JSON is the only failure; the notifier turns it into an error
//! message.

use bytes::Bytes;
use cachefirst_core::{Error, Response, content_hash};
use serde_json::{Map, Value};
use std::fmt;

/// Any body the worker may report to clients.
pub enum Body {
    /// No body at all.
    Empty,
    /// A full response; its content type drives decoding.
    Response(Response),
    /// Raw text, used verbatim.
    Text(String),
    /// Raw bytes, transcoded one char per byte.
    Binary(Bytes),
    /// A typed binary object, read as text.
    Blob(Blob),
    /// Form entries, flattened into a JSON object.
    Form(FormData),
    /// Structured data, serialized as JSON.
    Json(Value),
    /// Anything else, rendered through `Display`.
    Other(Box<dyn fmt::Display + Send + Sync>),
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Empty => f.write_str("Empty"),
            Body::Response(r) => f.debug_tuple("Response").field(&r.status).finish(),
            Body::Text(s) => f.debug_tuple("Text").field(&s.len()).finish(),
            Body::Binary(b) => f.debug_tuple("Binary").field(&b.len()).finish(),
            Body::Blob(b) => f.debug_tuple("Blob").field(&b.mime).finish(),
            Body::Form(form) => f.debug_tuple("Form").field(&form.entries.len()).finish(),
            Body::Json(_) => f.write_str("Json"),
            Body::Other(_) => f.write_str("Other"),
        }
    }
}

impl From<Response> for Body {
    fn from(response: Response) -> Self {
        Body::Response(response)
    }
}

impl From<Option<Response>> for Body {
    fn from(response: Option<Response>) -> Self {
        response.map_or(Body::Empty, Body::Response)
    }
}

/// Binary data with an optional MIME type.
#[derive(Debug, Clone, PartialEq)]
pub struct Blob {
    pub bytes: Bytes,
    pub mime: Option<String>,
}

impl Blob {
    pub fn new(bytes: impl Into<Bytes>, mime: Option<&str>) -> Self {
        Self { bytes: bytes.into(), mime: mime.map(str::to_string) }
    }
}

/// A single form field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FormValue {
    Text(String),
    File { name: String, blob: Blob },
}

/// Ordered form entries; keys may repeat.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormData {
    pub entries: Vec<(String, FormValue)>,
}

impl FormData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, key: impl Into<String>, value: FormValue) {
        self.entries.push((key.into(), value));
    }

    /// Collapse entries into an object.
    ///
    /// A repeated key keeps its first position and its last value. File
    /// entries carry no enumerable fields and become `{}`.
    fn flatten(&self) -> Map<String, Value> {
        let mut map = Map::new();
        for (key, value) in &self.entries {
            let value = match value {
                FormValue::Text(text) => Value::String(text.clone()),
                FormValue::File { .. } => Value::Object(Map::new()),
            };
            map.insert(key.clone(), value);
        }
        map
    }
}

/// A canonical payload and its fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub payload: String,
    pub hash: i32,
}

impl Normalized {
    fn from_payload(payload: String) -> Self {
        let hash = content_hash(&payload);
        Self { payload, hash }
    }
}

/// How a response body is decoded, from its declared content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decoding {
    Json,
    Text,
    Latin1,
}

fn decoding_for(content_type: &str) -> Decoding {
    let content_type = content_type.to_ascii_lowercase();
    if content_type.contains("application/json") {
        Decoding::Json
    } else if content_type.contains("text/") || content_type.contains("application/xml") {
        Decoding::Text
    } else if ["image/", "audio/", "video/"].iter().any(|m| content_type.contains(m)) {
        Decoding::Latin1
    } else {
        Decoding::Text
    }
}

/// Map each byte to the char with the same code point.
fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

fn lossy_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Rewrite numbers the way a double-based JSON reader would print them:
/// whole floats lose their fraction (`1.0` -> `1`, `1e2` -> `100`) and
/// negative zero becomes `0`.
fn canonical_numbers(value: Value) -> Value {
    match value {
        Value::Number(n) if n.is_f64() => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < MAX_SAFE_WHOLE => Value::from(f as i64),
            _ => Value::Number(n),
        },
        Value::Array(items) => Value::Array(items.into_iter().map(canonical_numbers).collect()),
        Value::Object(map) => Value::Object(map.into_iter().map(|(k, v)| (k, canonical_numbers(v))).collect()),
        other => other,
    }
}

/// Whole doubles below 2^53 print without exponent or fraction.
const MAX_SAFE_WHOLE: f64 = 9_007_199_254_740_992.0;

fn parse_json(bytes: &[u8]) -> Result<Value, Error> {
    let bytes = bytes.strip_prefix(b"\xef\xbb\xbf".as_slice()).unwrap_or(bytes);
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| Error::Normalize(format!("invalid JSON body: {e}")))?;
    Ok(canonical_numbers(value))
}

fn compact_json(value: &Value) -> Result<String, Error> {
    serde_json::to_string(value).map_err(|e| Error::Normalize(format!("failed to serialize JSON: {e}")))
}

/// Normalize `body` into its canonical payload and hash.
pub fn normalize(body: &Body) -> Result<Normalized, Error> {
    let payload = match body {
        Body::Empty => String::new(),
        Body::Response(response) => match decoding_for(response.content_type()) {
            Decoding::Json => compact_json(&parse_json(&response.body)?)?,
            Decoding::Text => response.text(),
            Decoding::Latin1 => latin1(&response.body),
        },
        Body::Text(text) => text.clone(),
        Body::Binary(bytes) => latin1(bytes),
        Body::Blob(blob) => lossy_text(&blob.bytes),
        Body::Form(form) => compact_json(&Value::Object(form.flatten()))?,
        Body::Json(value) => compact_json(value)?,
        Body::Other(display) => display.to_string(),
    };

    Ok(Normalized::from_payload(payload))
}
