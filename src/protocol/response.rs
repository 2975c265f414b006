//! Response envelope and the "render this and stop" signal.
//!
//! Every outcome the gateway produces, business success, business failure
//! or guard rejection, is the same envelope:
//!
//! ```text
//! {"code": <int>, "msg": <string>, "time": <unix seconds>, "data": <any>}
//! ```
//!
//! Building one through [`Responder`] yields a [`Halt`]. Hooks and actions
//! return [`Flow`] and propagate a `Halt` with `?`, so the first response
//! produced wins and nothing after it runs. Only the outermost handler
//! turns the `Halt` back into a [`Response`].

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::error;

use crate::guard::Clock;

/// Default success code.
pub const CODE_SUCCESS: i64 = 1;

/// Default error code.
pub const CODE_ERROR: i64 = 0;

/// The uniform payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub code: i64,
    pub msg: String,
    pub time: u64,
    pub data: Value,
}

/// Output encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    #[default]
    Json,
    Jsonp,
    Xml,
}

impl ResponseType {
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Json => "application/json; charset=utf-8",
            Self::Jsonp => "application/javascript; charset=utf-8",
            Self::Xml => "text/xml; charset=utf-8",
        }
    }
}

impl FromStr for ResponseType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "jsonp" => Ok(Self::Jsonp),
            "xml" => Ok(Self::Xml),
            other => Err(format!("unknown response type '{}'", other)),
        }
    }
}

/// A fully rendered response, ready for the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// HTTP-style status.
    pub status: u16,

    pub content_type: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    pub body: String,
}

impl Response {
    /// A 200 response with no body, used when an action finishes without
    /// producing an envelope.
    pub fn empty(response_type: ResponseType) -> Self {
        Self {
            status: 200,
            content_type: response_type.content_type().to_string(),
            headers: BTreeMap::new(),
            body: String::new(),
        }
    }

    /// Decode a JSON body back into an envelope.
    pub fn envelope(&self) -> Option<Envelope> {
        serde_json::from_str(&self.body).ok()
    }
}

/// Signal to stop processing and emit the carried response.
#[must_use = "a Halt must be returned so the response reaches the client"]
#[derive(Debug, Clone, PartialEq)]
pub struct Halt(Response);

impl Halt {
    pub fn new(response: Response) -> Self {
        Self(response)
    }

    pub fn response(&self) -> &Response {
        &self.0
    }

    pub fn into_response(self) -> Response {
        self.0
    }
}

/// Result type threaded through hooks and actions.
pub type Flow = Result<(), Halt>;

/// Per-call overrides for [`Responder::result`].
#[derive(Debug, Clone, Default)]
pub struct ResultOptions {
    /// Encoding for this response only.
    pub response_type: Option<ResponseType>,

    /// Explicit status; wins over the status derived from the code.
    pub status: Option<u16>,

    /// Extra headers.
    pub headers: BTreeMap<String, String>,
}

/// Status derived from an envelope code: codes in `[200, 1000)` are used
/// as-is, anything else maps to 200.
pub fn status_for_code(code: i64) -> u16 {
    if (200..1000).contains(&code) {
        code as u16
    } else {
        200
    }
}

/// Builds envelopes for one request.
pub struct Responder {
    response_type: ResponseType,
    jsonp_callback: String,
    clock: Arc<dyn Clock>,
}

impl Responder {
    pub fn new(
        response_type: ResponseType,
        jsonp_callback: impl Into<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            response_type,
            jsonp_callback: jsonp_callback.into(),
            clock,
        }
    }

    /// Negotiated encoding for this request.
    pub fn response_type(&self) -> ResponseType {
        self.response_type
    }

    /// Success envelope with code 1.
    pub fn success(&self, msg: impl Into<String>, data: Option<Value>) -> Halt {
        self.result(msg, data, CODE_SUCCESS, ResultOptions::default())
    }

    /// Error envelope with code 0.
    pub fn error(&self, msg: impl Into<String>, data: Option<Value>) -> Halt {
        self.result(msg, data, CODE_ERROR, ResultOptions::default())
    }

    /// Error envelope with an explicit code.
    pub fn error_with_code(&self, msg: impl Into<String>, data: Option<Value>, code: i64) -> Halt {
        self.result(msg, data, code, ResultOptions::default())
    }

    pub fn envelope(&self, msg: impl Into<String>, data: Option<Value>, code: i64) -> Envelope {
        Envelope {
            code,
            msg: msg.into(),
            time: self.clock.now_secs(),
            data: data.unwrap_or(Value::Null),
        }
    }

    /// Build the envelope, render it and wrap it in a [`Halt`].
    pub fn result(
        &self,
        msg: impl Into<String>,
        data: Option<Value>,
        code: i64,
        options: ResultOptions,
    ) -> Halt {
        let envelope = self.envelope(msg, data, code);
        let response_type = options.response_type.unwrap_or(self.response_type);

        Halt(Response {
            status: options.status.unwrap_or_else(|| status_for_code(code)),
            content_type: response_type.content_type().to_string(),
            headers: options.headers,
            body: render(&envelope, response_type, &self.jsonp_callback),
        })
    }

    /// Response for an action that finished without halting.
    pub fn empty(&self) -> Response {
        Response::empty(self.response_type)
    }
}

fn render(envelope: &Envelope, response_type: ResponseType, callback: &str) -> String {
    match response_type {
        ResponseType::Json => render_json(envelope),
        ResponseType::Jsonp => format!("{}({});", callback, render_json(envelope)),
        ResponseType::Xml => render_xml(envelope),
    }
}

fn render_json(envelope: &Envelope) -> String {
    serde_json::to_string(envelope).unwrap_or_else(|e| {
        error!(error = %e, code = envelope.code, "Failed to serialize response envelope");
        format!(
            r#"{{"code":{},"msg":"Internal server error","time":{},"data":null}}"#,
            CODE_ERROR, envelope.time
        )
    })
}

fn render_xml(envelope: &Envelope) -> String {
    let mut out = String::from(r#"<?xml version="1.0" encoding="utf-8"?><think>"#);
    let _ = write!(out, "<code>{}</code>", envelope.code);
    let _ = write!(out, "<msg>{}</msg>", escape_xml(&envelope.msg));
    let _ = write!(out, "<time>{}</time>", envelope.time);
    out.push_str("<data>");
    write_xml_value(&mut out, &envelope.data);
    out.push_str("</data></think>");
    out
}

fn write_xml_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => {}
        Value::Bool(true) => out.push('1'),
        Value::Bool(false) => {}
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => out.push_str(&escape_xml(s)),
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                let _ = write!(out, r#"<item id="{}">"#, index);
                write_xml_value(out, item);
                out.push_str("</item>");
            }
        }
        Value::Object(map) => {
            for (key, item) in map {
                if key.starts_with(|c: char| c.is_ascii_digit()) {
                    let _ = write!(out, r#"<item id="{}">"#, escape_xml(key));
                    write_xml_value(out, item);
                    out.push_str("</item>");
                } else if is_xml_name(key) {
                    let _ = write!(out, "<{}>", key);
                    write_xml_value(out, item);
                    let _ = write!(out, "</{}>", key);
                } else {
                    let _ = write!(out, r#"<item key="{}">"#, escape_xml(key));
                    write_xml_value(out, item);
                    out.push_str("</item>");
                }
            }
        }
    }
}

/// Conservative XML element name check: ASCII letter or `_`, then
/// letters, digits, `_`, `-` or `.`.
fn is_xml_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

fn escape_xml(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// JSONP callbacks are restricted to identifier-like names.
pub fn is_valid_jsonp_callback(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 128
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '$'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::ManualClock;
    use serde_json::json;

    fn responder(response_type: ResponseType) -> Responder {
        Responder::new(
            response_type,
            "jsonpReturn",
            Arc::new(ManualClock::new(1_700_000_000)),
        )
    }

    #[test]
    fn test_success_envelope() {
        let halt = responder(ResponseType::Json).success("ok", Some(json!({"id": 7})));
        let response = halt.into_response();

        assert_eq!(response.status, 200);
        assert_eq!(
            response.envelope().unwrap(),
            Envelope {
                code: 1,
                msg: "ok".to_string(),
                time: 1_700_000_000,
                data: json!({"id": 7}),
            }
        );
    }

    #[test]
    fn test_error_envelope_has_null_data() {
        let response = responder(ResponseType::Json)
            .error("nope", None)
            .into_response();

        assert_eq!(
            response.body,
            r#"{"code":0,"msg":"nope","time":1700000000,"data":null}"#
        );
    }

    #[test]
    fn test_status_derivation() {
        assert_eq!(status_for_code(0), 200);
        assert_eq!(status_for_code(1), 200);
        assert_eq!(status_for_code(199), 200);
        assert_eq!(status_for_code(200), 200);
        assert_eq!(status_for_code(401), 401);
        assert_eq!(status_for_code(555), 555);
        assert_eq!(status_for_code(999), 999);
        assert_eq!(status_for_code(1000), 200);
        assert_eq!(status_for_code(-1), 200);
    }

    #[test]
    fn test_explicit_status_wins() {
        let options = ResultOptions {
            status: Some(418),
            headers: BTreeMap::from([("X-Trace".to_string(), "abc".to_string())]),
            ..ResultOptions::default()
        };
        let response = responder(ResponseType::Json)
            .result("teapot", None, 0, options)
            .into_response();

        assert_eq!(response.status, 418);
        assert_eq!(response.headers.get("X-Trace").map(String::as_str), Some("abc"));
    }

    #[test]
    fn test_jsonp_rendering() {
        let response = responder(ResponseType::Jsonp)
            .success("ok", None)
            .into_response();

        assert!(response.body.starts_with("jsonpReturn({\"code\":1"));
        assert!(response.body.ends_with(");"));
        assert!(response.content_type.starts_with("application/javascript"));
    }

    #[test]
    fn test_xml_rendering() {
        let response = responder(ResponseType::Xml)
            .success("a<b", Some(json!({"list": ["x", "y"], "flag": true})))
            .into_response();

        assert_eq!(
            response.body,
            concat!(
                r#"<?xml version="1.0" encoding="utf-8"?><think>"#,
                "<code>1</code><msg>a&lt;b</msg><time>1700000000</time>",
                r#"<data><flag>1</flag><list><item id="0">x</item><item id="1">y</item></list></data>"#,
                "</think>"
            )
        );
    }

    #[test]
    fn test_xml_keys_that_are_not_element_names() {
        let response = responder(ResponseType::Xml)
            .success("", Some(json!({"a b": "1", "x><y": "2", "ok_key": "3", "7up": "4"})))
            .into_response();

        assert!(response.body.contains(r#"<item key="a b">1</item>"#));
        assert!(response.body.contains(r#"<item key="x&gt;&lt;y">2</item>"#));
        assert!(response.body.contains("<ok_key>3</ok_key>"));
        assert!(response.body.contains(r#"<item id="7up">4</item>"#));
        assert!(!response.body.contains("<x>"));
    }

    #[test]
    fn test_xml_name_check() {
        assert!(is_xml_name("data"));
        assert!(is_xml_name("_private.v2-x"));
        assert!(!is_xml_name(""));
        assert!(!is_xml_name("a b"));
        assert!(!is_xml_name("-lead"));
        assert!(!is_xml_name("x><y"));
    }

    #[test]
    fn test_per_call_type_override() {
        let options = ResultOptions {
            response_type: Some(ResponseType::Xml),
            ..ResultOptions::default()
        };
        let response = responder(ResponseType::Json)
            .result("ok", None, 1, options)
            .into_response();

        assert!(response.content_type.starts_with("text/xml"));
    }

    #[test]
    fn test_jsonp_callback_validation() {
        assert!(is_valid_jsonp_callback("jQuery123_456"));
        assert!(is_valid_jsonp_callback("app.handlers.done"));
        assert!(!is_valid_jsonp_callback(""));
        assert!(!is_valid_jsonp_callback("alert(1)//"));
    }

    #[test]
    fn test_response_type_from_str() {
        assert_eq!("JSON".parse::<ResponseType>().unwrap(), ResponseType::Json);
        assert_eq!("xml".parse::<ResponseType>().unwrap(), ResponseType::Xml);
        assert!("yaml".parse::<ResponseType>().is_err());
    }
}
