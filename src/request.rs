//! Request context handed to the engine by the transport layer. No ambient state: everything
//! the engine knows about a call is in here.

use crate::error::AppError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Parameter keys with engine-level meaning; never treated as conditions or body fields.
pub const RESERVED_KEYS: &[&str] = &[
    "fields",
    "order",
    "limit",
    "offset",
    "method",
    "suppress_http_status_codes",
];

pub fn is_reserved(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Read,
    Create,
    Update,
    Delete,
}

impl Method {
    /// Map an HTTP verb to a method.
    pub fn from_http(verb: &str) -> Option<Method> {
        match verb.to_ascii_uppercase().as_str() {
            "GET" => Some(Method::Read),
            "POST" => Some(Method::Create),
            "PUT" | "PATCH" => Some(Method::Update),
            "DELETE" => Some(Method::Delete),
            _ => None,
        }
    }

    /// Map an override value (`method=PUT`, `method=update`, ...) to a method.
    pub fn from_override(value: &str) -> Option<Method> {
        Method::from_http(value).or_else(|| match value.to_ascii_lowercase().as_str() {
            "read" => Some(Method::Read),
            "create" => Some(Method::Create),
            "update" => Some(Method::Update),
            _ => None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Read => "read",
            Method::Create => "create",
            Method::Update => "update",
            Method::Delete => "delete",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A raw parameter value: query-string text, a repeated key, or a JSON body value.
#[derive(Clone, Debug, PartialEq)]
pub enum ParamValue {
    Text(String),
    List(Vec<String>),
    Json(Value),
}

impl ParamValue {
    /// Text form for scalar-only keys (`fields`, `limit`, ...). Lists yield their last entry.
    pub fn as_text(&self) -> Option<String> {
        match self {
            ParamValue::Text(s) => Some(s.clone()),
            ParamValue::List(v) => v.last().cloned(),
            ParamValue::Json(Value::String(s)) => Some(s.clone()),
            ParamValue::Json(Value::Number(n)) => Some(n.to_string()),
            ParamValue::Json(Value::Bool(b)) => Some(b.to_string()),
            ParamValue::Json(_) => None,
        }
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::Text(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::Text(s)
    }
}

impl From<Value> for ParamValue {
    fn from(v: Value) -> Self {
        ParamValue::Json(v)
    }
}

pub type Parameters = BTreeMap<String, ParamValue>;

/// Fold `(key, value)` pairs into parameters; a key seen more than once becomes a list.
pub fn parameters_from_pairs<I>(pairs: I) -> Parameters
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut out = Parameters::new();
    for (k, v) in pairs {
        match out.remove(&k) {
            None => {
                out.insert(k, ParamValue::Text(v));
            }
            Some(ParamValue::Text(prev)) => {
                out.insert(k, ParamValue::List(vec![prev, v]));
            }
            Some(ParamValue::List(mut prev)) => {
                prev.push(v);
                out.insert(k, ParamValue::List(prev));
            }
            Some(ParamValue::Json(_)) => {
                out.insert(k, ParamValue::Text(v));
            }
        }
    }
    out
}

/// Whether `suppress_http_status_codes` is set to a true value.
pub fn suppress_requested(parameters: &Parameters) -> bool {
    parameters
        .get("suppress_http_status_codes")
        .and_then(ParamValue::as_text)
        .and_then(|flag| parse_bool(&flag))
        .unwrap_or(false)
}

pub fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RequestContext {
    pub method: Method,
    pub resource: String,
    pub id: Option<String>,
    pub function: Option<String>,
    pub parameters: Parameters,
    /// Bearer token or other opaque credential, checked by the authorizer.
    pub credentials: Option<String>,
    /// Report 200 at the transport level while the body keeps the real status.
    pub suppress_status_codes: bool,
}

impl RequestContext {
    pub fn new(method: Method, resource: impl Into<String>) -> Self {
        RequestContext {
            method,
            resource: resource.into(),
            id: None,
            function: None,
            parameters: Parameters::new(),
            credentials: None,
            suppress_status_codes: false,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_function(mut self, name: impl Into<String>) -> Self {
        self.function = Some(name.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters.extend(parameters);
        self
    }

    pub fn with_credentials(mut self, credentials: impl Into<String>) -> Self {
        self.credentials = Some(credentials.into());
        self
    }

    pub fn param_text(&self, key: &str) -> Option<String> {
        self.parameters.get(key).and_then(ParamValue::as_text)
    }

    /// Build a context from a transport verb, honoring the `method` override (POST only, when
    /// enabled) and the `suppress_http_status_codes` flag.
    pub fn decode(
        verb: &str,
        resource: impl Into<String>,
        parameters: Parameters,
        enable_forced_method: bool,
    ) -> Result<Self, AppError> {
        let transport = Method::from_http(verb).ok_or_else(|| AppError::Validation(format!("unsupported method '{}'", verb)))?;
        let mut ctx = RequestContext::new(transport, resource).with_parameters(parameters);

        if transport == Method::Create && enable_forced_method {
            if let Some(forced) = ctx.param_text("method") {
                ctx.method = Method::from_override(&forced)
                    .ok_or_else(|| AppError::Validation(format!("invalid method override '{}'", forced)))?;
            }
        }
        ctx.suppress_status_codes = suppress_requested(&ctx.parameters);
        Ok(ctx)
    }
}
