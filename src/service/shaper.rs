//! Result shaper: maps stored rows back to client aliases and prepares nested reads.

use crate::config::{InjectedValue, NestedRead, ReadKind, ResourceDescriptor};
use crate::query::Selection;
use crate::request::{Method, ParamValue, RequestContext};
use crate::store::Row;
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Meta {
    pub count: u64,
    pub offset: u32,
    pub limit: u32,
}

/// What a successful request produced, before it is put in the output envelope.
#[derive(Clone, Debug, PartialEq)]
pub struct Outcome {
    pub status: u16,
    pub response: Option<Value>,
    pub meta: Option<Meta>,
}

impl Outcome {
    pub fn ok(response: Value) -> Self {
        Outcome {
            status: 200,
            response: Some(response),
            meta: None,
        }
    }

    pub fn status_only(status: u16) -> Self {
        Outcome {
            status,
            response: None,
            meta: None,
        }
    }
}

/// Value of `alias` in a stored row, or null when the row lacks it.
pub fn value_at<'r>(descriptor: &ResourceDescriptor, row: &'r Row, alias: &str) -> &'r Value {
    descriptor
        .field_for_alias(alias)
        .and_then(|f| row.get(&f.column))
        .unwrap_or(&Value::Null)
}

/// Plain field selections of `projection`, keyed by alias. Nested reads are filled in by the caller.
pub fn project_fields(descriptor: &ResourceDescriptor, row: &Row, projection: &[Selection]) -> Map<String, Value> {
    let mut out = Map::new();
    for selection in projection {
        if let Some(ReadKind::Field) = descriptor.readable.get(&selection.alias).map(|r| &r.kind) {
            out.insert(selection.alias.clone(), value_at(descriptor, row, &selection.alias).clone());
        }
    }
    out
}

/// Child request for a nested read of one parent row. None when an injected parent value is
/// null: the nested value is then empty without a query.
pub fn nested_request(
    descriptor: &ResourceDescriptor,
    parent: &RequestContext,
    nested: &NestedRead,
    selection: &Selection,
    row: &Row,
) -> Option<RequestContext> {
    let mut child = RequestContext::new(Method::Read, nested.resource.clone());
    child.credentials = parent.credentials.clone();
    for (key, injected) in &nested.parameters {
        let value = match injected {
            InjectedValue::Literal(text) => ParamValue::Text(text.clone()),
            InjectedValue::ColumnRef(alias) => {
                let v = value_at(descriptor, row, alias);
                if v.is_null() {
                    return None;
                }
                ParamValue::Json(v.clone())
            }
        };
        child.parameters.insert(key.clone(), value);
    }
    if let Some(sub) = &selection.sub_fields {
        child.parameters.insert("fields".into(), ParamValue::Text(sub.clone()));
    }
    if let Some(limit) = nested.limit {
        child.parameters.insert("limit".into(), ParamValue::Text(limit.to_string()));
    }
    Some(child)
}

/// Empty nested value: null for a single object, [] for a list.
pub fn empty_nested(multiple: bool) -> Value {
    if multiple {
        Value::Array(Vec::new())
    } else {
        Value::Null
    }
}

/// A nested read always runs as a multi-read; single relations keep the first record.
pub fn collapse_nested(multiple: bool, response: Option<Value>) -> Value {
    match (multiple, response) {
        (true, Some(v @ Value::Array(_))) => v,
        (false, Some(Value::Array(items))) => items.into_iter().next().unwrap_or(Value::Null),
        (_, Some(other)) => other,
        (m, None) => empty_nested(m),
    }
}

/// Create response: the identity plus the creatable values the client supplied.
pub fn created_echo(descriptor: &ResourceDescriptor, id: Value, values: &[(String, Value)]) -> Value {
    let mut out = Map::new();
    out.insert(descriptor.identity().alias.clone(), id);
    for (alias, value) in values {
        out.insert(alias.clone(), value.clone());
    }
    Value::Object(out)
}
