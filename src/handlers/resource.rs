//! Resource handlers: decode path, verb, query and body into a request context and hand it to
//! the engine. No resource logic lives here.

use crate::error::AppError;
use crate::extractors::Credentials;
use crate::request::{parameters_from_pairs, suppress_requested, ParamValue, Parameters, RequestContext};
use crate::response::ResultObject;
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::Method as HttpMethod,
};
use serde_json::Value;

/// Merge a JSON object body over the query parameters. An empty body adds nothing.
fn merge_body(mut params: Parameters, body: &[u8]) -> Result<Parameters, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(params);
    }
    let value: Value =
        serde_json::from_slice(body).map_err(|e| AppError::Validation(format!("invalid JSON body: {}", e)))?;
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                params.insert(k, ParamValue::Json(v));
            }
            Ok(params)
        }
        _ => Err(AppError::Validation("body must be a JSON object".into())),
    }
}

/// A trailing segment names a function when the resource declares one by that name; anything
/// else, numeric segments included, is a record id.
async fn classify_segment(state: &AppState, resource: &str, segment: String) -> (Option<String>, Option<String>) {
    if segment.chars().all(|c| c.is_ascii_digit()) {
        return (Some(segment), None);
    }
    match state.engine.registry().describe(resource).await {
        Ok(described) if described.descriptor.functions.contains(&segment) => (None, Some(segment)),
        _ => (Some(segment), None),
    }
}

async fn respond(
    state: &AppState,
    verb: &HttpMethod,
    resource: String,
    (id, function): (Option<String>, Option<String>),
    query: Vec<(String, String)>,
    credentials: Credentials,
    body: &[u8],
) -> ResultObject {
    let mut params = parameters_from_pairs(query);
    if *verb != HttpMethod::GET {
        let suppress = suppress_requested(&params);
        params = match merge_body(params, body) {
            Ok(p) => p,
            Err(e) => return ResultObject::from_error(&e).suppressed(suppress),
        };
    }
    let suppress = suppress_requested(&params);
    let forced = state.engine.options().enable_forced_method;
    let mut ctx = match RequestContext::decode(verb.as_str(), resource, params, forced) {
        Ok(ctx) => ctx,
        Err(e) => return ResultObject::from_error(&e).suppressed(suppress),
    };
    ctx.id = id;
    ctx.function = function;
    ctx.credentials = credentials.0;
    tracing::debug!(resource = %ctx.resource, method = %ctx.method, id = ?ctx.id, function = ?ctx.function, "request");
    state.engine.handle(ctx).await
}

/// Any verb on `/:resource`.
pub async fn collection(
    State(state): State<AppState>,
    verb: HttpMethod,
    Path(resource): Path<String>,
    Query(query): Query<Vec<(String, String)>>,
    credentials: Credentials,
    body: Bytes,
) -> ResultObject {
    respond(&state, &verb, resource, (None, None), query, credentials, &body).await
}

/// Any verb on `/:resource/:segment`, where the segment is an id or a function name.
pub async fn member(
    State(state): State<AppState>,
    verb: HttpMethod,
    Path((resource, segment)): Path<(String, String)>,
    Query(query): Query<Vec<(String, String)>>,
    credentials: Credentials,
    body: Bytes,
) -> ResultObject {
    let target = classify_segment(&state, &resource, segment).await;
    respond(&state, &verb, resource, target, query, credentials, &body).await
}

/// Any verb on `/:resource/:id/:function`.
pub async fn member_function(
    State(state): State<AppState>,
    verb: HttpMethod,
    Path((resource, id, function)): Path<(String, String, String)>,
    Query(query): Query<Vec<(String, String)>>,
    credentials: Credentials,
    body: Bytes,
) -> ResultObject {
    respond(&state, &verb, resource, (Some(id), Some(function)), query, credentials, &body).await
}
