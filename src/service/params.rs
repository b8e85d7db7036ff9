//! Parameter validator: turns a raw request context into a `ValidatedRequest`.
//! Pure: no store access, no side effects.

use crate::config::{FieldDescriptor, FieldType, ResourceDescriptor};
use crate::error::AppError;
use crate::query::{
    Condition, Direction, Operation, Operator, OrderTerm, Pagination, Selection, ValidatedRequest,
};
use crate::request::{is_reserved, parse_bool, Method, ParamValue, RequestContext};
use crate::service::validation::BodyValidator;
use serde_json::{Number, Value};
use std::collections::{HashMap, HashSet};

/// Validate `request` against `descriptor`. With `strict`, parameters that are neither reserved
/// nor filterable are rejected instead of ignored.
pub fn validate_request(
    descriptor: &ResourceDescriptor,
    request: &RequestContext,
    strict: bool,
) -> Result<ValidatedRequest, AppError> {
    let mut validated = ValidatedRequest {
        method: request.method,
        operation: Operation::Delete { id: Value::Null },
        projection: Vec::new(),
        conditions: Vec::new(),
        order: Vec::new(),
    };
    validated.operation = match request.method {
        Method::Read => {
            validated.projection = parse_projection(descriptor, request.param_text("fields").as_deref())?;
            validated.conditions = parse_conditions(descriptor, request, strict)?;
            validated.order = parse_order(descriptor, request.param_text("order").as_deref())?;
            match &request.id {
                Some(id) => Operation::ReadOne { id: coerce_id(descriptor, id)? },
                None => Operation::ReadMany {
                    pagination: parse_pagination(descriptor, request)?,
                },
            }
        }
        Method::Create => Operation::Create {
            values: parse_create(descriptor, request)?,
        },
        Method::Update => Operation::Update {
            id: require_id(descriptor, request)?,
            values: parse_update(descriptor, request)?,
        },
        Method::Delete => Operation::Delete {
            id: require_id(descriptor, request)?,
        },
    };
    Ok(validated)
}

fn require_id(descriptor: &ResourceDescriptor, request: &RequestContext) -> Result<Value, AppError> {
    match &request.id {
        Some(id) => coerce_id(descriptor, id),
        None => Err(AppError::Validation(format!("{} requires an id", request.method))),
    }
}

fn coerce_id(descriptor: &ResourceDescriptor, id: &str) -> Result<Value, AppError> {
    let identity = descriptor.identity();
    coerce_text(id, identity.field_type)
        .map_err(|_| AppError::Validation(format!("invalid id '{}' for {}", id, identity.alias)))
}

/// Split on commas that are not inside parentheses.
fn split_top_level(s: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, ch) in s.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                out.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push(&s[start..]);
    out.into_iter().map(str::trim).filter(|t| !t.is_empty()).collect()
}

/// `fields=name,langs(code,name)`. Absent or empty yields the default projection.
fn parse_projection(descriptor: &ResourceDescriptor, fields: Option<&str>) -> Result<Vec<Selection>, AppError> {
    let tokens = fields.map(split_top_level).unwrap_or_default();
    if tokens.is_empty() {
        return Ok(descriptor
            .default_projection()
            .map(|alias| Selection {
                alias: alias.to_string(),
                sub_fields: None,
            })
            .collect());
    }

    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(tokens.len());
    for token in tokens {
        let (alias, sub_fields) = match token.split_once('(') {
            Some((alias, rest)) => {
                let inner = rest
                    .strip_suffix(')')
                    .ok_or_else(|| AppError::Validation(format!("malformed field selection '{}'", token)))?;
                (alias.trim(), Some(inner.trim().to_string()))
            }
            None => (token, None),
        };
        if !descriptor.readable.contains_key(alias) {
            return Err(AppError::Validation(format!("unknown field '{}'", alias)));
        }
        if sub_fields.is_some() && descriptor.nested(alias).is_none() {
            return Err(AppError::Validation(format!("field '{}' has no sub-fields", alias)));
        }
        if seen.insert(alias.to_string()) {
            out.push(Selection {
                alias: alias.to_string(),
                sub_fields,
            });
        }
    }
    Ok(out)
}

/// Split `name(args)` into its parts when `name` is all letters.
fn operator_call(s: &str) -> Option<(&str, &str)> {
    let (name, rest) = s.split_once('(')?;
    let args = rest.strip_suffix(')')?;
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    Some((name, args))
}

fn parse_conditions(
    descriptor: &ResourceDescriptor,
    request: &RequestContext,
    strict: bool,
) -> Result<Vec<Condition>, AppError> {
    let mut out = Vec::new();
    for (key, raw) in &request.parameters {
        let Some(capability) = descriptor.filterable.get(key) else {
            if is_reserved(key) {
                continue;
            }
            if strict {
                return Err(AppError::Validation(format!("unknown parameter '{}'", key)));
            }
            tracing::debug!(resource = %descriptor.name, parameter = %key, "ignoring unknown parameter");
            continue;
        };
        let field = descriptor
            .field_for_alias(key)
            .ok_or_else(|| AppError::Validation(format!("'{}' is not a field", key)))?;
        let condition = parse_condition(field, raw)?;
        if !capability.allows(condition.operator) {
            return Err(AppError::Validation(format!(
                "operator '{}' not allowed on '{}'",
                condition.operator, key
            )));
        }
        out.push(condition);
    }
    Ok(out)
}

fn parse_condition(field: &FieldDescriptor, raw: &ParamValue) -> Result<Condition, AppError> {
    let invalid = |v: &str| AppError::Validation(format!("invalid value '{}' for {}", v, field.alias));
    let (operator, values) = match raw {
        ParamValue::List(items) => {
            let values = items
                .iter()
                .map(|s| coerce_text(s, field.field_type).map_err(|_| invalid(s)))
                .collect::<Result<Vec<_>, _>>()?;
            (Operator::In, values)
        }
        ParamValue::Json(Value::Array(items)) => {
            let values = items
                .iter()
                .map(|v| coerce_json(v, field.field_type).map_err(|_| invalid(&v.to_string())))
                .collect::<Result<Vec<_>, _>>()?;
            (Operator::In, values)
        }
        // JSON values (bodies, injected row values) are literals.
        ParamValue::Json(v) => {
            let value = coerce_json(v, field.field_type).map_err(|_| invalid(&v.to_string()))?;
            (Operator::Eq, vec![value])
        }
        ParamValue::Text(s) => parse_operator_text(field, s)?,
    };
    if values.is_empty() {
        return Err(AppError::Validation(format!("no value given for {}", field.alias)));
    }
    Ok(Condition {
        alias: field.alias.clone(),
        column: field.column.clone(),
        operator,
        values,
        field_type: field.field_type,
    })
}

/// `opName(arg[,arg...])` or a bare literal meaning `eq`.
fn parse_operator_text(field: &FieldDescriptor, s: &str) -> Result<(Operator, Vec<Value>), AppError> {
    let invalid = |v: &str| AppError::Validation(format!("invalid value '{}' for {}", v, field.alias));
    let Some((name, args)) = operator_call(s) else {
        return Ok((Operator::Eq, vec![coerce_text(s, field.field_type).map_err(|_| invalid(s))?]));
    };
    let operator: Operator = name.to_ascii_lowercase().parse().map_err(AppError::Validation)?;

    let values = match operator {
        Operator::Like => vec![Value::String(args.to_string())],
        Operator::In => args
            .split(',')
            .map(|a| coerce_arg(a, field.field_type).map_err(|_| invalid(a)))
            .collect::<Result<Vec<_>, _>>()?,
        _ => vec![coerce_arg(args, field.field_type).map_err(|_| invalid(args))?],
    };
    Ok((operator, values))
}

fn coerce_arg(arg: &str, field_type: FieldType) -> Result<Value, String> {
    match field_type {
        FieldType::String => coerce_text(arg, field_type),
        _ => coerce_text(arg.trim(), field_type),
    }
}

/// `order=-rank,name`.
fn parse_order(descriptor: &ResourceDescriptor, order: Option<&str>) -> Result<Vec<OrderTerm>, AppError> {
    let Some(order) = order else { return Ok(Vec::new()) };
    let mut out = Vec::new();
    for term in order.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let (alias, direction) = match term.strip_prefix('-') {
            Some(alias) => (alias, Direction::Desc),
            None => (term.strip_prefix('+').unwrap_or(term), Direction::Asc),
        };
        if !descriptor.orderable.contains(alias) {
            return Err(AppError::Validation(format!("cannot order by '{}'", alias)));
        }
        out.push(OrderTerm {
            alias: alias.to_string(),
            direction,
        });
    }
    Ok(out)
}

fn parse_pagination(descriptor: &ResourceDescriptor, request: &RequestContext) -> Result<Pagination, AppError> {
    let number = |key: &str| -> Result<Option<i64>, AppError> {
        match request.param_text(key) {
            None => Ok(None),
            Some(s) => {
                let n: i64 = s
                    .trim()
                    .parse()
                    .map_err(|_| AppError::Validation(format!("{} must be an integer", key)))?;
                if n < 0 {
                    return Err(AppError::Validation(format!("{} must not be negative", key)));
                }
                Ok(Some(n))
            }
        }
    };
    let limit = match number("limit")? {
        None => descriptor.default_limit,
        Some(n) => n.clamp(1, descriptor.max_limit as i64) as u32,
    };
    let offset = number("offset")?.unwrap_or(0).min(u32::MAX as i64) as u32;
    Ok(Pagination { limit, offset })
}

/// Body entries: every non-reserved parameter, keyed by alias.
fn body_entries(request: &RequestContext) -> Vec<(&str, &ParamValue)> {
    request
        .parameters
        .iter()
        .filter(|(k, _)| !is_reserved(k))
        .map(|(k, v)| (k.as_str(), v))
        .collect()
}

fn coerce_body_value(field: &FieldDescriptor, raw: &ParamValue) -> Result<Value, AppError> {
    let invalid = || AppError::Validation(format!("invalid value for {}", field.alias));
    match raw {
        ParamValue::Text(s) => coerce_text(s, field.field_type).map_err(|_| invalid()),
        ParamValue::Json(v) => coerce_json(v, field.field_type).map_err(|_| invalid()),
        ParamValue::List(items) if field.field_type == FieldType::Json => {
            Ok(Value::Array(items.iter().cloned().map(Value::String).collect()))
        }
        ParamValue::List(_) => Err(invalid()),
    }
}

fn parse_create(descriptor: &ResourceDescriptor, request: &RequestContext) -> Result<Vec<(String, Value)>, AppError> {
    let mut coerced: HashMap<&str, Value> = HashMap::new();
    for (alias, raw) in body_entries(request) {
        if !descriptor.creatable.contains_key(alias) {
            return Err(AppError::Validation(format!("'{}' cannot be set on create", alias)));
        }
        let field = descriptor
            .field_for_alias(alias)
            .ok_or_else(|| AppError::Validation(format!("'{}' is not a field", alias)))?;
        coerced.insert(alias, coerce_body_value(field, raw)?);
    }
    let view: HashMap<&str, &Value> = coerced.iter().map(|(k, v)| (*k, v)).collect();
    BodyValidator::validate(&view, &descriptor.creatable, &descriptor.create_order)?;

    Ok(descriptor
        .create_order
        .iter()
        .filter_map(|alias| coerced.remove(alias.as_str()).map(|v| (alias.clone(), v)))
        .collect())
}

fn parse_update(descriptor: &ResourceDescriptor, request: &RequestContext) -> Result<Vec<(String, Value)>, AppError> {
    let identity = &descriptor.identity().alias;
    let mut values = Vec::new();
    for (alias, raw) in body_entries(request) {
        if alias == identity {
            return Err(AppError::Validation(format!("identity '{}' cannot be updated", alias)));
        }
        if !descriptor.updatable.contains_key(alias) {
            return Err(AppError::Validation(format!("'{}' cannot be updated", alias)));
        }
        let field = descriptor
            .field_for_alias(alias)
            .ok_or_else(|| AppError::Validation(format!("'{}' is not a field", alias)))?;
        values.push((alias.to_string(), coerce_body_value(field, raw)?));
    }
    if values.is_empty() {
        return Err(AppError::Validation("update body is empty".into()));
    }
    let view: HashMap<&str, &Value> = values.iter().map(|(k, v)| (k.as_str(), v)).collect();
    BodyValidator::validate_partial(&view, &descriptor.updatable)?;
    Ok(values)
}

/// Coerce client text to a field type.
pub fn coerce_text(s: &str, field_type: FieldType) -> Result<Value, String> {
    let fail = || format!("'{}' is not a valid {:?}", s, field_type);
    Ok(match field_type {
        FieldType::String => Value::String(s.to_string()),
        FieldType::Int => Value::from(s.parse::<i64>().map_err(|_| fail())?),
        FieldType::Float => {
            let f: f64 = s.parse().map_err(|_| fail())?;
            Value::Number(Number::from_f64(f).ok_or_else(fail)?)
        }
        FieldType::Bool => Value::Bool(parse_bool(s).ok_or_else(fail)?),
        FieldType::Date => {
            let d = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| fail())?;
            Value::String(d.format("%Y-%m-%d").to_string())
        }
        FieldType::DateTime => {
            let dt = chrono::DateTime::parse_from_rfc3339(s)
                .map(|d| d.with_timezone(&chrono::Utc))
                .or_else(|_| {
                    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|n| n.and_utc())
                })
                .map_err(|_| fail())?;
            Value::String(dt.to_rfc3339())
        }
        FieldType::Uuid => Value::String(uuid::Uuid::parse_str(s).map_err(|_| fail())?.to_string()),
        FieldType::Json => serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.to_string())),
    })
}

/// Coerce a JSON value to a field type. Null passes through.
pub fn coerce_json(v: &Value, field_type: FieldType) -> Result<Value, String> {
    match (v, field_type) {
        (Value::Null, _) | (_, FieldType::Json) => Ok(v.clone()),
        (Value::String(s), _) => coerce_text(s, field_type),
        (Value::Number(n), FieldType::Int) => n
            .as_i64()
            .map(Value::from)
            .ok_or_else(|| format!("{} is not an integer", n)),
        (Value::Number(_), FieldType::Float) => Ok(v.clone()),
        (Value::Number(n), FieldType::String) => Ok(Value::String(n.to_string())),
        (Value::Bool(_), FieldType::Bool) => Ok(v.clone()),
        (Value::Bool(b), FieldType::String) => Ok(Value::String(b.to_string())),
        (other, t) => Err(format!("{} is not a valid {:?}", other, t)),
    }
}
