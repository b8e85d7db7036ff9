//! Body constraint checks for create and update.

use crate::config::Constraint;
use crate::error::AppError;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;

pub struct BodyValidator;

impl BodyValidator {
    /// Validate a create body: every required alias present and non-null, then per-field rules.
    /// Explicitly declared constraints are required unless they say otherwise.
    pub fn validate(
        body: &HashMap<&str, &Value>,
        rules: &HashMap<String, Constraint>,
        order: &[String],
    ) -> Result<(), AppError> {
        for alias in order {
            let Some(rule) = rules.get(alias) else { continue };
            let val = body.get(alias.as_str()).copied();
            if rule.required.unwrap_or(true) && val.map(Value::is_null).unwrap_or(true) {
                return Err(AppError::Validation(format!("{} is required", alias)));
            }
            if let Some(v) = val {
                validate_field(alias, v, rule)?;
            }
        }
        Ok(())
    }

    /// Validate only the fields present in body (partial update). Required is not enforced.
    pub fn validate_partial(
        body: &HashMap<&str, &Value>,
        rules: &HashMap<String, Constraint>,
    ) -> Result<(), AppError> {
        for (alias, v) in body {
            if let Some(rule) = rules.get(*alias) {
                validate_field(alias, v, rule)?;
            }
        }
        Ok(())
    }
}

fn validate_field(alias: &str, v: &Value, rule: &Constraint) -> Result<(), AppError> {
    if v.is_null() {
        return Ok(());
    }
    if let Some(format) = &rule.format {
        validate_format(alias, v, format)?;
    }
    if let Some(s) = v.as_str() {
        let len = s.chars().count();
        if let Some(max) = rule.max_length {
            if len > max as usize {
                return Err(AppError::Validation(format!(
                    "{} must be at most {} characters",
                    alias, max
                )));
            }
        }
        if let Some(min) = rule.min_length {
            if len < min as usize {
                return Err(AppError::Validation(format!(
                    "{} must be at least {} characters",
                    alias, min
                )));
            }
        }
        if let Some(pattern) = &rule.pattern {
            let re = Regex::new(pattern).map_err(|_| AppError::Validation(format!("invalid pattern for {}", alias)))?;
            if !re.is_match(s) {
                return Err(AppError::Validation(format!("{} does not match required pattern", alias)));
            }
        }
    }
    if let Some(allowed) = &rule.allowed {
        if !allowed.iter().any(|a| value_eq(v, a)) {
            return Err(AppError::Validation(format!(
                "{} must be one of: {:?}",
                alias,
                allowed.iter().take(5).collect::<Vec<_>>()
            )));
        }
    }
    if let Some(n) = v.as_f64() {
        if let Some(min) = rule.minimum {
            if n < min {
                return Err(AppError::Validation(format!("{} must be at least {}", alias, min)));
            }
        }
        if let Some(max) = rule.maximum {
            if n > max {
                return Err(AppError::Validation(format!("{} must be at most {}", alias, max)));
            }
        }
    }
    Ok(())
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        _ => a == b,
    }
}

fn validate_format(alias: &str, v: &Value, format: &str) -> Result<(), AppError> {
    let Some(s) = v.as_str() else { return Ok(()) };
    match format.to_lowercase().as_str() {
        "email" => {
            if !s.contains('@') || s.len() < 3 {
                return Err(AppError::Validation(format!("{} must be a valid email", alias)));
            }
        }
        "uuid" => {
            if uuid::Uuid::parse_str(s).is_err() {
                return Err(AppError::Validation(format!("{} must be a valid UUID", alias)));
            }
        }
        _ => {}
    }
    Ok(())
}
