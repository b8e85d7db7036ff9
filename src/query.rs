//! Validated request objects: projection, conditions, order and pagination.
//! Nothing in here holds raw client text; every value is already coerced to its field type.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::request::Method;

/// Comparison operators accepted in `opName(arg[,arg...])` condition values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Lt,
    Gte,
    Lte,
    Like,
    In,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Ne => "ne",
            Operator::Gt => "gt",
            Operator::Lt => "lt",
            Operator::Gte => "gte",
            Operator::Lte => "lte",
            Operator::Like => "like",
            Operator::In => "in",
        }
    }

    /// SQL comparison symbol. `In` is rendered separately as a placeholder list.
    pub fn sql_symbol(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "<>",
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Gte => ">=",
            Operator::Lte => "<=",
            Operator::Like => "LIKE",
            Operator::In => "IN",
        }
    }

    /// Whether the operator takes a list of arguments rather than exactly one.
    pub fn takes_list(&self) -> bool {
        matches!(self, Operator::In)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "eq" => Operator::Eq,
            "ne" => Operator::Ne,
            "gt" => Operator::Gt,
            "lt" => Operator::Lt,
            "gte" => Operator::Gte,
            "lte" => Operator::Lte,
            "like" => Operator::Like,
            "in" => Operator::In,
            other => return Err(format!("unknown operator '{}'", other)),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

/// A filter predicate on one field. `values` has exactly one entry unless the operator is `In`.
#[derive(Clone, Debug, PartialEq)]
pub struct Condition {
    pub alias: String,
    pub column: String,
    pub operator: Operator,
    pub values: Vec<Value>,
    pub field_type: crate::config::FieldType,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OrderTerm {
    pub alias: String,
    pub direction: Direction,
}

/// One requested output alias. `sub_fields` carries `a,b` from `alias(a,b)` for nested reads.
#[derive(Clone, Debug, PartialEq)]
pub struct Selection {
    pub alias: String,
    pub sub_fields: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pagination {
    pub limit: u32,
    pub offset: u32,
}

/// What the request does once validated.
#[derive(Clone, Debug, PartialEq)]
pub enum Operation {
    ReadOne { id: Value },
    ReadMany { pagination: Pagination },
    /// Alias/value pairs in declaration order.
    Create { values: Vec<(String, Value)> },
    Update { id: Value, values: Vec<(String, Value)> },
    Delete { id: Value },
}

#[derive(Clone, Debug, PartialEq)]
pub struct ValidatedRequest {
    pub method: Method,
    pub operation: Operation,
    pub projection: Vec<Selection>,
    pub conditions: Vec<Condition>,
    pub order: Vec<OrderTerm>,
}

impl ValidatedRequest {
    pub fn pagination(&self) -> Option<Pagination> {
        match &self.operation {
            Operation::ReadMany { pagination } => Some(*pagination),
            _ => None,
        }
    }
}
