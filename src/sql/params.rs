//! Convert serde_json::Value to types that sqlx can bind.

use crate::config::FieldType;
use serde_json::Value;
use sqlx::encode::{Encode, IsNull};
use sqlx::postgres::{PgTypeInfo, Postgres};
use sqlx::Database;

/// A value that can be bound to a PostgreSQL query, typed by the field it is compared to or
/// written into.
#[derive(Clone, Debug, PartialEq)]
pub enum PgBindValue {
    Null(FieldType),
    Bool(bool),
    I64(i64),
    F64(f64),
    String(String),
    Uuid(uuid::Uuid),
    Json(Value),
}

impl PgBindValue {
    pub fn from_json(v: &Value, field_type: FieldType) -> Self {
        if field_type == FieldType::Json && !v.is_null() {
            return PgBindValue::Json(v.clone());
        }
        match v {
            Value::Null => PgBindValue::Null(field_type),
            Value::Bool(b) => PgBindValue::Bool(*b),
            Value::Number(n) => match (field_type, n.as_i64()) {
                (FieldType::Float, _) | (_, None) => PgBindValue::F64(n.as_f64().unwrap_or(0.0)),
                (_, Some(i)) => PgBindValue::I64(i),
            },
            Value::String(s) if field_type == FieldType::Uuid => match uuid::Uuid::parse_str(s) {
                Ok(u) => PgBindValue::Uuid(u),
                Err(_) => PgBindValue::String(s.clone()),
            },
            Value::String(s) => PgBindValue::String(s.clone()),
            Value::Array(_) | Value::Object(_) => PgBindValue::Json(v.clone()),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            PgBindValue::Null(t) => match t {
                FieldType::Int => "INT8",
                FieldType::Float => "FLOAT8",
                FieldType::Bool => "BOOL",
                FieldType::Uuid => "UUID",
                FieldType::Json => "JSONB",
                _ => "TEXT",
            },
            PgBindValue::Bool(_) => "BOOL",
            PgBindValue::I64(_) => "INT8",
            PgBindValue::F64(_) => "FLOAT8",
            PgBindValue::String(_) => "TEXT",
            PgBindValue::Uuid(_) => "UUID",
            PgBindValue::Json(_) => "JSONB",
        }
    }
}

impl<'q> Encode<'q, Postgres> for PgBindValue {
    fn encode_by_ref(
        &self,
        buf: &mut <Postgres as Database>::ArgumentBuffer<'q>,
    ) -> Result<IsNull, Box<dyn std::error::Error + Send + Sync>> {
        Ok(match self {
            PgBindValue::Null(_) => IsNull::Yes,
            PgBindValue::Bool(b) => <bool as Encode<Postgres>>::encode_by_ref(b, buf)?,
            PgBindValue::I64(n) => <i64 as Encode<Postgres>>::encode_by_ref(n, buf)?,
            PgBindValue::F64(n) => <f64 as Encode<Postgres>>::encode_by_ref(n, buf)?,
            PgBindValue::String(s) => {
                let s_ref: &str = s.as_str();
                <&str as Encode<Postgres>>::encode_by_ref(&s_ref, buf)?
            }
            PgBindValue::Uuid(u) => <uuid::Uuid as Encode<Postgres>>::encode_by_ref(u, buf)?,
            PgBindValue::Json(v) => <serde_json::Value as Encode<Postgres>>::encode_by_ref(v, buf)?,
        })
    }

    fn produces(&self) -> Option<PgTypeInfo> {
        Some(PgTypeInfo::with_name(self.type_name()))
    }
}

impl sqlx::Type<Postgres> for PgBindValue {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("TEXT")
    }
}
