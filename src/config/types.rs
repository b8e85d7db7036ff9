//! Raw resource declarations as written in JSON (or built in code), plus engine options.

use crate::query::Operator;
use crate::request::{parse_bool, Method};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Declared type of a field; drives coercion of client values and SQL casts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[default]
    String,
    Int,
    Float,
    Bool,
    Date,
    #[serde(alias = "timestamp")]
    DateTime,
    Uuid,
    Json,
}

impl FieldType {
    /// Types usable as a resource identity.
    pub fn is_scalar(&self) -> bool {
        !matches!(self, FieldType::Json)
    }

    /// PostgreSQL cast applied to placeholders so text-bound values land in the right type.
    pub fn pg_cast(&self) -> Option<&'static str> {
        match self {
            FieldType::Date => Some("date"),
            FieldType::DateTime => Some("timestamptz"),
            FieldType::Uuid => Some("uuid"),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldConfig {
    pub alias: String,
    pub column: String,
    #[serde(rename = "type", default)]
    pub type_: FieldType,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TableConfig {
    pub name: String,
    pub fields: Vec<FieldConfig>,
}

/// Value handed to a nested resource's parameter: fixed text, or the parent row's value at an alias.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum InjectedValue {
    Literal(String),
    ColumnRef(String),
}

impl InjectedValue {
    pub fn literal(s: impl Into<String>) -> Self {
        InjectedValue::Literal(s.into())
    }

    pub fn value_of(alias: impl Into<String>) -> Self {
        InjectedValue::ColumnRef(alias.into())
    }
}

impl<'de> Deserialize<'de> for InjectedValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let v = serde_json::Value::deserialize(deserializer)?;
        match v {
            serde_json::Value::String(s) => Ok(InjectedValue::Literal(s)),
            serde_json::Value::Number(n) => Ok(InjectedValue::Literal(n.to_string())),
            serde_json::Value::Bool(b) => Ok(InjectedValue::Literal(b.to_string())),
            serde_json::Value::Object(mut obj) => match obj.remove("value_of") {
                Some(serde_json::Value::String(alias)) => Ok(InjectedValue::ColumnRef(alias)),
                _ => Err(serde::de::Error::custom(format!(
                    "injected value object must be {{ \"value_of\": \"<alias>\" }}; got keys: {:?}",
                    obj.keys().collect::<Vec<_>>()
                ))),
            },
            other => Err(serde::de::Error::custom(format!(
                "injected value must be a literal or {{ \"value_of\": \"<alias>\" }}; got {}",
                other
            ))),
        }
    }
}

/// A readable alias: a plain field, or a nested read of another resource when `resource` is set.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReadConfig {
    pub alias: String,
    /// Included when the client does not ask for specific fields.
    #[serde(default = "default_true")]
    pub default: bool,
    #[serde(default)]
    pub resource: Option<String>,
    /// Parameters passed to the nested resource, keyed by its aliases.
    #[serde(default)]
    pub parameters: BTreeMap<String, InjectedValue>,
    /// Nested read yields a list (true) or a single object (false).
    #[serde(default)]
    pub multiple: bool,
    /// Page size of a nested list. Without it the target's `default_limit` applies, so longer
    /// lists are truncated; either way the target's `max_limit` caps it.
    #[serde(default)]
    pub limit: Option<u32>,
}

impl ReadConfig {
    pub fn field(alias: impl Into<String>) -> Self {
        ReadConfig {
            alias: alias.into(),
            default: true,
            resource: None,
            parameters: BTreeMap::new(),
            multiple: false,
            limit: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConditionConfig {
    pub alias: String,
    /// Restrict the operators clients may use on this alias. All when absent.
    #[serde(default)]
    pub operators: Option<Vec<Operator>>,
}

/// Per-field rules checked on create and update bodies.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    #[serde(default)]
    pub required: Option<bool>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub min_length: Option<u32>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub allowed: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WriteConfig {
    pub alias: String,
    #[serde(flatten)]
    pub constraint: Constraint,
}

/// One resource declaration. Absent alias sets fall back to "every field" (identity excluded
/// from create/update).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub name: String,
    #[serde(default = "default_limit")]
    pub default_limit: u32,
    #[serde(default = "max_limit")]
    pub max_limit: u32,
    pub tables: Vec<TableConfig>,
    #[serde(default)]
    pub read: Option<Vec<ReadConfig>>,
    #[serde(default)]
    pub conditions: Option<Vec<ConditionConfig>>,
    #[serde(default)]
    pub order: Option<Vec<String>>,
    #[serde(default)]
    pub create: Option<Vec<WriteConfig>>,
    #[serde(default)]
    pub update: Option<Vec<WriteConfig>>,
    /// Scopes a caller needs per method. Methods not listed need no auth.
    #[serde(default)]
    pub auth: HashMap<Method, Vec<String>>,
}

/// Top-level shape of a resources file.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ResourcesFile {
    pub resources: Vec<ResourceConfig>,
}

fn default_true() -> bool {
    true
}

fn default_limit() -> u32 {
    10
}

fn max_limit() -> u32 {
    25
}

/// Named process options for the engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineOptions {
    /// Check alias references and identity type when a descriptor is built.
    pub check_resource_validity: bool,
    /// Honor `method=` on POST for clients without PUT/DELETE.
    pub enable_forced_method: bool,
    /// Reject unknown parameter keys on reads instead of ignoring them.
    pub strict_parameters: bool,
    pub delete_status: u16,
    pub max_nesting_depth: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            check_resource_validity: true,
            enable_forced_method: true,
            strict_parameters: false,
            delete_status: 200,
            max_nesting_depth: 8,
        }
    }
}

impl EngineOptions {
    /// Defaults overridden by `RESOURCE_ENGINE_*` environment variables.
    pub fn from_env() -> Self {
        let mut opts = EngineOptions::default();
        let flag = |name: &str| std::env::var(name).ok().and_then(|v| parse_bool(&v));
        if let Some(v) = flag("RESOURCE_ENGINE_CHECK_VALIDITY") {
            opts.check_resource_validity = v;
        }
        if let Some(v) = flag("RESOURCE_ENGINE_FORCED_METHOD") {
            opts.enable_forced_method = v;
        }
        if let Some(v) = flag("RESOURCE_ENGINE_STRICT_PARAMETERS") {
            opts.strict_parameters = v;
        }
        if let Some(v) = std::env::var("RESOURCE_ENGINE_DELETE_STATUS").ok().and_then(|v| v.parse().ok()) {
            opts.delete_status = v;
        }
        if let Some(v) = std::env::var("RESOURCE_ENGINE_MAX_NESTING").ok().and_then(|v| v.parse().ok()) {
            opts.max_nesting_depth = v;
        }
        opts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn injected_values_parse_from_literal_or_value_of() {
        let lit: InjectedValue = serde_json::from_value(json!("gt(10)")).unwrap();
        assert_eq!(lit, InjectedValue::literal("gt(10)"));
        let num: InjectedValue = serde_json::from_value(json!(5)).unwrap();
        assert_eq!(num, InjectedValue::literal("5"));
        let col: InjectedValue = serde_json::from_value(json!({ "value_of": "code" })).unwrap();
        assert_eq!(col, InjectedValue::value_of("code"));
        assert!(serde_json::from_value::<InjectedValue>(json!({ "alias": "code" })).is_err());
        assert!(serde_json::from_value::<InjectedValue>(json!([1])).is_err());
    }

    #[test]
    fn resource_defaults_apply() {
        let cfg: ResourceConfig = serde_json::from_value(json!({
            "name": "users",
            "tables": [{ "name": "user", "fields": [{ "alias": "id", "column": "id", "type": "int" }] }]
        }))
        .unwrap();
        assert_eq!(cfg.default_limit, 10);
        assert_eq!(cfg.max_limit, 25);
        assert!(cfg.read.is_none());
        assert_eq!(cfg.tables[0].fields[0].type_, FieldType::Int);
    }

    #[test]
    fn options_read_the_environment() {
        std::env::set_var("RESOURCE_ENGINE_DELETE_STATUS", "204");
        std::env::set_var("RESOURCE_ENGINE_STRICT_PARAMETERS", "yes");
        std::env::set_var("RESOURCE_ENGINE_MAX_NESTING", "not-a-number");
        let opts = EngineOptions::from_env();
        assert_eq!(opts.delete_status, 204);
        assert!(opts.strict_parameters);
        assert_eq!(opts.max_nesting_depth, 8);
        assert!(opts.check_resource_validity);
    }

    #[test]
    fn write_config_flattens_constraint() {
        let w: WriteConfig =
            serde_json::from_value(json!({ "alias": "name", "required": false, "max_length": 20 })).unwrap();
        assert_eq!(w.constraint.required, Some(false));
        assert_eq!(w.constraint.max_length, Some(20));
    }

    #[test]
    fn timestamp_is_an_alias_for_datetime() {
        let t: FieldType = serde_json::from_value(json!("timestamp")).unwrap();
        assert_eq!(t, FieldType::DateTime);
    }
}
