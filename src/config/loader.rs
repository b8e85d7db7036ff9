//! Load resource declarations from JSON and resolve them into descriptors.

use crate::config::resolved::{
    ConditionCapability, FieldDescriptor, FunctionTable, NestedRead, ReadKind, Readable, ResourceDescriptor,
    TableDescriptor,
};
use crate::config::types::*;
use crate::config::{check_validity, validate};
use crate::error::ConfigError;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Build a descriptor from a declaration. Structural checks always run; alias references and
/// identity type are checked when `check_resource_validity` is set.
pub fn resolve(
    config: &ResourceConfig,
    functions: FunctionTable,
    check_resource_validity: bool,
) -> Result<ResourceDescriptor, ConfigError> {
    validate(config)?;

    let tables: Vec<TableDescriptor> = config
        .tables
        .iter()
        .map(|t| TableDescriptor {
            name: t.name.clone(),
            fields: t
                .fields
                .iter()
                .map(|f| FieldDescriptor {
                    alias: f.alias.clone(),
                    column: f.column.clone(),
                    field_type: f.type_,
                })
                .collect(),
        })
        .collect();

    let mut table_by_field = HashMap::new();
    let mut field_by_alias = HashMap::new();
    let mut alias_by_field = HashMap::new();
    for (ti, table) in tables.iter().enumerate() {
        for (fi, field) in table.fields.iter().enumerate() {
            table_by_field.insert(field.column.clone(), ti);
            field_by_alias.insert(field.alias.clone(), (ti, fi));
            alias_by_field.insert(field.column.clone(), field.alias.clone());
        }
    }

    let key_columns: HashSet<&str> = config.tables.iter().map(|t| t.fields[0].column.as_str()).collect();
    let all_fields = || config.tables.iter().flat_map(|t| t.fields.iter());

    let reads: Vec<ReadConfig> = match &config.read {
        Some(r) => r.clone(),
        None => all_fields().map(|f| ReadConfig::field(f.alias.clone())).collect(),
    };
    let mut readable = HashMap::new();
    let mut read_order = Vec::with_capacity(reads.len());
    for r in reads {
        let kind = match &r.resource {
            Some(target) => ReadKind::Resource(NestedRead {
                resource: target.clone(),
                parameters: r.parameters.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
                multiple: r.multiple,
                limit: r.limit,
            }),
            None => ReadKind::Field,
        };
        read_order.push(r.alias.clone());
        readable.insert(
            r.alias,
            Readable {
                kind,
                default: r.default,
            },
        );
    }

    let filterable = match &config.conditions {
        Some(c) => c
            .iter()
            .map(|c| {
                (
                    c.alias.clone(),
                    ConditionCapability {
                        operators: c.operators.clone(),
                    },
                )
            })
            .collect(),
        None => all_fields()
            .map(|f| (f.alias.clone(), ConditionCapability::default()))
            .collect(),
    };

    let orderable: HashSet<String> = match &config.order {
        Some(o) => o.iter().cloned().collect(),
        None => all_fields().map(|f| f.alias.clone()).collect(),
    };

    // Generated write sets skip table keys and make nothing required.
    let writes = |declared: &Option<Vec<WriteConfig>>| -> Vec<(String, Constraint)> {
        match declared {
            Some(w) => w.iter().map(|w| (w.alias.clone(), w.constraint.clone())).collect(),
            None => all_fields()
                .filter(|f| !key_columns.contains(f.column.as_str()))
                .map(|f| {
                    (
                        f.alias.clone(),
                        Constraint {
                            required: Some(false),
                            ..Constraint::default()
                        },
                    )
                })
                .collect(),
        }
    };
    let create = writes(&config.create);
    let create_order = create.iter().map(|(a, _)| a.clone()).collect();
    let creatable = create.into_iter().collect();
    let updatable = writes(&config.update).into_iter().collect();

    let descriptor = ResourceDescriptor {
        name: config.name.clone(),
        tables,
        default_limit: config.default_limit,
        max_limit: config.max_limit,
        readable,
        read_order,
        filterable,
        orderable,
        creatable,
        create_order,
        updatable,
        functions,
        table_by_field,
        field_by_alias,
        alias_by_field,
    };
    if check_resource_validity {
        check_validity(&descriptor)?;
    }
    tracing::debug!(
        resource = %descriptor.name,
        tables = descriptor.tables.len(),
        fields = descriptor.field_by_alias.len(),
        "resolved resource"
    );
    Ok(descriptor)
}

/// Parse `{ "resources": [...] }` or a bare array of resource declarations.
pub fn load_resources_json(value: serde_json::Value) -> Result<Vec<ResourceConfig>, ConfigError> {
    if value.is_array() {
        return serde_json::from_value(value).map_err(|e| ConfigError::Load(e.to_string()));
    }
    let file: ResourcesFile = serde_json::from_value(value).map_err(|e| ConfigError::Load(e.to_string()))?;
    Ok(file.resources)
}

pub fn load_resources_file(path: impl AsRef<Path>) -> Result<Vec<ResourceConfig>, ConfigError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    let value: serde_json::Value =
        serde_json::from_str(&text).map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    let resources = load_resources_json(value)?;
    tracing::info!(path = %path.display(), count = resources.len(), "loaded resource declarations");
    Ok(resources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(value: serde_json::Value) -> ResourceConfig {
        serde_json::from_value(value).unwrap()
    }

    fn accounts() -> ResourceConfig {
        config(json!({
            "name": "accounts",
            "tables": [
                { "name": "account", "fields": [
                    { "alias": "id", "column": "id", "type": "int" },
                    { "alias": "email", "column": "email" }
                ]},
                { "name": "account_profile", "fields": [
                    { "alias": "profileAccountId", "column": "account_id", "type": "int" },
                    { "alias": "bio", "column": "bio" }
                ]}
            ]
        }))
    }

    #[test]
    fn indices_cover_every_table() {
        let d = resolve(&accounts(), FunctionTable::default(), true).unwrap();
        assert_eq!(d.table_for_field("bio").unwrap().name, "account_profile");
        assert_eq!(d.table_for_field("email").unwrap().name, "account");
        assert_eq!(d.field_for_alias("bio").unwrap().column, "bio");
        assert_eq!(d.alias_for_field("account_id"), Some("profileAccountId"));
        assert_eq!(d.identity().column, "id");
        assert_eq!(d.identity_field(Some("account_profile")).unwrap().column, "account_id");
        assert!(d.identity_field(Some("nope")).is_none());
        assert!(d.field_for_alias("ghost").is_none());
    }

    #[test]
    fn generated_write_sets_skip_identity() {
        let d = resolve(&accounts(), FunctionTable::default(), true).unwrap();
        assert!(!d.creatable.contains_key("id"));
        assert!(!d.updatable.contains_key("id"));
        assert!(!d.creatable.contains_key("profileAccountId"));
        assert!(d.creatable.contains_key("bio"));
        assert_eq!(d.creatable["email"].required, Some(false));
        assert_eq!(d.default_projection().count(), 4);
    }

    #[test]
    fn duplicate_alias_is_rejected() {
        let mut c = accounts();
        c.tables[1].fields[1].alias = "email".into();
        let err = resolve(&c, FunctionTable::default(), true).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateAlias { alias, .. } if alias == "email"));
    }

    #[test]
    fn duplicate_column_is_rejected() {
        let mut c = accounts();
        c.tables[1].fields[1].column = "email".into();
        let err = resolve(&c, FunctionTable::default(), true).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateColumn { column, .. } if column == "email"));
    }

    #[test]
    fn empty_tables_are_rejected() {
        let mut c = accounts();
        c.tables.clear();
        assert!(matches!(
            resolve(&c, FunctionTable::default(), true),
            Err(ConfigError::InvalidIdentity { .. })
        ));
    }

    #[test]
    fn unknown_aliases_fail_only_when_checking_validity() {
        let mut c = accounts();
        c.order = Some(vec!["email".into(), "shoeSize".into()]);
        assert!(matches!(
            resolve(&c, FunctionTable::default(), true),
            Err(ConfigError::MissingReference { id, .. }) if id == "shoeSize"
        ));
        assert!(resolve(&c, FunctionTable::default(), false).is_ok());
    }

    #[test]
    fn nested_value_of_must_name_a_field() {
        let c = config(json!({
            "name": "countries",
            "tables": [{ "name": "country", "fields": [{ "alias": "code", "column": "Code" }] }],
            "read": [
                { "alias": "code" },
                { "alias": "langs", "resource": "languages", "multiple": true,
                  "parameters": { "country": { "value_of": "isoCode" } } }
            ]
        }));
        assert!(matches!(
            resolve(&c, FunctionTable::default(), true),
            Err(ConfigError::MissingReference { id, .. }) if id == "isoCode"
        ));
    }

    #[test]
    fn json_identity_is_rejected() {
        let mut c = accounts();
        c.tables[0].fields[0].type_ = FieldType::Json;
        assert!(matches!(
            resolve(&c, FunctionTable::default(), true),
            Err(ConfigError::InvalidIdentity { .. })
        ));
    }

    #[test]
    fn limits_must_be_ordered() {
        let mut c = accounts();
        c.default_limit = 30;
        c.max_limit = 20;
        assert!(matches!(
            resolve(&c, FunctionTable::default(), true),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn resources_file_accepts_object_or_array() {
        let one = json!({ "name": "r", "tables": [{ "name": "t", "fields": [{ "alias": "id", "column": "id" }] }] });
        assert_eq!(load_resources_json(json!([one.clone()])).unwrap().len(), 1);
        assert_eq!(load_resources_json(json!({ "resources": [one] })).unwrap().len(), 1);
        assert!(matches!(load_resources_json(json!({ "nope": 1 })), Err(ConfigError::Load(_))));
    }
}
