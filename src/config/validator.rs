//! Config validation: structural consistency of a declaration and alias references of a descriptor.

use crate::config::{ReadKind, ResourceConfig, ResourceDescriptor};
use crate::error::ConfigError;
use std::collections::HashSet;

/// Checks that always run: tables and fields present, aliases and columns unique, limits sane.
pub fn validate(config: &ResourceConfig) -> Result<(), ConfigError> {
    let resource = config.name.as_str();
    if config.tables.is_empty() {
        return Err(ConfigError::InvalidIdentity {
            resource: resource.to_string(),
            reason: "no tables declared".into(),
        });
    }

    let mut table_names = HashSet::new();
    let mut aliases = HashSet::new();
    let mut columns = HashSet::new();
    for table in &config.tables {
        if !table_names.insert(table.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "table '{}' declared twice in resource {}",
                table.name, resource
            )));
        }
        if table.fields.is_empty() {
            return Err(ConfigError::InvalidIdentity {
                resource: resource.to_string(),
                reason: format!("table '{}' has no fields", table.name),
            });
        }
        for f in &table.fields {
            if !aliases.insert(f.alias.as_str()) {
                return Err(ConfigError::DuplicateAlias {
                    resource: resource.to_string(),
                    alias: f.alias.clone(),
                });
            }
            if !columns.insert(f.column.as_str()) {
                return Err(ConfigError::DuplicateColumn {
                    resource: resource.to_string(),
                    column: f.column.clone(),
                });
            }
        }
    }

    if let Some(reads) = &config.read {
        let mut seen = HashSet::new();
        for r in reads {
            if !seen.insert(r.alias.as_str()) {
                return Err(ConfigError::DuplicateAlias {
                    resource: resource.to_string(),
                    alias: r.alias.clone(),
                });
            }
            if r.resource.is_some() && aliases.contains(r.alias.as_str()) {
                return Err(ConfigError::DuplicateAlias {
                    resource: resource.to_string(),
                    alias: r.alias.clone(),
                });
            }
        }
    }

    if config.default_limit == 0 || config.max_limit < config.default_limit {
        return Err(ConfigError::Validation(format!(
            "resource {}: need 1 <= default_limit ({}) <= max_limit ({})",
            resource, config.default_limit, config.max_limit
        )));
    }
    Ok(())
}

/// Optional validity check: every alias in every set resolves, and the identity is scalar.
pub fn check_validity(descriptor: &ResourceDescriptor) -> Result<(), ConfigError> {
    let missing = |alias: &str| ConfigError::MissingReference {
        resource: descriptor.name.clone(),
        kind: "field",
        id: alias.to_string(),
    };

    for alias in &descriptor.read_order {
        match descriptor.readable.get(alias).map(|r| &r.kind) {
            Some(ReadKind::Field) => {
                descriptor.field_for_alias(alias).ok_or_else(|| missing(alias))?;
            }
            Some(ReadKind::Resource(nested)) => {
                for referenced in nested.referenced_aliases() {
                    descriptor.field_for_alias(referenced).ok_or_else(|| missing(referenced))?;
                }
            }
            None => return Err(missing(alias)),
        }
    }
    let write_aliases = descriptor.creatable.keys().chain(descriptor.updatable.keys());
    for alias in descriptor
        .filterable
        .keys()
        .chain(descriptor.orderable.iter())
        .chain(write_aliases)
    {
        descriptor.field_for_alias(alias).ok_or_else(|| missing(alias))?;
    }

    let identity = descriptor.identity();
    if !identity.field_type.is_scalar() {
        return Err(ConfigError::InvalidIdentity {
            resource: descriptor.name.clone(),
            reason: format!("identity '{}' must be a scalar type", identity.alias),
        });
    }
    Ok(())
}
