//! Resolved resource descriptor: config validated and flattened for runtime use.
//! Immutable once built; lookup indices are computed at construction.

use crate::config::{Constraint, FieldType, InjectedValue};
use crate::query::Operator;
use crate::registry::ResourceFunction;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq)]
pub struct FieldDescriptor {
    pub alias: String,
    pub column: String,
    pub field_type: FieldType,
}

#[derive(Clone, Debug)]
pub struct TableDescriptor {
    pub name: String,
    /// Never empty; the first field is this table's key column.
    pub fields: Vec<FieldDescriptor>,
}

impl TableDescriptor {
    pub fn key(&self) -> &FieldDescriptor {
        &self.fields[0]
    }
}

/// A nested read of another resource, parameterized per parent row. Runs as a first-page
/// multi-read of the target; no meta is reported for it.
#[derive(Clone, Debug)]
pub struct NestedRead {
    pub resource: String,
    pub parameters: Vec<(String, InjectedValue)>,
    pub multiple: bool,
    /// Page size; the target's default limit when None.
    pub limit: Option<u32>,
}

impl NestedRead {
    /// Parent aliases whose values feed this nested read.
    pub fn referenced_aliases(&self) -> impl Iterator<Item = &str> {
        self.parameters.iter().filter_map(|(_, v)| match v {
            InjectedValue::ColumnRef(alias) => Some(alias.as_str()),
            InjectedValue::Literal(_) => None,
        })
    }
}

#[derive(Clone, Debug)]
pub enum ReadKind {
    Field,
    Resource(NestedRead),
}

#[derive(Clone, Debug)]
pub struct Readable {
    pub kind: ReadKind,
    pub default: bool,
}

#[derive(Clone, Debug, Default)]
pub struct ConditionCapability {
    pub operators: Option<Vec<Operator>>,
}

impl ConditionCapability {
    pub fn allows(&self, op: Operator) -> bool {
        self.operators.as_ref().map(|ops| ops.contains(&op)).unwrap_or(true)
    }
}

/// Named custom operations of a resource.
#[derive(Clone, Default)]
pub struct FunctionTable(pub HashMap<String, Arc<dyn ResourceFunction>>);

impl FunctionTable {
    pub fn get(&self, name: &str) -> Option<&Arc<dyn ResourceFunction>> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }
}

impl fmt::Debug for FunctionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.0.keys()).finish()
    }
}

#[derive(Clone, Debug)]
pub struct ResourceDescriptor {
    pub name: String,
    pub tables: Vec<TableDescriptor>,
    pub default_limit: u32,
    pub max_limit: u32,
    pub readable: HashMap<String, Readable>,
    /// Readable aliases in declaration order.
    pub read_order: Vec<String>,
    pub filterable: HashMap<String, ConditionCapability>,
    pub orderable: HashSet<String>,
    pub creatable: HashMap<String, Constraint>,
    /// Creatable aliases in declaration order.
    pub create_order: Vec<String>,
    pub updatable: HashMap<String, Constraint>,
    pub functions: FunctionTable,
    pub(crate) table_by_field: HashMap<String, usize>,
    pub(crate) field_by_alias: HashMap<String, (usize, usize)>,
    pub(crate) alias_by_field: HashMap<String, String>,
}

impl ResourceDescriptor {
    pub fn table_for_field(&self, column: &str) -> Option<&TableDescriptor> {
        self.table_by_field.get(column).map(|&t| &self.tables[t])
    }

    pub fn field_for_alias(&self, alias: &str) -> Option<&FieldDescriptor> {
        self.field_by_alias
            .get(alias)
            .map(|&(t, f)| &self.tables[t].fields[f])
    }

    pub fn alias_for_field(&self, column: &str) -> Option<&str> {
        self.alias_by_field.get(column).map(String::as_str)
    }

    /// Key field of the named table, or the resource identity when `table` is None.
    pub fn identity_field(&self, table: Option<&str>) -> Option<&FieldDescriptor> {
        match table {
            None => self.tables.first().map(TableDescriptor::key),
            Some(name) => self.tables.iter().find(|t| t.name == name).map(TableDescriptor::key),
        }
    }

    pub fn identity(&self) -> &FieldDescriptor {
        self.tables[0].key()
    }

    pub fn primary_table(&self) -> &TableDescriptor {
        &self.tables[0]
    }

    pub fn nested(&self, alias: &str) -> Option<&NestedRead> {
        match self.readable.get(alias).map(|r| &r.kind) {
            Some(ReadKind::Resource(nested)) => Some(nested),
            _ => None,
        }
    }

    /// Aliases returned when the client does not pass `fields`.
    pub fn default_projection(&self) -> impl Iterator<Item = &str> {
        self.read_order
            .iter()
            .filter(|a| self.readable.get(a.as_str()).map(|r| r.default).unwrap_or(false))
            .map(String::as_str)
    }
}
