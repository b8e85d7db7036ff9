//! Structured statements planned from a descriptor and a validated request. Backends either render
//! them to SQL (`render`) or evaluate them directly (the in-memory store).

use crate::config::{FieldDescriptor, FieldType, ReadKind, ResourceDescriptor, TableDescriptor};
use crate::error::ConfigError;
use crate::query::{Direction, Operation, Operator, ValidatedRequest};
use serde_json::Value;
use std::collections::BTreeSet;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Count,
    Insert,
    Update,
    Delete,
}

/// A column of a declared table.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnRef {
    pub table: String,
    pub column: String,
    pub field_type: FieldType,
}

impl ColumnRef {
    pub fn of(table: &TableDescriptor, field: &FieldDescriptor) -> Self {
        ColumnRef {
            table: table.name.clone(),
            column: field.column.clone(),
            field_type: field.field_type,
        }
    }
}

/// Inner join of a secondary table on its key column equal to the resource identity.
#[derive(Clone, Debug, PartialEq)]
pub struct Join {
    pub key: ColumnRef,
    pub parent: ColumnRef,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Predicate {
    pub column: ColumnRef,
    pub operator: Operator,
    pub values: Vec<Value>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Ordering {
    pub column: ColumnRef,
    pub direction: Direction,
}

/// One statement against one table (plus joins for reads). `values` is aligned with `columns`
/// for inserts and updates.
#[derive(Clone, Debug, PartialEq)]
pub struct Statement {
    pub kind: StatementKind,
    pub table: String,
    pub joins: Vec<Join>,
    pub columns: Vec<ColumnRef>,
    pub values: Vec<Value>,
    pub predicates: Vec<Predicate>,
    pub order: Vec<Ordering>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub returning: Vec<ColumnRef>,
}

impl Statement {
    fn new(kind: StatementKind, table: &str) -> Self {
        Statement {
            kind,
            table: table.to_string(),
            joins: Vec::new(),
            columns: Vec::new(),
            values: Vec::new(),
            predicates: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
            returning: Vec::new(),
        }
    }

    /// Set a written column, replacing any value already planned for it.
    pub fn set_value(&mut self, column: ColumnRef, value: Value) {
        match self.columns.iter().position(|c| c.column == column.column) {
            Some(i) => self.values[i] = value,
            None => {
                self.columns.push(column);
                self.values.push(value);
            }
        }
    }

    /// Every table the statement reads from, primary first.
    pub fn tables(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.table.as_str()).chain(self.joins.iter().map(|j| j.key.table.as_str()))
    }
}

fn column_for_alias(descriptor: &ResourceDescriptor, alias: &str) -> Result<ColumnRef, ConfigError> {
    let field = descriptor
        .field_for_alias(alias)
        .ok_or_else(|| ConfigError::MissingReference {
            resource: descriptor.name.clone(),
            kind: "field",
            id: alias.to_string(),
        })?;
    column_for_field(descriptor, field)
}

fn column_for_field(descriptor: &ResourceDescriptor, field: &FieldDescriptor) -> Result<ColumnRef, ConfigError> {
    let table = descriptor
        .table_for_field(&field.column)
        .ok_or_else(|| ConfigError::MissingReference {
            resource: descriptor.name.clone(),
            kind: "column",
            id: field.column.clone(),
        })?;
    Ok(ColumnRef::of(table, field))
}

fn identity_column(descriptor: &ResourceDescriptor) -> ColumnRef {
    ColumnRef::of(descriptor.primary_table(), descriptor.identity())
}

fn join_for(descriptor: &ResourceDescriptor, table: &TableDescriptor) -> Join {
    Join {
        key: ColumnRef::of(table, table.key()),
        parent: identity_column(descriptor),
    }
}

/// Aliases whose columns a read must fetch: projected fields plus parent values feeding nested reads.
pub fn fetched_aliases<'a>(descriptor: &'a ResourceDescriptor, request: &'a ValidatedRequest) -> Vec<&'a str> {
    let mut out: Vec<&str> = Vec::new();
    for selection in &request.projection {
        match descriptor.readable.get(&selection.alias).map(|r| &r.kind) {
            Some(ReadKind::Resource(nested)) => out.extend(nested.referenced_aliases()),
            _ => out.push(selection.alias.as_str()),
        }
    }
    let mut seen = BTreeSet::new();
    out.retain(|a| seen.insert(*a));
    out
}

fn predicates(descriptor: &ResourceDescriptor, request: &ValidatedRequest) -> Result<Vec<Predicate>, ConfigError> {
    let mut out = Vec::with_capacity(request.conditions.len() + 1);
    if let Operation::ReadOne { id } = &request.operation {
        out.push(Predicate {
            column: identity_column(descriptor),
            operator: Operator::Eq,
            values: vec![id.clone()],
        });
    }
    for c in &request.conditions {
        out.push(Predicate {
            column: column_for_alias(descriptor, &c.alias)?,
            operator: c.operator,
            values: c.values.clone(),
        });
    }
    Ok(out)
}

/// Data select for a read. Every secondary table is joined so a record exists only when all its
/// table rows do.
pub fn plan_select(descriptor: &ResourceDescriptor, request: &ValidatedRequest) -> Result<Statement, ConfigError> {
    let primary = descriptor.primary_table();
    let mut stmt = Statement::new(StatementKind::Select, &primary.name);
    stmt.joins = descriptor.tables[1..].iter().map(|t| join_for(descriptor, t)).collect();

    for alias in fetched_aliases(descriptor, request) {
        stmt.columns.push(column_for_alias(descriptor, alias)?);
    }
    if stmt.columns.is_empty() {
        stmt.columns.push(identity_column(descriptor));
    }
    stmt.predicates = predicates(descriptor, request)?;

    for term in &request.order {
        stmt.order.push(Ordering {
            column: column_for_alias(descriptor, &term.alias)?,
            direction: term.direction,
        });
    }
    let identity = identity_column(descriptor);
    if !stmt.order.iter().any(|o| o.column == identity) {
        stmt.order.push(Ordering {
            column: identity,
            direction: Direction::Asc,
        });
    }
    if let Some(p) = request.pagination() {
        stmt.limit = Some(p.limit);
        stmt.offset = Some(p.offset);
    }
    Ok(stmt)
}

/// Total matching records, ignoring pagination. Joins only what the predicates touch.
pub fn plan_count(descriptor: &ResourceDescriptor, request: &ValidatedRequest) -> Result<Statement, ConfigError> {
    let primary = descriptor.primary_table();
    let mut stmt = Statement::new(StatementKind::Count, &primary.name);
    stmt.predicates = predicates(descriptor, request)?;
    stmt.joins = descriptor.tables[1..]
        .iter()
        .filter(|t| stmt.predicates.iter().any(|p| p.column.table == t.name))
        .map(|t| join_for(descriptor, t))
        .collect();
    Ok(stmt)
}

/// One insert per table in declaration order. Secondary inserts get their key column bound by
/// the caller once the primary insert has produced the identity.
pub fn plan_inserts(descriptor: &ResourceDescriptor, values: &[(String, Value)]) -> Result<Vec<Statement>, ConfigError> {
    let mut out: Vec<Statement> = descriptor
        .tables
        .iter()
        .map(|t| {
            let mut stmt = Statement::new(StatementKind::Insert, &t.name);
            stmt.returning.push(ColumnRef::of(t, t.key()));
            stmt
        })
        .collect();
    for (alias, value) in values {
        let column = column_for_alias(descriptor, alias)?;
        let slot = descriptor
            .tables
            .iter()
            .position(|t| t.name == column.table)
            .unwrap_or(0);
        out[slot].set_value(column, value.clone());
    }
    Ok(out)
}

/// Updates for every table with at least one modified column, keyed on the identity value.
pub fn plan_updates(
    descriptor: &ResourceDescriptor,
    id: &Value,
    values: &[(String, Value)],
) -> Result<Vec<Statement>, ConfigError> {
    let mut out = Vec::new();
    for table in &descriptor.tables {
        let mut stmt = Statement::new(StatementKind::Update, &table.name);
        for (alias, value) in values {
            let column = column_for_alias(descriptor, alias)?;
            if column.table == table.name {
                stmt.set_value(column, value.clone());
            }
        }
        if stmt.columns.is_empty() {
            continue;
        }
        let key = ColumnRef::of(table, table.key());
        stmt.predicates.push(Predicate {
            column: key.clone(),
            operator: Operator::Eq,
            values: vec![id.clone()],
        });
        stmt.returning.push(key);
        out.push(stmt);
    }
    Ok(out)
}

/// Deletes in reverse declaration order so secondary rows go before the primary one.
pub fn plan_deletes(descriptor: &ResourceDescriptor, id: &Value) -> Vec<Statement> {
    descriptor
        .tables
        .iter()
        .rev()
        .map(|table| {
            let key = ColumnRef::of(table, table.key());
            let mut stmt = Statement::new(StatementKind::Delete, &table.name);
            stmt.predicates.push(Predicate {
                column: key.clone(),
                operator: Operator::Eq,
                values: vec![id.clone()],
            });
            stmt.returning.push(key);
            stmt
        })
        .collect()
}
