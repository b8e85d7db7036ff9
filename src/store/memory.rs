//! In-memory store that evaluates structured statements directly. Used by tests and by
//! embedders that want the engine without a database.

use crate::config::FieldType;
use crate::error::StoreError;
use crate::query::{Direction, Operator};
use crate::sql::{ColumnRef, Predicate, Statement, StatementKind};
use crate::store::{Row, Store, StoreTransaction};
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Clone, Debug, Default)]
struct Table {
    columns: Vec<String>,
    unique: Vec<String>,
    rows: Vec<Row>,
}

type Tables = HashMap<String, Table>;

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Create (or replace) a table. Values in `unique` columns may not repeat.
    pub async fn create_table(&self, name: &str, columns: &[&str], unique: &[&str]) {
        let table = Table {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            unique: unique.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        };
        self.tables.lock().await.insert(name.to_string(), table);
    }

    /// Append rows given as JSON objects. Missing columns are null.
    pub async fn seed(&self, name: &str, rows: Vec<Value>) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        let table = tables
            .get_mut(name)
            .ok_or_else(|| StoreError::UnknownTable(name.to_string()))?;
        for row in rows {
            let Value::Object(given) = row else {
                return Err(StoreError::Constraint(format!("seed row for {} is not an object", name)));
            };
            let mut full = Row::new();
            for c in &table.columns {
                full.insert(c.clone(), Value::Null);
            }
            for (k, v) in given {
                if !table.columns.contains(&k) {
                    return Err(StoreError::UnknownColumn(k));
                }
                full.insert(k, v);
            }
            table.rows.push(full);
        }
        Ok(())
    }

    /// Snapshot of a table's rows.
    pub async fn rows(&self, name: &str) -> Vec<Row> {
        self.tables
            .lock()
            .await
            .get(name)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn fetch_all(&self, statement: &Statement) -> Result<Vec<Row>, StoreError> {
        let tables = self.tables.lock().await;
        select(&tables, statement)
    }

    async fn fetch_count(&self, statement: &Statement) -> Result<u64, StoreError> {
        let tables = self.tables.lock().await;
        Ok(matching(&tables, statement)?.len() as u64)
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let guard = self.tables.clone().lock_owned().await;
        let backup = Some(guard.clone());
        Ok(Box::new(MemoryTransaction { guard, backup }))
    }
}

/// Holds the store lock for its lifetime; writes are undone unless committed.
struct MemoryTransaction {
    guard: OwnedMutexGuard<Tables>,
    backup: Option<Tables>,
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if let Some(backup) = self.backup.take() {
            *self.guard = backup;
        }
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn execute(&mut self, statement: &Statement) -> Result<Vec<Row>, StoreError> {
        let tables: &mut Tables = &mut self.guard;
        match statement.kind {
            StatementKind::Insert => insert(tables, statement),
            StatementKind::Update => update(tables, statement),
            StatementKind::Delete => delete(tables, statement),
            StatementKind::Select => select(tables, statement),
            StatementKind::Count => {
                let n = matching(tables, statement)?.len();
                let mut row = Row::new();
                row.insert("count".into(), Value::from(n as u64));
                Ok(vec![row])
            }
        }
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut this = self;
        this.backup = None;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        // Drop restores the backup.
        Ok(())
    }
}

fn table<'a>(tables: &'a Tables, name: &str) -> Result<&'a Table, StoreError> {
    tables.get(name).ok_or_else(|| StoreError::UnknownTable(name.to_string()))
}

fn table_mut<'a>(tables: &'a mut Tables, name: &str) -> Result<&'a mut Table, StoreError> {
    tables
        .get_mut(name)
        .ok_or_else(|| StoreError::UnknownTable(name.to_string()))
}

fn check_columns(table: &Table, columns: &[ColumnRef]) -> Result<(), StoreError> {
    match columns.iter().find(|c| !table.columns.contains(&c.column)) {
        Some(c) => Err(StoreError::UnknownColumn(format!("{}.{}", c.table, c.column))),
        None => Ok(()),
    }
}

/// Joined rows satisfying every predicate, before ordering and pagination.
fn matching(tables: &Tables, stmt: &Statement) -> Result<Vec<Row>, StoreError> {
    let mut rows: Vec<Row> = table(tables, &stmt.table)?.rows.clone();
    for join in &stmt.joins {
        let other = table(tables, &join.key.table)?;
        let mut joined = Vec::with_capacity(rows.len());
        for row in &rows {
            let parent = row.get(&join.parent.column).unwrap_or(&Value::Null);
            for candidate in &other.rows {
                let key = candidate.get(&join.key.column).unwrap_or(&Value::Null);
                if !parent.is_null() && values_equal(parent, key) {
                    let mut merged = row.clone();
                    merged.extend(candidate.iter().map(|(k, v)| (k.clone(), v.clone())));
                    joined.push(merged);
                }
            }
        }
        rows = joined;
    }
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        if row_matches(&row, &stmt.predicates)? {
            out.push(row);
        }
    }
    Ok(out)
}

fn select(tables: &Tables, stmt: &Statement) -> Result<Vec<Row>, StoreError> {
    let mut rows = matching(tables, stmt)?;
    rows.sort_by(|a, b| {
        stmt.order
            .iter()
            .map(|o| {
                let ord = compare_nulls_last(a.get(&o.column.column), b.get(&o.column.column));
                match o.direction {
                    Direction::Asc => ord,
                    Direction::Desc => ord.reverse(),
                }
            })
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
    let offset = stmt.offset.unwrap_or(0) as usize;
    let limit = stmt.limit.map(|l| l as usize).unwrap_or(usize::MAX);
    Ok(rows
        .into_iter()
        .skip(offset)
        .take(limit)
        .map(|row| project(&row, &stmt.columns))
        .collect())
}

fn project(row: &Row, columns: &[ColumnRef]) -> Row {
    columns
        .iter()
        .map(|c| (c.column.clone(), row.get(&c.column).cloned().unwrap_or(Value::Null)))
        .collect()
}

fn check_unique(table: &Table, candidate: &Row, skip: Option<usize>) -> Result<(), StoreError> {
    for col in &table.unique {
        let v = candidate.get(col).unwrap_or(&Value::Null);
        if v.is_null() {
            continue;
        }
        let clash = table
            .rows
            .iter()
            .enumerate()
            .any(|(i, r)| Some(i) != skip && r.get(col).map(|o| values_equal(o, v)).unwrap_or(false));
        if clash {
            return Err(StoreError::Constraint(format!("duplicate value for unique column {}", col)));
        }
    }
    Ok(())
}

fn insert(tables: &mut Tables, stmt: &Statement) -> Result<Vec<Row>, StoreError> {
    let table = table_mut(tables, &stmt.table)?;
    check_columns(table, &stmt.columns)?;
    check_columns(table, &stmt.returning)?;

    let mut row = Row::new();
    for c in &table.columns {
        row.insert(c.clone(), Value::Null);
    }
    for (c, v) in stmt.columns.iter().zip(&stmt.values) {
        row.insert(c.column.clone(), v.clone());
    }
    // Integer keys left unset are generated, like a serial column.
    if let Some(key) = stmt.returning.first() {
        if row.get(&key.column).map(Value::is_null).unwrap_or(true) && key.field_type == FieldType::Int {
            let next = table
                .rows
                .iter()
                .filter_map(|r| r.get(&key.column).and_then(Value::as_i64))
                .max()
                .unwrap_or(0)
                + 1;
            row.insert(key.column.clone(), Value::from(next));
        }
    }
    check_unique(table, &row, None)?;
    let returned = project(&row, &stmt.returning);
    table.rows.push(row);
    Ok(vec![returned])
}

fn update(tables: &mut Tables, stmt: &Statement) -> Result<Vec<Row>, StoreError> {
    let table = table_mut(tables, &stmt.table)?;
    check_columns(table, &stmt.columns)?;
    let mut hits = Vec::new();
    for (i, row) in table.rows.iter().enumerate() {
        if row_matches(row, &stmt.predicates)? {
            hits.push(i);
        }
    }
    let mut out = Vec::with_capacity(hits.len());
    for i in hits {
        let mut row = table.rows[i].clone();
        for (c, v) in stmt.columns.iter().zip(&stmt.values) {
            row.insert(c.column.clone(), v.clone());
        }
        check_unique(table, &row, Some(i))?;
        out.push(project(&row, &stmt.returning));
        table.rows[i] = row;
    }
    Ok(out)
}

fn delete(tables: &mut Tables, stmt: &Statement) -> Result<Vec<Row>, StoreError> {
    let table = table_mut(tables, &stmt.table)?;
    let mut kept = Vec::with_capacity(table.rows.len());
    let mut out = Vec::new();
    for row in table.rows.drain(..) {
        if row_matches(&row, &stmt.predicates)? {
            out.push(project(&row, &stmt.returning));
        } else {
            kept.push(row);
        }
    }
    table.rows = kept;
    Ok(out)
}

fn row_matches(row: &Row, predicates: &[Predicate]) -> Result<bool, StoreError> {
    for p in predicates {
        let Some(value) = row.get(&p.column.column) else {
            return Err(StoreError::UnknownColumn(format!("{}.{}", p.column.table, p.column.column)));
        };
        if !predicate_matches(value, p) {
            return Ok(false);
        }
    }
    Ok(true)
}

/// SQL semantics: a null column satisfies no predicate.
fn predicate_matches(value: &Value, p: &Predicate) -> bool {
    if value.is_null() {
        return false;
    }
    let first = p.values.first().unwrap_or(&Value::Null);
    match p.operator {
        Operator::Eq => values_equal(value, first),
        Operator::Ne => !first.is_null() && !values_equal(value, first),
        Operator::Gt => compare(value, first) == Some(Ordering::Greater),
        Operator::Gte => matches!(compare(value, first), Some(Ordering::Greater | Ordering::Equal)),
        Operator::Lt => compare(value, first) == Some(Ordering::Less),
        Operator::Lte => matches!(compare(value, first), Some(Ordering::Less | Ordering::Equal)),
        Operator::In => p.values.iter().any(|v| values_equal(value, v)),
        Operator::Like => match first.as_str() {
            Some(pattern) => like(&text_of(value), pattern),
            None => false,
        },
    }
}

fn text_of(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// `%` matches any run, `_` one character; everything else is literal.
fn like(value: &str, pattern: &str) -> bool {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push_str("(?s)^");
    for ch in pattern.chars() {
        match ch {
            '%' => re.push_str(".*"),
            '_' => re.push('.'),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).map(|r| r.is_match(value)).unwrap_or(false)
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Ordering for sorts: nulls sort after every value, as in PostgreSQL ascending order.
fn compare_nulls_last(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (Some(x), Some(y)) => compare(x, y).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
