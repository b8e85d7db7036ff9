//! Renders structured statements to parameterized PostgreSQL.

use crate::config::FieldType;
use crate::query::Operator;
use crate::sql::statement::{ColumnRef, Predicate, Statement, StatementKind};
use serde_json::Value;

/// Quote identifier for PostgreSQL (safe: only from config).
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

fn qualified(c: &ColumnRef) -> String {
    format!("{}.{}", quoted(&c.table), quoted(&c.column))
}

/// SQL text plus its positional parameters. `types[i]` is the declared field type of `params[i]`.
#[derive(Debug, Default)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
    pub types: Vec<FieldType>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf::default()
    }

    fn push_param(&mut self, v: Value, field_type: FieldType) -> u32 {
        let n = self.params.len() as u32 + 1;
        self.params.push(v);
        self.types.push(field_type);
        n
    }

    /// Placeholder with a cast when the field type needs one (`$3::date`).
    fn placeholder(&mut self, v: Value, field_type: FieldType) -> String {
        let n = self.push_param(v, field_type);
        match field_type.pg_cast() {
            Some(cast) => format!("${}::{}", n, cast),
            None => format!("${}", n),
        }
    }

    fn predicate(&mut self, p: &Predicate) -> String {
        let col = qualified(&p.column);
        match p.operator {
            Operator::In => {
                let list: Vec<String> = p
                    .values
                    .iter()
                    .map(|v| self.placeholder(v.clone(), p.column.field_type))
                    .collect();
                format!("{} IN ({})", col, list.join(", "))
            }
            Operator::Like => {
                let value = p.values.first().cloned().unwrap_or(Value::Null);
                let n = self.push_param(value, FieldType::String);
                format!("CAST({} AS TEXT) LIKE ${}", col, n)
            }
            op => {
                let value = p.values.first().cloned().unwrap_or(Value::Null);
                let ph = self.placeholder(value, p.column.field_type);
                format!("{} {} {}", col, op.sql_symbol(), ph)
            }
        }
    }

    fn where_clause(&mut self, predicates: &[Predicate]) -> String {
        if predicates.is_empty() {
            return String::new();
        }
        let parts: Vec<String> = predicates.iter().map(|p| self.predicate(p)).collect();
        format!(" WHERE {}", parts.join(" AND "))
    }
}

fn from_clause(stmt: &Statement) -> String {
    let mut out = quoted(&stmt.table);
    for j in &stmt.joins {
        out.push_str(&format!(
            " JOIN {} ON {} = {}",
            quoted(&j.key.table),
            qualified(&j.key),
            qualified(&j.parent)
        ));
    }
    out
}

fn returning_clause(stmt: &Statement) -> String {
    if stmt.returning.is_empty() {
        return String::new();
    }
    let cols: Vec<String> = stmt.returning.iter().map(|c| quoted(&c.column)).collect();
    format!(" RETURNING {}", cols.join(", "))
}

/// Render a statement. Identifiers come from declarations only; every value is a parameter.
pub fn render(stmt: &Statement) -> QueryBuf {
    let mut q = QueryBuf::new();
    q.sql = match stmt.kind {
        StatementKind::Select => {
            let cols: Vec<String> = stmt
                .columns
                .iter()
                .map(|c| match c.field_type {
                    // numeric columns decode as f64 only after a cast
                    FieldType::Float => format!("CAST({} AS DOUBLE PRECISION) AS {}", qualified(c), quoted(&c.column)),
                    _ => format!("{} AS {}", qualified(c), quoted(&c.column)),
                })
                .collect();
            let where_clause = q.where_clause(&stmt.predicates);
            let order_clause = if stmt.order.is_empty() {
                String::new()
            } else {
                let terms: Vec<String> = stmt
                    .order
                    .iter()
                    .map(|o| format!("{} {}", qualified(&o.column), o.direction.as_sql()))
                    .collect();
                format!(" ORDER BY {}", terms.join(", "))
            };
            let limit_clause = stmt.limit.map(|n| format!(" LIMIT {}", n)).unwrap_or_default();
            let offset_clause = stmt.offset.map(|n| format!(" OFFSET {}", n)).unwrap_or_default();
            format!(
                "SELECT {} FROM {}{}{}{}{}",
                cols.join(", "),
                from_clause(stmt),
                where_clause,
                order_clause,
                limit_clause,
                offset_clause
            )
        }
        StatementKind::Count => {
            let where_clause = q.where_clause(&stmt.predicates);
            format!("SELECT COUNT(*) AS \"count\" FROM {}{}", from_clause(stmt), where_clause)
        }
        StatementKind::Insert => {
            let table = quoted(&stmt.table);
            if stmt.columns.is_empty() {
                format!("INSERT INTO {} DEFAULT VALUES{}", table, returning_clause(stmt))
            } else {
                let cols: Vec<String> = stmt.columns.iter().map(|c| quoted(&c.column)).collect();
                let placeholders: Vec<String> = stmt
                    .columns
                    .iter()
                    .zip(&stmt.values)
                    .map(|(c, v)| q.placeholder(v.clone(), c.field_type))
                    .collect();
                format!(
                    "INSERT INTO {} ({}) VALUES ({}){}",
                    table,
                    cols.join(", "),
                    placeholders.join(", "),
                    returning_clause(stmt)
                )
            }
        }
        StatementKind::Update => {
            let sets: Vec<String> = stmt
                .columns
                .iter()
                .zip(&stmt.values)
                .map(|(c, v)| format!("{} = {}", quoted(&c.column), q.placeholder(v.clone(), c.field_type)))
                .collect();
            let where_clause = q.where_clause(&stmt.predicates);
            format!(
                "UPDATE {} SET {}{}{}",
                quoted(&stmt.table),
                sets.join(", "),
                where_clause,
                returning_clause(stmt)
            )
        }
        StatementKind::Delete => {
            let where_clause = q.where_clause(&stmt.predicates);
            format!(
                "DELETE FROM {}{}{}",
                quoted(&stmt.table),
                where_clause,
                returning_clause(stmt)
            )
        }
    };
    q
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Direction;
    use crate::sql::statement::{Join, Ordering};
    use serde_json::json;

    fn col(table: &str, column: &str, field_type: FieldType) -> ColumnRef {
        ColumnRef {
            table: table.into(),
            column: column.into(),
            field_type,
        }
    }

    fn select(predicates: Vec<Predicate>) -> Statement {
        Statement {
            kind: StatementKind::Select,
            table: "user".into(),
            joins: vec![],
            columns: vec![col("user", "id", FieldType::Int), col("user", "name", FieldType::String)],
            values: vec![],
            predicates,
            order: vec![Ordering {
                column: col("user", "id", FieldType::Int),
                direction: Direction::Asc,
            }],
            limit: Some(10),
            offset: Some(0),
            returning: vec![],
        }
    }

    #[test]
    fn hostile_values_are_bound_not_interpolated() {
        let hostile = "x'); DROP TABLE \"user\"; --";
        let stmt = select(vec![Predicate {
            column: col("user", "name", FieldType::String),
            operator: Operator::Eq,
            values: vec![json!(hostile)],
        }]);
        let q = render(&stmt);
        assert!(!q.sql.contains("DROP"));
        assert_eq!(q.params, vec![json!(hostile)]);
        assert_eq!(
            q.sql,
            "SELECT \"user\".\"id\" AS \"id\", \"user\".\"name\" AS \"name\" FROM \"user\" \
             WHERE \"user\".\"name\" = $1 ORDER BY \"user\".\"id\" ASC LIMIT 10 OFFSET 0"
        );
    }

    #[test]
    fn in_and_like_render_their_own_shapes() {
        let stmt = select(vec![
            Predicate {
                column: col("user", "id", FieldType::Int),
                operator: Operator::In,
                values: vec![json!(1), json!(2), json!(3)],
            },
            Predicate {
                column: col("user", "name", FieldType::String),
                operator: Operator::Like,
                values: vec![json!("Da%")],
            },
        ]);
        let q = render(&stmt);
        assert!(q.sql.contains("\"user\".\"id\" IN ($1, $2, $3)"));
        assert!(q.sql.contains("CAST(\"user\".\"name\" AS TEXT) LIKE $4"));
        assert_eq!(q.params.len(), 4);
    }

    #[test]
    fn typed_placeholders_get_casts() {
        let stmt = select(vec![Predicate {
            column: col("user", "born", FieldType::Date),
            operator: Operator::Gte,
            values: vec![json!("1990-01-01")],
        }]);
        assert!(render(&stmt).sql.contains("\"user\".\"born\" >= $1::date"));
    }

    #[test]
    fn joins_and_count_render() {
        let mut stmt = select(vec![]);
        stmt.kind = StatementKind::Count;
        stmt.joins.push(Join {
            key: col("user_profile", "user_id", FieldType::Int),
            parent: col("user", "id", FieldType::Int),
        });
        assert_eq!(
            render(&stmt).sql,
            "SELECT COUNT(*) AS \"count\" FROM \"user\" JOIN \"user_profile\" ON \"user_profile\".\"user_id\" = \"user\".\"id\""
        );
    }

    #[test]
    fn writes_render_with_returning() {
        let insert = Statement {
            kind: StatementKind::Insert,
            table: "user".into(),
            joins: vec![],
            columns: vec![col("user", "name", FieldType::String)],
            values: vec![json!("Ada")],
            predicates: vec![],
            order: vec![],
            limit: None,
            offset: None,
            returning: vec![col("user", "id", FieldType::Int)],
        };
        let q = render(&insert);
        assert_eq!(q.sql, "INSERT INTO \"user\" (\"name\") VALUES ($1) RETURNING \"id\"");

        let mut update = insert.clone();
        update.kind = StatementKind::Update;
        update.predicates.push(Predicate {
            column: col("user", "id", FieldType::Int),
            operator: Operator::Eq,
            values: vec![json!(4)],
        });
        let q = render(&update);
        assert_eq!(
            q.sql,
            "UPDATE \"user\" SET \"name\" = $1 WHERE \"user\".\"id\" = $2 RETURNING \"id\""
        );
        assert_eq!(q.params, vec![json!("Ada"), json!(4)]);

        let mut empty = insert;
        empty.columns.clear();
        empty.values.clear();
        assert_eq!(render(&empty).sql, "INSERT INTO \"user\" DEFAULT VALUES RETURNING \"id\"");
    }
}
