//! Request executor: Created -> Validated -> QueryBuilt -> Executed -> Shaped -> Done, or
//! Failed(kind) from any step.

use crate::auth::Authorizer;
use crate::config::{EngineOptions, NestedRead, ResourceDescriptor};
use crate::error::{AppError, ConfigError, ErrorKind};
use crate::query::{Operation, ValidatedRequest};
use crate::registry::{FunctionCall, Registry};
use crate::request::RequestContext;
use crate::service::params::validate_request;
use crate::service::shaper::{
    collapse_nested, created_echo, empty_nested, nested_request, project_fields, Meta, Outcome,
};
use crate::sql::{plan_count, plan_deletes, plan_inserts, plan_select, plan_updates, ColumnRef, Statement, StatementKind};
use crate::store::{Row, Store, StoreTransaction};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Created,
    Validated,
    QueryBuilt,
    Executed,
    Shaped,
    Done,
    Failed(ErrorKind),
}

/// Statements for one request.
enum Plan {
    Read { select: Statement, count: Option<Statement> },
    Create(Vec<Statement>),
    Update(Vec<Statement>),
    Delete(Vec<Statement>),
}

/// Store output for one request.
enum Executed {
    Rows { rows: Vec<Row>, count: Option<u64> },
    Created(Value),
    Written,
}

type BoxedRun<'b> = Pin<Box<dyn Future<Output = Result<Outcome, AppError>> + Send + 'b>>;

/// Runs one request. Nested reads run through a fresh executor one level deeper.
pub struct Executor<'a> {
    registry: &'a Registry,
    store: &'a dyn Store,
    authorizer: &'a dyn Authorizer,
    options: &'a EngineOptions,
    depth: usize,
    phase: Phase,
}

impl<'a> Executor<'a> {
    pub fn new(
        registry: &'a Registry,
        store: &'a dyn Store,
        authorizer: &'a dyn Authorizer,
        options: &'a EngineOptions,
    ) -> Self {
        Executor {
            registry,
            store,
            authorizer,
            options,
            depth: 0,
            phase: Phase::Created,
        }
    }

    fn child(&self) -> Self {
        Executor {
            registry: self.registry,
            store: self.store,
            authorizer: self.authorizer,
            options: self.options,
            depth: self.depth + 1,
            phase: Phase::Created,
        }
    }

    fn advance(&mut self, next: Phase, resource: &str) {
        tracing::trace!(resource = %resource, from = ?self.phase, to = ?next, depth = self.depth, "phase");
        self.phase = next;
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Boxed so nested reads can recurse.
    pub fn run<'b>(mut self, request: &'b RequestContext) -> BoxedRun<'b>
    where
        'a: 'b,
    {
        Box::pin(async move { self.drive(request).await })
    }

    /// Run every phase, ending in Done or Failed(kind).
    pub async fn drive(&mut self, request: &RequestContext) -> Result<Outcome, AppError> {
        match self.run_phases(request).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.advance(Phase::Failed(e.kind()), &request.resource);
                match e.kind() {
                    ErrorKind::Config | ErrorKind::Storage => {
                        tracing::error!(resource = %request.resource, method = %request.method, error = %e, "request failed")
                    }
                    _ => {
                        tracing::warn!(resource = %request.resource, method = %request.method, error = %e, "request rejected")
                    }
                }
                Err(e)
            }
        }
    }

    async fn run_phases(&mut self, request: &RequestContext) -> Result<Outcome, AppError> {
        if self.depth > self.options.max_nesting_depth {
            return Err(ConfigError::NestingTooDeep(self.options.max_nesting_depth).into());
        }
        let described = self.registry.describe(&request.resource).await?;
        let descriptor = described.descriptor.as_ref();

        let requirement = described.resource.auth_requirement(request);
        if requirement.required {
            self.authorizer
                .verify(request.credentials.as_deref(), &requirement.scopes)
                .await?;
        }

        if let Some(name) = &request.function {
            let function = descriptor
                .functions
                .get(name)
                .ok_or_else(|| AppError::NotFound(format!("function '{}' on {}", name, descriptor.name)))?;
            let response = function
                .invoke(FunctionCall {
                    descriptor,
                    request,
                    store: self.store,
                })
                .await?;
            self.advance(Phase::Done, &descriptor.name);
            return Ok(Outcome::ok(response));
        }

        let validated = validate_request(descriptor, request, self.options.strict_parameters)?;
        self.advance(Phase::Validated, &descriptor.name);

        let plan = build(descriptor, &validated)?;
        self.advance(Phase::QueryBuilt, &descriptor.name);

        let executed = self.execute(descriptor, plan).await?;
        self.advance(Phase::Executed, &descriptor.name);

        let outcome = self.shape(descriptor, request, &validated, executed).await?;
        self.advance(Phase::Shaped, &descriptor.name);
        self.advance(Phase::Done, &descriptor.name);
        Ok(outcome)
    }

    async fn execute(&self, descriptor: &ResourceDescriptor, plan: Plan) -> Result<Executed, AppError> {
        match plan {
            Plan::Read { select, count } => {
                tracing::debug!(resource = %descriptor.name, statement = ?select, "select");
                let rows = self.store.fetch_all(&select).await?;
                let count = match count {
                    Some(stmt) => Some(self.store.fetch_count(&stmt).await?),
                    None => None,
                };
                Ok(Executed::Rows { rows, count })
            }
            Plan::Create(statements) => self.in_transaction(descriptor, statements, true).await,
            Plan::Update(statements) | Plan::Delete(statements) => {
                self.in_transaction(descriptor, statements, false).await
            }
        }
    }

    /// Run writes as a unit: commit when all succeed, roll back otherwise.
    async fn in_transaction(
        &self,
        descriptor: &ResourceDescriptor,
        statements: Vec<Statement>,
        creating: bool,
    ) -> Result<Executed, AppError> {
        let mut tx = self.store.begin().await?;
        match write_all(descriptor, tx.as_mut(), statements, creating).await {
            Ok(executed) => {
                tx.commit().await?;
                Ok(executed)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::error!(resource = %descriptor.name, error = %rollback, "rollback failed");
                }
                Err(e)
            }
        }
    }

    async fn shape(
        &self,
        descriptor: &ResourceDescriptor,
        request: &RequestContext,
        validated: &ValidatedRequest,
        executed: Executed,
    ) -> Result<Outcome, AppError> {
        match (&validated.operation, executed) {
            (Operation::ReadOne { .. }, Executed::Rows { rows, .. }) => {
                let row = rows
                    .first()
                    .ok_or_else(|| AppError::NotFound(format!("{} record", descriptor.name)))?;
                Ok(Outcome::ok(self.shape_row(descriptor, request, validated, row).await?))
            }
            (Operation::ReadMany { pagination }, Executed::Rows { rows, count }) => {
                let mut items = Vec::with_capacity(rows.len());
                for row in &rows {
                    items.push(self.shape_row(descriptor, request, validated, row).await?);
                }
                Ok(Outcome {
                    status: 200,
                    response: Some(Value::Array(items)),
                    meta: Some(Meta {
                        count: count.unwrap_or(rows.len() as u64),
                        offset: pagination.offset,
                        limit: pagination.limit,
                    }),
                })
            }
            (Operation::Create { values }, Executed::Created(id)) => Ok(Outcome {
                status: 201,
                response: Some(created_echo(descriptor, id, values)),
                meta: None,
            }),
            (Operation::Delete { .. }, Executed::Written) => Ok(Outcome::status_only(self.options.delete_status)),
            (Operation::Update { .. }, Executed::Written) => Ok(Outcome::status_only(200)),
            _ => Err(ConfigError::Validation(format!("{}: request and result do not match", descriptor.name)).into()),
        }
    }

    async fn shape_row(
        &self,
        descriptor: &ResourceDescriptor,
        request: &RequestContext,
        validated: &ValidatedRequest,
        row: &Row,
    ) -> Result<Value, AppError> {
        let mut out = project_fields(descriptor, row, &validated.projection);
        for selection in &validated.projection {
            let Some(nested) = descriptor.nested(&selection.alias) else { continue };
            let value = match nested_request(descriptor, request, nested, selection, row) {
                None => empty_nested(nested.multiple),
                Some(child) => {
                    self.ensure_bound(descriptor, nested).await?;
                    let outcome = self.child().run(&child).await?;
                    collapse_nested(nested.multiple, outcome.response)
                }
            };
            out.insert(selection.alias.clone(), value);
        }
        Ok(Value::Object(out))
    }

    /// Every injected parameter must land on a condition of the target, or the nested read
    /// would come back unfiltered.
    async fn ensure_bound(&self, parent: &ResourceDescriptor, nested: &NestedRead) -> Result<(), AppError> {
        let target = self.registry.describe(&nested.resource).await?;
        match nested
            .parameters
            .iter()
            .find(|(key, _)| !target.descriptor.filterable.contains_key(key))
        {
            Some((key, _)) => Err(ConfigError::MissingReference {
                resource: parent.name.clone(),
                kind: "condition",
                id: format!("{}.{}", nested.resource, key),
            }
            .into()),
            None => Ok(()),
        }
    }
}

fn build(descriptor: &ResourceDescriptor, validated: &ValidatedRequest) -> Result<Plan, ConfigError> {
    Ok(match &validated.operation {
        Operation::ReadOne { .. } => Plan::Read {
            select: plan_select(descriptor, validated)?,
            count: None,
        },
        Operation::ReadMany { .. } => Plan::Read {
            select: plan_select(descriptor, validated)?,
            count: Some(plan_count(descriptor, validated)?),
        },
        Operation::Create { values } => Plan::Create(plan_inserts(descriptor, values)?),
        Operation::Update { id, values } => Plan::Update(plan_updates(descriptor, id, values)?),
        Operation::Delete { id } => Plan::Delete(plan_deletes(descriptor, id)),
    })
}

/// Execute write statements in order. Inserts propagate the generated identity into later
/// tables' key columns. An update touching no row, or a delete missing the primary row, is NotFound.
async fn write_all(
    descriptor: &ResourceDescriptor,
    tx: &mut dyn StoreTransaction,
    statements: Vec<Statement>,
    creating: bool,
) -> Result<Executed, AppError> {
    let identity = descriptor.identity();
    let primary = descriptor.primary_table().name.as_str();
    let mut id: Option<Value> = None;
    for mut stmt in statements {
        if creating {
            if let Some(id) = &id {
                let table = descriptor
                    .tables
                    .iter()
                    .find(|t| t.name == stmt.table)
                    .ok_or_else(|| ConfigError::MissingReference {
                        resource: descriptor.name.clone(),
                        kind: "table",
                        id: stmt.table.clone(),
                    })?;
                stmt.set_value(ColumnRef::of(table, table.key()), id.clone());
            }
        }
        tracing::debug!(resource = %descriptor.name, statement = ?stmt, "write");
        let rows = tx.execute(&stmt).await?;
        if creating {
            if id.is_none() {
                id = rows.first().and_then(|r| r.get(&identity.column)).cloned();
            }
        } else if rows.is_empty() && (stmt.kind == StatementKind::Update || stmt.table == primary) {
            return Err(AppError::NotFound(format!("{} record", descriptor.name)));
        }
    }
    if creating {
        return Ok(Executed::Created(id.unwrap_or(Value::Null)));
    }
    Ok(Executed::Written)
}
