//! Shared fixtures: resources over an in-memory store seeded with a handful of rows.
#![allow(dead_code)]

use async_trait::async_trait;
use resource_engine::request::parameters_from_pairs;
use resource_engine::service::validate_request;
use resource_engine::sql::plan_count;
use resource_engine::{
    AllowAll, AppError, Authorizer, EngineOptions, Engine, FunctionCall, MemoryStore, Method, Registry, RequestContext,
    Resource, ResourceConfig, ResourceFunction,
};
use serde_json::{json, Value};
use std::sync::Arc;

pub fn users_config() -> ResourceConfig {
    serde_json::from_value(json!({
        "name": "users",
        "tables": [{ "name": "user", "fields": [
            { "alias": "id", "column": "id", "type": "int" },
            { "alias": "name", "column": "name" },
            { "alias": "token", "column": "token" },
            { "alias": "rank", "column": "rank", "type": "int" }
        ]}],
        "read": [
            { "alias": "id" }, { "alias": "name" },
            { "alias": "token", "default": false },
            { "alias": "rank" },
            { "alias": "rankInfo", "resource": "ranks", "default": false,
              "parameters": { "id": { "value_of": "rank" } } }
        ],
        "conditions": [
            { "alias": "name" },
            { "alias": "rank", "operators": ["eq", "gt", "lt", "in"] }
        ],
        "order": ["name", "rank"],
        "create": [
            { "alias": "name", "max_length": 20 },
            { "alias": "rank", "required": false }
        ],
        "update": [{ "alias": "name" }, { "alias": "rank" }],
        "auth": { "create": ["users:write"], "delete": ["users:admin"] }
    }))
    .unwrap()
}

pub fn ranks_config() -> ResourceConfig {
    serde_json::from_value(json!({
        "name": "ranks",
        "tables": [{ "name": "rank", "fields": [
            { "alias": "id", "column": "id", "type": "int" },
            { "alias": "title", "column": "title" }
        ]}]
    }))
    .unwrap()
}

pub fn countries_config() -> ResourceConfig {
    serde_json::from_value(json!({
        "name": "countries",
        "tables": [{ "name": "country", "fields": [
            { "alias": "code", "column": "Code" },
            { "alias": "name", "column": "Name" }
        ]}],
        "read": [
            { "alias": "code" }, { "alias": "name" },
            { "alias": "langs", "resource": "languages", "multiple": true, "default": false,
              "parameters": { "country": { "value_of": "code" } } },
            { "alias": "officialLangs", "resource": "languages", "multiple": true, "default": false,
              "parameters": { "country": { "value_of": "code" }, "official": "T" } }
        ]
    }))
    .unwrap()
}

pub fn languages_config() -> ResourceConfig {
    serde_json::from_value(json!({
        "name": "languages",
        "tables": [{ "name": "countrylanguage", "fields": [
            { "alias": "id", "column": "ID", "type": "int" },
            { "alias": "country", "column": "CountryCode" },
            { "alias": "language", "column": "Language" },
            { "alias": "official", "column": "IsOfficial" }
        ]}],
        "read": [
            { "alias": "language" }, { "alias": "official" },
            { "alias": "country", "default": false }
        ],
        "conditions": [{ "alias": "country" }, { "alias": "official" }]
    }))
    .unwrap()
}

/// Two tables per record: `account` holds the identity, `account_detail` is keyed by it.
pub fn accounts_config() -> ResourceConfig {
    serde_json::from_value(json!({
        "name": "accounts",
        "tables": [
            { "name": "account", "fields": [
                { "alias": "id", "column": "id", "type": "int" },
                { "alias": "email", "column": "email" }
            ]},
            { "name": "account_detail", "fields": [
                { "alias": "accountId", "column": "account_id", "type": "int" },
                { "alias": "bio", "column": "bio" },
                { "alias": "handle", "column": "handle" }
            ]}
        ],
        "read": [{ "alias": "id" }, { "alias": "email" }, { "alias": "bio" }, { "alias": "handle" }],
        "create": [
            { "alias": "email", "format": "email" },
            { "alias": "bio", "required": false },
            { "alias": "handle", "required": false }
        ],
        "update": [{ "alias": "email" }, { "alias": "bio" }, { "alias": "handle" }]
    }))
    .unwrap()
}

/// `GET /ranks/count`: number of ranks matching the request's conditions.
pub struct CountRanks;

#[async_trait]
impl ResourceFunction for CountRanks {
    async fn invoke(&self, call: FunctionCall<'_>) -> Result<Value, AppError> {
        let mut request = call.request.clone();
        request.method = Method::Read;
        request.function = None;
        let validated = validate_request(call.descriptor, &request, false)?;
        let count = call.store.fetch_count(&plan_count(call.descriptor, &validated)?).await?;
        Ok(json!({ "count": count }))
    }
}

/// Ranks declared in code, with one custom function.
pub struct Ranks;

impl Resource for Ranks {
    fn setup(&self) -> ResourceConfig {
        ranks_config()
    }

    fn functions(&self) -> Vec<(String, Arc<dyn ResourceFunction>)> {
        vec![("count".to_string(), Arc::new(CountRanks) as Arc<dyn ResourceFunction>)]
    }
}

pub async fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    store.create_table("user", &["id", "name", "token", "rank"], &["name"]).await;
    store
        .seed(
            "user",
            vec![
                json!({ "id": 1, "name": "Name1", "token": "AccessToken1", "rank": 1 }),
                json!({ "id": 2, "name": "Name2", "token": "AccessToken2", "rank": 2 }),
                json!({ "id": 3, "name": "Name3", "token": "AccessToken3", "rank": null }),
                json!({ "id": 4, "name": "Name4", "token": "AccessToken4", "rank": 1 }),
            ],
        )
        .await
        .unwrap();

    store.create_table("rank", &["id", "title"], &[]).await;
    store
        .seed(
            "rank",
            vec![json!({ "id": 1, "title": "Admiral" }), json!({ "id": 2, "title": "Captain" })],
        )
        .await
        .unwrap();

    store.create_table("country", &["Code", "Name"], &["Code"]).await;
    store
        .seed(
            "country",
            vec![
                json!({ "Code": "ATA", "Name": "Antarctica" }),
                json!({ "Code": "NLD", "Name": "Netherlands" }),
                json!({ "Code": "USA", "Name": "United States" }),
            ],
        )
        .await
        .unwrap();

    store
        .create_table("countrylanguage", &["ID", "CountryCode", "Language", "IsOfficial"], &[])
        .await;
    store
        .seed(
            "countrylanguage",
            vec![
                json!({ "ID": 1, "CountryCode": "USA", "Language": "English", "IsOfficial": "T" }),
                json!({ "ID": 2, "CountryCode": "USA", "Language": "Spanish", "IsOfficial": "F" }),
                json!({ "ID": 3, "CountryCode": "NLD", "Language": "Dutch", "IsOfficial": "T" }),
                json!({ "ID": 4, "CountryCode": "NLD", "Language": "Frisian", "IsOfficial": "F" }),
            ],
        )
        .await
        .unwrap();

    store.create_table("account", &["id", "email"], &["email"]).await;
    store.create_table("account_detail", &["account_id", "bio", "handle"], &["handle"]).await;
    store
        .seed("account", vec![json!({ "id": 1, "email": "ada@example.com" })])
        .await
        .unwrap();
    store
        .seed(
            "account_detail",
            vec![json!({ "account_id": 1, "bio": "math", "handle": "ada" })],
        )
        .await
        .unwrap();
    store
}

pub fn registry(check_resource_validity: bool) -> Registry {
    let mut registry = Registry::from_configs(
        vec![users_config(), countries_config(), languages_config(), accounts_config()],
        check_resource_validity,
    );
    registry.register("ranks", || Ranks);
    registry
}

pub async fn engine_with(options: EngineOptions, authorizer: Arc<dyn Authorizer>) -> (Engine, MemoryStore) {
    let store = seeded_store().await;
    let engine = Engine::new(
        registry(options.check_resource_validity),
        Arc::new(store.clone()),
        authorizer,
        options,
    );
    (engine, store)
}

pub async fn engine() -> (Engine, MemoryStore) {
    engine_with(EngineOptions::default(), Arc::new(AllowAll)).await
}

pub fn request(method: Method, resource: &str, pairs: &[(&str, &str)]) -> RequestContext {
    RequestContext::new(method, resource)
        .with_parameters(parameters_from_pairs(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string()))))
}

pub fn read(resource: &str, pairs: &[(&str, &str)]) -> RequestContext {
    request(Method::Read, resource, pairs)
}

/// Write request with a JSON object body.
pub fn write(method: Method, resource: &str, body: Value) -> RequestContext {
    let mut ctx = RequestContext::new(method, resource);
    if let Value::Object(map) = body {
        for (k, v) in map {
            ctx = ctx.with_param(k, v);
        }
    }
    ctx
}
