mod common;

use common::{engine, engine_with, read};
use resource_engine::{
    AllowAll, EngineOptions, Engine, ErrorKind, MemoryStore, Registry, RequestContext, ResourceConfig,
};
use serde_json::{json, Value};
use std::sync::Arc;

fn names(response: &Option<Value>) -> Vec<String> {
    response
        .as_ref()
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .filter_map(|r| r["name"].as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

#[tokio::test]
async fn single_read_projects_requested_aliases() {
    let (engine, _) = engine().await;
    let req = read("users", &[("fields", "name,token")]).with_id("1");
    let out = engine.execute(&req).await.unwrap();
    assert_eq!(out.status, 200);
    assert_eq!(out.response, Some(json!({ "name": "Name1", "token": "AccessToken1" })));
    assert!(out.meta.is_none());
}

#[tokio::test]
async fn multi_read_pages_and_counts() {
    let (engine, _) = engine().await;
    let req = read("users", &[("fields", "name"), ("limit", "2"), ("offset", "1")]);
    let out = engine.execute(&req).await.unwrap();
    assert_eq!(out.response, Some(json!([{ "name": "Name2" }, { "name": "Name3" }])));
    let meta = out.meta.unwrap();
    assert_eq!((meta.count, meta.offset, meta.limit), (4, 1, 2));
}

#[tokio::test]
async fn default_projection_leaves_out_non_default_aliases() {
    let (engine, _) = engine().await;
    let out = engine.execute(&read("users", &[("limit", "1")])).await.unwrap();
    assert_eq!(out.response, Some(json!([{ "id": 1, "name": "Name1", "rank": 1 }])));
}

#[tokio::test]
async fn nested_resource_reads_the_matching_subset() {
    let (engine, _) = engine().await;
    let req = read("countries", &[("fields", "code,langs")]).with_id("USA");
    let out = engine.execute(&req).await.unwrap();
    assert_eq!(
        out.response,
        Some(json!({
            "code": "USA",
            "langs": [
                { "language": "English", "official": "T" },
                { "language": "Spanish", "official": "F" }
            ]
        }))
    );
}

#[tokio::test]
async fn nested_literals_and_sub_fields() {
    let (engine, _) = engine().await;
    let req = read("countries", &[("fields", "code,officialLangs(language)")]);
    let out = engine.execute(&req).await.unwrap();
    assert_eq!(
        out.response,
        Some(json!([
            { "code": "ATA", "officialLangs": [] },
            { "code": "NLD", "officialLangs": [{ "language": "Dutch" }] },
            { "code": "USA", "officialLangs": [{ "language": "English" }] }
        ]))
    );
}

#[tokio::test]
async fn single_nested_relations_are_objects_or_null() {
    let (engine, _) = engine().await;
    let out = engine
        .execute(&read("users", &[("fields", "name,rankInfo(title)")]).with_id("1"))
        .await
        .unwrap();
    assert_eq!(out.response, Some(json!({ "name": "Name1", "rankInfo": { "title": "Admiral" } })));

    // Name3 has no rank: nothing to look up.
    let out = engine
        .execute(&read("users", &[("fields", "name,rankInfo")]).with_id("3"))
        .await
        .unwrap();
    assert_eq!(out.response, Some(json!({ "name": "Name3", "rankInfo": null })));
}

#[tokio::test]
async fn operators_filter_rows() {
    let (engine, _) = engine().await;
    let out = engine.execute(&read("users", &[("rank", "gt(1)")])).await.unwrap();
    assert_eq!(names(&out.response), ["Name2"]);

    let out = engine.execute(&read("users", &[("rank", "in(1,2)")])).await.unwrap();
    assert_eq!(names(&out.response), ["Name1", "Name2", "Name4"]);
    assert_eq!(out.meta.unwrap().count, 3);

    let out = engine.execute(&read("users", &[("name", "like(Name_)")])).await.unwrap();
    assert_eq!(out.meta.unwrap().count, 4);

    let out = engine.execute(&read("users", &[("name", "Name4")])).await.unwrap();
    assert_eq!(names(&out.response), ["Name4"]);
}

#[tokio::test]
async fn repeated_keys_mean_in() {
    let (engine, _) = engine().await;
    let req = resource_engine::RequestContext::new(resource_engine::Method::Read, "users").with_parameters(
        resource_engine::request::parameters_from_pairs(vec![
            ("rank".to_string(), "2".to_string()),
            ("rank".to_string(), "1".to_string()),
            ("fields".to_string(), "name".to_string()),
        ]),
    );
    let out = engine.execute(&req).await.unwrap();
    assert_eq!(names(&out.response), ["Name1", "Name2", "Name4"]);
}

#[tokio::test]
async fn order_terms_apply_before_the_identity() {
    let (engine, _) = engine().await;
    let out = engine
        .execute(&read("users", &[("fields", "name"), ("order", "-name")]))
        .await
        .unwrap();
    assert_eq!(names(&out.response), ["Name4", "Name3", "Name2", "Name1"]);

    // Nulls last, ties broken by id.
    let out = engine
        .execute(&read("users", &[("fields", "name"), ("order", "rank")]))
        .await
        .unwrap();
    assert_eq!(names(&out.response), ["Name1", "Name4", "Name2", "Name3"]);
}

#[tokio::test]
async fn hostile_values_are_data() {
    let (engine, store) = engine().await;
    for hostile in ["x' OR '1'='1", "Name1; DROP TABLE user; --", "\"name\" = \"name\""] {
        let out = engine.execute(&read("users", &[("name", hostile)])).await.unwrap();
        assert_eq!(out.response, Some(json!([])));
        assert_eq!(out.meta.unwrap().count, 0);
    }
    assert_eq!(store.rows("user").await.len(), 4);
}

#[tokio::test]
async fn only_declared_aliases_are_accepted() {
    let (engine, _) = engine().await;
    let cases: &[&[(&str, &str)]] = &[
        &[("fields", "password")],
        &[("fields", "name(first)")],
        &[("order", "token")],
        &[("rank", "like(1%)")],
        &[("rank", "between(1,2)")],
        &[("rank", "abc")],
        &[("limit", "-1")],
        &[("offset", "ten")],
    ];
    for pairs in cases {
        let err = engine.execute(&read("users", pairs)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation, "{:?}", pairs);
    }
}

#[tokio::test]
async fn unknown_condition_keys_depend_on_strictness() {
    let (engine, _) = engine().await;
    let out = engine.execute(&read("users", &[("token", "AccessToken1")])).await.unwrap();
    assert_eq!(out.meta.unwrap().count, 4);

    let options = EngineOptions {
        strict_parameters: true,
        ..EngineOptions::default()
    };
    let (strict, _) = engine_with(options, Arc::new(AllowAll)).await;
    let err = strict.execute(&read("users", &[("token", "AccessToken1")])).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    // Reserved keys are never conditions.
    assert!(strict.execute(&read("users", &[("limit", "2")])).await.is_ok());
}

#[tokio::test]
async fn projection_is_idempotent() {
    let (engine, _) = engine().await;
    let once = engine.execute(&read("users", &[("fields", "name,rank")])).await.unwrap();
    let twice = engine.execute(&read("users", &[("fields", "name,rank,name")])).await.unwrap();
    assert_eq!(once, twice);
}

#[tokio::test]
async fn limits_are_clamped() {
    let (engine, _) = engine().await;
    let out = engine.execute(&read("users", &[("limit", "1000")])).await.unwrap();
    assert_eq!(out.meta.unwrap().limit, 25);
    assert_eq!(out.response.unwrap().as_array().unwrap().len(), 4);

    let out = engine.execute(&read("users", &[("limit", "0")])).await.unwrap();
    assert_eq!(out.response.unwrap().as_array().unwrap().len(), 1);

    let out = engine.execute(&read("users", &[("offset", "10")])).await.unwrap();
    assert_eq!(out.response, Some(json!([])));
    assert_eq!(out.meta.unwrap().count, 4);
}

#[tokio::test]
async fn missing_things_are_not_found() {
    let (engine, _) = engine().await;
    let err = engine.execute(&read("ghosts", &[])).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = engine.execute(&read("users", &[]).with_id("99")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = engine.execute(&read("users", &[]).with_id("abc")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn functions_replace_the_default_read() {
    let (engine, _) = engine().await;
    let out = engine.execute(&read("ranks", &[]).with_function("count")).await.unwrap();
    assert_eq!(out.response, Some(json!({ "count": 2 })));

    let out = engine
        .execute(&read("ranks", &[("title", "Captain")]).with_function("count"))
        .await
        .unwrap();
    assert_eq!(out.response, Some(json!({ "count": 1 })));

    let err = engine.execute(&read("ranks", &[]).with_function("purge")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn self_nesting_stops_at_the_depth_limit() {
    let cfg: ResourceConfig = serde_json::from_value(json!({
        "name": "nodes",
        "tables": [{ "name": "node", "fields": [
            { "alias": "id", "column": "id", "type": "int" },
            { "alias": "parent", "column": "parent", "type": "int" }
        ]}],
        "read": [
            { "alias": "id" },
            { "alias": "child", "resource": "nodes", "parameters": { "parent": { "value_of": "id" } } }
        ]
    }))
    .unwrap();
    let store = MemoryStore::new();
    store.create_table("node", &["id", "parent"], &[]).await;
    store.seed("node", vec![json!({ "id": 1, "parent": 1 })]).await.unwrap();
    let options = EngineOptions {
        max_nesting_depth: 3,
        ..EngineOptions::default()
    };
    let engine = Engine::new(Registry::from_configs(vec![cfg], true), Arc::new(store), Arc::new(AllowAll), options);
    let err = engine.execute(&RequestContext::new(resource_engine::Method::Read, "nodes")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
}

#[tokio::test]
async fn handle_wraps_outcomes_in_the_envelope() {
    let (engine, _) = engine().await;
    let result = engine.handle(read("users", &[("fields", "name"), ("limit", "1")])).await;
    assert_eq!(
        result.body,
        json!({ "status": 200, "response": [{ "name": "Name1" }], "meta": { "count": 4, "offset": 0, "limit": 1 } })
    );

    let mut req = read("users", &[]).with_id("99");
    req.suppress_status_codes = true;
    let result = engine.handle(req).await;
    assert_eq!(result.status, 404);
    assert_eq!(result.transport_status(), axum::http::StatusCode::OK);
    assert_eq!(result.body["error"]["code"], "not_found");
}

/// `languages` that cannot be filtered by country, so `countries.langs` cannot bind its join.
fn unjoinable_languages() -> ResourceConfig {
    let mut cfg = common::languages_config();
    cfg.conditions = Some(serde_json::from_value(json!([{ "alias": "official" }])).unwrap());
    cfg
}

#[tokio::test]
async fn nested_join_keys_must_be_conditions_of_the_target() {
    for check_resource_validity in [true, false] {
        let store = common::seeded_store().await;
        let registry = Registry::from_configs(
            vec![common::countries_config(), unjoinable_languages()],
            check_resource_validity,
        );
        let options = EngineOptions {
            check_resource_validity,
            ..EngineOptions::default()
        };
        let engine = Engine::new(registry, Arc::new(store), Arc::new(AllowAll), options);
        let req = read("countries", &[("fields", "code,langs")]).with_id("USA");
        let err = engine.execute(&req).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config, "validity check {}", check_resource_validity);
    }
}

#[tokio::test]
async fn nested_lists_can_declare_their_page_size() {
    let mut countries = common::countries_config();
    let mut first = countries.read.as_ref().unwrap()[2].clone();
    first.alias = "firstLang".into();
    first.limit = Some(1);
    countries.read.as_mut().unwrap().push(first);

    let registry = Registry::from_configs(vec![countries, common::languages_config()], true);
    let engine = Engine::new(
        registry,
        Arc::new(common::seeded_store().await),
        Arc::new(AllowAll),
        EngineOptions::default(),
    );
    let req = read("countries", &[("fields", "code,firstLang(language),langs(language)")]).with_id("USA");
    let out = engine.execute(&req).await.unwrap();
    assert_eq!(
        out.response,
        Some(json!({
            "code": "USA",
            "firstLang": [{ "language": "English" }],
            "langs": [{ "language": "English" }, { "language": "Spanish" }]
        }))
    );
}
