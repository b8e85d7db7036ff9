//! Demo server: mounts the resource routes over PostgreSQL.
//!
//! Run from repo root: `cargo run -p example-consumer`
//! Reads `DATABASE_URL`, `RESOURCES_PATH`, `BIND_ADDR` and `AUTH_TOKENS` (`token=scope scope;...`).

use resource_engine::{
    common_routes_with_ready, load_resources_file, resource_routes, telemetry, AllowAll, AppState, Authorizer,
    Engine, EngineOptions, PgStore, StaticTokens,
};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    telemetry::init("resource_engine=info,example_consumer=info");

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "postgres://localhost/resources".into());
    let resources_path = std::env::var("RESOURCES_PATH").unwrap_or_else(|_| "resources.json".into());
    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".into());

    let store = PgStore::connect(&database_url, 5).await?;
    let configs = load_resources_file(&resources_path)?;
    let tokens = StaticTokens::parse(&std::env::var("AUTH_TOKENS").unwrap_or_default());
    let authorizer: Arc<dyn Authorizer> = if tokens.is_empty() {
        tracing::warn!("AUTH_TOKENS not set; every scope is granted");
        Arc::new(AllowAll)
    } else {
        Arc::new(tokens)
    };

    let options = EngineOptions::from_env();
    let engine = Engine::from_configs(configs, Arc::new(store), options).with_authorizer(authorizer);
    engine.warm_up().await?;

    let state = AppState::new(engine);
    let app = common_routes_with_ready(state.clone()).merge(resource_routes(state));
    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
