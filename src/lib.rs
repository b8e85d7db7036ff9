//! Resource engine: declarative REST resources over SQL.
//!
//! A resource names its backing tables, the aliases it exposes, and which aliases can be
//! filtered, ordered, created and updated. Requests are validated against that declaration,
//! compiled into parameterized statements, run on a [`store::Store`], and shaped back into
//! alias-keyed objects, with nested resources expanded per row.

pub mod auth;
pub mod config;
pub mod engine;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod query;
pub mod registry;
pub mod request;
pub mod response;
pub mod routes;
pub mod service;
pub mod sql;
pub mod state;
pub mod store;
pub mod telemetry;

pub use auth::{AllowAll, AuthRequirement, Authorizer, StaticTokens};
pub use config::{load_resources_file, load_resources_json, resolve, EngineOptions, ResourceConfig, ResourceDescriptor};
pub use engine::Engine;
pub use error::{AppError, AuthError, ConfigError, ErrorKind, StoreError};
pub use registry::{ConfiguredResource, FunctionCall, Registry, Resource, ResourceFunction};
pub use request::{Method, ParamValue, RequestContext};
pub use response::ResultObject;
pub use routes::{common_routes, common_routes_with_ready, resource_routes};
pub use state::AppState;
pub use store::{MemoryStore, PgStore, Row, Store, StoreTransaction};
