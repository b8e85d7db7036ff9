//! Engine facade: the registry, a store, an authorizer and the options, shared by every request.

use crate::auth::{AllowAll, Authorizer};
use crate::config::{EngineOptions, ResourceConfig};
use crate::error::AppError;
use crate::registry::Registry;
use crate::request::RequestContext;
use crate::response::ResultObject;
use crate::service::{Executor, Outcome};
use crate::store::Store;
use std::sync::Arc;

#[derive(Clone)]
pub struct Engine {
    registry: Arc<Registry>,
    store: Arc<dyn Store>,
    authorizer: Arc<dyn Authorizer>,
    options: EngineOptions,
}

impl Engine {
    pub fn new(registry: Registry, store: Arc<dyn Store>, authorizer: Arc<dyn Authorizer>, options: EngineOptions) -> Self {
        Engine {
            registry: Arc::new(registry),
            store,
            authorizer,
            options,
        }
    }

    /// Engine over declarative configs with no authorization.
    pub fn from_configs(configs: Vec<ResourceConfig>, store: Arc<dyn Store>, options: EngineOptions) -> Self {
        let registry = Registry::from_configs(configs, options.check_resource_validity);
        Engine::new(registry, store, Arc::new(AllowAll), options)
    }

    pub fn with_authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = authorizer;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Build every registered descriptor up front so config mistakes surface at startup.
    pub async fn warm_up(&self) -> Result<(), AppError> {
        self.registry.describe_all().await?;
        Ok(())
    }

    /// Run one request.
    pub async fn execute(&self, request: &RequestContext) -> Result<Outcome, AppError> {
        Executor::new(
            &self.registry,
            self.store.as_ref(),
            self.authorizer.as_ref(),
            &self.options,
        )
        .run(request)
        .await
    }

    /// Run one request and wrap the outcome or error in the output envelope. Never fails.
    pub async fn handle(&self, request: RequestContext) -> ResultObject {
        let result = match self.execute(&request).await {
            Ok(outcome) => ResultObject::from_outcome(outcome),
            Err(e) => ResultObject::from_error(&e),
        };
        result.suppressed(request.suppress_status_codes)
    }
}
