//! Resource registry: a closed map from resource name to factory, populated at startup.
//! Each descriptor is built once on first use and shared read-only afterwards.

use crate::auth::AuthRequirement;
use crate::config::{resolve, FunctionTable, ReadKind, ResourceConfig, ResourceDescriptor};
use crate::error::{AppError, ConfigError};
use crate::request::RequestContext;
use crate::store::Store;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Arguments passed to a resource function.
pub struct FunctionCall<'a> {
    pub descriptor: &'a ResourceDescriptor,
    pub request: &'a RequestContext,
    pub store: &'a dyn Store,
}

/// A named custom operation that replaces the default build/execute pair.
#[async_trait]
pub trait ResourceFunction: Send + Sync {
    async fn invoke(&self, call: FunctionCall<'_>) -> Result<Value, AppError>;
}

/// A declared resource. `setup` produces the declaration the descriptor is resolved from.
pub trait Resource: Send + Sync {
    fn setup(&self) -> ResourceConfig;

    fn auth_requirement(&self, _request: &RequestContext) -> AuthRequirement {
        AuthRequirement::none()
    }

    fn functions(&self) -> Vec<(String, Arc<dyn ResourceFunction>)> {
        Vec::new()
    }
}

/// A resource declared entirely by configuration (e.g. a JSON resources file).
#[derive(Clone, Debug)]
pub struct ConfiguredResource {
    config: ResourceConfig,
}

impl ConfiguredResource {
    pub fn new(config: ResourceConfig) -> Self {
        ConfiguredResource { config }
    }
}

impl Resource for ConfiguredResource {
    fn setup(&self) -> ResourceConfig {
        self.config.clone()
    }

    fn auth_requirement(&self, request: &RequestContext) -> AuthRequirement {
        match self.config.auth.get(&request.method) {
            Some(scopes) => AuthRequirement::scopes(scopes.iter().cloned()),
            None => AuthRequirement::none(),
        }
    }
}

type Factory = Box<dyn Fn() -> Arc<dyn Resource> + Send + Sync>;

/// A built resource: its implementation plus resolved descriptor.
#[derive(Clone)]
pub struct Described {
    pub resource: Arc<dyn Resource>,
    pub descriptor: Arc<ResourceDescriptor>,
}

struct Entry {
    factory: Factory,
    built: OnceCell<Described>,
}

pub struct Registry {
    entries: HashMap<String, Entry>,
    check_resource_validity: bool,
}

impl Registry {
    pub fn new(check_resource_validity: bool) -> Self {
        Registry {
            entries: HashMap::new(),
            check_resource_validity,
        }
    }

    pub fn from_configs(configs: Vec<ResourceConfig>, check_resource_validity: bool) -> Self {
        configs
            .into_iter()
            .fold(Registry::new(check_resource_validity), |mut reg, cfg| {
                reg.register_config(cfg);
                reg
            })
    }

    /// Register a factory under `name`. A later registration with the same name replaces it.
    pub fn register<F, R>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> R + Send + Sync + 'static,
        R: Resource + 'static,
    {
        let factory: Factory = Box::new(move || Arc::new(factory()) as Arc<dyn Resource>);
        self.entries.insert(
            name.into(),
            Entry {
                factory,
                built: OnceCell::new(),
            },
        );
    }

    pub fn register_config(&mut self, config: ResourceConfig) {
        let name = config.name.clone();
        self.register(name, move || ConfiguredResource::new(config.clone()));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Resolve `name`, building its descriptor on first access. Concurrent first callers share
    /// one build.
    pub async fn describe(&self, name: &str) -> Result<Described, ConfigError> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| ConfigError::UnknownResource(name.to_string()))?;
        let built = entry
            .built
            .get_or_try_init(|| async { self.build(name, entry) })
            .await?;
        Ok(built.clone())
    }

    /// Build every registered resource; surfaces declaration errors at startup.
    pub async fn describe_all(&self) -> Result<(), ConfigError> {
        for name in self.entries.keys() {
            self.describe(name).await?;
        }
        Ok(())
    }

    /// Condition aliases of `target`. Uses the built descriptor when there is one, otherwise
    /// resolves the declaration without caching it.
    fn conditions_of(&self, target: &str) -> Result<HashSet<String>, ConfigError> {
        let entry = self
            .entries
            .get(target)
            .ok_or_else(|| ConfigError::UnknownResource(target.to_string()))?;
        if let Some(built) = entry.built.get() {
            return Ok(built.descriptor.filterable.keys().cloned().collect());
        }
        let config = (entry.factory)().setup();
        let descriptor = resolve(&config, FunctionTable::default(), false)?;
        Ok(descriptor.filterable.keys().cloned().collect())
    }

    fn build(&self, name: &str, entry: &Entry) -> Result<Described, ConfigError> {
        let resource = (entry.factory)();
        let config = resource.setup();
        if config.name != name {
            return Err(ConfigError::Validation(format!(
                "resource registered as '{}' declares name '{}'",
                name, config.name
            )));
        }
        let functions = FunctionTable(resource.functions().into_iter().collect());
        let descriptor = resolve(&config, functions, self.check_resource_validity)?;
        if self.check_resource_validity {
            for alias in &descriptor.read_order {
                let Some(ReadKind::Resource(nested)) = descriptor.readable.get(alias).map(|r| &r.kind) else {
                    continue;
                };
                if !self.contains(&nested.resource) {
                    return Err(ConfigError::MissingReference {
                        resource: name.to_string(),
                        kind: "resource",
                        id: nested.resource.clone(),
                    });
                }
                let conditions: HashSet<String> = if nested.resource == name {
                    descriptor.filterable.keys().cloned().collect()
                } else {
                    self.conditions_of(&nested.resource)?
                };
                if let Some((key, _)) = nested.parameters.iter().find(|(key, _)| !conditions.contains(key)) {
                    return Err(ConfigError::MissingReference {
                        resource: name.to_string(),
                        kind: "condition",
                        id: format!("{}.{}", nested.resource, key),
                    });
                }
            }
        }
        tracing::info!(resource = %name, "resource descriptor built");
        Ok(Described {
            resource,
            descriptor: Arc::new(descriptor),
        })
    }
}
