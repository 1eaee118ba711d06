use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;

use crate::catalog::InMemoryCatalog;
use crate::config::{ConfigError, SchedulerConfig};
use crate::engine::Engine;
use crate::limits::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenantError {
    EmptyName,
    NameTooLong,
    TooManyTenants,
    Config(ConfigError),
}

impl fmt::Display for TenantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TenantError::EmptyName => write!(f, "empty network name"),
            TenantError::NameTooLong => write!(f, "network name too long"),
            TenantError::TooManyTenants => write!(f, "too many networks"),
            TenantError::Config(e) => write!(f, "invalid scheduler config: {e}"),
        }
    }
}

impl std::error::Error for TenantError {}

/// One engine per screen network. Network = database name from the pgwire
/// connection. All networks share the content catalog and scheduler config.
pub struct TenantManager {
    engines: DashMap<String, Arc<Engine>>,
    catalog: Arc<InMemoryCatalog>,
    config: SchedulerConfig,
}

impl TenantManager {
    pub fn new(config: SchedulerConfig, catalog: Arc<InMemoryCatalog>) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            engines: DashMap::new(),
            catalog,
            config,
        })
    }

    pub fn catalog(&self) -> &Arc<InMemoryCatalog> {
        &self.catalog
    }

    /// Get or lazily create the engine for `tenant`.
    pub fn get_or_create(&self, tenant: &str) -> Result<Arc<Engine>, TenantError> {
        if let Some(engine) = self.engines.get(tenant) {
            return Ok(engine.value().clone());
        }
        if tenant.is_empty() {
            return Err(TenantError::EmptyName);
        }
        if tenant.len() > MAX_TENANT_NAME_LEN {
            return Err(TenantError::NameTooLong);
        }
        if self.engines.len() >= MAX_TENANTS {
            return Err(TenantError::TooManyTenants);
        }

        let engine = self
            .engines
            .entry(tenant.to_string())
            .or_try_insert_with(|| {
                let engine = Engine::in_memory(self.config.clone(), self.catalog.clone())
                    .map_err(TenantError::Config)?;
                tracing::info!("network {tenant}: engine created");
                Ok(Arc::new(engine))
            })?
            .clone();
        metrics::gauge!(crate::observability::TENANTS_ACTIVE).set(self.engines.len() as f64);
        Ok(engine)
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}
