//! Driver registry keyed by dialect name

use rawstage_core::{DatabaseDriver, LoaderConfig, RawstageError, Result, SqlOperations};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of available warehouse drivers
pub struct DriverRegistry {
    drivers: HashMap<String, Arc<dyn DatabaseDriver>>,
}

impl DriverRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            drivers: HashMap::new(),
        }
    }

    /// Create a registry with all built-in drivers registered
    pub fn with_defaults() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::new();

        #[cfg(feature = "redshift")]
        registry.register(Arc::new(crate::redshift::RedshiftDriver::new()));

        registry
    }

    pub fn register(&mut self, driver: Arc<dyn DatabaseDriver>) {
        let name = driver.name().to_string();
        tracing::info!(driver = %name, "registering warehouse driver");
        self.drivers.insert(name, driver);
    }

    /// Get a driver by name, case-insensitively
    pub fn get(&self, name: &str) -> Option<Arc<dyn DatabaseDriver>> {
        let driver = self.drivers.get(&name.to_lowercase()).cloned();
        if driver.is_none() {
            tracing::warn!(driver = %name, "driver not found in registry");
        }
        driver
    }

    /// List all registered driver names, sorted
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.drivers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn has(&self, name: &str) -> bool {
        self.drivers.contains_key(&name.to_lowercase())
    }

    /// The driver for `dialect`, or a configuration error naming the
    /// registered ones
    pub fn driver_for(&self, dialect: &str) -> Result<Arc<dyn DatabaseDriver>> {
        self.get(dialect).ok_or_else(|| {
            RawstageError::Configuration(format!(
                "unknown dialect {:?} (available: {})",
                dialect,
                self.list().join(", ")
            ))
        })
    }

    /// Build the `SqlOperations` selected by `config.dialect`
    pub fn sql_operations(&self, config: &LoaderConfig) -> Result<Arc<dyn SqlOperations>> {
        let driver = self.driver_for(&config.dialect)?;
        tracing::debug!(dialect = %driver.name(), "selected SQL operations");
        Ok(driver.sql_operations(config))
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
