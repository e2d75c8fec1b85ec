use anyhow::Context;
use std::sync::Arc;

use crate::module::{InitCtx, Module, Schema};

/// Module registry for managing module lifecycle
pub struct ModuleRegistry {
    modules: Vec<Arc<dyn Module>>,
}

impl ModuleRegistry {
    /// Create a new module registry
    pub fn new() -> Self {
        Self {
            modules: Vec::new(),
        }
    }

    /// Register a module; modules start in registration order
    pub fn register(&mut self, module: Arc<dyn Module>) {
        self.modules.push(module);
    }

    /// Get all registered modules
    pub fn modules(&self) -> &[Arc<dyn Module>] {
        &self.modules
    }

    /// Get a module by name
    pub fn get_module(&self, name: &str) -> Option<&Arc<dyn Module>> {
        self.modules.iter().find(|module| module.name() == name)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Initialize modules in registration order
    pub async fn init_all(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!("initializing {} modules", self.modules.len());

        for module in &self.modules {
            tracing::info!(module = module.name(), "initializing module");

            module
                .init(ctx)
                .await
                .with_context(|| format!("failed to initialize module '{}'", module.name()))?;
        }

        Ok(())
    }

    /// Start modules in registration order
    pub async fn start_all(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!("starting {} modules", self.modules.len());

        for module in &self.modules {
            tracing::info!(module = module.name(), "starting module");

            module
                .start(ctx)
                .await
                .with_context(|| format!("failed to start module '{}'", module.name()))?;
        }

        Ok(())
    }

    /// Stop modules in reverse registration order
    pub async fn stop_all(&self) -> anyhow::Result<()> {
        tracing::info!("stopping {} modules", self.modules.len());

        for module in self.modules.iter().rev() {
            tracing::info!(module = module.name(), "stopping module");

            module
                .stop()
                .await
                .with_context(|| format!("failed to stop module '{}'", module.name()))?;
        }

        Ok(())
    }

    /// Collect the schema of every module, ordered by module name then schema id
    pub fn collect_schema(&self) -> Vec<(String, Schema)> {
        let mut schema = Vec::new();

        for module in &self.modules {
            for entry in module.schema() {
                schema.push((module.name().to_string(), entry));
            }
        }

        schema.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.id.cmp(b.1.id)));

        schema
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{DatabaseBackend, Settings};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TestModule {
        name: &'static str,
        stops: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl Module for TestModule {
        fn name(&self) -> &'static str {
            self.name
        }

        fn schema(&self) -> Vec<Schema> {
            vec![
                Schema {
                    id: "002_index",
                    sqlite: &["CREATE INDEX IF NOT EXISTS ix ON test (id);"],
                    mysql: &[],
                },
                Schema {
                    id: "001_init",
                    sqlite: &["CREATE TABLE IF NOT EXISTS test (id INTEGER);"],
                    mysql: &["CREATE TABLE IF NOT EXISTS test (id INT);"],
                },
            ]
        }

        async fn stop(&self) -> anyhow::Result<()> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn module(name: &'static str, stops: &Arc<AtomicUsize>) -> Arc<dyn Module> {
        Arc::new(TestModule {
            name,
            stops: stops.clone(),
        })
    }

    #[test]
    fn test_module_registry_creation() {
        let registry = ModuleRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.collect_schema().is_empty());
    }

    #[test]
    fn test_schema_collection_is_sorted() {
        let stops = Arc::new(AtomicUsize::new(0));
        let mut registry = ModuleRegistry::new();
        registry.register(module("zeta", &stops));
        registry.register(module("alpha", &stops));

        let schema = registry.collect_schema();
        let order: Vec<_> = schema
            .iter()
            .map(|(module, entry)| (module.as_str(), entry.id))
            .collect();
        assert_eq!(
            order,
            vec![
                ("alpha", "001_init"),
                ("alpha", "002_index"),
                ("zeta", "001_init"),
                ("zeta", "002_index"),
            ]
        );
        assert_eq!(schema[1].1.statements(DatabaseBackend::Mysql).len(), 0);
        assert_eq!(schema[0].1.statements(DatabaseBackend::Sqlite).len(), 1);
    }

    #[tokio::test]
    async fn test_module_lifecycle() {
        let stops = Arc::new(AtomicUsize::new(0));
        let mut registry = ModuleRegistry::new();
        let settings = Settings::default();
        let ctx = InitCtx {
            settings: &settings,
        };

        registry.register(module("test", &stops));
        assert!(registry.get_module("test").is_some());
        assert!(registry.get_module("missing").is_none());

        registry.init_all(&ctx).await.unwrap();
        registry.start_all(&ctx).await.unwrap();
        registry.stop_all().await.unwrap();

        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }
}
