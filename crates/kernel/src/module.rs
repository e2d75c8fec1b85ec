use async_trait::async_trait;
use axum::Router;

use crate::settings::DatabaseBackend;

/// Context provided to modules during initialization
pub struct InitCtx<'a> {
    pub settings: &'a crate::settings::Settings,
}

/// Idempotent table bootstrap contributed by a module.
///
/// Each backend speaks its own DDL dialect, so a schema carries one statement
/// list per backend. Statements must be safe to re-run against an existing
/// store (`CREATE ... IF NOT EXISTS`).
#[derive(Debug, Clone)]
pub struct Schema {
    pub id: &'static str,
    pub sqlite: &'static [&'static str],
    pub mysql: &'static [&'static str],
}

impl Schema {
    /// Statements to run against the given backend, in order.
    pub fn statements(&self, backend: DatabaseBackend) -> &'static [&'static str] {
        match backend {
            DatabaseBackend::Sqlite => self.sqlite,
            DatabaseBackend::Mysql => self.mysql,
        }
    }
}

/// Core module trait that all bookshelf modules must implement
#[async_trait]
pub trait Module: Sync + Send {
    /// Unique name for this module
    fn name(&self) -> &'static str;

    /// Initialize the module with the provided context
    /// Called during application startup before the schema is applied
    async fn init(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Return the Axum router for this module's routes
    /// Routes will be mounted under `/{module_name}`
    fn routes(&self) -> Router {
        Router::new()
    }

    /// Return OpenAPI specification fragment for this module as JSON
    /// Will be merged with other modules' specs
    fn openapi(&self) -> Option<serde_json::Value> {
        None
    }

    /// Return the tables this module needs
    fn schema(&self) -> Vec<Schema> {
        vec![]
    }

    /// Called once the schema is in place, before the server accepts traffic
    async fn start(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Stop the module and clean up resources
    /// Called during application shutdown
    async fn stop(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
