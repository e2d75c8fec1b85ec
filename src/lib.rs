//! Bookshelf application library
//!
//! Wires the books module, the health report and the shared database pool
//! into one HTTP service.

use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use bookshelf_db::Database;
use bookshelf_kernel::settings::Settings;
use bookshelf_kernel::{InitCtx, ModuleRegistry};

pub mod health;
pub mod modules;

use health::HealthReport;
use modules::books::repository::{self, BookRepository};

/// A bootstrapped service: settings, the pool and the registered modules.
pub struct Service {
    settings: Arc<Settings>,
    database: Database,
    registry: ModuleRegistry,
    books: Arc<dyn BookRepository>,
}

impl Service {
    /// Open the pool, register and initialize modules, create missing tables
    /// when `database.create_schema` is set, then start modules.
    ///
    /// A store that cannot be reached does not prevent startup; the health
    /// report shows it as unhealthy instead.
    pub async fn bootstrap(settings: Settings) -> anyhow::Result<Self> {
        let settings = Arc::new(settings);
        let database =
            Database::connect(&settings.database).context("failed to configure database pool")?;
        let books = repository::for_database(&database);

        let mut registry = ModuleRegistry::new();
        modules::register_all(&mut registry, books.clone());

        let service = Self {
            settings,
            database,
            registry,
            books,
        };

        let ctx = InitCtx {
            settings: &service.settings,
        };
        service.registry.init_all(&ctx).await?;

        if service.settings.database.create_schema {
            if let Err(err) = service.apply_schema().await {
                tracing::error!(error = ?err, "schema bootstrap failed, continuing without it");
            }
        }

        service.registry.start_all(&ctx).await?;

        tracing::info!(
            modules = service.registry.len(),
            backend = service.database.backend().display_name(),
            "bookshelf service ready"
        );
        Ok(service)
    }

    /// Create every registered module's tables if they do not exist yet.
    pub async fn apply_schema(&self) -> anyhow::Result<()> {
        self.database
            .apply_schema(&self.registry.collect_schema())
            .await
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Full HTTP surface: health report, module routes, docs and middleware.
    pub fn router(&self) -> Router {
        let root = health::router(self.settings.clone(), self.books.clone());
        bookshelf_http::build_router(&self.registry, &self.settings, root)
    }

    pub async fn health(&self) -> HealthReport {
        health::report(&self.settings, self.books.as_ref()).await
    }

    /// Stop modules in reverse order, then close the pool.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        let result = self.registry.stop_all().await;
        self.database.close().await;
        result
    }
}

/// Bootstrap, serve until a shutdown signal, then release resources.
pub async fn run(settings: Settings) -> anyhow::Result<()> {
    let service = Service::bootstrap(settings).await?;
    let app = service.router();

    let served = bookshelf_http::serve(app, service.settings()).await;
    let stopped = service.shutdown().await;

    served.and(stopped)
}
