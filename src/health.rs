//! Service health report served at `/`.

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use bookshelf_kernel::settings::{DatabaseBackend, Settings};
use serde::Serialize;
use time::OffsetDateTime;

use crate::modules::books::repository::BookRepository;

pub const SERVICE_NAME: &str = "Bookshelf Book Management API";

const ENDPOINTS: &[&str] = &[
    "GET /",
    "GET /healthz",
    "GET /docs",
    "GET /openapi.json",
    "POST /books",
    "GET /books",
    "GET /books/search",
    "GET /books/{id}",
    "PUT /books/{id}",
    "DELETE /books/{id}",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseStatus {
    Connected,
    Error,
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: Status,
    pub server: ServerInfo,
    pub database: DatabaseInfo,
    pub endpoints: EndpointInfo,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == Status::Healthy
    }
}

#[derive(Debug, Serialize)]
pub struct ServerInfo {
    pub status: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub framework: &'static str,
    pub name: &'static str,
    pub version: &'static str,
    pub description: &'static str,
    pub environment: &'static str,
    pub port: u16,
}

#[derive(Debug, Serialize)]
pub struct DatabaseInfo {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub status: DatabaseStatus,
    pub message: String,
    pub database: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

#[derive(Debug, Serialize)]
pub struct EndpointInfo {
    pub total: usize,
    pub available: &'static [&'static str],
}

/// Probe the store and describe the running service. Store failures are
/// reported in the body, never returned.
pub async fn report(settings: &Settings, repository: &dyn BookRepository) -> HealthReport {
    let (status, message) = match repository.probe().await {
        Ok(()) => (
            DatabaseStatus::Connected,
            "Database connection successful".to_string(),
        ),
        Err(err) if err.is_connection_error() => {
            tracing::warn!(error = %err, "health check could not reach the database");
            (
                DatabaseStatus::Error,
                format!("Database connection failed: {}", err),
            )
        }
        Err(err) => {
            tracing::warn!(error = %err, "health check query failed");
            (
                DatabaseStatus::Error,
                format!("Database query failed: {}", err),
            )
        }
    };

    let db = &settings.database;
    let database = match db.backend {
        DatabaseBackend::Sqlite => DatabaseInfo {
            kind: db.backend.display_name(),
            status,
            message,
            database: db.path.clone(),
            host: None,
            port: None,
        },
        DatabaseBackend::Mysql => DatabaseInfo {
            kind: db.backend.display_name(),
            status,
            message,
            database: db.name.clone(),
            host: Some(db.host.clone()),
            port: Some(db.port),
        },
    };

    HealthReport {
        status: match status {
            DatabaseStatus::Connected => Status::Healthy,
            DatabaseStatus::Error => Status::Unhealthy,
        },
        server: ServerInfo {
            status: "running",
            timestamp: OffsetDateTime::now_utc(),
            framework: "axum",
            name: SERVICE_NAME,
            version: env!("CARGO_PKG_VERSION"),
            description: env!("CARGO_PKG_DESCRIPTION"),
            environment: settings.environment.as_str(),
            port: settings.server.port,
        },
        database,
        endpoints: EndpointInfo {
            total: ENDPOINTS.len(),
            available: ENDPOINTS,
        },
    }
}

#[derive(Clone)]
struct HealthState {
    settings: Arc<Settings>,
    repository: Arc<dyn BookRepository>,
}

/// Root router carrying the health report.
pub fn router(settings: Arc<Settings>, repository: Arc<dyn BookRepository>) -> Router {
    Router::new()
        .route("/", get(health_check))
        .with_state(HealthState {
            settings,
            repository,
        })
}

async fn health_check(State(state): State<HealthState>) -> Json<HealthReport> {
    Json(report(&state.settings, state.repository.as_ref()).await)
}
