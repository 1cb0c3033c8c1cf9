#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use rust_decimal::Decimal;
use sea_orm::{ConnectionTrait, DatabaseConnection};
use serde_json::Value;
use storefront_api::{
    config::AppConfig,
    db::{self, DbConfig},
    events::{self, EventSender},
    services::{product_images::DesiredImage, products::CreateProductInput},
    AppState,
};
use tower::ServiceExt;

/// Application state and router backed by a fresh in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_max_images(20).await
    }

    pub async fn with_max_images(max_images: usize) -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.max_images_per_product = max_images;

        let db = Arc::new(test_db().await);
        let (event_sender, event_rx) = EventSender::channel(256);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let state = AppState::new(db, cfg, Arc::new(event_sender));
        let router = storefront_api::build_router(state.clone());

        Self {
            router,
            state,
            _event_task: event_task,
        }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.state.db
    }

    /// Send a request against the router, with a JSON body when given.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Send a request and decode the JSON body (Null for empty bodies).
    pub async fn request_json(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let response = self.request(method, uri, body).await;
        let status = response.status();
        (status, response_json(response).await)
    }

    pub async fn seed_product(
        &self,
        slug: &str,
        images: &[(&str, Option<bool>)],
    ) -> storefront_api::services::products::ProductWithImages {
        self.state
            .services
            .product_catalog
            .create_product(product_input(slug, images))
            .await
            .expect("seed product for tests")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

/// Migrated in-memory database on a single pooled connection.
pub async fn test_db() -> DatabaseConnection {
    let pool = db::establish_connection_with_config(&DbConfig::in_memory_sqlite())
        .await
        .expect("failed to create test database");
    db::run_migrations(&pool)
        .await
        .expect("failed to run migrations in tests");
    pool
}

/// Migrated SQLite database in a file under `dir`, pooled so that concurrent
/// transactions run on separate connections.
pub async fn file_db(dir: &tempfile::TempDir, max_connections: u32) -> DatabaseConnection {
    let path = dir.path().join("storefront.db");
    let config = DbConfig {
        url: format!("sqlite://{}?mode=rwc", path.display()),
        max_connections,
        min_connections: 1,
        ..Default::default()
    };
    let pool = db::establish_connection_with_config(&config)
        .await
        .expect("failed to open file database");
    db::run_migrations(&pool)
        .await
        .expect("failed to run migrations on file database");
    pool
}

pub fn product_input(slug: &str, images: &[(&str, Option<bool>)]) -> CreateProductInput {
    CreateProductInput {
        name: format!("Test product {}", slug),
        slug: slug.to_string(),
        description: None,
        price: Decimal::new(1999, 2),
        discount: None,
        quantity: 10,
        is_active: None,
        images: desired(images),
    }
}

pub fn desired(images: &[(&str, Option<bool>)]) -> Vec<DesiredImage> {
    images
        .iter()
        .map(|(url, primary)| DesiredImage::new(*url, *primary))
        .collect()
}

pub async fn response_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read response body");
    if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("response body is not json")
    }
}

/// Makes every image insert whose url contains `explode` fail.
pub async fn install_failing_insert_trigger(db: &DatabaseConnection) {
    db.execute_unprepared(
        "CREATE TRIGGER product_images_explode BEFORE INSERT ON product_images \
         WHEN NEW.url LIKE '%explode%' \
         BEGIN SELECT RAISE(ABORT, 'insert rejected by test trigger'); END;",
    )
    .await
    .expect("install failing trigger");
}
