#![allow(dead_code)]

use anyhow::{Context, Result};
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::util::ServiceExt; // for `oneshot`
use uuid::Uuid;

use eventdesk::create_app;
use eventdesk::db::SqliteDirectory;
use eventdesk::utils::hash_password;

pub const JWT_SECRET: &str = "test-secret";
pub const PASSWORD: &str = "password123";

pub struct TestApp {
    pub app: Router,
    pub pool: SqlitePool,
    pub directory: SqliteDirectory,
    _dir: TempDir,
}

pub async fn setup() -> Result<TestApp> {
    let dir = tempfile::tempdir().context("failed to create tempdir")?;
    let opts = SqliteConnectOptions::new()
        .filename(dir.path().join("test.db"))
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator =
        sqlx::migrate::Migrator::new(std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")).await?;
    migrator.run(&pool).await?;

    std::env::set_var("JWT_SECRET", JWT_SECRET);
    let app = create_app(pool.clone()).await?;

    Ok(TestApp {
        app,
        directory: SqliteDirectory::new(pool.clone()),
        pool,
        _dir: dir,
    })
}

pub struct Response {
    pub status: StatusCode,
    pub body: Value,
}

impl TestApp {
    /// Creates a user with the given roles (in order) and returns its id.
    pub async fn user(&self, name: &str, roles: &[&str]) -> Result<Uuid> {
        let email = format!("{}@example.com", name.to_lowercase());
        let roles: Vec<String> = roles.iter().map(|r| r.to_string()).collect();
        let identity = self
            .directory
            .create_user(name, &email, &hash_password(PASSWORD)?, &roles)
            .await?;
        Ok(identity.id)
    }

    pub async fn login(&self, name: &str) -> Result<String> {
        let body = serde_json::json!({
            "email": format!("{}@example.com", name.to_lowercase()),
            "password": PASSWORD,
        });
        let resp = self.send("POST", "/auth/login", None, Some(body)).await?;
        assert_eq!(resp.status, StatusCode::OK, "login failed: {}", resp.body);
        resp.body
            .get("token")
            .and_then(Value::as_str)
            .map(String::from)
            .context("missing token")
    }

    pub async fn send(&self, method: &str, uri: &str, token: Option<&str>, json: Option<Value>) -> Result<Response> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }

        let req = match json {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))?,
            None => builder.body(Body::empty())?,
        };

        let resp = self.app.clone().oneshot(req).await?;
        let status = resp.status();
        let bytes = body::to_bytes(resp.into_body(), 10_485_760).await?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)?
        };

        Ok(Response { status, body })
    }

    pub async fn get(&self, uri: &str, token: &str) -> Result<Response> {
        self.send("GET", uri, Some(token), None).await
    }
}
