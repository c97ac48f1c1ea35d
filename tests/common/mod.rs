use anyhow::{Context, Result};
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::util::ServiceExt; // for `oneshot`

use supply_desk::create_app;

/// In-process app over a throwaway sqlite file. The tempdir lives as long
/// as the harness.
pub struct TestApp {
    pub app: Router,
    _dir: TempDir,
}

pub async fn setup() -> Result<TestApp> {
    let dir = tempfile::tempdir().context("failed to create tempdir")?;
    let db_path = dir.path().join("test.db");

    let opts = SqliteConnectOptions::new()
        .filename(db_path.as_path())
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator = sqlx::migrate::Migrator::new(
        std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations"),
    )
    .await?;
    migrator.run(&pool).await?;

    std::env::set_var("JWT_SECRET", "test-secret");
    let app = create_app(pool).await?;

    Ok(TestApp { app, _dir: dir })
}

impl TestApp {
    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Result<(StatusCode, Value)> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))?,
            None => builder.body(Body::empty())?,
        };

        let response = self.app.clone().oneshot(request).await?;
        let status = response.status();
        let bytes = body::to_bytes(response.into_body(), 10_485_760).await?;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).context("response body is not JSON")?
        };

        Ok((status, value))
    }

    /// Register a fresh organization; returns the admin's token.
    pub async fn register(&self, organization: &str, username: &str) -> Result<String> {
        let (status, body) = self
            .send(
                "POST",
                "/auth/register",
                None,
                Some(json!({
                    "organization": organization,
                    "username": username,
                    "email": format!("{}@example.com", username),
                    "password": "password123",
                    "first_name": "Test",
                    "last_name": "Admin"
                })),
            )
            .await?;
        anyhow::ensure!(status == StatusCode::CREATED, "register failed: {} - {}", status, body);
        token_of(&body)
    }

    pub async fn login(&self, username: &str) -> Result<String> {
        let (status, body) = self
            .send(
                "POST",
                "/auth/login",
                None,
                Some(json!({ "username": username, "password": "password123" })),
            )
            .await?;
        anyhow::ensure!(status == StatusCode::OK, "login failed: {} - {}", status, body);
        token_of(&body)
    }

    /// Create a staff account and return its id.
    pub async fn create_user(&self, admin_token: &str, username: &str) -> Result<String> {
        let (status, body) = self
            .send(
                "POST",
                "/end-users",
                Some(admin_token),
                Some(json!({
                    "username": username,
                    "email": format!("{}@example.com", username),
                    "password": "password123",
                    "first_name": "Test",
                    "last_name": "Staff"
                })),
            )
            .await?;
        anyhow::ensure!(status == StatusCode::CREATED, "user create failed: {} - {}", status, body);
        id_of(&body)
    }

    /// Find a role id by name via `GET /roles`.
    pub async fn role_id(&self, token: &str, name: &str) -> Result<String> {
        let (status, body) = self.send("GET", "/roles", Some(token), None).await?;
        anyhow::ensure!(status == StatusCode::OK, "role list failed: {} - {}", status, body);
        body.as_array()
            .and_then(|roles| {
                roles
                    .iter()
                    .find(|r| r.get("name").and_then(Value::as_str) == Some(name))
            })
            .and_then(|r| r.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .with_context(|| format!("role {} not found", name))
    }
}

pub fn id_of(body: &Value) -> Result<String> {
    body.get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .context("missing id")
}

pub fn token_of(body: &Value) -> Result<String> {
    body.get("token")
        .and_then(Value::as_str)
        .map(str::to_string)
        .context("missing token")
}

pub fn error_code(body: &Value) -> Option<&str> {
    body.get("error").and_then(Value::as_str)
}
