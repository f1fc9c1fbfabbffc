#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use cloudvalet::clients::{FixedConnector, MockCompute};
use cloudvalet::config::Config;
use cloudvalet::state::SharedState;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

pub const ADMIN_USER: &str = "admin";
pub const ADMIN_PASSWORD: &str = "admin123";

pub struct TestApp {
    pub router: Router,
    pub db_path: PathBuf,
    pub vault_dir: PathBuf,
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.db_path);
        let _ = std::fs::remove_dir_all(&self.vault_dir);
    }
}

pub fn test_config() -> (Config, PathBuf, PathBuf) {
    let id = uuid::Uuid::new_v4();
    let db_path = std::env::temp_dir().join(format!("cloudvalet-api-test-{id}.db"));
    let vault_dir = std::env::temp_dir().join(format!("cloudvalet-api-vault-{id}"));

    let mut config = Config::default();
    config.general.database_path = format!("sqlite:{}", db_path.display());
    config.vault.path = vault_dir.display().to_string();
    config.server.secure_cookies = false;
    config.azure.mock_mode = true;
    config.observability.metrics_enabled = false;

    (config, db_path, vault_dir)
}

pub async fn spawn_app() -> TestApp {
    let (config, db_path, vault_dir) = test_config();

    let connector = Arc::new(FixedConnector::new(Arc::new(MockCompute::new())));
    let shared = SharedState::with_connector(config, connector)
        .await
        .expect("Failed to create shared state");

    let state = cloudvalet::api::create_app_state(Arc::new(shared), None);
    let router = cloudvalet::api::router(state).await;

    TestApp {
        router,
        db_path,
        vault_dir,
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub set_cookie: Option<String>,
    pub body: Value,
}

impl TestApp {
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        cookie: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }

        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, mime::APPLICATION_JSON.as_ref())
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("Failed to build request");

        self.send(request).await
    }

    /// POSTs `body` verbatim, for payloads that are not valid JSON.
    pub async fn post_raw(&self, uri: &str, cookie: &str, body: &'static str) -> TestResponse {
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::COOKIE, cookie)
            .header(header::CONTENT_TYPE, mime::APPLICATION_JSON.as_ref())
            .body(Body::from(body))
            .expect("Failed to build request");

        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Request failed");

        let status = response.status();
        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(ToString::to_string);

        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read body")
            .to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };

        TestResponse {
            status,
            set_cookie,
            body,
        }
    }

    pub async fn get(&self, uri: &str, cookie: &str) -> TestResponse {
        self.request(Method::GET, uri, Some(cookie), None).await
    }

    pub async fn post(&self, uri: &str, cookie: &str, body: Value) -> TestResponse {
        self.request(Method::POST, uri, Some(cookie), Some(body))
            .await
    }

    pub async fn put(&self, uri: &str, cookie: &str, body: Value) -> TestResponse {
        self.request(Method::PUT, uri, Some(cookie), Some(body))
            .await
    }

    pub async fn delete(&self, uri: &str, cookie: &str) -> TestResponse {
        self.request(Method::DELETE, uri, Some(cookie), None).await
    }

    /// Logs in and returns the `name=value` session cookie.
    pub async fn login(&self, username: &str, password: &str) -> String {
        let response = self
            .request(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({ "username": username, "password": password })),
            )
            .await;
        assert_eq!(
            response.status,
            StatusCode::OK,
            "login failed for {username}: {}",
            response.body
        );
        response.set_cookie.expect("login sets a session cookie")
    }

    pub async fn login_admin(&self) -> String {
        self.login(ADMIN_USER, ADMIN_PASSWORD).await
    }

    /// Creates an account through the admin API and logs it in.
    pub async fn user_session(&self, username: &str, permission: &str) -> String {
        let admin = self.login_admin().await;
        let password = format!("{username}-password");

        let created = self
            .post(
                "/api/users",
                &admin,
                json!({
                    "username": username,
                    "password": password,
                    "permission": permission,
                }),
            )
            .await;
        assert_eq!(created.status, StatusCode::OK, "{}", created.body);

        self.login(username, &password).await
    }
}
