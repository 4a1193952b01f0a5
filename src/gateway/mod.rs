//! HTTP gateway (axum)
//!
//! | Route                          | Auth | Handler                    |
//! |--------------------------------|------|----------------------------|
//! | `POST /api/auth`               | no   | [`handlers::authenticate`] |
//! | `POST /api/merch/buy/{name}`   | JWT  | [`handlers::buy_merch`]    |
//! | `POST /api/send-coin`          | JWT  | [`handlers::send_coin`]    |
//! | `GET  /api/info`               | JWT  | [`handlers::get_info`]     |
//! | `GET  /api/health`             | no   | [`handlers::health_check`] |

pub mod handlers;
pub mod middleware;
pub mod openapi;
pub mod state;
pub mod types;

use std::future::Future;
use std::sync::Arc;

use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};
use tokio::net::TcpListener;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use state::AppState;

/// Assemble all routes over the shared state
pub fn build_router(state: Arc<AppState>) -> Router {
    // ==========================================================================
    // Private Routes (JWT required)
    // ==========================================================================
    let private_routes = Router::new()
        .route("/merch/buy/{merch_name}", post(handlers::buy_merch))
        .route("/send-coin", post(handlers::send_coin))
        .route("/info", get(handlers::get_info))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::jwt_auth_middleware,
        ));

    // ==========================================================================
    // Public Routes
    // ==========================================================================
    let public_routes = Router::new()
        .route("/auth", post(handlers::authenticate))
        .route("/health", get(handlers::health_check));

    Router::new()
        .nest(
            "/api",
            public_routes
                .merge(private_routes)
                .layer(from_fn(middleware::request_log_middleware)),
        )
        .with_state(state)
        // OpenAPI / Swagger UI (stateless, added after with_state)
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()))
}

/// Serve until `shutdown` resolves
pub async fn run_server(
    host: &str,
    port: u16,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let app = build_router(state);

    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        tracing::error!(addr = %addr, error = %e, "Failed to bind gateway listener");
        e
    })?;

    tracing::info!("Gateway listening on http://{}", addr);
    tracing::info!("API Docs: http://{}/docs", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use serde_json::Value;
    use tower::ServiceExt;

    use std::sync::Mutex;

    use crate::cache::{BalanceCache, CacheError, InMemoryBalanceCache};
    use crate::core_types::{AccountId, Coins};
    use crate::catalog::Catalog;
    use crate::ledger::{MemoryLedger, TxManager};
    use crate::store::{MerchStoreService, StoreSettings};
    use crate::user_auth::{Argon2Hasher, JwtTokenService};

    /// Cache that serves reads but fails its liveness check
    struct UnreachableCache(InMemoryBalanceCache);

    #[async_trait::async_trait]
    impl BalanceCache for UnreachableCache {
        async fn set_balance(&self, id: AccountId, balance: Coins) -> Result<(), CacheError> {
            self.0.set_balance(id, balance).await
        }
        async fn get_balance(&self, id: AccountId) -> Result<Coins, CacheError> {
            self.0.get_balance(id).await
        }
        async fn deduct_balance(&self, id: AccountId, amount: Coins) -> Result<Coins, CacheError> {
            self.0.deduct_balance(id, amount).await
        }
        async fn transfer_balance(
            &self,
            from: AccountId,
            to: AccountId,
            amount: Coins,
        ) -> Result<Coins, CacheError> {
            self.0.transfer_balance(from, to, amount).await
        }
        async fn invalidate_balance(&self, id: AccountId) -> Result<(), CacheError> {
            self.0.invalidate_balance(id).await
        }
        async fn load_catalog(&self, items: &[(String, Coins)]) -> Result<(), CacheError> {
            self.0.load_catalog(items).await
        }
        async fn get_price(&self, merch_name: &str) -> Result<Coins, CacheError> {
            self.0.get_price(merch_name).await
        }
        async fn health_check(&self) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("connection refused".to_string()))
        }
    }

    /// Collects formatted log output for assertions
    #[derive(Clone, Default)]
    struct LogCapture(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for LogCapture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    async fn app_with(cache: Arc<dyn BalanceCache>) -> Router {
        let catalog = Arc::new(Catalog::default());
        catalog.load_into(cache.as_ref()).await.unwrap();
        let service = MerchStoreService::new(
            TxManager::new(Arc::new(MemoryLedger::new())),
            cache.clone(),
            catalog,
            Arc::new(JwtTokenService::new("gateway-test", 3600)),
            Arc::new(Argon2Hasher::new()),
            StoreSettings::default(),
        );
        build_router(Arc::new(AppState::new(Arc::new(service), cache, None)))
    }

    async fn app() -> Router {
        app_with(Arc::new(InMemoryBalanceCache::new())).await
    }

    async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn post_json(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
        if let Some(t) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", t));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn login(app: &Router, username: &str) -> String {
        let (status, body) = call(
            app,
            post_json(
                "/api/auth",
                None,
                serde_json::json!({"username": username, "password": "pw"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        body["data"]["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_private_routes_require_token() {
        let app = app().await;
        let (status, body) = call(
            &app,
            Request::get("/api/info").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], types::error_codes::MISSING_AUTH);

        let (status, _) = call(
            &app,
            Request::get("/api/info")
                .header(header::AUTHORIZATION, "Bearer garbage")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_buy_then_info() {
        let app = app().await;
        let token = login(&app, "alice").await;

        let (status, body) = call(
            &app,
            post_json("/api/merch/buy/cup", Some(&token), Value::Null),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["success"], true);

        let (status, body) = call(
            &app,
            Request::get("/api/info")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["username"], "alice");
        assert_eq!(body["data"]["balance"], 980);
        assert_eq!(body["data"]["purchases"][0]["merch_name"], "cup");
        assert_eq!(body["data"]["purchases"][0]["price"], 20);
    }

    #[tokio::test]
    async fn test_send_coin_errors_map_to_status() {
        let app = app().await;
        let token = login(&app, "bob").await;

        let (status, body) = call(
            &app,
            post_json(
                "/api/send-coin",
                Some(&token),
                serde_json::json!({"to_user": 1, "amount": 5}),
            ),
        )
        .await;
        // bob is account 1: self-transfer
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], types::error_codes::INVALID_PARAMETER);

        let (status, _) = call(
            &app,
            post_json(
                "/api/send-coin",
                Some(&token),
                serde_json::json!({"to_user": 77, "amount": 5}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_merch_is_404() {
        let app = app().await;
        let token = login(&app, "carol").await;
        let (status, body) = call(
            &app,
            post_json("/api/merch/buy/yacht", Some(&token), Value::Null),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], types::error_codes::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_health() {
        let app = app().await;
        let (status, body) = call(
            &app,
            Request::get("/api/health").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["data"]["timestamp_ms"].as_u64().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_health_reports_unreachable_cache() {
        let app = app_with(Arc::new(UnreachableCache(InMemoryBalanceCache::new()))).await;
        let (status, body) = call(
            &app,
            Request::get("/api/health").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["code"], types::error_codes::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_every_api_request_is_logged() {
        let capture = LogCapture::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let app = app().await;
        let (status, _) = call(
            &app,
            Request::get("/api/info").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let logs = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
        let line = logs
            .lines()
            .find(|l| l.contains("Request handled"))
            .expect("request line logged");
        assert!(line.contains("method=GET"));
        assert!(line.contains("uri=/api/info"));
        assert!(line.contains("status=401"));
        assert!(line.contains("elapsed_ms="));
    }
}
