//! OpenAPI / Swagger UI Documentation
//!
//! - Swagger UI: `http://localhost:8080/docs`
//! - OpenAPI JSON: `http://localhost:8080/api-docs/openapi.json`

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::gateway::handlers::HealthResponse;
use crate::gateway::types::{
    ActionResponse, AuthRequest, AuthResponse, InfoResponse, PurchaseItem, SendCoinRequest,
    TransactionItem,
};

/// JWT bearer authentication security scheme
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some("Token from POST /api/auth"))
                        .build(),
                ),
            );
        }
    }
}

/// Main API Documentation struct
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Merch Store API",
        version = "1.0.0",
        description = "Coin ledger for the merch store: buy merch, send coins, inspect history."
    ),
    servers(
        (url = "http://localhost:8080", description = "Development"),
    ),
    paths(
        crate::gateway::handlers::health_check,
        crate::gateway::handlers::authenticate,
        crate::gateway::handlers::buy_merch,
        crate::gateway::handlers::send_coin,
        crate::gateway::handlers::get_info,
    ),
    components(
        schemas(
            HealthResponse,
            AuthRequest,
            AuthResponse,
            SendCoinRequest,
            ActionResponse,
            InfoResponse,
            PurchaseItem,
            TransactionItem,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Login / first-time registration"),
        (name = "Store", description = "Purchases, transfers and account info (auth required)"),
        (name = "System", description = "Health checks and system info")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use utoipa::OpenApi;

    #[test]
    fn test_openapi_doc_generates() {
        let doc = ApiDoc::openapi();
        assert_eq!(doc.info.title, "Merch Store API");
        assert!(doc.to_json().is_ok());
    }

    #[test]
    fn test_endpoints_registered() {
        let paths = ApiDoc::openapi().paths;
        assert!(paths.paths.contains_key("/api/auth"));
        assert!(paths.paths.contains_key("/api/merch/buy/{merch_name}"));
        assert!(paths.paths.contains_key("/api/send-coin"));
        assert!(paths.paths.contains_key("/api/info"));
        assert!(paths.paths.contains_key("/api/health"));
    }

    #[test]
    fn test_security_scheme_registered() {
        let doc = ApiDoc::openapi();
        let components = doc.components.expect("should have components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}
