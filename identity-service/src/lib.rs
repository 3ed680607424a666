pub mod config;
pub mod db;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    http::{HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use service_core::error::AppError;
use service_core::middleware::{
    rate_limit::{create_ip_rate_limiter, ip_rate_limit_middleware, IpRateLimiter},
    security_headers::security_headers_middleware,
    tracing::request_id_middleware,
};

use crate::config::IdentityConfig;
use crate::services::{
    AuditService, AuthService, Database, EmailProvider, PasswordResetService, PermissionService,
    SessionService, TokenService, TwoFactorService,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        handlers::auth::register,
        handlers::auth::login,
        handlers::auth::refresh,
        handlers::auth::logout,
        handlers::auth::logout_all,
        handlers::password_reset::request_reset,
        handlers::password_reset::verify_reset,
        handlers::password_reset::confirm_reset,
    ),
    components(
        schemas(
            handlers::auth::RegisterRequest,
            handlers::auth::LoginRequest,
            handlers::auth::AuthResponse,
            handlers::auth::LoginResponse,
            handlers::auth::RefreshResponse,
            handlers::password_reset::ResetRequest,
            handlers::password_reset::VerifyResponse,
            handlers::password_reset::ConfirmRequest,
            handlers::MessageResponse,
            models::SanitizedUser,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Authentication", description = "Login, sessions, tokens, and credential recovery"),
        (name = "Observability", description = "Service health"),
    )
)]
pub struct ApiDoc;

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
                        .build(),
                ),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: IdentityConfig,
    pub db: Database,
    pub auth: AuthService,
    pub sessions: SessionService,
    pub tokens: TokenService,
    pub two_factor: TwoFactorService,
    pub permissions: PermissionService,
    pub password_reset: PasswordResetService,
    pub audit: AuditService,
    pub login_rate_limiter: IpRateLimiter,
    pub password_reset_rate_limiter: IpRateLimiter,
    pub ip_rate_limiter: IpRateLimiter,
}

/// Wire the service graph from a config, database, and email collaborator.
pub fn build_state(
    config: IdentityConfig,
    db: Database,
    email: Arc<dyn EmailProvider>,
) -> Result<AppState, AppError> {
    let tokens = TokenService::new(&config.jwt).map_err(AppError::InternalError)?;
    let sessions = SessionService::new(db.clone(), config.session.timeout_minutes);
    let audit = AuditService::new(db.clone());
    let two_factor = TwoFactorService::new(db.clone());
    let permissions = PermissionService::new(db.clone());
    let password_reset = PasswordResetService::new(
        db.clone(),
        sessions.clone(),
        audit.clone(),
        email.clone(),
        config.security.frontend_url.clone(),
    );
    let auth = AuthService::new(
        db.clone(),
        sessions.clone(),
        tokens.clone(),
        two_factor.clone(),
        audit.clone(),
        email,
    );

    let login_rate_limiter = create_ip_rate_limiter(
        config.rate_limit.login_attempts,
        config.rate_limit.login_window_seconds,
    );
    let password_reset_rate_limiter = create_ip_rate_limiter(
        config.rate_limit.password_reset_attempts,
        config.rate_limit.password_reset_window_seconds,
    );
    let ip_rate_limiter = create_ip_rate_limiter(
        config.rate_limit.global_ip_limit,
        config.rate_limit.global_ip_window_seconds,
    );

    Ok(AppState {
        config,
        db,
        auth,
        sessions,
        tokens,
        two_factor,
        permissions,
        password_reset,
        audit,
        login_rate_limiter,
        password_reset_rate_limiter,
        ip_rate_limiter,
    })
}

pub fn build_router(state: AppState) -> Result<Router, AppError> {
    // The login surface shares one limiter: credentials and 2FA completion.
    let login_limiter = state.login_rate_limiter.clone();
    let login_routes = Router::new()
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/2fa/verify-code", post(handlers::two_factor::verify_code))
        .route(
            "/auth/2fa/verify-backup-code",
            post(handlers::two_factor::verify_backup_code),
        )
        .layer(from_fn_with_state(login_limiter, ip_rate_limit_middleware));

    let reset_limiter = state.password_reset_rate_limiter.clone();
    let reset_request_route = Router::new()
        .route(
            "/auth/password-reset/request",
            post(handlers::password_reset::request_reset),
        )
        .layer(from_fn_with_state(reset_limiter, ip_rate_limit_middleware));

    // Everything here runs behind token verification + session validation.
    let authed_routes = Router::new()
        .route("/auth/refresh", post(handlers::auth::refresh))
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/logout-all", post(handlers::auth::logout_all))
        .route("/auth/me", get(handlers::auth::me))
        .route("/auth/2fa/setup", post(handlers::two_factor::setup))
        .route("/auth/2fa/enable", post(handlers::two_factor::enable))
        .route("/auth/2fa/status", get(handlers::two_factor::status))
        .route("/auth/2fa/disable", post(handlers::two_factor::disable))
        .route("/sessions", get(handlers::session::list))
        .route("/sessions/active", get(handlers::session::active))
        .route("/sessions/:session_id", delete(handlers::session::terminate))
        .route(
            "/sessions/terminate-all",
            post(handlers::session::terminate_all),
        )
        .route("/permissions/check", get(handlers::permissions::check))
        .route("/permissions/me", get(handlers::permissions::my_permissions))
        .route(
            "/permissions/accessible",
            get(handlers::permissions::accessible),
        )
        .route(
            "/permissions/all",
            get(handlers::permissions::all_permissions),
        )
        .route(
            "/permissions",
            get(handlers::permissions::list)
                .post(handlers::permissions::add)
                .delete(handlers::permissions::remove),
        )
        .layer(from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    let mut app = Router::new()
        .route("/health", get(health_check))
        .route(
            "/auth/password-reset/verify",
            get(handlers::password_reset::verify_reset),
        )
        .route(
            "/auth/password-reset/confirm",
            post(handlers::password_reset::confirm_reset),
        );

    let swagger_enabled = match state.config.environment {
        config::Environment::Dev => true,
        config::Environment::Prod => state.config.swagger.enabled == config::SwaggerMode::Public,
    };

    if swagger_enabled {
        app = app.merge(SwaggerUi::new("/docs").url("/.well-known/openapi.json", ApiDoc::openapi()));
    } else {
        app = app.route(
            "/.well-known/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        );
    }

    let ip_limiter = state.ip_rate_limiter.clone();

    let cors_origins: Vec<HeaderValue> = state
        .config
        .security
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(origin = %origin, error = %e, "Invalid CORS origin, skipping");
                None
            }
        })
        .collect();

    let app = app
        .merge(login_routes)
        .merge(reset_request_route)
        .merge(authed_routes)
        .with_state(state)
        .layer(from_fn_with_state(ip_limiter, ip_rate_limit_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(cors_origins)
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PATCH,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([
                    axum::http::header::AUTHORIZATION,
                    axum::http::header::CONTENT_TYPE,
                ]),
        );

    Ok(app)
}

/// Service health check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
        (status = 500, description = "Service is unhealthy")
    ),
    tag = "Observability"
)]
pub async fn health_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.db.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Database health check failed");
        AppError::DatabaseError(anyhow::anyhow!(e))
    })?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
        "checks": {
            "postgres": "up"
        }
    })))
}
