use axum::{
    extract::{DefaultBodyLimit, Request},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use governor::middleware::NoOpMiddleware;
use sabong_execution::{Actor, ArenaError};
use sabong_types::{api::ErrorBody, Role};
use serde_json::{json, Map};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::{AuthError, Service, ServiceError};

mod http;
mod ws;

pub struct Api {
    service: Arc<Service>,
}

type IpGovernorConfig =
    tower_governor::governor::GovernorConfig<SmartIpKeyExtractor, NoOpMiddleware>;

impl Api {
    pub fn new(service: Arc<Service>) -> Self {
        Self { service }
    }

    pub fn router(&self) -> Router {
        let allowed_origins = parse_allowed_origins("ALLOWED_HTTP_ORIGINS");
        let cors_origins = allowed_origins
            .iter()
            .filter(|origin| *origin != "*")
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!("Invalid origin in ALLOWED_HTTP_ORIGINS: {}", origin);
                    None
                }
            })
            .collect::<Vec<_>>();
        let cors = if allowed_origins.contains("*") {
            CorsLayer::new().allow_origin(AllowOrigin::any())
        } else {
            CorsLayer::new().allow_origin(AllowOrigin::list(cors_origins))
        }
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::HeaderName::from_static("x-request-id"),
        ])
        .expose_headers([header::HeaderName::from_static("x-request-id")]);

        let auth_routes = Router::new()
            .route("/auth/register", post(http::register))
            .route("/auth/login", post(http::login));
        let auth_routes = match self.auth_governor_config() {
            Some(config) => auth_routes.layer(GovernorLayer { config }),
            None => auth_routes,
        };

        let router = Router::new()
            .route("/healthz", get(http::healthz))
            .route("/metrics/ws", get(http::ws_metrics))
            .route("/auth/logout", post(http::logout))
            .route("/auth/me", get(http::me))
            .route("/fight/open", post(http::open_betting))
            .route("/fight/last-call", post(http::last_call))
            .route("/fight/close", post(http::close_betting))
            .route("/fight/declare", post(http::declare_winner))
            .route("/fight/reset", post(http::reset_fight))
            .route("/fight/number", post(http::set_fight_number))
            .route("/settings", get(http::settings).put(http::update_settings))
            .route("/status", get(http::status))
            .route("/bets", get(http::bets).post(http::place_bet))
            .route("/bets/:id", delete(http::remove_bet))
            .route("/history", get(http::history))
            .route("/cash/deposits", post(http::request_deposit))
            .route("/cash/deposits/:id/approve", post(http::approve_deposit))
            .route("/cash/deposits/:id/reject", post(http::reject_deposit))
            .route("/cash/withdrawals", post(http::request_withdrawal))
            .route("/cash/withdrawals/:id/approve", post(http::approve_withdrawal))
            .route("/cash/withdrawals/:id/reject", post(http::reject_withdrawal))
            .route("/cash/pending", get(http::pending_requests))
            .route("/cash/mine", get(http::my_requests))
            .route("/transactions", get(http::transactions))
            .route("/users", get(http::users))
            .route("/users/:id/credits", post(http::adjust_credits))
            .route("/users/:id/disable", post(http::set_disabled))
            .route("/ws", get(ws::observe))
            .merge(auth_routes);

        let router = router.layer(cors);
        let router = match self.service.config().http_body_limit_bytes {
            0 => router,
            limit => router.layer(DefaultBodyLimit::max(limit)),
        };
        let router = router.layer(middleware::from_fn(request_id_middleware));
        let router = router.layer(TraceLayer::new_for_http());

        router.with_state(self.service.clone())
    }

    fn auth_governor_config(&self) -> Option<Arc<IpGovernorConfig>> {
        let config = self.service.config();
        let rate_per_minute = parse_env_u64("RATE_LIMIT_AUTH_PER_MIN")
            .or(config.auth_rate_limit_per_minute)
            .filter(|rate| *rate > 0)?;
        let burst_size = parse_env_u32("RATE_LIMIT_AUTH_BURST")
            .or(config.auth_rate_limit_burst)
            .filter(|burst| *burst > 0)?;
        let period = Duration::from_nanos((60_000_000_000u64 / rate_per_minute).max(1));
        tracing::info!(
            rate_per_minute,
            burst_size,
            period_ms = period.as_millis() as u64,
            "auth rate limit configured"
        );
        let governor = GovernorConfigBuilder::default()
            .period(period)
            .burst_size(burst_size)
            .key_extractor(SmartIpKeyExtractor)
            .finish();
        if governor.is_none() {
            tracing::warn!("invalid auth rate-limit config; rate limiting disabled");
        }
        governor.map(Arc::new)
    }
}

fn parse_allowed_origins(var: &str) -> HashSet<String> {
    std::env::var(var)
        .unwrap_or_default()
        .split(',')
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .collect()
}

fn parse_env_u64(var: &str) -> Option<u64> {
    std::env::var(var).ok().and_then(|v| v.parse().ok())
}

fn parse_env_u32(var: &str) -> Option<u32> {
    std::env::var(var).ok().and_then(|v| v.parse().ok())
}

async fn request_id_middleware(req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(header::HeaderName::from_static("x-request-id"))
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();
    let mut response = next.run(req).await;
    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(
            header::HeaderName::from_static("x-request-id"),
            header_value,
        );
    }
    tracing::info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "http.request"
    );
    response
}

/// Every failure a route can return, rendered as an [`ErrorBody`].
#[derive(Debug)]
pub enum ApiError {
    Arena(ArenaError),
    Auth(AuthError),
    BadRequest(String),
}

impl From<ArenaError> for ApiError {
    fn from(err: ArenaError) -> Self {
        ApiError::Arena(err)
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::Auth(err)
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Arena(err) => ApiError::Arena(err),
            ServiceError::Auth(err) => ApiError::Auth(err),
        }
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Arena(err) => match err {
                ArenaError::InvalidTransition { .. }
                | ArenaError::AlreadyProcessed { .. }
                | ArenaError::AlreadySettled { .. } => StatusCode::CONFLICT,
                ArenaError::InsufficientCredits { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                ArenaError::NotFound(_) => StatusCode::NOT_FOUND,
                ArenaError::Validation(_) => StatusCode::BAD_REQUEST,
                ArenaError::Forbidden(_) => StatusCode::FORBIDDEN,
                ArenaError::SettlementBlocked { .. } => StatusCode::SERVICE_UNAVAILABLE,
                ArenaError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Auth(err) => match err {
                AuthError::Unauthorized | AuthError::InvalidCredentials => {
                    StatusCode::UNAUTHORIZED
                }
                AuthError::Disabled => StatusCode::FORBIDDEN,
                AuthError::WeakPassword => StatusCode::BAD_REQUEST,
                AuthError::Hash(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    pub fn body(&self) -> ErrorBody {
        let mut detail = Map::new();
        let code = match self {
            ApiError::Arena(err) => {
                match err {
                    ArenaError::InvalidTransition { command, phase } => {
                        detail.insert("command".into(), json!(command));
                        detail.insert("phase".into(), json!(phase));
                    }
                    ArenaError::InsufficientCredits { balance, requested } => {
                        detail.insert("balance".into(), json!(balance));
                        detail.insert("requested".into(), json!(requested));
                    }
                    ArenaError::AlreadyProcessed { request_id, status } => {
                        detail.insert("request_id".into(), json!(request_id));
                        detail.insert("status".into(), json!(status));
                    }
                    ArenaError::AlreadySettled { fight } => {
                        detail.insert("fight".into(), json!(fight));
                    }
                    ArenaError::SettlementBlocked { fight, attempts, .. } => {
                        detail.insert("fight".into(), json!(fight));
                        detail.insert("attempts".into(), json!(attempts));
                    }
                    _ => {}
                }
                err.code()
            }
            ApiError::Auth(AuthError::Disabled) => "FORBIDDEN",
            ApiError::Auth(AuthError::WeakPassword) => "VALIDATION_ERROR",
            ApiError::Auth(AuthError::Hash(_)) => "INTERNAL_ERROR",
            ApiError::Auth(_) => "UNAUTHORIZED",
            ApiError::BadRequest(_) => "VALIDATION_ERROR",
        };
        ErrorBody {
            code: code.to_string(),
            message: self.message(),
            detail,
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Arena(err) => err.to_string(),
            ApiError::Auth(err) => err.to_string(),
            ApiError::BadRequest(message) => message.clone(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.message(), "request failed");
        }
        (status, Json(self.body())).into_response()
    }
}

pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Resolves the caller of a request from its bearer token.
pub(crate) fn authorize(service: &Service, headers: &HeaderMap) -> Result<Actor, ApiError> {
    let token = bearer_token(headers).ok_or(AuthError::Unauthorized)?;
    Ok(service.authenticate(token)?)
}

pub(crate) fn require_operator(actor: &Actor) -> Result<(), ApiError> {
    if actor.role == Role::Operator {
        return Ok(());
    }
    Err(ArenaError::Forbidden(format!("{} may not perform this action", actor.role.as_str())).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sabong_types::{CashStatus, Phase, RequestId};

    #[test]
    fn insufficient_credits_carries_balance() {
        let err = ApiError::from(ArenaError::InsufficientCredits {
            balance: 40,
            requested: 100,
        });
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = serde_json::to_value(err.body()).unwrap();
        assert_eq!(body["code"], "INSUFFICIENT_CREDITS");
        assert_eq!(body["balance"], 40);
        assert_eq!(body["requested"], 100);
    }

    #[test]
    fn already_processed_carries_status() {
        let err = ApiError::from(ArenaError::AlreadyProcessed {
            request_id: RequestId(3),
            status: CashStatus::Approved,
        });
        assert_eq!(err.status(), StatusCode::CONFLICT);
        let body = serde_json::to_value(err.body()).unwrap();
        assert_eq!(body["code"], "ALREADY_PROCESSED");
        assert_eq!(body["status"], "approved");
        assert_eq!(body["request_id"], 3);
    }

    #[test]
    fn invalid_transition_names_command_and_phase() {
        let err = ApiError::from(ArenaError::InvalidTransition {
            command: "place_bet",
            phase: Phase::Closed,
        });
        let body = serde_json::to_value(err.body()).unwrap();
        assert_eq!(body["code"], "INVALID_TRANSITION");
        assert_eq!(body["command"], "place_bet");
        assert_eq!(body["phase"], "closed");
    }

    #[test]
    fn auth_errors_map_to_stable_codes() {
        let err = ApiError::from(AuthError::Unauthorized);
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.body().code, "UNAUTHORIZED");
        assert_eq!(ApiError::from(AuthError::Disabled).body().code, "FORBIDDEN");
    }

    #[test]
    fn bearer_token_requires_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(bearer_token(&headers), Some("abc"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);
    }
}
