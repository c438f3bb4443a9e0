//! Session tokens: login, logout, refresh and the guard for protected routes.

use axum::{
    extract::{rejection::JsonRejection, Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::{DateTime, Duration, Utc};
use gremlin_gateway_telemetry::log_login_rejected;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::error::ApiError;
use super::router::AppState;
use crate::config::AuthConfig;
use crate::credentials::{self, SessionIdentity};

/// Cookie carrying the session token.
pub const SESSION_COOKIE: &str = "jwt";

/// Claims stored in a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub username: String,
    /// Encrypted password, needed to reconnect as this user.
    pub pwtoken: String,
    pub exp: i64,
    pub orig_iat: i64,
}

impl SessionClaims {
    pub fn identity(&self) -> SessionIdentity {
        SessionIdentity {
            username: self.username.clone(),
            pwtoken: self.pwtoken.clone(),
        }
    }
}

/// Sign a token for `identity`, valid for the configured lifetime.
///
/// `orig_iat` is kept across refreshes.
pub fn issue_token(
    auth: &AuthConfig,
    identity: &SessionIdentity,
    orig_iat: Option<i64>,
) -> Result<(String, DateTime<Utc>), ApiError> {
    let now = Utc::now();
    let lifetime = i64::try_from(auth.jwt_timeout_secs).unwrap_or(i64::MAX);
    let expire = now + Duration::seconds(lifetime.min(i64::from(i32::MAX)));

    let claims = SessionClaims {
        username: identity.username.clone(),
        pwtoken: identity.pwtoken.clone(),
        exp: expire.timestamp(),
        orig_iat: orig_iat.unwrap_or_else(|| now.timestamp()),
    };
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(auth.jwt_secret.as_bytes()),
    )
    .map_err(|e| {
        tracing::error!(error = %e, "failed to sign session token");
        ApiError::internal("failed to create token")
    })?;

    Ok((token, expire))
}

/// Check signature and expiry.
pub fn validate_token(
    auth: &AuthConfig,
    token: &str,
) -> Result<SessionClaims, jsonwebtoken::errors::Error> {
    let validation = Validation::new(Algorithm::HS256);
    let key = DecodingKey::from_secret(auth.jwt_secret.as_bytes());
    decode::<SessionClaims>(token, &key, &validation).map(|data| data.claims)
}

/// Token from `Authorization: Bearer`, falling back to the session cookie.
fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|h| h.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// Reject requests without a valid session; otherwise expose its claims to
/// the handler.
pub async fn require_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = token_from_headers(request.headers()) else {
        return ApiError::unauthorized("auth header is empty").into_response();
    };

    match validate_token(&state.config.auth, &token) {
        Ok(claims) => {
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        Err(e) => {
            tracing::debug!(error = %e, "session token rejected");
            ApiError::unauthorized("invalid or expired token").into_response()
        }
    }
}

fn session_cookie(token: &str, max_age_secs: u64) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(&format!(
        "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Lax",
        SESSION_COOKIE, token, max_age_secs
    ))
    .map_err(|_| ApiError::internal("failed to create session cookie"))
}

fn token_response(
    auth: &AuthConfig,
    token: String,
    expire: DateTime<Utc>,
) -> Result<Response, ApiError> {
    let cookie = session_cookie(&token, auth.jwt_timeout_secs)?;
    let body = json!({
        "code": 200,
        "token": token,
        "expire": expire.to_rfc3339(),
    });
    Ok(([(header::SET_COOKIE, cookie)], Json(body)).into_response())
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// POST /login
pub async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(login) = body.map_err(|_| ApiError::unauthorized("missing Username or Password"))?;
    if login.username.is_empty() || login.password.is_empty() {
        return Err(ApiError::unauthorized("missing Username or Password"));
    }

    let auth = &state.config.auth;
    let accepted = if auth.gremlin_auth {
        match state
            .gateway
            .auth_check(&login.username, &login.password)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                log_login_rejected!(username = %login.username, error = %e, "gremlin rejected login");
                false
            }
        }
    } else {
        let ok = login.username == auth.admin_username && login.password == auth.admin_password;
        if !ok {
            log_login_rejected!(username = %login.username, "credentials do not match admin account");
        }
        ok
    };
    if !accepted {
        return Err(ApiError::unauthorized("incorrect Username or Password"));
    }

    let identity = SessionIdentity {
        pwtoken: credentials::encrypt(auth.jwt_secret.as_bytes(), &login.password)
            .map_err(|e| ApiError::internal(e.to_string()))?,
        username: login.username,
    };
    let (token, expire) = issue_token(auth, &identity, None)?;
    tracing::info!(username = %identity.username, "login succeeded");
    token_response(auth, token, expire)
}

/// POST /logout
pub async fn logout() -> Result<Response, ApiError> {
    let cookie = session_cookie("", 0)?;
    Ok(([(header::SET_COOKIE, cookie)], Json(json!({"code": 200}))).into_response())
}

/// GET /refresh_token
pub async fn refresh_token(
    State(state): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
) -> Result<Response, ApiError> {
    let auth = &state.config.auth;
    if !auth.refresh_allowed(claims.orig_iat, Utc::now().timestamp()) {
        return Err(ApiError::unauthorized("token is expired"));
    }
    let (token, expire) = issue_token(auth, &claims.identity(), Some(claims.orig_iat))?;
    token_response(auth, token, expire)
}
