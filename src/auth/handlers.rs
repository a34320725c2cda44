use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{
            AuthResponse, LoginRequest, Msg, PasswordRecoveryRequest, PublicUser, RefreshRequest,
            RegisterRequest, ResetPasswordRequest,
        },
        jwt::{JwtKeys, TokenKind},
        password::{hash_password, is_strong_enough, verify_password},
        repo::User,
    },
    errors::{internal, ApiError},
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/password-recovery", post(password_recovery))
        .route("/auth/reset-password", post(reset_password))
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

fn issue_pair(keys: &JwtKeys, user: User) -> Result<AuthResponse, ApiError> {
    let access_token = keys.sign_access(user.id).map_err(internal)?;
    let refresh_token = keys.sign_refresh(user.id).map_err(internal)?;
    Ok(AuthResponse {
        access_token,
        refresh_token,
        token_type: "bearer",
        user: PublicUser {
            id: user.id,
            email: user.email,
        },
    })
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let email = normalize_email(&payload.email);

    if !is_valid_email(&email) {
        warn!(%email, "invalid email");
        return Err((StatusCode::BAD_REQUEST, "Invalid email".into()));
    }
    if !is_strong_enough(&payload.password) {
        warn!("password too short");
        return Err((StatusCode::BAD_REQUEST, "Password too short".into()));
    }

    match User::find_by_email(&state.db, &email).await {
        Ok(Some(_)) => {
            warn!(%email, "email already registered");
            return Err((StatusCode::CONFLICT, "Email already registered".into()));
        }
        Ok(None) => {}
        Err(e) => return Err(internal(e)),
    }

    let hash = hash_password(&payload.password).map_err(internal)?;

    let user = User::create(&state.db, &email, &hash).await.map_err(internal)?;

    info!(user_id = %user.id, email = %user.email, "user registered");
    let keys = JwtKeys::from_ref(&state);
    Ok((StatusCode::CREATED, Json(issue_pair(&keys, user)?)))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let email = normalize_email(&payload.email);

    let user = match User::find_by_email(&state.db, &email).await {
        Ok(Some(u)) => u,
        Ok(None) => {
            warn!(%email, "login unknown email");
            return Err((StatusCode::UNAUTHORIZED, "Invalid credentials".into()));
        }
        Err(e) => return Err(internal(e)),
    };

    let ok = verify_password(&payload.password, &user.password_hash).map_err(internal)?;
    if !ok {
        warn!(%email, user_id = %user.id, "login invalid password");
        return Err((StatusCode::UNAUTHORIZED, "Invalid credentials".into()));
    }

    info!(user_id = %user.id, "user logged in");
    let keys = JwtKeys::from_ref(&state);
    Ok(Json(issue_pair(&keys, user)?))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let keys = JwtKeys::from_ref(&state);
    let claims = keys
        .verify_kind(&payload.refresh_token, TokenKind::Refresh)
        .map_err(|e| (StatusCode::UNAUTHORIZED, e.to_string()))?;

    let user = User::find_by_id(&state.db, claims.sub)
        .await
        .map_err(internal)?
        .ok_or((StatusCode::UNAUTHORIZED, "User not found".to_string()))?;

    Ok(Json(issue_pair(&keys, user)?))
}

/// No mail transport: the reset token is written to the log. Unknown emails
/// get the same answer so accounts cannot be enumerated.
#[instrument(skip(state, payload))]
pub async fn password_recovery(
    State(state): State<AppState>,
    Json(payload): Json<PasswordRecoveryRequest>,
) -> Result<Json<Msg>, ApiError> {
    let email = normalize_email(&payload.email);
    let sent = Msg {
        msg: "Password recovery email sent",
    };

    let Some(user) = User::find_by_email(&state.db, &email)
        .await
        .map_err(internal)?
    else {
        warn!(%email, "password recovery for unknown email");
        return Ok(Json(sent));
    };

    let token = JwtKeys::from_ref(&state)
        .sign_reset(user.id)
        .map_err(internal)?;
    info!(user_id = %user.id, %email, reset_token = %token, "password recovery token issued");
    Ok(Json(sent))
}

#[instrument(skip(state, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Json<Msg>, ApiError> {
    let claims = JwtKeys::from_ref(&state)
        .verify_kind(&payload.token, TokenKind::Reset)
        .map_err(|_| (StatusCode::BAD_REQUEST, "Invalid token or expired".to_string()))?;

    if !is_strong_enough(&payload.new_password) {
        return Err((StatusCode::BAD_REQUEST, "Password too short".into()));
    }

    if User::find_by_id(&state.db, claims.sub)
        .await
        .map_err(internal)?
        .is_none()
    {
        return Err((StatusCode::NOT_FOUND, "User not found".into()));
    }

    let hash = hash_password(&payload.new_password).map_err(internal)?;
    User::set_password_hash(&state.db, claims.sub, &hash)
        .await
        .map_err(internal)?;

    info!(user_id = %claims.sub, "password reset");
    Ok(Json(Msg {
        msg: "Password updated successfully",
    }))
}
