use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use sqlx::PgPool;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::dto::{validate_patch, ChangePasswordRequest, ProfileResponse};
use super::repo::ProfileTx;
use crate::{
    auth::{
        jwt::AuthUser,
        password::{hash_password, is_strong_enough, verify_password},
        repo::User,
        Msg,
    },
    errors::{self, internal, ApiError},
    meals::repo as meals_repo,
    nutrition::{apply_profile_update, ProfilePatch, ProfileStore},
    state::AppState,
};

pub fn me_routes() -> Router<AppState> {
    Router::new()
        .route("/users/me", get(get_me).patch(update_me).delete(delete_me))
        .route("/users/me/password", post(change_password))
}

async fn load_user(db: &PgPool, user_id: Uuid) -> Result<User, ApiError> {
    User::find_by_id(db, user_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| {
            warn!(%user_id, "user not found");
            (StatusCode::NOT_FOUND, "User not found".to_string())
        })
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<ProfileResponse>, ApiError> {
    let user = load_user(&state.db, user_id).await?;
    let profile = state
        .db
        .read_profile(user_id)
        .await
        .map_err(internal)?
        .ok_or((StatusCode::NOT_FOUND, "User not found".to_string()))?;
    Ok(Json(ProfileResponse::new(user, profile)))
}

/// Partial profile update; the calorie goal follows physiological changes.
#[instrument(skip(state, patch))]
pub async fn update_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(patch): Json<ProfilePatch>,
) -> Result<Json<ProfileResponse>, ApiError> {
    if let Err(msg) = validate_patch(&patch) {
        warn!(%user_id, %msg, "invalid profile patch");
        return Err((StatusCode::BAD_REQUEST, msg));
    }

    let user = load_user(&state.db, user_id).await?;

    let tx = ProfileTx::begin(&state.db).await.map_err(internal)?;
    // dropping tx on error rolls back
    let profile = apply_profile_update(&tx, user_id, &patch)
        .await
        .map_err(errors::nutrition)?;
    tx.commit().await.map_err(internal)?;

    info!(%user_id, calories_goal = profile.calories_goal, "profile updated");
    Ok(Json(ProfileResponse::new(user, profile)))
}

#[instrument(skip(state))]
pub async fn delete_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<StatusCode, ApiError> {
    let photo_keys = meals_repo::image_keys_for_user(&state.db, user_id)
        .await
        .map_err(internal)?;

    if !User::delete(&state.db, user_id).await.map_err(internal)? {
        return Err((StatusCode::NOT_FOUND, "User not found".into()));
    }

    for key in photo_keys {
        if let Err(e) = state.storage.delete_photo(&key).await {
            warn!(error = %e, %key, "orphaned photo left in storage");
        }
    }

    info!(%user_id, "account deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, body))]
pub async fn change_password(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<ChangePasswordRequest>,
) -> Result<Json<Msg>, ApiError> {
    let user = load_user(&state.db, user_id).await?;

    let ok = verify_password(&body.current_password, &user.password_hash).map_err(|e| {
        error!(error = %e, "verify_password failed");
        internal(e)
    })?;
    if !ok {
        warn!(%user_id, "change password with wrong current password");
        return Err((StatusCode::BAD_REQUEST, "Incorrect password".into()));
    }
    if !is_strong_enough(&body.new_password) {
        return Err((StatusCode::BAD_REQUEST, "Password too short".into()));
    }

    let hash = hash_password(&body.new_password).map_err(internal)?;
    User::set_password_hash(&state.db, user_id, &hash)
        .await
        .map_err(internal)?;

    info!(%user_id, "password changed");
    Ok(Json(Msg {
        msg: "Password updated successfully",
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn invalid_patch_is_rejected_before_touching_db() {
        let state = AppState::fake();
        let patch = ProfilePatch {
            weight: Some(Some(0.0)),
            ..Default::default()
        };
        let err = update_me(State(state), AuthUser(Uuid::new_v4()), Json(patch))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn profile_response_serialization() {
        let user = User {
            id: Uuid::new_v4(),
            email: "test@example.com".into(),
            password_hash: "secret-hash".into(),
            created_at: time::macros::datetime!(2024-01-01 12:00 UTC),
        };
        let profile = crate::nutrition::UserProfile {
            id: user.id,
            full_name: Some("Test".into()),
            age: None,
            weight: Some(70.0),
            height: None,
            gender: None,
            activity_level: None,
            calories_goal: 2000,
        };
        let json = serde_json::to_string(&ProfileResponse::new(user, profile)).unwrap();
        assert!(json.contains("test@example.com"));
        assert!(json.contains("\"calories_goal\":2000"));
        assert!(json.contains("2024-01-01T12:00:00Z"));
        assert!(!json.contains("secret-hash"));
    }
}
