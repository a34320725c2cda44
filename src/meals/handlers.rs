use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use time::{Date, OffsetDateTime};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::dto::{
    AnalysisResponse, CreateMealRequest, DateQuery, ListQuery, MealPatch, MAX_LIMIT,
};
use super::repo;
use crate::{
    auth::jwt::AuthUser,
    errors::{self, internal, ApiError},
    nutrition::{self, DailySummary, MealRecord, WeeklySeries},
    state::AppState,
    storage::{owned_by, photo_key},
};

const PHOTO_URL_TTL_SECS: u64 = 10 * 60;

// --- public routers ---

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/meals", get(list_meals))
        .route("/meals/summary", get(daily_summary))
        .route("/meals/weekly-stats", get(weekly_stats))
        .route("/meals/:id", get(get_meal))
        .route("/meals/:id/photo", get(get_photo)) // 302 to a presigned url
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/meals", post(create_meal))
        .route(
            "/meals/:id",
            axum::routing::put(update_meal)
                .patch(update_meal)
                .delete(delete_meal),
        )
        .route("/meals/analyze", post(analyze_meal))
        .layer(DefaultBodyLimit::max(20 * 1024 * 1024)) // 20MB
}

fn today() -> Date {
    OffsetDateTime::now_utc().date()
}

fn not_found() -> ApiError {
    (StatusCode::NOT_FOUND, "Meal not found".into())
}

// --- meal CRUD ---

#[instrument(skip(state, body))]
pub async fn create_meal(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<CreateMealRequest>,
) -> Result<(StatusCode, HeaderMap, Json<MealRecord>), ApiError> {
    if let Err(msg) = body.validate() {
        warn!(%user_id, %msg, "invalid meal");
        return Err((StatusCode::BAD_REQUEST, msg));
    }

    let meal = repo::create(&state.db, user_id, &body)
        .await
        .map_err(internal)?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::LOCATION,
        HeaderValue::from_str(&format!("/api/v1/meals/{}", meal.id)).map_err(internal)?,
    );

    info!(%user_id, meal_id = %meal.id, calories = meal.calories, "meal created");
    Ok((StatusCode::CREATED, headers, Json(meal)))
}

#[instrument(skip(state))]
pub async fn list_meals(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(q): Query<ListQuery>,
) -> Result<Json<Vec<MealRecord>>, ApiError> {
    let limit = q.limit.clamp(1, MAX_LIMIT);
    let offset = q.skip.max(0);
    let meals = repo::list_by_user(&state.db, user_id, q.date, limit, offset)
        .await
        .map_err(internal)?;
    Ok(Json(meals))
}

#[instrument(skip(state))]
pub async fn get_meal(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<MealRecord>, ApiError> {
    repo::get(&state.db, user_id, id)
        .await
        .map_err(internal)?
        .map(Json)
        .ok_or_else(not_found)
}

#[instrument(skip(state, patch))]
pub async fn update_meal(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    Json(patch): Json<MealPatch>,
) -> Result<Json<MealRecord>, ApiError> {
    if let Err(msg) = patch.validate() {
        warn!(%user_id, %id, %msg, "invalid meal patch");
        return Err((StatusCode::BAD_REQUEST, msg));
    }
    let meal = repo::update(&state.db, user_id, id, &patch)
        .await
        .map_err(internal)?
        .ok_or_else(not_found)?;
    info!(%user_id, meal_id = %id, "meal updated");
    Ok(Json(meal))
}

#[instrument(skip(state))]
pub async fn delete_meal(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let image_url = repo::delete(&state.db, user_id, id)
        .await
        .map_err(internal)?
        .ok_or_else(not_found)?;

    if let Some(key) = image_url.filter(|k| owned_by(k, user_id)) {
        if let Err(e) = state.storage.delete_photo(&key).await {
            warn!(error = %e, %key, "photo delete failed");
        }
    }
    info!(%user_id, meal_id = %id, "meal deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn get_photo(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let meal = repo::get(&state.db, user_id, id)
        .await
        .map_err(internal)?
        .ok_or_else(not_found)?;

    let Some(key) = meal.image_url.filter(|k| owned_by(k, user_id)) else {
        return Err((StatusCode::NOT_FOUND, "Photo not found".into()));
    };

    let url = state
        .storage
        .presign_get(&key, PHOTO_URL_TTL_SECS)
        .await
        .map_err(|e| {
            error!(error = %e, %key, "presign failed");
            internal(e)
        })?;
    photo_redirect(&url)
}

/// 302 Found pointing at the presigned url.
fn photo_redirect(url: &str) -> Result<Response, ApiError> {
    let location = HeaderValue::from_str(url).map_err(internal)?;
    Ok((StatusCode::FOUND, [(header::LOCATION, location)]).into_response())
}

// --- summaries ---

#[instrument(skip(state))]
pub async fn daily_summary(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(q): Query<DateQuery>,
) -> Result<Json<DailySummary>, ApiError> {
    let date = q.date.unwrap_or_else(today);
    nutrition::daily_summary(&state.db, &state.db, user_id, date)
        .await
        .map(Json)
        .map_err(errors::nutrition)
}

#[instrument(skip(state))]
pub async fn weekly_stats(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(q): Query<DateQuery>,
) -> Result<Json<WeeklySeries>, ApiError> {
    let reference = q.date.unwrap_or_else(today);
    nutrition::weekly_series(&state.db, user_id, reference)
        .await
        .map(Json)
        .map_err(errors::nutrition)
}

// --- photo analysis ---

/// POST /meals/analyze (multipart, field `file`)
#[instrument(skip(state, mp))]
pub async fn analyze_meal(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    AuthUser(user_id): AuthUser,
    mut mp: Multipart,
) -> Result<Json<AnalysisResponse>, ApiError> {
    if !state.analyze_limiter.check(addr.ip()) {
        warn!(%user_id, ip = %addr.ip(), "analyze rate limit hit");
        return Err((
            StatusCode::TOO_MANY_REQUESTS,
            "Too many analysis requests, try again in a minute".into(),
        ));
    }

    let mut upload: Option<(Bytes, String)> = None;
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?
    {
        if field.name() == Some("file") {
            let content_type = field
                .content_type()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "application/octet-stream".into());
            let data = field
                .bytes()
                .await
                .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
            upload = Some((data, content_type));
            break;
        }
    }
    let Some((body, content_type)) = upload else {
        return Err((StatusCode::BAD_REQUEST, "file is required".into()));
    };

    analyze_upload(&state, user_id, body, &content_type)
        .await
        .map(Json)
}

/// Stores the photo, runs the analyzer, and drops the photo again unless
/// the result is food the client can confirm.
pub(crate) async fn analyze_upload(
    state: &AppState,
    user_id: Uuid,
    body: Bytes,
    content_type: &str,
) -> Result<AnalysisResponse, ApiError> {
    if body.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "file is empty".into()));
    }
    if !content_type.starts_with("image/") {
        return Err((StatusCode::BAD_REQUEST, "file must be an image".into()));
    }

    let key = photo_key(user_id, Uuid::new_v4(), content_type);
    state
        .storage
        .put_photo(&key, body.clone(), content_type)
        .await
        .map_err(internal)?;

    let discard = |reason: &'static str| {
        let storage = state.storage.clone();
        let key = key.clone();
        async move {
            if let Err(e) = storage.delete_photo(&key).await {
                warn!(error = %e, %key, reason, "photo cleanup failed");
            }
        }
    };

    let analysis = match state.analyzer.analyze(&body, content_type).await {
        Ok(a) => a,
        Err(e) => {
            error!(error = %e, %user_id, "photo analysis failed");
            discard("analysis failed").await;
            return Err((StatusCode::BAD_GATEWAY, "AI analysis failed".into()));
        }
    };

    if !analysis.is_food {
        info!(%user_id, "analyzed photo is not food");
        discard("not food").await;
        return Err((
            StatusCode::BAD_REQUEST,
            "AI did not detect food in this image. Please try again.".into(),
        ));
    }

    info!(%user_id, name = %analysis.name, calories = analysis.calories, "photo analyzed");
    Ok(AnalysisResponse {
        analysis,
        image_url: key,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::async_trait;

    use super::*;
    use crate::storage::PhotoStorage;
    use crate::vision::{AnalysisError, FoodAnalysis, FoodAnalyzer};

    #[derive(Default)]
    struct RecordingStorage {
        puts: Mutex<Vec<String>>,
        deletes: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PhotoStorage for RecordingStorage {
        async fn put_photo(&self, k: &str, _b: Bytes, _ct: &str) -> anyhow::Result<()> {
            self.puts.lock().unwrap().push(k.to_string());
            Ok(())
        }
        async fn delete_photo(&self, k: &str) -> anyhow::Result<()> {
            self.deletes.lock().unwrap().push(k.to_string());
            Ok(())
        }
        async fn presign_get(&self, k: &str, _s: u64) -> anyhow::Result<String> {
            Ok(format!("https://fake.local/{}", k))
        }
    }

    struct NotFood;
    #[async_trait]
    impl FoodAnalyzer for NotFood {
        async fn analyze(&self, _i: &[u8], _ct: &str) -> Result<FoodAnalysis, AnalysisError> {
            Ok(FoodAnalysis {
                name: "Not food".into(),
                calories: 0,
                protein: 0.0,
                fats: 0.0,
                carbs: 0.0,
                weight_grams: 0.0,
                is_food: false,
            })
        }
    }

    struct Broken;
    #[async_trait]
    impl FoodAnalyzer for Broken {
        async fn analyze(&self, _i: &[u8], _ct: &str) -> Result<FoodAnalysis, AnalysisError> {
            Err(AnalysisError::Empty)
        }
    }

    fn state_with(analyzer: Arc<dyn FoodAnalyzer>) -> (AppState, Arc<RecordingStorage>) {
        let storage = Arc::new(RecordingStorage::default());
        let mut state = AppState::fake();
        state.storage = storage.clone();
        state.analyzer = analyzer;
        (state, storage)
    }

    #[tokio::test]
    async fn food_photo_is_kept_and_returned() {
        let (state, storage) = state_with(AppState::fake().analyzer);
        let user = Uuid::new_v4();
        let resp = analyze_upload(&state, user, Bytes::from_static(b"jpeg"), "image/jpeg")
            .await
            .unwrap();
        assert_eq!(resp.analysis.name, "Oatmeal");
        assert!(resp.image_url.starts_with(&format!("meals/{}/", user)));
        assert!(resp.image_url.ends_with(".jpg"));
        assert_eq!(storage.puts.lock().unwrap().as_slice(), &[resp.image_url.clone()]);
        assert!(storage.deletes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn not_food_is_rejected_and_photo_removed() {
        let (state, storage) = state_with(Arc::new(NotFood));
        let err = analyze_upload(&state, Uuid::new_v4(), Bytes::from_static(b"png"), "image/png")
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
        assert_eq!(*storage.puts.lock().unwrap(), *storage.deletes.lock().unwrap());
    }

    #[tokio::test]
    async fn analyzer_failure_removes_photo() {
        let (state, storage) = state_with(Arc::new(Broken));
        let err = analyze_upload(&state, Uuid::new_v4(), Bytes::from_static(b"png"), "image/png")
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_GATEWAY);
        assert_eq!(storage.deletes.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn non_images_are_rejected_before_upload() {
        let (state, storage) = state_with(Arc::new(Broken));
        let err = analyze_upload(&state, Uuid::new_v4(), Bytes::from_static(b"%PDF"), "application/pdf")
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
        assert!(storage.puts.lock().unwrap().is_empty());
    }

    #[test]
    fn photo_redirect_is_302_found() {
        let res = photo_redirect("https://fake.local/meals/u/p.jpg?sig=abc").unwrap();
        assert_eq!(res.status(), StatusCode::FOUND);
        assert_eq!(
            res.headers()[header::LOCATION],
            "https://fake.local/meals/u/p.jpg?sig=abc"
        );
        assert!(photo_redirect("bad\nurl").is_err());
    }

    #[tokio::test]
    async fn invalid_meal_is_rejected_before_touching_db() {
        let state = AppState::fake();
        let body = CreateMealRequest {
            name: "".into(),
            calories: 100,
            protein: 0.0,
            fats: 0.0,
            carbs: 0.0,
            weight_grams: None,
            image_url: None,
        };
        let err = create_meal(State(state), AuthUser(Uuid::new_v4()), Json(body))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }
}
