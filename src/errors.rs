use axum::http::StatusCode;
use tracing::error;

use crate::nutrition::NutritionError;

pub type ApiError = (StatusCode, String);

pub fn internal<E: std::fmt::Display>(e: E) -> ApiError {
    error!(error = %e, "internal error");
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

pub fn nutrition(e: NutritionError) -> ApiError {
    match e {
        NutritionError::DataAccess(_) => internal(e),
        NutritionError::ProfileNotFound(_) => (StatusCode::NOT_FOUND, "User not found".into()),
        NutritionError::InvariantViolation(_) => {
            error!(error = %e, "nutrition invariant violated");
            (StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
        }
    }
}
