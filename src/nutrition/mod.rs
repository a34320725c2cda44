//! Calorie goal calculation and meal aggregation.
//!
//! Everything here is independent of HTTP and Postgres: data access comes in
//! through [`MealSource`] and [`ProfileStore`].

mod error;
pub mod goal;
mod model;
mod profile;
mod store;
mod summary;

pub use error::NutritionError;
pub use goal::{compute_target_calories, DEFAULT_CALORIES_GOAL};
pub use model::{DateRange, MealRecord, UserProfile};
pub use profile::{apply_profile_update, ProfilePatch};
pub use store::{MealSource, ProfileStore};
pub use summary::{daily_summary, weekly_series, DailySummary, WeeklySeries};
