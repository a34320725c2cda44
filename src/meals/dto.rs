use serde::{Deserialize, Serialize};
use time::Date;

use crate::vision::FoodAnalysis;

#[derive(Debug, Deserialize)]
pub struct CreateMealRequest {
    pub name: String,
    pub calories: i32,
    #[serde(default)]
    pub protein: f64,
    #[serde(default)]
    pub fats: f64,
    #[serde(default)]
    pub carbs: f64,
    pub weight_grams: Option<f64>,
    pub image_url: Option<String>,
}

/// Partial meal edit; absent fields are left as stored.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MealPatch {
    pub name: Option<String>,
    pub calories: Option<i32>,
    pub protein: Option<f64>,
    pub fats: Option<f64>,
    pub carbs: Option<f64>,
    pub weight_grams: Option<f64>,
    pub image_url: Option<String>,
}

fn check_grams(field: &str, v: Option<f64>) -> Result<(), String> {
    match v {
        Some(g) if !(g.is_finite() && g >= 0.0) => Err(format!("{field} must be >= 0")),
        _ => Ok(()),
    }
}

fn check_fields(
    name: Option<&str>,
    calories: Option<i32>,
    grams: [(&str, Option<f64>); 4],
) -> Result<(), String> {
    if name.is_some_and(|n| n.trim().is_empty()) {
        return Err("name must not be empty".into());
    }
    if calories.is_some_and(|c| c < 0) {
        return Err("calories must be >= 0".into());
    }
    for (field, v) in grams {
        check_grams(field, v)?;
    }
    Ok(())
}

impl CreateMealRequest {
    pub fn validate(&self) -> Result<(), String> {
        check_fields(
            Some(&self.name),
            Some(self.calories),
            [
                ("protein", Some(self.protein)),
                ("fats", Some(self.fats)),
                ("carbs", Some(self.carbs)),
                ("weight_grams", self.weight_grams),
            ],
        )
    }
}

impl MealPatch {
    pub fn validate(&self) -> Result<(), String> {
        check_fields(
            self.name.as_deref(),
            self.calories,
            [
                ("protein", self.protein),
                ("fats", self.fats),
                ("carbs", self.carbs),
                ("weight_grams", self.weight_grams),
            ],
        )
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
    pub date: Option<Date>,
}
fn default_limit() -> i64 {
    100
}

pub const MAX_LIMIT: i64 = 500;

#[derive(Debug, Deserialize)]
pub struct DateQuery {
    pub date: Option<Date>,
}

/// Analysis shown to the client for confirmation before the meal is saved.
#[derive(Debug, Serialize)]
pub struct AnalysisResponse {
    #[serde(flatten)]
    pub analysis: FoodAnalysis,
    pub image_url: String,
}
