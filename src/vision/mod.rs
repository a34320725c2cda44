//! Photo analysis through an external vision model.

mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};

pub use openai::OpenAiVision;

/// Nutrition estimate for one photographed meal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodAnalysis {
    pub name: String,
    #[serde(default, deserialize_with = "whole_non_negative")]
    pub calories: i32,
    #[serde(default, deserialize_with = "non_negative")]
    pub protein: f64,
    #[serde(default, deserialize_with = "non_negative")]
    pub fats: f64,
    #[serde(default, deserialize_with = "non_negative")]
    pub carbs: f64,
    #[serde(default, deserialize_with = "non_negative")]
    pub weight_grams: f64,
    #[serde(default = "default_is_food")]
    pub is_food: bool,
}

fn default_is_food() -> bool {
    true
}

// models sometimes answer 512.0 or -0 for integers
fn whole_non_negative<'de, D: Deserializer<'de>>(d: D) -> Result<i32, D::Error> {
    let v = f64::deserialize(d)?;
    Ok(v.max(0.0).round() as i32)
}

fn non_negative<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    Ok(f64::deserialize(d)?.max(0.0))
}

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("vision request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("vision service returned {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("vision service returned an empty result")]
    Empty,
    #[error("vision result is not a valid analysis: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Opaque image-analysis capability.
#[async_trait]
pub trait FoodAnalyzer: Send + Sync {
    async fn analyze(&self, image: &[u8], content_type: &str)
        -> Result<FoodAnalysis, AnalysisError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lenient_numbers_and_defaults() {
        let a: FoodAnalysis = serde_json::from_str(
            r#"{"name":"Borscht","calories":412.6,"protein":-1,"carbs":30.5}"#,
        )
        .unwrap();
        assert_eq!(a.calories, 413);
        assert_eq!(a.protein, 0.0);
        assert_eq!(a.fats, 0.0);
        assert_eq!(a.carbs, 30.5);
        assert!(a.is_food);
    }

    #[test]
    fn not_food_is_kept() {
        let a: FoodAnalysis =
            serde_json::from_str(r#"{"name":"Not food","calories":0,"is_food":false}"#).unwrap();
        assert!(!a.is_food);
    }
}
