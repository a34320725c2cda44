//! Daily calorie target from a user's physiology.
//!
//! Mifflin-St Jeor BMR scaled by an activity multiplier (maintenance TDEE).

use super::model::UserProfile;

/// Goal used whenever the profile is too incomplete to compute one.
pub const DEFAULT_CALORIES_GOAL: i32 = 2000;

const MALE_OFFSET: f64 = 5.0;
const FEMALE_OFFSET: f64 = -161.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityLevel {
    Sedentary,  // little or no exercise
    Light,      // 1-3 days/week
    Moderate,   // 3-5 days/week
    Active,     // 6-7 days/week
    VeryActive, // hard daily training or physical job
}

impl ActivityLevel {
    /// Case-insensitive exact match on the stored string.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "sedentary" => Some(Self::Sedentary),
            "light" => Some(Self::Light),
            "moderate" => Some(Self::Moderate),
            "active" => Some(Self::Active),
            "very_active" => Some(Self::VeryActive),
            _ => None,
        }
    }

    /// Unset or unrecognized levels count as sedentary.
    pub fn from_stored(raw: Option<&str>) -> Self {
        raw.and_then(Self::parse).unwrap_or(Self::Sedentary)
    }

    pub fn multiplier(self) -> f64 {
        match self {
            Self::Sedentary => 1.2,
            Self::Light => 1.375,
            Self::Moderate => 1.55,
            Self::Active => 1.725,
            Self::VeryActive => 1.9,
        }
    }
}

/// Maintenance calories for `profile`, truncated toward zero.
///
/// Returns [`DEFAULT_CALORIES_GOAL`] if weight, height, age or sex is missing.
/// Non-positive numbers and an empty sex string count as missing. Any other
/// present sex than "male" (case-insensitive), whitespace included, uses the
/// female offset.
pub fn compute_target_calories(profile: &UserProfile) -> i32 {
    let weight = profile.weight.filter(|w| w.is_finite() && *w > 0.0);
    let height = profile.height.filter(|h| h.is_finite() && *h > 0.0);
    let age = profile.age.filter(|a| *a > 0);
    let gender = profile.gender.as_deref().filter(|g| !g.is_empty());

    let (Some(weight), Some(height), Some(age), Some(gender)) = (weight, height, age, gender)
    else {
        return DEFAULT_CALORIES_GOAL;
    };

    let mut bmr = 10.0 * weight + 6.25 * height - 5.0 * f64::from(age);
    bmr += if gender.eq_ignore_ascii_case("male") {
        MALE_OFFSET
    } else {
        FEMALE_OFFSET
    };

    let multiplier = ActivityLevel::from_stored(profile.activity_level.as_deref()).multiplier();
    (bmr * multiplier).trunc() as i32
}
