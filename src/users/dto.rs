use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::repo::User;
use crate::nutrition::{ProfilePatch, UserProfile};

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub age: Option<i32>,
    pub weight: Option<f64>,
    pub height: Option<f64>,
    pub gender: Option<String>,
    pub activity_level: Option<String>,
    pub calories_goal: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl ProfileResponse {
    pub fn new(user: User, profile: UserProfile) -> Self {
        Self {
            id: user.id,
            email: user.email,
            full_name: profile.full_name,
            age: profile.age,
            weight: profile.weight,
            height: profile.height,
            gender: profile.gender,
            activity_level: profile.activity_level,
            calories_goal: profile.calories_goal,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Input checks for a profile patch; the goal calculation itself never rejects.
/// `null` clears a field and is always accepted.
pub fn validate_patch(p: &ProfilePatch) -> Result<(), String> {
    if let Some(Some(name)) = &p.full_name {
        if name.trim().is_empty() {
            return Err("full_name must not be empty".into());
        }
    }
    if let Some(Some(age)) = p.age {
        if !(1..=150).contains(&age) {
            return Err("age must be between 1 and 150".into());
        }
    }
    if let Some(Some(w)) = p.weight {
        if !(w.is_finite() && w > 0.0 && w < 1000.0) {
            return Err("weight must be a positive number of kg".into());
        }
    }
    if let Some(Some(h)) = p.height {
        if !(h.is_finite() && h > 0.0 && h < 300.0) {
            return Err("height must be a positive number of cm".into());
        }
    }
    Ok(())
}
