use serde::{Deserialize, Deserializer};
use tracing::{debug, instrument};
use uuid::Uuid;

use super::error::NutritionError;
use super::goal::compute_target_calories;
use super::model::UserProfile;
use super::store::ProfileStore;

/// Partial profile update. An absent field leaves the stored value
/// untouched (`None`); an explicit `null` clears it (`Some(None)`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfilePatch {
    #[serde(default, deserialize_with = "present")]
    pub full_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub age: Option<Option<i32>>,
    #[serde(default, deserialize_with = "present")]
    pub weight: Option<Option<f64>>,
    #[serde(default, deserialize_with = "present")]
    pub height: Option<Option<f64>>,
    #[serde(default, deserialize_with = "present")]
    pub gender: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub activity_level: Option<Option<String>>,
}

// only called for keys present in the payload, so `null` becomes Some(None)
fn present<'de, T, D>(d: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(d).map(Some)
}

impl ProfilePatch {
    /// Whether any field feeding the goal calculation is present, null included.
    pub fn touches_physiology(&self) -> bool {
        self.age.is_some()
            || self.weight.is_some()
            || self.height.is_some()
            || self.gender.is_some()
            || self.activity_level.is_some()
    }

    pub fn apply_to(&self, profile: &mut UserProfile) {
        if let Some(v) = &self.full_name {
            profile.full_name = v.clone();
        }
        if let Some(v) = self.age {
            profile.age = v;
        }
        if let Some(v) = self.weight {
            profile.weight = v;
        }
        if let Some(v) = self.height {
            profile.height = v;
        }
        if let Some(v) = &self.gender {
            profile.gender = v.clone();
        }
        if let Some(v) = &self.activity_level {
            profile.activity_level = v.clone();
        }
    }
}

/// Applies `patch` to the stored profile, recomputes the goal when a
/// physiological field is present, and writes both back in one call.
///
/// Atomicity is the store's job: pass a store bound to a single transaction
/// with the row locked.
#[instrument(skip(store, patch))]
pub async fn apply_profile_update<S>(
    store: &S,
    user_id: Uuid,
    patch: &ProfilePatch,
) -> Result<UserProfile, NutritionError>
where
    S: ProfileStore + ?Sized,
{
    let mut profile = store
        .read_profile(user_id)
        .await
        .map_err(NutritionError::DataAccess)?
        .ok_or(NutritionError::ProfileNotFound(user_id))?;

    patch.apply_to(&mut profile);

    if patch.touches_physiology() {
        let goal = compute_target_calories(&profile);
        if goal <= 0 {
            return Err(NutritionError::InvariantViolation(format!(
                "computed calories goal {goal} is not positive"
            )));
        }
        debug!(%user_id, old = profile.calories_goal, new = goal, "calories goal recomputed");
        profile.calories_goal = goal;
    }

    store
        .write_profile(&profile)
        .await
        .map_err(NutritionError::DataAccess)?;
    Ok(profile)
}
