use serde::{ser::Error as _, Serialize, Serializer};
use time::{Date, Duration};
use tracing::{debug, instrument};
use uuid::Uuid;

use super::error::NutritionError;
use super::model::{DateRange, MealRecord};
use super::store::{MealSource, ProfileStore};

const WEEK_DAYS: usize = 7;

/// Totals for one user and one calendar date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySummary {
    pub date: Date,
    pub total_calories: i64,
    pub goal_calories: i32,
    pub remaining_calories: i64,
    #[serde(serialize_with = "one_decimal")]
    pub total_protein: f64,
    #[serde(serialize_with = "one_decimal")]
    pub total_fats: f64,
    #[serde(serialize_with = "one_decimal")]
    pub total_carbs: f64,
    pub meal_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DayCalories {
    pub date: Date,
    pub total_calories: i64,
}

/// Calories per day over the trailing week, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct WeeklySeries(pub Vec<DayCalories>);

#[cfg(test)]
impl WeeklySeries {
    pub fn grand_total(&self) -> i64 {
        self.0.iter().map(|d| d.total_calories).sum()
    }
}

/// Rounds on the decimal value with ties to even, so 0.25 becomes 0.2.
fn one_decimal<S: Serializer>(value: &f64, s: S) -> Result<S::Ok, S::Error> {
    let rounded: f64 = format!("{:.1}", value).parse().map_err(S::Error::custom)?;
    s.serialize_f64(rounded)
}

/// Folds the meals logged on `date` into a summary against `goal`.
/// Meals from other dates are ignored.
pub fn summarize_day(
    date: Date,
    goal: i32,
    meals: &[MealRecord],
) -> Result<DailySummary, NutritionError> {
    if goal <= 0 {
        return Err(NutritionError::InvariantViolation(format!(
            "stored calories goal {goal} is not positive"
        )));
    }

    let mut summary = DailySummary {
        date,
        total_calories: 0,
        goal_calories: goal,
        remaining_calories: 0,
        total_protein: 0.0,
        total_fats: 0.0,
        total_carbs: 0.0,
        meal_count: 0,
    };
    for meal in meals.iter().filter(|m| m.logged_on() == date) {
        summary.total_calories += i64::from(meal.calories);
        summary.total_protein += meal.protein;
        summary.total_fats += meal.fats;
        summary.total_carbs += meal.carbs;
        summary.meal_count += 1;
    }
    summary.remaining_calories = i64::from(goal) - summary.total_calories;
    Ok(summary)
}

/// Buckets meals into the seven days ending on `reference`.
/// Meals outside the window are ignored.
pub fn bucket_week(reference: Date, meals: &[MealRecord]) -> WeeklySeries {
    let window = DateRange::trailing_week(reference);
    let mut totals = [0_i64; WEEK_DAYS];

    for meal in meals {
        let day = meal.logged_on();
        if !window.contains(day) {
            continue;
        }
        let offset = (day - window.start).whole_days();
        let slot = usize::try_from(offset)
            .ok()
            .filter(|i| *i < WEEK_DAYS)
            .unwrap_or_else(|| panic!("bucket offset {offset} outside weekly window"));
        totals[slot] += i64::from(meal.calories);
    }

    WeeklySeries(
        totals
            .iter()
            .enumerate()
            .map(|(i, total)| DayCalories {
                date: window.start + Duration::days(i as i64),
                total_calories: *total,
            })
            .collect(),
    )
}

/// Summary of `user_id`'s meals on `date` against their stored goal.
#[instrument(skip(meals, profiles))]
pub async fn daily_summary<M, P>(
    meals: &M,
    profiles: &P,
    user_id: Uuid,
    date: Date,
) -> Result<DailySummary, NutritionError>
where
    M: MealSource + ?Sized,
    P: ProfileStore + ?Sized,
{
    let profile = profiles
        .read_profile(user_id)
        .await
        .map_err(NutritionError::DataAccess)?
        .ok_or(NutritionError::ProfileNotFound(user_id))?;

    let records = meals
        .fetch_meals(user_id, DateRange::day(date))
        .await
        .map_err(NutritionError::DataAccess)?;

    let summary = summarize_day(date, profile.calories_goal, &records)?;
    debug!(%user_id, meal_count = summary.meal_count, total = summary.total_calories, "daily summary");
    Ok(summary)
}

/// Calories per day for the week ending on `reference`, one fetch.
#[instrument(skip(meals))]
pub async fn weekly_series<M>(
    meals: &M,
    user_id: Uuid,
    reference: Date,
) -> Result<WeeklySeries, NutritionError>
where
    M: MealSource + ?Sized,
{
    let records = meals
        .fetch_meals(user_id, DateRange::trailing_week(reference))
        .await
        .map_err(NutritionError::DataAccess)?;
    Ok(bucket_week(reference, &records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nutrition::goal::DEFAULT_CALORIES_GOAL;
    use crate::nutrition::model::UserProfile;
    use crate::nutrition::store::memory::MemoryStore;
    use time::macros::{date, datetime};
    use time::OffsetDateTime;

    fn meal(user_id: Uuid, at: OffsetDateTime, calories: i32) -> MealRecord {
        MealRecord {
            id: Uuid::new_v4(),
            user_id,
            name: "meal".into(),
            calories,
            protein: 10.25,
            fats: 5.0,
            carbs: 20.04,
            weight_grams: None,
            image_url: None,
            created_at: at,
        }
    }

    fn store_for(goal: i32) -> (MemoryStore, Uuid) {
        let profile = UserProfile {
            id: Uuid::new_v4(),
            full_name: None,
            age: None,
            weight: None,
            height: None,
            gender: None,
            activity_level: None,
            calories_goal: goal,
        };
        let id = profile.id;
        (MemoryStore::with_profile(profile), id)
    }

    #[tokio::test]
    async fn empty_day_is_zeroes() {
        let (store, user) = store_for(DEFAULT_CALORIES_GOAL);
        let s = daily_summary(&store, &store, user, date!(2024 - 05 - 01))
            .await
            .unwrap();
        assert_eq!(s.total_calories, 0);
        assert_eq!(s.total_protein, 0.0);
        assert_eq!(s.total_fats, 0.0);
        assert_eq!(s.total_carbs, 0.0);
        assert_eq!(s.meal_count, 0);
        assert_eq!(s.remaining_calories, i64::from(DEFAULT_CALORIES_GOAL));
    }

    #[tokio::test]
    async fn sums_only_the_requested_day() {
        let (store, user) = store_for(2500);
        store.push_meal(meal(user, datetime!(2024-05-01 08:00 UTC), 500));
        store.push_meal(meal(user, datetime!(2024-05-01 19:30 UTC), 300));
        store.push_meal(meal(user, datetime!(2024-05-02 00:10 UTC), 900));
        store.push_meal(meal(Uuid::new_v4(), datetime!(2024-05-01 12:00 UTC), 700));

        let s = daily_summary(&store, &store, user, date!(2024 - 05 - 01))
            .await
            .unwrap();
        assert_eq!(s.total_calories, 800);
        assert_eq!(s.meal_count, 2);
        assert_eq!(s.goal_calories, 2500);
        assert_eq!(s.remaining_calories, 1700);
        assert!((s.total_protein - 20.5).abs() < 1e-9);
    }

    #[test]
    fn remaining_goes_negative_without_clamping() {
        let user = Uuid::new_v4();
        let meals = vec![meal(user, datetime!(2024-05-01 08:00 UTC), 2600)];
        let s = summarize_day(date!(2024 - 05 - 01), 2000, &meals).unwrap();
        assert_eq!(s.remaining_calories, -600);
    }

    #[test]
    fn non_positive_goal_fails_loudly() {
        let err = summarize_day(date!(2024 - 05 - 01), 0, &[]).unwrap_err();
        assert!(matches!(err, NutritionError::InvariantViolation(_)));
    }

    #[test]
    fn macros_are_rounded_when_serialized() {
        let user = Uuid::new_v4();
        let meals = vec![
            meal(user, datetime!(2024-05-01 08:00 UTC), 100),
            meal(user, datetime!(2024-05-01 09:00 UTC), 100),
        ];
        let s = summarize_day(date!(2024 - 05 - 01), 2000, &meals).unwrap();
        assert!((s.total_carbs - 40.08).abs() < 1e-9);

        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["total_carbs"], serde_json::json!(40.1));
        assert_eq!(json["total_protein"], serde_json::json!(20.5));
        assert_eq!(json["date"], serde_json::json!("2024-05-01"));
    }

    #[test]
    fn half_gram_ties_round_to_even() {
        let mut m = meal(Uuid::new_v4(), datetime!(2024-05-01 08:00 UTC), 50);
        m.protein = 0.25;
        m.fats = 1.25;
        m.carbs = 0.35;
        let s = summarize_day(date!(2024 - 05 - 01), 2000, &[m]).unwrap();

        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["total_protein"], serde_json::json!(0.2));
        assert_eq!(json["total_fats"], serde_json::json!(1.2));
        assert_eq!(json["total_carbs"], serde_json::json!(0.3));
    }

    #[tokio::test]
    async fn weekly_series_has_seven_ascending_days() {
        let (store, user) = store_for(2000);
        let reference = date!(2024 - 03 - 02);
        store.push_meal(meal(user, datetime!(2024-02-25 07:00 UTC), 400));
        store.push_meal(meal(user, datetime!(2024-02-29 12:00 UTC), 650));
        store.push_meal(meal(user, datetime!(2024-02-29 20:00 UTC), 350));
        store.push_meal(meal(user, datetime!(2024-03-02 23:59 UTC), 200));
        // outside the window
        store.push_meal(meal(user, datetime!(2024-02-24 23:59 UTC), 9999));

        let series = weekly_series(&store, user, reference).await.unwrap();
        assert_eq!(series.0.len(), 7);
        assert_eq!(series.0[0].date, date!(2024 - 02 - 25));
        assert_eq!(series.0[6].date, reference);
        assert!(series.0.windows(2).all(|w| w[0].date < w[1].date));

        let totals: Vec<i64> = series.0.iter().map(|d| d.total_calories).collect();
        assert_eq!(totals, vec![400, 0, 0, 0, 1000, 0, 200]);
        assert_eq!(series.grand_total(), 1600);
    }

    #[test]
    fn bucket_week_ignores_out_of_window_records() {
        let user = Uuid::new_v4();
        let meals = vec![
            meal(user, datetime!(2024-01-01 10:00 UTC), 100),
            meal(user, datetime!(2024-01-09 10:00 UTC), 100),
        ];
        let series = bucket_week(date!(2024 - 01 - 08), &meals);
        assert_eq!(series.grand_total(), 0);
        assert_eq!(series.0.len(), 7);
    }

    #[tokio::test]
    async fn repeated_reads_are_identical() {
        let (store, user) = store_for(2100);
        store.push_meal(meal(user, datetime!(2024-05-01 08:00 UTC), 500));
        store.push_meal(meal(user, datetime!(2024-04-28 08:00 UTC), 320));
        let day = date!(2024 - 05 - 01);

        let a = daily_summary(&store, &store, user, day).await.unwrap();
        let b = daily_summary(&store, &store, user, day).await.unwrap();
        assert_eq!(a, b);

        let w1 = serde_json::to_string(&weekly_series(&store, user, day).await.unwrap()).unwrap();
        let w2 = serde_json::to_string(&weekly_series(&store, user, day).await.unwrap()).unwrap();
        assert_eq!(w1, w2);
    }

    #[tokio::test]
    async fn fetch_failure_surfaces_as_data_access() {
        let store = MemoryStore::failing();
        let err = weekly_series(&store, Uuid::new_v4(), date!(2024 - 05 - 01))
            .await
            .unwrap_err();
        assert!(matches!(err, NutritionError::DataAccess(_)));
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let store = MemoryStore::default();
        let err = daily_summary(&store, &store, Uuid::new_v4(), date!(2024 - 05 - 01))
            .await
            .unwrap_err();
        assert!(matches!(err, NutritionError::ProfileNotFound(_)));
    }
}
