use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, Duration, OffsetDateTime, UtcOffset};
use uuid::Uuid;

/// Profile fields the goal calculation and summaries care about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct UserProfile {
    pub id: Uuid,
    pub full_name: Option<String>,
    pub age: Option<i32>,
    pub weight: Option<f64>,         // kg
    pub height: Option<f64>,         // cm
    pub gender: Option<String>,      // "male" / "female"
    pub activity_level: Option<String>,
    pub calories_goal: i32,
}

/// One logged meal as stored for its owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct MealRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub calories: i32,
    pub protein: f64,
    pub fats: f64,
    pub carbs: f64,
    pub weight_grams: Option<f64>,
    pub image_url: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl MealRecord {
    /// Calendar date the meal was logged on (UTC).
    pub fn logged_on(&self) -> Date {
        self.created_at.to_offset(UtcOffset::UTC).date()
    }
}

/// Inclusive range of calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: Date,
    pub end: Date,
}

impl DateRange {
    pub fn new(start: Date, end: Date) -> Self {
        debug_assert!(start <= end, "date range start after end");
        Self { start, end }
    }

    pub fn day(date: Date) -> Self {
        Self::new(date, date)
    }

    /// Seven days ending on `reference`, inclusive.
    pub fn trailing_week(reference: Date) -> Self {
        Self::new(reference - Duration::days(6), reference)
    }

    pub fn contains(&self, date: Date) -> bool {
        self.start <= date && date <= self.end
    }

    /// Half-open UTC timestamp bounds `[start 00:00, end+1 00:00)` for querying.
    pub fn utc_bounds(&self) -> (OffsetDateTime, OffsetDateTime) {
        let lower = self.start.midnight().assume_utc();
        let upper = (self.end + Duration::days(1)).midnight().assume_utc();
        (lower, upper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime};

    #[test]
    fn trailing_week_spans_seven_days() {
        let range = DateRange::trailing_week(date!(2024 - 03 - 02));
        assert_eq!(range.start, date!(2024 - 02 - 25));
        assert_eq!(range.end, date!(2024 - 03 - 02));
        assert!(range.contains(date!(2024 - 02 - 29)));
        assert!(!range.contains(date!(2024 - 02 - 24)));
        assert!(!range.contains(date!(2024 - 03 - 03)));
    }

    #[test]
    fn utc_bounds_cover_whole_last_day() {
        let (lower, upper) = DateRange::day(date!(2024 - 01 - 10)).utc_bounds();
        assert_eq!(lower, datetime!(2024-01-10 0:00 UTC));
        assert_eq!(upper, datetime!(2024-01-11 0:00 UTC));
    }

    #[test]
    fn logged_on_uses_utc_calendar_date() {
        let meal = MealRecord {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: "late snack".into(),
            calories: 100,
            protein: 0.0,
            fats: 0.0,
            carbs: 0.0,
            weight_grams: None,
            image_url: None,
            created_at: datetime!(2024-01-10 23:30 -02:00),
        };
        assert_eq!(meal.logged_on(), date!(2024 - 01 - 11));
    }
}
