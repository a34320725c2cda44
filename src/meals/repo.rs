use async_trait::async_trait;
use sqlx::PgPool;
use time::Date;
use uuid::Uuid;

use super::dto::{CreateMealRequest, MealPatch};
use crate::nutrition::{DateRange, MealRecord, MealSource};

pub async fn create(
    db: &PgPool,
    user_id: Uuid,
    meal: &CreateMealRequest,
) -> anyhow::Result<MealRecord> {
    let row = sqlx::query_as::<_, MealRecord>(
        r#"
        INSERT INTO meals (user_id, name, calories, protein, fats, carbs, weight_grams, image_url)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING id, user_id, name, calories, protein, fats, carbs, weight_grams, image_url, created_at
        "#,
    )
    .bind(user_id)
    .bind(meal.name.trim())
    .bind(meal.calories)
    .bind(meal.protein)
    .bind(meal.fats)
    .bind(meal.carbs)
    .bind(meal.weight_grams)
    .bind(&meal.image_url)
    .fetch_one(db)
    .await?;
    Ok(row)
}

/// Newest first, optionally restricted to one UTC calendar date.
pub async fn list_by_user(
    db: &PgPool,
    user_id: Uuid,
    date: Option<Date>,
    limit: i64,
    offset: i64,
) -> anyhow::Result<Vec<MealRecord>> {
    let (from, until) = match date {
        Some(d) => {
            let (lo, hi) = DateRange::day(d).utc_bounds();
            (Some(lo), Some(hi))
        }
        None => (None, None),
    };
    let rows = sqlx::query_as::<_, MealRecord>(
        r#"
        SELECT id, user_id, name, calories, protein, fats, carbs, weight_grams, image_url, created_at
        FROM meals
        WHERE user_id = $1
          AND ($2::timestamptz IS NULL OR created_at >= $2)
          AND ($3::timestamptz IS NULL OR created_at < $3)
        ORDER BY created_at DESC
        LIMIT $4 OFFSET $5
        "#,
    )
    .bind(user_id)
    .bind(from)
    .bind(until)
    .bind(limit)
    .bind(offset)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn get(db: &PgPool, user_id: Uuid, meal_id: Uuid) -> anyhow::Result<Option<MealRecord>> {
    let row = sqlx::query_as::<_, MealRecord>(
        r#"
        SELECT id, user_id, name, calories, protein, fats, carbs, weight_grams, image_url, created_at
        FROM meals
        WHERE id = $1 AND user_id = $2
        "#,
    )
    .bind(meal_id)
    .bind(user_id)
    .fetch_optional(db)
    .await?;
    Ok(row)
}

/// Applies present fields only; `created_at` never changes.
pub async fn update(
    db: &PgPool,
    user_id: Uuid,
    meal_id: Uuid,
    patch: &MealPatch,
) -> anyhow::Result<Option<MealRecord>> {
    let row = sqlx::query_as::<_, MealRecord>(
        r#"
        UPDATE meals
           SET name         = COALESCE($3, name),
               calories     = COALESCE($4, calories),
               protein      = COALESCE($5, protein),
               fats         = COALESCE($6, fats),
               carbs        = COALESCE($7, carbs),
               weight_grams = COALESCE($8, weight_grams),
               image_url    = COALESCE($9, image_url)
         WHERE id = $1 AND user_id = $2
        RETURNING id, user_id, name, calories, protein, fats, carbs, weight_grams, image_url, created_at
        "#,
    )
    .bind(meal_id)
    .bind(user_id)
    .bind(patch.name.as_deref().map(str::trim))
    .bind(patch.calories)
    .bind(patch.protein)
    .bind(patch.fats)
    .bind(patch.carbs)
    .bind(patch.weight_grams)
    .bind(&patch.image_url)
    .fetch_optional(db)
    .await?;
    Ok(row)
}

/// Returns the deleted meal's image locator, `None` if there was no such meal.
pub async fn delete(
    db: &PgPool,
    user_id: Uuid,
    meal_id: Uuid,
) -> anyhow::Result<Option<Option<String>>> {
    let row = sqlx::query_as::<_, (Option<String>,)>(
        r#"DELETE FROM meals WHERE id = $1 AND user_id = $2 RETURNING image_url"#,
    )
    .bind(meal_id)
    .bind(user_id)
    .fetch_optional(db)
    .await?;
    Ok(row.map(|(image_url,)| image_url))
}

pub async fn image_keys_for_user(db: &PgPool, user_id: Uuid) -> anyhow::Result<Vec<String>> {
    let rows = sqlx::query_as::<_, (String,)>(
        r#"SELECT image_url FROM meals WHERE user_id = $1 AND image_url IS NOT NULL"#,
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;
    Ok(rows
        .into_iter()
        .map(|(key,)| key)
        .filter(|key| crate::storage::owned_by(key, user_id))
        .collect())
}

#[async_trait]
impl MealSource for PgPool {
    async fn fetch_meals(
        &self,
        user_id: Uuid,
        range: DateRange,
    ) -> anyhow::Result<Vec<MealRecord>> {
        let (from, until) = range.utc_bounds();
        let rows = sqlx::query_as::<_, MealRecord>(
            r#"
            SELECT id, user_id, name, calories, protein, fats, carbs, weight_grams, image_url, created_at
            FROM meals
            WHERE user_id = $1 AND created_at >= $2 AND created_at < $3
            "#,
        )
        .bind(user_id)
        .bind(from)
        .bind(until)
        .fetch_all(self)
        .await?;
        Ok(rows)
    }
}
