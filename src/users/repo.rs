use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::nutrition::{ProfileStore, UserProfile};

const SELECT_PROFILE: &str = r#"
    SELECT id, full_name, age, weight, height, gender, activity_level, calories_goal
    FROM users
    WHERE id = $1
"#;

const SELECT_PROFILE_FOR_UPDATE: &str = r#"
    SELECT id, full_name, age, weight, height, gender, activity_level, calories_goal
    FROM users
    WHERE id = $1
    FOR UPDATE
"#;

const UPDATE_PROFILE: &str = r#"
    UPDATE users
       SET full_name = $2,
           age = $3,
           weight = $4,
           height = $5,
           gender = $6,
           activity_level = $7,
           calories_goal = $8
     WHERE id = $1
"#;

fn update_query(profile: &UserProfile) -> sqlx::query::Query<'_, Postgres, sqlx::postgres::PgArguments> {
    sqlx::query(UPDATE_PROFILE)
        .bind(profile.id)
        .bind(&profile.full_name)
        .bind(profile.age)
        .bind(profile.weight)
        .bind(profile.height)
        .bind(&profile.gender)
        .bind(&profile.activity_level)
        .bind(profile.calories_goal)
}

/// Plain pool access: reads are snapshots, writes are single statements.
#[async_trait]
impl ProfileStore for PgPool {
    async fn read_profile(&self, user_id: Uuid) -> anyhow::Result<Option<UserProfile>> {
        let profile = sqlx::query_as::<_, UserProfile>(SELECT_PROFILE)
            .bind(user_id)
            .fetch_optional(self)
            .await?;
        Ok(profile)
    }

    async fn write_profile(&self, profile: &UserProfile) -> anyhow::Result<()> {
        update_query(profile).execute(self).await?;
        Ok(())
    }
}

/// Profile access bound to one transaction. The row is locked on read, so
/// the field changes and the recomputed goal land together.
pub struct ProfileTx {
    tx: Mutex<Transaction<'static, Postgres>>,
}

impl ProfileTx {
    pub async fn begin(db: &PgPool) -> anyhow::Result<Self> {
        Ok(Self {
            tx: Mutex::new(db.begin().await?),
        })
    }

    pub async fn commit(self) -> anyhow::Result<()> {
        self.tx.into_inner().commit().await?;
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for ProfileTx {
    async fn read_profile(&self, user_id: Uuid) -> anyhow::Result<Option<UserProfile>> {
        let mut tx = self.tx.lock().await;
        let profile = sqlx::query_as::<_, UserProfile>(SELECT_PROFILE_FOR_UPDATE)
            .bind(user_id)
            .fetch_optional(&mut **tx)
            .await?;
        Ok(profile)
    }

    async fn write_profile(&self, profile: &UserProfile) -> anyhow::Result<()> {
        let mut tx = self.tx.lock().await;
        update_query(profile).execute(&mut **tx).await?;
        Ok(())
    }
}
