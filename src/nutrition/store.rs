use async_trait::async_trait;
use uuid::Uuid;

use super::model::{DateRange, MealRecord, UserProfile};

/// Read access to a user's meals.
#[async_trait]
pub trait MealSource: Send + Sync {
    /// Every meal owned by `user_id` logged within `range`, in any order.
    async fn fetch_meals(&self, user_id: Uuid, range: DateRange)
        -> anyhow::Result<Vec<MealRecord>>;
}

/// Read/write access to the profile row.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn read_profile(&self, user_id: Uuid) -> anyhow::Result<Option<UserProfile>>;
    async fn write_profile(&self, profile: &UserProfile) -> anyhow::Result<()>;
}

#[cfg(test)]
pub(crate) mod memory {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    /// In-memory store for exercising the aggregator and profile updates.
    #[derive(Default)]
    pub struct MemoryStore {
        pub meals: Mutex<Vec<MealRecord>>,
        pub profiles: Mutex<HashMap<Uuid, UserProfile>>,
        pub fail: bool,
    }

    impl MemoryStore {
        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        pub fn with_profile(profile: UserProfile) -> Self {
            let store = Self::default();
            store.profiles.lock().unwrap().insert(profile.id, profile);
            store
        }

        pub fn push_meal(&self, meal: MealRecord) {
            self.meals.lock().unwrap().push(meal);
        }
    }

    #[async_trait]
    impl MealSource for MemoryStore {
        async fn fetch_meals(
            &self,
            user_id: Uuid,
            range: DateRange,
        ) -> anyhow::Result<Vec<MealRecord>> {
            if self.fail {
                anyhow::bail!("connection refused");
            }
            Ok(self
                .meals
                .lock()
                .unwrap()
                .iter()
                .filter(|m| m.user_id == user_id && range.contains(m.logged_on()))
                .cloned()
                .collect())
        }
    }

    #[async_trait]
    impl ProfileStore for MemoryStore {
        async fn read_profile(&self, user_id: Uuid) -> anyhow::Result<Option<UserProfile>> {
            if self.fail {
                anyhow::bail!("connection refused");
            }
            Ok(self.profiles.lock().unwrap().get(&user_id).cloned())
        }

        async fn write_profile(&self, profile: &UserProfile) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("connection refused");
            }
            self.profiles
                .lock()
                .unwrap()
                .insert(profile.id, profile.clone());
            Ok(())
        }
    }
}
