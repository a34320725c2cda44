use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum NutritionError {
    /// The data-access collaborator failed; never retried here.
    #[error("data access failure: {0:#}")]
    DataAccess(#[source] anyhow::Error),

    #[error("profile {0} not found")]
    ProfileNotFound(Uuid),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}
