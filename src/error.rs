use sea_orm::{DbErr, SqlErr};
use thiserror::Error;

/// Persistence failures. Background sweeps log these and retry on the next tick.
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[source] DbErr),
    /// A write collided with a unique constraint.
    #[error("Conflicting record: {0}")]
    Conflict(String),
    #[error("Repository unavailable: {0}")]
    Unavailable(String),
}

impl From<DbErr> for RepositoryError {
    fn from(err: DbErr) -> Self {
        if let Some(SqlErr::UniqueConstraintViolation(detail)) = err.sql_err() {
            return RepositoryError::Conflict(detail);
        }
        match err {
            DbErr::ConnectionAcquire(e) => RepositoryError::Unavailable(e.to_string()),
            other => RepositoryError::Database(other),
        }
    }
}

/// Errors surfaced by the core's public operations.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("Duplicate configuration: {0}")]
    DuplicateConfiguration(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl CoreError {
    pub fn site_not_found(id: impl ToString) -> Self {
        CoreError::NotFound {
            entity: "Site",
            id: id.to_string(),
        }
    }

    pub fn alert_not_found(id: impl ToString) -> Self {
        CoreError::NotFound {
            entity: "Alert",
            id: id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{ConnAcquireErr, RuntimeErr};

    #[test]
    fn pool_exhaustion_is_unavailable() {
        let err = RepositoryError::from(DbErr::ConnectionAcquire(ConnAcquireErr::Timeout));
        assert!(matches!(err, RepositoryError::Unavailable(_)));
    }

    #[test]
    fn other_database_errors_pass_through() {
        let err = RepositoryError::from(DbErr::Query(RuntimeErr::Internal("syntax".into())));
        assert!(matches!(err, RepositoryError::Database(_)));
    }
}
