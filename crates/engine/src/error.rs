use layouts_core::error::CoreError;
use layouts_db::DbError;

/// Error returned by every engine service.
///
/// Wraps [`CoreError`] for domain errors and adds the infrastructure
/// failures the services can run into.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A domain-level error from `layouts_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A database error from sqlx.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Applying the embedded migrations failed.
    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// A malformed configuration value.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Convenience type alias for service return values.
pub type EngineResult<T> = Result<T, EngineError>;

impl From<DbError> for EngineError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Core(core) => EngineError::Core(core),
            DbError::Database(db) => EngineError::Database(db),
        }
    }
}

impl EngineError {
    /// The domain error, if this is one.
    pub fn as_core(&self) -> Option<&CoreError> {
        match self {
            EngineError::Core(core) => Some(core),
            _ => None,
        }
    }
}
