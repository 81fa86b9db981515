use crate::types::DbId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The requested logical id / status combination does not exist.
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    /// A transition precondition or structural invariant was violated.
    #[error("Argument \"{argument}\" has an invalid state. {reason}")]
    BadState { argument: String, reason: String },

    /// Field-level input constraints failed. Carries every violation.
    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] validator::ValidationErrors),

    /// Deployment/configuration bug, e.g. an unregistered kind.
    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl CoreError {
    pub fn not_found(entity: &'static str, id: DbId) -> Self {
        CoreError::NotFound { entity, id }
    }

    pub fn bad_state(argument: impl Into<String>, reason: impl Into<String>) -> Self {
        CoreError::BadState {
            argument: argument.into(),
            reason: reason.into(),
        }
    }

    /// The offending argument for `BadState`, if any.
    pub fn argument(&self) -> Option<&str> {
        match self {
            CoreError::BadState { argument, .. } => Some(argument),
            _ => None,
        }
    }
}
