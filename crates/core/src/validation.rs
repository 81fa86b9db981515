//! Aggregation of field-level violations.
//!
//! DTOs derive [`validator::Validate`] for their own constraints; checks
//! that need a registry (layout types, block definitions, ...) are added to
//! the same [`Violations`] so one `ValidationFailed` error reports all of
//! them before any storage is touched.

use std::borrow::Cow;

use validator::{Validate, ValidationError, ValidationErrors};

use crate::error::CoreError;

/// Build a violation with a machine code and a readable message.
pub fn violation(code: &'static str, message: impl Into<String>) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(Cow::Owned(message.into()));
    error
}

/// Collected violations for one input.
#[derive(Debug)]
pub struct Violations {
    errors: ValidationErrors,
}

impl Default for Violations {
    fn default() -> Self {
        Self::new()
    }
}

impl Violations {
    pub fn new() -> Self {
        Self {
            errors: ValidationErrors::new(),
        }
    }

    /// Start from the derived constraints of `input`.
    pub fn of<T: Validate>(input: &T) -> Self {
        match input.validate() {
            Ok(()) => Self::new(),
            Err(errors) => Self { errors },
        }
    }

    pub fn add(&mut self, field: &'static str, code: &'static str, message: impl Into<String>) {
        self.errors.add(field, violation(code, message));
    }

    /// Record a violation unless `ok` holds.
    pub fn check(
        &mut self,
        ok: bool,
        field: &'static str,
        code: &'static str,
        message: impl Into<String>,
    ) {
        if !ok {
            self.add(field, code, message);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.errors().is_empty()
    }

    /// The error for violations already known to be non-empty.
    pub fn into_error(self) -> CoreError {
        CoreError::ValidationFailed(self.errors)
    }

    pub fn into_result(self) -> Result<(), CoreError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(CoreError::ValidationFailed(self.errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[derive(Validate)]
    struct Input {
        #[validate(length(min = 1, max = 5))]
        name: String,
    }

    #[test]
    fn empty_violations_pass() {
        let input = Input {
            name: "ok".to_string(),
        };
        assert!(Violations::of(&input).into_result().is_ok());
    }

    #[test]
    fn derived_and_manual_violations_are_aggregated() {
        let input = Input {
            name: String::new(),
        };
        let mut violations = Violations::of(&input);
        violations.check(false, "layout_type", "unknown", "Layout type does not exist");
        violations.check(true, "locale", "invalid", "never recorded");

        let err = violations.into_result().unwrap_err();
        assert_matches!(err, CoreError::ValidationFailed(ref errors) if errors.errors().len() == 2);
    }
}
