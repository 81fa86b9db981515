//! Status transitions of versioned entities.
//!
//! A logical entity owns at most one row per [`Status`]. Every transition
//! between statuses is planned here as an ordered list of
//! [`LifecycleStep`]s; a store executes the steps, in order, inside one
//! transaction. Planning never touches storage, so the rules are the same
//! for every backend.

use serde::Serialize;

use crate::error::CoreError;
use crate::status::Status;

/// Which status copies of a logical entity currently exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusSet {
    pub draft: bool,
    pub published: bool,
    pub archived: bool,
}

impl StatusSet {
    pub fn from_statuses(statuses: impl IntoIterator<Item = Status>) -> Self {
        let mut set = StatusSet::default();
        for status in statuses {
            match status {
                Status::Draft => set.draft = true,
                Status::Published => set.published = true,
                Status::Archived => set.archived = true,
            }
        }
        set
    }

    pub fn contains(&self, status: Status) -> bool {
        match status {
            Status::Draft => self.draft,
            Status::Published => self.published,
            Status::Archived => self.archived,
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.draft || self.published || self.archived)
    }
}

/// One storage-level action of a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LifecycleStep {
    /// Remove every row of the entity tree tagged `status`.
    Delete(Status),
    /// Re-tag every row from `from` to `to`, optionally blanking the unique
    /// name of the root row so it can be reused.
    Retag {
        from: Status,
        to: Status,
        blank_name: bool,
    },
    /// Duplicate every row tagged `from` under the same ids, tagged `to`.
    Copy { from: Status, to: Status },
}

/// Create a draft from the published copy.
///
/// Fails if there is no published copy, or if a draft already exists and
/// the caller did not ask to discard it.
pub fn plan_create_draft(
    entity: &str,
    present: StatusSet,
    discard_existing: bool,
) -> Result<Vec<LifecycleStep>, CoreError> {
    if !present.published {
        return Err(CoreError::bad_state(
            entity,
            format!("Drafts can only be created from published {entity}s."),
        ));
    }

    let mut steps = Vec::with_capacity(2);
    if present.draft {
        if !discard_existing {
            return Err(CoreError::bad_state(
                entity,
                format!("The provided {entity} already has a draft."),
            ));
        }
        steps.push(LifecycleStep::Delete(Status::Draft));
    }
    steps.push(LifecycleStep::Copy {
        from: Status::Published,
        to: Status::Draft,
    });
    Ok(steps)
}

/// Promote the draft to published.
///
/// The order matters: the archived slot is freed before the old published
/// copy moves into it, and the published slot is freed before the draft is
/// promoted.
pub fn plan_publish(
    entity: &str,
    present: StatusSet,
    blank_archived_name: bool,
) -> Result<Vec<LifecycleStep>, CoreError> {
    if !present.draft {
        return Err(CoreError::bad_state(
            entity,
            format!("Only drafts can be published, the {entity} has no draft."),
        ));
    }

    let mut steps = Vec::with_capacity(3);
    if present.archived {
        steps.push(LifecycleStep::Delete(Status::Archived));
    }
    if present.published {
        steps.push(LifecycleStep::Retag {
            from: Status::Published,
            to: Status::Archived,
            blank_name: blank_archived_name,
        });
    }
    steps.push(LifecycleStep::Retag {
        from: Status::Draft,
        to: Status::Published,
        blank_name: false,
    });
    Ok(steps)
}

/// Drop the draft, leaving the published copy untouched.
pub fn plan_discard_draft(
    entity: &str,
    present: StatusSet,
) -> Result<Vec<LifecycleStep>, CoreError> {
    if !present.draft {
        return Err(CoreError::bad_state(
            entity,
            format!("The {entity} does not have a draft to discard."),
        ));
    }
    Ok(vec![LifecycleStep::Delete(Status::Draft)])
}

/// Replace the draft (if any) with a copy of the archived version.
pub fn plan_restore_from_archive(
    entity: &str,
    present: StatusSet,
) -> Result<Vec<LifecycleStep>, CoreError> {
    if !present.archived {
        return Err(CoreError::bad_state(
            entity,
            format!("Only archived {entity}s can be restored."),
        ));
    }

    let mut steps = Vec::with_capacity(2);
    if present.draft {
        steps.push(LifecycleStep::Delete(Status::Draft));
    }
    steps.push(LifecycleStep::Copy {
        from: Status::Archived,
        to: Status::Draft,
    });
    Ok(steps)
}

/// Remove every status copy.
pub fn plan_delete(present: StatusSet) -> Vec<LifecycleStep> {
    Status::ALL
        .iter()
        .copied()
        .filter(|status| present.contains(*status))
        .map(LifecycleStep::Delete)
        .collect()
}

/// The set of statuses after running `steps` against `present`.
///
/// Used to assert that a plan is well formed before executing it: no step
/// may write into an occupied slot or read from an empty one.
pub fn apply_steps(present: StatusSet, steps: &[LifecycleStep]) -> Result<StatusSet, CoreError> {
    let mut set = present;
    for step in steps {
        match *step {
            LifecycleStep::Delete(status) => set_status(&mut set, status, false),
            LifecycleStep::Retag { from, to, .. } => {
                ensure_transition(&set, from, to)?;
                set_status(&mut set, from, false);
                set_status(&mut set, to, true);
            }
            LifecycleStep::Copy { from, to } => {
                ensure_transition(&set, from, to)?;
                set_status(&mut set, to, true);
            }
        }
    }
    Ok(set)
}

fn ensure_transition(set: &StatusSet, from: Status, to: Status) -> Result<(), CoreError> {
    if !set.contains(from) || set.contains(to) {
        return Err(CoreError::Runtime(format!(
            "Invalid lifecycle step from {from} to {to}"
        )));
    }
    Ok(())
}

fn set_status(set: &mut StatusSet, status: Status, value: bool) {
    match status {
        Status::Draft => set.draft = value,
        Status::Published => set.published = value,
        Status::Archived => set.archived = value,
    }
}

// ---------------------------------------------------------------------------
// Rule specifics
// ---------------------------------------------------------------------------

/// Why a rule cannot be enabled, if it cannot.
pub fn rule_enable_blocker(has_layout: bool, target_count: usize) -> Option<&'static str> {
    if !has_layout {
        return Some("Rule is missing a layout and cannot be enabled.");
    }
    if target_count == 0 {
        return Some("Rule is missing targets and cannot be enabled.");
    }
    None
}

/// Explicit enable request: rejected with a reason instead of corrected.
pub fn check_rule_enable(
    currently_enabled: bool,
    has_layout: bool,
    target_count: usize,
) -> Result<(), CoreError> {
    if currently_enabled {
        return Err(CoreError::bad_state("rule", "Rule is already enabled."));
    }
    match rule_enable_blocker(has_layout, target_count) {
        Some(reason) => Err(CoreError::bad_state("rule", reason)),
        None => Ok(()),
    }
}

/// Explicit disable request.
pub fn check_rule_disable(currently_enabled: bool) -> Result<(), CoreError> {
    if !currently_enabled {
        return Err(CoreError::bad_state("rule", "Rule is already disabled."));
    }
    Ok(())
}

/// The enabled flag a rule keeps after publishing: publishing never fails
/// on an incomplete rule, it silently disables it.
pub fn enabled_after_publish(enabled: bool, has_layout: bool, target_count: usize) -> bool {
    enabled && rule_enable_blocker(has_layout, target_count).is_none()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn set(draft: bool, published: bool, archived: bool) -> StatusSet {
        StatusSet {
            draft,
            published,
            archived,
        }
    }

    // -- create_draft --------------------------------------------------------

    #[test]
    fn create_draft_copies_published() {
        let steps = plan_create_draft("layout", set(false, true, false), false).unwrap();
        assert_eq!(
            steps,
            vec![LifecycleStep::Copy {
                from: Status::Published,
                to: Status::Draft
            }]
        );
        assert_eq!(
            apply_steps(set(false, true, false), &steps).unwrap(),
            set(true, true, false)
        );
    }

    #[test]
    fn second_create_draft_fails_without_discard() {
        let err = plan_create_draft("layout", set(true, true, false), false).unwrap_err();
        assert_matches!(
            err,
            CoreError::BadState { ref reason, .. } if reason.contains("already has a draft")
        );
    }

    #[test]
    fn create_draft_discards_existing_when_asked() {
        let steps = plan_create_draft("layout", set(true, true, false), true).unwrap();
        assert_eq!(steps[0], LifecycleStep::Delete(Status::Draft));
        assert_eq!(
            apply_steps(set(true, true, false), &steps).unwrap(),
            set(true, true, false)
        );
    }

    #[test]
    fn create_draft_requires_published() {
        assert_matches!(
            plan_create_draft("rule", set(true, false, true), true),
            Err(CoreError::BadState { .. })
        );
    }

    // -- publish -------------------------------------------------------------

    #[test]
    fn first_publish_promotes_draft() {
        let steps = plan_publish("layout", set(true, false, false), true).unwrap();
        assert_eq!(
            steps,
            vec![LifecycleStep::Retag {
                from: Status::Draft,
                to: Status::Published,
                blank_name: false
            }]
        );
        assert_eq!(
            apply_steps(set(true, false, false), &steps).unwrap(),
            set(false, true, false)
        );
    }

    #[test]
    fn publish_archives_previous_version_in_order() {
        let steps = plan_publish("layout", set(true, true, true), true).unwrap();
        assert_eq!(
            steps,
            vec![
                LifecycleStep::Delete(Status::Archived),
                LifecycleStep::Retag {
                    from: Status::Published,
                    to: Status::Archived,
                    blank_name: true
                },
                LifecycleStep::Retag {
                    from: Status::Draft,
                    to: Status::Published,
                    blank_name: false
                },
            ]
        );
        assert_eq!(
            apply_steps(set(true, true, true), &steps).unwrap(),
            set(false, true, true)
        );
    }

    #[test]
    fn publish_without_draft_fails() {
        assert_matches!(
            plan_publish("rule", set(false, true, false), false),
            Err(CoreError::BadState { .. })
        );
    }

    #[test]
    fn reordered_publish_is_detected() {
        // Moving published into a still-occupied archived slot is invalid.
        let steps = [LifecycleStep::Retag {
            from: Status::Published,
            to: Status::Archived,
            blank_name: true,
        }];
        assert_matches!(
            apply_steps(set(true, true, true), &steps),
            Err(CoreError::Runtime(_))
        );
    }

    // -- discard / restore / delete ------------------------------------------

    #[test]
    fn discard_requires_draft() {
        assert!(plan_discard_draft("layout", set(true, true, false)).is_ok());
        assert_matches!(
            plan_discard_draft("layout", set(false, true, false)),
            Err(CoreError::BadState { .. })
        );
    }

    #[test]
    fn restore_replaces_draft_with_archive() {
        let steps = plan_restore_from_archive("layout", set(true, true, true)).unwrap();
        assert_eq!(
            steps,
            vec![
                LifecycleStep::Delete(Status::Draft),
                LifecycleStep::Copy {
                    from: Status::Archived,
                    to: Status::Draft
                },
            ]
        );
        assert_eq!(
            apply_steps(set(true, true, true), &steps).unwrap(),
            set(true, true, true)
        );
    }

    #[test]
    fn restore_requires_archive() {
        assert_matches!(
            plan_restore_from_archive("layout", set(true, true, false)),
            Err(CoreError::BadState { .. })
        );
    }

    #[test]
    fn delete_removes_every_copy() {
        let steps = plan_delete(set(true, false, true));
        assert_eq!(
            steps,
            vec![
                LifecycleStep::Delete(Status::Draft),
                LifecycleStep::Delete(Status::Archived)
            ]
        );
        assert!(apply_steps(set(true, false, true), &steps)
            .unwrap()
            .is_empty());
    }

    // -- rules ---------------------------------------------------------------

    #[test]
    fn enable_rejects_incomplete_rules() {
        assert_matches!(
            check_rule_enable(false, false, 2),
            Err(CoreError::BadState { ref reason, .. }) if reason.contains("missing a layout")
        );
        assert_matches!(
            check_rule_enable(false, true, 0),
            Err(CoreError::BadState { ref reason, .. }) if reason.contains("missing targets")
        );
        assert_matches!(
            check_rule_enable(true, true, 1),
            Err(CoreError::BadState { ref reason, .. }) if reason.contains("already enabled")
        );
        assert!(check_rule_enable(false, true, 1).is_ok());
    }

    #[test]
    fn disable_rejects_disabled_rule() {
        assert!(check_rule_disable(true).is_ok());
        assert_matches!(check_rule_disable(false), Err(CoreError::BadState { .. }));
    }

    #[test]
    fn publish_silently_disables_incomplete_rule() {
        assert!(enabled_after_publish(true, true, 1));
        assert!(!enabled_after_publish(true, false, 1));
        assert!(!enabled_after_publish(true, true, 0));
        assert!(!enabled_after_publish(false, true, 1));
    }
}
