//! Approval lifecycle.
//!
//! | action  | from      | to        |
//! |---------|-----------|-----------|
//! | submit  | DRAFT     | SUBMITTED |
//! | approve | SUBMITTED | APPROVED  |
//! | reject  | SUBMITTED | DRAFT     |
//! | comment | any       | unchanged |
//!
//! `ARCHIVED` is terminal and no action leads into it.  Every successful
//! action appends one [`ApprovalEntry`] in the same step as the status
//! change.

use crate::error::{CostingError, Result};
use crate::models::{ApprovalAction, ApprovalEntry, Project, ProjectStatus};
use chrono::{DateTime, Utc};

/// The status `action` moves a project in `current` to.
pub fn next_status(action: ApprovalAction, current: ProjectStatus) -> Result<ProjectStatus> {
    use ApprovalAction::*;
    use ProjectStatus::*;
    match (action, current) {
        (Submit, Draft) => Ok(Submitted),
        (Approve, Submitted) => Ok(Approved),
        (Reject, Submitted) => Ok(Draft),
        (Comment, status) => Ok(status),
        (action, status) => Err(CostingError::InvalidTransition {
            action: action.to_string(),
            current_status: status.to_string(),
        }),
    }
}

/// Trimmed actor id; absent or blank actors are a validation error.
pub fn require_actor(actor_user_id: Option<&str>) -> Result<String> {
    match actor_user_id.map(str::trim) {
        Some(actor) if !actor.is_empty() => Ok(actor.to_string()),
        _ => Err(CostingError::validation("actorUserId", "actor is required")),
    }
}

fn normalize_comment(comment: Option<&str>) -> Option<String> {
    comment
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
}

/// Apply `action` to `project`.  On error the project is untouched.
pub fn apply(
    project: &mut Project,
    action: ApprovalAction,
    actor_user_id: Option<&str>,
    comment: Option<&str>,
    at: DateTime<Utc>,
) -> Result<ProjectStatus> {
    let actor = require_actor(actor_user_id)?;
    let next = next_status(action, project.status)?;

    project.status = next;
    project
        .approvals
        .append(ApprovalEntry::new(action, actor, normalize_comment(comment), at));
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures;

    const ACTIONS: [ApprovalAction; 4] = [
        ApprovalAction::Submit,
        ApprovalAction::Approve,
        ApprovalAction::Reject,
        ApprovalAction::Comment,
    ];
    const STATUSES: [ProjectStatus; 4] = [
        ProjectStatus::Draft,
        ProjectStatus::Submitted,
        ProjectStatus::Approved,
        ProjectStatus::Archived,
    ];

    fn legal(action: ApprovalAction, from: ProjectStatus) -> Option<ProjectStatus> {
        match (action, from) {
            (ApprovalAction::Submit, ProjectStatus::Draft) => Some(ProjectStatus::Submitted),
            (ApprovalAction::Approve, ProjectStatus::Submitted) => Some(ProjectStatus::Approved),
            (ApprovalAction::Reject, ProjectStatus::Submitted) => Some(ProjectStatus::Draft),
            (ApprovalAction::Comment, s) => Some(s),
            _ => None,
        }
    }

    #[test]
    fn every_pair_outside_the_table_is_an_invalid_transition() {
        for action in ACTIONS {
            for from in STATUSES {
                match legal(action, from) {
                    Some(to) => assert_eq!(next_status(action, from), Ok(to)),
                    None => assert_eq!(
                        next_status(action, from),
                        Err(CostingError::InvalidTransition {
                            action: action.to_string(),
                            current_status: from.to_string(),
                        })
                    ),
                }
            }
        }
    }

    #[test]
    fn nothing_leads_into_archived() {
        for action in ACTIONS {
            for from in STATUSES.into_iter().filter(|s| *s != ProjectStatus::Archived) {
                assert_ne!(next_status(action, from), Ok(ProjectStatus::Archived));
            }
        }
    }

    #[test]
    fn apply_appends_entry_with_status_change() {
        let mut project = Project::new(fixtures::details(), "owner");
        let now = Utc::now();
        let status = apply(
            &mut project,
            ApprovalAction::Submit,
            Some(" alice "),
            Some("  ready for review "),
            now,
        )
        .unwrap();

        assert_eq!(status, ProjectStatus::Submitted);
        assert_eq!(project.status, ProjectStatus::Submitted);
        let entry = project.approvals.last().unwrap();
        assert_eq!(entry.action(), ApprovalAction::Submit);
        assert_eq!(entry.actor_user_id(), "alice");
        assert_eq!(entry.comment(), Some("ready for review"));
        assert_eq!(entry.at(), now);
    }

    #[test]
    fn comment_keeps_status_and_drops_blank_text() {
        let mut project = Project::new(fixtures::details(), "owner");
        apply(&mut project, ApprovalAction::Comment, Some("bob"), Some("   "), Utc::now()).unwrap();
        assert_eq!(project.status, ProjectStatus::Draft);
        assert_eq!(project.approvals.len(), 1);
        assert_eq!(project.approvals.entries()[0].comment(), None);
    }

    #[test]
    fn blank_actor_fails_before_transition_check() {
        let mut project = Project::new(fixtures::details(), "owner");
        project.status = ProjectStatus::Approved;
        for actor in [None, Some(""), Some("   ")] {
            assert!(matches!(
                apply(&mut project, ApprovalAction::Submit, actor, None, Utc::now()),
                Err(CostingError::Validation { field, .. }) if field == "actorUserId"
            ));
        }
        assert!(project.approvals.is_empty());
    }

    #[test]
    fn failed_transition_leaves_project_untouched() {
        let mut project = Project::new(fixtures::details(), "owner");
        let before = project.clone();
        assert!(apply(&mut project, ApprovalAction::Approve, Some("carol"), None, Utc::now()).is_err());
        assert_eq!(project, before);
    }
}
