//! Report lifecycle engine.
//!
//! Everything in here is a pure function over snapshots of a report and
//! its assignment, so the transition table is checkable without a
//! database. The models run these checks before issuing writes and also
//! encode the same preconditions in their update filters, which is what
//! makes each transition atomic on the assignment document.

use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Submitted,
    Assigned,
    // reserved, never produced by a transition
    InProgress,
    Completed,
    Approved,
    Rejected,
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Approved,
    Rejected,
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    User,
    Reviewer,
    Assignee,
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleAction {
    CreateAssignment,
    SubmitCompletion,
    Review,
    Resubmit,
}

/// The authenticated caller of a transition. Always built from the
/// verified token, never from anything the client asserts about itself.
#[derive(Clone, Copy, Debug)]
pub struct ActingUser {
    pub _id: ObjectId,
    pub role: UserRole,
}

/// The review-relevant fields of an assignment.
#[derive(Clone, Copy, Debug)]
pub struct AssignmentState {
    pub reviewer_id: ObjectId,
    pub assignee_id: ObjectId,
    pub completed_at: Option<DateTime>,
    pub review_status: Option<ReviewStatus>,
}

/// A report with no assignment is always `submitted`; otherwise the
/// status is a function of the assignment's completion and review fields.
pub fn derive_status(assignment: Option<&AssignmentState>) -> ReportStatus {
    match assignment {
        None => ReportStatus::Submitted,
        Some(assignment) => match (&assignment.completed_at, &assignment.review_status) {
            (None, _) => ReportStatus::Assigned,
            (Some(_), None) => ReportStatus::Completed,
            (Some(_), Some(ReviewStatus::Approved)) => ReportStatus::Approved,
            (Some(_), Some(ReviewStatus::Rejected)) => ReportStatus::Rejected,
        },
    }
}

pub fn check_create_assignment(
    acting: &ActingUser,
    report_status: ReportStatus,
    assignment: Option<&AssignmentState>,
) -> Result<(), Error> {
    if acting.role != UserRole::Reviewer {
        return Err(Error::Forbidden);
    }
    if assignment.is_some() || report_status != ReportStatus::Submitted {
        return Err(Error::PreconditionFailed("REPORT_ALREADY_ASSIGNED"));
    }
    Ok(())
}

pub fn check_submit_completion(
    acting: &ActingUser,
    assignment: &AssignmentState,
) -> Result<(), Error> {
    if acting.role != UserRole::Assignee || acting._id != assignment.assignee_id {
        return Err(Error::Forbidden);
    }
    if assignment.completed_at.is_some() {
        return Err(Error::PreconditionFailed("ASSIGNMENT_ALREADY_COMPLETED"));
    }
    Ok(())
}

pub fn check_review(acting: &ActingUser, assignment: &AssignmentState) -> Result<(), Error> {
    if acting.role != UserRole::Reviewer || acting._id != assignment.reviewer_id {
        return Err(Error::Forbidden);
    }
    if assignment.completed_at.is_none() {
        return Err(Error::PreconditionFailed("ASSIGNMENT_NOT_COMPLETED"));
    }
    if assignment.review_status.is_some() {
        return Err(Error::PreconditionFailed("REVIEW_ALREADY_DECIDED"));
    }
    Ok(())
}

pub fn check_resubmit(acting: &ActingUser, assignment: &AssignmentState) -> Result<(), Error> {
    if acting.role != UserRole::Assignee || acting._id != assignment.assignee_id {
        return Err(Error::Forbidden);
    }
    if assignment.review_status != Some(ReviewStatus::Rejected) {
        return Err(Error::PreconditionFailed("ASSIGNMENT_NOT_REJECTED"));
    }
    Ok(())
}

/// The actions the acting user may trigger right now, as shown on a
/// report detail view.
pub fn permitted_actions(
    acting: &ActingUser,
    assignment: Option<&AssignmentState>,
) -> Vec<LifecycleAction> {
    let mut actions: Vec<LifecycleAction> = Vec::new();
    match assignment {
        None => {
            if check_create_assignment(acting, ReportStatus::Submitted, None).is_ok() {
                actions.push(LifecycleAction::CreateAssignment);
            }
        }
        Some(assignment) => {
            if check_submit_completion(acting, assignment).is_ok() {
                actions.push(LifecycleAction::SubmitCompletion);
            }
            if check_review(acting, assignment).is_ok() {
                actions.push(LifecycleAction::Review);
            }
            if check_resubmit(acting, assignment).is_ok() {
                actions.push(LifecycleAction::Resubmit);
            }
        }
    }
    actions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reviewer() -> ActingUser {
        ActingUser {
            _id: ObjectId::new(),
            role: UserRole::Reviewer,
        }
    }
    fn assignee() -> ActingUser {
        ActingUser {
            _id: ObjectId::new(),
            role: UserRole::Assignee,
        }
    }
    fn reporter() -> ActingUser {
        ActingUser {
            _id: ObjectId::new(),
            role: UserRole::User,
        }
    }
    fn assignment_for(reviewer: &ActingUser, assignee: &ActingUser) -> AssignmentState {
        AssignmentState {
            reviewer_id: reviewer._id,
            assignee_id: assignee._id,
            completed_at: None,
            review_status: None,
        }
    }

    #[test]
    fn report_without_assignment_is_submitted() {
        assert_eq!(derive_status(None), ReportStatus::Submitted);
    }

    #[test]
    fn derived_status_follows_assignment_fields() {
        let reviewer = reviewer();
        let assignee = assignee();
        let mut assignment = assignment_for(&reviewer, &assignee);

        assert_eq!(derive_status(Some(&assignment)), ReportStatus::Assigned);

        assignment.completed_at = Some(DateTime::now());
        assert_eq!(derive_status(Some(&assignment)), ReportStatus::Completed);

        assignment.review_status = Some(ReviewStatus::Approved);
        assert_eq!(derive_status(Some(&assignment)), ReportStatus::Approved);

        assignment.review_status = Some(ReviewStatus::Rejected);
        assert_eq!(derive_status(Some(&assignment)), ReportStatus::Rejected);
    }

    #[test]
    fn only_a_reviewer_may_assign() {
        assert!(matches!(
            check_create_assignment(&reporter(), ReportStatus::Submitted, None),
            Err(Error::Forbidden)
        ));
        assert!(matches!(
            check_create_assignment(&assignee(), ReportStatus::Submitted, None),
            Err(Error::Forbidden)
        ));
        assert!(check_create_assignment(&reviewer(), ReportStatus::Submitted, None).is_ok());
    }

    #[test]
    fn a_report_is_assigned_at_most_once() {
        let reviewer = reviewer();
        let assignee = assignee();
        let assignment = assignment_for(&reviewer, &assignee);

        assert!(matches!(
            check_create_assignment(&reviewer, ReportStatus::Assigned, Some(&assignment)),
            Err(Error::PreconditionFailed("REPORT_ALREADY_ASSIGNED"))
        ));
    }

    #[test]
    fn completion_requires_the_assigned_assignee() {
        let reviewer = reviewer();
        let assignee = assignee();
        let assignment = assignment_for(&reviewer, &assignee);

        let someone_else = super::ActingUser {
            _id: ObjectId::new(),
            role: UserRole::Assignee,
        };
        assert!(matches!(
            check_submit_completion(&someone_else, &assignment),
            Err(Error::Forbidden)
        ));
        assert!(matches!(
            check_submit_completion(&reviewer, &assignment),
            Err(Error::Forbidden)
        ));
        assert!(check_submit_completion(&assignee, &assignment).is_ok());
    }

    #[test]
    fn completion_is_rejected_once_completed() {
        let reviewer = reviewer();
        let assignee = assignee();
        let mut assignment = assignment_for(&reviewer, &assignee);
        assignment.completed_at = Some(DateTime::now());

        assert!(matches!(
            check_submit_completion(&assignee, &assignment),
            Err(Error::PreconditionFailed("ASSIGNMENT_ALREADY_COMPLETED"))
        ));
    }

    #[test]
    fn review_requires_completion_first() {
        let reviewer = reviewer();
        let assignee = assignee();
        let assignment = assignment_for(&reviewer, &assignee);

        assert!(matches!(
            check_review(&reviewer, &assignment),
            Err(Error::PreconditionFailed("ASSIGNMENT_NOT_COMPLETED"))
        ));
    }

    #[test]
    fn second_review_decision_fails_once_the_first_committed() {
        let reviewer = reviewer();
        let assignee = assignee();
        let mut assignment = assignment_for(&reviewer, &assignee);
        assignment.completed_at = Some(DateTime::now());

        assert!(check_review(&reviewer, &assignment).is_ok());

        // first decision commits, the concurrent second one must lose
        assignment.review_status = Some(ReviewStatus::Approved);
        assert!(matches!(
            check_review(&reviewer, &assignment),
            Err(Error::PreconditionFailed("REVIEW_ALREADY_DECIDED"))
        ));
    }

    #[test]
    fn review_requires_the_assigned_reviewer() {
        let reviewer = reviewer();
        let assignee = assignee();
        let mut assignment = assignment_for(&reviewer, &assignee);
        assignment.completed_at = Some(DateTime::now());

        let other_reviewer = super::ActingUser {
            _id: ObjectId::new(),
            role: UserRole::Reviewer,
        };
        assert!(matches!(
            check_review(&other_reviewer, &assignment),
            Err(Error::Forbidden)
        ));
        assert!(matches!(
            check_review(&assignee, &assignment),
            Err(Error::Forbidden)
        ));
    }

    #[test]
    fn resubmission_requires_a_rejection() {
        let reviewer = reviewer();
        let assignee = assignee();
        let mut assignment = assignment_for(&reviewer, &assignee);

        assert!(matches!(
            check_resubmit(&assignee, &assignment),
            Err(Error::PreconditionFailed("ASSIGNMENT_NOT_REJECTED"))
        ));

        assignment.completed_at = Some(DateTime::now());
        assignment.review_status = Some(ReviewStatus::Approved);
        assert!(matches!(
            check_resubmit(&assignee, &assignment),
            Err(Error::PreconditionFailed("ASSIGNMENT_NOT_REJECTED"))
        ));

        assignment.review_status = Some(ReviewStatus::Rejected);
        assert!(check_resubmit(&assignee, &assignment).is_ok());
    }

    #[test]
    fn permitted_actions_track_role_and_state() {
        let reviewer = reviewer();
        let assignee = assignee();

        assert_eq!(
            permitted_actions(&reviewer, None),
            vec![LifecycleAction::CreateAssignment]
        );
        assert!(permitted_actions(&reporter(), None).is_empty());

        let mut assignment = assignment_for(&reviewer, &assignee);
        assert_eq!(
            permitted_actions(&assignee, Some(&assignment)),
            vec![LifecycleAction::SubmitCompletion]
        );
        assert!(permitted_actions(&reviewer, Some(&assignment)).is_empty());

        assignment.completed_at = Some(DateTime::now());
        assert_eq!(
            permitted_actions(&reviewer, Some(&assignment)),
            vec![LifecycleAction::Review]
        );
        assert!(permitted_actions(&assignee, Some(&assignment)).is_empty());

        assignment.review_status = Some(ReviewStatus::Rejected);
        assert_eq!(
            permitted_actions(&assignee, Some(&assignment)),
            vec![LifecycleAction::Resubmit]
        );
        assert!(permitted_actions(&reviewer, Some(&assignment)).is_empty());
    }

    // The walkthrough from submission to approval, with a rejection and a
    // resubmission in the middle. Every intermediate state is asserted.
    #[test]
    fn full_rework_walkthrough() {
        let reviewer = reviewer();
        let assignee = assignee();

        assert_eq!(derive_status(None), ReportStatus::Submitted);
        assert!(check_create_assignment(&reviewer, ReportStatus::Submitted, None).is_ok());

        let mut assignment = assignment_for(&reviewer, &assignee);
        assert_eq!(derive_status(Some(&assignment)), ReportStatus::Assigned);

        assert!(check_submit_completion(&assignee, &assignment).is_ok());
        let first_completion = DateTime::now();
        assignment.completed_at = Some(first_completion);
        assert_eq!(derive_status(Some(&assignment)), ReportStatus::Completed);

        assert!(check_review(&reviewer, &assignment).is_ok());
        assignment.review_status = Some(ReviewStatus::Rejected);
        assert_eq!(derive_status(Some(&assignment)), ReportStatus::Rejected);

        assert!(check_resubmit(&assignee, &assignment).is_ok());
        let second_completion = DateTime::now();
        assignment.completed_at = Some(second_completion);
        assignment.review_status = None;
        assert_eq!(derive_status(Some(&assignment)), ReportStatus::Completed);

        assert!(check_review(&reviewer, &assignment).is_ok());
        assignment.review_status = Some(ReviewStatus::Approved);
        assert_eq!(derive_status(Some(&assignment)), ReportStatus::Approved);

        assert!(matches!(
            check_review(&reviewer, &assignment),
            Err(Error::PreconditionFailed("REVIEW_ALREADY_DECIDED"))
        ));
    }
}
