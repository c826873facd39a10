use crate::database::get_db;
use crate::error::Error;
use crate::lifecycle::{self, ActingUser, AssignmentState, LifecycleAction, ReportStatus, ReviewStatus, UserRole};
use futures::stream::StreamExt;
use mongodb::{
    bson::{doc, from_document, oid::ObjectId, to_bson, DateTime},
    options::{FindOneAndUpdateOptions, ReturnDocument},
    Collection, Database,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use super::{
    evidence::{Evidence, EvidenceRef},
    profile::Profile,
    report::Report,
};

#[derive(Debug, Deserialize, Serialize)]
pub struct Assignment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,
    pub report_id: ObjectId,
    pub reviewer_id: ObjectId,
    pub assignee_id: ObjectId,
    pub action: String,
    pub target_completion_date: DateTime,
    pub remark: Option<String>,
    pub completed_at: Option<DateTime>,
    pub review_status: Option<ReviewStatus>,
    pub review_reason: Option<String>,
    pub reviewed_at: Option<DateTime>,
}
#[derive(Debug, Deserialize, Serialize)]
pub struct AssignmentRequest {
    pub assignee_id: ObjectId,
    pub action: String,
    pub target_completion_date: DateTime,
    pub remark: Option<String>,
}
#[derive(Debug, Deserialize, Serialize)]
pub struct CompletionRequest {
    pub evidence: Vec<EvidenceRef>,
}
#[derive(Debug, Deserialize, Serialize)]
pub struct ReviewRequest {
    pub decision: ReviewStatus,
    pub reason: Option<String>,
}
#[derive(Debug)]
pub struct AssignmentQuery {
    pub report_id: Option<ObjectId>,
    pub reviewer_id: Option<ObjectId>,
    pub assignee_id: Option<ObjectId>,
    pub limit: Option<usize>,
}
#[derive(Debug, Deserialize, Serialize)]
pub struct AssignmentResponse {
    pub _id: String,
    pub report_id: String,
    pub reviewer_id: String,
    pub assignee_id: String,
    pub action: String,
    pub target_completion_date: DateTime,
    pub remark: Option<String>,
    pub completed_at: Option<DateTime>,
    pub review_status: Option<ReviewStatus>,
    pub review_reason: Option<String>,
    pub reviewed_at: Option<DateTime>,
}
/// The updated assignment and report pair every transition returns.
#[derive(Debug, Serialize)]
pub struct AssignmentDetail {
    pub assignment: Assignment,
    pub report: Report,
    pub evidence: Vec<Evidence>,
    pub permitted_action: Vec<LifecycleAction>,
}

impl Assignment {
    pub fn state(&self) -> AssignmentState {
        AssignmentState {
            reviewer_id: self.reviewer_id,
            assignee_id: self.assignee_id,
            completed_at: self.completed_at,
            review_status: self.review_status,
        }
    }
    /// Reviewer binds a submitted report to an assignee. The report is
    /// claimed with a status-filtered update so two concurrent reviewers
    /// cannot both assign it; a failed assignment insert rolls the claim
    /// back.
    pub async fn create(
        report_id: &ObjectId,
        acting: &ActingUser,
        payload: AssignmentRequest,
    ) -> Result<AssignmentDetail, Error> {
        let db: Database = get_db();
        let collection: Collection<Assignment> = db.collection::<Assignment>("assignments");
        let reports: Collection<Report> = db.collection::<Report>("reports");

        let mut report = match Report::find_by_id(report_id).await? {
            Some(report) => report,
            None => return Err(Error::NotFound("REPORT_NOT_FOUND")),
        };

        let existing = Assignment::find_by_report_id(report_id).await?;
        let existing_state = existing.as_ref().map(|assignment| assignment.state());
        let status = lifecycle::derive_status(existing_state.as_ref());
        lifecycle::check_create_assignment(acting, status, existing_state.as_ref())?;

        match Profile::find_by_id(&payload.assignee_id).await? {
            Some(profile) => {
                if profile.role != UserRole::Assignee {
                    return Err(Error::BadRequest("PROFILE_MUST_BE_ASSIGNEE"));
                }
            }
            None => return Err(Error::BadRequest("ASSIGNEE_NOT_FOUND")),
        }

        let claimed = reports
            .find_one_and_update(
                doc! {
                    "_id": report_id,
                    "status": to_bson::<ReportStatus>(&ReportStatus::Submitted).unwrap()
                },
                doc! {
                    "$set": { "status": to_bson::<ReportStatus>(&ReportStatus::Assigned).unwrap() }
                },
                None,
            )
            .await
            .map_err(|_| Error::PersistenceFailure("UPDATE_FAILED"))?;
        if claimed.is_none() {
            return Err(Error::PreconditionFailed("REPORT_ALREADY_ASSIGNED"));
        }

        let assignment = Assignment {
            _id: Some(ObjectId::new()),
            report_id: *report_id,
            reviewer_id: acting._id,
            assignee_id: payload.assignee_id,
            action: payload.action,
            target_completion_date: payload.target_completion_date,
            remark: payload.remark,
            completed_at: None,
            review_status: None,
            review_reason: None,
            reviewed_at: None,
        };

        if collection.insert_one(&assignment, None).await.is_err() {
            // roll the claim back so the report stays assignable
            if Report::update_status(report_id, ReportStatus::Submitted)
                .await
                .is_err()
            {
                error!(report = %report_id, "report claimed but assignment insert and rollback failed");
                return Err(Error::PartialFailure {
                    report_id: *report_id,
                    assignment_id: None,
                    intended_status: ReportStatus::Submitted,
                });
            }
            return Err(Error::PersistenceFailure("INSERTING_FAILED"));
        }

        info!(report = %report_id, assignee = %assignment.assignee_id, "assignment created");

        report.status = lifecycle::derive_status(Some(&assignment.state()));

        Ok(AssignmentDetail {
            permitted_action: lifecycle::permitted_actions(acting, Some(&assignment.state())),
            assignment,
            report,
            evidence: Vec::<Evidence>::new(),
        })
    }
    /// Assignee marks the remediation done and attaches evidence. The
    /// completion filter makes the precondition check and the mutation a
    /// single document operation.
    pub async fn submit_completion(
        _id: &ObjectId,
        acting: &ActingUser,
        evidence_refs: &[EvidenceRef],
    ) -> Result<AssignmentDetail, Error> {
        let db: Database = get_db();
        let collection: Collection<Assignment> = db.collection::<Assignment>("assignments");

        let assignment = match Assignment::find_by_id(_id).await? {
            Some(assignment) => assignment,
            None => return Err(Error::NotFound("ASSIGNMENT_NOT_FOUND")),
        };
        lifecycle::check_submit_completion(acting, &assignment.state())?;

        let assignment = collection
            .find_one_and_update(
                doc! { "_id": _id, "completed_at": null },
                doc! { "$set": { "completed_at": DateTime::now() } },
                FindOneAndUpdateOptions::builder()
                    .return_document(ReturnDocument::After)
                    .build(),
            )
            .await
            .map_err(|_| Error::PersistenceFailure("UPDATE_FAILED"))?
            .ok_or(Error::PreconditionFailed("ASSIGNMENT_ALREADY_COMPLETED"))?;

        Assignment::settle(assignment, acting, evidence_refs).await
    }
    /// Reviewer approves or rejects a completed assignment. Of two
    /// concurrent decisions the filter lets exactly one through; the
    /// loser observes `REVIEW_ALREADY_DECIDED`.
    pub async fn review(
        _id: &ObjectId,
        acting: &ActingUser,
        payload: ReviewRequest,
    ) -> Result<AssignmentDetail, Error> {
        let db: Database = get_db();
        let collection: Collection<Assignment> = db.collection::<Assignment>("assignments");

        let assignment = match Assignment::find_by_id(_id).await? {
            Some(assignment) => assignment,
            None => return Err(Error::NotFound("ASSIGNMENT_NOT_FOUND")),
        };
        lifecycle::check_review(acting, &assignment.state())?;

        let assignment = collection
            .find_one_and_update(
                doc! {
                    "_id": _id,
                    "completed_at": { "$ne": null },
                    "review_status": null
                },
                doc! {
                    "$set": {
                        "review_status": to_bson::<ReviewStatus>(&payload.decision).unwrap(),
                        "review_reason": to_bson::<Option<String>>(&payload.reason).unwrap(),
                        "reviewed_at": DateTime::now(),
                    }
                },
                FindOneAndUpdateOptions::builder()
                    .return_document(ReturnDocument::After)
                    .build(),
            )
            .await
            .map_err(|_| Error::PersistenceFailure("UPDATE_FAILED"))?
            .ok_or(Error::PreconditionFailed("REVIEW_ALREADY_DECIDED"))?;

        info!(assignment = %_id, decision = ?payload.decision, "assignment reviewed");

        Assignment::settle(assignment, acting, &[]).await
    }
    /// Assignee reworks a rejected assignment: fresh completion time,
    /// review fields cleared, new evidence appended.
    pub async fn resubmit(
        _id: &ObjectId,
        acting: &ActingUser,
        evidence_refs: &[EvidenceRef],
    ) -> Result<AssignmentDetail, Error> {
        let db: Database = get_db();
        let collection: Collection<Assignment> = db.collection::<Assignment>("assignments");

        let assignment = match Assignment::find_by_id(_id).await? {
            Some(assignment) => assignment,
            None => return Err(Error::NotFound("ASSIGNMENT_NOT_FOUND")),
        };
        lifecycle::check_resubmit(acting, &assignment.state())?;

        let assignment = collection
            .find_one_and_update(
                doc! {
                    "_id": _id,
                    "review_status": to_bson::<ReviewStatus>(&ReviewStatus::Rejected).unwrap()
                },
                doc! {
                    "$set": {
                        "completed_at": DateTime::now(),
                        "review_status": null,
                        "review_reason": null,
                        "reviewed_at": null,
                    }
                },
                FindOneAndUpdateOptions::builder()
                    .return_document(ReturnDocument::After)
                    .build(),
            )
            .await
            .map_err(|_| Error::PersistenceFailure("UPDATE_FAILED"))?
            .ok_or(Error::PreconditionFailed("ASSIGNMENT_NOT_REJECTED"))?;

        Assignment::settle(assignment, acting, evidence_refs).await
    }
    /// Second half of every transition: append evidence, push the derived
    /// status onto the report, assemble the returned pair. A failure here
    /// is the torn-write case and surfaces as `PartialFailure`.
    async fn settle(
        assignment: Assignment,
        acting: &ActingUser,
        evidence_refs: &[EvidenceRef],
    ) -> Result<AssignmentDetail, Error> {
        let assignment_id = assignment._id.unwrap();
        let intended_status = lifecycle::derive_status(Some(&assignment.state()));
        let partial = Error::PartialFailure {
            report_id: assignment.report_id,
            assignment_id: Some(assignment_id),
            intended_status,
        };

        if Evidence::save_many(&assignment_id, evidence_refs).await.is_err() {
            error!(assignment = %assignment_id, "evidence insert failed after assignment update");
            return Err(partial);
        }

        if Report::update_status(&assignment.report_id, intended_status)
            .await
            .is_err()
        {
            error!(
                report = %assignment.report_id,
                status = ?intended_status,
                "report status update failed after assignment update"
            );
            return Err(partial);
        }

        let mut report = match Report::find_by_id(&assignment.report_id).await? {
            Some(report) => report,
            None => return Err(Error::NotFound("REPORT_NOT_FOUND")),
        };
        report.status = intended_status;

        let evidence = Evidence::find_by_assignment_id(&assignment_id).await?;

        Ok(AssignmentDetail {
            permitted_action: lifecycle::permitted_actions(acting, Some(&assignment.state())),
            assignment,
            report,
            evidence,
        })
    }
    pub async fn find_by_id(_id: &ObjectId) -> Result<Option<Assignment>, Error> {
        let db: Database = get_db();
        let collection: Collection<Assignment> = db.collection::<Assignment>("assignments");

        collection
            .find_one(doc! { "_id": _id }, None)
            .await
            .map_err(|_| Error::NotFound("ASSIGNMENT_NOT_FOUND"))
    }
    pub async fn find_by_report_id(report_id: &ObjectId) -> Result<Option<Assignment>, Error> {
        let db: Database = get_db();
        let collection: Collection<Assignment> = db.collection::<Assignment>("assignments");

        collection
            .find_one(doc! { "report_id": report_id }, None)
            .await
            .map_err(|_| Error::NotFound("ASSIGNMENT_NOT_FOUND"))
    }
    pub async fn find_many(query: &AssignmentQuery) -> Result<Vec<AssignmentResponse>, Error> {
        let db: Database = get_db();
        let collection: Collection<Assignment> = db.collection::<Assignment>("assignments");

        let mut pipeline: Vec<mongodb::bson::Document> = Vec::new();
        let mut assignments: Vec<AssignmentResponse> = Vec::new();

        if let Some(report_id) = &query.report_id {
            pipeline.push(doc! {
                "$match": { "report_id": report_id }
            });
        }
        if let Some(reviewer_id) = &query.reviewer_id {
            pipeline.push(doc! {
                "$match": { "reviewer_id": reviewer_id }
            });
        }
        if let Some(assignee_id) = &query.assignee_id {
            pipeline.push(doc! {
                "$match": { "assignee_id": assignee_id }
            });
        }
        if let Some(limit) = query.limit {
            pipeline.push(doc! {
                "$limit": to_bson::<usize>(&limit).unwrap()
            });
        }

        pipeline.push(doc! {
            "$project": {
                "_id": { "$toString": "$_id" },
                "report_id": { "$toString": "$report_id" },
                "reviewer_id": { "$toString": "$reviewer_id" },
                "assignee_id": { "$toString": "$assignee_id" },
                "action": "$action",
                "target_completion_date": "$target_completion_date",
                "remark": "$remark",
                "completed_at": "$completed_at",
                "review_status": "$review_status",
                "review_reason": "$review_reason",
                "reviewed_at": "$reviewed_at",
            }
        });

        if let Ok(mut cursor) = collection.aggregate(pipeline, None).await {
            while let Some(Ok(doc)) = cursor.next().await {
                let assignment: AssignmentResponse = from_document::<AssignmentResponse>(doc)
                    .map_err(|_| Error::PersistenceFailure("COLLECTING_FAILED"))?;
                assignments.push(assignment);
            }
            Ok(assignments)
        } else {
            Err(Error::NotFound("ASSIGNMENT_NOT_FOUND"))
        }
    }
    pub async fn find_detail_by_id(
        _id: &ObjectId,
        acting: &ActingUser,
    ) -> Result<Option<AssignmentDetail>, Error> {
        let assignment = match Assignment::find_by_id(_id).await? {
            Some(assignment) => assignment,
            None => return Ok(None),
        };

        let mut report = match Report::find_by_id(&assignment.report_id).await? {
            Some(report) => report,
            None => return Err(Error::NotFound("REPORT_NOT_FOUND")),
        };
        report.status = lifecycle::derive_status(Some(&assignment.state()));

        let evidence = Evidence::find_by_assignment_id(_id).await?;

        Ok(Some(AssignmentDetail {
            permitted_action: lifecycle::permitted_actions(acting, Some(&assignment.state())),
            assignment,
            report,
            evidence,
        }))
    }
}
