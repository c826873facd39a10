use crate::database::get_db;
use crate::error::Error;
use crate::lifecycle::{self, ActingUser, LifecycleAction, ReportStatus};
use futures::stream::StreamExt;
use mongodb::{
    bson::{doc, from_document, oid::ObjectId, to_bson, DateTime},
    Collection, Database,
};
use serde::{Deserialize, Serialize};

use super::{assignment::Assignment, evidence::Evidence};

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    Hazard,
    Incident,
    Sot,
}
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReportSeverity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Report {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,
    pub reporter_id: ObjectId,
    pub kind: ReportKind,
    pub title: String,
    pub description: String,
    pub location: String,
    pub severity: Option<ReportSeverity>,
    pub image_url: Vec<String>,
    pub status: ReportStatus,
    pub date: DateTime,
}
#[derive(Debug, Deserialize, Serialize)]
pub struct ReportRequest {
    pub kind: ReportKind,
    pub title: String,
    pub description: String,
    pub location: String,
    pub severity: Option<ReportSeverity>,
    pub image_url: Option<Vec<String>>,
}
#[derive(Debug)]
pub struct ReportQuery {
    pub _ids: Option<Vec<ObjectId>>,
    pub reporter_id: Option<ObjectId>,
    pub kind: Option<ReportKind>,
    pub status: Option<ReportStatus>,
    pub limit: Option<usize>,
}
#[derive(Debug, Deserialize, Serialize)]
pub struct ReportResponse {
    pub _id: String,
    pub reporter_id: String,
    pub kind: ReportKind,
    pub title: String,
    pub location: String,
    pub severity: Option<ReportSeverity>,
    pub image_url: Vec<String>,
    pub status: ReportStatus,
    pub date: DateTime,
}
#[derive(Debug, Serialize)]
pub struct ReportDetail {
    pub report: Report,
    pub assignment: Option<Assignment>,
    pub evidence: Vec<Evidence>,
    pub permitted_action: Vec<LifecycleAction>,
}

impl Report {
    pub async fn save(&mut self) -> Result<ObjectId, Error> {
        let db: Database = get_db();
        let collection: Collection<Report> = db.collection::<Report>("reports");

        self._id = Some(ObjectId::new());

        collection
            .insert_one(&*self, None)
            .await
            .map_err(|_| Error::PersistenceFailure("INSERTING_FAILED"))
            .map(|result| result.inserted_id.as_object_id().unwrap())
    }
    pub async fn update_status(_id: &ObjectId, status: ReportStatus) -> Result<(), Error> {
        let db: Database = get_db();
        let collection: Collection<Report> = db.collection::<Report>("reports");

        collection
            .update_one(
                doc! { "_id": _id },
                doc! { "$set": { "status": to_bson::<ReportStatus>(&status).unwrap() } },
                None,
            )
            .await
            .map_err(|_| Error::PersistenceFailure("UPDATE_FAILED"))
            .map(|_| ())
    }
    pub async fn find_by_id(_id: &ObjectId) -> Result<Option<Report>, Error> {
        let db: Database = get_db();
        let collection: Collection<Report> = db.collection::<Report>("reports");

        collection
            .find_one(doc! { "_id": _id }, None)
            .await
            .map_err(|_| Error::NotFound("REPORT_NOT_FOUND"))
    }
    pub async fn find_many(query: &ReportQuery) -> Result<Vec<ReportResponse>, Error> {
        let db: Database = get_db();
        let collection: Collection<Report> = db.collection::<Report>("reports");

        let mut pipeline: Vec<mongodb::bson::Document> = Vec::new();
        let mut reports: Vec<ReportResponse> = Vec::new();

        if let Some(_ids) = &query._ids {
            pipeline.push(doc! {
                "$match": {
                    "_id": { "$in": to_bson::<Vec<ObjectId>>(_ids).unwrap() }
                }
            });
        }
        if let Some(reporter_id) = &query.reporter_id {
            pipeline.push(doc! {
                "$match": {
                    "reporter_id": reporter_id
                }
            });
        }
        if let Some(kind) = &query.kind {
            pipeline.push(doc! {
                "$match": {
                    "kind": to_bson::<ReportKind>(kind).unwrap()
                }
            });
        }
        if let Some(status) = &query.status {
            pipeline.push(doc! {
                "$match": {
                    "status": to_bson::<ReportStatus>(status).unwrap()
                }
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
                "reporter_id": { "$toString": "$reporter_id" },
                "kind": "$kind",
                "title": "$title",
                "location": "$location",
                "severity": "$severity",
                "image_url": "$image_url",
                "status": "$status",
                "date": "$date",
            }
        });

        if let Ok(mut cursor) = collection.aggregate(pipeline, None).await {
            while let Some(Ok(doc)) = cursor.next().await {
                let report: ReportResponse = from_document::<ReportResponse>(doc)
                    .map_err(|_| Error::PersistenceFailure("COLLECTING_FAILED"))?;
                reports.push(report);
            }
            Ok(reports)
        } else {
            Err(Error::NotFound("REPORT_NOT_FOUND"))
        }
    }
    /// Detail view of a report with its assignment and evidence. The
    /// status served here is always derived from the assignment, never
    /// the stored field, so a torn two-record write is not visible.
    pub async fn find_detail_by_id(
        _id: &ObjectId,
        acting: &ActingUser,
    ) -> Result<Option<ReportDetail>, Error> {
        let mut report = match Report::find_by_id(_id).await? {
            Some(report) => report,
            None => return Ok(None),
        };

        let assignment = Assignment::find_by_report_id(_id).await?;
        let state = assignment.as_ref().map(|assignment| assignment.state());

        report.status = lifecycle::derive_status(state.as_ref());

        let evidence = match &assignment {
            Some(assignment) => {
                Evidence::find_by_assignment_id(&assignment._id.unwrap()).await?
            }
            None => Vec::<Evidence>::new(),
        };

        Ok(Some(ReportDetail {
            permitted_action: lifecycle::permitted_actions(acting, state.as_ref()),
            report,
            assignment,
            evidence,
        }))
    }
}
