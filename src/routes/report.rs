use actix_web::{get, post, web, HttpRequest, HttpResponse};
use mongodb::bson::{oid::ObjectId, DateTime};
use serde::Deserialize;
use tracing::info;

use crate::error::Error;
use crate::lifecycle::{ReportStatus, UserRole};
use crate::models::{
    assignment::{Assignment, AssignmentQuery},
    report::{Report, ReportKind, ReportQuery, ReportRequest},
};
use crate::routes::acting_user;

#[derive(Debug, Deserialize)]
pub struct ReportListQuery {
    pub kind: Option<ReportKind>,
    pub status: Option<ReportStatus>,
    pub limit: Option<usize>,
}

#[post("/reports")]
pub async fn create_report(
    payload: web::Json<ReportRequest>,
    req: HttpRequest,
) -> Result<HttpResponse, Error> {
    let acting = acting_user(&req)?;
    if acting.role != UserRole::User {
        return Err(Error::Forbidden);
    }

    let payload: ReportRequest = payload.into_inner();

    if payload.title.is_empty() {
        return Err(Error::BadRequest("REPORT_MUST_HAVE_TITLE"));
    }

    let mut report: Report = Report {
        _id: None,
        reporter_id: acting._id,
        kind: payload.kind,
        title: payload.title,
        description: payload.description,
        location: payload.location,
        severity: payload.severity,
        image_url: payload.image_url.unwrap_or_default(),
        status: ReportStatus::Submitted,
        date: DateTime::now(),
    };

    let _id = report.save().await?;
    info!(report = %_id, kind = ?report.kind, "report submitted");
    Ok(HttpResponse::Created().body(_id.to_string()))
}
#[get("/reports")]
pub async fn get_reports(
    query: web::Query<ReportListQuery>,
    req: HttpRequest,
) -> Result<HttpResponse, Error> {
    let acting = acting_user(&req)?;

    let mut report_query: ReportQuery = ReportQuery {
        _ids: None,
        reporter_id: None,
        kind: query.kind,
        status: query.status,
        limit: query.limit,
    };

    match acting.role {
        UserRole::User => report_query.reporter_id = Some(acting._id),
        UserRole::Reviewer => (),
        UserRole::Assignee => {
            // an assignee only sees reports routed to them
            let assignments = Assignment::find_many(&AssignmentQuery {
                report_id: None,
                reviewer_id: None,
                assignee_id: Some(acting._id),
                limit: None,
            })
            .await?;
            if assignments.is_empty() {
                return Ok(HttpResponse::Ok().json(Vec::<Report>::new()));
            }
            let mut _ids: Vec<ObjectId> = Vec::new();
            for assignment in assignments.iter() {
                if let Ok(_id) = assignment.report_id.parse() {
                    _ids.push(_id);
                }
            }
            report_query._ids = Some(_ids);
        }
    }

    let reports = Report::find_many(&report_query).await?;
    Ok(HttpResponse::Ok().json(reports))
}
#[get("/reports/{report_id}")]
pub async fn get_report(
    report_id: web::Path<String>,
    req: HttpRequest,
) -> Result<HttpResponse, Error> {
    let acting = acting_user(&req)?;

    let report_id: ObjectId = match report_id.parse() {
        Ok(report_id) => report_id,
        Err(_) => return Err(Error::BadRequest("INVALID_ID")),
    };

    let detail = match Report::find_detail_by_id(&report_id, &acting).await? {
        Some(detail) => detail,
        None => return Err(Error::NotFound("REPORT_NOT_FOUND")),
    };

    match acting.role {
        UserRole::Reviewer => (),
        UserRole::User => {
            if detail.report.reporter_id != acting._id {
                return Err(Error::Forbidden);
            }
        }
        UserRole::Assignee => {
            let assigned = detail
                .assignment
                .as_ref()
                .map(|assignment| assignment.assignee_id == acting._id)
                .unwrap_or(false);
            if !assigned {
                return Err(Error::Forbidden);
            }
        }
    }

    Ok(HttpResponse::Ok().json(detail))
}
