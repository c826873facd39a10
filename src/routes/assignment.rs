use actix_web::{get, post, put, web, HttpRequest, HttpResponse};
use mongodb::bson::oid::ObjectId;
use serde::Deserialize;

use crate::error::Error;
use crate::lifecycle::UserRole;
use crate::models::assignment::{
    Assignment, AssignmentQuery, AssignmentRequest, CompletionRequest, ReviewRequest,
};
use crate::routes::acting_user;

#[derive(Debug, Deserialize)]
pub struct AssignmentListQuery {
    pub limit: Option<usize>,
}

#[post("/reports/{report_id}/assignments")]
pub async fn create_assignment(
    report_id: web::Path<String>,
    payload: web::Json<AssignmentRequest>,
    req: HttpRequest,
) -> Result<HttpResponse, Error> {
    let acting = acting_user(&req)?;

    let report_id: ObjectId = match report_id.parse() {
        Ok(report_id) => report_id,
        Err(_) => return Err(Error::BadRequest("INVALID_ID")),
    };

    if payload.action.is_empty() {
        return Err(Error::BadRequest("ASSIGNMENT_MUST_HAVE_ACTION"));
    }

    let detail = Assignment::create(&report_id, &acting, payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(detail))
}
#[put("/assignments/{assignment_id}/complete")]
pub async fn complete_assignment(
    assignment_id: web::Path<String>,
    payload: web::Json<CompletionRequest>,
    req: HttpRequest,
) -> Result<HttpResponse, Error> {
    let acting = acting_user(&req)?;

    let assignment_id: ObjectId = match assignment_id.parse() {
        Ok(assignment_id) => assignment_id,
        Err(_) => return Err(Error::BadRequest("INVALID_ID")),
    };

    let detail =
        Assignment::submit_completion(&assignment_id, &acting, &payload.evidence).await?;
    Ok(HttpResponse::Ok().json(detail))
}
#[put("/assignments/{assignment_id}/review")]
pub async fn review_assignment(
    assignment_id: web::Path<String>,
    payload: web::Json<ReviewRequest>,
    req: HttpRequest,
) -> Result<HttpResponse, Error> {
    let acting = acting_user(&req)?;

    let assignment_id: ObjectId = match assignment_id.parse() {
        Ok(assignment_id) => assignment_id,
        Err(_) => return Err(Error::BadRequest("INVALID_ID")),
    };

    let detail = Assignment::review(&assignment_id, &acting, payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(detail))
}
#[put("/assignments/{assignment_id}/resubmit")]
pub async fn resubmit_assignment(
    assignment_id: web::Path<String>,
    payload: web::Json<CompletionRequest>,
    req: HttpRequest,
) -> Result<HttpResponse, Error> {
    let acting = acting_user(&req)?;

    let assignment_id: ObjectId = match assignment_id.parse() {
        Ok(assignment_id) => assignment_id,
        Err(_) => return Err(Error::BadRequest("INVALID_ID")),
    };

    let detail = Assignment::resubmit(&assignment_id, &acting, &payload.evidence).await?;
    Ok(HttpResponse::Ok().json(detail))
}
#[get("/assignments")]
pub async fn get_assignments(
    query: web::Query<AssignmentListQuery>,
    req: HttpRequest,
) -> Result<HttpResponse, Error> {
    let acting = acting_user(&req)?;

    let mut assignment_query: AssignmentQuery = AssignmentQuery {
        report_id: None,
        reviewer_id: None,
        assignee_id: None,
        limit: query.limit,
    };

    match acting.role {
        UserRole::Reviewer => assignment_query.reviewer_id = Some(acting._id),
        UserRole::Assignee => assignment_query.assignee_id = Some(acting._id),
        UserRole::User => return Err(Error::Forbidden),
    }

    let assignments = Assignment::find_many(&assignment_query).await?;
    Ok(HttpResponse::Ok().json(assignments))
}
#[get("/assignments/{assignment_id}")]
pub async fn get_assignment(
    assignment_id: web::Path<String>,
    req: HttpRequest,
) -> Result<HttpResponse, Error> {
    let acting = acting_user(&req)?;

    let assignment_id: ObjectId = match assignment_id.parse() {
        Ok(assignment_id) => assignment_id,
        Err(_) => return Err(Error::BadRequest("INVALID_ID")),
    };

    let detail = match Assignment::find_detail_by_id(&assignment_id, &acting).await? {
        Some(detail) => detail,
        None => return Err(Error::NotFound("ASSIGNMENT_NOT_FOUND")),
    };

    match acting.role {
        UserRole::Reviewer => (),
        UserRole::Assignee => {
            if detail.assignment.assignee_id != acting._id {
                return Err(Error::Forbidden);
            }
        }
        UserRole::User => {
            if detail.report.reporter_id != acting._id {
                return Err(Error::Forbidden);
            }
        }
    }

    Ok(HttpResponse::Ok().json(detail))
}
