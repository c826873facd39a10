use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use mongodb::bson::oid::ObjectId;
use thiserror::Error;

use crate::lifecycle::ReportStatus;

/// Failure taxonomy of the report lifecycle.
///
/// `PartialFailure` is the one outcome that leaves the two records out of
/// sync: the assignment write committed but the report-status write did
/// not. It carries enough to retry the report update; reads always derive
/// the status from the assignment, so the stored field heals on the next
/// successful transition.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    PreconditionFailed(&'static str),
    #[error("{0}")]
    PersistenceFailure(&'static str),
    #[error("PARTIAL_FAILURE")]
    PartialFailure {
        report_id: ObjectId,
        assignment_id: Option<ObjectId>,
        intended_status: ReportStatus,
    },
    #[error("{0}")]
    NotFound(&'static str),
    #[error("UNAUTHORIZED")]
    Unauthorized,
    #[error("FORBIDDEN")]
    Forbidden,
    #[error("{0}")]
    BadRequest(&'static str),
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::PreconditionFailed(_) => StatusCode::CONFLICT,
            Error::PersistenceFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::PartialFailure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Unauthorized => StatusCode::UNAUTHORIZED,
            Error::Forbidden => StatusCode::FORBIDDEN,
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).body(self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::ReportStatus;

    #[test]
    fn precondition_failures_are_conflicts() {
        let error = Error::PreconditionFailed("REVIEW_ALREADY_DECIDED");
        assert_eq!(error.status_code(), StatusCode::CONFLICT);
        assert_eq!(error.to_string(), "REVIEW_ALREADY_DECIDED");
    }

    #[test]
    fn partial_failure_keeps_the_intended_status() {
        let error = Error::PartialFailure {
            report_id: ObjectId::new(),
            assignment_id: Some(ObjectId::new()),
            intended_status: ReportStatus::Approved,
        };
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error.to_string(), "PARTIAL_FAILURE");
        match error {
            Error::PartialFailure {
                intended_status, ..
            } => assert_eq!(intended_status, ReportStatus::Approved),
            _ => unreachable!(),
        }
    }
}
