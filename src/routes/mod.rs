use std::{
    fs::{create_dir_all, rename},
    path::{Path, PathBuf},
};

use actix_multipart::form::{tempfile::TempFile, MultipartForm};
use actix_web::{get, post, web, HttpMessage, HttpRequest, HttpResponse};
use mime_guess::from_path;
use mongodb::bson::{doc, oid::ObjectId};
use serde::{Deserialize, Serialize};
use std::fs;

use crate::error::Error;
use crate::lifecycle::ActingUser;
use crate::models::profile::ProfileAuthentication;

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    ReportImage,
    EvidenceFile,
}

#[derive(Deserialize)]
pub struct FileQueryParams {
    pub kind: FileKind,
    pub name: String,
}

#[derive(Debug, MultipartForm)]
pub struct FileMultipartRequest {
    #[multipart(rename = "file")]
    pub file: TempFile,
}

pub mod assignment;
pub mod profile;
pub mod report;

impl FileKind {
    fn directory(&self) -> &'static str {
        match self {
            FileKind::ReportImage => "./files/reports",
            FileKind::EvidenceFile => "./files/evidences",
        }
    }
    fn as_str(&self) -> &'static str {
        match self {
            FileKind::ReportImage => "report_image",
            FileKind::EvidenceFile => "evidence_file",
        }
    }
}

pub fn acting_user(req: &HttpRequest) -> Result<ActingUser, Error> {
    match req.extensions().get::<ProfileAuthentication>() {
        Some(acting) => Ok(**acting),
        None => Err(Error::Unauthorized),
    }
}

#[get("/files")]
pub async fn get_file(query: web::Query<FileQueryParams>) -> HttpResponse {
    let path = format!("{}/{}", query.kind.directory(), query.name);
    if let Ok(file) = fs::read(path.clone()) {
        let mime = from_path(path).first_or_octet_stream();
        HttpResponse::Ok().content_type(mime).body(file)
    } else {
        HttpResponse::NotFound().body("CONTENT_NOT_FOUND")
    }
}

/// Stand-in for the external object storage: store the file, hand back
/// the URL the lifecycle records. The engine itself only ever sees URLs.
#[post("/files")]
pub async fn upload_file(
    query: web::Query<FileUploadParams>,
    form: MultipartForm<FileMultipartRequest>,
    req: HttpRequest,
) -> Result<HttpResponse, Error> {
    acting_user(&req)?;

    let save_dir = query.kind.directory();
    if create_dir_all(save_dir).is_err() {
        return Err(Error::PersistenceFailure("DIRECTORY_CREATION_FAILED"));
    }

    let original_name = form.file.file_name.clone().unwrap_or_default();
    let name = match Path::new(&original_name)
        .extension()
        .and_then(|extension| extension.to_str())
    {
        Some(extension) => format!("{}.{}", ObjectId::new(), extension),
        None => ObjectId::new().to_string(),
    };

    let file_path_temp = form.file.file.path();
    let file_path = PathBuf::from(format!("{}/{}", save_dir, name));
    if rename(file_path_temp, &file_path).is_err() {
        return Err(Error::PersistenceFailure("FILE_RENAME_FAILED"));
    }

    let url = format!("/files?kind={}&name={}", query.kind.as_str(), name);
    Ok(HttpResponse::Created().json(doc! {
        "name": name,
        "url": url,
    }))
}

#[derive(Deserialize)]
pub struct FileUploadParams {
    pub kind: FileKind,
}
