use actix_web::{get, post, web, HttpRequest, HttpResponse};
use mongodb::bson::{doc, oid::ObjectId, to_bson};
use regex::Regex;

use crate::error::Error;
use crate::lifecycle::UserRole;
use crate::models::profile::{
    Profile, ProfileCredential, ProfileQuery, ProfileRequest, ProfileResponse,
};
use crate::routes::acting_user;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ProfileListQuery {
    pub role: Option<UserRole>,
    pub limit: Option<usize>,
}

#[get("/users")]
pub async fn get_profiles(
    query: web::Query<ProfileListQuery>,
    req: HttpRequest,
) -> Result<HttpResponse, Error> {
    acting_user(&req)?;

    let query: ProfileQuery = ProfileQuery {
        _id: None,
        email: None,
        role: query.role,
        limit: query.limit,
    };

    let profiles = Profile::find_many(&query).await?;
    Ok(HttpResponse::Ok().json(profiles))
}
#[get("/users/{user_id}")]
pub async fn get_profile(user_id: web::Path<String>, req: HttpRequest) -> Result<HttpResponse, Error> {
    acting_user(&req)?;

    let user_id: ObjectId = match user_id.parse() {
        Ok(user_id) => user_id,
        Err(_) => return Err(Error::BadRequest("INVALID_ID")),
    };

    match Profile::find_by_id(&user_id).await? {
        Some(profile) => Ok(HttpResponse::Ok().json(profile.response())),
        None => Err(Error::NotFound("PROFILE_NOT_FOUND")),
    }
}
#[post("/users")]
pub async fn create_profile(payload: web::Json<ProfileRequest>) -> Result<HttpResponse, Error> {
    let payload: ProfileRequest = payload.into_inner();
    let email_regex: Regex = Regex::new(
        r"^([a-z0-9_+]([a-z0-9_+.]*[a-z0-9_+])?)@([a-z0-9]+([\-\.]{1}[a-z0-9]+)*\.[a-z]{2,6})",
    )
    .unwrap();

    if payload.password.len() < 8 {
        return Err(Error::BadRequest("PROFILE_MUST_HAVE_VALID_PASSWORD"));
    }
    if !email_regex.is_match(&payload.email) {
        return Err(Error::BadRequest("PROFILE_MUST_HAVE_VALID_EMAIL"));
    }

    // role is fixed here, signup is the only place it can be set
    let mut profile: Profile = Profile {
        _id: None,
        name: payload.name,
        email: payload.email,
        password: payload.password,
        role: payload.role,
    };

    if let Ok(Some(_)) = Profile::find_by_email(&profile.email).await {
        return Err(Error::BadRequest("PROFILE_ALREADY_EXIST"));
    }

    let _id = profile.save().await?;
    Ok(HttpResponse::Created().body(_id.to_string()))
}
#[post("/users/login")]
pub async fn login(payload: web::Json<ProfileCredential>) -> Result<HttpResponse, Error> {
    let payload: ProfileCredential = payload.into_inner();

    let (token, profile) = payload.authenticate().await?;
    Ok(HttpResponse::Ok().json(doc! {
        "token": to_bson::<String>(&token).unwrap(),
        "user": to_bson::<ProfileResponse>(&profile).unwrap(),
    }))
}
