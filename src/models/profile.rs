use crate::database::get_db;
use crate::error::Error;
use crate::lifecycle::{ActingUser, UserRole};
use actix_service::{self, Transform};
use actix_web::{
    dev::{Service, ServiceRequest, ServiceResponse},
    HttpMessage,
};
use chrono::Utc;
use futures::{
    future::{ready, LocalBoxFuture, Ready},
    stream::StreamExt,
    FutureExt,
};
use jsonwebtoken::{self, decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use mongodb::{
    bson::{doc, from_document, oid::ObjectId, to_bson},
    Collection, Database,
};
use pwhash::bcrypt;
use serde::{Deserialize, Serialize};
use std::{fs::read_to_string, rc::Rc, str::FromStr, sync::OnceLock};

struct ProfileKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

static KEYS: OnceLock<ProfileKeys> = OnceLock::new();

#[derive(Debug, Serialize, Deserialize)]
struct ProfileClaims {
    aud: String,
    exp: i64,
    iss: String,
    sub: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Profile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: UserRole,
}
#[derive(Debug, Deserialize, Serialize)]
pub struct ProfileCredential {
    pub email: String,
    pub password: String,
}
#[derive(Debug)]
pub struct ProfileQuery {
    pub _id: Option<ObjectId>,
    pub email: Option<String>,
    pub role: Option<UserRole>,
    pub limit: Option<usize>,
}
#[derive(Debug, Deserialize, Serialize)]
pub struct ProfileRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: UserRole,
}
#[derive(Debug, Deserialize, Serialize)]
pub struct ProfileResponse {
    pub _id: String,
    pub name: String,
    pub email: String,
    pub role: UserRole,
}
pub struct ProfileAuthenticationMiddleware<S> {
    service: Rc<S>,
}
pub struct ProfileAuthenticationMiddlewareFactory;

pub type ProfileAuthentication = Rc<ActingUser>;

impl Profile {
    pub async fn save(&mut self) -> Result<ObjectId, Error> {
        let db: Database = get_db();
        let collection: Collection<Profile> = db.collection::<Profile>("profiles");

        self._id = Some(ObjectId::new());

        let hash = bcrypt::hash(&self.password).map_err(|_| Error::PersistenceFailure("HASHING_FAILED"))?;
        self.password = hash;

        collection
            .insert_one(&*self, None)
            .await
            .map_err(|_| Error::PersistenceFailure("INSERTING_FAILED"))
            .map(|result| result.inserted_id.as_object_id().unwrap())
    }
    pub async fn find_many(query: &ProfileQuery) -> Result<Vec<ProfileResponse>, Error> {
        let db: Database = get_db();
        let collection: Collection<Profile> = db.collection::<Profile>("profiles");

        let mut pipeline: Vec<mongodb::bson::Document> = Vec::new();
        let mut profiles: Vec<ProfileResponse> = Vec::new();

        if let Some(role) = &query.role {
            pipeline.push(doc! {
                "$match": {
                    "role": to_bson::<UserRole>(role).unwrap()
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
                "name": "$name",
                "email": "$email",
                "role": "$role",
            }
        });

        if let Ok(mut cursor) = collection.aggregate(pipeline, None).await {
            while let Some(Ok(doc)) = cursor.next().await {
                let profile: ProfileResponse = from_document::<ProfileResponse>(doc)
                    .map_err(|_| Error::PersistenceFailure("COLLECTING_FAILED"))?;
                profiles.push(profile);
            }
            Ok(profiles)
        } else {
            Err(Error::NotFound("PROFILE_NOT_FOUND"))
        }
    }
    pub async fn find_by_id(_id: &ObjectId) -> Result<Option<Profile>, Error> {
        let db: Database = get_db();
        let collection: Collection<Profile> = db.collection::<Profile>("profiles");

        collection
            .find_one(doc! { "_id": _id }, None)
            .await
            .map_err(|_| Error::NotFound("PROFILE_NOT_FOUND"))
    }
    pub async fn find_by_email(email: &String) -> Result<Option<Profile>, Error> {
        let db: Database = get_db();
        let collection: Collection<Profile> = db.collection::<Profile>("profiles");

        collection
            .find_one(doc! { "email": email }, None)
            .await
            .map_err(|_| Error::NotFound("PROFILE_NOT_FOUND"))
    }
    pub fn response(&self) -> ProfileResponse {
        ProfileResponse {
            _id: self._id.map(|_id| _id.to_string()).unwrap_or_default(),
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role,
        }
    }
}

impl ProfileCredential {
    pub async fn authenticate(&self) -> Result<(String, ProfileResponse), Error> {
        let profile = match Profile::find_by_email(&self.email).await {
            Ok(Some(profile)) => profile,
            _ => return Err(Error::BadRequest("INVALID_COMBINATION")),
        };
        if !bcrypt::verify(self.password.clone(), &profile.password) {
            return Err(Error::BadRequest("INVALID_COMBINATION"));
        }

        let claims: ProfileClaims = ProfileClaims {
            sub: ObjectId::to_string(&profile._id.unwrap()),
            exp: Utc::now().timestamp() + 86400,
            iss: "Safework".to_string(),
            aud: "http://localhost:8000".to_string(),
        };

        let keys = KEYS.get().ok_or(Error::PersistenceFailure("KEYS_NOT_LOADED"))?;
        let header: Header = Header::new(Algorithm::RS256);
        match encode(&header, &claims, &keys.encoding) {
            Ok(token) => Ok((token, profile.response())),
            Err(_) => Err(Error::PersistenceFailure("GENERATING_FAILED")),
        }
    }
    pub fn verify(token: &str) -> Option<ObjectId> {
        let validation: Validation = Validation::new(Algorithm::RS256);
        let keys = KEYS.get()?;
        let data = decode::<ProfileClaims>(token, &keys.decoding, &validation).ok()?;
        ObjectId::from_str(&data.claims.sub).ok()
    }
}

impl<S, B> Service<ServiceRequest> for ProfileAuthenticationMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error> + 'static,
{
    type Response = ServiceResponse<B>;
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    actix_service::forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let srv: Rc<S> = self.service.clone();

        async move {
            if let Some(header) = req.headers().get("Authorization") {
                if let Ok(header) = header.to_str() {
                    if let Some(token) = header.strip_prefix("Bearer ") {
                        if let Some(_id) = ProfileCredential::verify(token) {
                            if let Ok(Some(profile)) = Profile::find_by_id(&_id).await {
                                let acting: ActingUser = ActingUser {
                                    _id,
                                    role: profile.role,
                                };
                                req.extensions_mut()
                                    .insert::<ProfileAuthentication>(Rc::new(acting));
                            }
                        }
                    }
                }
            }
            let res: ServiceResponse<B> = srv.call(req).await?;
            Ok(res)
        }
        .boxed_local()
    }
}
impl<S, B> Transform<S, ServiceRequest> for ProfileAuthenticationMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = actix_web::Error;
    type Transform = ProfileAuthenticationMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(ProfileAuthenticationMiddleware {
            service: Rc::new(service),
        }))
    }
}

pub fn load_keys() {
    let private_access_file =
        read_to_string("./keys/private_access.key").expect("LOAD_FAILED_PRIVATE_ACCESS");
    let public_access_file =
        read_to_string("./keys/public_access.pem").expect("LOAD_FAILED_PUBLIC_ACCESS");
    let keys = ProfileKeys {
        encoding: EncodingKey::from_rsa_pem(private_access_file.as_bytes())
            .expect("INVALID_PRIVATE_ACCESS"),
        decoding: DecodingKey::from_rsa_pem(public_access_file.as_bytes())
            .expect("INVALID_PUBLIC_ACCESS"),
    };
    KEYS.set(keys).ok();
}
