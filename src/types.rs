use diesel::result::Error as DieselError;
use diesel::PgConnection;
use rocket::http::Status;
use rocket::request::Request;
use rocket::response::{self, Responder};
use rocket_contrib::json::Json;
use std::collections::HashMap;
use std::io::Error as IoError;

use crate::utils::try_respond;

pub trait Validate
where
    Self: Sized,
{
    type Error;
    fn validate(self, connection: &PgConnection) -> Result<Self, Self::Error>;
}

/// State-machine violations on shared relationship records. These surface as
/// 409s with the variant named in the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conflict {
    AlreadyPending,
    AlreadyFriends,
    NoSuchRequest,
    NoRelationship,
}

impl Conflict {
    pub fn name(&self) -> &'static str {
        match *self {
            Conflict::AlreadyPending => "AlreadyPending",
            Conflict::AlreadyFriends => "AlreadyFriends",
            Conflict::NoSuchRequest => "NoSuchRequest",
            Conflict::NoRelationship => "NoRelationship",
        }
    }
}

#[derive(Debug)]
pub enum ApiError {
    Diesel(DieselError),
    Validation(ValidationError),
    Conflict(Conflict),
    NotFound,
    Forbidden,
    Unauthorized,
    Internal,
}

impl From<DieselError> for ApiError {
    fn from(err: DieselError) -> ApiError {
        match err {
            DieselError::NotFound => ApiError::NotFound,
            other => ApiError::Diesel(other),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> ApiError {
        ApiError::Validation(err)
    }
}

impl From<Conflict> for ApiError {
    fn from(conflict: Conflict) -> ApiError {
        ApiError::Conflict(conflict)
    }
}

impl From<IoError> for ApiError {
    fn from(_: IoError) -> ApiError {
        ApiError::Internal
    }
}

pub type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Serialize, Default)]
pub struct ValidationError(HashMap<String, Vec<String>>);

impl ValidationError {
    pub fn add_error<K: Into<String>, V: Into<String>>(&mut self, key: K, val: V) {
        let entry = self.0.entry(key.into()).or_insert(Vec::default());
        entry.push(val.into());
    }

    pub fn from<K: Into<String>, V: Into<String>>(key: K, val: V) -> Self {
        let mut error = ValidationError::default();
        error.add_error(key, val);
        error
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn merge(&mut self, other: ValidationError) {
        for (key, errors) in other.0.into_iter() {
            let entry = self.0.entry(key).or_default();
            entry.extend(errors);
        }
    }

    pub fn empty(&self) -> bool {
        self.len() == 0
    }
}

impl<'r> Responder<'r> for ApiError {
    fn respond_to(self, req: &Request) -> response::Result<'r> {
        match self {
            ApiError::NotFound => Err(Status::NotFound),

            ApiError::Forbidden => Err(Status::Forbidden),

            ApiError::Unauthorized => {
                let body = json!({ "errors": {
                    "status": "401 Unauthorized"
                }});
                try_respond(req, &body, Status::Unauthorized)
            }

            ApiError::Conflict(conflict) => {
                let body = json!({ "errors": {
                    "conflict": [conflict.name()]
                }});
                try_respond(req, &body, Status::Conflict)
            }

            ApiError::Validation(error) => {
                let body = json!({ "errors": error });
                try_respond(req, &body, Status::UnprocessableEntity)
            }

            _ => Err(Status::InternalServerError),
        }
    }
}

impl<T> Validate for Json<T>
where
    T: Validate,
{
    type Error = <T as Validate>::Error;
    fn validate(self, connection: &PgConnection) -> Result<Self, Self::Error> {
        let inner = self.0;
        let validated = inner.validate(connection)?;
        Ok(Json(validated))
    }
}
