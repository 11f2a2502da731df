use diesel::result::Error as DieselError;
use diesel::PgConnection;
use rocket::http::Status;
use rocket::request::Request;
use rocket::response::status::Custom;
use rocket::response::{self, Responder};
use rocket::serde::json::Json;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use thiserror::Error;

pub trait Validate
where
    Self: Sized,
{
    type Error;
    fn validate(self, connection: &mut PgConnection) -> Result<Self, Self::Error>;
}

/// Every failure a service operation can surface. The transport layer maps
/// these onto status codes; nothing below the routes ever swallows one.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("validation failed")]
    Validation(ValidationError),
    #[error("resource not found")]
    NotFound,
    #[error("actor is not the resource author")]
    Forbidden,
    #[error("authentication required")]
    Unauthenticated,
    #[error("uniqueness conflict could not be resolved")]
    Conflict,
    #[error("storage error: {0}")]
    Storage(DieselError),
    #[error("storage unavailable")]
    Unavailable,
    #[error("internal error")]
    Internal,
}

impl From<DieselError> for ApiError {
    fn from(err: DieselError) -> ApiError {
        match err {
            DieselError::NotFound => ApiError::NotFound,
            other => ApiError::Storage(other),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> ApiError {
        ApiError::Validation(err)
    }
}

pub type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Serialize, Default)]
pub struct ValidationError(HashMap<String, Vec<String>>);

impl ValidationError {
    pub fn add_error<K: Into<String>, V: Into<String>>(&mut self, key: K, val: V) {
        let entry = self.0.entry(key.into()).or_default();
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

    pub fn into_result(self) -> Result<(), ValidationError> {
        if self.empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'static> {
        let (status, body) = match self {
            ApiError::Validation(error) => {
                (Status::UnprocessableEntity, json!({ "errors": error }))
            }
            ApiError::NotFound => (
                Status::NotFound,
                json!({ "errors": { "resource": ["not found"] } }),
            ),
            ApiError::Forbidden => (
                Status::Forbidden,
                json!({ "errors": { "resource": ["forbidden"] } }),
            ),
            ApiError::Unauthenticated => (
                Status::Unauthorized,
                json!({ "errors": { "status": ["401 Unauthorized"] } }),
            ),
            ApiError::Conflict => (
                Status::Conflict,
                json!({ "errors": { "resource": ["conflict"] } }),
            ),
            ApiError::Storage(error) => {
                tracing::error!(%error, "storage error while handling a request");
                (
                    Status::InternalServerError,
                    json!({ "errors": { "status": ["500 Internal Server Error"] } }),
                )
            }
            ApiError::Unavailable => (
                Status::ServiceUnavailable,
                json!({ "errors": { "status": ["503 Service Unavailable"] } }),
            ),
            ApiError::Internal => (
                Status::InternalServerError,
                json!({ "errors": { "status": ["500 Internal Server Error"] } }),
            ),
        };
        Custom(status, Json(body)).respond_to(req)
    }
}

impl<T> Validate for Json<T>
where
    T: Validate,
{
    type Error = <T as Validate>::Error;
    fn validate(self, connection: &mut PgConnection) -> Result<Self, Self::Error> {
        let inner = self.into_inner();
        let validated = inner.validate(connection)?;
        Ok(Json(validated))
    }
}
