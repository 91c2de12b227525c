use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use std::fmt;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Unauthorized(String),
    Forbidden(String),
    InternalServerError(String),
    ValidationError(String),
    DatabaseError(sqlx::Error),
    AuthError(String),
    PayloadTooLarge(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    message: String,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            ApiError::NotFound(msg) => write!(f, "Not Found: {}", msg),
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            ApiError::InternalServerError(msg) => write!(f, "Internal Server Error: {}", msg),
            ApiError::ValidationError(msg) => write!(f, "Validation Error: {}", msg),
            ApiError::DatabaseError(err) => write!(f, "Database Error: {}", err),
            ApiError::AuthError(msg) => write!(f, "Auth Error: {}", msg),
            ApiError::PayloadTooLarge(msg) => write!(f, "Payload Too Large: {}", msg),
        }
    }
}

impl ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        let error_response = ErrorResponse {
            success: false,
            message: self.to_string(),
        };

        match self {
            ApiError::BadRequest(_) => HttpResponse::BadRequest().json(error_response),
            ApiError::NotFound(_) => HttpResponse::NotFound().json(error_response),
            ApiError::Unauthorized(_) => HttpResponse::Unauthorized().json(error_response),
            ApiError::Forbidden(_) => HttpResponse::Forbidden().json(error_response),
            ApiError::ValidationError(_) => HttpResponse::UnprocessableEntity().json(error_response),
            ApiError::DatabaseError(_) => HttpResponse::InternalServerError().json(error_response),
            ApiError::AuthError(_) => HttpResponse::Unauthorized().json(error_response),
            ApiError::InternalServerError(_) => HttpResponse::InternalServerError().json(error_response),
            ApiError::PayloadTooLarge(_) => HttpResponse::PayloadTooLarge().json(error_response),
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::DatabaseError(err)
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        ApiError::ValidationError(err.to_string())
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::InternalServerError(err.to_string())
    }
}

// Domain-specific constructors
impl ApiError {
    pub fn bad_request(msg: &str) -> Self {
        ApiError::BadRequest(msg.to_string())
    }

    pub fn not_found(entity: &str) -> Self {
        ApiError::NotFound(format!("{} not found", entity))
    }

    pub fn department_not_found(id: &str) -> Self {
        ApiError::NotFound(format!("Department with ID '{}' not found", id))
    }

    pub fn equipment_not_found(id: &str) -> Self {
        ApiError::NotFound(format!("Equipment with ID '{}' not found", id))
    }

    pub fn department_required() -> Self {
        ApiError::BadRequest("Department ID is required".to_string())
    }

    pub fn no_department_assigned() -> Self {
        ApiError::BadRequest("No home department is assigned to this account".to_string())
    }

    pub fn department_in_use(name: &str) -> Self {
        ApiError::BadRequest(format!(
            "Department '{}' still has assets assigned and cannot be deleted",
            name
        ))
    }

    pub fn cross_department_access() -> Self {
        ApiError::Forbidden("Access to another department's data is not allowed".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_detail() {
        let err = ApiError::BadRequest("no file".to_string());
        assert_eq!(err.to_string(), "Bad Request: no file");
    }

    #[test]
    fn test_department_in_use_message() {
        let err = ApiError::department_in_use("Agronomy");
        assert!(err.to_string().contains("Agronomy"));
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[test]
    fn test_cross_department_access_is_forbidden() {
        assert!(matches!(
            ApiError::cross_department_access(),
            ApiError::Forbidden(_)
        ));
    }
}
