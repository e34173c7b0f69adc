use crate::error::AppError;
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{field, instrument};
use validator::{Validate, ValidationErrors};

/// JSON error body shared by every failing endpoint:
/// `{"status": "error", "errors": {"<field>": ["<message>", ...]}}`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ValidationResponse {
    pub status: String,
    pub errors: HashMap<String, Vec<String>>,
}

pub type ErrorResponse = Custom<Json<ValidationResponse>>;

impl ValidationResponse {
    pub fn new(errors: HashMap<String, Vec<String>>) -> Self {
        Self {
            status: "error".to_string(),
            errors,
        }
    }

    pub fn with_error(field: &str, message: &str) -> Self {
        let mut errors = HashMap::new();
        errors.insert(field.to_string(), vec![message.to_string()]);
        Self::new(errors)
    }

    /// One entry per invalid request field, using the message from its
    /// `#[validate(...)]` attribute.
    pub fn from_field_errors(errors: &ValidationErrors) -> Self {
        let errors = errors
            .field_errors()
            .into_iter()
            .map(|(field, field_errors)| {
                let messages = field_errors
                    .iter()
                    .map(|error| match &error.message {
                        Some(message) => message.to_string(),
                        None => format!("Invalid {}", field),
                    })
                    .collect();
                (field.to_string(), messages)
            })
            .collect();

        Self::new(errors)
    }
}

pub trait ToValidationResponse {
    fn to_validation_response(self) -> ErrorResponse;
}

/// JSON body and status for `err`, without logging it.
pub fn error_body(err: &AppError) -> ErrorResponse {
    Custom(
        err.status_code(),
        Json(ValidationResponse::with_error(
            err.response_field(),
            &err.public_message(),
        )),
    )
}

impl ToValidationResponse for AppError {
    #[instrument(
        name = "handler_error",
        skip(self),
        fields(
            error = field::Empty,
            error.type = field::Empty,
            error.message = field::Empty,
            otel.status_code = field::Empty,
        )
    )]
    fn to_validation_response(self) -> ErrorResponse {
        self.log_and_record("Handler returned an error");
        error_body(&self)
    }
}

impl ToValidationResponse for Status {
    #[instrument]
    fn to_validation_response(self) -> ErrorResponse {
        let (field, message) = match self {
            Status::NotFound => ("resource", "Resource not found"),
            Status::BadRequest => ("request", "Bad request"),
            Status::UnprocessableEntity => ("request", "Request body could not be parsed"),
            Status::InternalServerError => ("server", "Internal server error"),
            _ => ("error", "An error occurred"),
        };

        Custom(self, Json(ValidationResponse::with_error(field, message)))
    }
}

/// Runs `validator` checks on a JSON body and hands back the inner value.
pub trait JsonValidateExt<T> {
    fn validate_custom(self) -> Result<T, ErrorResponse>;
}

impl<T: Validate> JsonValidateExt<T> for Json<T> {
    fn validate_custom(self) -> Result<T, ErrorResponse> {
        let inner = self.into_inner();
        inner.validate().map_err(|errors| {
            Custom(
                Status::UnprocessableEntity,
                Json(ValidationResponse::from_field_errors(&errors)),
            )
        })?;
        Ok(inner)
    }
}

/// Turns a service error into the JSON error body at the handler boundary.
pub trait AppErrorExt<T> {
    fn validate_custom(self) -> Result<T, ErrorResponse>;
}

impl<T> AppErrorExt<T> for Result<T, AppError> {
    fn validate_custom(self) -> Result<T, ErrorResponse> {
        self.map_err(ToValidationResponse::to_validation_response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize, Validate)]
    struct NamedThing {
        #[validate(length(min = 1, message = "Name is required"))]
        name: String,
    }

    #[test]
    fn test_validator_errors_map_to_unprocessable_entity() {
        let body = Json(NamedThing {
            name: String::new(),
        });

        let Err(Custom(status, Json(response))) = body.validate_custom() else {
            panic!("Empty name should fail validation");
        };

        assert_eq!(status, Status::UnprocessableEntity);
        assert_eq!(response.status, "error");
        assert_eq!(response.errors["name"], vec!["Name is required".to_string()]);
    }

    #[test]
    fn test_valid_body_is_returned() {
        let body = Json(NamedThing {
            name: "Math".to_string(),
        });

        let inner = body.validate_custom().expect("Name should pass validation");
        assert_eq!(inner.name, "Math");
    }

    #[test]
    fn test_not_found_maps_to_resource_error() {
        let result: Result<(), AppError> = Err(AppError::NotFound("schedule".to_string()));

        let Err(Custom(status, Json(response))) = result.validate_custom() else {
            panic!("Expected an error response");
        };

        assert_eq!(status, Status::NotFound);
        assert_eq!(response.errors["resource"], vec!["Not found: schedule".to_string()]);
    }

    #[test]
    fn test_database_error_is_masked() {
        let result: Result<(), AppError> = Err(AppError::Database(sqlx::Error::RowNotFound));

        let Err(Custom(status, Json(response))) = result.validate_custom() else {
            panic!("Expected an error response");
        };

        assert_eq!(status, Status::InternalServerError);
        assert_eq!(response.errors["server"], vec!["Internal server error".to_string()]);
    }
}
