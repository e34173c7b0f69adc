use opentelemetry_semantic_conventions::{attribute::OTEL_STATUS_CODE, trace::ERROR_TYPE};
use rocket::http::Status;
use rocket::response::Responder;
use thiserror::Error;
use tracing::{Span, error, warn};

use crate::telemetry::request_span;
use crate::validation::error_body;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Recorded as `error.type` on the active span.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Database(_) => "database_error",
            AppError::NotFound(_) => "not_found_error",
            AppError::Validation(_) => "validation_error",
            AppError::Internal(_) => "internal_error",
        }
    }

    /// Key the error is reported under in a JSON error body.
    pub fn response_field(&self) -> &'static str {
        match self {
            AppError::Database(_) | AppError::Internal(_) => "server",
            AppError::NotFound(_) => "resource",
            AppError::Validation(_) => "request",
        }
    }

    pub fn is_server_fault(&self) -> bool {
        matches!(self, AppError::Database(_) | AppError::Internal(_))
    }

    /// Text safe to hand back to a caller. Storage failures are not echoed.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Validation(msg) => msg.clone(),
            AppError::NotFound(_) => self.to_string(),
            AppError::Database(_) | AppError::Internal(_) => "Internal server error".to_string(),
        }
    }

    /// Logs the error with `ctx` and records it on the current span.
    pub fn log_and_record(&self, ctx: &str) {
        self.log(ctx);
        self.record_on(&Span::current());
    }

    pub fn log(&self, ctx: &str) {
        let message = self.to_string();

        if self.is_server_fault() {
            error!(error = %message, context = %ctx, kind = self.kind(), "Request failed");
        } else {
            warn!(error = %message, context = %ctx, kind = self.kind(), "Request rejected");
        }
    }

    /// Fills the error fields of `span`. Only fields the span declared (as
    /// `field::Empty`) are kept by subscribers.
    pub fn record_on(&self, span: &Span) {
        if span.is_none() {
            return;
        }

        span.record("error", true);
        span.record(ERROR_TYPE, self.kind());
        span.record("error.message", tracing::field::display(self));

        if self.is_server_fault() {
            span.record(OTEL_STATUS_CODE, "ERROR");
        }
    }

    pub fn status_code(&self) -> Status {
        match self {
            AppError::Database(_) | AppError::Internal(_) => Status::InternalServerError,
            AppError::NotFound(_) => Status::NotFound,
            AppError::Validation(_) => Status::BadRequest,
        }
    }

    pub fn to_status_with_log(&self, context: &str) -> Status {
        self.log_and_record(context);
        self.status_code()
    }
}

impl<'r> Responder<'r, 'static> for AppError {
    fn respond_to(self, req: &'r rocket::Request<'_>) -> rocket::response::Result<'static> {
        self.log(&format!("Request to {} {}", req.method(), req.uri()));
        self.record_on(request_span(req));

        error_body(&self).respond_to(req)
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(error: sqlx::migrate::MigrateError) -> Self {
        AppError::Internal(format!("Migration error: {}", error))
    }
}

impl From<AppError> for Status {
    fn from(err: AppError) -> Self {
        err.to_status_with_log("Error conversion into Status")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::http_request_span;
    use crate::validation::ToValidationResponse;
    use std::sync::{Arc, Mutex};
    use tracing::field::{Field, Visit};
    use tracing::span::{Id, Record};
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

    /// Collects every value recorded on a span after creation.
    #[derive(Clone, Default)]
    struct RecordedFields(Arc<Mutex<Vec<(String, String)>>>);

    impl RecordedFields {
        fn value_of(&self, name: &str) -> Option<String> {
            let fields = self.0.lock().ok()?;
            fields
                .iter()
                .rev()
                .find(|(field, _)| field == name)
                .map(|(_, value)| value.clone())
        }
    }

    impl Visit for RecordedFields {
        fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
            if let Ok(mut fields) = self.0.lock() {
                fields.push((field.name().to_string(), format!("{:?}", value)));
            }
        }

        fn record_str(&mut self, field: &Field, value: &str) {
            if let Ok(mut fields) = self.0.lock() {
                fields.push((field.name().to_string(), value.to_string()));
            }
        }
    }

    impl<S: tracing::Subscriber> Layer<S> for RecordedFields {
        fn on_record(&self, _id: &Id, values: &Record<'_>, _ctx: Context<'_, S>) {
            values.record(&mut self.clone());
        }
    }

    fn with_recorded_fields(f: impl FnOnce()) -> RecordedFields {
        let recorded = RecordedFields::default();
        let subscriber = tracing_subscriber::registry().with(recorded.clone());
        tracing::subscriber::with_default(subscriber, f);
        recorded
    }

    #[test]
    fn test_handler_error_records_error_fields() {
        let recorded = with_recorded_fields(|| {
            AppError::Database(sqlx::Error::RowNotFound).to_validation_response();
        });

        assert_eq!(
            recorded.value_of("error.type").as_deref(),
            Some("database_error")
        );
        assert_eq!(
            recorded.value_of("otel.status_code").as_deref(),
            Some("ERROR")
        );
        assert_eq!(recorded.value_of("error").as_deref(), Some("true"));
    }

    #[test]
    fn test_request_span_records_client_errors() {
        let recorded = with_recorded_fields(|| {
            let span = http_request_span("GET", "/api/ClassSchedule/10/A", Some("S1"));
            AppError::NotFound("No schedule found".into()).record_on(&span);
        });

        assert_eq!(
            recorded.value_of("error.type").as_deref(),
            Some("not_found_error")
        );
        assert_eq!(
            recorded.value_of("error.message").as_deref(),
            Some("Not found: No schedule found")
        );
        assert_eq!(recorded.value_of("otel.status_code"), None);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::NotFound("schedule".into()).status_code(),
            Status::NotFound
        );
        assert_eq!(
            AppError::Validation("school".into()).status_code(),
            Status::BadRequest
        );
        assert_eq!(
            AppError::Database(sqlx::Error::RowNotFound).status_code(),
            Status::InternalServerError
        );
        assert_eq!(
            AppError::Internal("boom".into()).status_code(),
            Status::InternalServerError
        );
    }

    #[test]
    fn test_server_faults_are_not_echoed() {
        let err = AppError::Database(sqlx::Error::RowNotFound);

        assert!(err.is_server_fault());
        assert_eq!(err.public_message(), "Internal server error");
        assert_eq!(err.response_field(), "server");
    }

    #[test]
    fn test_client_errors_keep_their_message() {
        let missing = AppError::NotFound("Schedule abc not found".into());
        assert_eq!(missing.public_message(), "Not found: Schedule abc not found");
        assert_eq!(missing.response_field(), "resource");

        let invalid = AppError::Validation("Missing required identifiers: school".into());
        assert_eq!(
            invalid.public_message(),
            "Missing required identifiers: school"
        );
        assert_eq!(invalid.kind(), "validation_error");
    }

    #[test]
    fn test_from_status_conversion() {
        let status: Status = AppError::NotFound("missing".into()).into();
        assert_eq!(status, Status::NotFound);
    }
}
