use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Main error type for the fleet service
#[derive(Debug)]
pub enum FleetError {
    // HTTP and API errors
    BadRequest(String),
    Unauthorized(String),
    Conflict(String),
    InternalServer(String),

    // Storage errors
    Storage(String),
    StaleRevision { expected: u64, found: u64 },
    RedisConnection(String),
    RedisQuery(String),
    Io(String),

    // External collaborators (export webhook, summary generator)
    Sync(String),
    NetworkTimeout,
    NetworkConnection(String),
    HttpClient(String),
    InvalidUrl(String),

    // Serialization and parsing errors
    JsonParsing(String),
    JsonSerialization(String),

    // Business logic errors
    VehicleNotFound(String),
    DriverNotFound(String),
    MissionNotFound(String),
    MissionAlreadyActive(String),
    MissionAlreadyCompleted(String),

    // Validation errors
    ValidationFailed(Vec<ValidationError>),
    InvalidFieldValue { field: String, value: String, reason: String },

    // Configuration and setup errors
    InvalidConfiguration(String),

    // Security and authentication errors
    InvalidPin,
    SessionExpired,
    PinHashing(String),
    RateLimitExceeded,

    ServiceUnavailable(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl fmt::Display for FleetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FleetError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            FleetError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            FleetError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            FleetError::InternalServer(msg) => write!(f, "Internal server error: {}", msg),

            FleetError::Storage(msg) => write!(f, "Storage error: {}", msg),
            FleetError::StaleRevision { expected, found } => write!(
                f,
                "Fleet data changed concurrently (expected revision {}, found {})",
                expected, found
            ),
            FleetError::RedisConnection(msg) => write!(f, "Redis connection error: {}", msg),
            FleetError::RedisQuery(msg) => write!(f, "Redis query error: {}", msg),
            FleetError::Io(msg) => write!(f, "I/O error: {}", msg),

            FleetError::Sync(msg) => write!(f, "Sync error: {}", msg),
            FleetError::NetworkTimeout => write!(f, "Network request timed out"),
            FleetError::NetworkConnection(msg) => write!(f, "Network connection error: {}", msg),
            FleetError::HttpClient(msg) => write!(f, "HTTP client error: {}", msg),
            FleetError::InvalidUrl(msg) => write!(f, "Invalid URL: {}", msg),

            FleetError::JsonParsing(msg) => write!(f, "JSON parsing error: {}", msg),
            FleetError::JsonSerialization(msg) => write!(f, "JSON serialization error: {}", msg),

            FleetError::VehicleNotFound(id) => write!(f, "Vehicle not found: {}", id),
            FleetError::DriverNotFound(id) => write!(f, "Driver not found: {}", id),
            FleetError::MissionNotFound(id) => write!(f, "Mission not found: {}", id),
            FleetError::MissionAlreadyActive(id) => {
                write!(f, "Another mission is already in progress: {}", id)
            }
            FleetError::MissionAlreadyCompleted(id) => write!(f, "Mission is already completed: {}", id),

            FleetError::ValidationFailed(errors) => {
                write!(f, "Validation failed: {} errors", errors.len())
            }
            FleetError::InvalidFieldValue { field, value, reason } => {
                write!(f, "Invalid value '{}' for field '{}': {}", value, field, reason)
            }

            FleetError::InvalidConfiguration(msg) => write!(f, "Invalid configuration: {}", msg),

            FleetError::InvalidPin => write!(f, "Invalid admin PIN"),
            FleetError::SessionExpired => write!(f, "Admin session is missing or expired"),
            FleetError::PinHashing(msg) => write!(f, "PIN hashing error: {}", msg),
            FleetError::RateLimitExceeded => write!(f, "Too many failed PIN attempts"),

            FleetError::ServiceUnavailable(service) => write!(f, "Service unavailable: {}", service),
        }
    }
}

impl std::error::Error for FleetError {}

impl IntoResponse for FleetError {
    fn into_response(self) -> Response {
        let (status, error_type, message, details) = match self {
            FleetError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg, None),
            FleetError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg, None),
            FleetError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg, None),

            FleetError::ValidationFailed(errors) => {
                let details = serde_json::to_value(&errors).ok();
                (StatusCode::BAD_REQUEST, "validation_failed", "Validation errors occurred".to_string(), details)
            }
            FleetError::InvalidFieldValue { field, reason, .. } => {
                (StatusCode::BAD_REQUEST, "invalid_field", format!("Invalid value for {}: {}", field, reason), None)
            }
            FleetError::InvalidUrl(msg) => (StatusCode::BAD_REQUEST, "invalid_url", msg, None),

            FleetError::VehicleNotFound(id) => (StatusCode::NOT_FOUND, "vehicle_not_found", format!("Vehicle not found: {}", id), None),
            FleetError::DriverNotFound(id) => (StatusCode::NOT_FOUND, "driver_not_found", format!("Driver not found: {}", id), None),
            FleetError::MissionNotFound(id) => (StatusCode::NOT_FOUND, "mission_not_found", format!("Mission not found: {}", id), None),

            FleetError::MissionAlreadyActive(id) => (
                StatusCode::CONFLICT,
                "mission_already_active",
                "Another mission is already in progress".to_string(),
                Some(serde_json::json!({ "activeMissionId": id })),
            ),
            FleetError::MissionAlreadyCompleted(id) => {
                (StatusCode::CONFLICT, "mission_already_completed", format!("Mission is already completed: {}", id), None)
            }
            err @ FleetError::StaleRevision { .. } => (StatusCode::CONFLICT, "stale_revision", err.to_string(), None),

            FleetError::InvalidPin => (StatusCode::UNAUTHORIZED, "invalid_pin", "Invalid admin PIN".to_string(), None),
            FleetError::SessionExpired => {
                (StatusCode::UNAUTHORIZED, "session_expired", "Admin session is missing or expired".to_string(), None)
            }
            FleetError::RateLimitExceeded => {
                (StatusCode::TOO_MANY_REQUESTS, "rate_limit_exceeded", "Too many failed PIN attempts".to_string(), None)
            }

            FleetError::ServiceUnavailable(service) => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", format!("Service unavailable: {}", service), None)
            }

            // All other errors are treated as internal server errors
            other => {
                tracing::error!("Request failed: {}", other);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", other.to_string(), None)
            }
        };

        let error_response = ErrorResponse {
            error: error_type.to_string(),
            message,
            details,
        };

        (status, axum::Json(error_response)).into_response()
    }
}

// Convenience type alias for Results
pub type FleetResult<T> = Result<T, FleetError>;

// Conversion implementations for common error types
impl From<redis::RedisError> for FleetError {
    fn from(err: redis::RedisError) -> Self {
        match err.kind() {
            redis::ErrorKind::IoError => FleetError::RedisConnection(err.to_string()),
            redis::ErrorKind::ResponseError => FleetError::RedisQuery(err.to_string()),
            redis::ErrorKind::AuthenticationFailed => FleetError::RedisConnection("Authentication failed".to_string()),
            _ => FleetError::RedisQuery(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for FleetError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FleetError::NetworkTimeout
        } else if err.is_connect() {
            FleetError::NetworkConnection(err.to_string())
        } else {
            FleetError::HttpClient(err.to_string())
        }
    }
}

impl From<serde_json::Error> for FleetError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_syntax() || err.is_data() || err.is_eof() {
            FleetError::JsonParsing(err.to_string())
        } else {
            FleetError::JsonSerialization(err.to_string())
        }
    }
}

impl From<std::io::Error> for FleetError {
    fn from(err: std::io::Error) -> Self {
        FleetError::Io(err.to_string())
    }
}

impl From<bcrypt::BcryptError> for FleetError {
    fn from(err: bcrypt::BcryptError) -> Self {
        FleetError::PinHashing(err.to_string())
    }
}

/// Body decoding failures. A field that fails to deserialize (`startKm: -5`) is a
/// validation error on that field; unreadable bodies are plain bad requests.
impl From<JsonRejection> for FleetError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::JsonDataError(err) => {
                let text = err.body_text();
                let detail = text.split_once("target type: ").map_or(text.as_str(), |(_, rest)| rest);
                match detail.split_once(": ") {
                    Some((field, message)) if !field.is_empty() && !field.contains(' ') => {
                        FleetError::validation_error(field, message)
                    }
                    _ => FleetError::validation_error("body", detail),
                }
            }
            other => FleetError::BadRequest(other.body_text()),
        }
    }
}

// Helper functions for creating common errors
impl FleetError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        FleetError::BadRequest(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        FleetError::Unauthorized(msg.into())
    }

    pub fn internal_error(msg: impl Into<String>) -> Self {
        FleetError::InternalServer(msg.into())
    }

    pub fn validation_error(field: impl Into<String>, message: impl Into<String>) -> Self {
        FleetError::ValidationFailed(vec![ValidationError::new(field, message)])
    }

    /// Turns a list of collected field errors into a result.
    pub fn check(errors: Vec<ValidationError>) -> FleetResult<()> {
        if errors.is_empty() {
            Ok(())
        } else {
            Err(FleetError::ValidationFailed(errors))
        }
    }

    pub fn vehicle_not_found(vehicle_id: impl Into<String>) -> Self {
        FleetError::VehicleNotFound(vehicle_id.into())
    }

    pub fn driver_not_found(driver_id: impl Into<String>) -> Self {
        FleetError::DriverNotFound(driver_id.into())
    }

    pub fn mission_not_found(mission_id: impl Into<String>) -> Self {
        FleetError::MissionNotFound(mission_id.into())
    }

    /// Whether this error belongs to the validation family (no state change happened).
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            FleetError::ValidationFailed(_) | FleetError::InvalidFieldValue { .. }
        )
    }

    /// Validation errors carried by this error, if any.
    pub fn validation_fields(&self) -> Vec<&str> {
        match self {
            FleetError::ValidationFailed(errors) => errors.iter().map(|e| e.field.as_str()).collect(),
            FleetError::InvalidFieldValue { field, .. } => vec![field.as_str()],
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = FleetError::MissionNotFound("msn-1".to_string());
        assert_eq!(error.to_string(), "Mission not found: msn-1");

        let stale = FleetError::StaleRevision { expected: 3, found: 4 };
        assert!(stale.to_string().contains("expected revision 3"));
    }

    #[test]
    fn test_validation_error() {
        let error = FleetError::validation_error("endKm", "must be at least startKm");
        match &error {
            FleetError::ValidationFailed(errors) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].field, "endKm");
                assert_eq!(errors[0].message, "must be at least startKm");
            }
            _ => panic!("Expected ValidationFailed error"),
        }
        assert!(error.is_validation());
        assert_eq!(error.validation_fields(), vec!["endKm"]);
    }

    #[test]
    fn test_check_collects_errors() {
        assert!(FleetError::check(Vec::new()).is_ok());
        let err = FleetError::check(vec![
            ValidationError::new("destination", "required"),
            ValidationError::new("reason", "required"),
        ])
        .unwrap_err();
        assert_eq!(err.validation_fields(), vec!["destination", "reason"]);
    }

    #[test]
    fn test_status_codes() {
        let cases = [
            (FleetError::validation_error("x", "y"), StatusCode::BAD_REQUEST),
            (FleetError::InvalidPin, StatusCode::UNAUTHORIZED),
            (FleetError::vehicle_not_found("1"), StatusCode::NOT_FOUND),
            (FleetError::MissionAlreadyActive("1".into()), StatusCode::CONFLICT),
            (FleetError::StaleRevision { expected: 0, found: 1 }, StatusCode::CONFLICT),
            (FleetError::RateLimitExceeded, StatusCode::TOO_MANY_REQUESTS),
            (FleetError::Storage("disk".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }

    #[test]
    fn test_helper_functions() {
        assert!(matches!(FleetError::bad_request("test"), FleetError::BadRequest(_)));
        assert!(matches!(FleetError::unauthorized("test"), FleetError::Unauthorized(_)));
        assert!(matches!(FleetError::internal_error("test"), FleetError::InternalServer(_)));
    }
}
