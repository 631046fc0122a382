use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use flowboard_types::{EngineError, ErrorKind};

#[derive(Debug, Clone)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

// Associated constants for enum-like usage without parentheses
#[allow(non_upper_case_globals)]
impl ApiError {
    pub const NotFound: ApiError = ApiError {
        status: StatusCode::NOT_FOUND,
        message: String::new(),
    };

    pub const Forbidden: ApiError = ApiError {
        status: StatusCode::FORBIDDEN,
        message: String::new(),
    };

    pub const Unauthorized: ApiError = ApiError {
        status: StatusCode::UNAUTHORIZED,
        message: String::new(),
    };
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::error!("Internal error: {}", msg);
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::warn!("Not found: {}", msg);
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::warn!("Bad request: {}", msg);
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::warn!("Unauthorized: {}", msg);
        Self::new(StatusCode::UNAUTHORIZED, msg)
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::warn!("Forbidden: {}", msg);
        Self::new(StatusCode::FORBIDDEN, msg)
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::warn!("Conflict: {}", msg);
        Self::new(StatusCode::CONFLICT, msg)
    }

    pub fn unprocessable(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::warn!("Unprocessable entity: {}", msg);
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, msg)
    }

    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::error!("Service unavailable: {}", msg);
        Self::new(StatusCode::SERVICE_UNAVAILABLE, msg)
    }

    #[allow(non_snake_case)]
    pub fn InternalError(err: flowboard_types::Error) -> Self {
        err.into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = if self.message.is_empty() {
            self.status
                .canonical_reason()
                .unwrap_or("Error")
                .to_string()
        } else {
            self.message
        };
        (self.status, message).into_response()
    }
}

/// Engine errors carry a typed kind; map it onto the HTTP surface. The
/// typed kind also stays in the body so clients can branch on it.
impl From<flowboard_types::Error> for ApiError {
    fn from(err: flowboard_types::Error) -> Self {
        let kind = EngineError::kind_of(&err);
        let message = format!("{}: {}", kind.as_str(), err);

        let status = match kind {
            ErrorKind::Validation => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::MissingRuntimeVariable
            | ErrorKind::MissingOAuth
            | ErrorKind::InsufficientScopes => StatusCode::PRECONDITION_FAILED,
            ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::RemoteOnly | ErrorKind::LocalOnly => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::NodeError | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            // Cancellation is a normal outcome at the RPC boundary.
            ErrorKind::Cancelled => StatusCode::OK,
        };

        if status.is_server_error() {
            tracing::error!("Internal error: {:?}", err);
        }
        Self::new(status, message)
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        tracing::error!("IO error: {:?}", err);
        Self::internal(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        tracing::error!("JSON error: {:?}", err);
        Self::bad_request(format!("JSON error: {}", err))
    }
}

impl From<object_store::Error> for ApiError {
    fn from(err: object_store::Error) -> Self {
        tracing::error!("Object store error: {:?}", err);
        Self::internal(format!("Storage error: {}", err))
    }
}

impl From<jsonwebtoken::errors::Error> for ApiError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        tracing::warn!("JWT error: {:?}", err);
        Self::unauthorized(format!("JWT error: {}", err))
    }
}

impl std::error::Error for ApiError {}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.status, self.message)
    }
}

// Convenience macros for quick error creation
#[macro_export]
macro_rules! internal {
    ($($arg:tt)*) => { $crate::error::ApiError::internal(format!($($arg)*)) };
}

#[macro_export]
macro_rules! not_found {
    ($($arg:tt)*) => { $crate::error::ApiError::not_found(format!($($arg)*)) };
}

#[macro_export]
macro_rules! bad_request {
    ($($arg:tt)*) => { $crate::error::ApiError::bad_request(format!($($arg)*)) };
}

#[macro_export]
macro_rules! unauthorized {
    ($($arg:tt)*) => { $crate::error::ApiError::unauthorized(format!($($arg)*)) };
}

#[macro_export]
macro_rules! forbidden {
    ($($arg:tt)*) => { $crate::error::ApiError::forbidden(format!($($arg)*)) };
}
