//! Service Fabric client error types
//!
//! Every failure surfaced by the client is a [`FabricError`]. Responses with an
//! HTTP status of 400 or above become [`FabricError::Api`], whose [`ApiError`]
//! can be classified into an [`ApiErrorKind`] so callers can treat not-found and
//! the known conflict codes as control flow rather than failures.

use reqwest::StatusCode;
use thiserror::Error;

pub const CODE_APPLICATION_TYPE_ALREADY_EXISTS: &str = "FABRIC_E_APPLICATION_TYPE_ALREADY_EXISTS";
pub const CODE_APPLICATION_TYPE_IN_USE: &str = "FABRIC_E_APPLICATION_TYPE_IN_USE";
pub const CODE_APPLICATION_UPGRADE_IN_PROGRESS: &str = "FABRIC_E_APPLICATION_UPGRADE_IN_PROGRESS";
pub const CODE_APPLICATION_ALREADY_EXISTS: &str = "FABRIC_E_APPLICATION_ALREADY_EXISTS";
pub const CODE_SERVICE_ALREADY_EXISTS: &str = "FABRIC_E_SERVICE_ALREADY_EXISTS";

/// A cluster response with status >= 400.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub method: String,
    pub path: String,
    pub status: u16,
    /// Cluster error code from the `{"Error": {"Code": ..}}` envelope, if any.
    pub code: Option<String>,
    pub message: String,
}

/// Classification of an [`ApiError`] by status and cluster error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    NotFound,
    ApplicationTypeAlreadyExists,
    ApplicationTypeInUse,
    ApplicationUpgradeInProgress,
    ApplicationAlreadyExists,
    ServiceAlreadyExists,
    Conflict,
    ClientError,
    ServerError,
}

impl ApiError {
    /// Build an error from a response status and the raw response body.
    ///
    /// The message and code come from the cluster's JSON error envelope when it
    /// parses; otherwise the trimmed raw body is used as the message.
    pub fn from_response(method: &str, path: &str, status: u16, body: &str) -> Self {
        let mut err = Self {
            method: method.to_string(),
            path: path.to_string(),
            status,
            code: None,
            message: body.trim().to_string(),
        };

        if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) {
            if !envelope.error.code.is_empty() {
                err.code = Some(envelope.error.code);
            }
            if !envelope.error.message.is_empty() {
                err.message = envelope.error.message.trim().to_string();
            }
        }
        err
    }

    /// A locally synthesized not-found error (e.g. for `204 No Content` reads).
    pub fn not_found(method: &str, path: &str, message: impl Into<String>) -> Self {
        Self {
            method: method.to_string(),
            path: path.to_string(),
            status: StatusCode::NOT_FOUND.as_u16(),
            code: None,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ApiErrorKind {
        if self.status == StatusCode::NOT_FOUND.as_u16() {
            return ApiErrorKind::NotFound;
        }
        if self.status == StatusCode::CONFLICT.as_u16() {
            return match self.code.as_deref() {
                Some(CODE_APPLICATION_TYPE_ALREADY_EXISTS) => {
                    ApiErrorKind::ApplicationTypeAlreadyExists
                }
                Some(CODE_APPLICATION_TYPE_IN_USE) => ApiErrorKind::ApplicationTypeInUse,
                Some(CODE_APPLICATION_UPGRADE_IN_PROGRESS) => {
                    ApiErrorKind::ApplicationUpgradeInProgress
                }
                Some(CODE_APPLICATION_ALREADY_EXISTS) => ApiErrorKind::ApplicationAlreadyExists,
                Some(CODE_SERVICE_ALREADY_EXISTS) => ApiErrorKind::ServiceAlreadyExists,
                _ => ApiErrorKind::Conflict,
            };
        }
        if self.status >= 500 {
            ApiErrorKind::ServerError
        } else {
            ApiErrorKind::ClientError
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} failed with status {}: {}",
            self.method, self.path, self.status, self.message
        )
    }
}

#[derive(Debug, serde::Deserialize)]
struct ErrorEnvelope {
    #[serde(rename = "Error")]
    error: ErrorBody,
}

#[derive(Debug, serde::Deserialize)]
struct ErrorBody {
    #[serde(rename = "Code", default)]
    code: String,
    #[serde(rename = "Message", default)]
    message: String,
}

#[derive(Error, Debug)]
pub enum FabricError {
    #[error("{0}")]
    Api(ApiError),

    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    #[error("{0}")]
    Validation(String),

    #[error("decode {context}: {source}: {body}")]
    Decode {
        context: String,
        #[source]
        source: serde_json::Error,
        body: String,
    },

    #[error("operation failed: {0}")]
    OperationFailed(String),

    #[error("operation polling failed: {status} ({body})")]
    PollFailed { status: StatusCode, body: String },

    #[error("application upgrade failed: state={state} details={details}")]
    UpgradeFailed { state: String, details: String },

    #[error("application type {name}/{version} not found")]
    ApplicationTypeVersionNotFound { name: String, version: String },

    #[error("empty response retrieving application {0}")]
    EmptyResponse(String),

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl FabricError {
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            FabricError::Api(err) => Some(err),
            _ => None,
        }
    }

    pub fn api_kind(&self) -> Option<ApiErrorKind> {
        self.api_error().map(ApiError::kind)
    }

    /// True only for cluster (or synthesized) 404s. The local
    /// [`FabricError::ApplicationTypeVersionNotFound`] is not included.
    pub fn is_not_found(&self) -> bool {
        self.api_kind() == Some(ApiErrorKind::NotFound)
    }

    pub fn is_application_type_already_exists(&self) -> bool {
        self.api_kind() == Some(ApiErrorKind::ApplicationTypeAlreadyExists)
    }

    pub fn is_application_type_in_use(&self) -> bool {
        self.api_kind() == Some(ApiErrorKind::ApplicationTypeInUse)
    }

    pub fn is_application_upgrade_in_progress(&self) -> bool {
        self.api_kind() == Some(ApiErrorKind::ApplicationUpgradeInProgress)
    }

    pub fn is_application_already_exists(&self) -> bool {
        self.api_kind() == Some(ApiErrorKind::ApplicationAlreadyExists)
    }

    pub fn is_service_already_exists(&self) -> bool {
        self.api_kind() == Some(ApiErrorKind::ServiceAlreadyExists)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, FabricError::Cancelled)
    }

    pub(crate) fn decode(context: impl Into<String>, source: serde_json::Error, body: &[u8]) -> Self {
        FabricError::Decode {
            context: context.into(),
            source,
            body: String::from_utf8_lossy(body).into_owned(),
        }
    }
}

impl From<ApiError> for FabricError {
    fn from(err: ApiError) -> Self {
        FabricError::Api(err)
    }
}

pub type Result<T> = std::result::Result<T, FabricError>;
