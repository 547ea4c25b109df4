use axum::Json;
use axum::http::StatusCode;
use serde::Serialize;

pub type ApiErrorTuple = (StatusCode, Json<ApiErrorResponse>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorCode {
    Unauthorized,
    QuotaExceeded,
    StoreUnavailable,
    DirectoryUnavailable,
    SchedulingFailed,
    ElevationIncomplete,
}

impl ApiErrorCode {
    pub const ALL: [Self; 6] = [
        Self::Unauthorized,
        Self::QuotaExceeded,
        Self::StoreUnavailable,
        Self::DirectoryUnavailable,
        Self::SchedulingFailed,
        Self::ElevationIncomplete,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::QuotaExceeded => "quota_exceeded",
            Self::StoreUnavailable => "store_unavailable",
            Self::DirectoryUnavailable => "directory_unavailable",
            Self::SchedulingFailed => "scheduling_failed",
            Self::ElevationIncomplete => "elevation_incomplete",
        }
    }

    pub const fn default_status(self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::QuotaExceeded => StatusCode::TOO_MANY_REQUESTS,
            Self::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::DirectoryUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::SchedulingFailed => StatusCode::SERVICE_UNAVAILABLE,
            // The directory mutation has already landed when this code is returned.
            Self::ElevationIncomplete => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiErrorDetail {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    pub message: String,
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ApiDataEnvelope<T> {
    pub data: T,
}

pub fn ok_data<T: Serialize>(data: T) -> (StatusCode, Json<ApiDataEnvelope<T>>) {
    (StatusCode::OK, Json(ApiDataEnvelope { data }))
}

pub fn error_response(code: ApiErrorCode, message: impl Into<String>) -> ApiErrorTuple {
    error_response_with_status(code.default_status(), code, message)
}

pub fn error_response_with_status(
    status: StatusCode,
    code: ApiErrorCode,
    message: impl Into<String>,
) -> ApiErrorTuple {
    let message = message.into();
    (
        status,
        Json(ApiErrorResponse {
            message: message.clone(),
            error: ApiErrorDetail {
                code: code.as_str(),
                message,
            },
        }),
    )
}

pub fn unauthorized_error(message: &str) -> ApiErrorTuple {
    error_response_with_status(
        StatusCode::UNAUTHORIZED,
        ApiErrorCode::Unauthorized,
        message.to_string(),
    )
}
