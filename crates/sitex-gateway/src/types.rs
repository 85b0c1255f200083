//! Request/response/error types shared by the site extension handlers.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use sitex_runtime::SiteExtensionError;

/// Error payload mapped to the gateway's HTTP error envelope.
#[derive(Debug)]
pub(crate) struct SiteExtensionApiError {
    pub(crate) status: StatusCode,
    pub(crate) code: &'static str,
    pub(crate) message: String,
}

impl SiteExtensionApiError {
    pub(crate) fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub(crate) fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }

    pub(crate) fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, code, message)
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
    }
}

impl IntoResponse for SiteExtensionApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({
                "error": {
                    "code": self.code,
                    "message": self.message,
                }
            })),
        )
            .into_response()
    }
}

/// Maps dispatcher/manager failures onto the API error envelope, keeping the
/// collaborator's classification intact.
pub(crate) fn map_service_error(error: anyhow::Error) -> SiteExtensionApiError {
    match error.downcast_ref::<SiteExtensionError>() {
        Some(SiteExtensionError::NotFound { id }) => SiteExtensionApiError::not_found(
            "extension_not_found",
            format!("site extension '{id}' was not found"),
        ),
        Some(SiteExtensionError::InvalidRequest(message)) => {
            SiteExtensionApiError::bad_request("invalid_extension_request", message.clone())
        }
        _ => SiteExtensionApiError::internal(error.to_string()),
    }
}

/// PUT body for an install request; both fields are optional.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InstallExtensionRequest {
    #[serde(default)]
    pub(crate) version: Option<String>,
    #[serde(default)]
    pub(crate) feed_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FeedListQuery {
    #[serde(default)]
    pub(crate) filter: Option<String>,
    #[serde(default)]
    pub(crate) allow_prerelease: bool,
    #[serde(default)]
    pub(crate) feed_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FeedDetailQuery {
    #[serde(default)]
    pub(crate) version: Option<String>,
    #[serde(default)]
    pub(crate) feed_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LocalListQuery {
    #[serde(default)]
    pub(crate) filter: Option<String>,
    #[serde(default = "default_check_latest")]
    pub(crate) check_latest: bool,
}

impl Default for LocalListQuery {
    fn default() -> Self {
        Self {
            filter: None,
            check_latest: default_check_latest(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LocalDetailQuery {
    #[serde(default = "default_check_latest")]
    pub(crate) check_latest: bool,
}

impl Default for LocalDetailQuery {
    fn default() -> Self {
        Self {
            check_latest: default_check_latest(),
        }
    }
}

fn default_check_latest() -> bool {
    true
}
