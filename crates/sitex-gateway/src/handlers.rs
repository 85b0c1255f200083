//! Endpoint handlers for the site extension API.

use std::sync::Arc;

use axum::extract::{Path as AxumPath, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use sitex_runtime::{InstallOutcome, ReadDecision, RequestMode, UninstallOutcome};

use crate::types::{
    map_service_error, FeedDetailQuery, FeedListQuery, InstallExtensionRequest, LocalDetailQuery,
    LocalListQuery, SiteExtensionApiError,
};
use crate::{
    request_mode, SiteExtensionServerState, SITE_OPERATION_HEADER, SITE_OPERATION_RESTART,
};

fn status_from_decision(status: u16) -> StatusCode {
    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

pub(super) async fn handle_feed_list(
    State(state): State<Arc<SiteExtensionServerState>>,
    Query(query): Query<FeedListQuery>,
) -> Response {
    match state
        .service()
        .list_remote(
            query.filter.as_deref(),
            query.allow_prerelease,
            query.feed_url.as_deref(),
        )
        .await
    {
        Ok(descriptors) => (StatusCode::OK, Json(descriptors)).into_response(),
        Err(error) => map_service_error(error).into_response(),
    }
}

pub(super) async fn handle_feed_detail(
    State(state): State<Arc<SiteExtensionServerState>>,
    AxumPath(id): AxumPath<String>,
    Query(query): Query<FeedDetailQuery>,
) -> Response {
    match state
        .service()
        .get_remote(&id, query.version.as_deref(), query.feed_url.as_deref())
        .await
    {
        Ok(Some(descriptor)) => (StatusCode::OK, Json(descriptor)).into_response(),
        Ok(None) => SiteExtensionApiError::not_found(
            "extension_not_found",
            format!("site extension '{id}' was not found in the feed"),
        )
        .into_response(),
        Err(error) => map_service_error(error).into_response(),
    }
}

pub(super) async fn handle_local_list(
    State(state): State<Arc<SiteExtensionServerState>>,
    Query(query): Query<LocalListQuery>,
) -> Response {
    match state
        .service()
        .list_local(query.filter.as_deref(), query.check_latest)
        .await
    {
        Ok(descriptors) => (StatusCode::OK, Json(descriptors)).into_response(),
        Err(error) => map_service_error(error).into_response(),
    }
}

pub(super) async fn handle_local_detail(
    State(state): State<Arc<SiteExtensionServerState>>,
    headers: HeaderMap,
    AxumPath(id): AxumPath<String>,
    Query(query): Query<LocalDetailQuery>,
) -> Response {
    let mode = request_mode(&headers);
    let decision = match state.service().get_local(&id, query.check_latest, mode).await {
        Ok(decision) => decision,
        Err(error) => return map_service_error(error).into_response(),
    };

    if mode == RequestMode::Sync && decision.status != 200 {
        return SiteExtensionApiError::not_found(
            "extension_not_found",
            format!("site extension '{id}' is not installed"),
        )
        .into_response();
    }

    decision_response(decision)
}

fn decision_response(decision: ReadDecision) -> Response {
    let status = status_from_decision(decision.status);
    let restart_required = decision.restart_required;
    let mut response = (status, Json(decision.descriptor)).into_response();
    if restart_required {
        response.headers_mut().insert(
            SITE_OPERATION_HEADER,
            HeaderValue::from_static(SITE_OPERATION_RESTART),
        );
    }
    response
}

pub(super) async fn handle_local_install(
    State(state): State<Arc<SiteExtensionServerState>>,
    headers: HeaderMap,
    AxumPath(id): AxumPath<String>,
    body: Option<Json<InstallExtensionRequest>>,
) -> Response {
    let mode = request_mode(&headers);
    let request = body.map(|Json(request)| request).unwrap_or_default();

    match state
        .service()
        .install(&id, request.version, request.feed_url, mode)
        .await
    {
        Ok(InstallOutcome::Accepted(descriptor)) => {
            (StatusCode::CREATED, Json(descriptor)).into_response()
        }
        Ok(InstallOutcome::Completed(descriptor)) => {
            (StatusCode::OK, Json(descriptor)).into_response()
        }
        Ok(InstallOutcome::Failed { status, descriptor }) => SiteExtensionApiError::new(
            status_from_decision(status),
            "install_failed",
            descriptor
                .comment
                .unwrap_or_else(|| format!("site extension '{id}' install failed")),
        )
        .into_response(),
        Err(error) => map_service_error(error).into_response(),
    }
}

pub(super) async fn handle_local_uninstall(
    State(state): State<Arc<SiteExtensionServerState>>,
    headers: HeaderMap,
    AxumPath(id): AxumPath<String>,
) -> Response {
    let mode = request_mode(&headers);

    match state.service().uninstall(&id, mode).await {
        Ok(UninstallOutcome::Accepted(descriptor)) => {
            (StatusCode::ACCEPTED, Json(descriptor)).into_response()
        }
        Ok(UninstallOutcome::Completed(succeeded)) => {
            (StatusCode::OK, Json(succeeded)).into_response()
        }
        Ok(UninstallOutcome::Failed { status, descriptor }) => SiteExtensionApiError::new(
            status_from_decision(status),
            "uninstall_failed",
            descriptor
                .comment
                .unwrap_or_else(|| format!("site extension '{id}' uninstall failed")),
        )
        .into_response(),
        Err(error) => map_service_error(error).into_response(),
    }
}
