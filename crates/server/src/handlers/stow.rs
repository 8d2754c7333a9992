//! STOW-RS store endpoints.

use crate::error::{ApiError, ApiResult};
use crate::ingest::{InputMode, IngestSession, OutputFormat};
use crate::metrics::{STOW_REQUEST_DURATION, STOW_REQUESTS};
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header::{CONTENT_TYPE, HOST};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::Response;
use multer::{Constraints, Multipart, SizeLimit};
use std::time::Instant;
use stow_core::MediaType;
use stow_core::media_type::MULTIPART_RELATED;
use stow_storage::StoreContext;

/// POST /aets/{aet}/rs/studies - Store instances of any study.
#[tracing::instrument(skip(state, uri, headers, body), fields(aet = %aet))]
pub async fn store_instances(
    State(state): State<AppState>,
    Path(aet): Path<String>,
    uri: Uri,
    headers: HeaderMap,
    body: Body,
) -> ApiResult<Response> {
    stow(state, aet, uri, headers, body).await
}

/// POST /aets/{aet}/rs/studies/{study} - Store instances, reporting
/// retrieve URLs below the given study.
#[tracing::instrument(skip(state, uri, headers, body), fields(aet = %aet, study = %study))]
pub async fn store_study_instances(
    State(state): State<AppState>,
    Path((aet, study)): Path<(String, String)>,
    uri: Uri,
    headers: HeaderMap,
    body: Body,
) -> ApiResult<Response> {
    stow(state, aet, uri, headers, body).await
}

async fn stow(
    state: AppState,
    aet: String,
    uri: Uri,
    headers: HeaderMap,
    body: Body,
) -> ApiResult<Response> {
    let start_time = Instant::now();
    let mut mode_label = "unknown";

    let result: ApiResult<Response> = async {
        if state.registry.resolve(&aet).is_none() {
            return Err(ApiError::NotFound(format!("no such application entity: {aet}")));
        }
        let (mode, boundary) = parse_content_type(&headers)?;
        mode_label = mode.name();
        let format = OutputFormat::negotiate(&headers)?;

        let constraints = Constraints::new().size_limit(
            SizeLimit::new().whole_stream(state.config.server.max_request_size as u64),
        );
        let multipart =
            Multipart::with_constraints(body.into_data_stream(), boundary, constraints);

        let base_url = request_url(&state, &headers, &uri);
        tracing::debug!(mode = mode.name(), base_url = %base_url, "Receiving STOW request");
        let session = IngestSession::new(
            StoreContext::new(aet.as_str()),
            mode,
            state.store.clone(),
            state.config.stow.spool_directory.clone(),
            base_url,
        );
        session.run(multipart, format).await
    }
    .await;

    let outcome = match &result {
        Ok(response) => match response.status() {
            StatusCode::OK => "stored",
            StatusCode::ACCEPTED => "partial",
            _ => "rejected",
        },
        Err(e) if e.status_code().is_server_error() => "error",
        Err(_) => "invalid",
    };
    STOW_REQUESTS.with_label_values(&[mode_label, outcome]).inc();
    STOW_REQUEST_DURATION.observe(start_time.elapsed().as_secs_f64());
    result
}

/// Input mode and boundary from a `multipart/related` content type.
fn parse_content_type(headers: &HeaderMap) -> ApiResult<(InputMode, String)> {
    let value = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::UnsupportedMediaType("missing Content-Type".to_string()))?;
    let media_type = MediaType::parse(value).map_err(|_| {
        // A multipart/related type with broken parameters is a malformed
        // request rather than an unsupported one.
        let essence = value.split(';').next().unwrap_or_default().trim();
        if essence.eq_ignore_ascii_case(MULTIPART_RELATED) {
            ApiError::BadRequest(format!("Invalid Content-Type parameters: {value}"))
        } else {
            ApiError::UnsupportedMediaType(value.to_string())
        }
    })?;
    if !media_type.is(MULTIPART_RELATED) {
        return Err(ApiError::UnsupportedMediaType(value.to_string()));
    }
    let mode = media_type
        .param("type")
        .and_then(InputMode::from_type_param)
        .ok_or_else(|| ApiError::UnsupportedMediaType(value.to_string()))?;
    let boundary = media_type
        .param("boundary")
        .filter(|b| !b.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing Boundary Parameter".to_string()))?;
    if !is_valid_boundary(boundary) {
        return Err(ApiError::BadRequest(format!(
            "Invalid Boundary Parameter: {boundary}"
        )));
    }
    Ok((mode, boundary.to_string()))
}

/// RFC 2046 boundary: 1 to 70 `bchars`, not ending in a space.
fn is_valid_boundary(boundary: &str) -> bool {
    (1..=70).contains(&boundary.len())
        && !boundary.ends_with(' ')
        && boundary.bytes().all(|b| {
            b.is_ascii_alphanumeric()
                || matches!(
                    b,
                    b'\'' | b'(' | b')' | b'+' | b'_' | b',' | b'-' | b'.' | b'/' | b':' | b'='
                        | b'?' | b' '
                )
        })
}

/// Absolute URL of the request, used as the base of retrieve URLs.
fn request_url(state: &AppState, headers: &HeaderMap, uri: &Uri) -> String {
    let path = uri.path();
    if let Some(base) = &state.config.server.public_base_url {
        return format!("{}{path}", base.trim_end_matches('/'));
    }
    match headers.get(HOST).and_then(|v| v.to_str().ok()) {
        Some(host) => format!("http://{host}{path}"),
        None => format!("http://{}{path}", state.config.server.bind),
    }
}
