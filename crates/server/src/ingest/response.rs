//! Result aggregation and response serialization.

use crate::error::{ApiError, ApiResult};
use axum::http::header::{ACCEPT, CONTENT_TYPE, WARNING};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use std::collections::BTreeSet;
use stow_core::media_type::{APPLICATION_DICOM_JSON, APPLICATION_DICOM_XML, APPLICATION_JSON};
use stow_core::{AttributeTree, MediaType, Tag, VR, Value, tags};
use stow_storage::StoredInstance;

/// Error Comment, a command group attribute.
const ERROR_COMMENT: Tag = Tag(0x0000, 0x0902);

/// Serialization of the response document.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Xml,
    Json,
}

impl OutputFormat {
    /// Pick the format from the `Accept` header.
    ///
    /// A missing header or a wildcard range selects XML; the first
    /// acceptable range in header order wins.
    pub fn negotiate(headers: &HeaderMap) -> ApiResult<Self> {
        let mut ranges = Vec::new();
        for value in headers.get_all(ACCEPT) {
            let value = value
                .to_str()
                .map_err(|_| ApiError::NotAcceptable("Accept header is not ASCII".to_string()))?;
            ranges.extend(
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
            );
        }
        if ranges.is_empty() {
            return Ok(Self::Xml);
        }

        for range in &ranges {
            let Ok(media_type) = MediaType::parse(range) else {
                continue;
            };
            if media_type.accepts(APPLICATION_DICOM_XML) {
                return Ok(Self::Xml);
            }
            if media_type.accepts(APPLICATION_DICOM_JSON) || media_type.is(APPLICATION_JSON) {
                return Ok(Self::Json);
            }
        }
        Err(ApiError::NotAcceptable(ranges.join(", ")))
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Xml => APPLICATION_DICOM_XML,
            Self::Json => APPLICATION_DICOM_JSON,
        }
    }

    fn serialize(self, document: &AttributeTree) -> stow_core::Result<Vec<u8>> {
        match self {
            Self::Xml => stow_core::xml::write_dataset(document),
            Self::Json => stow_core::json::write_dataset(document),
        }
    }
}

/// A successfully stored instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReferencedInstance {
    pub sop_class_uid: String,
    pub sop_instance_uid: String,
    pub retrieve_url: String,
}

/// A rejected instance, with as much identity as was known.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailedInstance {
    pub sop_class_uid: Option<String>,
    pub sop_instance_uid: Option<String>,
    pub failure_reason: u16,
}

/// Per-request outcome of every stored or rejected instance.
#[derive(Debug)]
pub struct ResultAggregator {
    base_url: String,
    studies: BTreeSet<String>,
    referenced: Vec<ReferencedInstance>,
    failed: Vec<FailedInstance>,
    error_comment: Option<String>,
}

impl ResultAggregator {
    /// `base_url` is the absolute URL the request was posted to.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            studies: BTreeSet::new(),
            referenced: Vec::new(),
            failed: Vec::new(),
            error_comment: None,
        }
    }

    pub fn referenced(&self) -> &[ReferencedInstance] {
        &self.referenced
    }

    pub fn failed(&self) -> &[FailedInstance] {
        &self.failed
    }

    /// Message of the last recorded failure.
    pub fn error_comment(&self) -> Option<&str> {
        self.error_comment.as_deref()
    }

    /// The request URL, extended by the study when posted to `/studies`.
    fn study_url(&self, study_instance_uid: &str) -> String {
        if self.base_url.ends_with("/studies") {
            format!("{}/{study_instance_uid}", self.base_url)
        } else {
            self.base_url.clone()
        }
    }

    pub fn record_success(&mut self, instance: &StoredInstance) {
        let retrieve_url = format!(
            "{}/series/{}/instances/{}",
            self.study_url(&instance.study_instance_uid),
            instance.series_instance_uid,
            instance.sop_instance_uid
        );
        self.studies.insert(instance.study_instance_uid.clone());
        self.referenced.push(ReferencedInstance {
            sop_class_uid: instance.sop_class_uid.clone(),
            sop_instance_uid: instance.sop_instance_uid.clone(),
            retrieve_url,
        });
    }

    pub fn record_failure(
        &mut self,
        sop_class_uid: Option<String>,
        sop_instance_uid: Option<String>,
        failure_reason: u16,
        message: impl Into<String>,
    ) {
        self.failed.push(FailedInstance {
            sop_class_uid,
            sop_instance_uid,
            failure_reason,
        });
        self.error_comment = Some(message.into());
    }

    /// Study-level retrieve URL, present only when every stored instance
    /// belongs to one study.
    pub fn retrieve_url(&self) -> Option<String> {
        match self.studies.len() {
            1 => self.studies.first().map(|study| self.study_url(study)),
            _ => None,
        }
    }

    pub fn status(&self) -> StatusCode {
        if self.referenced.is_empty() {
            StatusCode::CONFLICT
        } else if self.failed.is_empty() {
            StatusCode::OK
        } else {
            StatusCode::ACCEPTED
        }
    }

    /// Build the response data set.
    pub fn to_document(&self) -> AttributeTree {
        let mut document = AttributeTree::new();
        if let Some(comment) = &self.error_comment {
            document.set_string(ERROR_COMMENT, VR::LO, comment.clone());
        }
        if let Some(url) = self.retrieve_url() {
            document.set_string(tags::RETRIEVE_URL, VR::UR, url);
        }
        if !self.failed.is_empty() {
            let items = self
                .failed
                .iter()
                .map(|failed| {
                    let mut item = sop_reference(
                        failed.sop_class_uid.as_deref(),
                        failed.sop_instance_uid.as_deref(),
                    );
                    item.set_int(tags::FAILURE_REASON, VR::US, i64::from(failed.failure_reason));
                    item
                })
                .collect();
            document.insert(tags::FAILED_SOP_SEQUENCE, VR::SQ, Value::Sequence(items));
        }
        if !self.referenced.is_empty() {
            let items = self
                .referenced
                .iter()
                .map(|referenced| {
                    let mut item = sop_reference(
                        Some(&referenced.sop_class_uid),
                        Some(&referenced.sop_instance_uid),
                    );
                    item.set_string(tags::RETRIEVE_URL, VR::UR, referenced.retrieve_url.clone());
                    item
                })
                .collect();
            document.insert(tags::REFERENCED_SOP_SEQUENCE, VR::SQ, Value::Sequence(items));
        }
        document
    }

    /// Serialize the outcome in the negotiated format.
    pub fn into_response(self, format: OutputFormat) -> ApiResult<Response> {
        let body = format.serialize(&self.to_document())?;
        let mut response = (
            self.status(),
            [(CONTENT_TYPE, HeaderValue::from_static(format.content_type()))],
            body,
        )
            .into_response();

        if let Some(comment) = &self.error_comment {
            match HeaderValue::from_str(comment) {
                Ok(value) => {
                    response.headers_mut().insert(WARNING, value);
                }
                Err(_) => tracing::debug!(comment, "Error comment not usable as Warning header"),
            }
        }
        Ok(response)
    }
}

fn sop_reference(sop_class_uid: Option<&str>, sop_instance_uid: Option<&str>) -> AttributeTree {
    let mut item = AttributeTree::new();
    if let Some(uid) = sop_class_uid {
        item.set_string(tags::REFERENCED_SOP_CLASS_UID, VR::UI, uid);
    }
    if let Some(uid) = sop_instance_uid {
        item.set_string(tags::REFERENCED_SOP_INSTANCE_UID, VR::UI, uid);
    }
    item
}
