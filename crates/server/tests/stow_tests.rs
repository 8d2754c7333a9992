//! Integration tests for the STOW-RS endpoints.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{
    MultipartBody, Part10, TestServer, document_metadata, image_metadata, jpeg_header, json_items,
    json_string, mp4_avc, related_content_type,
};
use serde_json::{Value as Json, json};
use stow_core::uid::{sop_class, transfer_syntax};
use stow_core::{AttributeTree, Value, status, tags};

const STUDIES: &str = "/aets/DCM4CHEE/rs/studies";
const BASE_URL: &str = "http://localhost:8080/aets/DCM4CHEE/rs/studies";

fn dicom_type() -> String {
    related_content_type("application/dicom")
}

fn json_type() -> String {
    related_content_type("application/dicom+json")
}

fn parse_json(body: &[u8]) -> Json {
    serde_json::from_slice(body).unwrap()
}

fn sequence<'a>(tree: &'a AttributeTree, tag: stow_core::Tag) -> &'a [AttributeTree] {
    match tree.get(tag).map(|a| &a.value) {
        Some(Value::Sequence(items)) => items,
        _ => &[],
    }
}

#[tokio::test]
async fn test_binary_instance_is_stored() {
    let server = TestServer::new().await;
    let body = MultipartBody::new()
        .dicom(Part10::new("1.2.3.4.1").encode())
        .build();

    let response = server.post(STUDIES, &dicom_type(), None, body).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.headers["content-type"], "application/dicom+xml");
    assert!(response.headers.get("warning").is_none());

    let document = stow_core::xml::read_dataset(&response.body).unwrap();
    assert_eq!(
        document.get_string(tags::RETRIEVE_URL),
        Some(format!("{BASE_URL}/1.2.3").as_str())
    );
    let referenced = sequence(&document, tags::REFERENCED_SOP_SEQUENCE);
    assert_eq!(referenced.len(), 1);
    assert_eq!(
        referenced[0].get_string(tags::REFERENCED_SOP_CLASS_UID),
        Some(sop_class::VL_PHOTOGRAPHIC_IMAGE_STORAGE)
    );
    assert_eq!(
        referenced[0].get_string(tags::RETRIEVE_URL),
        Some(format!("{BASE_URL}/1.2.3/series/1.2.3.4/instances/1.2.3.4.1").as_str())
    );
    assert!(sequence(&document, tags::FAILED_SOP_SEQUENCE).is_empty());

    let stored = server
        .archive_dir()
        .join("DCM4CHEE/1.2.3/1.2.3.4/1.2.3.4.1/instance.dcm");
    assert!(stored.is_file());
}

#[tokio::test]
async fn test_duplicate_in_same_request_is_partial() {
    let server = TestServer::new().await;
    let instance = Part10::new("1.2.3.4.1").encode();
    let body = MultipartBody::new()
        .dicom(&instance)
        .dicom(&instance)
        .build();

    let response = server
        .post(STUDIES, &dicom_type(), Some("application/dicom+json"), body)
        .await;

    assert_eq!(response.status, StatusCode::ACCEPTED);
    assert_eq!(
        response.headers["warning"],
        "Instance 1.2.3.4.1 already exists"
    );
    let document = parse_json(&response.body);
    let failed = json_items(&document, "00081198");
    assert_eq!(failed.len(), 1);
    assert_eq!(json_string(failed[0], "00081155"), Some("1.2.3.4.1"));
    assert_eq!(
        failed[0]["00081197"]["Value"][0],
        json!(status::DUPLICATE_SOP_INSTANCE)
    );
    assert_eq!(json_items(&document, "00081199").len(), 1);
}

#[tokio::test]
async fn test_unparseable_binary_instance_is_rejected() {
    let server = TestServer::new().await;
    let body = MultipartBody::new()
        .dicom(b"this is not a DICOM file")
        .build();

    let response = server
        .post(STUDIES, &dicom_type(), Some("application/dicom+json"), body)
        .await;

    assert_eq!(response.status, StatusCode::CONFLICT);
    let document = parse_json(&response.body);
    let failed = json_items(&document, "00081198");
    assert_eq!(failed.len(), 1);
    assert_eq!(
        failed[0]["00081197"]["Value"][0],
        json!(status::CANNOT_UNDERSTAND)
    );
    assert!(document.get("00081190").is_none());
}

#[tokio::test]
async fn test_instances_of_several_studies_have_no_overall_url() {
    let server = TestServer::new().await;
    let body = MultipartBody::new()
        .dicom(Part10::new("1.2.3.4.1").encode())
        .dicom(Part10::new("1.2.5.4.1").in_study("1.2.5").encode())
        .build();

    let response = server
        .post(STUDIES, &dicom_type(), Some("application/dicom+json"), body)
        .await;

    assert_eq!(response.status, StatusCode::OK);
    let document = parse_json(&response.body);
    assert!(document.get("00081190").is_none());
    let referenced = json_items(&document, "00081199");
    assert_eq!(
        json_string(referenced[1], "00081190"),
        Some(format!("{BASE_URL}/1.2.5/series/1.2.3.4/instances/1.2.5.4.1").as_str())
    );
}

#[tokio::test]
async fn test_unexpected_part_in_binary_request() {
    let server = TestServer::new().await;
    let body = MultipartBody::new()
        .bulk("image/jpeg", "http://host/frame", jpeg_header(16, 16, 1))
        .build();

    let response = server.post(STUDIES, &dicom_type(), None, body).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    let error = parse_json(&response.body);
    assert_eq!(error["code"], "bad_request");
}

#[tokio::test]
async fn test_metadata_with_missing_bulk_data_is_partial() {
    let server = TestServer::new().await;
    let body = MultipartBody::new()
        .json(&document_metadata("1.2.3.9.1", "http://host/report.pdf"))
        .json(&document_metadata("1.2.3.9.2", "http://host/missing.pdf"))
        .bulk("application/pdf", "http://host/report.pdf", b"%PDF-1.4 report")
        .build();

    let response = server
        .post(STUDIES, &json_type(), Some("application/dicom+json"), body)
        .await;

    assert_eq!(response.status, StatusCode::ACCEPTED);
    assert_eq!(response.headers["content-type"], "application/dicom+json");
    assert_eq!(
        response.headers["warning"],
        "Missing Bulkdata: http://host/missing.pdf"
    );

    let document = parse_json(&response.body);
    assert_eq!(
        json_string(&document, "00000902"),
        Some("Missing Bulkdata: http://host/missing.pdf")
    );
    assert_eq!(
        json_string(&document, "00081190"),
        Some(format!("{BASE_URL}/1.2.3").as_str())
    );

    let referenced = json_items(&document, "00081199");
    assert_eq!(referenced.len(), 1);
    assert_eq!(
        json_string(referenced[0], "00081150"),
        Some(sop_class::ENCAPSULATED_PDF_STORAGE)
    );
    assert_eq!(json_string(referenced[0], "00081155"), Some("1.2.3.9.1"));

    let failed = json_items(&document, "00081198");
    assert_eq!(failed.len(), 1);
    assert_eq!(json_string(failed[0], "00081155"), Some("1.2.3.9.2"));
    assert_eq!(failed[0]["00081197"]["Value"][0], json!(status::MISSING_BULKDATA));

    assert_eq!(server.spool_entries(), 0);
}

#[tokio::test]
async fn test_stored_metadata_is_completed() {
    let server = TestServer::new().await;
    let body = MultipartBody::new()
        .json(&document_metadata("1.2.3.9.1", "http://host/report.pdf"))
        .bulk("application/pdf", "http://host/report.pdf", b"%PDF-1.4 report")
        .build();

    let response = server
        .post(STUDIES, &json_type(), Some("application/dicom+json"), body)
        .await;
    assert_eq!(response.status, StatusCode::OK);

    let document = parse_json(&response.body);
    let url = json_string(json_items(&document, "00081199")[0], "00081190")
        .unwrap()
        .to_string();
    let series = url
        .split("/series/")
        .nth(1)
        .and_then(|rest| rest.split('/').next())
        .unwrap();

    let instance_dir = server
        .archive_dir()
        .join("DCM4CHEE/1.2.3")
        .join(series)
        .join("1.2.3.9.1");
    let metadata = std::fs::read(instance_dir.join("metadata.json")).unwrap();
    let stored = stow_core::json::read_datasets(&metadata).unwrap().remove(0);
    assert_eq!(
        stored.get_string(tags::SOP_CLASS_UID),
        Some(sop_class::ENCAPSULATED_PDF_STORAGE)
    );
    assert_eq!(stored.get_int(tags::SERIES_NUMBER), Some(999));
    assert_eq!(stored.get_int(tags::INSTANCE_NUMBER), Some(1));
    assert!(stored.contains_value(tags::INSTANCE_CREATION_DATE));
    assert_eq!(
        std::fs::read(instance_dir.join("bulkdata/1")).unwrap(),
        b"%PDF-1.4 report"
    );
}

#[tokio::test]
async fn test_batch_numbering_and_generated_uids() {
    let server = TestServer::new().await;
    let report = json!({
        "0020000D": {"vr": "UI", "Value": ["1.2.3"]},
        "00420011": {"vr": "OB", "BulkDataURI": "http://host/report.pdf"}
    });
    let mut numbered = report.clone();
    numbered["00200013"] = json!({"vr": "IS", "Value": [42]});
    let body = MultipartBody::new()
        .json(&json!([report.clone(), numbered]))
        .json(&report)
        .bulk("application/pdf", "http://host/report.pdf", b"%PDF-1.4 report")
        .build();

    let response = server
        .post(STUDIES, &json_type(), Some("application/dicom+json"), body)
        .await;
    assert_eq!(response.status, StatusCode::OK);

    let document = parse_json(&response.body);
    let referenced = json_items(&document, "00081199");
    assert_eq!(referenced.len(), 3);

    let mut series_uids = Vec::new();
    let mut instance_uids = Vec::new();
    let mut instance_numbers = Vec::new();
    for item in referenced {
        let sop_instance_uid = json_string(item, "00081155").unwrap();
        let url = json_string(item, "00081190").unwrap();
        let series = url
            .split("/series/")
            .nth(1)
            .and_then(|rest| rest.split('/').next())
            .unwrap();
        stow_core::uid::validate_uid(sop_instance_uid).unwrap();
        stow_core::uid::validate_uid(series).unwrap();

        let metadata = std::fs::read(
            server
                .archive_dir()
                .join("DCM4CHEE/1.2.3")
                .join(series)
                .join(sop_instance_uid)
                .join("metadata.json"),
        )
        .unwrap();
        let stored = stow_core::json::read_datasets(&metadata).unwrap().remove(0);
        instance_numbers.push(stored.get_int(tags::INSTANCE_NUMBER).unwrap());
        series_uids.push(series.to_string());
        instance_uids.push(sop_instance_uid.to_string());
    }

    assert_eq!(instance_numbers, vec![1, 42, 3]);
    series_uids.sort();
    series_uids.dedup();
    assert_eq!(series_uids.len(), 3);
    instance_uids.sort();
    instance_uids.dedup();
    assert_eq!(instance_uids.len(), 3);
}

#[tokio::test]
async fn test_corrupt_jpeg_fails_pixel_module() {
    let server = TestServer::new().await;
    let body = MultipartBody::new()
        .json(&image_metadata("1.2.3.9.1", "http://host/frame"))
        .bulk("image/jpeg", "http://host/frame", b"not really a jpeg")
        .build();

    let response = server
        .post(STUDIES, &json_type(), Some("application/dicom+json"), body)
        .await;

    assert_eq!(response.status, StatusCode::CONFLICT);
    assert_eq!(
        response.headers["warning"],
        "Missing SamplesPerPixel (0028,0002)"
    );
    let document = parse_json(&response.body);
    let failed = json_items(&document, "00081198");
    assert_eq!(failed.len(), 1);
    assert_eq!(
        json_string(failed[0], "00081150"),
        Some(sop_class::VL_PHOTOGRAPHIC_IMAGE_STORAGE)
    );
    assert_eq!(
        failed[0]["00081197"]["Value"][0],
        json!(status::IDENTIFIER_DOES_NOT_MATCH_SOP_CLASS)
    );
    assert_eq!(server.spool_entries(), 0);
}

#[tokio::test]
async fn test_jpeg_header_completes_image() {
    let server = TestServer::new().await;
    let body = MultipartBody::new()
        .json(&image_metadata("1.2.3.9.1", "http://host/frame"))
        .bulk("image/jpeg", "http://host/frame", jpeg_header(480, 640, 3))
        .build();

    let response = server
        .post(STUDIES, &json_type(), Some("application/dicom+json"), body)
        .await;

    assert_eq!(response.status, StatusCode::OK);
    let document = parse_json(&response.body);
    assert_eq!(json_items(&document, "00081199").len(), 1);
    assert!(document.get("00081198").is_none());
}

#[tokio::test]
async fn test_mp4_video_is_completed_from_headers() {
    let server = TestServer::new().await;
    let body = MultipartBody::new()
        .json(&image_metadata("1.2.3.9.1", "http://host/video"))
        .bulk("video/mp4", "http://host/video", mp4_avc(100, 40, 1920, 1080, 250))
        .build();

    let response = server
        .post(STUDIES, &json_type(), Some("application/dicom+json"), body)
        .await;

    assert_eq!(response.status, StatusCode::OK);
    let document = parse_json(&response.body);
    let referenced = json_items(&document, "00081199");
    assert_eq!(
        json_string(referenced[0], "00081150"),
        Some(sop_class::VIDEO_PHOTOGRAPHIC_IMAGE_STORAGE)
    );

    let url = json_string(referenced[0], "00081190").unwrap();
    let series = url
        .split("/series/")
        .nth(1)
        .and_then(|rest| rest.split('/').next())
        .unwrap();
    let metadata = std::fs::read(
        server
            .archive_dir()
            .join("DCM4CHEE/1.2.3")
            .join(series)
            .join("1.2.3.9.1/metadata.json"),
    )
    .unwrap();
    let stored = stow_core::json::read_datasets(&metadata).unwrap().remove(0);
    assert_eq!(
        stored.get_string(stow_core::Tag(0x0008, 0x3002)),
        Some(transfer_syntax::MPEG4_HIGH_PROFILE)
    );
    assert_eq!(stored.get_int(tags::NUMBER_OF_FRAMES), Some(250));
    assert_eq!(stored.get_int(tags::COLUMNS), Some(1920));
}

#[tokio::test]
async fn test_xml_metadata_request() {
    let server = TestServer::new().await;
    let metadata = r#"<?xml version="1.0" encoding="UTF-8"?>
<NativeDicomModel>
  <DicomAttribute tag="00080018" vr="UI"><Value number="1">1.2.3.9.7</Value></DicomAttribute>
  <DicomAttribute tag="0020000D" vr="UI"><Value number="1">1.2.3</Value></DicomAttribute>
  <DicomAttribute tag="00420011" vr="OB"><BulkData uri="http://host/report.pdf"/></DicomAttribute>
</NativeDicomModel>
"#;
    let body = MultipartBody::new()
        .part(Some("application/dicom+xml"), None, metadata)
        .bulk("application/pdf", "http://host/report.pdf", b"%PDF-1.4")
        .build();

    let response = server
        .post(
            STUDIES,
            &related_content_type("application/dicom+xml"),
            None,
            body,
        )
        .await;

    assert_eq!(response.status, StatusCode::OK);
    let document = stow_core::xml::read_dataset(&response.body).unwrap();
    let referenced = sequence(&document, tags::REFERENCED_SOP_SEQUENCE);
    assert_eq!(
        referenced[0].get_string(tags::REFERENCED_SOP_INSTANCE_UID),
        Some("1.2.3.9.7")
    );
}

#[tokio::test]
async fn test_bulk_part_without_location_is_ignored() {
    let server = TestServer::new().await;
    let body = MultipartBody::new()
        .json(&document_metadata("1.2.3.9.1", "http://host/report.pdf"))
        .part(Some("application/pdf"), None, b"%PDF-1.4")
        .build();

    let response = server
        .post(STUDIES, &json_type(), Some("application/dicom+json"), body)
        .await;

    assert_eq!(response.status, StatusCode::CONFLICT);
    let document = parse_json(&response.body);
    let failed = json_items(&document, "00081198");
    assert_eq!(failed[0]["00081197"]["Value"][0], json!(status::MISSING_BULKDATA));
}

#[tokio::test]
async fn test_malformed_metadata_aborts_request() {
    let server = TestServer::new().await;
    let body = MultipartBody::new()
        .bulk("application/pdf", "http://host/report.pdf", b"%PDF-1.4")
        .part(Some("application/dicom+json"), None, b"{\"00080018\": ")
        .build();

    let response = server.post(STUDIES, &json_type(), None, body).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    let error = parse_json(&response.body);
    assert_eq!(error["code"], "malformed_metadata");
    assert_eq!(server.spool_entries(), 0);
}

#[tokio::test]
async fn test_empty_request_is_conflict() {
    let server = TestServer::new().await;
    let body = MultipartBody::new().build();

    let response = server
        .post(STUDIES, &json_type(), Some("application/dicom+json"), body)
        .await;

    assert_eq!(response.status, StatusCode::CONFLICT);
    assert_eq!(parse_json(&response.body), json!({}));
}

#[tokio::test]
async fn test_missing_boundary() {
    let server = TestServer::new().await;
    let body = MultipartBody::new()
        .dicom(Part10::new("1.2.3.4.1").encode())
        .build();

    let response = server
        .post(
            STUDIES,
            "multipart/related; type=\"application/dicom\"",
            None,
            body,
        )
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    let error = parse_json(&response.body);
    assert_eq!(error["code"], "bad_request");
    assert!(error["message"].as_str().unwrap().contains("Missing Boundary Parameter"));
    assert!(error.get("00081199").is_none());
    assert_eq!(server.spool_entries(), 0);
}

#[tokio::test]
async fn test_unparseable_or_mismatched_boundary() {
    let server = TestServer::new().await;

    for content_type in [
        r#"multipart/related; type="application/dicom"; boundary="stow-test-boundary"#,
        r#"multipart/related; type="application/dicom"; boundary=wrong-boundary"#,
    ] {
        let body = MultipartBody::new()
            .dicom(Part10::new("1.2.3.4.1").encode())
            .build();

        let response = server.post(STUDIES, content_type, None, body).await;

        assert_eq!(response.status, StatusCode::BAD_REQUEST, "{content_type}");
        let error = parse_json(&response.body);
        assert!(error.get("00081199").is_none());
        assert!(error.get("00081198").is_none());
    }
    assert_eq!(server.spool_entries(), 0);
    assert!(!server.archive_dir().join("DCM4CHEE/1.2.3").exists());
}

#[tokio::test]
async fn test_unknown_or_uninstalled_entity() {
    let server = TestServer::new().await;
    for aet in ["NOSUCHAE", "OFFLINE"] {
        let body = MultipartBody::new()
            .dicom(Part10::new("1.2.3.4.1").encode())
            .build();
        let response = server
            .post(&format!("/aets/{aet}/rs/studies"), &dicom_type(), None, body)
            .await;
        assert_eq!(response.status, StatusCode::NOT_FOUND, "{aet}");
    }
}

#[tokio::test]
async fn test_unsupported_media_type() {
    let server = TestServer::new().await;
    let response = server
        .post(
            STUDIES,
            "application/dicom",
            None,
            Part10::new("1.2.3.4.1").encode(),
        )
        .await;
    assert_eq!(response.status, StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let response = server
        .post(
            STUDIES,
            &related_content_type("image/jpeg"),
            None,
            MultipartBody::new().build(),
        )
        .await;
    assert_eq!(response.status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn test_not_acceptable() {
    let server = TestServer::new().await;
    let body = MultipartBody::new()
        .dicom(Part10::new("1.2.3.4.1").encode())
        .build();

    let response = server
        .post(STUDIES, &dicom_type(), Some("text/html"), body)
        .await;

    assert_eq!(response.status, StatusCode::NOT_ACCEPTABLE);
    assert!(!server.archive_dir().join("DCM4CHEE").exists());
}

#[tokio::test]
async fn test_study_route_pins_retrieve_urls() {
    let server = TestServer::new().await;
    let body = MultipartBody::new()
        .dicom(Part10::new("1.2.3.4.1").encode())
        .build();

    let response = server
        .post(
            "/aets/DCM4CHEE/rs/studies/9.9.9",
            &dicom_type(),
            Some("application/dicom+json"),
            body,
        )
        .await;

    assert_eq!(response.status, StatusCode::OK);
    let document = parse_json(&response.body);
    assert_eq!(
        json_string(&document, "00081190"),
        Some(format!("{BASE_URL}/9.9.9").as_str())
    );
    let referenced = json_items(&document, "00081199");
    assert_eq!(
        json_string(referenced[0], "00081190"),
        Some(format!("{BASE_URL}/9.9.9/series/1.2.3.4/instances/1.2.3.4.1").as_str())
    );
}

#[tokio::test]
async fn test_host_header_used_without_public_base_url() {
    let server = TestServer::with_config(|config| {
        config.server.public_base_url = None;
    })
    .await;
    let body = MultipartBody::new()
        .dicom(Part10::new("1.2.3.4.1").encode())
        .build();
    let request = Request::builder()
        .method("POST")
        .uri(STUDIES)
        .header("Host", "pacs.example.com")
        .header("Content-Type", dicom_type())
        .header("Accept", "application/dicom+json")
        .body(Body::from(body))
        .unwrap();

    let response = server.send(request).await;

    assert_eq!(response.status, StatusCode::OK);
    let document = parse_json(&response.body);
    assert_eq!(
        json_string(&document, "00081190"),
        Some("http://pacs.example.com/aets/DCM4CHEE/rs/studies/1.2.3")
    );
}

#[tokio::test]
async fn test_oversized_request() {
    let server = TestServer::with_config(|config| {
        config.server.max_request_size = 64;
    })
    .await;
    let body = MultipartBody::new()
        .dicom(Part10::new("1.2.3.4.1").encode())
        .build();

    let response = server.post(STUDIES, &dicom_type(), None, body).await;

    assert_eq!(response.status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(parse_json(&response.body)["code"], "payload_too_large");
    assert!(!server.archive_dir().join("DCM4CHEE/1.2.3").exists());
}

#[tokio::test]
async fn test_health() {
    let server = TestServer::new().await;
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();

    let response = server.send(request).await;

    assert_eq!(response.status, StatusCode::OK);
    let body = parse_json(&response.body);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["backend"], "filesystem");
}

#[tokio::test]
async fn test_metrics_endpoint_toggle() {
    stow_server::metrics::register_metrics();
    let server = TestServer::new().await;
    let request = Request::builder()
        .uri("/metrics")
        .body(Body::empty())
        .unwrap();
    assert_eq!(server.send(request).await.status, StatusCode::OK);

    let server = TestServer::with_config(|config| {
        config.server.metrics_enabled = false;
    })
    .await;
    let request = Request::builder()
        .uri("/metrics")
        .body(Body::empty())
        .unwrap();
    assert_eq!(server.send(request).await.status, StatusCode::NOT_FOUND);
}
