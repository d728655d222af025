use base64::{Engine as _, engine::general_purpose::STANDARD};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::Duration;
use tryon_gateway::{
    Error,
    inference::{Downloader, ResultNormalizer, ResultPayload},
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;

use common::test_utils::create_test_config;

const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nfake-image-body";

fn downloader() -> Downloader {
    let config = create_test_config("http://unused.invalid");
    Downloader::new(&config.download, Duration::from_secs(5)).unwrap()
}

async fn image_server(expected_hits: u64) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/file=/tmp/out.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/png")
                .set_body_bytes(PNG_BYTES),
        )
        .expect(expected_hits)
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_base64_text_is_returned_unchanged() {
    let downloader = downloader();
    let normalizer = ResultNormalizer::new(&downloader);

    let result = normalizer
        .normalize(ResultPayload::from(json!("aGVsbG8=")))
        .await
        .unwrap();

    assert_eq!(result.as_str(), "aGVsbG8=");
}

#[tokio::test]
async fn test_sequence_with_url_is_downloaded_once() {
    let server = image_server(1).await;
    let downloader = downloader();
    let normalizer = ResultNormalizer::new(&downloader);
    let url = format!("{}/file=/tmp/out.png", server.uri());

    let result = normalizer
        .normalize(ResultPayload::from(json!([{"url": url, "data": null}])))
        .await
        .unwrap();

    assert_eq!(result.as_str(), STANDARD.encode(PNG_BYTES));
}

#[tokio::test]
async fn test_object_with_url_is_downloaded() {
    let server = image_server(1).await;
    let downloader = downloader();
    let normalizer = ResultNormalizer::new(&downloader);
    let url = format!("{}/file=/tmp/out.png", server.uri());

    let result = normalizer
        .normalize(ResultPayload::from(json!({"url": url, "image": "aW5saW5l"})))
        .await
        .unwrap();

    assert_eq!(result.as_str(), STANDARD.encode(PNG_BYTES));
}

#[tokio::test]
async fn test_plain_url_text_is_downloaded() {
    let server = image_server(1).await;
    let downloader = downloader();
    let normalizer = ResultNormalizer::new(&downloader);

    let result = normalizer
        .normalize(ResultPayload::from(json!(format!(
            "{}/file=/tmp/out.png",
            server.uri()
        ))))
        .await
        .unwrap();

    assert_eq!(result.as_str(), STANDARD.encode(PNG_BYTES));
}

#[tokio::test]
async fn test_object_with_inline_image() {
    let downloader = downloader();
    let normalizer = ResultNormalizer::new(&downloader);

    let result = normalizer
        .normalize(ResultPayload::from(json!({"image": "aW5saW5l"})))
        .await
        .unwrap();

    assert_eq!(result.as_str(), "aW5saW5l");
}

#[tokio::test]
async fn test_inline_data_used_when_download_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(3)
        .mount(&server)
        .await;
    let downloader = downloader();
    let normalizer = ResultNormalizer::new(&downloader);
    let url = format!("{}/file=/tmp/missing.png", server.uri());

    let result = normalizer
        .normalize(ResultPayload::from(json!([{"url": url, "data": "aW5saW5l"}])))
        .await
        .unwrap();

    assert_eq!(result.as_str(), "aW5saW5l");
}

#[tokio::test]
async fn test_failed_download_without_fallback_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let downloader = downloader();
    let normalizer = ResultNormalizer::new(&downloader);
    let url = format!("{}/file=/tmp/missing.png", server.uri());

    let err = normalizer
        .normalize(ResultPayload::from(json!([{"url": url}])))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::DownloadExhausted { attempts: 3, .. }));
    assert!(!err.is_result_shape());
}

#[tokio::test]
async fn test_unrecognized_shapes() {
    let downloader = downloader();
    let normalizer = ResultNormalizer::new(&downloader);

    for payload in [
        json!("not-base64-!!"),
        json!(""),
        json!([]),
        json!([{"caption": "no image here"}]),
        json!({"caption": "no image here"}),
        json!(null),
        json!(7),
    ] {
        let err = normalizer
            .normalize(ResultPayload::from(payload.clone()))
            .await
            .unwrap_err();
        assert!(
            matches!(err, Error::UnrecognizedResultShape),
            "payload {payload} gave {err:?}"
        );
    }
}

#[tokio::test]
async fn test_inline_data_must_be_base64() {
    let downloader = downloader();
    let normalizer = ResultNormalizer::new(&downloader);

    let err = normalizer
        .normalize(ResultPayload::from(json!([{"data": "data:image/png;base64,aGk="}])))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::InvalidResultEncoding));
}
