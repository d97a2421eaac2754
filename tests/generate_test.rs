//! Tests for the variant-drafting client against a mock completions API.

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use lp_experiments::config::{GenerationConfig, RequestConfig};
use lp_experiments::error::GenerationError;
use lp_experiments::generate::GenerationClient;
use lp_experiments::storage::Component;

fn client_for(mock_url: &str, max_retries: u32) -> GenerationClient {
    let config = GenerationConfig {
        api_key: Some("test-api-key".to_string()),
        base_url: mock_url.to_string(),
        model: "gpt-4o-mini".to_string(),
    };
    let request = RequestConfig {
        timeout_ms: 5000,
        max_retries,
        retry_delay_ms: 10,
    };
    GenerationClient::new(&config, request).expect("client")
}

fn sample_component() -> Component {
    Component::new("lp-1", "cta", 0).with_generation_params(json!({"tone": "urgent"}))
}

fn completion_body(content: &str) -> serde_json::Value {
    json!({
        "choices": [{"message": {"role": "assistant", "content": content}}],
        "usage": {"prompt_tokens": 120, "completion_tokens": 80, "total_tokens": 200}
    })
}

#[tokio::test]
async fn draft_parses_structured_completion() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(
            r#"{"html": "<a>Start free trial</a>", "css": null, "js": null, "rationale": "lower commitment"}"#,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server.uri(), 0);
    let draft = client
        .draft_variant(&sample_component(), "<a>Buy</a>")
        .await
        .unwrap();

    assert_eq!(draft.html, "<a>Start free trial</a>");
    assert_eq!(draft.rationale.as_deref(), Some("lower commitment"));
}

#[tokio::test]
async fn draft_accepts_bare_markup_completions() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(completion_body("<a>Start free trial</a>")),
        )
        .mount(&server)
        .await;

    let client = client_for(&server.uri(), 0);
    let draft = client
        .draft_variant(&sample_component(), "<a>Buy</a>")
        .await
        .unwrap();

    assert_eq!(draft.html, "<a>Start free trial</a>");
    assert!(draft.css.is_none());
}

#[tokio::test]
async fn api_errors_surface_as_unavailable_after_retries() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server.uri(), 0);
    let err = client
        .draft_variant(&sample_component(), "<a>Buy</a>")
        .await
        .unwrap_err();

    assert!(matches!(err, GenerationError::Unavailable { retries: 1, .. }));
}

#[tokio::test]
async fn transient_failures_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(completion_body("<a>Second try</a>")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server.uri(), 2);
    let draft = client
        .draft_variant(&sample_component(), "<a>Buy</a>")
        .await
        .unwrap();

    assert_eq!(draft.html, "<a>Second try</a>");
}

#[tokio::test]
async fn empty_choices_is_an_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let client = client_for(&server.uri(), 0);
    let err = client
        .draft_variant(&sample_component(), "<a>Buy</a>")
        .await
        .unwrap_err();

    assert!(matches!(err, GenerationError::InvalidResponse { .. }));
}
