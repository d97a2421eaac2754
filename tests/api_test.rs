//! Endpoint tests over the full router.
//!
//! Each test drives the axum router directly with `tower::ServiceExt::oneshot`
//! against an in-memory database.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use lp_experiments::config::{
    AnalysisConfig, Config, DatabaseConfig, GenerationConfig, LogFormat, LoggingConfig,
    RequestConfig, ServerConfig, TrackingConfig,
};
use lp_experiments::server::AppState;
use lp_experiments::storage::{
    Component, LandingPage, SqliteStorage, Storage, TrackedEvent, User, Variant, VariantLabel,
};
use lp_experiments::{build_router, SharedState};

fn test_config() -> Config {
    Config {
        server: ServerConfig {
            bind_addr: "127.0.0.1:0".parse().expect("valid addr"),
        },
        database: DatabaseConfig {
            path: ":memory:".into(),
            max_connections: 1,
        },
        logging: LoggingConfig {
            level: "debug".to_string(),
            format: LogFormat::Pretty,
        },
        tracking: TrackingConfig::default(),
        analysis: AnalysisConfig::default(),
        generation: GenerationConfig {
            api_key: None,
            base_url: "https://api.openai.com".to_string(),
            model: "gpt-4o-mini".to_string(),
        },
        request: RequestConfig::default(),
    }
}

async fn test_app() -> (Router, SharedState) {
    let storage: Arc<dyn Storage> = Arc::new(
        SqliteStorage::new_in_memory()
            .await
            .expect("in-memory storage"),
    );
    let (state, _worker) = AppState::new(test_config(), storage, None);
    let state = Arc::new(state);
    (build_router(state.clone()), state)
}

/// Seed an owner, a landing page, and a component with both variants.
async fn seed_experiment(state: &SharedState) -> (User, LandingPage, Component) {
    let user = User::new("owner@example.com", "Owner");
    state.storage.create_user(&user).await.unwrap();

    let lp = LandingPage::new(&user.id, "Launch page");
    state.storage.create_landing_page(&lp).await.unwrap();

    let component = Component::new(&lp.id, "cta", 0);
    state.storage.create_component(&component).await.unwrap();
    state
        .storage
        .create_variant(&Variant::new(&component.id, VariantLabel::A, "<a>Buy</a>"))
        .await
        .unwrap();
    state
        .storage
        .create_variant(
            &Variant::new(&component.id, VariantLabel::B, "<a>Buy now!</a>")
                .with_css(".cta { font-weight: bold }"),
        )
        .await
        .unwrap();

    (user, lp, component)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.expect("body").to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}

#[tokio::test]
async fn healthz_is_ok() {
    let (app, _state) = test_app().await;
    let response = app.oneshot(get("/healthz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn exit_beacon_always_returns_200() {
    let (app, _state) = test_app().await;

    // Empty body.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/tracking/exit")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Garbage body.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/tracking/exit")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Well-formed body.
    let response = app
        .oneshot(post_json(
            "/api/tracking/exit",
            json!({"lpId": "lp-1", "sessionId": "s-1", "data": {"timeOnPage": 12}}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn tracking_rejects_missing_identifiers() {
    let (app, _state) = test_app().await;

    let response = app
        .clone()
        .oneshot(post_json("/api/tracking/pageview", json!({"lpId": "lp-1"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("sessionId"));

    let response = app
        .oneshot(post_json(
            "/api/tracking/pageview",
            json!({"sessionId": "s-1"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn conversion_increments_exactly_the_posted_variant() {
    let (app, state) = test_app().await;
    let (_, lp, component) = seed_experiment(&state).await;

    // Prior state: one view on each variant.
    for (session, variant) in [("s1", "a"), ("s2", "b")] {
        let response = app
            .clone()
            .oneshot(post_json(
                "/api/tracking/component",
                json!({
                    "lpId": lp.id,
                    "sessionId": session,
                    "componentId": component.id,
                    "variant": variant
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let uri = format!("/api/tracking/stats/components?lpId={}", lp.id);
    let before = body_json(app.clone().oneshot(get(&uri)).await.unwrap()).await;
    let entry = &before["components"][0];
    assert_eq!(entry["componentId"], component.id.as_str());
    let conversions_a_before = entry["variantA"]["conversions"].as_i64().unwrap();
    let conversions_b_before = entry["variantB"]["conversions"].as_i64().unwrap();

    // One conversion on variant b.
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/tracking/conversion",
            json!({
                "lpId": lp.id,
                "sessionId": "s2",
                "componentId": component.id,
                "variant": "b"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let after = body_json(app.oneshot(get(&uri)).await.unwrap()).await;
    let entry = &after["components"][0];
    assert_eq!(
        entry["variantB"]["conversions"].as_i64().unwrap(),
        conversions_b_before + 1
    );
    assert_eq!(
        entry["variantA"]["conversions"].as_i64().unwrap(),
        conversions_a_before
    );

    // The conversion also produced a test-result snapshot.
    let result = state
        .storage
        .get_component_test_result(&component.id)
        .await
        .unwrap();
    assert!(result.is_some());
}

#[tokio::test]
async fn stats_require_lp_id() {
    let (app, _state) = test_app().await;

    let response = app
        .clone()
        .oneshot(get("/api/tracking/stats"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(get("/api/tracking/stats/components?lpId="))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn lp_stats_summarize_traffic() {
    let (app, state) = test_app().await;
    let (_, lp, _) = seed_experiment(&state).await;

    for session in ["s1", "s2", "s3"] {
        let response = app
            .clone()
            .oneshot(post_json(
                "/api/tracking/pageview",
                json!({"lpId": lp.id, "sessionId": session}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let body = body_json(
        app.oneshot(get(&format!("/api/tracking/stats?lpId={}", lp.id)))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(body["summary"]["pageviews"], 3);
    assert_eq!(body["summary"]["sessions"], 3);
    assert_eq!(body["summary"]["conversions"], 0);
}

#[tokio::test]
async fn public_lp_assigns_variants_and_sets_cookie() {
    let (app, state) = test_app().await;
    let (_, lp, component) = seed_experiment(&state).await;

    // Per-component override wins and shows variant b content.
    let response = app
        .clone()
        .oneshot(get(&format!(
            "/api/public/lp/{}?variant=a&variant_{}=b",
            lp.id, component.id
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("session cookie set")
        .to_str()
        .unwrap()
        .to_string();
    assert!(set_cookie.starts_with("lp_session="));
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("SameSite=Lax"));

    let body = body_json(response).await;
    assert_eq!(body["components"][0]["variant"], "b");
    assert_eq!(body["components"][0]["html"], "<a>Buy now!</a>");
    let session_id = body["sessionId"].as_str().unwrap().to_string();

    // Replaying the cookie without overrides keeps the assignment.
    let cookie_pair = set_cookie.split(';').next().unwrap().to_string();
    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/public/lp/{}", lp.id))
                .header(header::COOKIE, cookie_pair)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["sessionId"], session_id.as_str());
    assert_eq!(body["components"][0]["variant"], "b");
}

#[tokio::test]
async fn public_lp_unknown_id_is_404() {
    let (app, _state) = test_app().await;
    let response = app.oneshot(get("/api/public/lp/nope")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

/// Decide a winner by seeding the event log directly, then recompute.
async fn decide_winner(state: &SharedState, lp: &LandingPage, component: &Component) -> String {
    for i in 0..100 {
        for (variant, prefix, converts) in [
            (VariantLabel::A, "a", i < 10),
            (VariantLabel::B, "b", i < 20),
        ] {
            let session = format!("{}{}", prefix, i);
            state
                .storage
                .insert_event(
                    &TrackedEvent::new(&session, &lp.id, "component_view")
                        .with_component(&component.id, variant),
                )
                .await
                .unwrap();
            if converts {
                state
                    .storage
                    .insert_event(
                        &TrackedEvent::new(&session, &lp.id, "conversion")
                            .with_component(&component.id, variant),
                    )
                    .await
                    .unwrap();
            }
        }
    }
    let result = state.reporter.recompute(&component.id).await.unwrap();
    assert!(result.is_significant);
    result.id
}

#[tokio::test]
async fn apply_winner_requires_authentication_and_ownership() {
    let (app, state) = test_app().await;
    let (_, lp, component) = seed_experiment(&state).await;
    let test_id = decide_winner(&state, &lp, &component).await;

    let winner = state
        .storage
        .get_component_variant(&component.id, VariantLabel::B)
        .await
        .unwrap()
        .unwrap();
    let body = json!({"componentId": component.id, "variantId": winner.id});

    // No token.
    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/api/tests/{}/apply-winner", test_id),
            body.clone(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // A stranger's token.
    let stranger = User::new("stranger@example.com", "Stranger");
    state.storage.create_user(&stranger).await.unwrap();
    let mut request = post_json(&format!("/api/tests/{}/apply-winner", test_id), body);
    request.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {}", stranger.api_token).parse().unwrap(),
    );
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn apply_winner_round_trip() {
    let (app, state) = test_app().await;
    let (owner, lp, component) = seed_experiment(&state).await;
    let test_id = decide_winner(&state, &lp, &component).await;

    let winner = state
        .storage
        .get_component_variant(&component.id, VariantLabel::B)
        .await
        .unwrap()
        .unwrap();

    let mut request = post_json(
        &format!("/api/tests/{}/apply-winner", test_id),
        json!({"componentId": component.id, "variantId": winner.id}),
    );
    request.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {}", owner.api_token).parse().unwrap(),
    );
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["appliedToProduction"], true);
    assert_eq!(body["winningVariant"], "b");

    // Variant "a" now carries the winner's content, byte for byte.
    let loser = state
        .storage
        .get_component_variant(&component.id, VariantLabel::A)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loser.html, winner.html);
    assert_eq!(loser.css, winner.css);

    // The report endpoint agrees, and keeps agreeing after a recompute.
    state.reporter.recompute(&component.id).await.unwrap();
    let report = body_json(
        app.clone()
            .oneshot(get(&format!("/api/tracking/stats/report/{}", test_id)))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(report["appliedToProduction"], true);

    // Second apply is rejected.
    let mut request = post_json(
        &format!("/api/tests/{}/apply-winner", test_id),
        json!({"componentId": component.id, "variantId": winner.id}),
    );
    request.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {}", owner.api_token).parse().unwrap(),
    );
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn report_unknown_test_is_404() {
    let (app, _state) = test_app().await;
    let response = app
        .oneshot(get("/api/tracking/stats/report/none"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn lp_crud_requires_auth_and_scopes_by_owner() {
    let (app, state) = test_app().await;

    let response = app
        .clone()
        .oneshot(post_json("/api/lps", json!({"name": "New page"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let owner = User::new("owner@example.com", "Owner");
    state.storage.create_user(&owner).await.unwrap();

    let mut request = post_json("/api/lps", json!({"name": "New page"}));
    request.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {}", owner.api_token).parse().unwrap(),
    );
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    let lp_id = created["id"].as_str().unwrap().to_string();

    // Another user cannot read it.
    let stranger = User::new("stranger@example.com", "Stranger");
    state.storage.create_user(&stranger).await.unwrap();
    let mut request = get(&format!("/api/lps/{}", lp_id));
    request.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {}", stranger.api_token).parse().unwrap(),
    );
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // The owner can.
    let mut request = get(&format!("/api/lps/{}", lp_id));
    request.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {}", owner.api_token).parse().unwrap(),
    );
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["name"], "New page");
}

#[tokio::test]
async fn generate_variant_unconfigured_is_unavailable() {
    let (app, state) = test_app().await;
    let (owner, _lp, component) = seed_experiment(&state).await;

    let mut request = post_json(
        &format!("/api/components/{}/generate-variant", component.id),
        json!({}),
    );
    request.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {}", owner.api_token).parse().unwrap(),
    );
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}
