//! API Regression Tests
//!
//! In-process tests that build the Axum app via `create_app()` and exercise
//! the calculation endpoints using `tower::ServiceExt::oneshot()`.
//! No binary spawn, no network port.
//!
//! Expected bodies are compared as raw strings: field order, integer
//! formatting and rounding are part of the wire contract.

use iol_vergence::api::{create_app, ApiState};
use iol_vergence::config::EngineConfig;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

fn app() -> Router {
    create_app(ApiState::new(EngineConfig::default()))
}

async fn post_raw(endpoint: &str, body: &str) -> (StatusCode, String) {
    let resp = app()
        .oneshot(
            Request::post(format!("/api/v1/{endpoint}"))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

async fn assert_bad_request(endpoint: &str, body: &str, expected: &str) {
    let (status, text) = post_raw(endpoint, body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "POST {endpoint} {body}");
    let v: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(v["Error"], expected, "POST {endpoint} {body}");
}

async fn assert_ok(endpoint: &str, body: &Value, expected: &str) {
    let (status, text) = post_raw(endpoint, &body.to_string()).await;
    assert_eq!(status, StatusCode::OK, "POST {endpoint}: {text}");
    assert_eq!(text, expected);
}

// ============================================================================
// Transport
// ============================================================================

#[tokio::test]
async fn calculation_endpoints_require_json_content_type() {
    for endpoint in ["/api/v1/preop", "/api/v1/postop"] {
        let resp = app()
            .oneshot(Request::post(endpoint).body(Body::from("{}")).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE, "{endpoint}");
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(
            String::from_utf8(bytes.to_vec()).unwrap(),
            r#"{"Error":"Content-Type must be \"application/json\""}"#
        );
    }
}

#[tokio::test]
async fn responses_are_not_cacheable() {
    let resp = app()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers().get(header::CACHE_CONTROL).unwrap(), "no-store");
}

#[tokio::test]
async fn settings_endpoint_returns_registry() {
    let resp = app()
        .oneshot(Request::get("/api/v1/settings").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let v: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(v["lens_constants"]["AConstant"]["min"], 101.0);
    assert_eq!(v["variables"]["AL"]["max"], 40.0);
    assert_eq!(v["optimization"]["min_eyes"], 50);
}

// ============================================================================
// Request-level failures
// ============================================================================

#[tokio::test]
async fn preop_bad_requests() {
    let cases = [
        ("", "Bad Request:\nRequest is not valid JSON"),
        ("[]", "Bad Request:\nRequest is not an object"),
        ("{}", "Bad Request:\nRoot property \"KIndex\" must be a number between 1 and 2."),
        (
            r#"{"badProperty":null}"#,
            "Bad Request:\nRoot property \"badProperty\" is not a valid property.",
        ),
        (
            r#"{"KIndex": 1, "V": 9}"#,
            "Bad Request:\nRoot property \"V\" must be a number between 10 and 16.",
        ),
        (
            r#"{"KIndex": 1,"V":12}"#,
            "Bad Request:\nRoot property \"PredictionsPerIol\" is a required integer between 1 and 21",
        ),
        (
            r#"{"KIndex": 1,"V":12,"PredictionsPerIol":7}"#,
            "Bad Request:\nRoot property \"Eyes\" must be an array containing between 1 and 100 eyes.",
        ),
        (
            r#"{"KIndex": 1,"V":12,"PredictionsPerIol":7, "Eyes":[]}"#,
            "Bad Request:\nRoot property \"Eyes\" must be an array containing between 1 and 100 eyes.",
        ),
    ];
    for (body, expected) in cases {
        assert_bad_request("preop", body, expected).await;
    }
}

#[tokio::test]
async fn postop_bad_requests() {
    let cases = [
        ("", "Bad Request:\nRequest is not valid JSON"),
        ("[]", "Bad Request:\nRequest is not an object"),
        ("{}", "Bad Request:\nRoot property \"KIndex\" must be a number between 1 and 2."),
        (
            r#"{"badProperty": true}"#,
            "Bad Request:\nRoot property \"badProperty\" is not a valid property.",
        ),
        (
            r#"{"KIndex": 1,"V":12}"#,
            "Bad Request:\nRoot property \"Optimize\" must be a boolean.",
        ),
        (
            r#"{"Optimize":false,"KIndex": 1,"V":12}"#,
            "Bad Request:\nRoot property \"AConstant\" is required and must be between 101 and 129",
        ),
        (
            r#"{"Optimize":false,"KIndex": 1,"V":12,"AConstant":119, "Eyes": []}"#,
            "Bad Request:\nRoot property \"Eyes\" must be an array containing between 1 and 10000 eyes.",
        ),
    ];
    for (body, expected) in cases {
        assert_bad_request("postop", body, expected).await;
    }
}

// ============================================================================
// Partial failures
// ============================================================================

#[tokio::test]
async fn preop_partially_bad_request() {
    let body = json!({
        "KIndex": 1.3375, "V": 12, "PredictionsPerIol": 1,
        "Eyes": [
            {},
            { "badProperty": true },
            { "TgtRx": -1, "K1": 40, "K2": 42, "AL": 24 },
            { "TgtRx": -1, "K1": 40, "K2": 42, "AL": 24,
              "IOLs": [{ "badProperty": true }, {}, { "AConstant": 119 }] }
        ]
    });
    let expected = concat!(
        r#"[{"Error":"AL is not a valid number."},"#,
        r#"{"Error":"Invalid property: \"badProperty\""},"#,
        r#"{"Error":"This eye does not have a valid amount of IOLs. You can specify default IOLs in the root \"IOLs\" property, and you can override it within individual eyes. You must specify between 1 and 100 IOLs."},"#,
        r#"{"IOLs":[{"Error":"Invalid property: \"badProperty\""},{"Error":"AConstant must be between 101 and 129"},"#,
        r#"{"Predictions":[{"IOL":25,"Rx":-1.1545,"IsBestOption":true}]}]}]"#,
    );
    assert_ok("preop", &body, expected).await;
}

#[tokio::test]
async fn postop_partially_bad_request() {
    let body = json!({
        "Optimize": false, "KIndex": 1, "V": 12, "AConstant": 119,
        "Eyes": [
            { "badProperty": true },
            {},
            { "AL": -1 },
            { "AL": 23.6, "K1": 44.12, "K2": 44.12 },
            { "AL": 23.60, "K1": 44.12, "K2": 44.12, "IolPower": 20 }
        ]
    });
    let expected = concat!(
        r#"{"AConstant":119,"Predictions":["Invalid property: \"badProperty\"","#,
        r#""AL is not a valid number.","AL must be between 13 and 40","#,
        r#""IolPower must be a number between -20 and 80",0.3557]}"#,
    );
    assert_ok("postop", &body, expected).await;
}

// ============================================================================
// Predictions per IOL
// ============================================================================

fn single_eye_preop(predictions_per_iol: u32) -> Value {
    json!({
        "KIndex": 1.3375, "V": 12, "PredictionsPerIol": predictions_per_iol,
        "IOLs": [{ "AConstant": 119, "Powers": [{ "From": 6, "To": 30, "By": 0.5 }] }],
        "Eyes": [{ "TgtRx": -1, "K1": 40, "K2": 42, "AL": 24 }]
    })
}

#[tokio::test]
async fn predictions_per_iol_widens_window() {
    let cases = [
        (1, r#"{"IOL":25,"Rx":-1.1545,"IsBestOption":true}"#),
        (
            3,
            r#"{"IOL":24.5,"Rx":-0.78},{"IOL":25,"Rx":-1.1545,"IsBestOption":true},{"IOL":25.5,"Rx":-1.5336}"#,
        ),
        (
            5,
            r#"{"IOL":24,"Rx":-0.4099},{"IOL":24.5,"Rx":-0.78},{"IOL":25,"Rx":-1.1545,"IsBestOption":true},{"IOL":25.5,"Rx":-1.5336},{"IOL":26,"Rx":-1.9174}"#,
        ),
        (
            7,
            r#"{"IOL":23.5,"Rx":-0.0443},{"IOL":24,"Rx":-0.4099},{"IOL":24.5,"Rx":-0.78},{"IOL":25,"Rx":-1.1545,"IsBestOption":true},{"IOL":25.5,"Rx":-1.5336},{"IOL":26,"Rx":-1.9174},{"IOL":26.5,"Rx":-2.3059}"#,
        ),
        (
            9,
            r#"{"IOL":22.5,"Rx":0.6739},{"IOL":23,"Rx":0.3169},{"IOL":23.5,"Rx":-0.0443},{"IOL":24,"Rx":-0.4099},{"IOL":24.5,"Rx":-0.78},{"IOL":25,"Rx":-1.1545,"IsBestOption":true},{"IOL":25.5,"Rx":-1.5336},{"IOL":26,"Rx":-1.9174},{"IOL":26.5,"Rx":-2.3059}"#,
        ),
    ];
    for (count, records) in cases {
        let expected = format!(r#"[{{"IOLs":[{{"Predictions":[{records}]}}]}}]"#);
        assert_ok("preop", &single_eye_preop(count), &expected).await;
    }
}

#[tokio::test]
async fn eye_iols_override_request_iols() {
    let body = json!({
        "KIndex": 1.3375, "V": 12, "PredictionsPerIol": 1,
        "IOLs": [{ "AConstant": 119, "Powers": [{ "From": 6, "To": 30, "By": 0.5 }] }],
        "Eyes": [
            { "TgtRx": -1, "K1": 40, "K2": 42, "AL": 24 },
            { "TgtRx": -1, "K1": 40, "K2": 42, "AL": 24,
              "IOLs": [
                  { "AConstant": 119, "Powers": [{ "From": 6, "To": 30, "By": 0.5 }] },
                  { "AConstant": 119, "Powers": [{ "From": 6, "To": 31, "By": 5 }] }
              ] }
        ]
    });
    let expected = concat!(
        r#"[{"IOLs":[{"Predictions":[{"IOL":25,"Rx":-1.1545,"IsBestOption":true}]}]},"#,
        r#"{"IOLs":[{"Predictions":[{"IOL":25,"Rx":-1.1545,"IsBestOption":true}]},"#,
        r#"{"Predictions":[{"IOL":26,"Rx":-1.9174,"IsBestOption":true}]}]}]"#,
    );
    assert_ok("preop", &body, expected).await;
}

// ============================================================================
// Optimization
// ============================================================================

fn optimize_body(reference: f64) -> Value {
    let eye = json!({ "K1": 45.91, "K2": 45.91, "AL": 21.88, "IolPower": 27.5, "Ref": reference });
    json!({
        "KIndex": 1.3375, "V": 12, "AConstant": 121, "Optimize": true,
        "Eyes": vec![eye; 50]
    })
}

#[tokio::test]
async fn optimization_requires_enough_valid_eyes() {
    let body = r#"{"AConstant":119,"Optimize":true,"KIndex":1.3375,"V": 12,"Eyes":[{"IolPower":45,"K1":32,"K2":32,"AL":14,"Ref":0},{"IolPower":45,"K1":32,"K2":32,"AL":14,"Ref":0}]}"#;
    assert_bad_request(
        "postop",
        body,
        "Bad Request:\nWhen optimizing lens constants, you must provide between 50 and 10000 eyes with valid data.",
    )
    .await;
}

#[tokio::test]
async fn optimization_requires_ref_on_every_eye() {
    let mut body = optimize_body(0.0);
    body["Eyes"][10] = json!({ "K1": 45.91, "K2": 45.91, "AL": 21.88, "IolPower": 27.5 });
    assert_bad_request(
        "postop",
        &body.to_string(),
        "Bad Request:\nRef is required for every eye because Optimize is true.",
    )
    .await;
}

#[tokio::test]
async fn optimization_to_emmetropia() {
    let predictions = vec!["0"; 50].join(",");
    let expected = format!(r#"{{"AConstant":121.17331,"Predictions":[{predictions}]}}"#);
    assert_ok("postop", &optimize_body(0.0), &expected).await;
}

#[tokio::test]
async fn optimization_to_myopic_target() {
    let predictions = vec!["-0.25"; 50].join(",");
    let expected = format!(r#"{{"AConstant":120.94121,"Predictions":[{predictions}]}}"#);
    assert_ok("postop", &optimize_body(-0.25), &expected).await;
}
