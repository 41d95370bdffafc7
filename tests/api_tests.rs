use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use serde_json::{json, Value};

use course_recommender::{
    db::{DataSource, StaticSource},
    models::{Course, Rating, RecommendResponse, UserInterest},
    routes::{create_router, AppState},
    services::{KnnOptions, SnapshotStore},
};

fn fixture_source() -> StaticSource {
    let ratings = vec![
        Rating::new(1, 10, 5.0),
        Rating::new(1, 11, 3.0),
        Rating::new(2, 10, 4.0),
        Rating::new(2, 11, 5.0),
        Rating::new(2, 12, 2.0),
        Rating::new(3, 13, 4.0),
        Rating::new(3, 14, 2.0),
    ];
    let courses = vec![
        Course::new(10, Some(1), "Algebra"),
        Course::new(11, Some(1), "Geometry"),
        Course {
            description: Some("Paint with water".to_string()),
            image_url: Some("watercolor.png".to_string()),
            instructor_name: Some("Ada".to_string()),
            ..Course::new(12, Some(7), "Watercolor")
        },
        Course::new(13, Some(2), "Sourdough"),
        Course::new(14, Some(2), "Knife Skills"),
    ];
    let interests = vec![UserInterest::new(1, 7), UserInterest::new(4, 2)];
    StaticSource::new(ratings, courses, interests)
}

const REFRESH_TOKEN: &str = "test-refresh-token";

fn authorization(token: &str) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static("authorization"),
        HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
    )
}

async fn create_test_server_with(source: StaticSource, train: bool) -> TestServer {
    let source: Arc<dyn DataSource> = Arc::new(source);
    let store = Arc::new(SnapshotStore::new(KnnOptions::default()));
    if train {
        store.refresh(source.as_ref()).await.unwrap();
    }
    let state =
        AppState::new(store, source, 50).with_refresh_token(Some(REFRESH_TOKEN.to_string()));
    let app = create_router(state);
    TestServer::new(app).unwrap()
}

async fn create_test_server() -> TestServer {
    create_test_server_with(fixture_source(), true).await
}

async fn recommend(server: &TestServer, body: Value) -> RecommendResponse {
    let response = server.post("/recommends").json(&body).await;
    response.assert_status_ok();
    response.json::<RecommendResponse>()
}

#[tokio::test]
async fn test_health_check() {
    let server = create_test_server().await;
    let response = server.get("/health").await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["snapshot"]["version"], 1);
    assert_eq!(body["snapshot"]["ratings"], 7);
    assert_eq!(body["last_refresh_error"], Value::Null);
}

#[tokio::test]
async fn test_documentation() {
    let server = create_test_server().await;
    let response = server.get("/").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert!(body["endpoints"]["POST /recommends"].is_object());
}

#[tokio::test]
async fn test_recommends_excludes_rated_and_boosts_interests() {
    let server = create_test_server().await;
    let body = recommend(&server, json!({ "user_id": 1, "max": 5 })).await;

    assert_eq!(body.user_id, 1);
    assert_eq!(body.model_version, 1);

    let ids: Vec<i64> = body.recommendations.iter().map(|r| r.course_id).collect();
    assert!(!ids.contains(&10));
    assert!(!ids.contains(&11));
    assert_eq!(ids[0], 12);

    let top = &body.recommendations[0];
    assert!(top.is_in_interest_categories);
    assert_eq!(top.score, top.predicted_rating * 2.0);
    assert_eq!(top.title, "Watercolor");
    assert_eq!(top.instructor_name.as_deref(), Some("Ada"));
    assert_eq!(top.image_url.as_deref(), Some("watercolor.png"));

    for pair in body.recommendations.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[tokio::test]
async fn test_recommends_accepts_numeric_strings() {
    let server = create_test_server().await;
    let body = recommend(&server, json!({ "user_id": "1", "max": "2" })).await;
    assert_eq!(body.recommendations.len(), 2);
}

#[tokio::test]
async fn test_recommends_respects_max() {
    let server = create_test_server().await;

    let none = recommend(&server, json!({ "user_id": 2, "max": 0 })).await;
    assert!(none.recommendations.is_empty());

    let one = recommend(&server, json!({ "user_id": 2, "max": 1 })).await;
    assert_eq!(one.recommendations.len(), 1);

    // User 2 rated 10, 11 and 12, leaving 13 and 14.
    let all = recommend(&server, json!({ "user_id": 2, "max": 50 })).await;
    let ids: Vec<i64> = all.recommendations.iter().map(|r| r.course_id).collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&13) && ids.contains(&14));
}

#[tokio::test]
async fn test_cold_start_user_gets_recommendations() {
    let server = create_test_server().await;
    let body = recommend(&server, json!({ "user_id": 999, "max": 10 })).await;

    assert_eq!(body.recommendations.len(), 5);
    for item in &body.recommendations {
        assert!(!item.is_in_interest_categories);
        assert_eq!(item.score, item.predicted_rating);
    }
    let ids: Vec<i64> = body.recommendations.iter().map(|r| r.course_id).collect();
    assert_eq!(ids, vec![10, 11, 12, 13, 14]);
}

#[tokio::test]
async fn test_interest_only_user_gets_boost() {
    let server = create_test_server().await;
    let body = recommend(&server, json!({ "user_id": 4, "max": 2 })).await;

    let ids: Vec<i64> = body.recommendations.iter().map(|r| r.course_id).collect();
    assert_eq!(ids, vec![13, 14]);
    assert!(body.recommendations.iter().all(|r| r.is_in_interest_categories));
}

#[tokio::test]
async fn test_repeated_requests_are_identical() {
    let server = create_test_server().await;
    let first = recommend(&server, json!({ "user_id": 3, "max": 5 })).await;
    let second = recommend(&server, json!({ "user_id": 3, "max": 5 })).await;
    assert_eq!(first.recommendations, second.recommendations);
}

#[tokio::test]
async fn test_invalid_requests_rejected() {
    let server = create_test_server().await;

    for body in [
        json!({ "max": 5 }),
        json!({ "user_id": 1 }),
        json!({ "user_id": "one", "max": 5 }),
        json!({ "user_id": 1, "max": -1 }),
        json!({ "user_id": 1, "max": 51 }),
        json!({ "user_id": 0, "max": 5 }),
    ] {
        let response = server.post("/recommends").json(&body).await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let error: Value = response.json();
        assert!(error["error"].is_string());
    }

    let response = server.post("/recommends").text("user_id=1&max=5").await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_not_ready_until_trained() {
    let server = create_test_server_with(fixture_source(), false).await;

    server
        .get("/health")
        .await
        .assert_status(StatusCode::SERVICE_UNAVAILABLE);
    server
        .post("/recommends")
        .json(&json!({ "user_id": 1, "max": 5 }))
        .await
        .assert_status(StatusCode::SERVICE_UNAVAILABLE);

    let (name, value) = authorization(REFRESH_TOKEN);
    let response = server.post("/refresh").add_header(name, value).await;
    response.assert_status_ok();
    let summary: Value = response.json();
    assert_eq!(summary["version"], 1);

    recommend(&server, json!({ "user_id": 1, "max": 5 })).await;
}

#[tokio::test]
async fn test_refresh_with_empty_corpus_reports_error() {
    let empty = StaticSource::new(Vec::new(), Vec::new(), Vec::new());
    let server = create_test_server_with(empty, false).await;

    let (name, value) = authorization(REFRESH_TOKEN);
    let response = server.post("/refresh").add_header(name, value).await;
    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = response.json();
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("Insufficient training data"));

    let health: Value = server.get("/health").await.json();
    assert!(health["last_refresh_error"]["error"].is_string());
}

#[tokio::test]
async fn test_request_id_header() {
    let server = create_test_server().await;

    let response = server
        .get("/health")
        .add_header(
            HeaderName::from_static("x-request-id"),
            HeaderValue::from_static("trace-123"),
        )
        .await;
    assert_eq!(response.header("x-request-id"), "trace-123");

    let response = server.get("/health").await;
    assert!(!response.header("x-request-id").is_empty());
}

#[tokio::test]
async fn test_refresh_requires_bearer_token() {
    let server = create_test_server().await;

    server
        .post("/refresh")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    let (name, value) = authorization("guess");
    server
        .post("/refresh")
        .add_header(name, value)
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    // Rejected calls must not retrain.
    let health: Value = server.get("/health").await.json();
    assert_eq!(health["snapshot"]["version"], 1);

    let (name, value) = authorization(REFRESH_TOKEN);
    let response = server.post("/refresh").add_header(name, value).await;
    response.assert_status_ok();
    let summary: Value = response.json();
    assert_eq!(summary["version"], 2);
}

#[tokio::test]
async fn test_refresh_disabled_without_token() {
    let source: Arc<dyn DataSource> = Arc::new(fixture_source());
    let store = Arc::new(SnapshotStore::new(KnnOptions::default()));
    store.refresh(source.as_ref()).await.unwrap();
    let server = TestServer::new(create_router(AppState::new(store, source, 50))).unwrap();

    let (name, value) = authorization(REFRESH_TOKEN);
    server
        .post("/refresh")
        .add_header(name, value)
        .await
        .assert_status(StatusCode::FORBIDDEN);
}
