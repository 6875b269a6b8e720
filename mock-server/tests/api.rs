use axum::http::{self, Request, StatusCode};
use base64::{engine::general_purpose::STANDARD, Engine};
use http_body_util::BodyExt;
use mock_server::{app, ServerConfig};
use serde_json::Value;
use tower::ServiceExt;

const TOKEN: &str = "test-token";

fn config() -> ServerConfig {
    ServerConfig {
        api_token: TOKEN.to_string(),
        username: "alice".to_string(),
        password: "pw".to_string(),
    }
}

fn basic(user: &str, pass: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{user}:{pass}")))
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

/// Request with the token and valid credentials attached.
fn authed(method: &str, uri: &str, body: &str) -> Request<String> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(http::header::CONTENT_TYPE, "application/json")
        .header("x-cr-api-token", TOKEN)
        .header(http::header::AUTHORIZATION, basic("alice", "pw"))
        .body(body.to_string())
        .unwrap()
}

// --- auth ---

#[tokio::test]
async fn missing_token_is_forbidden() {
    let resp = app(config())
        .oneshot(
            Request::builder()
                .uri("/api/1/things?ids=")
                .header(http::header::AUTHORIZATION, basic("alice", "pw"))
                .body(String::new())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let body = body_json(resp).await;
    assert_eq!(body["status"], 403);
    assert_eq!(body["error"], "things:token.invalid");
}

#[tokio::test]
async fn missing_credentials_get_basic_challenge() {
    let resp = app(config())
        .oneshot(
            Request::builder()
                .uri("/api/1/things?ids=")
                .header("x-cr-api-token", TOKEN)
                .body(String::new())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        resp.headers().get(http::header::WWW_AUTHENTICATE).unwrap(),
        "Basic realm=\"things\""
    );
}

#[tokio::test]
async fn wrong_password_is_challenged_again() {
    let resp = app(config())
        .oneshot(
            Request::builder()
                .uri("/api/1/things?ids=")
                .header("x-cr-api-token", TOKEN)
                .header(http::header::AUTHORIZATION, basic("alice", "wrong"))
                .body(String::new())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

// --- list ---

#[tokio::test]
async fn list_things_empty() {
    let resp = app(config()).oneshot(authed("GET", "/api/1/things?ids=", "")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await, serde_json::json!([]));
}

// --- create ---

#[tokio::test]
async fn create_thing_returns_201_with_id() {
    let resp = app(config())
        .oneshot(authed("POST", "/api/1/things", r#"{"attributes":{"color":"red"}}"#))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::CREATED);
    let thing = body_json(resp).await;
    assert!(!thing["thingId"].as_str().unwrap().is_empty());
    assert_eq!(thing["attributes"]["color"], "red");
}

#[tokio::test]
async fn create_thing_rejects_non_object() {
    let resp = app(config()).oneshot(authed("POST", "/api/1/things", "[1,2,3]")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["error"], "things:thing.invalid");
}

#[tokio::test]
async fn create_thing_malformed_json_is_rejected() {
    let resp = app(config()).oneshot(authed("POST", "/api/1/things", "{not json")).await.unwrap();

    assert!(resp.status().is_client_error());
}

// --- delete ---

#[tokio::test]
async fn delete_thing_not_found() {
    let resp = app(config()).oneshot(authed("DELETE", "/api/1/things/nope", "")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body = body_json(resp).await;
    assert_eq!(body["error"], "things:thing.notfound");
    assert_eq!(body["message"], "thing nope does not exist");
}

// --- full lifecycle ---

#[tokio::test]
async fn create_list_delete_lifecycle() {
    use tower::Service;

    let mut app = app(config()).into_service();

    // create two
    let mut ids = Vec::new();
    for color in ["red", "blue"] {
        let resp = ServiceExt::ready(&mut app)
            .await
            .unwrap()
            .call(authed(
                "POST",
                "/api/1/things",
                &format!(r#"{{"attributes":{{"color":"{color}"}}}}"#),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        ids.push(body_json(resp).await["thingId"].as_str().unwrap().to_string());
    }

    // list by ids keeps the requested order
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(authed("GET", &format!("/api/1/things?ids={},{}", ids[1], ids[0]), ""))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let listed = body_json(resp).await;
    assert_eq!(listed[0]["thingId"], ids[1].as_str());
    assert_eq!(listed[1]["thingId"], ids[0].as_str());

    // unknown ids are skipped
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(authed("GET", &format!("/api/1/things?ids=ghost,{}", ids[0]), ""))
        .await
        .unwrap();
    assert_eq!(body_json(resp).await.as_array().unwrap().len(), 1);

    // empty ids lists everything
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(authed("GET", "/api/1/things?ids=", ""))
        .await
        .unwrap();
    assert_eq!(body_json(resp).await.as_array().unwrap().len(), 2);

    // delete
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(authed("DELETE", &format!("/api/1/things/{}", ids[0]), ""))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert!(body_bytes(resp).await.is_empty());

    // delete again -> 404
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(authed("DELETE", &format!("/api/1/things/{}", ids[0]), ""))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    // only the other thing remains
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(authed("GET", "/api/1/things", ""))
        .await
        .unwrap();
    let remaining = body_json(resp).await;
    assert_eq!(remaining.as_array().unwrap().len(), 1);
    assert_eq!(remaining[0]["thingId"], ids[1].as_str());
}
