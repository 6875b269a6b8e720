use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Path, Query, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

/// Path prefix the Things routes are served under.
pub const BASE_PATH: &str = "/api/1";
pub const API_TOKEN_HEADER: &str = "x-cr-api-token";
pub const REALM: &str = "things";

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub api_token: String,
    pub username: String,
    pub password: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_token: "dev-token".to_string(),
            username: "demo".to_string(),
            password: "demo".to_string(),
        }
    }
}

pub type Db = Arc<RwLock<HashMap<String, Value>>>;

#[derive(Clone)]
struct AppState {
    config: Arc<ServerConfig>,
    db: Db,
}

#[derive(Deserialize)]
pub struct ListParams {
    pub ids: Option<String>,
}

/// JSON error body in the shape the Things API uses.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: &'static str,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, error: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            error,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "status": self.status.as_u16(),
            "error": self.error,
            "message": self.message,
        });
        let mut response = (self.status, Json(body)).into_response();
        if self.status == StatusCode::UNAUTHORIZED {
            if let Ok(value) = format!("Basic realm=\"{REALM}\"").parse() {
                response.headers_mut().insert(header::WWW_AUTHENTICATE, value);
            }
        }
        response
    }
}

pub fn app(config: ServerConfig) -> Router {
    let state = AppState {
        config: Arc::new(config),
        db: Arc::new(RwLock::new(HashMap::new())),
    };
    let things = Router::new()
        .route("/things", get(list_things).post(create_thing))
        .route("/things/{id}", delete(delete_thing))
        .route_layer(middleware::from_fn_with_state(state.clone(), authenticate))
        .with_state(state);
    Router::new().nest(BASE_PATH, things)
}

pub async fn run(listener: TcpListener, config: ServerConfig) -> Result<(), std::io::Error> {
    axum::serve(listener, app(config)).await
}

/// Token first (403 when wrong), then basic auth (401 challenge when absent
/// or wrong).
async fn authenticate(State(state): State<AppState>, request: Request, next: Next) -> Result<Response, ApiError> {
    let headers = request.headers();
    let token = headers.get(API_TOKEN_HEADER).and_then(|v| v.to_str().ok());
    if token != Some(state.config.api_token.as_str()) {
        tracing::debug!(uri = %request.uri(), "rejecting request without a valid api token");
        return Err(ApiError::new(
            StatusCode::FORBIDDEN,
            "things:token.invalid",
            "missing or invalid x-cr-api-token header",
        ));
    }
    match basic_credentials(headers) {
        Some((user, pass)) if user == state.config.username && pass == state.config.password => {
            Ok(next.run(request).await)
        }
        _ => Err(ApiError::new(
            StatusCode::UNAUTHORIZED,
            "things:unauthorized",
            "valid basic auth credentials required",
        )),
    }
}

/// Decode `Authorization: Basic <base64(user:pass)>`.
pub fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = String::from_utf8(STANDARD.decode(encoded.trim()).ok()?).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

async fn list_things(State(state): State<AppState>, Query(params): Query<ListParams>) -> Json<Vec<Value>> {
    let things = state.db.read().await;
    let ids: Vec<&str> = params
        .ids
        .as_deref()
        .unwrap_or("")
        .split(',')
        .filter(|id| !id.is_empty())
        .collect();
    if ids.is_empty() {
        return Json(things.values().cloned().collect());
    }
    Json(ids.iter().filter_map(|id| things.get(*id).cloned()).collect())
}

async fn create_thing(
    State(state): State<AppState>,
    Json(thing): Json<Value>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Value::Object(mut fields) = thing else {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "things:thing.invalid",
            "thing must be a JSON object",
        ));
    };
    let id = Uuid::new_v4().to_string();
    fields.insert("thingId".to_string(), Value::String(id.clone()));
    let thing = Value::Object(fields);
    state.db.write().await.insert(id.clone(), thing.clone());
    tracing::info!(thing_id = %id, "created thing");
    Ok((StatusCode::CREATED, Json(thing)))
}

async fn delete_thing(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode, ApiError> {
    let mut things = state.db.write().await;
    match things.remove(&id) {
        Some(_) => {
            tracing::info!(thing_id = %id, "deleted thing");
            Ok(StatusCode::NO_CONTENT)
        }
        None => Err(ApiError::new(
            StatusCode::NOT_FOUND,
            "things:thing.notfound",
            format!("thing {id} does not exist"),
        )),
    }
}

/// Sample thing with the same shape the demo posts.
pub fn sample_thing() -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert("attributes".to_string(), json!({"dimensions": {"width": 123, "height": 321}}));
    fields.insert("features".to_string(), json!({"dimensions": {"scalable": true}}));
    fields
}
