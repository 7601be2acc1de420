//! Axum server that answers with BSON documents, for exercising request
//! operations over real HTTP.

use std::{sync::Arc, time::Duration};

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use bson::{doc, Document};
use tokio::{net::TcpListener, sync::RwLock};

pub const BSON_CONTENT_TYPE: &str = "application/bson";

/// Delay applied by `GET /slow`.
pub const SLOW_DELAY: Duration = Duration::from_millis(300);

pub type Db = Arc<RwLock<Vec<i32>>>;

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(vec![1, 2, 3]));
    Router::new()
        .route("/items", get(list_items).post(create_item))
        .route("/items/{index}", get(get_item))
        .route("/error", get(internal_error))
        .route("/garbage", get(garbage))
        .route("/json", get(json_items))
        .route("/slow", get(slow))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

/// Encode `document` as a BSON response body.
pub fn bson_response(status: StatusCode, document: &Document) -> Response {
    let mut body = Vec::new();
    if let Err(err) = document.to_writer(&mut body) {
        tracing::error!(%err, "failed to encode response document");
        return (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response();
    }
    (status, [(header::CONTENT_TYPE, BSON_CONTENT_TYPE)], body).into_response()
}

async fn list_items(State(db): State<Db>) -> Response {
    let items = db.read().await;
    bson_response(StatusCode::OK, &doc! { "items": items.clone() })
}

async fn get_item(State(db): State<Db>, Path(index): Path<usize>) -> Response {
    let items = db.read().await;
    match items.get(index) {
        Some(value) => bson_response(StatusCode::OK, &doc! { "item": *value }),
        None => bson_response(StatusCode::NOT_FOUND, &doc! { "error": "not found" }),
    }
}

async fn create_item(State(db): State<Db>, body: Bytes) -> Response {
    let parsed = bson::RawDocument::from_bytes(&body).and_then(Document::try_from);
    let value = match parsed {
        Ok(document) => match document.get_i32("value") {
            Ok(value) => value,
            Err(err) => {
                return bson_response(StatusCode::BAD_REQUEST, &doc! { "error": err.to_string() });
            }
        },
        Err(err) => {
            return bson_response(StatusCode::BAD_REQUEST, &doc! { "error": err.to_string() });
        }
    };
    let mut items = db.write().await;
    items.push(value);
    let index = (items.len() - 1) as i64;
    bson_response(StatusCode::CREATED, &doc! { "index": index, "value": value })
}

async fn internal_error() -> Response {
    bson_response(StatusCode::INTERNAL_SERVER_ERROR, &doc! { "error": "internal" })
}

/// Claims to be BSON but is not.
async fn garbage() -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, BSON_CONTENT_TYPE)],
        b"\x40\x00\x00\x00not bson at all".to_vec(),
    )
        .into_response()
}

async fn json_items(State(db): State<Db>) -> Json<serde_json::Value> {
    let items = db.read().await;
    Json(serde_json::json!({ "items": *items }))
}

async fn slow() -> Response {
    tokio::time::sleep(SLOW_DELAY).await;
    bson_response(StatusCode::OK, &doc! { "slow": true })
}
