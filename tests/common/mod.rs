#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use serde_json::{json, Value};

use target_woocommerce::config::Config;

const API_PREFIX: &str = "/wp-json/wc/v3";

/// One request seen by the mock store, with the API prefix stripped from the path.
#[derive(Debug, Clone)]
pub struct Hit {
    pub method: String,
    pub path: String,
    pub query: HashMap<String, String>,
    pub body: Value,
}

impl Hit {
    pub fn is(&self, method: &str, path: &str) -> bool {
        self.method == method && self.path == path
    }

    pub fn q(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }
}

pub struct Reply {
    pub status: StatusCode,
    pub total_pages: Option<u32>,
    pub body: Value,
}

impl Reply {
    pub fn ok(body: Value) -> Self {
        Self { status: StatusCode::OK, total_pages: None, body }
    }

    pub fn created(body: Value) -> Self {
        Self { status: StatusCode::CREATED, total_pages: None, body }
    }

    pub fn page(body: Value, total_pages: u32) -> Self {
        Self { status: StatusCode::OK, total_pages: Some(total_pages), body }
    }

    pub fn error(status: StatusCode, message: &str) -> Self {
        Self { status, total_pages: None, body: json!({"code": "error", "message": message}) }
    }

    pub fn empty_list() -> Self {
        Self::page(json!([]), 1)
    }
}

type Responder = Arc<dyn Fn(&Hit) -> Reply + Send + Sync>;

#[derive(Clone)]
struct MockState {
    hits: Arc<Mutex<Vec<Hit>>>,
    responder: Responder,
}

async fn handle(State(state): State<MockState>, method: Method, uri: Uri, body: Bytes) -> Response {
    let query: HashMap<String, String> = url::form_urlencoded::parse(uri.query().unwrap_or("").as_bytes())
        .into_owned()
        .collect();
    let hit = Hit {
        method: method.as_str().to_string(),
        path: uri.path().trim_start_matches(API_PREFIX).to_string(),
        query,
        body: serde_json::from_slice(&body).unwrap_or(Value::Null),
    };
    state.hits.lock().unwrap().push(hit.clone());

    let reply = (state.responder)(&hit);
    let mut headers = HeaderMap::new();
    if let Some(total) = reply.total_pages {
        headers.insert("x-wp-totalpages", HeaderValue::from(total));
    }
    (reply.status, headers, axum::Json(reply.body)).into_response()
}

/// In-process stand-in for a WooCommerce store that records every request.
pub struct MockWoo {
    pub base: String,
    hits: Arc<Mutex<Vec<Hit>>>,
}

impl MockWoo {
    pub async fn start<F>(responder: F) -> Self
    where
        F: Fn(&Hit) -> Reply + Send + Sync + 'static,
    {
        let hits: Arc<Mutex<Vec<Hit>>> = Default::default();
        let state = MockState { hits: hits.clone(), responder: Arc::new(responder) };
        let app = Router::new().fallback(handle).with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        Self { base: format!("http://{}", addr), hits }
    }

    pub fn hits(&self) -> Vec<Hit> {
        self.hits.lock().unwrap().clone()
    }

    pub fn matching(&self, method: &str, path: &str) -> Vec<Hit> {
        self.hits().into_iter().filter(|h| h.is(method, path)).collect()
    }

    pub fn count(&self, method: &str, path: &str) -> usize {
        self.matching(method, path).len()
    }

    /// Config pointing at this server, with retries off so failures surface immediately.
    pub fn config(&self) -> Config {
        Config {
            site_url: self.base.clone(),
            consumer_key: "ck_test".into(),
            consumer_secret: "cs_test".into(),
            http_timeout_ms: 5_000,
            http_max_retries: 0,
            http_retry_backoff_ms: 1,
            ..Config::default()
        }
    }
}
