use reqwest::{Client, Method, Response};
use serde_json::Value;
use std::time::Duration;

use crate::config::Config;
use crate::models::*;

const TOTAL_PAGES_HEADER: &str = "X-WP-TotalPages";
const BODY_PREVIEW_LIMIT: usize = 2_000;

/// Parsed response of a successful (2xx) call.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub total_pages: Option<u32>,
    pub body: Value,
}

impl ApiResponse {
    pub fn id(&self) -> Option<i64> {
        self.body.get("id").and_then(|v| v.as_i64())
    }
}

#[derive(Clone)]
pub struct WooCommerceClient {
    client: Client,
    base_url: String,
    consumer_key: String,
    consumer_secret: String,
    max_retries: u32,
    base_backoff_ms: u64,
    page_size: u32,
}

impl WooCommerceClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(Duration::from_millis(cfg.http_timeout_ms))
            .connect_timeout(Duration::from_millis(cfg.http_timeout_ms.min(10_000)));
        if let Some(ua) = &cfg.user_agent {
            builder = builder.user_agent(ua.clone());
        }
        let client = builder.build()?;

        Ok(Self {
            client,
            base_url: cfg.api_base_url(),
            consumer_key: cfg.consumer_key.clone(),
            consumer_secret: cfg.consumer_secret.clone(),
            max_retries: cfg.http_max_retries,
            base_backoff_ms: cfg.http_retry_backoff_ms,
            page_size: cfg.page_size,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    /// Issue one API call with bounded exponential backoff on 429/5xx and transport errors.
    pub async fn request(
        &self,
        method: Method,
        endpoint: &str,
        params: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<ApiResponse> {
        let url = self.url(endpoint);
        let mut attempt: u32 = 0;
        loop {
            tracing::debug!(method = %method, url = %url, attempt = attempt + 1, "woocommerce: sending request");
            let mut rb = self
                .client
                .request(method.clone(), &url)
                .basic_auth(&self.consumer_key, Some(&self.consumer_secret))
                .header("Content-Type", "application/json")
                .header("Accept", "application/json");
            if !params.is_empty() {
                rb = rb.query(params);
            }
            if let Some(b) = body {
                rb = rb.json(b);
            }

            let result = match rb.send().await {
                Ok(response) => Self::read_response(response).await,
                Err(e) => Err(TargetError::Http(e)),
            };

            match result {
                Ok(resp) => return Ok(resp),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let backoff = self.base_backoff_ms.saturating_mul(1u64 << attempt.min(16));
                    tracing::warn!(method = %method, url = %url, error = %e, attempt = attempt + 1, backoff_ms = backoff, "woocommerce: transient error; retrying");
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn read_response(response: Response) -> Result<ApiResponse> {
        let status = response.status();
        let total_pages = response
            .headers()
            .get(TOTAL_PAGES_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u32>().ok());
        let text = response.text().await?;

        if !status.is_success() {
            return Err(TargetError::Api { status: status.as_u16(), body: truncate_body(&text) });
        }

        let body = if text.trim().is_empty() { Value::Null } else { serde_json::from_str(&text)? };
        Ok(ApiResponse { status: status.as_u16(), total_pages, body })
    }

    pub async fn get(&self, endpoint: &str, params: &[(&str, String)]) -> Result<ApiResponse> {
        self.request(Method::GET, endpoint, params, None).await
    }

    pub async fn post(&self, endpoint: &str, body: &Value) -> Result<ApiResponse> {
        self.request(Method::POST, endpoint, &[], Some(body)).await
    }

    pub async fn put(&self, endpoint: &str, body: &Value) -> Result<ApiResponse> {
        self.request(Method::PUT, endpoint, &[], Some(body)).await
    }

    /// Fetch every page of a listing endpoint.
    ///
    /// Stops on an empty or short page, or on the last page announced by `X-WP-TotalPages`. A
    /// failing page ends the fetch early and whatever was collected so far is returned; this
    /// never errors.
    pub async fn get_reference_data(
        &self,
        endpoint: &str,
        fields: Option<&[&str]>,
        filter: &[(&str, String)],
        fallback_url: Option<&str>,
    ) -> Vec<Value> {
        tracing::info!(endpoint = endpoint, "Getting reference data");
        let mut page: u32 = 1;
        let mut data: Vec<Value> = Vec::new();
        loop {
            let mut params: Vec<(&str, String)> = vec![
                ("per_page", self.page_size.to_string()),
                ("order", "asc".to_string()),
                ("page", page.to_string()),
            ];
            params.extend(filter.iter().cloned());

            let resp = match self.get(endpoint, &params).await {
                Ok(r) => r,
                Err(e) => {
                    tracing::error!(endpoint = endpoint, page = page, error = %e, collected = data.len(), "Reference page fetch failed; keeping records collected so far");
                    break;
                }
            };
            let items = match resp.body {
                Value::Array(items) => items,
                other => {
                    tracing::error!(endpoint = endpoint, page = page, body_type = %json_type(&other), "Reference page is not a JSON array; stopping");
                    break;
                }
            };
            let fetched = items.len();
            let items = match fields {
                Some(fields) => self
                    .get_if_missing_fields(items, fields, fallback_url)
                    .await
                    .into_iter()
                    .map(|item| project_fields(item, fields))
                    .collect(),
                None => items,
            };
            data.extend(items);

            if page % 10 == 0 {
                tracing::info!(endpoint = endpoint, page = page, fetched = data.len(), "Reference data progress");
            }

            // a short page ends paging even when the header promises more
            let more = fetched >= self.page_size as usize && resp.total_pages.map_or(true, |total| total > page);
            if !more {
                break;
            }
            page += 1;
        }
        tracing::info!(endpoint = endpoint, records = data.len(), "Reference data fetched");
        data
    }

    /// Re-fetch entries that lack any of `fields` from `<fallback_url><id>`.
    /// An entry whose re-fetch fails is kept as it was.
    pub async fn get_if_missing_fields(
        &self,
        response: Vec<Value>,
        fields: &[&str],
        fallback_url: Option<&str>,
    ) -> Vec<Value> {
        let Some(fallback) = fallback_url else { return response };

        let mut out = Vec::with_capacity(response.len());
        for item in response {
            let complete = fields.iter().all(|f| item.get(*f).is_some());
            let id = item.get("id").and_then(|v| v.as_i64());
            match (complete, id) {
                (false, Some(id)) => match self.get(&format!("{}{}", fallback, id), &[]).await {
                    Ok(resp) if resp.body.is_object() => out.push(resp.body),
                    Ok(_) => out.push(item),
                    Err(e) => {
                        tracing::warn!(endpoint = %fallback, id = id, error = %e, "Fallback fetch for missing fields failed; keeping partial entry");
                        out.push(item);
                    }
                },
                _ => out.push(item),
            }
        }
        out
    }
}

fn project_fields(item: Value, fields: &[&str]) -> Value {
    match item {
        Value::Object(map) => Value::Object(map.into_iter().filter(|(k, _)| fields.contains(&k.as_str())).collect()),
        other => other,
    }
}

fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn truncate_body(body: &str) -> String {
    if body.len() > BODY_PREVIEW_LIMIT {
        let mut cut = BODY_PREVIEW_LIMIT;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}…<truncated {} chars>", &body[..cut], body.len() - cut)
    } else {
        body.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn projection_keeps_only_requested_fields() {
        let v = project_fields(json!({"id": 1, "sku": "A", "price": "9"}), &["id", "sku"]);
        assert_eq!(v, json!({"id": 1, "sku": "A"}));
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "x".repeat(BODY_PREVIEW_LIMIT + 10);
        let out = truncate_body(&body);
        assert!(out.ends_with("<truncated 10 chars>"));
    }

    #[test]
    fn url_joins_relative_endpoints() {
        let cfg = Config {
            site_url: "https://shop.test/".into(),
            consumer_key: "ck".into(),
            consumer_secret: "cs".into(),
            ..Config::default()
        };
        let client = WooCommerceClient::new(&cfg).unwrap();
        assert_eq!(client.url("products/5"), "https://shop.test/wp-json/wc/v3/products/5");
        assert_eq!(client.url("/orders"), "https://shop.test/wp-json/wc/v3/orders");
    }
}
