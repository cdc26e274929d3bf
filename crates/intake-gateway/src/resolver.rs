// SPDX-License-Identifier: MIT OR Apache-2.0
//! HTTP-backed project resolver.
//!
//! POSTs `{query, limit}` to the configured search path and normalises the
//! response into scored candidates. Transport failures, non-200 responses,
//! and malformed bodies all degrade to an empty candidate list — the
//! normaliser then opens a free-text clarification instead of failing the
//! ingest.

use async_trait::async_trait;
use intake_core::Candidate;
use intake_normalize::ProjectResolver;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

const SEARCH_LIMIT: u32 = 5;

/// Resolver backed by an external project search API.
pub struct HttpProjectResolver {
    client: reqwest::Client,
    base_url: String,
    bearer_token: Option<String>,
    search_path: String,
}

impl HttpProjectResolver {
    /// Build a resolver. `base_url` may carry a trailing slash.
    pub fn new(
        base_url: impl Into<String>,
        bearer_token: Option<String>,
        search_path: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bearer_token,
            search_path: search_path.into(),
        })
    }
}

#[async_trait]
impl ProjectResolver for HttpProjectResolver {
    async fn resolve(&self, selector: &str) -> Vec<Candidate> {
        let url = format!("{}{}", self.base_url, self.search_path);
        let mut request = self
            .client
            .post(&url)
            .json(&serde_json::json!({"query": selector, "limit": SEARCH_LIMIT}));
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                debug!(error = %err, "project search request failed");
                return Vec::new();
            }
        };
        if response.status() != reqwest::StatusCode::OK {
            debug!(status = response.status().as_u16(), "project search non-200");
            return Vec::new();
        }
        let body: Value = match response.json().await {
            Ok(body) => body,
            Err(_) => return Vec::new(),
        };

        let raw = body
            .get("results")
            .or_else(|| body.get("candidates"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        raw.iter().filter_map(candidate_from_value).collect()
    }
}

/// Normalise one search hit. `confidence` stands in for a missing `score`;
/// a missing label falls back to the id. Hits without an id are dropped.
fn candidate_from_value(value: &Value) -> Option<Candidate> {
    let object = value.as_object()?;
    let id = object.get("id").and_then(Value::as_str)?.to_string();
    let label = object
        .get("label")
        .or_else(|| object.get("name"))
        .and_then(Value::as_str)
        .unwrap_or(&id)
        .to_string();
    let score = object
        .get("score")
        .or_else(|| object.get("confidence"))
        .and_then(Value::as_f64);
    let meta = object.get("meta").cloned();
    Some(Candidate {
        id,
        label,
        score,
        meta,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn resolver(uri: &str) -> HttpProjectResolver {
        HttpProjectResolver::new(
            uri,
            Some("ctx-token".into()),
            "/v1/projects/search",
            Duration::from_secs(1),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn parses_results_with_scores() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/projects/search"))
            .and(body_partial_json(json!({"query": "ops", "limit": 5})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    {"id": "proj_1", "label": "Operations", "score": 0.97},
                    {"id": "proj_2", "name": "Ops Archive", "confidence": 0.41},
                    {"label": "no id, dropped"},
                    "not an object"
                ]
            })))
            .mount(&server)
            .await;

        let candidates = resolver(&server.uri()).resolve("ops").await;
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].label, "Operations");
        assert_eq!(candidates[0].score, Some(0.97));
        // `confidence` maps to score and `name` to label.
        assert_eq!(candidates[1].label, "Ops Archive");
        assert_eq!(candidates[1].score, Some(0.41));
    }

    #[tokio::test]
    async fn candidates_key_is_accepted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/projects/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"id": "proj_9"}]
            })))
            .mount(&server)
            .await;

        let candidates = resolver(&server.uri()).resolve("x").await;
        assert_eq!(candidates.len(), 1);
        // Label falls back to the id.
        assert_eq!(candidates[0].label, "proj_9");
    }

    #[tokio::test]
    async fn non_200_degrades_to_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/projects/search"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        assert!(resolver(&server.uri()).resolve("x").await.is_empty());
    }

    #[tokio::test]
    async fn malformed_body_degrades_to_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/projects/search"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;
        assert!(resolver(&server.uri()).resolve("x").await.is_empty());
    }

    #[tokio::test]
    async fn unreachable_backend_degrades_to_empty() {
        let resolver = HttpProjectResolver::new(
            "http://127.0.0.1:9",
            None,
            "/v1/projects/search",
            Duration::from_millis(200),
        )
        .unwrap();
        assert!(resolver.resolve("x").await.is_empty());
    }
}
