use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ClassifierConfig;
use crate::error::{Result, ScrapingError};

/// Yes/no relevance check for a single snippet. Fail-closed: any failure is `false`.
#[async_trait]
pub trait RelevanceCheck: Send + Sync {
    async fn check_relevance(&self, text: &str) -> bool;
}

#[derive(Serialize)]
struct RelevanceRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct RelevanceResponse {
    #[serde(default)]
    relevant: bool,
}

/// HTTP client for the classifier's `POST /api/is_relevant` endpoint.
pub struct ClassifierClient {
    client: Client,
    endpoint: String,
}

impl ClassifierClient {
    pub fn new(config: &ClassifierConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ScrapingError::NetworkError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!("{}/api/is_relevant", config.url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn classify(&self, text: &str) -> Result<bool> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&RelevanceRequest { text })
            .send()
            .await
            .map_err(ScrapingError::from)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ScrapingError::ClassificationError(format!("classifier returned {}: {}", status, body)).into());
        }

        let parsed: RelevanceResponse = response.json().await.map_err(ScrapingError::from)?;
        Ok(parsed.relevant)
    }
}

#[async_trait]
impl RelevanceCheck for ClassifierClient {
    async fn check_relevance(&self, text: &str) -> bool {
        match self.classify(text).await {
            Ok(relevant) => {
                debug!("Classifier verdict {} for {:?}", relevant, text);
                relevant
            }
            Err(e) => {
                warn!("Relevance check failed, treating as not relevant: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::post, Json, Router};
    use std::time::Duration;

    async fn spawn_classifier(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn client_for(url: String) -> ClassifierClient {
        ClassifierClient::new(&ClassifierConfig {
            url,
            timeout: Duration::from_secs(2),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_relevant_verdict_is_parsed() {
        let app = Router::new().route(
            "/api/is_relevant",
            post(|Json(body): Json<serde_json::Value>| async move {
                let text = body["text"].as_str().unwrap_or_default().to_string();
                Json(serde_json::json!({ "relevant": text.contains("flood") }))
            }),
        );
        let client = client_for(spawn_classifier(app).await);

        assert!(client.check_relevance("flood warning issued").await);
        assert!(!client.check_relevance("nice weather").await);
    }

    #[tokio::test]
    async fn test_error_status_fails_closed() {
        let app = Router::new().route(
            "/api/is_relevant",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );
        let client = client_for(spawn_classifier(app).await);

        assert!(!client.check_relevance("flood").await);
    }

    #[tokio::test]
    async fn test_unreachable_classifier_fails_closed() {
        // bind then drop to get a port nobody listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = client_for(format!("http://{}", addr));
        assert!(!client.check_relevance("flood").await);
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let client = client_for("http://localhost:8000/".to_string());
        assert_eq!(client.endpoint(), "http://localhost:8000/api/is_relevant");
    }
}
