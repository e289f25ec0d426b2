use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tracing::info;

use crate::config::UpstreamConfig;
use crate::coordinator::LATEST;
use crate::error::UpstreamError;

/// Thin client for the third-party news API. Payloads are passed through
/// untouched; the browser-side coordinator does the normalizing.
pub struct UpstreamClient {
    client: Client,
    base_url: String,
    api_key: String,
    language: String,
    country: String,
}

impl UpstreamClient {
    pub fn new(config: &UpstreamConfig, api_key: impl Into<String>) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .user_agent("Newsdesk/1.0 (News Proxy)")
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            api_key: api_key.into(),
            language: config.language.clone(),
            country: config.country.clone(),
        })
    }

    /// Latest headlines, optionally narrowed to a category.
    pub async fn latest(
        &self,
        category: Option<&str>,
        page: Option<&str>,
    ) -> Result<Value, UpstreamError> {
        let mut params = self.regional_params();
        if let Some(category) = category.filter(|c| *c != LATEST) {
            params.push(("category", category.to_lowercase()));
        }
        if let Some(page) = page {
            params.push(("page", page.to_string()));
        }
        self.get(&params).await
    }

    /// Articles whose title matches `query`. Not restricted to a country.
    pub async fn search(&self, query: &str, page: Option<&str>) -> Result<Value, UpstreamError> {
        let mut params = self.base_params();
        params.push(("qInTitle", query.to_string()));
        if let Some(page) = page {
            params.push(("page", page.to_string()));
        }
        self.get(&params).await
    }

    pub async fn trending(&self) -> Result<Value, UpstreamError> {
        let mut params = self.regional_params();
        params.push(("category", "top".to_string()));
        self.get(&params).await
    }

    fn base_params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("apikey", self.api_key.clone()),
            ("language", self.language.clone()),
        ]
    }

    fn regional_params(&self) -> Vec<(&'static str, String)> {
        let mut params = self.base_params();
        params.push(("country", self.country.clone()));
        params
    }

    async fn get(&self, params: &[(&'static str, String)]) -> Result<Value, UpstreamError> {
        // Never log the key
        let visible: Vec<_> = params.iter().filter(|(name, _)| *name != "apikey").collect();
        info!("Making request to: {} {:?}", self.base_url, visible);

        let value = self
            .client
            .get(&self.base_url)
            .query(params)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> UpstreamClient {
        let config = UpstreamConfig {
            base_url: format!("{}/api/1/news", server.uri()),
            ..Default::default()
        };
        UpstreamClient::new(&config, "secret").unwrap()
    }

    #[tokio::test]
    async fn test_latest_sends_regional_params() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/1/news"))
            .and(query_param("apikey", "secret"))
            .and(query_param("language", "en"))
            .and(query_param("country", "in"))
            .and(query_param_is_missing("category"))
            .and(query_param_is_missing("page"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "success"})))
            .expect(1)
            .mount(&server)
            .await;

        let body = client_for(&server).latest(None, None).await.unwrap();
        assert_eq!(body["status"], "success");
    }

    #[tokio::test]
    async fn test_latest_lowercases_category_and_passes_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("category", "business"))
            .and(query_param("page", "tok123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "success"})))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server)
            .latest(Some("Business"), Some("tok123"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_latest_category_is_not_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param_is_missing("category"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "success"})))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server).latest(Some("latest"), None).await.unwrap();
    }

    #[tokio::test]
    async fn test_search_uses_title_query_without_country() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("qInTitle", "climate deal"))
            .and(query_param_is_missing("country"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "success"})))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server).search("climate deal", None).await.unwrap();
    }

    #[tokio::test]
    async fn test_trending_requests_top_category() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("category", "top"))
            .and(query_param("country", "in"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "success"})))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server).trending().await.unwrap();
    }

    #[tokio::test]
    async fn test_error_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"status": "error"})))
            .mount(&server)
            .await;

        assert!(client_for(&server).latest(None, None).await.is_err());
    }
}
