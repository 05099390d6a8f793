use super::util::with_retry;
use crate::core::error::FinanceError;
use crate::core::ports::RateProvider;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, error, instrument};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for an ExchangeRate-API compatible `latest` endpoint.
pub struct ExchangeRateApiProvider {
    base_url: String,
    api_key: String,
}

impl ExchangeRateApiProvider {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        ExchangeRateApiProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LatestRatesResponse {
    result: String,
    #[serde(default)]
    conversion_rates: HashMap<String, f64>,
    #[serde(rename = "error-type")]
    error_type: Option<String>,
}

#[async_trait]
impl RateProvider for ExchangeRateApiProvider {
    #[instrument(name = "ExchangeRateFetch", skip(self), fields(base = %base))]
    async fn latest(&self, base: &str) -> Result<HashMap<String, f64>, FinanceError> {
        let url = format!("{}/v6/{}/latest/{}", self.base_url, self.api_key, base);
        debug!("Requesting latest rates for {}", base);

        let client = reqwest::Client::builder()
            .user_agent("famfin/0.1")
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| FinanceError::Network(e.to_string()))?;

        let response = with_retry(|| client.get(&url).send(), 3, 500)
            .await
            .map_err(|e| FinanceError::Network(format!("Request error: {e} for base: {base}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| FinanceError::Network(e.to_string()))?;

        let data: LatestRatesResponse = match serde_json::from_str(&text) {
            Ok(data) => data,
            Err(e) if status.is_success() => {
                error!(error = ?e, response = %text, "Failed to parse rates response");
                return Err(FinanceError::Api(format!(
                    "Failed to parse rates response for {base}: {e}"
                )));
            }
            Err(_) => {
                return Err(FinanceError::Api(format!("HTTP error: {status} for base: {base}")));
            }
        };

        if !status.is_success() || data.result != "success" {
            let reason = data.error_type.unwrap_or_else(|| status.to_string());
            return Err(FinanceError::Api(format!(
                "Rate lookup failed for {base}: {reason}"
            )));
        }

        if data.conversion_rates.is_empty() {
            return Err(FinanceError::Api(format!("No rates returned for base: {base}")));
        }

        Ok(data.conversion_rates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub async fn create_mock_server(status: u16, mock_response: &str) -> MockServer {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v6/test-key/latest/EUR"))
            .respond_with(ResponseTemplate::new(status).set_body_string(mock_response))
            .mount(&mock_server)
            .await;
        mock_server
    }

    #[tokio::test]
    async fn test_successful_rate_fetch() {
        let mock_response = r#"{
            "result": "success",
            "base_code": "EUR",
            "conversion_rates": {"EUR": 1, "USD": 1.0842, "GBP": 0.8451}
        }"#;
        let mock_server = create_mock_server(200, mock_response).await;

        let provider = ExchangeRateApiProvider::new(&mock_server.uri(), "test-key");
        let rates = provider.latest("EUR").await.unwrap();
        assert_eq!(rates.get("USD"), Some(&1.0842));
        assert_eq!(rates.get("EUR"), Some(&1.0));
    }

    #[tokio::test]
    async fn test_api_error_result() {
        let mock_response = r#"{"result": "error", "error-type": "invalid-key"}"#;
        let mock_server = create_mock_server(200, mock_response).await;

        let provider = ExchangeRateApiProvider::new(&mock_server.uri(), "test-key");
        let result = provider.latest("EUR").await;
        assert_eq!(
            result.unwrap_err(),
            FinanceError::Api("Rate lookup failed for EUR: invalid-key".to_string())
        );
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let mock_server = create_mock_server(500, "").await;

        let provider = ExchangeRateApiProvider::new(&mock_server.uri(), "test-key");
        let result = provider.latest("EUR").await;
        assert_eq!(
            result.unwrap_err(),
            FinanceError::Api("HTTP error: 500 Internal Server Error for base: EUR".to_string())
        );
    }

    #[tokio::test]
    async fn test_malformed_response() {
        let mock_response = r#"{"rates": {"USD": 1.1}}"#;
        let mock_server = create_mock_server(200, mock_response).await;

        let provider = ExchangeRateApiProvider::new(&mock_server.uri(), "test-key");
        let result = provider.latest("EUR").await;
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to parse rates response for EUR")
        );
    }

    #[tokio::test]
    async fn test_unreachable_service_is_network_error() {
        // Nothing listens on port 9 of localhost.
        let provider = ExchangeRateApiProvider::new("http://127.0.0.1:9", "test-key");
        let result = provider.latest("EUR").await;
        assert!(matches!(result, Err(FinanceError::Network(_))));
    }
}
