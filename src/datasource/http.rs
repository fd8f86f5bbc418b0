//! HTTP trade plan provider.
//!
//! `GET {base_url}/trade-plan/{symbol}` returning the plan as JSON, either as
//! the top-level object or wrapped in `{"tradePlan": {...}}`.

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::plan::TradePlan;
use super::provider::{ProviderError, TradePlanProvider};
use crate::config::ProviderConfig;

const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Trade plan provider backed by an HTTP API
#[derive(Debug, Clone)]
pub struct HttpTradePlanProvider {
    client: reqwest::Client,
    base_url: Url,
    api_key: Option<String>,
}

impl HttpTradePlanProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("trade-plan-cache/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProviderError::Other(format!("failed to build HTTP client: {}", e)))?;

        let base_url = Url::parse(config.base_url.trim_end_matches('/')).map_err(|e| {
            ProviderError::Other(format!("invalid base URL {}: {}", config.base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ProviderError::Other(format!(
                "base URL cannot carry a path: {}",
                config.base_url
            )));
        }

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key.clone(),
        })
    }

    /// Symbol is pushed as a single escaped path segment
    fn plan_url(&self, symbol: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("trade-plan").push(symbol);
        }
        url
    }
}

#[async_trait]
impl TradePlanProvider for HttpTradePlanProvider {
    fn name(&self) -> &str {
        "http"
    }

    async fn generate(&self, symbol: &str) -> Result<TradePlan, ProviderError> {
        let url = self.plan_url(symbol);
        debug!(symbol = %symbol, url = %url, "Requesting trade plan");

        let mut request = self.client.get(url);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ProviderError::SymbolNotFound {
                symbol: symbol.to_string(),
            });
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            return Err(ProviderError::RateLimited { retry_after_secs });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http {
                status: status.as_u16(),
                message: message.chars().take(200).collect(),
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let payload = match body {
            Value::Object(mut map) => match map.remove("tradePlan") {
                Some(inner @ Value::Object(_)) => inner,
                Some(other) => {
                    return Err(ProviderError::InvalidResponse(format!(
                        "tradePlan is not an object: {}",
                        other
                    )))
                }
                None => Value::Object(map),
            },
            other => {
                return Err(ProviderError::InvalidResponse(format!(
                    "expected a JSON object, got {}",
                    other
                )))
            }
        };

        Ok(TradePlan::new(symbol, payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(server: &MockServer, api_key: Option<&str>) -> HttpTradePlanProvider {
        HttpTradePlanProvider::new(&ProviderConfig {
            base_url: format!("{}/", server.uri()),
            api_key: api_key.map(String::from),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_generate_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/trade-plan/AAPL"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "tradePlan": {"bias": "long", "currentPrice": 189.5}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider_for(&server, Some("secret"));
        let plan = provider.generate("AAPL").await.unwrap();

        assert_eq!(plan.symbol, "AAPL");
        assert_eq!(plan.payload["bias"], "long");
        assert_eq!(plan.reference_price, Some(dec!(189.5)));
    }

    #[tokio::test]
    async fn test_generate_unwrapped_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/trade-plan/MSFT"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"bias": "short"})),
            )
            .mount(&server)
            .await;

        let plan = provider_for(&server, None).generate("MSFT").await.unwrap();
        assert_eq!(plan.payload["bias"], "short");
    }

    #[tokio::test]
    async fn test_symbol_is_escaped_as_one_path_segment() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/trade-plan/BRK%2FB%3Fx=1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"bias": "flat"})))
            .expect(1)
            .mount(&server)
            .await;

        let plan = provider_for(&server, None).generate("BRK/B?x=1").await.unwrap();
        assert_eq!(plan.payload["bias"], "flat");
    }

    #[test]
    fn test_base_url_path_is_kept() {
        let provider = HttpTradePlanProvider::new(&ProviderConfig {
            base_url: "https://plans.example.com/api/".to_string(),
            api_key: None,
            timeout_secs: 5,
        })
        .unwrap();

        assert_eq!(
            provider.plan_url("AAPL").as_str(),
            "https://plans.example.com/api/trade-plan/AAPL"
        );
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        let result = HttpTradePlanProvider::new(&ProviderConfig {
            base_url: "not a url".to_string(),
            api_key: None,
            timeout_secs: 5,
        });
        assert!(matches!(result, Err(ProviderError::Other(_))));
    }

    #[tokio::test]
    async fn test_not_found_maps_to_symbol_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/trade-plan/ZZZZ"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = provider_for(&server, None).generate("ZZZZ").await.unwrap_err();
        assert!(matches!(err, ProviderError::SymbolNotFound { ref symbol } if symbol == "ZZZZ"));
    }

    #[tokio::test]
    async fn test_rate_limit_reads_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/trade-plan/AAPL"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "12"))
            .mount(&server)
            .await;

        let err = provider_for(&server, None).generate("AAPL").await.unwrap_err();
        assert!(matches!(err, ProviderError::RateLimited { retry_after_secs: 12 }));
    }

    #[tokio::test]
    async fn test_server_error_maps_to_http() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/trade-plan/AAPL"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let err = provider_for(&server, None).generate("AAPL").await.unwrap_err();
        assert!(matches!(err, ProviderError::Http { status: 503, ref message } if message == "maintenance"));
    }

    #[tokio::test]
    async fn test_non_object_body_is_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/trade-plan/AAPL"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([1, 2])))
            .mount(&server)
            .await;

        let err = provider_for(&server, None).generate("AAPL").await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(_)));
    }
}
