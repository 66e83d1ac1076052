use crate::core::{RateRecord, RateSource};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, instrument};

/// Rate source backed by a JSON endpoint.
///
/// Accepts either a bare array of rates or an object with a `rates` array.
pub struct JsonRateSource {
    id: String,
    name: String,
    url: String,
    client: reqwest::Client,
}

impl JsonRateSource {
    pub fn new(id: &str, name: &str, url: &str, client: reqwest::Client) -> Self {
        JsonRateSource {
            id: id.to_string(),
            name: name.to_string(),
            url: url.to_string(),
            client,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RatesResponse {
    List(Vec<RateEntry>),
    Wrapped { rates: Vec<RateEntry> },
}

impl RatesResponse {
    fn into_entries(self) -> Vec<RateEntry> {
        match self {
            RatesResponse::List(entries) => entries,
            RatesResponse::Wrapped { rates } => rates,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RateEntry {
    product: String,
    #[serde(default, alias = "term")]
    term_months: Option<u32>,
    #[serde(alias = "interest_rate")]
    rate: f64,
}

#[async_trait]
impl RateSource for JsonRateSource {
    fn identifier(&self) -> &str {
        &self.id
    }

    fn display_name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "JsonRateFetch",
        skip(self),
        fields(source = %self.id)
    )]
    async fn fetch_rates(&self) -> Result<Vec<RateRecord>> {
        debug!("Requesting rates from {}", self.url);

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .with_context(|| format!("Request failed for source: {} URL: {}", self.id, self.url))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "HTTP error: {} for source: {}",
                response.status(),
                self.id
            ));
        }

        let response_text = response
            .text()
            .await
            .with_context(|| format!("Failed to get response text for source: {}", self.id))?;

        // Scraped pages come back blank now and then; let the caller retry
        if response_text.trim().is_empty() {
            debug!("Empty response body");
            return Ok(Vec::new());
        }

        let response: RatesResponse = serde_json::from_str(&response_text).with_context(|| {
            format!(
                "Failed to parse rates for source: {}. Response: '{response_text}'",
                self.id
            )
        })?;

        let fetched_at = Utc::now();
        let records: Vec<RateRecord> = response
            .into_entries()
            .into_iter()
            .filter(|entry| entry.rate.is_finite())
            .map(|entry| RateRecord {
                source_id: self.id.clone(),
                product: entry.product,
                term_months: entry.term_months,
                rate: entry.rate,
                fetched_at,
            })
            .collect();

        debug!(count = records.len(), "Parsed rate records");
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn create_mock_server(status: u16, body: &str) -> MockServer {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rates"))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&mock_server)
            .await;

        mock_server
    }

    fn source(server: &MockServer) -> JsonRateSource {
        JsonRateSource::new(
            "dbs",
            "DBS Bank",
            &format!("{}/rates", server.uri()),
            reqwest::Client::new(),
        )
    }

    const MOCK_LIST: &str = r#"[
        {"product": "Fixed Deposit", "term_months": 12, "rate": 3.1},
        {"product": "Savings", "rate": 0.05}
    ]"#;

    const MOCK_WRAPPED: &str = r#"{
        "bank": "DBS",
        "rates": [
            {"product": "Fixed Deposit", "term": 6, "interest_rate": 2.9}
        ]
    }"#;

    #[tokio::test]
    async fn test_fetch_list_payload() {
        let server = create_mock_server(200, MOCK_LIST).await;
        let source = source(&server);

        let records = source.fetch_rates().await.unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].source_id, "dbs");
        assert_eq!(records[0].product, "Fixed Deposit");
        assert_eq!(records[0].term_months, Some(12));
        assert_eq!(records[0].rate, 3.1);
        assert!(records[1].term_months.is_none());
        assert_eq!(source.identifier(), "dbs");
        assert_eq!(source.display_name(), "DBS Bank");
    }

    #[tokio::test]
    async fn test_fetch_wrapped_payload() {
        let server = create_mock_server(200, MOCK_WRAPPED).await;

        let records = source(&server).fetch_rates().await.unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].term_months, Some(6));
        assert_eq!(records[0].rate, 2.9);
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let server = create_mock_server(503, "maintenance").await;

        let err = source(&server).fetch_rates().await.unwrap_err();

        assert!(err.to_string().contains("HTTP error: 503"));
    }

    #[tokio::test]
    async fn test_empty_body_yields_no_records() {
        let server = create_mock_server(200, "  ").await;

        let records = source(&server).fetch_rates().await.unwrap();

        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let server = create_mock_server(200, "<html>blocked</html>").await;

        let err = source(&server).fetch_rates().await.unwrap_err();

        assert!(err.to_string().contains("Failed to parse rates for source: dbs"));
    }
}
