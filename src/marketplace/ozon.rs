//! Ozon Seller API client.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{Error, UpstreamError, ValidationError};
use crate::model::{FetchedReview, Marketplace};

use super::MarketplaceClient;

const BASE_URL: &str = "https://api-seller.ozon.ru";

/// Fixed inter-request delay.
const RATE_LIMIT_DELAY: Duration = Duration::from_millis(200);

/// Timeout for a single API request.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Reviews fetched per page.
const PAGE_SIZE: usize = 100;

/// Platform bounds for reply text, in characters.
const REPLY_MIN_CHARS: usize = 1;
const REPLY_MAX_CHARS: usize = 3000;

/// Client for the Ozon product review API.
pub struct OzonClient {
    http: reqwest::Client,
    base_url: String,
    client_id: String,
    api_key: SecretString,
}

impl OzonClient {
    pub fn new(client_id: impl Into<String>, api_key: SecretString) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: BASE_URL.to_string(),
            client_id: client_id.into(),
            api_key,
        }
    }

    /// Override the base URL (tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn rate_limit(&self) {
        tokio::time::sleep(RATE_LIMIT_DELAY).await;
    }

    async fn post_json(&self, path: &str, payload: &Value) -> Result<Value, UpstreamError> {
        self.rate_limit().await;

        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .timeout(HTTP_TIMEOUT)
            .header("Client-Id", &self.client_id)
            .header("Api-Key", self.api_key.expose_secret())
            .json(payload)
            .send()
            .await
            .map_err(|e| UpstreamError::Request {
                marketplace: Marketplace::Ozon.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                marketplace: Marketplace::Ozon.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        response.json().await.map_err(|e| UpstreamError::Malformed {
            marketplace: Marketplace::Ozon.to_string(),
            reason: e.to_string(),
        })
    }

    async fn fetch_page(&self, limit: usize, offset: usize) -> Result<Vec<Value>, UpstreamError> {
        let payload = serde_json::json!({
            "limit": limit,
            "offset": offset,
            "with_answer": false,
        });
        let data = self.post_json("/v1/product/review/list", &payload).await?;

        data.pointer("/result/reviews")
            .and_then(Value::as_array)
            .cloned()
            .ok_or_else(|| UpstreamError::Malformed {
                marketplace: Marketplace::Ozon.to_string(),
                reason: "missing result.reviews array".to_string(),
            })
    }
}

#[async_trait]
impl MarketplaceClient for OzonClient {
    fn marketplace(&self) -> Marketplace {
        Marketplace::Ozon
    }

    async fn fetch_unanswered(&self) -> Result<Vec<FetchedReview>, UpstreamError> {
        let mut reviews = Vec::new();
        let mut offset = 0;

        loop {
            let page = self.fetch_page(PAGE_SIZE, offset).await?;
            let page_len = page.len();

            for raw in &page {
                match parse_review(raw) {
                    Ok(review) => reviews.push(review),
                    Err(e) => warn!(error = %e, "Skipping unparseable Ozon review"),
                }
            }

            if page_len < PAGE_SIZE {
                break;
            }
            offset += PAGE_SIZE;
        }

        info!(count = reviews.len(), "Fetched Ozon reviews");
        Ok(reviews)
    }

    async fn submit_reply(&self, external_id: &str, text: &str) -> Result<(), Error> {
        let length = text.chars().count();
        if !(REPLY_MIN_CHARS..=REPLY_MAX_CHARS).contains(&length) {
            return Err(ValidationError::ReplyLength {
                marketplace: Marketplace::Ozon.to_string(),
                length,
                min: REPLY_MIN_CHARS,
                max: REPLY_MAX_CHARS,
            }
            .into());
        }

        // Ozon addresses reviews by numeric id on the wire.
        let review_id: i64 =
            external_id
                .parse()
                .map_err(|_| ValidationError::InvalidExternalId {
                    marketplace: Marketplace::Ozon.to_string(),
                    value: external_id.to_string(),
                })?;

        let payload = serde_json::json!({ "review_id": review_id, "text": text });
        self.post_json("/v1/product/review/answer", &payload).await?;

        info!(review_id = external_id, "Ozon reply submitted");
        Ok(())
    }

    async fn check_connection(&self) -> bool {
        match self.fetch_page(1, 0).await {
            Ok(_) => true,
            Err(e) => {
                debug!(error = %e, "Ozon connection check failed");
                false
            }
        }
    }
}

/// Normalize one raw review into the canonical review shape.
pub(crate) fn parse_review(raw: &Value) -> Result<FetchedReview, UpstreamError> {
    let malformed = |reason: &str| UpstreamError::Malformed {
        marketplace: Marketplace::Ozon.to_string(),
        reason: reason.to_string(),
    };

    let external_id = match raw.get("id") {
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        _ => return Err(malformed("review without id")),
    };

    let rating = raw
        .get("rating")
        .and_then(Value::as_u64)
        .filter(|r| (1..=5).contains(r))
        .ok_or_else(|| malformed("rating outside 1-5"))? as u8;

    Ok(FetchedReview {
        external_id,
        rating,
        text: raw
            .get("text")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(String::from),
        product_name: raw
            .get("product_name")
            .and_then(Value::as_str)
            .map(String::from),
        product_id: raw.get("product_id").map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }),
        customer_name: raw
            .pointer("/user/name")
            .and_then(Value::as_str)
            .filter(|n| !n.is_empty())
            .map(String::from),
        marketplace_created_at: raw
            .get("created_at")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc)),
    })
}
