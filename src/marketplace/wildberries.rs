//! Wildberries Seller API client.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{Error, UpstreamError, ValidationError};
use crate::model::{FetchedReview, Marketplace};

use super::MarketplaceClient;

const BASE_URL: &str = "https://feedbacks-api.wildberries.ru/api/v1";

/// 3 requests per second allowed — stay just under with a fixed delay.
const RATE_LIMIT_DELAY: Duration = Duration::from_millis(340);

/// Timeout for a single API request.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Feedbacks fetched per page.
const PAGE_SIZE: usize = 5000;

/// Platform bounds for reply text, in characters.
const REPLY_MIN_CHARS: usize = 2;
const REPLY_MAX_CHARS: usize = 5000;

/// Client for the Wildberries feedbacks API.
pub struct WildberriesClient {
    http: reqwest::Client,
    base_url: String,
    api_key: SecretString,
}

impl WildberriesClient {
    pub fn new(api_key: SecretString) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: BASE_URL.to_string(),
            api_key,
        }
    }

    /// Override the base URL (tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Cooperative per-instance rate limit, applied before every request.
    async fn rate_limit(&self) {
        tokio::time::sleep(RATE_LIMIT_DELAY).await;
    }

    async fn fetch_page(&self, take: usize, skip: usize) -> Result<Vec<Value>, UpstreamError> {
        self.rate_limit().await;

        let response = self
            .http
            .get(format!("{}/feedbacks", self.base_url))
            .timeout(HTTP_TIMEOUT)
            .header("Authorization", self.api_key.expose_secret())
            .query(&[
                ("isAnswered", "false".to_string()),
                ("take", take.to_string()),
                ("skip", skip.to_string()),
            ])
            .send()
            .await
            .map_err(|e| UpstreamError::Request {
                marketplace: Marketplace::Wildberries.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                marketplace: Marketplace::Wildberries.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let data: Value = response.json().await.map_err(|e| UpstreamError::Malformed {
            marketplace: Marketplace::Wildberries.to_string(),
            reason: e.to_string(),
        })?;

        data.pointer("/data/feedbacks")
            .and_then(Value::as_array)
            .cloned()
            .ok_or_else(|| UpstreamError::Malformed {
                marketplace: Marketplace::Wildberries.to_string(),
                reason: "missing data.feedbacks array".to_string(),
            })
    }
}

#[async_trait]
impl MarketplaceClient for WildberriesClient {
    fn marketplace(&self) -> Marketplace {
        Marketplace::Wildberries
    }

    async fn fetch_unanswered(&self) -> Result<Vec<FetchedReview>, UpstreamError> {
        let mut reviews = Vec::new();
        let mut skip = 0;

        loop {
            let page = self.fetch_page(PAGE_SIZE, skip).await?;
            let page_len = page.len();

            for raw in &page {
                match parse_feedback(raw) {
                    Ok(review) => reviews.push(review),
                    Err(e) => warn!(error = %e, "Skipping unparseable Wildberries feedback"),
                }
            }

            if page_len < PAGE_SIZE {
                break;
            }
            skip += PAGE_SIZE;
        }

        info!(count = reviews.len(), "Fetched Wildberries feedbacks");
        Ok(reviews)
    }

    async fn submit_reply(&self, external_id: &str, text: &str) -> Result<(), Error> {
        let length = text.chars().count();
        if !(REPLY_MIN_CHARS..=REPLY_MAX_CHARS).contains(&length) {
            return Err(ValidationError::ReplyLength {
                marketplace: Marketplace::Wildberries.to_string(),
                length,
                min: REPLY_MIN_CHARS,
                max: REPLY_MAX_CHARS,
            }
            .into());
        }

        self.rate_limit().await;

        let payload = serde_json::json!({ "id": external_id, "text": text });
        let response = self
            .http
            .post(format!("{}/feedbacks/answer", self.base_url))
            .timeout(HTTP_TIMEOUT)
            .header("Authorization", self.api_key.expose_secret())
            .json(&payload)
            .send()
            .await
            .map_err(|e| UpstreamError::Request {
                marketplace: Marketplace::Wildberries.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                marketplace: Marketplace::Wildberries.to_string(),
                status: status.as_u16(),
                body,
            }
            .into());
        }

        info!(feedback_id = external_id, "Wildberries reply submitted");
        Ok(())
    }

    async fn check_connection(&self) -> bool {
        match self.fetch_page(1, 0).await {
            Ok(_) => true,
            Err(e) => {
                debug!(error = %e, "Wildberries connection check failed");
                false
            }
        }
    }
}

/// Normalize one raw feedback into the canonical review shape.
///
/// A record without a usable id or a rating in 1–5 fails individually —
/// the caller skips it without aborting the batch.
pub(crate) fn parse_feedback(raw: &Value) -> Result<FetchedReview, UpstreamError> {
    let malformed = |reason: &str| UpstreamError::Malformed {
        marketplace: Marketplace::Wildberries.to_string(),
        reason: reason.to_string(),
    };

    let external_id = raw
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| malformed("feedback without id"))?
        .to_string();

    let rating = raw
        .get("productValuation")
        .and_then(Value::as_u64)
        .filter(|r| (1..=5).contains(r))
        .ok_or_else(|| malformed("productValuation outside 1-5"))? as u8;

    Ok(FetchedReview {
        external_id,
        rating,
        text: raw
            .get("text")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(String::from),
        product_name: raw
            .pointer("/productDetails/productName")
            .and_then(Value::as_str)
            .map(String::from),
        product_id: raw
            .pointer("/productDetails/nmId")
            .map(json_id_to_string),
        customer_name: raw
            .get("userName")
            .and_then(Value::as_str)
            .filter(|n| !n.is_empty())
            .map(String::from),
        marketplace_created_at: raw
            .get("createdDate")
            .and_then(Value::as_str)
            .and_then(parse_timestamp),
    })
}

/// Provider ids arrive as numbers or strings depending on the endpoint.
fn json_id_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_feedback() -> Value {
        serde_json::json!({
            "id": "fb-100",
            "productValuation": 5,
            "text": "Спасибо огромное",
            "productDetails": {"productName": "Чайник", "nmId": 123456},
            "userName": "Анна",
            "createdDate": "2024-03-01T10:30:00Z",
            "answer": null
        })
    }

    #[test]
    fn parse_feedback_normalizes_fields() {
        let review = parse_feedback(&raw_feedback()).unwrap();
        assert_eq!(review.external_id, "fb-100");
        assert_eq!(review.rating, 5);
        assert_eq!(review.text.as_deref(), Some("Спасибо огромное"));
        assert_eq!(review.product_name.as_deref(), Some("Чайник"));
        assert_eq!(review.product_id.as_deref(), Some("123456"));
        assert_eq!(review.customer_name.as_deref(), Some("Анна"));
        assert!(review.marketplace_created_at.is_some());
    }

    #[test]
    fn parse_feedback_rejects_missing_id() {
        let mut raw = raw_feedback();
        raw.as_object_mut().unwrap().remove("id");
        assert!(parse_feedback(&raw).is_err());
    }

    #[test]
    fn parse_feedback_rejects_invalid_rating() {
        let mut raw = raw_feedback();
        raw["productValuation"] = serde_json::json!(0);
        assert!(parse_feedback(&raw).is_err());
        raw["productValuation"] = serde_json::json!(6);
        assert!(parse_feedback(&raw).is_err());
    }

    #[test]
    fn parse_feedback_tolerates_missing_optionals() {
        let raw = serde_json::json!({"id": "fb-1", "productValuation": 3});
        let review = parse_feedback(&raw).unwrap();
        assert!(review.text.is_none());
        assert!(review.product_name.is_none());
        assert!(review.customer_name.is_none());
        assert!(review.marketplace_created_at.is_none());
    }

    #[test]
    fn parse_feedback_treats_empty_text_as_none() {
        let mut raw = raw_feedback();
        raw["text"] = serde_json::json!("");
        let review = parse_feedback(&raw).unwrap();
        assert!(review.text.is_none());
    }

    #[tokio::test]
    async fn submit_reply_validates_length_before_network() {
        // Unroutable base URL: a validation failure must surface before
        // any connection attempt is made.
        let client = WildberriesClient::new(SecretString::from("key"))
            .with_base_url("http://127.0.0.1:9");

        let result = client.submit_reply("fb-1", "x").await;
        assert!(matches!(
            result,
            Err(Error::Validation(ValidationError::ReplyLength { length: 1, .. }))
        ));

        let too_long = "д".repeat(5001);
        let result = client.submit_reply("fb-1", &too_long).await;
        assert!(matches!(
            result,
            Err(Error::Validation(ValidationError::ReplyLength { .. }))
        ));
    }

    #[tokio::test]
    async fn submit_reply_max_length_passes_validation() {
        // 5000 chars is structurally valid; with an unroutable host the
        // failure must be upstream, not validation.
        let client = WildberriesClient::new(SecretString::from("key"))
            .with_base_url("http://127.0.0.1:9");
        let text = "д".repeat(5000);
        let result = client.submit_reply("fb-1", &text).await;
        assert!(matches!(result, Err(Error::Upstream(_))));
    }

    #[tokio::test]
    async fn check_connection_fails_closed() {
        let client = WildberriesClient::new(SecretString::from("key"))
            .with_base_url("http://127.0.0.1:9");
        assert!(!client.check_connection().await);
    }
}
