//! Marketplace clients — pure I/O seams, one variant per platform.
//!
//! Each variant owns its base URL, auth header scheme, pagination
//! parameters, and JSON field names. The pipeline only ever sees the
//! `MarketplaceClient` trait and the canonical `FetchedReview` shape.

pub mod ozon;
pub mod wildberries;

pub use ozon::OzonClient;
pub use wildberries::WildberriesClient;

use async_trait::async_trait;
use secrecy::SecretString;

use crate::error::{ConfigError, Error, UpstreamError};
use crate::model::{Account, FetchedReview, Marketplace};

/// A client for one marketplace connection.
///
/// Rate limiting is a per-instance cooperative delay applied before each
/// request, pagination continuations included. Instances for the same
/// platform do not share a limiter.
#[async_trait]
pub trait MarketplaceClient: Send + Sync {
    fn marketplace(&self) -> Marketplace;

    /// Fetch all currently unanswered reviews, following pagination.
    ///
    /// Individual records that cannot be parsed are skipped and logged;
    /// they never abort the batch.
    async fn fetch_unanswered(&self) -> Result<Vec<FetchedReview>, UpstreamError>;

    /// Submit a reply. Validates the platform's length bounds before any
    /// network call and fails fast with a `ValidationError`.
    async fn submit_reply(&self, external_id: &str, text: &str) -> Result<(), Error>;

    /// Cheap connectivity probe — fetches a single item.
    async fn check_connection(&self) -> bool;
}

/// Builds a client for an account with its decrypted credential.
///
/// The orchestrator creates one client per account per batch and reuses it.
pub trait ClientFactory: Send + Sync {
    fn client_for(
        &self,
        account: &Account,
        credential: SecretString,
    ) -> Result<Box<dyn MarketplaceClient>, ConfigError>;
}

/// Production factory wiring the HTTP client variants.
pub struct HttpClientFactory;

impl HttpClientFactory {
    pub fn new() -> Self {
        Self
    }
}

impl Default for HttpClientFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientFactory for HttpClientFactory {
    fn client_for(
        &self,
        account: &Account,
        credential: SecretString,
    ) -> Result<Box<dyn MarketplaceClient>, ConfigError> {
        match account.marketplace {
            Marketplace::Wildberries => Ok(Box::new(WildberriesClient::new(credential))),
            Marketplace::Ozon => {
                let client_id =
                    account
                        .client_id
                        .clone()
                        .ok_or_else(|| ConfigError::InvalidValue {
                            key: "client_id".to_string(),
                            message: format!(
                                "Ozon account {} is missing a Client-Id",
                                account.id
                            ),
                        })?;
                Ok(Box::new(OzonClient::new(client_id, credential)))
            }
        }
    }
}
