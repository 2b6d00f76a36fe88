//! Domain model — marketplace accounts, reply rules, and reviews.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::{ConfigError, ValidationError};

// ── Marketplace kind ────────────────────────────────────────────────

/// Supported marketplace platforms. Adding a platform means adding a
/// variant and a client implementation, not touching the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Marketplace {
    Wildberries,
    Ozon,
}

impl Marketplace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wildberries => "wildberries",
            Self::Ozon => "ozon",
        }
    }
}

impl fmt::Display for Marketplace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Marketplace {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wildberries" => Ok(Self::Wildberries),
            "ozon" => Ok(Self::Ozon),
            other => Err(ConfigError::UnknownMarketplace(other.to_string())),
        }
    }
}

// ── Reply tone ──────────────────────────────────────────────────────

/// Tone of the generated reply — selects one of three fixed system
/// prompt templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tone {
    #[default]
    Friendly,
    Professional,
    Apologetic,
}

impl Tone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Friendly => "friendly",
            Self::Professional => "professional",
            Self::Apologetic => "apologetic",
        }
    }

    /// Parse a DB string; unknown values fall back to the default tone.
    pub fn from_db(s: &str) -> Self {
        match s {
            "professional" => Self::Professional,
            "apologetic" => Self::Apologetic,
            _ => Self::Friendly,
        }
    }
}

// ── Moderation status ───────────────────────────────────────────────

/// Moderation state of a generated reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModerationStatus {
    /// Awaiting a human decision.
    #[default]
    Pending,
    /// Approved by a human — authorized to send.
    Approved,
    /// Rejected by a human — never sent.
    Rejected,
    /// Cleared the gate without human review.
    Auto,
}

impl ModerationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Auto => "auto",
        }
    }

    pub fn from_db(s: &str) -> Self {
        match s {
            "approved" => Self::Approved,
            "rejected" => Self::Rejected,
            "auto" => Self::Auto,
            _ => Self::Pending,
        }
    }
}

// ── Account ─────────────────────────────────────────────────────────

/// One configured connection to a marketplace shop.
///
/// `credential_ref` is an opaque handle resolved by the credential
/// collaborator at call time; plaintext keys are never persisted.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: Uuid,
    pub user_id: Uuid,
    pub marketplace: Marketplace,
    pub credential_ref: String,
    /// Ozon requires a Client-Id alongside the API key.
    pub client_id: Option<String>,
    pub shop_name: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_sync: Option<DateTime<Utc>>,
}

impl Account {
    pub fn new(user_id: Uuid, marketplace: Marketplace, credential_ref: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            marketplace,
            credential_ref: credential_ref.into(),
            client_id: None,
            shop_name: None,
            is_active: true,
            created_at: Utc::now(),
            last_sync: None,
        }
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn with_shop_name(mut self, shop_name: impl Into<String>) -> Self {
        self.shop_name = Some(shop_name.into());
        self
    }
}

// ── Review rule ─────────────────────────────────────────────────────

/// Per-user policy controlling which reviews get an automated reply
/// and in what tone.
#[derive(Debug, Clone)]
pub struct ReviewRule {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    /// Inclusive rating bounds, 1–5.
    pub min_rating: u8,
    pub max_rating: u8,
    /// At least one must occur in the review text (case-insensitive
    /// substring) when non-empty.
    pub keywords_include: Vec<String>,
    /// None may occur in the review text when non-empty.
    pub keywords_exclude: Vec<String>,
    pub require_moderation: bool,
    pub custom_instructions: Option<String>,
    pub tone: Tone,
    /// Higher priority wins when a user has several active rules.
    pub priority: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl ReviewRule {
    pub fn new(user_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            name: name.into(),
            min_rating: 1,
            max_rating: 5,
            keywords_include: Vec::new(),
            keywords_exclude: Vec::new(),
            require_moderation: true,
            custom_instructions: None,
            tone: Tone::default(),
            priority: 0,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    pub fn with_ratings(mut self, min: u8, max: u8) -> Self {
        self.min_rating = min;
        self.max_rating = max;
        self
    }

    pub fn with_include_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords_include = keywords;
        self
    }

    pub fn with_exclude_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords_exclude = keywords;
        self
    }

    pub fn with_tone(mut self, tone: Tone) -> Self {
        self.tone = tone;
        self
    }

    pub fn with_moderation(mut self, require: bool) -> Self {
        self.require_moderation = require;
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    /// Check the rating bounds are a valid 1–5 range.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.min_rating < 1 || self.max_rating > 5 || self.min_rating > self.max_rating {
            return Err(ValidationError::RatingBounds {
                min_rating: self.min_rating,
                max_rating: self.max_rating,
            });
        }
        Ok(())
    }
}

// ── Fetched review ──────────────────────────────────────────────────

/// Canonical review shape produced by marketplace client parsers.
///
/// Clients normalize their provider-specific field names and timestamp
/// formats into this before anything else sees the data.
#[derive(Debug, Clone)]
pub struct FetchedReview {
    pub external_id: String,
    /// Star rating, guaranteed 1–5 by the parser.
    pub rating: u8,
    pub text: Option<String>,
    pub product_name: Option<String>,
    pub product_id: Option<String>,
    pub customer_name: Option<String>,
    pub marketplace_created_at: Option<DateTime<Utc>>,
}

// ── Review ──────────────────────────────────────────────────────────

/// One customer feedback item and its processing state.
///
/// Identified by `(account_id, external_id)` — the dedup key. Created
/// exactly once per external id per account, never deleted by the
/// pipeline. Invariant: `response_sent` implies a non-empty
/// `response_text` and a moderation status of Auto or Approved.
#[derive(Debug, Clone)]
pub struct Review {
    pub id: Uuid,
    pub account_id: Uuid,
    pub external_id: String,
    pub rating: u8,
    pub text: Option<String>,
    pub product_name: Option<String>,
    pub product_id: Option<String>,
    pub customer_name: Option<String>,
    pub marketplace_created_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// False until a reply is generated for this review.
    pub processed: bool,
    pub response_text: Option<String>,
    pub tokens_used: Option<u32>,
    /// Generation cost in the provider's currency (RUB).
    pub cost: Option<Decimal>,
    pub moderation_status: ModerationStatus,
    pub response_sent: bool,
    pub sent_at: Option<DateTime<Utc>>,
    /// Last submission failure, cleared on success.
    pub last_error: Option<String>,
}

impl Review {
    /// Build a fresh, unprocessed review record from a fetched review.
    pub fn from_fetched(account_id: Uuid, fetched: &FetchedReview) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            external_id: fetched.external_id.clone(),
            rating: fetched.rating,
            text: fetched.text.clone(),
            product_name: fetched.product_name.clone(),
            product_id: fetched.product_id.clone(),
            customer_name: fetched.customer_name.clone(),
            marketplace_created_at: fetched.marketplace_created_at,
            created_at: Utc::now(),
            processed: false,
            response_text: None,
            tokens_used: None,
            cost: None,
            moderation_status: ModerationStatus::default(),
            response_sent: false,
            sent_at: None,
            last_error: None,
        }
    }
}
