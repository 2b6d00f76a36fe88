//! Unified `Database` trait — single async interface for all persistence.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::model::{Account, FetchedReview, ModerationStatus, Review, ReviewRule};

/// One row of the LLM call ledger.
#[derive(Debug, Clone)]
pub struct LlmCallRecord {
    pub review_id: Uuid,
    pub provider: String,
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost: Decimal,
}

/// Backend-agnostic database trait covering accounts, rules, reviews, and
/// the LLM call ledger.
#[async_trait]
pub trait Database: Send + Sync {
    // ── Accounts ────────────────────────────────────────────────────

    async fn insert_account(&self, account: &Account) -> Result<(), DatabaseError>;

    async fn get_account(&self, id: Uuid) -> Result<Option<Account>, DatabaseError>;

    async fn list_active_accounts(&self) -> Result<Vec<Account>, DatabaseError>;

    async fn update_last_sync(
        &self,
        account_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), DatabaseError>;

    // ── Rules ───────────────────────────────────────────────────────

    async fn insert_rule(&self, rule: &ReviewRule) -> Result<(), DatabaseError>;

    /// The user's highest-priority active rule (priority DESC, then oldest
    /// first). None when the user has no active rule.
    async fn active_rule_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Option<ReviewRule>, DatabaseError>;

    // ── Reviews ─────────────────────────────────────────────────────

    /// Idempotent insert keyed on `(account_id, external_id)`. Returns the
    /// fresh record, or None when the review was already recorded —
    /// concurrent batches collapse onto a single row.
    async fn insert_review_if_new(
        &self,
        account_id: Uuid,
        fetched: &FetchedReview,
    ) -> Result<Option<Review>, DatabaseError>;

    /// All external ids already recorded for an account (the dedup set).
    async fn review_external_ids(
        &self,
        account_id: Uuid,
    ) -> Result<HashSet<String>, DatabaseError>;

    async fn get_review(&self, id: Uuid) -> Result<Option<Review>, DatabaseError>;

    /// Attach a generated reply: sets `processed`, the response text,
    /// token/cost accounting, and the gate's moderation status.
    async fn record_response(
        &self,
        review_id: Uuid,
        text: &str,
        tokens_used: u32,
        cost: Decimal,
        status: ModerationStatus,
    ) -> Result<(), DatabaseError>;

    async fn set_moderation_status(
        &self,
        review_id: Uuid,
        status: ModerationStatus,
    ) -> Result<(), DatabaseError>;

    async fn mark_sent(&self, review_id: Uuid, at: DateTime<Utc>) -> Result<(), DatabaseError>;

    async fn record_send_error(&self, review_id: Uuid, error: &str)
    -> Result<(), DatabaseError>;

    /// Generated replies awaiting a human decision.
    async fn pending_moderation(&self) -> Result<Vec<Review>, DatabaseError>;

    /// Generated, unsent replies in any of the given moderation states.
    async fn unsent_reviews(
        &self,
        statuses: &[ModerationStatus],
    ) -> Result<Vec<Review>, DatabaseError>;

    async fn reviews_for_account(&self, account_id: Uuid)
    -> Result<Vec<Review>, DatabaseError>;

    // ── LLM call ledger ─────────────────────────────────────────────

    async fn record_llm_call(
        &self,
        review_id: Uuid,
        provider: &str,
        model: &str,
        input_tokens: u32,
        output_tokens: u32,
        cost: Decimal,
    ) -> Result<(), DatabaseError>;

    async fn llm_calls_for_review(
        &self,
        review_id: Uuid,
    ) -> Result<Vec<LlmCallRecord>, DatabaseError>;
}
