//! libSQL backend — async `Database` trait implementation.
//!
//! Supports local file and in-memory databases. Timestamps are stored as
//! RFC 3339 TEXT, uuids as TEXT, money as TEXT (exact decimal).

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use rust_decimal::Decimal;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::model::{
    Account, FetchedReview, Marketplace, ModerationStatus, Review, ReviewRule, Tone,
};
use crate::store::migrations;
use crate::store::traits::{Database, LlmCallRecord};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(&backend.conn).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(&backend.conn).await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

const ACCOUNT_COLUMNS: &str = "id, user_id, marketplace, credential_ref, client_id, shop_name, \
     is_active, created_at, last_sync";

const RULE_COLUMNS: &str = "id, user_id, name, min_rating, max_rating, keywords_include, \
     keywords_exclude, require_moderation, custom_instructions, tone, priority, is_active, \
     created_at";

const REVIEW_COLUMNS: &str = "id, account_id, external_id, rating, text, product_name, \
     product_id, customer_name, marketplace_created_at, created_at, processed, response_text, \
     tokens_used, cost, moderation_status, response_sent, sent_at, last_error";

fn query_err(e: libsql::Error) -> DatabaseError {
    DatabaseError::Query(e.to_string())
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_uuid(s: &str) -> Uuid {
    Uuid::parse_str(s).unwrap_or_else(|_| Uuid::nil())
}

fn opt_text(v: Option<&str>) -> libsql::Value {
    match v {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

fn opt_datetime(v: Option<DateTime<Utc>>) -> libsql::Value {
    match v {
        Some(dt) => libsql::Value::Text(dt.to_rfc3339()),
        None => libsql::Value::Null,
    }
}

/// Map a libsql Row to an Account. Column order matches ACCOUNT_COLUMNS.
fn row_to_account(row: &libsql::Row) -> Result<Account, DatabaseError> {
    let id: String = row.get(0).map_err(query_err)?;
    let user_id: String = row.get(1).map_err(query_err)?;
    let marketplace_str: String = row.get(2).map_err(query_err)?;
    let marketplace: Marketplace = marketplace_str
        .parse()
        .map_err(|_| DatabaseError::Serialization(format!(
            "unknown marketplace '{marketplace_str}' in accounts row"
        )))?;
    let credential_ref: String = row.get(3).map_err(query_err)?;
    let client_id: Option<String> = row.get(4).ok();
    let shop_name: Option<String> = row.get(5).ok();
    let is_active: i64 = row.get(6).map_err(query_err)?;
    let created_str: String = row.get(7).map_err(query_err)?;
    let last_sync_str: Option<String> = row.get(8).ok();

    Ok(Account {
        id: parse_uuid(&id),
        user_id: parse_uuid(&user_id),
        marketplace,
        credential_ref,
        client_id,
        shop_name,
        is_active: is_active != 0,
        created_at: parse_datetime(&created_str),
        last_sync: last_sync_str.as_deref().map(parse_datetime),
    })
}

/// Map a libsql Row to a ReviewRule. Column order matches RULE_COLUMNS.
fn row_to_rule(row: &libsql::Row) -> Result<ReviewRule, DatabaseError> {
    let id: String = row.get(0).map_err(query_err)?;
    let user_id: String = row.get(1).map_err(query_err)?;
    let name: String = row.get(2).map_err(query_err)?;
    let min_rating: i64 = row.get(3).map_err(query_err)?;
    let max_rating: i64 = row.get(4).map_err(query_err)?;
    let include_json: String = row.get(5).map_err(query_err)?;
    let exclude_json: String = row.get(6).map_err(query_err)?;
    let require_moderation: i64 = row.get(7).map_err(query_err)?;
    let custom_instructions: Option<String> = row.get(8).ok();
    let tone_str: String = row.get(9).map_err(query_err)?;
    let priority: i64 = row.get(10).map_err(query_err)?;
    let is_active: i64 = row.get(11).map_err(query_err)?;
    let created_str: String = row.get(12).map_err(query_err)?;

    Ok(ReviewRule {
        id: parse_uuid(&id),
        user_id: parse_uuid(&user_id),
        name,
        min_rating: min_rating as u8,
        max_rating: max_rating as u8,
        keywords_include: serde_json::from_str(&include_json).unwrap_or_default(),
        keywords_exclude: serde_json::from_str(&exclude_json).unwrap_or_default(),
        require_moderation: require_moderation != 0,
        custom_instructions,
        tone: Tone::from_db(&tone_str),
        priority,
        is_active: is_active != 0,
        created_at: parse_datetime(&created_str),
    })
}

/// Map a libsql Row to a Review. Column order matches REVIEW_COLUMNS.
fn row_to_review(row: &libsql::Row) -> Result<Review, DatabaseError> {
    let id: String = row.get(0).map_err(query_err)?;
    let account_id: String = row.get(1).map_err(query_err)?;
    let external_id: String = row.get(2).map_err(query_err)?;
    let rating: i64 = row.get(3).map_err(query_err)?;
    let text: Option<String> = row.get(4).ok();
    let product_name: Option<String> = row.get(5).ok();
    let product_id: Option<String> = row.get(6).ok();
    let customer_name: Option<String> = row.get(7).ok();
    let marketplace_created_str: Option<String> = row.get(8).ok();
    let created_str: String = row.get(9).map_err(query_err)?;
    let processed: i64 = row.get(10).map_err(query_err)?;
    let response_text: Option<String> = row.get(11).ok();
    let tokens_used: Option<i64> = row.get(12).ok();
    let cost_str: Option<String> = row.get(13).ok();
    let moderation_str: String = row.get(14).map_err(query_err)?;
    let response_sent: i64 = row.get(15).map_err(query_err)?;
    let sent_str: Option<String> = row.get(16).ok();
    let last_error: Option<String> = row.get(17).ok();

    Ok(Review {
        id: parse_uuid(&id),
        account_id: parse_uuid(&account_id),
        external_id,
        rating: rating as u8,
        text,
        product_name,
        product_id,
        customer_name,
        marketplace_created_at: marketplace_created_str.as_deref().map(parse_datetime),
        created_at: parse_datetime(&created_str),
        processed: processed != 0,
        response_text,
        tokens_used: tokens_used.map(|t| t as u32),
        cost: cost_str.and_then(|s| s.parse::<Decimal>().ok()),
        moderation_status: ModerationStatus::from_db(&moderation_str),
        response_sent: response_sent != 0,
        sent_at: sent_str.as_deref().map(parse_datetime),
        last_error,
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn insert_account(&self, account: &Account) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO accounts (id, user_id, marketplace, credential_ref, client_id,
                    shop_name, is_active, created_at, last_sync)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    account.id.to_string(),
                    account.user_id.to_string(),
                    account.marketplace.as_str(),
                    account.credential_ref.clone(),
                    opt_text(account.client_id.as_deref()),
                    opt_text(account.shop_name.as_deref()),
                    i64::from(account.is_active),
                    account.created_at.to_rfc3339(),
                    opt_datetime(account.last_sync),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_account: {e}")))?;

        debug!(account_id = %account.id, "Account inserted");
        Ok(())
    }

    async fn get_account(&self, id: Uuid) -> Result<Option<Account>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_account: {e}")))?;

        match rows.next().await.map_err(query_err)? {
            Some(row) => Ok(Some(row_to_account(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_active_accounts(&self) -> Result<Vec<Account>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE is_active = 1
                     ORDER BY created_at ASC"
                ),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_active_accounts: {e}")))?;

        let mut accounts = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            accounts.push(row_to_account(&row)?);
        }
        Ok(accounts)
    }

    async fn update_last_sync(
        &self,
        account_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "UPDATE accounts SET last_sync = ?2 WHERE id = ?1",
                params![account_id.to_string(), at.to_rfc3339()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_last_sync: {e}")))?;
        Ok(())
    }

    async fn insert_rule(&self, rule: &ReviewRule) -> Result<(), DatabaseError> {
        let include = serde_json::to_string(&rule.keywords_include)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        let exclude = serde_json::to_string(&rule.keywords_exclude)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        self.conn()
            .execute(
                "INSERT INTO rules (id, user_id, name, min_rating, max_rating,
                    keywords_include, keywords_exclude, require_moderation,
                    custom_instructions, tone, priority, is_active, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    rule.id.to_string(),
                    rule.user_id.to_string(),
                    rule.name.clone(),
                    i64::from(rule.min_rating),
                    i64::from(rule.max_rating),
                    include,
                    exclude,
                    i64::from(rule.require_moderation),
                    opt_text(rule.custom_instructions.as_deref()),
                    rule.tone.as_str(),
                    rule.priority,
                    i64::from(rule.is_active),
                    rule.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_rule: {e}")))?;

        debug!(rule_id = %rule.id, "Rule inserted");
        Ok(())
    }

    async fn active_rule_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Option<ReviewRule>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {RULE_COLUMNS} FROM rules
                     WHERE user_id = ?1 AND is_active = 1
                     ORDER BY priority DESC, created_at ASC
                     LIMIT 1"
                ),
                params![user_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("active_rule_for_user: {e}")))?;

        match rows.next().await.map_err(query_err)? {
            Some(row) => Ok(Some(row_to_rule(&row)?)),
            None => Ok(None),
        }
    }

    async fn insert_review_if_new(
        &self,
        account_id: Uuid,
        fetched: &FetchedReview,
    ) -> Result<Option<Review>, DatabaseError> {
        let review = Review::from_fetched(account_id, fetched);

        let affected = self
            .conn()
            .execute(
                "INSERT OR IGNORE INTO reviews (id, account_id, external_id, rating, text,
                    product_name, product_id, customer_name, marketplace_created_at,
                    created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    review.id.to_string(),
                    review.account_id.to_string(),
                    review.external_id.clone(),
                    i64::from(review.rating),
                    opt_text(review.text.as_deref()),
                    opt_text(review.product_name.as_deref()),
                    opt_text(review.product_id.as_deref()),
                    opt_text(review.customer_name.as_deref()),
                    opt_datetime(review.marketplace_created_at),
                    review.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_review_if_new: {e}")))?;

        if affected == 0 {
            return Ok(None);
        }
        debug!(review_id = %review.id, external_id = %review.external_id, "Review inserted");
        Ok(Some(review))
    }

    async fn review_external_ids(
        &self,
        account_id: Uuid,
    ) -> Result<HashSet<String>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT external_id FROM reviews WHERE account_id = ?1",
                params![account_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("review_external_ids: {e}")))?;

        let mut ids = HashSet::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            ids.insert(row.get::<String>(0).map_err(query_err)?);
        }
        Ok(ids)
    }

    async fn get_review(&self, id: Uuid) -> Result<Option<Review>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {REVIEW_COLUMNS} FROM reviews WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_review: {e}")))?;

        match rows.next().await.map_err(query_err)? {
            Some(row) => Ok(Some(row_to_review(&row)?)),
            None => Ok(None),
        }
    }

    async fn record_response(
        &self,
        review_id: Uuid,
        text: &str,
        tokens_used: u32,
        cost: Decimal,
        status: ModerationStatus,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "UPDATE reviews SET processed = 1, response_text = ?2, tokens_used = ?3,
                    cost = ?4, moderation_status = ?5, last_error = NULL
                 WHERE id = ?1",
                params![
                    review_id.to_string(),
                    text,
                    i64::from(tokens_used),
                    cost.to_string(),
                    status.as_str(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("record_response: {e}")))?;
        Ok(())
    }

    async fn set_moderation_status(
        &self,
        review_id: Uuid,
        status: ModerationStatus,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "UPDATE reviews SET moderation_status = ?2 WHERE id = ?1",
                params![review_id.to_string(), status.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_moderation_status: {e}")))?;
        Ok(())
    }

    async fn mark_sent(&self, review_id: Uuid, at: DateTime<Utc>) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "UPDATE reviews SET response_sent = 1, sent_at = ?2, last_error = NULL
                 WHERE id = ?1",
                params![review_id.to_string(), at.to_rfc3339()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("mark_sent: {e}")))?;
        Ok(())
    }

    async fn record_send_error(
        &self,
        review_id: Uuid,
        error: &str,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "UPDATE reviews SET last_error = ?2 WHERE id = ?1",
                params![review_id.to_string(), error],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("record_send_error: {e}")))?;
        Ok(())
    }

    async fn pending_moderation(&self) -> Result<Vec<Review>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {REVIEW_COLUMNS} FROM reviews
                     WHERE processed = 1 AND moderation_status = 'pending'
                     ORDER BY created_at ASC"
                ),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("pending_moderation: {e}")))?;

        let mut reviews = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            reviews.push(row_to_review(&row)?);
        }
        Ok(reviews)
    }

    async fn unsent_reviews(
        &self,
        statuses: &[ModerationStatus],
    ) -> Result<Vec<Review>, DatabaseError> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }
        // Status strings come from our own enum, never from user input.
        let list = statuses
            .iter()
            .map(|s| format!("'{}'", s.as_str()))
            .collect::<Vec<_>>()
            .join(", ");

        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {REVIEW_COLUMNS} FROM reviews
                     WHERE processed = 1 AND response_sent = 0
                       AND response_text IS NOT NULL
                       AND moderation_status IN ({list})
                     ORDER BY created_at ASC"
                ),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("unsent_reviews: {e}")))?;

        let mut reviews = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            reviews.push(row_to_review(&row)?);
        }
        Ok(reviews)
    }

    async fn reviews_for_account(
        &self,
        account_id: Uuid,
    ) -> Result<Vec<Review>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {REVIEW_COLUMNS} FROM reviews WHERE account_id = ?1
                     ORDER BY created_at ASC"
                ),
                params![account_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("reviews_for_account: {e}")))?;

        let mut reviews = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            reviews.push(row_to_review(&row)?);
        }
        Ok(reviews)
    }

    async fn record_llm_call(
        &self,
        review_id: Uuid,
        provider: &str,
        model: &str,
        input_tokens: u32,
        output_tokens: u32,
        cost: Decimal,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO llm_calls (id, review_id, provider, model, input_tokens,
                    output_tokens, cost, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    Uuid::new_v4().to_string(),
                    review_id.to_string(),
                    provider,
                    model,
                    i64::from(input_tokens),
                    i64::from(output_tokens),
                    cost.to_string(),
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("record_llm_call: {e}")))?;
        Ok(())
    }

    async fn llm_calls_for_review(
        &self,
        review_id: Uuid,
    ) -> Result<Vec<LlmCallRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT review_id, provider, model, input_tokens, output_tokens, cost
                 FROM llm_calls WHERE review_id = ?1 ORDER BY created_at ASC",
                params![review_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("llm_calls_for_review: {e}")))?;

        let mut calls = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            let review_id_str: String = row.get(0).map_err(query_err)?;
            let provider: String = row.get(1).map_err(query_err)?;
            let model: String = row.get(2).map_err(query_err)?;
            let input_tokens: i64 = row.get(3).map_err(query_err)?;
            let output_tokens: i64 = row.get(4).map_err(query_err)?;
            let cost_str: String = row.get(5).map_err(query_err)?;
            calls.push(LlmCallRecord {
                review_id: parse_uuid(&review_id_str),
                provider,
                model,
                input_tokens: input_tokens as u32,
                output_tokens: output_tokens as u32,
                cost: cost_str.parse().unwrap_or_default(),
            });
        }
        Ok(calls)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn fetched(external_id: &str, rating: u8, text: Option<&str>) -> FetchedReview {
        FetchedReview {
            external_id: external_id.to_string(),
            rating,
            text: text.map(String::from),
            product_name: Some("Чайник".to_string()),
            product_id: Some("1001".to_string()),
            customer_name: Some("Анна".to_string()),
            marketplace_created_at: Some(Utc::now()),
        }
    }

    async fn seeded_account(db: &LibSqlBackend) -> Account {
        let account = Account::new(Uuid::new_v4(), Marketplace::Wildberries, "WB_KEY")
            .with_shop_name("Мой магазин");
        db.insert_account(&account).await.unwrap();
        account
    }

    #[tokio::test]
    async fn account_round_trip() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let account = seeded_account(&db).await;

        let loaded = db.get_account(account.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, account.id);
        assert_eq!(loaded.marketplace, Marketplace::Wildberries);
        assert_eq!(loaded.shop_name.as_deref(), Some("Мой магазин"));
        assert!(loaded.is_active);
        assert!(loaded.last_sync.is_none());

        let active = db.list_active_accounts().await.unwrap();
        assert_eq!(active.len(), 1);
    }

    #[tokio::test]
    async fn update_last_sync_persists() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let account = seeded_account(&db).await;

        let at = Utc::now();
        db.update_last_sync(account.id, at).await.unwrap();
        let loaded = db.get_account(account.id).await.unwrap().unwrap();
        let stored = loaded.last_sync.unwrap();
        assert!((stored - at).num_seconds().abs() < 2);
    }

    #[tokio::test]
    async fn inactive_accounts_are_not_listed() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let mut account = Account::new(Uuid::new_v4(), Marketplace::Ozon, "OZON_KEY");
        account.is_active = false;
        db.insert_account(&account).await.unwrap();
        assert!(db.list_active_accounts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn highest_priority_active_rule_wins() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let user_id = Uuid::new_v4();

        let low = ReviewRule::new(user_id, "low").with_priority(1);
        let high = ReviewRule::new(user_id, "high").with_priority(10);
        let mut inactive = ReviewRule::new(user_id, "inactive").with_priority(100);
        inactive.is_active = false;

        db.insert_rule(&low).await.unwrap();
        db.insert_rule(&high).await.unwrap();
        db.insert_rule(&inactive).await.unwrap();

        let selected = db.active_rule_for_user(user_id).await.unwrap().unwrap();
        assert_eq!(selected.name, "high");
    }

    #[tokio::test]
    async fn no_active_rule_returns_none() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        assert!(db.active_rule_for_user(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rule_keywords_round_trip() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let user_id = Uuid::new_v4();
        let rule = ReviewRule::new(user_id, "keywords")
            .with_include_keywords(vec!["спасибо".to_string(), "отлично".to_string()])
            .with_exclude_keywords(vec!["подделка".to_string()])
            .with_tone(Tone::Professional);
        db.insert_rule(&rule).await.unwrap();

        let loaded = db.active_rule_for_user(user_id).await.unwrap().unwrap();
        assert_eq!(loaded.keywords_include, vec!["спасибо", "отлично"]);
        assert_eq!(loaded.keywords_exclude, vec!["подделка"]);
        assert_eq!(loaded.tone, Tone::Professional);
    }

    #[tokio::test]
    async fn review_insert_is_idempotent() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let account = seeded_account(&db).await;

        let first = db
            .insert_review_if_new(account.id, &fetched("fb-1", 5, Some("Спасибо")))
            .await
            .unwrap();
        assert!(first.is_some());

        let second = db
            .insert_review_if_new(account.id, &fetched("fb-1", 5, Some("Спасибо")))
            .await
            .unwrap();
        assert!(second.is_none());

        let ids = db.review_external_ids(account.id).await.unwrap();
        assert_eq!(ids.len(), 1);
        assert!(ids.contains("fb-1"));
    }

    #[tokio::test]
    async fn same_external_id_allowed_across_accounts() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let a = seeded_account(&db).await;
        let b = seeded_account(&db).await;

        assert!(db
            .insert_review_if_new(a.id, &fetched("fb-1", 4, None))
            .await
            .unwrap()
            .is_some());
        assert!(db
            .insert_review_if_new(b.id, &fetched("fb-1", 4, None))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn record_response_sets_lifecycle_fields() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let account = seeded_account(&db).await;
        let review = db
            .insert_review_if_new(account.id, &fetched("fb-1", 2, Some("Плохо")))
            .await
            .unwrap()
            .unwrap();

        db.record_response(review.id, "Извините!", 1500, dec!(0.208), ModerationStatus::Pending)
            .await
            .unwrap();

        let loaded = db.get_review(review.id).await.unwrap().unwrap();
        assert!(loaded.processed);
        assert_eq!(loaded.response_text.as_deref(), Some("Извините!"));
        assert_eq!(loaded.tokens_used, Some(1500));
        assert_eq!(loaded.cost, Some(dec!(0.208)));
        assert_eq!(loaded.moderation_status, ModerationStatus::Pending);
        assert!(!loaded.response_sent);
    }

    #[tokio::test]
    async fn pending_moderation_excludes_unprocessed_reviews() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let account = seeded_account(&db).await;

        // Skipped review: persisted but never processed.
        db.insert_review_if_new(account.id, &fetched("fb-skip", 1, Some("норм")))
            .await
            .unwrap();

        let review = db
            .insert_review_if_new(account.id, &fetched("fb-pend", 2, Some("Плохо")))
            .await
            .unwrap()
            .unwrap();
        db.record_response(review.id, "Извините!", 100, dec!(0.01), ModerationStatus::Pending)
            .await
            .unwrap();

        let pending = db.pending_moderation().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].external_id, "fb-pend");
    }

    #[tokio::test]
    async fn unsent_reviews_filter_by_status() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let account = seeded_account(&db).await;

        let auto = db
            .insert_review_if_new(account.id, &fetched("fb-auto", 5, Some("Отлично")))
            .await
            .unwrap()
            .unwrap();
        db.record_response(auto.id, "Спасибо!", 100, dec!(0.01), ModerationStatus::Auto)
            .await
            .unwrap();

        let rejected = db
            .insert_review_if_new(account.id, &fetched("fb-rej", 5, Some("Отлично")))
            .await
            .unwrap()
            .unwrap();
        db.record_response(rejected.id, "Спасибо!", 100, dec!(0.01), ModerationStatus::Pending)
            .await
            .unwrap();
        db.set_moderation_status(rejected.id, ModerationStatus::Rejected)
            .await
            .unwrap();

        let unsent = db
            .unsent_reviews(&[ModerationStatus::Auto, ModerationStatus::Approved])
            .await
            .unwrap();
        assert_eq!(unsent.len(), 1);
        assert_eq!(unsent[0].external_id, "fb-auto");

        db.mark_sent(auto.id, Utc::now()).await.unwrap();
        let unsent = db
            .unsent_reviews(&[ModerationStatus::Auto, ModerationStatus::Approved])
            .await
            .unwrap();
        assert!(unsent.is_empty());
    }

    #[tokio::test]
    async fn send_error_recorded_and_cleared_on_success() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let account = seeded_account(&db).await;
        let review = db
            .insert_review_if_new(account.id, &fetched("fb-1", 5, Some("Отлично")))
            .await
            .unwrap()
            .unwrap();
        db.record_response(review.id, "Спасибо!", 100, dec!(0.01), ModerationStatus::Auto)
            .await
            .unwrap();

        db.record_send_error(review.id, "wildberries returned HTTP 500")
            .await
            .unwrap();
        let loaded = db.get_review(review.id).await.unwrap().unwrap();
        assert!(loaded.last_error.as_deref().unwrap().contains("500"));

        db.mark_sent(review.id, Utc::now()).await.unwrap();
        let loaded = db.get_review(review.id).await.unwrap().unwrap();
        assert!(loaded.response_sent);
        assert!(loaded.sent_at.is_some());
        assert!(loaded.last_error.is_none());
    }

    #[tokio::test]
    async fn llm_ledger_round_trip() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let account = seeded_account(&db).await;
        let review = db
            .insert_review_if_new(account.id, &fetched("fb-1", 5, Some("Отлично")))
            .await
            .unwrap()
            .unwrap();

        db.record_llm_call(review.id, "gigachat", "GigaChat", 1000, 500, dec!(0.208))
            .await
            .unwrap();

        let calls = db.llm_calls_for_review(review.id).await.unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].provider, "gigachat");
        assert_eq!(calls[0].input_tokens, 1000);
        assert_eq!(calls[0].output_tokens, 500);
        assert_eq!(calls[0].cost, dec!(0.208));
    }

    #[tokio::test]
    async fn file_backed_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reviews.db");

        let account = {
            let db = LibSqlBackend::new_local(&path).await.unwrap();
            let account = seeded_account(&db).await;
            db.insert_review_if_new(account.id, &fetched("fb-1", 5, Some("Спасибо")))
                .await
                .unwrap();
            account
        };

        let db = LibSqlBackend::new_local(&path).await.unwrap();
        let ids = db.review_external_ids(account.id).await.unwrap();
        assert!(ids.contains("fb-1"));
    }
}
