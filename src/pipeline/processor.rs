//! Review processor — the pipeline orchestrator.
//!
//! Per account: fetch unanswered reviews, drop already-recorded ones, match
//! the user's active rule, generate replies, gate them through moderation,
//! and submit when authorized. Failures are isolated at both the per-review
//! and the per-account boundary — a broken account never stalls its
//! siblings, a broken review never stalls the rest of the batch.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::credentials::CredentialStore;
use crate::error::{DatabaseError, Error, ValidationError};
use crate::generator::{ReplyContext, ResponseGenerator};
use crate::marketplace::{ClientFactory, MarketplaceClient};
use crate::model::{Account, FetchedReview, ModerationStatus, Review, ReviewRule};
use crate::store::Database;

use super::moderation::{self, ModerationDecision, ModerationEvent};
use super::rules;

/// Shared collaborators of the processor.
pub struct ProcessorDeps {
    pub store: Arc<dyn Database>,
    pub credentials: Arc<dyn CredentialStore>,
    pub clients: Arc<dyn ClientFactory>,
    pub generator: Arc<ResponseGenerator>,
    /// Receives an event whenever a reply enters the moderation queue.
    pub moderation_tx: Option<mpsc::Sender<ModerationEvent>>,
}

/// Counters for one batch, aggregated across accounts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub accounts: usize,
    pub fetched: usize,
    pub fresh: usize,
    pub skipped: usize,
    pub generated: usize,
    pub pending_moderation: usize,
    pub sent: usize,
    pub held: usize,
    pub send_failed: usize,
    pub failed: usize,
}

impl BatchSummary {
    fn absorb(&mut self, other: BatchSummary) {
        self.accounts += other.accounts;
        self.fetched += other.fetched;
        self.fresh += other.fresh;
        self.skipped += other.skipped;
        self.generated += other.generated;
        self.pending_moderation += other.pending_moderation;
        self.sent += other.sent;
        self.held += other.held;
        self.send_failed += other.send_failed;
        self.failed += other.failed;
    }

    fn record(&mut self, outcome: ReviewOutcome) {
        match outcome {
            ReviewOutcome::Duplicate => {}
            ReviewOutcome::Skipped => self.skipped += 1,
            ReviewOutcome::PendingModeration => {
                self.generated += 1;
                self.pending_moderation += 1;
            }
            ReviewOutcome::Sent => {
                self.generated += 1;
                self.sent += 1;
            }
            ReviewOutcome::Held => {
                self.generated += 1;
                self.held += 1;
            }
            ReviewOutcome::SendFailed => {
                self.generated += 1;
                self.send_failed += 1;
            }
        }
    }
}

/// Terminal state of one review within a batch.
enum ReviewOutcome {
    /// Lost the idempotent-insert race to a concurrent batch.
    Duplicate,
    /// Did not match the rule; persisted for dedup, no reply generated.
    Skipped,
    PendingModeration,
    Sent,
    /// Generated with an auto decision, but auto-send is disabled.
    Held,
    /// Submission failed; reply stays unsent, eligible for the retry pass.
    SendFailed,
}

/// The pipeline orchestrator.
pub struct ReviewProcessor {
    store: Arc<dyn Database>,
    credentials: Arc<dyn CredentialStore>,
    clients: Arc<dyn ClientFactory>,
    generator: Arc<ResponseGenerator>,
    moderation_tx: Option<mpsc::Sender<ModerationEvent>>,
    auto_send: bool,
    shutdown: Arc<AtomicBool>,
}

impl ReviewProcessor {
    pub fn new(deps: ProcessorDeps, auto_send: bool) -> Self {
        Self {
            store: deps.store,
            credentials: deps.credentials,
            clients: deps.clients,
            generator: deps.generator,
            moderation_tx: deps.moderation_tx,
            auto_send,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag checked before each account — set it to drain a batch gracefully.
    /// An in-flight per-review sequence is never interrupted.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Process all active accounts concurrently. Accounts fail
    /// independently; reviews within one account run sequentially.
    pub async fn process_all_accounts(&self) -> BatchSummary {
        let accounts = match self.store.list_active_accounts().await {
            Ok(accounts) => accounts,
            Err(e) => {
                error!(error = %e, "Failed to list active accounts");
                return BatchSummary::default();
            }
        };

        info!(count = accounts.len(), "Processing active marketplace accounts");

        let results = futures::future::join_all(
            accounts
                .iter()
                .map(|account| self.process_account_guarded(account)),
        )
        .await;

        let mut summary = BatchSummary::default();
        for account_summary in results.into_iter().flatten() {
            summary.absorb(account_summary);
        }
        info!(
            accounts = summary.accounts,
            fetched = summary.fetched,
            fresh = summary.fresh,
            generated = summary.generated,
            sent = summary.sent,
            pending = summary.pending_moderation,
            "Batch complete"
        );
        summary
    }

    async fn process_account_guarded(&self, account: &Account) -> Option<BatchSummary> {
        if self.shutdown.load(Ordering::Relaxed) {
            debug!(account_id = %account.id, "Shutdown requested, draining batch");
            return None;
        }
        match self.process_account(account).await {
            Ok(summary) => Some(summary),
            Err(e) => {
                error!(account_id = %account.id, error = %e, "Account processing failed");
                None
            }
        }
    }

    /// Run the full pipeline for a single account.
    pub async fn process_account(&self, account: &Account) -> Result<BatchSummary, Error> {
        info!(
            account_id = %account.id,
            marketplace = %account.marketplace,
            shop = account.shop_name.as_deref().unwrap_or("-"),
            "Processing account"
        );

        let credential = self.credentials.reveal(account)?;
        let client = self.clients.client_for(account, credential)?;

        let fetched = client.fetch_unanswered().await?;
        let existing = self.store.review_external_ids(account.id).await?;
        let fresh: Vec<FetchedReview> = fetched
            .iter()
            .filter(|r| !existing.contains(&r.external_id))
            .cloned()
            .collect();

        self.store.update_last_sync(account.id, Utc::now()).await?;

        let mut summary = BatchSummary {
            accounts: 1,
            fetched: fetched.len(),
            fresh: fresh.len(),
            ..Default::default()
        };

        if fresh.is_empty() {
            debug!(account_id = %account.id, "No new reviews");
            return Ok(summary);
        }
        info!(account_id = %account.id, count = fresh.len(), "Found new reviews");

        let Some(rule) = self.store.active_rule_for_user(account.user_id).await? else {
            // Terminal skip for this account's batch; reviews stay upstream
            // and will be fetched again once a rule exists.
            warn!(
                account_id = %account.id,
                user_id = %account.user_id,
                "No active rule, skipping account batch"
            );
            return Ok(summary);
        };
        if let Err(e) = rule.validate() {
            warn!(
                account_id = %account.id,
                rule_id = %rule.id,
                error = %e,
                "Active rule is misconfigured, skipping account batch"
            );
            return Ok(summary);
        }

        for fetched_review in fresh {
            let external_id = fetched_review.external_id.clone();
            match self
                .handle_review(account, client.as_ref(), &rule, fetched_review)
                .await
            {
                Ok(outcome) => summary.record(outcome),
                Err(e) => {
                    error!(
                        account_id = %account.id,
                        external_id = %external_id,
                        error = %e,
                        "Review processing failed"
                    );
                    summary.failed += 1;
                }
            }
        }

        Ok(summary)
    }

    /// Run one review through record → match → generate → gate → send.
    async fn handle_review(
        &self,
        account: &Account,
        client: &dyn MarketplaceClient,
        rule: &ReviewRule,
        fetched: FetchedReview,
    ) -> Result<ReviewOutcome, Error> {
        let Some(review) = self
            .store
            .insert_review_if_new(account.id, &fetched)
            .await?
        else {
            debug!(
                account_id = %account.id,
                external_id = %fetched.external_id,
                "Review already recorded, skipping"
            );
            return Ok(ReviewOutcome::Duplicate);
        };

        debug!(review_id = %review.id, rating = review.rating, "Recorded new review");

        if !rules::review_matches(rule, review.rating, review.text.as_deref()) {
            debug!(review_id = %review.id, "Review does not match rule");
            return Ok(ReviewOutcome::Skipped);
        }

        // Single generation attempt per review per pass; a failure here is
        // caught at the review-loop boundary.
        let reply = self
            .generator
            .generate(&ReplyContext {
                review_text: review.text.as_deref(),
                rating: review.rating,
                product_name: review.product_name.as_deref(),
                customer_name: review.customer_name.as_deref(),
                tone: rule.tone,
                custom_instructions: rule.custom_instructions.as_deref(),
            })
            .await?;

        let decision = moderation::decide(rule, review.rating);
        let status = match decision {
            ModerationDecision::Pending => ModerationStatus::Pending,
            ModerationDecision::Auto => ModerationStatus::Auto,
        };

        self.store
            .record_response(review.id, &reply.text, reply.tokens_used, reply.cost, status)
            .await?;
        self.store
            .record_llm_call(
                review.id,
                &reply.provider,
                &reply.model,
                reply.input_tokens,
                reply.output_tokens,
                reply.cost,
            )
            .await?;

        match decision {
            ModerationDecision::Pending => {
                info!(review_id = %review.id, rating = review.rating, "Reply queued for moderation");
                if let Some(tx) = &self.moderation_tx {
                    let _ = tx
                        .send(ModerationEvent {
                            review_id: review.id,
                            account_id: account.id,
                            rating: review.rating,
                            response_text: reply.text,
                        })
                        .await;
                }
                Ok(ReviewOutcome::PendingModeration)
            }
            ModerationDecision::Auto if self.auto_send => {
                match client.submit_reply(&review.external_id, &reply.text).await {
                    Ok(()) => {
                        self.store.mark_sent(review.id, Utc::now()).await?;
                        info!(review_id = %review.id, "Reply auto-sent");
                        Ok(ReviewOutcome::Sent)
                    }
                    Err(e) => {
                        warn!(
                            review_id = %review.id,
                            error = %e,
                            "Reply submission failed, will retry next batch"
                        );
                        self.store
                            .record_send_error(review.id, &e.to_string())
                            .await?;
                        Ok(ReviewOutcome::SendFailed)
                    }
                }
            }
            ModerationDecision::Auto => {
                debug!(review_id = %review.id, "Auto-send disabled, reply held");
                Ok(ReviewOutcome::Held)
            }
        }
    }

    /// Apply an external moderation decision to a pending review.
    ///
    /// Approval authorizes sending regardless of the auto-send toggle; a
    /// failed submission leaves the review approved-but-unsent for the
    /// retry pass. Rejection is terminal.
    pub async fn apply_moderation(&self, review_id: Uuid, approved: bool) -> Result<(), Error> {
        let review = self
            .store
            .get_review(review_id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "review".to_string(),
                id: review_id.to_string(),
            })?;

        if review.moderation_status != ModerationStatus::Pending {
            return Err(ValidationError::ModerationState {
                review_id,
                status: review.moderation_status.as_str().to_string(),
            }
            .into());
        }

        if !approved {
            self.store
                .set_moderation_status(review_id, ModerationStatus::Rejected)
                .await?;
            info!(review_id = %review_id, "Reply rejected by moderator");
            return Ok(());
        }

        self.store
            .set_moderation_status(review_id, ModerationStatus::Approved)
            .await?;
        info!(review_id = %review_id, "Reply approved by moderator");

        let text = review.response_text.as_deref().ok_or_else(|| {
            DatabaseError::Constraint(format!(
                "pending review {review_id} has no response text"
            ))
        })?;

        match self.submit_for(&review, text).await {
            Ok(()) => {
                self.store.mark_sent(review_id, Utc::now()).await?;
                info!(review_id = %review_id, "Approved reply sent");
            }
            Err(e) => {
                warn!(
                    review_id = %review_id,
                    error = %e,
                    "Approved reply submission failed, will retry next batch"
                );
                self.store
                    .record_send_error(review_id, &e.to_string())
                    .await?;
            }
        }
        Ok(())
    }

    /// Re-attempt submission for generated-but-unsent replies.
    ///
    /// Covers approved replies always, and auto replies when the auto-send
    /// toggle is on. At-least-once: a reply that was delivered but not
    /// recorded as sent may be submitted again.
    pub async fn retry_unsent(&self) -> usize {
        let statuses = if self.auto_send {
            vec![ModerationStatus::Auto, ModerationStatus::Approved]
        } else {
            vec![ModerationStatus::Approved]
        };

        let unsent = match self.store.unsent_reviews(&statuses).await {
            Ok(unsent) => unsent,
            Err(e) => {
                error!(error = %e, "Failed to query unsent replies");
                return 0;
            }
        };
        if unsent.is_empty() {
            return 0;
        }
        info!(count = unsent.len(), "Retrying unsent replies");

        let mut by_account: HashMap<Uuid, Vec<Review>> = HashMap::new();
        for review in unsent {
            by_account.entry(review.account_id).or_default().push(review);
        }

        let mut sent = 0;
        for (account_id, reviews) in by_account {
            let client = match self.client_for_account(account_id).await {
                Ok(client) => client,
                Err(e) => {
                    warn!(account_id = %account_id, error = %e, "Cannot build client for retry");
                    continue;
                }
            };

            for review in reviews {
                let Some(text) = review.response_text.as_deref() else {
                    continue;
                };
                match client.submit_reply(&review.external_id, text).await {
                    Ok(()) => {
                        if let Err(e) = self.store.mark_sent(review.id, Utc::now()).await {
                            error!(review_id = %review.id, error = %e, "Failed to mark reply sent");
                        } else {
                            info!(review_id = %review.id, "Unsent reply delivered");
                            sent += 1;
                        }
                    }
                    Err(e) => {
                        warn!(review_id = %review.id, error = %e, "Retry submission failed");
                        let _ = self
                            .store
                            .record_send_error(review.id, &e.to_string())
                            .await;
                    }
                }
            }
        }
        sent
    }

    async fn submit_for(&self, review: &Review, text: &str) -> Result<(), Error> {
        let client = self.client_for_account(review.account_id).await?;
        client.submit_reply(&review.external_id, text).await
    }

    async fn client_for_account(
        &self,
        account_id: Uuid,
    ) -> Result<Box<dyn MarketplaceClient>, Error> {
        let account = self
            .store
            .get_account(account_id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "account".to_string(),
                id: account_id.to_string(),
            })?;
        let credential = self.credentials.reveal(&account)?;
        Ok(self.clients.client_for(&account, credential)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_records_outcomes() {
        let mut summary = BatchSummary::default();
        summary.record(ReviewOutcome::Skipped);
        summary.record(ReviewOutcome::Sent);
        summary.record(ReviewOutcome::PendingModeration);
        summary.record(ReviewOutcome::Held);
        summary.record(ReviewOutcome::SendFailed);
        summary.record(ReviewOutcome::Duplicate);

        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.generated, 4);
        assert_eq!(summary.sent, 1);
        assert_eq!(summary.pending_moderation, 1);
        assert_eq!(summary.held, 1);
        assert_eq!(summary.send_failed, 1);
    }

    #[test]
    fn summary_absorb_adds_counters() {
        let mut a = BatchSummary {
            accounts: 1,
            fetched: 3,
            fresh: 2,
            generated: 1,
            sent: 1,
            ..Default::default()
        };
        let b = BatchSummary {
            accounts: 1,
            fetched: 5,
            fresh: 1,
            skipped: 1,
            ..Default::default()
        };
        a.absorb(b);
        assert_eq!(a.accounts, 2);
        assert_eq!(a.fetched, 8);
        assert_eq!(a.fresh, 3);
        assert_eq!(a.skipped, 1);
        assert_eq!(a.sent, 1);
    }
}
