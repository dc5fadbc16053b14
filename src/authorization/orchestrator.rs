//! Decision Orchestrator
//!
//! ```text
//! request ─▶ resolve account ─▶ tokenize ─▶ create PENDING ─▶ status check
//!                                                                 │
//!   ┌─────────────────────────────────────────────────────────────┘
//!   ▼
//! enrich (≤ enrichment timeout) ─▶ load rules ─▶ evaluate + anomaly
//!                                                     │
//!   ┌─────────────────────────────────────────────────┘
//!   ▼
//! step-up ─▶ decline rule ─▶ sweep (≤ sweep timeout) ─▶ funds ─▶ approve
//!                                                                 │
//!                                         finalize + save ◀───────┘
//! ```
//!
//! `authorize` always returns a decision. Errors and panics inside the
//! pipeline become a decline; if a transaction record already exists it is
//! finalized on a best-effort basis.

use chrono::{Duration as ChronoDuration, Utc};
use futures::FutureExt;
use rust_decimal::Decimal;
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::error::AuthorizeError;
use super::types::{AuthorizationRequest, AuthorizationResponse, Decision, ReasonCode};
use crate::account::{Account, resolve_account};
use crate::anomaly::AnomalyDetector;
use crate::config::{AppConfig, AuthorizationConfig};
use crate::enrichment::EnrichmentProvider;
use crate::rules::{
    ConditionEvaluator, Rule, RuleAction, RuleResult, TransactionView, fingerprint_windows,
};
use crate::store::Stores;
use crate::tokenization::{CryptoError, TokenizationService, TokenizedCard};
use crate::transaction::{Transaction, TransactionFilter, TransactionStatus};
use crate::transfer::FundTransferCoordinator;

/// Outcome of the decision policy
#[derive(Debug, Clone, PartialEq)]
struct Verdict {
    decision: Decision,
    reason: Option<ReasonCode>,
    triggered_rule_id: Option<String>,
}

impl Verdict {
    fn approve(triggered_rule_id: Option<String>) -> Self {
        Self {
            decision: Decision::Approve,
            reason: None,
            triggered_rule_id,
        }
    }

    fn decline(reason: ReasonCode, triggered_rule_id: Option<String>) -> Self {
        Self {
            decision: Decision::Decline,
            reason: Some(reason),
            triggered_rule_id,
        }
    }
}

pub struct DecisionOrchestrator {
    stores: Stores,
    enrichment: Arc<dyn EnrichmentProvider>,
    tokenization: TokenizationService,
    evaluator: ConditionEvaluator,
    detector: AnomalyDetector,
    transfers: FundTransferCoordinator,
    config: AuthorizationConfig,
}

impl DecisionOrchestrator {
    pub fn new(
        stores: Stores,
        enrichment: Arc<dyn EnrichmentProvider>,
        tokenization: TokenizationService,
        config: &AppConfig,
    ) -> Self {
        Self {
            evaluator: ConditionEvaluator::new(config.rules.clone()),
            detector: AnomalyDetector::new(stores.transactions.clone(), config.anomaly.clone()),
            transfers: FundTransferCoordinator::new(stores.accounts.clone()),
            stores,
            enrichment,
            tokenization,
            config: config.authorization.clone(),
        }
    }

    /// Decide one request. Never fails.
    pub async fn authorize(&self, request: AuthorizationRequest) -> AuthorizationResponse {
        let started = Instant::now();
        let transaction_id = Uuid::new_v4();
        // Last persisted state of the record, kept outside the pipeline
        // future so it survives an error or panic.
        let mut record: Option<Transaction> = None;

        let outcome = AssertUnwindSafe(self.run(&request, transaction_id, started, &mut record))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => self.decline_on_error(e, transaction_id, record, started).await,
            Err(panic) => {
                let e = AuthorizeError::Panicked(panic_message(panic.as_ref()));
                self.decline_on_error(e, transaction_id, record, started).await
            }
        }
    }

    async fn run(
        &self,
        request: &AuthorizationRequest,
        transaction_id: Uuid,
        started: Instant,
        record: &mut Option<Transaction>,
    ) -> Result<AuthorizationResponse, AuthorizeError> {
        validate(request)?;

        // === 1. Resolve account ===
        let account = resolve_account(self.stores.accounts.as_ref(), &request.account_id)
            .await?
            .ok_or_else(|| AuthorizeError::AccountNotFound(request.account_id.clone()))?;

        // === 2. Tokenize and create PENDING ===
        let card = self.tokenize(request);
        let mut tx = self.build_transaction(request, transaction_id, &account, card.as_ref());
        self.stores.transactions.create(&tx).await?;
        *record = Some(tx.clone());
        debug!(transaction_id = %transaction_id, account_id = %account.account_id, "Pending transaction created");

        if let Some(Err(e)) = card {
            return Err(e.into());
        }

        // === 3. Account status ===
        if !account.is_active() {
            return Err(AuthorizeError::AccountInactive(account.account_id, account.status));
        }

        // === 4. Enrichment ===
        self.enrich(&mut tx).await;

        // === 5. Rules ===
        let mut rules = self
            .stores
            .rules
            .find_active_by_account(account.account_id)
            .await?;
        rules.extend(self.stores.rules.find_active_global().await?);

        // === 6. Evaluate + anomaly ===
        let view = self.build_view(&tx, &rules).await;
        let mut applied = self.evaluator.evaluate_rules(&view, &rules);
        applied.extend(self.detector.detect(&tx, &account).await);
        tx.applied_rules = applied;
        *record = Some(tx.clone());

        // === 7. Decision policy ===
        let verdict = self.decide(request, &tx, &account).await?;

        // === 8. Finalize ===
        let status = match verdict.decision {
            Decision::Approve => TransactionStatus::Approved,
            Decision::Decline => TransactionStatus::Declined,
        };
        let processing_time_ms = elapsed_ms(started);
        tx.finalize(
            status,
            verdict.reason.as_ref().map(ToString::to_string),
            processing_time_ms,
        )?;
        self.stores.transactions.save(&tx).await?;

        info!(
            transaction_id = %transaction_id,
            account_id = %account.account_id,
            decision = ?verdict.decision,
            reason = ?verdict.reason.as_ref().map(ToString::to_string),
            rules_applied = tx.applied_rules.len(),
            processing_time_ms,
            "Authorization decided"
        );

        Ok(AuthorizationResponse {
            decision: verdict.decision,
            transaction_id,
            account_id: Some(account.account_id),
            reason_code: verdict.reason,
            triggered_rule_id: verdict.triggered_rule_id,
            processing_time_ms,
        })
    }

    // ========================================================================
    // Pipeline steps
    // ========================================================================

    /// Tokenize a raw card number, if one was supplied for a card payment
    fn tokenize(
        &self,
        request: &AuthorizationRequest,
    ) -> Option<Result<TokenizedCard, CryptoError>> {
        if !request.is_card_payment() {
            return None;
        }
        let pan = request.card_number.as_deref()?;
        let month = request.expiry_month.unwrap_or_default();
        let year = request.expiry_year.unwrap_or_default();
        Some(self.tokenization.tokenize_card(pan, month, year))
    }

    fn build_transaction(
        &self,
        request: &AuthorizationRequest,
        transaction_id: Uuid,
        account: &Account,
        card: Option<&Result<TokenizedCard, CryptoError>>,
    ) -> Transaction {
        let external_id = request
            .external_id
            .clone()
            .unwrap_or_else(|| transaction_id.to_string());
        let mut tx = Transaction::pending(external_id, account.account_id, request.amount, &request.currency);
        tx.transaction_id = transaction_id;
        if let Some(ts) = request.timestamp {
            tx.created_at = ts;
        }
        tx.merchant_name = request.merchant_name.clone();
        tx.merchant_id = request.merchant_id.clone();
        tx.merchant_category_code = request.merchant_category_code.clone();
        tx.location = request.location.clone();
        tx.country_code = request.country_code.clone();
        tx.payment_method = request.payment_method.clone();
        tx.metadata = match &request.metadata {
            Value::Null => Value::Object(Default::default()),
            other => self.tokenization.sanitize(other),
        };

        match card {
            Some(Ok(card)) => {
                tx.payment_token = Some(card.token.clone());
                tx.card_brand = card.brand.map(|b| b.as_str().to_string());
                tx.card_last4 = Some(card.last4.clone());
                tx.expiry_month = Some(card.expiry_month);
                tx.expiry_year = Some(card.expiry_year);
                tx.card_fingerprint = Some(card.fingerprint.clone());
            }
            // Nothing from a rejected card is kept
            Some(Err(_)) => {}
            None => {
                tx.payment_token = request.payment_token.clone();
                tx.card_brand = request.card_brand.clone();
                tx.card_last4 = request.card_last4.clone();
                tx.expiry_month = request.expiry_month;
                tx.expiry_year = request.expiry_year;
                tx.card_fingerprint = request.card_fingerprint.clone();
            }
        }
        tx
    }

    /// Race the provider against the enrichment deadline. Degrades silently.
    async fn enrich(&self, tx: &mut Transaction) {
        let deadline =
            tokio::time::Instant::now() + Duration::from_millis(self.config.enrichment_timeout_ms);
        let call = self.enrichment.enrich(tx, deadline);

        match tokio::time::timeout_at(deadline, call).await {
            Ok(Ok(data)) => {
                debug!(transaction_id = %tx.transaction_id, provider = self.enrichment.name(), "Enriched");
                tx.enriched_data = Some(data);
            }
            Ok(Err(e)) => {
                warn!(
                    transaction_id = %tx.transaction_id,
                    provider = self.enrichment.name(),
                    code = e.code(),
                    error = %e,
                    "Enrichment failed, continuing unenriched"
                );
            }
            Err(_) => {
                warn!(
                    transaction_id = %tx.transaction_id,
                    provider = self.enrichment.name(),
                    timeout_ms = self.config.enrichment_timeout_ms,
                    "Enrichment timed out, continuing unenriched"
                );
            }
        }
    }

    /// Flatten the transaction and attach the fingerprint counts the rules need
    async fn build_view(&self, tx: &Transaction, rules: &[Rule]) -> TransactionView {
        let mut view = TransactionView::from_transaction(tx, Utc::now());
        let Some(fingerprint) = tx.card_fingerprint.as_deref() else {
            return view;
        };

        for window_minutes in fingerprint_windows(rules) {
            let filter = TransactionFilter {
                card_fingerprint: Some(fingerprint.to_string()),
                exclude_transaction_id: Some(tx.transaction_id),
                ..Default::default()
            }
            .window_ending_at(tx.created_at, ChronoDuration::minutes(i64::from(window_minutes)));
            match self.stores.transactions.count(&filter).await {
                Ok(count) => view = view.with_fingerprint_count(window_minutes, count),
                // Rules needing this count record the gap as an evaluation error
                Err(e) => warn!(
                    transaction_id = %tx.transaction_id,
                    window_minutes,
                    error = %e,
                    "Fingerprint count unavailable"
                ),
            }
        }
        view
    }

    /// First matching branch wins:
    /// step-up → decline rule → sweep → insufficient funds → approve
    async fn decide(
        &self,
        request: &AuthorizationRequest,
        tx: &Transaction,
        account: &Account,
    ) -> Result<Verdict, AuthorizeError> {
        let applied = &tx.applied_rules;

        if let Some(step_up) = first_match(applied, RuleAction::StepUpAuth)
            && !request.has_step_up_evidence()
        {
            return Ok(Verdict::decline(
                ReasonCode::AdditionalAuthRequired,
                Some(step_up.rule_id.clone()),
            ));
        }

        if let Some(decline) = first_match(applied, RuleAction::Decline) {
            return Ok(Verdict::decline(
                ReasonCode::Rule(decline.rule_id.clone()),
                Some(decline.rule_id.clone()),
            ));
        }

        if account.has_sufficient_funds(tx.amount) {
            return Ok(Verdict::approve(None));
        }

        if let Some(sweep) = first_match(applied, RuleAction::Sweep)
            && self.sweep(tx, account).await?
        {
            return Ok(Verdict::approve(Some(sweep.rule_id.clone())));
        }

        Ok(Verdict::decline(ReasonCode::InsufficientFunds, None))
    }

    /// Cover the shortfall from the sweep source, then re-read the balance.
    ///
    /// Returns whether the account can now cover the amount.
    async fn sweep(&self, tx: &Transaction, account: &Account) -> Result<bool, AuthorizeError> {
        let Some(source) = account.sweep_source() else {
            debug!(account_id = %account.account_id, "Sweep matched but not configured");
            return Ok(false);
        };
        let shortfall = tx.amount - account.balance;
        if shortfall <= Decimal::ZERO {
            return Ok(true);
        }

        let timeout = Duration::from_millis(self.config.sweep_timeout_ms);
        let transfer = self.transfers.transfer(source, account.account_id, shortfall);
        match tokio::time::timeout(timeout, transfer).await {
            Ok(true) => {
                info!(
                    transaction_id = %tx.transaction_id,
                    from = %source,
                    to = %account.account_id,
                    amount = %shortfall,
                    "Sweep completed"
                );
            }
            Ok(false) => {
                warn!(transaction_id = %tx.transaction_id, from = %source, "Sweep failed");
            }
            Err(_) => {
                warn!(
                    transaction_id = %tx.transaction_id,
                    from = %source,
                    timeout_ms = self.config.sweep_timeout_ms,
                    "Sweep timed out"
                );
            }
        }

        // Re-read whatever the outcome; a commit can land just as the timer fires.
        let refreshed = self
            .stores
            .accounts
            .find_by_id(account.account_id)
            .await?
            .ok_or_else(|| AuthorizeError::AccountNotFound(account.account_id.to_string()))?;
        Ok(refreshed.has_sufficient_funds(tx.amount))
    }

    // ========================================================================
    // Failure boundary
    // ========================================================================

    async fn decline_on_error(
        &self,
        e: AuthorizeError,
        transaction_id: Uuid,
        record: Option<Transaction>,
        started: Instant,
    ) -> AuthorizationResponse {
        let reason = e.reason_code();
        let processing_time_ms = elapsed_ms(started);

        if e.is_business_decline() {
            info!(transaction_id = %transaction_id, code = e.code(), reason = %reason, "Authorization declined");
        } else {
            error!(transaction_id = %transaction_id, code = e.code(), error = %e, "Authorization failed");
        }

        let account_id = record.as_ref().map(|tx| tx.account_id);
        if let Some(mut tx) = record
            && !tx.status.is_terminal()
        {
            let status = if reason == ReasonCode::SystemError {
                TransactionStatus::Failed
            } else {
                TransactionStatus::Declined
            };
            match tx.finalize(status, Some(reason.to_string()), processing_time_ms) {
                Ok(()) => {
                    if let Err(save_err) = self.stores.transactions.save(&tx).await {
                        error!(
                            transaction_id = %transaction_id,
                            error = %save_err,
                            "Could not persist final status"
                        );
                    }
                }
                Err(finalize_err) => {
                    error!(transaction_id = %transaction_id, error = %finalize_err, "Could not finalize");
                }
            }
        }

        AuthorizationResponse {
            decision: Decision::Decline,
            transaction_id,
            account_id,
            reason_code: Some(reason),
            triggered_rule_id: None,
            processing_time_ms,
        }
    }
}

fn validate(request: &AuthorizationRequest) -> Result<(), AuthorizeError> {
    if request.amount <= Decimal::ZERO {
        return Err(AuthorizeError::InvalidRequest("amount must be positive".into()));
    }
    if request.currency.trim().is_empty() {
        return Err(AuthorizeError::InvalidRequest("currency is required".into()));
    }
    if request.account_id.trim().is_empty() {
        return Err(AuthorizeError::InvalidRequest("accountId is required".into()));
    }
    if request.card_number.is_some()
        && (request.expiry_month.is_none() || request.expiry_year.is_none())
    {
        return Err(AuthorizeError::InvalidRequest(
            "card expiry is required with a card number".into(),
        ));
    }
    Ok(())
}

fn first_match(applied: &[RuleResult], action: RuleAction) -> Option<&RuleResult> {
    applied.iter().find(|r| r.is_match_for(action))
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
