//! Merchant enrichment
//!
//! The production data source is external; the orchestrator only relies on
//! the [`EnrichmentProvider`] contract. Every call carries the caller's
//! deadline, and the orchestrator drops the call future once that deadline
//! passes, so a slow provider is cancelled rather than left running.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

use crate::rules::fuzzy::clean_merchant_name;
use crate::transaction::Transaction;

/// Data returned by an enrichment provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedData {
    /// Canonical merchant name; when present, merchant-name conditions
    /// compare against it directly instead of fuzzy matching
    pub normalized_merchant_name: Option<String>,
    pub merchant_category_code: Option<String>,
    pub merchant_country: Option<String>,
    pub merchant_risk_score: Option<f64>,
    pub source: String,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EnrichmentError {
    #[error("Enrichment deadline exceeded")]
    Timeout,

    #[error("No enrichment data for merchant")]
    NotFound,

    #[error("Enrichment provider unavailable: {0}")]
    Unavailable(String),
}

impl EnrichmentError {
    pub fn code(&self) -> &'static str {
        match self {
            EnrichmentError::Timeout => "ENRICHMENT_TIMEOUT",
            EnrichmentError::NotFound => "ENRICHMENT_NOT_FOUND",
            EnrichmentError::Unavailable(_) => "ENRICHMENT_UNAVAILABLE",
        }
    }
}

/// Pluggable merchant enrichment source
#[async_trait]
pub trait EnrichmentProvider: Send + Sync {
    /// Provider name for logging
    fn name(&self) -> &'static str;

    /// Enrich a pending transaction.
    ///
    /// Implementations must not keep working past `deadline`.
    async fn enrich(
        &self,
        transaction: &Transaction,
        deadline: Instant,
    ) -> Result<EnrichedData, EnrichmentError>;
}

/// Simulated provider backed by an in-process merchant directory.
///
/// Lookups are keyed by the cleaned merchant name, so processor prefixes
/// and store numbers do not defeat a hit. An optional artificial latency
/// models a remote call.
pub struct DirectoryEnrichmentProvider {
    directory: HashMap<String, EnrichedData>,
    latency: Duration,
}

impl DirectoryEnrichmentProvider {
    pub fn new() -> Self {
        Self {
            directory: HashMap::new(),
            latency: Duration::ZERO,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Register a merchant under its raw (uncleaned) name
    pub fn with_merchant(mut self, raw_name: &str, data: EnrichedData) -> Self {
        self.directory.insert(directory_key(raw_name), data);
        self
    }

    pub fn len(&self) -> usize {
        self.directory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directory.is_empty()
    }
}

impl Default for DirectoryEnrichmentProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn directory_key(name: &str) -> String {
    clean_merchant_name(name).to_lowercase()
}

#[async_trait]
impl EnrichmentProvider for DirectoryEnrichmentProvider {
    fn name(&self) -> &'static str {
        "directory"
    }

    async fn enrich(
        &self,
        transaction: &Transaction,
        deadline: Instant,
    ) -> Result<EnrichedData, EnrichmentError> {
        if !self.latency.is_zero() {
            let ready_at = Instant::now() + self.latency;
            if ready_at > deadline {
                tokio::time::sleep_until(deadline).await;
                return Err(EnrichmentError::Timeout);
            }
            tokio::time::sleep_until(ready_at).await;
        }

        let name = transaction
            .merchant_name
            .as_deref()
            .ok_or(EnrichmentError::NotFound)?;

        self.directory
            .get(&directory_key(name))
            .cloned()
            .ok_or(EnrichmentError::NotFound)
    }
}
