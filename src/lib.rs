//! cardgate - Real-Time Payment Authorization
//!
//! Approve/decline decisions within a sub-second budget, combining static
//! risk rules, fuzzy merchant matching, behavioral anomaly scoring and a
//! just-in-time balance sweep, with card data handled in tokenized form.
//!
//! # Modules
//!
//! - [`authorization`] - Request/response types and the decision orchestrator
//! - [`rules`] - Rule models, condition registry, fuzzy matcher, evaluator
//! - [`anomaly`] - Behavioral anomaly detector
//! - [`transfer`] - Fund transfer coordinator (the only balance writer)
//! - [`tokenization`] - Luhn, tokens, fingerprints, AES-256-CBC, sanitizer
//! - [`enrichment`] - Merchant enrichment provider contract
//! - [`account`] - Accounts and identifier resolution
//! - [`transaction`] - Transaction record and status state machine
//! - [`store`] - Storage traits and in-memory implementations
//! - [`db`] - PostgreSQL pool wrapper
//! - [`config`] / [`logging`] - Application config and tracing setup

pub mod config;
pub mod logging;

// Persistence
pub mod db;
pub mod store;

// Domain records
pub mod account;
pub mod transaction;

// Decision components
pub mod anomaly;
pub mod authorization;
pub mod enrichment;
pub mod rules;
pub mod tokenization;
pub mod transfer;

// Convenient re-exports at crate root
pub use account::{Account, AccountStatus, PgAccountRepository};
pub use authorization::{
    AuthorizationRequest, AuthorizationResponse, Decision, DecisionOrchestrator, ReasonCode,
};
pub use rules::{PgRuleRepository, Rule, RuleAction, RuleResult, RuleScope};
pub use store::Stores;
pub use transaction::{PgTransactionRepository, Transaction, TransactionStatus};
pub use transfer::FundTransferCoordinator;
