//! Real-time authorization
//!
//! A single entry point, [`DecisionOrchestrator::authorize`], turns a
//! request into an approve/decline decision and persists the transaction
//! with its applied-rules audit trail.
//!
//! # Decision precedence
//!
//! 1. matched `step_up_auth` without evidence → `additional_auth_required`
//! 2. matched `decline` (lowest priority number first) → `rule_<id>`
//! 3. matched `sweep` with a shortfall → transfer, then re-check funds
//! 4. insufficient funds → `insufficient_funds`
//! 5. otherwise approve

pub mod error;
pub mod orchestrator;
pub mod types;


pub use error::AuthorizeError;
pub use orchestrator::DecisionOrchestrator;
pub use types::{AuthorizationRequest, AuthorizationResponse, Decision, ReasonCode};
