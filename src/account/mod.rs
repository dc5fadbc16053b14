//! Accounts: balances, status, sweep configuration and behavior baselines
//!
//! PostgreSQL storage lives in [`repository`]; lookups by any caller-facing
//! identifier go through [`resolver::resolve_account`].

pub mod models;
pub mod repository;
pub mod resolver;

pub use models::{Account, AccountStatus, AmountRange, BehaviorBaseline, SweepConfig};
pub use repository::{PgAccountRepository, PgTransferUnit};
pub use resolver::resolve_account;
