//! Transactions: the audited record of every authorization decision

pub mod models;
pub mod repository;

pub use models::{Transaction, TransactionError, TransactionFilter, TransactionStatus};
pub use repository::PgTransactionRepository;
