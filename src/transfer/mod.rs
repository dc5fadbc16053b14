//! Fund transfers between accounts
//!
//! The only place account balances change. Used by the authorization
//! pipeline to sweep funds from a linked account to cover a shortfall.
//!
//! # Safety Invariants
//!
//! 1. **Lock-Before-Read**: both rows are locked before either balance is read
//! 2. **Canonical Order**: rows are locked in ascending account-id order
//! 3. **All-or-Nothing**: any failure rolls the whole unit back
//! 4. **No Overdraft**: a transfer never leaves the source negative

pub mod coordinator;
pub mod error;

pub use coordinator::FundTransferCoordinator;
pub use error::TransferError;
