//! Rule engine
//!
//! Rules are stored records with an action, a priority and a JSON
//! condition map. The [`ConditionEvaluator`] checks them against a
//! [`TransactionView`] without doing any I/O.

pub mod conditions;
pub mod evaluator;
pub mod fuzzy;
pub mod models;
pub mod repository;
pub mod view;

pub use conditions::{CardConditions, ConditionError, ConditionKind, fingerprint_windows};
pub use evaluator::{ConditionEvaluator, EvaluatorConfig};
pub use fuzzy::{FuzzyConfig, FuzzyMatcher, clean_merchant_name};
pub use models::{Rule, RuleAction, RuleResult, RuleScope};
pub use repository::PgRuleRepository;
pub use view::TransactionView;
