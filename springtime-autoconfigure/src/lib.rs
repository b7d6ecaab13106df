//! Conditional auto-configuration.
//!
//! Auto-configuration candidates are guarded by [conditions](condition::Condition), which decide
//! whether a candidate applies to the running application. Conditions can be evaluated in two
//! ways:
//!
//! * in bulk, before any candidate is loaded, using [pre-extracted metadata](metadata) - see
//!   [FilteringCondition](condition::FilteringCondition) and
//!   [filter_candidates](condition::filter_candidates)
//! * for a single candidate, using the live application state - see
//!   [Condition](condition::Condition)
//!
//! Negative decisions are not errors, but [outcomes](condition::outcome::ConditionOutcome)
//! carrying a human-readable justification.

pub mod condition;
pub mod error;
pub mod metadata;
