//! Error taxonomy for the accrual model

use crate::amount::FixedPointAmount;
use thiserror::Error;

/// Every failure the pure model can report.
///
/// Nothing in this crate panics on contract or user input; callers receive
/// one of these and decide how to present it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// Malformed or out-of-range decimal string, or negative/fractional raw integer
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Subtraction would produce a negative amount
    #[error("amount underflow: {minuend} - {subtrahend} is negative")]
    Underflow {
        minuend: FixedPointAmount,
        subtrahend: FixedPointAmount,
    },

    /// Exact result does not fit the 256-bit raw domain
    #[error("amount overflow")]
    Overflow,

    /// Evaluation time precedes a position's last claim (clock skew or stale data)
    #[error("evaluation time {evaluation_time} precedes last claim at {last_claim}")]
    InvalidEvaluationTime { evaluation_time: u64, last_claim: u64 },

    /// Position references a plan absent from the supplied plan set
    #[error("unknown plan index {0}")]
    UnknownPlan(u8),

    /// Proposed investment falls outside the plan's [min, max] range
    #[error("amount {amount} is outside {plan} range [{min}, {max}]")]
    PlanRangeViolation {
        plan: String,
        amount: String,
        min: String,
        max: String,
    },
}

pub type Result<T> = core::result::Result<T, ModelError>;
