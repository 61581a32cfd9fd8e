//! Pre-submission checks on investment and withdrawal amounts
//!
//! Anything rejected here never reaches the transaction builder.

use crate::amount::FixedPointAmount;
use crate::error::{ModelError, Result};
use crate::state::Plan;

/// Fail with `PlanRangeViolation` unless min_amount <= amount <= max_amount
pub fn check_plan_range(plan: &Plan, amount: &FixedPointAmount) -> Result<()> {
    if plan.accepts(amount) {
        return Ok(());
    }

    Err(ModelError::PlanRangeViolation {
        plan: plan.display_name.clone(),
        amount: amount.to_decimal_string(),
        min: plan.min_amount.to_decimal_string(),
        max: plan.max_amount.to_decimal_string(),
    })
}

/// Parse user input and check it against the chosen plan
pub fn validate_investment(plan: &Plan, text: &str) -> Result<FixedPointAmount> {
    let amount = FixedPointAmount::from_decimal_str(text)?;
    check_plan_range(plan, &amount)?;
    Ok(amount)
}

/// Smallest withdrawal the dashboard accepts, in whole tokens
pub const MIN_WITHDRAWAL_TOKENS: u64 = 1;

/// Parse a withdrawal request against the available balance
///
/// Rejects zero, anything above `available` and anything below `min`.
/// Returns the balance left after the withdrawal.
pub fn validate_withdrawal(
    available: &FixedPointAmount,
    text: &str,
    min: &FixedPointAmount,
) -> Result<FixedPointAmount> {
    let amount = FixedPointAmount::from_decimal_str(text)?;
    if amount.is_zero() {
        return Err(ModelError::InvalidAmount("withdrawal amount must be positive".to_string()));
    }
    let remaining = available.checked_sub(&amount)?;
    if amount < *min {
        return Err(ModelError::InvalidAmount(format!(
            "withdrawal {} is below the minimum {}",
            amount, min
        )));
    }
    Ok(remaining)
}
