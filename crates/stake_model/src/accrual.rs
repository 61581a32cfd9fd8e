//! Linear per-minute reward accrual for a single position
//!
//! claimable = principal * rate * elapsed_minutes / RATE_DENOMINATOR
//! elapsed_minutes = floor((evaluation_time - last_claim) / 60)
//!
//! No partial minutes, no compounding and no ROI cap: any ceiling is the
//! contract's business, not this layer's.

use crate::amount::{FixedPointAmount, U256};
use crate::error::{ModelError, Result};
use crate::math::mul_div_floor;
use crate::state::{Plan, Position};

/// Rates are expressed in 1/10000 of the principal per minute
pub const RATE_DENOMINATOR: u64 = 10_000;

pub const SECONDS_PER_MINUTE: u64 = 60;

/// principal * rate * minutes / RATE_DENOMINATOR, floored once at the end
pub fn accrue(
    principal: &FixedPointAmount,
    rate_per_minute: u64,
    minutes: u64,
) -> Result<FixedPointAmount> {
    if minutes == 0 || rate_per_minute == 0 {
        return Ok(FixedPointAmount::ZERO);
    }

    // u64 * u64 always fits u128
    let rate_minutes = U256::from(rate_per_minute as u128 * minutes as u128);

    mul_div_floor(principal.raw(), rate_minutes, U256::from(RATE_DENOMINATOR))
        .map(FixedPointAmount::from_raw)
        .ok_or(ModelError::Overflow)
}

pub struct PositionAccrualCalculator;

impl PositionAccrualCalculator {
    /// Whole minutes since the position's last claim
    pub fn elapsed_minutes(position: &Position, evaluation_time: u64) -> Result<u64> {
        let elapsed_secs = evaluation_time
            .checked_sub(position.last_claim_timestamp)
            .ok_or(ModelError::InvalidEvaluationTime {
                evaluation_time,
                last_claim: position.last_claim_timestamp,
            })?;

        Ok(elapsed_secs / SECONDS_PER_MINUTE)
    }

    /// Reward currently claimable on `position` as of `evaluation_time`
    ///
    /// `plan` must be the plan the position was opened in.
    pub fn compute_claimable(
        position: &Position,
        plan: &Plan,
        evaluation_time: u64,
    ) -> Result<FixedPointAmount> {
        if plan.plan_index != position.plan_index {
            return Err(ModelError::UnknownPlan(position.plan_index));
        }

        let minutes = Self::elapsed_minutes(position, evaluation_time)?;
        accrue(&position.principal, plan.reward_rate_per_minute, minutes)
    }
}
