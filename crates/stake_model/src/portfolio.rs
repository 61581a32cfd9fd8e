//! Dashboard roll-ups over a user's positions

use crate::accrual::PositionAccrualCalculator;
use crate::amount::FixedPointAmount;
use crate::error::{ModelError, Result};
use crate::state::{Plan, Position, UserPortfolio};
use serde::{Deserialize, Serialize};

/// Progress bars on the position cards stop at this ROI. Display framing
/// only: accrual itself is never capped here.
pub const ADVISORY_ROI_CAP_PERCENT: f64 = 300.0;

/// Dashboard-level totals for one refresh cycle
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub total_contribution: FixedPointAmount,
    pub total_claimed: FixedPointAmount,
    pub total_pending: FixedPointAmount,
    pub total_level_income: FixedPointAmount,
}

/// One rendered position card
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PositionRow {
    pub position_index: u32,
    pub plan_index: u8,
    pub plan_name: String,
    pub principal: FixedPointAmount,
    pub reward_claimed: FixedPointAmount,
    pub claimable: FixedPointAmount,
    pub last_claim_timestamp: u64,
    /// Display-only, may carry float rounding
    pub roi_percent: f64,
    /// Display-only, clamped to ADVISORY_ROI_CAP_PERCENT
    pub roi_progress_percent: f64,
}

/// Look up a plan by index in one snapshot's plan set
pub fn find_plan(plans: &[Plan], plan_index: u8) -> Result<&Plan> {
    plans
        .iter()
        .find(|p| p.plan_index == plan_index)
        .ok_or(ModelError::UnknownPlan(plan_index))
}

/// Positions in ascending position_index order
fn ordered(positions: &[Position]) -> Vec<&Position> {
    let mut sorted: Vec<&Position> = positions.iter().collect();
    sorted.sort_by_key(|p| p.position_index);
    sorted
}

pub struct PortfolioAggregator;

impl PortfolioAggregator {
    /// Sum of claimable reward over every position, each against its own plan
    ///
    /// `positions` and `plans` must come from the same refresh cycle; the
    /// model cannot detect a mixed snapshot.
    pub fn aggregate_claimable(
        positions: &[Position],
        plans: &[Plan],
        evaluation_time: u64,
    ) -> Result<FixedPointAmount> {
        ordered(positions)
            .into_iter()
            .try_fold(FixedPointAmount::ZERO, |total, position| {
                let plan = find_plan(plans, position.plan_index)?;
                let claimable =
                    PositionAccrualCalculator::compute_claimable(position, plan, evaluation_time)?;
                total.checked_add(&claimable)
            })
    }

    /// reward_claimed / principal * 100, or 0 for a zero principal
    ///
    /// Float result, for display only.
    pub fn aggregate_return_on_investment(position: &Position) -> f64 {
        if position.principal.is_zero() {
            return 0.0;
        }
        position.reward_claimed_so_far.to_f64_lossy() / position.principal.to_f64_lossy() * 100.0
    }

    /// ROI clamped to `cap_percent`, for progress bars
    pub fn roi_progress(position: &Position, cap_percent: f64) -> f64 {
        Self::aggregate_return_on_investment(position).min(cap_percent)
    }

    pub fn summarize(
        portfolio: &UserPortfolio,
        plans: &[Plan],
        evaluation_time: u64,
    ) -> Result<PortfolioSummary> {
        Ok(PortfolioSummary {
            total_contribution: portfolio.total_contribution,
            total_claimed: portfolio.total_claimed_reward,
            total_pending: Self::aggregate_claimable(&portfolio.positions, plans, evaluation_time)?,
            total_level_income: portfolio.total_level_income,
        })
    }

    /// Per-position cards, ascending by position_index
    pub fn position_rows(
        positions: &[Position],
        plans: &[Plan],
        evaluation_time: u64,
    ) -> Result<Vec<PositionRow>> {
        ordered(positions)
            .into_iter()
            .map(|position| {
                let plan = find_plan(plans, position.plan_index)?;
                let claimable =
                    PositionAccrualCalculator::compute_claimable(position, plan, evaluation_time)?;
                Ok(PositionRow {
                    position_index: position.position_index,
                    plan_index: position.plan_index,
                    plan_name: plan.display_name.clone(),
                    principal: position.principal,
                    reward_claimed: position.reward_claimed_so_far,
                    claimable,
                    last_claim_timestamp: position.last_claim_timestamp,
                    roi_percent: Self::aggregate_return_on_investment(position),
                    roi_progress_percent: Self::roi_progress(position, ADVISORY_ROI_CAP_PERCENT),
                })
            })
            .collect()
    }
}
