//! Snapshot data model (mirror of the staking contract's read interface)

use crate::accrual::accrue;
use crate::amount::FixedPointAmount;
use crate::error::{ModelError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 20-byte account address, stored as lowercase `0x`-prefixed hex
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Address {
    type Err = String;

    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        let hex = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or_else(|| format!("address {:?} is missing the 0x prefix", s))?;

        if hex.len() != 40 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(format!("address {:?} is not 20 bytes of hex", s));
        }

        Ok(Address(format!("0x{}", hex.to_ascii_lowercase())))
    }
}

impl TryFrom<String> for Address {
    type Error = String;

    fn try_from(s: String) -> core::result::Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Address> for String {
    fn from(a: Address) -> Self {
        a.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reward tiers offered by the staking contract
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlanTier {
    Starter,
    Silver,
    Gold,
    Diamond,
}

impl PlanTier {
    pub const ALL: [PlanTier; 4] =
        [PlanTier::Starter, PlanTier::Silver, PlanTier::Gold, PlanTier::Diamond];

    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    pub fn index(self) -> u8 {
        match self {
            PlanTier::Starter => 0,
            PlanTier::Silver => 1,
            PlanTier::Gold => 2,
            PlanTier::Diamond => 3,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            PlanTier::Starter => "Starter",
            PlanTier::Silver => "Silver",
            PlanTier::Gold => "Gold",
            PlanTier::Diamond => "Diamond",
        }
    }
}

/// Reward tier definition, refreshed from the contract each poll
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub plan_index: u8,
    pub display_name: String,
    pub min_amount: FixedPointAmount,
    pub max_amount: FixedPointAmount,
    /// Reward per minute in units of 1/10000 of the principal
    pub reward_rate_per_minute: u64,
    pub total_raised: FixedPointAmount,
    pub total_reward_distributed: FixedPointAmount,
}

impl Plan {
    /// Build a plan, enforcing min <= max
    pub fn new(
        plan_index: u8,
        min_amount: FixedPointAmount,
        max_amount: FixedPointAmount,
        reward_rate_per_minute: u64,
        total_raised: FixedPointAmount,
        total_reward_distributed: FixedPointAmount,
    ) -> Result<Self> {
        if min_amount > max_amount {
            return Err(ModelError::InvalidAmount(format!(
                "plan {} minimum {} exceeds maximum {}",
                plan_index, min_amount, max_amount
            )));
        }

        let display_name = PlanTier::from_index(plan_index)
            .map(|t| t.display_name().to_string())
            .unwrap_or_else(|| format!("Plan {}", plan_index));

        Ok(Self {
            plan_index,
            display_name,
            min_amount,
            max_amount,
            reward_rate_per_minute,
            total_raised,
            total_reward_distributed,
        })
    }

    pub fn tier(&self) -> Option<PlanTier> {
        PlanTier::from_index(self.plan_index)
    }

    /// Check if an amount falls within [min_amount, max_amount]
    pub fn accepts(&self, amount: &FixedPointAmount) -> bool {
        *amount >= self.min_amount && *amount <= self.max_amount
    }

    /// Reward one minute of accrual yields on `principal`
    pub fn reward_per_minute(&self, principal: &FixedPointAmount) -> Result<FixedPointAmount> {
        accrue(principal, self.reward_rate_per_minute, 1)
    }

    /// Reward `minutes` of uninterrupted accrual yields on `principal`
    ///
    /// Used for the per-hour / per-day projections on the plan cards.
    pub fn projected_reward(
        &self,
        principal: &FixedPointAmount,
        minutes: u64,
    ) -> Result<FixedPointAmount> {
        accrue(principal, self.reward_rate_per_minute, minutes)
    }
}

/// One on-chain contribution into a plan
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub plan_index: u8,
    pub principal: FixedPointAmount,
    /// Only ever grows, via confirmed claims
    pub reward_claimed_so_far: FixedPointAmount,
    /// Seconds since epoch; only moves forward
    pub last_claim_timestamp: u64,
    pub position_index: u32,
}

/// A user's full state for one refresh cycle
///
/// Rebuilt wholesale from contract reads every cycle, never patched.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPortfolio {
    /// Contract-reported; authoritative over the positions' sum
    pub total_contribution: FixedPointAmount,
    pub total_claimed_reward: FixedPointAmount,
    pub total_level_income: FixedPointAmount,
    pub positions: Vec<Position>,
    pub contribution_count: u32,
    pub exists: bool,
}

impl UserPortfolio {
    pub fn has_invested(&self) -> bool {
        self.contribution_count > 0
    }

    /// Exact sum of every loaded position's principal
    pub fn positions_principal(&self) -> Result<FixedPointAmount> {
        FixedPointAmount::checked_sum(self.positions.iter().map(|p| &p.principal))
    }

    /// Returns (contract_total, summed_positions) when they disagree
    ///
    /// Only meaningful when every position has been loaded.
    pub fn contribution_mismatch(&self) -> Result<Option<(FixedPointAmount, FixedPointAmount)>> {
        let summed = self.positions_principal()?;
        if summed == self.total_contribution {
            Ok(None)
        } else {
            Ok(Some((self.total_contribution, summed)))
        }
    }
}

/// One downline member as shown in the team view
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralMember {
    pub address: Address,
    /// 1 = direct referral
    pub level: u8,
    /// Always equals contribution_count > 0
    pub has_invested: bool,
    pub total_investment: FixedPointAmount,
    pub contribution_count: u32,
}

impl ReferralMember {
    pub fn from_portfolio(address: Address, level: u8, portfolio: &UserPortfolio) -> Self {
        Self {
            address,
            level,
            has_invested: portfolio.has_invested(),
            total_investment: portfolio.total_contribution,
            contribution_count: portfolio.contribution_count,
        }
    }

    /// Record for a member whose portfolio could not be read
    pub fn degraded(address: Address, level: u8) -> Self {
        Self {
            address,
            level,
            has_invested: false,
            total_investment: FixedPointAmount::ZERO,
            contribution_count: 0,
        }
    }
}
