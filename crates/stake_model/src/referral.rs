//! Downline (referral tree) summaries
//!
//! The walker never performs reads itself. Callers hand it lookup closures
//! over data they already fetched, so reads can be issued concurrently while
//! the aggregation stays a sequential fold.

use crate::amount::FixedPointAmount;
use crate::error::Result;
use crate::state::{Address, ReferralMember, UserPortfolio};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Members of one referral level, in read order
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelSummary {
    pub level: u8,
    pub members: Vec<ReferralMember>,
    pub active_count: usize,
    pub total_volume: FixedPointAmount,
}

impl LevelSummary {
    pub fn member_count(&self) -> usize {
        self.members.len()
    }
}

/// Every level from 1 to the walker's max depth
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamSummary {
    pub levels: Vec<LevelSummary>,
    pub total_members: usize,
    pub total_active: usize,
    pub total_volume: FixedPointAmount,
}

impl TeamSummary {
    pub fn level(&self, level: u8) -> Option<&LevelSummary> {
        self.levels.iter().find(|l| l.level == level)
    }
}

pub struct ReferralTreeWalker {
    max_depth: u8,
}

impl ReferralTreeWalker {
    /// `max_depth` of 0 is treated as 1: direct referrals are always walked
    pub fn new(max_depth: u8) -> Self {
        Self {
            max_depth: max_depth.max(1),
        }
    }

    pub fn max_depth(&self) -> u8 {
        self.max_depth
    }

    /// Summarize one level of referral addresses
    ///
    /// A failed portfolio read does not abort the summary: the member is
    /// recorded as not invested with zero investment, and the failure is
    /// logged.
    pub fn summarize_level<F, E>(
        addresses: &[Address],
        level: u8,
        mut fetch_portfolio: F,
    ) -> Result<LevelSummary>
    where
        F: FnMut(&Address) -> core::result::Result<UserPortfolio, E>,
        E: fmt::Display,
    {
        let members: Vec<ReferralMember> = addresses
            .iter()
            .map(|address| match fetch_portfolio(address) {
                Ok(portfolio) => ReferralMember::from_portfolio(address.clone(), level, &portfolio),
                Err(e) => {
                    log::warn!(
                        "Level {} member {} unreadable, shown as inactive: {}",
                        level,
                        address,
                        e
                    );
                    ReferralMember::degraded(address.clone(), level)
                }
            })
            .collect();

        let active_count = members.iter().filter(|m| m.has_invested).count();
        let total_volume =
            FixedPointAmount::checked_sum(members.iter().map(|m| &m.total_investment))?;

        Ok(LevelSummary {
            level,
            members,
            active_count,
            total_volume,
        })
    }

    /// Walk the downline of `root` level by level up to max depth
    ///
    /// Each address is visited at most once. A failed referral-list read
    /// contributes no children for that address.
    pub fn walk<R, P, E1, E2>(
        &self,
        root: &Address,
        mut referrals_of: R,
        mut portfolio_of: P,
    ) -> Result<TeamSummary>
    where
        R: FnMut(&Address) -> core::result::Result<Vec<Address>, E1>,
        P: FnMut(&Address) -> core::result::Result<UserPortfolio, E2>,
        E1: fmt::Display,
        E2: fmt::Display,
    {
        let mut visited: HashSet<Address> = HashSet::new();
        visited.insert(root.clone());

        let mut frontier = vec![root.clone()];
        let mut levels = Vec::with_capacity(self.max_depth as usize);

        for level in 1..=self.max_depth {
            let mut next = Vec::new();
            for parent in &frontier {
                match referrals_of(parent) {
                    Ok(children) => {
                        for child in children {
                            if visited.insert(child.clone()) {
                                next.push(child);
                            }
                        }
                    }
                    Err(e) => log::warn!("Referral list for {} unreadable: {}", parent, e),
                }
            }

            levels.push(Self::summarize_level(&next, level, &mut portfolio_of)?);
            frontier = next;
        }

        let total_members = levels.iter().map(|l| l.member_count()).sum();
        let total_active = levels.iter().map(|l| l.active_count).sum();
        let total_volume = FixedPointAmount::checked_sum(levels.iter().map(|l| &l.total_volume))?;

        Ok(TeamSummary {
            levels,
            total_members,
            total_active,
            total_volume,
        })
    }
}

/// Badge earned from the number of direct referrals
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferralRank {
    Bronze,
    Silver,
    Gold,
    Diamond,
}

impl ReferralRank {
    pub fn from_direct_count(direct_referrals: usize) -> Self {
        match direct_referrals {
            n if n >= 20 => ReferralRank::Diamond,
            n if n >= 10 => ReferralRank::Gold,
            n if n >= 5 => ReferralRank::Silver,
            _ => ReferralRank::Bronze,
        }
    }

    /// Direct referral count the rank's progress bar fills at
    fn progress_target(self) -> Option<usize> {
        match self {
            ReferralRank::Bronze => Some(5),
            ReferralRank::Silver => Some(10),
            ReferralRank::Gold => Some(20),
            ReferralRank::Diamond => None,
        }
    }

    /// Percentage toward the rank's bar, display-only
    pub fn progress_percent(direct_referrals: usize) -> f64 {
        match Self::from_direct_count(direct_referrals).progress_target() {
            Some(target) => (direct_referrals as f64 / target as f64 * 100.0).min(100.0),
            None => 100.0,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ReferralRank::Bronze => "Bronze",
            ReferralRank::Silver => "Silver",
            ReferralRank::Gold => "Gold",
            ReferralRank::Diamond => "Diamond",
        }
    }
}
