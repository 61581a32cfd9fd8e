//! One dashboard refresh: fetch a snapshot, then compute over it
//!
//! Reads that do not depend on each other are issued together with
//! `join_all`. Every cycle starts from scratch; nothing is carried over.

use crate::config::Config;
use crate::reader::{ContractReader, RawContribution, RawPlan, RawUserData, ReadError};
use futures::future::join_all;
use serde::Serialize;
use stake_model::{
    Address, FixedPointAmount, Plan, PlanTier, PortfolioAggregator, PortfolioSummary, Position,
    PositionRow, ReferralRank, ReferralTreeWalker, TeamSummary, UserPortfolio,
};
use std::collections::{HashMap, HashSet};

/// Downline reads for one cycle; failures are kept so the walk can degrade per member
#[derive(Debug, Clone, Default)]
pub struct TeamSnapshot {
    pub referrals: HashMap<Address, Result<Vec<Address>, String>>,
    pub portfolios: HashMap<Address, Result<UserPortfolio, String>>,
}

/// Everything read for one account at one evaluation time
#[derive(Debug, Clone)]
pub struct DashboardSnapshot {
    pub evaluation_time: u64,
    pub account: Address,
    pub plans: Vec<Plan>,
    pub portfolio: UserPortfolio,
    /// Contract's own pending figure; None when the read failed
    pub contract_pending: Option<FixedPointAmount>,
    /// Contract's per-position figures, indexed by position; None when a read failed
    pub contract_position_rewards: Vec<Option<FixedPointAmount>>,
    pub team: TeamSnapshot,
}

/// One position whose computed claimable differs from the contract's
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PositionDivergence {
    pub position_index: u32,
    pub contract: FixedPointAmount,
    pub computed: FixedPointAmount,
}

/// Computed dashboard for one snapshot
#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub evaluation_time: u64,
    pub rows: Vec<PositionRow>,
    pub summary: PortfolioSummary,
    pub team: TeamSummary,
    pub rank: ReferralRank,
    pub rank_progress_percent: f64,
    /// (contract total, summed principals) when they disagree
    pub contribution_mismatch: Option<(FixedPointAmount, FixedPointAmount)>,
    /// (contract pending, computed pending) when they disagree
    pub pending_divergence: Option<(FixedPointAmount, FixedPointAmount)>,
    pub position_divergences: Vec<PositionDivergence>,
}

fn plan_from_raw(plan_index: u8, raw: RawPlan) -> Result<Plan, ReadError> {
    Ok(Plan::new(
        plan_index,
        raw.min_amount,
        raw.max_amount,
        raw.reward_rate_per_minute,
        raw.total_raised,
        raw.total_reward_distributed,
    )?)
}

fn position_from_raw(position_index: u32, raw: RawContribution) -> Position {
    Position {
        plan_index: raw.plan_index,
        principal: raw.amount,
        reward_claimed_so_far: raw.reward_claimed,
        last_claim_timestamp: raw.last_claim_time,
        position_index,
    }
}

fn portfolio_from_raw(raw: RawUserData, positions: Vec<Position>) -> UserPortfolio {
    UserPortfolio {
        total_contribution: raw.total_contribution,
        total_claimed_reward: raw.total_claimed_reward,
        total_level_income: raw.total_level_income,
        positions,
        contribution_count: raw.contribution_count,
        exists: raw.exists,
    }
}

pub async fn fetch_plans<R: ContractReader>(reader: &R) -> Result<Vec<Plan>, ReadError> {
    let results = join_all(PlanTier::ALL.iter().map(|tier| reader.get_plan(tier.index()))).await;

    PlanTier::ALL
        .iter()
        .zip(results)
        .map(|(tier, raw)| plan_from_raw(tier.index(), raw?))
        .collect()
}

/// User record plus every position `0..contribution_count`
pub async fn fetch_user_portfolio<R: ContractReader>(
    reader: &R,
    address: &Address,
) -> Result<UserPortfolio, ReadError> {
    let user = reader.get_user_portfolio(address).await?;

    let reads = (0..user.contribution_count).map(|i| reader.get_position(address, i));
    let results = join_all(reads).await;
    let positions = results
        .into_iter()
        .enumerate()
        .map(|(i, raw)| Ok(position_from_raw(i as u32, raw?)))
        .collect::<Result<Vec<_>, ReadError>>()?;

    Ok(portfolio_from_raw(user, positions))
}

/// The contract's pending figure for each of `count` positions
///
/// A failed read leaves a None in that slot; the cycle goes on.
pub async fn fetch_position_rewards<R: ContractReader>(
    reader: &R,
    address: &Address,
    count: u32,
) -> Vec<Option<FixedPointAmount>> {
    let results = join_all((0..count).map(|i| reader.get_position_reward(address, i))).await;
    results
        .into_iter()
        .enumerate()
        .map(|(i, reward)| match reward {
            Ok(reward) => Some(reward),
            Err(e) => {
                log::warn!("Contract reward for {} position #{} unavailable: {}", address, i, e);
                None
            }
        })
        .collect()
}

/// Prefetch the downline of `root`, level by level, up to `depth`
///
/// Member portfolios only need the user record, not positions.
pub async fn fetch_team<R: ContractReader>(reader: &R, root: &Address, depth: u8) -> TeamSnapshot {
    let mut team = TeamSnapshot::default();
    let mut visited: HashSet<Address> = HashSet::new();
    visited.insert(root.clone());
    let mut frontier = vec![root.clone()];

    for _ in 0..depth.max(1) {
        if frontier.is_empty() {
            break;
        }

        let lists = join_all(frontier.iter().map(|a| reader.get_direct_referrals(a))).await;
        let mut next = Vec::new();
        for (parent, list) in frontier.iter().zip(lists) {
            match list {
                Ok(children) => {
                    next.extend(children.iter().filter(|c| visited.insert((*c).clone())).cloned());
                    team.referrals.insert(parent.clone(), Ok(children));
                }
                Err(e) => {
                    team.referrals.insert(parent.clone(), Err(e.to_string()));
                }
            }
        }

        let portfolios = join_all(next.iter().map(|a| reader.get_user_portfolio(a))).await;
        for (member, raw) in next.iter().zip(portfolios) {
            let entry = raw
                .map(|user| portfolio_from_raw(user, Vec::new()))
                .map_err(|e| e.to_string());
            team.portfolios.insert(member.clone(), entry);
        }

        frontier = next;
    }

    team
}

/// Read one consistent snapshot for `account`
pub async fn fetch_snapshot<R: ContractReader>(
    reader: &R,
    account: &Address,
    referral_depth: u8,
    evaluation_time: u64,
) -> Result<DashboardSnapshot, ReadError> {
    let (plans, portfolio, contract_pending, team) = futures::join!(
        fetch_plans(reader),
        fetch_user_portfolio(reader, account),
        reader.get_calculated_reward(account),
        fetch_team(reader, account, referral_depth),
    );

    let contract_pending = match contract_pending {
        Ok(pending) => Some(pending),
        Err(e) => {
            log::warn!("Contract pending reward for {} unavailable: {}", account, e);
            None
        }
    };

    let portfolio = portfolio?;
    let count = portfolio.positions.len() as u32;
    let contract_position_rewards = fetch_position_rewards(reader, account, count).await;

    Ok(DashboardSnapshot {
        evaluation_time,
        account: account.clone(),
        plans: plans?,
        portfolio,
        contract_pending,
        contract_position_rewards,
        team,
    })
}

/// Compute the dashboard over one snapshot
pub fn compute_view(
    snapshot: &DashboardSnapshot,
    referral_depth: u8,
) -> stake_model::Result<DashboardView> {
    let now = snapshot.evaluation_time;
    let portfolio = &snapshot.portfolio;

    let rows = PortfolioAggregator::position_rows(&portfolio.positions, &snapshot.plans, now)?;
    let summary = PortfolioAggregator::summarize(portfolio, &snapshot.plans, now)?;

    let contribution_mismatch = portfolio.contribution_mismatch()?;
    if let Some((contract, summed)) = contribution_mismatch {
        log::warn!(
            "Contribution total mismatch for {}: contract {} vs positions {}",
            snapshot.account,
            contract,
            summed
        );
    }

    let pending_divergence = match snapshot.contract_pending {
        Some(contract) if contract != summary.total_pending => {
            log::warn!(
                "Pending reward divergence for {}: contract {} vs computed {}",
                snapshot.account,
                contract,
                summary.total_pending
            );
            Some((contract, summary.total_pending))
        }
        _ => None,
    };

    let position_divergences: Vec<PositionDivergence> = rows
        .iter()
        .filter_map(|row| {
            let slot = snapshot.contract_position_rewards.get(row.position_index as usize);
            let contract = (*slot?)?;
            if contract == row.claimable {
                return None;
            }
            log::warn!(
                "Reward divergence for {} position #{}: contract {} vs computed {}",
                snapshot.account,
                row.position_index,
                contract,
                row.claimable
            );
            Some(PositionDivergence {
                position_index: row.position_index,
                contract,
                computed: row.claimable,
            })
        })
        .collect();

    let team_reads = &snapshot.team;
    let team = ReferralTreeWalker::new(referral_depth).walk(
        &snapshot.account,
        |a| {
            team_reads
                .referrals
                .get(a)
                .cloned()
                .unwrap_or_else(|| Err("not fetched".to_string()))
        },
        |a| {
            team_reads
                .portfolios
                .get(a)
                .cloned()
                .unwrap_or_else(|| Err("not fetched".to_string()))
        },
    )?;

    let direct = team.level(1).map(|l| l.member_count()).unwrap_or(0);

    Ok(DashboardView {
        evaluation_time: now,
        rows,
        summary,
        team,
        rank: ReferralRank::from_direct_count(direct),
        rank_progress_percent: ReferralRank::progress_percent(direct),
        contribution_mismatch,
        pending_divergence,
        position_divergences,
    })
}

/// Fetch and compute the configured account's dashboard at `now`
pub async fn refresh<R: ContractReader>(
    reader: &R,
    config: &Config,
    now: u64,
) -> anyhow::Result<DashboardView> {
    let snapshot = fetch_snapshot(reader, &config.account, config.referral_depth, now).await?;
    log::debug!(
        "Snapshot at {}: {} positions, {} plans, {} downline members read",
        now,
        snapshot.portfolio.positions.len(),
        snapshot.plans.len(),
        snapshot.team.portfolios.len()
    );
    Ok(compute_view(&snapshot, config.referral_depth)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::tests::{addr, MemoryReader};
    use crate::reader::{AccountState, ContractState};

    const T0: u64 = 1_700_000_000;

    fn tokens(n: u64) -> FixedPointAmount {
        FixedPointAmount::from_tokens(n)
    }

    fn raw_plan(min: u64, max: u64, rate: u64) -> RawPlan {
        RawPlan {
            min_amount: tokens(min),
            max_amount: tokens(max),
            reward_rate_per_minute: rate,
            total_raised: FixedPointAmount::ZERO,
            total_reward_distributed: FixedPointAmount::ZERO,
        }
    }

    fn user(total: u64, count: u32) -> RawUserData {
        RawUserData {
            total_contribution: tokens(total),
            exists: true,
            contribution_count: count,
            total_claimed_reward: FixedPointAmount::ZERO,
            total_level_income: FixedPointAmount::ZERO,
        }
    }

    fn contribution(plan_index: u8, amount: u64) -> RawContribution {
        RawContribution {
            plan_index,
            amount: tokens(amount),
            reward_claimed: FixedPointAmount::ZERO,
            last_claim_time: T0,
        }
    }

    /// Root 0xaa with two positions and a two-level downline
    fn state() -> ContractState {
        let mut accounts = HashMap::new();
        accounts.insert(
            addr(0xaa),
            AccountState {
                user: Some(user(600, 2)),
                contributions: vec![contribution(0, 100), contribution(1, 500)],
                referrals: vec![addr(1), addr(2), addr(3)],
                calculated_reward: Some(tokens(70)),
                position_rewards: vec![tokens(10), tokens(60)],
                ..Default::default()
            },
        );
        accounts.insert(
            addr(1),
            AccountState {
                user: Some(user(50, 1)),
                referrals: vec![addr(4)],
                ..Default::default()
            },
        );
        accounts.insert(
            addr(2),
            AccountState {
                user: Some(user(75, 3)),
                ..Default::default()
            },
        );
        accounts.insert(
            addr(4),
            AccountState {
                user: Some(user(20, 1)),
                ..Default::default()
            },
        );

        ContractState {
            plans: vec![
                raw_plan(10, 100, 100),
                raw_plan(100, 1_000, 120),
                raw_plan(1_000, 5_000, 135),
                raw_plan(5_000, 50_000, 150),
            ],
            accounts,
        }
    }

    fn config() -> Config {
        let mut config = Config::default_mainnet();
        config.account = addr(0xaa);
        config.referral_depth = 2;
        config
    }

    #[tokio::test]
    async fn test_refresh_computes_dashboard() {
        let reader = MemoryReader::new(state());
        let view = refresh(&reader, &config(), T0 + 600).await.unwrap();

        // 10 minutes: 100 * 1% * 10 + 500 * 1.2% * 10
        assert_eq!(view.summary.total_pending, tokens(70));
        assert_eq!(view.rows.len(), 2);
        assert_eq!(view.rows[1].plan_name, "Silver");
        assert_eq!(view.rows[1].claimable, tokens(60));
        assert!(view.contribution_mismatch.is_none());
        assert!(view.pending_divergence.is_none());
        assert!(view.position_divergences.is_empty());

        let level1 = view.team.level(1).unwrap();
        assert_eq!(level1.member_count(), 3);
        assert_eq!(level1.active_count, 2);
        assert_eq!(level1.total_volume, tokens(125));
        assert_eq!(view.team.level(2).unwrap().member_count(), 1);
        assert_eq!(view.rank, ReferralRank::Bronze);
    }

    #[tokio::test]
    async fn test_refresh_flags_inconsistencies() {
        let mut state = state();
        if let Some(root) = state.accounts.get_mut(&addr(0xaa)) {
            root.user = Some(user(700, 2));
            root.calculated_reward = Some(tokens(71));
        }
        let reader = MemoryReader::new(state);
        let view = refresh(&reader, &config(), T0 + 600).await.unwrap();

        assert_eq!(view.contribution_mismatch, Some((tokens(700), tokens(600))));
        assert_eq!(view.pending_divergence, Some((tokens(71), tokens(70))));
        // The contract's total still wins in the summary
        assert_eq!(view.summary.total_contribution, tokens(700));
    }

    #[tokio::test]
    async fn test_refresh_flags_position_divergence() {
        let mut state = state();
        if let Some(root) = state.accounts.get_mut(&addr(0xaa)) {
            root.position_rewards = vec![tokens(10), tokens(61)];
        }
        let reader = MemoryReader::new(state);
        let view = refresh(&reader, &config(), T0 + 600).await.unwrap();

        // Totals still agree, so only the per-position check catches it
        assert!(view.pending_divergence.is_none());
        assert_eq!(
            view.position_divergences,
            vec![PositionDivergence {
                position_index: 1,
                contract: tokens(61),
                computed: tokens(60),
            }]
        );
    }

    #[tokio::test]
    async fn test_refresh_missing_position_reward_skips_check() {
        let mut state = state();
        if let Some(root) = state.accounts.get_mut(&addr(0xaa)) {
            root.position_rewards = vec![tokens(99)];
        }
        let reader = MemoryReader::new(state);
        let snapshot = fetch_snapshot(&reader, &addr(0xaa), 2, T0 + 600).await.unwrap();
        assert_eq!(snapshot.contract_position_rewards, vec![Some(tokens(99)), None]);

        let view = compute_view(&snapshot, 2).unwrap();
        assert_eq!(view.position_divergences.len(), 1);
        assert_eq!(view.position_divergences[0].position_index, 0);
    }

    #[tokio::test]
    async fn test_refresh_degrades_unreadable_member() {
        let mut reader = MemoryReader::new(state());
        reader.failing.insert(addr(2));

        let view = refresh(&reader, &config(), T0 + 600).await.unwrap();
        let level1 = view.team.level(1).unwrap();

        assert_eq!(level1.member_count(), 3);
        assert_eq!(level1.active_count, 1);
        assert_eq!(level1.total_volume, tokens(50));
    }

    #[tokio::test]
    async fn test_refresh_fails_on_own_account() {
        let mut reader = MemoryReader::new(state());
        reader.failing.insert(addr(0xaa));
        assert!(refresh(&reader, &config(), T0 + 600).await.is_err());
    }

    #[tokio::test]
    async fn test_refresh_before_last_claim_is_error() {
        let reader = MemoryReader::new(state());
        assert!(refresh(&reader, &config(), T0 - 1).await.is_err());
    }

    #[tokio::test]
    async fn test_fetch_team_stops_at_depth() {
        let reader = MemoryReader::new(state());
        let team = fetch_team(&reader, &addr(0xaa), 1).await;

        assert_eq!(team.portfolios.len(), 3);
        assert!(!team.portfolios.contains_key(&addr(4)));
        // One referral list plus three member records; nothing below level 1
        assert_eq!(reader.call_count(), 4);
    }
}
