//! USDStack dashboard watcher
//!
//! Off-chain service that recomputes one account's staking dashboard every
//! poll interval and proposes claim requests for an external signer.
//!
//! Usage:
//!   usdstack-watcher                      run the refresh loop
//!   usdstack-watcher init [path]          write a default config
//!   usdstack-watcher invest <plan> <amt>  print approve/invest requests
//!   usdstack-watcher register [referrer]  print a register request
//!   usdstack-watcher withdraw <amt>       print claims covering a withdrawal

mod claim_queue;
mod config;
mod reader;
mod refresh;
mod tx_builder;

use anyhow::{Context, Result};
use claim_queue::ClaimQueue;
use config::Config;
use reader::{ContractReader, SnapshotFileReader};
use refresh::DashboardView;
use stake_model::{
    validate_withdrawal, Address, FixedPointAmount, Plan, PlanTier, MIN_WITHDRAWAL_TOKENS,
};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.first().map(String::as_str) == Some("init") {
        let path = args.get(1).map(String::as_str).unwrap_or("watcher-config.toml");
        return Config::write_default(path);
    }

    let config = Config::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({:#}), using default mainnet config", e);
        Config::default_mainnet()
    });

    match args.first().map(String::as_str) {
        Some("invest") => print_investment(&config, &args[1..]).await,
        Some("register") => print_register(&config, args.get(1)),
        Some("withdraw") => print_withdrawal(&config, args.get(1)).await,
        Some(other) => anyhow::bail!("unknown command {:?}", other),
        None => run(&config).await,
    }
}

async fn run(config: &Config) -> Result<()> {
    log::info!("Starting USDStack watcher");
    log::info!("RPC: {} (chain {})", config.rpc_url, config.chain_id);
    log::info!("Investment contract: {}", config.investment_contract);
    log::info!("Account: {}", config.account);

    let min_claim = config.min_claim()?;

    // Main event loop
    let mut interval = time::interval(Duration::from_secs(config.poll_interval_secs));

    loop {
        interval.tick().await;

        match refresh_cycle(config).await {
            Ok(view) => {
                log_view(&view);
                if let Err(e) = propose_claims(config, &view, &min_claim) {
                    log::error!("Error proposing claims: {:#}", e);
                }
            }
            Err(e) => log::error!("Refresh failed: {:#}", e),
        }
    }
}

/// Seconds since the epoch, as the contract measures time
fn unix_now() -> Result<u64> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("System clock is before the Unix epoch")?
        .as_secs())
}

fn load_reader(config: &Config) -> Result<SnapshotFileReader> {
    let path = config.snapshot_path();
    SnapshotFileReader::load(&path)
        .context(format!("Failed to load contract state from {}", path))
}

/// One cycle against a freshly loaded contract state
async fn refresh_cycle(config: &Config) -> Result<DashboardView> {
    let reader = load_reader(config)?;
    let now = unix_now()?;
    refresh::refresh(&reader, config, now).await
}

fn log_view(view: &DashboardView) {
    let summary = &view.summary;
    log::info!(
        "Invested {} | claimed {} | pending {} | level income {}",
        summary.total_contribution.to_display_string(4),
        summary.total_claimed.to_display_string(4),
        summary.total_pending.to_display_string(4),
        summary.total_level_income.to_display_string(4),
    );

    for row in &view.rows {
        log::debug!(
            "#{} {} principal {} claimable {} roi {:.2}%",
            row.position_index,
            row.plan_name,
            row.principal.to_display_string(2),
            row.claimable.to_display_string(6),
            row.roi_percent,
        );
    }

    log::info!(
        "Team: {} members, {} active, volume {} | rank {} ({:.0}%)",
        view.team.total_members,
        view.team.total_active,
        view.team.total_volume.to_display_string(2),
        view.rank.display_name(),
        view.rank_progress_percent,
    );
}

/// Emit claim requests for the largest positions first
fn propose_claims(
    config: &Config,
    view: &DashboardView,
    min_claim: &FixedPointAmount,
) -> Result<()> {
    let mut queue = ClaimQueue::from_rows(&view.rows);
    if queue.is_empty() {
        return Ok(());
    }
    let total = queue.len();

    let eligible = queue.claimable_above(min_claim).len();
    if eligible == 0 {
        log::debug!("No position above claim threshold {}", min_claim);
        return Ok(());
    }

    let batch = queue.take_batch(config.max_claims_per_cycle, min_claim);
    log::info!(
        "Proposing {} of {} eligible claim(s), {} position(s) total",
        batch.len(),
        eligible,
        total
    );
    for candidate in batch {
        let request = tx_builder::build_claim(
            &config.account,
            &config.investment_contract,
            candidate.position_index,
        );
        log::info!(
            "Claim #{} ({}) for {}: {}",
            candidate.position_index,
            candidate.plan_name,
            candidate.claimable.to_display_string(6),
            serde_json::to_string(&request)?
        );
    }
    Ok(())
}

async fn print_investment(config: &Config, args: &[String]) -> Result<()> {
    let (plan_arg, amount_text) = match args {
        [plan, amount, ..] => (plan, amount),
        _ => anyhow::bail!("usage: invest <plan index 0-3> <amount>"),
    };
    let plan_index: u8 = plan_arg.parse().context("Plan index must be a number")?;
    let tier = PlanTier::from_index(plan_index)
        .context(format!("No plan with index {}", plan_index))?;

    let reader = load_reader(config)?;
    let raw = reader.get_plan(tier.index()).await?;
    let plan = Plan::new(
        tier.index(),
        raw.min_amount,
        raw.max_amount,
        raw.reward_rate_per_minute,
        raw.total_raised,
        raw.total_reward_distributed,
    )?;
    let allowance = reader
        .get_allowance(&config.account, &config.investment_contract)
        .await?;

    let requests =
        tx_builder::prepare_investment(&config.account, config, &plan, amount_text, &allowance)?;
    println!("{}", serde_json::to_string_pretty(&requests)?);
    Ok(())
}

fn print_register(config: &Config, referrer: Option<&String>) -> Result<()> {
    let referrer: Option<Address> = referrer
        .map(|r| r.parse().map_err(anyhow::Error::msg))
        .transpose()
        .context("Invalid referrer address")?;

    let request = tx_builder::build_register(
        &config.account,
        &config.investment_contract,
        referrer.as_ref(),
        &config.default_referrer,
    );
    println!("{}", serde_json::to_string_pretty(&request)?);
    Ok(())
}

/// Check a withdrawal against the pending balance and print the claims that cover it
async fn print_withdrawal(config: &Config, amount_text: Option<&String>) -> Result<()> {
    let amount_text = amount_text.context("usage: withdraw <amount>")?;
    let view = refresh_cycle(config).await?;

    let available = view.summary.total_pending;
    let min = FixedPointAmount::from_tokens(MIN_WITHDRAWAL_TOKENS);
    let remaining = validate_withdrawal(&available, amount_text, &min)?;
    let amount = FixedPointAmount::from_decimal_str(amount_text)?;

    let mut queue = ClaimQueue::from_rows(&view.rows);
    let (batch, covered) = queue.take_covering(&amount)?;
    log::info!(
        "Withdrawing {} of {} pending: {} claim(s) release {}, {} left after withdrawal",
        amount.to_display_string(6),
        available.to_display_string(6),
        batch.len(),
        covered.to_display_string(6),
        remaining.to_display_string(6),
    );

    let requests: Vec<_> = batch
        .iter()
        .map(|candidate| {
            tx_builder::build_claim(
                &config.account,
                &config.investment_contract,
                candidate.position_index,
            )
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&requests)?);
    Ok(())
}
