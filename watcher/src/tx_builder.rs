//! Unsigned contract calls for the external signer
//!
//! Nothing here signs or submits. Requests are serialized to JSON and handed
//! to whatever wallet holds the signer's key.

use crate::config::Config;
use serde::{Deserialize, Serialize};
use stake_model::{
    validate_investment, Address, FixedPointAmount, ModelError, Plan, PlanTier, Result,
};

/// One ABI argument
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CallArg {
    Address(Address),
    /// Raw 18-decimal integer
    Amount(FixedPointAmount),
    Index(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub from: Address,
    pub to: Address,
    pub method: String,
    pub args: Vec<CallArg>,
}

impl TransactionRequest {
    fn call(from: &Address, to: &Address, method: &str, args: Vec<CallArg>) -> Self {
        Self {
            from: from.clone(),
            to: to.clone(),
            method: method.to_string(),
            args,
        }
    }
}

/// Entry method per tier; "StaterPackage" is the deployed contract's spelling
pub fn invest_method(tier: PlanTier) -> &'static str {
    match tier {
        PlanTier::Starter => "StaterPackage",
        PlanTier::Silver => "SilverPackage",
        PlanTier::Gold => "GoldPackage",
        PlanTier::Diamond => "DiamondPackage",
    }
}

/// approve(spender, amount) on the token contract
pub fn build_approve(
    signer: &Address,
    token: &Address,
    spender: &Address,
    amount: &FixedPointAmount,
) -> TransactionRequest {
    TransactionRequest::call(
        signer,
        token,
        "approve",
        vec![CallArg::Address(spender.clone()), CallArg::Amount(*amount)],
    )
}

pub fn build_invest(
    signer: &Address,
    contract: &Address,
    plan: &Plan,
    amount: &FixedPointAmount,
) -> Result<TransactionRequest> {
    let tier = plan.tier().ok_or(ModelError::UnknownPlan(plan.plan_index))?;
    Ok(TransactionRequest::call(
        signer,
        contract,
        invest_method(tier),
        vec![CallArg::Amount(*amount)],
    ))
}

pub fn build_claim(
    signer: &Address,
    contract: &Address,
    position_index: u32,
) -> TransactionRequest {
    let args = vec![CallArg::Index(position_index)];
    TransactionRequest::call(signer, contract, "claimReward", args)
}

/// register(referrer), using `default_referrer` when none is given
pub fn build_register(
    signer: &Address,
    contract: &Address,
    referrer: Option<&Address>,
    default_referrer: &Address,
) -> TransactionRequest {
    let referrer = referrer.unwrap_or(default_referrer);
    let args = vec![CallArg::Address(referrer.clone())];
    TransactionRequest::call(signer, contract, "register", args)
}

pub fn needs_approval(allowance: &FixedPointAmount, amount: &FixedPointAmount) -> bool {
    allowance < amount
}

/// Validate `amount_text` against `plan` and build the calls to invest it
///
/// Returns `[approve, invest]` when `allowance` does not cover the amount.
pub fn prepare_investment(
    signer: &Address,
    config: &Config,
    plan: &Plan,
    amount_text: &str,
    allowance: &FixedPointAmount,
) -> Result<Vec<TransactionRequest>> {
    let amount = validate_investment(plan, amount_text)?;
    let invest = build_invest(signer, &config.investment_contract, plan, &amount)?;

    let mut requests = Vec::with_capacity(2);
    if needs_approval(allowance, &amount) {
        requests.push(build_approve(
            signer,
            &config.usdt_contract,
            &config.investment_contract,
            &amount,
        ));
    }
    requests.push(invest);
    Ok(requests)
}
