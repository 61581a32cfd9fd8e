//! Contract-read boundary
//!
//! The watcher never talks to a node directly from its dashboard logic. All
//! reads go through `ContractReader`; `SnapshotFileReader` serves a JSON dump
//! of contract state, re-loaded each cycle.

use serde::{Deserialize, Serialize};
use stake_model::{Address, FixedPointAmount, ModelError};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("account {0} not found")]
    UnknownAccount(Address),

    #[error("position {index} not found for {address}")]
    UnknownPosition { address: Address, index: u32 },

    #[error("plan {0} not found")]
    UnknownPlan(u8),

    #[error("malformed contract value: {0}")]
    Malformed(#[from] ModelError),

    #[error("contract state unavailable: {0}")]
    Unavailable(String),
}

/// `getUserData(address)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawUserData {
    pub total_contribution: FixedPointAmount,
    pub exists: bool,
    pub contribution_count: u32,
    pub total_claimed_reward: FixedPointAmount,
    pub total_level_income: FixedPointAmount,
}

/// `getUserContribution(address, index)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawContribution {
    pub plan_index: u8,
    pub amount: FixedPointAmount,
    pub reward_claimed: FixedPointAmount,
    pub last_claim_time: u64,
}

/// `poolDetails(planIndex)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPlan {
    pub min_amount: FixedPointAmount,
    pub max_amount: FixedPointAmount,
    /// Small integer, not 18-decimal scaled
    pub reward_rate_per_minute: u64,
    pub total_raised: FixedPointAmount,
    pub total_reward_distributed: FixedPointAmount,
}

/// Read-only view of the staking and token contracts
#[allow(async_fn_in_trait)]
pub trait ContractReader {
    async fn get_user_portfolio(&self, address: &Address) -> Result<RawUserData, ReadError>;

    async fn get_position(
        &self,
        address: &Address,
        index: u32,
    ) -> Result<RawContribution, ReadError>;

    async fn get_plan(&self, plan_index: u8) -> Result<RawPlan, ReadError>;

    async fn get_direct_referrals(&self, address: &Address) -> Result<Vec<Address>, ReadError>;

    /// The contract's own total pending figure (`getAllCalculatedReward`)
    async fn get_calculated_reward(
        &self,
        address: &Address,
    ) -> Result<FixedPointAmount, ReadError>;

    /// The contract's pending figure for one position (`calculateReward`)
    async fn get_position_reward(
        &self,
        address: &Address,
        index: u32,
    ) -> Result<FixedPointAmount, ReadError>;

    /// Token allowance granted by `owner` to `spender`
    async fn get_allowance(
        &self,
        owner: &Address,
        spender: &Address,
    ) -> Result<FixedPointAmount, ReadError>;
}

/// Per-account section of a contract-state dump
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountState {
    pub user: Option<RawUserData>,
    #[serde(default)]
    pub contributions: Vec<RawContribution>,
    #[serde(default)]
    pub referrals: Vec<Address>,
    pub calculated_reward: Option<FixedPointAmount>,
    /// Per-position pending figures, indexed like `contributions`
    #[serde(default)]
    pub position_rewards: Vec<FixedPointAmount>,
    /// spender -> allowance
    #[serde(default)]
    pub allowances: HashMap<Address, FixedPointAmount>,
}

/// Whole contract-state dump as written to disk
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContractState {
    /// Indexed by plan index
    pub plans: Vec<RawPlan>,
    pub accounts: HashMap<Address, AccountState>,
}

/// Serves reads from one immutable contract-state dump
///
/// Load a fresh reader per refresh cycle so every read in the cycle sees the
/// same state.
pub struct SnapshotFileReader {
    state: ContractState,
}

impl SnapshotFileReader {
    pub fn new(state: ContractState) -> Self {
        Self { state }
    }

    /// Load a dump from JSON; negative or fractional raw amounts are rejected
    pub fn load(path: &str) -> Result<Self, ReadError> {
        let bytes = std::fs::read(path)
            .map_err(|e| ReadError::Unavailable(format!("failed to read {}: {}", path, e)))?;
        Self::from_json(&bytes)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, ReadError> {
        let state: ContractState = serde_json::from_slice(bytes).map_err(|e| {
            ReadError::Unavailable(format!("failed to parse contract state: {}", e))
        })?;
        Ok(Self::new(state))
    }

    fn account(&self, address: &Address) -> Result<&AccountState, ReadError> {
        self.state
            .accounts
            .get(address)
            .ok_or_else(|| ReadError::UnknownAccount(address.clone()))
    }
}

impl ContractReader for SnapshotFileReader {
    async fn get_user_portfolio(&self, address: &Address) -> Result<RawUserData, ReadError> {
        // The contract answers for unknown users with an all-zero record
        let account = match self.state.accounts.get(address) {
            Some(account) => account,
            None => return Ok(empty_user()),
        };
        Ok(account.user.clone().unwrap_or_else(empty_user))
    }

    async fn get_position(
        &self,
        address: &Address,
        index: u32,
    ) -> Result<RawContribution, ReadError> {
        self.account(address)?
            .contributions
            .get(index as usize)
            .cloned()
            .ok_or_else(|| ReadError::UnknownPosition {
                address: address.clone(),
                index,
            })
    }

    async fn get_plan(&self, plan_index: u8) -> Result<RawPlan, ReadError> {
        self.state
            .plans
            .get(plan_index as usize)
            .cloned()
            .ok_or(ReadError::UnknownPlan(plan_index))
    }

    async fn get_direct_referrals(&self, address: &Address) -> Result<Vec<Address>, ReadError> {
        Ok(self
            .state
            .accounts
            .get(address)
            .map(|a| a.referrals.clone())
            .unwrap_or_default())
    }

    async fn get_calculated_reward(
        &self,
        address: &Address,
    ) -> Result<FixedPointAmount, ReadError> {
        self.account(address)?
            .calculated_reward
            .ok_or_else(|| ReadError::Unavailable(format!("no calculated reward for {}", address)))
    }

    async fn get_position_reward(
        &self,
        address: &Address,
        index: u32,
    ) -> Result<FixedPointAmount, ReadError> {
        let account = self.account(address)?;
        if index as usize >= account.contributions.len() {
            return Err(ReadError::UnknownPosition {
                address: address.clone(),
                index,
            });
        }
        account.position_rewards.get(index as usize).copied().ok_or_else(|| {
            ReadError::Unavailable(format!("no reward for position {} of {}", index, address))
        })
    }

    async fn get_allowance(
        &self,
        owner: &Address,
        spender: &Address,
    ) -> Result<FixedPointAmount, ReadError> {
        Ok(self
            .state
            .accounts
            .get(owner)
            .and_then(|a| a.allowances.get(spender).copied())
            .unwrap_or(FixedPointAmount::ZERO))
    }
}

fn empty_user() -> RawUserData {
    RawUserData {
        total_contribution: FixedPointAmount::ZERO,
        exists: false,
        contribution_count: 0,
        total_claimed_reward: FixedPointAmount::ZERO,
        total_level_income: FixedPointAmount::ZERO,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use stake_model::U256;
    use std::collections::HashSet;
    use std::sync::Mutex;

    pub fn addr(n: u8) -> Address {
        format!("0x{:040x}", n).parse().unwrap()
    }

    /// In-memory reader that can be told to fail for specific accounts
    pub struct MemoryReader {
        pub inner: SnapshotFileReader,
        pub failing: HashSet<Address>,
        /// Account-scoped reads served so far
        pub calls: Mutex<usize>,
    }

    impl MemoryReader {
        pub fn new(state: ContractState) -> Self {
            Self {
                inner: SnapshotFileReader::new(state),
                failing: HashSet::new(),
                calls: Mutex::new(0),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().map(|calls| *calls).unwrap_or(0)
        }

        fn check(&self, address: &Address) -> Result<(), ReadError> {
            if let Ok(mut calls) = self.calls.lock() {
                *calls += 1;
            }
            if self.failing.contains(address) {
                return Err(ReadError::Unavailable(format!(
                    "injected failure for {}",
                    address
                )));
            }
            Ok(())
        }
    }

    impl ContractReader for MemoryReader {
        async fn get_user_portfolio(&self, address: &Address) -> Result<RawUserData, ReadError> {
            self.check(address)?;
            self.inner.get_user_portfolio(address).await
        }

        async fn get_position(
            &self,
            address: &Address,
            index: u32,
        ) -> Result<RawContribution, ReadError> {
            self.check(address)?;
            self.inner.get_position(address, index).await
        }

        async fn get_plan(&self, plan_index: u8) -> Result<RawPlan, ReadError> {
            self.inner.get_plan(plan_index).await
        }

        async fn get_direct_referrals(
            &self,
            address: &Address,
        ) -> Result<Vec<Address>, ReadError> {
            self.check(address)?;
            self.inner.get_direct_referrals(address).await
        }

        async fn get_calculated_reward(
            &self,
            address: &Address,
        ) -> Result<FixedPointAmount, ReadError> {
            self.check(address)?;
            self.inner.get_calculated_reward(address).await
        }

        async fn get_position_reward(
            &self,
            address: &Address,
            index: u32,
        ) -> Result<FixedPointAmount, ReadError> {
            self.check(address)?;
            self.inner.get_position_reward(address, index).await
        }

        async fn get_allowance(
            &self,
            owner: &Address,
            spender: &Address,
        ) -> Result<FixedPointAmount, ReadError> {
            self.inner.get_allowance(owner, spender).await
        }
    }

    const SAMPLE: &str = r#"{
        "plans": [
            {
                "min_amount": "10000000000000000000",
                "max_amount": "100000000000000000000",
                "reward_rate_per_minute": 100,
                "total_raised": "0",
                "total_reward_distributed": "0"
            }
        ],
        "accounts": {
            "0x00000000000000000000000000000000000000AA": {
                "user": {
                    "total_contribution": "50000000000000000000",
                    "exists": true,
                    "contribution_count": 1,
                    "total_claimed_reward": "0",
                    "total_level_income": "0"
                },
                "contributions": [
                    {
                        "plan_index": 0,
                        "amount": "50000000000000000000",
                        "reward_claimed": "0",
                        "last_claim_time": 1700000000
                    }
                ],
                "referrals": ["0x00000000000000000000000000000000000000bb"],
                "calculated_reward": "0",
                "position_rewards": ["0"],
                "allowances": {"0x00000000000000000000000000000000000000cc": "7"}
            }
        }
    }"#;

    #[tokio::test]
    async fn test_snapshot_reader_serves_dump() {
        let reader = SnapshotFileReader::from_json(SAMPLE.as_bytes()).unwrap();
        let aa = addr(0xaa);

        let user = reader.get_user_portfolio(&aa).await.unwrap();
        assert_eq!(user.contribution_count, 1);
        assert_eq!(user.total_contribution, FixedPointAmount::from_tokens(50));

        let position = reader.get_position(&aa, 0).await.unwrap();
        assert_eq!(position.last_claim_time, 1_700_000_000);

        let plan = reader.get_plan(0).await.unwrap();
        assert_eq!(plan.reward_rate_per_minute, 100);

        assert_eq!(reader.get_direct_referrals(&aa).await.unwrap(), vec![addr(0xbb)]);
        assert_eq!(reader.get_position_reward(&aa, 0).await.unwrap(), FixedPointAmount::ZERO);

        let allowance = reader.get_allowance(&aa, &addr(0xcc)).await.unwrap();
        assert_eq!(allowance, FixedPointAmount::from_raw(7u8));
    }

    #[tokio::test]
    async fn test_snapshot_reader_full_width_amounts() {
        // Unlimited approval is 2^256 - 1; the contribution is past 2^128
        let max_uint256 =
            "115792089237316195423570985008687907853269984665640564039457584007913129639935";
        let wide = "340282366920938463463374607431768211456";
        let json = SAMPLE
            .replace("\"7\"", &format!("\"{}\"", max_uint256))
            .replace("\"amount\": \"50000000000000000000\"", &format!("\"amount\": \"{}\"", wide));
        let reader = SnapshotFileReader::from_json(json.as_bytes()).unwrap();
        let aa = addr(0xaa);

        let allowance = reader.get_allowance(&aa, &addr(0xcc)).await.unwrap();
        assert_eq!(allowance, FixedPointAmount::MAX);
        assert_eq!(allowance.raw(), U256::MAX);

        let position = reader.get_position(&aa, 0).await.unwrap();
        assert_eq!(position.amount.raw(), U256::from(u128::MAX) + U256::one());
    }

    #[tokio::test]
    async fn test_snapshot_reader_position_reward_bounds() {
        let reader = SnapshotFileReader::from_json(SAMPLE.as_bytes()).unwrap();
        assert!(matches!(
            reader.get_position_reward(&addr(0xaa), 1).await,
            Err(ReadError::UnknownPosition { index: 1, .. })
        ));

        let bare = SAMPLE.replace("\"position_rewards\": [\"0\"],", "");
        let reader = SnapshotFileReader::from_json(bare.as_bytes()).unwrap();
        assert!(matches!(
            reader.get_position_reward(&addr(0xaa), 0).await,
            Err(ReadError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_snapshot_reader_unknown_user_is_empty() {
        let reader = SnapshotFileReader::from_json(SAMPLE.as_bytes()).unwrap();
        let user = reader.get_user_portfolio(&addr(0x01)).await.unwrap();
        assert!(!user.exists);
        assert_eq!(user.contribution_count, 0);
        assert!(reader.get_direct_referrals(&addr(0x01)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_reader_missing_entries() {
        let reader = SnapshotFileReader::from_json(SAMPLE.as_bytes()).unwrap();
        assert!(matches!(reader.get_plan(3).await, Err(ReadError::UnknownPlan(3))));
        assert!(matches!(
            reader.get_position(&addr(0xaa), 5).await,
            Err(ReadError::UnknownPosition { index: 5, .. })
        ));
    }

    #[test]
    fn test_snapshot_rejects_negative_raw_amount() {
        let bad = SAMPLE.replace("\"total_raised\": \"0\"", "\"total_raised\": \"-1\"");
        assert!(matches!(
            SnapshotFileReader::from_json(bad.as_bytes()),
            Err(ReadError::Unavailable(_))
        ));
    }
}
