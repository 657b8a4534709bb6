//! Solana RPC queries used by the exporter
//!
//! Every network call goes through [`StakeRpc`] so the retrieval loop can be
//! driven by the real client or an in-memory one.

use anyhow::{Context, Result};
use serde_json::{Value, json};
use solana_account_decoder::{UiAccountEncoding, UiDataSliceConfig};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::{RpcAccountInfoConfig, RpcProgramAccountsConfig};
use solana_client::rpc_filter::{Memcmp, RpcFilterType};
use solana_client::rpc_request::RpcRequest;
use solana_client::rpc_response::Response;
use solana_commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;

use crate::constants;
use crate::rewards::RewardRecord;

/// Network operations needed to export stake rewards
pub trait StakeRpc {
    /// Stake accounts whose withdraw authority is `wallet` (addresses only)
    async fn stake_accounts(&self, wallet: &Pubkey) -> Result<Vec<Pubkey>>;

    /// Current epoch at confirmed commitment
    async fn current_epoch(&self) -> Result<u64>;

    /// Raw `value` of a jsonParsed getAccountInfo request (null if missing)
    async fn parsed_account(&self, account: &Pubkey) -> Result<Value>;

    /// Inflation reward credited to `account` for `epoch`, if any
    async fn inflation_reward(&self, account: &Pubkey, epoch: u64) -> Result<Option<RewardRecord>>;
}

/// Discovery predicate: fixed account size plus the wallet at a fixed offset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StakeAccountFilter {
    pub data_size: u64,
    pub offset: usize,
    pub bytes: Vec<u8>,
}

impl StakeAccountFilter {
    /// Stake accounts (200 bytes) whose authorized withdrawer is `wallet`
    pub fn for_wallet(wallet: &Pubkey) -> Self {
        Self {
            data_size: constants::STAKE_ACCOUNT_SIZE,
            offset: constants::WITHDRAWER_OFFSET,
            bytes: wallet.to_bytes().to_vec(),
        }
    }

    /// Whether raw account data would pass the filter
    #[cfg(test)]
    pub fn matches(&self, data: &[u8]) -> bool {
        data.len() as u64 == self.data_size
            && data
                .get(self.offset..self.offset + self.bytes.len())
                .is_some_and(|window| window == self.bytes.as_slice())
    }

    pub fn to_rpc_filters(&self) -> Vec<RpcFilterType> {
        vec![
            RpcFilterType::DataSize(self.data_size),
            RpcFilterType::Memcmp(Memcmp::new_base58_encoded(self.offset, &self.bytes)),
        ]
    }
}

/// getProgramAccounts config for discovery: filters and an empty data slice
pub fn discovery_config(wallet: &Pubkey) -> RpcProgramAccountsConfig {
    RpcProgramAccountsConfig {
        filters: Some(StakeAccountFilter::for_wallet(wallet).to_rpc_filters()),
        account_config: RpcAccountInfoConfig {
            encoding: Some(UiAccountEncoding::Base64),
            data_slice: Some(UiDataSliceConfig {
                offset: 0,
                length: 0,
            }),
            commitment: Some(CommitmentConfig::confirmed()),
            ..RpcAccountInfoConfig::default()
        },
        ..RpcProgramAccountsConfig::default()
    }
}

impl StakeRpc for RpcClient {
    async fn stake_accounts(&self, wallet: &Pubkey) -> Result<Vec<Pubkey>> {
        let accounts = self
            .get_program_accounts_with_config(&constants::STAKE_PROGRAM_ID, discovery_config(wallet))
            .await
            .context("Failed to query stake program accounts")?;

        Ok(accounts.into_iter().map(|(pubkey, _)| pubkey).collect())
    }

    async fn current_epoch(&self) -> Result<u64> {
        let info = self
            .get_epoch_info_with_commitment(CommitmentConfig::confirmed())
            .await
            .context("Failed to fetch epoch info")?;

        Ok(info.epoch)
    }

    async fn parsed_account(&self, account: &Pubkey) -> Result<Value> {
        let response: Response<Value> = self
            .send(
                RpcRequest::GetAccountInfo,
                json!([
                    account.to_string(),
                    { "encoding": "jsonParsed", "commitment": "confirmed" }
                ]),
            )
            .await
            .with_context(|| format!("Failed to fetch stake account {}", account))?;

        Ok(response.value)
    }

    async fn inflation_reward(&self, account: &Pubkey, epoch: u64) -> Result<Option<RewardRecord>> {
        let rewards = self
            .get_inflation_reward(&[*account], Some(epoch))
            .await
            .with_context(|| format!("Failed to fetch inflation reward for epoch {}", epoch))?;

        Ok(rewards.into_iter().next().flatten().map(RewardRecord::from))
    }
}
