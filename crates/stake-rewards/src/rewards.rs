//! Inflation reward retrieval
//!
//! There is no RPC method listing the epochs in which an account was paid, so
//! each stake account is walked backwards one epoch at a time, from the last
//! completed epoch down to its activation epoch. Missing rewards are routine
//! (deactivated stake, warmup) and are skipped without producing a row.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use solana_client::rpc_response::RpcInflationReward;
use solana_sdk::pubkey::Pubkey;
use tracing::{debug, info, warn};

use crate::constants;
use crate::reports::ReportWriter;
use crate::rpc::StakeRpc;
use crate::stake;

/// Inflation reward credited to a stake account for one epoch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardRecord {
    pub epoch: u64,
    pub effective_slot: u64,
    /// Reward in lamports
    pub amount: u64,
    /// Account balance in lamports after the reward
    pub post_balance: u64,
    /// Vote account commission when the reward was credited
    pub commission: Option<u8>,
}

impl From<RpcInflationReward> for RewardRecord {
    fn from(reward: RpcInflationReward) -> Self {
        Self {
            epoch: reward.epoch,
            effective_slot: reward.effective_slot,
            amount: reward.amount,
            post_balance: reward.post_balance,
            commission: reward.commission,
        }
    }
}

/// One line of a rewards report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvRow {
    pub stake_account: String,
    pub epoch: u64,
    pub effective_slot: u64,
    pub amount: u64,
    pub post_balance: u64,
    pub commission: Option<u8>,
}

impl CsvRow {
    pub fn new(stake_account: &Pubkey, reward: RewardRecord) -> Self {
        Self {
            stake_account: stake_account.to_string(),
            epoch: reward.epoch,
            effective_slot: reward.effective_slot,
            amount: reward.amount,
            post_balance: reward.post_balance,
            commission: reward.commission,
        }
    }
}

/// Totals for a completed run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub accounts_found: usize,
    pub accounts_skipped: usize,
    pub rows: usize,
    pub total_lamports: u64,
}

/// Sum of reward amounts in lamports
pub fn total_lamports(rows: &[CsvRow]) -> u64 {
    rows.iter().map(|row| row.amount).sum()
}

fn lamports_to_sol(lamports: u64) -> f64 {
    lamports as f64 / constants::LAMPORTS_PER_SOL
}

/// Walk one stake account from `current_epoch - 1` down to its activation epoch.
///
/// Rows are appended to `wallet_rewards` as they are found and also returned
/// for the per-account report. Returns `None` (after logging the raw account)
/// when the activation epoch cannot be determined.
pub async fn collect_account_rewards<R: StakeRpc>(
    rpc: &R,
    stake_account: &Pubkey,
    current_epoch: u64,
    wallet_rewards: &mut Vec<CsvRow>,
) -> Result<Option<Vec<CsvRow>>> {
    let value = rpc.parsed_account(stake_account).await?;

    let activation_epoch = match stake::activation_epoch(&value) {
        Ok(epoch) => epoch,
        Err(e) => {
            warn!(
                raw = %value,
                "missing activation epoch for stake account {}: {}",
                stake_account, e
            );
            return Ok(None);
        }
    };

    let mut account_rewards = Vec::new();

    // Rewards for the current epoch are not paid until it completes
    let Some(start_epoch) = current_epoch.checked_sub(1) else {
        return Ok(Some(account_rewards));
    };

    info!(
        "looping through all epochs for stake account {} from epoch {} to {}",
        stake_account, start_epoch, activation_epoch
    );

    for query_epoch in (activation_epoch..=start_epoch).rev() {
        debug!("querying epoch {}", query_epoch);

        match rpc.inflation_reward(stake_account, query_epoch).await? {
            Some(reward) => {
                debug!("got reward on epoch {}", reward.epoch);
                let row = CsvRow::new(stake_account, reward);
                wallet_rewards.push(row.clone());
                account_rewards.push(row);
            }
            None => {
                debug!("no rewards found for epoch {}, continuing...", query_epoch);
            }
        }
    }

    Ok(Some(account_rewards))
}

/// Discover every stake account of `wallet`, collect its rewards and schedule
/// one report per account plus the aggregate wallet report.
pub async fn export_wallet_rewards<R: StakeRpc>(
    rpc: &R,
    wallet: &Pubkey,
    writer: &mut ReportWriter,
) -> Result<RunSummary> {
    let stake_accounts = rpc.stake_accounts(wallet).await?;
    let current_epoch = rpc.current_epoch().await?;

    info!(
        "Processing {} stake accounts for wallet: {} from epoch {}",
        stake_accounts.len(),
        wallet,
        current_epoch
    );

    let mut summary = RunSummary {
        accounts_found: stake_accounts.len(),
        ..RunSummary::default()
    };
    let mut wallet_rewards = Vec::new();

    for stake_account in &stake_accounts {
        let Some(rows) =
            collect_account_rewards(rpc, stake_account, current_epoch, &mut wallet_rewards)
                .await?
        else {
            summary.accounts_skipped += 1;
            continue;
        };

        let total = total_lamports(&rows);
        info!(
            "  Stake account {}: {} rewarded epochs, {} lamports ({:.9} SOL)",
            stake_account,
            rows.len(),
            total,
            lamports_to_sol(total)
        );

        writer.schedule_stake_account(stake_account, rows);
    }

    summary.rows = wallet_rewards.len();
    summary.total_lamports = total_lamports(&wallet_rewards);
    info!(
        "Wallet {}: {} rewards across {} stake accounts, {} lamports ({:.9} SOL)",
        wallet,
        summary.rows,
        summary.accounts_found - summary.accounts_skipped,
        summary.total_lamports,
        lamports_to_sol(summary.total_lamports)
    );

    writer.schedule_wallet(wallet, wallet_rewards);

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::Mutex;
    use tracing_test::traced_test;

    use crate::reports;

    /// In-memory RPC that records every inflation reward query
    #[derive(Default)]
    struct MockRpc {
        current_epoch: u64,
        accounts: Vec<Pubkey>,
        parsed: HashMap<Pubkey, Value>,
        rewards: HashMap<(Pubkey, u64), RewardRecord>,
        queries: Mutex<Vec<(Pubkey, u64)>>,
        /// Reward queries for this account fail like a dropped connection
        failing_account: Option<Pubkey>,
    }

    impl MockRpc {
        fn new(current_epoch: u64) -> Self {
            Self {
                current_epoch,
                ..Self::default()
            }
        }

        /// Add a delegated stake account with rewards for the given epochs
        fn add_account(&mut self, activation_epoch: u64, reward_epochs: &[u64]) -> Pubkey {
            let account = Pubkey::new_unique();
            self.accounts.push(account);
            self.parsed
                .insert(account, delegated(&activation_epoch.to_string()));
            for &epoch in reward_epochs {
                self.rewards.insert((account, epoch), reward(epoch));
            }
            account
        }

        fn queried_epochs(&self, account: &Pubkey) -> Vec<u64> {
            self.queries
                .lock()
                .unwrap()
                .iter()
                .filter(|(a, _)| a == account)
                .map(|(_, epoch)| *epoch)
                .collect()
        }
    }

    impl StakeRpc for MockRpc {
        async fn stake_accounts(&self, _wallet: &Pubkey) -> Result<Vec<Pubkey>> {
            Ok(self.accounts.clone())
        }

        async fn current_epoch(&self) -> Result<u64> {
            Ok(self.current_epoch)
        }

        async fn parsed_account(&self, account: &Pubkey) -> Result<Value> {
            Ok(self.parsed.get(account).cloned().unwrap_or(Value::Null))
        }

        async fn inflation_reward(
            &self,
            account: &Pubkey,
            epoch: u64,
        ) -> Result<Option<RewardRecord>> {
            self.queries.lock().unwrap().push((*account, epoch));
            if self.failing_account == Some(*account) {
                anyhow::bail!("connection reset while fetching epoch {}", epoch);
            }
            Ok(self.rewards.get(&(*account, epoch)).cloned())
        }
    }

    fn delegated(activation_epoch: &str) -> Value {
        json!({
            "data": {
                "parsed": {
                    "info": {
                        "stake": {
                            "delegation": {
                                "activationEpoch": activation_epoch,
                                "deactivationEpoch": "18446744073709551615"
                            }
                        }
                    },
                    "type": "delegated"
                },
                "program": "stake",
                "space": 200
            }
        })
    }

    fn reward(epoch: u64) -> RewardRecord {
        RewardRecord {
            epoch,
            effective_slot: epoch * 432_000 + 17,
            amount: 1_000_000 + epoch,
            post_balance: 5_000_000_000 + epoch,
            commission: Some(5),
        }
    }

    fn epochs(rows: &[CsvRow]) -> Vec<u64> {
        rows.iter().map(|row| row.epoch).collect()
    }

    fn read_rows(path: &Path) -> Vec<CsvRow> {
        csv::Reader::from_path(path)
            .unwrap()
            .deserialize()
            .collect::<Result<Vec<CsvRow>, _>>()
            .unwrap()
    }

    #[test]
    fn test_csv_row_from_reward() {
        let account = Pubkey::new_unique();
        let row = CsvRow::new(&account, reward(505));
        assert_eq!(row.stake_account, account.to_string());
        assert_eq!(row.epoch, 505);
        assert_eq!(row.effective_slot, 505 * 432_000 + 17);
        assert_eq!(row.commission, Some(5));
    }

    #[test]
    fn test_reward_record_from_rpc() {
        let rpc_reward = RpcInflationReward {
            epoch: 700,
            effective_slot: 302_400_123,
            amount: 42,
            post_balance: 1_000_042,
            commission: None,
        };
        let record = RewardRecord::from(rpc_reward);
        assert_eq!(record.epoch, 700);
        assert_eq!(record.effective_slot, 302_400_123);
        assert_eq!(record.amount, 42);
        assert_eq!(record.post_balance, 1_000_042);
        assert_eq!(record.commission, None);
    }

    #[tokio::test]
    async fn test_walks_epochs_backwards_to_activation() {
        let mut rpc = MockRpc::new(510);
        let account = rpc.add_account(500, &[505, 506, 507, 508]);
        let mut wallet_rewards = Vec::new();

        let rows = collect_account_rewards(&rpc, &account, 510, &mut wallet_rewards)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(
            rpc.queried_epochs(&account),
            (500..=509).rev().collect::<Vec<_>>()
        );
        assert_eq!(epochs(&rows), vec![508, 507, 506, 505]);
        assert_eq!(wallet_rewards, rows);
    }

    #[tokio::test]
    async fn test_missing_rewards_do_not_stop_the_walk() {
        let mut rpc = MockRpc::new(520);
        // Gap between 515 and 502; the oldest epoch still gets queried
        let account = rpc.add_account(500, &[518, 515, 502, 500]);
        let mut wallet_rewards = Vec::new();

        let rows = collect_account_rewards(&rpc, &account, 520, &mut wallet_rewards)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(epochs(&rows), vec![518, 515, 502, 500]);
        assert_eq!(rpc.queried_epochs(&account).len(), 20);
    }

    #[tokio::test]
    async fn test_activation_after_last_completed_epoch_queries_nothing() {
        let mut rpc = MockRpc::new(510);
        let account = rpc.add_account(510, &[510]);
        let mut wallet_rewards = Vec::new();

        let rows = collect_account_rewards(&rpc, &account, 510, &mut wallet_rewards)
            .await
            .unwrap()
            .unwrap();

        assert!(rows.is_empty());
        assert!(wallet_rewards.is_empty());
        assert!(rpc.queried_epochs(&account).is_empty());
    }

    #[tokio::test]
    async fn test_activation_in_last_completed_epoch_queries_once() {
        let mut rpc = MockRpc::new(510);
        let account = rpc.add_account(509, &[509]);
        let mut wallet_rewards = Vec::new();

        let rows = collect_account_rewards(&rpc, &account, 510, &mut wallet_rewards)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(rpc.queried_epochs(&account), vec![509]);
        assert_eq!(epochs(&rows), vec![509]);
    }

    #[tokio::test]
    async fn test_epoch_zero_queries_nothing() {
        let mut rpc = MockRpc::new(0);
        let account = rpc.add_account(0, &[0]);
        let mut wallet_rewards = Vec::new();

        let rows = collect_account_rewards(&rpc, &account, 0, &mut wallet_rewards)
            .await
            .unwrap()
            .unwrap();

        assert!(rows.is_empty());
        assert!(rpc.queried_epochs(&account).is_empty());
    }

    #[tokio::test]
    #[traced_test]
    async fn test_missing_activation_epoch_skips_account() {
        let mut rpc = MockRpc::new(510);
        let undelegated = Pubkey::new_unique();
        rpc.accounts.push(undelegated);
        rpc.parsed.insert(
            undelegated,
            json!({
                "data": {
                    "parsed": { "info": { "meta": {} }, "type": "initialized" },
                    "program": "stake",
                    "space": 200
                }
            }),
        );
        let delegated_account = rpc.add_account(508, &[508, 509]);

        let dir = tempfile::tempdir().unwrap();
        let mut writer = ReportWriter::new(dir.path());
        let wallet = Pubkey::new_unique();

        let summary = export_wallet_rewards(&rpc, &wallet, &mut writer)
            .await
            .unwrap();
        writer.finish().await;

        assert_eq!(summary.accounts_found, 2);
        assert_eq!(summary.accounts_skipped, 1);
        assert_eq!(summary.rows, 2);
        assert!(rpc.queried_epochs(&undelegated).is_empty());
        assert_eq!(rpc.queried_epochs(&delegated_account), vec![509, 508]);

        let undelegated_name = undelegated.to_string();
        logs_assert(|lines: &[&str]| {
            let hits = lines
                .iter()
                .filter(|line| line.contains("missing activation epoch"))
                .filter(|line| line.contains(undelegated_name.as_str()))
                .count();
            if hits == 1 {
                Ok(())
            } else {
                Err(format!("expected 1 diagnostic line, found {}", hits))
            }
        });
        assert!(logs_contain("initialized"));

        assert!(!reports::stake_account_report_path(dir.path(), &undelegated).exists());
        assert!(reports::stake_account_report_path(dir.path(), &delegated_account).exists());
    }

    #[tokio::test]
    async fn test_end_to_end_single_account() {
        let mut rpc = MockRpc::new(510);
        let account = rpc.add_account(500, &[505, 506, 507, 508]);
        let wallet = Pubkey::new_unique();

        let dir = tempfile::tempdir().unwrap();
        let mut writer = ReportWriter::new(dir.path());

        let summary = export_wallet_rewards(&rpc, &wallet, &mut writer)
            .await
            .unwrap();
        let written = writer.finish().await;

        assert_eq!(written.written, 2);
        assert_eq!(written.failed, 0);
        assert_eq!(summary.rows, 4);
        assert_eq!(
            summary.total_lamports,
            (505..=508).map(|e| 1_000_000 + e).sum::<u64>()
        );

        let account_rows = read_rows(&reports::stake_account_report_path(dir.path(), &account));
        assert_eq!(epochs(&account_rows), vec![508, 507, 506, 505]);

        let wallet_rows = read_rows(&reports::wallet_report_path(dir.path(), &wallet));
        assert_eq!(wallet_rows, account_rows);
        assert!(
            wallet_rows
                .iter()
                .all(|row| row.stake_account == account.to_string())
        );
    }

    #[tokio::test]
    async fn test_aggregate_is_concatenation_in_processing_order() {
        let mut rpc = MockRpc::new(600);
        let first = rpc.add_account(595, &[599, 596]);
        let second = rpc.add_account(590, &[598, 597, 590]);
        let wallet = Pubkey::new_unique();

        let dir = tempfile::tempdir().unwrap();
        let mut writer = ReportWriter::new(dir.path());

        export_wallet_rewards(&rpc, &wallet, &mut writer)
            .await
            .unwrap();
        writer.finish().await;

        let first_rows = read_rows(&reports::stake_account_report_path(dir.path(), &first));
        let second_rows = read_rows(&reports::stake_account_report_path(dir.path(), &second));
        let wallet_rows = read_rows(&reports::wallet_report_path(dir.path(), &wallet));

        let expected: Vec<CsvRow> = first_rows.into_iter().chain(second_rows).collect();
        assert_eq!(wallet_rows, expected);
        assert_eq!(epochs(&wallet_rows), vec![599, 596, 598, 597, 590]);
    }

    #[tokio::test]
    async fn test_no_stake_accounts_writes_empty_wallet_report() {
        let rpc = MockRpc::new(510);
        let wallet = Pubkey::new_unique();

        let dir = tempfile::tempdir().unwrap();
        let mut writer = ReportWriter::new(dir.path());

        let summary = export_wallet_rewards(&rpc, &wallet, &mut writer)
            .await
            .unwrap();
        let written = writer.finish().await;

        assert_eq!(summary, RunSummary::default());
        assert_eq!(written.written, 1);
        assert!(read_rows(&reports::wallet_report_path(dir.path(), &wallet)).is_empty());
    }

    #[tokio::test]
    async fn test_transport_error_still_flushes_scheduled_reports() {
        let mut rpc = MockRpc::new(510);
        let first = rpc.add_account(507, &[509, 508, 507]);
        let second = rpc.add_account(505, &[509]);
        rpc.failing_account = Some(second);
        let wallet = Pubkey::new_unique();

        let dir = tempfile::tempdir().unwrap();
        let mut writer = ReportWriter::new(dir.path());

        let err = export_wallet_rewards(&rpc, &wallet, &mut writer)
            .await
            .unwrap_err();
        let written = writer.finish().await;

        assert!(err.to_string().contains("connection reset"));
        assert_eq!(written, reports::WriteSummary { written: 1, failed: 0 });

        let first_rows = read_rows(&reports::stake_account_report_path(dir.path(), &first));
        assert_eq!(epochs(&first_rows), vec![509, 508, 507]);
        assert!(!reports::stake_account_report_path(dir.path(), &second).exists());
        assert!(!reports::wallet_report_path(dir.path(), &wallet).exists());
    }
}
