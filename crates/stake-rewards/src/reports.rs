//! CSV report generation
//!
//! Writes run on blocking tasks while the retrieval loop keeps querying.
//! Every task is joined in [`ReportWriter::finish`] before the process exits;
//! a failed write is logged and never affects the other reports.

use anyhow::{Context, Result};
use csv::WriterBuilder;
use solana_sdk::pubkey::Pubkey;
use std::path::{Path, PathBuf};
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::constants;
use crate::rewards::CsvRow;

/// Path of the report for a single stake account
pub fn stake_account_report_path(output_dir: &Path, stake_account: &Pubkey) -> PathBuf {
    output_dir.join(format!(
        "{}{}{}",
        constants::STAKE_ACCOUNT_REPORT_PREFIX,
        stake_account,
        constants::REPORT_SUFFIX
    ))
}

/// Path of the aggregate report for a wallet
pub fn wallet_report_path(output_dir: &Path, wallet: &Pubkey) -> PathBuf {
    output_dir.join(format!(
        "{}{}{}",
        constants::WALLET_REPORT_PREFIX,
        wallet,
        constants::REPORT_SUFFIX
    ))
}

/// Write rows to `path`, replacing any existing file
pub fn write_rewards_csv(path: &Path, rows: &[CsvRow]) -> Result<()> {
    let mut wtr = WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    // Header is written explicitly so empty reports still carry it
    wtr.write_record(constants::CSV_HEADER)?;

    for row in rows {
        wtr.serialize(row)?;
    }

    wtr.flush()
        .with_context(|| format!("Failed to write {}", path.display()))?;

    Ok(())
}

/// Outcome of all scheduled writes
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriteSummary {
    pub written: usize,
    pub failed: usize,
}

/// Schedules report writes and joins them at the end of the run
pub struct ReportWriter {
    output_dir: PathBuf,
    tasks: JoinSet<(PathBuf, Result<usize>)>,
}

impl ReportWriter {
    pub fn new(output_dir: &Path) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
            tasks: JoinSet::new(),
        }
    }

    pub fn schedule_stake_account(&mut self, stake_account: &Pubkey, rows: Vec<CsvRow>) {
        let path = stake_account_report_path(&self.output_dir, stake_account);
        self.schedule(path, rows);
    }

    pub fn schedule_wallet(&mut self, wallet: &Pubkey, rows: Vec<CsvRow>) {
        let path = wallet_report_path(&self.output_dir, wallet);
        self.schedule(path, rows);
    }

    /// Queue a write of `rows` to `path`
    pub fn schedule(&mut self, path: PathBuf, rows: Vec<CsvRow>) {
        self.tasks.spawn_blocking(move || {
            let result = write_rewards_csv(&path, &rows).map(|_| rows.len());
            (path, result)
        });
    }

    /// Wait for every scheduled write, logging each outcome
    pub async fn finish(mut self) -> WriteSummary {
        let mut summary = WriteSummary::default();

        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok((path, Ok(rows))) => {
                    info!("  Generated: {} ({} rows)", path.display(), rows);
                    summary.written += 1;
                }
                Ok((path, Err(e))) => {
                    error!("Error writing CSV file {}: {:?}", path.display(), e);
                    summary.failed += 1;
                }
                Err(e) => {
                    error!("CSV write task failed: {}", e);
                    summary.failed += 1;
                }
            }
        }

        summary
    }
}
