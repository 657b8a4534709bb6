//! Centralized constants for the stake rewards exporter
//!
//! Stake program layout values apply to every Solana stake account.
//! Wallet-specific settings are read from the environment (see `config`).

use solana_sdk::pubkey::Pubkey;

// =============================================================================
// Environment
// =============================================================================

/// RPC endpoint variable
pub const RPC_URL_ENV: &str = "SOLANA_RPC_URL";

/// Wallet address variable
pub const WALLET_ENV: &str = "wallet";

// =============================================================================
// Stake Program Layout
// =============================================================================

/// Native stake program
pub const STAKE_PROGRAM_ID: Pubkey =
    Pubkey::from_str_const("Stake11111111111111111111111111111111111111");

/// Size of a stake account (StakeStateV2) in bytes
pub const STAKE_ACCOUNT_SIZE: u64 = 200;

/// Offset of the authorized withdrawer within a stake account
/// (4-byte enum tag + 8-byte rent reserve + 32-byte staker)
pub const WITHDRAWER_OFFSET: usize = 44;

/// Lamports per SOL
pub const LAMPORTS_PER_SOL: f64 = 1_000_000_000.0;

// =============================================================================
// Output
// =============================================================================

/// Default directory for generated CSV reports
pub const DEFAULT_OUTPUT_DIR: &str = "./out";

/// Per stake account report: stake-account-<address>-rewards.csv
pub const STAKE_ACCOUNT_REPORT_PREFIX: &str = "stake-account-";

/// Aggregate report: wallet-<address>-rewards.csv
pub const WALLET_REPORT_PREFIX: &str = "wallet-";

/// Common suffix for all reports
pub const REPORT_SUFFIX: &str = "-rewards.csv";

/// Column titles shared by every report
pub const CSV_HEADER: [&str; 6] = [
    "stakeAccount",
    "epoch",
    "effectiveSlot",
    "amount",
    "postBalance",
    "commission",
];
