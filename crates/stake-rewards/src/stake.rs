//! Parsed stake account data (getAccountInfo with jsonParsed encoding)
//!
//! Only the delegation's activation epoch is needed. Every level of the
//! response is optional so that undelegated or unparsed accounts decode
//! cleanly and are reported instead of failing the run.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Why an activation epoch could not be extracted
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ActivationEpochError {
    #[error("account not found")]
    AccountNotFound,

    #[error("unexpected account shape: {0}")]
    UnexpectedShape(String),

    #[error("account data is not jsonParsed")]
    NotParsed,

    #[error("no delegation.activationEpoch (stake state: {0})")]
    MissingActivationEpoch(String),

    #[error("invalid activationEpoch '{0}'")]
    InvalidActivationEpoch(String),
}

/// Account info value as returned for a stake account
#[derive(Debug, Deserialize)]
pub struct ParsedStakeAccount {
    #[serde(default)]
    data: Option<AccountData>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AccountData {
    Parsed(ParsedData),
    // e.g. ["<base64>", "base64"] when the node cannot parse the account
    Raw(#[allow(dead_code)] Value),
}

#[derive(Debug, Deserialize)]
struct ParsedData {
    parsed: StakeState,
}

#[derive(Debug, Deserialize)]
struct StakeState {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    info: Option<StakeInfo>,
}

#[derive(Debug, Deserialize)]
struct StakeInfo {
    #[serde(default)]
    stake: Option<StakeDetail>,
}

#[derive(Debug, Deserialize)]
struct StakeDetail {
    #[serde(default)]
    delegation: Option<Delegation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Delegation {
    #[serde(default)]
    activation_epoch: Option<EpochField>,
}

/// Epochs are string-encoded u64s in jsonParsed output
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EpochField {
    Text(String),
    Number(u64),
}

impl ParsedStakeAccount {
    /// Decode the `value` of a getAccountInfo response
    pub fn from_value(value: &Value) -> Result<Self, ActivationEpochError> {
        if value.is_null() {
            return Err(ActivationEpochError::AccountNotFound);
        }
        Self::deserialize(value).map_err(|e| ActivationEpochError::UnexpectedShape(e.to_string()))
    }

    /// Stake state label (e.g. "delegated", "initialized")
    pub fn stake_type(&self) -> Option<&str> {
        match &self.data {
            Some(AccountData::Parsed(data)) => data.parsed.kind.as_deref(),
            _ => None,
        }
    }

    /// Epoch at which the delegation became active
    pub fn activation_epoch(&self) -> Result<u64, ActivationEpochError> {
        let Some(AccountData::Parsed(data)) = &self.data else {
            return Err(ActivationEpochError::NotParsed);
        };

        let field = data
            .parsed
            .info
            .as_ref()
            .and_then(|info| info.stake.as_ref())
            .and_then(|stake| stake.delegation.as_ref())
            .and_then(|delegation| delegation.activation_epoch.as_ref());

        match field {
            Some(EpochField::Number(epoch)) => Ok(*epoch),
            Some(EpochField::Text(text)) => text
                .trim()
                .parse::<u64>()
                .map_err(|_| ActivationEpochError::InvalidActivationEpoch(text.clone())),
            None => Err(ActivationEpochError::MissingActivationEpoch(
                self.stake_type().unwrap_or("unknown").to_string(),
            )),
        }
    }
}

/// Extract the activation epoch straight from a getAccountInfo `value`
pub fn activation_epoch(value: &Value) -> Result<u64, ActivationEpochError> {
    ParsedStakeAccount::from_value(value)?.activation_epoch()
}
