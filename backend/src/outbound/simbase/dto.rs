//! Wire DTOs for the Simbase API.
//!
//! The provider has renamed fields across API revisions; aliases accept
//! both spellings.

use serde::{Deserialize, Serialize};

use crate::domain::Iccid;
use crate::domain::ports::{AccountBalance, SimCard, SimState, UsageRecord};

#[derive(Debug, Deserialize)]
pub(super) struct SimCardDto {
    #[serde(default)]
    iccid: Option<String>,
    #[serde(default, alias = "status", alias = "sim_state")]
    state: Option<String>,
    #[serde(default, alias = "device_name")]
    name: Option<String>,
}

impl SimCardDto {
    /// Decode into a domain card; `requested` fills in a missing ICCID.
    pub(super) fn into_domain(self, requested: &Iccid) -> Result<SimCard, String> {
        let iccid = match self.iccid.as_deref() {
            None | Some("") => requested.clone(),
            Some(raw) => Iccid::parse(raw).map_err(|err| format!("iccid {raw:?}: {err}"))?,
        };
        let state = self
            .state
            .as_deref()
            .map(SimState::from_remote)
            .ok_or_else(|| format!("sim {iccid} has no state"))?;
        Ok(SimCard {
            iccid,
            state,
            name: self.name,
        })
    }
}

#[derive(Debug, Serialize)]
pub(super) struct RenameDto<'a> {
    pub(super) device_name: &'a str,
}

#[derive(Debug, Serialize)]
pub(super) struct StateChangeDto {
    pub(super) sim_state: &'static str,
}

/// Usage arrives either as a bare array or wrapped in `{ "data": [...] }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(super) enum UsageResponseDto {
    Bare(Vec<UsageDto>),
    Wrapped { data: Vec<UsageDto> },
}

impl UsageResponseDto {
    pub(super) fn into_domain(self) -> Vec<UsageRecord> {
        let rows = match self {
            Self::Bare(rows) | Self::Wrapped { data: rows } => rows,
        };
        rows.into_iter().map(UsageDto::into_domain).collect()
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct UsageDto {
    #[serde(default, alias = "date", alias = "month")]
    period: String,
    #[serde(default, alias = "data", alias = "bytes")]
    data_bytes: u64,
    #[serde(default, alias = "sms")]
    sms_count: u64,
    #[serde(default)]
    cost: Option<f64>,
}

impl UsageDto {
    fn into_domain(self) -> UsageRecord {
        UsageRecord {
            period: self.period,
            data_bytes: self.data_bytes,
            sms_count: self.sms_count,
            cost: self.cost,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct BalanceDto {
    #[serde(alias = "balance")]
    amount: f64,
    #[serde(default)]
    currency: Option<String>,
}

impl BalanceDto {
    pub(super) fn into_domain(self) -> AccountBalance {
        AccountBalance {
            amount: self.amount,
            currency: self.currency,
        }
    }
}
