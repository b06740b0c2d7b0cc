//! Driving port for read-only device views.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;

use super::{Position, PositionWindow, SimState, UsageRecord};
use crate::domain::{CallerIdentity, Error, Imei};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionHistoryRequest {
    pub imei: Imei,
    /// Calendar day in `timezone`.
    pub date: NaiveDate,
    pub timezone: Tz,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PositionHistory {
    pub window: PositionWindow,
    pub positions: Vec<Position>,
}

/// Combined live view of one device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceStatus {
    pub imei: Imei,
    pub last_position: Option<Position>,
    /// `None` when the connectivity provider could not be reached.
    pub sim_state: Option<SimState>,
    pub expiration: Option<DateTime<Utc>>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviceInsightQuery: Send + Sync {
    async fn position_history(
        &self,
        caller: &CallerIdentity,
        request: PositionHistoryRequest,
    ) -> Result<PositionHistory, Error>;

    async fn status(&self, caller: &CallerIdentity, imei: &Imei) -> Result<DeviceStatus, Error>;

    async fn usage(&self, caller: &CallerIdentity, imei: &Imei)
    -> Result<Vec<UsageRecord>, Error>;
}
