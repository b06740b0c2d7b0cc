//! Device inventory records and hardware identifiers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::user::{RecordFieldError, record_id};
use super::{Error, LocalUserId, ServerUrl};

/// Name a connectivity SIM carries while it sits unassigned in stock.
pub const UNNAMED_SIM_MARKER: &str = "@@";

/// Validation failures for hardware identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HardwareIdError {
    #[error("imei must be 14 to 17 digits")]
    InvalidImei,
    #[error("iccid must be 18 to 22 digits, optionally ending in 'F'")]
    InvalidIccid,
}

impl From<HardwareIdError> for Error {
    fn from(value: HardwareIdError) -> Self {
        Error::invalid_request(value.to_string())
    }
}

record_id!(
    /// Primary key of a local inventory row.
    LocalDeviceId
);
record_id!(
    /// Device identifier on a tracking server.
    RemoteDeviceId
);

/// Hardware identifier of a tracker, used as its unique id on the
/// tracking server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Imei(String);

impl Imei {
    pub fn parse(raw: &str) -> Result<Self, HardwareIdError> {
        let trimmed = raw.trim();
        if (14..=17).contains(&trimmed.len()) && trimmed.chars().all(|c| c.is_ascii_digit()) {
            Ok(Self(trimmed.to_owned()))
        } else {
            Err(HardwareIdError::InvalidImei)
        }
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Display for Imei {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// SIM card identifier on the connectivity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Iccid(String);

impl Iccid {
    pub fn parse(raw: &str) -> Result<Self, HardwareIdError> {
        let trimmed = raw.trim();
        let digits = trimmed
            .strip_suffix('F')
            .or_else(|| trimmed.strip_suffix('f'))
            .unwrap_or(trimmed);
        if (18..=22).contains(&trimmed.len())
            && !digits.is_empty()
            && digits.chars().all(|c| c.is_ascii_digit())
        {
            Ok(Self(trimmed.to_ascii_uppercase()))
        } else {
            Err(HardwareIdError::InvalidIccid)
        }
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Display for Iccid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Number of entitlement months granted on first activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PreloadedMonths(u32);

impl PreloadedMonths {
    pub const DEFAULT: Self = Self(1);

    pub fn new(months: u32) -> Self {
        Self(months)
    }

    /// Interpret a stored column value; absent or negative means default.
    pub fn from_stored(value: Option<i32>) -> Self {
        value
            .and_then(|months| u32::try_from(months).ok())
            .map_or(Self::DEFAULT, Self)
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl Default for PreloadedMonths {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// One row of the local device inventory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    pub id: LocalDeviceId,
    pub imei: Imei,
    pub iccid: Iccid,
    pub remote_device_id: RemoteDeviceId,
    pub server_url: ServerUrl,
    pub assigned_user: Option<LocalUserId>,
    pub label: Option<String>,
    pub preloaded_months: PreloadedMonths,
    pub expiration: Option<DateTime<Utc>>,
    pub brand: Option<String>,
    pub model: Option<String>,
}

impl DeviceRecord {
    pub fn is_assigned(&self) -> bool {
        self.assigned_user.is_some()
    }
}

/// Insert payload for a new inventory row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDeviceRecord {
    pub imei: Imei,
    pub iccid: Iccid,
    pub remote_device_id: RemoteDeviceId,
    pub server_url: ServerUrl,
    pub label: Option<String>,
    pub preloaded_months: PreloadedMonths,
    pub brand: Option<String>,
    pub model: Option<String>,
}

fn last_four(text: &str) -> &str {
    let start = text
        .char_indices()
        .rev()
        .nth(3)
        .map_or(0, |(index, _)| index);
    text.get(start..).unwrap_or(text)
}

/// Placeholder name given to a stocked device on the tracking server.
pub fn inventory_device_name(imei: &Imei, iccid: &Iccid) -> String {
    format!(
        "{UNNAMED_SIM_MARKER} {}/{}",
        last_four(imei.as_str()),
        last_four(iccid.as_str())
    )
}

/// Name written to a SIM once it is paired with a device.
pub fn inventory_sim_name(imei: &Imei) -> String {
    format!("{UNNAMED_SIM_MARKER} {imei}")
}

/// Whether a SIM name marks the card as not yet paired.
pub fn is_unnamed_sim(name: Option<&str>) -> bool {
    match name.map(str::trim) {
        None | Some("") => true,
        Some(name) => name == UNNAMED_SIM_MARKER,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("356938035643809", true)]
    #[case(" 3569380356438091 ", true)]
    #[case("35693803564380A", false)]
    #[case("1234", false)]
    fn imei_parsing(#[case] raw: &str, #[case] valid: bool) {
        assert_eq!(Imei::parse(raw).is_ok(), valid);
    }

    #[rstest]
    #[case("8931080019073497795", true)]
    #[case("8931080019073497795f", true)]
    #[case("89310800190734977", false)]
    #[case("89310800X9073497795", false)]
    fn iccid_parsing(#[case] raw: &str, #[case] valid: bool) {
        assert_eq!(Iccid::parse(raw).is_ok(), valid);
    }

    #[rstest]
    fn inventory_names_use_trailing_digits() {
        let imei = Imei::parse("356938035643809").expect("imei");
        let iccid = Iccid::parse("8931080019073497795").expect("iccid");
        assert_eq!(inventory_device_name(&imei, &iccid), "@@ 3809/7795");
        assert_eq!(inventory_sim_name(&imei), "@@ 356938035643809");
    }

    #[rstest]
    #[case(None, true)]
    #[case(Some(""), true)]
    #[case(Some("@@"), true)]
    #[case(Some("@@ 356938035643809"), false)]
    #[case(Some("Van 4"), false)]
    fn unnamed_sim_detection(#[case] name: Option<&str>, #[case] unnamed: bool) {
        assert_eq!(is_unnamed_sim(name), unnamed);
    }

    #[rstest]
    #[case(None, 1)]
    #[case(Some(-2), 1)]
    #[case(Some(0), 0)]
    #[case(Some(12), 12)]
    fn preloaded_months_from_storage(#[case] stored: Option<i32>, #[case] expected: u32) {
        assert_eq!(PreloadedMonths::from_stored(stored).get(), expected);
    }
}
