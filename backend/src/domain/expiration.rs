//! Entitlement expiration arithmetic.
//!
//! An activation grants whole calendar months counted from the activation
//! date; the entitlement always ends at 23:59:59 UTC on the final day.
//! Month addition clamps to the last day of shorter months, so an activation
//! on 31 January with one month ends on the last day of February.

use chrono::{DateTime, Months, Utc};

use super::PreloadedMonths;

/// Compute the expiration granted by an activation at `now`.
///
/// Returns `None` only when the result falls outside chrono's range.
///
/// # Examples
/// ```
/// use chrono::{TimeZone, Utc};
/// use fleet_sync::domain::{entitlement_expiration, PreloadedMonths};
///
/// let now = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
/// let expires = entitlement_expiration(now, PreloadedMonths::new(2)).unwrap();
/// assert_eq!(expires, Utc.with_ymd_and_hms(2024, 3, 15, 23, 59, 59).unwrap());
/// ```
pub fn entitlement_expiration(now: DateTime<Utc>, months: PreloadedMonths) -> Option<DateTime<Utc>> {
    now.date_naive()
        .checked_add_months(Months::new(months.get()))?
        .and_hms_opt(23, 59, 59)
        .map(|end| end.and_utc())
}

/// Whether an entitlement has lapsed at `now`.
///
/// Devices that were never activated have no expiration and are not expired.
pub fn is_expired(expiration: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    expiration.is_some_and(|expires| expires < now)
}
