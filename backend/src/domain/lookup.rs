//! Record lookups and ownership checks shared by the coordinators.

use tracing::error;

use super::failures::store_failure;
use super::ports::{DeviceRepository, UserRepository};
use super::{CallerIdentity, DeviceRecord, Error, Imei, SubjectId, UserRecord};

/// The single local user for `subject`, if any.
///
/// More than one row means the store is corrupt and the caller must not
/// guess which record is authoritative.
pub(crate) async fn user_for_subject<U>(
    users: &U,
    subject: &SubjectId,
) -> Result<Option<UserRecord>, Error>
where
    U: UserRepository + ?Sized,
{
    let mut rows = users.find_by_subject(subject).await.map_err(store_failure)?;
    if rows.len() > 1 {
        error!(%subject, rows = rows.len(), "multiple local users share one subject");
        return Err(Error::integrity_violation(
            "multiple local users share this identity; manual repair required",
        ));
    }
    Ok(rows.pop())
}

/// Like [`user_for_subject`] but fails when the caller was never synced.
pub(crate) async fn require_caller_record<U>(
    users: &U,
    caller: &CallerIdentity,
) -> Result<UserRecord, Error>
where
    U: UserRepository + ?Sized,
{
    let subject = caller.require_subject()?;
    user_for_subject(users, subject)
        .await?
        .ok_or_else(|| Error::not_found("user has not been synchronised"))
}

pub(crate) async fn require_device<D>(devices: &D, imei: &Imei) -> Result<DeviceRecord, Error>
where
    D: DeviceRepository + ?Sized,
{
    devices
        .find_by_imei(imei)
        .await
        .map_err(store_failure)?
        .ok_or_else(|| Error::not_found(format!("device {imei} not found")))
}

/// Ownership means the device is assigned to this user on the same server.
pub(crate) fn ensure_owned(user: &UserRecord, device: &DeviceRecord) -> Result<(), Error> {
    if device.assigned_user == Some(user.id) && device.server_url == user.server_url {
        Ok(())
    } else {
        Err(Error::ownership_mismatch("device is not assigned to this user"))
    }
}

/// Admins may act on any user record; everyone else only on their own.
pub(crate) fn ensure_record_access(caller: &CallerIdentity, record: &UserRecord) -> Result<(), Error> {
    if caller.is_admin() || caller.subject() == Some(&record.subject) {
        Ok(())
    } else {
        Err(Error::ownership_mismatch("user record belongs to another identity"))
    }
}
