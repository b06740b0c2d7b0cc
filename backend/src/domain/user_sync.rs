//! User provisioning and reconciliation across the tracking server and the
//! local record store.
//!
//! The remote account is always written first and the local row last, so a
//! local failure can be compensated by undoing the remote change. A local
//! row whose remote account has vanished is healed on the next sync by
//! recreating the account from the canonical representation.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::domain::compensation::{CompensationLog, UndoEffect, at_step, with_rollback};
use crate::domain::failures::{persistence_failure, remote_failure, store_failure};
use crate::domain::lookup::{ensure_record_access, require_caller_record, user_for_subject};
use crate::domain::ports::{
    DeleteUserRequest, RemoteUser, RemoteUserDraft, RoutingRepository, SUBJECT_ATTRIBUTE,
    SyncOutcome, SyncTarget, SyncUserRequest, TrackingClient, TrackingClientError,
    UpdateUserRequest, UserRepository, UserSyncCommand,
};
use crate::domain::user::normalise_optional;
use crate::domain::{
    CallerIdentity, CountryCode, EmailAddress, Error, LocalUserId, NewUserRecord, ProfileChanges,
    ServerUrl, SubjectId, UserProfile, UserRecord, derive_remote_secret,
};

/// Desired profile for one user, after merging request and stored values.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CanonicalUser {
    email: EmailAddress,
    subject: SubjectId,
    name: Option<String>,
    phone: Option<String>,
}

impl CanonicalUser {
    /// Remote accounts always carry a name; the email stands in when the
    /// user never supplied one.
    fn remote_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.email.as_str().to_owned())
    }

    fn draft(&self) -> RemoteUserDraft {
        RemoteUserDraft {
            name: self.remote_name(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            password: derive_remote_secret(&self.email),
            subject: self.subject.clone(),
        }
    }

    /// `remote` with the canonical fields applied, or `None` when nothing
    /// differs.
    fn merged_into(&self, remote: &RemoteUser) -> Option<RemoteUser> {
        let mut desired = remote.clone();
        desired.name = self.remote_name();
        desired.email = self.email.as_str().to_owned();
        desired.phone = self.phone.clone();
        desired.attributes.insert(
            SUBJECT_ATTRIBUTE.to_owned(),
            Value::String(self.subject.as_str().to_owned()),
        );
        (desired != *remote).then_some(desired)
    }

    /// Login secret to send alongside an update of `remote`. The remote
    /// password is derived from the email, so it is replaced only when the
    /// email changes.
    fn replacement_secret(&self, remote: &RemoteUser) -> Option<Zeroizing<String>> {
        (self.email.as_str() != remote.email).then(|| derive_remote_secret(&self.email))
    }

    fn local_changes(&self) -> ProfileChanges {
        ProfileChanges {
            email: self.email.clone(),
            name: self.name.clone(),
            phone: self.phone.clone(),
        }
    }

    fn differs_from(&self, record: &UserRecord) -> bool {
        self.email != record.email || self.name != record.name || self.phone != record.phone
    }
}

/// Secret that puts the login of `remote` back after `desired` replaced it.
/// Stored remote emails that no longer parse keep whatever secret is set.
fn restored_secret(desired: &RemoteUser, remote: &RemoteUser) -> Option<Zeroizing<String>> {
    if desired.email == remote.email {
        return None;
    }
    EmailAddress::new(remote.email.clone())
        .ok()
        .map(|email| derive_remote_secret(&email))
}

/// Coordinator implementing [`UserSyncCommand`].
#[derive(Clone)]
pub struct UserSyncService<U, R, T> {
    users: Arc<U>,
    routing: Arc<R>,
    tracking: Arc<T>,
}

impl<U, R, T> UserSyncService<U, R, T> {
    pub fn new(users: Arc<U>, routing: Arc<R>, tracking: Arc<T>) -> Self {
        Self {
            users,
            routing,
            tracking,
        }
    }
}

impl<U, R, T> UserSyncService<U, R, T>
where
    U: UserRepository,
    R: RoutingRepository,
    T: TrackingClient,
{
    async fn resolve_target(
        &self,
        target: &SyncTarget,
    ) -> Result<(ServerUrl, Option<CountryCode>), Error> {
        match target {
            SyncTarget::Server(server) => Ok((server.clone(), None)),
            SyncTarget::Country(country) => {
                let server = self
                    .routing
                    .server_for_country(country)
                    .await
                    .map_err(store_failure)?
                    .ok_or_else(|| {
                        Error::routing_not_found(format!(
                            "no tracking server registered for country {country}"
                        ))
                    })?;
                Ok((server, Some(country.clone())))
            }
        }
    }

    async fn find_owned_record(
        &self,
        caller: &CallerIdentity,
        local_id: LocalUserId,
    ) -> Result<UserRecord, Error> {
        let record = self
            .users
            .find_by_id(local_id)
            .await
            .map_err(store_failure)?
            .ok_or_else(|| Error::not_found("user not found"))?;
        ensure_record_access(caller, &record)?;
        Ok(record)
    }

    /// First sync for a subject: create the remote account, then the row.
    async fn provision(
        &self,
        canonical: CanonicalUser,
        server: ServerUrl,
        country: Option<CountryCode>,
    ) -> Result<SyncOutcome, Error> {
        let remote = self
            .tracking
            .create_user(&server, &canonical.draft())
            .await
            .map_err(|err| match err {
                TrackingClientError::Duplicate { .. } => Error::linking_required(
                    "a tracking account already exists for this email and must be linked by support",
                ),
                other => remote_failure("create remote user", &other),
            })?;
        debug!(server = %server, remote_user = %remote.id, "remote user created");

        let mut compensations = CompensationLog::new();
        let tracking = &self.tracking;
        let server_ref = &server;
        let remote_id = remote.id;
        compensations.record("delete remote user", move || async move {
            tracking
                .delete_user(server_ref, remote_id)
                .await
                .map(|()| UndoEffect::Applied)
                .map_err(|err| err.to_string())
        });

        let new_record = NewUserRecord {
            email: canonical.email.clone(),
            subject: canonical.subject.clone(),
            remote_user_id: remote.id,
            server_url: server.clone(),
            name: canonical.name.clone(),
            phone: canonical.phone.clone(),
            country_code: country,
        };
        match self.users.insert(&new_record).await {
            Ok(record) => {
                info!(user = %record.id, server = %server, "user provisioned");
                Ok(SyncOutcome {
                    created: true,
                    profile: record.profile(),
                })
            }
            Err(err) => {
                let failure = persistence_failure(&err);
                let report = compensations.unwind().await;
                Err(with_rollback(failure, "persist local user", &report))
            }
        }
    }

    /// Existing subject: bring the remote account back in line with the
    /// canonical profile, recreating it when it has disappeared.
    async fn reconcile(
        &self,
        record: UserRecord,
        canonical: CanonicalUser,
    ) -> Result<SyncOutcome, Error> {
        let server = record.server_url.clone();
        let mut compensations = CompensationLog::new();
        let tracking = &self.tracking;
        let users = &self.users;
        let server_ref = &server;

        match self.tracking.get_user(&server, record.remote_user_id).await {
            Ok(remote) => {
                if let Some(desired) = canonical.merged_into(&remote) {
                    self.tracking
                        .update_user(&server, &desired, canonical.replacement_secret(&remote))
                        .await
                        .map_err(|err| remote_failure("update remote user", &err))?;
                    debug!(remote_user = %remote.id, "remote user reconciled");
                    compensations.record("restore remote user", move || async move {
                        tracking
                            .update_user(server_ref, &remote, restored_secret(&desired, &remote))
                            .await
                            .map(|_| UndoEffect::Applied)
                            .map_err(|err| err.to_string())
                    });
                }
            }
            Err(TrackingClientError::NotFound { .. }) => {
                warn!(
                    user = %record.id,
                    remote_user = %record.remote_user_id,
                    "remote user missing; recreating"
                );
                let recreated = self
                    .tracking
                    .create_user(&server, &canonical.draft())
                    .await
                    .map_err(|err| match err {
                        TrackingClientError::Duplicate { .. } => Error::linking_required(
                            "a tracking account already exists for this email and must be linked by support",
                        ),
                        other => remote_failure("recreate remote user", &other),
                    })?;
                let recreated_id = recreated.id;
                compensations.record("delete recreated remote user", move || async move {
                    tracking
                        .delete_user(server_ref, recreated_id)
                        .await
                        .map(|()| UndoEffect::Applied)
                        .map_err(|err| err.to_string())
                });
                if let Err(err) = users.update_remote_user_id(record.id, recreated_id).await {
                    let failure = persistence_failure(&err);
                    let report = compensations.unwind().await;
                    return Err(with_rollback(failure, "rebind local user", &report));
                }
                let local_id = record.id;
                let previous_remote_id = record.remote_user_id;
                compensations.record("rebind previous remote id", move || async move {
                    users
                        .update_remote_user_id(local_id, previous_remote_id)
                        .await
                        .map(|()| UndoEffect::Applied)
                        .map_err(|err| err.to_string())
                });
            }
            Err(err) => return Err(remote_failure("fetch remote user", &err)),
        }

        let stored = self
            .persist_profile(&record, &canonical, compensations)
            .await?;
        Ok(SyncOutcome {
            created: false,
            profile: stored.profile(),
        })
    }

    /// Write changed profile fields locally, unwinding on failure.
    async fn persist_profile(
        &self,
        record: &UserRecord,
        canonical: &CanonicalUser,
        compensations: CompensationLog<'_>,
    ) -> Result<UserRecord, Error> {
        if !canonical.differs_from(record) {
            return Ok(record.clone());
        }
        match self
            .users
            .update_profile(record.id, &canonical.local_changes())
            .await
        {
            Ok(updated) => Ok(updated),
            Err(err) => {
                let failure = persistence_failure(&err);
                let report = compensations.unwind().await;
                Err(with_rollback(failure, "update local user", &report))
            }
        }
    }
}

#[async_trait]
impl<U, R, T> UserSyncCommand for UserSyncService<U, R, T>
where
    U: UserRepository,
    R: RoutingRepository,
    T: TrackingClient,
{
    async fn sync(
        &self,
        caller: &CallerIdentity,
        request: SyncUserRequest,
    ) -> Result<SyncOutcome, Error> {
        let subject = caller.require_subject()?;
        let (server, country) = self.resolve_target(&request.target).await?;
        let name = normalise_optional(request.name);
        let phone = normalise_optional(request.phone);

        match user_for_subject(self.users.as_ref(), subject).await? {
            None => {
                let canonical = CanonicalUser {
                    email: caller.email().clone(),
                    subject: subject.clone(),
                    name,
                    phone,
                };
                self.provision(canonical, server, country).await
            }
            Some(record) => {
                let canonical = CanonicalUser {
                    email: caller.email().clone(),
                    subject: subject.clone(),
                    name: name.or_else(|| record.name.clone()),
                    phone: phone.or_else(|| record.phone.clone()),
                };
                self.reconcile(record, canonical).await
            }
        }
    }

    async fn update_profile(
        &self,
        caller: &CallerIdentity,
        request: UpdateUserRequest,
    ) -> Result<UserProfile, Error> {
        let record = self.find_owned_record(caller, request.local_id).await?;
        if record.remote_user_id != request.remote_id || record.server_url != request.server_url {
            return Err(Error::ownership_mismatch(
                "remote identifiers do not match the stored user",
            ));
        }

        let canonical = CanonicalUser {
            email: record.email.clone(),
            subject: record.subject.clone(),
            name: normalise_optional(request.name).or_else(|| record.name.clone()),
            phone: normalise_optional(request.phone).or_else(|| record.phone.clone()),
        };
        let server = record.server_url.clone();
        let remote = self
            .tracking
            .get_user(&server, record.remote_user_id)
            .await
            .map_err(|err| match err {
                TrackingClientError::NotFound { .. } => {
                    Error::not_found("tracking account not found; sync the user first")
                }
                other => remote_failure("fetch remote user", &other),
            })?;

        let mut compensations = CompensationLog::new();
        let tracking = &self.tracking;
        let server_ref = &server;
        if let Some(desired) = canonical.merged_into(&remote) {
            self.tracking
                .update_user(&server, &desired, canonical.replacement_secret(&remote))
                .await
                .map_err(|err| remote_failure("update remote user", &err))?;
            compensations.record("restore remote user", move || async move {
                tracking
                    .update_user(server_ref, &remote, restored_secret(&desired, &remote))
                    .await
                    .map(|_| UndoEffect::Applied)
                    .map_err(|err| err.to_string())
            });
        }

        let stored = self
            .persist_profile(&record, &canonical, compensations)
            .await?;
        Ok(stored.profile())
    }

    async fn delete(
        &self,
        caller: &CallerIdentity,
        request: DeleteUserRequest,
    ) -> Result<(), Error> {
        let record = self.find_owned_record(caller, request.local_id).await?;
        if record.remote_user_id != request.remote_id || record.server_url != request.server_url {
            return Err(Error::ownership_mismatch(
                "remote identifiers do not match the stored user",
            ));
        }

        let server = record.server_url.clone();
        let mut compensations = CompensationLog::new();
        match self
            .tracking
            .delete_user(&server, record.remote_user_id)
            .await
        {
            Ok(()) => {
                let tracking = &self.tracking;
                let users = &self.users;
                let server_ref = &server;
                let canonical = CanonicalUser {
                    email: record.email.clone(),
                    subject: record.subject.clone(),
                    name: record.name.clone(),
                    phone: record.phone.clone(),
                };
                let local_id = record.id;
                compensations.record("recreate remote user", move || async move {
                    let recreated = match tracking.create_user(server_ref, &canonical.draft()).await {
                        Ok(recreated) => recreated,
                        Err(err) => return Err(err.to_string()),
                    };
                    match users.update_remote_user_id(local_id, recreated.id).await {
                        Ok(()) => Ok(UndoEffect::Applied),
                        Err(err) => {
                            // Leave no orphan behind if the row cannot point at it.
                            let cleanup = tracking.delete_user(server_ref, recreated.id).await;
                            Err(format!(
                                "recreated remote user could not be rebound: {err}; cleanup: {}",
                                cleanup.map_or_else(|e| e.to_string(), |()| "ok".to_owned())
                            ))
                        }
                    }
                });
            }
            Err(TrackingClientError::NotFound { .. }) => {
                warn!(user = %record.id, "remote user already absent; deleting local row");
            }
            Err(err) => return Err(remote_failure("delete remote user", &err)),
        }

        if let Err(err) = self.users.delete(record.id).await {
            let failure = persistence_failure(&err);
            let report = compensations.unwind().await;
            return Err(with_rollback(failure, "delete local user", &report));
        }
        info!(user = %record.id, "user deleted");
        Ok(())
    }

    async fn issue_session_token(
        &self,
        caller: &CallerIdentity,
        server: Option<ServerUrl>,
    ) -> Result<String, Error> {
        let record = require_caller_record(self.users.as_ref(), caller).await?;
        if server.as_ref().is_some_and(|requested| *requested != record.server_url) {
            return Err(Error::ownership_mismatch(
                "user is provisioned on a different tracking server",
            ));
        }
        let password = derive_remote_secret(&record.email);
        let token = self
            .tracking
            .issue_session_token(&record.server_url, &record.email, password.as_str())
            .await
            .map_err(|err| remote_failure("issue session token", &err))?;

        if let Err(err) = self.users.update_session_token(record.id, &token).await {
            return Err(at_step(persistence_failure(&err), "store session token"));
        }
        Ok(token)
    }

    async fn register_push_token(
        &self,
        caller: &CallerIdentity,
        token: String,
    ) -> Result<(), Error> {
        let token = normalise_optional(Some(token))
            .ok_or_else(|| Error::invalid_request("push token must not be empty"))?;
        let record = require_caller_record(self.users.as_ref(), caller).await?;
        self.users
            .update_push_token(record.id, &token)
            .await
            .map_err(store_failure)
    }
}

#[cfg(test)]
#[path = "user_sync_tests.rs"]
mod tests;
