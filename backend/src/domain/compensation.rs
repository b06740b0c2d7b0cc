//! Compensating actions for multi-system writes.
//!
//! A coordinator records one undo action after each remote step commits.
//! If a later step fails, [`CompensationLog::unwind`] runs the recorded
//! actions in reverse order, keeps going when an individual action fails,
//! and returns a [`RollbackReport`] describing exactly what was restored.
//! Each action is labelled, so the report tells an operator which remote
//! mutation may still need manual attention.

use std::future::Future;

use futures_util::future::BoxFuture;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use super::Error;

/// Result of one undo action that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoEffect {
    /// The remote state was restored.
    Applied,
    /// Nothing was changed; the reason explains why.
    Skipped(String),
}

type UndoAction<'a> = Box<dyn FnOnce() -> BoxFuture<'a, Result<UndoEffect, String>> + Send + 'a>;

struct Compensation<'a> {
    label: &'static str,
    undo: UndoAction<'a>,
}

/// Stack of undo actions for the steps committed so far.
#[derive(Default)]
pub struct CompensationLog<'a> {
    actions: Vec<Compensation<'a>>,
}

impl<'a> CompensationLog<'a> {
    pub fn new() -> Self {
        Self {
            actions: Vec::new(),
        }
    }

    /// Record the undo for a step that just committed.
    pub fn record<F, Fut>(&mut self, label: &'static str, undo: F)
    where
        F: FnOnce() -> Fut + Send + 'a,
        Fut: Future<Output = Result<UndoEffect, String>> + Send + 'a,
    {
        self.actions.push(Compensation {
            label,
            undo: Box::new(move || Box::pin(undo())),
        });
    }

    /// Move `later`'s actions on top of this log so they unwind first.
    pub fn append(&mut self, mut later: CompensationLog<'a>) {
        self.actions.append(&mut later.actions);
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Run every recorded action, newest first.
    pub async fn unwind(self) -> RollbackReport {
        let mut entries = Vec::with_capacity(self.actions.len());
        for Compensation { label, undo } in self.actions.into_iter().rev() {
            let outcome = match undo().await {
                Ok(UndoEffect::Applied) => {
                    info!(action = label, "compensating action applied");
                    RollbackOutcome::Applied
                }
                Ok(UndoEffect::Skipped(reason)) => {
                    info!(action = label, %reason, "compensating action skipped");
                    RollbackOutcome::Skipped { reason }
                }
                Err(message) => {
                    warn!(action = label, %message, "compensating action failed");
                    RollbackOutcome::Failed { message }
                }
            };
            entries.push(RollbackEntry {
                action: label,
                outcome,
            });
        }
        RollbackReport { entries }
    }
}

/// Outcome of one compensating action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RollbackOutcome {
    Applied,
    Skipped { reason: String },
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RollbackEntry {
    pub action: &'static str,
    #[serde(flatten)]
    pub outcome: RollbackOutcome,
}

/// Structured account of an unwind, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RollbackReport {
    pub entries: Vec<RollbackEntry>,
}

impl RollbackReport {
    /// True when no compensating action failed.
    pub fn is_complete(&self) -> bool {
        self.entries
            .iter()
            .all(|entry| !matches!(entry.outcome, RollbackOutcome::Failed { .. }))
    }

    pub fn to_value(&self) -> Value {
        json!({
            "complete": self.is_complete(),
            "actions": self.entries,
        })
    }
}

/// Attach the failed step and rollback report to an error.
pub fn with_rollback(error: Error, failed_step: &str, report: &RollbackReport) -> Error {
    error.with_details(json!({
        "failedStep": failed_step,
        "rollback": report.to_value(),
    }))
}

/// Attach the failed step to an error raised before anything needed undoing.
pub fn at_step(error: Error, failed_step: &str) -> Error {
    error.with_details(json!({ "failedStep": failed_step }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    type Seen = Arc<Mutex<Vec<&'static str>>>;

    fn push(
        log: &mut CompensationLog<'_>,
        seen: &Seen,
        label: &'static str,
        result: Result<UndoEffect, String>,
    ) {
        let seen = Arc::clone(seen);
        log.record(label, move || async move {
            seen.lock().expect("seen lock").push(label);
            result
        });
    }

    #[tokio::test]
    async fn unwinds_in_reverse_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut log = CompensationLog::new();
        push(&mut log, &seen, "delete remote device", Ok(UndoEffect::Applied));
        push(&mut log, &seen, "restore sim name", Ok(UndoEffect::Applied));

        let report = log.unwind().await;

        assert_eq!(
            *seen.lock().expect("seen lock"),
            vec!["restore sim name", "delete remote device"]
        );
        assert!(report.is_complete());
    }

    #[tokio::test]
    async fn continues_after_a_failed_action() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut log = CompensationLog::new();
        push(&mut log, &seen, "first", Ok(UndoEffect::Applied));
        push(&mut log, &seen, "second", Err("timeout".to_owned()));

        let report = log.unwind().await;

        assert_eq!(seen.lock().expect("seen lock").len(), 2);
        assert!(!report.is_complete());
        assert_eq!(
            report.entries.first().map(|entry| &entry.outcome),
            Some(&RollbackOutcome::Failed {
                message: "timeout".to_owned()
            })
        );
    }

    #[tokio::test]
    async fn skipped_actions_keep_report_complete() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut log = CompensationLog::new();
        push(
            &mut log,
            &seen,
            "restore name",
            Ok(UndoEffect::Skipped("renamed since".to_owned())),
        );

        let report = log.unwind().await;

        assert!(report.is_complete());
        assert_eq!(
            report.to_value(),
            json!({
                "complete": true,
                "actions": [{ "action": "restore name", "outcome": "skipped", "reason": "renamed since" }],
            })
        );
    }

    #[tokio::test]
    async fn empty_log_yields_empty_report() {
        let report = CompensationLog::new().unwind().await;
        assert!(report.entries.is_empty());
        assert!(report.is_complete());
    }

    #[test]
    fn rollback_details_name_the_failed_step() {
        let error = with_rollback(
            Error::persistence_failed("insert failed"),
            "persist inventory row",
            &RollbackReport::default(),
        );
        let details = error.details().expect("details attached");
        assert_eq!(details["failedStep"], "persist inventory row");
        assert_eq!(details["rollback"]["complete"], true);
    }
}
