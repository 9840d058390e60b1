/*
 *  Copyright 2025 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! # Batch Processor
//!
//! One call to [`ReminderProcessor::process_due`] is one pass: fetch the due
//! pending entries, settle each of them, then purge terminal entries past
//! the retention window.
//!
//! Each entry is settled on its own; nothing that happens to one entry stops
//! the others:
//!
//! ```text
//! task gone / closed   ──► Cancelled   (no attempt counted)
//! user gone            ──► Failed      (attempt counted)
//! delivery ok          ──► Sent        (attempt counted)
//! delivery error       ──► Pending     (attempt counted, retried next pass)
//!                      └─► Failed      (once attempts reach the ceiling)
//! ```
//!
//! Every write is conditional on the entry still being pending with the
//! attempt count read at the start of the pass, so an overlapping pass in
//! another process cannot record a second outcome for the same attempt.
//!
//! The processor has no clock of its own. Drive it from a scheduler, a cron
//! endpoint, or [`PeriodicTrigger`](crate::trigger::PeriodicTrigger).

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::{stream, FutureExt, StreamExt};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::ProcessorConfig;
use crate::dal::DAL;
use crate::database::UniversalTimestamp;
use crate::error::{DeliveryError, ProcessorError, StorageError};
use crate::models::reminder_entry::ReminderEntry;
use crate::providers::{Notifier, TaskProvider, UserProvider};

const TASK_GONE: &str = "Task deleted or completed";
const USER_GONE: &str = "User not found";

/// Counts for one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Due entries read at the start of the pass.
    pub fetched: usize,
    pub sent: usize,
    /// Entries that moved to `failed` in this pass.
    pub failed: usize,
    pub cancelled: usize,
    /// Entries that failed delivery and stay pending for another try.
    pub retrying: usize,
    /// Entries another pass settled first.
    pub skipped: usize,
    /// Entries left untouched because a lookup or write failed, or because
    /// the stored row could not be read.
    pub errors: usize,
    /// Terminal entries removed by retention cleanup.
    pub cleaned: usize,
}

impl PassSummary {
    fn record(&mut self, outcome: EntryOutcome) {
        match outcome {
            EntryOutcome::Sent => {
                self.sent += 1;
                metrics::counter!("nudge_reminders_sent_total").increment(1);
            }
            EntryOutcome::Failed => {
                self.failed += 1;
                metrics::counter!("nudge_reminders_failed_total").increment(1);
            }
            EntryOutcome::Cancelled => {
                self.cancelled += 1;
                metrics::counter!("nudge_reminders_cancelled_total", "source" => "processor")
                    .increment(1);
            }
            EntryOutcome::Retrying => {
                self.retrying += 1;
                metrics::counter!("nudge_reminders_retried_total").increment(1);
            }
            EntryOutcome::Skipped => self.skipped += 1,
            EntryOutcome::Error => self.errors += 1,
        }
    }
}

/// How a single entry was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOutcome {
    Sent,
    Failed,
    Cancelled,
    Retrying,
    Skipped,
    Error,
}

/// Delivers due reminders and applies the entry state machine.
///
/// Cheap to clone; clones share the pass guard, so two clones cannot run
/// passes at the same time either.
#[derive(Clone)]
pub struct ReminderProcessor {
    dal: DAL,
    tasks: Arc<dyn TaskProvider>,
    users: Arc<dyn UserProvider>,
    notifier: Arc<dyn Notifier>,
    config: ProcessorConfig,
    pass_guard: Arc<Mutex<()>>,
}

impl ReminderProcessor {
    pub fn new(
        dal: DAL,
        tasks: Arc<dyn TaskProvider>,
        users: Arc<dyn UserProvider>,
        notifier: Arc<dyn Notifier>,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            dal,
            tasks,
            users,
            notifier,
            config,
            pass_guard: Arc::new(Mutex::new(())),
        }
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Runs a pass at the wall-clock time.
    pub async fn process_due_now(&self) -> Result<PassSummary, ProcessorError> {
        self.process_due(Utc::now()).await
    }

    /// Runs one pass as of `now`.
    ///
    /// Fails only if another pass is running in this process or the due
    /// batch cannot be read. Per-entry problems are counted in the summary.
    pub async fn process_due(&self, now: DateTime<Utc>) -> Result<PassSummary, ProcessorError> {
        let _guard = self
            .pass_guard
            .try_lock()
            .map_err(|_| ProcessorError::PassInProgress)?;
        let started = Instant::now();

        let batch = self
            .dal
            .reminder_queue()
            .find_due(UniversalTimestamp::from(now), self.config.batch_size())
            .await?;

        let mut summary = PassSummary {
            fetched: batch.entries.len() + batch.invalid,
            ..PassSummary::default()
        };
        for _ in 0..batch.invalid {
            summary.record(EntryOutcome::Error);
        }
        debug!("Processing {} due reminders", summary.fetched);

        let outcomes: Vec<EntryOutcome> = stream::iter(batch.entries)
            .map(|entry| self.process_entry(entry, now))
            .buffer_unordered(self.config.max_concurrent_deliveries())
            .collect()
            .await;
        for outcome in outcomes {
            summary.record(outcome);
        }

        summary.cleaned = self.cleanup(now).await;

        metrics::histogram!("nudge_pass_duration_seconds").record(started.elapsed().as_secs_f64());
        info!(
            fetched = summary.fetched,
            sent = summary.sent,
            failed = summary.failed,
            cancelled = summary.cancelled,
            retrying = summary.retrying,
            skipped = summary.skipped,
            errors = summary.errors,
            cleaned = summary.cleaned,
            "Reminder pass complete"
        );

        Ok(summary)
    }

    async fn process_entry(&self, entry: ReminderEntry, now: DateTime<Utc>) -> EntryOutcome {
        let queue = self.dal.reminder_queue();
        let at = UniversalTimestamp::from(now);

        let task = match self.tasks.get_task(&entry.task_id).await {
            Ok(task) => task,
            Err(e) => {
                warn!(entry_id = %entry.id, task_id = %entry.task_id, "Task lookup failed: {}", e);
                return EntryOutcome::Error;
            }
        };
        let task = match task {
            Some(task) if task.accepts_reminders() => task,
            _ => {
                debug!(entry_id = %entry.id, task_id = %entry.task_id, "Task gone or closed");
                let result = queue.mark_cancelled(&entry, TASK_GONE, at).await;
                return settle(&entry, result, EntryOutcome::Cancelled);
            }
        };

        let user = match self.users.get_user(&entry.user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                warn!(entry_id = %entry.id, user_id = %entry.user_id, "User not found");
                let result = queue.mark_failed(&entry, USER_GONE, at).await;
                return settle(&entry, result, EntryOutcome::Failed);
            }
            Err(e) => {
                warn!(entry_id = %entry.id, user_id = %entry.user_id, "User lookup failed: {}", e);
                return EntryOutcome::Error;
            }
        };

        let timeout = self.config.delivery_timeout();
        let delivery = AssertUnwindSafe(self.notifier.send(&task, &user, entry.kind)).catch_unwind();
        let delivered = match tokio::time::timeout(timeout, delivery).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(DeliveryError::Failed("notifier panicked".to_string())),
            Err(_) => Err(DeliveryError::TimedOut(timeout)),
        };

        match delivered {
            Ok(()) => {
                let result = queue.mark_sent(&entry, at).await;
                settle(&entry, result, EntryOutcome::Sent)
            }
            Err(e) => {
                let reason = e.to_string();
                let attempts = entry.attempts.saturating_add(1);
                if attempts >= self.config.max_attempts() {
                    error!(
                        entry_id = %entry.id,
                        task_id = %entry.task_id,
                        attempts,
                        "Reminder delivery failed permanently: {}",
                        reason
                    );
                    let result = queue.mark_failed(&entry, &reason, at).await;
                    settle(&entry, result, EntryOutcome::Failed)
                } else {
                    warn!(
                        entry_id = %entry.id,
                        task_id = %entry.task_id,
                        attempts,
                        "Reminder delivery failed, will retry: {}",
                        reason
                    );
                    let result = queue.record_failed_attempt(&entry, &reason, at).await;
                    settle(&entry, result, EntryOutcome::Retrying)
                }
            }
        }
    }

    async fn cleanup(&self, now: DateTime<Utc>) -> usize {
        let cutoff = UniversalTimestamp::from(now - self.config.retention());
        match self
            .dal
            .reminder_queue()
            .delete_terminal_older_than(cutoff)
            .await
        {
            Ok(cleaned) => {
                if cleaned > 0 {
                    metrics::counter!("nudge_reminders_cleaned_total").increment(cleaned as u64);
                    debug!(cleaned, "Purged expired reminder entries");
                }
                cleaned
            }
            Err(e) => {
                error!("Reminder retention cleanup failed: {}", e);
                0
            }
        }
    }
}

fn settle(
    entry: &ReminderEntry,
    result: Result<bool, StorageError>,
    outcome: EntryOutcome,
) -> EntryOutcome {
    match result {
        Ok(true) => outcome,
        Ok(false) => {
            debug!(entry_id = %entry.id, "Entry settled by another pass");
            EntryOutcome::Skipped
        }
        Err(e) => {
            error!(entry_id = %entry.id, ?outcome, "Failed to record reminder outcome: {}", e);
            EntryOutcome::Error
        }
    }
}
