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

//! Reminder Queue DAL with runtime backend selection
//!
//! The reminder queue is the durable store of scheduled reminders. Two rules
//! hold for every write in this module:
//!
//! - At most one `pending` entry exists per `(task_id, kind)`. The partial
//!   unique index enforces this; inserts that would break it surface as
//!   [`StorageError::AlreadyScheduled`].
//! - Processor state transitions are conditional on the entry still being
//!   `pending` with the attempt count the caller observed. A transition that
//!   matches no row returns `false` and leaves the entry alone.

use super::models::{inserted_entry, NewReminderQueueRow, ReminderQueueRow};
use super::DAL;
use crate::database::schema::reminder_queue;
use crate::database::universal_types::{UniversalTimestamp, UniversalUuid};
use crate::error::StorageError;
use crate::models::reminder_entry::{
    NewReminderEntry, ReminderEntry, ReminderKind, ReminderStatus,
};
use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel::result::DatabaseErrorKind;
use tracing::warn;

/// What happens to the pending entries a replacement supersedes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingDisposition {
    /// Remove the rows entirely.
    Delete,
    /// Keep the rows for audit, moved to `cancelled`.
    Cancel,
}

/// Result of [`ReminderQueueDAL::replace_pending_for_task`].
#[derive(Debug, Clone, PartialEq)]
pub struct PendingReplacement {
    /// Number of pending entries deleted or cancelled.
    pub removed: usize,
    /// The newly created entry, if a replacement was requested.
    pub created: Option<ReminderEntry>,
}

/// Due entries read for one pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DueBatch {
    pub entries: Vec<ReminderEntry>,
    /// Due rows that could not be read as entries and were left in place.
    pub invalid: usize,
}

/// A conditional status update derived from an observed entry.
struct Transition {
    id: String,
    expected_attempts: i32,
    status: &'static str,
    attempts: i32,
    last_attempt_at: NaiveDateTime,
    error_message: Option<String>,
}

impl Transition {
    fn from_observed(
        entry: &ReminderEntry,
        status: ReminderStatus,
        attempts: u32,
        error_message: Option<String>,
        now: UniversalTimestamp,
    ) -> Self {
        Self {
            id: entry.id.to_string(),
            expected_attempts: attempts_column(entry.attempts),
            status: status.as_str(),
            attempts: attempts_column(attempts),
            last_attempt_at: now.to_naive(),
            error_message,
        }
    }
}

fn attempts_column(attempts: u32) -> i32 {
    i32::try_from(attempts).unwrap_or(i32::MAX)
}

fn terminal_statuses() -> Vec<&'static str> {
    ReminderStatus::TERMINAL.iter().map(|s| s.as_str()).collect()
}

fn map_insert_error(err: diesel::result::Error, task_id: &str, kind: ReminderKind) -> StorageError {
    match err {
        diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
            StorageError::AlreadyScheduled {
                task_id: task_id.to_string(),
                kind: kind.to_string(),
            }
        }
        other => StorageError::Database(other),
    }
}

fn into_entries(rows: Vec<ReminderQueueRow>) -> Result<Vec<ReminderEntry>, StorageError> {
    rows.into_iter().map(ReminderEntry::try_from).collect()
}

/// Converts due rows one at a time so a single bad row cannot stall the queue.
fn into_due_batch(rows: Vec<ReminderQueueRow>) -> DueBatch {
    let mut batch = DueBatch::default();
    for row in rows {
        match ReminderEntry::try_from(row) {
            Ok(entry) => batch.entries.push(entry),
            Err(e) => {
                warn!("Skipping unreadable due reminder: {}", e);
                batch.invalid += 1;
            }
        }
    }
    batch
}

/// Data access layer for reminder queue operations with runtime backend selection.
#[derive(Clone)]
pub struct ReminderQueueDAL<'a> {
    dal: &'a DAL,
}

impl<'a> ReminderQueueDAL<'a> {
    /// Creates a new ReminderQueueDAL instance.
    pub fn new(dal: &'a DAL) -> Self {
        Self { dal }
    }

    /// Inserts a new `pending` entry.
    ///
    /// Fails with [`StorageError::AlreadyScheduled`] if a pending entry of the
    /// same kind already exists for the task.
    pub async fn create(
        &self,
        new_entry: NewReminderEntry,
        now: UniversalTimestamp,
    ) -> Result<ReminderEntry, StorageError> {
        crate::dispatch_backend!(
            self.dal.backend(),
            self.create_postgres(new_entry, now).await,
            self.create_sqlite(new_entry, now).await
        )
    }

    #[cfg(feature = "postgres")]
    async fn create_postgres(
        &self,
        new_entry: NewReminderEntry,
        now: UniversalTimestamp,
    ) -> Result<ReminderEntry, StorageError> {
        let conn = self.dal.database.get_postgres_connection().await?;

        let id = UniversalUuid::new_v4();
        let row = NewReminderQueueRow::pending(id, &new_entry, now);

        conn.interact(move |conn| {
            diesel::insert_into(reminder_queue::table)
                .values(&row)
                .execute(conn)
        })
        .await
        .map_err(|e| StorageError::ConnectionPool(e.to_string()))?
        .map_err(|e| map_insert_error(e, &new_entry.task_id, new_entry.kind))?;

        Ok(inserted_entry(id, new_entry, now))
    }

    #[cfg(feature = "sqlite")]
    async fn create_sqlite(
        &self,
        new_entry: NewReminderEntry,
        now: UniversalTimestamp,
    ) -> Result<ReminderEntry, StorageError> {
        let conn = self.dal.database.get_sqlite_connection().await?;

        let id = UniversalUuid::new_v4();
        let row = NewReminderQueueRow::pending(id, &new_entry, now);

        conn.interact(move |conn| {
            diesel::insert_into(reminder_queue::table)
                .values(&row)
                .execute(conn)
        })
        .await
        .map_err(|e| StorageError::ConnectionPool(e.to_string()))?
        .map_err(|e| map_insert_error(e, &new_entry.task_id, new_entry.kind))?;

        Ok(inserted_entry(id, new_entry, now))
    }

    /// Retrieves a single entry by ID.
    pub async fn get_by_id(
        &self,
        id: UniversalUuid,
    ) -> Result<Option<ReminderEntry>, StorageError> {
        crate::dispatch_backend!(
            self.dal.backend(),
            self.get_by_id_postgres(id).await,
            self.get_by_id_sqlite(id).await
        )
    }

    #[cfg(feature = "postgres")]
    async fn get_by_id_postgres(
        &self,
        id: UniversalUuid,
    ) -> Result<Option<ReminderEntry>, StorageError> {
        let conn = self.dal.database.get_postgres_connection().await?;

        let id = id.to_string();
        let row: Option<ReminderQueueRow> = conn
            .interact(move |conn| {
                reminder_queue::table
                    .find(id)
                    .select(ReminderQueueRow::as_select())
                    .first(conn)
                    .optional()
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        row.map(ReminderEntry::try_from).transpose()
    }

    #[cfg(feature = "sqlite")]
    async fn get_by_id_sqlite(
        &self,
        id: UniversalUuid,
    ) -> Result<Option<ReminderEntry>, StorageError> {
        let conn = self.dal.database.get_sqlite_connection().await?;

        let id = id.to_string();
        let row: Option<ReminderQueueRow> = conn
            .interact(move |conn| {
                reminder_queue::table
                    .find(id)
                    .select(ReminderQueueRow::as_select())
                    .first(conn)
                    .optional()
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        row.map(ReminderEntry::try_from).transpose()
    }

    /// Lists every entry for a task, in any status, oldest first.
    pub async fn list_by_task(&self, task_id: &str) -> Result<Vec<ReminderEntry>, StorageError> {
        crate::dispatch_backend!(
            self.dal.backend(),
            self.list_by_task_postgres(task_id).await,
            self.list_by_task_sqlite(task_id).await
        )
    }

    #[cfg(feature = "postgres")]
    async fn list_by_task_postgres(
        &self,
        task_id: &str,
    ) -> Result<Vec<ReminderEntry>, StorageError> {
        let conn = self.dal.database.get_postgres_connection().await?;

        let task_id = task_id.to_string();
        let rows: Vec<ReminderQueueRow> = conn
            .interact(move |conn| {
                reminder_queue::table
                    .filter(reminder_queue::task_id.eq(task_id))
                    .order((reminder_queue::created_at.asc(), reminder_queue::id.asc()))
                    .select(ReminderQueueRow::as_select())
                    .load(conn)
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        into_entries(rows)
    }

    #[cfg(feature = "sqlite")]
    async fn list_by_task_sqlite(&self, task_id: &str) -> Result<Vec<ReminderEntry>, StorageError> {
        let conn = self.dal.database.get_sqlite_connection().await?;

        let task_id = task_id.to_string();
        let rows: Vec<ReminderQueueRow> = conn
            .interact(move |conn| {
                reminder_queue::table
                    .filter(reminder_queue::task_id.eq(task_id))
                    .order((reminder_queue::created_at.asc(), reminder_queue::id.asc()))
                    .select(ReminderQueueRow::as_select())
                    .load(conn)
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        into_entries(rows)
    }

    /// Counts entries in the given status.
    pub async fn count_by_status(&self, status: ReminderStatus) -> Result<i64, StorageError> {
        crate::dispatch_backend!(
            self.dal.backend(),
            self.count_by_status_postgres(status).await,
            self.count_by_status_sqlite(status).await
        )
    }

    #[cfg(feature = "postgres")]
    async fn count_by_status_postgres(&self, status: ReminderStatus) -> Result<i64, StorageError> {
        let conn = self.dal.database.get_postgres_connection().await?;

        let status = status.as_str();
        let count: i64 = conn
            .interact(move |conn| {
                reminder_queue::table
                    .filter(reminder_queue::status.eq(status))
                    .count()
                    .get_result(conn)
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        Ok(count)
    }

    #[cfg(feature = "sqlite")]
    async fn count_by_status_sqlite(&self, status: ReminderStatus) -> Result<i64, StorageError> {
        let conn = self.dal.database.get_sqlite_connection().await?;

        let status = status.as_str();
        let count: i64 = conn
            .interact(move |conn| {
                reminder_queue::table
                    .filter(reminder_queue::status.eq(status))
                    .count()
                    .get_result(conn)
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        Ok(count)
    }

    /// Removes every pending entry for a task and optionally inserts a
    /// replacement, in one transaction.
    ///
    /// Other tasks' entries and non-pending entries of this task are never
    /// touched. Either both steps happen or neither does.
    pub async fn replace_pending_for_task(
        &self,
        task_id: &str,
        disposition: PendingDisposition,
        replacement: Option<NewReminderEntry>,
        now: UniversalTimestamp,
    ) -> Result<PendingReplacement, StorageError> {
        crate::dispatch_backend!(
            self.dal.backend(),
            self.replace_pending_for_task_postgres(task_id, disposition, replacement, now)
                .await,
            self.replace_pending_for_task_sqlite(task_id, disposition, replacement, now)
                .await
        )
    }

    #[cfg(feature = "postgres")]
    async fn replace_pending_for_task_postgres(
        &self,
        task_id: &str,
        disposition: PendingDisposition,
        replacement: Option<NewReminderEntry>,
        now: UniversalTimestamp,
    ) -> Result<PendingReplacement, StorageError> {
        use diesel::connection::Connection;

        let conn = self.dal.database.get_postgres_connection().await?;

        let id = UniversalUuid::new_v4();
        let row = replacement
            .as_ref()
            .map(|new_entry| NewReminderQueueRow::pending(id, new_entry, now));
        let owned_task_id = task_id.to_string();
        let now_naive = now.to_naive();

        let removed = conn
            .interact(move |conn| {
                conn.transaction::<_, diesel::result::Error, _>(|conn| {
                    let pending = reminder_queue::table
                        .filter(reminder_queue::task_id.eq(owned_task_id.as_str()))
                        .filter(reminder_queue::status.eq(ReminderStatus::Pending.as_str()));

                    let removed = match disposition {
                        PendingDisposition::Delete => diesel::delete(pending).execute(conn)?,
                        PendingDisposition::Cancel => diesel::update(pending)
                            .set((
                                reminder_queue::status.eq(ReminderStatus::Cancelled.as_str()),
                                reminder_queue::updated_at.eq(now_naive),
                            ))
                            .execute(conn)?,
                    };

                    if let Some(row) = &row {
                        diesel::insert_into(reminder_queue::table)
                            .values(row)
                            .execute(conn)?;
                    }

                    Ok(removed)
                })
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))?
            .map_err(|e| match &replacement {
                Some(new_entry) => map_insert_error(e, &new_entry.task_id, new_entry.kind),
                None => StorageError::Database(e),
            })?;

        Ok(PendingReplacement {
            removed,
            created: replacement.map(|new_entry| inserted_entry(id, new_entry, now)),
        })
    }

    #[cfg(feature = "sqlite")]
    async fn replace_pending_for_task_sqlite(
        &self,
        task_id: &str,
        disposition: PendingDisposition,
        replacement: Option<NewReminderEntry>,
        now: UniversalTimestamp,
    ) -> Result<PendingReplacement, StorageError> {
        use diesel::connection::Connection;

        let conn = self.dal.database.get_sqlite_connection().await?;

        let id = UniversalUuid::new_v4();
        let row = replacement
            .as_ref()
            .map(|new_entry| NewReminderQueueRow::pending(id, new_entry, now));
        let owned_task_id = task_id.to_string();
        let now_naive = now.to_naive();

        let removed = conn
            .interact(move |conn| {
                conn.transaction::<_, diesel::result::Error, _>(|conn| {
                    let pending = reminder_queue::table
                        .filter(reminder_queue::task_id.eq(owned_task_id.as_str()))
                        .filter(reminder_queue::status.eq(ReminderStatus::Pending.as_str()));

                    let removed = match disposition {
                        PendingDisposition::Delete => diesel::delete(pending).execute(conn)?,
                        PendingDisposition::Cancel => diesel::update(pending)
                            .set((
                                reminder_queue::status.eq(ReminderStatus::Cancelled.as_str()),
                                reminder_queue::updated_at.eq(now_naive),
                            ))
                            .execute(conn)?,
                    };

                    if let Some(row) = &row {
                        diesel::insert_into(reminder_queue::table)
                            .values(row)
                            .execute(conn)?;
                    }

                    Ok(removed)
                })
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))?
            .map_err(|e| match &replacement {
                Some(new_entry) => map_insert_error(e, &new_entry.task_id, new_entry.kind),
                None => StorageError::Database(e),
            })?;

        Ok(PendingReplacement {
            removed,
            created: replacement.map(|new_entry| inserted_entry(id, new_entry, now)),
        })
    }

    /// Moves every pending entry of a task to `cancelled`.
    ///
    /// Returns the number of entries cancelled.
    pub async fn cancel_pending_for_task(
        &self,
        task_id: &str,
        now: UniversalTimestamp,
    ) -> Result<usize, StorageError> {
        let replacement = self
            .replace_pending_for_task(task_id, PendingDisposition::Cancel, None, now)
            .await?;
        Ok(replacement.removed)
    }

    /// Returns up to `limit` pending entries with `scheduled_for <= now`,
    /// earliest first.
    ///
    /// Rows that fail to convert are logged and counted in
    /// [`DueBatch::invalid`] instead of failing the read. They still take a
    /// slot within `limit`.
    pub async fn find_due(
        &self,
        now: UniversalTimestamp,
        limit: i64,
    ) -> Result<DueBatch, StorageError> {
        crate::dispatch_backend!(
            self.dal.backend(),
            self.find_due_postgres(now, limit).await,
            self.find_due_sqlite(now, limit).await
        )
    }

    #[cfg(feature = "postgres")]
    async fn find_due_postgres(
        &self,
        now: UniversalTimestamp,
        limit: i64,
    ) -> Result<DueBatch, StorageError> {
        let conn = self.dal.database.get_postgres_connection().await?;

        let now = now.to_naive();
        let rows: Vec<ReminderQueueRow> = conn
            .interact(move |conn| {
                reminder_queue::table
                    .filter(reminder_queue::status.eq(ReminderStatus::Pending.as_str()))
                    .filter(reminder_queue::scheduled_for.le(now))
                    .order((
                        reminder_queue::scheduled_for.asc(),
                        reminder_queue::created_at.asc(),
                    ))
                    .limit(limit)
                    .select(ReminderQueueRow::as_select())
                    .load(conn)
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        Ok(into_due_batch(rows))
    }

    #[cfg(feature = "sqlite")]
    async fn find_due_sqlite(
        &self,
        now: UniversalTimestamp,
        limit: i64,
    ) -> Result<DueBatch, StorageError> {
        let conn = self.dal.database.get_sqlite_connection().await?;

        let now = now.to_naive();
        let rows: Vec<ReminderQueueRow> = conn
            .interact(move |conn| {
                reminder_queue::table
                    .filter(reminder_queue::status.eq(ReminderStatus::Pending.as_str()))
                    .filter(reminder_queue::scheduled_for.le(now))
                    .order((
                        reminder_queue::scheduled_for.asc(),
                        reminder_queue::created_at.asc(),
                    ))
                    .limit(limit)
                    .select(ReminderQueueRow::as_select())
                    .load(conn)
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        Ok(into_due_batch(rows))
    }

    /// Marks an observed pending entry as delivered, counting the attempt.
    ///
    /// Returns `false` if the entry changed since it was read.
    pub async fn mark_sent(
        &self,
        entry: &ReminderEntry,
        now: UniversalTimestamp,
    ) -> Result<bool, StorageError> {
        let transition = Transition::from_observed(
            entry,
            ReminderStatus::Sent,
            entry.attempts.saturating_add(1),
            entry.error_message.clone(),
            now,
        );
        self.apply_transition(transition, now).await
    }

    /// Cancels an observed pending entry without counting an attempt.
    ///
    /// Returns `false` if the entry changed since it was read.
    pub async fn mark_cancelled(
        &self,
        entry: &ReminderEntry,
        reason: &str,
        now: UniversalTimestamp,
    ) -> Result<bool, StorageError> {
        let transition = Transition::from_observed(
            entry,
            ReminderStatus::Cancelled,
            entry.attempts,
            Some(reason.to_string()),
            now,
        );
        self.apply_transition(transition, now).await
    }

    /// Fails an observed pending entry for good, counting the attempt.
    ///
    /// Returns `false` if the entry changed since it was read.
    pub async fn mark_failed(
        &self,
        entry: &ReminderEntry,
        reason: &str,
        now: UniversalTimestamp,
    ) -> Result<bool, StorageError> {
        let transition = Transition::from_observed(
            entry,
            ReminderStatus::Failed,
            entry.attempts.saturating_add(1),
            Some(reason.to_string()),
            now,
        );
        self.apply_transition(transition, now).await
    }

    /// Counts a failed attempt and leaves the entry pending for the next pass.
    ///
    /// Returns `false` if the entry changed since it was read.
    pub async fn record_failed_attempt(
        &self,
        entry: &ReminderEntry,
        reason: &str,
        now: UniversalTimestamp,
    ) -> Result<bool, StorageError> {
        let transition = Transition::from_observed(
            entry,
            ReminderStatus::Pending,
            entry.attempts.saturating_add(1),
            Some(reason.to_string()),
            now,
        );
        self.apply_transition(transition, now).await
    }

    async fn apply_transition(
        &self,
        transition: Transition,
        now: UniversalTimestamp,
    ) -> Result<bool, StorageError> {
        crate::dispatch_backend!(
            self.dal.backend(),
            self.apply_transition_postgres(transition, now).await,
            self.apply_transition_sqlite(transition, now).await
        )
    }

    #[cfg(feature = "postgres")]
    async fn apply_transition_postgres(
        &self,
        transition: Transition,
        now: UniversalTimestamp,
    ) -> Result<bool, StorageError> {
        let conn = self.dal.database.get_postgres_connection().await?;

        let now = now.to_naive();
        let updated = conn
            .interact(move |conn| {
                diesel::update(
                    reminder_queue::table
                        .filter(reminder_queue::id.eq(transition.id))
                        .filter(reminder_queue::status.eq(ReminderStatus::Pending.as_str()))
                        .filter(reminder_queue::attempts.eq(transition.expected_attempts)),
                )
                .set((
                    reminder_queue::status.eq(transition.status),
                    reminder_queue::attempts.eq(transition.attempts),
                    reminder_queue::last_attempt_at.eq(Some(transition.last_attempt_at)),
                    reminder_queue::error_message.eq(transition.error_message),
                    reminder_queue::updated_at.eq(now),
                ))
                .execute(conn)
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        Ok(updated == 1)
    }

    #[cfg(feature = "sqlite")]
    async fn apply_transition_sqlite(
        &self,
        transition: Transition,
        now: UniversalTimestamp,
    ) -> Result<bool, StorageError> {
        let conn = self.dal.database.get_sqlite_connection().await?;

        let now = now.to_naive();
        let updated = conn
            .interact(move |conn| {
                diesel::update(
                    reminder_queue::table
                        .filter(reminder_queue::id.eq(transition.id))
                        .filter(reminder_queue::status.eq(ReminderStatus::Pending.as_str()))
                        .filter(reminder_queue::attempts.eq(transition.expected_attempts)),
                )
                .set((
                    reminder_queue::status.eq(transition.status),
                    reminder_queue::attempts.eq(transition.attempts),
                    reminder_queue::last_attempt_at.eq(Some(transition.last_attempt_at)),
                    reminder_queue::error_message.eq(transition.error_message),
                    reminder_queue::updated_at.eq(now),
                ))
                .execute(conn)
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        Ok(updated == 1)
    }

    /// Deletes terminal entries whose last activity is before `cutoff`.
    ///
    /// Last activity is `last_attempt_at`, or `updated_at` for entries the
    /// processor never touched (cancelled by the scheduler). Pending entries
    /// are never deleted regardless of age.
    pub async fn delete_terminal_older_than(
        &self,
        cutoff: UniversalTimestamp,
    ) -> Result<usize, StorageError> {
        crate::dispatch_backend!(
            self.dal.backend(),
            self.delete_terminal_older_than_postgres(cutoff).await,
            self.delete_terminal_older_than_sqlite(cutoff).await
        )
    }

    #[cfg(feature = "postgres")]
    async fn delete_terminal_older_than_postgres(
        &self,
        cutoff: UniversalTimestamp,
    ) -> Result<usize, StorageError> {
        let conn = self.dal.database.get_postgres_connection().await?;

        let cutoff = cutoff.to_naive();
        let terminal = terminal_statuses();
        let deleted = conn
            .interact(move |conn| {
                let stale = reminder_queue::last_attempt_at.lt(cutoff).or(
                    reminder_queue::last_attempt_at
                        .is_null()
                        .and(reminder_queue::updated_at.lt(cutoff)),
                );
                diesel::delete(
                    reminder_queue::table
                        .filter(reminder_queue::status.eq_any(terminal))
                        .filter(stale),
                )
                .execute(conn)
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        Ok(deleted)
    }

    #[cfg(feature = "sqlite")]
    async fn delete_terminal_older_than_sqlite(
        &self,
        cutoff: UniversalTimestamp,
    ) -> Result<usize, StorageError> {
        let conn = self.dal.database.get_sqlite_connection().await?;

        let cutoff = cutoff.to_naive();
        let terminal = terminal_statuses();
        let deleted = conn
            .interact(move |conn| {
                let stale = reminder_queue::last_attempt_at.lt(cutoff).or(
                    reminder_queue::last_attempt_at
                        .is_null()
                        .and(reminder_queue::updated_at.lt(cutoff)),
                );
                diesel::delete(
                    reminder_queue::table
                        .filter(reminder_queue::status.eq_any(terminal))
                        .filter(stale),
                )
                .execute(conn)
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        Ok(deleted)
    }
}
