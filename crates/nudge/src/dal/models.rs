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

//! Storage rows for the reminder queue.
//!
//! Rows use portable column types (TEXT ids, naive UTC timestamps, INTEGER
//! attempts) and are converted to/from domain types at the DAL boundary.

use crate::database::schema::reminder_queue;
use crate::database::universal_types::{UniversalTimestamp, UniversalUuid};
use crate::error::StorageError;
use crate::models::reminder_entry::{
    NewReminderEntry, ReminderEntry, ReminderKind, ReminderStatus,
};
use chrono::NaiveDateTime;
use diesel::prelude::*;

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = reminder_queue)]
pub struct ReminderQueueRow {
    pub id: String,
    pub task_id: String,
    pub user_id: String,
    pub kind: String,
    pub scheduled_for: NaiveDateTime,
    pub status: String,
    pub attempts: i32,
    pub last_attempt_at: Option<NaiveDateTime>,
    pub error_message: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = reminder_queue)]
pub struct NewReminderQueueRow {
    pub id: String,
    pub task_id: String,
    pub user_id: String,
    pub kind: String,
    pub scheduled_for: NaiveDateTime,
    pub status: String,
    pub attempts: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl NewReminderQueueRow {
    /// Builds a fresh `pending` row with zero attempts.
    pub fn pending(id: UniversalUuid, new_entry: &NewReminderEntry, now: UniversalTimestamp) -> Self {
        Self {
            id: id.to_string(),
            task_id: new_entry.task_id.clone(),
            user_id: new_entry.user_id.clone(),
            kind: new_entry.kind.as_str().to_string(),
            scheduled_for: new_entry.scheduled_for.to_naive(),
            status: ReminderStatus::Pending.as_str().to_string(),
            attempts: 0,
            created_at: now.to_naive(),
            updated_at: now.to_naive(),
        }
    }
}

/// The domain value of a row that was just inserted by `NewReminderQueueRow::pending`.
pub(crate) fn inserted_entry(
    id: UniversalUuid,
    new_entry: NewReminderEntry,
    now: UniversalTimestamp,
) -> ReminderEntry {
    ReminderEntry {
        id,
        task_id: new_entry.task_id,
        user_id: new_entry.user_id,
        kind: new_entry.kind,
        scheduled_for: new_entry.scheduled_for,
        status: ReminderStatus::Pending,
        attempts: 0,
        last_attempt_at: None,
        error_message: None,
        created_at: now,
        updated_at: now,
    }
}

impl TryFrom<ReminderQueueRow> for ReminderEntry {
    type Error = StorageError;

    fn try_from(row: ReminderQueueRow) -> Result<Self, Self::Error> {
        let invalid = |reason: String| StorageError::InvalidRecord {
            id: row.id.clone(),
            reason,
        };

        let id = UniversalUuid::parse_str(&row.id).map_err(|e| invalid(e.to_string()))?;
        let kind = ReminderKind::from_str(&row.kind)
            .ok_or_else(|| invalid(format!("unknown kind '{}'", row.kind)))?;
        let status = ReminderStatus::from_str(&row.status)
            .ok_or_else(|| invalid(format!("unknown status '{}'", row.status)))?;
        let attempts = u32::try_from(row.attempts)
            .map_err(|_| invalid(format!("negative attempts {}", row.attempts)))?;

        Ok(ReminderEntry {
            id,
            task_id: row.task_id,
            user_id: row.user_id,
            kind,
            scheduled_for: UniversalTimestamp::from_naive(row.scheduled_for),
            status,
            attempts,
            last_attempt_at: row.last_attempt_at.map(UniversalTimestamp::from_naive),
            error_message: row.error_message,
            created_at: UniversalTimestamp::from_naive(row.created_at),
            updated_at: UniversalTimestamp::from_naive(row.updated_at),
        })
    }
}
