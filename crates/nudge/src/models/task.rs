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

//! Task and User views consumed by the reminder subsystem.
//!
//! These records are owned by the host application. The reminder core only
//! reads them, at scheduling time and again at delivery time.

use crate::calculator::LeadTime;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl TaskStatus {
    /// Returns true if the task no longer needs reminding.
    pub fn is_closed(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Cancelled)
    }
}

/// Per-task reminder configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderSettings {
    pub enabled: bool,
    pub lead_time: LeadTime,
}

/// The fields of a task the reminder core depends on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    pub due_at: Option<DateTime<Utc>>,
    pub status: TaskStatus,
    pub reminder: Option<ReminderSettings>,
    /// Set when the task has been soft-deleted.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Returns true if the task has been soft-deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Returns true if a reminder for this task should still be delivered.
    pub fn accepts_reminders(&self) -> bool {
        !self.is_deleted() && !self.status.is_closed()
    }

    /// Returns the reminder settings if reminders are switched on.
    pub fn enabled_reminder(&self) -> Option<ReminderSettings> {
        self.reminder.filter(|settings| settings.enabled)
    }
}

/// The recipient of a reminder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
}
