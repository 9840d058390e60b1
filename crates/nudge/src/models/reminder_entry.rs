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

//! Reminder Queue Entry Model
//!
//! A queue entry is one scheduled-or-processed reminder bound to exactly one
//! task and one user. Its status only ever moves forward:
//!
//! ```text
//! Pending ──► Sent
//!    │
//!    ├──────► Cancelled
//!    │
//!    ├──────► Failed
//!    │
//!    └──────► Pending (attempts + 1, retried next pass)
//! ```
//!
//! These are API-level types; backend-specific rows handle storage.

use crate::database::universal_types::{UniversalTimestamp, UniversalUuid};
use serde::{Deserialize, Serialize};

/// What triggered a reminder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReminderKind {
    /// Fires a lead time before the task is due.
    DueDate,
    /// Reserved for reminders about tasks past their due date. The scheduler
    /// does not currently enqueue this kind.
    Overdue,
}

impl ReminderKind {
    /// Returns the string representation stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderKind::DueDate => "due_date",
            ReminderKind::Overdue => "overdue",
        }
    }

    /// Parses a kind from its stored representation.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "due_date" => Some(ReminderKind::DueDate),
            "overdue" => Some(ReminderKind::Overdue),
            _ => None,
        }
    }
}

impl std::fmt::Display for ReminderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Processing state of a queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReminderStatus {
    /// Waiting for its scheduled time, or for a retry.
    Pending,
    /// Delivered.
    Sent,
    /// Gave up: the user is gone or every attempt failed.
    Failed,
    /// Withdrawn because the task was completed, cancelled or deleted.
    Cancelled,
}

impl ReminderStatus {
    /// Returns the string representation stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderStatus::Pending => "pending",
            ReminderStatus::Sent => "sent",
            ReminderStatus::Failed => "failed",
            ReminderStatus::Cancelled => "cancelled",
        }
    }

    /// Parses a status from its stored representation.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ReminderStatus::Pending),
            "sent" => Some(ReminderStatus::Sent),
            "failed" => Some(ReminderStatus::Failed),
            "cancelled" => Some(ReminderStatus::Cancelled),
            _ => None,
        }
    }

    /// Returns true for states an entry never leaves.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReminderStatus::Pending)
    }

    /// The statuses eligible for retention cleanup.
    pub const TERMINAL: [ReminderStatus; 3] = [
        ReminderStatus::Sent,
        ReminderStatus::Failed,
        ReminderStatus::Cancelled,
    ];
}

impl std::fmt::Display for ReminderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A reminder queue entry (domain type).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReminderEntry {
    /// Unique identifier, assigned at creation
    pub id: UniversalUuid,
    /// The task this reminder is about
    pub task_id: String,
    /// The user to notify
    pub user_id: String,
    pub kind: ReminderKind,
    /// When the entry becomes eligible for processing
    pub scheduled_for: UniversalTimestamp,
    pub status: ReminderStatus,
    /// Delivery attempts made so far
    pub attempts: u32,
    /// When the processor last touched this entry
    pub last_attempt_at: Option<UniversalTimestamp>,
    /// Last failure reason, for operators
    pub error_message: Option<String>,
    pub created_at: UniversalTimestamp,
    pub updated_at: UniversalTimestamp,
}

/// Structure for creating new queue entries (domain type).
///
/// New entries always start `Pending` with zero attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewReminderEntry {
    pub task_id: String,
    pub user_id: String,
    pub kind: ReminderKind,
    pub scheduled_for: UniversalTimestamp,
}
