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

//! Collaborator contracts supplied by the host application.
//!
//! The reminder core reads tasks and users through [`TaskProvider`] and
//! [`UserProvider`] and hands deliveries to a [`Notifier`]. None of them are
//! implemented here; the host wires in its own store and transport.
//!
//! [`ReminderMessage`] is a convenience for notifiers that want the standard
//! subject and body text.

use async_trait::async_trait;
use chrono_tz::Tz;

use crate::error::{DeliveryError, StorageError};
use crate::models::reminder_entry::ReminderKind;
use crate::models::task::{Task, User};

/// Read-only access to tasks.
#[async_trait]
pub trait TaskProvider: Send + Sync {
    /// Returns the task, including soft-deleted ones, or `None` if it no
    /// longer exists at all.
    async fn get_task(&self, task_id: &str) -> Result<Option<Task>, StorageError>;
}

/// Read-only access to users.
#[async_trait]
pub trait UserProvider: Send + Sync {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>, StorageError>;
}

/// Delivers a reminder over some transport.
///
/// A returned error is treated as a failed attempt and retried on a later
/// pass until the attempt ceiling is reached.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, task: &Task, user: &User, kind: ReminderKind)
        -> Result<(), DeliveryError>;
}

/// Rendered reminder text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl ReminderMessage {
    /// Builds the message for `task`, formatting the due time in `tz`.
    pub fn compose(task: &Task, user: &User, kind: ReminderKind, tz: Tz) -> Self {
        let when = match task.due_at {
            Some(due_at) => due_at
                .with_timezone(&tz)
                .format("%a %b %-d, %Y at %H:%M %Z")
                .to_string(),
            None => "at an unspecified time".to_string(),
        };

        let (subject, line) = match kind {
            ReminderKind::DueDate => (
                format!("Reminder: {} is due {}", task.title, when),
                format!("Your task \"{}\" is due {}.", task.title, when),
            ),
            ReminderKind::Overdue => (
                format!("Overdue: {} was due {}", task.title, when),
                format!("Your task \"{}\" was due {} and is not done yet.", task.title, when),
            ),
        };

        Self {
            to: user.email.clone(),
            subject,
            body: format!("Hi,\n\n{}\n", line),
        }
    }
}
