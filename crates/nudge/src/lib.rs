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

//! # Nudge
//!
//! Durable due-date reminders for task management applications.
//!
//! - [`calculator`] works out when a reminder should fire.
//! - [`scheduler::ReminderScheduler`] keeps the reminder queue in step with
//!   task mutations.
//! - [`processor::ReminderProcessor`] delivers due reminders through a
//!   host-supplied [`providers::Notifier`], with bounded retries and
//!   retention cleanup.
//! - [`trigger::PeriodicTrigger`] optionally runs the processor on a timer.
//!
//! The queue lives in PostgreSQL or SQLite, chosen from the connection URL.
//!
//! ```rust,ignore
//! use nudge::{Database, ProcessorConfig, ReminderProcessor, ReminderScheduler, DAL};
//!
//! let database = Database::try_new("postgres://localhost/tasks", "", 10)?;
//! database.run_migrations().await?;
//! let dal = DAL::new(database);
//!
//! let config = ProcessorConfig::from_env()?;
//! let scheduler = ReminderScheduler::with_config(dal.clone(), &config);
//! scheduler.schedule_reminder(&task, &user_id, Utc::now()).await?;
//!
//! let processor = ReminderProcessor::new(dal, tasks, users, notifier, config);
//! let summary = processor.process_due_now().await?;
//! ```

pub mod calculator;
pub mod config;
pub mod dal;
pub mod database;
pub mod error;
pub mod models;
pub mod processor;
pub mod providers;
pub mod scheduler;
pub mod trigger;

pub use calculator::{compute_reminder_time, compute_reminder_time_in, LeadTime};
pub use config::{ProcessorConfig, ProcessorConfigBuilder};
pub use dal::DAL;
pub use database::{BackendType, Database, UniversalTimestamp, UniversalUuid};
pub use error::{ConfigError, DeliveryError, ProcessorError, StorageError};
pub use models::{
    NewReminderEntry, ReminderEntry, ReminderKind, ReminderSettings, ReminderStatus, Task,
    TaskStatus, User,
};
pub use processor::{EntryOutcome, PassSummary, ReminderProcessor};
pub use providers::{Notifier, ReminderMessage, TaskProvider, UserProvider};
pub use scheduler::{ReminderScheduler, RescheduleOutcome, ScheduleOutcome, SkipReason, TaskChange};
pub use trigger::PeriodicTrigger;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Installs a `tracing` subscriber writing to stdout.
///
/// `RUST_LOG` takes precedence; otherwise `level` is used, defaulting to
/// `info`. Calling this again after a subscriber is installed does nothing.
pub fn init_logging(level: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.unwrap_or("info")));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .try_init();
}
