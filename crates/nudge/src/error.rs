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

//! Error types for the reminder subsystem.
//!
//! Expected conditions (no due date, reminders disabled, lead time already
//! passed) are not errors; they are reported through
//! [`ScheduleOutcome`](crate::scheduler::ScheduleOutcome). The types here are
//! reserved for storage failures, delivery failures and pass-level failures.

use std::time::Duration;
use thiserror::Error;

/// Errors raised by the reminder queue store and the connection layer.
///
/// Callers of the Queue Maintenance API must treat these as non-fatal to
/// the task mutation that triggered them: log and continue.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A connection could not be obtained from the pool, or the blocking
    /// interaction with it was aborted.
    #[error("Connection pool error: {0}")]
    ConnectionPool(String),

    /// The database rejected or failed a query.
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    /// Embedded migrations could not be applied.
    #[error("Migration error: {0}")]
    Migration(String),

    /// A stored row could not be mapped back to a domain value.
    #[error("Invalid record {id}: {reason}")]
    InvalidRecord { id: String, reason: String },

    /// The connection URL does not name a supported backend.
    #[error(
        "Unable to detect database backend from URL '{0}'. \
         Expected postgres://, postgresql://, sqlite://, or a file path."
    )]
    UnsupportedBackend(String),

    /// The backend was detected but support for it was compiled out.
    #[error("Database backend support is not enabled in this build")]
    BackendUnavailable,

    /// A pending reminder of the same kind already exists for the task.
    #[error("A pending {kind} reminder already exists for task {task_id}")]
    AlreadyScheduled { task_id: String, kind: String },
}

/// Errors a [`Notifier`](crate::providers::Notifier) reports for one delivery
/// attempt. Every variant follows the retry path.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The transport rejected or failed the delivery.
    #[error("Delivery failed: {0}")]
    Failed(String),

    /// The notifier did not answer within the configured timeout.
    #[error("Delivery timed out after {0:?}")]
    TimedOut(Duration),
}

/// Pass-level failures of the batch processor.
///
/// Per-entry failures never surface here; only failures that prevent the
/// pass from starting do.
#[derive(Debug, Error)]
pub enum ProcessorError {
    /// The initial batch could not be read.
    #[error("Failed to fetch due reminders: {0}")]
    Storage(#[from] StorageError),

    /// Another pass is still running in this process.
    #[error("A reminder pass is already in progress")]
    PassInProgress,
}

/// Errors raised while loading processor configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: '{value}' ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}
