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

//! Data Access Layer with runtime backend selection
//!
//! Each DAL operation dispatches to a PostgreSQL or SQLite implementation
//! based on the backend detected when the [`Database`] was created.
//!
//! # Example
//!
//! ```rust,ignore
//! use nudge::dal::DAL;
//! use nudge::database::Database;
//!
//! let db = Database::try_new("postgres://localhost/tasks", "", 10)?;
//! let dal = DAL::new(db);
//!
//! let due = dal.reminder_queue().find_due(now, 100).await?.entries;
//! ```

use crate::database::{BackendType, Database};

pub mod models;
pub mod reminder_queue;

pub use reminder_queue::{DueBatch, PendingDisposition, PendingReplacement, ReminderQueueDAL};

/// Dispatches an operation to the implementation for the active backend.
///
/// A backend whose feature is compiled out evaluates to
/// `Err(StorageError::BackendUnavailable)`.
///
/// ```rust,ignore
/// crate::dispatch_backend!(
///     self.dal.backend(),
///     self.find_due_postgres(now, limit).await,
///     self.find_due_sqlite(now, limit).await
/// )
/// ```
#[macro_export]
macro_rules! dispatch_backend {
    ($backend:expr, $pg:expr, $sqlite:expr) => {
        match $backend {
            #[cfg(feature = "postgres")]
            $crate::database::BackendType::Postgres => $pg,
            #[cfg(feature = "sqlite")]
            $crate::database::BackendType::Sqlite => $sqlite,
            #[allow(unreachable_patterns)]
            _ => Err($crate::error::StorageError::BackendUnavailable),
        }
    };
}

/// The Data Access Layer.
///
/// `DAL` is `Clone`; every clone shares the same connection pool.
#[derive(Clone, Debug)]
pub struct DAL {
    /// The database instance with connection pool
    pub database: Database,
}

impl DAL {
    /// Creates a new DAL over `database`.
    pub fn new(database: Database) -> Self {
        DAL { database }
    }

    /// Returns the backend type for this DAL instance.
    pub fn backend(&self) -> BackendType {
        self.database.backend()
    }

    /// Returns the reminder queue DAL.
    pub fn reminder_queue(&self) -> ReminderQueueDAL<'_> {
        ReminderQueueDAL::new(self)
    }
}
