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

//! Due-time calculation for task reminders.
//!
//! Given a due instant and a symbolic lead time, computes when the reminder
//! should fire. Minute and hour lead times subtract an exact duration; day
//! and week lead times subtract calendar days in a time zone so that
//! "1 day before 09:00" stays at 09:00 across a DST change.
//!
//! A computed instant at or before `now` yields `None`: the window has
//! already passed and nothing should be scheduled.

use chrono::{DateTime, Days, Duration, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How long before a task's due instant its reminder fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LeadTime {
    #[serde(rename = "30min")]
    ThirtyMinutes,
    #[serde(rename = "1hour")]
    OneHour,
    #[serde(rename = "1day")]
    OneDay,
    #[serde(rename = "1week")]
    OneWeek,
}

impl LeadTime {
    /// Returns the string representation of the lead time.
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadTime::ThirtyMinutes => "30min",
            LeadTime::OneHour => "1hour",
            LeadTime::OneDay => "1day",
            LeadTime::OneWeek => "1week",
        }
    }

    /// Subtracts this lead time from `due_at`.
    ///
    /// Day and week offsets are applied to the local calendar date in `tz`.
    /// When the shifted local time does not exist or is ambiguous there,
    /// the exact 24h/168h offset is used instead. Returns `None` only on
    /// arithmetic overflow.
    pub fn subtract_from(&self, due_at: DateTime<Utc>, tz: Tz) -> Option<DateTime<Utc>> {
        match self {
            LeadTime::ThirtyMinutes => due_at.checked_sub_signed(Duration::minutes(30)),
            LeadTime::OneHour => due_at.checked_sub_signed(Duration::hours(1)),
            LeadTime::OneDay => subtract_calendar_days(due_at, 1, tz),
            LeadTime::OneWeek => subtract_calendar_days(due_at, 7, tz),
        }
    }
}

fn subtract_calendar_days(due_at: DateTime<Utc>, days: u64, tz: Tz) -> Option<DateTime<Utc>> {
    match due_at.with_timezone(&tz).checked_sub_days(Days::new(days)) {
        Some(local) => Some(local.with_timezone(&Utc)),
        None => {
            let hours = i64::try_from(days).ok()?.checked_mul(24)?;
            due_at.checked_sub_signed(Duration::hours(hours))
        }
    }
}

impl fmt::Display for LeadTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for LeadTime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "30min" => Ok(LeadTime::ThirtyMinutes),
            "1hour" => Ok(LeadTime::OneHour),
            "1day" => Ok(LeadTime::OneDay),
            "1week" => Ok(LeadTime::OneWeek),
            other => Err(format!(
                "unknown lead time '{}' (expected 30min, 1hour, 1day or 1week)",
                other
            )),
        }
    }
}

/// Computes when a reminder should fire, evaluating calendar offsets in UTC.
///
/// Returns `None` when the result is at or before `now`.
pub fn compute_reminder_time(
    due_at: DateTime<Utc>,
    lead_time: LeadTime,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    compute_reminder_time_in(due_at, lead_time, now, Tz::UTC)
}

/// Computes when a reminder should fire, evaluating calendar offsets in `tz`.
///
/// Returns `None` when the result is at or before `now`.
pub fn compute_reminder_time_in(
    due_at: DateTime<Utc>,
    lead_time: LeadTime,
    now: DateTime<Utc>,
    tz: Tz,
) -> Option<DateTime<Utc>> {
    lead_time
        .subtract_from(due_at, tz)
        .filter(|fire_at| *fire_at > now)
}
