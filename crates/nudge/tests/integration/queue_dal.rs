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

//! Reminder queue store tests against SQLite.

use chrono::{DateTime, Duration, Utc};
use nudge::dal::PendingDisposition;
use nudge::{NewReminderEntry, ReminderKind, ReminderStatus, StorageError, UniversalTimestamp};

use crate::fixtures::{ts, TestFixture};

fn new_entry(task_id: &str, scheduled_for: DateTime<Utc>) -> NewReminderEntry {
    NewReminderEntry {
        task_id: task_id.to_string(),
        user_id: "user-1".to_string(),
        kind: ReminderKind::DueDate,
        scheduled_for: UniversalTimestamp::from(scheduled_for),
    }
}

fn at(s: &str) -> UniversalTimestamp {
    UniversalTimestamp::from(ts(s))
}

#[tokio::test]
async fn test_create_and_read_back() {
    let fixture = TestFixture::new().await;
    let queue = fixture.dal.reminder_queue();

    let created = queue
        .create(
            new_entry("task-1", ts("2024-03-15T09:00:00Z")),
            at("2024-03-15T08:00:00Z"),
        )
        .await
        .expect("Failed to create entry");

    assert_eq!(created.status, ReminderStatus::Pending);
    assert_eq!(created.attempts, 0);
    assert!(created.last_attempt_at.is_none());

    let loaded = queue
        .get_by_id(created.id)
        .await
        .expect("Failed to load entry")
        .expect("Entry should exist");
    assert_eq!(loaded, created);

    let for_task = queue.list_by_task("task-1").await.unwrap();
    assert_eq!(for_task, vec![created]);
    assert!(queue.list_by_task("task-2").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_one_pending_entry_per_task_and_kind() {
    let fixture = TestFixture::new().await;
    let queue = fixture.dal.reminder_queue();
    let now = at("2024-03-15T08:00:00Z");

    let first = queue
        .create(new_entry("task-1", ts("2024-03-15T09:00:00Z")), now)
        .await
        .unwrap();

    let duplicate = queue
        .create(new_entry("task-1", ts("2024-03-15T09:30:00Z")), now)
        .await;
    assert!(matches!(
        duplicate,
        Err(StorageError::AlreadyScheduled { ref task_id, .. }) if task_id == "task-1"
    ));

    // other kinds and other tasks are unaffected
    let mut overdue = new_entry("task-1", ts("2024-03-15T11:00:00Z"));
    overdue.kind = ReminderKind::Overdue;
    queue.create(overdue, now).await.unwrap();
    queue
        .create(new_entry("task-2", ts("2024-03-15T09:00:00Z")), now)
        .await
        .unwrap();

    // once the first entry leaves pending, a new one may be queued
    assert!(queue.mark_sent(&first, now).await.unwrap());
    queue
        .create(new_entry("task-1", ts("2024-03-16T09:00:00Z")), now)
        .await
        .expect("A settled entry must not block a new pending one");
}

#[tokio::test]
async fn test_find_due_filters_orders_and_limits() {
    let fixture = TestFixture::new().await;
    let queue = fixture.dal.reminder_queue();
    let created_at = at("2024-03-15T00:00:00Z");

    let late = queue
        .create(new_entry("late", ts("2024-03-15T09:00:00Z")), created_at)
        .await
        .unwrap();
    let early = queue
        .create(new_entry("early", ts("2024-03-15T07:00:00Z")), created_at)
        .await
        .unwrap();
    let exact = queue
        .create(new_entry("exact", ts("2024-03-15T10:00:00Z")), created_at)
        .await
        .unwrap();
    queue
        .create(new_entry("future", ts("2024-03-15T10:00:01Z")), created_at)
        .await
        .unwrap();
    let settled = queue
        .create(new_entry("settled", ts("2024-03-15T06:00:00Z")), created_at)
        .await
        .unwrap();
    queue.mark_sent(&settled, created_at).await.unwrap();

    let now = at("2024-03-15T10:00:00Z");
    let due = queue.find_due(now, 100).await.unwrap().entries;
    let ids: Vec<_> = due.iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![early.id, late.id, exact.id]);

    let capped = queue.find_due(now, 2).await.unwrap().entries;
    assert_eq!(capped.len(), 2);
    assert_eq!(capped[0].id, early.id);
}

#[tokio::test]
async fn test_transitions_are_guarded_by_observed_state() {
    let fixture = TestFixture::new().await;
    let queue = fixture.dal.reminder_queue();
    let now = at("2024-03-15T10:00:00Z");

    let observed = queue
        .create(new_entry("task-1", ts("2024-03-15T09:00:00Z")), now)
        .await
        .unwrap();

    // first pass records a failed attempt
    assert!(queue
        .record_failed_attempt(&observed, "smtp down", now)
        .await
        .unwrap());

    // a second pass that read the entry before that write loses
    assert!(!queue.mark_sent(&observed, now).await.unwrap());
    assert!(!queue.mark_cancelled(&observed, "gone", now).await.unwrap());

    let current = queue.get_by_id(observed.id).await.unwrap().unwrap();
    assert_eq!(current.status, ReminderStatus::Pending);
    assert_eq!(current.attempts, 1);
    assert_eq!(current.error_message.as_deref(), Some("smtp down"));
    assert_eq!(current.last_attempt_at, Some(now));

    // working from the fresh read succeeds exactly once
    assert!(queue.mark_sent(&current, now).await.unwrap());
    assert!(!queue.mark_sent(&current, now).await.unwrap());

    let sent = queue.get_by_id(observed.id).await.unwrap().unwrap();
    assert_eq!(sent.status, ReminderStatus::Sent);
    assert_eq!(sent.attempts, 2);
}

#[tokio::test]
async fn test_replace_pending_only_touches_that_task() {
    let fixture = TestFixture::new().await;
    let queue = fixture.dal.reminder_queue();
    let now = at("2024-03-15T08:00:00Z");

    let original = queue
        .create(new_entry("task-1", ts("2024-03-15T09:00:00Z")), now)
        .await
        .unwrap();
    let neighbour = queue
        .create(new_entry("task-2", ts("2024-03-15T09:00:00Z")), now)
        .await
        .unwrap();

    let replaced = queue
        .replace_pending_for_task(
            "task-1",
            PendingDisposition::Cancel,
            Some(new_entry("task-1", ts("2024-03-16T09:00:00Z"))),
            now,
        )
        .await
        .unwrap();
    assert_eq!(replaced.removed, 1);
    let created = replaced.created.expect("replacement should be created");
    assert_eq!(created.scheduled_for, at("2024-03-16T09:00:00Z"));

    let history = queue.list_by_task("task-1").await.unwrap();
    assert_eq!(history.len(), 2);
    let old = history.iter().find(|e| e.id == original.id).unwrap();
    assert_eq!(old.status, ReminderStatus::Cancelled);
    assert_eq!(old.attempts, 0);

    let deleted = queue
        .replace_pending_for_task("task-1", PendingDisposition::Delete, None, now)
        .await
        .unwrap();
    assert_eq!(deleted.removed, 1);
    assert!(deleted.created.is_none());

    // the cancelled history row survives a delete of pending entries
    let history = queue.list_by_task("task-1").await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, original.id);

    let untouched = queue.get_by_id(neighbour.id).await.unwrap().unwrap();
    assert_eq!(untouched.status, ReminderStatus::Pending);
}

#[tokio::test]
async fn test_retention_deletes_only_old_terminal_entries() {
    let fixture = TestFixture::new().await;
    let queue = fixture.dal.reminder_queue();
    let now = ts("2024-06-01T12:00:00Z");
    let days_ago = |days: i64| UniversalTimestamp::from(now - Duration::days(days));

    let old_sent = queue
        .create(new_entry("old-sent", ts("2024-04-01T00:00:00Z")), days_ago(40))
        .await
        .unwrap();
    queue.mark_sent(&old_sent, days_ago(31)).await.unwrap();

    let recent_sent = queue
        .create(new_entry("recent-sent", ts("2024-04-01T00:00:00Z")), days_ago(40))
        .await
        .unwrap();
    queue.mark_sent(&recent_sent, days_ago(29)).await.unwrap();

    let old_pending = queue
        .create(new_entry("old-pending", ts("2024-04-01T00:00:00Z")), days_ago(60))
        .await
        .unwrap();

    // cancelled by the scheduler: no last_attempt_at, aged by updated_at
    queue
        .create(new_entry("old-cancelled", ts("2024-04-01T00:00:00Z")), days_ago(60))
        .await
        .unwrap();
    queue
        .cancel_pending_for_task("old-cancelled", days_ago(45))
        .await
        .unwrap();

    let cutoff = days_ago(30);
    let deleted = queue.delete_terminal_older_than(cutoff).await.unwrap();
    assert_eq!(deleted, 2);

    assert!(queue.get_by_id(old_sent.id).await.unwrap().is_none());
    assert!(queue.get_by_id(recent_sent.id).await.unwrap().is_some());
    assert!(queue.get_by_id(old_pending.id).await.unwrap().is_some());
    assert!(queue.list_by_task("old-cancelled").await.unwrap().is_empty());

    assert_eq!(queue.count_by_status(ReminderStatus::Pending).await.unwrap(), 1);
    assert_eq!(queue.count_by_status(ReminderStatus::Sent).await.unwrap(), 1);
}
