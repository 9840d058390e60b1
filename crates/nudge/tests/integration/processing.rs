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

//! Batch processor tests: the entry state machine, retries, isolation and
//! retention.

use std::time::Duration;

use chrono::{DateTime, Utc};
use nudge::{
    LeadTime, NewReminderEntry, ProcessorConfig, ProcessorError, ReminderEntry, ReminderKind,
    ReminderStatus, TaskStatus, UniversalTimestamp,
};

use crate::fixtures::{task_due, ts, Delivery, TestFixture};

/// Queues a due reminder for a seeded task at `2024-03-15T09:00:00Z`.
async fn due_entry(fixture: &TestFixture, task_id: &str) -> ReminderEntry {
    let task = task_due(task_id, ts("2024-03-15T10:00:00Z"), LeadTime::OneHour);
    fixture.seed(&task, "user-1");
    fixture
        .dal
        .reminder_queue()
        .create(
            NewReminderEntry {
                task_id: task_id.to_string(),
                user_id: "user-1".to_string(),
                kind: ReminderKind::DueDate,
                scheduled_for: UniversalTimestamp::from(ts("2024-03-15T09:00:00Z")),
            },
            UniversalTimestamp::from(ts("2024-03-15T08:00:00Z")),
        )
        .await
        .expect("Failed to queue entry")
}

async fn reload(fixture: &TestFixture, entry: &ReminderEntry) -> ReminderEntry {
    fixture
        .dal
        .reminder_queue()
        .get_by_id(entry.id)
        .await
        .unwrap()
        .expect("entry should still exist")
}

fn pass_time(minute: u32) -> DateTime<Utc> {
    ts(&format!("2024-03-15T09:{:02}:00Z", minute))
}

#[tokio::test]
async fn test_end_to_end_one_day_reminder() {
    let fixture = TestFixture::new().await;
    let due = ts("2024-03-20T12:00:00Z");
    let task = task_due("task-a", due, LeadTime::OneDay);
    fixture.seed(&task, "user-1");

    let scheduled = fixture
        .scheduler()
        .schedule_reminder(&task, "user-1", ts("2024-03-10T00:00:00Z"))
        .await
        .unwrap();
    let entry = scheduled.entry().cloned().unwrap();
    assert_eq!(
        entry.scheduled_for,
        UniversalTimestamp::from(ts("2024-03-19T12:00:00Z"))
    );

    let processor = fixture.processor(ProcessorConfig::default());

    // one second before it is due, nothing happens
    let early = processor
        .process_due(ts("2024-03-19T11:59:59Z"))
        .await
        .unwrap();
    assert_eq!(early.fetched, 0);

    let summary = processor
        .process_due(ts("2024-03-19T12:00:01Z"))
        .await
        .unwrap();
    assert_eq!(summary.fetched, 1);
    assert_eq!(summary.sent, 1);
    assert_eq!(fixture.notifier.delivered(), vec!["task-a".to_string()]);

    let sent = reload(&fixture, &entry).await;
    assert_eq!(sent.status, ReminderStatus::Sent);
    assert_eq!(sent.attempts, 1);
    assert_eq!(
        sent.last_attempt_at,
        Some(UniversalTimestamp::from(ts("2024-03-19T12:00:01Z")))
    );

    let later = processor
        .process_due(ts("2024-03-19T13:00:00Z"))
        .await
        .unwrap();
    assert_eq!(later.fetched, 0);
    assert_eq!(fixture.notifier.calls(), 1);
}

#[tokio::test]
async fn test_three_failures_exhaust_retries() {
    let fixture = TestFixture::new().await;
    let entry = due_entry(&fixture, "task-1").await;
    fixture.notifier.script(
        "task-1",
        [
            Delivery::Fail("smtp 451".into()),
            Delivery::Fail("smtp 451".into()),
            Delivery::Fail("smtp 554".into()),
        ],
    );
    let processor = fixture.processor(ProcessorConfig::default());

    for (minute, expected_attempts) in [(10, 1), (20, 2)] {
        let summary = processor.process_due(pass_time(minute)).await.unwrap();
        assert_eq!(summary.retrying, 1);
        let current = reload(&fixture, &entry).await;
        assert_eq!(current.status, ReminderStatus::Pending);
        assert_eq!(current.attempts, expected_attempts);
    }

    let summary = processor.process_due(pass_time(30)).await.unwrap();
    assert_eq!(summary.failed, 1);

    let failed = reload(&fixture, &entry).await;
    assert_eq!(failed.status, ReminderStatus::Failed);
    assert_eq!(failed.attempts, 3);
    assert!(failed.error_message.unwrap().contains("smtp 554"));

    // failed entries are never picked up again
    let after = processor.process_due(pass_time(40)).await.unwrap();
    assert_eq!(after.fetched, 0);
    assert_eq!(fixture.notifier.calls(), 3);
}

#[tokio::test]
async fn test_two_failures_then_success() {
    let fixture = TestFixture::new().await;
    let entry = due_entry(&fixture, "task-1").await;
    fixture.notifier.script(
        "task-1",
        [
            Delivery::Fail("timeout".into()),
            Delivery::Fail("timeout".into()),
            Delivery::Succeed,
        ],
    );
    let processor = fixture.processor(ProcessorConfig::default());

    for minute in [10, 20, 30] {
        processor.process_due(pass_time(minute)).await.unwrap();
    }

    let sent = reload(&fixture, &entry).await;
    assert_eq!(sent.status, ReminderStatus::Sent);
    assert_eq!(sent.attempts, 3);
}

#[tokio::test]
async fn test_max_attempts_is_configurable() {
    let fixture = TestFixture::new().await;
    let entry = due_entry(&fixture, "task-1").await;
    fixture
        .notifier
        .script("task-1", [Delivery::Fail("bounced".into())]);
    let processor = fixture.processor(ProcessorConfig::builder().max_attempts(1).build());

    let summary = processor.process_due(pass_time(10)).await.unwrap();
    assert_eq!(summary.failed, 1);
    assert_eq!(reload(&fixture, &entry).await.status, ReminderStatus::Failed);
}

#[tokio::test]
async fn test_missing_or_closed_task_cancels_without_attempt() {
    let fixture = TestFixture::new().await;
    let missing = due_entry(&fixture, "missing").await;
    let completed = due_entry(&fixture, "completed").await;
    let cancelled = due_entry(&fixture, "cancelled").await;
    let deleted = due_entry(&fixture, "deleted").await;

    fixture.tasks.remove("missing");
    fixture.tasks.set_status("completed", TaskStatus::Completed);
    fixture.tasks.set_status("cancelled", TaskStatus::Cancelled);
    let mut soft_deleted = task_due("deleted", ts("2024-03-15T10:00:00Z"), LeadTime::OneHour);
    soft_deleted.deleted_at = Some(ts("2024-03-15T08:30:00Z"));
    fixture.tasks.insert(soft_deleted);

    let processor = fixture.processor(ProcessorConfig::default());
    let summary = processor.process_due(pass_time(10)).await.unwrap();
    assert_eq!(summary.cancelled, 4);
    assert_eq!(fixture.notifier.calls(), 0);

    for entry in [missing, completed, cancelled, deleted] {
        let current = reload(&fixture, &entry).await;
        assert_eq!(current.status, ReminderStatus::Cancelled);
        assert_eq!(current.attempts, 0);
        assert_eq!(
            current.error_message.as_deref(),
            Some("Task deleted or completed")
        );
        assert_eq!(
            current.last_attempt_at,
            Some(UniversalTimestamp::from(pass_time(10)))
        );
    }
}

#[tokio::test]
async fn test_missing_user_fails_immediately() {
    let fixture = TestFixture::new().await;
    let entry = due_entry(&fixture, "task-1").await;
    fixture.users.remove("user-1");

    let processor = fixture.processor(ProcessorConfig::default());
    let summary = processor.process_due(pass_time(10)).await.unwrap();
    assert_eq!(summary.failed, 1);
    assert_eq!(fixture.notifier.calls(), 0);

    let failed = reload(&fixture, &entry).await;
    assert_eq!(failed.status, ReminderStatus::Failed);
    assert_eq!(failed.attempts, 1);
    assert_eq!(failed.error_message.as_deref(), Some("User not found"));
}

#[tokio::test]
async fn test_one_bad_delivery_does_not_abort_the_batch() {
    for concurrency in [1, 4] {
        let fixture = TestFixture::new().await;
        let mut entries = Vec::new();
        for i in 0..5 {
            entries.push(due_entry(&fixture, &format!("task-{}", i)).await);
        }
        fixture.notifier.script("task-1", [Delivery::Panic]);
        fixture
            .notifier
            .script("task-3", [Delivery::Fail("mailbox full".into())]);

        let processor = fixture.processor(
            ProcessorConfig::builder()
                .max_concurrent_deliveries(concurrency)
                .build(),
        );
        let summary = processor.process_due(pass_time(10)).await.unwrap();

        assert_eq!(summary.fetched, 5);
        assert_eq!(summary.sent, 3);
        assert_eq!(summary.retrying, 2);

        for entry in &entries {
            let current = reload(&fixture, entry).await;
            let expected = match entry.task_id.as_str() {
                "task-1" | "task-3" => ReminderStatus::Pending,
                _ => ReminderStatus::Sent,
            };
            assert_eq!(current.status, expected, "{}", entry.task_id);
            assert_eq!(current.attempts, 1);
        }
    }
}

#[tokio::test]
async fn test_slow_delivery_times_out_and_retries() {
    let fixture = TestFixture::new().await;
    let entry = due_entry(&fixture, "task-1").await;
    fixture
        .notifier
        .script("task-1", [Delivery::Hang(Duration::from_secs(30))]);

    let processor = fixture.processor(
        ProcessorConfig::builder()
            .delivery_timeout(Duration::from_millis(50))
            .build(),
    );
    let summary = processor.process_due(pass_time(10)).await.unwrap();
    assert_eq!(summary.retrying, 1);

    let current = reload(&fixture, &entry).await;
    assert_eq!(current.status, ReminderStatus::Pending);
    assert_eq!(current.attempts, 1);
    assert!(current.error_message.unwrap().contains("timed out"));
}

#[tokio::test]
async fn test_batch_size_bounds_a_pass() {
    let fixture = TestFixture::new().await;
    for i in 0..3 {
        due_entry(&fixture, &format!("task-{}", i)).await;
    }

    let processor = fixture.processor(ProcessorConfig::builder().batch_size(2).build());
    let first = processor.process_due(pass_time(10)).await.unwrap();
    assert_eq!(first.fetched, 2);
    let second = processor.process_due(pass_time(11)).await.unwrap();
    assert_eq!(second.fetched, 1);
}

#[tokio::test]
async fn test_pass_cleans_up_expired_entries() {
    let fixture = TestFixture::new().await;
    let queue = fixture.dal.reminder_queue();

    let expired = due_entry(&fixture, "expired").await;
    queue
        .mark_sent(&expired, UniversalTimestamp::from(ts("2024-03-15T09:00:00Z")))
        .await
        .unwrap();
    let kept = due_entry(&fixture, "kept").await;
    queue
        .mark_sent(&kept, UniversalTimestamp::from(ts("2024-03-17T09:00:00Z")))
        .await
        .unwrap();

    // 31 and 29 days after the sends
    let now = ts("2024-04-15T09:00:00Z");
    let summary = fixture
        .processor(ProcessorConfig::default())
        .process_due(now)
        .await
        .unwrap();
    assert_eq!(summary.fetched, 0);
    assert_eq!(summary.cleaned, 1);

    assert!(queue.get_by_id(expired.id).await.unwrap().is_none());
    assert!(queue.get_by_id(kept.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_overlapping_pass_is_rejected() {
    let fixture = TestFixture::new().await;
    due_entry(&fixture, "task-1").await;
    fixture
        .notifier
        .script("task-1", [Delivery::Hang(Duration::from_secs(30))]);

    let processor = fixture.processor(ProcessorConfig::default());
    let background = processor.clone();
    let running = tokio::spawn(async move { background.process_due(pass_time(10)).await });

    fixture.notifier.entered.notified().await;
    let overlap = processor.process_due(pass_time(10)).await;
    assert!(matches!(overlap, Err(ProcessorError::PassInProgress)));

    running.abort();
}

#[tokio::test]
async fn test_unreadable_due_row_does_not_block_the_queue() {
    let fixture = TestFixture::new().await;
    let entry = due_entry(&fixture, "task-1").await;
    fixture
        .execute_sql(
            "INSERT INTO reminder_queue \
             (id, task_id, user_id, kind, scheduled_for, status, attempts, created_at, updated_at) \
             VALUES ('legacy-1', 'legacy-task', 'user-1', 'due_date', '2024-03-15 08:30:00', \
             'pending', 0, '2024-03-15 08:00:00', '2024-03-15 08:00:00')",
        )
        .await;

    let processor = fixture.processor(ProcessorConfig::default());
    let summary = processor.process_due(pass_time(10)).await.unwrap();
    assert_eq!(summary.fetched, 2);
    assert_eq!(summary.sent, 1);
    assert_eq!(summary.errors, 1);
    assert_eq!(reload(&fixture, &entry).await.status, ReminderStatus::Sent);
    assert_eq!(fixture.notifier.delivered(), vec!["task-1".to_string()]);

    // the unreadable row stays put and keeps being reported
    let summary = processor.process_due(pass_time(20)).await.unwrap();
    assert_eq!(summary.fetched, 1);
    assert_eq!(summary.errors, 1);
    assert_eq!(fixture.notifier.calls(), 1);
}

#[tokio::test]
async fn test_unreadable_queue_aborts_the_pass() {
    let fixture = TestFixture::new().await;
    due_entry(&fixture, "task-1").await;
    fixture.execute_sql("DROP TABLE reminder_queue").await;

    let result = fixture
        .processor(ProcessorConfig::default())
        .process_due(pass_time(10))
        .await;

    assert!(matches!(result, Err(ProcessorError::Storage(_))));
    assert_eq!(fixture.notifier.calls(), 0);
}

#[tokio::test]
async fn test_provider_lookup_errors_leave_entry_untouched() {
    let fixture = TestFixture::new().await;
    let entry = due_entry(&fixture, "task-1").await;
    fixture.tasks.make_unavailable();

    let summary = fixture
        .processor(ProcessorConfig::default())
        .process_due(pass_time(10))
        .await
        .unwrap();
    assert_eq!(summary.fetched, 1);
    assert_eq!(summary.errors, 1);
    let current = reload(&fixture, &entry).await;
    assert_eq!(current.status, ReminderStatus::Pending);
    assert_eq!(current.attempts, 0);
    assert_eq!(fixture.notifier.calls(), 0);

    let fixture = TestFixture::new().await;
    let entry = due_entry(&fixture, "task-1").await;
    fixture.users.make_unavailable();

    let summary = fixture
        .processor(ProcessorConfig::default())
        .process_due(pass_time(10))
        .await
        .unwrap();
    assert_eq!(summary.errors, 1);
    assert_eq!(summary.failed, 0);
    let current = reload(&fixture, &entry).await;
    assert_eq!(current.status, ReminderStatus::Pending);
    assert_eq!(current.attempts, 0);
    assert_eq!(fixture.notifier.calls(), 0);
}

#[tokio::test]
async fn test_outcome_write_failure_is_isolated() {
    let fixture = TestFixture::new().await;
    let rejected = due_entry(&fixture, "task-bad").await;
    let accepted = due_entry(&fixture, "task-good").await;
    fixture
        .execute_sql(
            "CREATE TRIGGER reject_outcome BEFORE UPDATE ON reminder_queue \
             WHEN OLD.task_id = 'task-bad' \
             BEGIN SELECT RAISE(ABORT, 'outcome write rejected'); END",
        )
        .await;

    let summary = fixture
        .processor(ProcessorConfig::default())
        .process_due(pass_time(10))
        .await
        .unwrap();

    assert_eq!(summary.fetched, 2);
    assert_eq!(summary.sent, 1);
    assert_eq!(summary.errors, 1);
    assert_eq!(reload(&fixture, &accepted).await.status, ReminderStatus::Sent);
    let current = reload(&fixture, &rejected).await;
    assert_eq!(current.status, ReminderStatus::Pending);
    assert_eq!(current.attempts, 0);
}

#[tokio::test]
async fn test_retention_failure_does_not_fail_the_pass() {
    let fixture = TestFixture::new().await;
    let old = due_entry(&fixture, "old").await;
    let processor = fixture.processor(ProcessorConfig::default());
    processor.process_due(pass_time(10)).await.unwrap();
    assert_eq!(reload(&fixture, &old).await.status, ReminderStatus::Sent);

    let fresh = due_entry(&fixture, "fresh").await;
    fixture
        .execute_sql(
            "CREATE TRIGGER reject_purge BEFORE DELETE ON reminder_queue \
             BEGIN SELECT RAISE(ABORT, 'purge rejected'); END",
        )
        .await;

    let summary = processor
        .process_due(ts("2024-04-20T09:00:00Z"))
        .await
        .unwrap();

    assert_eq!(summary.sent, 1);
    assert_eq!(summary.cleaned, 0);
    assert_eq!(reload(&fixture, &fresh).await.status, ReminderStatus::Sent);
    assert_eq!(reload(&fixture, &old).await.status, ReminderStatus::Sent);
}
