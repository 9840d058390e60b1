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

//! In-process timer that runs a reminder pass at a fixed cadence.
//!
//! Hosts with their own scheduler (cron, a job queue) can ignore this and
//! call [`ReminderProcessor::process_due_now`] directly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::config::MIN_POLL_INTERVAL;
use crate::error::ProcessorError;
use crate::processor::ReminderProcessor;

/// Runs [`ReminderProcessor::process_due_now`] on every tick.
///
/// A tick that comes due while a pass is still running is skipped.
pub struct PeriodicTrigger {
    shutdown: Arc<AtomicBool>,
    notify: Arc<Notify>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTrigger {
    /// Spawns the trigger loop. The first pass runs immediately.
    ///
    /// A zero `interval` is raised to 1ms.
    pub fn start(processor: ReminderProcessor, interval: Duration) -> Self {
        let interval = interval.max(MIN_POLL_INTERVAL);
        let shutdown = Arc::new(AtomicBool::new(false));
        let notify = Arc::new(Notify::new());

        let loop_shutdown = shutdown.clone();
        let loop_notify = notify.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            info!("Reminder trigger started (interval: {:?})", interval);
            loop {
                if loop_shutdown.load(Ordering::SeqCst) {
                    break;
                }

                tokio::select! {
                    _ = ticker.tick() => {
                        match processor.process_due_now().await {
                            Ok(summary) => debug!(?summary, "Reminder pass finished"),
                            Err(ProcessorError::PassInProgress) => {
                                debug!("Previous reminder pass still running, skipping tick");
                            }
                            Err(e) => error!("Reminder pass failed: {}", e),
                        }
                    }
                    _ = loop_notify.notified() => {
                        debug!("Reminder trigger shutdown signal received");
                    }
                }
            }
            info!("Reminder trigger stopped");
        });

        Self {
            shutdown,
            notify,
            handle: Some(handle),
        }
    }

    /// Starts a trigger at the cadence in the processor's configuration.
    pub fn from_config(processor: ReminderProcessor) -> Self {
        let interval = processor.config().poll_interval();
        Self::start(processor, interval)
    }

    /// Signals the loop to stop and waits for the running pass to finish.
    pub async fn shutdown(mut self) {
        self.signal();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                error!("Reminder trigger task ended abnormally: {}", e);
            }
        }
    }

    fn signal(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }
}

impl Drop for PeriodicTrigger {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.signal();
            handle.abort();
        }
    }
}
