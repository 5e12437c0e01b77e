/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

use std::sync::Arc;
use std::time::Duration;

use strand_core::actor::WeakActorHandle;
use strand_core::message::MailboxElement;
use strand_core::scheduler::{ResumeResult, Resumable, Scheduler};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::trace;

/// Runs actors as tasks on a tokio runtime.
///
/// Each parked-to-runnable transition spawns one task that resumes the actor until it
/// parks or terminates, yielding to the runtime between throughput budgets. Delayed
/// messages are timer tasks that are dropped when the scheduler is cancelled.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
    tracker: TaskTracker,
    cancellation_token: CancellationToken,
    max_throughput: usize,
}

impl TokioScheduler {
    /// A scheduler spawning onto `handle`.
    pub fn new(handle: Handle, max_throughput: usize) -> Arc<Self> {
        Arc::new(Self {
            handle,
            tracker: TaskTracker::new(),
            cancellation_token: CancellationToken::new(),
            max_throughput: max_throughput.max(1),
        })
    }

    /// A scheduler spawning onto the runtime of the calling task.
    ///
    /// Fails outside a tokio runtime.
    pub fn current(max_throughput: usize) -> anyhow::Result<Arc<Self>> {
        let handle = Handle::try_current()
            .map_err(|_| anyhow::anyhow!("a strand scheduler must be created inside a tokio runtime"))?;
        Ok(Self::new(handle, max_throughput))
    }

    /// Number of actor and timer tasks still running.
    pub fn task_count(&self) -> usize {
        self.tracker.len()
    }

    /// Drops pending timers and stops accepting new ones.
    pub fn cancel_timers(&self) {
        self.cancellation_token.cancel();
    }

    /// Waits until every task spawned so far has finished.
    pub async fn wait(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}

impl Scheduler for TokioScheduler {
    fn enqueue_for_resume(&self, job: Arc<dyn Resumable>) {
        let max_throughput = self.max_throughput;
        self.tracker.spawn_on(
            async move {
                loop {
                    match job.clone().resume(max_throughput) {
                        ResumeResult::ResumeLater => tokio::task::yield_now().await,
                        ResumeResult::AwaitingMessage | ResumeResult::Done => break,
                    }
                }
            },
            &self.handle,
        );
    }

    fn schedule_message(&self, delay: Duration, target: WeakActorHandle, element: MailboxElement) {
        if self.cancellation_token.is_cancelled() {
            trace!(target_actor = %target.id(), "scheduler cancelled, dropping delayed message");
            return;
        }
        let token = self.cancellation_token.clone();
        self.tracker.spawn_on(
            async move {
                tokio::select! {
                    () = tokio::time::sleep(delay) => {
                        if let Some(target) = target.upgrade() {
                            target.enqueue(element);
                        }
                    }
                    () = token.cancelled() => {}
                }
            },
            &self.handle,
        );
    }

    fn max_throughput(&self) -> usize {
        self.max_throughput
    }
}
