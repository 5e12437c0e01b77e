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

//! Runs actors on the calling thread, one resume at a time.
//!
//! Delayed messages are kept on a virtual clock that only moves when the test calls
//! [`TestScheduler::advance_time`], which makes timeouts deterministic.
//!
//! ```ignore
//! let scheduler = TestScheduler::new();
//! let doubler = ActorCell::spawn(scheduler.clone(), Arc::new(CoreConfig::default()), "doubler", |_ctx| {
//!     Behavior::builder().on(|_ctx, x: i32| HandlerResult::reply(x * 2)).build()
//! });
//! let mut reply = doubler.request(5_i32);
//! scheduler.run();
//! assert_eq!(reply.try_receive_value::<i32>(), Some(Ok(10)));
//! ```

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::trace;

use crate::actor::WeakActorHandle;
use crate::common::{ActorId, SchedulerConfig};
use crate::message::MailboxElement;
use crate::scheduler::{ResumeResult, Resumable, Scheduler};

struct Timer {
    target: WeakActorHandle,
    element: MailboxElement,
}

#[derive(Default)]
struct Inner {
    jobs: VecDeque<Arc<dyn Resumable>>,
    timers: BTreeMap<(Duration, u64), Timer>,
    now: Duration,
    seq: u64,
    schedule_counts: HashMap<ActorId, usize>,
}

/// A single-threaded scheduler with a virtual clock.
pub struct TestScheduler {
    inner: Mutex<Inner>,
    max_throughput: usize,
}

impl TestScheduler {
    /// A scheduler with the default throughput.
    pub fn new() -> Arc<Self> {
        Self::with_max_throughput(SchedulerConfig::default().max_throughput)
    }

    /// A scheduler resuming actors for at most `max_throughput` messages at a time.
    pub fn with_max_throughput(max_throughput: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner::default()),
            max_throughput,
        })
    }

    /// Resumes the next runnable actor. Returns `false` if nothing was runnable.
    pub fn run_once(&self) -> bool {
        let Some(job) = self.inner.lock().jobs.pop_front() else {
            return false;
        };
        let result = job.clone().resume(self.max_throughput);
        trace!(job = %job.id(), ?result, "resumed");
        if result == ResumeResult::ResumeLater {
            self.inner.lock().jobs.push_back(job);
        }
        true
    }

    /// Resumes actors until none is runnable. Returns the number of resumes.
    pub fn run(&self) -> usize {
        let mut resumes = 0;
        while self.run_once() {
            resumes += 1;
        }
        resumes
    }

    /// Moves the virtual clock forward and delivers every delayed message now due.
    ///
    /// Returns the number of messages delivered. Call [`run`](Self::run) afterwards to
    /// let the receivers handle them.
    pub fn advance_time(&self, delta: Duration) -> usize {
        let due = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            inner.now += delta;
            let later = inner.timers.split_off(&(inner.now, u64::MAX));
            std::mem::replace(&mut inner.timers, later)
        };
        let mut delivered = 0;
        for (_, timer) in due {
            if let Some(target) = timer.target.upgrade() {
                target.enqueue(timer.element);
                delivered += 1;
            }
        }
        delivered
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.inner.lock().now
    }

    /// How often the actor `id` has been made runnable.
    pub fn schedule_count(&self, id: ActorId) -> usize {
        self.inner
            .lock()
            .schedule_counts
            .get(&id)
            .copied()
            .unwrap_or(0)
    }

    /// Number of delayed messages not yet delivered.
    pub fn pending_timers(&self) -> usize {
        self.inner.lock().timers.len()
    }

    /// `true` if some actor is runnable.
    pub fn has_jobs(&self) -> bool {
        !self.inner.lock().jobs.is_empty()
    }
}

impl Scheduler for TestScheduler {
    fn enqueue_for_resume(&self, job: Arc<dyn Resumable>) {
        let mut inner = self.inner.lock();
        *inner.schedule_counts.entry(job.id()).or_default() += 1;
        inner.jobs.push_back(job);
    }

    fn schedule_message(&self, delay: Duration, target: WeakActorHandle, element: MailboxElement) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let due = inner.now + delay;
        inner.seq += 1;
        let seq = inner.seq;
        inner.timers.insert((due, seq), Timer { target, element });
    }

    fn max_throughput(&self) -> usize {
        self.max_throughput
    }
}
