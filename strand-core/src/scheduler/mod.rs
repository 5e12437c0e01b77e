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

//! The seam between actors and whatever runs them.
//!
//! The core never decides *when* an actor runs. A mailbox that turns a parked actor
//! runnable hands the actor to [`Scheduler::enqueue_for_resume`], and the scheduler
//! later calls [`Resumable::resume`] from some thread, never from two at once.

use std::sync::Arc;
use std::time::Duration;

use crate::actor::WeakActorHandle;
use crate::common::ActorId;
use crate::message::MailboxElement;

/// What a resume step ended with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeResult {
    /// The throughput budget ran out with work left; resume again soon.
    ResumeLater,
    /// The mailbox is empty and the actor parked; the next enqueue reschedules it.
    AwaitingMessage,
    /// The actor terminated.
    Done,
}

/// A unit of work a scheduler can run.
pub trait Resumable: Send + Sync {
    /// Identity of the job, for diagnostics.
    fn id(&self) -> ActorId;

    /// Handles up to `max_throughput` messages.
    fn resume(self: Arc<Self>, max_throughput: usize) -> ResumeResult;
}

/// Runs resumable jobs and delivers delayed messages.
pub trait Scheduler: Send + Sync {
    /// Makes `job` runnable. Called exactly once per parked-to-runnable transition.
    fn enqueue_for_resume(&self, job: Arc<dyn Resumable>);

    /// Enqueues `element` into `target` after `delay`, if the target is still alive.
    fn schedule_message(&self, delay: Duration, target: WeakActorHandle, element: MailboxElement);

    /// Messages an actor handles per resume.
    fn max_throughput(&self) -> usize;
}
