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

use super::WorkerHub;
use crate::actor::{ActorCell, ActorContext, ActorHandle, WeakActorHandle};
use crate::behavior::Behavior;
use crate::common::CoreConfig;
use crate::message::MailboxElement;
use crate::scheduler::{Resumable, Scheduler};

/// Runs every resume of its actors on a worker borrowed from a [`WorkerHub`].
///
/// Handlers of such actors may block their thread without stalling the shared
/// scheduler. Delayed messages are delegated to `timers`.
pub struct DetachedScheduler {
    hub: Arc<WorkerHub>,
    timers: Arc<dyn Scheduler>,
}

impl DetachedScheduler {
    /// Borrows workers from `hub` and delegates timers to `timers`.
    pub fn new(hub: Arc<WorkerHub>, timers: Arc<dyn Scheduler>) -> Arc<Self> {
        Arc::new(Self { hub, timers })
    }
}

impl Scheduler for DetachedScheduler {
    fn enqueue_for_resume(&self, job: Arc<dyn Resumable>) {
        self.hub.acquire().launch(job, self.max_throughput());
    }

    fn schedule_message(&self, delay: Duration, target: WeakActorHandle, element: MailboxElement) {
        self.timers.schedule_message(delay, target, element);
    }

    fn max_throughput(&self) -> usize {
        self.timers.max_throughput()
    }
}

/// Spawns an actor whose handlers run on workers from `hub`.
///
/// Actors it spawns through its context are detached as well.
pub fn spawn_detached<F>(
    hub: &Arc<WorkerHub>,
    timers: Arc<dyn Scheduler>,
    config: Arc<CoreConfig>,
    name: impl Into<String>,
    init: F,
) -> ActorHandle
where
    F: FnOnce(&mut ActorContext<'_>) -> Behavior + Send + 'static,
{
    ActorCell::spawn(DetachedScheduler::new(hub.clone(), timers), config, name, init)
}
