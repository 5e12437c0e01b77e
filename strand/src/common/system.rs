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

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::anyhow;
use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::Mutex;
use strand_core::actor::{AbstractActor, ActorCell, ActorContext, ActorHandle, Attachable};
use strand_core::behavior::Behavior;
use strand_core::common::{ActorError, ActorId, CoreConfig, ExitReason};
use strand_core::mailbox::InboxResult;
use strand_core::message::{DownMsg, IntoMessage, MailboxElement, Message, MessageType};
use strand_core::worker::{spawn_detached, WorkerHub};
use tokio::sync::oneshot;
use tracing::{debug, error, instrument, trace, warn};

use crate::common::{StrandConfig, TokioScheduler};

/// A running actor system.
///
/// Owns the tokio-backed scheduler, the worker hub for detached actors and the name
/// registry. Cloning is cheap; every clone refers to the same system.
#[derive(Clone)]
pub struct ActorSystem(Arc<SystemInner>);

struct SystemInner {
    scheduler: Arc<TokioScheduler>,
    hub: Arc<WorkerHub>,
    config: StrandConfig,
    core: Arc<CoreConfig>,
    roots: DashMap<ActorId, ActorHandle>,
    names: DashMap<String, ActorHandle>,
    shut_down: AtomicBool,
}

impl ActorSystem {
    /// Starts a system configured from the XDG configuration directories.
    ///
    /// Must be called inside a tokio runtime.
    pub fn launch() -> anyhow::Result<Self> {
        Self::with_config(crate::common::CONFIG.clone())
    }

    /// Starts a system with an explicit configuration.
    ///
    /// Must be called inside a tokio runtime.
    pub fn with_config(config: StrandConfig) -> anyhow::Result<Self> {
        let scheduler = TokioScheduler::current(config.core.scheduler.max_throughput)?;
        let hub = WorkerHub::new(&config.core.workers);
        let core = Arc::new(config.core.clone());
        trace!(?config, "actor system started");
        Ok(Self(Arc::new(SystemInner {
            scheduler,
            hub,
            config,
            core,
            roots: DashMap::new(),
            names: DashMap::new(),
            shut_down: AtomicBool::new(false),
        })))
    }

    /// The system configuration.
    pub fn config(&self) -> &StrandConfig {
        &self.0.config
    }

    /// The scheduler every non-detached actor of this system runs on.
    pub fn scheduler(&self) -> &Arc<TokioScheduler> {
        &self.0.scheduler
    }

    /// The hub detached actors borrow their threads from.
    pub fn hub(&self) -> &Arc<WorkerHub> {
        &self.0.hub
    }

    /// Spawns a top-level actor.
    ///
    /// The system keeps the actor alive until it exits or the system shuts down.
    #[instrument(skip_all, fields(name = %name.as_ref()))]
    pub fn spawn<F>(&self, name: impl AsRef<str>, init: F) -> ActorHandle
    where
        F: FnOnce(&mut ActorContext<'_>) -> Behavior + Send + 'static,
    {
        let handle = ActorCell::spawn(
            self.0.scheduler.clone(),
            self.0.core.clone(),
            name.as_ref(),
            init,
        );
        self.track(&handle);
        handle
    }

    /// Spawns a top-level actor whose handlers run on a dedicated worker thread.
    ///
    /// Use this for actors whose handlers block. Fails once the system is shut down.
    #[instrument(skip_all, fields(name = %name.as_ref()))]
    pub fn spawn_detached<F>(&self, name: impl AsRef<str>, init: F) -> anyhow::Result<ActorHandle>
    where
        F: FnOnce(&mut ActorContext<'_>) -> Behavior + Send + 'static,
    {
        if self.is_shut_down() {
            return Err(anyhow!("cannot spawn {} on a shut down system", name.as_ref()));
        }
        let handle = spawn_detached(
            &self.0.hub,
            self.0.scheduler.clone(),
            self.0.core.clone(),
            name.as_ref(),
            init,
        );
        self.track(&handle);
        Ok(handle)
    }

    /// Registers `handle` under `name`.
    ///
    /// Fails if a live actor already holds the name.
    pub fn register(&self, name: impl Into<String>, handle: &ActorHandle) -> anyhow::Result<()> {
        let name = name.into();
        match self.0.names.entry(name) {
            dashmap::mapref::entry::Entry::Occupied(mut entry) => {
                if !entry.get().is_terminated() {
                    return Err(anyhow!("name {} is already registered to {}", entry.key(), entry.get()));
                }
                entry.insert(handle.clone());
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(handle.clone());
            }
        }
        Ok(())
    }

    /// Removes the registration for `name`.
    pub fn unregister(&self, name: &str) -> Option<ActorHandle> {
        self.0.names.remove(name).map(|(_, handle)| handle)
    }

    /// The live actor registered under `name`.
    pub fn lookup(&self, name: &str) -> Option<ActorHandle> {
        let handle = self.0.names.get(name)?.clone();
        if handle.is_terminated() {
            self.0.names.remove_if(name, |_, registered| registered.is_terminated());
            return None;
        }
        Some(handle)
    }

    /// Number of top-level actors that have not exited.
    pub fn actor_count(&self) -> usize {
        self.0.roots.retain(|_, handle| !handle.is_terminated());
        self.0.roots.len()
    }

    /// Sends `values` to `target` and waits for the reply, using the configured
    /// request timeout.
    #[instrument(skip_all, fields(target = %target))]
    pub async fn request(&self, target: &ActorHandle, values: impl IntoMessage) -> Result<Message, ActorError> {
        target.request(values).receive(self.0.core.request_timeout()).await
    }

    /// Like [`request`](Self::request) for a reply consisting of a single `T`.
    pub async fn request_value<T: MessageType>(
        &self,
        target: &ActorHandle,
        values: impl IntoMessage,
    ) -> Result<T, ActorError> {
        target
            .request(values)
            .receive_value::<T>(self.0.core.request_timeout())
            .await
    }

    /// Resolves with `target`'s exit reason once it terminates.
    pub fn terminated(&self, target: &ActorHandle) -> impl Future<Output = ExitReason> + Send + 'static {
        let (tx, rx) = oneshot::channel();
        let watcher: Arc<dyn AbstractActor> = Arc::new(ExitWatcher {
            id: ActorId::next(),
            tx: Mutex::new(Some(tx)),
        });
        let watcher = ActorHandle::new(watcher);
        target.attach(Attachable::Monitor(watcher.downgrade()));
        async move {
            let _watcher = watcher;
            rx.await.unwrap_or(ExitReason::Normal)
        }
    }

    /// `true` once [`shutdown`](Self::shutdown) started.
    pub fn is_shut_down(&self) -> bool {
        self.0.shut_down.load(Ordering::Acquire)
    }

    /// Stops every top-level actor and waits for the system to wind down.
    ///
    /// Each actor receives an exit with [`ExitReason::UserShutdown`]; requests still
    /// queued are bounced. Actors that have not exited after the configured shutdown
    /// timeout are abandoned and the call fails.
    #[instrument(skip_all)]
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        if self.0.shut_down.swap(true, Ordering::AcqRel) {
            debug!("actor system already shut down");
            return Ok(());
        }
        let timeout = self.0.config.shutdown_timeout();
        let roots: Vec<ActorHandle> = self.0.roots.iter().map(|entry| entry.value().clone()).collect();
        debug!(count = roots.len(), "stopping top-level actors");

        let exits: Vec<_> = roots
            .iter()
            .map(|handle| {
                let exited = self.terminated(handle);
                if handle.exit(ExitReason::UserShutdown) == InboxResult::QueueClosed {
                    trace!(actor = %handle, "actor already closed");
                }
                exited
            })
            .collect();

        let stopped = tokio::time::timeout(timeout, join_all(exits)).await;
        self.0.scheduler.cancel_timers();
        self.0.roots.clear();
        self.0.names.clear();

        let hub = self.0.hub.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || hub.shutdown()).await {
            warn!("worker hub shutdown failed: {}", e);
        }

        if stopped.is_err() {
            error!("System-wide shutdown timeout expired after {:?}", timeout);
            return Err(anyhow!("actors did not exit within {:?}", timeout));
        }
        if tokio::time::timeout(timeout, self.0.scheduler.wait()).await.is_err() {
            error!("scheduler tasks did not finish within {:?}", timeout);
            return Err(anyhow!("scheduler tasks did not finish within {:?}", timeout));
        }
        debug!("actor system shut down");
        Ok(())
    }

    fn track(&self, handle: &ActorHandle) {
        self.0.roots.retain(|_, root| !root.is_terminated());
        self.0.roots.insert(handle.id(), handle.clone());
    }
}

impl std::fmt::Debug for ActorSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorSystem")
            .field("actors", &self.0.roots.len())
            .field("hub", &self.0.hub)
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

/// Turns the `DownMsg` of a monitored actor into a oneshot completion.
struct ExitWatcher {
    id: ActorId,
    tx: Mutex<Option<oneshot::Sender<ExitReason>>>,
}

impl AbstractActor for ExitWatcher {
    fn id(&self) -> ActorId {
        self.id
    }

    fn name(&self) -> &str {
        "exit-watcher"
    }

    fn enqueue(&self, element: MailboxElement) -> InboxResult {
        let Some(down) = element.content.get::<DownMsg>(0) else {
            return InboxResult::Success;
        };
        match self.tx.lock().take() {
            Some(tx) => {
                let _ = tx.send(down.reason.clone());
                InboxResult::Success
            }
            None => InboxResult::QueueClosed,
        }
    }

    fn attach(&self, _attachable: Attachable) {}

    fn exit_reason(&self) -> Option<ExitReason> {
        None
    }
}
