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

use std::fmt;
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};
use tracing::{error, trace};

use super::WorkerHub;
use crate::scheduler::{ResumeResult, Resumable};

struct Job {
    resumable: Arc<dyn Resumable>,
    max_throughput: usize,
}

#[derive(Default)]
struct WorkerState {
    job: Option<Job>,
    shutdown: bool,
}

struct WorkerInner {
    index: Option<usize>,
    hub: Weak<WorkerHub>,
    state: Mutex<WorkerState>,
    wakeup: Condvar,
    thread: Mutex<Option<JoinHandle<()>>>,
}

/// A reusable OS thread that runs one actor at a time.
///
/// The thread starts on the first [`launch`](Self::launch). It drives the launched job
/// until the job parks or terminates, then returns itself to the hub it came from.
#[derive(Clone)]
pub struct Worker {
    inner: Arc<WorkerInner>,
}

impl Worker {
    pub(crate) fn pooled(index: usize, hub: Weak<WorkerHub>) -> Self {
        Self::build(Some(index), hub)
    }

    pub(crate) fn unpooled() -> Self {
        Self::build(None, Weak::new())
    }

    fn build(index: Option<usize>, hub: Weak<WorkerHub>) -> Self {
        Self {
            inner: Arc::new(WorkerInner {
                index,
                hub,
                state: Mutex::new(WorkerState::default()),
                wakeup: Condvar::new(),
                thread: Mutex::new(None),
            }),
        }
    }

    /// Arena index inside the owning hub; `None` for unpooled workers.
    pub fn index(&self) -> Option<usize> {
        self.inner.index
    }

    /// `true` if both handles refer to the same worker.
    pub fn ptr_eq(lhs: &Self, rhs: &Self) -> bool {
        Arc::ptr_eq(&lhs.inner, &rhs.inner)
    }

    /// `true` while a job is assigned.
    pub fn is_busy(&self) -> bool {
        self.inner.state.lock().job.is_some()
    }

    /// Runs `job` on this worker's thread.
    ///
    /// # Panics
    ///
    /// Panics if the worker is already running a job.
    pub fn launch(&self, job: Arc<dyn Resumable>, max_throughput: usize) {
        {
            let mut state = self.inner.state.lock();
            assert!(state.job.is_none(), "worker is already running a job");
            state.job = Some(Job {
                resumable: job,
                max_throughput,
            });
        }
        self.ensure_started();
        self.inner.wakeup.notify_one();
    }

    /// Asks the thread to exit once it is idle.
    pub fn stop(&self) {
        self.inner.state.lock().shutdown = true;
        self.inner.wakeup.notify_one();
    }

    /// Waits for the thread, if it was started and is not the calling thread.
    pub fn join(&self) {
        let handle = self.inner.thread.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() == std::thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                error!(index = ?self.inner.index, "worker thread panicked");
            }
        }
    }

    fn ensure_started(&self) {
        let mut thread = self.inner.thread.lock();
        if thread.is_some() {
            return;
        }
        let worker = self.clone();
        let name = match self.inner.index {
            Some(index) => format!("strand-worker-{index}"),
            None => String::from("strand-worker"),
        };
        match std::thread::Builder::new()
            .name(name)
            .spawn(move || worker.run())
        {
            Ok(handle) => *thread = Some(handle),
            Err(err) => error!(%err, "failed to start worker thread"),
        }
    }

    fn run(self) {
        loop {
            let job = {
                let mut state = self.inner.state.lock();
                loop {
                    if let Some(job) = &state.job {
                        break Job {
                            resumable: job.resumable.clone(),
                            max_throughput: job.max_throughput,
                        };
                    }
                    if state.shutdown {
                        trace!(index = ?self.inner.index, "worker exiting");
                        return;
                    }
                    self.inner.wakeup.wait(&mut state);
                }
            };
            while job.resumable.clone().resume(job.max_throughput) == ResumeResult::ResumeLater {}
            trace!(index = ?self.inner.index, job = %job.resumable.id(), "job parked");
            self.inner.state.lock().job = None;
            match self.inner.hub.upgrade() {
                Some(hub) => hub.push(self.clone()),
                None => {
                    self.inner.state.lock().shutdown = true;
                }
            }
        }
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("index", &self.inner.index)
            .field("busy", &self.is_busy())
            .finish()
    }
}
