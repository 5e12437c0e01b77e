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
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use tracing::{debug, trace};

use super::Worker;
use crate::common::WorkerConfig;

const NIL: u32 = u32::MAX;
const INDEX_MASK: u64 = 0xffff_ffff;

const fn pack(tag: u32, index: u32) -> u64 {
    ((tag as u64) << 32) | index as u64
}

const fn unpack(head: u64) -> (u32, u32) {
    ((head >> 32) as u32, (head & INDEX_MASK) as u32)
}

/// One entry of the free-list arena.
struct Link {
    next: AtomicU32,
    in_hub: AtomicBool,
    worker: OnceLock<Worker>,
}

/// A lock-free LIFO of idle workers.
///
/// Workers live in a fixed arena and are linked by index. The head packs the index of
/// the top worker with a tag that changes on every successful exchange, so a head that
/// was popped and pushed back in between is never mistaken for the old one.
///
/// A worker is either linked into the hub (idle) or checked out (running); pushing a
/// worker that is already linked is a programmer error and panics.
pub struct WorkerHub {
    head: AtomicU64,
    links: Box<[Link]>,
    reserved: AtomicUsize,
    closed: AtomicBool,
}

impl WorkerHub {
    /// A hub pooling at most `config.max_workers` workers.
    pub fn new(config: &WorkerConfig) -> Arc<Self> {
        Self::with_capacity(config.max_workers)
    }

    /// A hub pooling at most `capacity` workers.
    pub fn with_capacity(capacity: usize) -> Arc<Self> {
        let capacity = capacity.min(NIL as usize);
        let links = (0..capacity)
            .map(|_| Link {
                next: AtomicU32::new(NIL),
                in_hub: AtomicBool::new(false),
                worker: OnceLock::new(),
            })
            .collect();
        Arc::new(Self {
            head: AtomicU64::new(pack(0, NIL)),
            links,
            reserved: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        })
    }

    /// Number of workers the hub can pool.
    pub fn capacity(&self) -> usize {
        self.links.len()
    }

    /// Number of pooled workers created so far.
    pub fn created(&self) -> usize {
        self.reserved.load(Ordering::Acquire).min(self.links.len())
    }

    /// Creates a worker that belongs to this hub, or an unpooled one once the hub is full.
    ///
    /// The new worker is checked out.
    pub fn new_worker(self: &Arc<Self>) -> Worker {
        let reserved = self
            .reserved
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                (count < self.links.len()).then_some(count + 1)
            });
        match reserved {
            Ok(index) => {
                let worker = Worker::pooled(index, Arc::downgrade(self));
                let _ = self.links[index].worker.set(worker.clone());
                debug!(index, "created pooled worker");
                worker
            }
            Err(_) => {
                debug!("worker hub is full, creating unpooled worker");
                Worker::unpooled()
            }
        }
    }

    /// An idle worker, or a new one if none is idle.
    pub fn acquire(self: &Arc<Self>) -> Worker {
        self.pop().unwrap_or_else(|| self.new_worker())
    }

    /// Returns `worker` to the idle list.
    ///
    /// Unpooled workers, and every worker once the hub is shut down, are stopped instead.
    ///
    /// # Panics
    ///
    /// Panics if `worker` is already in the hub.
    pub fn push(&self, worker: Worker) {
        let Some(index) = self.index_of(&worker) else {
            trace!("stopping unpooled worker");
            worker.stop();
            return;
        };
        if self.closed.load(Ordering::Acquire) {
            worker.stop();
            return;
        }
        let link = &self.links[index as usize];
        assert!(
            !link.in_hub.swap(true, Ordering::AcqRel),
            "worker pushed twice"
        );
        let mut head = self.head.load(Ordering::Acquire);
        loop {
            let (tag, top) = unpack(head);
            link.next.store(top, Ordering::Relaxed);
            match self.head.compare_exchange_weak(
                head,
                pack(tag.wrapping_add(1), index),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(current) => head = current,
            }
        }
    }

    /// Removes and returns the most recently pushed worker.
    ///
    /// Returns `None` when the hub is empty; callers create a new worker instead of
    /// waiting.
    pub fn pop(&self) -> Option<Worker> {
        let mut head = self.head.load(Ordering::Acquire);
        loop {
            let (tag, top) = unpack(head);
            if top == NIL {
                return None;
            }
            let link = &self.links[top as usize];
            let next = link.next.load(Ordering::Relaxed);
            match self.head.compare_exchange_weak(
                head,
                pack(tag.wrapping_add(1), next),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    link.in_hub.store(false, Ordering::Release);
                    return link.worker.get().cloned();
                }
                Err(current) => head = current,
            }
        }
    }

    /// The worker `pop` would return right now.
    ///
    /// Diagnostics only: a concurrent `pop` may take it before the caller looks.
    pub fn peek(&self) -> Option<Worker> {
        let (_, top) = unpack(self.head.load(Ordering::Acquire));
        if top == NIL {
            return None;
        }
        self.links[top as usize].worker.get().cloned()
    }

    /// `true` if no worker is idle.
    pub fn is_empty(&self) -> bool {
        unpack(self.head.load(Ordering::Acquire)).1 == NIL
    }

    /// Stops every idle worker and waits for their threads.
    ///
    /// Workers still running return to a closed hub and stop on their own.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        let mut stopped = 0;
        while let Some(worker) = self.pop() {
            worker.stop();
            worker.join();
            stopped += 1;
        }
        debug!(stopped, "worker hub shut down");
    }

    fn index_of(&self, worker: &Worker) -> Option<u32> {
        let index = worker.index()?;
        let owned = self.links.get(index)?.worker.get()?;
        Worker::ptr_eq(owned, worker).then_some(index as u32)
    }
}

impl Drop for WorkerHub {
    fn drop(&mut self) {
        for worker in self.links.iter().filter_map(|link| link.worker.get()) {
            worker.stop();
        }
    }
}

impl fmt::Debug for WorkerHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerHub")
            .field("capacity", &self.capacity())
            .field("created", &self.created())
            .field("empty", &self.is_empty())
            .finish()
    }
}
