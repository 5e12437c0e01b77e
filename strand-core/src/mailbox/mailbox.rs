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

use std::collections::VecDeque;
use std::sync::OnceLock;

use parking_lot::Mutex;
use static_assertions::assert_impl_all;
use tracing::trace;

use super::{InboxResult, LifoInbox, RequestBouncer};
use crate::common::ExitReason;
use crate::message::{MailboxElement, Priority};

#[derive(Default)]
struct ConsumerCache {
    urgent: VecDeque<MailboxElement>,
    normal: VecDeque<MailboxElement>,
    stash: VecDeque<MailboxElement>,
}

impl ConsumerCache {
    fn has_work(&self) -> bool {
        !self.urgent.is_empty() || !self.normal.is_empty()
    }

    fn queue_for(&mut self, priority: Priority) -> &mut VecDeque<MailboxElement> {
        match priority {
            Priority::High => &mut self.urgent,
            Priority::Normal => &mut self.normal,
        }
    }
}

/// The mailbox of one actor.
///
/// Producers only ever touch the lock-free [`LifoInbox`]. The consumer moves inbox
/// content into two FIFO queues (urgent and normal) and keeps elements that the current
/// behavior skipped in a stash until the next behavior change. The consumer side sits
/// behind a per-mailbox lock that is never contended, since only the actor's own resume
/// step takes it.
pub struct Mailbox {
    inbox: LifoInbox,
    cache: Mutex<ConsumerCache>,
    close_reason: OnceLock<ExitReason>,
}

assert_impl_all!(Mailbox: Send, Sync);

impl Mailbox {
    /// An empty, open mailbox.
    pub fn new() -> Self {
        Self {
            inbox: LifoInbox::new(),
            cache: Mutex::new(ConsumerCache::default()),
            close_reason: OnceLock::new(),
        }
    }

    /// Stores `element` for the consumer.
    ///
    /// Safe to call from any number of threads. On a closed mailbox the element is
    /// bounced with the recorded exit reason and `QueueClosed` is returned.
    pub fn enqueue(&self, element: MailboxElement) -> InboxResult {
        match self.inbox.push_front(element) {
            Ok(result) => result,
            Err(element) => {
                let reason = self.close_reason.get().cloned().unwrap_or(ExitReason::Normal);
                trace!(mid = ?element.mid, "mailbox closed, bouncing element");
                RequestBouncer::new(reason).bounce(element);
                InboxResult::QueueClosed
            }
        }
    }

    fn fetch_more(&self, cache: &mut ConsumerCache) {
        for element in self.inbox.take_head() {
            cache.queue_for(element.priority()).push_back(element);
        }
    }

    /// Next element: urgent ones first, FIFO within each class.
    pub fn dequeue(&self) -> Option<MailboxElement> {
        let mut cache = self.cache.lock();
        self.fetch_more(&mut cache);
        cache.urgent.pop_front().or_else(|| cache.normal.pop_front())
    }

    /// Up to `max` elements in dequeue order.
    pub fn dequeue_batch(&self, max: usize) -> Vec<MailboxElement> {
        let mut cache = self.cache.lock();
        self.fetch_more(&mut cache);
        let mut batch = Vec::with_capacity(max.min(cache.urgent.len() + cache.normal.len()));
        while batch.len() < max {
            match cache.urgent.pop_front().or_else(|| cache.normal.pop_front()) {
                Some(element) => batch.push(element),
                None => break,
            }
        }
        batch
    }

    /// Keeps an element the current behavior skipped.
    pub fn stash(&self, element: MailboxElement) {
        self.cache.lock().stash.push_back(element);
    }

    /// Puts stashed elements back in front of their queues, in their original order.
    ///
    /// Returns the number of elements restored.
    pub fn unstash(&self) -> usize {
        let mut cache = self.cache.lock();
        let stashed = std::mem::take(&mut cache.stash);
        let count = stashed.len();
        for element in stashed.into_iter().rev() {
            cache.queue_for(element.priority()).push_front(element);
        }
        count
    }

    /// Number of stashed elements.
    pub fn stashed(&self) -> usize {
        self.cache.lock().stash.len()
    }

    /// Parks the consumer if nothing is pending. Returns `true` when parked.
    ///
    /// Stashed elements do not count as pending: they wait for a behavior change.
    pub fn try_block(&self) -> bool {
        let cache = self.cache.lock();
        !cache.has_work() && self.inbox.try_block()
    }

    /// Reverts a successful [`try_block`](Self::try_block).
    pub fn try_unblock(&self) -> bool {
        self.inbox.try_unblock()
    }

    /// Closes the mailbox and returns every element still inside it.
    ///
    /// `reason` is used to bounce elements enqueued afterwards.
    pub fn close(&self, reason: ExitReason) -> Vec<MailboxElement> {
        let _ = self.close_reason.set(reason);
        let mut cache = self.cache.lock();
        let mut leftovers: Vec<MailboxElement> = cache.stash.drain(..).collect();
        leftovers.extend(cache.urgent.drain(..));
        leftovers.extend(cache.normal.drain(..));
        leftovers.extend(self.inbox.close());
        leftovers
    }

    /// `true` once closed.
    pub fn is_closed(&self) -> bool {
        self.inbox.is_closed()
    }

    /// `true` while the consumer is parked.
    pub fn is_blocked(&self) -> bool {
        self.inbox.is_blocked()
    }

    /// `true` if nothing is pending (stash excluded).
    pub fn is_empty(&self) -> bool {
        !self.cache.lock().has_work() && self.inbox.is_empty()
    }

    /// The reason recorded by [`close`](Self::close).
    pub fn close_reason(&self) -> Option<&ExitReason> {
        self.close_reason.get()
    }
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new()
    }
}
