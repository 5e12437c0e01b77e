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

//! An intrusive Treiber stack with two sentinel states.
//!
//! Producers push single nodes with a CAS loop. The consumer never pops single nodes:
//! it detaches the whole chain at once by swapping the head for null, which makes the
//! structure immune to ABA. Besides null and real nodes the head can hold two tags:
//! `BLOCKED` (the consumer is parked and the next producer must wake it) and `CLOSED`
//! (the consumer has terminated and producers must bounce).

use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use super::InboxResult;
use crate::message::MailboxElement;

struct Node {
    element: MailboxElement,
    next: *mut Node,
}

const BLOCKED: *mut Node = 1 as *mut Node;
const CLOSED: *mut Node = 2 as *mut Node;

fn is_node(ptr: *mut Node) -> bool {
    !ptr.is_null() && ptr != BLOCKED && ptr != CLOSED
}

/// Lock-free multi-producer, single-consumer inbox.
pub struct LifoInbox {
    head: AtomicPtr<Node>,
}

impl LifoInbox {
    /// An empty, unblocked inbox.
    pub const fn new() -> Self {
        Self {
            head: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Pushes `element`.
    ///
    /// Returns `UnblockedReader` exactly once per blocked-to-busy transition, and hands
    /// the element back when the inbox is closed.
    pub fn push_front(&self, element: MailboxElement) -> Result<InboxResult, MailboxElement> {
        let node = Box::into_raw(Box::new(Node {
            element,
            next: ptr::null_mut(),
        }));
        let mut head = self.head.load(Ordering::Acquire);
        loop {
            if head == CLOSED {
                // SAFETY: `node` was never published, we still own it exclusively.
                let node = unsafe { Box::from_raw(node) };
                return Err(node.element);
            }
            let next = if head == BLOCKED { ptr::null_mut() } else { head };
            // SAFETY: `node` is unpublished until the CAS below succeeds.
            unsafe { (*node).next = next };
            match self
                .head
                .compare_exchange_weak(head, node, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) if head == BLOCKED => return Ok(InboxResult::UnblockedReader),
                Ok(_) => return Ok(InboxResult::Success),
                Err(actual) => head = actual,
            }
        }
    }

    /// Detaches everything pushed so far and returns it oldest first.
    pub fn take_head(&self) -> Vec<MailboxElement> {
        let mut head = self.head.load(Ordering::Acquire);
        loop {
            if !is_node(head) {
                return Vec::new();
            }
            match self.head.compare_exchange_weak(
                head,
                ptr::null_mut(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                // SAFETY: the CAS unlinked the whole chain, nobody else can reach it.
                Ok(_) => return unsafe { drain_chain(head) },
                Err(actual) => head = actual,
            }
        }
    }

    /// Parks the consumer if the inbox is empty. Returns `true` when parked.
    pub fn try_block(&self) -> bool {
        match self.head.compare_exchange(
            ptr::null_mut(),
            BLOCKED,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => true,
            Err(actual) => actual == BLOCKED,
        }
    }

    /// Reverts [`try_block`](Self::try_block). Returns `true` if the inbox was blocked.
    pub fn try_unblock(&self) -> bool {
        self.head
            .compare_exchange(BLOCKED, ptr::null_mut(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Closes the inbox and returns whatever was still linked, oldest first.
    ///
    /// Every later push fails.
    pub fn close(&self) -> Vec<MailboxElement> {
        let head = self.head.swap(CLOSED, Ordering::AcqRel);
        if is_node(head) {
            // SAFETY: the swap unlinked the chain.
            unsafe { drain_chain(head) }
        } else {
            Vec::new()
        }
    }

    /// `true` while the consumer is parked.
    pub fn is_blocked(&self) -> bool {
        self.head.load(Ordering::Acquire) == BLOCKED
    }

    /// `true` once [`close`](Self::close) ran.
    pub fn is_closed(&self) -> bool {
        self.head.load(Ordering::Acquire) == CLOSED
    }

    /// `true` if no element is linked.
    pub fn is_empty(&self) -> bool {
        !is_node(self.head.load(Ordering::Acquire))
    }
}

impl Default for LifoInbox {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LifoInbox {
    fn drop(&mut self) {
        let head = std::mem::replace(self.head.get_mut(), CLOSED);
        if is_node(head) {
            // SAFETY: `&mut self` rules out concurrent producers.
            drop(unsafe { drain_chain(head) });
        }
    }
}

/// Frees a detached chain and returns its elements in push order.
///
/// # Safety
///
/// `head` must be the first node of a chain that is no longer reachable from any inbox.
unsafe fn drain_chain(mut head: *mut Node) -> Vec<MailboxElement> {
    let mut elements = Vec::new();
    while is_node(head) {
        let node = Box::from_raw(head);
        head = node.next;
        elements.push(node.element);
    }
    elements.reverse();
    elements
}
