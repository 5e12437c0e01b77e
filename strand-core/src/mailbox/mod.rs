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

pub use bouncer::RequestBouncer;
pub use lifo_inbox::LifoInbox;
pub use mailbox::Mailbox;

/// Drains terminated mailboxes into error replies.
mod bouncer;
/// The lock-free multi-producer stack underneath every mailbox.
#[allow(unsafe_code)]
mod lifo_inbox;
/// FIFO and priority ordering on the consumer side.
#[allow(clippy::module_inception)]
mod mailbox;

/// Outcome of an enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboxResult {
    /// The element was stored; the receiver is already running or scheduled.
    Success,
    /// The element was stored and the receiver was parked; the caller must schedule it.
    UnblockedReader,
    /// The receiver has terminated; the element was not stored.
    QueueClosed,
}
