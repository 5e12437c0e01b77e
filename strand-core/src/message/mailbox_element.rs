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

use derive_new::new;

use crate::actor::{ActorHandle, WeakActorHandle};
use crate::message::{Message, MessageId, Priority};

/// The envelope a mailbox stores.
///
/// The mailbox owns the element until the receiver dequeues it; the receiver then owns
/// it exclusively for the duration of dispatch.
#[derive(new, Debug)]
pub struct MailboxElement {
    /// Where replies go; weak so a pending message never keeps its sender alive.
    pub sender: Option<WeakActorHandle>,
    /// Correlation id, priority and request/response flags.
    pub mid: MessageId,
    /// Remaining hops of a relay chain; the next hop is the last entry.
    #[new(default)]
    pub stages: Vec<ActorHandle>,
    /// The payload.
    pub content: Message,
}

impl MailboxElement {
    /// A fire-and-forget element without a sender.
    pub fn anonymous(content: Message) -> Self {
        Self::new(None, MessageId::make(), content)
    }

    /// Builder-style replacement of the forwarding stack.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<ActorHandle>) -> Self {
        self.stages = stages;
        self
    }

    /// Sub-queue this element belongs to.
    pub fn priority(&self) -> Priority {
        self.mid.priority()
    }

    /// Upgrades the sender, if it is still alive.
    pub fn sender_handle(&self) -> Option<ActorHandle> {
        self.sender.as_ref().and_then(WeakActorHandle::upgrade)
    }
}
