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
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

use static_assertions::assert_impl_all;
use tracing::trace;

use super::PendingRequest;
use crate::common::{ActorId, ExitReason};
use crate::mailbox::InboxResult;
use crate::message::{DownMsg, ExitMsg, IntoMessage, MailboxElement, MessageId, Priority};

/// The control block behind every handle.
///
/// Implemented by [`ActorCell`](super::ActorCell) and by the reply endpoints of
/// external requests.
pub trait AbstractActor: Send + Sync + 'static {
    /// Process-unique id.
    fn id(&self) -> ActorId;

    /// Diagnostic name.
    fn name(&self) -> &str;

    /// Delivers `element`. Never blocks.
    fn enqueue(&self, element: MailboxElement) -> InboxResult;

    /// Registers an observer that fires when this actor exits, or immediately if it
    /// already has.
    fn attach(&self, attachable: Attachable);

    /// The exit reason once terminated.
    fn exit_reason(&self) -> Option<ExitReason>;
}

/// An observer of another actor's exit.
#[derive(Debug, Clone)]
pub enum Attachable {
    /// Receives a [`DownMsg`].
    Monitor(WeakActorHandle),
    /// Receives an [`ExitMsg`].
    Link(WeakActorHandle),
}

impl Attachable {
    pub(crate) fn fire(self, source: ActorId, reason: &ExitReason) {
        match self {
            Self::Monitor(observer) => {
                if let Some(observer) = observer.upgrade() {
                    observer.tell(DownMsg {
                        source,
                        reason: reason.clone(),
                    });
                }
            }
            Self::Link(peer) => {
                if let Some(peer) = peer.upgrade() {
                    peer.tell_with_priority(
                        ExitMsg {
                            source: Some(source),
                            reason: reason.clone(),
                        },
                        Priority::High,
                    );
                }
            }
        }
    }
}

/// A strong, cloneable reference to an actor.
///
/// Strong handles keep the control block alive. Handles compare and hash by actor id.
#[derive(Clone)]
pub struct ActorHandle {
    inner: Arc<dyn AbstractActor>,
}

assert_impl_all!(ActorHandle: Send, Sync);

impl ActorHandle {
    /// Wraps a control block.
    pub fn new(inner: Arc<dyn AbstractActor>) -> Self {
        Self { inner }
    }

    /// The actor's id.
    pub fn id(&self) -> ActorId {
        self.inner.id()
    }

    /// The actor's name.
    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// Delivers a prepared element.
    pub fn enqueue(&self, element: MailboxElement) -> InboxResult {
        self.inner.enqueue(element)
    }

    /// Sends `values` without a sender and without expecting a reply.
    pub fn tell(&self, values: impl IntoMessage) -> InboxResult {
        self.tell_with_priority(values, Priority::Normal)
    }

    /// Like [`tell`](Self::tell) with an explicit priority.
    pub fn tell_with_priority(&self, values: impl IntoMessage, priority: Priority) -> InboxResult {
        let element = MailboxElement::new(
            None,
            MessageId::with_priority_of(priority),
            values.into_message(),
        );
        trace!(target_actor = %self, "tell");
        self.enqueue(element)
    }

    /// Sends `values` as a request from outside any actor.
    ///
    /// The returned [`PendingRequest`] receives the reply, an error reply, or nothing if
    /// it is dropped first.
    pub fn request(&self, values: impl IntoMessage) -> PendingRequest {
        PendingRequest::send(self, values.into_message(), Priority::Normal)
    }

    /// Asks the actor to exit with `reason`.
    pub fn exit(&self, reason: ExitReason) -> InboxResult {
        self.tell_with_priority(ExitMsg { source: None, reason }, Priority::High)
    }

    /// A weak handle to the same actor.
    pub fn downgrade(&self) -> WeakActorHandle {
        WeakActorHandle {
            id: self.id(),
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Registers an exit observer.
    pub fn attach(&self, attachable: Attachable) {
        self.inner.attach(attachable);
    }

    /// The exit reason once terminated.
    pub fn exit_reason(&self) -> Option<ExitReason> {
        self.inner.exit_reason()
    }

    /// `true` once the actor terminated.
    pub fn is_terminated(&self) -> bool {
        self.exit_reason().is_some()
    }
}

impl PartialEq for ActorHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for ActorHandle {}

impl Hash for ActorHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Display for ActorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name(), self.id())
    }
}

impl fmt::Debug for ActorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActorHandle({self})")
    }
}

/// A non-owning reference to an actor.
#[derive(Clone)]
pub struct WeakActorHandle {
    id: ActorId,
    inner: Weak<dyn AbstractActor>,
}

impl WeakActorHandle {
    /// The actor's id, available even after it is gone.
    pub fn id(&self) -> ActorId {
        self.id
    }

    /// A strong handle, if the control block is still alive.
    pub fn upgrade(&self) -> Option<ActorHandle> {
        self.inner.upgrade().map(ActorHandle::new)
    }

    /// `true` while some strong handle exists.
    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

impl PartialEq for WeakActorHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for WeakActorHandle {}

impl fmt::Debug for WeakActorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WeakActorHandle({})", self.id)
    }
}

impl crate::message::MessageType for ActorHandle {}
