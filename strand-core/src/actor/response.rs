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

use parking_lot::Mutex;
use tokio::sync::oneshot::{self, error::TryRecvError};
use tracing::trace;

use super::{AbstractActor, ActorHandle, Attachable};
use crate::common::{ActorError, ActorId, ExitReason};
use crate::mailbox::InboxResult;
use crate::message::{MailboxElement, Message, MessageId, MessageType, Priority};

type ReplySender = oneshot::Sender<Result<Message, ActorError>>;

/// Splits a reply into success and the error channel.
pub(crate) fn into_result(content: Message) -> Result<Message, ActorError> {
    if content.is::<ActorError>() {
        Err(content
            .take::<ActorError>(0)
            .unwrap_or(ActorError::UnexpectedResponse))
    } else {
        Ok(content)
    }
}

/// One-shot mailbox owner that receives the reply of an external request.
struct ResponseEndpoint {
    id: ActorId,
    reply: Mutex<Option<ReplySender>>,
}

impl AbstractActor for ResponseEndpoint {
    fn id(&self) -> ActorId {
        self.id
    }

    fn name(&self) -> &str {
        "request"
    }

    fn enqueue(&self, element: MailboxElement) -> InboxResult {
        if !element.mid.is_response() {
            trace!(mid = ?element.mid, "reply endpoint ignores non-response");
            return InboxResult::Success;
        }
        match self.reply.lock().take() {
            Some(reply) => {
                let _ = reply.send(into_result(element.content));
                InboxResult::Success
            }
            None => InboxResult::QueueClosed,
        }
    }

    fn attach(&self, attachable: Attachable) {
        attachable.fire(self.id, &ExitReason::Normal);
    }

    fn exit_reason(&self) -> Option<ExitReason> {
        self.reply.lock().is_none().then_some(ExitReason::Normal)
    }
}

/// The reply side of a request sent from outside any actor.
///
/// Dropping it cancels interest: the receiver still handles the request, and its reply
/// is discarded because the reply endpoint no longer exists.
pub struct PendingRequest {
    // Keeps the reply endpoint alive; the request only holds a weak reference to it.
    _endpoint: Arc<ResponseEndpoint>,
    receiver: oneshot::Receiver<Result<Message, ActorError>>,
    mid: MessageId,
}

impl PendingRequest {
    pub(crate) fn send(target: &ActorHandle, content: Message, priority: Priority) -> Self {
        let (reply, receiver) = oneshot::channel();
        let endpoint = Arc::new(ResponseEndpoint {
            id: ActorId::next(),
            reply: Mutex::new(Some(reply)),
        });
        let mid = MessageId::next_request(priority);
        let sender = ActorHandle::new(endpoint.clone()).downgrade();
        target.enqueue(MailboxElement::new(Some(sender), mid, content));
        Self {
            _endpoint: endpoint,
            receiver,
            mid,
        }
    }

    /// The request id.
    pub fn id(&self) -> MessageId {
        self.mid
    }

    /// The reply, if it has arrived.
    pub fn try_receive(&mut self) -> Option<Result<Message, ActorError>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(Err(ActorError::UnexpectedResponse)),
        }
    }

    /// The reply as a single `T`, if it has arrived.
    pub fn try_receive_value<T: MessageType>(&mut self) -> Option<Result<T, ActorError>> {
        self.try_receive().map(|result| {
            result.and_then(|message| message.take::<T>(0).ok_or(ActorError::UnexpectedResponse))
        })
    }

    /// Waits up to `timeout` for the reply.
    ///
    /// Missing the deadline yields [`ActorError::RequestTimeout`], the same channel
    /// every other failure uses.
    pub async fn receive(self, timeout: Duration) -> Result<Message, ActorError> {
        match tokio::time::timeout(timeout, self.receiver).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ActorError::UnexpectedResponse),
            Err(_) => Err(ActorError::RequestTimeout),
        }
    }

    /// Waits up to `timeout` for a reply consisting of a single `T`.
    pub async fn receive_value<T: MessageType>(self, timeout: Duration) -> Result<T, ActorError> {
        self.receive(timeout)
            .await?
            .take::<T>(0)
            .ok_or(ActorError::UnexpectedResponse)
    }
}
