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

use tracing::{debug, trace};

use super::Mailbox;
use crate::common::{ActorError, ExitReason};
use crate::message::{MailboxElement, Message};
use crate::stream::{
    DownstreamContent, DownstreamMsg, OpenStreamMsg, StreamSlot, StreamSlots, UpstreamContent,
    UpstreamMsg,
};

/// Answers everything left in a dead actor's mailbox.
///
/// Requests receive an [`ActorError::RequestReceiverDown`] reply. Stream traffic is
/// answered as well, so the peer of a stream never waits on a dead endpoint: handshakes
/// and batches get a forced drop, handshake acknowledgements get a forced close.
/// Everything else, including credit sent to a finished producer, is discarded.
#[derive(Debug, Clone)]
pub struct RequestBouncer {
    reason: ExitReason,
}

impl RequestBouncer {
    /// A bouncer replying with `reason`.
    pub const fn new(reason: ExitReason) -> Self {
        Self { reason }
    }

    /// Closes `mailbox` and bounces everything it still held.
    ///
    /// Returns the number of elements drained.
    pub fn bounce_mailbox(&self, mailbox: &Mailbox) -> usize {
        let leftovers = mailbox.close(self.reason.clone());
        let count = leftovers.len();
        for element in leftovers {
            self.bounce(element);
        }
        if count > 0 {
            debug!(count, reason = %self.reason, "bounced mailbox content");
        }
        count
    }

    /// Bounces a single element.
    pub fn bounce(&self, element: MailboxElement) {
        if element.mid.is_request() && !element.mid.is_answered() {
            self.bounce_request(element);
        } else if let Some(open) = element.content.get::<OpenStreamMsg>(0) {
            let reply = UpstreamMsg {
                slots: StreamSlots::new(StreamSlot::INVALID, open.slot),
                content: UpstreamContent::ForcedDrop {
                    reason: self.error(),
                },
            };
            open.prev_stage.tell(reply);
        } else if let Some(msg) = element.content.get::<DownstreamMsg>(0) {
            if matches!(msg.content, DownstreamContent::Batch { .. }) {
                if let Some(sender) = element.sender_handle() {
                    sender.tell(UpstreamMsg {
                        slots: msg.slots.invert(),
                        content: UpstreamContent::ForcedDrop {
                            reason: self.error(),
                        },
                    });
                }
            }
        } else if let Some(msg) = element.content.get::<UpstreamMsg>(0) {
            if matches!(msg.content, UpstreamContent::AckOpen { .. }) {
                if let Some(sender) = element.sender_handle() {
                    sender.tell(DownstreamMsg {
                        slots: msg.slots.invert(),
                        content: DownstreamContent::ForcedClose {
                            reason: self.error(),
                        },
                    });
                }
            }
        } else {
            trace!(mid = ?element.mid, "discarding message for terminated actor");
        }
    }

    fn bounce_request(&self, element: MailboxElement) {
        let Some(sender) = element.sender_handle() else {
            trace!(mid = ?element.mid, "requester is gone, dropping bounced request");
            return;
        };
        let reply = MailboxElement::new(None, element.mid.response_id(), Message::new(self.error()));
        sender.enqueue(reply);
    }

    fn error(&self) -> ActorError {
        ActorError::RequestReceiverDown(self.reason.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::actor::ActorCell;
    use crate::behavior::Behavior;
    use crate::common::CoreConfig;
    use crate::message::MessageId;
    use crate::testing::TestScheduler;

    fn upstream(producer: &crate::actor::ActorHandle, content: UpstreamContent) -> MailboxElement {
        let msg = UpstreamMsg {
            slots: StreamSlots::new(StreamSlot(1), StreamSlot(2)),
            content,
        };
        MailboxElement::new(Some(producer.downgrade()), MessageId::make(), Message::new(msg))
    }

    #[test]
    fn only_handshake_acks_are_answered() {
        let scheduler = TestScheduler::new();
        let producer = ActorCell::spawn(
            scheduler.clone(),
            Arc::new(CoreConfig::default()),
            "producer",
            |_ctx| Behavior::empty(),
        );
        scheduler.run();
        let scheduled = scheduler.schedule_count(producer.id());
        let bouncer = RequestBouncer::new(ExitReason::Normal);

        bouncer.bounce(upstream(
            &producer,
            UpstreamContent::AckBatch {
                new_capacity: 5,
                desired_batch_size: 5,
                next_ack_id: 1,
                max_capacity: 10,
            },
        ));
        assert_eq!(scheduler.schedule_count(producer.id()), scheduled);

        bouncer.bounce(upstream(
            &producer,
            UpstreamContent::AckOpen {
                rebind_to: producer.clone(),
                initial_demand: 5,
                desired_batch_size: 5,
                max_capacity: 10,
            },
        ));
        assert_eq!(scheduler.schedule_count(producer.id()), scheduled + 1);
    }
}
