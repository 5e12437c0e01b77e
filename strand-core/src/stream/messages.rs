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

use strand_macro::strand_message;

use super::{StreamSlot, StreamSlots};
use crate::actor::ActorHandle;
use crate::common::ActorError;
use crate::message::{MailboxElement, Message, MessageId};

/// Handshake offering a stream to the next hop of a pipeline.
#[strand_message]
pub struct OpenStreamMsg {
    /// Slot of the offering leg.
    pub slot: StreamSlot,
    /// The handshake content, starting with a [`Stream`](super::Stream) token.
    pub msg: Message,
    /// Actor that receives the acknowledgement.
    pub prev_stage: ActorHandle,
    /// Source at the head of the pipeline.
    pub original_stage: ActorHandle,
}

/// Control traffic flowing from a consumer back to its producer.
#[strand_message]
pub struct UpstreamMsg {
    /// Slots seen from the consumer.
    pub slots: StreamSlots,
    /// The control payload.
    pub content: UpstreamContent,
}

/// Payload of an [`UpstreamMsg`].
#[derive(Debug, Clone)]
pub enum UpstreamContent {
    /// The consumer accepted the handshake.
    AckOpen {
        /// Actor the producer sends batches to.
        rebind_to: ActorHandle,
        /// Credit granted up front.
        initial_demand: u32,
        /// Preferred batch size.
        desired_batch_size: u32,
        /// Credit the consumer can hold at most.
        max_capacity: u32,
    },
    /// The consumer processed batches and grants more credit.
    AckBatch {
        /// Additional credit.
        new_capacity: u32,
        /// Preferred batch size.
        desired_batch_size: u32,
        /// One past the id of the last batch processed.
        next_ack_id: u64,
        /// Credit the consumer can hold at most.
        max_capacity: u32,
    },
    /// The consumer no longer wants data.
    Drop,
    /// The consumer failed; the producer must abort.
    ForcedDrop {
        /// The failure.
        reason: ActorError,
    },
}

/// Data and close signals flowing from a producer to its consumer.
#[strand_message]
pub struct DownstreamMsg {
    /// Slots seen from the producer.
    pub slots: StreamSlots,
    /// The payload.
    pub content: DownstreamContent,
}

/// Payload of a [`DownstreamMsg`].
#[derive(Debug, Clone)]
pub enum DownstreamContent {
    /// A batch of elements; `xs` holds one `Vec<T>`.
    Batch {
        /// Number of elements.
        xs_size: u32,
        /// The elements.
        xs: Message,
        /// Sequence number of the batch on its path.
        id: u64,
    },
    /// Regular end of the stream.
    Close,
    /// The producer failed; the consumer must abort.
    ForcedClose {
        /// The failure.
        reason: ActorError,
    },
}

/// Sends stream control traffic from `from` to `to`.
pub(crate) fn send_control(from: &ActorHandle, to: &ActorHandle, content: Message) {
    to.enqueue(MailboxElement::new(
        Some(from.downgrade()),
        MessageId::make(),
        content,
    ));
}
