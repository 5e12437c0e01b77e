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
use std::time::Duration;

use super::credit::{CreditAssignment, CreditController};
use super::{StreamSlot, StreamSlots};
use crate::actor::ActorHandle;

/// Credit bookkeeping of a producer towards one consumer.
#[derive(Debug, Clone)]
pub struct OutboundPath {
    /// Our slot and the consumer's slot (invalid until the handshake is acknowledged).
    pub slots: StreamSlots,
    /// The consumer.
    pub target: Option<ActorHandle>,
    /// Elements we may still send.
    pub open_credit: u32,
    /// Batch size the consumer prefers.
    pub desired_batch_size: u32,
    /// Credit the consumer can hold at most.
    pub max_capacity: u32,
    /// Id of the next batch we send.
    pub next_batch_id: u64,
    /// One past the id of the last batch the consumer acknowledged.
    pub next_ack_id: u64,
}

impl OutboundPath {
    /// A path waiting for its handshake acknowledgement.
    pub fn new(slot: StreamSlot, target: Option<ActorHandle>) -> Self {
        Self {
            slots: StreamSlots::new(slot, StreamSlot::INVALID),
            target,
            open_credit: 0,
            desired_batch_size: 1,
            max_capacity: 0,
            next_batch_id: 0,
            next_ack_id: 0,
        }
    }

    /// `true` until the consumer acknowledged the handshake.
    pub fn pending(&self) -> bool {
        !self.slots.receiver.is_valid()
    }

    /// `true` when every batch sent has been acknowledged.
    pub fn clean(&self) -> bool {
        self.next_ack_id == self.next_batch_id
    }

    /// Applies a handshake acknowledgement.
    pub fn handle_ack_open(
        &mut self,
        receiver: StreamSlot,
        rebind_to: ActorHandle,
        initial_demand: u32,
        desired_batch_size: u32,
        max_capacity: u32,
    ) {
        self.slots.receiver = receiver;
        self.target = Some(rebind_to);
        self.open_credit = self.open_credit.saturating_add(initial_demand);
        self.desired_batch_size = desired_batch_size.max(1);
        self.max_capacity = max_capacity;
    }

    /// Applies a batch acknowledgement.
    pub fn handle_ack_batch(
        &mut self,
        new_capacity: u32,
        desired_batch_size: u32,
        next_ack_id: u64,
        max_capacity: u32,
    ) {
        self.open_credit = self.open_credit.saturating_add(new_capacity);
        self.desired_batch_size = desired_batch_size.max(1);
        self.next_ack_id = self.next_ack_id.max(next_ack_id.min(self.next_batch_id));
        self.max_capacity = max_capacity;
    }

    /// Reserves the next batch out of `available` buffered elements.
    ///
    /// Returns the batch id and size, or `None` when there is no credit or no data.
    pub fn take_batch(&mut self, available: usize) -> Option<(u64, usize)> {
        if self.pending() {
            return None;
        }
        let size = available
            .min(self.open_credit as usize)
            .min(self.desired_batch_size as usize);
        if size == 0 {
            return None;
        }
        self.open_credit -= size as u32;
        let id = self.next_batch_id;
        self.next_batch_id += 1;
        Some((id, size))
    }
}

/// An acknowledgement an inbound path wants to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckBatch {
    /// Additional credit.
    pub new_capacity: u32,
    /// Preferred batch size.
    pub desired_batch_size: u32,
    /// One past the id of the last batch processed.
    pub next_ack_id: u64,
    /// Total credit the upstream may hold.
    pub max_capacity: u32,
}

/// Credit bookkeeping of a consumer towards one producer.
pub struct InboundPath {
    /// The producer's slot and ours.
    pub slots: StreamSlots,
    /// The producer.
    pub source: Option<ActorHandle>,
    assigned_credit: u32,
    desired_batch_size: u32,
    next_batch_id: u64,
    next_ack_id: u64,
    controller: Box<dyn CreditController>,
}

impl InboundPath {
    /// A path fed by `source` and governed by `controller`.
    pub fn new(
        slots: StreamSlots,
        source: Option<ActorHandle>,
        controller: Box<dyn CreditController>,
    ) -> Self {
        Self {
            slots,
            source,
            assigned_credit: 0,
            desired_batch_size: 1,
            next_batch_id: 0,
            next_ack_id: 0,
            controller,
        }
    }

    /// Credit granted and not yet consumed by received batches.
    pub fn assigned_credit(&self) -> u32 {
        self.assigned_credit
    }

    /// `true` when every received batch has been acknowledged.
    pub fn up_to_date(&self) -> bool {
        self.next_ack_id == self.next_batch_id
    }

    /// The assignment sent with the handshake acknowledgement.
    pub fn open(&mut self) -> CreditAssignment {
        let assignment = self.controller.initial();
        self.assigned_credit = assignment.credit;
        self.desired_batch_size = assignment.batch_size.max(1);
        assignment
    }

    /// Records an incoming batch of `size` elements with sequence number `id`.
    pub fn handle_batch(&mut self, size: u32, id: u64) {
        self.assigned_credit = self.assigned_credit.saturating_sub(size);
        self.next_batch_id = self.next_batch_id.max(id + 1);
        self.controller.before_processing(size as usize);
    }

    /// Records how long the last batch took.
    pub fn after_processing(&mut self, elapsed: Duration) {
        self.controller.after_processing(elapsed);
    }

    /// Computes the next acknowledgement.
    ///
    /// `downstream_capacity` caps the total credit (a stage passes what its own
    /// consumers can take). Returns `None` when there is neither credit to grant nor an
    /// unacknowledged batch.
    pub fn emit_ack(&mut self, downstream_capacity: u32) -> Option<AckBatch> {
        let assignment = self.controller.compute();
        self.desired_batch_size = assignment.batch_size.max(1);
        let max_capacity = assignment.credit.min(downstream_capacity);
        let credit = max_capacity.saturating_sub(self.assigned_credit);
        if credit == 0 && self.up_to_date() {
            return None;
        }
        self.assigned_credit = self.assigned_credit.saturating_add(credit);
        self.next_ack_id = self.next_batch_id;
        Some(AckBatch {
            new_capacity: credit,
            desired_batch_size: self.desired_batch_size,
            next_ack_id: self.next_ack_id,
            max_capacity,
        })
    }

    /// Grants `extra` credit outside the regular cycle, up to `ceiling` outstanding.
    pub fn grant(&mut self, extra: u32, ceiling: u32) -> Option<AckBatch> {
        let credit = extra.min(ceiling.saturating_sub(self.assigned_credit));
        if credit == 0 {
            return None;
        }
        self.assigned_credit += credit;
        self.next_ack_id = self.next_batch_id;
        Some(AckBatch {
            new_capacity: credit,
            desired_batch_size: self.desired_batch_size,
            next_ack_id: self.next_ack_id,
            max_capacity: ceiling,
        })
    }
}

impl fmt::Debug for InboundPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboundPath")
            .field("slots", &self.slots)
            .field("assigned_credit", &self.assigned_credit)
            .field("next_batch_id", &self.next_batch_id)
            .field("next_ack_id", &self.next_ack_id)
            .finish()
    }
}
