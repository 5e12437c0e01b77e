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

use std::collections::HashMap;

use tracing::{debug, trace};

use super::manager::{StreamEnv, StreamManager};
use super::messages::{
    send_control, DownstreamContent, DownstreamMsg, UpstreamContent, UpstreamMsg,
};
use super::StreamSlot;
use crate::actor::ActorHandle;
use crate::common::ActorError;
use crate::message::Message;

/// The stream managers of one actor, addressable by any of their slots.
#[derive(Default)]
pub(crate) struct StreamRegistry {
    managers: HashMap<u32, Box<dyn StreamManager>>,
    slots: HashMap<StreamSlot, u32>,
    last_slot: u16,
    last_key: u32,
}

impl StreamRegistry {
    /// Allocates a slot that no live path of this actor uses.
    pub(crate) fn next_slot(&mut self) -> StreamSlot {
        loop {
            self.last_slot = self.last_slot.wrapping_add(1);
            let slot = StreamSlot(self.last_slot);
            if slot.is_valid() && !self.slots.contains_key(&slot) {
                return slot;
            }
        }
    }

    /// Registers `manager` under `slots` and returns its key.
    pub(crate) fn add(&mut self, manager: Box<dyn StreamManager>, slots: &[StreamSlot]) -> u32 {
        self.last_key += 1;
        let key = self.last_key;
        self.managers.insert(key, manager);
        for slot in slots {
            self.slots.insert(*slot, key);
        }
        key
    }

    /// Routes traffic for `slot` to the manager behind `key` as well.
    pub(crate) fn bind(&mut self, slot: StreamSlot, key: u32) {
        self.slots.insert(slot, key);
    }

    pub(crate) fn key_of(&self, slot: StreamSlot) -> Option<u32> {
        self.slots.get(&slot).copied()
    }

    pub(crate) fn manager_mut(&mut self, key: u32) -> Option<&mut Box<dyn StreamManager>> {
        self.managers.get_mut(&key)
    }

    /// The manager owning `slot`.
    pub(crate) fn by_slot(&mut self, slot: StreamSlot) -> Option<&mut Box<dyn StreamManager>> {
        let key = self.key_of(slot)?;
        self.managers.get_mut(&key)
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.managers.is_empty()
    }

    /// Dispatches control traffic from a consumer.
    pub(crate) fn handle_upstream(
        &mut self,
        env: &StreamEnv<'_>,
        msg: UpstreamMsg,
        sender: Option<ActorHandle>,
    ) {
        let slot = msg.slots.receiver;
        match self.by_slot(slot) {
            Some(manager) => manager.handle_upstream(env, msg.slots, msg.content),
            None => match msg.content {
                UpstreamContent::Drop | UpstreamContent::ForcedDrop { .. } => {
                    trace!(%slot, "drop for unknown slot");
                }
                // Credit may still be in flight after the path closed.
                UpstreamContent::AckBatch { .. } => {
                    trace!(%slot, "ack for unknown slot");
                }
                UpstreamContent::AckOpen { .. } => {
                    debug!(%slot, "handshake ack for unknown slot");
                    if let Some(sender) = sender {
                        send_control(
                            env.me,
                            &sender,
                            Message::new(DownstreamMsg {
                                slots: msg.slots.invert(),
                                content: DownstreamContent::ForcedClose {
                                    reason: ActorError::InvalidStreamState,
                                },
                            }),
                        );
                    }
                }
            },
        }
        self.collect();
    }

    /// Dispatches data and close signals from a producer.
    pub(crate) fn handle_downstream(
        &mut self,
        env: &StreamEnv<'_>,
        msg: DownstreamMsg,
        sender: Option<ActorHandle>,
    ) {
        let slot = msg.slots.receiver;
        match self.by_slot(slot) {
            Some(manager) => manager.handle_downstream(env, msg.slots, msg.content),
            None => match msg.content {
                DownstreamContent::Batch { .. } => {
                    debug!(%slot, "batch for unknown slot");
                    if let Some(sender) = sender {
                        send_control(
                            env.me,
                            &sender,
                            Message::new(UpstreamMsg {
                                slots: msg.slots.invert(),
                                content: UpstreamContent::ForcedDrop {
                                    reason: ActorError::InvalidStreamState,
                                },
                            }),
                        );
                    }
                }
                _ => trace!(%slot, "close for unknown slot"),
            },
        }
        self.collect();
    }

    /// Lets every manager that is not waiting for credit or input make progress.
    pub(crate) fn generate_all(&mut self, env: &StreamEnv<'_>) {
        for manager in self.managers.values_mut() {
            if !manager.idle() {
                manager.generate(env);
            }
        }
        self.collect();
    }

    /// Shuts every manager down.
    pub(crate) fn stop_all(&mut self, env: &StreamEnv<'_>, reason: Option<ActorError>) {
        for manager in self.managers.values_mut() {
            manager.stop(env, reason.clone());
        }
        self.managers.clear();
        self.slots.clear();
    }

    /// Drops finalized managers and the slots pointing at them.
    pub(crate) fn collect(&mut self) {
        let before = self.managers.len();
        self.managers.retain(|_, manager| !manager.finalized());
        if self.managers.len() != before {
            let managers = &self.managers;
            self.slots.retain(|_, key| managers.contains_key(key));
        }
    }
}
