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

use std::collections::{BTreeMap, VecDeque};

use tracing::trace;

use super::messages::{send_control, DownstreamContent, DownstreamMsg};
use super::{OutboundPath, StreamSlot};
use crate::actor::ActorHandle;
use crate::common::ActorError;
use crate::message::{Message, MessageType};

struct PathState<T> {
    path: OutboundPath,
    cache: VecDeque<T>,
}

/// Broadcasts produced elements to every outbound path under credit.
///
/// New elements land in a central buffer. Once every path has acknowledged its
/// handshake the buffer is copied into per-path caches, from which each path sends
/// batches as its own credit allows. The manager never sends more than a path's credit.
pub struct DownstreamManager<T> {
    buf: VecDeque<T>,
    paths: BTreeMap<StreamSlot, PathState<T>>,
    closing: bool,
}

impl<T: MessageType> DownstreamManager<T> {
    /// An empty manager.
    pub fn new() -> Self {
        Self {
            buf: VecDeque::new(),
            paths: BTreeMap::new(),
            closing: false,
        }
    }

    /// Adds a path keyed by its own slot.
    pub fn add_path(&mut self, path: OutboundPath) {
        self.paths.insert(
            path.slots.sender,
            PathState {
                path,
                cache: VecDeque::new(),
            },
        );
    }

    /// Removes a path and discards what it had cached.
    pub fn remove_path(&mut self, slot: StreamSlot) -> Option<OutboundPath> {
        self.paths.remove(&slot).map(|state| state.path)
    }

    /// The path owning `slot`.
    pub fn path(&self, slot: StreamSlot) -> Option<&OutboundPath> {
        self.paths.get(&slot).map(|state| &state.path)
    }

    /// Mutable access to the path owning `slot`.
    pub fn path_mut(&mut self, slot: StreamSlot) -> Option<&mut OutboundPath> {
        self.paths.get_mut(&slot).map(|state| &mut state.path)
    }

    /// Number of paths.
    pub fn num_paths(&self) -> usize {
        self.paths.len()
    }

    /// Slots of all paths.
    pub fn slots(&self) -> Vec<StreamSlot> {
        self.paths.keys().copied().collect()
    }

    /// `true` while some path awaits its handshake acknowledgement.
    pub fn has_pending_paths(&self) -> bool {
        self.paths.values().any(|state| state.path.pending())
    }

    /// The central buffer producers append to.
    pub fn buf_mut(&mut self) -> &mut VecDeque<T> {
        &mut self.buf
    }

    /// Elements not yet sent on the slowest path.
    pub fn buffered(&self) -> usize {
        self.buf.len()
            + self
                .paths
                .values()
                .map(|state| state.cache.len())
                .max()
                .unwrap_or(0)
    }

    /// How many more elements the producer should generate right now.
    pub fn capacity(&self) -> usize {
        if self.paths.is_empty() || self.has_pending_paths() {
            return 0;
        }
        let min_credit = self
            .paths
            .values()
            .map(|state| (state.path.open_credit as usize).saturating_sub(state.cache.len()))
            .min()
            .unwrap_or(0);
        min_credit.saturating_sub(self.buf.len())
    }

    /// Smallest capacity any consumer announced, minus what is already buffered.
    ///
    /// A stage caps the credit it grants upstream with this value.
    pub fn max_capacity(&self) -> u32 {
        let announced = self
            .paths
            .values()
            .map(|state| state.path.max_capacity)
            .min()
            .unwrap_or(0);
        announced.saturating_sub(u32::try_from(self.buffered()).unwrap_or(u32::MAX))
    }

    /// `true` if every path is out of credit or still pending.
    pub fn stalled(&self) -> bool {
        !self.paths.is_empty()
            && self
                .paths
                .values()
                .all(|state| state.path.pending() || state.path.open_credit == 0)
    }

    /// `true` if nothing is buffered and every batch has been acknowledged.
    pub fn clean(&self) -> bool {
        self.buf.is_empty()
            && self
                .paths
                .values()
                .all(|state| state.cache.is_empty() && state.path.clean())
    }

    /// `true` once [`close`](Self::close) was called.
    pub fn closing(&self) -> bool {
        self.closing
    }

    /// Sends as many batches as credit allows.
    pub fn emit_batches(&mut self, sender: &ActorHandle) {
        if !self.buf.is_empty() && !self.paths.is_empty() && !self.has_pending_paths() {
            let produced: Vec<T> = self.buf.drain(..).collect();
            for state in self.paths.values_mut() {
                state.cache.extend(produced.iter().cloned());
            }
        }
        for state in self.paths.values_mut() {
            while let Some((id, size)) = state.path.take_batch(state.cache.len()) {
                let xs: Vec<T> = state.cache.drain(..size).collect();
                trace!(slot = %state.path.slots.sender, id, size, "emitting batch");
                if let Some(target) = &state.path.target {
                    send_control(
                        sender,
                        target,
                        Message::new(DownstreamMsg {
                            slots: state.path.slots,
                            content: DownstreamContent::Batch {
                                xs_size: size as u32,
                                xs: Message::new(xs),
                                id,
                            },
                        }),
                    );
                }
            }
        }
        if self.closing {
            self.close_clean_paths(sender);
        }
    }

    /// Starts a regular shutdown: every path is closed once its data is acknowledged.
    pub fn close(&mut self, sender: &ActorHandle) {
        self.closing = true;
        self.close_clean_paths(sender);
    }

    fn close_clean_paths(&mut self, sender: &ActorHandle) {
        if !self.buf.is_empty() {
            return;
        }
        let done: Vec<StreamSlot> = self
            .paths
            .iter()
            .filter(|(_, state)| {
                !state.path.pending() && state.cache.is_empty() && state.path.clean()
            })
            .map(|(slot, _)| *slot)
            .collect();
        for slot in done {
            if let Some(state) = self.paths.remove(&slot) {
                if let Some(target) = &state.path.target {
                    send_control(
                        sender,
                        target,
                        Message::new(DownstreamMsg {
                            slots: state.path.slots,
                            content: DownstreamContent::Close,
                        }),
                    );
                }
            }
        }
    }

    /// Aborts every path with `reason` and discards buffered data.
    pub fn abort(&mut self, sender: &ActorHandle, reason: &ActorError) {
        self.buf.clear();
        for (_, state) in std::mem::take(&mut self.paths) {
            if let Some(target) = &state.path.target {
                send_control(
                    sender,
                    target,
                    Message::new(DownstreamMsg {
                        slots: state.path.slots,
                        content: DownstreamContent::ForcedClose {
                            reason: reason.clone(),
                        },
                    }),
                );
            }
        }
    }
}

impl<T: MessageType> Default for DownstreamManager<T> {
    fn default() -> Self {
        Self::new()
    }
}
