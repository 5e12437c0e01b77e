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
use std::marker::PhantomData;

use crate::message::MessageType;

/// Local identifier of one leg of a stream inside one actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct StreamSlot(pub u16);

impl StreamSlot {
    /// The slot of a leg whose peer has not answered the handshake yet.
    pub const INVALID: Self = Self(0);

    /// `true` for any slot but [`INVALID`](Self::INVALID).
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for StreamSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot:{}", self.0)
    }
}

/// The pair of slots identifying a path, seen from the sender of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StreamSlots {
    /// Slot on the sending side.
    pub sender: StreamSlot,
    /// Slot on the receiving side.
    pub receiver: StreamSlot,
}

impl StreamSlots {
    /// Builds a pair.
    pub const fn new(sender: StreamSlot, receiver: StreamSlot) -> Self {
        Self { sender, receiver }
    }

    /// The same pair seen from the other side.
    #[must_use]
    pub const fn invert(self) -> Self {
        Self {
            sender: self.receiver,
            receiver: self.sender,
        }
    }
}

/// Typed handshake token for a stream of `T`.
///
/// A source sends it inside its handshake. The receiving actor matches it like any other
/// message and passes it to `make_sink`, `make_stage` or `attach_input` to accept the
/// stream.
pub struct Stream<T> {
    slot: StreamSlot,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Stream<T> {
    pub(crate) const fn new(slot: StreamSlot) -> Self {
        Self {
            slot,
            _marker: PhantomData,
        }
    }

    /// The slot of the upstream leg that offered this stream.
    pub const fn slot(&self) -> StreamSlot {
        self.slot
    }
}

impl<T> Clone for Stream<T> {
    fn clone(&self) -> Self {
        Self::new(self.slot)
    }
}

impl<T> fmt::Debug for Stream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Stream<{}>({})", std::any::type_name::<T>(), self.slot)
    }
}

impl<T: MessageType> MessageType for Stream<T> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invert_swaps_sides() {
        let slots = StreamSlots::new(StreamSlot(1), StreamSlot(7));
        assert_eq!(slots.invert(), StreamSlots::new(StreamSlot(7), StreamSlot(1)));
        assert_eq!(slots.invert().invert(), slots);
        assert!(!StreamSlot::INVALID.is_valid());
    }
}
