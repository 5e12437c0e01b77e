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

//! Credit-based streaming between actors.
//!
//! A pipeline is a source, any number of stages and a sink. The source opens it by
//! sending a handshake to the first hop; each hop accepts the offered [`Stream`] token by
//! creating its own role and forwards a new handshake to the next hop. Consumers grant
//! credit; producers never send more elements than they were granted.
//!
//! Roles are defined by driver traits. The runtime owns the buffering, the credit
//! bookkeeping and the close/abort protocol; a driver only produces, transforms or
//! consumes elements and gets a single `finalize` call at the end.

use std::collections::VecDeque;

pub use credit::{
    controller_for, CreditAssignment, CreditController, FixedCreditController,
    HeuristicCreditController,
};
pub use downstream::DownstreamManager;
pub use messages::{DownstreamContent, DownstreamMsg, OpenStreamMsg, UpstreamContent, UpstreamMsg};
pub use path::{AckBatch, InboundPath, OutboundPath};
pub use slot::{Stream, StreamSlot, StreamSlots};

pub(crate) use manager::{SinkManager, SourceManager, StageManager, StreamEnv, StreamManager};
pub(crate) use messages::send_control;
pub(crate) use registry::StreamRegistry;

use crate::common::ActorError;
use crate::message::MessageType;

/// Credit controllers.
mod credit;
/// Broadcasting outbound buffer.
mod downstream;
/// Source, sink and stage managers.
mod manager;
/// Handshake, data and control messages.
mod messages;
/// Per-path credit bookkeeping.
mod path;
/// Per-actor manager lookup.
mod registry;
/// Slots and stream tokens.
mod slot;

/// Produces the elements of a stream.
pub trait SourceDriver: Send + 'static {
    /// Element type.
    type Output: MessageType;

    /// Appends up to `max` elements to `out`.
    fn pull(&mut self, out: &mut VecDeque<Self::Output>, max: usize) -> Result<(), ActorError>;

    /// `true` once the source has nothing left to produce.
    fn done(&self) -> bool;

    /// Called exactly once when the stream ends; `error` is set if it failed.
    fn finalize(&mut self, _error: Option<&ActorError>) {}
}

/// Consumes the elements of a stream.
pub trait SinkDriver: Send + 'static {
    /// Element type.
    type Input: MessageType;

    /// Handles one received batch. An error aborts the stream.
    fn process(&mut self, batch: Vec<Self::Input>) -> Result<(), ActorError>;

    /// Called exactly once when the stream ends; `error` is set if it failed.
    fn finalize(&mut self, _error: Option<&ActorError>) {}
}

/// Transforms the elements of a stream.
pub trait StageDriver: Send + 'static {
    /// Element type received.
    type Input: MessageType;
    /// Element type emitted.
    type Output: MessageType;

    /// Handles one received batch, appending results to `out`. An error aborts the stream.
    fn process(
        &mut self,
        batch: Vec<Self::Input>,
        out: &mut VecDeque<Self::Output>,
    ) -> Result<(), ActorError>;

    /// Called exactly once when the stream ends; `error` is set if it failed.
    fn finalize(&mut self, _error: Option<&ActorError>) {}
}

/// A source that drains an iterator.
pub struct IterSource<I: Iterator> {
    iter: std::iter::Peekable<I>,
    exhausted: bool,
}

impl<I: Iterator> IterSource<I> {
    /// Streams every item of `iter`.
    pub fn new(iter: impl IntoIterator<IntoIter = I>) -> Self {
        Self {
            iter: iter.into_iter().peekable(),
            exhausted: false,
        }
    }
}

impl<I> SourceDriver for IterSource<I>
where
    I: Iterator + Send + 'static,
    I::Item: MessageType,
{
    type Output = I::Item;

    fn pull(&mut self, out: &mut VecDeque<I::Item>, max: usize) -> Result<(), ActorError> {
        out.extend(self.iter.by_ref().take(max));
        self.exhausted = self.iter.peek().is_none();
        Ok(())
    }

    fn done(&self) -> bool {
        self.exhausted
    }
}
