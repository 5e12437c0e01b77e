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

use std::time::Duration;

use tracing::{debug, trace};

use super::actor_cell::ActorState;
use super::{ActorCell, ActorHandle, Attachable, WeakActorHandle};
use crate::behavior::{Behavior, DefaultHandler};
use crate::common::{ActorError, CoreConfig, ExitReason};
use crate::mailbox::InboxResult;
use crate::message::{IntoMessage, MailboxElement, Message, MessageId, MessageType, Priority};
use crate::stream::{
    controller_for, DownstreamManager, InboundPath, OpenStreamMsg, OutboundPath, SinkDriver,
    SinkManager, SourceDriver, SourceManager, StageDriver, StageManager, Stream, StreamEnv,
    StreamManager, StreamSlot, StreamSlots,
};

/// Routing data of the element being handled.
#[derive(Debug, Default)]
pub(crate) struct Envelope {
    pub(crate) sender: Option<WeakActorHandle>,
    pub(crate) mid: MessageId,
    pub(crate) stages: Vec<ActorHandle>,
}

impl Envelope {
    pub(crate) fn from_element(element: &MailboxElement) -> Self {
        Self {
            sender: element.sender.clone(),
            mid: element.mid,
            stages: element.stages.clone(),
        }
    }
}

/// A stream handshake being offered to the behavior.
#[derive(Debug)]
pub(crate) struct Handshake {
    pub(crate) slot: StreamSlot,
    pub(crate) prev_stage: ActorHandle,
    pub(crate) original_stage: ActorHandle,
    pub(crate) attached: bool,
}

/// The actor as seen from inside one of its handlers.
///
/// A context exists only while a handler runs. It gives access to the element being
/// handled (sender, request id, forwarding stages) and to everything an actor may do in
/// response: send, request, delegate, switch behaviors, monitor and link, open and
/// accept streams, spawn, and quit.
pub struct ActorContext<'a> {
    cell: &'a ActorCell,
    me: &'a ActorHandle,
    state: &'a mut ActorState,
    envelope: Envelope,
}

impl<'a> ActorContext<'a> {
    pub(crate) fn new(
        cell: &'a ActorCell,
        me: &'a ActorHandle,
        state: &'a mut ActorState,
        envelope: Envelope,
    ) -> Self {
        Self {
            cell,
            me,
            state,
            envelope,
        }
    }

    pub(crate) fn into_envelope(self) -> Envelope {
        self.envelope
    }

    fn env(&self) -> StreamEnv<'a> {
        StreamEnv {
            me: self.me,
            config: &self.cell.config().stream,
        }
    }

    /// A handle to the running actor.
    pub fn self_handle(&self) -> ActorHandle {
        self.me.clone()
    }

    /// The sender of the current message, if it is still alive.
    pub fn sender(&self) -> Option<ActorHandle> {
        self.envelope.sender.as_ref().and_then(WeakActorHandle::upgrade)
    }

    /// Id of the current message.
    pub fn message_id(&self) -> MessageId {
        self.envelope.mid
    }

    /// The configuration the actor was spawned with.
    pub fn config(&self) -> &CoreConfig {
        self.cell.config()
    }

    /// Sends `values` to `target` with this actor as sender.
    pub fn send(&self, target: &ActorHandle, values: impl IntoMessage) -> InboxResult {
        target.enqueue(MailboxElement::new(
            Some(self.me.downgrade()),
            MessageId::make(),
            values.into_message(),
        ))
    }

    /// Sends `values` to `target` after `delay`.
    pub fn send_later(&self, target: &ActorHandle, delay: Duration, values: impl IntoMessage) {
        self.cell.scheduler().schedule_message(
            delay,
            target.downgrade(),
            MailboxElement::new(
                Some(self.me.downgrade()),
                MessageId::make(),
                values.into_message(),
            ),
        );
    }

    /// Sends a request and registers `handler` for its outcome.
    ///
    /// Any number of requests may be outstanding; each handler runs once, with the
    /// reply, the receiver's error, or [`ActorError::RequestTimeout`] if nothing arrived
    /// within `timeout`. Whatever arrives after that is ignored.
    pub fn request<F>(
        &mut self,
        target: &ActorHandle,
        values: impl IntoMessage,
        timeout: Duration,
        handler: F,
    ) -> MessageId
    where
        F: FnOnce(&mut ActorContext<'_>, Result<Message, ActorError>) + Send + 'static,
    {
        let mid = MessageId::next_request(Priority::Normal);
        self.state.pending.insert(mid.request_id(), Box::new(handler));
        target.enqueue(MailboxElement::new(
            Some(self.me.downgrade()),
            mid,
            values.into_message(),
        ));
        self.cell.scheduler().schedule_message(
            timeout,
            self.me.downgrade(),
            MailboxElement::new(
                None,
                mid.response_id(),
                Message::new(ActorError::RequestTimeout),
            ),
        );
        mid
    }

    /// Hands the current message, replaced by `values`, to `target`.
    ///
    /// `target` sees the original sender and request id, so its reply goes straight to
    /// the requester. This actor no longer answers the request itself.
    pub fn delegate(&mut self, target: &ActorHandle, values: impl IntoMessage) -> InboxResult {
        let element = MailboxElement::new(
            self.envelope.sender.clone(),
            self.envelope.mid,
            values.into_message(),
        )
        .with_stages(std::mem::take(&mut self.envelope.stages));
        self.envelope.mid.mark_answered();
        trace!(actor = %self.me, target = %target, "delegating");
        target.enqueue(element)
    }

    /// Pushes `behavior` on top of the behavior stack.
    pub fn become_behavior(&mut self, behavior: Behavior) {
        self.state.stack.push(behavior);
        self.state.behavior_changed = true;
    }

    /// Replaces the active behavior with `behavior`.
    pub fn replace_behavior(&mut self, behavior: Behavior) {
        self.state.stack.replace(behavior);
        self.state.behavior_changed = true;
    }

    /// Returns to the previous behavior. Returns `false` if the active behavior is the
    /// last one and the unbecome policy ignores the call.
    pub fn unbecome(&mut self) -> bool {
        let popped = self.state.stack.unbecome();
        self.state.behavior_changed |= popped;
        popped
    }

    /// Stops the actor after the current message with `reason`.
    pub fn quit(&mut self, reason: ExitReason) {
        self.state.planned_exit.get_or_insert(reason);
    }

    /// Receives a [`DownMsg`](crate::message::DownMsg) when `target` exits.
    pub fn monitor(&self, target: &ActorHandle) {
        target.attach(Attachable::Monitor(self.me.downgrade()));
    }

    /// Links both actors: whichever exits first sends the other an exit message.
    pub fn link_to(&self, target: &ActorHandle) {
        target.attach(Attachable::Link(self.me.downgrade()));
        self.me.attach(Attachable::Link(target.downgrade()));
    }

    /// Turns exit messages from linked actors into regular messages.
    pub fn trap_exit(&mut self, enabled: bool) {
        self.state.trap_exit = enabled;
    }

    /// Changes what happens to messages no handler matches.
    pub fn set_default_handler(&mut self, policy: DefaultHandler) {
        self.state.dispatcher.set_policy(policy);
    }

    /// Spawns an actor on the same scheduler with the same configuration.
    pub fn spawn<F>(&self, name: impl Into<String>, init: F) -> ActorHandle
    where
        F: FnOnce(&mut ActorContext<'_>) -> Behavior + Send + 'static,
    {
        ActorCell::spawn(
            self.cell.scheduler().clone(),
            self.cell.config().clone(),
            name,
            init,
        )
    }

    /// Opens a stream through `pipeline`, a list of stages ending with a sink.
    ///
    /// Returns the slot of the new outbound path.
    pub fn make_source<D: SourceDriver>(
        &mut self,
        pipeline: &[ActorHandle],
        driver: D,
    ) -> Result<StreamSlot, ActorError> {
        let (first, rest) = pipeline
            .split_first()
            .ok_or(ActorError::NoDownstreamStagesDefined)?;
        let slot = self.state.streams.next_slot();
        let mut out = DownstreamManager::new();
        out.add_path(OutboundPath::new(slot, Some(first.clone())));
        self.state
            .streams
            .add(Box::new(SourceManager::new(driver, out)), &[slot]);
        self.offer::<D::Output>(first, slot, self.me.clone(), rest.iter().rev().cloned().collect());
        debug!(actor = %self.me, %slot, "opened stream");
        Ok(slot)
    }

    fn offer<T: MessageType>(
        &self,
        next: &ActorHandle,
        slot: StreamSlot,
        original_stage: ActorHandle,
        stages: Vec<ActorHandle>,
    ) {
        let open = OpenStreamMsg {
            slot,
            msg: Message::new(Stream::<T>::new(slot)),
            prev_stage: self.me.clone(),
            original_stage,
        };
        next.enqueue(
            MailboxElement::new(Some(self.me.downgrade()), MessageId::make(), Message::new(open))
                .with_stages(stages),
        );
    }

    /// The handshake currently offered, if `stream` belongs to it and nothing attached yet.
    fn handshake<T>(&self, stream: &Stream<T>) -> Result<(ActorHandle, ActorHandle), ActorError> {
        match &self.state.handshake {
            Some(handshake) if handshake.slot == stream.slot() && !handshake.attached => Ok((
                handshake.prev_stage.clone(),
                handshake.original_stage.clone(),
            )),
            _ => Err(ActorError::InvalidStreamState),
        }
    }

    fn mark_attached(&mut self) {
        if let Some(handshake) = &mut self.state.handshake {
            handshake.attached = true;
        }
    }

    fn inbound_path(&mut self, upstream: StreamSlot, source: ActorHandle) -> InboundPath {
        let slot = self.state.streams.next_slot();
        InboundPath::new(
            StreamSlots::new(upstream, slot),
            Some(source),
            controller_for(&self.cell.config().stream),
        )
    }

    /// Accepts the offered `stream` as its final consumer.
    ///
    /// Fails with [`ActorError::CannotAddDownstream`] if the handshake still names
    /// further hops. Returns the slot of the new inbound path.
    pub fn make_sink<D: SinkDriver>(
        &mut self,
        stream: &Stream<D::Input>,
        driver: D,
    ) -> Result<StreamSlot, ActorError> {
        let (prev_stage, _) = self.handshake(stream)?;
        if !self.envelope.stages.is_empty() {
            return Err(ActorError::CannotAddDownstream);
        }
        let path = self.inbound_path(stream.slot(), prev_stage);
        let slot = path.slots.receiver;
        let mut manager = SinkManager::new(driver);
        manager.add_input(&self.env(), path)?;
        self.state.streams.add(Box::new(manager), &[slot]);
        self.mark_attached();
        Ok(slot)
    }

    /// Accepts the offered `stream` as a stage and forwards a new handshake to the next hop.
    ///
    /// Fails with [`ActorError::NoDownstreamStagesDefined`] if the handshake names no
    /// further hop. Returns the slot of the new outbound path.
    pub fn make_stage<D: StageDriver>(
        &mut self,
        stream: &Stream<D::Input>,
        driver: D,
    ) -> Result<StreamSlot, ActorError> {
        let (prev_stage, original_stage) = self.handshake(stream)?;
        let next = self
            .envelope
            .stages
            .pop()
            .ok_or(ActorError::NoDownstreamStagesDefined)?;
        let remaining = std::mem::take(&mut self.envelope.stages);
        let path = self.inbound_path(stream.slot(), prev_stage);
        let in_slot = path.slots.receiver;
        let out_slot = self.state.streams.next_slot();
        let mut out = DownstreamManager::new();
        out.add_path(OutboundPath::new(out_slot, Some(next.clone())));
        let mut manager = StageManager::new(driver, out);
        manager.add_input(&self.env(), path)?;
        self.state
            .streams
            .add(Box::new(manager), &[in_slot, out_slot]);
        self.offer::<D::Output>(&next, out_slot, original_stage, remaining);
        self.mark_attached();
        Ok(out_slot)
    }

    /// Accepts the offered `stream` as an additional input of the sink or stage owning
    /// `slot` (fan-in).
    pub fn attach_input<T: MessageType>(
        &mut self,
        stream: &Stream<T>,
        slot: StreamSlot,
    ) -> Result<StreamSlot, ActorError> {
        let (prev_stage, _) = self.handshake(stream)?;
        if !self.envelope.stages.is_empty() {
            return Err(ActorError::CannotAddDownstream);
        }
        let key = self
            .state
            .streams
            .key_of(slot)
            .ok_or(ActorError::InvalidStreamState)?;
        let path = self.inbound_path(stream.slot(), prev_stage);
        let in_slot = path.slots.receiver;
        let env = self.env();
        let manager = self
            .state
            .streams
            .manager_mut(key)
            .ok_or(ActorError::InvalidStreamState)?;
        if manager.input_token() != Some(T::type_token()) {
            return Err(ActorError::InvalidStreamState);
        }
        manager.add_input(&env, path)?;
        self.state.streams.bind(in_slot, key);
        self.mark_attached();
        Ok(in_slot)
    }

    /// Appends `values` to the outbound buffer of the source or stage owning `slot`.
    pub fn push_to_stream<T: MessageType>(
        &mut self,
        slot: StreamSlot,
        values: Vec<T>,
    ) -> Result<(), ActorError> {
        let env = self.env();
        self.state
            .streams
            .by_slot(slot)
            .ok_or(ActorError::InvalidStreamState)?
            .push_values(&env, Message::new(values))
    }

    /// Grants `n` extra credit on the inbound path `slot`.
    pub fn pull_request(&mut self, slot: StreamSlot, n: u32) -> Result<(), ActorError> {
        let env = self.env();
        self.state
            .streams
            .by_slot(slot)
            .ok_or(ActorError::InvalidStreamState)?
            .grant(&env, slot, n)
    }

    /// Keeps the sink or stage owning `slot` alive after its last input closed, so that
    /// further inputs can attach.
    pub fn set_stream_continuous(&mut self, slot: StreamSlot, continuous: bool) -> Result<(), ActorError> {
        let env = self.env();
        self.state
            .streams
            .by_slot(slot)
            .ok_or(ActorError::InvalidStreamState)?
            .set_continuous(&env, continuous);
        self.state.streams.collect();
        Ok(())
    }

    /// Closes the stream role owning `slot` regularly.
    pub fn shutdown_stream(&mut self, slot: StreamSlot) -> Result<(), ActorError> {
        let env = self.env();
        self.state
            .streams
            .by_slot(slot)
            .ok_or(ActorError::InvalidStreamState)?
            .stop(&env, None);
        self.state.streams.collect();
        Ok(())
    }
}
