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

//! Stream managers.
//!
//! A source owns an outbound half, a sink owns an inbound half, and a stage owns both
//! and forwards to them. The actor only sees the object-safe [`StreamManager`] trait.

use std::collections::BTreeMap;
use std::time::Instant;

use tracing::{debug, error, trace};

use super::messages::{send_control, DownstreamContent, UpstreamContent, UpstreamMsg};
use super::{
    AckBatch, DownstreamManager, InboundPath, SinkDriver, SourceDriver, StageDriver,
    StreamSlot, StreamSlots,
};
use crate::actor::ActorHandle;
use crate::common::{ActorError, StreamConfig};
use crate::message::{Message, MessageType, TypeToken};

/// What a manager needs from its owning actor.
pub(crate) struct StreamEnv<'a> {
    pub(crate) me: &'a ActorHandle,
    pub(crate) config: &'a StreamConfig,
}

/// Runs a driver's `finalize` at most once.
#[derive(Debug, Default)]
struct Finalizer {
    done: bool,
}

impl Finalizer {
    fn run(&mut self, finalize: impl FnOnce()) {
        if !self.done {
            self.done = true;
            finalize();
        }
    }
}

/// The inbound half: every path feeding this manager.
#[derive(Default)]
pub(crate) struct Inputs {
    paths: BTreeMap<StreamSlot, InboundPath>,
}

impl Inputs {
    /// Registers `path` and acknowledges the handshake with the initial credit.
    fn open(&mut self, env: &StreamEnv<'_>, mut path: InboundPath) {
        let assignment = path.open();
        if let Some(source) = &path.source {
            send_control(
                env.me,
                source,
                Message::new(UpstreamMsg {
                    slots: path.slots.invert(),
                    content: UpstreamContent::AckOpen {
                        rebind_to: env.me.clone(),
                        initial_demand: assignment.credit,
                        desired_batch_size: assignment.batch_size,
                        max_capacity: assignment.credit,
                    },
                }),
            );
        }
        self.paths.insert(path.slots.receiver, path);
    }

    fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    fn remove(&mut self, slot: StreamSlot) -> Option<InboundPath> {
        self.paths.remove(&slot)
    }

    /// Books a batch and returns its elements.
    fn receive<T: MessageType>(
        &mut self,
        slot: StreamSlot,
        xs_size: u32,
        xs: Message,
        id: u64,
    ) -> Result<Vec<T>, ActorError> {
        let path = self
            .paths
            .get_mut(&slot)
            .ok_or(ActorError::InvalidStreamState)?;
        path.handle_batch(xs_size, id);
        xs.take::<Vec<T>>(0).ok_or(ActorError::InvalidStreamState)
    }

    fn processed(&mut self, slot: StreamSlot, started: Instant) {
        if let Some(path) = self.paths.get_mut(&slot) {
            path.after_processing(started.elapsed());
        }
    }

    fn send_ack(env: &StreamEnv<'_>, path: &InboundPath, ack: AckBatch) {
        if let Some(source) = &path.source {
            send_control(
                env.me,
                source,
                Message::new(UpstreamMsg {
                    slots: path.slots.invert(),
                    content: UpstreamContent::AckBatch {
                        new_capacity: ack.new_capacity,
                        desired_batch_size: ack.desired_batch_size,
                        next_ack_id: ack.next_ack_id,
                        max_capacity: ack.max_capacity,
                    },
                }),
            );
        }
    }

    /// Acknowledges processed batches of one path and grants new credit.
    fn ack(&mut self, env: &StreamEnv<'_>, slot: StreamSlot, downstream_capacity: u32) {
        if let Some(path) = self.paths.get_mut(&slot) {
            if let Some(ack) = path.emit_ack(downstream_capacity) {
                Self::send_ack(env, path, ack);
            }
        }
    }

    fn ack_all(&mut self, env: &StreamEnv<'_>, downstream_capacity: u32) {
        for path in self.paths.values_mut() {
            if let Some(ack) = path.emit_ack(downstream_capacity) {
                Self::send_ack(env, path, ack);
            }
        }
    }

    fn grant(&mut self, env: &StreamEnv<'_>, slot: StreamSlot, extra: u32) -> Result<(), ActorError> {
        let path = self
            .paths
            .get_mut(&slot)
            .ok_or(ActorError::InvalidStreamState)?;
        if let Some(ack) = path.grant(extra, env.config.max_credit) {
            Self::send_ack(env, path, ack);
        }
        Ok(())
    }

    fn shutdown(&mut self, env: &StreamEnv<'_>, reason: Option<&ActorError>) {
        for (_, path) in std::mem::take(&mut self.paths) {
            let Some(source) = &path.source else { continue };
            let content = match reason {
                Some(reason) => UpstreamContent::ForcedDrop {
                    reason: reason.clone(),
                },
                None => UpstreamContent::Drop,
            };
            send_control(
                env.me,
                source,
                Message::new(UpstreamMsg {
                    slots: path.slots.invert(),
                    content,
                }),
            );
        }
    }
}

/// Applies upstream traffic to an outbound half.
///
/// Returns `Some(reason)` when the manager should stop: `Some(None)` after the last
/// consumer dropped out, `Some(Some(error))` after a consumer failed.
fn apply_upstream<T: MessageType>(
    out: &mut DownstreamManager<T>,
    slots: StreamSlots,
    content: UpstreamContent,
) -> Option<Option<ActorError>> {
    let slot = slots.receiver;
    match content {
        UpstreamContent::AckOpen {
            rebind_to,
            initial_demand,
            desired_batch_size,
            max_capacity,
        } => {
            match out.path_mut(slot) {
                Some(path) => path.handle_ack_open(
                    slots.sender,
                    rebind_to,
                    initial_demand,
                    desired_batch_size,
                    max_capacity,
                ),
                None => trace!(%slot, "handshake ack for unknown path"),
            }
            None
        }
        UpstreamContent::AckBatch {
            new_capacity,
            desired_batch_size,
            next_ack_id,
            max_capacity,
        } => {
            if let Some(path) = out.path_mut(slot) {
                path.handle_ack_batch(new_capacity, desired_batch_size, next_ack_id, max_capacity);
            }
            None
        }
        UpstreamContent::Drop => {
            out.remove_path(slot);
            (out.num_paths() == 0).then_some(None)
        }
        UpstreamContent::ForcedDrop { reason } => {
            out.remove_path(slot);
            Some(Some(reason))
        }
    }
}

/// Object-safe interface of every stream role.
pub(crate) trait StreamManager: Send {
    /// Element type accepted by the inbound half, if any.
    fn input_token(&self) -> Option<TypeToken>;

    /// Adds an inbound path (fan-in).
    fn add_input(&mut self, env: &StreamEnv<'_>, path: InboundPath) -> Result<(), ActorError>;

    /// Handles data or a close signal addressed to one of our inbound slots.
    fn handle_downstream(&mut self, env: &StreamEnv<'_>, slots: StreamSlots, content: DownstreamContent);

    /// Handles an acknowledgement or drop addressed to one of our outbound slots.
    fn handle_upstream(&mut self, env: &StreamEnv<'_>, slots: StreamSlots, content: UpstreamContent);

    /// Produces and emits whatever credit allows.
    fn generate(&mut self, env: &StreamEnv<'_>);

    /// Appends `values` (one `Vec` of the output type) to the outbound buffer.
    fn push_values(&mut self, env: &StreamEnv<'_>, values: Message) -> Result<(), ActorError>;

    /// Grants extra credit on an inbound path.
    fn grant(&mut self, env: &StreamEnv<'_>, slot: StreamSlot, extra: u32) -> Result<(), ActorError>;

    /// Switches continuous mode; leaving it may finish the manager.
    fn set_continuous(&mut self, env: &StreamEnv<'_>, continuous: bool);

    /// Shuts every path down, aborting them if `reason` is set, and finalizes.
    fn stop(&mut self, env: &StreamEnv<'_>, reason: Option<ActorError>);

    /// `true` once finalized.
    fn finalized(&self) -> bool;

    /// `true` if the manager cannot make progress until credit or input arrives.
    fn idle(&self) -> bool;
}

/// A stream source.
pub(crate) struct SourceManager<D: SourceDriver> {
    driver: D,
    out: DownstreamManager<D::Output>,
    finalizer: Finalizer,
}

impl<D: SourceDriver> SourceManager<D> {
    pub(crate) fn new(driver: D, out: DownstreamManager<D::Output>) -> Self {
        Self {
            driver,
            out,
            finalizer: Finalizer::default(),
        }
    }

    fn finalize(&mut self, reason: Option<&ActorError>) {
        let driver = &mut self.driver;
        self.finalizer.run(|| {
            debug!(error = ?reason, "finalizing stream source");
            driver.finalize(reason);
        });
    }
}

impl<D: SourceDriver> StreamManager for SourceManager<D> {
    fn input_token(&self) -> Option<TypeToken> {
        None
    }

    fn add_input(&mut self, _env: &StreamEnv<'_>, _path: InboundPath) -> Result<(), ActorError> {
        Err(ActorError::InvalidStreamState)
    }

    fn handle_downstream(&mut self, _env: &StreamEnv<'_>, slots: StreamSlots, _content: DownstreamContent) {
        trace!(?slots, "source ignores downstream traffic");
    }

    fn handle_upstream(&mut self, env: &StreamEnv<'_>, slots: StreamSlots, content: UpstreamContent) {
        match apply_upstream(&mut self.out, slots, content) {
            Some(reason) => self.stop(env, reason),
            None => self.generate(env),
        }
    }

    fn generate(&mut self, env: &StreamEnv<'_>) {
        if self.finalizer.done {
            return;
        }
        if !self.driver.done() {
            let capacity = self.out.capacity();
            if capacity > 0 {
                if let Err(reason) = self.driver.pull(self.out.buf_mut(), capacity) {
                    self.stop(env, Some(reason));
                    return;
                }
            }
        }
        self.out.emit_batches(env.me);
        if self.driver.done() && !self.out.closing() {
            self.out.close(env.me);
        }
        if self.out.closing() && self.out.num_paths() == 0 {
            self.finalize(None);
        }
    }

    fn push_values(&mut self, env: &StreamEnv<'_>, values: Message) -> Result<(), ActorError> {
        let values = values
            .take::<Vec<D::Output>>(0)
            .ok_or(ActorError::InvalidStreamState)?;
        self.out.buf_mut().extend(values);
        self.generate(env);
        Ok(())
    }

    fn grant(&mut self, _env: &StreamEnv<'_>, _slot: StreamSlot, _extra: u32) -> Result<(), ActorError> {
        Err(ActorError::InvalidStreamState)
    }

    fn set_continuous(&mut self, _env: &StreamEnv<'_>, _continuous: bool) {}

    fn stop(&mut self, env: &StreamEnv<'_>, reason: Option<ActorError>) {
        match &reason {
            Some(reason) => {
                error!(%reason, "aborting stream source");
                self.out.abort(env.me, reason);
            }
            None => self.out.close(env.me),
        }
        self.finalize(reason.as_ref());
    }

    fn finalized(&self) -> bool {
        self.finalizer.done
    }

    fn idle(&self) -> bool {
        self.out.stalled()
    }
}

/// A stream sink.
pub(crate) struct SinkManager<D: SinkDriver> {
    driver: D,
    inputs: Inputs,
    continuous: bool,
    finalizer: Finalizer,
}

impl<D: SinkDriver> SinkManager<D> {
    pub(crate) fn new(driver: D) -> Self {
        Self {
            driver,
            inputs: Inputs::default(),
            continuous: false,
            finalizer: Finalizer::default(),
        }
    }

    fn finalize(&mut self, reason: Option<&ActorError>) {
        let driver = &mut self.driver;
        self.finalizer.run(|| {
            debug!(error = ?reason, "finalizing stream sink");
            driver.finalize(reason);
        });
    }

    fn check_done(&mut self) {
        if !self.continuous && self.inputs.is_empty() {
            self.finalize(None);
        }
    }
}

impl<D: SinkDriver> StreamManager for SinkManager<D> {
    fn input_token(&self) -> Option<TypeToken> {
        Some(D::Input::type_token())
    }

    fn add_input(&mut self, env: &StreamEnv<'_>, path: InboundPath) -> Result<(), ActorError> {
        if self.finalizer.done {
            return Err(ActorError::InvalidStreamState);
        }
        self.inputs.open(env, path);
        Ok(())
    }

    fn handle_downstream(&mut self, env: &StreamEnv<'_>, slots: StreamSlots, content: DownstreamContent) {
        let slot = slots.receiver;
        match content {
            DownstreamContent::Batch { xs_size, xs, id } => {
                let started = Instant::now();
                let processed = self
                    .inputs
                    .receive::<D::Input>(slot, xs_size, xs, id)
                    .and_then(|items| self.driver.process(items));
                if let Err(reason) = processed {
                    self.stop(env, Some(reason));
                    return;
                }
                self.inputs.processed(slot, started);
                self.inputs.ack(env, slot, u32::MAX);
            }
            DownstreamContent::Close => {
                self.inputs.remove(slot);
                self.check_done();
            }
            DownstreamContent::ForcedClose { reason } => {
                self.inputs.remove(slot);
                if self.continuous {
                    self.check_done();
                } else {
                    self.stop(env, Some(reason));
                }
            }
        }
    }

    fn handle_upstream(&mut self, _env: &StreamEnv<'_>, slots: StreamSlots, _content: UpstreamContent) {
        trace!(?slots, "sink ignores upstream traffic");
    }

    fn generate(&mut self, _env: &StreamEnv<'_>) {}

    fn push_values(&mut self, _env: &StreamEnv<'_>, _values: Message) -> Result<(), ActorError> {
        Err(ActorError::InvalidStreamState)
    }

    fn grant(&mut self, env: &StreamEnv<'_>, slot: StreamSlot, extra: u32) -> Result<(), ActorError> {
        self.inputs.grant(env, slot, extra)
    }

    fn set_continuous(&mut self, _env: &StreamEnv<'_>, continuous: bool) {
        self.continuous = continuous;
        self.check_done();
    }

    fn stop(&mut self, env: &StreamEnv<'_>, reason: Option<ActorError>) {
        if let Some(reason) = &reason {
            error!(%reason, "aborting stream sink");
        }
        self.inputs.shutdown(env, reason.as_ref());
        self.finalize(reason.as_ref());
    }

    fn finalized(&self) -> bool {
        self.finalizer.done
    }

    fn idle(&self) -> bool {
        true
    }
}

/// A stream stage: an inbound half and an outbound half joined by a driver.
pub(crate) struct StageManager<D: StageDriver> {
    driver: D,
    inputs: Inputs,
    out: DownstreamManager<D::Output>,
    continuous: bool,
    finalizer: Finalizer,
}

impl<D: StageDriver> StageManager<D> {
    pub(crate) fn new(driver: D, out: DownstreamManager<D::Output>) -> Self {
        Self {
            driver,
            inputs: Inputs::default(),
            out,
            continuous: false,
            finalizer: Finalizer::default(),
        }
    }

    fn finalize(&mut self, reason: Option<&ActorError>) {
        let driver = &mut self.driver;
        self.finalizer.run(|| {
            debug!(error = ?reason, "finalizing stream stage");
            driver.finalize(reason);
        });
    }

    fn check_done(&mut self, env: &StreamEnv<'_>) {
        if self.finalizer.done || self.continuous || !self.inputs.is_empty() {
            return;
        }
        if !self.out.closing() {
            self.out.close(env.me);
        }
        if self.out.num_paths() == 0 {
            self.finalize(None);
        }
    }
}

impl<D: StageDriver> StreamManager for StageManager<D> {
    fn input_token(&self) -> Option<TypeToken> {
        Some(D::Input::type_token())
    }

    fn add_input(&mut self, env: &StreamEnv<'_>, path: InboundPath) -> Result<(), ActorError> {
        if self.finalizer.done {
            return Err(ActorError::InvalidStreamState);
        }
        self.inputs.open(env, path);
        Ok(())
    }

    fn handle_downstream(&mut self, env: &StreamEnv<'_>, slots: StreamSlots, content: DownstreamContent) {
        let slot = slots.receiver;
        match content {
            DownstreamContent::Batch { xs_size, xs, id } => {
                let started = Instant::now();
                let out = self.out.buf_mut();
                let processed = self
                    .inputs
                    .receive::<D::Input>(slot, xs_size, xs, id)
                    .and_then(|items| self.driver.process(items, out));
                if let Err(reason) = processed {
                    self.stop(env, Some(reason));
                    return;
                }
                self.inputs.processed(slot, started);
                self.out.emit_batches(env.me);
                let capacity = self.out.max_capacity();
                self.inputs.ack(env, slot, capacity);
            }
            DownstreamContent::Close => {
                self.inputs.remove(slot);
                self.check_done(env);
            }
            DownstreamContent::ForcedClose { reason } => {
                self.inputs.remove(slot);
                if self.continuous {
                    self.check_done(env);
                } else {
                    self.stop(env, Some(reason));
                }
            }
        }
    }

    fn handle_upstream(&mut self, env: &StreamEnv<'_>, slots: StreamSlots, content: UpstreamContent) {
        match apply_upstream(&mut self.out, slots, content) {
            Some(reason) => self.stop(env, reason),
            None => self.generate(env),
        }
    }

    fn generate(&mut self, env: &StreamEnv<'_>) {
        if self.finalizer.done {
            return;
        }
        self.out.emit_batches(env.me);
        let capacity = self.out.max_capacity();
        self.inputs.ack_all(env, capacity);
        self.check_done(env);
        if self.out.closing() && self.out.num_paths() == 0 {
            self.finalize(None);
        }
    }

    fn push_values(&mut self, env: &StreamEnv<'_>, values: Message) -> Result<(), ActorError> {
        let values = values
            .take::<Vec<D::Output>>(0)
            .ok_or(ActorError::InvalidStreamState)?;
        self.out.buf_mut().extend(values);
        self.generate(env);
        Ok(())
    }

    fn grant(&mut self, env: &StreamEnv<'_>, slot: StreamSlot, extra: u32) -> Result<(), ActorError> {
        self.inputs.grant(env, slot, extra)
    }

    fn set_continuous(&mut self, env: &StreamEnv<'_>, continuous: bool) {
        self.continuous = continuous;
        self.check_done(env);
    }

    fn stop(&mut self, env: &StreamEnv<'_>, reason: Option<ActorError>) {
        match &reason {
            Some(reason) => {
                error!(%reason, "aborting stream stage");
                self.out.abort(env.me, reason);
            }
            None => self.out.close(env.me),
        }
        self.inputs.shutdown(env, reason.as_ref());
        self.finalize(reason.as_ref());
    }

    fn finalized(&self) -> bool {
        self.finalizer.done
    }

    fn idle(&self) -> bool {
        self.out.stalled() || (self.inputs.is_empty() && self.out.clean())
    }
}
