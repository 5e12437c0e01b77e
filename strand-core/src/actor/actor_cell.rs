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
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;
use tracing::{debug, instrument, trace, warn};

use super::context::{Envelope, Handshake};
use super::response::into_result;
use super::{AbstractActor, ActorContext, ActorHandle, Attachable};
use crate::behavior::{
    Behavior, BehaviorStack, Dispatcher, HandlerResult, InvokeMessageResult, MatchResult,
};
use crate::common::{ActorError, ActorId, CoreConfig, ExitReason};
use crate::mailbox::{InboxResult, Mailbox, RequestBouncer};
use crate::message::{DownMsg, ExitMsg, MailboxElement, Message, TimeoutMsg};
use crate::scheduler::{ResumeResult, Resumable, Scheduler};
use crate::stream::{
    send_control, DownstreamMsg, OpenStreamMsg, StreamEnv, StreamRegistry, StreamSlot,
    StreamSlots, UpstreamContent, UpstreamMsg,
};

pub(crate) type InitFn = Box<dyn FnOnce(&mut ActorContext<'_>) -> Behavior + Send>;
pub(crate) type ResponseHandler =
    Box<dyn FnOnce(&mut ActorContext<'_>, Result<Message, ActorError>) + Send>;

/// Everything only the running actor touches.
pub(crate) struct ActorState {
    pub(crate) init: Option<InitFn>,
    pub(crate) stack: BehaviorStack,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) pending: HashMap<u64, ResponseHandler>,
    pub(crate) streams: StreamRegistry,
    pub(crate) planned_exit: Option<ExitReason>,
    pub(crate) trap_exit: bool,
    pub(crate) timeout_generation: u64,
    pub(crate) behavior_changed: bool,
    pub(crate) handshake: Option<Handshake>,
}

/// The control block of an actor driven by a [`Scheduler`].
///
/// The cell owns the mailbox and the actor state. Any thread may enqueue; only the
/// scheduler's resume step, which never runs twice at once for the same cell, handles
/// messages. The first resume runs the actor's init function to obtain its initial
/// behavior.
pub struct ActorCell {
    id: ActorId,
    name: String,
    self_ref: Weak<ActorCell>,
    mailbox: Mailbox,
    scheduler: Arc<dyn Scheduler>,
    config: Arc<CoreConfig>,
    state: Mutex<ActorState>,
    attachables: Mutex<Vec<Attachable>>,
    exit_reason: OnceLock<ExitReason>,
}

impl ActorCell {
    /// Creates an actor and schedules its first resume.
    ///
    /// `init` runs inside that first resume and returns the initial behavior.
    pub fn spawn<F>(
        scheduler: Arc<dyn Scheduler>,
        config: Arc<CoreConfig>,
        name: impl Into<String>,
        init: F,
    ) -> ActorHandle
    where
        F: FnOnce(&mut ActorContext<'_>) -> Behavior + Send + 'static,
    {
        let cell = Self::new(scheduler, config, name.into(), Box::new(init));
        cell.scheduler.enqueue_for_resume(cell.clone());
        ActorHandle::new(cell)
    }

    pub(crate) fn new(
        scheduler: Arc<dyn Scheduler>,
        config: Arc<CoreConfig>,
        name: String,
        init: InitFn,
    ) -> Arc<Self> {
        let state = ActorState {
            init: Some(init),
            stack: BehaviorStack::new(config.behavior.unbecome_last),
            dispatcher: Dispatcher::new(config.behavior.unmatched),
            pending: HashMap::new(),
            streams: StreamRegistry::default(),
            planned_exit: None,
            trap_exit: false,
            timeout_generation: 0,
            behavior_changed: false,
            handshake: None,
        };
        Arc::new_cyclic(|self_ref| Self {
            id: ActorId::next(),
            name,
            self_ref: self_ref.clone(),
            mailbox: Mailbox::new(),
            scheduler,
            config,
            state: Mutex::new(state),
            attachables: Mutex::new(Vec::new()),
            exit_reason: OnceLock::new(),
        })
    }

    /// The mailbox.
    pub fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    /// The configuration this actor was spawned with.
    pub fn config(&self) -> &Arc<CoreConfig> {
        &self.config
    }

    pub(crate) fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.scheduler
    }

    fn run_init(&self, me: &ActorHandle, state: &mut ActorState) {
        let Some(init) = state.init.take() else {
            return;
        };
        let behavior = {
            let mut ctx = ActorContext::new(self, me, state, Envelope::default());
            init(&mut ctx)
        };
        if state.stack.is_empty() {
            state.stack.push(behavior);
        } else {
            trace!(actor = %me, "init switched behaviors, initial behavior discarded");
        }
        state.behavior_changed = false;
        self.arm_timeout(me, state);
    }

    /// Arms the timeout of the active behavior, invalidating any pending one.
    fn arm_timeout(&self, me: &ActorHandle, state: &mut ActorState) {
        state.timeout_generation += 1;
        if let Some(delay) = state.stack.back().and_then(Behavior::timeout) {
            self.scheduler.schedule_message(
                delay,
                me.downgrade(),
                MailboxElement::anonymous(Message::new(TimeoutMsg {
                    generation: state.timeout_generation,
                })),
            );
        }
    }

    fn reply(&self, me: &ActorHandle, envelope: &mut Envelope, result: HandlerResult) {
        let content = match result {
            HandlerResult::Done => Message::empty(),
            HandlerResult::Reply(content) => content,
            HandlerResult::Error(error) => {
                if !envelope.mid.is_request() {
                    debug!(actor = %me, %error, "handler failed");
                }
                Message::new(error)
            }
            HandlerResult::Skip => return,
        };
        if !envelope.mid.is_request() || envelope.mid.is_answered() {
            return;
        }
        let response_id = envelope.mid.response_id();
        envelope.mid.mark_answered();
        match envelope.sender.as_ref().and_then(|sender| sender.upgrade()) {
            Some(sender) => {
                sender.enqueue(MailboxElement::new(Some(me.downgrade()), response_id, content));
            }
            None => trace!(actor = %me, "requester is gone, dropping reply"),
        }
    }

    fn handle_response(&self, me: &ActorHandle, state: &mut ActorState, element: MailboxElement) {
        let request_id = element.mid.request_id();
        let Some(handler) = state.pending.remove(&request_id) else {
            trace!(actor = %me, request_id, "ignoring late response");
            return;
        };
        let mut ctx = ActorContext::new(self, me, state, Envelope::from_element(&element));
        handler(&mut ctx, into_result(element.content));
    }

    fn handle_exit(&self, me: &ActorHandle, state: &mut ActorState, element: MailboxElement) {
        let Some(exit) = element.content.get::<ExitMsg>(0).cloned() else {
            return;
        };
        if matches!(exit.reason, ExitReason::Kill) {
            state.planned_exit.get_or_insert(ExitReason::Kill);
        } else if state.trap_exit {
            self.invoke_behavior(me, state, element);
        } else if !exit.reason.is_normal() {
            let reason = match exit.source {
                Some(_) => ExitReason::Linked(Box::new(exit.reason)),
                None => exit.reason,
            };
            state.planned_exit.get_or_insert(reason);
        } else {
            trace!(actor = %me, "ignoring normal exit message");
        }
    }

    fn handle_timeout(&self, me: &ActorHandle, state: &mut ActorState, generation: u64) {
        if generation != state.timeout_generation {
            trace!(actor = %me, generation, "ignoring stale timeout");
            return;
        }
        let Some(behavior) = state.stack.back().cloned() else {
            return;
        };
        {
            let mut ctx = ActorContext::new(self, me, state, Envelope::default());
            behavior.fire_timeout(&mut ctx);
        }
        if !state.behavior_changed {
            self.arm_timeout(me, state);
        }
    }

    fn handle_open_stream(&self, me: &ActorHandle, state: &mut ActorState, element: MailboxElement) {
        let MailboxElement {
            sender,
            mid,
            stages,
            content,
        } = element;
        let Some(open) = content.take::<OpenStreamMsg>(0) else {
            return;
        };
        state.handshake = Some(Handshake {
            slot: open.slot,
            prev_stage: open.prev_stage.clone(),
            original_stage: open.original_stage,
            attached: false,
        });
        let result = match state.stack.back().cloned() {
            Some(behavior) => {
                let envelope = Envelope {
                    sender,
                    mid,
                    stages,
                };
                let mut ctx = ActorContext::new(self, me, state, envelope);
                Dispatcher::match_message(&behavior, &mut ctx, &open.msg).1
            }
            None => HandlerResult::Done,
        };
        let attached = state
            .handshake
            .take()
            .is_some_and(|handshake| handshake.attached);
        if !attached {
            let reason = match result {
                HandlerResult::Error(error) => error,
                _ => ActorError::StreamInitFailed,
            };
            debug!(actor = %me, slot = %open.slot, %reason, "rejecting stream");
            send_control(
                me,
                &open.prev_stage,
                Message::new(UpstreamMsg {
                    slots: StreamSlots::new(StreamSlot::INVALID, open.slot),
                    content: UpstreamContent::ForcedDrop { reason },
                }),
            );
        }
    }

    fn handle_down(&self, me: &ActorHandle, state: &mut ActorState, element: MailboxElement) {
        let Some(behavior) = state.stack.back().cloned() else {
            return;
        };
        let mut ctx = ActorContext::new(self, me, state, Envelope::from_element(&element));
        if let (MatchResult::NoMatch, _) =
            Dispatcher::match_message(&behavior, &mut ctx, &element.content)
        {
            trace!(actor = %me, "down message consumed silently");
        }
    }

    /// Runs a regular message through the user behavior.
    fn invoke_behavior(&self, me: &ActorHandle, state: &mut ActorState, element: MailboxElement) {
        let MailboxElement {
            sender,
            mid,
            stages,
            content,
        } = element;
        let dispatcher = state.dispatcher;
        let behavior = state.stack.back().cloned();
        let mut envelope = Envelope {
            sender,
            mid,
            stages,
        };
        let (result, handler_result) = match behavior {
            Some(behavior) => {
                let mut ctx = ActorContext::new(self, me, state, envelope);
                let outcome = dispatcher.dispatch(&behavior, &mut ctx, &content);
                envelope = ctx.into_envelope();
                outcome
            }
            None => (
                InvokeMessageResult::Dropped,
                HandlerResult::Error(ActorError::UnexpectedMessage),
            ),
        };
        match result {
            InvokeMessageResult::Consumed => {
                self.reply(me, &mut envelope, handler_result);
                if !state.behavior_changed {
                    self.arm_timeout(me, state);
                }
            }
            InvokeMessageResult::Dropped => self.reply(me, &mut envelope, handler_result),
            InvokeMessageResult::Skipped => {
                trace!(actor = %me, mid = ?envelope.mid, "stashing skipped message");
                self.mailbox.stash(MailboxElement {
                    sender: envelope.sender,
                    mid: envelope.mid,
                    stages: envelope.stages,
                    content,
                });
            }
        }
    }

    fn invoke(&self, me: &ActorHandle, state: &mut ActorState, element: MailboxElement) {
        if element.mid.is_response() {
            return self.handle_response(me, state, element);
        }
        if let Some(timeout) = element.content.get::<TimeoutMsg>(0) {
            let generation = timeout.generation;
            return self.handle_timeout(me, state, generation);
        }
        if element.content.is::<ExitMsg>() {
            return self.handle_exit(me, state, element);
        }
        let env = StreamEnv {
            me,
            config: &self.config.stream,
        };
        if element.content.is::<UpstreamMsg>() {
            let sender = element.sender_handle();
            if let Some(msg) = element.content.take::<UpstreamMsg>(0) {
                state.streams.handle_upstream(&env, msg, sender);
            }
            return;
        }
        if element.content.is::<DownstreamMsg>() {
            let sender = element.sender_handle();
            if let Some(msg) = element.content.take::<DownstreamMsg>(0) {
                state.streams.handle_downstream(&env, msg, sender);
            }
            return;
        }
        if element.content.is::<OpenStreamMsg>() {
            return self.handle_open_stream(me, state, element);
        }
        if element.content.is::<DownMsg>() {
            return self.handle_down(me, state, element);
        }
        self.invoke_behavior(me, state, element);
    }

    /// Terminates the actor: streams, mailbox and observers.
    #[instrument(skip(self, me, state), fields(actor = %me))]
    fn finish(&self, me: &ActorHandle, state: &mut ActorState, reason: ExitReason) {
        debug!(%reason, "actor exiting");
        state.stack.terminate();
        state.pending.clear();
        let env = StreamEnv {
            me,
            config: &self.config.stream,
        };
        let stream_error =
            (!reason.is_normal()).then(|| ActorError::StreamAborted(reason.clone()));
        state.streams.stop_all(&env, stream_error);
        RequestBouncer::new(reason.clone()).bounce_mailbox(&self.mailbox);
        let attachables = {
            let mut attachables = self.attachables.lock();
            let _ = self.exit_reason.set(reason.clone());
            std::mem::take(&mut *attachables)
        };
        for attachable in attachables {
            attachable.fire(self.id, &reason);
        }
    }
}

impl Resumable for ActorCell {
    fn id(&self) -> ActorId {
        self.id
    }

    fn resume(self: Arc<Self>, max_throughput: usize) -> ResumeResult {
        let me = ActorHandle::new(self.clone());
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if self.exit_reason.get().is_some() {
            return ResumeResult::Done;
        }
        self.run_init(&me, state);
        let mut handled = 0;
        while handled < max_throughput {
            if let Some(reason) = state.planned_exit.take() {
                self.finish(&me, state, reason);
                return ResumeResult::Done;
            }
            let Some(element) = self.mailbox.dequeue() else {
                if self.mailbox.try_block() {
                    return ResumeResult::AwaitingMessage;
                }
                continue;
            };
            handled += 1;
            trace!(actor = %me, mid = ?element.mid, "handling message");
            self.invoke(&me, state, element);
            state.stack.cleanup();
            if std::mem::take(&mut state.behavior_changed) {
                let restored = self.mailbox.unstash();
                trace!(actor = %me, restored, "behavior changed");
                self.arm_timeout(&me, state);
            }
            let env = StreamEnv {
                me: &me,
                config: &self.config.stream,
            };
            state.streams.generate_all(&env);
        }
        if let Some(reason) = state.planned_exit.take() {
            self.finish(&me, state, reason);
            return ResumeResult::Done;
        }
        if self.mailbox.is_empty() && self.mailbox.try_block() {
            return ResumeResult::AwaitingMessage;
        }
        ResumeResult::ResumeLater
    }
}

impl AbstractActor for ActorCell {
    fn id(&self) -> ActorId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn enqueue(&self, element: MailboxElement) -> InboxResult {
        let result = self.mailbox.enqueue(element);
        if result == InboxResult::UnblockedReader {
            match self.self_ref.upgrade() {
                Some(cell) => self.scheduler.enqueue_for_resume(cell),
                None => warn!(actor = %self.id, "woke an actor that is being dropped"),
            }
        }
        result
    }

    fn attach(&self, attachable: Attachable) {
        let mut attachables = self.attachables.lock();
        match self.exit_reason.get() {
            Some(reason) => {
                drop(attachables);
                attachable.fire(self.id, reason);
            }
            None => attachables.push(attachable),
        }
    }

    fn exit_reason(&self) -> Option<ExitReason> {
        self.exit_reason.get().cloned()
    }
}

impl fmt::Debug for ActorCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorCell")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("exit_reason", &self.exit_reason.get())
            .finish_non_exhaustive()
    }
}

impl Drop for ActorCell {
    // No handle can reach the actor anymore, so it cannot run `finish`. Observers
    // still learn about the exit.
    fn drop(&mut self) {
        if self.exit_reason.get().is_some() {
            return;
        }
        let reason = ExitReason::Unreachable;
        debug!(actor = %self.id, "dropping an actor that never exited");
        let _ = self.exit_reason.set(reason.clone());
        RequestBouncer::new(reason.clone()).bounce_mailbox(&self.mailbox);
        for attachable in std::mem::take(self.attachables.get_mut()) {
            attachable.fire(self.id, &reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestScheduler;

    #[test]
    fn init_runs_on_first_resume() {
        let scheduler = TestScheduler::new();
        let handle = ActorCell::spawn(
            scheduler.clone(),
            Arc::new(CoreConfig::default()),
            "lazy",
            |_ctx| Behavior::builder().on(|_ctx, x: i32| HandlerResult::reply(x + 1)).build(),
        );
        let mut pending = handle.request(1_i32);
        assert!(pending.try_receive().is_none());
        scheduler.run();
        assert_eq!(pending.try_receive_value::<i32>(), Some(Ok(2)));
    }

    #[test]
    fn exit_bounces_pending_requests() {
        let scheduler = TestScheduler::new();
        let handle = ActorCell::spawn(
            scheduler.clone(),
            Arc::new(CoreConfig::default()),
            "quitter",
            |_ctx| {
                Behavior::builder()
                    .on(|ctx, _: String| ctx.quit(ExitReason::UserShutdown))
                    .build()
            },
        );
        handle.tell(String::from("stop"));
        let mut pending = handle.request(1_i32);
        scheduler.run();
        assert_eq!(
            pending.try_receive_value::<i32>(),
            Some(Err(ActorError::RequestReceiverDown(ExitReason::UserShutdown)))
        );
        assert_eq!(handle.exit_reason(), Some(ExitReason::UserShutdown));
    }
}
