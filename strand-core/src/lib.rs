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

// `mailbox::lifo_inbox` is the one module allowed `unsafe`.
#![deny(unsafe_code)]
#![deny(missing_docs)]

//! # Strand Core
//!
//! The message-passing and streaming machinery behind the Strand actor framework.
//!
//! An actor owns a [`Mailbox`](mailbox::Mailbox) that any thread may enqueue into and
//! that exactly one logical consumer drains. Draining happens inside a resume step that
//! an external [`Scheduler`](scheduler::Scheduler) drives: each dequeued element is run
//! through the dispatcher against the top of the actor's
//! [`BehaviorStack`](behavior::BehaviorStack). Handlers may reply, switch behaviors,
//! open streams or quit the actor. On exit the remaining mailbox content is handed to the
//! [`RequestBouncer`](mailbox::RequestBouncer) so no requester waits forever.
//!
//! Bulk data moves through [`stream`] pipelines (source, stages, sink) whose throughput is
//! governed by credit. Actors that must block a real thread run on a
//! [`Worker`](worker::Worker) borrowed from the lock-free [`WorkerHub`](worker::WorkerHub).
//!
//! The crate does not own a runtime. The `strand` facade crate supplies a tokio-backed
//! scheduler, and [`testing::TestScheduler`] drives actors deterministically in tests.

extern crate self as strand_core;

/// Actor handles, the actor cell that runs behaviors, and the handler context.
pub mod actor;
/// Behaviors, the behavior stack and the dispatch result types.
pub mod behavior;
/// Identifiers, errors and configuration shared by every module.
pub mod common;
/// The per-actor mailbox, its lock-free inbox and the request bouncer.
pub mod mailbox;
/// Type-erased messages, message ids and mailbox elements.
pub mod message;
/// The scheduler seam consumed by actors.
pub mod scheduler;
/// Credit-based streaming between actors.
pub mod stream;
/// A deterministic scheduler with a virtual clock for tests.
pub mod testing;
/// Detached workers and the lock-free hub that recycles them.
pub mod worker;

/// A prelude module for conveniently importing the most commonly used items.
pub mod prelude {
    pub use crate::actor::{ActorCell, ActorContext, ActorHandle, PendingRequest, WeakActorHandle};
    pub use crate::behavior::{Behavior, BehaviorStack, DefaultHandler, HandlerResult, InvokeMessageResult, MatchResult};
    pub use crate::common::{ActorError, ActorId, CoreConfig, ExitReason};
    pub use crate::mailbox::{InboxResult, Mailbox, RequestBouncer};
    pub use crate::message::{DownMsg, ExitMsg, IntoMessage, Message, MessageId, MessageType, Pattern, Priority};
    pub use crate::scheduler::{ResumeResult, Resumable, Scheduler};
    pub use crate::stream::{IterSource, SinkDriver, SourceDriver, StageDriver, Stream, StreamSlot};
    pub use crate::worker::{Worker, WorkerHub};
    pub use strand_macro::strand_message;
}
