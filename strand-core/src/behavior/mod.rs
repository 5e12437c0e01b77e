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

pub use behavior::{Behavior, BehaviorBuilder};
pub use behavior_stack::BehaviorStack;
pub use crate::common::UnmatchedPolicy as DefaultHandler;
pub use dispatcher::{Dispatcher, InvokeMessageResult, MatchResult};

use crate::common::ActorError;
use crate::message::{IntoMessage, Message};

/// Ordered handler lists with an optional timeout.
#[allow(clippy::module_inception)]
mod behavior;
/// The become/unbecome stack with deferred destruction.
mod behavior_stack;
/// Signature matching and the unmatched-message policy.
mod dispatcher;

/// What a handler asks the runtime to do after it returns.
#[derive(Debug, Clone)]
pub enum HandlerResult {
    /// Handled. Requests receive an empty reply unless already answered.
    Done,
    /// Handled; requests receive this reply.
    Reply(Message),
    /// Failed; requests receive the error as their reply.
    Error(ActorError),
    /// Not handled by this behavior; keep the element for a later one.
    Skip,
}

impl HandlerResult {
    /// A reply carrying `values`.
    pub fn reply(values: impl IntoMessage) -> Self {
        Self::Reply(values.into_message())
    }
}

impl From<()> for HandlerResult {
    fn from(_: ()) -> Self {
        Self::Done
    }
}

impl From<Message> for HandlerResult {
    fn from(message: Message) -> Self {
        Self::Reply(message)
    }
}

impl From<ActorError> for HandlerResult {
    fn from(error: ActorError) -> Self {
        Self::Error(error)
    }
}

impl<T: Into<HandlerResult>> From<Result<T, ActorError>> for HandlerResult {
    fn from(result: Result<T, ActorError>) -> Self {
        match result {
            Ok(value) => value.into(),
            Err(error) => Self::Error(error),
        }
    }
}
