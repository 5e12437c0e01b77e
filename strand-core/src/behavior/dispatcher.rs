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

use tracing::{trace, warn};

use super::{Behavior, HandlerResult};
use crate::actor::ActorContext;
use crate::common::{ActorError, UnmatchedPolicy};
use crate::message::Message;

/// Result of matching one message against one behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchResult {
    /// A case matched and its handler consumed the message.
    Match,
    /// No case matched.
    NoMatch,
    /// A case matched but its handler asked to skip the message.
    Skip,
}

/// Final outcome of dispatching a mailbox element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokeMessageResult {
    /// The element was handled.
    Consumed,
    /// The element stays in the mailbox for a later behavior.
    Skipped,
    /// The element was rejected and discarded.
    Dropped,
}

/// Runs messages through the active behavior and applies the unmatched-message policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct Dispatcher {
    policy: UnmatchedPolicy,
}

impl Dispatcher {
    /// A dispatcher applying `policy` to unmatched messages.
    pub const fn new(policy: UnmatchedPolicy) -> Self {
        Self { policy }
    }

    /// The unmatched-message policy.
    pub const fn policy(&self) -> UnmatchedPolicy {
        self.policy
    }

    /// Replaces the unmatched-message policy.
    pub fn set_policy(&mut self, policy: UnmatchedPolicy) {
        self.policy = policy;
    }

    /// Tries `behavior`'s cases in declaration order; the first structural match runs.
    pub fn match_message(
        behavior: &Behavior,
        ctx: &mut ActorContext<'_>,
        message: &Message,
    ) -> (MatchResult, HandlerResult) {
        let Some(case) = behavior
            .find_case(message.types())
            .and_then(|index| behavior.case(index))
        else {
            return (MatchResult::NoMatch, HandlerResult::Done);
        };
        match case.invoke(ctx, message) {
            HandlerResult::Skip => (MatchResult::Skip, HandlerResult::Skip),
            result => (MatchResult::Match, result),
        }
    }

    /// Dispatches `message` to `behavior`.
    ///
    /// Unmatched messages are skipped or dropped per the policy. A dropped message
    /// yields [`ActorError::UnexpectedMessage`], which the caller turns into an error
    /// reply if the message was a request.
    pub fn dispatch(
        &self,
        behavior: &Behavior,
        ctx: &mut ActorContext<'_>,
        message: &Message,
    ) -> (InvokeMessageResult, HandlerResult) {
        match Self::match_message(behavior, ctx, message) {
            (MatchResult::Match, result) => (InvokeMessageResult::Consumed, result),
            (MatchResult::Skip, _) => (InvokeMessageResult::Skipped, HandlerResult::Skip),
            (MatchResult::NoMatch, _) => self.unmatched(message),
        }
    }

    fn unmatched(&self, message: &Message) -> (InvokeMessageResult, HandlerResult) {
        match self.policy {
            UnmatchedPolicy::Skip => (InvokeMessageResult::Skipped, HandlerResult::Skip),
            UnmatchedPolicy::Drop => {
                trace!(?message, "dropping unmatched message");
                (
                    InvokeMessageResult::Dropped,
                    HandlerResult::Error(ActorError::UnexpectedMessage),
                )
            }
            UnmatchedPolicy::PrintAndDrop => {
                warn!(?message, "unexpected message");
                (
                    InvokeMessageResult::Dropped,
                    HandlerResult::Error(ActorError::UnexpectedMessage),
                )
            }
        }
    }
}
