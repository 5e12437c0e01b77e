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

use thiserror::Error;

use crate::message::MessageType;

/// Why an actor stopped.
///
/// Exit reasons travel inside [`ExitMsg`](crate::message::ExitMsg) and
/// [`DownMsg`](crate::message::DownMsg) and are recorded as the bounce reason of a
/// closed mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExitReason {
    /// The actor finished its work.
    #[error("normal")]
    Normal,
    /// The actor was asked to shut down by its owner or by the system.
    #[error("user shutdown")]
    UserShutdown,
    /// The actor was killed unconditionally.
    #[error("kill")]
    Kill,
    /// The actor died together with a linked actor.
    #[error("linked actor exited: {0}")]
    Linked(Box<ExitReason>),
    /// The actor was dropped while it had not exited and no strong handle could
    /// reach it.
    #[error("unreachable")]
    Unreachable,
    /// Application-specific reason.
    #[error("{0}")]
    Custom(String),
}

impl ExitReason {
    /// `true` for [`ExitReason::Normal`]; normal exits do not propagate over links.
    pub const fn is_normal(&self) -> bool {
        matches!(self, Self::Normal)
    }
}

/// The single error channel of the core.
///
/// Failed requests, request timeouts, bounced messages and aborted streams are all
/// reported as an `ActorError` carried in a regular reply, so callers handle every
/// failure the same way.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActorError {
    /// The receiver terminated before handling the request.
    #[error("request receiver is down: {0}")]
    RequestReceiverDown(ExitReason),
    /// No reply arrived within the request timeout.
    #[error("request timed out")]
    RequestTimeout,
    /// The receiver has no handler for the message and dropped it.
    #[error("unexpected message")]
    UnexpectedMessage,
    /// A response arrived that no pending request was waiting for.
    #[error("unexpected response")]
    UnexpectedResponse,
    /// The receiver of a stream handshake did not attach a sink or stage.
    #[error("stream initialization failed")]
    StreamInitFailed,
    /// A sink was asked to accept a handshake that still carries downstream stages.
    #[error("cannot add downstream stages to a sink")]
    CannotAddDownstream,
    /// A stage was created without a next hop on the forwarding stack.
    #[error("no downstream stages defined")]
    NoDownstreamStagesDefined,
    /// Stream traffic referenced a slot or role that does not exist.
    #[error("invalid stream state")]
    InvalidStreamState,
    /// The stream was torn down because its owner exited.
    #[error("stream aborted: {0}")]
    StreamAborted(ExitReason),
    /// Application-specific failure.
    #[error("{0}")]
    Custom(String),
}

impl ActorError {
    /// Convenience constructor for [`ActorError::Custom`].
    pub fn custom(reason: impl Into<String>) -> Self {
        Self::Custom(reason.into())
    }
}

impl MessageType for ExitReason {}
impl MessageType for ActorError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_render_their_reason() {
        let err = ActorError::RequestReceiverDown(ExitReason::Custom("boom".into()));
        assert_eq!(err.to_string(), "request receiver is down: boom");
        assert_eq!(ActorError::custom("nope").to_string(), "nope");
        assert!(ExitReason::Normal.is_normal());
        assert!(!ExitReason::Kill.is_normal());
    }
}
