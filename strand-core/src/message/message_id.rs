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
use std::sync::atomic::{AtomicU64, Ordering};

const RESPONSE_FLAG: u64 = 1 << 63;
const ANSWERED_FLAG: u64 = 1 << 62;
const HIGH_PRIORITY_FLAG: u64 = 1 << 61;
const REQUEST_ID_MASK: u64 = HIGH_PRIORITY_FLAG - 1;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Mailbox sub-queue an element is delivered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Priority {
    /// Regular FIFO traffic.
    #[default]
    Normal,
    /// Dequeued before any normal element.
    High,
}

/// Correlation id of a mailbox element.
///
/// The low bits hold the request number (zero for fire-and-forget messages); the top
/// three bits mark responses, answered requests and high priority.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MessageId(u64);

impl MessageId {
    /// Id of a fire-and-forget message with normal priority.
    pub const fn make() -> Self {
        Self(0)
    }

    /// Id of a fire-and-forget message with `priority`.
    pub const fn with_priority_of(priority: Priority) -> Self {
        Self::make().with_priority(priority)
    }

    /// Allocates a fresh, process-unique request id.
    pub fn next_request(priority: Priority) -> Self {
        let raw = NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed) & REQUEST_ID_MASK;
        Self(raw).with_priority(priority)
    }

    /// The request number without flags.
    pub const fn request_id(self) -> u64 {
        self.0 & REQUEST_ID_MASK
    }

    /// Raw integer value including flags.
    pub const fn integer_value(self) -> u64 {
        self.0
    }

    /// `true` for fire-and-forget messages.
    pub const fn is_async(self) -> bool {
        self.request_id() == 0 && !self.is_response()
    }

    /// `true` if the sender expects a reply.
    pub const fn is_request(self) -> bool {
        self.request_id() != 0 && !self.is_response()
    }

    /// `true` if this element answers a request.
    pub const fn is_response(self) -> bool {
        self.0 & RESPONSE_FLAG != 0
    }

    /// `true` once a reply for this request has been sent or delegated.
    pub const fn is_answered(self) -> bool {
        self.0 & ANSWERED_FLAG != 0
    }

    /// Marks the request as answered.
    pub fn mark_answered(&mut self) {
        self.0 |= ANSWERED_FLAG;
    }

    /// The id a reply to this request carries; fire-and-forget ids map to `make()`.
    pub const fn response_id(self) -> Self {
        if self.is_request() {
            Self((self.0 & (REQUEST_ID_MASK | HIGH_PRIORITY_FLAG)) | RESPONSE_FLAG)
        } else {
            Self::make()
        }
    }

    /// Sub-queue of the element.
    pub const fn priority(self) -> Priority {
        if self.0 & HIGH_PRIORITY_FLAG != 0 {
            Priority::High
        } else {
            Priority::Normal
        }
    }

    /// Same id with a different priority.
    #[must_use]
    pub const fn with_priority(self, priority: Priority) -> Self {
        match priority {
            Priority::High => Self(self.0 | HIGH_PRIORITY_FLAG),
            Priority::Normal => Self(self.0 & !HIGH_PRIORITY_FLAG),
        }
    }
}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_response() {
            "response"
        } else if self.is_request() {
            "request"
        } else {
            "async"
        };
        write!(f, "MessageId({kind} {}, {:?}", self.request_id(), self.priority())?;
        if self.is_answered() {
            f.write_str(", answered")?;
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn async_ids_are_neither_requests_nor_responses() {
        let id = MessageId::make();
        assert!(id.is_async());
        assert!(!id.is_request());
        assert!(!id.is_response());
        assert_eq!(id.response_id(), MessageId::make());
    }

    #[test]
    fn response_ids_keep_request_number_and_priority() {
        let request = MessageId::next_request(Priority::High);
        assert!(request.is_request());
        let response = request.response_id();
        assert!(response.is_response());
        assert!(!response.is_request());
        assert_eq!(response.request_id(), request.request_id());
        assert_eq!(response.priority(), Priority::High);
    }

    #[test]
    fn answered_flag_is_sticky() {
        let mut request = MessageId::next_request(Priority::Normal);
        assert!(!request.is_answered());
        request.mark_answered();
        assert!(request.is_answered());
        assert!(request.is_request());
        assert_eq!(request.with_priority(Priority::High).priority(), Priority::High);
    }
}
