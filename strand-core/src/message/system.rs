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

use strand_macro::strand_message;

use crate::common::{ActorId, ExitReason};

/// Sent to linked actors when an actor exits.
///
/// A non-normal reason terminates a receiver that does not trap exits; trapping
/// actors receive the message through their behavior like any other.
#[strand_message]
#[derive(PartialEq, Eq)]
pub struct ExitMsg {
    /// The exiting actor, `None` when the runtime itself asks for the exit.
    pub source: Option<ActorId>,
    /// Why it exited.
    pub reason: ExitReason,
}

/// Sent to monitors when the monitored actor exits.
#[strand_message]
#[derive(PartialEq, Eq)]
pub struct DownMsg {
    /// The actor that went down.
    pub source: ActorId,
    /// Why it exited.
    pub reason: ExitReason,
}

/// Fires the timeout of the behavior that was active when it was armed.
///
/// A timeout whose generation no longer matches the actor's current one is stale and
/// ignored.
#[strand_message]
pub struct TimeoutMsg {
    /// Behavior generation at arming time.
    pub generation: u64,
}
