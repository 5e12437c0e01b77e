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

pub use element::{BuiltinType, Element, MessageType, TypeToken};
pub use mailbox_element::MailboxElement;
pub use message::{IntoMessage, Message, Pattern};
pub use message_id::{MessageId, Priority};
pub use system::{DownMsg, ExitMsg, TimeoutMsg};

/// Type-erased values and their runtime type tokens.
mod element;
/// The envelope stored in a mailbox.
mod mailbox_element;
/// The shared, copy-on-write message tuple.
#[allow(clippy::module_inception)]
mod message;
/// Request correlation ids with priority and response flags.
mod message_id;
/// Messages produced by the runtime itself.
mod system;
