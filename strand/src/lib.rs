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

#![forbid(unsafe_code)]
#![forbid(missing_docs)]

//! # Strand
//!
//! A tokio-backed actor system built on the `strand-core` message-passing and
//! streaming machinery.
//!
//! ## Key Concepts
//!
//! - **Actors**: a mailbox drained by a stack of behaviors. A behavior is a list of
//!   typed handlers; the top of the stack handles the next message.
//! - **Requests**: a request carries an id, and its reply (or an error reply) is
//!   routed back to the requester. Requests left in a dead actor's mailbox are bounced.
//! - **Streams**: sources, stages and sinks exchange batches under credit-based flow
//!   control.
//! - **Detached actors**: actors whose handlers may block run on threads borrowed from
//!   a lock-free worker hub.
//! - **System (`ActorSystem`)**: owns the scheduler, the worker hub and a name registry,
//!   and shuts everything down gracefully.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use strand::prelude::*;
//!
//! #[strand_message(crate = strand::core)]
//! struct Add(i32, i32);
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let system = ActorSystem::launch()?;
//!     let adder = system.spawn("adder", |_ctx| {
//!         Behavior::builder()
//!             .on(|_ctx, Add(a, b): Add| HandlerResult::reply(a + b))
//!             .build()
//!     });
//!     let sum: i32 = system.request_value(&adder, Add(1, 2)).await?;
//!     assert_eq!(sum, 3);
//!     system.shutdown().await
//! }
//! ```

/// The tokio scheduler, the actor system, configuration and tracing setup.
pub(crate) mod common;

pub use strand_core as core;

pub use common::{
    init_tracing, ActorSystem, PathsConfig, StrandConfig, SystemConfig, TokioScheduler,
    TracingConfig, CONFIG,
};

/// A prelude module for conveniently importing the most commonly used items.
///
/// Re-exports the core prelude together with the system types of this crate.
pub mod prelude {
    pub use strand_core::prelude::*;

    pub use crate::common::{init_tracing, ActorSystem, StrandConfig, TokioScheduler};
}
