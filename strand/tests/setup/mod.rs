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

//! Messages shared by the system tests.

use strand::prelude::*;

#[strand_message]
pub struct Add(pub i32, pub i32);

#[strand_message]
pub struct Block(pub u64);

#[strand_message]
pub struct Ping;

#[strand_message]
pub struct Pong;

/// An adder that replies with the sum of its two operands.
pub fn adder(_ctx: &mut ActorContext<'_>) -> Behavior {
    Behavior::builder()
        .on(|_ctx, Add(a, b): Add| HandlerResult::reply(a + b))
        .on(|_ctx, _: Ping| HandlerResult::reply(Pong))
        .build()
}
