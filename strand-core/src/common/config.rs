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

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tuning values consumed by the core.
///
/// Every actor receives the configuration by `Arc` when it is spawned; the core never
/// reads process-wide state. All sections default, so a partial TOML document is valid.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Resume-loop tuning
    pub scheduler: SchedulerConfig,
    /// Stream credit tuning
    pub stream: StreamConfig,
    /// Worker hub sizing
    pub workers: WorkerConfig,
    /// Behavior and dispatch policies
    pub behavior: BehaviorConfig,
    /// Default timeouts
    pub timeouts: TimeoutConfig,
}

/// Resume-loop tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum number of messages an actor handles per resume before yielding
    pub max_throughput: usize,
}

/// Which credit controller inbound stream paths use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditPolicy {
    /// Always grant the configured credit and batch size.
    Fixed,
    /// Derive credit and batch size from measured processing time.
    Heuristic,
}

/// Stream credit tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Controller used by new inbound paths
    pub credit_policy: CreditPolicy,
    /// Credit granted with the handshake acknowledgement (and per cycle by the fixed controller)
    pub initial_credit: u32,
    /// Batch size requested from upstream before measurements exist
    pub desired_batch_size: u32,
    /// Upper bound for any credit or batch size assignment
    pub max_credit: u32,
    /// Length of one credit cycle in milliseconds
    pub credit_round_interval_ms: u64,
    /// Processing time one batch should take, in microseconds
    pub desired_batch_complexity_us: u64,
}

/// Worker hub sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Number of workers the hub can pool; further workers are created unpooled
    pub max_workers: usize,
}

/// What the dispatcher does with a message that no handler matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmatchedPolicy {
    /// Reply with an error to requests, discard everything else.
    #[default]
    Drop,
    /// Like `Drop`, but log the message first.
    PrintAndDrop,
    /// Keep the message for a later behavior.
    Skip,
}

/// What `unbecome` does on a stack that holds a single behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnbecomePolicy {
    /// Leave the stack untouched.
    #[default]
    Ignore,
    /// Treat the call as a programmer error and panic.
    Panic,
}

/// Behavior and dispatch policies.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    /// Default handler for unmatched messages
    pub unmatched: UnmatchedPolicy,
    /// Policy for popping the last behavior
    pub unbecome_last: UnbecomePolicy,
}

/// Default timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Timeout for requests issued without an explicit one, in milliseconds
    pub request_timeout_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { max_throughput: 300 }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            credit_policy: CreditPolicy::Heuristic,
            initial_credit: 50,
            desired_batch_size: 10,
            max_credit: 1_000,
            credit_round_interval_ms: 10,
            desired_batch_complexity_us: 50,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { max_workers: 64 }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 5_000,
        }
    }
}

impl StreamConfig {
    /// A credit cycle as a `Duration`.
    pub const fn credit_round_interval(&self) -> Duration {
        Duration::from_millis(self.credit_round_interval_ms)
    }

    /// The per-batch processing target as a `Duration`.
    pub const fn desired_batch_complexity(&self) -> Duration {
        Duration::from_micros(self.desired_batch_complexity_us)
    }
}

impl CoreConfig {
    /// Default request timeout as a `Duration`.
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.request_timeout_ms)
    }

    /// A configuration whose streams use the fixed controller with `credit` per cycle.
    pub fn with_fixed_credit(mut self, credit: u32, batch_size: u32) -> Self {
        self.stream.credit_policy = CreditPolicy::Fixed;
        self.stream.initial_credit = credit;
        self.stream.desired_batch_size = batch_size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_documents_fall_back_to_defaults() {
        let config: CoreConfig = toml::from_str(
            r#"
            [stream]
            credit_policy = "fixed"
            initial_credit = 10

            [behavior]
            unmatched = "skip"
            "#,
        )
        .expect("valid toml");

        assert_eq!(config.stream.credit_policy, CreditPolicy::Fixed);
        assert_eq!(config.stream.initial_credit, 10);
        assert_eq!(config.stream.max_credit, 1_000);
        assert_eq!(config.behavior.unmatched, UnmatchedPolicy::Skip);
        assert_eq!(config.behavior.unbecome_last, UnbecomePolicy::Ignore);
        assert_eq!(config.scheduler.max_throughput, 300);
    }
}
