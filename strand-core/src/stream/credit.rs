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

//! Credit controllers.
//!
//! An inbound path asks its controller once per cycle how much credit the upstream
//! may hold in total and which batch size it should use. The path then grants the
//! difference between that capacity and the credit still outstanding.

use std::time::Duration;

use crate::common::{CreditPolicy, StreamConfig};

/// Credit and batch size for one control cycle.
///
/// Both values are at least zero by type and never exceed the configured ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CreditAssignment {
    /// Total credit the upstream may hold.
    pub credit: u32,
    /// Preferred number of elements per batch.
    pub batch_size: u32,
}

/// Computes [`CreditAssignment`]s from processing statistics.
pub trait CreditController: Send {
    /// Assignment sent with the handshake acknowledgement.
    fn initial(&mut self) -> CreditAssignment;

    /// Records that a batch of `elements` is about to be processed.
    fn before_processing(&mut self, elements: usize);

    /// Records how long processing the last batch took.
    fn after_processing(&mut self, elapsed: Duration);

    /// Assignment for the next cycle. Resets the collected statistics.
    fn compute(&mut self) -> CreditAssignment;
}

/// Grants the same credit every cycle. Deterministic; used in tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedCreditController {
    assignment: CreditAssignment,
}

impl FixedCreditController {
    /// A controller granting `credit` per cycle in batches of `batch_size`.
    pub const fn new(credit: u32, batch_size: u32) -> Self {
        Self {
            assignment: CreditAssignment { credit, batch_size },
        }
    }
}

impl CreditController for FixedCreditController {
    fn initial(&mut self) -> CreditAssignment {
        self.assignment
    }

    fn before_processing(&mut self, _elements: usize) {}

    fn after_processing(&mut self, _elapsed: Duration) {}

    fn compute(&mut self) -> CreditAssignment {
        self.assignment
    }
}

/// Sizes credit from measured processing time.
///
/// With `n` elements processed in time `t`, a cycle of length `c` fits `c * n / t`
/// elements and a batch that should take `d` fits `d * n / t`. The controller grants
/// enough credit to keep the consumer busy for two cycles.
#[derive(Debug, Clone)]
pub struct HeuristicCreditController {
    cycle: Duration,
    complexity: Duration,
    ceiling: u32,
    last: CreditAssignment,
    elements: u64,
    processing: Duration,
}

impl HeuristicCreditController {
    /// A controller for cycles of `cycle` and batches that should take `complexity`.
    pub fn new(
        cycle: Duration,
        complexity: Duration,
        initial: CreditAssignment,
        ceiling: u32,
    ) -> Self {
        let ceiling = ceiling.max(1);
        Self {
            cycle,
            complexity,
            ceiling,
            last: CreditAssignment {
                credit: initial.credit.clamp(1, ceiling),
                batch_size: initial.batch_size.clamp(1, ceiling),
            },
            elements: 0,
            processing: Duration::ZERO,
        }
    }

    fn scaled(&self, window: Duration) -> u32 {
        let elements = u128::from(self.elements);
        let nanos = self.processing.as_nanos().max(1);
        let value = window.as_nanos().saturating_mul(elements) / nanos;
        u32::try_from(value).unwrap_or(u32::MAX).clamp(1, self.ceiling)
    }
}

impl CreditController for HeuristicCreditController {
    fn initial(&mut self) -> CreditAssignment {
        self.last
    }

    fn before_processing(&mut self, elements: usize) {
        self.elements = self.elements.saturating_add(elements as u64);
    }

    fn after_processing(&mut self, elapsed: Duration) {
        self.processing = self.processing.saturating_add(elapsed);
    }

    fn compute(&mut self) -> CreditAssignment {
        if self.elements == 0 {
            return self.last;
        }
        let throughput = self.scaled(self.cycle);
        self.last = CreditAssignment {
            credit: throughput.saturating_mul(2).min(self.ceiling),
            batch_size: self.scaled(self.complexity),
        };
        self.elements = 0;
        self.processing = Duration::ZERO;
        self.last
    }
}

/// The controller `config` selects for a new inbound path.
pub fn controller_for(config: &StreamConfig) -> Box<dyn CreditController> {
    let ceiling = config.max_credit.max(1);
    match config.credit_policy {
        CreditPolicy::Fixed => Box::new(FixedCreditController::new(
            config.initial_credit.min(ceiling),
            config.desired_batch_size.clamp(1, ceiling),
        )),
        CreditPolicy::Heuristic => Box::new(HeuristicCreditController::new(
            config.credit_round_interval(),
            config.desired_batch_complexity(),
            CreditAssignment {
                credit: config.initial_credit,
                batch_size: config.desired_batch_size,
            },
            ceiling,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heuristic() -> HeuristicCreditController {
        HeuristicCreditController::new(
            Duration::from_millis(10),
            Duration::from_micros(50),
            CreditAssignment {
                credit: 50,
                batch_size: 10,
            },
            1_000,
        )
    }

    #[test]
    fn heuristic_keeps_initial_values_without_measurements() {
        let mut controller = heuristic();
        assert_eq!(
            controller.compute(),
            CreditAssignment {
                credit: 50,
                batch_size: 10
            }
        );
    }

    #[test]
    fn heuristic_scales_with_measured_throughput() {
        let mut controller = heuristic();
        // 100 elements in 1ms: 1000 per 10ms cycle, 5 per 50us batch.
        controller.before_processing(100);
        controller.after_processing(Duration::from_millis(1));
        let assignment = controller.compute();
        assert_eq!(assignment.batch_size, 5);
        assert_eq!(assignment.credit, 1_000);
    }

    #[test]
    fn heuristic_never_leaves_its_bounds() {
        let mut controller = heuristic();
        controller.before_processing(1);
        controller.after_processing(Duration::from_secs(10));
        let slow = controller.compute();
        assert_eq!(slow, CreditAssignment { credit: 2, batch_size: 1 });

        controller.before_processing(usize::MAX);
        controller.after_processing(Duration::from_nanos(1));
        let fast = controller.compute();
        assert_eq!(fast.credit, 1_000);
        assert_eq!(fast.batch_size, 1_000);
    }

    #[test]
    fn fixed_controller_is_constant() {
        let mut controller = FixedCreditController::new(10, 5);
        controller.before_processing(10);
        controller.after_processing(Duration::from_secs(1));
        assert_eq!(controller.initial(), controller.compute());
    }
}
