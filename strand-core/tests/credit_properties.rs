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

//! Credit bookkeeping properties that must hold for any traffic pattern.

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use strand_core::actor::{ActorCell, ActorHandle};
use strand_core::behavior::Behavior;
use strand_core::common::CoreConfig;
use strand_core::stream::{
    CreditAssignment, CreditController, FixedCreditController, HeuristicCreditController,
    InboundPath, OutboundPath, StreamSlot, StreamSlots,
};
use strand_core::testing::TestScheduler;

/// One thing that can happen to an outbound path.
#[derive(Debug, Clone)]
enum Event {
    /// The producer has this many elements ready.
    Produce(usize),
    /// The consumer acknowledges everything sent so far and grants more credit.
    Ack(u32),
}

fn event() -> impl Strategy<Value = Event> {
    prop_oneof![
        (0usize..64).prop_map(Event::Produce),
        (0u32..32).prop_map(Event::Ack),
    ]
}

proptest! {
    #[test]
    fn heuristic_assignments_stay_within_bounds(
        ceiling in 1u32..10_000,
        initial_credit in 0u32..20_000,
        initial_batch in 0u32..20_000,
        rounds in prop::collection::vec((0usize..100_000, 0u64..1_000_000_000), 1..50),
    ) {
        let mut controller = HeuristicCreditController::new(
            Duration::from_millis(100),
            Duration::from_micros(500),
            CreditAssignment { credit: initial_credit, batch_size: initial_batch },
            ceiling,
        );
        let initial = controller.initial();
        prop_assert!((1..=ceiling).contains(&initial.credit));
        prop_assert!((1..=ceiling).contains(&initial.batch_size));
        for (elements, nanos) in rounds {
            controller.before_processing(elements);
            controller.after_processing(Duration::from_nanos(nanos));
            let assignment = controller.compute();
            prop_assert!((1..=ceiling).contains(&assignment.credit), "{assignment:?}");
            prop_assert!((1..=ceiling).contains(&assignment.batch_size), "{assignment:?}");
        }
    }

    #[test]
    fn producers_never_exceed_granted_credit(
        initial in 0u32..32,
        batch_size in 1u32..16,
        events in prop::collection::vec(event(), 0..200),
    ) {
        let mut path = OutboundPath::new(StreamSlot(1), None);
        prop_assert_eq!(path.take_batch(100), None);
        path.handle_ack_open(StreamSlot(7), dummy_target(), initial, batch_size, initial);

        let mut granted = u64::from(initial);
        let mut sent = 0u64;
        for event in events {
            match event {
                Event::Produce(available) => {
                    let mut remaining = available;
                    while let Some((_, size)) = path.take_batch(remaining) {
                        prop_assert!(size <= batch_size as usize);
                        prop_assert!(size <= remaining);
                        remaining -= size;
                        sent += size as u64;
                    }
                }
                Event::Ack(credit) => {
                    let next = path.next_batch_id;
                    path.handle_ack_batch(credit, batch_size, next, credit);
                    prop_assert!(path.clean());
                    granted += u64::from(credit);
                }
            }
            prop_assert!(sent <= granted);
            prop_assert_eq!(granted - sent, u64::from(path.open_credit));
        }
    }

    #[test]
    fn consumers_never_hold_more_than_the_assignment(
        credit in 1u32..64,
        batches in prop::collection::vec((0u32..64, 0u32..128), 0..100),
    ) {
        let mut path = InboundPath::new(
            StreamSlots::new(StreamSlot(3), StreamSlot(4)),
            None,
            Box::new(FixedCreditController::new(credit, 8)),
        );
        let opened = path.open();
        prop_assert_eq!(opened.credit, credit);
        let mut id = 0u64;
        for (size, downstream) in batches {
            let size = size.min(path.assigned_credit());
            path.handle_batch(size, id);
            id += 1;
            prop_assert!(!path.up_to_date());
            if let Some(ack) = path.emit_ack(downstream) {
                prop_assert!(ack.max_capacity <= credit);
                prop_assert_eq!(ack.next_ack_id, id);
            }
            prop_assert!(path.up_to_date());
            prop_assert!(path.assigned_credit() <= credit);
        }
    }
}

/// Outbound paths need a target once the handshake completes; none is ever messaged here.
fn dummy_target() -> ActorHandle {
    ActorCell::spawn(
        TestScheduler::new(),
        Arc::new(CoreConfig::default()),
        "target",
        |_ctx| Behavior::empty(),
    )
}
