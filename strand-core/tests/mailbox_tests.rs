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

use std::sync::Arc;
use std::thread;

use strand_core::message::MailboxElement;
use strand_core::prelude::*;
use strand_core::testing::TestScheduler;

mod setup;

fn element(value: i32) -> MailboxElement {
    MailboxElement::anonymous(Message::new(value))
}

fn urgent(value: i32) -> MailboxElement {
    MailboxElement::new(None, MessageId::with_priority_of(Priority::High), Message::new(value))
}

fn value_of(element: MailboxElement) -> i32 {
    element.content.take::<i32>(0).expect("an i32 element")
}

#[test]
fn dequeue_is_fifo_with_urgent_elements_first() {
    let mailbox = Mailbox::new();
    mailbox.enqueue(element(1));
    mailbox.enqueue(urgent(10));
    mailbox.enqueue(element(2));
    mailbox.enqueue(urgent(11));

    let order: Vec<i32> = std::iter::from_fn(|| mailbox.dequeue()).map(value_of).collect();
    assert_eq!(order, vec![10, 11, 1, 2]);
}

#[test]
fn parked_mailbox_reports_the_wakeup_once() {
    let mailbox = Mailbox::new();
    assert!(mailbox.try_block());
    assert!(mailbox.is_blocked());

    assert_eq!(mailbox.enqueue(element(1)), InboxResult::UnblockedReader);
    assert_eq!(mailbox.enqueue(element(2)), InboxResult::Success);
    assert!(!mailbox.is_blocked());
}

#[test]
fn non_empty_mailbox_refuses_to_park() {
    let mailbox = Mailbox::new();
    mailbox.enqueue(element(1));
    assert!(!mailbox.try_block());

    assert!(mailbox.dequeue().is_some());
    assert!(mailbox.try_block());
    assert!(mailbox.try_unblock());
    assert!(!mailbox.is_blocked());
}

#[test]
fn closed_mailbox_returns_leftovers_and_rejects_new_elements() {
    let mailbox = Mailbox::new();
    mailbox.enqueue(element(1));
    mailbox.enqueue(element(2));
    assert!(mailbox.dequeue().is_some());
    mailbox.stash(element(3));

    let leftovers = mailbox.close(ExitReason::UserShutdown);
    assert_eq!(leftovers.len(), 2);
    assert!(mailbox.is_closed());
    assert_eq!(mailbox.close_reason(), Some(&ExitReason::UserShutdown));
    assert_eq!(mailbox.enqueue(element(4)), InboxResult::QueueClosed);
    assert!(mailbox.dequeue().is_none());
}

#[test]
fn unstash_restores_original_order_ahead_of_newer_elements() {
    let mailbox = Mailbox::new();
    for value in 1..=3 {
        mailbox.enqueue(element(value));
    }
    for _ in 0..2 {
        let skipped = mailbox.dequeue().expect("element");
        mailbox.stash(skipped);
    }
    mailbox.enqueue(element(4));
    assert_eq!(mailbox.stashed(), 2);

    assert_eq!(mailbox.unstash(), 2);
    let order: Vec<i32> = std::iter::from_fn(|| mailbox.dequeue()).map(value_of).collect();
    assert_eq!(order, vec![1, 2, 3, 4]);
}

#[test]
fn stashed_elements_do_not_keep_the_consumer_awake() {
    let mailbox = Mailbox::new();
    mailbox.enqueue(element(1));
    let skipped = mailbox.dequeue().expect("element");
    mailbox.stash(skipped);

    assert!(mailbox.is_empty());
    assert!(mailbox.try_block());
}

#[test]
fn concurrent_producers_keep_per_producer_order() {
    const PRODUCERS: i32 = 8;
    const PER_PRODUCER: i32 = 2_000;

    let mailbox = Arc::new(Mailbox::new());
    let producers: Vec<_> = (0..PRODUCERS)
        .map(|producer| {
            let mailbox = mailbox.clone();
            thread::spawn(move || {
                for seq in 0..PER_PRODUCER {
                    mailbox.enqueue(MailboxElement::anonymous(Message::new((producer, seq))));
                }
            })
        })
        .collect();

    let mut last_seen = vec![-1; PRODUCERS as usize];
    let mut received = 0;
    while received < PRODUCERS * PER_PRODUCER {
        match mailbox.dequeue() {
            Some(element) => {
                let (producer, seq) = element
                    .content
                    .extract::<(i32, i32)>()
                    .expect("a (producer, seq) pair");
                assert!(seq > last_seen[producer as usize], "producer {producer} reordered");
                last_seen[producer as usize] = seq;
                received += 1;
            }
            None => thread::yield_now(),
        }
    }
    for producer in producers {
        producer.join().expect("producer panicked");
    }
    assert!(mailbox.dequeue().is_none());
}

#[test]
fn bouncer_answers_queued_requests() {
    setup::initialize_tracing();
    let scheduler = TestScheduler::new();
    let config = setup::config();
    let receiver = setup::spawn(&scheduler, &config, "never-runs", |_ctx| Behavior::empty());
    let mut first = receiver.request(1_i32);
    let mut second = receiver.request(2_i32);

    receiver.exit(ExitReason::Kill);
    scheduler.run();
    let expected = ActorError::RequestReceiverDown(ExitReason::Kill);
    assert_eq!(first.try_receive_value::<i32>(), Some(Err(expected.clone())));
    assert_eq!(second.try_receive_value::<i32>(), Some(Err(expected)));
}
