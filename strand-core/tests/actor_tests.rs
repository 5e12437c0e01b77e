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

use strand_core::behavior::DefaultHandler;
use strand_core::prelude::*;
use strand_core::testing::TestScheduler;

use crate::setup::{log, Back, Log, Start, Stop, Swap};

mod setup;

fn crashed() -> ExitReason {
    ExitReason::Custom("crashed".to_string())
}

/// Replies with its depth; `Swap` pushes the next layer, `Back` pops one.
fn layer(depth: u32) -> Behavior {
    Behavior::builder()
        .on(move |_ctx, _: i32| HandlerResult::reply(depth))
        .on(move |ctx, _: Swap| ctx.become_behavior(layer(depth + 1)))
        .on(|ctx, _: Back| {
            ctx.unbecome();
        })
        .build()
}

#[test]
fn external_request_receives_the_reply() {
    setup::initialize_tracing();
    let scheduler = TestScheduler::new();
    let config = setup::config();
    let doubler = setup::spawn(&scheduler, &config, "doubler", |_ctx| {
        Behavior::builder()
            .on(|_ctx, x: i32| HandlerResult::reply(x * 2))
            .build()
    });

    let mut pending = doubler.request(21_i32);
    assert!(pending.id().is_request());
    scheduler.run();
    assert_eq!(pending.try_receive_value::<i32>(), Some(Ok(42)));
}

#[test]
fn multiplexed_responses_reach_their_own_handlers() {
    let scheduler = TestScheduler::new();
    let config = setup::config();
    let server = setup::spawn(&scheduler, &config, "server", |_ctx| {
        Behavior::builder()
            .on(|_ctx, x: i32| HandlerResult::reply(x * 10))
            .build()
    });
    let results: Log<(i32, i32)> = log();
    let client = {
        let server = server.clone();
        let results = results.clone();
        setup::spawn(&scheduler, &config, "client", move |_ctx| {
            Behavior::builder()
                .on(move |ctx, _: Start| {
                    for x in 1..=3 {
                        let results = results.clone();
                        ctx.request(&server, x, Duration::from_secs(1), move |_ctx, reply| {
                            let value = reply.ok().and_then(|m| m.take::<i32>(0)).unwrap_or(-1);
                            results.lock().push((x, value));
                        });
                    }
                })
                .build()
        })
    };

    client.tell(Start);
    scheduler.run();
    let mut sorted = results.lock().clone();
    sorted.sort_unstable();
    assert_eq!(sorted, vec![(1, 10), (2, 20), (3, 30)]);

    // The replies already arrived; the timeouts that follow are ignored.
    scheduler.advance_time(Duration::from_secs(2));
    scheduler.run();
    assert_eq!(results.lock().len(), 3);
}

#[test]
fn unanswered_request_times_out() {
    let scheduler = TestScheduler::new();
    let config = setup::config();
    let silent = setup::spawn(&scheduler, &config, "silent", |_ctx| {
        Behavior::builder()
            .on(|_ctx, _: i32| HandlerResult::Skip)
            .build()
    });
    let outcome: Log<Result<Message, ActorError>> = log();
    let client = {
        let outcome = outcome.clone();
        setup::spawn(&scheduler, &config, "client", move |_ctx| {
            Behavior::builder()
                .on(move |ctx, _: Start| {
                    let outcome = outcome.clone();
                    ctx.request(&silent, 1_i32, Duration::from_millis(100), move |_ctx, reply| {
                        outcome.lock().push(reply);
                    });
                })
                .build()
        })
    };

    client.tell(Start);
    scheduler.run();
    assert!(outcome.lock().is_empty());

    scheduler.advance_time(Duration::from_millis(99));
    scheduler.run();
    assert!(outcome.lock().is_empty());

    scheduler.advance_time(Duration::from_millis(1));
    scheduler.run();
    let outcome = outcome.lock();
    assert_eq!(outcome.len(), 1);
    assert_eq!(outcome[0].as_ref().err(), Some(&ActorError::RequestTimeout));
}

#[test]
fn requests_to_a_terminated_actor_bounce() {
    let scheduler = TestScheduler::new();
    let config = setup::config();
    let target = setup::spawn(&scheduler, &config, "short-lived", |ctx| {
        ctx.quit(ExitReason::UserShutdown);
        Behavior::empty()
    });
    scheduler.run();
    assert_eq!(target.exit_reason(), Some(ExitReason::UserShutdown));

    let mut pending = target.request(1_i32);
    assert_eq!(
        pending.try_receive_value::<i32>(),
        Some(Err(ActorError::RequestReceiverDown(ExitReason::UserShutdown)))
    );
    assert_eq!(target.tell(1_i32), InboxResult::QueueClosed);
}

#[test]
fn nested_become_and_unbecome() {
    let scheduler = TestScheduler::new();
    let config = setup::config();
    let actor = setup::spawn(&scheduler, &config, "layers", |_ctx| layer(0));

    let mut replies = Vec::new();
    replies.push(actor.request(0_i32));
    actor.tell(Swap);
    actor.tell(Swap);
    replies.push(actor.request(0_i32));
    actor.tell(Back);
    replies.push(actor.request(0_i32));
    actor.tell(Back);
    // Popping the last behavior is ignored by default.
    actor.tell(Back);
    replies.push(actor.request(0_i32));
    scheduler.run();

    let depths: Vec<_> = replies
        .iter_mut()
        .map(|reply| reply.try_receive_value::<u32>())
        .collect();
    assert_eq!(depths, vec![Some(Ok(0)), Some(Ok(2)), Some(Ok(1)), Some(Ok(0))]);
}

#[test]
fn skipped_messages_return_in_order_after_a_behavior_change() {
    let scheduler = TestScheduler::new();
    let config = setup::config();
    let seen: Log<String> = log();
    let actor = {
        let seen = seen.clone();
        setup::spawn(&scheduler, &config, "gate", move |_ctx| {
            let open = Behavior::builder()
                .on(move |_ctx, s: String| seen.lock().push(s))
                .build();
            Behavior::builder()
                .on(|_ctx, _: String| HandlerResult::Skip)
                .on(move |ctx, _: Swap| ctx.become_behavior(open.clone()))
                .build()
        })
    };

    actor.tell("a".to_string());
    actor.tell("b".to_string());
    actor.tell(Swap);
    actor.tell("c".to_string());
    scheduler.run();

    assert_eq!(*seen.lock(), vec!["a", "b", "c"]);
}

#[test]
fn default_handler_policies() {
    let scheduler = TestScheduler::new();
    let config = setup::config();

    let dropping = setup::spawn(&scheduler, &config, "dropping", |_ctx| {
        Behavior::builder().on(|_ctx, _: Start| ()).build()
    });
    let mut dropped = dropping.request(7_u64);

    let seen: Log<u64> = log();
    let skipping = {
        let seen = seen.clone();
        setup::spawn(&scheduler, &config, "skipping", move |ctx| {
            ctx.set_default_handler(DefaultHandler::Skip);
            let ready = Behavior::builder()
                .on(move |_ctx, x: u64| seen.lock().push(x))
                .build();
            Behavior::builder()
                .on(move |ctx, _: Swap| ctx.become_behavior(ready.clone()))
                .build()
        })
    };
    skipping.tell(1_u64);
    skipping.tell(2_u64);
    scheduler.run();
    assert!(seen.lock().is_empty());
    assert_eq!(skipping.exit_reason(), None);

    skipping.tell(Swap);
    scheduler.run();

    assert_eq!(
        dropped.try_receive_value::<u64>(),
        Some(Err(ActorError::UnexpectedMessage))
    );
    assert_eq!(*seen.lock(), vec![1, 2]);
}

#[test]
fn behavior_timeout_rearms_after_each_message() {
    let scheduler = TestScheduler::new();
    let config = setup::config();
    let fired: Log<Duration> = log();
    let actor = {
        let fired = fired.clone();
        let clock = scheduler.clone();
        setup::spawn(&scheduler, &config, "sleepy", move |_ctx| {
            Behavior::builder()
                .on(|_ctx, _: Start| ())
                .after(Duration::from_millis(100), move |_ctx| fired.lock().push(clock.now()))
                .build()
        })
    };
    scheduler.run();

    scheduler.advance_time(Duration::from_millis(50));
    actor.tell(Start);
    scheduler.run();

    // The timeout armed at start is stale now.
    scheduler.advance_time(Duration::from_millis(60));
    scheduler.run();
    assert!(fired.lock().is_empty());

    scheduler.advance_time(Duration::from_millis(40));
    scheduler.run();
    assert_eq!(*fired.lock(), vec![Duration::from_millis(150)]);

    // Firing re-arms the timeout.
    scheduler.advance_time(Duration::from_millis(100));
    scheduler.run();
    assert_eq!(fired.lock().len(), 2);
}

#[test]
fn monitors_receive_down_messages() {
    let scheduler = TestScheduler::new();
    let config = setup::config();
    let target = setup::spawn(&scheduler, &config, "target", |_ctx| Behavior::empty());
    let downs: Log<DownMsg> = log();
    let _watcher = {
        let target = target.clone();
        let downs = downs.clone();
        setup::spawn(&scheduler, &config, "watcher", move |ctx| {
            ctx.monitor(&target);
            Behavior::builder()
                .on(move |_ctx, down: DownMsg| downs.lock().push(down))
                .build()
        })
    };
    scheduler.run();

    target.exit(crashed());
    scheduler.run();

    assert_eq!(
        *downs.lock(),
        vec![DownMsg {
            source: target.id(),
            reason: crashed(),
        }]
    );
}

#[test]
fn dropped_actors_notify_monitors_and_links() {
    let scheduler = TestScheduler::new();
    let config = setup::config();
    let target = setup::spawn(&scheduler, &config, "target", |_ctx| Behavior::empty());
    let target_id = target.id();
    let downs: Log<DownMsg> = log();
    let exits: Log<ExitReason> = log();
    let _watcher = {
        let target = target.clone();
        let downs = downs.clone();
        setup::spawn(&scheduler, &config, "watcher", move |ctx| {
            ctx.monitor(&target);
            Behavior::builder()
                .on(move |_ctx, down: DownMsg| downs.lock().push(down))
                .build()
        })
    };
    let _peer = {
        let target = target.clone();
        let exits = exits.clone();
        setup::spawn(&scheduler, &config, "peer", move |ctx| {
            ctx.trap_exit(true);
            ctx.link_to(&target);
            Behavior::builder()
                .on(move |_ctx, exit: ExitMsg| exits.lock().push(exit.reason))
                .build()
        })
    };
    scheduler.run();
    assert!(downs.lock().is_empty());

    drop(target);
    scheduler.run();

    assert_eq!(
        *downs.lock(),
        vec![DownMsg {
            source: target_id,
            reason: ExitReason::Unreachable,
        }]
    );
    assert_eq!(*exits.lock(), vec![ExitReason::Unreachable]);
}

#[test]
fn monitoring_a_dead_actor_fires_at_once() {
    let scheduler = TestScheduler::new();
    let config = setup::config();
    let target = setup::spawn(&scheduler, &config, "target", |ctx| {
        ctx.quit(ExitReason::Normal);
        Behavior::empty()
    });
    scheduler.run();

    let downs: Log<ExitReason> = log();
    let _watcher = {
        let downs = downs.clone();
        setup::spawn(&scheduler, &config, "late-watcher", move |ctx| {
            ctx.monitor(&target);
            Behavior::builder()
                .on(move |_ctx, down: DownMsg| downs.lock().push(down.reason))
                .build()
        })
    };
    scheduler.run();

    assert_eq!(*downs.lock(), vec![ExitReason::Normal]);
}

#[test]
fn abnormal_exit_propagates_through_links() {
    let scheduler = TestScheduler::new();
    let config = setup::config();
    let crashing = setup::spawn(&scheduler, &config, "crashing", |_ctx| Behavior::empty());
    let linked = {
        let crashing = crashing.clone();
        setup::spawn(&scheduler, &config, "linked", move |ctx| {
            ctx.link_to(&crashing);
            Behavior::builder().on(|_ctx, _: Start| ()).build()
        })
    };
    scheduler.run();

    crashing.exit(crashed());
    scheduler.run();

    assert_eq!(
        linked.exit_reason(),
        Some(ExitReason::Linked(Box::new(crashed())))
    );
}

#[test]
fn trapped_exits_become_messages() {
    let scheduler = TestScheduler::new();
    let config = setup::config();
    let crashing = setup::spawn(&scheduler, &config, "crashing", |_ctx| Behavior::empty());
    let exits: Log<ExitMsg> = log();
    let trapping = {
        let crashing = crashing.clone();
        let exits = exits.clone();
        setup::spawn(&scheduler, &config, "trapping", move |ctx| {
            ctx.trap_exit(true);
            ctx.link_to(&crashing);
            Behavior::builder()
                .on(move |_ctx, exit: ExitMsg| exits.lock().push(exit))
                .build()
        })
    };
    scheduler.run();

    crashing.exit(crashed());
    scheduler.run();

    assert_eq!(trapping.exit_reason(), None);
    assert_eq!(
        *exits.lock(),
        vec![ExitMsg {
            source: Some(crashing.id()),
            reason: crashed(),
        }]
    );
}

#[test]
fn normal_exits_of_linked_actors_are_ignored() {
    let scheduler = TestScheduler::new();
    let config = setup::config();
    let finishing = setup::spawn(&scheduler, &config, "finishing", |_ctx| {
        Behavior::builder()
            .on(|ctx, _: Stop| ctx.quit(ExitReason::Normal))
            .build()
    });
    let linked = {
        let finishing = finishing.clone();
        setup::spawn(&scheduler, &config, "linked", move |ctx| {
            ctx.link_to(&finishing);
            Behavior::builder().on(|_ctx, _: Start| ()).build()
        })
    };
    scheduler.run();

    finishing.tell(Stop);
    scheduler.run();

    assert_eq!(finishing.exit_reason(), Some(ExitReason::Normal));
    assert_eq!(linked.exit_reason(), None);
}

#[test]
fn delegated_requests_are_answered_by_the_delegate() {
    let scheduler = TestScheduler::new();
    let config = setup::config();
    let back = setup::spawn(&scheduler, &config, "back", |_ctx| {
        Behavior::builder()
            .on(|_ctx, x: i32| HandlerResult::reply(x + 1))
            .build()
    });
    let front = setup::spawn(&scheduler, &config, "front", move |_ctx| {
        Behavior::builder()
            .on(move |ctx, x: i32| {
                ctx.delegate(&back, x * 100);
            })
            .build()
    });

    let mut pending = front.request(4_i32);
    scheduler.run();
    assert_eq!(pending.try_receive_value::<i32>(), Some(Ok(401)));
}

#[test]
fn delayed_messages_arrive_on_the_virtual_clock() {
    let scheduler = TestScheduler::new();
    let config = setup::config();
    let seen: Log<&'static str> = log();
    let actor = {
        let seen = seen.clone();
        setup::spawn(&scheduler, &config, "delayed", move |_ctx| {
            Behavior::builder()
                .on(|ctx, _: Start| {
                    let me = ctx.self_handle();
                    ctx.send_later(&me, Duration::from_millis(30), "later");
                })
                .on(move |_ctx, text: &'static str| seen.lock().push(text))
                .build()
        })
    };

    actor.tell(Start);
    scheduler.run();
    assert_eq!(scheduler.pending_timers(), 1);
    assert!(seen.lock().is_empty());

    assert_eq!(scheduler.advance_time(Duration::from_millis(30)), 1);
    scheduler.run();
    assert_eq!(*seen.lock(), vec!["later"]);
}

#[test]
fn spawned_children_share_the_scheduler() {
    let scheduler = TestScheduler::new();
    let config = setup::config();
    let parent = setup::spawn(&scheduler, &config, "parent", |_ctx| {
        Behavior::builder()
            .on(|ctx, x: i32| {
                let child = ctx.spawn("child", |_ctx| {
                    Behavior::builder()
                        .on(|_ctx, x: i32| HandlerResult::reply(x - 1))
                        .build()
                });
                ctx.delegate(&child, x);
            })
            .build()
    });

    let mut pending = parent.request(10_i32);
    scheduler.run();
    assert_eq!(pending.try_receive_value::<i32>(), Some(Ok(9)));
}

#[test]
fn throughput_bounds_each_resume() {
    let scheduler = TestScheduler::with_max_throughput(2);
    let config = setup::config();
    let handled: Log<i32> = log();
    let actor = {
        let handled = handled.clone();
        setup::spawn(&scheduler, &config, "busy", move |_ctx| {
            Behavior::builder()
                .on(move |_ctx, x: i32| handled.lock().push(x))
                .build()
        })
    };
    for x in 0..5 {
        actor.tell(x);
    }

    assert!(scheduler.run_once());
    assert_eq!(handled.lock().len(), 2);
    assert!(scheduler.has_jobs());
    scheduler.run();
    assert_eq!(*handled.lock(), vec![0, 1, 2, 3, 4]);
    assert_eq!(scheduler.schedule_count(actor.id()), 1);
}
