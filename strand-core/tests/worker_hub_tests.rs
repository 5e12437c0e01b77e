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

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use strand_core::prelude::*;
use strand_core::testing::TestScheduler;
use strand_core::worker::spawn_detached;

mod setup;

#[test]
fn concurrent_push_and_pop_never_share_a_worker() {
    setup::initialize_tracing();
    const WORKERS: usize = 8;
    const ROUNDS: usize = 5_000;

    let hub = WorkerHub::with_capacity(WORKERS);
    let workers: Vec<Worker> = (0..WORKERS).map(|_| hub.new_worker()).collect();
    for worker in workers {
        hub.push(worker);
    }
    let busy: Arc<Vec<AtomicBool>> = Arc::new((0..WORKERS).map(|_| AtomicBool::new(false)).collect());
    let taken = Arc::new(AtomicUsize::new(0));

    let threads: Vec<_> = (0..4)
        .map(|_| {
            let hub = hub.clone();
            let busy = busy.clone();
            let taken = taken.clone();
            thread::spawn(move || {
                for _ in 0..ROUNDS {
                    let Some(worker) = hub.pop() else {
                        thread::yield_now();
                        continue;
                    };
                    let index = worker.index().expect("hub workers are pooled");
                    assert!(
                        !busy[index].swap(true, Ordering::AcqRel),
                        "worker {index} handed out twice"
                    );
                    taken.fetch_add(1, Ordering::Relaxed);
                    busy[index].store(false, Ordering::Release);
                    hub.push(worker);
                }
            })
        })
        .collect();
    for handle in threads {
        handle.join().expect("stress thread panicked");
    }

    assert!(taken.load(Ordering::Relaxed) > 0);
    let mut indices: Vec<usize> = std::iter::from_fn(|| hub.pop())
        .filter_map(|worker| worker.index())
        .collect();
    indices.sort_unstable();
    assert_eq!(indices, (0..WORKERS).collect::<Vec<_>>());
    assert_eq!(hub.created(), WORKERS);
}

#[test]
fn shut_down_hub_stops_returning_workers() {
    let hub = WorkerHub::with_capacity(2);
    let idle = hub.new_worker();
    let running = hub.new_worker();
    hub.push(idle);

    hub.shutdown();
    assert!(hub.is_empty());

    hub.push(running);
    assert!(hub.is_empty());
    assert!(hub.pop().is_none());
}

/// Replies with the name of the thread that ran the handler, after blocking it.
fn sleepy(_ctx: &mut ActorContext<'_>) -> Behavior {
    Behavior::builder()
        .on(|_ctx, millis: u64| {
            thread::sleep(Duration::from_millis(millis));
            let name = thread::current().name().unwrap_or_default().to_string();
            HandlerResult::reply(name)
        })
        .build()
}

#[tokio::test]
async fn detached_actors_run_on_hub_workers() {
    let hub = WorkerHub::with_capacity(2);
    let timers = TestScheduler::new();
    let actor = spawn_detached(&hub, timers, setup::config(), "sleepy", sleepy);

    let name = actor
        .request(20_u64)
        .receive_value::<String>(Duration::from_secs(5))
        .await
        .expect("detached actor did not reply");
    assert!(name.starts_with("strand-worker"), "ran on {name}");
    assert_eq!(hub.created(), 1);

    // Once parked, the worker returns to the hub and serves the next burst.
    for _ in 0..100 {
        if !hub.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(!hub.is_empty());
    let again = actor
        .request(0_u64)
        .receive_value::<String>(Duration::from_secs(5))
        .await
        .expect("detached actor did not reply");
    assert_eq!(again, name);
    assert_eq!(hub.created(), 1);

    hub.shutdown();
}
