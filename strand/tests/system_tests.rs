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

use std::io::Write;
use std::time::Duration;

use strand::prelude::*;
use strand_test::strand_test;

use crate::setup::{adder, Add, Block, Ping, Pong};

mod setup;

fn test_config() -> StrandConfig {
    let mut config = StrandConfig::default();
    config.system.shutdown_timeout_ms = 2_000;
    config.core.timeouts.request_timeout_ms = 2_000;
    config
}

#[strand_test]
async fn request_receives_the_reply() -> anyhow::Result<()> {
    strand_test::initialize_tracing();
    let system = ActorSystem::with_config(test_config())?;
    let adder = system.spawn("adder", adder);

    let sum: i32 = system.request_value(&adder, Add(20, 22)).await?;
    assert_eq!(sum, 42);
    let pong = system.request(&adder, Ping).await?;
    assert!(pong.is::<Pong>());

    system.shutdown().await
}

#[strand_test]
async fn unmatched_request_gets_an_error_reply() -> anyhow::Result<()> {
    let system = ActorSystem::with_config(test_config())?;
    let adder = system.spawn("adder", adder);

    let reply = system.request(&adder, "no handler for strings".to_string()).await;
    assert_eq!(reply.err(), Some(ActorError::UnexpectedMessage));

    system.shutdown().await
}

#[strand_test]
async fn registered_names_resolve_to_live_actors() -> anyhow::Result<()> {
    let system = ActorSystem::with_config(test_config())?;
    let first = system.spawn("adder", adder);
    system.register("math", &first)?;
    assert!(system.register("math", &first).is_err());
    assert_eq!(system.lookup("math"), Some(first.clone()));

    first.exit(ExitReason::Kill);
    let reason = system.terminated(&first).await;
    assert_eq!(reason, ExitReason::Kill);
    assert_eq!(system.lookup("math"), None);

    let second = system.spawn("adder", adder);
    system.register("math", &second)?;
    assert_eq!(system.lookup("math"), Some(second));

    system.shutdown().await
}

#[strand_test]
async fn detached_actors_may_block() -> anyhow::Result<()> {
    let system = ActorSystem::with_config(test_config())?;
    let sleeper = system.spawn_detached("sleeper", |_ctx| {
        Behavior::builder()
            .on(|_ctx, Block(millis): Block| {
                std::thread::sleep(Duration::from_millis(millis));
                HandlerResult::reply(millis)
            })
            .build()
    })?;
    let summer = system.spawn("adder", adder);

    let slow = system.request_value::<u64>(&sleeper, Block(50));
    let fast = system.request_value::<i32>(&summer, Add(1, 1));
    let (slow, fast) = tokio::join!(slow, fast);
    assert_eq!(slow?, 50);
    assert_eq!(fast?, 2);
    assert!(system.hub().created() >= 1);

    system.shutdown().await?;
    assert!(system.spawn_detached("late", adder).is_err());
    Ok(())
}

#[strand_test]
async fn shutdown_stops_every_actor() -> anyhow::Result<()> {
    let system = ActorSystem::with_config(test_config())?;
    let actors: Vec<_> = (0..10).map(|i| system.spawn(format!("adder-{i}"), adder)).collect();
    assert_eq!(system.actor_count(), 10);

    system.shutdown().await?;
    for actor in &actors {
        assert_eq!(actor.exit_reason(), Some(ExitReason::UserShutdown));
    }
    assert_eq!(system.actor_count(), 0);
    // A second shutdown is a no-op.
    system.shutdown().await
}

#[strand_test]
async fn timeouts_fire_on_the_tokio_clock() -> anyhow::Result<()> {
    let system = ActorSystem::with_config(test_config())?;
    let idle = system.spawn("idle", |_ctx| {
        Behavior::builder()
            .on(|_ctx, _: Ping| ())
            .after(Duration::from_millis(20), |ctx| ctx.quit(ExitReason::Normal))
            .build()
    });

    let reason = tokio::time::timeout(Duration::from_secs(2), system.terminated(&idle)).await?;
    assert_eq!(reason, ExitReason::Normal);

    system.shutdown().await
}

#[test]
fn config_loads_from_a_toml_file() -> anyhow::Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    writeln!(
        file,
        r#"
        [scheduler]
        max_throughput = 16

        [workers]
        max_workers = 2

        [tracing]
        level = "debug"
        "#
    )?;

    let config = StrandConfig::load_from(file.path())?;
    assert_eq!(config.core.scheduler.max_throughput, 16);
    assert_eq!(config.core.workers.max_workers, 2);
    assert_eq!(config.tracing.level, "debug");
    assert_eq!(config.system.shutdown_timeout_ms, 30_000);
    Ok(())
}

#[test]
fn malformed_config_is_an_error() -> anyhow::Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    writeln!(file, "[scheduler\nmax_throughput = ")?;
    assert!(StrandConfig::load_from(file.path()).is_err());
    Ok(())
}
