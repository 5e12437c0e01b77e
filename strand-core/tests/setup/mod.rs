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
#![allow(dead_code)]

use std::sync::{Arc, Once};

use parking_lot::Mutex;
use strand_core::prelude::*;
use strand_core::testing::TestScheduler;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

static INIT: Once = Once::new();

/// Initializes the global tracing subscriber for tests, once per process.
///
/// Output goes to `logs/core_tests.txt`; `RUST_LOG` overrides the default filter.
pub fn initialize_tracing() {
    INIT.call_once(|| {
        std::fs::create_dir_all("logs").expect("could not create logs dir");
        let file_appender = RollingFileAppender::new(Rotation::NEVER, "logs", "core_tests.txt");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        Box::leak(Box::new(guard));

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("strand_core=trace"));
        let subscriber = FmtSubscriber::builder()
            .with_span_events(FmtSpan::NONE)
            .compact()
            .with_line_number(true)
            .without_time()
            .with_env_filter(filter)
            .with_writer(non_blocking)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .expect("setting default subscriber failed");
    });
}

#[strand_message]
pub struct Start;

#[strand_message]
pub struct Stop;

#[strand_message]
pub struct Swap;

#[strand_message]
pub struct Back;

/// A shared, append-only record tests inspect after running the scheduler.
pub type Log<T> = Arc<Mutex<Vec<T>>>;

pub fn log<T>() -> Log<T> {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn config() -> Arc<CoreConfig> {
    Arc::new(CoreConfig::default())
}

/// A configuration whose streams grant `credit` per cycle in batches of `batch_size`.
pub fn fixed_credit(credit: u32, batch_size: u32) -> Arc<CoreConfig> {
    Arc::new(CoreConfig::default().with_fixed_credit(credit, batch_size))
}

pub fn spawn<F>(scheduler: &Arc<TestScheduler>, config: &Arc<CoreConfig>, name: &str, init: F) -> ActorHandle
where
    F: FnOnce(&mut ActorContext<'_>) -> Behavior + Send + 'static,
{
    ActorCell::spawn(scheduler.clone(), config.clone(), name, init)
}

/// A sink that records every element, every batch size and every finalize call.
#[derive(Clone)]
pub struct CollectSink<T> {
    pub items: Log<T>,
    pub batches: Log<usize>,
    pub finalized: Log<Option<ActorError>>,
    /// Fails the batch with this index (0-based) when set.
    pub fail_at: Option<usize>,
}

impl<T> CollectSink<T> {
    pub fn new() -> Self {
        Self {
            items: log(),
            batches: log(),
            finalized: log(),
            fail_at: None,
        }
    }

    pub fn failing_at(batch: usize) -> Self {
        Self {
            fail_at: Some(batch),
            ..Self::new()
        }
    }
}

impl<T: MessageType> SinkDriver for CollectSink<T> {
    type Input = T;

    fn process(&mut self, batch: Vec<T>) -> Result<(), ActorError> {
        let index = self.batches.lock().len();
        if self.fail_at == Some(index) {
            return Err(ActorError::custom("sink rejected batch"));
        }
        self.batches.lock().push(batch.len());
        self.items.lock().extend(batch);
        Ok(())
    }

    fn finalize(&mut self, error: Option<&ActorError>) {
        self.finalized.lock().push(error.cloned());
    }
}

/// A source over `items` that records its finalize calls.
pub struct RecordingSource<I: Iterator> {
    pub inner: IterSource<I>,
    pub finalized: Log<Option<ActorError>>,
}

impl<I> SourceDriver for RecordingSource<I>
where
    I: Iterator + Send + 'static,
    I::Item: MessageType,
{
    type Output = I::Item;

    fn pull(&mut self, out: &mut std::collections::VecDeque<I::Item>, max: usize) -> Result<(), ActorError> {
        self.inner.pull(out, max)
    }

    fn done(&self) -> bool {
        self.inner.done()
    }

    fn finalize(&mut self, error: Option<&ActorError>) {
        self.finalized.lock().push(error.cloned());
    }
}

pub fn recording_source<T>(items: Vec<T>) -> (RecordingSource<std::vec::IntoIter<T>>, Log<Option<ActorError>>) {
    let finalized = log();
    (
        RecordingSource {
            inner: IterSource::new(items),
            finalized: finalized.clone(),
        },
        finalized,
    )
}

/// An actor that accepts any offered `Stream<T>` with a clone of `sink`.
pub fn sink_actor<T: MessageType>(sink: CollectSink<T>) -> impl FnOnce(&mut ActorContext<'_>) -> Behavior + Send + 'static {
    move |_ctx| {
        Behavior::builder()
            .on(move |ctx, stream: Stream<T>| ctx.make_sink(&stream, sink.clone()).map(|_| ()))
            .build()
    }
}
