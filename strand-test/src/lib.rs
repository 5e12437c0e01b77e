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

//! # Strand Test
//!
//! Test support for Strand actors: the [`strand_test`] attribute runs an `async fn`
//! test on a multi-threaded tokio runtime and fails it when any runtime thread panics,
//! and [`initialize_tracing`] installs one shared subscriber writing to `logs/`.

use std::sync::Once;

use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

pub use strand_test_macro::strand_test;

static INIT: Once = Once::new();

/// Installs the global tracing subscriber for tests, once per process.
///
/// Output goes to `logs/strand_tests.txt`. `RUST_LOG` overrides the default `info`
/// filter. A subscriber installed earlier by someone else is left in place.
pub fn initialize_tracing() {
    INIT.call_once(|| {
        if std::fs::create_dir_all("logs").is_err() {
            return;
        }
        let file_appender = RollingFileAppender::new(Rotation::NEVER, "logs", "strand_tests.txt");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        // The writer must outlive every test in the process.
        Box::leak(Box::new(guard));

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let subscriber = FmtSubscriber::builder()
            .with_span_events(FmtSpan::NONE)
            .with_max_level(Level::TRACE)
            .compact()
            .with_line_number(true)
            .without_time()
            .with_env_filter(filter)
            .with_writer(non_blocking)
            .finish();

        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

#[doc(hidden)]
pub mod __private {
    pub use parking_lot;
    pub use tokio;
    pub use tracing;
}
