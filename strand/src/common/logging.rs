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

use anyhow::anyhow;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;

use crate::common::StrandConfig;

/// Installs a global `tracing` subscriber configured from `config`.
///
/// `RUST_LOG` takes precedence over `tracing.level`. With `tracing.log_to_file` set,
/// output goes to a daily rolling file in the log directory and the returned guard
/// must be kept alive to flush it. Fails if a global subscriber is already installed.
pub fn init_tracing(config: &StrandConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.tracing.level)?,
    };

    if !config.tracing.log_to_file {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .try_init()
            .map_err(|e| anyhow!("failed to install tracing subscriber: {e}"))?;
        return Ok(None);
    }

    let directory = config.log_directory()?;
    std::fs::create_dir_all(&directory)?;
    let appender = RollingFileAppender::new(Rotation::DAILY, directory, &config.tracing.file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(writer)
        .try_init()
        .map_err(|e| anyhow!("failed to install tracing subscriber: {e}"))?;
    Ok(Some(guard))
}
