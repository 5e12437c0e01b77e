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

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use strand_core::common::CoreConfig;

/// Configuration for a Strand actor system.
///
/// The core sections (`[scheduler]`, `[stream]`, `[workers]`, `[behavior]`,
/// `[timeouts]`) sit at the top level of the document next to the facade's own
/// `[system]`, `[tracing]` and `[paths]` sections. Every field has a default, so a
/// partial file is valid.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StrandConfig {
    /// Values consumed by the core
    #[serde(flatten)]
    pub core: CoreConfig,
    /// System lifecycle configuration
    pub system: SystemConfig,
    /// Tracing and logging configuration
    pub tracing: TracingConfig,
    /// Path configuration
    pub paths: PathsConfig,
}

/// System lifecycle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Time `shutdown` waits for actors to exit, in milliseconds
    pub shutdown_timeout_ms: u64,
}

/// Tracing and logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TracingConfig {
    /// Filter directive used when `RUST_LOG` is not set
    pub level: String,
    /// Write to a file in the log directory instead of stdout
    pub log_to_file: bool,
    /// Log file name prefix
    pub file_name: String,
}

/// Path configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory for log files; defaults to `$XDG_DATA_HOME/strand/logs`
    pub log_directory: Option<PathBuf>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout_ms: 30_000,
        }
    }
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_to_file: false,
            file_name: "strand.log".to_string(),
        }
    }
}

impl StrandConfig {
    /// The shutdown timeout as a `Duration`.
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.system.shutdown_timeout_ms)
    }

    /// The directory log files are written to.
    pub fn log_directory(&self) -> anyhow::Result<PathBuf> {
        match &self.paths.log_directory {
            Some(dir) => Ok(dir.clone()),
            None => {
                let dirs = xdg::BaseDirectories::with_prefix("strand")
                    .context("failed to initialize XDG directories")?;
                Ok(dirs.get_data_home().join("logs"))
            }
        }
    }

    /// Reads and parses the TOML file at `path`.
    pub fn load_from(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read configuration file {}", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("failed to parse configuration file {}", path.display()))
    }

    /// Loads `strand/config.toml` from the XDG configuration directories.
    ///
    /// A missing file yields the defaults. A file that cannot be read or parsed is
    /// logged and also yields the defaults.
    pub fn load() -> Self {
        use tracing::{error, info};

        let xdg_dirs = match xdg::BaseDirectories::with_prefix("strand") {
            Ok(dirs) => dirs,
            Err(e) => {
                error!("Failed to initialize XDG directories: {}", e);
                return Self::default();
            }
        };

        match xdg_dirs.find_config_file("config.toml") {
            Some(path) => {
                info!("Loading configuration from: {}", path.display());
                Self::load_from(&path).unwrap_or_else(|e| {
                    error!("{:#}", e);
                    Self::default()
                })
            }
            None => {
                info!("No configuration file found, using defaults");
                Self::default()
            }
        }
    }
}

lazy_static! {
    /// Configuration loaded once from the XDG configuration directories.
    pub static ref CONFIG: StrandConfig = StrandConfig::load();
}
