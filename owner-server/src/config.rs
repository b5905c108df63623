// Copyright 2024 Owner Core Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! CLI flags (`OwnerOpts`) and the optional TOML config file (`OwnerConfig`)
//! they merge with: flags name where to find things, the file holds tunables.

use std::path::PathBuf;

use clap::Parser;
use serde::Deserialize;

#[derive(Parser, Debug)]
#[command(name = "owner-server", about = "Drives the owner reactor on a fixed interval")]
pub struct OwnerOpts {
    /// Path to an optional TOML config file; unset tunables fall back to their defaults.
    #[arg(long, env = "OWNER_CONFIG_PATH")]
    pub config_path: Option<PathBuf>,

    /// Address the Prometheus exporter binds to. Unused by the reactor itself; this is purely
    /// the observability surface for the driver process.
    #[arg(long, env = "OWNER_LISTEN_ADDR", default_value = "127.0.0.1:8300")]
    pub listen_addr: String,

    /// The cluster version this process reports to the owner reactor's version-skew check.
    #[arg(long, env = "OWNER_CLUSTER_VERSION", default_value = env!("CARGO_PKG_VERSION"))]
    pub cluster_version: String,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct OwnerConfig {
    /// How often the driver loop calls `OwnerReactor::tick`. Documentation-only from the
    /// core's perspective: the core itself keeps no internal timer.
    pub tick_interval_ms: u64,
    /// Matches `owner-core`'s `DEBUG_INFO_TIMEOUT`; kept here too so an operator can see both
    /// knobs in one file even though the core owns the authoritative constant.
    pub debug_info_timeout_ms: u64,
    /// How long the driver waits before retrying after the reactor reports a version skew.
    pub version_skew_backoff_ms: u64,
}

impl Default for OwnerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 200,
            debug_info_timeout_ms: 3000,
            version_skew_backoff_ms: 1000,
        }
    }
}

pub fn load_config(opts: &OwnerOpts) -> anyhow::Result<OwnerConfig> {
    let Some(path) = &opts.config_path else {
        return Ok(OwnerConfig::default());
    };
    let contents = std::fs::read_to_string(path)
        .map_err(|err| anyhow::anyhow!("failed to read config file {}: {err}", path.display()))?;
    let config: OwnerConfig = toml::from_str(&contents)
        .map_err(|err| anyhow::anyhow!("failed to parse config file {}: {err}", path.display()))?;
    Ok(config)
}
