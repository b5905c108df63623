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

//! Thin process bootstrap: loads config, wires an in-memory demo
//! `ReactorState` and [`loopback::LoopbackCommunicator`], and drives
//! [`owner_core::OwnerReactor::tick`] on an interval until it reports
//! `ReactorFinished` or the process receives Ctrl-C.

mod config;
mod loopback;

use std::time::Duration;

use clap::Parser;
use owner_core::{
    CaptureInfo, ChangeFeedId, ChangeFeedInfo, ChangeFeedStatus, ChangefeedState, OwnerError, OwnerReactor,
    ReactorState,
};

use crate::config::{load_config, OwnerOpts};
use crate::loopback::LoopbackCommunicator;

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

fn install_metrics_exporter(listen_addr: &str) {
    match listen_addr.parse::<std::net::SocketAddr>() {
        Ok(addr) => {
            if let Err(err) = metrics_exporter_prometheus::PrometheusBuilder::new()
                .with_http_listener(addr)
                .install()
            {
                tracing::warn!(%err, "failed to install prometheus exporter, metrics disabled");
            }
        }
        Err(err) => tracing::warn!(%err, listen_addr, "invalid listen address, metrics disabled"),
    }
}

/// A single demo changefeed replicating three tables, so a freshly started binary has
/// something visible to tick over.
fn demo_state() -> ReactorState {
    let mut state = ReactorState::new();
    let capture_id = owner_core::CaptureId::from("demo-capture-1");
    state.captures.insert(
        capture_id.clone(),
        CaptureInfo {
            id: capture_id,
            advertise_addr: "127.0.0.1:9999".into(),
            version: env!("CARGO_PKG_VERSION").into(),
        },
    );
    let changefeed_id = ChangeFeedId::from("demo-changefeed-1");
    let mut info = ChangeFeedInfo::new(changefeed_id.clone(), 0);
    info.tables = vec![1, 2, 3];
    state
        .changefeeds
        .insert(changefeed_id, ChangefeedState::new(info, ChangeFeedStatus::new(0)));
    state
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opts = OwnerOpts::parse();
    init_tracing();
    install_metrics_exporter(&opts.listen_addr);

    let config = load_config(&opts)?;
    tracing::info!(?config, cluster_version = %opts.cluster_version, "owner-server starting");

    let mut reactor = OwnerReactor::new(
        opts.cluster_version.clone(),
        Box::new(|_: &ChangeFeedId| Box::new(LoopbackCommunicator) as Box<dyn owner_core::Communicator>),
    );
    let handle = reactor.handle();

    let mut state = demo_state();
    let mut ticker = tokio::time::interval(Duration::from_millis(config.tick_interval_ms));

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match reactor.tick(&mut state) {
                    Ok(()) => {}
                    Err(OwnerError::ReactorFinished) => {
                        tracing::info!("owner reactor finished, shutting down");
                        break;
                    }
                    Err(err) => {
                        tracing::error!(%err, "owner reactor tick failed");
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received ctrl-c, requesting graceful stop");
                handle.async_stop();
            }
        }
    }

    Ok(())
}
