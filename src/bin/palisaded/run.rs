// Copyright 2023 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! Implements the `run` command (i.e., running the forwarder).

use std::fmt::Write;
use std::process;
use std::sync::Arc;
use std::thread;

use anyhow::{bail, Context, Result};
use env_logger::Env;
use log::{error, info};
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;

use palisade::conn::{self, Protocol};
use palisade::crypt::Cipher;
use palisade::server::Server;
use palisade::upstream::UpstreamEntry;

use crate::args::RunArgs;
use crate::config::{self, Config};

/// Runs the forwarder.
pub fn run(args: RunArgs) {
    env_logger::init_from_env(Env::new().default_filter_or("info"));

    if let Err(e) = try_running(args) {
        let mut message = String::from("Failed to run:");
        for (i, cause) in e.chain().enumerate() {
            write!(message, "\n[{}] {}", i + 1, cause).unwrap();
        }
        message.push_str("\nExiting with failure.");
        error!("{}", message);
        process::exit(1);
    }
    info!("Exiting with success.");
}

fn try_running(run_args: RunArgs) -> Result<()> {
    info!(
        "Palisade daemon v{}.{}.{} starting.",
        env!("CARGO_PKG_VERSION_MAJOR"),
        env!("CARGO_PKG_VERSION_MINOR"),
        env!("CARGO_PKG_VERSION_PATCH"),
    );

    // Get the configuration, either from the file system or from the
    // command line arguments, as appropriate.
    let config = if let Some(ref config) = run_args.config {
        info!("Loading the configuration from {}.", config.display());
        config::load_from_path(config).context("failed to load the configuration")?
    } else {
        info!("Loading the configuration from the command line.");
        config::load_from_args(run_args)
    };

    // Bind the listen connection first: failing fast on a bad
    // endpoint beats discovering it after the record file loads.
    let conn = bind_listen_conn(&config).context("failed to bind the listen socket")?;
    let upstreams = build_upstreams(&config).context("failed to set up upstreams")?;
    if upstreams.is_empty() && config.record_file.is_none() {
        bail!("no upstreams and no record file; the server could never answer");
    }

    let mut server = Server::new(conn, upstreams);
    server.set_repeat(config.repeat);
    server.set_pollution_filtering(config.fuck_gfw);
    let server = Arc::new(server);

    // Load the record database and keep it fresh. A parse failure
    // here is not fatal: the server runs forward-only until the file
    // is fixed and the watcher picks it up.
    if let Some(ref record_file) = config.record_file {
        server.load_db(record_file);
        server
            .watch_record_file(record_file.clone())
            .context("failed to watch the record file")?;
    }

    // Set up signal handling.
    let mut signals =
        Signals::new([SIGINT, SIGTERM]).context("failed to set up signal handling")?;

    // Start the accept loop.
    info!("Set-up is complete; starting the server.");
    let accept_server = Arc::clone(&server);
    thread::spawn(move || accept_server.serve_forever());

    // Wait for termination signals. In-flight queries are not
    // drained; closing the listen socket stops new arrivals.
    for signal in signals.forever() {
        match signal {
            s @ (SIGINT | SIGTERM) => {
                let name = match s {
                    SIGINT => "SIGINT",
                    SIGTERM => "SIGTERM",
                    _ => unreachable!(),
                };
                info!("Received {}; shutting down.", name);
                break;
            }
            _ => unreachable!(),
        }
    }
    Ok(())
}

/// Creates the listening connection described by the configuration.
fn bind_listen_conn(config: &Config) -> Result<Box<dyn conn::Conn>> {
    let cipher = match (config.listen.protocol.0, &config.listen.key) {
        (Protocol::Crypt, Some(key)) => Some(Arc::new(
            Cipher::new(key.as_bytes()).context("invalid listen.key")?,
        )),
        (Protocol::Crypt, None) => bail!("listen.key is required for the CRYPT protocol"),
        _ => None,
    };
    let addr = format!("{}:{}", config.listen.addr, config.listen.port);
    Ok(conn::listen(config.listen.protocol.0, &addr, cipher)?)
}

/// Creates the default upstream list described by the configuration.
fn build_upstreams(config: &Config) -> Result<Vec<UpstreamEntry>> {
    let mut entries = Vec::with_capacity(config.upstreams.len());
    for upstream in &config.upstreams {
        let cipher = match (upstream.protocol.0, &upstream.key) {
            (Protocol::Crypt, Some(key)) => Some(Arc::new(
                Cipher::new(key.as_bytes())
                    .with_context(|| format!("invalid key for upstream {}", upstream.addr))?,
            )),
            (Protocol::Crypt, None) => {
                bail!("upstream {} uses CRYPT but has no key", upstream.addr)
            }
            _ => None,
        };
        entries.push(UpstreamEntry {
            protocol: upstream.protocol.0,
            addr: format!("{}:{}", upstream.addr, upstream.port),
            cipher,
        });
    }
    Ok(entries)
}
