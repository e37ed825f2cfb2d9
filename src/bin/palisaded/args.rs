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

//! Implements command-line argument parsing.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{ArgGroup, Parser, Subcommand};

/// Parses the command line arguments.
pub fn parse() -> Args {
    Args::parse()
}

/// The Palisade caching DNS forwarder
#[derive(Debug, Parser)]
#[command(author, version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the forwarder
    Run(RunArgs),
}

#[derive(Debug, clap::Args)]
#[command(group(ArgGroup::new("required").required(true).args(["config", "upstreams"])))]
pub struct RunArgs {
    /// Set the configuration file to use
    #[arg(long, conflicts_with_all = ["bind", "upstreams", "record_file"], value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Set the listen IP address and port
    #[arg(long, value_name = "IP:PORT")]
    pub bind: Option<SocketAddr>,

    /// Add a default upstream resolver (may be repeated)
    #[arg(long = "upstream", value_name = "IP:PORT")]
    pub upstreams: Vec<SocketAddr>,

    /// Set the zone/upstream record file
    #[arg(long, value_name = "FILE")]
    pub record_file: Option<PathBuf>,
}
