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

//! Implements the server configuration file.
//!
//! The configuration is TOML:
//!
//! ```toml
//! [listen]
//! protocol = "UDP"        # DNS | UDP | CRYPT
//! addr = "127.0.0.1"
//! port = 53
//! # key = "..."           # required for CRYPT
//!
//! record_file = "records.txt"
//! repeat = 1
//! fuck_gfw = false
//!
//! [[upstreams]]
//! protocol = "DNS"
//! addr = "8.8.8.8"
//! port = 53
//! ```

use std::fmt;
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::debug;
use serde::{de, Deserialize};

use palisade::conn::Protocol;

use crate::args::RunArgs;

////////////////////////////////////////////////////////////////////////
// CONFIGURATION LOADING                                              //
////////////////////////////////////////////////////////////////////////

/// Loads the server configuration from the file given by `path`.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let raw_config =
        fs::read_to_string(path.as_ref()).context("failed to read the configuration file")?;
    let config: Config =
        toml::from_str(&raw_config).context("failed to parse the configuration file")?;
    log_config_summary(&config);
    Ok(config)
}

/// Builds the server configuration from the parsed command line
/// arguments given by `args`.
pub fn load_from_args(args: RunArgs) -> Config {
    let bind = args
        .bind
        .unwrap_or_else(|| SocketAddr::new(DEFAULT_LISTEN_IP, DEFAULT_LISTEN_PORT));

    let config = Config {
        listen: ListenConfig {
            protocol: ConfigProtocol(Protocol::Udp),
            addr: bind.ip(),
            port: bind.port(),
            key: None,
        },
        record_file: args.record_file,
        repeat: default_repeat(),
        fuck_gfw: false,
        upstreams: args
            .upstreams
            .into_iter()
            .map(|addr| UpstreamConfig {
                protocol: ConfigProtocol(Protocol::Udp),
                addr: addr.ip().to_string(),
                port: addr.port(),
                key: None,
            })
            .collect(),
    };
    log_config_summary(&config);
    config
}

/// Summarizes the configuration in the log, if the debug log level is
/// enabled.
fn log_config_summary(config: &Config) {
    debug!(
        "Configuration loaded:\n\
         Listen:      {}:{} ({})\n\
         Record file: {}\n\
         Repeat:      {}\n\
         GFW filter:  {}\n\
         Upstreams:   {}",
        config.listen.addr,
        config.listen.port,
        config.listen.protocol,
        config
            .record_file
            .as_ref()
            .map_or_else(|| "none".to_owned(), |path| path.display().to_string()),
        config.repeat,
        if config.fuck_gfw { "enabled" } else { "disabled" },
        config.upstreams.len(),
    );
}

////////////////////////////////////////////////////////////////////////
// CONFIGURATION FILE STRUCTURE                                       //
////////////////////////////////////////////////////////////////////////

/// The complete configuration file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub listen: ListenConfig,
    pub record_file: Option<PathBuf>,
    #[serde(default = "default_repeat")]
    pub repeat: u32,
    #[serde(default)]
    pub fuck_gfw: bool,
    #[serde(default)]
    pub upstreams: Vec<UpstreamConfig>,
}

const DEFAULT_LISTEN_IP: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
const DEFAULT_LISTEN_PORT: u16 = 53;

fn default_repeat() -> u32 {
    1
}

/// The configuration of the listen endpoint.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListenConfig {
    #[serde(default = "default_protocol")]
    pub protocol: ConfigProtocol,
    #[serde(default = "default_listen_ip")]
    pub addr: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    pub key: Option<String>,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            protocol: default_protocol(),
            addr: default_listen_ip(),
            port: default_port(),
            key: None,
        }
    }
}

/// The configuration of a single upstream resolver.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpstreamConfig {
    #[serde(default = "default_protocol")]
    pub protocol: ConfigProtocol,
    pub addr: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub key: Option<String>,
}

fn default_protocol() -> ConfigProtocol {
    ConfigProtocol(Protocol::Udp)
}

fn default_listen_ip() -> IpAddr {
    DEFAULT_LISTEN_IP
}

fn default_port() -> u16 {
    DEFAULT_LISTEN_PORT
}

////////////////////////////////////////////////////////////////////////
// WRAPPERS OVER PALISADE TYPES FOR SERDE                             //
////////////////////////////////////////////////////////////////////////

/// A deserializable wrapper over [`Protocol`], accepting the `DNS`,
/// `UDP`, and `CRYPT` tags.
#[derive(Clone, Copy, Debug)]
pub struct ConfigProtocol(pub Protocol);

impl fmt::Display for ConfigProtocol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.0 {
            Protocol::Udp => f.write_str("UDP"),
            Protocol::Crypt => f.write_str("CRYPT"),
        }
    }
}

impl<'de> Deserialize<'de> for ConfigProtocol {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        deserializer.deserialize_str(ConfigProtocolVisitor)
    }
}

#[derive(Debug)]
struct ConfigProtocolVisitor;

impl de::Visitor<'_> for ConfigProtocolVisitor {
    type Value = ConfigProtocol;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a transport protocol (DNS, UDP, or CRYPT)")
    }

    fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        value
            .parse()
            .map(ConfigProtocol)
            .map_err(|e| E::custom(format!("invalid protocol: {}", e)))
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_full_configuration_parses() {
        let config: Config = toml::from_str(
            r#"
            [listen]
            protocol = "CRYPT"
            addr = "0.0.0.0"
            port = 5353
            key = "secret"

            record_file = "records.txt"
            repeat = 2
            fuck_gfw = true

            [[upstreams]]
            protocol = "DNS"
            addr = "8.8.8.8"

            [[upstreams]]
            protocol = "CRYPT"
            addr = "192.0.2.1"
            port = 5454
            key = "secret"
            "#,
        )
        .unwrap();

        assert!(matches!(config.listen.protocol.0, Protocol::Crypt));
        assert_eq!(config.listen.port, 5353);
        assert_eq!(config.repeat, 2);
        assert!(config.fuck_gfw);
        assert_eq!(config.upstreams.len(), 2);
        assert_eq!(config.upstreams[0].port, 53);
        assert_eq!(config.upstreams[1].port, 5454);
    }

    #[test]
    fn defaults_fill_an_empty_configuration() {
        let config: Config = toml::from_str("").unwrap();
        assert!(matches!(config.listen.protocol.0, Protocol::Udp));
        assert_eq!(config.listen.addr, DEFAULT_LISTEN_IP);
        assert_eq!(config.listen.port, 53);
        assert_eq!(config.repeat, 1);
        assert!(!config.fuck_gfw);
        assert!(config.upstreams.is_empty());
        assert!(config.record_file.is_none());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<Config>("unknown_option = true").is_err());
    }
}
