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

//! Palisade is a caching, policy-aware DNS forwarder.
//!
//! It answers queries over UDP (optionally wrapped in an encrypted
//! framing of the same shape), serves records from a local,
//! hot-reloadable record file when the queried name falls under a
//! configured zone, and otherwise forwards the query to an upstream
//! resolver selected by longest-suffix match on the queried name.
//! Successful answers are cached until their TTL expires, and replies
//! that match well-known poisoned-path signatures can be discarded
//! before they reach the cache or the client.
//!
//! The crate is organized around the life of a query:
//!
//! * [`message`], [`name`], and [`rr`] implement the on-the-wire DNS
//!   codec, including name compression;
//! * [`conn`] and [`crypt`] provide uniform datagram I/O over plain
//!   and encrypted UDP;
//! * [`db`] holds the record database (zones plus the upstream
//!   routing tree) parsed from the record file;
//! * [`cache`] memoizes packed answers by name and type;
//! * [`filter`] rejects polluted upstream replies; and
//! * [`server`] ties the pieces together into the per-query pipeline.
//!
//! The `palisaded` binary (in `src/bin/palisaded`) provides the
//! command line, configuration file, and logging setup around this
//! library.

pub mod cache;
pub mod class;
pub mod conn;
pub mod crypt;
pub mod db;
pub mod filter;
pub mod message;
pub mod name;
pub mod rr;
pub mod server;
pub mod upstream;

mod util;
