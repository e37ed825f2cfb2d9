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

//! The record database: local zones and upstream routing.
//!
//! The database is parsed from a line-oriented record file. `#`
//! starts a comment; tokens are separated by whitespace; the token
//! count selects the directive:
//!
//! * **1 token** starts a new zone named by the token. Subsequent
//!   record lines belong to it.
//! * **4 tokens** `label type ttl rdata` define a record in the
//!   current zone. A `label` of `@` means the zone apex and `*` the
//!   wildcard; `type` is one of `A`, `AAAA`, `CNAME`. A `CNAME`
//!   target is normalized to end with a dot.
//! * **2 tokens** `suffix upstream` route queries whose name ends in
//!   `suffix` to the given upstream. A `host:port` upstream is used
//!   verbatim; a bare IP gets port 53; anything else is ignored.
//!
//! Lines with any other token count are ignored. A [`RecordDb`] is
//! immutable once built; the server swaps in a freshly parsed one
//! when the record file changes.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;

use log::{debug, warn};
use regex::Regex;

use crate::class::Class;
use crate::name::{self, Name};
use crate::rr::{Rdata, Record, Ttl, Type};

mod suffix_tree;
pub use suffix_tree::SuffixTree;

/// The longest record-file line the parser accepts.
const MAX_LINE_LEN: usize = 1024;

/// The longest CNAME chain the local-zone lookup will follow. Chains
/// deeper than this (including loops in operator-supplied records)
/// abort the lookup.
const MAX_CNAME_CHAIN: usize = 8;

////////////////////////////////////////////////////////////////////////
// ZONES                                                              //
////////////////////////////////////////////////////////////////////////

/// One locally served zone: its anchored matching pattern and its
/// records, keyed by `(label, type)`.
#[derive(Debug)]
struct Zone {
    name: Name,
    pattern: Regex,
    records: HashMap<(String, Type), ZoneRecord>,
}

/// A record as stored in a zone. A wildcard record has no owner of
/// its own; the queried name is substituted at lookup time.
#[derive(Debug)]
struct ZoneRecord {
    owner: Option<Name>,
    rr_type: Type,
    ttl: Ttl,
    rdata: Rdata,
}

impl ZoneRecord {
    fn to_record(&self, qname: &Name) -> Record {
        Record {
            owner: self.owner.clone().unwrap_or_else(|| qname.clone()),
            rr_type: self.rr_type,
            class: Class::IN,
            ttl: self.ttl,
            rdata: self.rdata.clone(),
        }
    }
}

impl Zone {
    fn new(name: Name) -> Self {
        // The anchor admits any (possibly empty) chain of labels in
        // front of the zone name; the capture is the chain itself,
        // with its trailing dot.
        let pattern = Regex::new(&format!(
            r"^([-A-Za-z0-9.]*)\.?{}$",
            regex::escape(name.as_str()),
        ))
        .expect("zone anchor pattern failed to compile");
        Self {
            name,
            pattern,
            records: HashMap::new(),
        }
    }

    /// Matches `qname` against this zone, returning the record label
    /// to look up (`@` for the apex).
    fn match_label(&self, qname: &Name) -> Option<String> {
        let captures = self.pattern.captures(qname.as_str())?;
        let label = captures[1].trim_end_matches('.').to_ascii_lowercase();
        if label.is_empty() {
            Some("@".to_owned())
        } else {
            Some(label)
        }
    }

    /// Looks up `(label, rr_type)`, falling back to the wildcard
    /// record for the type.
    fn lookup(&self, label: &str, rr_type: Type) -> Option<&ZoneRecord> {
        self.records
            .get(&(label.to_owned(), rr_type))
            .or_else(|| self.records.get(&("*".to_owned(), rr_type)))
    }
}

////////////////////////////////////////////////////////////////////////
// THE RECORD DATABASE                                                //
////////////////////////////////////////////////////////////////////////

/// The parsed record file: the set of zones and the suffix-routing
/// tree. Immutable once built.
#[derive(Debug)]
pub struct RecordDb {
    zones: HashMap<Name, Zone>,
    router: SuffixTree<String>,
}

impl RecordDb {
    /// Parses the record file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let text = fs::read_to_string(path).map_err(|err| Error {
            line: 0,
            kind: ErrorKind::Io(err),
        })?;
        Self::parse(&text)
    }

    /// Parses record-file text.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let mut db = Self {
            zones: HashMap::new(),
            router: SuffixTree::new(),
        };
        let mut current_zone = None;

        for (index, raw_line) in text.lines().enumerate() {
            let line = index + 1;
            let fail = |kind| Err(Error { line, kind });

            if raw_line.len() > MAX_LINE_LEN {
                return fail(ErrorKind::LineTooLong);
            }
            let uncommented = raw_line.split('#').next().unwrap_or("");
            let tokens: Vec<&str> = uncommented.split_whitespace().collect();

            match tokens.len() {
                0 => continue,
                1 => {
                    let name: Name = match tokens[0].parse() {
                        Ok(name) => name,
                        Err(err) => return fail(ErrorKind::InvalidName(err)),
                    };
                    db.zones.insert(name.clone(), Zone::new(name.clone()));
                    current_zone = Some(name);
                }
                4 => {
                    let zone_name = match &current_zone {
                        Some(name) => name,
                        None => return fail(ErrorKind::RecordOutsideZone),
                    };
                    let record = match parse_record(&tokens, zone_name) {
                        Ok(record) => record,
                        Err(kind) => return fail(kind),
                    };
                    let key = (tokens[0].to_ascii_lowercase(), record.rr_type);
                    let zone = db.zones.get_mut(zone_name).unwrap();
                    zone.records.insert(key, record);
                }
                2 => {
                    let (suffix, upstream) = (tokens[0], tokens[1]);
                    let addr = match parse_upstream_addr(upstream) {
                        Some(addr) => addr,
                        None => {
                            debug!("ignoring unparsable upstream {:?} on line {}", upstream, line);
                            continue;
                        }
                    };
                    let labels: Vec<&str> = suffix
                        .split('.')
                        .filter(|label| !label.is_empty())
                        .collect();
                    db.router.insert(&labels, addr);
                }
                _ => {
                    debug!("ignoring record line {} with {} tokens", line, tokens.len());
                    continue;
                }
            }
        }

        Ok(db)
    }

    /// Answers `qname`/`qtype` from the local zones, following CNAME
    /// chains. Returns the answer records in chain order, or [`None`]
    /// if no zone matches or the matched zone has no usable record.
    pub fn query(&self, qname: &Name, qtype: Type) -> Option<Vec<Record>> {
        let mut answers = Vec::new();
        if self.query_into(qname, qtype, &mut answers, 0) {
            Some(answers)
        } else {
            None
        }
    }

    fn query_into(
        &self,
        qname: &Name,
        qtype: Type,
        answers: &mut Vec<Record>,
        depth: usize,
    ) -> bool {
        let (zone, label) = match self.match_zone(qname) {
            Some(found) => found,
            None => return false,
        };
        debug!("{} matched zone {} with label {}", qname, zone.name, label);

        if let Some(zone_record) = zone.lookup(&label, qtype) {
            answers.push(zone_record.to_record(qname));
            return true;
        }

        // No direct record: a CNAME (possibly the wildcard's) may
        // still lead to one.
        if let Some(zone_record) = zone.lookup(&label, Type::CNAME) {
            let record = zone_record.to_record(qname);
            let target = match &record.rdata {
                Rdata::Cname(target) => target.clone(),
                _ => unreachable!("CNAME records always carry CNAME RDATA"),
            };
            answers.push(record);
            if depth >= MAX_CNAME_CHAIN {
                warn!("CNAME chain through {} exceeds {} links", qname, MAX_CNAME_CHAIN);
                return false;
            }
            return self.query_into(&target, qtype, answers, depth + 1);
        }

        false
    }

    /// Finds the zone whose anchor matches `qname`, along with the
    /// label to look up within it.
    fn match_zone(&self, qname: &Name) -> Option<(&Zone, String)> {
        for zone in self.zones.values() {
            if let Some(label) = zone.match_label(qname) {
                return Some((zone, label));
            }
        }
        None
    }

    /// Returns the routed upstream address for `qname`, if its name
    /// ends in a configured suffix.
    pub fn route(&self, qname: &Name) -> Option<&str> {
        let labels: Vec<&str> = qname.labels().collect();
        self.router.lookup(&labels).map(String::as_str)
    }

    /// Returns whether the database defines any upstream routes.
    pub fn has_routes(&self) -> bool {
        !self.router.is_empty()
    }
}

/// Parses the three record forms `label type ttl rdata`.
fn parse_record(tokens: &[&str], zone_name: &Name) -> Result<ZoneRecord, ErrorKind> {
    let (label, type_token, ttl_token, rdata_token) = (tokens[0], tokens[1], tokens[2], tokens[3]);

    let owner = match label {
        "*" => None,
        "@" => Some(zone_name.clone()),
        _ => {
            let text = format!("{}.{}", label, zone_name.as_str().trim_end_matches('.'));
            Some(text.parse().map_err(ErrorKind::InvalidName)?)
        }
    };

    let ttl: u32 = ttl_token
        .parse()
        .map_err(|_| ErrorKind::InvalidTtl(ttl_token.to_owned()))?;

    let (rr_type, rdata) = match type_token {
        "A" => {
            let addr: std::net::Ipv4Addr = rdata_token
                .parse()
                .map_err(|_| ErrorKind::InvalidRdata(rdata_token.to_owned()))?;
            (Type::A, Rdata::A(addr))
        }
        "AAAA" => {
            let addr: std::net::Ipv6Addr = rdata_token
                .parse()
                .map_err(|_| ErrorKind::InvalidRdata(rdata_token.to_owned()))?;
            (Type::AAAA, Rdata::Aaaa(addr))
        }
        "CNAME" => {
            // Name parsing normalizes the target to end with a dot.
            let target: Name = rdata_token.parse().map_err(ErrorKind::InvalidName)?;
            (Type::CNAME, Rdata::Cname(target))
        }
        _ => return Err(ErrorKind::UnknownRecordType(type_token.to_owned())),
    };

    Ok(ZoneRecord {
        owner,
        rr_type,
        ttl: ttl.into(),
        rdata,
    })
}

/// Validates an upstream token: `host:port` is used verbatim and a
/// bare IP gets port 53; anything else is rejected.
fn parse_upstream_addr(token: &str) -> Option<String> {
    if token.parse::<SocketAddr>().is_ok() {
        Some(token.to_owned())
    } else if token.parse::<IpAddr>().is_ok() {
        Some(format!("{}:53", token))
    } else {
        None
    }
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error produced while parsing a record file, with the line it
/// occurred on.
#[derive(Debug)]
pub struct Error {
    pub line: usize,
    pub kind: ErrorKind,
}

#[derive(Debug)]
pub enum ErrorKind {
    Io(io::Error),
    LineTooLong,
    RecordOutsideZone,
    UnknownRecordType(String),
    InvalidTtl(String),
    InvalidRdata(String),
    InvalidName(name::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.line > 0 {
            write!(f, "line {}: {}", self.line, self.kind)
        } else {
            write!(f, "{}", self.kind)
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "failed to read the record file: {}", err),
            Self::LineTooLong => f.write_str("line too long"),
            Self::RecordOutsideZone => f.write_str("record appears before any zone directive"),
            Self::UnknownRecordType(token) => write!(f, "unsupported record type: {}", token),
            Self::InvalidTtl(token) => write!(f, "invalid TTL: {}", token),
            Self::InvalidRdata(token) => write!(f, "invalid record data: {}", token),
            Self::InvalidName(err) => write!(f, "invalid name: {}", err),
        }
    }
}

impl std::error::Error for Error {}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn name(text: &str) -> Name {
        text.parse().unwrap()
    }

    #[test]
    fn apex_records_answer_the_zone_name() {
        let db = RecordDb::parse("example.com.\n@ A 600 10.0.0.1\n").unwrap();
        let answers = db.query(&name("example.com."), Type::A).unwrap();
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].owner, name("example.com."));
        assert_eq!(u32::from(answers[0].ttl), 600);
        assert_eq!(answers[0].rdata, Rdata::A([10, 0, 0, 1].into()));
    }

    #[test]
    fn labeled_records_answer_subdomains() {
        let db = RecordDb::parse("example.com.\nwww A 300 10.0.0.2\n").unwrap();
        let answers = db.query(&name("www.example.com."), Type::A).unwrap();
        assert_eq!(answers[0].owner, name("www.example.com."));
        assert!(db.query(&name("other.example.com."), Type::A).is_none());
    }

    #[test]
    fn wildcard_records_take_the_queried_name() {
        let db = RecordDb::parse("example.com.\n* A 60 10.0.0.3\n").unwrap();
        let answers = db.query(&name("a.b.example.com."), Type::A).unwrap();
        assert_eq!(answers[0].owner, name("a.b.example.com."));
        assert_eq!(answers[0].rdata, Rdata::A([10, 0, 0, 3].into()));
    }

    #[test]
    fn wildcard_cname_chains_resolve_in_order() {
        let db = RecordDb::parse(
            "example.com.\n\
             * CNAME 300 target.example.com.\n\
             target A 300 10.0.0.2\n",
        )
        .unwrap();
        let answers = db.query(&name("anything.example.com."), Type::A).unwrap();
        assert_eq!(answers.len(), 2);
        assert_eq!(answers[0].owner, name("anything.example.com."));
        assert_eq!(
            answers[0].rdata,
            Rdata::Cname(name("target.example.com.")),
        );
        assert_eq!(answers[1].owner, name("target.example.com."));
        assert_eq!(answers[1].rdata, Rdata::A([10, 0, 0, 2].into()));
    }

    #[test]
    fn cname_targets_gain_a_trailing_dot() {
        let db = RecordDb::parse("example.com.\nwww CNAME 60 host.example.com\n").unwrap();
        let answers = db.query(&name("www.example.com."), Type::CNAME).unwrap();
        assert_eq!(
            answers[0].rdata,
            Rdata::Cname(name("host.example.com.")),
        );
    }

    #[test]
    fn cname_loops_are_cut_off() {
        let db = RecordDb::parse("example.com.\nwww CNAME 60 www.example.com.\n").unwrap();
        assert!(db.query(&name("www.example.com."), Type::A).is_none());
    }

    #[test]
    fn queries_outside_all_zones_miss() {
        let db = RecordDb::parse("example.com.\n@ A 600 10.0.0.1\n").unwrap();
        assert!(db.query(&name("example.org."), Type::A).is_none());
        // A name merely *containing* the zone is not in it.
        assert!(db.query(&name("example.com.evil.org."), Type::A).is_none());
    }

    #[test]
    fn comments_and_blank_lines_are_ignored() {
        let db = RecordDb::parse(
            "# authoritative data\n\
             \n\
             example.com.  # our zone\n\
             @ A 600 10.0.0.1  # the apex\n",
        )
        .unwrap();
        assert!(db.query(&name("example.com."), Type::A).is_some());
    }

    #[test]
    fn routes_pick_the_longest_suffix() {
        let db = RecordDb::parse(
            "cn 114.114.114.114\n\
             baidu.cn 223.5.5.5:53\n",
        )
        .unwrap();
        assert!(db.has_routes());
        assert_eq!(db.route(&name("www.baidu.cn.")), Some("223.5.5.5:53"));
        assert_eq!(db.route(&name("www.sina.cn.")), Some("114.114.114.114:53"));
        assert_eq!(db.route(&name("example.com.")), None);
    }

    #[test]
    fn unparsable_upstreams_are_ignored() {
        let db = RecordDb::parse("cn not-an-address\n").unwrap();
        assert!(!db.has_routes());
        assert_eq!(db.route(&name("www.cn.")), None);
    }

    #[test]
    fn parse_errors_carry_line_numbers() {
        let err = RecordDb::parse("example.com.\n@ A sixhundred 10.0.0.1\n").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(matches!(err.kind, ErrorKind::InvalidTtl(_)));

        let err = RecordDb::parse("example.com.\n@ MX 600 mail.example.com.\n").unwrap_err();
        assert!(matches!(err.kind, ErrorKind::UnknownRecordType(_)));

        let err = RecordDb::parse("@ A 600 10.0.0.1\n").unwrap_err();
        assert!(matches!(err.kind, ErrorKind::RecordOutsideZone));
    }

    #[test]
    fn overlong_lines_are_fatal() {
        let long_line = format!("example.com. {}\n", "x".repeat(MAX_LINE_LEN));
        let err = RecordDb::parse(&long_line).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::LineTooLong));
    }
}
