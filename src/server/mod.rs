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

//! The per-query pipeline of the forwarder.
//!
//! A [`Server`] reads datagrams from its listen connection and
//! handles each query on its own thread:
//!
//! 1. answer from the [cache](crate::cache) if possible (with the
//!    client's transaction id patched in);
//! 2. otherwise answer from the local [record database](crate::db);
//! 3. otherwise forward to upstreams (a suffix-routed upstream
//!    first, then the configured defaults), validating each reply
//!    (length, id, decode, [pollution](crate::filter), question)
//!    before caching and relaying it;
//! 4. if every upstream fails, answer SERVFAIL.
//!
//! A client therefore always receives exactly one reply per query,
//! carrying its original transaction id.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::{Arc, Mutex, RwLock};
use std::thread;
use std::time::Duration;

use log::{debug, error, info, warn};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};

use crate::cache::Cache;
use crate::conn::{self, Conn};
use crate::db::RecordDb;
use crate::filter;
use crate::message::{Message, Rcode};
use crate::rr::Type;
use crate::upstream::UpstreamEntry;

/// How long to wait for each upstream's reply.
const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(2);

/// The cache lifetime of an upstream reply that carries no answer
/// records (e.g. NXDOMAIN).
const EMPTY_ANSWER_CACHE_TTL: Duration = Duration::from_secs(3);

////////////////////////////////////////////////////////////////////////
// SERVER                                                             //
////////////////////////////////////////////////////////////////////////

/// The forwarder: a listen connection, the upstream list, the record
/// database, and the answer cache.
///
/// The database slot is guarded by a reader-writer lock, but readers
/// only hold it long enough to clone the [`Arc`]: the database itself
/// is an immutable value that the file watcher atomically replaces on
/// reload.
pub struct Server {
    conn: Box<dyn Conn>,
    upstreams: Vec<UpstreamEntry>,
    repeat: u32,
    filter_pollution: bool,
    db: RwLock<Option<Arc<RecordDb>>>,
    cache: Cache,
    watcher: Mutex<Option<RecommendedWatcher>>,
}

impl Server {
    /// Creates a new `Server` that listens on `conn` and forwards to
    /// `upstreams`, in order, when local data cannot answer a query.
    pub fn new(conn: Box<dyn Conn>, upstreams: Vec<UpstreamEntry>) -> Self {
        Self {
            conn,
            upstreams,
            repeat: 1,
            filter_pollution: false,
            db: RwLock::new(None),
            cache: Cache::new(),
            watcher: Mutex::new(None),
        }
    }

    /// Sets how many times each upstream request datagram is sent
    /// before waiting for the reply. Values below 1 are clamped.
    pub fn set_repeat(&mut self, repeat: u32) {
        self.repeat = repeat.max(1);
    }

    /// Enables or disables the pollution filter for upstream replies.
    pub fn set_pollution_filtering(&mut self, enabled: bool) {
        self.filter_pollution = enabled;
    }

    /// Parses the record file at `path` and, on success, publishes the
    /// new database. On failure the previously published database (if
    /// any) stays in place.
    pub fn load_db(&self, path: &Path) {
        match RecordDb::load(path) {
            Ok(db) => {
                self.publish_db(db);
                info!("record file {} loaded", path.display());
            }
            Err(err) => {
                error!("failed to parse record file {}: {}", path.display(), err);
            }
        }
    }

    /// Atomically replaces the published record database.
    pub fn publish_db(&self, db: RecordDb) {
        *self.db.write().unwrap() = Some(Arc::new(db));
    }

    /// Starts watching the record file, reloading the database when
    /// it is modified. The watcher runs for the life of the server;
    /// errors on the watch stream itself are fatal.
    pub fn watch_record_file(self: &Arc<Self>, path: PathBuf) -> notify::Result<()> {
        let server = Arc::downgrade(self);
        let reload_path = path.clone();
        let mut watcher =
            notify::recommended_watcher(move |result: notify::Result<notify::Event>| match result {
                Ok(event) => {
                    if !event.kind.is_modify() && !event.kind.is_create() {
                        return;
                    }
                    if let Some(server) = server.upgrade() {
                        server.load_db(&reload_path);
                    }
                }
                Err(err) => {
                    error!("record file watcher failed: {}", err);
                    process::exit(1);
                }
            })?;
        watcher.watch(&path, RecursiveMode::NonRecursive)?;
        *self.watcher.lock().unwrap() = Some(watcher);
        Ok(())
    }

    /// Runs the accept loop: every decoded datagram is handed to its
    /// own thread. Datagrams that fail to decode are logged and
    /// dropped.
    pub fn serve_forever(self: &Arc<Self>) {
        info!("listening on {}", self.conn.name());
        loop {
            match self.conn.read_message() {
                Ok((query, client)) => {
                    let server = Arc::clone(self);
                    thread::spawn(move || server.handle_query(query, client));
                }
                Err(err) => error!("failed to read query: {}", err),
            }
        }
    }

    /// Handles one query message through the full pipeline.
    fn handle_query(&self, query: Message, client: SocketAddr) {
        let question = match query.questions.first() {
            Some(question) => question,
            None => {
                debug!("dropping message without a question from {}", client);
                return;
            }
        };
        let qname = question.qname.clone();
        let qtype = Type::from(question.qtype);

        if let Some(mut packet) = self.cache.get(&qname, qtype) {
            // Cached packets carry the transaction id of whichever
            // query produced them.
            packet[..2].copy_from_slice(&query.id.to_be_bytes());
            info!("query {}[{}] from {} [HIT]", qname, question.qtype, client);
            if let Err(err) = self.conn.write_to(&packet, client) {
                error!("failed to send cached reply to {}: {}", client, err);
            }
            return;
        }
        info!("query {}[{}] from {} [MISS]", qname, question.qtype, client);

        let mut reply = query.reply();
        let db = self.db.read().unwrap().clone();

        if let Some(db) = &db {
            if query.questions.len() == 1 {
                if let Some(answers) = db.query(&qname, qtype) {
                    let ttl = answers[0].ttl;
                    reply.answers = answers;
                    debug!("{}", reply);
                    let packet = reply.pack();
                    if let Err(err) = self.conn.write_to(&packet, client) {
                        error!("failed to send local answer to {}: {}", client, err);
                    }
                    self.cache.insert(&qname, qtype, packet, ttl.as_duration());
                    return;
                }
            }
        }

        // Upstream candidates: a routed upstream (if any) is consulted
        // before the configured defaults.
        let mut candidates = Vec::with_capacity(self.upstreams.len() + 1);
        if let Some(db) = &db {
            if let Some(addr) = db.route(&qname) {
                debug!("routing {} to upstream {}", qname, addr);
                candidates.push(UpstreamEntry::plain(addr));
            }
        }
        candidates.extend(self.upstreams.iter().cloned());

        let packed_query = query.pack();
        for entry in &candidates {
            match self.question_upstream(entry, &query, &packed_query) {
                Ok(reply_octets) => {
                    if let Err(err) = self.conn.write_to(&reply_octets, client) {
                        error!("failed to relay reply to {}: {}", client, err);
                    }
                    return;
                }
                Err(err) if err.is_timeout() => warn!("upstream {} timed out", entry),
                Err(err) => warn!("upstream {} failed: {}", entry, err),
            }
        }

        info!("query {}[{}] from {} [FAIL]", qname, question.qtype, client);
        reply.rcode = Rcode::SERVFAIL;
        if let Err(err) = self.conn.write_message(&reply, client) {
            error!("failed to send SERVFAIL to {}: {}", client, err);
        }
    }

    /// Performs one request/response exchange with an upstream over a
    /// fresh connection, validating the reply before caching it. The
    /// transaction id sent upstream is the client's own, so the reply
    /// relayed back needs no rewriting.
    fn question_upstream(
        &self,
        entry: &UpstreamEntry,
        query: &Message,
        packed_query: &[u8],
    ) -> Result<Vec<u8>, ExchangeError> {
        let upstream = entry.dial()?;
        for _ in 0..self.repeat {
            upstream.write(packed_query)?;
        }
        upstream.set_read_timeout(Some(UPSTREAM_TIMEOUT))?;
        let octets = upstream.read()?;

        if octets.len() < 12 {
            return Err(ExchangeError::ShortReply);
        }
        let reply_id = u16::from_be_bytes([octets[0], octets[1]]);
        if reply_id != query.id {
            return Err(ExchangeError::IdMismatch);
        }
        let reply = Message::unpack(&octets).map_err(conn::Error::from)?;
        if self.filter_pollution && filter::is_polluted(&reply) {
            return Err(ExchangeError::Polluted);
        }
        let question = match reply.questions.first() {
            Some(question) => question,
            None => return Err(ExchangeError::NoQuestion),
        };

        let ttl = reply
            .answers
            .first()
            .map(|answer| answer.ttl.as_duration())
            .unwrap_or(EMPTY_ANSWER_CACHE_TTL);
        self.cache
            .insert(&question.qname, Type::from(question.qtype), octets.clone(), ttl);
        debug!("upstream {} answered {}", entry, question.qname);
        Ok(octets)
    }
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error produced by one upstream exchange. Each variant causes
/// the pipeline to move on to the next candidate upstream.
#[derive(Debug)]
enum ExchangeError {
    Conn(conn::Error),
    ShortReply,
    IdMismatch,
    Polluted,
    NoQuestion,
}

impl ExchangeError {
    fn is_timeout(&self) -> bool {
        matches!(self, Self::Conn(err) if err.is_timeout())
    }
}

impl From<conn::Error> for ExchangeError {
    fn from(err: conn::Error) -> Self {
        Self::Conn(err)
    }
}

impl std::fmt::Display for ExchangeError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Conn(err) => write!(f, "{}", err),
            Self::ShortReply => f.write_str("reply shorter than a DNS header"),
            Self::IdMismatch => f.write_str("reply id does not match the query id"),
            Self::Polluted => f.write_str("reply matches a pollution signature"),
            Self::NoQuestion => f.write_str("reply carries no question"),
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::class::Class;
    use crate::conn::{CryptConn, UdpConn};
    use crate::crypt::Cipher;
    use crate::message::{Opcode, Qclass, Qtype, Question};
    use crate::name::Name;
    use crate::rr::{Rdata, Record};

    fn a_query(id: u16, qname: &str, qtype: Type) -> Message {
        Message {
            id,
            response: false,
            opcode: Opcode::QUERY,
            authoritative: false,
            truncated: false,
            recursion_desired: true,
            recursion_available: false,
            rcode: Rcode::NOERROR,
            questions: vec![Question {
                qname: qname.parse().unwrap(),
                qtype: Qtype::from(qtype),
                qclass: Qclass::from(Class::IN),
            }],
            answers: Vec::new(),
            authorities: Vec::new(),
            additionals: Vec::new(),
        }
    }

    /// Starts a server on a loopback UDP socket and returns its
    /// address.
    fn start_server(
        record_text: Option<&str>,
        upstreams: Vec<UpstreamEntry>,
        filter_pollution: bool,
    ) -> SocketAddr {
        let listen = UdpConn::listen("127.0.0.1:0").unwrap();
        let addr = listen.local_addr().unwrap();
        let mut server = Server::new(Box::new(listen), upstreams);
        server.set_pollution_filtering(filter_pollution);
        if let Some(text) = record_text {
            server.publish_db(RecordDb::parse(text).unwrap());
        }
        let server = Arc::new(server);
        thread::spawn(move || server.serve_forever());
        addr
    }

    /// Starts a one-shot fake upstream that answers every query with
    /// the given records.
    fn start_upstream(answers: Vec<Record>) -> SocketAddr {
        let conn = UdpConn::listen("127.0.0.1:0").unwrap();
        let addr = conn.local_addr().unwrap();
        thread::spawn(move || loop {
            let (query, peer) = match conn.read_message() {
                Ok(received) => received,
                Err(_) => return,
            };
            let mut reply = query.reply();
            reply.answers = answers.clone();
            conn.write_message(&reply, peer).unwrap();
        });
        addr
    }

    fn dial(addr: SocketAddr) -> UdpConn {
        let client = UdpConn::dial(&addr.to_string()).unwrap();
        client
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        client
    }

    fn a_record(owner: &str, addr: [u8; 4]) -> Record {
        Record {
            owner: owner.parse().unwrap(),
            rr_type: Type::A,
            class: Class::IN,
            ttl: 300.into(),
            rdata: Rdata::A(addr.into()),
        }
    }

    #[test]
    fn zone_hits_are_answered_and_cached() {
        let addr = start_server(Some("example.com.\n@ A 600 10.0.0.1\n"), Vec::new(), false);
        let client = dial(addr);

        client
            .write(&a_query(0x1111, "example.com.", Type::A).pack())
            .unwrap();
        let first = client.read().unwrap();
        let reply = Message::unpack(&first).unwrap();
        assert_eq!(reply.id, 0x1111);
        assert!(reply.response);
        assert_eq!(reply.answers.len(), 1);
        assert_eq!(reply.answers[0].owner, "example.com.".parse::<Name>().unwrap());
        assert_eq!(u32::from(reply.answers[0].ttl), 600);
        assert_eq!(reply.answers[0].rdata, Rdata::A([10, 0, 0, 1].into()));

        // The second query is served from the cache: identical bytes
        // except for the transaction id.
        client
            .write(&a_query(0x2222, "example.com.", Type::A).pack())
            .unwrap();
        let second = client.read().unwrap();
        assert_eq!(&second[..2], &[0x22, 0x22]);
        assert_eq!(&second[2..], &first[2..]);
    }

    #[test]
    fn wildcard_cname_chains_are_served() {
        let addr = start_server(
            Some(
                "example.com.\n\
                 * CNAME 300 target.example.com.\n\
                 target A 300 10.0.0.2\n",
            ),
            Vec::new(),
            false,
        );
        let client = dial(addr);

        client
            .write(&a_query(7, "anything.example.com.", Type::A).pack())
            .unwrap();
        let reply = Message::unpack(&client.read().unwrap()).unwrap();
        assert_eq!(reply.answers.len(), 2);
        assert_eq!(
            reply.answers[0].rdata,
            Rdata::Cname("target.example.com.".parse().unwrap()),
        );
        assert_eq!(reply.answers[1].rdata, Rdata::A([10, 0, 0, 2].into()));
    }

    #[test]
    fn unanswerable_queries_get_servfail() {
        let addr = start_server(None, Vec::new(), false);
        let client = dial(addr);

        client
            .write(&a_query(0xbeef, "unresolvable.test.", Type::A).pack())
            .unwrap();
        let reply = Message::unpack(&client.read().unwrap()).unwrap();
        assert_eq!(reply.id, 0xbeef);
        assert_eq!(reply.rcode, Rcode::SERVFAIL);
        assert!(reply.answers.is_empty());
    }

    #[test]
    fn unanswered_queries_are_forwarded_upstream() {
        let upstream = start_upstream(vec![a_record("www.example.net.", [192, 0, 2, 7])]);
        let addr = start_server(
            None,
            vec![UpstreamEntry::plain(upstream.to_string())],
            false,
        );
        let client = dial(addr);

        client
            .write(&a_query(21, "www.example.net.", Type::A).pack())
            .unwrap();
        let reply = Message::unpack(&client.read().unwrap()).unwrap();
        assert_eq!(reply.id, 21);
        assert_eq!(reply.answers[0].rdata, Rdata::A([192, 0, 2, 7].into()));
    }

    #[test]
    fn routed_upstreams_win_over_defaults() {
        let routed = start_upstream(vec![a_record("www.baidu.cn.", [10, 1, 1, 1])]);
        let fallback = start_upstream(vec![a_record("www.baidu.cn.", [10, 2, 2, 2])]);
        let record_text = format!("cn {}\n", routed);
        let addr = start_server(
            Some(&record_text),
            vec![UpstreamEntry::plain(fallback.to_string())],
            false,
        );
        let client = dial(addr);

        client
            .write(&a_query(5, "www.baidu.cn.", Type::A).pack())
            .unwrap();
        let reply = Message::unpack(&client.read().unwrap()).unwrap();
        assert_eq!(reply.answers[0].rdata, Rdata::A([10, 1, 1, 1].into()));
    }

    #[test]
    fn polluted_replies_are_dropped() {
        let poisoned = start_upstream(vec![Record {
            owner: "www.example.net.".parse().unwrap(),
            rr_type: Type::AAAA,
            class: Class::IN,
            ttl: 300.into(),
            rdata: Rdata::Aaaa("::".parse().unwrap()),
        }]);
        let addr = start_server(
            None,
            vec![UpstreamEntry::plain(poisoned.to_string())],
            true,
        );
        let client = dial(addr);

        client
            .write(&a_query(9, "www.example.net.", Type::AAAA).pack())
            .unwrap();
        let reply = Message::unpack(&client.read().unwrap()).unwrap();
        assert_eq!(reply.rcode, Rcode::SERVFAIL);
    }

    #[test]
    fn the_crypt_transport_serves_zone_answers() {
        let cipher = Arc::new(Cipher::new(b"secret").unwrap());
        let listen = CryptConn::listen("127.0.0.1:0", cipher.clone()).unwrap();
        let addr = listen.local_addr().unwrap();
        let server = Server::new(Box::new(listen), Vec::new());
        server.publish_db(RecordDb::parse("example.com.\n@ A 600 10.0.0.1\n").unwrap());
        let server = Arc::new(server);
        thread::spawn(move || server.serve_forever());

        let client = CryptConn::dial(&addr.to_string(), cipher).unwrap();
        client
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        client
            .write(&a_query(0x1111, "example.com.", Type::A).pack())
            .unwrap();
        let reply = Message::unpack(&client.read().unwrap()).unwrap();
        assert_eq!(reply.id, 0x1111);
        assert_eq!(reply.answers[0].rdata, Rdata::A([10, 0, 0, 1].into()));
    }
}
