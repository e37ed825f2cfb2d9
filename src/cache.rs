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

//! The TTL cache for packed answers.
//!
//! Successful answers (local or upstream) are memoized by
//! `(qname, qtype)` as fully packed datagrams. A cached packet still
//! carries the transaction id of the query that produced it, so the
//! caller MUST overwrite the first two octets with the current
//! client's id before delivery.
//!
//! There is no background sweeper: a stale entry is deleted by the
//! first [`Cache::get`] that observes its expiry.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use crate::name::Name;
use crate::rr::Type;

////////////////////////////////////////////////////////////////////////
// CACHE                                                              //
////////////////////////////////////////////////////////////////////////

/// A cached answer: the packed datagram, its lifetime, and when it
/// was installed.
struct Entry {
    packet: Vec<u8>,
    ttl: Duration,
    inserted_at: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.inserted_at) >= self.ttl
    }
}

/// The answer cache. All methods take `&self`; the cache is shared
/// across query-handler threads behind a reader-writer lock.
#[derive(Default)]
pub struct Cache {
    entries: RwLock<HashMap<(Name, Type), Entry>>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up the cached packet for `(qname, qtype)`. An entry past
    /// its TTL is deleted and reported as a miss.
    pub fn get(&self, qname: &Name, qtype: Type) -> Option<Vec<u8>> {
        let key = (qname.clone(), qtype);
        {
            let entries = self.entries.read().unwrap();
            match entries.get(&key) {
                None => return None,
                Some(entry) if !entry.is_expired(Instant::now()) => {
                    return Some(entry.packet.clone())
                }
                Some(_) => {}
            }
        }

        // The entry was expired: upgrade to the write lock to delete
        // it. Another thread may have raced us here, so re-check.
        let mut entries = self.entries.write().unwrap();
        if let Some(entry) = entries.get(&key) {
            if entry.is_expired(Instant::now()) {
                entries.remove(&key);
                log::debug!("cache entry for {}[{}] expired", qname, qtype);
            }
        }
        None
    }

    /// Installs a packed answer for `(qname, qtype)`. If a non-expired
    /// entry already exists, the call is a no-op: the first writer
    /// wins.
    pub fn insert(&self, qname: &Name, qtype: Type, packet: Vec<u8>, ttl: Duration) {
        let key = (qname.clone(), qtype);
        {
            let entries = self.entries.read().unwrap();
            if let Some(entry) = entries.get(&key) {
                if !entry.is_expired(Instant::now()) {
                    return;
                }
            }
        }

        let mut entries = self.entries.write().unwrap();
        if let Some(entry) = entries.get(&key) {
            if !entry.is_expired(Instant::now()) {
                return;
            }
        }
        entries.insert(
            key,
            Entry {
                packet,
                ttl,
                inserted_at: Instant::now(),
            },
        );
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }
}

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
    fn live_entries_are_returned() {
        let cache = Cache::new();
        cache.insert(
            &name("example.com."),
            Type::A,
            vec![1, 2, 3],
            Duration::from_secs(60),
        );
        assert_eq!(
            cache.get(&name("example.com."), Type::A),
            Some(vec![1, 2, 3]),
        );
    }

    #[test]
    fn entries_are_keyed_by_name_and_type() {
        let cache = Cache::new();
        cache.insert(
            &name("example.com."),
            Type::A,
            vec![1],
            Duration::from_secs(60),
        );
        assert_eq!(cache.get(&name("example.com."), Type::AAAA), None);
        assert_eq!(cache.get(&name("other.com."), Type::A), None);
    }

    #[test]
    fn keys_are_case_insensitive() {
        let cache = Cache::new();
        cache.insert(
            &name("example.com."),
            Type::A,
            vec![1],
            Duration::from_secs(60),
        );
        assert_eq!(cache.get(&name("EXAMPLE.com."), Type::A), Some(vec![1]));
    }

    #[test]
    fn expired_entries_miss_and_are_deleted() {
        let cache = Cache::new();
        cache.insert(&name("example.com."), Type::A, vec![1], Duration::ZERO);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&name("example.com."), Type::A), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn the_first_writer_wins() {
        let cache = Cache::new();
        cache.insert(
            &name("example.com."),
            Type::A,
            vec![1],
            Duration::from_secs(60),
        );
        cache.insert(
            &name("example.com."),
            Type::A,
            vec![2],
            Duration::from_secs(60),
        );
        assert_eq!(cache.get(&name("example.com."), Type::A), Some(vec![1]));
    }

    #[test]
    fn expired_entries_can_be_replaced() {
        let cache = Cache::new();
        cache.insert(&name("example.com."), Type::A, vec![1], Duration::ZERO);
        cache.insert(
            &name("example.com."),
            Type::A,
            vec![2],
            Duration::from_secs(60),
        );
        assert_eq!(cache.get(&name("example.com."), Type::A), Some(vec![2]));
    }
}
