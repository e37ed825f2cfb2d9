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

//! The pollution filter for upstream replies.
//!
//! On poisoned UDP paths, injected answers arrive before the real
//! ones and carry a small set of well-known bogus addresses. The
//! filter inspects the first answer record of an upstream reply and
//! rejects it when the RDATA matches one of those signatures; the
//! pipeline then tries the next upstream. It is applied before cache
//! insertion, and only when enabled in the configuration.

use std::net::{Ipv4Addr, Ipv6Addr};

use crate::message::Message;
use crate::rr::Rdata;

/// IPv4 addresses known to be injected on polluted paths. The first
/// three are unroutable or catch-all values; the rest have been
/// observed in injected answers for years.
const A_BLACKLIST: [Ipv4Addr; 12] = [
    Ipv4Addr::new(0, 0, 0, 0),
    Ipv4Addr::new(1, 1, 1, 1),
    Ipv4Addr::new(255, 255, 255, 255),
    Ipv4Addr::new(8, 7, 198, 45),
    Ipv4Addr::new(37, 61, 54, 158),
    Ipv4Addr::new(46, 82, 174, 68),
    Ipv4Addr::new(59, 24, 3, 173),
    Ipv4Addr::new(78, 16, 49, 15),
    Ipv4Addr::new(93, 46, 8, 89),
    Ipv4Addr::new(159, 106, 121, 75),
    Ipv4Addr::new(203, 98, 7, 65),
    Ipv4Addr::new(243, 185, 187, 39),
];

/// IPv6 addresses known to be injected on polluted paths.
const AAAA_BLACKLIST: [Ipv6Addr; 1] = [Ipv6Addr::new(0x2001, 0x0da8, 0x0112, 0, 0, 0, 0, 0x21ae)];

/// The number of zero octets in an AAAA answer beyond which the
/// address is considered bogus.
const MAX_AAAA_ZERO_OCTETS: usize = 11;

/// Returns whether `reply` looks like an injected (polluted) answer.
/// Only the first answer record is inspected; replies with no
/// question or no answers pass unchanged.
pub fn is_polluted(reply: &Message) -> bool {
    if reply.questions.is_empty() {
        return false;
    }
    let rdata = match reply.answers.first() {
        Some(answer) => &answer.rdata,
        None => return false,
    };

    match rdata {
        Rdata::A(addr) => A_BLACKLIST.contains(addr),
        Rdata::Aaaa(addr) => {
            let octets = addr.octets();
            octets[0] == 0
                || AAAA_BLACKLIST.contains(addr)
                || octets.iter().filter(|&&octet| octet == 0).count() > MAX_AAAA_ZERO_OCTETS
        }
        _ => false,
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::Class;
    use crate::message::{Opcode, Qclass, Qtype, Question, Rcode};
    use crate::rr::{Record, Type};

    fn reply_with_first_answer(rdata: Rdata) -> Message {
        let rr_type = match rdata {
            Rdata::A(_) => Type::A,
            Rdata::Aaaa(_) => Type::AAAA,
            _ => Type::TXT,
        };
        Message {
            id: 1,
            response: true,
            opcode: Opcode::QUERY,
            authoritative: false,
            truncated: false,
            recursion_desired: true,
            recursion_available: true,
            rcode: Rcode::NOERROR,
            questions: vec![Question {
                qname: "example.com.".parse().unwrap(),
                qtype: Qtype::from(rr_type),
                qclass: Qclass::from(Class::IN),
            }],
            answers: vec![Record {
                owner: "example.com.".parse().unwrap(),
                rr_type,
                class: Class::IN,
                ttl: 60.into(),
                rdata,
            }],
            authorities: Vec::new(),
            additionals: Vec::new(),
        }
    }

    #[test]
    fn blacklisted_a_answers_are_polluted() {
        for addr in A_BLACKLIST {
            assert!(is_polluted(&reply_with_first_answer(Rdata::A(addr))));
        }
    }

    #[test]
    fn ordinary_a_answers_pass() {
        let reply = reply_with_first_answer(Rdata::A(Ipv4Addr::new(93, 184, 216, 34)));
        assert!(!is_polluted(&reply));
    }

    #[test]
    fn aaaa_answers_with_a_leading_zero_octet_are_polluted() {
        let reply = reply_with_first_answer(Rdata::Aaaa("::1".parse().unwrap()));
        assert!(is_polluted(&reply));
        let reply = reply_with_first_answer(Rdata::Aaaa("::".parse().unwrap()));
        assert!(is_polluted(&reply));
    }

    #[test]
    fn blacklisted_aaaa_answers_are_polluted() {
        let reply = reply_with_first_answer(Rdata::Aaaa("2001:da8:112::21ae".parse().unwrap()));
        assert!(is_polluted(&reply));
    }

    #[test]
    fn mostly_zero_aaaa_answers_are_polluted() {
        // 2001:: has fourteen zero octets.
        let reply = reply_with_first_answer(Rdata::Aaaa("2001::".parse().unwrap()));
        assert!(is_polluted(&reply));
    }

    #[test]
    fn ordinary_aaaa_answers_pass() {
        let reply = reply_with_first_answer(Rdata::Aaaa(
            "2606:2800:220:1:248:1893:25c8:1946".parse().unwrap(),
        ));
        assert!(!is_polluted(&reply));
    }

    #[test]
    fn replies_without_questions_or_answers_pass() {
        let mut reply = reply_with_first_answer(Rdata::A(Ipv4Addr::new(0, 0, 0, 0)));
        reply.questions.clear();
        assert!(!is_polluted(&reply));

        let mut reply = reply_with_first_answer(Rdata::A(Ipv4Addr::new(0, 0, 0, 0)));
        reply.answers.clear();
        assert!(!is_polluted(&reply));
    }
}
