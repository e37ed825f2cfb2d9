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

//! Implementation of reading and writing of DNS messages.
//!
//! [`Message`] is the decoded form: the header fields broken out into
//! booleans and enums, plus the four sections. [`Message::unpack`]
//! decodes a received datagram and [`Message::pack`] serializes a
//! message, compressing repeated names. The [`Reader`] and [`Writer`]
//! types underneath can also be used directly when only part of a
//! message is of interest.

mod constants;
mod opcode;
mod question;
mod rcode;
pub mod reader;
pub mod writer;
pub use opcode::{IntoOpcodeError, Opcode};
pub use question::{Qclass, Qtype, Question};
pub use rcode::{IntoRcodeError, Rcode};
pub use reader::{Error as ReadError, Reader};
pub use writer::Writer;

use std::fmt;

use crate::rr::Record;

////////////////////////////////////////////////////////////////////////
// MESSAGES                                                           //
////////////////////////////////////////////////////////////////////////

/// A decoded DNS message.
///
/// The header's flag word is broken out into individual fields; the
/// four variable sections follow in wire order.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Message {
    pub id: u16,
    pub response: bool,
    pub opcode: Opcode,
    pub authoritative: bool,
    pub truncated: bool,
    pub recursion_desired: bool,
    pub recursion_available: bool,
    pub rcode: Rcode,
    pub questions: Vec<Question>,
    pub answers: Vec<Record>,
    pub authorities: Vec<Record>,
    pub additionals: Vec<Record>,
}

impl Message {
    /// Decodes a message from a received datagram.
    pub fn unpack(octets: &[u8]) -> Result<Self, ReadError> {
        let mut reader = Reader::try_from(octets)?;
        let mut message = Self {
            id: reader.id(),
            response: reader.qr(),
            opcode: reader.opcode(),
            authoritative: reader.aa(),
            truncated: reader.tc(),
            recursion_desired: reader.rd(),
            recursion_available: reader.ra(),
            rcode: reader.rcode(),
            questions: Vec::new(),
            answers: Vec::new(),
            authorities: Vec::new(),
            additionals: Vec::new(),
        };
        for _ in 0..reader.qdcount() {
            message.questions.push(reader.read_question()?);
        }
        for _ in 0..reader.ancount() {
            message.answers.push(reader.read_rr()?);
        }
        for _ in 0..reader.nscount() {
            message.authorities.push(reader.read_rr()?);
        }
        for _ in 0..reader.arcount() {
            message.additionals.push(reader.read_rr()?);
        }
        Ok(message)
    }

    /// Serializes this message into a datagram.
    ///
    /// A record whose RDATA cannot be encoded (an
    /// [`Rdata::Unknown`](crate::rr::Rdata::Unknown) captured on
    /// decode) is dropped; the header counts reflect the records
    /// actually emitted.
    pub fn pack(&self) -> Vec<u8> {
        let mut writer = Writer::new();
        writer.set_id(self.id);
        writer.set_qr(self.response);
        writer.set_opcode(self.opcode);
        writer.set_aa(self.authoritative);
        writer.set_tc(self.truncated);
        writer.set_rd(self.recursion_desired);
        writer.set_ra(self.recursion_available);
        writer.set_rcode(self.rcode);

        for question in &self.questions {
            writer.add_question(question);
        }
        for record in &self.answers {
            if writer.add_answer_rr(record).is_err() {
                log::debug!("dropping unencodable answer record {}", record.owner);
            }
        }
        for record in &self.authorities {
            if writer.add_authority_rr(record).is_err() {
                log::debug!("dropping unencodable authority record {}", record.owner);
            }
        }
        for record in &self.additionals {
            if writer.add_additional_rr(record).is_err() {
                log::debug!("dropping unencodable additional record {}", record.owner);
            }
        }
        writer.finish()
    }

    /// Builds the skeleton of a reply to this query: same id, opcode,
    /// and RD; QR and RA set; the question section copied; everything
    /// else empty.
    pub fn reply(&self) -> Self {
        Self {
            id: self.id,
            response: true,
            opcode: self.opcode,
            authoritative: false,
            truncated: false,
            recursion_desired: self.recursion_desired,
            recursion_available: true,
            rcode: Rcode::NOERROR,
            questions: self.questions.clone(),
            answers: Vec::new(),
            authorities: Vec::new(),
            additionals: Vec::new(),
        }
    }
}

impl fmt::Display for Message {
    /// Produces the multi-line form used in debug logs.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{{id: {}, response: {}, opcode: {}, aa: {}, tc: {}, rd: {}, ra: {}, rcode: {}}}",
            self.id,
            self.response,
            self.opcode,
            self.authoritative,
            self.truncated,
            self.recursion_desired,
            self.recursion_available,
            self.rcode,
        )?;
        for question in &self.questions {
            write!(f, "\nquestion: {}", question)?;
        }
        for record in &self.answers {
            write!(f, "\nanswer: {}", record)?;
        }
        for record in &self.authorities {
            write!(f, "\nauthority: {}", record)?;
        }
        for record in &self.additionals {
            write!(f, "\nadditional: {}", record)?;
        }
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
