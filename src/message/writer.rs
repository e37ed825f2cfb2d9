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

//! Implementation of the [`Writer`] type to write on-the-wire DNS
//! messages.

use std::fmt;

use super::constants::*;
use super::{Opcode, Question, Rcode};
use crate::name::wire::{write_name, CompressionMap};
use crate::rr::{Rdata, Record};

////////////////////////////////////////////////////////////////////////
// WRITER                                                             //
////////////////////////////////////////////////////////////////////////

/// A growable buffer that serializes a DNS message into it.
///
/// A new `Writer` starts with a zeroed 12-octet header. Header fields
/// are in fixed positions and can be set at any time through the
/// appropriate methods. Questions and resource records are appended
/// sequentially with [`Writer::add_question`], [`Writer::add_answer_rr`],
/// [`Writer::add_authority_rr`], and [`Writer::add_additional_rr`],
/// which must be used in that order so that sections land in their
/// proper places. Every name written passes through a shared
/// per-message [`CompressionMap`], so repeated names become 14-bit
/// pointers.
///
/// The section count fields of the header are computed from the
/// records *actually written* when [`Writer::finish`] is called; a
/// record that fails to encode (see [`Error`]) leaves no trace in the
/// message.
pub struct Writer {
    octets: Vec<u8>,
    names: CompressionMap,
    qdcount: u16,
    ancount: u16,
    nscount: u16,
    arcount: u16,
}

impl Writer {
    /// Creates a new `Writer` holding an empty message.
    pub fn new() -> Self {
        Self {
            octets: vec![0; HEADER_SIZE],
            names: CompressionMap::new(),
            qdcount: 0,
            ancount: 0,
            nscount: 0,
            arcount: 0,
        }
    }

    /// Sets the 16-bit ID of the message.
    pub fn set_id(&mut self, id: u16) {
        self.octets[ID_START..ID_START + 2].copy_from_slice(&id.to_be_bytes());
    }

    /// Sets or clears the QR (query response) bit.
    pub fn set_qr(&mut self, qr: bool) {
        self.set_flag(QR_BYTE, QR_MASK, qr);
    }

    /// Sets the message's opcode.
    pub fn set_opcode(&mut self, opcode: Opcode) {
        self.octets[OPCODE_BYTE] &= !OPCODE_MASK;
        self.octets[OPCODE_BYTE] |= u8::from(opcode) << OPCODE_SHIFT;
    }

    /// Sets or clears the AA (authoritative answer) bit.
    pub fn set_aa(&mut self, aa: bool) {
        self.set_flag(AA_BYTE, AA_MASK, aa);
    }

    /// Sets or clears the TC (truncation) bit.
    pub fn set_tc(&mut self, tc: bool) {
        self.set_flag(TC_BYTE, TC_MASK, tc);
    }

    /// Sets or clears the RD (recursion desired) bit.
    pub fn set_rd(&mut self, rd: bool) {
        self.set_flag(RD_BYTE, RD_MASK, rd);
    }

    /// Sets or clears the RA (recursion available) bit.
    pub fn set_ra(&mut self, ra: bool) {
        self.set_flag(RA_BYTE, RA_MASK, ra);
    }

    /// Sets the message's RCODE.
    pub fn set_rcode(&mut self, rcode: Rcode) {
        self.octets[RCODE_BYTE] &= !RCODE_MASK;
        self.octets[RCODE_BYTE] |= u8::from(rcode);
    }

    fn set_flag(&mut self, byte: usize, mask: u8, value: bool) {
        if value {
            self.octets[byte] |= mask;
        } else {
            self.octets[byte] &= !mask;
        }
    }

    /// Appends a question to the message. This must be used before any
    /// resource records are added.
    pub fn add_question(&mut self, question: &Question) {
        write_name(&mut self.octets, &question.qname, &mut self.names);
        self.push_u16(question.qtype.into());
        self.push_u16(question.qclass.into());
        self.qdcount += 1;
    }

    /// Appends a resource record to the answer section.
    pub fn add_answer_rr(&mut self, record: &Record) -> Result<()> {
        self.add_rr(record)?;
        self.ancount += 1;
        Ok(())
    }

    /// Appends a resource record to the authority section.
    pub fn add_authority_rr(&mut self, record: &Record) -> Result<()> {
        self.add_rr(record)?;
        self.nscount += 1;
        Ok(())
    }

    /// Appends a resource record to the additional section.
    pub fn add_additional_rr(&mut self, record: &Record) -> Result<()> {
        self.add_rr(record)?;
        self.arcount += 1;
        Ok(())
    }

    /// Writes out an RR at the end of the buffer. The encodability
    /// check happens before any octet is written, so a failed add
    /// leaves the message untouched.
    fn add_rr(&mut self, record: &Record) -> Result<()> {
        if matches!(record.rdata, Rdata::Unknown(_)) {
            // Raw RDATA captured on decode may contain compression
            // pointers into the *original* message, which would be
            // dangling here.
            return Err(Error::UnencodableRdata);
        }

        write_name(&mut self.octets, &record.owner, &mut self.names);
        self.push_u16(record.rr_type.into());
        self.push_u16(record.class.into());
        self.push_u32(record.ttl.into());

        // Save two octets for the RDLENGTH field; it must be computed
        // at the end, since compression affects it.
        let rdlength_start = self.octets.len();
        self.push_u16(0);
        match &record.rdata {
            Rdata::A(addr) => self.octets.extend_from_slice(&addr.octets()),
            Rdata::Aaaa(addr) => self.octets.extend_from_slice(&addr.octets()),
            Rdata::Cname(name) | Rdata::Ns(name) => {
                write_name(&mut self.octets, name, &mut self.names)
            }
            Rdata::Opt(octets) => self.octets.extend_from_slice(octets),
            Rdata::Unknown(_) => unreachable!(),
        }
        let rdlength = (self.octets.len() - rdlength_start - 2) as u16;
        self.octets[rdlength_start..rdlength_start + 2].copy_from_slice(&rdlength.to_be_bytes());
        Ok(())
    }

    /// Finishes the message: the section counts are patched into the
    /// header and the underlying buffer is returned.
    pub fn finish(mut self) -> Vec<u8> {
        self.octets[QDCOUNT_START..QDCOUNT_START + 2]
            .copy_from_slice(&self.qdcount.to_be_bytes());
        self.octets[ANCOUNT_START..ANCOUNT_START + 2]
            .copy_from_slice(&self.ancount.to_be_bytes());
        self.octets[NSCOUNT_START..NSCOUNT_START + 2]
            .copy_from_slice(&self.nscount.to_be_bytes());
        self.octets[ARCOUNT_START..ARCOUNT_START + 2]
            .copy_from_slice(&self.arcount.to_be_bytes());
        self.octets
    }

    fn push_u16(&mut self, data: u16) {
        self.octets.extend_from_slice(&data.to_be_bytes());
    }

    fn push_u32(&mut self, data: u32) {
        self.octets.extend_from_slice(&data.to_be_bytes());
    }
}

impl Default for Writer {
    fn default() -> Self {
        Self::new()
    }
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error signaling that a resource record could not be written.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Error {
    UnencodableRdata,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::UnencodableRdata => f.write_str("RDATA of this type cannot be re-encoded"),
        }
    }
}

impl std::error::Error for Error {}

/// A result type for [`Writer`] operations.
pub type Result<T> = std::result::Result<T, Error>;
