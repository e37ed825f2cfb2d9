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

//! Implementation of the [`Reader`] type to read on-the-wire DNS
//! messages.

use std::convert::TryFrom;
use std::fmt;

use super::constants::*;
use super::{Opcode, Question, Rcode};
use crate::name::{self, wire::parse_name};
use crate::rr::rdata::ReadRdataError;
use crate::rr::{Rdata, Record};

////////////////////////////////////////////////////////////////////////
// READER                                                             //
////////////////////////////////////////////////////////////////////////

/// A "frame" around a buffer containing a DNS message that enables
/// reading the message data.
///
/// A `Reader` is constructed using its [`TryFrom`] implementation. The
/// underlying buffer must contain at least a full DNS message header
/// of 12 octets; otherwise the construction fails.
///
/// Header fields are in fixed positions and can be read at any time
/// through the appropriate methods. Questions and resource records are
/// read sequentially through [`Reader::read_question`] and
/// [`Reader::read_rr`], which advance a cursor that starts just past
/// the header.
#[derive(Eq, PartialEq)]
pub struct Reader<'a> {
    octets: &'a [u8],
    cursor: usize,
}

impl<'a> Reader<'a> {
    /// Returns the 16-bit ID of the message.
    pub fn id(&self) -> u16 {
        u16::from_be_bytes(self.octets[ID_START..ID_START + 2].try_into().unwrap())
    }

    /// Returns whether the QR (query response) bit is set.
    pub fn qr(&self) -> bool {
        (self.octets[QR_BYTE] & QR_MASK) != 0
    }

    /// Returns the message's opcode.
    pub fn opcode(&self) -> Opcode {
        let raw = (self.octets[OPCODE_BYTE] & OPCODE_MASK) >> OPCODE_SHIFT;
        raw.try_into().unwrap()
    }

    /// Returns whether the AA (authoritative answer) bit is set.
    pub fn aa(&self) -> bool {
        (self.octets[AA_BYTE] & AA_MASK) != 0
    }

    /// Returns whether the TC (truncation) bit is set.
    pub fn tc(&self) -> bool {
        (self.octets[TC_BYTE] & TC_MASK) != 0
    }

    /// Returns whether the RD (recursion desired) bit is set.
    pub fn rd(&self) -> bool {
        (self.octets[RD_BYTE] & RD_MASK) != 0
    }

    /// Returns whether the RA (recursion available) bit is set.
    pub fn ra(&self) -> bool {
        (self.octets[RA_BYTE] & RA_MASK) != 0
    }

    /// Returns the RCODE of the message.
    pub fn rcode(&self) -> Rcode {
        let raw = self.octets[RCODE_BYTE] & RCODE_MASK;
        raw.try_into().unwrap()
    }

    /// Returns the number of questions in the message.
    pub fn qdcount(&self) -> u16 {
        u16::from_be_bytes(
            self.octets[QDCOUNT_START..QDCOUNT_START + 2]
                .try_into()
                .unwrap(),
        )
    }

    /// Returns the number of answers in the message.
    pub fn ancount(&self) -> u16 {
        u16::from_be_bytes(
            self.octets[ANCOUNT_START..ANCOUNT_START + 2]
                .try_into()
                .unwrap(),
        )
    }

    /// Returns the number of authority records in the message.
    pub fn nscount(&self) -> u16 {
        u16::from_be_bytes(
            self.octets[NSCOUNT_START..NSCOUNT_START + 2]
                .try_into()
                .unwrap(),
        )
    }

    /// Returns the number of additional records in the message.
    pub fn arcount(&self) -> u16 {
        u16::from_be_bytes(
            self.octets[ARCOUNT_START..ARCOUNT_START + 2]
                .try_into()
                .unwrap(),
        )
    }

    /// Reads a [`Question`] starting at the current cursor.
    ///
    /// This method is atomic, in that the cursor is not changed on
    /// failure.
    pub fn read_question(&mut self) -> Result<Question> {
        let (qname, after_name) =
            parse_name(self.octets, self.cursor).map_err(Error::InvalidName)?;
        let qtype = read_u16(self.octets, after_name)?.into();
        let qclass = read_u16(self.octets, after_name + 2)?.into();
        self.cursor = after_name + 4;
        Ok(Question {
            qname,
            qtype,
            qclass,
        })
    }

    /// Reads a resource record starting at the current cursor.
    ///
    /// This method is atomic, in that the cursor is not changed on
    /// failure.
    pub fn read_rr(&mut self) -> Result<Record> {
        let (owner, after_name) =
            parse_name(self.octets, self.cursor).map_err(Error::InvalidName)?;
        let rr_type = read_u16(self.octets, after_name)?.into();
        let class = read_u16(self.octets, after_name + 2)?.into();
        let ttl = read_u32(self.octets, after_name + 4)?.into();
        let rdlength = read_u16(self.octets, after_name + 8)?;
        let rdata = Rdata::read(rr_type, self.octets, after_name + 10, rdlength)?;
        self.cursor = after_name + 10 + rdlength as usize;
        Ok(Record {
            owner,
            rr_type,
            class,
            ttl,
            rdata,
        })
    }
}

impl<'a> TryFrom<&'a [u8]> for Reader<'a> {
    type Error = Error;

    fn try_from(octets: &'a [u8]) -> Result<Self> {
        if octets.len() >= HEADER_SIZE {
            Ok(Self {
                octets,
                cursor: HEADER_SIZE,
            })
        } else {
            Err(Error::HeaderTooShort)
        }
    }
}

impl fmt::Debug for Reader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Reader")
            .field("id", &self.id())
            .field("qr", &self.qr())
            .field("opcode", &self.opcode())
            .field("rcode", &self.rcode())
            .field("qdcount", &self.qdcount())
            .field("ancount", &self.ancount())
            .field("nscount", &self.nscount())
            .field("arcount", &self.arcount())
            .field("cursor", &self.cursor)
            .finish()
    }
}

////////////////////////////////////////////////////////////////////////
// HELPERS FOR READING MULTI-BYTE INTEGERS                            //
////////////////////////////////////////////////////////////////////////

/// Reads a network-byte-order `u16` at index `at` of `octets`.
fn read_u16(octets: &[u8], at: usize) -> Result<u16> {
    let array = octets
        .get(at..at + 2)
        .ok_or(Error::UnexpectedEomInField)?
        .try_into()
        .unwrap();
    Ok(u16::from_be_bytes(array))
}

/// Reads a network-byte-order `u32` at index `at` of `octets`.
fn read_u32(octets: &[u8], at: usize) -> Result<u32> {
    let array = octets
        .get(at..at + 4)
        .ok_or(Error::UnexpectedEomInField)?
        .try_into()
        .unwrap();
    Ok(u32::from_be_bytes(array))
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error signaling that a [`Question`] or resource record could not
/// be read.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Error {
    HeaderTooShort,
    UnexpectedEomInField,
    InvalidName(name::Error),
    InvalidRdata(ReadRdataError),
}

impl From<ReadRdataError> for Error {
    fn from(err: ReadRdataError) -> Self {
        Self::InvalidRdata(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::HeaderTooShort => f.write_str("the message is too short to contain a header"),
            Self::UnexpectedEomInField => f.write_str("a field extends past the end of the message"),
            Self::InvalidName(err) => write!(f, "invalid name: {}", err),
            Self::InvalidRdata(err) => write!(f, "invalid RDATA: {}", err),
        }
    }
}

impl std::error::Error for Error {}

/// A result type for [`Reader`] operations.
pub type Result<T> = std::result::Result<T, Error>;
