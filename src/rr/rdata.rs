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

//! Implementation of the [`Rdata`] type and RDATA decoding.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use super::Type;
use crate::name::{self, wire::parse_name, Name};

////////////////////////////////////////////////////////////////////////
// RDATA TYPE                                                         //
////////////////////////////////////////////////////////////////////////

/// The type-specific data of a resource record.
///
/// Four RR types are decoded into structured form: [`A`](Rdata::A),
/// [`AAAA`](Rdata::Aaaa), [`CNAME`](Rdata::Cname) (whose embedded name
/// may be compressed on the wire), and [`NS`](Rdata::Ns) (likewise).
/// [`OPT`](Rdata::Opt) pseudo-records carry their RDATA as opaque
/// octets so EDNS payloads survive a decode/encode cycle untouched.
/// Every other type decodes to [`Unknown`](Rdata::Unknown), which
/// preserves the raw octets but cannot be re-encoded: raw RDATA may
/// contain compression pointers into the original message, which
/// would be dangling in a new one.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Rdata {
    A(Ipv4Addr),
    Aaaa(Ipv6Addr),
    Cname(Name),
    Ns(Name),
    Opt(Vec<u8>),
    Unknown(Vec<u8>),
}

impl Rdata {
    /// Decodes the RDATA of a record of type `rr_type`. The RDATA
    /// starts at index `cursor` of `message` and is `rdlength` octets
    /// long; the whole message is passed so that compression pointers
    /// in embedded names can be chased to earlier octets.
    pub fn read(
        rr_type: Type,
        message: &[u8],
        cursor: usize,
        rdlength: u16,
    ) -> Result<Self, ReadRdataError> {
        let rdata = message
            .get(cursor..cursor + rdlength as usize)
            .ok_or(ReadRdataError::UnexpectedEom)?;
        match rr_type {
            Type::A => {
                let octets: [u8; 4] = rdata.try_into().or(Err(ReadRdataError::InvalidLength))?;
                Ok(Self::A(octets.into()))
            }
            Type::AAAA => {
                let octets: [u8; 16] = rdata.try_into().or(Err(ReadRdataError::InvalidLength))?;
                Ok(Self::Aaaa(octets.into()))
            }
            Type::CNAME => Ok(Self::Cname(parse_name(message, cursor)?.0)),
            Type::NS => Ok(Self::Ns(parse_name(message, cursor)?.0)),
            Type::OPT => Ok(Self::Opt(rdata.to_vec())),
            _ => Ok(Self::Unknown(rdata.to_vec())),
        }
    }
}

impl fmt::Display for Rdata {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::A(addr) => write!(f, "{}", addr),
            Self::Aaaa(addr) => write!(f, "{}", addr),
            Self::Cname(name) => write!(f, "{}", name),
            Self::Ns(name) => write!(f, "{}", name),
            Self::Opt(octets) | Self::Unknown(octets) => {
                for octet in octets {
                    write!(f, "{:02x}", octet)?;
                }
                Ok(())
            }
        }
    }
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error signaling that RDATA could not be decoded.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ReadRdataError {
    UnexpectedEom,
    InvalidLength,
    InvalidName(name::Error),
}

impl From<name::Error> for ReadRdataError {
    fn from(err: name::Error) -> Self {
        Self::InvalidName(err)
    }
}

impl fmt::Display for ReadRdataError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::UnexpectedEom => f.write_str("RDATA extends past the end of the message"),
            Self::InvalidLength => f.write_str("RDATA has the wrong length for its type"),
            Self::InvalidName(err) => write!(f, "invalid name in RDATA: {}", err),
        }
    }
}

impl std::error::Error for ReadRdataError {}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
