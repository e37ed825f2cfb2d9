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

//! Upstream resolver entries.

use std::fmt;
use std::sync::Arc;

use crate::conn::{self, Conn, CryptConn, Protocol, UdpConn};
use crate::crypt::Cipher;

/// One upstream resolver: a transport, a `host:port` address, and the
/// cipher for the [`Crypt`](Protocol::Crypt) transport.
///
/// The pipeline opens a fresh connection per query with
/// [`UpstreamEntry::dial`], so exchanges on behalf of different
/// clients never share a socket and reply demultiplexing is never
/// needed.
#[derive(Clone)]
pub struct UpstreamEntry {
    pub protocol: Protocol,
    pub addr: String,
    pub cipher: Option<Arc<Cipher>>,
}

impl UpstreamEntry {
    /// Creates a plain-UDP upstream entry.
    pub fn plain(addr: impl Into<String>) -> Self {
        Self {
            protocol: Protocol::Udp,
            addr: addr.into(),
            cipher: None,
        }
    }

    /// Opens a fresh connection to this upstream.
    pub fn dial(&self) -> conn::Result<Box<dyn Conn>> {
        match self.protocol {
            Protocol::Udp => Ok(Box::new(UdpConn::dial(&self.addr)?)),
            Protocol::Crypt => {
                let cipher = self.cipher.clone().ok_or(conn::Error::CipherRequired)?;
                Ok(Box::new(CryptConn::dial(&self.addr, cipher)?))
            }
        }
    }
}

impl fmt::Display for UpstreamEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.protocol {
            Protocol::Udp => write!(f, "dns:{}", self.addr),
            Protocol::Crypt => write!(f, "crypt:{}", self.addr),
        }
    }
}

impl fmt::Debug for UpstreamEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}
