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

//! The connection abstraction for datagram I/O.
//!
//! The query pipeline does all of its network I/O through the [`Conn`]
//! trait, so whether an endpoint speaks plain DNS-over-UDP
//! ([`UdpConn`]) or the encrypted framing of [`crate::crypt`]
//! ([`CryptConn`]) is purely a configuration choice. Both the listen
//! socket and the per-query upstream sockets are `Conn`s.

use std::fmt;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::Arc;
use std::time::Duration;

use crate::crypt::Cipher;
use crate::message::{self, Message};
use crate::util::Caseless;

/// The read buffer size for plain DNS over UDP.
const UDP_READ_BUF: usize = 512;

/// The read buffer size for the encrypted transport, which carries
/// padding, an IV, and a tag on top of the DNS payload.
const CRYPT_READ_BUF: usize = 1024;

////////////////////////////////////////////////////////////////////////
// TRANSPORT PROTOCOLS                                                //
////////////////////////////////////////////////////////////////////////

/// The transport spoken on a [`Conn`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Protocol {
    /// Plain DNS over UDP.
    Udp,
    /// DNS over the AES-CBC-framed UDP transport.
    Crypt,
}

impl std::str::FromStr for Protocol {
    type Err = &'static str;

    fn from_str(text: &str) -> std::result::Result<Self, Self::Err> {
        match Caseless(text) {
            Caseless("DNS") | Caseless("UDP") => Ok(Self::Udp),
            Caseless("CRYPT") => Ok(Self::Crypt),
            _ => Err("unknown protocol"),
        }
    }
}

////////////////////////////////////////////////////////////////////////
// THE CONN TRAIT                                                     //
////////////////////////////////////////////////////////////////////////

/// One datagram endpoint, as seen by the query pipeline.
pub trait Conn: Send + Sync {
    /// Reads one datagram and decodes it, returning the message and
    /// the peer address.
    fn read_message(&self) -> Result<(Message, SocketAddr)>;

    /// Reads one datagram and returns its (decrypted) payload.
    fn read(&self) -> Result<Vec<u8>>;

    /// Packs and writes a message to `peer`.
    fn write_message(&self, message: &Message, peer: SocketAddr) -> Result<()>;

    /// Writes a payload to `peer`.
    fn write_to(&self, octets: &[u8], peer: SocketAddr) -> Result<()>;

    /// Writes a payload to the connected peer (dialed connections
    /// only).
    fn write(&self, octets: &[u8]) -> Result<()>;

    /// Sets or clears the timeout for subsequent reads.
    fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()>;

    /// Returns a printable name for log lines.
    fn name(&self) -> String;
}

/// Creates the appropriate listening [`Conn`] for a transport.
pub fn listen(
    protocol: Protocol,
    addr: &str,
    cipher: Option<Arc<Cipher>>,
) -> Result<Box<dyn Conn>> {
    match protocol {
        Protocol::Udp => Ok(Box::new(UdpConn::listen(addr)?)),
        Protocol::Crypt => {
            let cipher = cipher.ok_or(Error::CipherRequired)?;
            Ok(Box::new(CryptConn::listen(addr, cipher)?))
        }
    }
}

/// Resolves `addr` (a `host:port` string) to a socket address.
fn resolve(addr: &str) -> Result<SocketAddr> {
    addr.to_socket_addrs()?
        .next()
        .ok_or_else(|| Error::Io(io::Error::new(io::ErrorKind::AddrNotAvailable, "no address")))
}

////////////////////////////////////////////////////////////////////////
// PLAIN UDP                                                          //
////////////////////////////////////////////////////////////////////////

/// A [`Conn`] speaking plain DNS over UDP.
pub struct UdpConn {
    addr: String,
    socket: UdpSocket,
}

impl UdpConn {
    /// Binds a listening connection on `addr`.
    pub fn listen(addr: &str) -> Result<Self> {
        let socket = UdpSocket::bind(resolve(addr)?)?;
        Ok(Self {
            addr: addr.to_owned(),
            socket,
        })
    }

    /// Opens a connection to the remote endpoint `addr`.
    pub fn dial(addr: &str) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect(resolve(addr)?)?;
        Ok(Self {
            addr: addr.to_owned(),
            socket,
        })
    }

    /// Returns the bound address of the underlying socket.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl Conn for UdpConn {
    fn read_message(&self) -> Result<(Message, SocketAddr)> {
        let mut buf = [0; UDP_READ_BUF];
        let (len, peer) = self.socket.recv_from(&mut buf)?;
        let message = Message::unpack(&buf[..len])?;
        Ok((message, peer))
    }

    fn read(&self) -> Result<Vec<u8>> {
        let mut buf = [0; UDP_READ_BUF];
        let len = self.socket.recv(&mut buf)?;
        Ok(buf[..len].to_vec())
    }

    fn write_message(&self, message: &Message, peer: SocketAddr) -> Result<()> {
        self.write_to(&message.pack(), peer)
    }

    fn write_to(&self, octets: &[u8], peer: SocketAddr) -> Result<()> {
        self.socket.send_to(octets, peer)?;
        Ok(())
    }

    fn write(&self, octets: &[u8]) -> Result<()> {
        self.socket.send(octets)?;
        Ok(())
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.socket.set_read_timeout(timeout)?;
        Ok(())
    }

    fn name(&self) -> String {
        format!("dns:{}", self.addr)
    }
}

////////////////////////////////////////////////////////////////////////
// ENCRYPTED UDP                                                      //
////////////////////////////////////////////////////////////////////////

/// A [`Conn`] speaking DNS over the encrypted UDP framing. Every
/// datagram is encrypted on write and decrypted on read; the rest of
/// the pipeline only ever sees DNS payloads.
pub struct CryptConn {
    addr: String,
    socket: UdpSocket,
    cipher: Arc<Cipher>,
}

impl CryptConn {
    /// Binds a listening connection on `addr`.
    pub fn listen(addr: &str, cipher: Arc<Cipher>) -> Result<Self> {
        let socket = UdpSocket::bind(resolve(addr)?)?;
        Ok(Self {
            addr: addr.to_owned(),
            socket,
            cipher,
        })
    }

    /// Opens a connection to the remote endpoint `addr`.
    pub fn dial(addr: &str, cipher: Arc<Cipher>) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect(resolve(addr)?)?;
        Ok(Self {
            addr: addr.to_owned(),
            socket,
            cipher,
        })
    }

    /// Returns the bound address of the underlying socket.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl Conn for CryptConn {
    fn read_message(&self) -> Result<(Message, SocketAddr)> {
        let mut buf = [0; CRYPT_READ_BUF];
        let (len, peer) = self.socket.recv_from(&mut buf)?;
        let message = Message::unpack(&self.cipher.decrypt(&buf[..len]))?;
        Ok((message, peer))
    }

    fn read(&self) -> Result<Vec<u8>> {
        let mut buf = [0; CRYPT_READ_BUF];
        let len = self.socket.recv(&mut buf)?;
        Ok(self.cipher.decrypt(&buf[..len]))
    }

    fn write_message(&self, message: &Message, peer: SocketAddr) -> Result<()> {
        self.write_to(&message.pack(), peer)
    }

    fn write_to(&self, octets: &[u8], peer: SocketAddr) -> Result<()> {
        self.socket.send_to(&self.cipher.encrypt(octets), peer)?;
        Ok(())
    }

    fn write(&self, octets: &[u8]) -> Result<()> {
        self.socket.send(&self.cipher.encrypt(octets))?;
        Ok(())
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.socket.set_read_timeout(timeout)?;
        Ok(())
    }

    fn name(&self) -> String {
        format!("crypt:{}", self.addr)
    }
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error produced by [`Conn`] operations.
#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    Decode(message::ReadError),
    CipherRequired,
}

impl Error {
    /// Returns whether this error is a read-deadline expiry.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::Io(err) if matches!(
                err.kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut,
            ),
        )
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<message::ReadError> for Error {
    fn from(err: message::ReadError) -> Self {
        Self::Decode(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "I/O error: {}", err),
            Self::Decode(err) => write!(f, "failed to decode message: {}", err),
            Self::CipherRequired => f.write_str("the CRYPT transport requires a key"),
        }
    }
}

impl std::error::Error for Error {}

/// A result type for [`Conn`] operations.
pub type Result<T> = std::result::Result<T, Error>;

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Opcode, Qclass, Qtype, Question, Rcode};
    use crate::rr::Type;

    fn a_query(qname: &str) -> Message {
        Message {
            id: 0x4242,
            response: false,
            opcode: Opcode::QUERY,
            authoritative: false,
            truncated: false,
            recursion_desired: true,
            recursion_available: false,
            rcode: Rcode::NOERROR,
            questions: vec![Question {
                qname: qname.parse().unwrap(),
                qtype: Qtype::from(Type::A),
                qclass: Qclass::from(1),
            }],
            answers: Vec::new(),
            authorities: Vec::new(),
            additionals: Vec::new(),
        }
    }

    #[test]
    fn udp_conns_exchange_messages() {
        let server = UdpConn::listen("127.0.0.1:0").unwrap();
        let server_addr = server.local_addr().unwrap();
        let client = UdpConn::dial(&server_addr.to_string()).unwrap();

        let query = a_query("example.com.");
        client.write(&query.pack()).unwrap();

        let (received, peer) = server.read_message().unwrap();
        assert_eq!(received, query);
        assert_eq!(peer.port(), client.local_addr().unwrap().port());

        server.write_message(&received.reply(), peer).unwrap();
        let reply = Message::unpack(&client.read().unwrap()).unwrap();
        assert_eq!(reply.id, query.id);
        assert!(reply.response);
    }

    #[test]
    fn crypt_conns_exchange_messages() {
        let cipher = Arc::new(Cipher::new(b"secret").unwrap());
        let server = CryptConn::listen("127.0.0.1:0", cipher.clone()).unwrap();
        let server_addr = server.local_addr().unwrap();
        let client = CryptConn::dial(&server_addr.to_string(), cipher).unwrap();

        let query = a_query("example.com.");
        client.write(&query.pack()).unwrap();

        let (received, peer) = server.read_message().unwrap();
        assert_eq!(received, query);

        server.write_message(&received.reply(), peer).unwrap();
        let reply = Message::unpack(&client.read().unwrap()).unwrap();
        assert_eq!(reply.id, query.id);
        assert!(reply.response);
    }

    #[test]
    fn crypt_conns_reject_plaintext_datagrams() {
        let cipher = Arc::new(Cipher::new(b"secret").unwrap());
        let server = CryptConn::listen("127.0.0.1:0", cipher).unwrap();
        let server_addr = server.local_addr().unwrap();
        let client = UdpConn::dial(&server_addr.to_string()).unwrap();

        client.write(&a_query("example.com.").pack()).unwrap();
        // The frame fails to decrypt, so decoding sees an empty
        // payload.
        assert!(server.read_message().is_err());
    }

    #[test]
    fn read_timeouts_surface_as_timeouts() {
        let conn = UdpConn::listen("127.0.0.1:0").unwrap();
        conn.set_read_timeout(Some(Duration::from_millis(20))).unwrap();
        let err = conn.read().unwrap_err();
        assert!(err.is_timeout());
    }
}
