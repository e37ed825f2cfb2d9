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

//! The datagram cipher for the encrypted UDP transport.
//!
//! An encrypted datagram is framed as
//!
//! ```text
//! IV (16) || AES-128-CBC ciphertext of the PKCS#5-padded plaintext
//!         || CRC32 of the plaintext (4, big-endian)
//! ```
//!
//! The framing is symmetric between client and server and there is no
//! key exchange: both sides derive the AES key by PKCS#5-padding a
//! shared secret to one block. The CRC is an integrity check against
//! truncation and corruption, not an authenticator.

use std::fmt;

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use log::{debug, error};
use rand::RngCore;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

/// The AES block size, which is also the IV size and the padded key
/// size.
const BLOCK_SIZE: usize = 16;

/// The size of the trailing CRC32 integrity tag.
const TAG_SIZE: usize = 4;

/// The smallest well-formed frame: one IV, one ciphertext block, one
/// tag.
const MIN_FRAME_SIZE: usize = 2 * BLOCK_SIZE + TAG_SIZE;

////////////////////////////////////////////////////////////////////////
// CIPHER                                                             //
////////////////////////////////////////////////////////////////////////

/// A datagram cipher derived from a shared key.
///
/// [`Cipher::decrypt`] never fails: every malformed input decrypts to
/// an empty vector, which downstream message decoding rejects as too
/// short, the same way a garbage plaintext datagram surfaces as a
/// decode error.
#[derive(Debug)]
pub struct Cipher {
    key: [u8; BLOCK_SIZE],
}

impl Cipher {
    /// Creates a `Cipher` from a shared key of fewer than 16 octets.
    /// The key is PKCS#5-padded to exactly one AES block.
    pub fn new(key: &[u8]) -> Result<Self, Error> {
        if key.len() >= BLOCK_SIZE {
            return Err(Error::KeyTooLong);
        }
        let mut padded = [0; BLOCK_SIZE];
        padded[..key.len()].copy_from_slice(key);
        let padding = (BLOCK_SIZE - key.len()) as u8;
        for octet in &mut padded[key.len()..] {
            *octet = padding;
        }
        Ok(Self { key: padded })
    }

    /// Encrypts one datagram, generating a fresh random IV.
    pub fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        let mut iv = [0; BLOCK_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut iv);
        let ciphertext = Aes128CbcEnc::new(&self.key.into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

        let mut frame = Vec::with_capacity(BLOCK_SIZE + ciphertext.len() + TAG_SIZE);
        frame.extend_from_slice(&iv);
        frame.extend_from_slice(&ciphertext);
        frame.extend_from_slice(&crc32fast::hash(plaintext).to_be_bytes());
        frame
    }

    /// Decrypts one datagram. Returns an empty vector if the frame is
    /// too short, the ciphertext is not a whole number of blocks, the
    /// padding is invalid, or the integrity tag does not match.
    pub fn decrypt(&self, frame: &[u8]) -> Vec<u8> {
        if frame.len() < MIN_FRAME_SIZE {
            return Vec::new();
        }

        let iv: [u8; BLOCK_SIZE] = frame[..BLOCK_SIZE].try_into().unwrap();
        let ciphertext = &frame[BLOCK_SIZE..frame.len() - TAG_SIZE];
        let tag = u32::from_be_bytes(frame[frame.len() - TAG_SIZE..].try_into().unwrap());

        let plaintext = match Aes128CbcDec::new(&self.key.into(), &iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        {
            Ok(plaintext) => plaintext,
            Err(err) => {
                error!("failed to decrypt datagram: {:?}", err);
                return Vec::new();
            }
        };
        if crc32fast::hash(&plaintext) != tag {
            debug!("dropping datagram with a bad integrity tag");
            return Vec::new();
        }
        plaintext
    }
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error signaling that a [`Cipher`] could not be constructed.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Error {
    KeyTooLong,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::KeyTooLong => f.write_str("the key must be shorter than 16 octets"),
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

    #[test]
    fn encrypted_datagrams_decrypt_back() {
        let cipher = Cipher::new(b"secret").unwrap();
        let plaintext = b"a perfectly ordinary DNS datagram";
        let frame = cipher.encrypt(plaintext);
        assert_eq!(cipher.decrypt(&frame), plaintext);
    }

    #[test]
    fn frames_have_the_documented_layout() {
        let cipher = Cipher::new(b"secret").unwrap();
        // A 20-octet plaintext pads to two blocks.
        let frame = cipher.encrypt(&[0xab; 20]);
        assert_eq!(frame.len(), BLOCK_SIZE + 2 * BLOCK_SIZE + TAG_SIZE);
        let tag = u32::from_be_bytes(frame[frame.len() - 4..].try_into().unwrap());
        assert_eq!(tag, crc32fast::hash(&[0xab; 20]));
    }

    #[test]
    fn a_flipped_ciphertext_bit_produces_empty_output() {
        let cipher = Cipher::new(b"secret").unwrap();
        let mut frame = cipher.encrypt(b"a perfectly ordinary DNS datagram");
        frame[BLOCK_SIZE + 3] ^= 0x10;
        assert!(cipher.decrypt(&frame).is_empty());
    }

    #[test]
    fn a_flipped_iv_bit_produces_empty_output() {
        let cipher = Cipher::new(b"secret").unwrap();
        let mut frame = cipher.encrypt(b"a perfectly ordinary DNS datagram");
        frame[0] ^= 0x01;
        assert!(cipher.decrypt(&frame).is_empty());
    }

    #[test]
    fn a_flipped_tag_bit_produces_empty_output() {
        let cipher = Cipher::new(b"secret").unwrap();
        let mut frame = cipher.encrypt(b"a perfectly ordinary DNS datagram");
        let last = frame.len() - 1;
        frame[last] ^= 0x01;
        assert!(cipher.decrypt(&frame).is_empty());
    }

    #[test]
    fn short_and_misaligned_inputs_produce_empty_output() {
        let cipher = Cipher::new(b"secret").unwrap();
        assert!(cipher.decrypt(&[]).is_empty());
        assert!(cipher.decrypt(&[0; MIN_FRAME_SIZE - 1]).is_empty());
        // 37 octets: one IV, a 17-octet (misaligned) ciphertext, one
        // tag.
        assert!(cipher.decrypt(&[0; MIN_FRAME_SIZE + 1]).is_empty());
    }

    #[test]
    fn long_keys_are_rejected() {
        assert_eq!(
            Cipher::new(b"0123456789abcdef").unwrap_err(),
            Error::KeyTooLong,
        );
        assert!(Cipher::new(b"").is_ok());
        assert!(Cipher::new(b"0123456789abcde").is_ok());
    }
}
