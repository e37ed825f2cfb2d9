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

//! Reading and writing of on-the-wire domain names.
//!
//! On the wire a name is a sequence of length-prefixed labels ending
//! with a zero-length label. A label whose length octet has the top
//! two bits set is instead a pointer: the remaining 14 bits give the
//! message offset of a prior occurrence, and decoding continues
//! there. Writing uses whole-name deduplication only (a name is
//! either emitted in full or replaced entirely by one pointer), which
//! is sufficient to interoperate with standard resolvers.

use std::collections::HashMap;

use arrayvec::ArrayVec;

use super::{validate_label, Error, Name, MAX_WIRE_LEN};

/// The maximum number of labels in a name (a 255-octet name can hold
/// 127 single-octet labels).
const MAX_N_LABELS: usize = 127;

/// The maximum message offset expressible in a 14-bit compression
/// pointer.
const POINTER_MAX: usize = 0x3fff;

/// The maximum number of compression pointers that may be followed
/// while decoding a single name. Anything deeper is treated as a
/// malformed (or malicious) message.
const MAX_POINTER_HOPS: usize = 10;

////////////////////////////////////////////////////////////////////////
// WRITING                                                            //
////////////////////////////////////////////////////////////////////////

/// A per-message table mapping each whole name already written to the
/// message offset of its first occurrence.
#[derive(Debug, Default)]
pub struct CompressionMap {
    offsets: HashMap<Name, u16>,
}

impl CompressionMap {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Appends the wire form of `name` to `buf`, which must contain the
/// message serialized so far (so that `buf.len()` is the current
/// message offset). If the name was written before, a single pointer
/// to its first occurrence is emitted instead of the labels.
pub fn write_name(buf: &mut Vec<u8>, name: &Name, map: &mut CompressionMap) {
    if let Some(&offset) = map.offsets.get(name) {
        buf.extend_from_slice(&(0xc000 | offset).to_be_bytes());
        return;
    }

    // Offsets past the 14-bit range cannot be the target of a
    // pointer, so such occurrences are not recorded.
    if buf.len() <= POINTER_MAX {
        map.offsets.insert(name.clone(), buf.len() as u16);
    }
    for label in name.labels() {
        buf.push(label.len() as u8);
        buf.extend_from_slice(label.as_bytes());
    }
    buf.push(0);
}

////////////////////////////////////////////////////////////////////////
// READING                                                            //
////////////////////////////////////////////////////////////////////////

/// Parses a (possibly compressed) name starting at index `start` of
/// `octets`. Pointer targets are indices into `octets`, so the entire
/// message must be passed. On success, returns the name and the index
/// of the first octet after the name's first chunk (i.e. where the
/// enclosing structure resumes).
pub fn parse_name(octets: &[u8], start: usize) -> Result<(Name, usize), Error> {
    let mut labels = ArrayVec::<&str, MAX_N_LABELS>::new();
    let mut index = start;
    let mut resume_at = None;
    let mut hops = 0;
    let mut wire_len = 1;

    loop {
        let len_octet = *octets.get(index).ok_or(Error::UnexpectedEom)? as usize;
        match len_octet & 0xc0 {
            0x00 => {
                index += 1;
                if len_octet == 0 {
                    break;
                }
                let end = index + len_octet;
                let raw = octets.get(index..end).ok_or(Error::UnexpectedEom)?;
                let label = std::str::from_utf8(raw).or(Err(Error::InvalidLabel))?;
                validate_label(label)?;
                wire_len += len_octet + 1;
                if wire_len > MAX_WIRE_LEN {
                    return Err(Error::NameTooLong);
                }
                labels.try_push(label).or(Err(Error::NameTooLong))?;
                index = end;
            }
            0xc0 => {
                let low = *octets.get(index + 1).ok_or(Error::UnexpectedEom)? as usize;
                resume_at.get_or_insert(index + 2);
                hops += 1;
                if hops > MAX_POINTER_HOPS {
                    return Err(Error::TooManyPointers);
                }
                index = ((len_octet & 0x3f) << 8) | low;
            }
            // The 0x40 and 0x80 label types were never standardized.
            _ => return Err(Error::BadLabelType),
        }
    }

    Ok((
        Name::from_validated_labels(&labels),
        resume_at.unwrap_or(index),
    ))
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
    fn parse_name_accepts_uncompressed_names() {
        let octets = b"junk\x07example\x04test\x00junk";
        assert_eq!(
            parse_name(octets, 4),
            Ok((name("example.test."), 18)),
        );
    }

    #[test]
    fn parse_name_accepts_the_root() {
        assert_eq!(parse_name(b"\x00", 0), Ok((Name::root(), 1)));
    }

    #[test]
    fn parse_name_follows_pointers() {
        let octets = b"junk\x04test\x00junk\x07example\xc0\x04junk";
        let (parsed, resume_at) = parse_name(octets, 14).unwrap();
        assert_eq!(parsed, name("example.test."));
        // Decoding resumes right after the first pointer.
        assert_eq!(resume_at, 24);
    }

    #[test]
    fn parse_name_rejects_reads_past_the_end() {
        assert_eq!(parse_name(b"\x07exam", 0), Err(Error::UnexpectedEom));
        assert_eq!(parse_name(b"\x03foo", 0), Err(Error::UnexpectedEom));
        assert_eq!(parse_name(b"\x03foo\xc0", 0), Err(Error::UnexpectedEom));
    }

    #[test]
    fn parse_name_rejects_unsupported_label_types() {
        assert_eq!(parse_name(b"\x40junk\x00", 0), Err(Error::BadLabelType));
        assert_eq!(parse_name(b"\x80junk\x00", 0), Err(Error::BadLabelType));
    }

    #[test]
    fn parse_name_accepts_chains_up_to_the_hop_limit() {
        // Ten pointers hopping forward, then a real name.
        let mut octets = Vec::new();
        for i in 0..MAX_POINTER_HOPS {
            let target = 2 * (i + 1) as u16;
            octets.extend_from_slice(&(0xc000 | target).to_be_bytes());
        }
        octets.extend_from_slice(b"\x01a\x00");
        assert_eq!(parse_name(&octets, 0), Ok((name("a."), 2)));
    }

    #[test]
    fn parse_name_rejects_chains_past_the_hop_limit() {
        let mut octets = Vec::new();
        for i in 0..MAX_POINTER_HOPS + 1 {
            let target = 2 * (i + 1) as u16;
            octets.extend_from_slice(&(0xc000 | target).to_be_bytes());
        }
        octets.extend_from_slice(b"\x01a\x00");
        assert_eq!(parse_name(&octets, 0), Err(Error::TooManyPointers));
    }

    #[test]
    fn parse_name_rejects_self_pointing_loops() {
        assert_eq!(parse_name(b"\xc0\x00", 0), Err(Error::TooManyPointers));
    }

    #[test]
    fn write_name_emits_labels_on_first_occurrence() {
        let mut buf = Vec::new();
        let mut map = CompressionMap::new();
        write_name(&mut buf, &name("example.test."), &mut map);
        assert_eq!(&buf, b"\x07example\x04test\x00");
    }

    #[test]
    fn write_name_emits_a_pointer_on_repeats() {
        let mut buf = vec![0; 12]; // stand-in for the header
        let mut map = CompressionMap::new();
        write_name(&mut buf, &name("example.test."), &mut map);
        let len_after_first = buf.len();
        write_name(&mut buf, &name("example.test."), &mut map);
        assert_eq!(buf.len(), len_after_first + 2);
        assert_eq!(&buf[len_after_first..], &(0xc000u16 | 12).to_be_bytes());
    }

    #[test]
    fn write_name_deduplicates_whole_names_only() {
        // A shared suffix is not enough for a pointer; only the exact
        // same name is.
        let mut buf = Vec::new();
        let mut map = CompressionMap::new();
        write_name(&mut buf, &name("www.example.test."), &mut map);
        let len_after_first = buf.len();
        write_name(&mut buf, &name("example.test."), &mut map);
        assert_eq!(buf.len(), len_after_first + "example.test.".len() + 1);
    }

    #[test]
    fn written_names_parse_back() {
        let mut buf = Vec::new();
        let mut map = CompressionMap::new();
        write_name(&mut buf, &name("a.b.example."), &mut map);
        write_name(&mut buf, &name("a.b.example."), &mut map);

        let (first, after_first) = parse_name(&buf, 0).unwrap();
        let (second, after_second) = parse_name(&buf, after_first).unwrap();
        assert_eq!(first, name("a.b.example."));
        assert_eq!(second, name("a.b.example."));
        assert_eq!(after_second, buf.len());
    }
}
