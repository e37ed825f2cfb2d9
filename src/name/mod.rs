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

//! Implementation of the [`Name`] type for domain names.
//!
//! A [`Name`] is kept in memory in its textual form: dot-separated
//! labels with a trailing dot, e.g. `www.example.com.`. The root name
//! is the single dot `.`. The on-the-wire form (length-prefixed
//! labels with optional compression pointers) is handled by the
//! [`wire`] submodule.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

pub mod wire;

/// The maximum length of a label (in octets).
pub const MAX_LABEL_LEN: usize = 63;

/// The maximum length of the uncompressed on-the-wire representation
/// of a domain name (in octets).
pub const MAX_WIRE_LEN: usize = 255;

////////////////////////////////////////////////////////////////////////
// NAMES                                                              //
////////////////////////////////////////////////////////////////////////

/// A valid domain name.
///
/// `Name`s compare equal and hash ASCII-case-insensitively, since the
/// DNS treats `Example.COM.` and `example.com.` as the same name. The
/// original spelling is preserved for display and re-encoding.
#[derive(Clone)]
pub struct Name {
    repr: Box<str>,
}

impl Name {
    /// Returns the root name `.`.
    pub fn root() -> Self {
        Self { repr: ".".into() }
    }

    /// Returns the textual representation of this name (dotted labels
    /// with a trailing dot).
    pub fn as_str(&self) -> &str {
        &self.repr
    }

    /// Returns whether this is the root name.
    pub fn is_root(&self) -> bool {
        &*self.repr == "."
    }

    /// Returns an iterator over the labels of this name, from the
    /// leftmost (least significant) to the rightmost. The root name
    /// has no labels.
    pub fn labels(&self) -> impl DoubleEndedIterator<Item = &str> {
        self.repr.split('.').filter(|label| !label.is_empty())
    }

    /// Returns the length of the uncompressed on-the-wire
    /// representation of this name.
    pub fn wire_len(&self) -> usize {
        self.labels().map(|label| label.len() + 1).sum::<usize>() + 1
    }

    /// Constructs a `Name` from labels that have already been
    /// validated individually. For use by the wire parser, which
    /// checks each label as it goes.
    fn from_validated_labels(labels: &[&str]) -> Self {
        let mut repr = String::with_capacity(labels.iter().map(|l| l.len() + 1).sum::<usize>() + 1);
        for label in labels {
            repr.push_str(label);
            repr.push('.');
        }
        if repr.is_empty() {
            repr.push('.');
        }
        Self { repr: repr.into() }
    }
}

/// Checks a single textual label: non-empty, within the length limit,
/// and made of ASCII characters that cannot corrupt the dotted form.
fn validate_label(label: &str) -> Result<(), Error> {
    if label.is_empty() {
        return Err(Error::EmptyLabel);
    }
    if label.len() > MAX_LABEL_LEN {
        return Err(Error::LabelTooLong);
    }
    if !label
        .bytes()
        .all(|octet| octet.is_ascii_graphic() && octet != b'.')
    {
        return Err(Error::InvalidLabel);
    }
    Ok(())
}

impl FromStr for Name {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        if text.is_empty() {
            return Err(Error::EmptyName);
        }
        if text == "." {
            return Ok(Self::root());
        }

        // A missing trailing dot is appended rather than rejected,
        // since record files and configuration are full of names
        // written without one.
        let without_dot = text.strip_suffix('.').unwrap_or(text);
        let mut wire_len = 1;
        for label in without_dot.split('.') {
            validate_label(label)?;
            wire_len += label.len() + 1;
        }
        if wire_len > MAX_WIRE_LEN {
            return Err(Error::NameTooLong);
        }
        Ok(Self {
            repr: format!("{}.", without_dot).into(),
        })
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.repr.eq_ignore_ascii_case(&other.repr)
    }
}

impl Eq for Name {}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for octet in self.repr.bytes() {
            state.write_u8(octet.to_ascii_lowercase());
        }
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.repr)
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.repr)
    }
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error produced when parsing or decoding a [`Name`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Error {
    EmptyName,
    EmptyLabel,
    LabelTooLong,
    NameTooLong,
    InvalidLabel,
    UnexpectedEom,
    BadLabelType,
    TooManyPointers,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::EmptyName => f.write_str("empty domain name"),
            Self::EmptyLabel => f.write_str("empty label"),
            Self::LabelTooLong => f.write_str("label exceeds 63 octets"),
            Self::NameTooLong => f.write_str("name exceeds 255 octets"),
            Self::InvalidLabel => f.write_str("invalid character in label"),
            Self::UnexpectedEom => f.write_str("unexpected end of message"),
            Self::BadLabelType => f.write_str("unsupported label type"),
            Self::TooManyPointers => f.write_str("compression pointer chain too long"),
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
    fn from_str_accepts_valid_names() {
        let name: Name = "www.example.com.".parse().unwrap();
        assert_eq!(name.as_str(), "www.example.com.");
        assert_eq!(name.labels().collect::<Vec<_>>(), ["www", "example", "com"]);
        assert_eq!(name.wire_len(), 17);
    }

    #[test]
    fn from_str_appends_the_trailing_dot() {
        let name: Name = "example.com".parse().unwrap();
        assert_eq!(name.as_str(), "example.com.");
    }

    #[test]
    fn from_str_accepts_the_root() {
        let root: Name = ".".parse().unwrap();
        assert!(root.is_root());
        assert_eq!(root.labels().count(), 0);
        assert_eq!(root.wire_len(), 1);
    }

    #[test]
    fn from_str_rejects_empty_names_and_labels() {
        assert_eq!("".parse::<Name>().unwrap_err(), Error::EmptyName);
        assert_eq!("a..b.".parse::<Name>().unwrap_err(), Error::EmptyLabel);
    }

    #[test]
    fn from_str_rejects_long_labels() {
        let label = "x".repeat(MAX_LABEL_LEN + 1);
        assert_eq!(
            format!("{}.com.", label).parse::<Name>().unwrap_err(),
            Error::LabelTooLong,
        );
    }

    #[test]
    fn from_str_rejects_long_names() {
        // 128 single-octet labels produce a 257-octet wire form.
        let name = "x.".repeat(128);
        assert_eq!(name.parse::<Name>().unwrap_err(), Error::NameTooLong);
    }

    #[test]
    fn from_str_rejects_whitespace() {
        assert_eq!(
            "exa mple.com.".parse::<Name>().unwrap_err(),
            Error::InvalidLabel,
        );
    }

    #[test]
    fn names_compare_case_insensitively() {
        let lower: Name = "example.com.".parse().unwrap();
        let mixed: Name = "ExAmPlE.CoM.".parse().unwrap();
        assert_eq!(lower, mixed);

        let mut set = std::collections::HashSet::new();
        set.insert(lower);
        assert!(set.contains(&mixed));
    }
}
