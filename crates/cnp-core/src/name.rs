//! Hierarchical content names.
//!
//! A [`Name`] is an ordered sequence of opaque byte-string [`Component`]s.
//! Matching is prefix-based: `/a/b` matches `/a/b/c` and `/a/b` itself.
//!
//! Components use the canonical order: shorter components sort first, equal
//! lengths compare bytewise. Segment numbers are encoded big-endian without
//! leading zeros, so segments of one root sort in numeric order.

use crate::digest::{Digest, Hasher};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// One opaque name component.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Component(Vec<u8>);

impl Component {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Component(bytes.into())
    }

    /// A component holding a content digest, used to disambiguate
    /// same-named objects.
    pub fn digest(digest: &Digest) -> Self {
        Component(digest.as_bytes().to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn write_escaped(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~') {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "%{:02X}", b)?;
            }
        }
        Ok(())
    }

    fn parse_escaped(s: &str) -> Result<Self> {
        let raw = s.as_bytes();
        let mut bytes = Vec::with_capacity(raw.len());
        let mut i = 0;
        while i < raw.len() {
            if raw[i] == b'%' {
                let hex = raw
                    .get(i + 1..i + 3)
                    .and_then(|h| std::str::from_utf8(h).ok())
                    .and_then(|h| u8::from_str_radix(h, 16).ok())
                    .ok_or_else(|| Error::invalid(format!("bad escape in component {:?}", s)))?;
                bytes.push(hex);
                i += 3;
            } else {
                bytes.push(raw[i]);
                i += 1;
            }
        }
        Ok(Component(bytes))
    }
}

impl Ord for Component {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for Component {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_escaped(f)
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_escaped(f)
    }
}

impl From<&str> for Component {
    fn from(s: &str) -> Self {
        Component(s.as_bytes().to_vec())
    }
}

impl From<Vec<u8>> for Component {
    fn from(bytes: Vec<u8>) -> Self {
        Component(bytes)
    }
}

impl From<&[u8]> for Component {
    fn from(bytes: &[u8]) -> Self {
        Component(bytes.to_vec())
    }
}

/// An immutable hierarchical name.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Name {
    components: Vec<Component>,
}

impl Name {
    /// The empty (root) name, a prefix of every name.
    pub fn root() -> Self {
        Name::default()
    }

    pub fn from_components(components: impl IntoIterator<Item = Component>) -> Self {
        Name {
            components: components.into_iter().collect(),
        }
    }

    /// Parse a URI such as `/videos/cat.mp4/%00%01`. An optional `ccnx:`
    /// scheme is accepted; empty path segments are skipped.
    pub fn parse(uri: &str) -> Result<Self> {
        let path = uri.strip_prefix("ccnx:").unwrap_or(uri);
        if !path.starts_with('/') {
            return Err(Error::invalid(format!("name must start with '/': {:?}", uri)));
        }
        let components = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(Component::parse_escaped)
            .collect::<Result<Vec<_>>>()?;
        Ok(Name { components })
    }

    /// Return a new name with `component` appended.
    pub fn append(&self, component: impl Into<Component>) -> Self {
        let mut components = self.components.clone();
        components.push(component.into());
        Name { components }
    }

    /// Append a SHA-256 digest of `content` as the final component.
    pub fn with_digest(&self, content: &[u8]) -> Self {
        self.append(Component::digest(&Hasher::hash(content)))
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Component> {
        self.components.get(index)
    }

    pub fn last(&self) -> Option<&Component> {
        self.components.last()
    }

    /// The first `count` components (the whole name if `count` is larger).
    pub fn prefix(&self, count: usize) -> Self {
        let count = count.min(self.components.len());
        Name {
            components: self.components[..count].to_vec(),
        }
    }

    /// True if every component of `self` matches the leading components of
    /// `other`. A name is a prefix of itself.
    pub fn is_prefix_of(&self, other: &Name) -> bool {
        other.components.starts_with(&self.components)
    }

    pub fn starts_with(&self, prefix: &Name) -> bool {
        prefix.is_prefix_of(self)
    }

    /// Feed an unambiguous encoding of the name into `hasher`.
    pub fn encode_into(&self, hasher: &mut Hasher) {
        hasher.update_u64(self.components.len() as u64);
        for component in &self.components {
            hasher.update_prefixed(component.as_bytes());
        }
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.components.is_empty() {
            return write!(f, "/");
        }
        for component in &self.components {
            write!(f, "/")?;
            component.write_escaped(f)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({})", self)
    }
}

impl FromStr for Name {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Name::parse(s)
    }
}

impl FromIterator<Component> for Name {
    fn from_iter<I: IntoIterator<Item = Component>>(iter: I) -> Self {
        Name::from_components(iter)
    }
}
