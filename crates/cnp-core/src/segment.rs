//! Segmentation naming profile.
//!
//! A segment name is the segment root followed by one segment component:
//! the marker byte `0x00` and then the sequence number in big-endian form
//! with no leading zero bytes (segment 0 is the bare marker).

use crate::name::{Component, Name};

pub const SEGMENT_MARKER: u8 = 0x00;

/// First sequence number of every segmented object.
pub const BASE_SEGMENT: u64 = 0;

pub const DEFAULT_BLOCK_SIZE: usize = 4096;
pub const DEFAULT_INCREMENT: u64 = 1;
pub const DEFAULT_SCALE: u64 = 1;

const MAX_SEGMENT_COMPONENT_LEN: usize = 1 + std::mem::size_of::<u64>();

impl Component {
    /// Build the segment component for `number`.
    pub fn segment(number: u64) -> Self {
        let be = number.to_be_bytes();
        let skip = be.iter().take_while(|&&b| b == 0).count();
        let mut bytes = Vec::with_capacity(1 + be.len() - skip);
        bytes.push(SEGMENT_MARKER);
        bytes.extend_from_slice(&be[skip..]);
        Component::new(bytes)
    }

    /// Decode a segment number, if this is a segment component.
    pub fn segment_number(&self) -> Option<u64> {
        let bytes = self.as_bytes();
        if bytes.first() != Some(&SEGMENT_MARKER) || bytes.len() > MAX_SEGMENT_COMPONENT_LEN {
            return None;
        }
        Some(
            bytes[1..]
                .iter()
                .fold(0u64, |acc, &b| (acc << 8) | u64::from(b)),
        )
    }

    pub fn is_segment(&self) -> bool {
        self.segment_number().is_some()
    }
}

impl Name {
    /// True if the last component is a segment marker.
    pub fn is_segment(&self) -> bool {
        self.last().map(Component::is_segment).unwrap_or(false)
    }

    pub fn segment_number(&self) -> Option<u64> {
        self.last().and_then(Component::segment_number)
    }

    /// Strip a trailing segment component, if any.
    pub fn segment_root(&self) -> Name {
        if self.is_segment() {
            self.prefix(self.len() - 1)
        } else {
            self.clone()
        }
    }

    /// Name of segment `number` under this name's segment root.
    pub fn segment_name(&self, number: u64) -> Name {
        self.segment_root().append(Component::segment(number))
    }
}
