//! Consumer pull requests.

use crate::name::Name;
use serde::{Deserialize, Serialize};

/// A request for any block whose name has `name` as a prefix.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Interest {
    pub name: Name,
    /// Only names strictly greater than this one are acceptable.
    pub start_after: Option<Name>,
}

impl Interest {
    pub fn new(name: Name) -> Self {
        Interest {
            name,
            start_after: None,
        }
    }

    /// Ask for the segment following `previous` under the same root.
    pub fn next_after(previous: &Name) -> Self {
        Interest {
            name: previous.segment_root(),
            start_after: Some(previous.clone()),
        }
    }

    pub fn matches(&self, candidate: &Name) -> bool {
        self.name.is_prefix_of(candidate)
            && self
                .start_after
                .as_ref()
                .map_or(true, |after| candidate > after)
    }
}

impl From<Name> for Interest {
    fn from(name: Name) -> Self {
        Interest::new(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_interest() {
        let interest = Interest::new(Name::parse("/a").unwrap());
        assert!(interest.matches(&Name::parse("/a/b").unwrap()));
        assert!(interest.matches(&Name::parse("/a").unwrap()));
        assert!(!interest.matches(&Name::parse("/b").unwrap()));
    }

    #[test]
    fn test_next_after_skips_earlier_segments() {
        let root = Name::parse("/stream").unwrap();
        let interest = Interest::next_after(&root.segment_name(1));
        assert_eq!(interest.name, root);
        assert!(!interest.matches(&root.segment_name(0)));
        assert!(!interest.matches(&root.segment_name(1)));
        assert!(interest.matches(&root.segment_name(2)));
        assert!(interest.matches(&root.segment_name(256)));
    }
}
