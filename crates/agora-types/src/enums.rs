//! Enumeration types shared across the workspace.

use serde::{Deserialize, Serialize};

/// Ordering applied when reading a subreddit feed.
///
/// Both orders are descending. `Upvotes` breaks ties by ascending post ID
/// and `Time` by descending post ID, so repeated reads of unchanged state
/// return the same sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedSort {
    /// Most upvoted first.
    Upvotes,
    /// Newest first.
    Time,
}

impl FeedSort {
    /// Parse the wire name of a sort key (`"upvotes"` or `"time"`).
    ///
    /// Returns `None` for anything else; the store turns that into an
    /// invalid-argument error.
    pub fn parse(key: &str) -> Option<Self> {
        match key {
            "upvotes" => Some(Self::Upvotes),
            "time" => Some(Self::Time),
            _ => None,
        }
    }

    /// The wire name of this sort key.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Upvotes => "upvotes",
            Self::Time => "time",
        }
    }
}

impl core::fmt::Display for FeedSort {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_known_keys() {
        assert_eq!(FeedSort::parse("upvotes"), Some(FeedSort::Upvotes));
        assert_eq!(FeedSort::parse("time"), Some(FeedSort::Time));
    }

    #[test]
    fn parse_is_case_sensitive() {
        assert_eq!(FeedSort::parse("Upvotes"), None);
        assert_eq!(FeedSort::parse("hot"), None);
        assert_eq!(FeedSort::parse(""), None);
    }

    #[test]
    fn display_round_trips_through_parse() {
        for sort in [FeedSort::Upvotes, FeedSort::Time] {
            assert_eq!(FeedSort::parse(&sort.to_string()), Some(sort));
        }
    }
}
