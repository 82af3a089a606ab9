//! Type-safe identifier wrappers around `u64`.
//!
//! Posts and comments draw their IDs from two independent, monotonically
//! increasing counters owned by the store. The first ID handed out by a
//! fresh counter is 1; 0 is never assigned.

use serde::{Deserialize, Serialize};

/// Generates a newtype wrapper around `u64` with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            Copy,
            Default,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            Serialize,
            Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Wrap a raw counter value.
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            /// Return the inner counter value.
            pub const fn into_inner(self) -> u64 {
                self.0
            }

            /// The identifier that follows this one, or `None` on overflow.
            pub const fn next(self) -> Option<Self> {
                match self.0.checked_add(1) {
                    Some(raw) => Some(Self(raw)),
                    None => None,
                }
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id! {
    /// Identifier of a post, unique across every subreddit of one store.
    PostId
}

define_id! {
    /// Identifier of a comment or reply, unique across every post of one store.
    CommentId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_increments_by_one() {
        assert_eq!(PostId::new(0).next(), Some(PostId::new(1)));
        assert_eq!(CommentId::new(41).next(), Some(CommentId::new(42)));
    }

    #[test]
    fn next_refuses_to_wrap() {
        assert_eq!(PostId::new(u64::MAX).next(), None);
    }

    #[test]
    fn ids_serialize_as_bare_integers() {
        let json = serde_json::to_string(&PostId::new(7)).ok();
        assert_eq!(json.as_deref(), Some("7"));
        let restored: Result<CommentId, _> = serde_json::from_str("12");
        assert_eq!(restored.ok(), Some(CommentId::new(12)));
    }

    #[test]
    fn display_matches_raw_value() {
        assert_eq!(PostId::new(3).to_string(), "3");
    }
}
