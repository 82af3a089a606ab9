//! Error types for the concurrent store.
//!
//! Every store operation that can fail returns a [`StoreError`] by value.
//! Errors are never retried internally and never leave partial mutations
//! behind: a failed operation observes the same state it found.

use agora_types::{CommentId, PostId};

/// Coarse classification of a [`StoreError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A unique name is already taken.
    AlreadyExists,
    /// A referenced user, subreddit, post, comment, or membership is missing.
    NotFound,
    /// The acting user is not connected.
    NotConnected,
    /// An argument is outside the accepted set.
    InvalidArgument,
}

/// Errors returned by [`Store`](crate::store::Store) operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Registration with a username that is already taken.
    #[error("user {0} already exists")]
    UserAlreadyExists(String),

    /// Creation of a subreddit whose name is already taken.
    #[error("subreddit {0} already exists")]
    SubredditAlreadyExists(String),

    /// No user is registered under the name.
    #[error("user {0} does not exist")]
    UserNotFound(String),

    /// No subreddit exists under the name.
    #[error("subreddit {0} does not exist")]
    SubredditNotFound(String),

    /// The subreddit holds no post with the ID.
    #[error("post {post_id} not found in subreddit {subreddit}")]
    PostNotFound {
        /// Subreddit that was searched.
        subreddit: String,
        /// The missing post.
        post_id: PostId,
    },

    /// The post's comment tree holds no comment with the ID.
    #[error("comment {comment_id} not found under post {post_id}")]
    CommentNotFound {
        /// Post whose tree was searched.
        post_id: PostId,
        /// The missing comment.
        comment_id: CommentId,
    },

    /// Leaving a subreddit the user is not a member of.
    #[error("user {username} is not a member of subreddit {subreddit}")]
    NotMember {
        /// The user that tried to leave.
        username: String,
        /// The subreddit.
        subreddit: String,
    },

    /// Posting or commenting while disconnected.
    #[error("user {0} is not connected")]
    NotConnected(String),

    /// Feed requested with an unrecognized sort key.
    #[error("invalid sort criteria {0:?}, expected \"upvotes\" or \"time\"")]
    InvalidSortKey(String),

    /// An ID counter is exhausted.
    #[error("{0} counter exhausted")]
    CounterExhausted(&'static str),
}

impl StoreError {
    /// Map this error onto the four-way taxonomy callers branch on.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::UserAlreadyExists(_) | Self::SubredditAlreadyExists(_) => {
                ErrorKind::AlreadyExists
            }
            Self::UserNotFound(_)
            | Self::SubredditNotFound(_)
            | Self::PostNotFound { .. }
            | Self::CommentNotFound { .. }
            | Self::NotMember { .. } => ErrorKind::NotFound,
            Self::NotConnected(_) => ErrorKind::NotConnected,
            Self::InvalidSortKey(_) | Self::CounterExhausted(_) => ErrorKind::InvalidArgument,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(
            StoreError::UserAlreadyExists("a".to_owned()).kind(),
            ErrorKind::AlreadyExists
        );
        assert_eq!(
            StoreError::NotMember {
                username: "a".to_owned(),
                subreddit: "s".to_owned(),
            }
            .kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            StoreError::NotConnected("a".to_owned()).kind(),
            ErrorKind::NotConnected
        );
        assert_eq!(
            StoreError::InvalidSortKey("hot".to_owned()).kind(),
            ErrorKind::InvalidArgument
        );
    }

    #[test]
    fn messages_name_the_entity() {
        let err = StoreError::PostNotFound {
            subreddit: "rust".to_owned(),
            post_id: PostId::new(9),
        };
        assert_eq!(err.to_string(), "post 9 not found in subreddit rust");
    }
}
