//! Karma aggregation.
//!
//! Karma is derived, never maintained incrementally: a user's karma is the
//! sum over every subreddit and every post of
//!
//! ```text
//! (upvotes - downvotes)   for each post the user authored
//! + 1                     for each comment or reply the user authored
//! ```
//!
//! computed by a full traversal each time it is asked for.

use agora_types::Subreddit;

use crate::thread;

/// Compute `username`'s karma over the given subreddits.
///
/// The sum saturates at the `i64` bounds.
pub fn karma_for<'a, I>(subreddits: I, username: &str) -> i64
where
    I: IntoIterator<Item = &'a Subreddit>,
{
    let mut karma: i64 = 0;
    for sub in subreddits {
        for post in &sub.posts {
            if post.author == username {
                karma = karma.saturating_add(post.score());
            }
            let comments = thread::count_authored_by(post, username);
            karma = karma.saturating_add(i64::try_from(comments).unwrap_or(i64::MAX));
        }
    }
    karma
}
