//! Core entity structs for the Agora engine.
//!
//! The store owns every value defined here. Callers only ever receive
//! clones (snapshots), so mutating a returned value never affects the
//! shared state.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{CommentId, PostId};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A registered account.
///
/// Users are never deleted. `karma` is derived: it is only refreshed when
/// the store recomputes it and is stale in between.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Unique account name.
    pub username: String,
    /// Private messages received, in arrival order.
    pub messages: Vec<Message>,
    /// Last computed karma.
    pub karma: i64,
    /// Whether the user may currently post and comment.
    pub connected: bool,
}

impl User {
    /// A freshly registered user: no messages, zero karma, disconnected.
    pub const fn new(username: String) -> Self {
        Self {
            username,
            messages: Vec::new(),
            karma: 0,
            connected: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Subreddit
// ---------------------------------------------------------------------------

/// A community holding posts.
///
/// Membership refers to users by name and does not own them. It gates
/// nothing: any connected user may post in any subreddit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subreddit {
    /// Unique community name.
    pub name: String,
    /// Usernames of current members.
    pub members: BTreeSet<String>,
    /// Posts in arrival order.
    pub posts: Vec<Post>,
}

impl Subreddit {
    /// An empty subreddit with no members and no posts.
    pub const fn new(name: String) -> Self {
        Self {
            name,
            members: BTreeSet::new(),
            posts: Vec::new(),
        }
    }

    /// Find a post by ID.
    pub fn post(&self, id: PostId) -> Option<&Post> {
        self.posts.iter().find(|p| p.id == id)
    }

    /// Find a post by ID for mutation.
    pub fn post_mut(&mut self, id: PostId) -> Option<&mut Post> {
        self.posts.iter_mut().find(|p| p.id == id)
    }
}

// ---------------------------------------------------------------------------
// Post
// ---------------------------------------------------------------------------

/// A top-level submission in a subreddit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    /// Store-wide unique, strictly increasing identifier.
    pub id: PostId,
    /// Username of the author.
    pub author: String,
    /// Body text.
    pub content: String,
    /// Root comment IDs in arrival order.
    pub roots: Vec<CommentId>,
    /// Every comment and reply on this post, in ascending ID order.
    /// Threads link into it by ID; no comment owns another.
    pub comments: Vec<Comment>,
    /// Number of upvotes received.
    pub upvotes: u64,
    /// Number of downvotes received.
    pub downvotes: u64,
    /// When the post was created.
    pub created_at: DateTime<Utc>,
}

impl Post {
    /// A new post with no comments and no votes.
    pub const fn new(
        id: PostId,
        author: String,
        content: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            author,
            content,
            roots: Vec::new(),
            comments: Vec::new(),
            upvotes: 0,
            downvotes: 0,
            created_at,
        }
    }

    /// Net score (`upvotes - downvotes`), saturating at the `i64` bounds.
    pub fn score(&self) -> i64 {
        let up = i64::try_from(self.upvotes).unwrap_or(i64::MAX);
        let down = i64::try_from(self.downvotes).unwrap_or(i64::MAX);
        up.saturating_sub(down)
    }

    /// Find a comment or reply by ID.
    pub fn comment(&self, id: CommentId) -> Option<&Comment> {
        let index = self.comments.binary_search_by_key(&id, |c| c.id).ok()?;
        self.comments.get(index)
    }

    /// Find a comment or reply by ID for mutation.
    pub fn comment_mut(&mut self, id: CommentId) -> Option<&mut Comment> {
        let index = self.comments.binary_search_by_key(&id, |c| c.id).ok()?;
        self.comments.get_mut(index)
    }
}

// ---------------------------------------------------------------------------
// Comment
// ---------------------------------------------------------------------------

/// A comment on a post, or a reply to another comment.
///
/// Lives in its post's flat comment list. `parent` and `replies` link it
/// into the thread by ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    /// Store-wide unique identifier, independent of post IDs.
    pub id: CommentId,
    /// The comment this replies to, or `None` for a root comment.
    pub parent: Option<CommentId>,
    /// Username of the author.
    pub author: String,
    /// Body text.
    pub content: String,
    /// IDs of direct replies in arrival order.
    pub replies: Vec<CommentId>,
    /// When the comment was created.
    pub created_at: DateTime<Utc>,
}

impl Comment {
    /// A new comment with no replies, under `parent` if given.
    pub const fn new(
        id: CommentId,
        parent: Option<CommentId>,
        author: String,
        content: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            parent,
            author,
            content,
            replies: Vec::new(),
            created_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A private message delivered to a user's mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Name the message was sent from. Not required to be registered.
    pub sender: String,
    /// Name of the receiving user.
    pub receiver: String,
    /// Body text.
    pub content: String,
    /// When the message was delivered.
    pub sent_at: DateTime<Utc>,
}
