//! Shared type definitions for the Agora engine.
//!
//! This crate is the single source of truth for the entities held by the
//! concurrent store and handed back to callers as snapshots.
//!
//! # Modules
//!
//! - [`ids`] -- Typed integer identifiers for posts and comments
//! - [`enums`] -- Enumeration types (feed ordering)
//! - [`structs`] -- Core entity structs (users, subreddits, posts, comments, messages)

pub mod enums;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::FeedSort;
pub use ids::{CommentId, PostId};
pub use structs::{Comment, Message, Post, Subreddit, User};
