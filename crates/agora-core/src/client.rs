//! Per-user session over a shared [`Store`].
//!
//! A [`UserClient`] binds one username to the store and acts as that user.
//! Every call forwards to the store and logs the outcome: `info!` on
//! success, `warn!` with the error on failure. The store's result is
//! returned unchanged.

use std::sync::Arc;

use agora_types::{CommentId, Message, Post, PostId};
use tracing::{info, warn};

use crate::error::StoreError;
use crate::store::Store;

/// A session acting as one user.
#[derive(Debug, Clone)]
pub struct UserClient {
    username: String,
    store: Arc<Store>,
}

impl UserClient {
    /// Bind `username` to a store. Does not register the user.
    pub fn new(username: impl Into<String>, store: Arc<Store>) -> Self {
        Self {
            username: username.into(),
            store,
        }
    }

    /// The bound username.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Log a call's outcome under the bound username and pass it through.
    fn logged<T>(
        &self,
        action: &'static str,
        result: Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        match &result {
            Ok(_) => info!(username = %self.username, action, "Client action succeeded"),
            Err(error) => {
                warn!(username = %self.username, action, %error, "Client action failed");
            }
        }
        result
    }

    /// Register the bound username.
    ///
    /// # Errors
    ///
    /// See [`Store::register_user`].
    pub fn register(&self) -> Result<(), StoreError> {
        self.logged("register", self.store.register_user(&self.username))
    }

    /// Go online.
    ///
    /// # Errors
    ///
    /// See [`Store::connect_user`].
    pub fn connect(&self) -> Result<(), StoreError> {
        self.logged("connect", self.store.connect_user(&self.username))
    }

    /// Go offline.
    ///
    /// # Errors
    ///
    /// See [`Store::disconnect_user`].
    pub fn disconnect(&self) -> Result<(), StoreError> {
        self.logged("disconnect", self.store.disconnect_user(&self.username))
    }

    /// Join a subreddit.
    ///
    /// # Errors
    ///
    /// See [`Store::join_subreddit`].
    pub fn join_subreddit(&self, subreddit: &str) -> Result<(), StoreError> {
        self.logged(
            "join_subreddit",
            self.store.join_subreddit(&self.username, subreddit),
        )
    }

    /// Leave a subreddit.
    ///
    /// # Errors
    ///
    /// See [`Store::leave_subreddit`].
    pub fn leave_subreddit(&self, subreddit: &str) -> Result<(), StoreError> {
        self.logged(
            "leave_subreddit",
            self.store.leave_subreddit(&self.username, subreddit),
        )
    }

    /// Post as the bound user.
    ///
    /// # Errors
    ///
    /// See [`Store::post_in_subreddit`].
    pub fn post(&self, subreddit: &str, content: &str) -> Result<PostId, StoreError> {
        self.logged(
            "post",
            self.store
                .post_in_subreddit(&self.username, subreddit, content),
        )
    }

    /// Comment on a post as the bound user.
    ///
    /// # Errors
    ///
    /// See [`Store::comment_on_post`].
    pub fn comment(
        &self,
        subreddit: &str,
        post_id: PostId,
        content: &str,
    ) -> Result<CommentId, StoreError> {
        self.logged(
            "comment",
            self.store
                .comment_on_post(&self.username, subreddit, post_id, content),
        )
    }

    /// Reply to a comment as the bound user.
    ///
    /// # Errors
    ///
    /// See [`Store::reply_to_comment`].
    pub fn reply(
        &self,
        subreddit: &str,
        post_id: PostId,
        parent_id: CommentId,
        content: &str,
    ) -> Result<CommentId, StoreError> {
        self.logged(
            "reply",
            self.store
                .reply_to_comment(subreddit, post_id, parent_id, &self.username, content),
        )
    }

    /// Upvote a post.
    ///
    /// # Errors
    ///
    /// See [`Store::upvote_post`].
    pub fn upvote(&self, subreddit: &str, post_id: PostId) -> Result<(), StoreError> {
        self.logged("upvote", self.store.upvote_post(subreddit, post_id))
    }

    /// Downvote a post.
    ///
    /// # Errors
    ///
    /// See [`Store::downvote_post`].
    pub fn downvote(&self, subreddit: &str, post_id: PostId) -> Result<(), StoreError> {
        self.logged("downvote", self.store.downvote_post(subreddit, post_id))
    }

    /// Read a feed.
    ///
    /// # Errors
    ///
    /// See [`Store::get_feed`].
    pub fn feed(
        &self,
        subreddit: &str,
        sort_by: &str,
        limit: usize,
    ) -> Result<Vec<Post>, StoreError> {
        self.logged("feed", self.store.get_feed(subreddit, sort_by, limit))
    }

    /// Message another user.
    ///
    /// # Errors
    ///
    /// See [`Store::send_message`].
    pub fn send_message(&self, receiver: &str, content: &str) -> Result<(), StoreError> {
        self.logged(
            "send_message",
            self.store.send_message(&self.username, receiver, content),
        )
    }

    /// Answer a received message, addressed back to its sender.
    ///
    /// # Errors
    ///
    /// See [`Store::reply_to_message`].
    pub fn reply_to_message(&self, message: &Message, content: &str) -> Result<(), StoreError> {
        self.logged(
            "reply_to_message",
            self.store
                .reply_to_message(&self.username, &message.sender, content),
        )
    }

    /// The bound user's mailbox.
    ///
    /// # Errors
    ///
    /// See [`Store::list_messages`].
    pub fn messages(&self) -> Result<Vec<Message>, StoreError> {
        self.logged("list_messages", self.store.list_messages(&self.username))
    }

    /// The bound user's last computed karma.
    ///
    /// # Errors
    ///
    /// See [`Store::get_user_karma`].
    pub fn karma(&self) -> Result<i64, StoreError> {
        self.logged("karma", self.store.get_user_karma(&self.username))
    }

    /// Recompute and return the bound user's karma.
    pub fn refresh_karma(&self) -> i64 {
        let karma = self.store.compute_karma(&self.username);
        info!(username = %self.username, karma, "Karma refreshed");
        karma
    }
}
